mod bin;

pub mod address;
pub mod cache;
pub mod config;
pub mod sim;
pub mod stat;
pub mod trace;
