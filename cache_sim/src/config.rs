use std::{fmt, str::FromStr};

use anyhow::Result;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::{AddressError, AddressLayout, INDEX_BITS, OFFSET_BITS, TAG_BITS};

/// 16kb / 4 bytes = 4096 lines
pub const DEFAULT_CACHE_SIZE: usize = 16384;
pub const DEFAULT_BLOCK_SIZE: usize = 4;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("cache size must be positive")]
    ZeroCacheSize,
    #[error("block size must be positive")]
    ZeroBlockSize,
    #[error("cache size {cache_size} is not a positive multiple of block size {block_size}")]
    NotMultiple {
        cache_size: usize,
        block_size: usize,
    },
    #[error("invalid write policy `{0}` (expected `wt` or `wb`)")]
    InvalidPolicy(String),
    #[error("invalid write policy code {0} (expected 0 or 1)")]
    InvalidPolicyCode(u8),
    #[error(transparent)]
    Layout(#[from] AddressError),
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    TryFromPrimitive,
    IntoPrimitive,
    Serialize,
    Deserialize,
)]
#[repr(u8)]
pub enum WritePolicy {
    #[serde(rename = "wt", alias = "write-through")]
    WriteThrough = 0,
    #[serde(rename = "wb", alias = "write-back")]
    WriteBack = 1,
}

impl WritePolicy {
    /// command-line token
    pub fn token(self) -> &'static str {
        match self {
            WritePolicy::WriteThrough => "wt",
            WritePolicy::WriteBack => "wb",
        }
    }
    pub fn from_code(code: u8) -> Result<Self, ConfigError> {
        Self::try_from(code).map_err(|e| ConfigError::InvalidPolicyCode(e.number))
    }
}

// `#[default]` would make num_enum map unknown codes to this variant.
impl Default for WritePolicy {
    fn default() -> Self {
        WritePolicy::WriteThrough
    }
}

impl fmt::Display for WritePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WritePolicy::WriteThrough => write!(f, "Write Through"),
            WritePolicy::WriteBack => write!(f, "Write Back"),
        }
    }
}

impl FromStr for WritePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wt" => Ok(WritePolicy::WriteThrough),
            "wb" => Ok(WritePolicy::WriteBack),
            _ => Err(ConfigError::InvalidPolicy(s.to_owned())),
        }
    }
}

/// Geometry and policy of one cache, validated at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    cache_size: usize,
    block_size: usize,
    write_policy: WritePolicy,
    layout: AddressLayout,
}

impl CacheConfig {
    pub fn new(
        cache_size: usize,
        block_size: usize,
        write_policy: WritePolicy,
    ) -> Result<Self, ConfigError> {
        if cache_size == 0 {
            return Err(ConfigError::ZeroCacheSize);
        }
        if block_size == 0 {
            return Err(ConfigError::ZeroBlockSize);
        }
        if cache_size % block_size != 0 {
            return Err(ConfigError::NotMultiple {
                cache_size,
                block_size,
            });
        }
        Ok(Self {
            cache_size,
            block_size,
            write_policy,
            layout: AddressLayout::default(),
        })
    }
    pub fn with_layout(self, layout: AddressLayout) -> Self {
        Self { layout, ..self }
    }
    pub fn cache_size(&self) -> usize {
        self.cache_size
    }
    pub fn block_size(&self) -> usize {
        self.block_size
    }
    pub fn write_policy(&self) -> WritePolicy {
        self.write_policy
    }
    pub fn layout(&self) -> &AddressLayout {
        &self.layout
    }
    pub fn num_lines(&self) -> usize {
        self.cache_size / self.block_size
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_size: DEFAULT_CACHE_SIZE,
            block_size: DEFAULT_BLOCK_SIZE,
            write_policy: WritePolicy::default(),
            layout: AddressLayout::default(),
        }
    }
}

/// Partial configuration as read from a JSON file. Missing fields fall back
/// to the reference configuration.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfigFile {
    pub cache_size: Option<usize>,
    pub block_size: Option<usize>,
    pub write_policy: Option<WritePolicy>,
    pub tag_bits: Option<u32>,
    pub index_bits: Option<u32>,
    pub offset_bits: Option<u32>,
}

impl CacheConfigFile {
    pub fn deser(file: impl std::io::Read) -> Result<Self> {
        Ok(serde_json::from_reader(file)?)
    }

    /// Fields set in `over` replace the ones in `self`.
    pub fn overlay(self, over: CacheConfigFile) -> Self {
        Self {
            cache_size: over.cache_size.or(self.cache_size),
            block_size: over.block_size.or(self.block_size),
            write_policy: over.write_policy.or(self.write_policy),
            tag_bits: over.tag_bits.or(self.tag_bits),
            index_bits: over.index_bits.or(self.index_bits),
            offset_bits: over.offset_bits.or(self.offset_bits),
        }
    }

    pub fn build(&self) -> Result<CacheConfig, ConfigError> {
        let layout = AddressLayout::new(
            self.tag_bits.unwrap_or(TAG_BITS),
            self.index_bits.unwrap_or(INDEX_BITS),
            self.offset_bits.unwrap_or(OFFSET_BITS),
        )?;
        Ok(CacheConfig::new(
            self.cache_size.unwrap_or(DEFAULT_CACHE_SIZE),
            self.block_size.unwrap_or(DEFAULT_BLOCK_SIZE),
            self.write_policy.unwrap_or_default(),
        )?
        .with_layout(layout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_geometry() {
        let c = CacheConfig::default();
        assert_eq!(c.num_lines(), 4096);
        assert_eq!(c.write_policy(), WritePolicy::WriteThrough);
        assert_eq!(c.layout().index_bits(), 12);
    }
    #[test]
    fn test_invalid_geometry() {
        use WritePolicy::*;
        assert_eq!(
            CacheConfig::new(0, 4, WriteThrough),
            Err(ConfigError::ZeroCacheSize)
        );
        assert_eq!(
            CacheConfig::new(16384, 0, WriteBack),
            Err(ConfigError::ZeroBlockSize)
        );
        assert_eq!(
            CacheConfig::new(10, 4, WriteBack),
            Err(ConfigError::NotMultiple {
                cache_size: 10,
                block_size: 4
            })
        );
        assert!(matches!(
            CacheConfig::new(2, 4, WriteBack),
            Err(ConfigError::NotMultiple { .. })
        ));
        assert_eq!(CacheConfig::new(64, 8, WriteBack).unwrap().num_lines(), 8);
    }
    #[test]
    fn test_policy_tokens() {
        assert_eq!("wt".parse::<WritePolicy>(), Ok(WritePolicy::WriteThrough));
        assert_eq!("wb".parse::<WritePolicy>(), Ok(WritePolicy::WriteBack));
        assert_eq!(
            "WB".parse::<WritePolicy>(),
            Err(ConfigError::InvalidPolicy("WB".to_owned()))
        );
        assert_eq!(WritePolicy::WriteBack.to_string(), "Write Back");
        assert_eq!(WritePolicy::WriteThrough.token(), "wt");
    }
    #[test]
    fn test_policy_codes() {
        assert_eq!(u8::from(WritePolicy::WriteThrough), 0);
        assert_eq!(u8::from(WritePolicy::WriteBack), 1);
        assert_eq!(WritePolicy::from_code(1), Ok(WritePolicy::WriteBack));
        assert_eq!(
            WritePolicy::from_code(2),
            Err(ConfigError::InvalidPolicyCode(2))
        );
    }
    #[test]
    fn test_config_file() {
        let json =
            r#"{ "cache_size": 1024, "write_policy": "wb", "index_bits": 8, "tag_bits": 22 }"#;
        let file = CacheConfigFile::deser(json.as_bytes()).unwrap();
        let c = file.build().unwrap();
        assert_eq!(c.cache_size(), 1024);
        assert_eq!(c.block_size(), DEFAULT_BLOCK_SIZE);
        assert_eq!(c.num_lines(), 256);
        assert_eq!(c.write_policy(), WritePolicy::WriteBack);
        assert_eq!(c.layout().tag_bits(), 22);
    }
    #[test]
    fn test_config_file_rejects() {
        assert!(CacheConfigFile::deser(r#"{ "ways": 2 }"#.as_bytes()).is_err());
        assert!(CacheConfigFile::deser(r#"{ "write_policy": "wx" }"#.as_bytes()).is_err());
        let file = CacheConfigFile {
            offset_bits: Some(4),
            ..Default::default()
        };
        assert!(matches!(file.build(), Err(ConfigError::Layout(_))));
    }
    #[test]
    fn test_overlay_file_only() {
        let file = CacheConfigFile::deser(r#"{ "block_size": 8 }"#.as_bytes()).unwrap();
        let c = file.overlay(CacheConfigFile::default()).build().unwrap();
        assert_eq!(c.block_size(), 8);
        assert_eq!(c.cache_size(), DEFAULT_CACHE_SIZE);
        assert_eq!(c.write_policy(), WritePolicy::WriteThrough);
    }
    #[test]
    fn test_overlay_flag_over_file() {
        let json = r#"{ "cache_size": 1024, "block_size": 8, "index_bits": 7, "tag_bits": 23 }"#;
        let file = CacheConfigFile::deser(json.as_bytes()).unwrap();
        let flags = CacheConfigFile {
            cache_size: Some(2048),
            index_bits: Some(8),
            tag_bits: Some(22),
            ..Default::default()
        };
        let c = file.overlay(flags).build().unwrap();
        assert_eq!(c.cache_size(), 2048);
        assert_eq!(c.block_size(), 8);
        assert_eq!(c.layout().index_bits(), 8);
        assert_eq!(c.layout().tag_bits(), 22);
        assert_eq!(c.layout().offset_bits(), OFFSET_BITS);
    }
    #[test]
    fn test_overlay_policy_override() {
        let file = CacheConfigFile::deser(r#"{ "write_policy": "wb" }"#.as_bytes()).unwrap();
        let flags = CacheConfigFile {
            write_policy: Some(WritePolicy::WriteThrough),
            ..Default::default()
        };
        let c = file.clone().overlay(flags).build().unwrap();
        assert_eq!(c.write_policy(), WritePolicy::WriteThrough);
        let c = file.overlay(CacheConfigFile::default()).build().unwrap();
        assert_eq!(c.write_policy(), WritePolicy::WriteBack);
    }
}
