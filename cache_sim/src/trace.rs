//! Memory access traces: one `<counter> <op> <address>` record per line.

use std::{fmt, io::BufRead};

use nom::{
    bytes::complete::is_not,
    character::complete::{space0, space1},
    combinator::eof,
    sequence::{preceded, terminated, tuple},
    IResult,
};
use thiserror::Error;

use crate::cache::AccessKind;

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("line {line}: unknown operation `{op}`")]
    UnknownOperation { line: usize, op: String },
    #[error("line {line}: malformed record `{content}` (expected `<counter> <op> <address>`)")]
    Malformed { line: usize, content: String },
    #[error("failed to read trace: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceOp {
    Read,
    Write,
}

impl TraceOp {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "R" => Some(TraceOp::Read),
            "W" => Some(TraceOp::Write),
            _ => None,
        }
    }
}

impl From<TraceOp> for AccessKind {
    fn from(op: TraceOp) -> Self {
        match op {
            TraceOp::Read => AccessKind::Read,
            TraceOp::Write => AccessKind::Write,
        }
    }
}

impl fmt::Display for TraceOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceOp::Read => write!(f, "R"),
            TraceOp::Write => write!(f, "W"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceRecord {
    /// 1-based line number in the trace
    pub line: usize,
    pub counter: String,
    pub op: TraceOp,
    pub address: String,
}

impl fmt::Display for TraceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} {} {}", self.line, self.counter, self.op, self.address)
    }
}

fn token(input: &str) -> IResult<&str, &str> {
    is_not(" \t\r\n")(input)
}

fn fields(input: &str) -> IResult<&str, (&str, &str, &str)> {
    terminated(
        tuple((
            preceded(space0, token),
            preceded(space1, token),
            preceded(space1, token),
        )),
        terminated(space0, eof),
    )(input)
}

impl TraceRecord {
    /// `Ok(None)` for blank lines and `#` comments.
    pub fn parse(line: usize, content: &str) -> Result<Option<Self>, TraceError> {
        let trimmed = content.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(None);
        }
        let (_, (counter, op, address)) = fields(trimmed).map_err(|_| TraceError::Malformed {
            line,
            content: trimmed.to_owned(),
        })?;
        let Some(op) = TraceOp::parse(op) else {
            return Err(TraceError::UnknownOperation {
                line,
                op: op.to_owned(),
            });
        };
        Ok(Some(Self {
            line,
            counter: counter.to_owned(),
            op,
            address: address.to_owned(),
        }))
    }
}

/// Lazily parsed records of a trace. Comments and blank lines are skipped.
pub struct TraceReader<R> {
    lines: std::io::Lines<R>,
    line: usize,
}

impl<R: BufRead> TraceReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line: 0,
        }
    }
}

impl<R: BufRead> Iterator for TraceReader<R> {
    type Item = Result<TraceRecord, TraceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let content = match self.lines.next()? {
                Ok(c) => c,
                Err(e) => return Some(Err(e.into())),
            };
            self.line += 1;
            match TraceRecord::parse(self.line, &content) {
                Ok(Some(record)) => return Some(Ok(record)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
