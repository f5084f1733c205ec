use std::fmt;

use thiserror::Error;

use crate::{
    address::{BitString, DecodedAddress},
    config::{CacheConfig, ConfigError, WritePolicy},
    stat::CacheStatistics,
};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AccessError {
    #[error("no address given")]
    MissingAddress,
    #[error("address `{address}` maps to index {index}, out of range for {num_lines} lines")]
    IndexOutOfRange {
        address: String,
        index: usize,
        num_lines: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessKind::Read => write!(f, "read"),
            AccessKind::Write => write!(f, "write"),
        }
    }
}

/// One cache line. A tag is present exactly when the line is valid.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum LineSlot {
    #[default]
    Invalid,
    Valid {
        tag: BitString,
        /// only ever set under write-back
        #[cfg(feature = "dirty_tracking")]
        dirty: bool,
    },
}

impl LineSlot {
    pub fn is_valid(&self) -> bool {
        matches!(self, LineSlot::Valid { .. })
    }
    pub fn tag(&self) -> Option<BitString> {
        match self {
            LineSlot::Invalid => None,
            LineSlot::Valid { tag, .. } => Some(*tag),
        }
    }
    #[cfg(feature = "dirty_tracking")]
    pub fn is_dirty(&self) -> bool {
        matches!(self, LineSlot::Valid { dirty: true, .. })
    }
}

/// Result of a single access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessOutcome {
    pub kind: AccessKind,
    pub hit: bool,
    pub decoded: DecodedAddress,
    /// tag replaced by a miss on a valid line
    pub evicted: Option<BitString>,
    #[cfg(feature = "dirty_tracking")]
    pub wrote_back: bool,
}

impl fmt::Display for AccessOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = if self.hit { "hit" } else { "miss" };
        write!(f, "{} {result}: {}", self.kind, self.decoded)?;
        if let Some(evicted) = self.evicted {
            write!(f, ", evicted tag {evicted}")?;
        }
        #[cfg(feature = "dirty_tracking")]
        if self.wrote_back {
            write!(f, " (written back)")?;
        }
        Ok(())
    }
}

/// Single-level direct-mapped cache. Every index owns exactly one line and a
/// miss always replaces it.
pub struct DirectMappedCache {
    config: CacheConfig,
    slots: Vec<LineSlot>,
    hits: u64,
    misses: u64,
    reads: u64,
    writes: u64,
    #[cfg(feature = "dirty_tracking")]
    write_backs: u64,
}

impl DirectMappedCache {
    pub fn new(config: CacheConfig) -> Self {
        let num_lines = config.num_lines();
        let index_span = config.layout().index_span();
        if (num_lines as u64) < index_span {
            log::warn!(
                "{num_lines} lines cannot hold all {index_span} indices of a {}-bit index field; \
                 accesses beyond line {} will be rejected",
                config.layout().index_bits(),
                num_lines - 1
            );
        } else if (num_lines as u64) > index_span {
            log::warn!(
                "only {index_span} of {num_lines} lines are reachable with a {}-bit index field",
                config.layout().index_bits()
            );
        }
        log::info!(
            "cache: {} bytes / {} byte blocks = {num_lines} lines, {}",
            config.cache_size(),
            config.block_size(),
            config.write_policy()
        );
        Self {
            config,
            slots: vec![LineSlot::Invalid; num_lines],
            hits: 0,
            misses: 0,
            reads: 0,
            writes: 0,
            #[cfg(feature = "dirty_tracking")]
            write_backs: 0,
        }
    }

    /// Validates the geometry and builds an empty cache with the reference
    /// address layout.
    pub fn construct(
        cache_size: usize,
        block_size: usize,
        write_policy: WritePolicy,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(CacheConfig::new(
            cache_size,
            block_size,
            write_policy,
        )?))
    }

    pub fn read(&mut self, address: &str) -> Result<AccessOutcome, AccessError> {
        self.access(AccessKind::Read, address)
    }

    /// Counter updates do not depend on the write policy.
    pub fn write(&mut self, address: &str) -> Result<AccessOutcome, AccessError> {
        self.access(AccessKind::Write, address)
    }

    pub fn access(
        &mut self,
        kind: AccessKind,
        address: &str,
    ) -> Result<AccessOutcome, AccessError> {
        if address.trim().is_empty() {
            return Err(AccessError::MissingAddress);
        }
        let decoded = self.config.layout().decode(address);
        let index = decoded.index_value();
        let num_lines = self.slots.len();
        let Some(slot) = self.slots.get_mut(index) else {
            return Err(AccessError::IndexOutOfRange {
                address: address.to_owned(),
                index,
                num_lines,
            });
        };
        #[cfg(feature = "dirty_tracking")]
        let dirties =
            kind == AccessKind::Write && self.config.write_policy() == WritePolicy::WriteBack;

        let hit = slot.tag() == Some(decoded.tag);
        let mut outcome = AccessOutcome {
            kind,
            hit,
            decoded,
            evicted: None,
            #[cfg(feature = "dirty_tracking")]
            wrote_back: false,
        };
        if hit {
            self.hits += 1;
            #[cfg(feature = "dirty_tracking")]
            if let LineSlot::Valid { dirty, .. } = slot {
                *dirty |= dirties;
            }
        } else {
            self.misses += 1;
            self.reads += 1;
            outcome.evicted = slot.tag();
            #[cfg(feature = "dirty_tracking")]
            if slot.is_dirty() {
                outcome.wrote_back = true;
                self.write_backs += 1;
            }
            *slot = LineSlot::Valid {
                tag: decoded.tag,
                #[cfg(feature = "dirty_tracking")]
                dirty: dirties,
            };
        }
        if kind == AccessKind::Write {
            self.writes += 1;
        }
        log::debug!("{outcome}");
        Ok(outcome)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
    pub fn hits(&self) -> u64 {
        self.hits
    }
    pub fn misses(&self) -> u64 {
        self.misses
    }
    pub fn reads(&self) -> u64 {
        self.reads
    }
    pub fn writes(&self) -> u64 {
        self.writes
    }
    /// dirty lines evicted under write-back
    #[cfg(feature = "dirty_tracking")]
    pub fn write_backs(&self) -> u64 {
        self.write_backs
    }
    pub fn cache_size(&self) -> usize {
        self.config.cache_size()
    }
    pub fn block_size(&self) -> usize {
        self.config.block_size()
    }
    pub fn num_lines(&self) -> usize {
        self.slots.len()
    }
    pub fn write_policy(&self) -> WritePolicy {
        self.config.write_policy()
    }

    pub fn slot(&self, index: usize) -> Option<&LineSlot> {
        self.slots.get(index)
    }
    pub fn slots(&self) -> impl Iterator<Item = (usize, &LineSlot)> + '_ {
        self.slots.iter().enumerate()
    }
    pub fn valid_lines(&self) -> usize {
        self.slots.iter().filter(|s| s.is_valid()).count()
    }

    pub fn statistics(&self) -> CacheStatistics {
        CacheStatistics {
            hits: self.hits,
            misses: self.misses,
            reads: self.reads,
            writes: self.writes,
            cache_size: self.cache_size(),
            block_size: self.block_size(),
            num_lines: self.num_lines(),
            write_policy: self.write_policy(),
            #[cfg(feature = "dirty_tracking")]
            write_backs: self.write_backs,
        }
    }

    /// Releases the line storage. Consuming `self` rules out any later use.
    pub fn destroy(self) {
        log::debug!(
            "releasing {} lines ({} valid)",
            self.num_lines(),
            self.valid_lines()
        );
    }
}
