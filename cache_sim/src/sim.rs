use std::io::BufRead;

use thiserror::Error;

use crate::{
    cache::{AccessError, AccessOutcome, DirectMappedCache},
    config::CacheConfig,
    stat::{AddStats, CacheStatistics, Stats},
    trace::{TraceError, TraceOp, TraceReader, TraceRecord},
};

#[derive(Error, Debug)]
pub enum SimError {
    #[error(transparent)]
    Trace(#[from] TraceError),
    #[error("line {line}: {source}")]
    Access {
        line: usize,
        #[source]
        source: AccessError,
    },
}

/// Drives one cache through a trace, strictly in trace order.
pub struct Simulator {
    cache: DirectMappedCache,
    processed: usize,
}

impl Simulator {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            cache: DirectMappedCache::new(config),
            processed: 0,
        }
    }
    pub fn cache(&self) -> &DirectMappedCache {
        &self.cache
    }
    /// number of records applied so far
    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn access(&mut self, op: TraceOp, address: &str) -> Result<AccessOutcome, AccessError> {
        self.cache.access(op.into(), address)
    }

    pub fn apply(&mut self, record: &TraceRecord) -> Result<AccessOutcome, SimError> {
        let outcome = self
            .access(record.op, &record.address)
            .map_err(|source| SimError::Access {
                line: record.line,
                source,
            })?;
        self.processed += 1;
        Ok(outcome)
    }

    /// Applies up to `limit` records (all of them if `None`) and returns how
    /// many were applied. The first bad record stops the run; records before
    /// it stay applied.
    pub fn run<I>(&mut self, records: &mut I, limit: Option<usize>) -> Result<usize, SimError>
    where
        I: Iterator<Item = Result<TraceRecord, TraceError>>,
    {
        let mut applied = 0;
        while limit.map_or(true, |l| applied < l) {
            let Some(record) = records.next() else {
                break;
            };
            let record = record.map_err(|e| {
                log::error!("stopping after {} records: {e}", self.processed);
                e
            })?;
            self.apply(&record)?;
            applied += 1;
        }
        Ok(applied)
    }

    pub fn run_trace(&mut self, reader: impl BufRead) -> Result<usize, SimError> {
        let mut records = TraceReader::new(reader);
        let applied = self.run(&mut records, None)?;
        log::info!("finished trace. {applied} records applied.");
        Ok(applied)
    }

    pub fn statistics(&self) -> CacheStatistics {
        self.cache.statistics()
    }

    pub fn into_statistics(self) -> CacheStatistics {
        let statistics = self.cache.statistics();
        self.cache.destroy();
        statistics
    }

    pub fn destroy(self) {
        self.cache.destroy();
    }

    pub fn collect_stat(&self) -> Stats {
        let mut ss = Stats::default();
        self.add_stats(&mut ss);
        ss
    }
}

impl AddStats for Simulator {
    fn add_stats(&self, buf: &mut Stats) {
        self.cache.add_stats(buf);
    }
}
