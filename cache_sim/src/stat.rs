use std::fmt;

use serde::Serialize;

use crate::{cache::DirectMappedCache, config::WritePolicy};

pub trait Width {
    fn width_by_chunk_size(chunk_size: usize) -> usize;
    fn chunk_size(max_width: usize) -> usize {
        let mut chunk_size = 2;
        loop {
            if Self::width_by_chunk_size(chunk_size) > max_width {
                break chunk_size - 1;
            }
            chunk_size += 1;
        }
    }
}

pub trait Stat {
    fn view(&self, max_width: usize) -> Box<dyn StatView + '_>;
}

pub trait StatView: fmt::Display {
    /// header of stat
    fn header(&self) -> &'static str;
    /// body width
    fn width(&self) -> usize;
}

pub trait AddStats {
    /// add stat to `buf`.
    fn add_stats(&self, buf: &mut Stats);
}

#[derive(Default)]
pub struct Stats {
    stats: Vec<Box<dyn Stat>>,
}

impl IntoIterator for Stats {
    type Item = Box<dyn Stat>;

    type IntoIter = <Vec<Box<dyn Stat>> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.stats.into_iter()
    }
}

impl Extend<Box<dyn Stat>> for Stats {
    fn extend<T: IntoIterator<Item = Box<dyn Stat>>>(&mut self, iter: T) {
        self.stats.extend(iter)
    }
}

impl Stats {
    pub fn push(&mut self, stat: Box<dyn Stat>) {
        self.stats.push(stat)
    }
    pub fn len(&self) -> usize {
        self.stats.len()
    }
    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }
}

pub struct StatAllView<'s> {
    views: Vec<Box<dyn StatView + 's>>,
}

impl Stats {
    pub fn view(&self, max_width: usize) -> StatAllView<'_> {
        StatAllView {
            views: self.stats.iter().map(|s| s.view(max_width)).collect(),
        }
    }
}

impl fmt::Display for StatAllView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .views
            .iter()
            .map(|s| s.header().len().max(s.width()))
            .max()
            .unwrap_or(0);
        writeln!(f, "{:-^width$}", " statistics ")?;
        for sv in &self.views {
            writeln!(f, "{}:", sv.header())?;
            write!(f, "{}", sv)?;
        }
        write!(f, "{:-<width$}", "")
    }
}

/// Snapshot of the counters and geometry of one cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStatistics {
    pub hits: u64,
    pub misses: u64,
    pub reads: u64,
    pub writes: u64,
    pub cache_size: usize,
    pub block_size: usize,
    pub num_lines: usize,
    pub write_policy: WritePolicy,
    #[cfg(feature = "dirty_tracking")]
    pub write_backs: u64,
}

impl CacheStatistics {
    pub fn accesses(&self) -> u64 {
        self.hits + self.misses
    }
    /// `None` before the first access
    pub fn hit_rate(&self) -> Option<f64> {
        let total = self.accesses();
        (total != 0).then(|| self.hits as f64 / total as f64)
    }
    pub fn miss_rate(&self) -> Option<f64> {
        self.hit_rate().map(|r| 1. - r)
    }
}

fn pct(rate: Option<f64>) -> String {
    match rate {
        Some(r) => format!("{:.6}%", 100. * r),
        None => "-".to_owned(),
    }
}

impl AddStats for DirectMappedCache {
    fn add_stats(&self, buf: &mut Stats) {
        buf.push(Box::new(GeometryStat::of(self)));
        buf.push(Box::new(self.statistics()));
    }
}

impl Stat for CacheStatistics {
    fn view(&self, _: usize) -> Box<dyn StatView + '_> {
        Box::new(CacheStatView { stat: self })
    }
}

pub struct CacheStatView<'a> {
    stat: &'a CacheStatistics,
}

impl StatView for CacheStatView<'_> {
    fn header(&self) -> &'static str {
        "cache stat"
    }
    fn width(&self) -> usize {
        36
    }
}

impl fmt::Display for CacheStatView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.stat;
        let hit_pct = pct(s.hit_rate());
        let miss_pct = pct(s.miss_rate());
        writeln!(f, "         hits: {:>10} ({hit_pct:>10})", s.hits)?;
        writeln!(f, "       misses: {:>10} ({miss_pct:>10})", s.misses)?;
        writeln!(f, "        reads: {:>10}", s.reads)?;
        writeln!(f, "       writes: {:>10}", s.writes)?;
        #[cfg(feature = "dirty_tracking")]
        if s.write_policy == WritePolicy::WriteBack {
            writeln!(f, "  write backs: {:>10}", s.write_backs)?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy)]
pub struct GeometryStat {
    cache_size: usize,
    block_size: usize,
    num_lines: usize,
    valid_lines: usize,
    write_policy: WritePolicy,
}

impl GeometryStat {
    pub fn of(cache: &DirectMappedCache) -> Self {
        Self {
            cache_size: cache.cache_size(),
            block_size: cache.block_size(),
            num_lines: cache.num_lines(),
            valid_lines: cache.valid_lines(),
            write_policy: cache.write_policy(),
        }
    }
}

impl Stat for GeometryStat {
    fn view(&self, _: usize) -> Box<dyn StatView + '_> {
        Box::new(GeometryStatView { stat: self })
    }
}

pub struct GeometryStatView<'a> {
    stat: &'a GeometryStat,
}

impl StatView for GeometryStatView<'_> {
    fn header(&self) -> &'static str {
        "cache geometry"
    }
    fn width(&self) -> usize {
        33
    }
}

impl fmt::Display for GeometryStatView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.stat;
        writeln!(f, "   write policy: {:>14}", s.write_policy.to_string())?;
        writeln!(f, "     cache size: {:>14}", s.cache_size)?;
        writeln!(f, "     block size: {:>14}", s.block_size)?;
        writeln!(f, "          lines: {:>14}", s.num_lines)?;
        writeln!(f, "    valid lines: {:>14}", s.valid_lines)
    }
}

/// Valid lines of a cache, for diagnostics. Reading the cache never mutates it.
pub struct SlotDump {
    entries: Vec<SlotEntry>,
}

struct SlotEntry {
    index: usize,
    tag: u32,
    #[cfg(feature = "dirty_tracking")]
    dirty: bool,
}

impl SlotDump {
    pub fn of(cache: &DirectMappedCache) -> Self {
        let entries = cache
            .slots()
            .filter_map(|(index, slot)| {
                Some(SlotEntry {
                    index,
                    tag: slot.tag()?.value(),
                    #[cfg(feature = "dirty_tracking")]
                    dirty: slot.is_dirty(),
                })
            })
            .collect();
        Self { entries }
    }
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Stat for SlotDump {
    fn view(&self, max_width: usize) -> Box<dyn StatView + '_> {
        Box::new(SlotDumpView::new(self, max_width))
    }
}

pub struct SlotDumpView<'a> {
    dump: &'a SlotDump,
    chunk_size: usize,
}

impl<'a> SlotDumpView<'a> {
    /// `{index:>6}: {tag:#010x}` and a dirty mark
    const ENTRY_WIDTH: usize = 19;

    pub fn new(dump: &'a SlotDump, max_width: usize) -> Self {
        Self {
            dump,
            chunk_size: Self::chunk_size(max_width),
        }
    }
}

impl Width for SlotDumpView<'_> {
    fn width_by_chunk_size(chunk_size: usize) -> usize {
        chunk_size * Self::ENTRY_WIDTH + (chunk_size - 1) * 2 + 2
    }
}

impl StatView for SlotDumpView<'_> {
    fn header(&self) -> &'static str {
        "valid lines (index: tag, `*` marks dirty)"
    }
    fn width(&self) -> usize {
        Self::width_by_chunk_size(self.chunk_size)
    }
}

impl fmt::Display for SlotDumpView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dump.is_empty() {
            return writeln!(f, "  (none)");
        }
        let cells: Vec<_> = self
            .dump
            .entries
            .iter()
            .map(|e| {
                #[cfg(feature = "dirty_tracking")]
                let mark = if e.dirty { '*' } else { ' ' };
                #[cfg(not(feature = "dirty_tracking"))]
                let mark = ' ';
                format!("{:>6}: {:#010x}{mark}", e.index, e.tag)
            })
            .collect();
        for chunk in cells.chunks(self.chunk_size) {
            writeln!(f, "  {}", chunk.join(", ").trim_end())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row<'a>(text: &'a str, key: &str) -> Vec<&'a str> {
        text.lines()
            .find(|l| l.trim_start().starts_with(key))
            .map(|l| l.split_whitespace().collect())
            .unwrap_or_default()
    }

    fn sample() -> DirectMappedCache {
        let mut c = DirectMappedCache::construct(64, 4, WritePolicy::WriteBack).unwrap();
        c.read("0x0").unwrap();
        c.read("0x0").unwrap();
        c.write("0x8").unwrap();
        c.read("0xc").unwrap();
        c
    }

    #[test]
    fn test_rates() {
        let c = DirectMappedCache::construct(64, 4, WritePolicy::WriteThrough).unwrap();
        let s = c.statistics();
        assert_eq!(s.hit_rate(), None);
        assert_eq!(s.miss_rate(), None);
        let s = sample().statistics();
        assert_eq!(s.accesses(), 4);
        assert_eq!(s.hit_rate(), Some(0.25));
        assert_eq!(s.miss_rate(), Some(0.75));
    }

    #[test]
    fn test_stat_view() {
        let c = sample();
        let mut stats = Stats::default();
        c.add_stats(&mut stats);
        stats.push(Box::new(SlotDump::of(&c)));
        assert_eq!(stats.len(), 3);
        let text = stats.view(120).to_string();
        assert!(text.starts_with("-"));
        assert!(text.contains(" statistics "));
        assert_eq!(row(&text, "hits:"), ["hits:", "1", "(25.000000%)"]);
        assert_eq!(row(&text, "misses:"), ["misses:", "3", "(75.000000%)"]);
        assert_eq!(row(&text, "lines:"), ["lines:", "16"]);
        assert_eq!(row(&text, "valid lines:"), ["valid", "lines:", "3"]);
        #[cfg(feature = "dirty_tracking")]
        assert_eq!(row(&text, "write backs:"), ["write", "backs:", "0"]);
        assert!(text.contains("     0: 0x00000000"));
        #[cfg(feature = "dirty_tracking")]
        assert!(text.contains("     2: 0x00000000*"));
    }

    #[test]
    fn test_empty_view() {
        let c = DirectMappedCache::construct(64, 4, WritePolicy::WriteThrough).unwrap();
        let dump = SlotDump::of(&c);
        assert!(dump.is_empty());
        let text = dump.view(80).to_string();
        assert_eq!(text, "  (none)\n");
        let text = c.statistics().view(80).to_string();
        assert_eq!(row(&text, "hits:"), ["hits:", "0", "(", "-)"]);
        assert!(!text.contains("write backs"));
        assert_eq!(Stats::default().view(80).to_string(), " statistics \n");
    }

    #[test]
    fn test_dump_chunks() {
        let mut c = DirectMappedCache::construct(64, 4, WritePolicy::WriteThrough).unwrap();
        for i in 0..16 {
            c.read(&format!("{:x}", i * 4)).unwrap();
        }
        let dump = SlotDump::of(&c);
        assert_eq!(dump.len(), 16);
        let view = SlotDumpView::new(&dump, 50);
        // two entries fit in 50 columns
        assert_eq!(view.chunk_size, 2);
        assert!(view.width() <= 50);
        assert_eq!(view.to_string().lines().count(), 8);
    }

    #[test]
    fn test_json_snapshot() {
        let s = sample().statistics();
        let json = serde_json::to_value(s).unwrap();
        assert_eq!(json["hits"], 1);
        assert_eq!(json["misses"], 3);
        assert_eq!(json["num_lines"], 16);
        assert_eq!(json["write_policy"], "wb");
    }
}
