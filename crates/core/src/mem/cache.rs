//! Set-associative data cache.
//!
//! The cache tracks *presence only*: a line is a tag plus a valid bit. Data
//! always comes from backing memory; what the cache provides is the timing
//! difference between a hit and a miss, which is the emulator's observable
//! side channel. It supports:
//! 1. **Probing:** `contains` checks presence without disturbing LRU state.
//! 2. **Access:** `access` touches a line, installing it on a miss.
//! 3. **Flushing:** single-line and whole-cache invalidation.
//!
//! LRU ordering uses a monotonic access counter rather than wall-clock time,
//! keeping the emulator deterministic.

use crate::config::CacheConfig;

/// Cache line entry: tag plus validity, with the access stamp used for LRU.
#[derive(Clone, Copy, Default)]
struct CacheLine {
    tag: u32,
    valid: bool,
    last_use: u64,
}

/// Set-associative cache with LRU replacement.
pub struct DataCache {
    lines: Vec<CacheLine>,
    sets: usize,
    ways: usize,
    line_size: usize,
    /// Monotonic stamp incremented on every touch.
    tick: u64,
}

impl DataCache {
    /// Creates a cache from the given configuration. Zero-sized dimensions
    /// are clamped to one.
    pub fn new(config: &CacheConfig) -> Self {
        let sets = config.sets.max(1);
        let ways = config.ways.max(1);
        let line_size = config.line_size.max(1);
        Self {
            lines: vec![CacheLine::default(); sets * ways],
            sets,
            ways,
            line_size,
            tick: 0,
        }
    }

    /// Number of sets.
    #[inline]
    pub fn sets(&self) -> usize {
        self.sets
    }

    /// Associativity.
    #[inline]
    pub fn ways(&self) -> usize {
        self.ways
    }

    /// Line size in bytes.
    #[inline]
    pub fn line_size(&self) -> usize {
        self.line_size
    }

    fn set_index(&self, addr: u32) -> usize {
        (addr as usize / self.line_size) % self.sets
    }

    fn tag(&self, addr: u32) -> u32 {
        (addr as usize / (self.line_size * self.sets)) as u32
    }

    /// Checks whether the line containing `addr` is present, without
    /// touching replacement state.
    pub fn contains(&self, addr: u32) -> bool {
        let base = self.set_index(addr) * self.ways;
        let tag = self.tag(addr);
        self.lines[base..base + self.ways]
            .iter()
            .any(|l| l.valid && l.tag == tag)
    }

    /// Touches the line containing `addr`, installing it on a miss.
    ///
    /// Returns `true` on a hit. On a miss the least recently used way of the
    /// set is evicted and the new line installed.
    pub fn access(&mut self, addr: u32) -> bool {
        self.tick += 1;
        let base = self.set_index(addr) * self.ways;
        let tag = self.tag(addr);

        for line in &mut self.lines[base..base + self.ways] {
            if line.valid && line.tag == tag {
                line.last_use = self.tick;
                return true;
            }
        }

        // Miss: victimize the LRU way (invalid lines sort first).
        let victim = self.lines[base..base + self.ways]
            .iter()
            .enumerate()
            .min_by_key(|(_, l)| (l.valid, l.last_use))
            .map(|(i, _)| i)
            .unwrap_or(0);
        self.lines[base + victim] = CacheLine { tag, valid: true, last_use: self.tick };
        false
    }

    /// Invalidates the line containing `addr`, if present.
    pub fn flush_line(&mut self, addr: u32) {
        let base = self.set_index(addr) * self.ways;
        let tag = self.tag(addr);
        for line in &mut self.lines[base..base + self.ways] {
            if line.valid && line.tag == tag {
                line.valid = false;
                return;
            }
        }
    }

    /// Invalidates every line.
    pub fn flush_all(&mut self) {
        for line in &mut self.lines {
            line.valid = false;
        }
    }

    /// Iterates over `(set, way, base_address)` of every valid line.
    pub fn occupied_lines(&self) -> impl Iterator<Item = (usize, usize, u32)> + '_ {
        self.lines.iter().enumerate().filter(|(_, l)| l.valid).map(|(i, l)| {
            let set = i / self.ways;
            let way = i % self.ways;
            let base = (l.tag as usize * self.sets + set) * self.line_size;
            (set, way, base as u32)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_cache() -> DataCache {
        DataCache::new(&CacheConfig { sets: 2, ways: 2, line_size: 16, ..Default::default() })
    }

    #[test]
    fn test_miss_then_hit() {
        let mut c = small_cache();
        assert!(!c.contains(0x100));
        assert!(!c.access(0x100));
        assert!(c.contains(0x100));
        assert!(c.access(0x100));
        // Same line, different byte.
        assert!(c.access(0x10f));
    }

    #[test]
    fn test_lru_eviction() {
        let mut c = small_cache();
        // Set 0 holds lines whose (addr / 16) is even: 0x00, 0x40, 0x80.
        c.access(0x00);
        c.access(0x40);
        c.access(0x00); // 0x40 is now LRU
        c.access(0x80); // evicts 0x40
        assert!(c.contains(0x00));
        assert!(!c.contains(0x40));
        assert!(c.contains(0x80));
    }

    #[test]
    fn test_contains_has_no_side_effects() {
        let mut c = small_cache();
        c.access(0x00);
        c.access(0x40);
        // Probing 0x00 must not refresh it.
        for _ in 0..8 {
            assert!(c.contains(0x00));
        }
        c.access(0x80); // LRU is still 0x00
        assert!(!c.contains(0x00));
        assert!(c.contains(0x40));
    }

    #[test]
    fn test_flush_line() {
        let mut c = small_cache();
        c.access(0x100);
        c.flush_line(0x104); // any byte within the line
        assert!(!c.contains(0x100));
    }

    #[test]
    fn test_flush_all() {
        let mut c = small_cache();
        c.access(0x00);
        c.access(0x10);
        c.access(0x20);
        c.flush_all();
        assert_eq!(c.occupied_lines().count(), 0);
    }
}
