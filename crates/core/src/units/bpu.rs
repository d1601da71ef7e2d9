//! Branch direction predictor.
//!
//! A table of 2-bit saturating counters indexed by the program counter.
//! Counter values 2 and 3 predict taken. The predictor is updated when the
//! branch retires, never speculatively. A `simple` mode collapses the table
//! to one global counter shared by every branch.

/// 2-bit saturating counter direction predictor.
pub struct BranchPredictor {
    counters: Vec<u8>,
    index_mask: usize,
    simple: bool,
}

impl BranchPredictor {
    /// Creates a predictor with `1 << index_bits` counters (one counter in
    /// `simple` mode), all initialized to `init_counter`.
    pub fn new(index_bits: usize, init_counter: u8, simple: bool) -> Self {
        let size = if simple { 1 } else { 1 << index_bits };
        Self {
            counters: vec![init_counter.min(3); size],
            index_mask: size - 1,
            simple,
        }
    }

    fn index(&self, pc: u32) -> usize {
        if self.simple { 0 } else { (pc as usize >> 2) & self.index_mask }
    }

    /// Predicts the direction of the branch at `pc`.
    pub fn predict(&self, pc: u32) -> bool {
        self.counters[self.index(pc)] >= 2
    }

    /// Trains the counter for the branch at `pc` with the resolved outcome.
    pub fn update(&mut self, pc: u32, taken: bool) {
        let idx = self.index(pc);
        let c = &mut self.counters[idx];
        if taken {
            *c = (*c + 1).min(3);
        } else {
            *c = c.saturating_sub(1);
        }
    }

    /// The counter table, for snapshotting.
    pub fn counters(&self) -> &[u8] {
        &self.counters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_prediction() {
        let p = BranchPredictor::new(4, 2, false);
        assert!(p.predict(0x100));
        let p = BranchPredictor::new(4, 1, false);
        assert!(!p.predict(0x100));
    }

    #[test]
    fn test_saturation() {
        let mut p = BranchPredictor::new(4, 2, false);
        for _ in 0..10 {
            p.update(0x100, true);
        }
        assert_eq!(p.counters()[p.index(0x100)], 3);
        for _ in 0..10 {
            p.update(0x100, false);
        }
        assert_eq!(p.counters()[p.index(0x100)], 0);
    }

    #[test]
    fn test_hysteresis() {
        let mut p = BranchPredictor::new(4, 3, false);
        p.update(0x100, false);
        // One not-taken from strongly-taken still predicts taken.
        assert!(p.predict(0x100));
        p.update(0x100, false);
        assert!(!p.predict(0x100));
    }

    #[test]
    fn test_indexing_separates_branches() {
        let mut p = BranchPredictor::new(4, 2, false);
        p.update(0x100, false);
        p.update(0x100, false);
        assert!(!p.predict(0x100));
        assert!(p.predict(0x104));
    }

    #[test]
    fn test_simple_mode_shares_state() {
        let mut p = BranchPredictor::new(4, 2, true);
        p.update(0x100, false);
        p.update(0x100, false);
        assert!(!p.predict(0x2000));
    }
}
