//! Branch Target Buffer (BTB).
//!
//! A direct-mapped table of predicted targets for indirect jumps, keyed and
//! tagged by the jump's program counter. A lookup miss means "we don't know
//! this is a jump"; the frontend then falls through to `pc + 4`.

/// An entry in the Branch Target Buffer.
#[derive(Clone, Copy, Default)]
struct BtbEntry {
    tag: u32,
    target: u32,
    valid: bool,
}

/// Direct-mapped branch target buffer.
pub struct Btb {
    table: Vec<BtbEntry>,
    index_mask: usize,
}

impl Btb {
    /// Creates a BTB with `1 << index_bits` entries.
    pub fn new(index_bits: usize) -> Self {
        let size = 1 << index_bits;
        Self { table: vec![BtbEntry::default(); size], index_mask: size - 1 }
    }

    fn index(&self, pc: u32) -> usize {
        (pc as usize >> 2) & self.index_mask
    }

    /// Predicted target for the jump at `pc`, if one is recorded.
    pub fn lookup(&self, pc: u32) -> Option<u32> {
        let e = self.table[self.index(pc)];
        if e.valid && e.tag == pc { Some(e.target) } else { None }
    }

    /// Records the resolved target of the jump at `pc`.
    pub fn update(&mut self, pc: u32, target: u32) {
        let idx = self.index(pc);
        self.table[idx] = BtbEntry { tag: pc, target, valid: true };
    }

    /// `(pc, target)` of every valid entry, for snapshotting.
    pub fn entries(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.table.iter().filter(|e| e.valid).map(|e| (e.tag, e.target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_miss_then_hit() {
        let mut btb = Btb::new(4);
        assert_eq!(btb.lookup(0x100), None);
        btb.update(0x100, 0x400);
        assert_eq!(btb.lookup(0x100), Some(0x400));
    }

    #[test]
    fn test_tag_mismatch_is_a_miss() {
        let mut btb = Btb::new(4);
        btb.update(0x100, 0x400);
        // 0x100 and 0x140 collide in a 16-entry table but carry distinct tags.
        assert_eq!(btb.lookup(0x140), None);
    }

    #[test]
    fn test_retraining_overwrites() {
        let mut btb = Btb::new(4);
        btb.update(0x100, 0x400);
        btb.update(0x100, 0x800);
        assert_eq!(btb.lookup(0x100), Some(0x800));
    }
}
