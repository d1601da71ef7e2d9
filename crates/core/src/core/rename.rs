//! Register renaming: the architectural-to-tag mapping and its checkpoints.
//!
//! The rename table maps each architectural register to the tag of its most
//! recent in-flight producer, or `None` when the committed value is current.
//! A [`Checkpoint`] is a cheap copy of that array plus the return-address
//! stack and the load-store queue length, taken at every instruction that
//! can mispredict.

use super::rob::{Rob, RobTag};

/// Recovery snapshot taken at a conditional branch or indirect jump.
#[derive(Clone, Debug)]
pub struct Checkpoint {
    /// The rename table at dispatch. A restored mapping whose producer has
    /// already retired simply reads the committed value, so stale tags are
    /// harmless.
    pub rename: [Option<RobTag>; 32],
    /// Return-address stack contents at fetch, after the instruction's own
    /// push/pop took effect.
    pub ras: Vec<u32>,
    /// Load-store queue length at dispatch.
    pub lsq_len: usize,
}

/// Maps each architectural register to its latest in-flight producer.
pub struct RenameTable {
    map: [Option<RobTag>; 32],
}

impl Default for RenameTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RenameTable {
    /// Creates a table with no pending producers.
    pub fn new() -> Self {
        Self { map: [None; 32] }
    }

    /// Marks `reg` as produced by the entry with `tag`. No-op for x0.
    pub fn set_producer(&mut self, reg: u8, tag: RobTag) {
        if reg != 0 {
            self.map[reg as usize] = Some(tag);
        }
    }

    /// The latest pending producer for `reg`, or `None` when the committed
    /// value is current.
    pub fn producer(&self, reg: u8) -> Option<RobTag> {
        self.map[reg as usize]
    }

    /// Clears the mapping for `reg`, but only if it still points at `tag`.
    /// A retiring instruction must not clear a mapping installed by a newer
    /// rename of the same register.
    pub fn clear_if_match(&mut self, reg: u8, tag: RobTag) {
        if self.map[reg as usize] == Some(tag) {
            self.map[reg as usize] = None;
        }
    }

    /// Clears every mapping.
    pub fn clear_all(&mut self) {
        self.map = [None; 32];
    }

    /// A copy of the table, for checkpoints.
    pub fn snapshot(&self) -> [Option<RobTag>; 32] {
        self.map
    }

    /// Restores the table from a checkpoint.
    pub fn restore(&mut self, saved: &[Option<RobTag>; 32]) {
        self.map = *saved;
    }

    /// Rebuilds the table from the entries surviving a partial flush,
    /// walking oldest to youngest so the latest producer wins.
    pub fn rebuild(&mut self, rob: &Rob) {
        self.clear_all();
        rob.for_each(|entry| {
            if let Some(rd) = entry.rd {
                self.map[rd as usize] = Some(entry.tag);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::instructions::{AluOp, Instruction, Opcode};

    #[test]
    fn test_set_and_get() {
        let mut rt = RenameTable::new();
        rt.set_producer(5, RobTag(7));
        assert_eq!(rt.producer(5), Some(RobTag(7)));
        assert_eq!(rt.producer(6), None);
    }

    #[test]
    fn test_x0_never_renamed() {
        let mut rt = RenameTable::new();
        rt.set_producer(0, RobTag(1));
        assert_eq!(rt.producer(0), None);
    }

    #[test]
    fn test_clear_if_match() {
        let mut rt = RenameTable::new();
        rt.set_producer(3, RobTag(1));
        rt.set_producer(3, RobTag(2));
        // The older producer retires: the newer mapping must survive.
        rt.clear_if_match(3, RobTag(1));
        assert_eq!(rt.producer(3), Some(RobTag(2)));
        rt.clear_if_match(3, RobTag(2));
        assert_eq!(rt.producer(3), None);
    }

    #[test]
    fn test_snapshot_restore() {
        let mut rt = RenameTable::new();
        rt.set_producer(4, RobTag(9));
        let snap = rt.snapshot();
        rt.set_producer(4, RobTag(10));
        rt.set_producer(5, RobTag(11));
        rt.restore(&snap);
        assert_eq!(rt.producer(4), Some(RobTag(9)));
        assert_eq!(rt.producer(5), None);
    }

    #[test]
    fn test_rebuild_latest_wins() {
        let mut rob = Rob::new(8);
        let instr = Instruction { addr: 0, opcode: Opcode::Alu(AluOp::Add), ops: vec![5, 1, 2] };
        let _t1 = rob.allocate(0, instr.clone(), Vec::new(), Some(5), None, None).unwrap();
        let t2 = rob.allocate(4, instr.clone(), Vec::new(), Some(5), None, None).unwrap();
        let t3 = rob.allocate(8, instr, Vec::new(), Some(6), None, None).unwrap();

        let mut rt = RenameTable::new();
        rt.rebuild(&rob);
        assert_eq!(rt.producer(5), Some(t2));
        assert_eq!(rt.producer(6), Some(t3));
        assert_eq!(rt.producer(7), None);
    }
}
