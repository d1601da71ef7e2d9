//! Load-store queue (LSQ).
//!
//! Memory operations enter the queue at dispatch, in program order, and
//! leave when they retire. The queue decides how each load obtains its
//! value:
//! 1. **Forwarding:** An older store to a fully covering address with a
//!    ready value supplies the load directly.
//! 2. **Waiting:** An overlapping older store whose value is unknown, or a
//!    partial overlap, blocks the load until the store resolves or retires.
//! 3. **Speculative bypass:** Older stores with *unknown addresses* do not
//!    block the load: it reads memory anyway, recording which stores it
//!    bypassed. When such a store's address later resolves to an overlap,
//!    the load (and everything younger) must be squashed: a memory-ordering
//!    misspeculation.

use std::collections::VecDeque;

use crate::common::Word;
use super::rob::RobTag;

/// What kind of memory operation an entry is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemKind {
    Load { width: u8, signed: bool },
    Store { width: u8 },
}

/// A single queue entry.
#[derive(Clone, Debug)]
pub struct LsqEntry {
    /// Tag of the owning instruction.
    pub tag: RobTag,
    /// Load or store, with width.
    pub kind: MemKind,
    /// Effective address, once computed.
    pub addr: Option<Word>,
    /// Store data, once available.
    pub value: Option<Word>,
    /// For loads: the access happened (from memory or by forwarding).
    pub performed: bool,
    /// Unknown-address stores this load speculatively bypassed.
    pub bypassed: Vec<RobTag>,
    /// Store that forwarded its value to this load, if any.
    pub forwarded_from: Option<RobTag>,
}

/// How a load with a known address should proceed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadAction {
    /// Use this value, forwarded from the given store.
    Forward { value: Word, from: RobTag },
    /// Blocked; retry next cycle.
    Wait,
    /// Read memory, noting the unknown-address stores being bypassed
    /// (empty when the path is clean).
    Access { bypassed: Vec<RobTag> },
}

fn overlap(a_start: u32, a_len: u32, b_start: u32, b_len: u32) -> bool {
    let a_end = a_start.wrapping_add(a_len);
    let b_end = b_start.wrapping_add(b_len);
    a_start < b_end && b_start < a_end
}

/// Program-ordered queue of in-flight memory operations.
pub struct LoadStoreQueue {
    entries: VecDeque<LsqEntry>,
    capacity: usize,
}

impl LoadStoreQueue {
    /// Creates a queue with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self { entries: VecDeque::with_capacity(capacity), capacity: capacity.max(1) }
    }

    /// Returns the number of occupied slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the queue is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if the queue is full.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.entries.len() == self.capacity
    }

    /// Appends an operation at dispatch. Returns false when full.
    pub fn push(&mut self, tag: RobTag, kind: MemKind) -> bool {
        if self.is_full() {
            return false;
        }
        self.entries.push_back(LsqEntry {
            tag,
            kind,
            addr: None,
            value: None,
            performed: false,
            bypassed: Vec::new(),
            forwarded_from: None,
        });
        true
    }

    fn index_of(&self, tag: RobTag) -> Option<usize> {
        self.entries.iter().position(|e| e.tag == tag)
    }

    /// The entry owned by `tag`.
    pub fn get(&self, tag: RobTag) -> Option<&LsqEntry> {
        self.entries.iter().find(|e| e.tag == tag)
    }

    /// The entry owned by `tag`, mutably.
    pub fn get_mut(&mut self, tag: RobTag) -> Option<&mut LsqEntry> {
        self.entries.iter_mut().find(|e| e.tag == tag)
    }

    /// Records a resolved effective address.
    pub fn set_addr(&mut self, tag: RobTag, addr: Word) {
        if let Some(entry) = self.get_mut(tag) {
            entry.addr = Some(addr);
        }
    }

    /// Records a store's data value.
    pub fn set_value(&mut self, tag: RobTag, value: Word) {
        if let Some(entry) = self.get_mut(tag) {
            entry.value = Some(value);
        }
    }

    /// Decides how the load owned by `tag` (whose address must be resolved)
    /// obtains its value, scanning older entries newest-to-oldest.
    pub fn probe_load(&self, tag: RobTag) -> LoadAction {
        let Some(idx) = self.index_of(tag) else { return LoadAction::Wait };
        let load = &self.entries[idx];
        let MemKind::Load { width, signed } = load.kind else { return LoadAction::Wait };
        let Some(load_addr) = load.addr else { return LoadAction::Wait };
        let load_width = width as u32;

        let mut bypassed = Vec::new();
        for older in self.entries.iter().take(idx).rev() {
            let MemKind::Store { width: store_width } = older.kind else { continue };
            let Some(store_addr) = older.addr else {
                // Address unknown: it may or may not alias. Proceed to
                // memory speculatively, remembering the hazard.
                bypassed.push(older.tag);
                continue;
            };
            if !overlap(load_addr.value(), load_width, store_addr.value(), store_width as u32) {
                continue;
            }
            // Forwarding requires full coverage, a ready value, and no
            // intervening unknown-address store.
            let covers = store_addr.value() <= load_addr.value()
                && store_addr.value() + store_width as u32
                    >= load_addr.value() + load_width;
            if covers && bypassed.is_empty() {
                if let Some(data) = older.value {
                    let offset = (load_addr.value() - store_addr.value()) as usize;
                    let bytes = data.to_bytes();
                    let value = Word::from_bytes(&bytes[offset..offset + width as usize], signed);
                    return LoadAction::Forward { value, from: older.tag };
                }
            }
            return LoadAction::Wait;
        }

        LoadAction::Access { bypassed }
    }

    /// Marks the load as performed, recording what it bypassed or who
    /// forwarded to it.
    pub fn mark_performed(
        &mut self,
        tag: RobTag,
        bypassed: Vec<RobTag>,
        forwarded_from: Option<RobTag>,
    ) {
        if let Some(entry) = self.get_mut(tag) {
            entry.performed = true;
            entry.bypassed = bypassed;
            entry.forwarded_from = forwarded_from;
        }
    }

    /// After the store owned by `store_tag` resolves its address, finds the
    /// oldest younger load that already read memory past it and overlaps.
    /// That load (and everything younger) must be squashed.
    pub fn alias_victim(&self, store_tag: RobTag, addr: Word, width: u8) -> Option<RobTag> {
        let idx = self.index_of(store_tag)?;
        for younger in self.entries.iter().skip(idx + 1) {
            let MemKind::Load { width: load_width, .. } = younger.kind else { continue };
            if !younger.performed || !younger.bypassed.contains(&store_tag) {
                continue;
            }
            let Some(load_addr) = younger.addr else { continue };
            if overlap(load_addr.value(), load_width as u32, addr.value(), width as u32) {
                return Some(younger.tag);
            }
        }
        None
    }

    /// Removes the entry owned by `tag` (at retirement).
    pub fn remove(&mut self, tag: RobTag) -> Option<LsqEntry> {
        let idx = self.index_of(tag)?;
        self.entries.remove(idx)
    }

    /// Removes the entry owned by `tag` and everything younger.
    pub fn truncate_from(&mut self, tag: RobTag) {
        self.entries.retain(|e| e.tag < tag);
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Visits every entry, oldest first.
    pub fn for_each(&self, f: impl FnMut(&LsqEntry)) {
        self.entries.iter().for_each(f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LW: MemKind = MemKind::Load { width: 4, signed: true };
    const LB: MemKind = MemKind::Load { width: 1, signed: false };
    const SW: MemKind = MemKind::Store { width: 4 };

    #[test]
    fn test_capacity() {
        let mut q = LoadStoreQueue::new(2);
        assert!(q.push(RobTag(1), LW));
        assert!(q.push(RobTag(2), SW));
        assert!(q.is_full());
        assert!(!q.push(RobTag(3), LW));
    }

    #[test]
    fn test_forward_full_coverage() {
        let mut q = LoadStoreQueue::new(8);
        q.push(RobTag(1), SW);
        q.push(RobTag(2), LW);
        q.set_addr(RobTag(1), Word(0x100));
        q.set_value(RobTag(1), Word(0xdead_beef));
        q.set_addr(RobTag(2), Word(0x100));
        assert_eq!(
            q.probe_load(RobTag(2)),
            LoadAction::Forward { value: Word(0xdead_beef), from: RobTag(1) }
        );
    }

    #[test]
    fn test_forward_extracts_subword() {
        let mut q = LoadStoreQueue::new(8);
        q.push(RobTag(1), SW);
        q.push(RobTag(2), LB);
        q.set_addr(RobTag(1), Word(0x100));
        q.set_value(RobTag(1), Word(0xdead_beef));
        q.set_addr(RobTag(2), Word(0x102));
        assert_eq!(
            q.probe_load(RobTag(2)),
            LoadAction::Forward { value: Word(0xad), from: RobTag(1) }
        );
    }

    #[test]
    fn test_wait_on_unready_store_value() {
        let mut q = LoadStoreQueue::new(8);
        q.push(RobTag(1), SW);
        q.push(RobTag(2), LW);
        q.set_addr(RobTag(1), Word(0x100));
        q.set_addr(RobTag(2), Word(0x100));
        assert_eq!(q.probe_load(RobTag(2)), LoadAction::Wait);
    }

    #[test]
    fn test_wait_on_partial_overlap() {
        let mut q = LoadStoreQueue::new(8);
        q.push(RobTag(1), MemKind::Store { width: 1 });
        q.push(RobTag(2), LW);
        q.set_addr(RobTag(1), Word(0x102));
        q.set_value(RobTag(1), Word(0x55));
        q.set_addr(RobTag(2), Word(0x100));
        assert_eq!(q.probe_load(RobTag(2)), LoadAction::Wait);
    }

    #[test]
    fn test_bypass_unknown_store_address() {
        let mut q = LoadStoreQueue::new(8);
        q.push(RobTag(1), SW);
        q.push(RobTag(2), LW);
        q.set_addr(RobTag(2), Word(0x100));
        assert_eq!(q.probe_load(RobTag(2)), LoadAction::Access { bypassed: vec![RobTag(1)] });
    }

    #[test]
    fn test_unknown_store_blocks_forwarding_from_older() {
        let mut q = LoadStoreQueue::new(8);
        q.push(RobTag(1), SW); // older store, ready, same address
        q.push(RobTag(2), SW); // unknown address in between
        q.push(RobTag(3), LW);
        q.set_addr(RobTag(1), Word(0x100));
        q.set_value(RobTag(1), Word(7));
        q.set_addr(RobTag(3), Word(0x100));
        // The intervening unknown store forbids forwarding; the matching
        // older store makes memory stale, so the load must wait.
        assert_eq!(q.probe_load(RobTag(3)), LoadAction::Wait);
    }

    #[test]
    fn test_clean_path_reads_memory() {
        let mut q = LoadStoreQueue::new(8);
        q.push(RobTag(1), SW);
        q.push(RobTag(2), LW);
        q.set_addr(RobTag(1), Word(0x200));
        q.set_value(RobTag(1), Word(1));
        q.set_addr(RobTag(2), Word(0x100));
        assert_eq!(q.probe_load(RobTag(2)), LoadAction::Access { bypassed: vec![] });
    }

    #[test]
    fn test_alias_check_catches_bypassed_load() {
        let mut q = LoadStoreQueue::new(8);
        q.push(RobTag(1), SW);
        q.push(RobTag(2), LW);
        q.set_addr(RobTag(2), Word(0x100));
        q.mark_performed(RobTag(2), vec![RobTag(1)], None);
        // The store resolves to the same address: ordering violation.
        q.set_addr(RobTag(1), Word(0x100));
        assert_eq!(q.alias_victim(RobTag(1), Word(0x100), 4), Some(RobTag(2)));
        // A disjoint address is fine.
        assert_eq!(q.alias_victim(RobTag(1), Word(0x200), 4), None);
    }

    #[test]
    fn test_alias_check_ignores_waiting_loads() {
        let mut q = LoadStoreQueue::new(8);
        q.push(RobTag(1), SW);
        q.push(RobTag(2), LW);
        q.set_addr(RobTag(2), Word(0x100));
        // The load has not performed its access yet.
        q.set_addr(RobTag(1), Word(0x100));
        assert_eq!(q.alias_victim(RobTag(1), Word(0x100), 4), None);
    }

    #[test]
    fn test_truncate_from() {
        let mut q = LoadStoreQueue::new(8);
        q.push(RobTag(1), SW);
        q.push(RobTag(2), LW);
        q.push(RobTag(3), LW);
        q.truncate_from(RobTag(2));
        assert_eq!(q.len(), 1);
        assert!(q.get(RobTag(1)).is_some());
        assert!(q.get(RobTag(2)).is_none());
    }

    #[test]
    fn test_remove() {
        let mut q = LoadStoreQueue::new(8);
        q.push(RobTag(1), SW);
        q.push(RobTag(2), LW);
        let removed = q.remove(RobTag(1)).unwrap();
        assert_eq!(removed.tag, RobTag(1));
        assert_eq!(q.len(), 1);
    }
}
