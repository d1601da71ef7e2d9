//! Read-only engine snapshots for the inspection views.
//!
//! Everything here copies state out of the engine; nothing can perturb it,
//! so inspecting the machine between cycles never changes what it will do
//! next (the cache in particular is read without touching LRU state).

use crate::asm::disasm::format_instruction;
use crate::core::engine::FlushReason;
use crate::core::lsq::MemKind;
use crate::core::Cpu;
use crate::sys::SyscallRecord;

/// One in-flight instruction, as displayed.
pub struct RobEntryView {
    /// Tag number.
    pub tag: u32,
    /// Program counter.
    pub pc: u32,
    /// Disassembled text.
    pub text: String,
    /// Whether the result is available.
    pub executed: bool,
    /// Result value, when executed.
    pub result: u32,
    /// Pending fault, rendered.
    pub fault: Option<String>,
}

/// Reorder buffer contents, oldest first.
pub struct RobView {
    pub entries: Vec<RobEntryView>,
}

/// One load-store queue slot, as displayed.
pub struct LsqEntryView {
    pub tag: u32,
    /// "load" or "store".
    pub kind: &'static str,
    pub width: u8,
    pub addr: Option<u32>,
    pub value: Option<u32>,
    /// The load has read memory or been forwarded to.
    pub performed: bool,
    /// The load ran ahead of unknown-address stores.
    pub speculative: bool,
}

/// Load-store queue contents, oldest first.
pub struct LsqView {
    pub entries: Vec<LsqEntryView>,
}

/// Data cache occupancy.
pub struct CacheView {
    pub sets: usize,
    pub ways: usize,
    pub line_size: usize,
    /// `(set, way, line base address)` of every valid line.
    pub lines: Vec<(usize, usize, u32)>,
}

/// Predictor state.
pub struct PredictorView {
    /// Direction counters, in table order.
    pub counters: Vec<u8>,
    /// `(pc, target)` of every valid BTB entry.
    pub btb: Vec<(u32, u32)>,
    /// Return address stack, oldest first.
    pub ras: Vec<u32>,
}

impl Cpu {
    /// Snapshot of the reorder buffer.
    pub fn rob_view(&self) -> RobView {
        let mut entries = Vec::new();
        self.rob.for_each(|e| {
            entries.push(RobEntryView {
                tag: e.tag.0,
                pc: e.pc,
                text: format_instruction(&e.instr),
                executed: e.executed,
                result: e.result.value(),
                fault: e.fault.map(|f| f.to_string()),
            });
        });
        RobView { entries }
    }

    /// Snapshot of the load-store queue.
    pub fn lsq_view(&self) -> LsqView {
        let mut entries = Vec::new();
        self.lsq.for_each(|e| {
            let (kind, width) = match e.kind {
                MemKind::Load { width, .. } => ("load", width),
                MemKind::Store { width } => ("store", width),
            };
            entries.push(LsqEntryView {
                tag: e.tag.0,
                kind,
                width,
                addr: e.addr.map(|a| a.value()),
                value: e.value.map(|v| v.value()),
                performed: e.performed,
                speculative: !e.bypassed.is_empty(),
            });
        });
        LsqView { entries }
    }

    /// Snapshot of the data cache.
    pub fn cache_view(&self) -> CacheView {
        let cache = self.mem.cache();
        CacheView {
            sets: cache.sets(),
            ways: cache.ways(),
            line_size: cache.line_size(),
            lines: cache.occupied_lines().collect(),
        }
    }

    /// Snapshot of the predictors.
    pub fn predictor_view(&self) -> PredictorView {
        PredictorView {
            counters: self.bpu.counters().to_vec(),
            btb: self.btb.entries().collect(),
            ras: self.ras.snapshot(),
        }
    }

    /// Program counters sitting in the fetch queue.
    pub fn fetch_queue_view(&self) -> Vec<u32> {
        self.frontend.queued_pcs()
    }

    /// The most recent pipeline flush, if any.
    pub fn last_flush(&self) -> Option<FlushReason> {
        self.last_flush
    }

    /// The most recent syscall, if any.
    pub fn last_syscall(&self) -> Option<SyscallRecord> {
        self.last_syscall
    }
}
