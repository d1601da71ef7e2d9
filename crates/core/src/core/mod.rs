//! The emulated CPU: all engine state behind a single object.
//!
//! [`Cpu`] owns every piece of machine state (window, rename table,
//! load-store queue, architectural registers, memory, predictors, frontend,
//! console) and exposes one [`Cpu::step`] entry point the driver calls per
//! cycle. The engine never blocks internally; a `read` syscall with no
//! input surfaces as [`Status::NeedInput`] for the driver to satisfy.

/// The cycle loop.
pub mod engine;
/// Fetch queue and prediction capture.
pub mod frontend;
/// Load-store queue.
pub mod lsq;
/// Rename table and checkpoints.
pub mod rename;
/// Reorder buffer.
pub mod rob;

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::debug;

use crate::asm::parser::{assemble, ProgramImage};
use crate::common::{AsmError, Fault, LoadError, Word};
use crate::config::Config;
use crate::mem::Memory;
use crate::sys::{ConsoleBuffer, SyscallRecord};
use crate::units::{BranchPredictor, Btb, ReturnAddressStack};
use engine::{CycleReport, FlushReason};
use frontend::Frontend;
use lsq::LoadStoreQueue;
use rename::RenameTable;
use rob::Rob;

/// What the machine is currently doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// Executing a program.
    Running,
    /// Stopped on an `ebreak`; resume with [`Cpu::resume`].
    Paused,
    /// Blocked on console input; provide some with [`Cpu::provide_input`].
    NeedInput,
    /// The guest called `exit`.
    Halted { exit_code: i32 },
    /// A fault reached retirement.
    Faulted(Fault),
    /// The program ran off the end of its text section.
    Done,
}

/// The whole machine.
pub struct Cpu {
    pub(crate) config: Config,
    pub(crate) rob: Rob,
    pub(crate) rename: RenameTable,
    pub(crate) lsq: LoadStoreQueue,
    pub(crate) regs: [Word; 32],
    pub(crate) mem: Memory,
    pub(crate) bpu: BranchPredictor,
    pub(crate) btb: Btb,
    pub(crate) ras: ReturnAddressStack,
    pub(crate) frontend: Frontend,
    pub(crate) console: ConsoleBuffer,
    pub(crate) cycles: u64,
    pub(crate) status: Status,
    pub(crate) last_flush: Option<FlushReason>,
    pub(crate) last_syscall: Option<SyscallRecord>,
    pub(crate) symbols: HashMap<String, u32>,
}

impl Cpu {
    /// Creates a machine from the configuration, with no program loaded.
    pub fn new(config: &Config) -> Self {
        Self {
            rob: Rob::new(config.engine.rob_depth),
            rename: RenameTable::new(),
            lsq: LoadStoreQueue::new(config.engine.lsq_depth),
            regs: [Word::ZERO; 32],
            mem: Memory::new(config),
            bpu: BranchPredictor::new(
                config.predictor.index_bits,
                config.predictor.init_counter,
                config.predictor.simple,
            ),
            btb: Btb::new(config.predictor.btb_index_bits),
            ras: ReturnAddressStack::new(config.predictor.ras_depth),
            frontend: Frontend::new(Vec::new(), 0, config.engine.fetch_queue),
            console: ConsoleBuffer::new(),
            cycles: 0,
            status: Status::Done,
            last_flush: None,
            last_syscall: None,
            symbols: HashMap::new(),
            config: config.clone(),
        }
    }

    /// Loads a program from an assembly file.
    pub fn load_program_from_file(&mut self, path: impl AsRef<Path>) -> Result<(), LoadError> {
        let source = fs::read_to_string(path)?;
        self.load_program(&source)?;
        Ok(())
    }

    /// Assembles and loads a program, resetting the engine.
    pub fn load_program(&mut self, source: &str) -> Result<(), AsmError> {
        let image = assemble(source)?;
        self.load_image(image);
        Ok(())
    }

    /// Loads an already-assembled program image.
    pub fn load_image(&mut self, image: ProgramImage) {
        self.mem.write_blob(image.data.address, &image.data.bytes);
        self.mem.write_blob(image.text.address, &image.text.bytes);

        self.frontend = Frontend::new(
            image.text.code,
            image.entry_point,
            self.config.engine.fetch_queue,
        );
        self.rob = Rob::new(self.config.engine.rob_depth);
        self.lsq = LoadStoreQueue::new(self.config.engine.lsq_depth);
        self.rename = RenameTable::new();
        self.regs = [Word::ZERO; 32];
        self.regs[2] = Word(self.config.engine.initial_sp);
        self.symbols = image.symbols;
        self.cycles = 0;
        self.status = Status::Running;
        self.last_flush = None;
        self.last_syscall = None;
        debug!(
            "loaded program: entry={:#x} text={:#x} data={:#x}",
            image.entry_point, image.text.address, image.data.address
        );
    }

    /// Advances the machine by one cycle. A no-op unless running.
    pub fn step(&mut self) -> CycleReport {
        if self.status != Status::Running {
            return CycleReport::default();
        }
        let report = engine::step_cycle(self);
        if self.status == Status::Running && self.frontend.is_done() && self.rob.is_empty() {
            self.status = Status::Done;
        }
        report
    }

    /// Resumes after an `ebreak` pause.
    pub fn resume(&mut self) {
        if self.status == Status::Paused {
            self.status = Status::Running;
        }
    }

    /// Queues console input; unblocks a waiting `read`.
    pub fn provide_input(&mut self, data: &[u8]) {
        self.console.add_input(data);
        self.console.need_input = false;
        if self.status == Status::NeedInput {
            self.status = Status::Running;
        }
    }

    /// Extracts queued console output (complete lines unless `flush`).
    pub fn take_output(&mut self, flush: bool) -> Vec<u8> {
        self.console.extract_output(flush)
    }

    /// Whether the guest is blocked waiting for console input.
    pub fn needs_input(&self) -> bool {
        self.console.need_input || self.status == Status::NeedInput
    }

    /// Current status.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Simulated cycles elapsed.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// The architectural register file.
    pub fn regs(&self) -> &[Word; 32] {
        &self.regs
    }

    /// One architectural register.
    pub fn reg(&self, id: u8) -> Word {
        self.regs[id as usize & 31]
    }

    /// The memory subsystem.
    pub fn memory(&self) -> &Memory {
        &self.mem
    }

    /// The memory subsystem, mutably (debugger pokes).
    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.mem
    }

    /// Loaded symbol table.
    pub fn symbols(&self) -> &HashMap<String, u32> {
        &self.symbols
    }

    /// The guest's exit code, once execution has ended. A program that runs
    /// off the end of its text without calling `exit` reports 0.
    pub fn exit_code(&self) -> Option<i32> {
        match self.status {
            Status::Halted { exit_code } => Some(exit_code),
            Status::Done => Some(0),
            _ => None,
        }
    }
}
