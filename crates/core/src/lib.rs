//! TEEM core: an out-of-order RV32IM emulator with transient execution.
//!
//! This crate implements an educational CPU model built to make transient
//! execution observable:
//! 1. **Engine:** Reorder buffer, register renaming, load-store queue, and
//!    in-order retirement with checkpointed rollback.
//! 2. **Side channel:** A set-associative data cache whose fills from
//!    squashed instructions deliberately survive the squash.
//! 3. **Predictors:** Branch direction counters, a branch target buffer,
//!    and a return address stack: the steering wheels an attacker grabs.
//! 4. **Frontend:** A small assembler for an RV32IM dialect, and the fetch
//!    queue that follows predictions into transient territory.
//! 5. **World:** Three syscalls (`exit`, `write`, `read`), console
//!    buffering, YAML configuration, and read-only inspection snapshots.

/// The assembly dialect: instruction set, parser, disassembler.
pub mod asm;
/// Shared types: words, faults, errors.
pub mod common;
/// Configuration structures and defaults.
pub mod config;
/// The CPU and its cycle loop.
pub mod core;
/// Memory subsystem and data cache.
pub mod mem;
/// Guest/world interface: console and syscalls.
pub mod sys;
/// Read-only engine snapshots.
pub mod trace;
/// Prediction units.
pub mod units;

/// Root configuration type; use `Config::default()` or `Config::from_yaml`.
pub use crate::config::Config;
/// The machine; construct with `Cpu::new`, then `load_program` and `step`.
pub use crate::core::{Cpu, Status};
/// 32-bit machine word.
pub use crate::common::Word;
