//! Guest/world interface: console buffering and system calls.

/// Console input/output queues.
pub mod console;
/// System call handling.
pub mod syscalls;

pub use console::ConsoleBuffer;
pub use syscalls::{SyscallOutcome, SyscallRecord};
