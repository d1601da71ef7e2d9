//! Fault and assembler error definitions.
//!
//! Two error families exist:
//! 1. **Faults** are produced by executing instructions. They travel with the
//!    instruction through the window and are raised only when it retires;
//!    faults belonging to squashed instructions are silently discarded.
//! 2. **Assembler errors** are raised eagerly while reading a program and are
//!    fatal to the load. Each carries the 1-based source line.

use std::fmt;

use super::word::Word;

/// Execution fault raised when the faulting instruction retires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
    /// A load touched the inaccessible half of the address space.
    ///
    /// The associated value is the effective address. Note that the access
    /// itself still happened: the data was read and the cache line filled
    /// before the fault was flagged.
    LoadAccess(Word),

    /// A store targeted the inaccessible half of the address space.
    ///
    /// The associated value is the effective address. Unlike loads, nothing
    /// is written.
    StoreAccess(Word),

    /// Instruction fetch from an address that is not word-aligned.
    FetchMisaligned(u32),

    /// Instruction fetch from outside the loaded text section.
    FetchOutOfBounds(u32),
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::LoadAccess(addr) => write!(f, "load access fault at {addr}"),
            Fault::StoreAccess(addr) => write!(f, "store access fault at {addr}"),
            Fault::FetchMisaligned(pc) => write!(f, "misaligned fetch at {pc:#x}"),
            Fault::FetchOutOfBounds(pc) => write!(f, "fetch out of bounds at {pc:#x}"),
        }
    }
}

impl std::error::Error for Fault {}

/// Fatal error while parsing or loading a program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AsmError {
    /// Malformed line, operand, or string literal.
    Syntax { line: usize, message: String },
    /// The same label was defined twice.
    DuplicateLabel { line: usize, name: String },
    /// A referenced label was never defined.
    UndefinedLabel { line: usize, name: String },
    /// Label defined in a different section than the reference requires.
    WrongSection { line: usize, name: String, expected: &'static str },
    /// Mnemonic not in the instruction set, or wrong operand count for it.
    UnknownInstruction { line: usize, name: String },
    /// Directive outside the supported (or deliberately ignored) set.
    UnknownDirective { line: usize, name: String },
}

impl AsmError {
    /// The 1-based source line the error refers to.
    pub fn line(&self) -> usize {
        match self {
            AsmError::Syntax { line, .. }
            | AsmError::DuplicateLabel { line, .. }
            | AsmError::UndefinedLabel { line, .. }
            | AsmError::WrongSection { line, .. }
            | AsmError::UnknownInstruction { line, .. }
            | AsmError::UnknownDirective { line, .. } => *line,
        }
    }
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsmError::Syntax { line, message } => write!(f, "line {line}: {message}"),
            AsmError::DuplicateLabel { line, name } => {
                write!(f, "line {line}: duplicate label: {name}")
            }
            AsmError::UndefinedLabel { line, name } => {
                write!(f, "line {line}: undefined label {name}")
            }
            AsmError::WrongSection { line, name, expected } => {
                write!(f, "line {line}: label {name} is not in section {expected}")
            }
            AsmError::UnknownInstruction { line, name } => {
                write!(f, "line {line}: unknown instruction: {name}")
            }
            AsmError::UnknownDirective { line, name } => {
                write!(f, "line {line}: unrecognized directive {name}")
            }
        }
    }
}

impl std::error::Error for AsmError {}

/// Error loading a program from a file: I/O or assembly.
#[derive(Debug)]
pub enum LoadError {
    /// The file could not be read.
    Io(std::io::Error),
    /// The source did not assemble.
    Asm(AsmError),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Io(e) => write!(f, "{e}"),
            LoadError::Asm(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Io(e) => Some(e),
            LoadError::Asm(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for LoadError {
    fn from(e: std::io::Error) -> Self {
        LoadError::Io(e)
    }
}

impl From<AsmError> for LoadError {
    fn from(e: AsmError) -> Self {
        LoadError::Asm(e)
    }
}
