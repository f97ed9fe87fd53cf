use thiserror::Error;

use crate::assembler::ParseError;
use crate::memory::Word;
use crate::processor::Opcode;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Host-contract violations. These abort the current operation; conditions
/// the guest program can observe (division by zero) are reported through the
/// ALU instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("invalid opcode `{name}` (0x{code:02X})")]
    InvalidOpcode { name: &'static str, code: u8 },

    #[error("out of bounds memory access at address {address}")]
    MemoryOutOfBounds { address: Word },

    #[error("stack overflow at index {index}")]
    StackOverflow { index: Word },

    #[error("stack underflow at index {index}")]
    StackUnderflow { index: Word },

    #[error("bad argument: {0}")]
    BadArgument(String),

    #[error("memory map [{base}, {end}) overlaps a registered map")]
    MemoryMapOverlap { base: Word, end: i64 },

    #[error("memory was accessed again from inside a memory map callback")]
    ReentrantMemoryAccess,

    #[error("cannot run a program until one is loaded")]
    NoProgramLoaded,

    #[error("program counter {pc} is outside of the loaded program ({len} instructions)")]
    ProgramCounterOutOfRange { pc: Word, len: usize },

    #[error(transparent)]
    Assembly(#[from] ParseError),
}

impl Error {
    pub(crate) fn invalid_opcode(opcode: Opcode) -> Self {
        Error::InvalidOpcode {
            name: opcode.mnemonic(),
            code: opcode.into(),
        }
    }
}
