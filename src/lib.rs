//! A toy register machine together with the assembler that builds programs
//! for it.
//!
//! ```text
//! source ──▶ Assembler ──▶ Program ──▶ Processor::run_program
//!                                        ├─ Alu
//!                                        ├─ Stack
//!                                        └─ SharedMemory ──▶ memory maps (devices)
//! ```

pub mod alu;
pub mod assembler;
pub mod error;
pub mod memory;
pub mod processor;
pub mod register;
pub mod stack;
pub mod system;
pub mod terminal;

pub use alu::{Alu, AluError, Flags};
pub use assembler::{Assembler, ParseError, ParseErrorKind, Session};
pub use error::{Error, Result};
pub use memory::{MapId, Memory, MemoryMap, SharedMemory, Word};
pub use processor::{Instruction, Opcode, Operands, Processor, Program};
pub use register::{Register, RegisterId, Registers};
pub use stack::Stack;
pub use system::{MachineConfig, System};
pub use terminal::Terminal;
