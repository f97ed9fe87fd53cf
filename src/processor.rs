use std::fmt;

use log::*;

use crate::alu::{Alu, AluError, Flags};
use crate::error::{Error, Result};
use crate::memory::{SharedMemory, Word};
use crate::register::{Register, RegisterId, Registers};
use crate::stack::Stack;

pub mod instruction;
pub mod program;

pub use instruction::{Instruction, Opcode, Operands};
pub use program::Program;

/// Default number of stack slots
pub const DEFAULT_STACK_SIZE: usize = 1024;

type OutputFn = Box<dyn FnMut(&str)>;

/// Emulates a CPU
///
/// Branches and jumps assign `target - 1` to the program counter; the fetch
/// loop then increments it onto `target`.
pub struct Processor {
    registers: Registers,
    alu: Alu,
    stack: Stack,
    memory: SharedMemory,
    program: Option<Program>,
    output: Option<OutputFn>,
}

impl Processor {
    /// Initializes a new CPU
    /// @param memory The address space the CPU loads from and stores to
    /// @param stack_size Number of stack slots
    pub fn new(memory: SharedMemory, stack_size: usize) -> Self {
        Self {
            registers: Registers::default(),
            alu: Alu::default(),
            stack: Stack::new(stack_size),
            memory,
            program: None,
            output: None,
        }
    }

    /// Initializes a new CPU with [`DEFAULT_STACK_SIZE`] stack slots
    pub fn with_memory(memory: SharedMemory) -> Self {
        Self::new(memory, DEFAULT_STACK_SIZE)
    }

    pub fn register(&self, id: RegisterId) -> &Register {
        self.registers.get(id)
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn reg(&self, id: RegisterId) -> Word {
        self.registers.value(id)
    }

    pub fn set_reg(&mut self, id: RegisterId, value: Word) {
        self.registers.set(id, value);
    }

    pub fn alu(&self) -> &Alu {
        &self.alu
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn memory(&self) -> &SharedMemory {
        &self.memory
    }

    /// Installs the sink that receives the text emitted by `print`. Without
    /// one the text goes to the log.
    pub fn set_output<F>(&mut self, output: F)
    where
        F: FnMut(&str) + 'static,
    {
        self.output = Some(Box::new(output));
    }

    /// Loads the given program into the CPU, replacing the previous one.
    pub fn load_program(&mut self, program: Program) {
        self.program = Some(program);
    }

    pub fn unload_program(&mut self) -> Option<Program> {
        self.program.take()
    }

    pub fn program(&self) -> Option<&Program> {
        self.program.as_ref()
    }

    pub fn program_mut(&mut self) -> Option<&mut Program> {
        self.program.as_mut()
    }

    /// Whether the loaded program has executed `exit`
    pub fn is_finished(&self) -> bool {
        self.program.as_ref().map_or(false, Program::is_finished)
    }

    /// Run the loaded program from its first instruction until it executes
    /// `exit`. A program without `exit` never returns.
    pub fn run_program(&mut self) -> Result<()> {
        let program = self.program.as_mut().ok_or(Error::NoProgramLoaded)?;
        program.set_finished(false);
        self.registers.set(RegisterId::PC, 0);
        self.registers.set(RegisterId::SP, 0);

        let mut steps: u64 = 0;
        while !self.is_finished() {
            self.cycle()?;
            steps += 1;
        }

        info!(
            "Program terminated after {} steps. PC: {}",
            steps,
            self.reg(RegisterId::PC)
        );

        Ok(())
    }

    /// Runs one fetch, execute and increment cycle of the loaded program at
    /// the current program counter. Returns whether the program finished.
    pub fn step(&mut self) -> Result<bool> {
        self.cycle()?;
        Ok(self.is_finished())
    }

    fn cycle(&mut self) -> Result<()> {
        let pc = self.reg(RegisterId::PC);
        let instruction = self.fetch(pc)?;
        debug!("[{}] {}", pc, instruction);
        self.execute(&instruction)?;

        let pc = self.reg(RegisterId::PC).wrapping_add(1);
        self.registers.set(RegisterId::PC, pc);

        Ok(())
    }

    fn fetch(&self, pc: Word) -> Result<Instruction> {
        let program = self.program.as_ref().ok_or(Error::NoProgramLoaded)?;
        let len = program.len();
        if pc < 0 {
            return Err(Error::ProgramCounterOutOfRange { pc, len });
        }
        program
            .get(pc as usize)
            .copied()
            .ok_or(Error::ProgramCounterOutOfRange { pc, len })
    }

    /// Executes a single instruction
    pub fn execute(&mut self, instruction: &Instruction) -> Result<()> {
        use Opcode::*;
        use Operands::{Imm, Reg, RegImm, RegImmReg, RegReg, RegRegImm, RegRegReg};

        let opcode = instruction.opcode();
        match (opcode, instruction.operands()) {
            (NoOp, Operands::None) => {}
            (Exit, Operands::None) => {
                self.program
                    .as_mut()
                    .ok_or(Error::NoProgramLoaded)?
                    .set_finished(true);
            }
            (Print, Reg(a)) => {
                let line = self.register(a).to_string();
                match self.output.as_mut() {
                    Some(output) => output(&line),
                    None => info!("{}", line),
                }
            }
            (Add, RegRegReg(a, b, c))
            | (Sub, RegRegReg(a, b, c))
            | (Mul, RegRegReg(a, b, c))
            | (Div, RegRegReg(a, b, c))
            | (LeftShift, RegRegReg(a, b, c))
            | (RightShift, RegRegReg(a, b, c))
            | (Equal, RegRegReg(a, b, c)) => {
                self.arithmetic(opcode, self.reg(a), self.reg(b), c)?;
            }
            (AddI, RegImmReg(a, imm, b))
            | (SubI, RegImmReg(a, imm, b))
            | (MulI, RegImmReg(a, imm, b))
            | (DivI, RegImmReg(a, imm, b))
            | (LeftShiftI, RegImmReg(a, imm, b))
            | (RightShiftI, RegImmReg(a, imm, b)) => {
                self.arithmetic(opcode, self.reg(a), imm, b)?;
            }
            (LoadI, RegImm(a, imm)) => self.set_reg(a, imm),
            (LoadMem, RegImm(a, address)) => {
                let value = self.memory.get(address)?;
                self.set_reg(a, value);
            }
            (LoadReg, RegReg(a, b)) => {
                let value = self.memory.get(self.reg(b))?;
                self.set_reg(a, value);
            }
            (Move, RegReg(a, b)) => self.set_reg(b, self.reg(a)),
            (StoreMem, RegImm(a, address)) => self.memory.set(address, self.reg(a))?,
            (StoreReg, RegReg(a, b)) => self.memory.set(self.reg(b), self.reg(a))?,
            (Push, Reg(a)) => {
                let sp = self.reg(RegisterId::SP);
                let value = self.reg(a);
                self.stack.set(sp, value)?;
                self.set_reg(RegisterId::SP, sp.wrapping_add(1));
            }
            (Pop, Reg(a)) => {
                let sp = self.reg(RegisterId::SP).wrapping_sub(1);
                let value = self.stack.get(sp)?;
                self.set_reg(RegisterId::SP, sp);
                self.set_reg(a, value);
            }
            (Jump, Imm(target)) => self.jump(target),
            (JumpRegister, Reg(a)) => self.jump(self.reg(a)),
            (BranchOnZero, RegImm(a, target)) => {
                self.branch(self.reg(a), 0, target, |flags| flags.zero())?
            }
            (BranchOnNotZero, RegImm(a, target)) => {
                self.branch(self.reg(a), 0, target, |flags| !flags.zero())?
            }
            (BranchOnEqual, RegRegImm(a, b, target)) => {
                self.branch(self.reg(a), self.reg(b), target, |flags| flags.zero())?
            }
            (BranchOnNotEqual, RegRegImm(a, b, target)) => {
                self.branch(self.reg(a), self.reg(b), target, |flags| !flags.zero())?
            }
            (BranchOnLessThan, RegRegImm(a, b, target)) => {
                self.branch(self.reg(a), self.reg(b), target, |flags| flags.negative())?
            }
            (BranchOnGreaterThan, RegRegImm(a, b, target)) => {
                self.branch(self.reg(a), self.reg(b), target, |flags| flags.positive())?
            }
            (BranchOnLessThanOrEqual, RegRegImm(a, b, target)) => self.branch(
                self.reg(a),
                self.reg(b),
                target,
                |flags| flags.negative() || flags.zero(),
            )?,
            (BranchOnGreaterThanOrEqual, RegRegImm(a, b, target)) => self.branch(
                self.reg(a),
                self.reg(b),
                target,
                |flags| flags.positive() || flags.zero(),
            )?,
            _ => return Err(Error::invalid_opcode(opcode)),
        }

        Ok(())
    }

    /// Runs an arithmetic or logic operation and writes the result into
    /// `dest` and the extra output into EX. On an ALU error both are left
    /// untouched and the guest has to check the ALU itself.
    fn arithmetic(&mut self, opcode: Opcode, a: Word, b: Word, dest: RegisterId) -> Result<()> {
        let out = self.alu.do_op(opcode, a, b)?;
        if self.alu.error() != AluError::None {
            debug!("{} {} {}: {:?}", opcode, a, b, self.alu.error());
            return Ok(());
        }

        self.set_reg(dest, out.result);
        self.set_reg(RegisterId::EX, out.extra);
        debug!("{} {} {}: {}", opcode, a, b, out.result);

        Ok(())
    }

    fn jump(&mut self, target: Word) {
        self.set_reg(RegisterId::PC, target.wrapping_sub(1));
    }

    /// Compares `a` against `b` through the ALU and jumps to `target` if the
    /// resulting flags satisfy `taken`.
    fn branch<F>(&mut self, a: Word, b: Word, target: Word, taken: F) -> Result<()>
    where
        F: FnOnce(Flags) -> bool,
    {
        self.alu.do_op(Opcode::Sub, a, b)?;
        if taken(self.alu.flags()) {
            debug!("branch taken to {}", target);
            self.jump(target);
        }

        Ok(())
    }
}

impl fmt::Debug for Processor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Processor")
            .field("registers", &self.registers)
            .field("alu", &self.alu)
            .field("program", &self.program)
            .finish()
    }
}
