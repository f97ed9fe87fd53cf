use std::fmt;

use num_enum::IntoPrimitive;

use crate::memory::Word;
use crate::register::RegisterId;

macro_rules! opcodes {
    ( $( $( #[doc = $doc:expr] )+ $name:ident = $repr:literal => $mnemonic:literal , )+ ) => {
        /// Defines the operations of the processor
        /// Every opcode has exactly one operand shape, see [`Instruction`]
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[derive(IntoPrimitive)]
        pub enum Opcode {
            $(
                $( #[doc = $doc] )+
                $name = $repr,
            )+
        }

        impl Opcode {
            pub const ALL: &'static [Self] = &[
                $( Self::$name , )+
            ];

            /// The assembler mnemonic of the opcode
            pub fn mnemonic(&self) -> &'static str {
                match self {
                    $( Self::$name => $mnemonic , )+
                }
            }
        }

        impl ::std::fmt::Display for Opcode {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                match self {
                    $( Self::$name => f.write_str(stringify!($name)) , )+
                }
            }
        }
    }
}

opcodes! {
    /// Placeholder for an instruction that failed to parse. Never executes
    Invalid = 0xFF => "invalid",
    /// No operation
    NoOp = 0x00 => "noop",
    /// Stop the execution of the program
    Exit = 0x01 => "exit",
    /// Emit the name and value of a register
    Print = 0x02 => "print",

    /// `C = A + B`
    Add = 0x10 => "add",
    /// `C = A - B`
    Sub = 0x11 => "sub",
    /// `C = A * B`
    Mul = 0x12 => "mul",
    /// `C = A / B`, `EX = A % B`
    Div = 0x13 => "div",
    /// `C = A << B`
    LeftShift = 0x14 => "ls",
    /// `C = A >> B`
    RightShift = 0x15 => "rs",
    /// `C = 1` if `A == B`, else `0`
    Equal = 0x16 => "equal",

    /// `B = A + immediate`
    AddI = 0x20 => "addi",
    /// `B = A - immediate`
    SubI = 0x21 => "subi",
    /// `B = A * immediate`
    MulI = 0x22 => "muli",
    /// `B = A / immediate`, `EX = A % immediate`
    DivI = 0x23 => "divi",
    /// `B = A << immediate`
    LeftShiftI = 0x24 => "lsi",
    /// `B = A >> immediate`
    RightShiftI = 0x25 => "rsi",

    /// `A = immediate`
    LoadI = 0x30 => "loadi",
    /// `A = memory[immediate]`
    LoadMem = 0x31 => "loadm",
    /// `A = memory[B]`
    LoadReg = 0x32 => "loadr",
    /// `B = A`
    Move = 0x33 => "move",
    /// `memory[immediate] = A`
    StoreMem = 0x34 => "storem",
    /// `memory[B] = A`
    StoreReg = 0x35 => "storer",
    /// `stack[SP] = A; SP += 1`
    Push = 0x36 => "push",
    /// `SP -= 1; A = stack[SP]`
    Pop = 0x37 => "pop",

    /// Jump to an instruction
    /// @param target The index of the instruction to jump to
    Jump = 0x40 => "jump",
    /// Jump to the instruction index held by a register
    JumpRegister = 0x41 => "jumpr",
    /// Branch if `A == 0`
    BranchOnZero = 0x42 => "boz",
    /// Branch if `A != 0`
    BranchOnNotZero = 0x43 => "bonz",
    /// Branch if `A == B`
    BranchOnEqual = 0x44 => "boe",
    /// Branch if `A != B`
    BranchOnNotEqual = 0x45 => "bone",
    /// Branch if `A < B`
    BranchOnLessThan = 0x46 => "bolt",
    /// Branch if `A > B`
    BranchOnGreaterThan = 0x47 => "bogt",
    /// Branch if `A <= B`
    BranchOnLessThanOrEqual = 0x48 => "bolte",
    /// Branch if `A >= B`
    BranchOnGreaterThanOrEqual = 0x49 => "bogte",
}

impl Opcode {
    /// Alternative spellings accepted in source
    const ALIASES: &'static [(&'static str, Self)] = &[("load", Self::LoadI)];

    /// Looks up an opcode by its case-insensitive mnemonic or alias. The
    /// placeholder [`Opcode::Invalid`] cannot be written in source.
    pub fn from_mnemonic(token: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .filter(|opcode| *opcode != Opcode::Invalid)
            .find(|opcode| opcode.mnemonic().eq_ignore_ascii_case(token))
            .or_else(|| {
                Self::ALIASES
                    .iter()
                    .find(|(alias, _)| alias.eq_ignore_ascii_case(token))
                    .map(|(_, opcode)| *opcode)
            })
    }
}

/// Operands of an instruction. Branch targets are carried as immediates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operands {
    None,
    Reg(RegisterId),
    Imm(Word),
    RegImm(RegisterId, Word),
    RegReg(RegisterId, RegisterId),
    RegRegReg(RegisterId, RegisterId, RegisterId),
    RegImmReg(RegisterId, Word, RegisterId),
    RegRegImm(RegisterId, RegisterId, Word),
}

/// A single processor instruction.
///
/// Instructions can only be built through the constructor matching their
/// opcode, so the operands always have the shape the opcode expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction {
    opcode: Opcode,
    operands: Operands,
}

macro_rules! constructors {
    ( $( $fn_name:ident => $opcode:ident ( $( $arg:ident : $ty:ty ),* ) => $operands:expr ; )+ ) => {
        impl Instruction {
            $(
                pub fn $fn_name( $( $arg : $ty ),* ) -> Self {
                    Self {
                        opcode: Opcode::$opcode,
                        operands: $operands,
                    }
                }
            )+
        }
    };
}

constructors! {
    invalid => Invalid() => Operands::None;
    noop => NoOp() => Operands::None;
    exit => Exit() => Operands::None;
    print => Print(a: RegisterId) => Operands::Reg(a);

    add => Add(a: RegisterId, b: RegisterId, c: RegisterId) => Operands::RegRegReg(a, b, c);
    sub => Sub(a: RegisterId, b: RegisterId, c: RegisterId) => Operands::RegRegReg(a, b, c);
    mul => Mul(a: RegisterId, b: RegisterId, c: RegisterId) => Operands::RegRegReg(a, b, c);
    div => Div(a: RegisterId, b: RegisterId, c: RegisterId) => Operands::RegRegReg(a, b, c);
    left_shift => LeftShift(source: RegisterId, amount: RegisterId, target: RegisterId) => Operands::RegRegReg(source, amount, target);
    right_shift => RightShift(source: RegisterId, amount: RegisterId, target: RegisterId) => Operands::RegRegReg(source, amount, target);
    equal => Equal(a: RegisterId, b: RegisterId, c: RegisterId) => Operands::RegRegReg(a, b, c);

    add_i => AddI(a: RegisterId, immediate: Word, target: RegisterId) => Operands::RegImmReg(a, immediate, target);
    sub_i => SubI(a: RegisterId, immediate: Word, target: RegisterId) => Operands::RegImmReg(a, immediate, target);
    mul_i => MulI(a: RegisterId, immediate: Word, target: RegisterId) => Operands::RegImmReg(a, immediate, target);
    div_i => DivI(a: RegisterId, immediate: Word, target: RegisterId) => Operands::RegImmReg(a, immediate, target);
    left_shift_i => LeftShiftI(source: RegisterId, amount: Word, target: RegisterId) => Operands::RegImmReg(source, amount, target);
    right_shift_i => RightShiftI(source: RegisterId, amount: Word, target: RegisterId) => Operands::RegImmReg(source, amount, target);

    load_i => LoadI(dest: RegisterId, immediate: Word) => Operands::RegImm(dest, immediate);
    load_mem => LoadMem(dest: RegisterId, address: Word) => Operands::RegImm(dest, address);
    load_reg => LoadReg(dest: RegisterId, address: RegisterId) => Operands::RegReg(dest, address);
    move_reg => Move(source: RegisterId, dest: RegisterId) => Operands::RegReg(source, dest);
    store_mem => StoreMem(source: RegisterId, address: Word) => Operands::RegImm(source, address);
    store_reg => StoreReg(source: RegisterId, address: RegisterId) => Operands::RegReg(source, address);
    push => Push(source: RegisterId) => Operands::Reg(source);
    pop => Pop(target: RegisterId) => Operands::Reg(target);

    jump => Jump(target: Word) => Operands::Imm(target);
    jump_register => JumpRegister(target: RegisterId) => Operands::Reg(target);
    branch_on_zero => BranchOnZero(a: RegisterId, target: Word) => Operands::RegImm(a, target);
    branch_on_not_zero => BranchOnNotZero(a: RegisterId, target: Word) => Operands::RegImm(a, target);
    branch_on_equal => BranchOnEqual(a: RegisterId, b: RegisterId, target: Word) => Operands::RegRegImm(a, b, target);
    branch_on_not_equal => BranchOnNotEqual(a: RegisterId, b: RegisterId, target: Word) => Operands::RegRegImm(a, b, target);
    branch_on_less_than => BranchOnLessThan(a: RegisterId, b: RegisterId, target: Word) => Operands::RegRegImm(a, b, target);
    branch_on_greater_than => BranchOnGreaterThan(a: RegisterId, b: RegisterId, target: Word) => Operands::RegRegImm(a, b, target);
    branch_on_less_than_or_equal => BranchOnLessThanOrEqual(a: RegisterId, b: RegisterId, target: Word) => Operands::RegRegImm(a, b, target);
    branch_on_greater_than_or_equal => BranchOnGreaterThanOrEqual(a: RegisterId, b: RegisterId, target: Word) => Operands::RegRegImm(a, b, target);
}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn operands(&self) -> Operands {
        self.operands
    }

    /// The immediate value of the instruction, 0 if it has none.
    pub fn immediate(&self) -> Word {
        match self.operands {
            Operands::Imm(imm)
            | Operands::RegImm(_, imm)
            | Operands::RegImmReg(_, imm, _)
            | Operands::RegRegImm(_, _, imm) => imm,
            _ => 0,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.opcode.mnemonic())?;
        match self.operands {
            Operands::None => Ok(()),
            Operands::Reg(a) => write!(f, " {}", a),
            Operands::Imm(imm) => write!(f, " {}", imm),
            Operands::RegImm(a, imm) => write!(f, " {} {}", a, imm),
            Operands::RegReg(a, b) => write!(f, " {} {}", a, b),
            Operands::RegRegReg(a, b, c) => write!(f, " {} {} {}", a, b, c),
            Operands::RegImmReg(a, imm, b) => write!(f, " {} {} {}", a, imm, b),
            Operands::RegRegImm(a, b, imm) => write!(f, " {} {} {}", a, b, imm),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use color_eyre::eyre::Result;
    use crate::register::RegisterId::*;

    #[test]
    fn test_three_register_constructors() -> Result<()> {
        let cases = [
            (Instruction::add(V0, V1, V2), Opcode::Add),
            (Instruction::sub(V0, V1, V2), Opcode::Sub),
            (Instruction::mul(V0, V1, V2), Opcode::Mul),
            (Instruction::div(V0, V1, V2), Opcode::Div),
            (Instruction::equal(V0, V1, V2), Opcode::Equal),
        ];
        for (instr, opcode) in cases.iter() {
            assert_eq!(instr.opcode(), *opcode);
            assert_eq!(instr.operands(), Operands::RegRegReg(V0, V1, V2));
            assert_eq!(instr.immediate(), 0);
        }

        Ok(())
    }

    #[test]
    fn test_immediate_constructors() -> Result<()> {
        let instr = Instruction::load_i(V0, 10);
        assert_eq!(instr.opcode(), Opcode::LoadI);
        assert_eq!(instr.operands(), Operands::RegImm(V0, 10));
        assert_eq!(instr.immediate(), 10);

        let instr = Instruction::add_i(V1, -3, V2);
        assert_eq!(instr.operands(), Operands::RegImmReg(V1, -3, V2));
        assert_eq!(instr.immediate(), -3);

        Ok(())
    }

    #[test]
    fn test_branch_constructors() -> Result<()> {
        let instr = Instruction::jump(5);
        assert_eq!(instr.opcode(), Opcode::Jump);
        assert_eq!(instr.operands(), Operands::Imm(5));

        let instr = Instruction::branch_on_zero(V0, 7);
        assert_eq!(instr.opcode(), Opcode::BranchOnZero);
        assert_eq!(instr.operands(), Operands::RegImm(V0, 7));

        let instr = Instruction::branch_on_equal(V0, V1, 7);
        assert_eq!(instr.opcode(), Opcode::BranchOnEqual);
        assert_eq!(instr.operands(), Operands::RegRegImm(V0, V1, 7));

        Ok(())
    }

    #[test]
    fn test_operandless_constructors() -> Result<()> {
        assert_eq!(Instruction::noop().operands(), Operands::None);
        assert_eq!(Instruction::exit().opcode(), Opcode::Exit);
        assert_eq!(Instruction::invalid().opcode(), Opcode::Invalid);

        Ok(())
    }

    #[test]
    fn test_mnemonics() -> Result<()> {
        assert_eq!(Opcode::from_mnemonic("ADDI"), Some(Opcode::AddI));
        assert_eq!(
            Opcode::from_mnemonic("bogte"),
            Some(Opcode::BranchOnGreaterThanOrEqual)
        );
        assert_eq!(Opcode::from_mnemonic("invalid"), None);
        assert_eq!(Opcode::from_mnemonic("load"), Some(Opcode::LoadI));
        assert_eq!(Opcode::from_mnemonic("LOAD"), Some(Opcode::LoadI));
        assert_eq!(Opcode::from_mnemonic("loadx"), None);

        for opcode in Opcode::ALL.iter().filter(|op| **op != Opcode::Invalid) {
            assert_eq!(Opcode::from_mnemonic(opcode.mnemonic()), Some(*opcode));
        }

        Ok(())
    }

    #[test]
    fn test_display() -> Result<()> {
        assert_eq!(Instruction::add(V0, V1, V2).to_string(), "add V0 V1 V2");
        assert_eq!(Instruction::sub_i(V0, 4, RA).to_string(), "subi V0 4 RA");
        assert_eq!(Instruction::exit().to_string(), "exit");

        Ok(())
    }
}
