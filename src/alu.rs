use log::*;

use crate::error::{Error, Result};
use crate::memory::Word;
use crate::processor::Opcode;

/// Error state of the last ALU operation. This is visible to the guest
/// program and never aborts execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AluError {
    /// No error occurred
    None,
    /// An attempt to divide by zero was made
    DivisionByZero,
}

/// Observation of the sign of the last successful result. After the first
/// operation exactly one of zero, positive or negative is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flags {
    /// No operation has completed yet
    None,
    Zero,
    Positive,
    Negative,
}

impl Flags {
    fn of(result: Word) -> Self {
        if result == 0 {
            Flags::Zero
        } else if result > 0 {
            Flags::Positive
        } else {
            Flags::Negative
        }
    }

    pub fn zero(&self) -> bool {
        *self == Flags::Zero
    }

    pub fn positive(&self) -> bool {
        *self == Flags::Positive
    }

    pub fn negative(&self) -> bool {
        *self == Flags::Negative
    }
}

/// Output of a single ALU operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AluOutput {
    pub result: Word,
    /// Secondary result, the remainder of a division
    pub extra: Word,
}

/// Emulates an arithmetic logic unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Alu {
    error: AluError,
    flags: Flags,
}

impl Default for Alu {
    fn default() -> Self {
        Self {
            error: AluError::None,
            flags: Flags::None,
        }
    }
}

impl Alu {
    /// The error, if any, of the last call to [`Alu::do_op`]
    pub fn error(&self) -> AluError {
        self.error
    }

    /// Flags of the last successful call to [`Alu::do_op`]
    pub fn flags(&self) -> Flags {
        self.flags
    }

    /// Applies `opcode` to `a` and `b`.
    ///
    /// Register and immediate forms of an operation compute the same thing.
    /// Division by zero sets [`AluError::DivisionByZero`], yields 0 and leaves
    /// the flags as they were.
    ///
    /// # Errors
    ///
    /// Opcodes that are not arithmetic or logic operations fail with
    /// [`Error::InvalidOpcode`].
    pub fn do_op(&mut self, opcode: Opcode, a: Word, b: Word) -> Result<AluOutput> {
        let mut extra = 0;
        let result = match opcode {
            Opcode::Add | Opcode::AddI => a.wrapping_add(b),
            Opcode::Sub | Opcode::SubI => a.wrapping_sub(b),
            Opcode::Mul | Opcode::MulI => a.wrapping_mul(b),
            Opcode::Div | Opcode::DivI => {
                if b == 0 {
                    debug!("ALU division by zero: {} / 0", a);
                    self.error = AluError::DivisionByZero;
                    return Ok(AluOutput {
                        result: 0,
                        extra: 0,
                    });
                }
                extra = a.wrapping_rem(b);
                a.wrapping_div(b)
            }
            Opcode::LeftShift | Opcode::LeftShiftI => a.wrapping_shl(b as u32),
            Opcode::RightShift | Opcode::RightShiftI => a.wrapping_shr(b as u32),
            Opcode::Equal => (a == b) as Word,
            Opcode::NoOp => 0,
            _ => return Err(Error::invalid_opcode(opcode)),
        };

        self.error = AluError::None;
        self.flags = Flags::of(result);

        Ok(AluOutput { result, extra })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use color_eyre::eyre::Result;

    fn result(alu: &mut Alu, opcode: Opcode, a: Word, b: Word) -> Word {
        alu.do_op(opcode, a, b).map(|out| out.result).unwrap_or(Word::MIN)
    }

    #[test]
    fn test_add() -> Result<()> {
        let mut alu = Alu::default();
        assert_eq!(result(&mut alu, Opcode::AddI, 5, 7), 12);
        assert_eq!(result(&mut alu, Opcode::AddI, -5, -7), -12);
        assert_eq!(result(&mut alu, Opcode::Add, -5, 7), 2);
        assert_eq!(result(&mut alu, Opcode::Add, -5, 0), -5);
        assert_eq!(result(&mut alu, Opcode::Add, 0, 0), 0);
        assert_eq!(result(&mut alu, Opcode::Add, Word::MAX, 1), Word::MIN);

        Ok(())
    }

    #[test]
    fn test_sub() -> Result<()> {
        let mut alu = Alu::default();
        assert_eq!(result(&mut alu, Opcode::SubI, 3, 10), -7);
        assert_eq!(result(&mut alu, Opcode::SubI, -3, -10), 7);
        assert_eq!(result(&mut alu, Opcode::Sub, -3, 10), -13);
        assert_eq!(result(&mut alu, Opcode::Sub, -5, 0), -5);
        assert_eq!(result(&mut alu, Opcode::Sub, 0, 0), 0);

        Ok(())
    }

    #[test]
    fn test_mul() -> Result<()> {
        let mut alu = Alu::default();
        assert_eq!(result(&mut alu, Opcode::MulI, 5, 7), 35);
        assert_eq!(result(&mut alu, Opcode::MulI, -5, -7), 35);
        assert_eq!(result(&mut alu, Opcode::Mul, -5, 7), -35);
        assert_eq!(result(&mut alu, Opcode::Mul, -5, 0), 0);

        Ok(())
    }

    #[test]
    fn test_div() -> Result<()> {
        let mut alu = Alu::default();
        for &(a, b) in &[(10, 2), (-10, -2), (-10, 5), (7, 2), (-7, 2), (7, -2), (0, 3)] {
            let out = alu.do_op(Opcode::Div, a, b)?;
            assert_eq!(out.result, a / b);
            assert_eq!(out.extra, a % b);
            assert_eq!(alu.error(), AluError::None);
        }

        let out = alu.do_op(Opcode::DivI, -7, 2)?;
        assert_eq!(out, AluOutput { result: -3, extra: -1 });

        Ok(())
    }

    #[test]
    fn test_div_by_zero_keeps_flags() -> Result<()> {
        let mut alu = Alu::default();
        alu.do_op(Opcode::Sub, 1, 5)?;
        assert_eq!(alu.flags(), Flags::Negative);

        let out = alu.do_op(Opcode::DivI, -5, 0)?;
        assert_eq!(out, AluOutput { result: 0, extra: 0 });
        assert_eq!(alu.error(), AluError::DivisionByZero);
        assert_eq!(alu.flags(), Flags::Negative);

        alu.do_op(Opcode::Div, 0, 0)?;
        assert_eq!(alu.error(), AluError::DivisionByZero);

        // the next successful operation clears the error
        alu.do_op(Opcode::Add, 1, 1)?;
        assert_eq!(alu.error(), AluError::None);

        Ok(())
    }

    #[test]
    fn test_shifts() -> Result<()> {
        let mut alu = Alu::default();
        assert_eq!(result(&mut alu, Opcode::LeftShift, 1, 4), 16);
        assert_eq!(result(&mut alu, Opcode::LeftShiftI, 3, 1), 6);
        assert_eq!(result(&mut alu, Opcode::RightShift, 16, 2), 4);
        assert_eq!(result(&mut alu, Opcode::RightShiftI, -16, 2), -4);
        assert_eq!(alu.do_op(Opcode::LeftShift, 1, 4)?.extra, 0);

        Ok(())
    }

    #[test]
    fn test_equal_and_noop() -> Result<()> {
        let mut alu = Alu::default();
        assert_eq!(result(&mut alu, Opcode::Equal, 4, 4), 1);
        assert_eq!(result(&mut alu, Opcode::Equal, 4, 5), 0);
        assert_eq!(result(&mut alu, Opcode::NoOp, 4, 5), 0);

        Ok(())
    }

    #[test]
    fn test_flags_are_exclusive() -> Result<()> {
        let mut alu = Alu::default();
        assert_eq!(alu.flags(), Flags::None);

        for &(a, b) in &[(3, 3), (5, 3), (3, 5), (Word::MIN, 1)] {
            let out = alu.do_op(Opcode::Sub, a, b)?;
            let flags = alu.flags();
            let set = [flags.zero(), flags.positive(), flags.negative()]
                .iter()
                .filter(|set| **set)
                .count();
            assert_eq!(set, 1);
            assert_eq!(flags.zero(), out.result == 0);
            assert_eq!(flags.positive(), out.result > 0);
            assert_eq!(flags.negative(), out.result < 0);
        }

        Ok(())
    }

    #[test]
    fn test_unsupported_opcode() -> Result<()> {
        let mut alu = Alu::default();
        assert!(matches!(
            alu.do_op(Opcode::Jump, 1, 2),
            Err(Error::InvalidOpcode { name: "jump", .. })
        ));
        assert_eq!(alu.flags(), Flags::None);

        Ok(())
    }
}
