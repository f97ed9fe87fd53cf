use crate::error::{Error, Result};
use crate::memory::Word;

/// The call stack. It is a separate address space from [`crate::Memory`] and
/// is only ever indexed through the value of the stack pointer; the stack
/// itself does not know where its top is.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Stack {
    data: Vec<Word>,
}

impl Stack {
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0; size],
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    fn index(&self, index: Word) -> Result<usize> {
        if index < 0 {
            return Err(Error::StackUnderflow { index });
        }
        if index as usize >= self.data.len() {
            return Err(Error::StackOverflow { index });
        }
        Ok(index as usize)
    }

    /// Reads the slot at `index`. Slots above the last push still hold
    /// whatever was written there before.
    pub fn get(&self, index: Word) -> Result<Word> {
        let index = self.index(index)?;
        Ok(self.data[index])
    }

    pub fn set(&mut self, index: Word, value: Word) -> Result<()> {
        let index = self.index(index)?;
        self.data[index] = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use color_eyre::eyre::Result;

    #[test]
    fn test_read_write() -> Result<()> {
        let mut stack = Stack::new(4);
        stack.set(0, 7)?;
        stack.set(3, -7)?;
        assert_eq!(stack.get(0)?, 7);
        assert_eq!(stack.get(3)?, -7);
        assert_eq!(stack.capacity(), 4);

        Ok(())
    }

    #[test]
    fn test_underflow() -> Result<()> {
        let mut stack = Stack::new(4);
        assert_eq!(stack.get(-1), Err(Error::StackUnderflow { index: -1 }));
        assert_eq!(stack.set(-1, 0), Err(Error::StackUnderflow { index: -1 }));

        Ok(())
    }

    #[test]
    fn test_overflow() -> Result<()> {
        let mut stack = Stack::new(4);
        assert_eq!(stack.set(4, 1), Err(Error::StackOverflow { index: 4 }));
        assert_eq!(stack.get(4), Err(Error::StackOverflow { index: 4 }));

        Ok(())
    }

    #[test]
    fn test_stale_values_are_visible() -> Result<()> {
        let mut stack = Stack::new(4);
        stack.set(2, 11)?;
        // nothing tracks how far the stack was filled
        assert_eq!(stack.get(2)?, 11);

        Ok(())
    }
}
