use std::fmt;

use crate::error::{Error, Result};

use super::Word;

type SetFn = Box<dyn FnMut(Word, Word)>;
type GetFn = Box<dyn FnMut(Word) -> Word>;

/// A device window in the address space. The map owns no storage itself,
/// reads and writes are handed to the callbacks of whoever registered it.
pub struct MemoryMap {
    base_address: Word,
    length: Word,
    setter: Option<SetFn>,
    getter: Option<GetFn>,
}

impl MemoryMap {
    /// Creates a map covering `[base_address, base_address + length)`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::BadArgument`] if either value is negative.
    pub fn new(base_address: Word, length: Word) -> Result<Self> {
        if base_address < 0 {
            return Err(Error::BadArgument(format!(
                "memory map base address `{}` is negative",
                base_address
            )));
        }
        if length < 0 {
            return Err(Error::BadArgument(format!(
                "memory map length `{}` is negative",
                length
            )));
        }

        Ok(Self {
            base_address,
            length,
            setter: None,
            getter: None,
        })
    }

    /// Installs the callback invoked on writes into this map.
    pub fn with_setter<F>(mut self, setter: F) -> Self
    where
        F: FnMut(Word, Word) + 'static,
    {
        self.setter = Some(Box::new(setter));
        self
    }

    /// Installs the callback invoked on reads from this map.
    pub fn with_getter<F>(mut self, getter: F) -> Self
    where
        F: FnMut(Word) -> Word + 'static,
    {
        self.getter = Some(Box::new(getter));
        self
    }

    pub fn base_address(&self) -> Word {
        self.base_address
    }

    pub fn length(&self) -> Word {
        self.length
    }

    /// One past the last address, widened so `base + length` cannot overflow.
    pub fn end(&self) -> i64 {
        self.base_address as i64 + self.length as i64
    }

    pub fn contains(&self, address: Word) -> bool {
        address >= self.base_address && (address as i64) < self.end()
    }

    pub fn overlaps(&self, other: &MemoryMap) -> bool {
        (self.base_address as i64) < other.end() && (other.base_address as i64) < self.end()
    }

    /// Forwards a write to the setter; a no-op without one.
    pub fn set(&mut self, address: Word, value: Word) {
        if let Some(setter) = self.setter.as_mut() {
            setter(address, value);
        }
    }

    /// Forwards a read to the getter; 0 without one.
    pub fn get(&mut self, address: Word) -> Word {
        match self.getter.as_mut() {
            Some(getter) => getter(address),
            None => 0,
        }
    }
}

impl fmt::Debug for MemoryMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryMap")
            .field("base_address", &self.base_address)
            .field("length", &self.length)
            .field("setter", &self.setter.is_some())
            .field("getter", &self.getter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use color_eyre::eyre::Result;

    #[test]
    fn test_new_rejects_negative_values() -> Result<()> {
        assert!(matches!(
            MemoryMap::new(-1, 1),
            Err(Error::BadArgument(_))
        ));
        assert!(matches!(
            MemoryMap::new(1, -1),
            Err(Error::BadArgument(_))
        ));

        Ok(())
    }

    #[test]
    fn test_new_sets_properties() -> Result<()> {
        let map = MemoryMap::new(10, 20)?;
        assert_eq!(map.base_address(), 10);
        assert_eq!(map.length(), 20);
        assert!(map.contains(10));
        assert!(map.contains(29));
        assert!(!map.contains(30));
        assert!(!map.contains(9));

        Ok(())
    }

    #[test]
    fn test_set_is_invoked() -> Result<()> {
        let seen = Rc::new(Cell::new(None));
        let sink = Rc::clone(&seen);
        let mut map = MemoryMap::new(10, 20)?.with_setter(move |addr, value| {
            sink.set(Some((addr, value)));
        });

        map.set(10, 5);
        assert_eq!(seen.get(), Some((10, 5)));

        Ok(())
    }

    #[test]
    fn test_set_without_setter_does_nothing() -> Result<()> {
        let mut map = MemoryMap::new(10, 20)?;
        map.set(10, 5);

        Ok(())
    }

    #[test]
    fn test_get_is_invoked() -> Result<()> {
        let mut map = MemoryMap::new(10, 20)?.with_getter(|addr| addr + 5);
        assert_eq!(map.get(10), 15);

        Ok(())
    }

    #[test]
    fn test_get_without_getter_returns_zero() -> Result<()> {
        let mut map = MemoryMap::new(10, 20)?;
        assert_eq!(map.get(10), 0);

        Ok(())
    }

    #[test]
    fn test_overlaps() -> Result<()> {
        let a = MemoryMap::new(16, 8)?;
        assert!(a.overlaps(&MemoryMap::new(20, 8)?));
        assert!(a.overlaps(&MemoryMap::new(10, 7)?));
        assert!(!a.overlaps(&MemoryMap::new(24, 8)?));
        assert!(!a.overlaps(&MemoryMap::new(8, 8)?));

        Ok(())
    }
}
