use std::convert::TryFrom;
use std::io::{self, Write};

use log::*;

use crate::error::Result;
use crate::memory::{MapId, MemoryMap, SharedMemory, Word};

/// Number of addresses the terminal occupies
pub const TERMINAL_WINDOW: Word = 16;

/// A character output device.
///
/// Writing a value to the base address emits it as a character. The rest of
/// the window is reserved; writes there are ignored and every read yields 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Terminal {
    base_address: Word,
}

impl Terminal {
    pub fn new(base_address: Word) -> Self {
        Self { base_address }
    }

    pub fn base_address(&self) -> Word {
        self.base_address
    }

    /// Builds the memory map for this terminal, sending characters to `sink`.
    pub fn memory_map<F>(&self, mut sink: F) -> Result<MemoryMap>
    where
        F: FnMut(char) + 'static,
    {
        let base = self.base_address;
        let map = MemoryMap::new(base, TERMINAL_WINDOW)?
            .with_setter(move |address, value| {
                if address != base {
                    return;
                }
                match u32::try_from(value).ok().and_then(char::from_u32) {
                    Some(c) => sink(c),
                    None => warn!("Terminal dropped `{}`, not a character", value),
                }
            })
            .with_getter(|_| 0);

        Ok(map)
    }

    /// Maps the terminal into `memory`.
    ///
    /// # Errors
    ///
    /// Fails if the window lies inside primary memory or overlaps another
    /// map.
    pub fn attach<F>(&self, memory: &SharedMemory, sink: F) -> Result<MapId>
    where
        F: FnMut(char) + 'static,
    {
        let id = memory.add_memory_map(self.memory_map(sink)?)?;
        debug!(
            "Terminal attached at [{}, {})",
            self.base_address,
            self.base_address as i64 + TERMINAL_WINDOW as i64
        );
        Ok(id)
    }

    /// A sink that writes every character to standard output.
    pub fn stdout_sink() -> impl FnMut(char) {
        |c: char| {
            let mut stdout = io::stdout();
            if let Err(err) = write!(stdout, "{}", c).and_then(|_| stdout.flush()) {
                error!("Terminal failed to write to stdout: {}", err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::error::Error;
    use crate::memory::Memory;
    use color_eyre::eyre::Result;

    fn capture() -> (Rc<RefCell<String>>, impl FnMut(char)) {
        let out = Rc::new(RefCell::new(String::new()));
        let sink = {
            let out = Rc::clone(&out);
            move |c: char| out.borrow_mut().push(c)
        };
        (out, sink)
    }

    #[test]
    fn test_write_emits_characters() -> Result<()> {
        let memory = SharedMemory::new(Memory::new(16));
        let (out, sink) = capture();
        Terminal::new(16).attach(&memory, sink)?;

        for c in "hi!\n".chars() {
            memory.set(16, c as Word)?;
        }
        assert_eq!(out.borrow().as_str(), "hi!\n");

        Ok(())
    }

    #[test]
    fn test_rest_of_window() -> Result<()> {
        let memory = SharedMemory::new(Memory::new(16));
        let (out, sink) = capture();
        Terminal::new(16).attach(&memory, sink)?;

        memory.set(17, 'x' as Word)?;
        memory.set(31, 'y' as Word)?;
        // not a character
        memory.set(16, -1)?;
        assert!(out.borrow().is_empty());

        assert_eq!(memory.get(16)?, 0);
        assert_eq!(memory.get(31)?, 0);
        assert_eq!(memory.get(32), Err(Error::MemoryOutOfBounds { address: 32 }));

        Ok(())
    }

    #[test]
    fn test_attach_inside_primary_memory() -> Result<()> {
        let memory = SharedMemory::new(Memory::new(16));
        let result = Terminal::new(8).attach(&memory, |_| {});
        assert!(matches!(result, Err(Error::BadArgument(_))));

        Ok(())
    }

    #[test]
    fn test_attach_twice() -> Result<()> {
        let memory = SharedMemory::new(Memory::new(16));
        Terminal::new(16).attach(&memory, |_| {})?;
        let result = Terminal::new(20).attach(&memory, |_| {});
        assert!(matches!(result, Err(Error::MemoryMapOverlap { .. })));

        Ok(())
    }
}
