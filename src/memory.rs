use std::cell::{RefCell, RefMut};
use std::rc::Rc;

use log::*;

use crate::error::{Error, Result};

pub mod map;

pub use map::MemoryMap;

pub type Word = i32; // 4 bytes

/// Handle of a registered [`MemoryMap`], used to remove it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MapId(usize);

/// Emulates word addressed memory for use with the CPU
///
/// Addresses below the capacity are backed by the primary array. Addresses
/// above it are served by registered memory maps; anything else is out of
/// bounds.
#[derive(Debug)]
pub struct Memory {
    /// The actual data of the primary memory
    data: Vec<Word>,
    maps: Vec<(MapId, MemoryMap)>,
    next_map: usize,
}

impl Memory {
    /// Creates a memory with `size` words of primary memory.
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0; size],
            maps: Vec::new(),
            next_map: 0,
        }
    }

    /// Number of words in primary memory.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    fn primary_index(&self, address: Word) -> Option<usize> {
        if address < 0 {
            return None;
        }
        let index = address as usize;
        if index < self.data.len() {
            Some(index)
        } else {
            None
        }
    }

    fn map_for(&mut self, address: Word) -> Option<&mut MemoryMap> {
        self.maps
            .iter_mut()
            .map(|(_, map)| map)
            .find(|map| map.contains(address))
    }

    /// Reads a word from the memory
    pub fn get(&mut self, address: Word) -> Result<Word> {
        if let Some(index) = self.primary_index(address) {
            return Ok(self.data[index]);
        }

        match self.map_for(address) {
            Some(map) => Ok(map.get(address)),
            None => Err(Error::MemoryOutOfBounds { address }),
        }
    }

    /// Writes a word to the memory
    pub fn set(&mut self, address: Word, value: Word) -> Result<()> {
        if let Some(index) = self.primary_index(address) {
            self.data[index] = value;
            return Ok(());
        }

        match self.map_for(address) {
            Some(map) => {
                map.set(address, value);
                Ok(())
            }
            None => Err(Error::MemoryOutOfBounds { address }),
        }
    }

    /// Registers a device window.
    ///
    /// # Errors
    ///
    /// The map has to start at or above the primary memory and must not
    /// overlap any registered map.
    pub fn add_memory_map(&mut self, map: MemoryMap) -> Result<MapId> {
        if (map.base_address() as usize) < self.data.len() {
            return Err(Error::BadArgument(format!(
                "memory map at `{}` lies inside primary memory of size `{}`",
                map.base_address(),
                self.data.len()
            )));
        }
        if self.maps.iter().any(|(_, other)| other.overlaps(&map)) {
            return Err(Error::MemoryMapOverlap {
                base: map.base_address(),
                end: map.end(),
            });
        }

        let id = MapId(self.next_map);
        self.next_map += 1;
        debug!(
            "Registered memory map [{}, {})",
            map.base_address(),
            map.end()
        );
        self.maps.push((id, map));

        Ok(id)
    }

    /// Unregisters a device window. Unknown ids are ignored.
    pub fn remove_memory_map(&mut self, id: MapId) -> Option<MemoryMap> {
        let position = self.maps.iter().position(|(other, _)| *other == id)?;
        Some(self.maps.remove(position).1)
    }

    pub fn memory_maps(&self) -> impl Iterator<Item = &MemoryMap> {
        self.maps.iter().map(|(_, map)| map)
    }
}

/// Memory shared between the CPU and the devices mapped into it.
///
/// All access goes through a non-reentrant borrow, so a device callback that
/// reaches back into the same memory gets [`Error::ReentrantMemoryAccess`].
#[derive(Debug, Clone)]
pub struct SharedMemory(Rc<RefCell<Memory>>);

impl SharedMemory {
    pub fn new(memory: Memory) -> Self {
        Self(Rc::new(RefCell::new(memory)))
    }

    fn borrow_mut(&self) -> Result<RefMut<'_, Memory>> {
        self.0
            .try_borrow_mut()
            .map_err(|_| Error::ReentrantMemoryAccess)
    }

    pub fn get(&self, address: Word) -> Result<Word> {
        let mut memory = self.borrow_mut()?;
        memory.get(address)
    }

    pub fn set(&self, address: Word, value: Word) -> Result<()> {
        let mut memory = self.borrow_mut()?;
        memory.set(address, value)
    }

    pub fn add_memory_map(&self, map: MemoryMap) -> Result<MapId> {
        let mut memory = self.borrow_mut()?;
        memory.add_memory_map(map)
    }

    pub fn remove_memory_map(&self, id: MapId) -> Result<Option<MemoryMap>> {
        let mut memory = self.borrow_mut()?;
        Ok(memory.remove_memory_map(id))
    }

    /// Runs `f` with exclusive access to the memory.
    pub fn with<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Memory) -> R,
    {
        let mut memory = self.borrow_mut()?;
        Ok(f(&mut memory))
    }
}

impl From<Memory> for SharedMemory {
    fn from(memory: Memory) -> Self {
        Self::new(memory)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use color_eyre::eyre::Result;

    #[test]
    fn test_read_write() -> Result<()> {
        let mut mem = Memory::new(8);
        for i in 0..8 {
            mem.set(i, i * 3)?;
            assert_eq!(mem.get(i)?, i * 3);
        }

        Ok(())
    }

    #[test]
    fn test_out_of_bounds_get() -> Result<()> {
        let mut mem = Memory::new(8);
        assert_eq!(mem.get(-1), Err(Error::MemoryOutOfBounds { address: -1 }));
        assert_eq!(mem.get(8), Err(Error::MemoryOutOfBounds { address: 8 }));

        Ok(())
    }

    #[test]
    fn test_out_of_bounds_set() -> Result<()> {
        let mut mem = Memory::new(8);
        assert_eq!(
            mem.set(-1, 5),
            Err(Error::MemoryOutOfBounds { address: -1 })
        );
        assert_eq!(mem.set(8, 5), Err(Error::MemoryOutOfBounds { address: 8 }));

        Ok(())
    }

    #[test]
    fn test_add_memory_map_inside_primary_memory() -> Result<()> {
        let mut mem = Memory::new(8);
        assert!(matches!(
            mem.add_memory_map(MemoryMap::new(0, 4)?),
            Err(Error::BadArgument(_))
        ));
        assert!(matches!(
            mem.add_memory_map(MemoryMap::new(7, 4)?),
            Err(Error::BadArgument(_))
        ));

        Ok(())
    }

    #[test]
    fn test_add_overlapping_memory_map() -> Result<()> {
        let mut mem = Memory::new(8);
        mem.add_memory_map(MemoryMap::new(16, 8)?)?;
        assert_eq!(
            mem.add_memory_map(MemoryMap::new(20, 8)?).err(),
            Some(Error::MemoryMapOverlap { base: 20, end: 28 })
        );
        mem.add_memory_map(MemoryMap::new(24, 8)?)?;
        assert_eq!(mem.memory_maps().count(), 2);

        Ok(())
    }

    #[test]
    fn test_memory_map_indexing() -> Result<()> {
        let stored = Rc::new(Cell::new(0));
        let setter = Rc::clone(&stored);
        let getter = Rc::clone(&stored);

        let mut mem = Memory::new(8);
        let map = MemoryMap::new(16, 8)?
            .with_setter(move |_, value| setter.set(value))
            .with_getter(move |addr| getter.get() + addr);
        mem.add_memory_map(map)?;

        mem.set(16, 5)?;
        assert_eq!(stored.get(), 5);
        assert_eq!(mem.get(17)?, 22);

        assert!(mem.get(15).is_err());
        assert!(mem.get(24).is_err());
        assert!(mem.set(24, 1).is_err());

        Ok(())
    }

    #[test]
    fn test_remove_memory_map() -> Result<()> {
        let mut mem = Memory::new(8);
        let id = mem.add_memory_map(MemoryMap::new(16, 8)?)?;
        assert_eq!(mem.get(16)?, 0);

        let removed = mem.remove_memory_map(id);
        assert_eq!(removed.map(|map| map.base_address()), Some(16));
        assert!(mem.get(16).is_err());

        // removing twice is a no-op
        assert!(mem.remove_memory_map(id).is_none());

        Ok(())
    }

    #[test]
    fn test_reentrant_access_is_reported() -> Result<()> {
        let shared = SharedMemory::new(Memory::new(8));
        let inner = shared.clone();
        let result = Rc::new(RefCell::new(None));
        let seen = Rc::clone(&result);
        let map = MemoryMap::new(8, 1)?.with_setter(move |_, value| {
            *seen.borrow_mut() = Some(inner.set(0, value));
        });
        shared.add_memory_map(map)?;

        shared.set(8, 3)?;
        assert_eq!(*result.borrow(), Some(Err(Error::ReentrantMemoryAccess)));
        assert_eq!(shared.get(0)?, 0);

        Ok(())
    }
}
