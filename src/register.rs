use std::fmt;

use num_enum::IntoPrimitive;

use crate::memory::Word;

/// A named integer cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Register {
    name: &'static str,
    value: Word,
}

impl Register {
    pub fn new(name: &'static str) -> Self {
        Self { name, value: 0 }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn value(&self) -> Word {
        self.value
    }

    pub fn set_value(&mut self, value: Word) {
        self.value = value;
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}

macro_rules! registers {
    ( $( $( #[doc = $doc:expr] )+ $name:ident = $repr:literal , )+ ) => {
        /// Identifies one of the fixed registers of the processor
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[derive(IntoPrimitive)]
        pub enum RegisterId {
            $(
                $( #[doc = $doc] )+
                $name = $repr,
            )+
        }

        impl RegisterId {
            pub const ALL: &'static [Self] = &[
                $( Self::$name , )+
            ];

            pub fn name(&self) -> &'static str {
                match self {
                    $( Self::$name => stringify!($name) , )+
                }
            }
        }
    }
}

registers! {
    /// Program counter. Holds the index of the executing instruction
    PC = 0,
    /// First general purpose register
    V0 = 1,
    /// Second general purpose register
    V1 = 2,
    /// Third general purpose register
    V2 = 3,
    /// Fourth general purpose register
    V3 = 4,
    /// Return address. Callers store the instruction to return to here
    RA = 5,
    /// Stack pointer. Points at the next free stack slot
    SP = 6,
    /// Extra output (remainder) of the last arithmetic instruction
    EX = 7,
    /// Always reads zero, writes are discarded
    ZE = 8,
}

impl RegisterId {
    /// Looks up a register by its case-insensitive name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|id| id.name().eq_ignore_ascii_case(name))
    }

    fn index(self) -> usize {
        u8::from(self) as usize
    }
}

impl fmt::Display for RegisterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The register file of the processor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Registers {
    cells: Vec<Register>,
}

impl Default for Registers {
    fn default() -> Self {
        Self {
            cells: RegisterId::ALL
                .iter()
                .map(|id| Register::new(id.name()))
                .collect(),
        }
    }
}

impl Registers {
    pub fn get(&self, id: RegisterId) -> &Register {
        &self.cells[id.index()]
    }

    pub fn value(&self, id: RegisterId) -> Word {
        self.get(id).value()
    }

    /// Writes `value` into the register. Writes to [`RegisterId::ZE`] are
    /// discarded.
    pub fn set(&mut self, id: RegisterId, value: Word) {
        if id == RegisterId::ZE {
            return;
        }
        self.cells[id.index()].set_value(value);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Register> {
        self.cells.iter()
    }
}
