//! A ready to use machine: primary memory, a terminal, a CPU and an assembler.

use log::*;

use crate::assembler::Assembler;
use crate::error::Result;
use crate::memory::{MapId, Memory, SharedMemory, Word};
use crate::processor::{Processor, DEFAULT_STACK_SIZE};
use crate::terminal::Terminal;

/// Machine constants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MachineConfig {
    /// Words of primary memory
    pub memory_size: usize,
    /// Stack slots of the CPU
    pub stack_size: usize,
    /// First address of the terminal window, at or above `memory_size`
    pub terminal_base: Word,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            memory_size: 65536,
            stack_size: DEFAULT_STACK_SIZE,
            terminal_base: 65536,
        }
    }
}

pub struct System {
    config: MachineConfig,
    memory: SharedMemory,
    terminal: MapId,
    cpu: Processor,
    assembler: Assembler,
}

impl System {
    /// Builds a machine whose terminal prints to standard output.
    pub fn new(config: MachineConfig) -> Result<Self> {
        Self::with_terminal_sink(config, Terminal::stdout_sink())
    }

    /// Builds a machine whose terminal sends its characters to `sink`.
    ///
    /// # Errors
    ///
    /// Fails if the terminal window does not fit above primary memory.
    pub fn with_terminal_sink<F>(config: MachineConfig, sink: F) -> Result<Self>
    where
        F: FnMut(char) + 'static,
    {
        let memory = SharedMemory::new(Memory::new(config.memory_size));
        let terminal = Terminal::new(config.terminal_base).attach(&memory, sink)?;
        let cpu = Processor::new(memory.clone(), config.stack_size);

        info!(
            "System ready: {} words of memory, {} stack slots, terminal at {}",
            config.memory_size, config.stack_size, config.terminal_base
        );

        Ok(Self {
            config,
            memory,
            terminal,
            cpu,
            assembler: Assembler::new(),
        })
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn memory(&self) -> &SharedMemory {
        &self.memory
    }

    /// Handle of the terminal's memory map
    pub fn terminal(&self) -> MapId {
        self.terminal
    }

    pub fn cpu(&self) -> &Processor {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Processor {
        &mut self.cpu
    }

    pub fn assembler_mut(&mut self) -> &mut Assembler {
        &mut self.assembler
    }

    /// Assembles `source`, loads it onto the CPU and runs it to completion.
    pub fn run_source(&mut self, source: &str) -> Result<()> {
        let program = self.assembler.assemble(source)?;
        self.cpu.load_program(program);
        self.cpu.run_program()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::assembler::ParseErrorKind;
    use crate::error::Error;
    use crate::register::RegisterId::*;
    use color_eyre::eyre::Result;

    fn system() -> Result<(System, Rc<RefCell<String>>)> {
        let out = Rc::new(RefCell::new(String::new()));
        let sink = {
            let out = Rc::clone(&out);
            move |c: char| out.borrow_mut().push(c)
        };
        let system = System::with_terminal_sink(MachineConfig::default(), sink)?;
        Ok((system, out))
    }

    #[test]
    fn test_default_config() -> Result<()> {
        let config = MachineConfig::default();
        assert_eq!(config.memory_size, 65536);
        assert_eq!(config.stack_size, 1024);
        assert_eq!(config.terminal_base, 65536);

        let (system, _) = system()?;
        assert_eq!(system.memory().with(|memory| memory.capacity())?, 65536);
        assert_eq!(system.cpu().stack().capacity(), 1024);

        Ok(())
    }

    #[test]
    fn test_hello() -> Result<()> {
        let (mut system, out) = system()?;
        system.run_source(
            r#"
            #begin putc $1
                loadi v0 $1
                storem v0 65536
            #end
                putc 72
                putc 105
                putc 0x0a
                exit
            "#,
        )?;

        assert_eq!(out.borrow().as_str(), "Hi\n");

        Ok(())
    }

    #[test]
    fn test_countdown() -> Result<()> {
        let (mut system, _) = system()?;
        system.run_source(
            r#"
                    loadi v0 10
                    loadi v1 0
            loop:   add v1 v0 v1
                    subi v0 1 v0
                    bogt v0 ze loop
                    storem v1 100
                    exit
            "#,
        )?;

        assert_eq!(system.cpu().reg(V1), 55);
        assert_eq!(system.memory().get(100)?, 55);

        Ok(())
    }

    #[test]
    fn test_run_twice() -> Result<()> {
        let (mut system, _) = system()?;
        system.run_source("loadi v0 1\nexit")?;
        system.run_source("addi v0 1 v0\nexit")?;
        assert_eq!(system.cpu().reg(V0), 2);

        Ok(())
    }

    #[test]
    fn test_assembly_error() -> Result<()> {
        let (mut system, _) = system()?;
        let result = system.run_source("loadi v0 1\njump missing");
        match result {
            Err(Error::Assembly(err)) => {
                assert_eq!(err.kind(), ParseErrorKind::UnresolvedLabel);
                assert_eq!(err.line_nr(), 2);
            }
            other => panic!("expected an assembly error, got {:?}", other),
        }

        Ok(())
    }

    #[test]
    fn test_terminal_inside_memory() -> Result<()> {
        let config = MachineConfig {
            terminal_base: 100,
            ..MachineConfig::default()
        };
        assert!(matches!(
            System::with_terminal_sink(config, |_| {}),
            Err(Error::BadArgument(_))
        ));

        Ok(())
    }
}
