use color_eyre::eyre::Result;

use simple_logger::SimpleLogger;
use toy_cpu::memory::{Memory, SharedMemory};
use toy_cpu::processor::{Instruction, Processor, Program};
use toy_cpu::register::RegisterId::*;

fn main() -> Result<()> {
    color_eyre::install()?; // rust error handling
    SimpleLogger::new().init().unwrap(); // logging

    let memory = SharedMemory::new(Memory::new(256));
    let mut cpu = Processor::with_memory(memory);

    cpu.load_program(Program::new(vec![
        Instruction::load_i(V0, 42),
        Instruction::load_i(V1, 58),
        Instruction::add(V0, V1, V2),
        Instruction::print(V2),
        Instruction::exit(),
    ]));

    cpu.run_program()?;

    Ok(())
}
