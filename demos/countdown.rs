use color_eyre::eyre::Result;

use log::LevelFilter;
use simple_logger::SimpleLogger;
use toy_cpu::assembler::Assembler;
use toy_cpu::memory::{Memory, SharedMemory};
use toy_cpu::processor::Processor;

fn main() -> Result<()> {
    color_eyre::install()?; // rust error handling
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .init()
        .unwrap(); // logging

    let source = std::fs::read_to_string("demos/programs/countdown.asm")?;
    let program = Assembler::new().assemble(&source)?;

    let memory = SharedMemory::new(Memory::new(256));
    let mut cpu = Processor::with_memory(memory.clone());
    cpu.set_output(|line| println!("{}", line));
    cpu.load_program(program);

    cpu.run_program()?;
    println!("memory[0] = {}", memory.get(0)?);

    Ok(())
}
