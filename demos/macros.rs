use color_eyre::eyre::Result;

use simple_logger::SimpleLogger;
use toy_cpu::assembler::Assembler;
use toy_cpu::memory::{Memory, SharedMemory};
use toy_cpu::processor::Processor;

const LIBRARY: &str = r#"
// call a subroutine, the return address goes to ra
#begin call $1
    addi pc 2 ra
    jump $1
#end
#begin ret
    jumpr ra
#end
"#;

const MAIN: &str = r#"
        loadi v0 6
        loadi v1 7
        call multiply
        print v2
        exit

// v2 = v0 * v1 by repeated addition
multiply:
        loadi v2 0
        move v1 v3
again:  boz v3 done
        add v2 v0 v2
        subi v3 1 v3
        jump again
done:   ret
"#;

fn main() -> Result<()> {
    color_eyre::install()?; // rust error handling
    SimpleLogger::new().init().unwrap(); // logging

    let mut assembler = Assembler::new();
    let mut session = assembler.begin();
    session.assemble(LIBRARY)?;
    session.assemble(MAIN)?;
    let program = session.end()?;

    for (i, instruction) in program.instructions().iter().enumerate() {
        println!("{:>3}: {}", i, instruction);
    }

    let mut cpu = Processor::with_memory(SharedMemory::new(Memory::new(256)));
    cpu.load_program(program);
    cpu.run_program()?;

    Ok(())
}
