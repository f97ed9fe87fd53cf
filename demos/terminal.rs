use color_eyre::eyre::Result;

use log::LevelFilter;
use simple_logger::SimpleLogger;
use toy_cpu::system::{MachineConfig, System};

const HELLO: &str = r#"
#begin putc $1
    loadi v0 $1
    storem v0 65536
#end
        putc 72
        putc 101
        putc 108
        putc 108
        putc 111
        putc 0x0a
        exit
"#;

fn main() -> Result<()> {
    color_eyre::install()?; // rust error handling
    SimpleLogger::new()
        .with_level(LevelFilter::Warn)
        .init()
        .unwrap(); // logging

    let mut system = System::new(MachineConfig::default())?;
    system.run_source(HELLO)?;

    Ok(())
}
