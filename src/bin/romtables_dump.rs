use romtables::codec::{log_canvas, CanvasInspector};
use romtables::{Layout, Rom, RomWithTables};
use log::info;
use std::env;
use std::path::Path;
use std::rc::Rc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <rom.gbc> [--layout layout.toml] [--backgrounds]", args[0]);
        eprintln!();
        eprintln!("Loads every pointer table of the image and prints how much space each uses.");
        eprintln!("--backgrounds renders each background canvas to the debug log (RUST_LOG=debug)");
        std::process::exit(1);
    }

    let mut layout = Layout::default();
    let mut backgrounds = false;
    let mut rest = args[2..].iter();
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--layout" => {
                let path = rest.next().ok_or("--layout needs a file")?;
                layout = Layout::load(Path::new(path))?;
            }
            "--backgrounds" => backgrounds = true,
            other => return Err(format!("Unknown option: {}", other).into()),
        }
    }

    let rom = Rom::load(Path::new(&args[1]))?;
    info!("{} banks", rom.bank_count());
    let inspector: Option<CanvasInspector> = if backgrounds {
        Some(Rc::new(log_canvas))
    } else {
        None
    };
    let tables = RomWithTables::with_inspector(rom, &layout, inspector)?;
    print!("{}", tables);
    Ok(())
}
