//! LC-3 VM - CLI Entry Point
//!
//! Commands:
//! - `lc3-vm run <image>...` - Run object images until HALT
//! - `lc3-vm debug <image>...` - Interactive debugger
//! - `lc3-vm dump <image>...` - Show what would be loaded, without running

use clap::{Args, Parser, Subcommand};
use lc3::{Cpu, CpuState, DumpFormat, Image, Memory, Registers, RunConfig, ScriptedConsole, TerminalConsole};
use lc3::console::Console;
use lc3::cpu::{decode, PcOverflow};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "lc3-vm")]
#[command(version)]
#[command(about = "A virtual machine for the LC-3 16-bit teaching architecture")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program until it halts
    Run(RunArgs),
    /// Interactive debugger
    #[cfg(feature = "tui")]
    Debug {
        /// Object images to load, in order
        #[arg(required = true)]
        images: Vec<PathBuf>,
        /// Start address (defaults to the first image's origin)
        #[arg(short, long, value_parser = parse_addr)]
        entry: Option<u16>,
    },
    /// Load images and print the initial machine state
    Dump {
        /// Object images to load, in order
        #[arg(required = true)]
        images: Vec<PathBuf>,
        /// Also list up to N loaded words of each image, disassembled
        #[arg(short, long, value_name = "N")]
        words: Option<usize>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Object images to load, in order
    #[arg(required = true)]
    images: Vec<PathBuf>,
    /// Start address (defaults to the first image's origin)
    #[arg(short, long, value_parser = parse_addr)]
    entry: Option<u16>,
    /// Maximum number of instructions to execute
    #[arg(short, long)]
    max_cycles: Option<u64>,
    /// Fail instead of wrapping when PC runs past xFFFF
    #[arg(long)]
    strict_pc: bool,
    /// Register dump printed when the run ends
    #[arg(short, long, value_enum)]
    dump: Option<DumpFormat>,
    /// Log every executed instruction to stderr
    #[arg(short, long)]
    trace: bool,
    /// JSON file with run settings; flags override it
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// Accepts `x3000`, `0x3000` or decimal.
fn parse_addr(s: &str) -> Result<u16, String> {
    let hex = s.strip_prefix("0x").or_else(|| s.strip_prefix('x'));
    let parsed = match hex {
        Some(digits) => u16::from_str_radix(digits, 16),
        None => s.parse::<u16>(),
    };
    parsed.map_err(|e| format!("invalid address '{}': {}", s, e))
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run_program(args),
        #[cfg(feature = "tui")]
        Commands::Debug { images, entry } => debug_program(&images, entry),
        Commands::Dump { images, words } => dump_images(&images, words),
    }
}

fn init_logging(trace: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if trace {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Merge the optional config file with command-line flags.
fn build_config(args: &RunArgs) -> RunConfig {
    let mut config = match &args.config {
        Some(path) => match RunConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("error: {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => RunConfig::default(),
    };

    if args.entry.is_some() {
        config.entry = args.entry;
    }
    if args.max_cycles.is_some() {
        config.max_cycles = args.max_cycles;
    }
    if args.strict_pc {
        config.pc_overflow = PcOverflow::Fault;
    }
    if let Some(dump) = args.dump {
        config.dump = dump;
    }
    config.trace |= args.trace;
    config
}

fn load_images(paths: &[PathBuf]) -> Vec<Image> {
    paths
        .iter()
        .map(|path| match Image::open(path) {
            Ok(image) => image,
            Err(e) => {
                eprintln!("error: {}", e);
                std::process::exit(1);
            }
        })
        .collect()
}

fn print_dump(regs: &Registers, format: DumpFormat) {
    match format {
        DumpFormat::None => {}
        DumpFormat::Text => print!("{}", regs),
        DumpFormat::Json => match serde_json::to_string_pretty(regs) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("error: cannot serialize registers: {}", e),
        },
    }
}

fn run_program(args: RunArgs) {
    let config = build_config(&args);
    init_logging(config.trace);

    let images = load_images(&args.images);
    let entry = config.entry.unwrap_or(images[0].origin);

    let console = match TerminalConsole::new() {
        Ok(console) => console,
        Err(e) => {
            eprintln!("error: cannot open terminal: {}", e);
            std::process::exit(1);
        }
    };

    let mut cpu = Cpu::new(console).with_pc_overflow(config.pc_overflow);
    for image in &images {
        cpu.load_image(image);
    }
    cpu.regs.set_pc(entry);
    tracing::info!(
        entry = %format_args!("{:#06x}", entry),
        pc_overflow = ?cpu.pc_overflow(),
        "starting"
    );

    let result = match config.max_cycles {
        Some(limit) => cpu.run_limited(limit),
        None => cpu.run(),
    };

    // Leave raw mode before reporting.
    let regs = cpu.regs.clone();
    let state = cpu.state;
    drop(cpu);

    match result {
        Ok(executed) => {
            if state == CpuState::Running {
                eprintln!("stopped after {} instructions (cycle limit)", executed);
            }
            print_dump(&regs, config.dump);
        }
        Err(e) => {
            eprintln!("error: {}", e);
            print_dump(&regs, config.dump);
            std::process::exit(1);
        }
    }
}

#[cfg(feature = "tui")]
fn debug_program(paths: &[PathBuf], entry: Option<u16>) {
    let images = load_images(paths);
    let entry = entry.unwrap_or(images[0].origin);

    if let Err(e) = lc3::run_debugger(images, entry) {
        eprintln!("error: debugger failed: {}", e);
        std::process::exit(1);
    }
}

/// `xADDR: xWORD  MNEMONIC` lines for a window of memory.
fn memory_lines<C: Console>(mem: &Memory<C>, start: u16, count: usize) -> Vec<String> {
    mem.dump(start, count)
        .into_iter()
        .map(|(addr, word)| match decode(word) {
            Ok(instr) => format!("x{:04X}: x{:04X}  {}", addr, word, instr),
            Err(_) => format!("x{:04X}: x{:04X}", addr, word),
        })
        .collect()
}

fn dump_images(paths: &[PathBuf], words: Option<usize>) {
    let images = load_images(paths);

    let mut cpu = Cpu::new(ScriptedConsole::new());
    for (path, image) in paths.iter().zip(&images) {
        let stored = cpu.load_image(image);
        println!(
            "{}: origin x{:04X}, {} words (x{:04X}-x{:04X})",
            path.display(),
            image.origin,
            stored,
            image.origin,
            image.origin.wrapping_add(stored.saturating_sub(1) as u16),
        );
    }
    // Listed after every image is loaded, so overlaps show the final contents.
    if let Some(limit) = words {
        for image in &images {
            println!();
            for line in memory_lines(&cpu.mem, image.origin, limit.min(image.len())) {
                println!("{}", line);
            }
        }
    }
    cpu.regs.set_pc(images[0].origin);

    println!();
    print_dump(&cpu.regs, DumpFormat::Text);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_addr_forms() {
        assert_eq!(parse_addr("x3000"), Ok(0x3000));
        assert_eq!(parse_addr("0xFE00"), Ok(0xFE00));
        assert_eq!(parse_addr("512"), Ok(512));
        assert!(parse_addr("x10000").is_err());
        assert!(parse_addr("zzz").is_err());
    }

    #[test]
    fn test_memory_lines_disassemble() {
        let mut mem = Memory::new(ScriptedConsole::new());
        mem.load(0x3000, &[0xF025, 0x1025]);

        let lines = memory_lines(&mem, 0x3000, 2);

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("x3000: xF025  "));
        assert!(lines[1].starts_with("x3001: x1025  "));
        assert!(memory_lines(&mem, 0xFFFF, usize::MAX).len() == 1);
    }

    #[test]
    fn test_dump_words_flag() {
        let cli = Cli::parse_from(["lc3-vm", "dump", "a.obj", "-w", "8"]);

        assert!(matches!(cli.command, Commands::Dump { words: Some(8), .. }));
    }

    #[test]
    fn test_flags_override_config_file() {
        let cli = Cli::parse_from(["lc3-vm", "run", "prog.obj", "--strict-pc", "-m", "10", "-d", "json"]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };

        let config = build_config(&args);

        assert_eq!(config.pc_overflow, PcOverflow::Fault);
        assert_eq!(config.max_cycles, Some(10));
        assert_eq!(config.dump, DumpFormat::Json);
        assert_eq!(config.entry, None);
    }
}
