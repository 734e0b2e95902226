use std::{fs::File, io::Read, path::PathBuf};

use anyhow::Result;
use cache_sim::{
    cache::CacheConfig,
    common::Word,
    loader,
    machine::Machine,
    memory::MEM_WORD_SIZE,
    trace::{NullTrace, TraceEvent, TraceSink},
};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// File path to the machine-code image (one decimal word per line)
    input: PathBuf,
    /// Words per cache block (power of two)
    #[arg(short, long, default_value_t = 4)]
    block_size: usize,
    /// Number of cache sets (power of two)
    #[arg(short = 's', long, default_value_t = 2)]
    num_sets: usize,
    /// Ways per set
    #[arg(short, long, default_value_t = 1)]
    ways: usize,
    /// Suppress the per-transfer trace lines
    #[arg(long)]
    quiet_trace: bool,
    /// Dump the final state as JSON instead of text
    #[arg(long)]
    json: bool,
    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// prints every transfer as it happens.
struct StdoutTrace;

impl TraceSink for StdoutTrace {
    fn emit(&mut self, event: TraceEvent) {
        println!("{event}");
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();
    if args.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    } else {
        env_logger::init();
    }
    let src = read_input(&args.input)?;
    let image = loader::parse_image(&src, MEM_WORD_SIZE)?;
    let config = CacheConfig {
        block_size_words: args.block_size,
        num_sets: args.num_sets,
        ways_per_set: args.ways,
    };
    if args.quiet_trace {
        run(&image, config, NullTrace::new(), args.json)
    } else {
        run(&image, config, StdoutTrace, args.json)
    }
}

fn run<T: TraceSink>(image: &[Word], config: CacheConfig, trace: T, json: bool) -> Result<()> {
    let mut machine = Machine::new(image, config, trace)?;
    machine.run()?;
    log::info!("cache: {}", machine.cache_stat());
    let snapshot = machine.snapshot();
    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        println!("{snapshot}");
    }
    Ok(())
}

fn read_input(input: &PathBuf) -> Result<String> {
    let mut buf = String::new();
    let mut file = File::open(input)?;
    file.read_to_string(&mut buf)?;
    Ok(buf)
}
