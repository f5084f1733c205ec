mod interactive;

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::PathBuf,
};

use anyhow::{Context, Result};
use cache_sim::{
    config::{CacheConfig, CacheConfigFile, WritePolicy},
    sim::Simulator,
    stat::SlotDump,
    trace::TraceReader,
};
use clap::{Args, Parser};
use terminal_size::terminal_size;

/// Simulate a direct-mapped cache over a memory access trace.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Write policy: `wt` (write through) or `wb` (write back)
    policy: WritePolicy,
    /// File path to memory access trace
    trace: PathBuf,
    #[command(flatten)]
    geometry: GeometryArgs,
    /// File path to JSON cache configuration (command-line options take precedence)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Print the valid cache lines after the run
    #[arg(long)]
    dump: bool,
    /// Print statistics as JSON
    #[arg(long)]
    json: bool,
    /// Enable interactive mode
    #[arg(long)]
    interactive: bool,
    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Args, Debug)]
struct GeometryArgs {
    /// Cache size in bytes [default: 16384]
    #[arg(long)]
    cache_size: Option<usize>,
    /// Block size in bytes [default: 4]
    #[arg(long)]
    block_size: Option<usize>,
    /// Width of the tag field [default: 18]
    #[arg(long)]
    tag_bits: Option<u32>,
    /// Width of the index field [default: 12]
    #[arg(long)]
    index_bits: Option<u32>,
    /// Width of the offset field [default: 2]
    #[arg(long)]
    offset_bits: Option<u32>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    if args.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    } else {
        env_logger::init();
    }
    let config = read_config(&args)?;
    println!("Write Policy: {}", config.write_policy());
    println!("Cache Lines: {}", config.num_lines());

    let trace = File::open(&args.trace)
        .with_context(|| format!("failed to open trace file {}", args.trace.display()))?;
    let reader = BufReader::new(trace);
    let mut sim = Simulator::new(config);

    let result = if args.interactive {
        let mut records = TraceReader::new(reader);
        interactive::execute_interactive(&mut sim, &mut records)
    } else {
        execute(&mut sim, reader)
    };
    output_stat(&sim, &args)?;
    let processed = sim.processed();
    sim.destroy();
    result.with_context(|| format!("trace processing stopped after {processed} records"))
}

fn read_config(args: &Cli) -> Result<CacheConfig> {
    let file = match &args.config {
        Some(p) => {
            let f = File::open(p)
                .with_context(|| format!("failed to open config file {}", p.display()))?;
            CacheConfigFile::deser(f)
                .with_context(|| format!("failed to parse config file {}", p.display()))?
        }
        None => CacheConfigFile::default(),
    };
    let GeometryArgs {
        cache_size,
        block_size,
        tag_bits,
        index_bits,
        offset_bits,
    } = args.geometry;
    let flags = CacheConfigFile {
        cache_size,
        block_size,
        write_policy: Some(args.policy),
        tag_bits,
        index_bits,
        offset_bits,
    };
    Ok(file.overlay(flags).build()?)
}

fn execute(sim: &mut Simulator, reader: impl BufRead) -> Result<()> {
    sim.run_trace(reader)?;
    Ok(())
}

fn output_stat(sim: &Simulator, args: &Cli) -> Result<()> {
    if args.json {
        if args.dump {
            log::warn!("--dump is ignored with --json");
        }
        println!("{}", serde_json::to_string_pretty(&sim.statistics())?);
        return Ok(());
    }
    let max_width = get_terminal_width().unwrap_or(120) as usize;
    let mut stats = sim.collect_stat();
    if args.dump {
        stats.push(Box::new(SlotDump::of(sim.cache())));
    }
    println!("{}", stats.view(max_width));
    Ok(())
}

pub(crate) fn get_terminal_width() -> Option<u16> {
    terminal_size().map(|(w, _)| w.0.saturating_sub(20))
}
