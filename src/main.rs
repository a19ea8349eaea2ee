use clap::{error::ErrorKind, CommandFactory, Parser};
use color_eyre::eyre::{self, WrapErr};
use console::style;
use itertools::Itertools;
use std::ops::Range;
use std::path::{Path, PathBuf};
use warpsim::{address, config, image, memory, sim, trace};

fn parse_address(value: &str) -> Result<address, String> {
    utils::parse_u64(value).map_err(|err| err.to_string())
}

fn parse_range(value: &str) -> Result<Range<address>, String> {
    let (start, end) = value
        .split_once(':')
        .ok_or_else(|| format!("expected <start>:<end>, got {value:?}"))?;
    let range = parse_address(start)?..parse_address(end)?;
    if range.is_empty() {
        return Err(format!("empty address range {value:?}"));
    }
    Ok(range)
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "SIMT RISC-V simulator", long_about = None)]
struct Options {
    /// Program image (Intel HEX or raw binary)
    #[arg(short, long, value_name = "PATH")]
    image: Option<PathBuf>,
    #[arg(short, long, default_value_t = config::DEFAULT_NUM_CORES)]
    cores: usize,
    #[arg(short, long, default_value_t = config::DEFAULT_NUM_WARPS)]
    warps: usize,
    #[arg(short, long, default_value_t = config::DEFAULT_NUM_THREADS)]
    threads: usize,
    #[arg(short, long, default_value = "rv32i")]
    arch: String,
    /// Print per-warp statistics on completion
    #[arg(short, long)]
    stats: bool,
    /// Write statistics to a JSON or CSV file
    #[arg(long = "stats-out", value_name = "PATH")]
    stats_out: Option<PathBuf>,
    /// Write a JSON lines execution trace
    #[arg(long, value_name = "PATH")]
    trace: Option<PathBuf>,
    /// Log the execution trace at trace level
    #[arg(long = "trace-log", conflicts_with = "trace")]
    trace_log: bool,
    /// Fail if the program is still running after this many rounds
    #[arg(long = "max-rounds")]
    max_rounds: Option<u64>,
    #[arg(long = "reset-pc", value_parser = parse_address)]
    reset_pc: Option<address>,
    #[arg(long = "interrupt-entry", value_parser = parse_address)]
    interrupt_entry: Option<address>,
    /// Address range only accessible in supervisor mode (repeatable)
    #[arg(long = "supervisor-only", value_name = "START:END", value_parser = parse_range)]
    supervisor_only: Vec<Range<address>>,
}

impl Options {
    /// Architecture described by the options.
    ///
    /// Invalid values are reported as usage errors.
    fn arch(&self) -> Result<config::Arch, clap::Error> {
        let mut arch = config::Arch::new(&self.arch, self.cores, self.warps, self.threads)
            .map_err(|err| Self::command().error(ErrorKind::InvalidValue, err))?;
        if let Some(reset_pc) = self.reset_pc {
            arch = arch.with_reset_pc(reset_pc);
        }
        if let Some(interrupt_entry) = self.interrupt_entry {
            arch = arch.with_interrupt_entry(interrupt_entry);
        }
        Ok(arch)
    }
}

fn write_stats(path: &Path, stats: &stats::Sim) -> eyre::Result<()> {
    let writer = utils::fs::open_writable(path)?;
    match path.extension().and_then(std::ffi::OsStr::to_str) {
        Some("csv") => stats.write_csv(writer)?,
        _ => serde_json::to_writer_pretty(writer, stats)?,
    }
    log::info!("wrote statistics to {}", path.display());
    Ok(())
}

fn main() -> eyre::Result<()> {
    env_logger::init();
    color_eyre::install()?;

    let options = Options::parse();
    let Some(image_path) = options.image.as_deref() else {
        Options::command().print_help()?;
        return Ok(());
    };

    let arch = options.arch().unwrap_or_else(|err| err.exit());

    let mut mem = memory::Main::new();
    for range in &options.supervisor_only {
        mem.protect(range.clone());
    }
    if !options.supervisor_only.is_empty() {
        log::info!(
            "supervisor-only: {}",
            options
                .supervisor_only
                .iter()
                .map(|range| format!("{:#x}..{:#x}", range.start, range.end))
                .join(", ")
        );
    }
    image::load(image_path, &mut mem, arch.reset_pc)
        .wrap_err_with(|| format!("failed to load image {}", image_path.display()))?;

    let mut driver = sim::Driver::new(arch, mem);
    let start = std::time::Instant::now();
    let stats = match (&options.trace, options.trace_log) {
        (Some(path), _) => {
            let mut sink = trace::Json::create(path)?;
            let stats = driver.run_traced(options.max_rounds, &mut sink);
            sink.flush()
                .wrap_err_with(|| format!("failed to write trace {}", path.display()))?;
            log::info!("wrote {} trace records", sink.num_records());
            stats?
        }
        (None, true) => driver.run_traced(options.max_rounds, &mut trace::Log::default())?,
        (None, false) => driver.run_with_budget(options.max_rounds)?,
    };
    eprintln!(
        "{}",
        style(format!(
            "completed {} rounds in {:?}",
            stats.rounds,
            start.elapsed()
        ))
        .green()
    );

    if options.stats {
        driver.print_stats();
    }
    if let Some(path) = &options.stats_out {
        write_stats(path, &stats)?;
    }
    Ok(())
}
