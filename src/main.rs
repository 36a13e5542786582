use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, BufWriter};
use std::sync::mpsc;
use std::thread;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pacehash::cancel::CancelToken;
use pacehash::cli::{Cli, Command, HashArgs, ProfileArgs};
use pacehash::config::Config;
use pacehash::profile::Budget;
use pacehash::report::{self, fmt_size, Summary};
use pacehash::scheduler::Scheduler;
use pacehash::walker::{WalkOptions, Walker};
use pacehash::worker::HashSettings;

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);
    let config = Config::load()?;

    match &cli.command {
        Command::Hash(args) => hash(args, &config),
        Command::Profile(args) => show_profile(args, &config),
    }
}

fn hash(args: &HashArgs, config: &Config) -> Result<()> {
    let profile = config.device_profile(&args.profile);
    let budget = Budget::from_profile(&profile).context("invalid device profile")?;

    // CLI include/exclude take priority; fall back to config
    let include = if args.include.is_empty() { &config.include } else { &args.include };
    let exclude = if args.exclude.is_empty() { &config.exclude } else { &args.exclude };
    let opts = WalkOptions::new(
        args.follow_symlinks || config.follow_symlinks,
        args.hidden || config.hidden,
        include,
        exclude,
    )?;

    let root = match &args.root {
        Some(root) => root.clone(),
        None => std::env::current_dir()?,
    };

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            warn!("interrupt received, finishing admitted files");
            cancel.cancel();
        })
        .context("installing Ctrl+C handler")?;
    }

    let mut walker = Walker::new(&root, opts, cancel.clone())?;
    let settings = HashSettings {
        algorithm: args.algorithm.or(config.algorithm).unwrap_or_default(),
        chunk_size: usize::try_from(profile.buffer_size)
            .context("buffer size does not fit in memory")?,
    };
    info!(
        root = %root.display(),
        capacity = budget.capacity(),
        breakpoint = %fmt_size(budget.breakpoint() as u64),
        algorithm = ?settings.algorithm,
        "starting"
    );

    let (tx, rx) = mpsc::channel();
    let printer = thread::Builder::new()
        .name("printer".into())
        .spawn(move || report::print_reports(rx, BufWriter::new(io::stdout().lock())))
        .context("starting output thread")?;

    let start = Instant::now();
    let scheduler = Scheduler::new(budget, settings, cancel.clone());
    let stats = scheduler.run_walk(&mut walker, &tx);
    drop(tx);

    match printer.join() {
        Ok(result) => result.context("writing digests")?,
        Err(_) => anyhow::bail!("output thread panicked"),
    }

    let summary = Summary {
        stats,
        elapsed: start.elapsed(),
    };
    info!("{summary}");
    if cancel.is_cancelled() {
        info!("run was interrupted before completion");
    }
    Ok(())
}

fn show_profile(args: &ProfileArgs, config: &Config) -> Result<()> {
    let profile = config.device_profile(args);
    let budget = Budget::from_profile(&profile).context("invalid device profile")?;
    println!("throughput:      {}/s", fmt_size(profile.throughput as u64));
    println!("latency:         {:.3} ms", profile.latency * 1000.0);
    println!("in flight:       {}", fmt_size(profile.pipe_fatness() as u64));
    println!("buffer size:     {}", fmt_size(profile.buffer_size));
    println!("amplification:   {}", profile.amplification);
    println!("capacity:        {} units", budget.capacity());
    println!("breakpoint:      {}", fmt_size(budget.breakpoint() as u64));
    println!(
        "exclusive above: {}",
        fmt_size((budget.breakpoint() * f64::from(budget.capacity().saturating_sub(1))) as u64)
    );
    Ok(())
}

fn setup_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("pacehash=debug,warn")
    } else {
        EnvFilter::new("pacehash=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}
