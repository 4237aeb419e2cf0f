//! # kcovscope - Main Entry Point
//!
//! Three subcommands:
//! - **report**: load a config and a program batch, render one report
//! - **modules**: show what module discovery finds for a config
//! - **sample**: run an instrumented binary and emit its PCs as a batch

use anyhow::{Context, Result};
use clap::Parser;
use kcovscope::cli::{Args, Command, ReportArgs};
use kcovscope::config::CoverConfig;
use kcovscope::coverage::ReportOptions;
use kcovscope::discovery::{apply_load_addresses, discover_modules, read_loaded_modules};
use kcovscope::domain::{ConfigError, CoverError};
use kcovscope::generator::ReportGenerator;
use kcovscope::pcsample::{sample_pcs, SampleOutcome};
use kcovscope::targets::TargetRegistry;
use kcovscope_common::codec::decode_batch;
use kcovscope_common::{HandlerParams, Program};
use log::info;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_COVERAGE: i32 = 3;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

/// Batch problems (no PCs, mismatches) get their own code so collectors can
/// tell them apart from a broken setup
fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<ConfigError>().is_some() {
        return EXIT_USAGE;
    }
    match err.downcast_ref::<CoverError>() {
        Some(CoverError::UnknownTarget(_) | CoverError::Config(_)) => EXIT_USAGE,
        Some(
            CoverError::NoPcsCollected
            | CoverError::NoMatchingCallbacks { .. }
            | CoverError::PcMismatch { .. },
        ) => EXIT_COVERAGE,
        _ => EXIT_ERROR,
    }
}

#[tokio::main]
async fn run() -> Result<()> {
    let args = Args::parse();
    let registry = TargetRegistry::builtin();

    match args.command {
        Command::Report(report) => run_report(&registry, &report),
        Command::Modules { config } => run_modules(&registry, &config),
        Command::Sample { binary, timeout, name } => {
            run_sample(&binary, Duration::from_secs(timeout), name).await
        }
    }
}

fn run_report(registry: &TargetRegistry, args: &ReportArgs) -> Result<()> {
    let config = CoverConfig::load(&args.config)?;
    let params = load_batch(&args.progs, args.compressed)?;
    info!("Loaded {} programs ({} PCs)", params.progs.len(), params.total_pcs());

    let options = ReportOptions {
        tolerate_mismatch: args.tolerate_mismatch,
        allow_empty: args.allow_empty,
        pcs_are_call_sites: args.call_sites,
    };
    let generator = ReportGenerator::from_config(&config, registry)?.with_options(options);

    // Render into memory first so a failed render leaves no partial file
    let mut out = Vec::new();
    generator.render(args.format, &mut out, &params)?;

    match &args.output {
        Some(path) => {
            fs::write(path, &out).with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote {} report to {}", args.format.extension(), path.display());
        }
        None => std::io::stdout().lock().write_all(&out)?,
    }
    Ok(())
}

fn load_batch(path: &Path, compressed: bool) -> Result<HandlerParams> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    if compressed {
        return decode_batch(&bytes).with_context(|| format!("Failed to decode {}", path.display()));
    }
    serde_json::from_slice(&bytes).with_context(|| format!("Malformed program batch {}", path.display()))
}

fn run_modules(registry: &TargetRegistry, config: &Path) -> Result<()> {
    let config = CoverConfig::load(config)?;
    let target = registry.get(&config.target)?;
    let mut modules = discover_modules(target, &config.kernel_obj, &config.module_obj)?;
    if let Some(path) = &config.loaded_modules {
        modules = apply_load_addresses(&modules, &read_loaded_modules(path)?);
    }

    let mut stdout = std::io::stdout().lock();
    for module in &modules {
        writeln!(stdout, "{module}")?;
    }
    Ok(())
}

async fn run_sample(binary: &Path, timeout: Duration, name: String) -> Result<()> {
    match sample_pcs(binary, &[], timeout).await {
        SampleOutcome::Sampled(pcs) => {
            let params = HandlerParams::new(vec![Program::new("", pcs).with_data(name)]);
            let mut stdout = std::io::stdout().lock();
            serde_json::to_writer(&mut stdout, &params)?;
            writeln!(stdout)?;
            Ok(())
        }
        SampleOutcome::Unavailable(reason) => {
            anyhow::bail!("{} produced no PCs: {reason}", binary.display())
        }
    }
}
