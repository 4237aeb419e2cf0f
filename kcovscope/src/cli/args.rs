//! CLI argument definitions

use crate::report::ReportKind;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "kcovscope",
    about = "Render kcov coverage reports from fuzzing program batches",
    after_help = "\
EXAMPLES:
    kcovscope report -c cover.json -p progs.json -f html -o cover.html
    kcovscope report -c cover.json -p progs.bin --compressed -f functions
    kcovscope modules -c cover.json
    kcovscope sample ./fixture --timeout 60"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Render a coverage report for a program batch
    Report(ReportArgs),

    /// List the modules discovered for a configuration
    Modules {
        /// Report configuration (JSON)
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
    },

    /// Run an instrumented binary and print the PCs it reports
    Sample {
        /// Binary whose coverage callback prints its return address
        binary: PathBuf,

        /// Seconds to wait before giving up
        #[arg(long, default_value = "60")]
        timeout: u64,

        /// Name of the program in the emitted batch
        #[arg(long, default_value = "main")]
        name: String,
    },
}

#[derive(clap::Args)]
pub struct ReportArgs {
    /// Report configuration (JSON)
    #[arg(short, long, value_name = "FILE")]
    pub config: PathBuf,

    /// Program batch (`{"progs": [...]}`)
    #[arg(short, long, value_name = "FILE")]
    pub progs: PathBuf,

    /// The batch is DEFLATE-compressed as sent by the collector
    #[arg(long)]
    pub compressed: bool,

    /// Report to render
    #[arg(short, long, value_enum, default_value = "html")]
    pub format: ReportKind,

    /// Output file (stdout if omitted)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Render even if some PCs match no coverage callback
    #[arg(long)]
    pub tolerate_mismatch: bool,

    /// Render an empty report for a batch without PCs
    #[arg(long)]
    pub allow_empty: bool,

    /// PCs in the batch are call sites, not kcov return addresses
    #[arg(long)]
    pub call_sites: bool,
}
