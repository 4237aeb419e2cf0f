//! Coverage aggregation
//!
//! Turns a batch of traced programs into per-PC hit counts and the file and
//! function statistics every report is built from.
//!
//! Two modes, chosen by the index:
//! - **Precise**: every traced PC must be a coverage callback. Unknown PCs
//!   mean module discovery went wrong and the report is refused.
//! - **Inexact**: a traced PC anywhere inside a function counts the whole
//!   function as covered.

pub mod aggregator;
pub mod stats;

pub use aggregator::{aggregate, Aggregate, ProgramCoverage, ReportOptions};
pub use stats::{percent, ratio, FileStat, FuncStat};
