//! Report renderers
//!
//! Pure projections of an [`Aggregate`](crate::coverage::Aggregate). Each
//! renderer builds its whole output in memory; the caller writes it in one
//! go so a failed render never leaves a partial report behind.
//!
//! | Kind | Output |
//! |---|---|
//! | `html` | Interactive source view with per-line coverage |
//! | `subsystems` | HTML table, one row per subsystem |
//! | `files` | HTML table, one row per file |
//! | `functions` | CSV, one row per function |
//! | `jsonl` | JSON-lines, one document per covered file |
//! | `programs` | JSON-lines, one document per program |

pub mod csv;
pub mod html;
pub mod jsonl;
pub mod summary;

pub use csv::{render_functions, CSV_HEADER};
pub use html::render_html;
pub use jsonl::{render_files_jsonl, render_programs_jsonl};
pub use summary::{render_files, render_subsystems};

use clap::ValueEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportKind {
    Html,
    Subsystems,
    Files,
    Functions,
    Jsonl,
    Programs,
}

impl ReportKind {
    /// Conventional file extension of the output
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            ReportKind::Html | ReportKind::Subsystems | ReportKind::Files => "html",
            ReportKind::Functions => "csv",
            ReportKind::Jsonl | ReportKind::Programs => "jsonl",
        }
    }
}
