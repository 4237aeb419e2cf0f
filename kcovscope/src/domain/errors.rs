//! Structured error types for kcovscope
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! Messages carry the counts and target identifiers an operator needs
//! without re-running with verbose logging.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoverError {
    #[error("Unknown target {0} (expected os/arch, e.g. linux/amd64)")]
    UnknownTarget(String),

    #[error("Failed to discover modules for {target}: {path}: {reason}")]
    Discovery { target: String, path: String, reason: String },

    #[error("failed to parse DWARF in {module}: {reason} (set CONFIG_DEBUG_INFO=y on linux)")]
    NoDebugInfo { module: String, reason: String },

    #[error("{module} doesn't contain coverage callbacks (set CONFIG_KCOV=y on {os})")]
    NoCoverageCallbacks { module: String, os: String },

    #[error("no coverage collected so far")]
    NoPcsCollected,

    #[error("coverage doesn't match any coverage callbacks ({total} distinct PCs checked)")]
    NoMatchingCallbacks { total: usize },

    #[error(
        "{unmatched} out of {total} PCs returned by kcov do not have matching coverage callbacks. \
         Check the module discovery code."
    )]
    PcMismatch { unmatched: usize, total: usize },

    #[error("Failed to parse object file {path}: {source}")]
    Object {
        path: String,
        #[source]
        source: object::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CoverError {
    /// True for errors that make the session unusable.
    ///
    /// Per-call aggregation failures leave the session intact.
    #[must_use]
    pub fn is_construction_error(&self) -> bool {
        !matches!(
            self,
            CoverError::NoPcsCollected
                | CoverError::NoMatchingCallbacks { .. }
                | CoverError::PcMismatch { .. }
                | CoverError::Io(_)
                | CoverError::Json(_)
        )
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid subsystem {name}: {reason}")]
    InvalidSubsystem { name: String, reason: String },
}
