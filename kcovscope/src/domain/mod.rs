//! Kernel images, coverage frames and the errors around them
//!
//! [`Module`] is a loaded kernel object placed at its runtime base;
//! [`Frame`] is one symbolized coverage callback inside it. Session
//! construction and report calls fail with [`CoverError`], config loading
//! with [`ConfigError`].

pub mod errors;
pub mod types;

pub use types::{Frame, Module, ModuleKind, LINE_END};

pub use errors::{ConfigError, CoverError};
