//! # Module Discovery
//!
//! Finds the code modules of a target build: the main image (`vmlinux`,
//! `kernel.full`, ...) and, on Linux, every separately compiled `.ko`.
//!
//! ```text
//! kernel_obj/vmlinux          -> Module { kind: MainImage, base: 0 }
//! kernel_obj/**/*.ko          -> Module { kind: LoadedModule, base: 0 }
//! module_obj/**/*.ko
//!
//! /proc/modules (captured)    -> apply_load_addresses -> base = load address
//! ```
//!
//! Discovery never mutates a module list in place; placing modules at their
//! runtime addresses returns a new list.

pub mod image;
pub mod kmod;
pub mod loaded;

pub use image::open_main_image;
pub use kmod::find_kernel_modules;
pub use loaded::{apply_load_addresses, parse_loaded_modules, read_loaded_modules, LoadedModule};

use crate::backend::backend_for;
use crate::domain::{CoverError, Module};
use crate::targets::Target;
use std::path::{Path, PathBuf};

/// Locate every module of a target build
///
/// The main image comes first, followed by loadable modules ordered by name.
///
/// # Errors
/// Returns `Discovery` if the main image is missing or was built for another
/// architecture
pub fn discover_modules(
    target: &Target,
    kernel_obj_dir: &Path,
    module_obj_dirs: &[PathBuf],
) -> Result<Vec<Module>, CoverError> {
    backend_for(target).discover_modules(target, kernel_obj_dir, module_obj_dirs)
}
