//! Per-family backends
//!
//! Each target family knows how to find its modules and how to turn them
//! into a [`CoverIndex`]. The backend is picked from the target table at
//! configuration time.

use crate::discovery::{find_kernel_modules, open_main_image};
use crate::domain::{CoverError, Module};
use crate::symbolization::{build_cover_index, BuildOptions, CoverIndex};
use crate::targets::{previous_instruction_pc, BackendFamily, Target};
use log::info;
use std::path::{Path, PathBuf};

pub trait TargetBackend: Send + Sync {
    /// Locate the main image and any loadable modules
    ///
    /// # Errors
    /// Returns `Discovery` for a missing or mismatched main image
    fn discover_modules(
        &self,
        target: &Target,
        kernel_obj_dir: &Path,
        module_obj_dirs: &[PathBuf],
    ) -> Result<Vec<Module>, CoverError>;

    /// Symbolize placed modules
    ///
    /// # Errors
    /// See [`build_cover_index`]
    fn build_symbol_index(
        &self,
        target: &Target,
        modules: &[Module],
        options: &BuildOptions,
    ) -> Result<CoverIndex, CoverError> {
        build_cover_index(target, modules, options)
    }

    /// Map a PC reported by kcov (a return address) to its call site
    fn adjust_pc(&self, target: &Target, pc: u64) -> u64 {
        previous_instruction_pc(target, pc)
    }
}

/// Kernel image plus `.ko` modules
pub struct LinuxElfBackend;

impl TargetBackend for LinuxElfBackend {
    fn discover_modules(
        &self,
        target: &Target,
        kernel_obj_dir: &Path,
        module_obj_dirs: &[PathBuf],
    ) -> Result<Vec<Module>, CoverError> {
        let main = open_main_image(target, kernel_obj_dir)?;

        // In-tree modules live next to vmlinux
        let mut dirs = vec![kernel_obj_dir.to_path_buf()];
        dirs.extend(module_obj_dirs.iter().filter(|d| d.as_path() != kernel_obj_dir).cloned());
        let modules = find_kernel_modules(target, &dirs)?;
        info!("Discovered {} loadable modules", modules.len());

        let mut all = Vec::with_capacity(modules.len() + 1);
        all.push(main);
        all.extend(modules);
        Ok(all)
    }
}

/// Single ELF image (BSD kernels, Fuchsia, plain executables)
pub struct GenericElfBackend;

impl TargetBackend for GenericElfBackend {
    fn discover_modules(
        &self,
        target: &Target,
        kernel_obj_dir: &Path,
        _module_obj_dirs: &[PathBuf],
    ) -> Result<Vec<Module>, CoverError> {
        Ok(vec![open_main_image(target, kernel_obj_dir)?])
    }
}

/// Backend for a target's family
#[must_use]
pub fn backend_for(target: &Target) -> &'static dyn TargetBackend {
    match target.family {
        BackendFamily::LinuxElf => &LinuxElfBackend,
        BackendFamily::GenericElf => &GenericElfBackend,
    }
}
