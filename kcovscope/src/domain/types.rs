//! Domain types shared by discovery, symbolization and aggregation

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Kind of a code module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ModuleKind {
    /// The kernel image or the fuzzed executable itself
    MainImage,
    /// A separately compiled module (e.g. a Linux `.ko`)
    LoadedModule,
}

/// A loadable code module and where it lives at runtime
///
/// Immutable once discovered: applying load addresses produces a new
/// module list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Module {
    /// Module name; empty for the main image
    pub name: String,
    /// On-disk object file
    pub path: PathBuf,
    /// Runtime load address (0 for the main image, whose addresses are absolute)
    pub base_address: u64,
    /// Size of the module's code in bytes
    pub size: u64,
    pub kind: ModuleKind,
}

impl Module {
    #[must_use]
    pub fn main_image(path: PathBuf, size: u64) -> Self {
        Self { name: String::new(), path, base_address: 0, size, kind: ModuleKind::MainImage }
    }

    #[must_use]
    pub fn loaded(name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            name: name.into(),
            path,
            base_address: 0,
            size: 0,
            kind: ModuleKind::LoadedModule,
        }
    }

    #[must_use]
    pub fn is_main(&self) -> bool {
        self.kind == ModuleKind::MainImage
    }

    /// Loaded modules need a runtime address before they can be symbolized
    #[must_use]
    pub fn is_placed(&self) -> bool {
        self.is_main() || self.base_address != 0
    }

    /// Name shown in reports: the module name, or the image file name
    #[must_use]
    pub fn display_name(&self) -> String {
        if !self.name.is_empty() {
            return self.name.clone();
        }
        file_name_of(&self.path)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) @ 0x{:x}", self.display_name(), self.path.display(), self.base_address)
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.to_string_lossy().into_owned(),
        |name| name.to_string_lossy().into_owned(),
    )
}

/// Source location of a coverage callback PC
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Frame {
    /// Runtime PC of the callback call site
    pub pc: u64,
    /// Index into the session's module list
    pub module: usize,
    /// Source path relative to the kernel source tree
    pub file_path: String,
    /// 1-based line, 0 when only symbol-table information is available
    pub line: u32,
    /// Column, -1 when unknown
    pub column: i32,
    pub function_name: String,
    /// True when the location comes from an inlined call
    pub inline: bool,
}

impl Frame {
    /// Whether this frame carries line-level information
    #[must_use]
    pub fn has_line(&self) -> bool {
        self.line > 0
    }
}

/// Column sentinel meaning "to the end of the line"
pub const LINE_END: i32 = -1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_display_name() {
        let main = Module::main_image(PathBuf::from("/build/vmlinux"), 0x1000);
        assert_eq!(main.display_name(), "vmlinux");

        let ko = Module::loaded("snd_pcm", PathBuf::from("/build/sound/core/snd-pcm.ko"));
        assert_eq!(ko.display_name(), "snd_pcm");
    }

    #[test]
    fn test_loaded_module_needs_address() {
        let mut ko = Module::loaded("e1000", PathBuf::from("e1000.ko"));
        assert!(!ko.is_placed());
        ko.base_address = 0xffff_ffff_a000_0000;
        assert!(ko.is_placed());
        assert!(Module::main_image(PathBuf::from("vmlinux"), 0).is_placed());
    }
}
