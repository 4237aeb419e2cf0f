//! Address index over every module of a session
//!
//! Built once from the module list: symbols, compile units and one
//! [`Frame`] per coverage callback, all in runtime addresses and sorted for
//! binary search. The index owns plain data only, so it is `Send + Sync`
//! and can be shared by concurrent report renders.

use crate::domain::{CoverError, Frame, Module, LINE_END};
use crate::targets::Target;
use log::{debug, info, warn};
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use super::callbacks::find_callback_pcs;
use super::dwarf::{debug_bias, DebugInfo};
use super::elf::{has_text_relocations, is_relocatable, text_range, text_symbols, TextSymbol};

/// A function and the callback PCs inside it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// Index into the session's module list
    pub module: usize,
    pub name: String,
    /// Declaring source file, or the module name without debug info
    pub file: String,
    /// Line of the function entry, 0 when unknown
    pub line: u32,
    pub start: u64,
    pub end: u64,
    /// Sorted callback PCs within `[start, end)`
    pub pcs: Vec<u64>,
}

impl Symbol {
    #[must_use]
    pub fn contains(&self, pc: u64) -> bool {
        pc >= self.start && pc < self.end
    }
}

/// A compile unit in runtime addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub module: usize,
    pub name: String,
    pub ranges: Vec<Range<u64>>,
}

/// Knobs for [`build_cover_index`]
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Synthesize frames from the symbol table instead of requiring DWARF
    pub symbols_only: bool,
    /// Source tree prefix stripped from file paths
    pub kernel_src: Option<PathBuf>,
    /// Build directory prefix stripped from file paths, tried first
    pub kernel_build_src: Option<PathBuf>,
}

/// Symbols, units and callback frames of a module set
#[derive(Debug, Clone)]
pub struct CoverIndex {
    modules: Vec<Module>,
    units: Vec<Unit>,
    symbols: Vec<Symbol>,
    frames: Vec<Frame>,
    precise: bool,
}

impl CoverIndex {
    /// Assemble an index from already-resolved parts
    ///
    /// Symbols and frames are sorted by address; duplicate frames for the
    /// same PC keep the first.
    #[must_use]
    pub fn from_parts(
        modules: Vec<Module>,
        units: Vec<Unit>,
        mut symbols: Vec<Symbol>,
        mut frames: Vec<Frame>,
        precise: bool,
    ) -> Self {
        symbols.sort_by_key(|s| s.start);
        frames.sort_by_key(|f| f.pc);
        frames.dedup_by_key(|f| f.pc);
        Self { modules, units, symbols, frames, precise }
    }

    #[must_use]
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    #[must_use]
    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    #[must_use]
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    #[must_use]
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// True when every callback PC resolved to a source line
    #[must_use]
    pub fn precise(&self) -> bool {
        self.precise
    }

    /// Callback PCs in ascending order
    pub fn callback_pcs(&self) -> impl Iterator<Item = u64> + '_ {
        self.frames.iter().map(|f| f.pc)
    }

    #[must_use]
    pub fn is_callback(&self, pc: u64) -> bool {
        self.frame(pc).is_some()
    }

    #[must_use]
    pub fn frame(&self, pc: u64) -> Option<&Frame> {
        self.frames.binary_search_by_key(&pc, |f| f.pc).ok().map(|i| &self.frames[i])
    }

    /// Function containing `pc`
    #[must_use]
    pub fn symbol_for(&self, pc: u64) -> Option<&Symbol> {
        let idx = self.symbols.partition_point(|s| s.start <= pc);
        let symbol = self.symbols.get(idx.checked_sub(1)?)?;
        symbol.contains(pc).then_some(symbol)
    }
}

/// Symbolize every placed module
///
/// # Errors
/// - `Io` / `Object` if a module can't be read or parsed
/// - `NoDebugInfo` if a module lacks DWARF and `symbols_only` is off
/// - `NoCoverageCallbacks` if no module calls the coverage callback
pub fn build_cover_index(
    target: &Target,
    modules: &[Module],
    options: &BuildOptions,
) -> Result<CoverIndex, CoverError> {
    let mut units = Vec::new();
    let mut symbols = Vec::new();
    let mut frames = Vec::new();
    let mut precise = !options.symbols_only;

    for (idx, module) in modules.iter().enumerate() {
        if !module.is_placed() {
            debug!("Module {} is not loaded, skipping", module.display_name());
            continue;
        }

        let data = fs::read(&module.path)?;
        let obj = object::File::parse(&*data).map_err(|source| CoverError::Object {
            path: module.path.display().to_string(),
            source,
        })?;

        let part = symbolize_module(target, idx, module, &obj, options)?;
        precise &= part.precise;
        units.extend(part.units);
        symbols.extend(part.symbols);
        frames.extend(part.frames);
    }

    if frames.is_empty() {
        let main = modules.iter().find(|m| m.is_main()).or_else(|| modules.first());
        return Err(CoverError::NoCoverageCallbacks {
            module: main.map(|m| m.path.display().to_string()).unwrap_or_default(),
            os: target.os.as_str().to_string(),
        });
    }

    if !precise {
        warn!("Coverage is inexact: some callbacks have no line information");
    }
    Ok(CoverIndex::from_parts(modules.to_vec(), units, symbols, frames, precise))
}

struct ModuleIndex {
    units: Vec<Unit>,
    symbols: Vec<Symbol>,
    frames: Vec<Frame>,
    precise: bool,
}

fn symbolize_module(
    target: &Target,
    idx: usize,
    module: &Module,
    obj: &object::File<'_>,
    options: &BuildOptions,
) -> Result<ModuleIndex, CoverError> {
    let debug_info = if options.symbols_only {
        None
    } else {
        Some(DebugInfo::load(obj, &module.path.display().to_string())?)
    };

    let relocatable = is_relocatable(obj);
    // Relocatable modules are linked at 0; everything else already is absolute
    let load = if relocatable { module.base_address } else { 0 };
    let bias = match &debug_info {
        Some(debug) if !relocatable => {
            debug_bias(text_range(obj).as_ref(), debug.units(), has_text_relocations(obj))
        }
        _ => 0,
    };

    let text = text_symbols(obj);
    let callbacks = find_callback_pcs(target.arch, obj);
    info!(
        "{}: {} symbols, {} coverage callbacks, debug bias 0x{bias:x}",
        module.display_name(),
        text.len(),
        callbacks.len()
    );

    let resolver = Resolver { module, debug_info: debug_info.as_ref(), bias, options };
    let mut precise = debug_info.is_some();

    let mut frames = Vec::with_capacity(callbacks.len());
    for &pc in &callbacks {
        let enclosing = enclosing_symbol(&text, pc);
        let frame = match resolver.locate(pc) {
            Some(located) if located.line > 0 => Frame {
                pc: pc + load,
                module: idx,
                function_name: located
                    .function
                    .or_else(|| enclosing.map(|s| s.name.clone()))
                    .unwrap_or_default(),
                file_path: located.file,
                line: located.line,
                column: i32::try_from(located.column).ok().filter(|&c| c > 0).unwrap_or(LINE_END),
                inline: located.inline,
            },
            _ => {
                precise = false;
                Frame {
                    pc: pc + load,
                    module: idx,
                    file_path: resolver.fallback_file(enclosing),
                    line: 0,
                    column: LINE_END,
                    function_name: enclosing.map(|s| s.name.clone()).unwrap_or_default(),
                    inline: false,
                }
            }
        };
        frames.push(frame);
    }

    let symbols = text
        .iter()
        .map(|sym| {
            let (file, line) = resolver.declaration(sym);
            let lo = callbacks.partition_point(|&pc| pc < sym.start);
            let hi = callbacks.partition_point(|&pc| pc < sym.end);
            Symbol {
                module: idx,
                name: sym.name.clone(),
                file,
                line,
                start: sym.start + load,
                end: sym.end + load,
                pcs: callbacks[lo..hi].iter().map(|pc| pc + load).collect(),
            }
        })
        .collect();

    let units = debug_info
        .as_ref()
        .map(|debug| {
            debug
                .units()
                .iter()
                .map(|unit| Unit {
                    module: idx,
                    name: resolver.clean_path(&unit.name),
                    ranges: unit.ranges.iter().map(|r| r.start + bias + load..r.end + bias + load).collect(),
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(ModuleIndex { units, symbols, frames, precise })
}

fn enclosing_symbol(symbols: &[TextSymbol], pc: u64) -> Option<&TextSymbol> {
    let idx = symbols.partition_point(|s| s.start <= pc);
    let symbol = symbols.get(idx.checked_sub(1)?)?;
    (pc < symbol.end).then_some(symbol)
}

/// Link-time address to source location for one module
struct Resolver<'a> {
    module: &'a Module,
    debug_info: Option<&'a DebugInfo>,
    bias: u64,
    options: &'a BuildOptions,
}

impl Resolver<'_> {
    fn locate(&self, pc: u64) -> Option<super::dwarf::SourceLocation> {
        let mut located = self.debug_info?.locate(pc.wrapping_sub(self.bias))?;
        located.file = self.clean_path(&located.file);
        Some(located)
    }

    fn declaration(&self, symbol: &TextSymbol) -> (String, u32) {
        match self.locate(symbol.start) {
            Some(located) => (located.file, located.line),
            None => (self.module.display_name(), 0),
        }
    }

    fn fallback_file(&self, enclosing: Option<&TextSymbol>) -> String {
        enclosing
            .and_then(|sym| self.locate(sym.start))
            .map_or_else(|| self.module.display_name(), |located| located.file)
    }

    fn clean_path(&self, path: &str) -> String {
        clean_path(
            path,
            self.options.kernel_build_src.as_deref(),
            self.options.kernel_src.as_deref(),
        )
    }
}

/// Make a debug-info path relative to the source tree
///
/// The build dir prefix is stripped first, then the source dir prefix, then
/// any leading `/`.
#[must_use]
pub fn clean_path(path: &str, build_src: Option<&Path>, src: Option<&Path>) -> String {
    let mut cleaned = Path::new(path);
    for prefix in [build_src, src].into_iter().flatten() {
        if prefix.as_os_str().is_empty() {
            continue;
        }
        if let Ok(rest) = cleaned.strip_prefix(prefix) {
            cleaned = rest;
        }
    }
    cleaned.to_string_lossy().trim_start_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::targets::TargetRegistry;
    use std::path::PathBuf;

    fn frame(pc: u64, file: &str, line: u32) -> Frame {
        Frame {
            pc,
            module: 0,
            file_path: file.to_string(),
            line,
            column: LINE_END,
            function_name: "f".to_string(),
            inline: false,
        }
    }

    fn symbol(name: &str, start: u64, end: u64, pcs: &[u64]) -> Symbol {
        Symbol {
            module: 0,
            name: name.to_string(),
            file: "a.c".to_string(),
            line: 1,
            start,
            end,
            pcs: pcs.to_vec(),
        }
    }

    #[test]
    fn test_clean_path() {
        let build = PathBuf::from("/build/linux");
        let src = PathBuf::from("/src/linux");
        assert_eq!(clean_path("/build/linux/mm/slab.c", Some(&build), Some(&src)), "mm/slab.c");
        assert_eq!(clean_path("/src/linux/mm/slab.c", Some(&build), Some(&src)), "mm/slab.c");
        assert_eq!(clean_path("/other/mm/slab.c", Some(&build), Some(&src)), "other/mm/slab.c");
        assert_eq!(clean_path("mm/slab.c", None, None), "mm/slab.c");
        // Prefixes only strip whole components
        assert_eq!(clean_path("/build/linuxx/a.c", Some(&build), None), "build/linuxx/a.c");
    }

    #[test]
    fn test_frame_lookup() {
        let index = CoverIndex::from_parts(
            Vec::new(),
            Vec::new(),
            Vec::new(),
            vec![frame(0x30, "b.c", 3), frame(0x10, "a.c", 1), frame(0x10, "dup.c", 9)],
            true,
        );
        assert_eq!(index.callback_pcs().collect::<Vec<_>>(), vec![0x10, 0x30]);
        assert_eq!(index.frame(0x10).unwrap().file_path, "a.c");
        assert!(index.is_callback(0x30));
        assert!(!index.is_callback(0x20));
    }

    #[test]
    fn test_symbol_for() {
        let index = CoverIndex::from_parts(
            Vec::new(),
            Vec::new(),
            vec![symbol("g", 0x200, 0x280, &[]), symbol("f", 0x100, 0x180, &[0x110])],
            Vec::new(),
            false,
        );
        assert_eq!(index.symbol_for(0x100).unwrap().name, "f");
        assert_eq!(index.symbol_for(0x17F).unwrap().name, "f");
        assert!(index.symbol_for(0x180).is_none());
        assert!(index.symbol_for(0x50).is_none());
        assert_eq!(index.symbol_for(0x27F).unwrap().name, "g");
    }

    #[test]
    fn test_index_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CoverIndex>();
    }

    #[test]
    fn test_own_binary_has_no_callbacks() {
        let registry = TargetRegistry::builtin();
        let key = if cfg!(target_arch = "aarch64") { "linux/arm64" } else { "linux/amd64" };
        let target = registry.get(key).unwrap();
        let exe = std::env::current_exe().unwrap();
        let modules = vec![Module::main_image(exe.clone(), 0)];
        let options = BuildOptions { symbols_only: true, ..BuildOptions::default() };

        let err = build_cover_index(target, &modules, &options).unwrap_err();
        assert!(matches!(err, CoverError::NoCoverageCallbacks { .. }));
        assert!(err.to_string().contains(&exe.display().to_string()));
    }
}
