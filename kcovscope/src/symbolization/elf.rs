//! ELF symbol table and section helpers

use object::{Object, ObjectKind, ObjectSection, ObjectSymbol, SectionIndex, SymbolKind};
use rustc_demangle::demangle;
use std::ops::Range;

/// A function from the symbol table, in link-time addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSymbol {
    pub name: String,
    pub start: u64,
    pub end: u64,
}

/// Relocatable objects (`.ko` modules) keep section-relative addresses
#[must_use]
pub fn is_relocatable(obj: &object::File<'_>) -> bool {
    obj.kind() == ObjectKind::Relocatable
}

/// Link-time address range of `.text`
#[must_use]
pub fn text_range(obj: &object::File<'_>) -> Option<Range<u64>> {
    obj.section_by_name(".text").map(|s| s.address()..s.address() + s.size())
}

/// Images linked with `--emit-relocs` (KASLR kernels) keep `.rela.text`
#[must_use]
pub fn has_text_relocations(obj: &object::File<'_>) -> bool {
    obj.section_by_name(".rela.text").is_some() || obj.section_by_name(".rel.text").is_some()
}

/// Enumerate sized, defined function symbols
///
/// Works without any debug info, which is what makes inexact coverage
/// possible. Falls back to the dynamic symbol table for stripped images.
/// Aliases at the same address collapse into the first name seen.
#[must_use]
pub fn text_symbols(obj: &object::File<'_>) -> Vec<TextSymbol> {
    // Sections of a relocatable object all start at 0, keep `.text` only
    let text_index = if is_relocatable(obj) {
        obj.section_by_name(".text").map(|s| s.index())
    } else {
        None
    };

    let mut symbols = collect_text_symbols(obj.symbols(), text_index);
    if symbols.is_empty() {
        symbols = collect_text_symbols(obj.dynamic_symbols(), text_index);
    }

    symbols.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));
    symbols.dedup_by_key(|s| s.start);
    symbols
}

fn collect_text_symbols<'data: 'file, 'file>(
    symbols: impl Iterator<Item = object::Symbol<'data, 'file>>,
    text_index: Option<SectionIndex>,
) -> Vec<TextSymbol> {
    symbols
        .filter(|s| s.kind() == SymbolKind::Text && s.is_definition() && s.size() > 0)
        .filter(|s| text_index.map_or(true, |idx| s.section_index() == Some(idx)))
        .filter_map(|s| {
            let name = s.name().ok()?;
            Some(TextSymbol { name: demangle_symbol(name), start: s.address(), end: s.address() + s.size() })
        })
        .collect()
}

/// Addresses of every definition of `name`
#[must_use]
pub fn symbol_addresses(obj: &object::File<'_>, name: &str) -> Vec<u64> {
    obj.symbols()
        .chain(obj.dynamic_symbols())
        .filter(|s| s.is_definition() && s.name().is_ok_and(|n| n == name))
        .map(|s| s.address())
        .collect()
}

/// Demangle a symbol name; C names come back unchanged
#[must_use]
pub fn demangle_symbol(symbol: &str) -> String {
    format!("{:#}", demangle(symbol))
}
