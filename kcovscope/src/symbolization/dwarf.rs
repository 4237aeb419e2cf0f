//! DWARF loading and address lookup

use crate::domain::CoverError;
use addr2line::Context;
use gimli::{EndianRcSlice, Endianity, Reader as _, RunTimeEndian};
use object::{Object, ObjectSection, ObjectSymbol, RelocationKind, RelocationTarget};
use std::borrow::Cow;
use std::ops::Range;
use std::path::Path;
use std::rc::Rc;

use super::elf::is_relocatable;

type DwarfReader = EndianRcSlice<RunTimeEndian>;

/// A compile unit and the link-time PC ranges it covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugUnit {
    /// Source file of the unit, joined with its compilation directory
    pub name: String,
    pub ranges: Vec<Range<u64>>,
}

/// Innermost source location of an address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub function: Option<String>,
    /// The address belongs to an inlined call
    pub inline: bool,
}

/// Parsed debug info of one module
///
/// Not `Send`: it is only used while building the index.
pub struct DebugInfo {
    ctx: Context<DwarfReader>,
    units: Vec<DebugUnit>,
}

impl DebugInfo {
    /// Parse DWARF from an object file
    ///
    /// Relocatable objects get their absolute debug-section relocations
    /// applied first, otherwise every string and range reads as zero.
    ///
    /// # Errors
    /// Returns `NoDebugInfo` if `.debug_info` is missing or empty, cannot be
    /// parsed, or holds no compile units
    pub fn load(obj: &object::File<'_>, module: &str) -> Result<Self, CoverError> {
        let no_debug_info =
            |reason: String| CoverError::NoDebugInfo { module: module.to_string(), reason };

        if !obj.section_by_name(".debug_info").is_some_and(|s| s.size() > 0) {
            return Err(no_debug_info("no .debug_info section".to_string()));
        }

        let endian = if obj.is_little_endian() { RunTimeEndian::Little } else { RunTimeEndian::Big };

        let load_section = |id: gimli::SectionId| -> Result<DwarfReader, gimli::Error> {
            let data = obj.section_by_name(id.name()).map(|section| section_data(obj, &section));
            let data = data.unwrap_or_default();
            Ok(EndianRcSlice::new(Rc::from(&*data), endian))
        };

        let dwarf = gimli::Dwarf::load(&load_section).map_err(|e| no_debug_info(e.to_string()))?;
        let units = read_units(&dwarf).map_err(|e| no_debug_info(e.to_string()))?;
        if units.is_empty() {
            return Err(no_debug_info("no compile units".to_string()));
        }
        let ctx = Context::from_dwarf(dwarf).map_err(|e| no_debug_info(e.to_string()))?;

        Ok(Self { ctx, units })
    }

    #[must_use]
    pub fn units(&self) -> &[DebugUnit] {
        &self.units
    }

    /// Resolve a DWARF address to its innermost frame
    #[must_use]
    pub fn locate(&self, addr: u64) -> Option<SourceLocation> {
        let mut frames = self.ctx.find_frames(addr).skip_all_loads().ok()?;
        let innermost = frames.next().ok()??;
        let inline = matches!(frames.next(), Ok(Some(_)));

        let function = innermost
            .function
            .as_ref()
            .and_then(|f| f.demangle().ok().map(Cow::into_owned));

        let location = match innermost.location {
            Some(location) => location,
            None => self.ctx.find_location(addr).ok()??,
        };

        Some(SourceLocation {
            file: location.file?.to_string(),
            line: location.line.unwrap_or(0),
            column: location.column.unwrap_or(0),
            function,
            inline,
        })
    }
}

/// Section contents, decompressed and with relocations applied
fn section_data(obj: &object::File<'_>, section: &object::Section<'_, '_>) -> Vec<u8> {
    let mut data = section.uncompressed_data().map(Cow::into_owned).unwrap_or_default();
    if is_relocatable(obj) {
        apply_relocations(obj, section, &mut data);
    }
    data
}

fn apply_relocations(obj: &object::File<'_>, section: &object::Section<'_, '_>, data: &mut [u8]) {
    let endian = if obj.is_little_endian() { RunTimeEndian::Little } else { RunTimeEndian::Big };

    for (offset, relocation) in section.relocations() {
        if relocation.kind() != RelocationKind::Absolute {
            continue;
        }
        let target = match relocation.target() {
            RelocationTarget::Symbol(index) => obj.symbol_by_index(index).map(|s| s.address()),
            RelocationTarget::Section(index) => obj.section_by_index(index).map(|s| s.address()),
            _ => continue,
        };
        let Ok(target) = target else {
            continue;
        };

        let width = usize::from(relocation.size() / 8);
        if width != 4 && width != 8 {
            continue;
        }
        let Some(slot) = usize::try_from(offset).ok().and_then(|start| data.get_mut(start..start + width))
        else {
            continue;
        };

        let addend = if relocation.has_implicit_addend() {
            implicit_addend(slot, endian)
        } else {
            relocation.addend()
        };
        write_slot(slot, target.wrapping_add_signed(addend), endian);
    }
}

/// REL addends are signed in the slot's own width
fn implicit_addend(slot: &[u8], endian: RunTimeEndian) -> i64 {
    if slot.len() == 4 {
        i64::from(endian.read_i32(slot))
    } else {
        endian.read_i64(slot)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn write_slot(slot: &mut [u8], value: u64, endian: RunTimeEndian) {
    if slot.len() == 4 {
        endian.write_u32(slot, value as u32);
    } else {
        endian.write_u64(slot, value);
    }
}

fn read_units(dwarf: &gimli::Dwarf<DwarfReader>) -> Result<Vec<DebugUnit>, gimli::Error> {
    let mut units = Vec::new();
    let mut headers = dwarf.units();
    while let Some(header) = headers.next()? {
        let unit = dwarf.unit(header)?;
        let name = unit_name(&unit)?;

        let mut ranges = Vec::new();
        let mut iter = dwarf.unit_ranges(&unit)?;
        while let Some(range) = iter.next()? {
            if range.begin < range.end {
                ranges.push(range.begin..range.end);
            }
        }
        units.push(DebugUnit { name, ranges });
    }
    Ok(units)
}

fn unit_name(unit: &gimli::Unit<DwarfReader>) -> Result<String, gimli::Error> {
    let Some(name) = unit.name.as_ref() else {
        return Ok(String::new());
    };
    let name = name.to_string_lossy()?.into_owned();
    match unit.comp_dir.as_ref() {
        Some(dir) if !Path::new(&name).is_absolute() => {
            let dir = dir.to_string_lossy()?;
            Ok(Path::new(&*dir).join(&name).to_string_lossy().into_owned())
        }
        _ => Ok(name),
    }
}

/// Offset between link-time addresses and DWARF addresses
///
/// Images linked with `--emit-relocs` (KASLR kernels, PIE fixtures) can
/// carry debug info whose ranges start near zero while symbols sit at the
/// `.text` address. That shows up as no unit range overlapping `.text`;
/// in that case DWARF addresses are `.text`-relative.
#[must_use]
pub fn debug_bias(text: Option<&Range<u64>>, units: &[DebugUnit], has_text_relocations: bool) -> u64 {
    let Some(text) = text else {
        return 0;
    };
    if !has_text_relocations || text.start == 0 {
        return 0;
    }

    let mut ranges = units.iter().flat_map(|u| u.ranges.iter()).peekable();
    if ranges.peek().is_none() {
        return 0;
    }
    let overlaps_text = ranges.any(|r| r.start < text.end && text.start < r.end);
    if overlaps_text {
        0
    } else {
        text.start
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolization::elf::text_symbols;

    fn unit(ranges: &[Range<u64>]) -> DebugUnit {
        DebugUnit { name: "main.c".to_string(), ranges: ranges.to_vec() }
    }

    #[test]
    fn test_debug_bias_for_relative_ranges() {
        let text = 0x3330_0000..0x3330_1000;
        let units = [unit(&[0x100..0x120])];
        assert_eq!(debug_bias(Some(&text), &units, true), 0x3330_0000);
    }

    #[test]
    fn test_no_bias_when_ranges_match_text() {
        let text = 0x3330_0000..0x3330_1000;
        let units = [unit(&[0x3330_0100..0x3330_0120])];
        assert_eq!(debug_bias(Some(&text), &units, true), 0);
    }

    #[test]
    fn test_no_bias_without_relocations() {
        let text = 0x40_1000..0x40_2000;
        let units = [unit(&[0x100..0x120])];
        assert_eq!(debug_bias(Some(&text), &units, false), 0);
        assert_eq!(debug_bias(None, &units, true), 0);
        assert_eq!(debug_bias(Some(&text), &[unit(&[])], true), 0);
    }

    #[test]
    fn test_implicit_addend_is_sign_extended() {
        assert_eq!(implicit_addend(&(-4_i32).to_le_bytes(), RunTimeEndian::Little), -4);
        assert_eq!(implicit_addend(&0x10_u64.to_le_bytes(), RunTimeEndian::Little), 0x10);
    }

    #[test]
    fn test_write_slot_both_endians() {
        let mut slot = [0u8; 4];
        write_slot(&mut slot, 0x1234_5678, RunTimeEndian::Little);
        assert_eq!(slot, [0x78, 0x56, 0x34, 0x12]);
        assert_eq!(implicit_addend(&slot, RunTimeEndian::Little), 0x1234_5678);

        write_slot(&mut slot, 0x1234_5678, RunTimeEndian::Big);
        assert_eq!(slot, [0x12, 0x34, 0x56, 0x78]);
        assert_eq!(implicit_addend(&slot, RunTimeEndian::Big), 0x1234_5678);

        let mut wide = [0u8; 8];
        write_slot(&mut wide, 0xffff_ffff_8100_0000, RunTimeEndian::Big);
        assert_eq!(wide, 0xffff_ffff_8100_0000_u64.to_be_bytes());
        assert_eq!(implicit_addend(&wide, RunTimeEndian::Big), 0xffff_ffff_8100_0000_u64 as i64);
    }

    #[test]
    fn test_locate_own_function() {
        let data = std::fs::read(std::env::current_exe().unwrap()).unwrap();
        let obj = object::File::parse(&*data).unwrap();
        let Ok(debug) = DebugInfo::load(&obj, "self") else {
            // Built without debug info
            return;
        };
        assert!(!debug.units().is_empty());

        let symbol = text_symbols(&obj)
            .into_iter()
            .find(|s| s.name.ends_with("tests::test_locate_own_function"))
            .unwrap();
        let location = debug.locate(symbol.start).unwrap();
        assert!(location.file.ends_with("dwarf.rs"), "{location:?}");
        assert!(location.line > 0);
    }
}
