//! Runtime load addresses of kernel modules
//!
//! Relocatable modules only get an address once the kernel loads them. This
//! module parses `/proc/modules` output captured from the fuzzed machine and
//! places the discovered modules at those addresses.

use crate::domain::{CoverError, Module};
use log::{debug, info};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// One entry of `/proc/modules`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedModule {
    pub name: String,
    pub address: u64,
    pub size: u64,
}

/// Parse `/proc/modules` text
///
/// Lines look like `e1000 151552 0 - Live 0xffffffffc0312000`. Entries whose
/// address is hidden (zero, as with `kptr_restrict`) or unparseable are
/// skipped.
#[must_use]
pub fn parse_loaded_modules(text: &str) -> Vec<LoadedModule> {
    let mut modules = Vec::new();

    for line in text.lines() {
        // Parse the line: "name size refcnt deps state address"
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 6 {
            continue;
        }
        let Ok(size) = parts[1].parse::<u64>() else {
            continue;
        };
        let addr = parts[5].trim_start_matches("0x");
        let Ok(address) = u64::from_str_radix(addr, 16) else {
            continue;
        };
        if address == 0 {
            debug!("Module {} has a hidden load address, skipping", parts[0]);
            continue;
        }
        modules.push(LoadedModule { name: parts[0].to_string(), address, size });
    }

    modules
}

/// Read and parse a captured `/proc/modules` file
///
/// # Errors
/// Returns an error if the file cannot be read
pub fn read_loaded_modules(path: &Path) -> Result<Vec<LoadedModule>, CoverError> {
    let text = fs::read_to_string(path)?;
    let modules = parse_loaded_modules(&text);
    info!("Read {} loaded modules from {}", modules.len(), path.display());
    Ok(modules)
}

/// Place discovered modules at their runtime addresses
///
/// Returns a new list; the main image is passed through unchanged and modules
/// the kernel did not load keep a zero base.
#[must_use]
pub fn apply_load_addresses(modules: &[Module], loaded: &[LoadedModule]) -> Vec<Module> {
    let by_name: HashMap<&str, &LoadedModule> =
        loaded.iter().map(|m| (m.name.as_str(), m)).collect();

    modules
        .iter()
        .map(|module| {
            let mut placed = module.clone();
            if module.is_main() {
                return placed;
            }
            if let Some(entry) = by_name.get(module.name.as_str()) {
                placed.base_address = entry.address;
                placed.size = entry.size;
                info!(
                    "Module {}: 0x{:x} - 0x{:x} (size: {} KB)",
                    module.name,
                    entry.address,
                    entry.address + entry.size,
                    entry.size / 1024
                );
            }
            placed
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const PROC_MODULES: &str = "\
snd_pcm 151552 2 snd_hda_intel, Live 0xffffffffc0a00000
e1000 155648 0 - Live 0xffffffffc0312000
hidden 4096 0 - Live 0x0000000000000000
garbage line
";

    #[test]
    fn test_parse_loaded_modules() {
        let modules = parse_loaded_modules(PROC_MODULES);
        assert_eq!(modules.len(), 2);
        assert_eq!(modules[0].name, "snd_pcm");
        assert_eq!(modules[0].address, 0xffff_ffff_c0a0_0000);
        assert_eq!(modules[1].size, 155_648);
    }

    #[test]
    fn test_apply_load_addresses() {
        let modules = vec![
            Module::main_image(PathBuf::from("vmlinux"), 0x100),
            Module::loaded("e1000", PathBuf::from("drivers/e1000.ko")),
            Module::loaded("not_loaded", PathBuf::from("drivers/x.ko")),
        ];
        let placed = apply_load_addresses(&modules, &parse_loaded_modules(PROC_MODULES));

        assert_eq!(placed[0], modules[0]);
        assert_eq!(placed[1].base_address, 0xffff_ffff_c031_2000);
        assert_eq!(placed[1].size, 155_648);
        assert!(!placed[2].is_placed());
        // Inputs are left untouched
        assert_eq!(modules[1].base_address, 0);
    }
}
