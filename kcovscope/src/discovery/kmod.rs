//! Linux `.ko` module discovery

use super::image::{check_architecture, discovery_error};
use crate::domain::{CoverError, Module};
use crate::targets::Target;
use log::{debug, warn};
use object::{Object, ObjectSection};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Find every `.ko` under the given directories
///
/// Modules are keyed by their kernel name; when the same name shows up twice
/// the first path found wins. The result is ordered by name.
///
/// # Errors
/// Returns `Discovery` if a directory cannot be read or a module was built
/// for another architecture
pub fn find_kernel_modules(target: &Target, dirs: &[PathBuf]) -> Result<Vec<Module>, CoverError> {
    let mut found: BTreeMap<String, PathBuf> = BTreeMap::new();

    for dir in dirs {
        let mut paths = Vec::new();
        collect_ko_files(dir, &mut paths)
            .map_err(|e| discovery_error(target, dir, format!("failed to scan modules: {e}")))?;
        paths.sort();

        for path in paths {
            let Ok(data) = fs::read(&path) else {
                warn!("Failed to read module {}, skipping", path.display());
                continue;
            };
            let obj = match object::File::parse(&*data) {
                Ok(obj) => obj,
                Err(e) => {
                    warn!("Failed to parse module {}: {e}", path.display());
                    continue;
                }
            };
            check_architecture(target, &path, &obj)?;

            let name = module_name(&path, &obj);
            if found.contains_key(&name) {
                debug!("Duplicate module {name} at {}, keeping the first", path.display());
                continue;
            }
            found.insert(name, path);
        }
    }

    Ok(found.into_iter().map(|(name, path)| Module::loaded(name, path)).collect())
}

fn collect_ko_files(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let path = entry.path();
        if file_type.is_dir() {
            collect_ko_files(&path, out)?;
        } else if file_type.is_file() && path.extension().is_some_and(|ext| ext == "ko") {
            out.push(path);
        }
    }
    Ok(())
}

/// Kernel name of a module: `.modinfo` `name=` entry, else the file stem
/// with dashes turned into underscores (what `insmod` does)
fn module_name(path: &Path, obj: &object::File<'_>) -> String {
    if let Some(name) = obj
        .section_by_name(".modinfo")
        .and_then(|s| s.data().ok())
        .and_then(modinfo_name)
    {
        return name;
    }
    path.file_stem().map(|s| s.to_string_lossy().replace('-', "_")).unwrap_or_default()
}

fn modinfo_name(modinfo: &[u8]) -> Option<String> {
    modinfo
        .split(|&b| b == 0)
        .filter_map(|entry| std::str::from_utf8(entry).ok())
        .find_map(|entry| entry.strip_prefix("name="))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}
