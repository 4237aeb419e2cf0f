//! Main image lookup and validation

use crate::domain::{CoverError, Module};
use crate::targets::Target;
use log::info;
use object::{Object, ObjectSection};
use std::fs;
use std::path::Path;

/// Open the target's main image inside `kernel_obj_dir`
///
/// # Errors
/// Returns `Discovery` if the image is missing, is not an object file, or
/// was built for a different architecture than the target
pub fn open_main_image(target: &Target, kernel_obj_dir: &Path) -> Result<Module, CoverError> {
    let path = kernel_obj_dir.join(target.kernel_object);
    let data = fs::read(&path)
        .map_err(|e| discovery_error(target, &path, format!("failed to read image: {e}")))?;
    let obj = object::File::parse(&*data)
        .map_err(|e| discovery_error(target, &path, format!("not an object file: {e}")))?;
    check_architecture(target, &path, &obj)?;

    let size = obj.section_by_name(".text").map_or(0, |s| s.size());
    info!("Main image {} (.text: {} KB)", path.display(), size / 1024);
    Ok(Module::main_image(path, size))
}

/// Reject images whose ELF machine doesn't match the target
///
/// # Errors
/// Returns `Discovery` describing both architectures
pub fn check_architecture(
    target: &Target,
    path: &Path,
    obj: &object::File<'_>,
) -> Result<(), CoverError> {
    let expected = target.arch.object_architecture();
    let actual = obj.architecture();
    if actual != expected {
        return Err(discovery_error(
            target,
            path,
            format!("inconsistent architecture: image is {actual:?}, target expects {expected:?}"),
        ));
    }
    Ok(())
}

pub(crate) fn discovery_error(target: &Target, path: &Path, reason: String) -> CoverError {
    CoverError::Discovery { target: target.key(), path: path.display().to_string(), reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::targets::TargetRegistry;

    #[test]
    fn test_missing_image() {
        let registry = TargetRegistry::builtin();
        let target = registry.get("linux/amd64").unwrap();
        let dir = tempfile::tempdir().unwrap();

        let err = open_main_image(target, dir.path()).unwrap_err();
        assert!(matches!(err, CoverError::Discovery { .. }));
        assert!(err.to_string().contains("vmlinux"));
        assert!(err.to_string().contains("linux/amd64"));
    }

    #[test]
    fn test_not_an_object_file() {
        let registry = TargetRegistry::builtin();
        let target = registry.get("linux/amd64").unwrap();
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("vmlinux"), b"#!/bin/sh\necho hi\n").unwrap();

        let err = open_main_image(target, dir.path()).unwrap_err();
        assert!(err.to_string().contains("not an object file"));
    }
}
