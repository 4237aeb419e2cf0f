//! Report configuration
//!
//! A JSON file describing one target build:
//!
//! ```json
//! {
//!   "target": "linux/amd64",
//!   "kernel_obj": "/build/linux",
//!   "module_obj": ["/build/out-of-tree"],
//!   "kernel_src": "/src/linux",
//!   "kernel_build_src": "/build/linux",
//!   "loaded_modules": "/tmp/proc-modules.txt",
//!   "subsystems": [{"name": "sound", "paths": ["sound", "-sound/soc"]}]
//! }
//! ```

use crate::domain::ConfigError;
use crate::subsystems::{validate, Subsystem};
use crate::symbolization::BuildOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsystemConfig {
    pub name: String,
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoverConfig {
    /// `os/arch` key into the target table
    pub target: String,
    /// Directory holding the main image (and in-tree modules)
    pub kernel_obj: PathBuf,
    /// Extra directories searched for loadable modules
    #[serde(default)]
    pub module_obj: Vec<PathBuf>,
    /// Source tree, used to strip paths and to show source in HTML
    #[serde(default)]
    pub kernel_src: Option<PathBuf>,
    /// Directory the build ran in, if different from `kernel_src`
    #[serde(default)]
    pub kernel_build_src: Option<PathBuf>,
    /// Captured `/proc/modules` of the fuzzed machine
    #[serde(default)]
    pub loaded_modules: Option<PathBuf>,
    #[serde(default)]
    pub subsystems: Vec<SubsystemConfig>,
    /// Accept images without DWARF, with function-level coverage only
    #[serde(default)]
    pub symbols_only: bool,
}

impl CoverConfig {
    #[must_use]
    pub fn new(target: impl Into<String>, kernel_obj: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            kernel_obj: kernel_obj.into(),
            module_obj: Vec::new(),
            kernel_src: None,
            kernel_build_src: None,
            loaded_modules: None,
            subsystems: Vec::new(),
            symbols_only: false,
        }
    }

    /// Read a JSON config file
    ///
    /// # Errors
    /// Returns `Read` if the file can't be read and `Parse` if it isn't a
    /// valid config
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.display().to_string(), source })?;
        serde_json::from_str(&text)
            .map_err(|source| ConfigError::Parse { path: path.display().to_string(), source })
    }

    /// Parsed and validated subsystem rules
    ///
    /// # Errors
    /// Returns `InvalidSubsystem` for empty or duplicate entries
    pub fn subsystems(&self) -> Result<Vec<Subsystem>, ConfigError> {
        let subsystems = self
            .subsystems
            .iter()
            .map(|s| Subsystem::try_from_paths(&s.name, &s.paths))
            .collect::<Result<Vec<_>, _>>()?;
        validate(&subsystems)?;
        Ok(subsystems)
    }

    /// Symbolizer options; the build dir defaults to the source dir
    #[must_use]
    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            symbols_only: self.symbols_only,
            kernel_src: self.kernel_src.clone(),
            kernel_build_src: self.kernel_build_src.clone().or_else(|| self.kernel_src.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_minimal_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cover.json");
        fs::write(&path, r#"{"target": "linux/amd64", "kernel_obj": "/build"}"#).unwrap();

        let config = CoverConfig::load(&path).unwrap();
        assert_eq!(config, CoverConfig::new("linux/amd64", "/build"));
        assert!(config.subsystems().unwrap().is_empty());
    }

    #[test]
    fn test_build_src_defaults_to_src() {
        let mut config = CoverConfig::new("linux/amd64", "/build");
        config.kernel_src = Some(PathBuf::from("/src"));
        assert_eq!(config.build_options().kernel_build_src, Some(PathBuf::from("/src")));

        config.kernel_build_src = Some(PathBuf::from("/out"));
        assert_eq!(config.build_options().kernel_build_src, Some(PathBuf::from("/out")));
    }

    #[test]
    fn test_subsystems_parsed() {
        let mut config = CoverConfig::new("linux/amd64", "/build");
        config.subsystems = vec![SubsystemConfig {
            name: "sound".to_string(),
            paths: vec!["sound".to_string(), "-sound/soc".to_string()],
        }];
        let subsystems = config.subsystems().unwrap();
        assert!(subsystems[0].matches("sound/core/pcm.c"));
        assert!(!subsystems[0].matches("sound/soc/codec.c"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cover.json");
        fs::write(&path, r#"{"target": "linux/amd64", "kernel_obj": "/b", "kernel_objs": []}"#).unwrap();

        let err = CoverConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_missing_config() {
        let err = CoverConfig::load(Path::new("/nonexistent/cover.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
