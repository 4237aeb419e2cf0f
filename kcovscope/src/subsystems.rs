//! Subsystem grouping
//!
//! A subsystem is a named set of path prefix rules, written the way kernel
//! maintainers list them: `"sound"` includes everything under `sound/`,
//! `"-sound/soc"` carves a subtree back out. Prefixes match whole path
//! segments, so `sound` does not match `soundwire/`.
//!
//! For each file the longest matching include and the longest matching
//! exclude are compared by segment count; the exclude wins ties.

use crate::coverage::FileStat;
use crate::domain::ConfigError;
use std::collections::{BTreeMap, HashSet};

/// Name of the catch-all subsystem used when none are configured
pub const ALL_SUBSYSTEM: &str = "all";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Include,
    Exclude,
}

/// One `prefix` / `-prefix` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRule {
    pub prefix: String,
    pub polarity: Polarity,
}

impl PathRule {
    /// Parse the compact form; a leading `-` marks an exclusion
    #[must_use]
    pub fn parse(rule: &str) -> Self {
        let (polarity, prefix) = match rule.strip_prefix('-') {
            Some(rest) => (Polarity::Exclude, rest),
            None => (Polarity::Include, rule),
        };
        Self { prefix: prefix.trim_matches('/').to_string(), polarity }
    }

    /// Segment count of the prefix; the empty prefix has none
    #[must_use]
    pub fn depth(&self) -> usize {
        if self.prefix.is_empty() {
            0
        } else {
            self.prefix.split('/').count()
        }
    }

    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        if self.prefix.is_empty() {
            return true;
        }
        let path = path.trim_start_matches('/');
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subsystem {
    pub name: String,
    pub rules: Vec<PathRule>,
}

impl Subsystem {
    #[must_use]
    pub fn from_paths<S: AsRef<str>>(name: impl Into<String>, paths: &[S]) -> Self {
        Self { name: name.into(), rules: paths.iter().map(|p| PathRule::parse(p.as_ref())).collect() }
    }

    /// Like [`Subsystem::from_paths`], rejecting empty names and bare `-`
    ///
    /// # Errors
    /// Returns `InvalidSubsystem` describing the offending entry
    pub fn try_from_paths<S: AsRef<str>>(name: &str, paths: &[S]) -> Result<Self, ConfigError> {
        let invalid =
            |reason: String| ConfigError::InvalidSubsystem { name: name.to_string(), reason };
        if name.trim().is_empty() {
            return Err(invalid("empty name".to_string()));
        }
        if paths.is_empty() {
            return Err(invalid("no paths".to_string()));
        }
        if let Some(bad) = paths.iter().map(AsRef::as_ref).find(|p| p.trim_matches('/') == "-") {
            return Err(invalid(format!("exclusion without a prefix: {bad:?}")));
        }
        Ok(Self::from_paths(name, paths))
    }

    /// The catch-all subsystem
    #[must_use]
    pub fn all() -> Self {
        Self::from_paths(ALL_SUBSYSTEM, &[""])
    }

    /// Whether a source path belongs to this subsystem
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        let longest = |polarity: Polarity| {
            self.rules
                .iter()
                .filter(|r| r.polarity == polarity && r.matches(path))
                .map(PathRule::depth)
                .max()
        };
        match (longest(Polarity::Include), longest(Polarity::Exclude)) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(include), Some(exclude)) => include > exclude,
        }
    }
}

/// Check a configured subsystem list
///
/// # Errors
/// Returns `InvalidSubsystem` for duplicate names
pub fn validate(subsystems: &[Subsystem]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for subsystem in subsystems {
        if !seen.insert(subsystem.name.as_str()) {
            return Err(ConfigError::InvalidSubsystem {
                name: subsystem.name.clone(),
                reason: "defined more than once".to_string(),
            });
        }
    }
    Ok(())
}

/// Summed coverage of one subsystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsystemStat {
    pub name: String,
    pub stat: FileStat,
    pub files: usize,
}

impl SubsystemStat {
    /// Keyed view used by the summary renderers
    #[must_use]
    pub fn formatted(&self) -> BTreeMap<&'static str, String> {
        BTreeMap::from([
            ("name", self.name.clone()),
            ("lines", self.stat.lines()),
            ("PCsInFiles", self.stat.pcs_in_files()),
            ("Funcs", self.stat.funcs()),
            ("PCsInFuncs", self.stat.pcs_in_funcs()),
            ("PCsInCoveredFuncs", self.stat.pcs_in_covered_funcs()),
        ])
    }
}

/// Sum file statistics per subsystem
///
/// Raw counts are added; percentages are only computed when formatting.
/// Without configured subsystems everything lands in [`ALL_SUBSYSTEM`].
#[must_use]
pub fn group_by_subsystems(
    files: &[FileStat],
    subsystems: &[Subsystem],
) -> BTreeMap<String, SubsystemStat> {
    let fallback = [Subsystem::all()];
    let subsystems = if subsystems.is_empty() { &fallback[..] } else { subsystems };

    subsystems
        .iter()
        .map(|subsystem| {
            let mut stat = FileStat::named(subsystem.name.clone());
            let mut count = 0;
            for file in files.iter().filter(|f| subsystem.matches(&f.name)) {
                stat.add(file);
                count += 1;
            }
            (subsystem.name.clone(), SubsystemStat { name: subsystem.name.clone(), stat, files: count })
        })
        .collect()
}
