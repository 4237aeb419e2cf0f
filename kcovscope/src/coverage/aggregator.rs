//! Reconcile traced PCs with the callback index

use super::stats::{FileStat, FuncStat};
use crate::domain::{CoverError, Frame};
use crate::symbolization::CoverIndex;
use kcovscope_common::Program;
use log::debug;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Per-call aggregation knobs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportOptions {
    /// Render even if some traced PCs match no callback
    pub tolerate_mismatch: bool,
    /// Render an empty report instead of failing when nothing was traced
    pub allow_empty: bool,
    /// Traced PCs already point at call sites; skip return-address adjustment
    pub pcs_are_call_sites: bool,
}

/// Covered callback PCs of one program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramCoverage {
    pub name: String,
    /// Sorted, deduplicated callback PCs
    pub pcs: Vec<u64>,
}

/// Result of folding a program batch into the index
#[derive(Debug, Clone)]
pub struct Aggregate {
    /// Number of programs that covered each callback PC
    pub pc_hits: BTreeMap<u64, u32>,
    pub programs: Vec<ProgramCoverage>,
    /// Sorted by file name
    pub file_stats: Vec<FileStat>,
    /// Sorted by (module, file, function)
    pub func_stats: Vec<FuncStat>,
    /// Distinct traced PCs that mapped to nothing (inexact mode only)
    pub unresolved: usize,
    pub precise: bool,
}

impl Aggregate {
    #[must_use]
    pub fn is_covered(&self, pc: u64) -> bool {
        self.pc_hits.contains_key(&pc)
    }

    #[must_use]
    pub fn hits(&self, pc: u64) -> u32 {
        self.pc_hits.get(&pc).copied().unwrap_or(0)
    }
}

/// Fold a program batch into coverage
///
/// `adjust` maps each traced PC to the call site it came from. Programs are
/// copied; the batch is never modified.
///
/// # Errors
/// - `NoPcsCollected` when the batch has no PCs and `allow_empty` is off
/// - `NoMatchingCallbacks` when no traced PC maps to a callback
/// - `PcMismatch` when precise coverage finds unmatched PCs and
///   `tolerate_mismatch` is off
pub fn aggregate(
    index: &CoverIndex,
    programs: &[Program],
    options: ReportOptions,
    adjust: impl Fn(u64) -> u64,
) -> Result<Aggregate, CoverError> {
    let traced: Vec<(String, Vec<u64>)> = programs
        .iter()
        .map(|prog| {
            let mut pcs: Vec<u64> = prog.traced_pcs.iter().map(|&pc| adjust(pc)).collect();
            pcs.sort_unstable();
            pcs.dedup();
            (prog.display_name(), pcs)
        })
        .collect();

    let distinct: BTreeSet<u64> = traced.iter().flat_map(|(_, pcs)| pcs.iter().copied()).collect();
    debug!("Aggregating {} programs, {} distinct PCs", programs.len(), distinct.len());
    if distinct.is_empty() && !options.allow_empty {
        return Err(CoverError::NoPcsCollected);
    }

    let (covered, unresolved) = if index.precise() {
        (reconcile_precise(index, &traced, &distinct, options)?, 0)
    } else {
        reconcile_inexact(index, &traced, &distinct)?
    };

    let mut pc_hits = BTreeMap::new();
    for prog in &covered {
        for &pc in &prog.pcs {
            *pc_hits.entry(pc).or_insert(0) += 1;
        }
    }

    let file_stats = file_stats(index, &pc_hits);
    let func_stats = func_stats(index, &pc_hits);
    Ok(Aggregate {
        pc_hits,
        programs: covered,
        file_stats,
        func_stats,
        unresolved,
        precise: index.precise(),
    })
}

fn reconcile_precise(
    index: &CoverIndex,
    traced: &[(String, Vec<u64>)],
    distinct: &BTreeSet<u64>,
    options: ReportOptions,
) -> Result<Vec<ProgramCoverage>, CoverError> {
    let unmatched = distinct.iter().filter(|&&pc| !index.is_callback(pc)).count();
    if !distinct.is_empty() && unmatched == distinct.len() {
        return Err(CoverError::NoMatchingCallbacks { total: distinct.len() });
    }
    if unmatched > 0 {
        if !options.tolerate_mismatch {
            return Err(CoverError::PcMismatch { unmatched, total: distinct.len() });
        }
        debug!("Ignoring {unmatched} PCs without a matching callback");
    }

    Ok(traced
        .iter()
        .map(|(name, pcs)| ProgramCoverage {
            name: name.clone(),
            pcs: pcs.iter().copied().filter(|&pc| index.is_callback(pc)).collect(),
        })
        .collect())
}

fn reconcile_inexact(
    index: &CoverIndex,
    traced: &[(String, Vec<u64>)],
    distinct: &BTreeSet<u64>,
) -> Result<(Vec<ProgramCoverage>, usize), CoverError> {
    let mut unresolved = HashSet::new();
    let mut any_covered = false;

    let covered = traced
        .iter()
        .map(|(name, pcs)| {
            let mut covered = BTreeSet::new();
            for &pc in pcs {
                if let Some(symbol) = index.symbol_for(pc).filter(|s| !s.pcs.is_empty()) {
                    covered.extend(symbol.pcs.iter().copied());
                } else if index.is_callback(pc) {
                    covered.insert(pc);
                } else {
                    unresolved.insert(pc);
                }
            }
            any_covered |= !covered.is_empty();
            ProgramCoverage { name: name.clone(), pcs: covered.into_iter().collect() }
        })
        .collect();

    if !distinct.is_empty() && !any_covered {
        return Err(CoverError::NoMatchingCallbacks { total: distinct.len() });
    }
    if !unresolved.is_empty() {
        debug!("{} traced PCs fall outside every function", unresolved.len());
    }
    Ok((covered, unresolved.len()))
}

#[derive(Default)]
struct FileAccumulator {
    lines: BTreeSet<u32>,
    covered_lines: BTreeSet<u32>,
    stat: FileStat,
}

fn file_stats(index: &CoverIndex, pc_hits: &BTreeMap<u64, u32>) -> Vec<FileStat> {
    let mut files: BTreeMap<&str, FileAccumulator> = BTreeMap::new();

    for frame in index.frames() {
        let acc = files.entry(frame.file_path.as_str()).or_default();
        let hit = pc_hits.contains_key(&frame.pc);
        acc.stat.total_pcs += 1;
        if hit {
            acc.stat.covered_pcs += 1;
        }
        if frame.has_line() {
            acc.lines.insert(frame.line);
            if hit {
                acc.covered_lines.insert(frame.line);
            }
        }
    }

    for symbol in index.symbols().iter().filter(|s| !s.pcs.is_empty()) {
        let acc = files.entry(symbol.file.as_str()).or_default();
        let covered = symbol.pcs.iter().filter(|pc| pc_hits.contains_key(pc)).count();
        acc.stat.total_functions += 1;
        acc.stat.total_pcs_in_functions += symbol.pcs.len();
        acc.stat.covered_pcs_in_functions += covered;
        if covered > 0 {
            acc.stat.covered_functions += 1;
            acc.stat.total_pcs_in_covered_functions += symbol.pcs.len();
        }
    }

    files
        .into_iter()
        .map(|(name, acc)| FileStat {
            name: name.to_string(),
            total_lines: acc.lines.len(),
            covered_lines: acc.covered_lines.len(),
            ..acc.stat
        })
        .collect()
}

fn func_stats(index: &CoverIndex, pc_hits: &BTreeMap<u64, u32>) -> Vec<FuncStat> {
    let mut stats: Vec<FuncStat> = index
        .symbols()
        .iter()
        .filter(|s| !s.pcs.is_empty())
        .map(|s| FuncStat {
            module: index.modules().get(s.module).map(|m| m.display_name()).unwrap_or_default(),
            file: s.file.clone(),
            name: s.name.clone(),
            line: s.line,
            covered_pcs: s.pcs.iter().filter(|pc| pc_hits.contains_key(pc)).count(),
            total_pcs: s.pcs.len(),
        })
        .collect();
    stats.sort_by(|a, b| (&a.module, &a.file, &a.name).cmp(&(&b.module, &b.file, &b.name)));
    stats
}

/// Covered frames of a program, grouped by file then function
///
/// Lines inside a function are sorted and deduplicated.
#[must_use]
pub fn program_files<'a>(
    index: &'a CoverIndex,
    program: &ProgramCoverage,
) -> BTreeMap<&'a str, BTreeMap<&'a str, Vec<u32>>> {
    let mut files: BTreeMap<&str, BTreeMap<&str, Vec<u32>>> = BTreeMap::new();
    for frame in program.pcs.iter().filter_map(|&pc| index.frame(pc)) {
        files
            .entry(frame.file_path.as_str())
            .or_default()
            .entry(frame.function_name.as_str())
            .or_default()
            .push(frame.line);
    }
    for lines in files.values_mut().flat_map(BTreeMap::values_mut) {
        lines.sort_unstable();
        lines.dedup();
    }
    files
}

/// Frames of one file, grouped by function in PC order
#[must_use]
pub fn file_frames<'a>(index: &'a CoverIndex, file: &str) -> BTreeMap<&'a str, Vec<&'a Frame>> {
    let mut functions: BTreeMap<&str, Vec<&Frame>> = BTreeMap::new();
    for frame in index.frames().iter().filter(|f| f.file_path == file) {
        functions.entry(frame.function_name.as_str()).or_default().push(frame);
    }
    functions
}
