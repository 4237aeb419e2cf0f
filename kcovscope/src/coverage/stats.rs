//! Coverage counters and their formatting

use serde::Serialize;

/// Coverage of one source file
///
/// Every `covered_*` counter is at most its `total_*` counterpart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileStat {
    pub name: String,
    pub covered_lines: usize,
    pub total_lines: usize,
    pub covered_pcs: usize,
    pub total_pcs: usize,
    pub total_functions: usize,
    pub covered_functions: usize,
    pub covered_pcs_in_functions: usize,
    pub total_pcs_in_covered_functions: usize,
    pub total_pcs_in_functions: usize,
}

impl FileStat {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    /// Add another file's counters into this one
    pub fn add(&mut self, other: &FileStat) {
        self.covered_lines += other.covered_lines;
        self.total_lines += other.total_lines;
        self.covered_pcs += other.covered_pcs;
        self.total_pcs += other.total_pcs;
        self.total_functions += other.total_functions;
        self.covered_functions += other.covered_functions;
        self.covered_pcs_in_functions += other.covered_pcs_in_functions;
        self.total_pcs_in_covered_functions += other.total_pcs_in_covered_functions;
        self.total_pcs_in_functions += other.total_pcs_in_functions;
    }

    #[must_use]
    pub fn lines(&self) -> String {
        ratio(self.covered_lines, self.total_lines)
    }

    #[must_use]
    pub fn pcs_in_files(&self) -> String {
        ratio(self.covered_pcs, self.total_pcs)
    }

    #[must_use]
    pub fn funcs(&self) -> String {
        ratio(self.covered_functions, self.total_functions)
    }

    #[must_use]
    pub fn pcs_in_funcs(&self) -> String {
        ratio(self.covered_pcs_in_functions, self.total_pcs_in_functions)
    }

    #[must_use]
    pub fn pcs_in_covered_funcs(&self) -> String {
        ratio(self.covered_pcs_in_functions, self.total_pcs_in_covered_functions)
    }
}

/// Coverage of one function
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FuncStat {
    pub module: String,
    pub file: String,
    pub name: String,
    pub line: u32,
    pub covered_pcs: usize,
    pub total_pcs: usize,
}

impl FuncStat {
    #[must_use]
    pub fn percent(&self) -> f64 {
        percent(self.covered_pcs, self.total_pcs)
    }
}

/// `covered / total`, 0 when there is nothing to cover
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn percent(covered: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    covered as f64 * 100.0 / total as f64
}

/// Render a `covered / total / NN.NN%` triple
#[must_use]
pub fn ratio(covered: usize, total: usize) -> String {
    format!("{covered} / {total} / {:.2}%", percent(covered, total))
}
