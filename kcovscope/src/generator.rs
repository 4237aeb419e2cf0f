//! Report session
//!
//! A [`ReportGenerator`] is built once per (target, module set). Building it
//! does all of the expensive work: placing modules, parsing symbols and
//! DWARF, and indexing every coverage callback. After that the session is
//! immutable and any number of render calls, from any number of threads,
//! can share it.
//!
//! ```text
//! CoverConfig ──► discover_modules ──► ReportGenerator::new ──► CoverIndex
//!                                               │
//!            HandlerParams ──► do_html / do_func_cover / ... ──► Write
//! ```

use crate::backend::backend_for;
use crate::config::CoverConfig;
use crate::coverage::{aggregate, Aggregate, ReportOptions};
use crate::discovery::{apply_load_addresses, discover_modules, read_loaded_modules};
use crate::domain::{CoverError, Module};
use crate::report::{
    render_files, render_files_jsonl, render_functions, render_html, render_programs_jsonl,
    render_subsystems, ReportKind,
};
use crate::subsystems::{group_by_subsystems, Subsystem};
use crate::symbolization::CoverIndex;
use crate::targets::{Target, TargetRegistry};
use kcovscope_common::HandlerParams;
use log::info;
use std::io::Write;
use std::path::PathBuf;

pub struct ReportGenerator {
    target: Target,
    index: CoverIndex,
    subsystems: Vec<Subsystem>,
    kernel_src: Option<PathBuf>,
    options: ReportOptions,
}

impl ReportGenerator {
    /// Build a session over already discovered modules
    ///
    /// Load addresses from `config.loaded_modules` are applied to a copy of
    /// `modules` before symbolization.
    ///
    /// # Errors
    /// Any construction error: unknown target, invalid subsystems, missing
    /// debug info, or no coverage callbacks
    pub fn new(
        config: &CoverConfig,
        registry: &TargetRegistry,
        modules: &[Module],
    ) -> Result<Self, CoverError> {
        let target = registry.get(&config.target)?.clone();
        let subsystems = config.subsystems()?;

        let placed = match &config.loaded_modules {
            Some(path) => apply_load_addresses(modules, &read_loaded_modules(path)?),
            None => modules.to_vec(),
        };

        let index =
            backend_for(&target).build_symbol_index(&target, &placed, &config.build_options())?;
        info!(
            "Report session for {target}: {} modules, {} callbacks, precise: {}",
            placed.len(),
            index.frames().len(),
            index.precise()
        );

        Ok(Self {
            target,
            index,
            subsystems,
            kernel_src: config.kernel_src.clone(),
            options: ReportOptions::default(),
        })
    }

    /// Discover modules from the config and build a session over them
    ///
    /// # Errors
    /// See [`discover_modules`] and [`ReportGenerator::new`]
    pub fn from_config(config: &CoverConfig, registry: &TargetRegistry) -> Result<Self, CoverError> {
        let target = registry.get(&config.target)?;
        let modules = discover_modules(target, &config.kernel_obj, &config.module_obj)?;
        Self::new(config, registry, &modules)
    }

    /// Session over a prebuilt index
    #[must_use]
    pub fn from_index(target: Target, index: CoverIndex, subsystems: Vec<Subsystem>) -> Self {
        Self { target, index, subsystems, kernel_src: None, options: ReportOptions::default() }
    }

    #[must_use]
    pub fn with_options(mut self, options: ReportOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_kernel_src(mut self, kernel_src: Option<PathBuf>) -> Self {
        self.kernel_src = kernel_src;
        self
    }

    /// Whether traced PCs must match callbacks exactly
    #[must_use]
    pub fn precise_coverage(&self) -> bool {
        self.index.precise()
    }

    #[must_use]
    pub fn target(&self) -> &Target {
        &self.target
    }

    #[must_use]
    pub fn index(&self) -> &CoverIndex {
        &self.index
    }

    /// Fold a batch into coverage without rendering
    ///
    /// # Errors
    /// Per-call aggregation errors; the session stays usable
    pub fn aggregate(&self, params: &HandlerParams) -> Result<Aggregate, CoverError> {
        let backend = backend_for(&self.target);
        let call_sites = self.options.pcs_are_call_sites;
        aggregate(&self.index, &params.progs, self.options, |pc| {
            if call_sites {
                pc
            } else {
                backend.adjust_pc(&self.target, pc)
            }
        })
    }

    /// Interactive HTML report
    ///
    /// # Errors
    /// Aggregation errors, or `Io` if writing fails
    pub fn do_html(&self, w: &mut impl Write, params: &HandlerParams) -> Result<(), CoverError> {
        let agg = self.aggregate(params)?;
        let html = render_html(&self.index, &agg, self.kernel_src.as_deref());
        w.write_all(html.as_bytes())?;
        Ok(())
    }

    /// Per-subsystem summary table
    ///
    /// # Errors
    /// Aggregation errors, or `Io` if writing fails
    pub fn do_subsystem_cover(&self, w: &mut impl Write, params: &HandlerParams) -> Result<(), CoverError> {
        let agg = self.aggregate(params)?;
        let groups = group_by_subsystems(&agg.file_stats, &self.subsystems);
        w.write_all(render_subsystems(&groups).as_bytes())?;
        Ok(())
    }

    /// Per-file summary table
    ///
    /// # Errors
    /// Aggregation errors, or `Io` if writing fails
    pub fn do_file_cover(&self, w: &mut impl Write, params: &HandlerParams) -> Result<(), CoverError> {
        let agg = self.aggregate(params)?;
        w.write_all(render_files(&agg.file_stats).as_bytes())?;
        Ok(())
    }

    /// Per-function CSV
    ///
    /// # Errors
    /// Aggregation errors, or `Io` if writing fails
    pub fn do_func_cover(&self, w: &mut impl Write, params: &HandlerParams) -> Result<(), CoverError> {
        let agg = self.aggregate(params)?;
        w.write_all(render_functions(&agg.func_stats).as_bytes())?;
        Ok(())
    }

    /// Per-file JSON-lines
    ///
    /// # Errors
    /// Aggregation errors, or `Io`/`Json` if writing fails
    pub fn do_cover_jsonl(&self, w: &mut impl Write, params: &HandlerParams) -> Result<(), CoverError> {
        let agg = self.aggregate(params)?;
        w.write_all(&render_files_jsonl(&self.index, &agg)?)?;
        Ok(())
    }

    /// Per-program JSON-lines
    ///
    /// # Errors
    /// Aggregation errors, or `Io`/`Json` if writing fails
    pub fn do_cover_programs(&self, w: &mut impl Write, params: &HandlerParams) -> Result<(), CoverError> {
        let agg = self.aggregate(params)?;
        w.write_all(&render_programs_jsonl(&self.index, &agg)?)?;
        Ok(())
    }

    /// Render the report of the given kind
    ///
    /// # Errors
    /// See the individual `do_*` methods
    pub fn render(&self, kind: ReportKind, w: &mut impl Write, params: &HandlerParams) -> Result<(), CoverError> {
        match kind {
            ReportKind::Html => self.do_html(w, params),
            ReportKind::Subsystems => self.do_subsystem_cover(w, params),
            ReportKind::Files => self.do_file_cover(w, params),
            ReportKind::Functions => self.do_func_cover(w, params),
            ReportKind::Jsonl => self.do_cover_jsonl(w, params),
            ReportKind::Programs => self.do_cover_programs(w, params),
        }
    }
}
