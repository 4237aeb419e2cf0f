//! # kcovscope - kcov Coverage Reports
//!
//! kcovscope turns the raw program counters a fuzzer collects with kcov into
//! source-level coverage reports. It locates the modules of a kernel build,
//! finds every coverage callback compiled into them, symbolizes those call
//! sites through DWARF, and folds batches of traced PCs into HTML, CSV and
//! JSON-lines reports.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   Fuzzer / collector                            │
//! │         HandlerParams { progs: [Program { pcs, .. }] }          │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ traced PCs (kcov return addresses)
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   kcovscope (This Crate)                        │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │  Discovery   │──▶│ Symbolization│──▶│  CoverIndex  │         │
//! │  │ vmlinux, .ko │   │ ELF + DWARF  │   │ frames, syms │         │
//! │  └──────────────┘   └──────────────┘   └──────┬───────┘         │
//! │                                               │                 │
//! │                                               ▼                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │   Reports    │◀──│  Subsystems  │◀──│  Aggregator  │         │
//! │  │ html/csv/... │   │   grouping   │   │  PC -> hits  │         │
//! │  └──────────────┘   └──────────────┘   └──────────────┘         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! ### Core Pipeline Modules
//!
//! - [`discovery`]: Find the main image and loadable modules of a build
//!   - `image`: open `vmlinux` (or the OS equivalent) and check its architecture
//!   - `kmod`: walk object directories for `.ko` files
//!   - `loaded`: parse captured `/proc/modules` and place modules
//!
//! - [`symbolization`]: Index every coverage callback of every module
//!   - `callbacks`: find calls to `__sanitizer_cov_trace_pc`
//!   - `dwarf`: load (and relocate) DWARF, resolve inline frames
//!   - `index`: the immutable [`symbolization::CoverIndex`]
//!
//! - [`coverage`]: Fold program batches into per-file and per-function stats
//!
//! - [`report`]: HTML, subsystem/file summaries, function CSV, JSON-lines
//!
//! - [`generator`]: [`generator::ReportGenerator`], the reusable report session
//!
//! ### Support Modules
//!
//! - [`targets`]: OS/arch descriptions and PC adjustment
//! - [`backend`]: per-OS discovery and symbolization behaviour
//! - [`subsystems`]: path-prefix subsystem definitions
//! - [`config`]: JSON report configuration
//! - [`pcsample`]: run an instrumented binary and collect the PCs it prints
//! - [`cli`]: Command-line argument parsing
//! - [`domain`]: Core domain types and errors
//!
//! ## Typical Usage
//!
//! ```bash
//! # Full HTML report for a batch
//! ./kcovscope report -c cover.json -p progs.json -o cover.html
//!
//! # Per-function CSV from a compressed batch
//! ./kcovscope report -c cover.json -p progs.bin --compressed -f functions
//! ```
//!
//! ## Key Concepts
//!
//! - **kcov**: Linux coverage interface; it records the return address of
//!   each `__sanitizer_cov_trace_pc` call
//! - **Coverage callback**: one instrumented call site, i.e. one basic block
//! - **Precise coverage**: every callback resolved to a source line, so
//!   traced PCs must match callbacks exactly
//! - **Module base**: load address of a relocatable `.ko`

// Expose modules for testing
pub mod backend;
pub mod cli;
pub mod config;
pub mod coverage;
pub mod discovery;
pub mod domain;
pub mod generator;
pub mod pcsample;
pub mod report;
pub mod subsystems;
pub mod symbolization;
pub mod targets;
