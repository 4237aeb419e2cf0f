//! # Coverage Callback Symbolization
//!
//! This module turns the compiled modules of a target into an index that
//! the aggregator can query: which PCs can kcov ever report, and which
//! source line, function and file does each of them belong to.
//!
//! ## The Symbolization Problem
//!
//! A kernel built with `CONFIG_KCOV=y` is compiled with
//! `-fsanitize-coverage=trace-pc`. The compiler inserts a call to
//! `__sanitizer_cov_trace_pc` at the start of every basic block. At runtime
//! the callback records its return address, so a trace is a list like
//! `0xffffffff81234567, 0xffffffff812345a0, ...`. To report coverage we need:
//! - **All call sites**: the denominator of every percentage
//! - **Function and file** of each call site
//! - **Line number** of each call site
//!
//! ## Key Concepts
//!
//! ### Call sites vs return addresses
//!
//! kcov reports the return address, one instruction past the call. The
//! index is keyed by the call instruction itself; traced PCs are moved back
//! with [`crate::targets::previous_instruction_pc`] before lookup:
//!
//! ```text
//! amd64:  call __sanitizer_cov_trace_pc   ; at 0x...100, 5 bytes
//!         <next insn>                      ; 0x...105 is what kcov reports
//! ```
//!
//! ### Finding call sites
//!
//! - **Linked images** (`vmlinux`, executables): scan code sections for
//!   direct calls whose destination is the callback (`E8 rel32` on x86,
//!   `BL` on arm64, `JAL` on riscv64)
//! - **Relocatable modules** (`.ko`) and images linked with
//!   `--emit-relocs`: every relocation against the callback symbol is a call
//!   site
//!
//! ### Address spaces
//!
//! Three address spaces meet here:
//!
//! ```text
//! runtime PC  = link address + module base      (relocatable .ko only)
//! link address                                   (symbols, call sites)
//! DWARF address = link address - debug bias      (KASLR / emit-relocs)
//! ```
//!
//! The debug bias covers images whose debug info was generated relative to
//! `.text` while symbols sit at the final `.text` address, as with
//! `CONFIG_RANDOMIZE_BASE=y` kernels. It is applied to both symbol and line
//! lookups of a module, otherwise files and functions silently mismatch.
//!
//! ### Inexact coverage
//!
//! Without line information for every call site the index is marked
//! imprecise. Aggregation then credits a traced PC to the whole function
//! that contains it instead of requiring an exact callback match.
//!
//! ## Module Structure
//!
//! - **`elf`**: symbol table, `.text` range, relocation presence
//! - **`callbacks`**: call site discovery per architecture
//! - **`dwarf`**: DWARF loading (`gimli` + `addr2line`), unit ranges, debug bias
//! - **`index`**: [`CoverIndex`] assembly across modules
//!
//! ## Limitations
//!
//! - **DWARF 5** split units (`.dwo`) are not followed
//! - **Indirect calls** to the callback are not detected by the byte scan;
//!   such images need `--emit-relocs`

pub mod callbacks;
pub mod dwarf;
pub mod elf;
pub mod index;

pub use callbacks::{find_callback_pcs, TRACE_PC};
pub use index::{build_cover_index, clean_path, BuildOptions, CoverIndex, Symbol, Unit};
