//! # Shared Data Structures (Collector ↔ Report Engine)
//!
//! Defines the values exchanged between fuzzing workers, the central
//! collector and the coverage report engine. Workers ship one [`Program`]
//! per fuzzed execution; the collector groups them into a [`HandlerParams`]
//! batch and hands the batch to every render call.
//!
//! ## Key Types
//!
//! - [`Program`] - One execution: signature, optional raw input, traced PCs
//! - [`HandlerParams`] - A batch of programs for a single report request
//! - [`codec`] - Compressed encoding used on the wire

pub mod codec;

use serde::{Deserialize, Serialize};

// ============================================================================
// Program Records
// ============================================================================

/// A single fuzzed execution as reported by a worker.
///
/// `traced_pcs` holds raw kcov PCs in the order they were collected. The
/// report engine never mutates them; it works on its own copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    /// Opaque program signature (hash of the serialized program)
    #[serde(default, rename = "sig")]
    pub signature: String,

    /// Raw program text, kept for diagnostics
    #[serde(default, rename = "data")]
    pub raw_data: Vec<u8>,

    /// PCs returned by kcov for this execution
    #[serde(default, rename = "pcs")]
    pub traced_pcs: Vec<u64>,
}

impl Program {
    /// Create a program record from a signature and its traced PCs
    #[must_use]
    pub fn new(signature: impl Into<String>, traced_pcs: Vec<u64>) -> Self {
        Self { signature: signature.into(), raw_data: Vec::new(), traced_pcs }
    }

    /// Attach the raw program text
    #[must_use]
    pub fn with_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.raw_data = data.into();
        self
    }

    /// Name used for this program in reports.
    ///
    /// The signature when one is set, otherwise the program text itself.
    #[must_use]
    pub fn display_name(&self) -> String {
        if self.signature.is_empty() {
            String::from_utf8_lossy(&self.raw_data).into_owned()
        } else {
            self.signature.clone()
        }
    }
}

/// A batch of programs handed to one render call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerParams {
    #[serde(default)]
    pub progs: Vec<Program>,
}

impl HandlerParams {
    #[must_use]
    pub fn new(progs: Vec<Program>) -> Self {
        Self { progs }
    }

    /// Total number of traced PCs across the batch (duplicates included)
    #[must_use]
    pub fn total_pcs(&self) -> usize {
        self.progs.iter().map(|p| p.traced_pcs.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_prefers_signature() {
        let prog = Program::new("abc123", vec![1]).with_data("open(0x0)");
        assert_eq!(prog.display_name(), "abc123");
    }

    #[test]
    fn test_display_name_falls_back_to_data() {
        let prog = Program::new("", vec![1]).with_data("main");
        assert_eq!(prog.display_name(), "main");
    }

    #[test]
    fn test_batch_json_field_names() {
        let params = HandlerParams::new(vec![Program::new("s", vec![0x10, 0x20])]);
        let json = serde_json::to_string(&params).unwrap();
        assert_eq!(json, r#"{"progs":[{"sig":"s","data":[],"pcs":[16,32]}]}"#);
    }

    #[test]
    fn test_batch_missing_fields_default() {
        let params: HandlerParams = serde_json::from_str(r#"{"progs":[{"pcs":[7]}]}"#).unwrap();
        assert_eq!(params.progs[0].traced_pcs, vec![7]);
        assert!(params.progs[0].signature.is_empty());
        assert_eq!(params.total_pcs(), 1);
    }
}
