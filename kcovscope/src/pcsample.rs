//! Sample a real PC from an instrumented binary
//!
//! Validation flows build a tiny program whose coverage callback prints its
//! return address, run it, and feed the PC back into a report. The run is
//! bounded by a timeout; a binary that hangs, crashes or can't run on this
//! host yields [`SampleOutcome::Unavailable`] rather than an error, so the
//! caller can fall back to inexact coverage.

use log::{debug, warn};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Sanitizer options that keep static binaries from installing crash handlers
pub const SANITIZER_OPTIONS: &str = "handle_segv=0:handle_sigbus=0:handle_sigfpe=0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleOutcome {
    /// PCs printed by the binary, in output order
    Sampled(Vec<u64>),
    /// The binary could not produce PCs; the reason is for logs only
    Unavailable(String),
}

/// Run `binary` and parse the PCs it prints
///
/// The child is killed if it outlives `timeout`.
pub async fn sample_pcs(binary: &Path, args: &[String], timeout: Duration) -> SampleOutcome {
    let mut command = Command::new(binary);
    command
        .args(args)
        .env("UBSAN_OPTIONS", SANITIZER_OPTIONS)
        .env("ASAN_OPTIONS", SANITIZER_OPTIONS)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            warn!("Failed to run {}: {e}", binary.display());
            return SampleOutcome::Unavailable(format!("failed to run: {e}"));
        }
        Err(_) => {
            warn!("{} did not finish within {timeout:?}", binary.display());
            return SampleOutcome::Unavailable(format!("timed out after {timeout:?}"));
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!("{} failed: {}", binary.display(), stderr.trim());
        return SampleOutcome::Unavailable(format!("exited with {}", output.status));
    }

    match parse_pcs(&String::from_utf8_lossy(&output.stdout)) {
        Some(pcs) if !pcs.is_empty() => SampleOutcome::Sampled(pcs),
        Some(_) => SampleOutcome::Unavailable("no PCs printed".to_string()),
        None => SampleOutcome::Unavailable("output is not a list of PCs".to_string()),
    }
}

/// Parse whitespace-separated PCs, decimal or `0x` hex
#[must_use]
pub fn parse_pcs(text: &str) -> Option<Vec<u64>> {
    text.split_whitespace()
        .map(|token| match token.strip_prefix("0x") {
            Some(hex) => u64::from_str_radix(hex, 16).ok(),
            None => token.parse().ok(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn script(dir: &Path, body: &str) -> std::path::PathBuf {
        let path = dir.join("sample.sh");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_parse_pcs() {
        assert_eq!(parse_pcs("4198710"), Some(vec![4_198_710]));
        assert_eq!(parse_pcs("0x10 32\n"), Some(vec![0x10, 32]));
        assert_eq!(parse_pcs(""), Some(vec![]));
        assert_eq!(parse_pcs("hello"), None);
    }

    #[tokio::test]
    async fn test_sample_printed_pc() {
        let dir = tempfile::tempdir().unwrap();
        let bin = script(dir.path(), "printf 4198710");
        let outcome = sample_pcs(&bin, &[], Duration::from_secs(10)).await;
        assert_eq!(outcome, SampleOutcome::Sampled(vec![4_198_710]));
    }

    #[tokio::test]
    async fn test_sanitizer_options_are_set() {
        let dir = tempfile::tempdir().unwrap();
        let bin = script(dir.path(), "test \"$UBSAN_OPTIONS\" = \"handle_segv=0:handle_sigbus=0:handle_sigfpe=0\" && echo 1");
        let outcome = sample_pcs(&bin, &[], Duration::from_secs(10)).await;
        assert_eq!(outcome, SampleOutcome::Sampled(vec![1]));
    }

    #[tokio::test]
    async fn test_timeout_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let bin = script(dir.path(), "sleep 30");
        let outcome = sample_pcs(&bin, &[], Duration::from_millis(200)).await;
        assert!(matches!(outcome, SampleOutcome::Unavailable(reason) if reason.contains("timed out")));
    }

    #[tokio::test]
    async fn test_failure_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let bin = script(dir.path(), "exit 3");
        assert!(matches!(
            sample_pcs(&bin, &[], Duration::from_secs(10)).await,
            SampleOutcome::Unavailable(_)
        ));

        let missing = dir.path().join("missing");
        assert!(matches!(
            sample_pcs(&missing, &[], Duration::from_secs(10)).await,
            SampleOutcome::Unavailable(_)
        ));
    }
}
