//! Offline inspection of a single report (`crashd parse <file>`).
//!
//! Runs the same parse, link and policy steps as a pipeline run, without a
//! store or cache, and prints the resulting record as JSON.

use anyhow::{Context, Result};
use std::path::Path;

use crate::aggregate::exclusion_for;
use crate::config::{PolicyConfig, SymbolsConfig};
use crate::fetch::{denylisted, file_names};
use crate::models::{CrashInfo, Exclusion};
use crate::parse::{parse_crash, ParseLimits};
use crate::symbolicate::Symbolicator;

/// Build the record a pipeline run would produce for `body`.
pub fn inspect_report(
    name: &str,
    body: &str,
    policy: &PolicyConfig,
    symbols: &SymbolsConfig,
) -> CrashInfo {
    let limits = ParseLimits {
        exception_lines: policy.exception_lines,
        crash_lines: policy.crash_lines,
    };
    let report = parse_crash(body, limits);
    let crash_lines_linked = Symbolicator::new(symbols, &policy.noise_frames)
        .link_all(&report.crash_lines, &report.git_sha1);
    let (file_name_txt, file_name_html) = file_names(name);

    let mut ci = CrashInfo {
        report,
        crash_lines_linked,
        file_size: body.len() as u64,
        file_name_txt,
        file_name_html,
        body: body.to_string(),
        ..Default::default()
    };
    if denylisted(body, &policy.denylist).is_some() {
        ci.exclude(Exclusion::Denylisted);
    } else if let Some(reason) = exclusion_for(&ci, policy) {
        ci.exclude(reason);
    }
    ci
}

/// Run the `parse` command.
pub fn run_parse(path: &Path, policy: &PolicyConfig, symbols: &SymbolsConfig) -> Result<()> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let body = String::from_utf8_lossy(&bytes);
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let ci = inspect_report(&name, &body, policy, symbols);
    println!("{}", serde_json::to_string_pretty(&ci)?);
    Ok(())
}
