//! Core data models used throughout the crash pipeline.
//!
//! A [`CrashInfo`] is built once per surviving remote report by the fetch
//! stage, annotated by the aggregation stage, and read by the renderer.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Structured form of a `Ver:` line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedVersion {
    /// `"3.3"` for two-part versions, the verbatim token for odd shapes,
    /// empty when a numeric build was found.
    pub main_branch: String,
    /// Numeric build from a three-part version, `0` otherwise.
    pub build: u64,
    pub is_pre_release: bool,
    pub is_64_bit: bool,
}

/// Fixed fields extracted from one raw report body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CrashReport {
    pub crash_file: String,
    pub os: String,
    pub git_sha1: String,
    /// The raw `Ver:` line.
    pub version: String,
    pub parsed_version: Option<ParsedVersion>,
    pub exception_info: Vec<String>,
    pub crash_lines: Vec<String>,
}

/// One displayable stack frame, optionally linked to a source line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CrashLine {
    pub text: String,
    /// Empty when the frame could not be mapped to the source repository.
    pub url: String,
}

impl CrashLine {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            url: String::new(),
        }
    }
}

/// Why a record was kept out of the rendered report.
///
/// Hard reasons remove the local and remote copies, soft reasons only hide
/// the record from this run's pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Exclusion {
    Outdated,
    Denylisted,
    NoSymbols,
    BelowBuildFloor,
    OversizedLegacy,
    MissingVersion,
}

impl Exclusion {
    pub fn is_hard(self) -> bool {
        matches!(self, Exclusion::Outdated | Exclusion::Denylisted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Exclusion::Outdated => "outdated",
            Exclusion::Denylisted => "denylisted",
            Exclusion::NoSymbols => "no-symbols",
            Exclusion::BelowBuildFloor => "below-build-floor",
            Exclusion::OversizedLegacy => "oversized-legacy",
            Exclusion::MissingVersion => "missing-version",
        }
    }
}

/// The central per-report record.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CrashInfo {
    /// Upload day, `YYYY-MM-DD`.
    pub day: String,
    #[serde(flatten)]
    pub report: CrashReport,
    /// Version with the `Ver:` prefix stripped, set only on the first record
    /// of a run of identical versions within a sorted day.
    pub version_disp: String,
    pub crash_lines_linked: Vec<CrashLine>,
    pub is_deleted: bool,
    pub exclusion: Option<Exclusion>,
    pub file_size: u64,
    pub file_name_txt: String,
    pub file_name_html: String,
    pub store_key: String,
    pub path_txt: PathBuf,
    #[serde(skip)]
    pub body: String,
}

impl CrashInfo {
    /// Soft-delete the record. The first reason recorded wins.
    pub fn exclude(&mut self, reason: Exclusion) {
        if self.exclusion.is_none() {
            self.exclusion = Some(reason);
        }
        self.is_deleted = true;
    }

    /// Text of the first linked stack frame, or `""`.
    pub fn first_crash_line(&self) -> &str {
        self.crash_lines_linked
            .first()
            .map(|l| l.text.as_str())
            .unwrap_or("")
    }
}

/// Day key → records uploaded that day.
pub type DayIndex = BTreeMap<String, Vec<CrashInfo>>;

/// Request-scoped counters for one run, returned from the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub listed: u64,
    pub downloaded: u64,
    pub cached: u64,
    pub deleted: u64,
    pub invalid: u64,
    pub excluded: BTreeMap<String, u64>,
    pub days: u64,
    pub crashes_rendered: u64,
}

impl RunStats {
    pub fn count_exclusion(&mut self, reason: Exclusion) {
        *self.excluded.entry(reason.as_str().to_string()).or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_reason_is_kept() {
        let mut ci = CrashInfo::default();
        ci.exclude(Exclusion::NoSymbols);
        ci.exclude(Exclusion::MissingVersion);
        assert!(ci.is_deleted);
        assert_eq!(ci.exclusion, Some(Exclusion::NoSymbols));
    }

    #[test]
    fn hard_reasons() {
        assert!(Exclusion::Outdated.is_hard());
        assert!(Exclusion::Denylisted.is_hard());
        assert!(!Exclusion::NoSymbols.is_hard());
        assert!(!Exclusion::OversizedLegacy.is_hard());
    }
}
