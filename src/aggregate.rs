//! Filtering and ordering of the fetched records.
//!
//! Runs once, after every fetch task has been joined. Filters only flag
//! records (`is_deleted` + [`Exclusion`]); the cached and remote copies are
//! left alone. Sorting then defines the only ordering the rendered pages
//! rely on.

use std::cmp::Ordering;
use tracing::debug;

use crate::config::PolicyConfig;
use crate::models::{CrashInfo, DayIndex, Exclusion, RunStats};
use crate::version::strip_version_prefix;

/// The filter that applies to `ci`, if any. Checked in a fixed order so
/// every record gets a single, predictable reason.
pub fn exclusion_for(ci: &CrashInfo, policy: &PolicyConfig) -> Option<Exclusion> {
    if ci
        .report
        .crash_lines
        .first()
        .is_some_and(|l| l.ends_with(".exe"))
    {
        return Some(Exclusion::NoSymbols);
    }

    let Some(ver) = &ci.report.parsed_version else {
        return Some(Exclusion::MissingVersion);
    };
    if ver.build > 0 && ver.build <= policy.min_build {
        return Some(Exclusion::BelowBuildFloor);
    }
    if ver.main_branch == policy.oversize_branch && ci.file_size > policy.oversize_bytes {
        return Some(Exclusion::OversizedLegacy);
    }
    if strip_version_prefix(&ci.report.version).is_empty() {
        return Some(Exclusion::MissingVersion);
    }
    None
}

/// Flag every record that should not be rendered.
pub fn apply_filters(index: &mut DayIndex, policy: &PolicyConfig, stats: &mut RunStats) {
    for (day, records) in index.iter_mut() {
        for ci in records.iter_mut() {
            if let Some(reason) = exclusion_for(ci, policy) {
                debug!(key = %ci.store_key, day = %day, reason = reason.as_str(), "hiding report");
                ci.exclude(reason);
                stats.count_exclusion(reason);
            }
        }
    }
}

/// Order two records of the same day.
///
/// Priority versions first, then raw version string descending, then the
/// first crash line by length descending and text ascending.
pub fn compare_records(a: &CrashInfo, b: &CrashInfo, priority_prefix: &str) -> Ordering {
    let prio = |ci: &CrashInfo| {
        !priority_prefix.is_empty() && ci.report.version.starts_with(priority_prefix)
    };
    prio(b)
        .cmp(&prio(a))
        .then_with(|| b.report.version.cmp(&a.report.version))
        .then_with(|| b.first_crash_line().len().cmp(&a.first_crash_line().len()))
        .then_with(|| a.first_crash_line().cmp(b.first_crash_line()))
}

/// Sort every day and fill in `version_disp` on the first record of each
/// run of identical versions among the visible records.
pub fn sort_days(index: &mut DayIndex, priority_prefix: &str) {
    for records in index.values_mut() {
        records.sort_by(|a, b| compare_records(a, b, priority_prefix));

        let mut prev: Option<String> = None;
        for ci in records.iter_mut().filter(|ci| !ci.is_deleted) {
            if prev.as_deref() == Some(ci.report.version.as_str()) {
                ci.version_disp.clear();
            } else {
                ci.version_disp = strip_version_prefix(&ci.report.version).to_string();
                prev = Some(ci.report.version.clone());
            }
        }
    }
}

/// Day keys newest first. Keys are zero-padded `YYYY-MM-DD`, so reverse
/// lexicographic order is reverse chronological order.
pub fn days_newest_first(index: &DayIndex) -> Vec<String> {
    index.keys().rev().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CrashLine, CrashReport, ParsedVersion};

    fn record(version: &str, first_line: &str) -> CrashInfo {
        let parsed = crate::version::parse_version(strip_version_prefix(version)).ok();
        CrashInfo {
            day: "2026-10-10".to_string(),
            report: CrashReport {
                version: version.to_string(),
                parsed_version: parsed,
                crash_lines: vec![format!("1 2 {}", first_line)],
                ..Default::default()
            },
            crash_lines_linked: vec![CrashLine::plain(first_line)],
            ..Default::default()
        }
    }

    fn policy() -> PolicyConfig {
        PolicyConfig {
            min_build: 15000,
            priority_version_prefix: "Ver: 3.6".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn no_symbols_when_first_frame_is_bare_exe() {
        let mut ci = record("Ver: 3.5.16000", "x");
        ci.report.crash_lines = vec!["00007FF6 01:0000 SumatraPDF.exe".to_string()];
        assert_eq!(exclusion_for(&ci, &policy()), Some(Exclusion::NoSymbols));
    }

    #[test]
    fn build_floor_is_inclusive() {
        let p = policy();
        assert_eq!(
            exclusion_for(&record("Ver: 3.5.15000", "x"), &p),
            Some(Exclusion::BelowBuildFloor)
        );
        assert_eq!(exclusion_for(&record("Ver: 3.5.15001", "x"), &p), None);
        // release builds have no build number and are never below the floor
        assert_eq!(exclusion_for(&record("Ver: 3.5", "x"), &p), None);
    }

    #[test]
    fn oversized_legacy_only_for_configured_branch() {
        let p = policy();
        let mut ci = record("Ver: 3.2", "x");
        ci.file_size = 256 * 1024 + 1;
        assert_eq!(exclusion_for(&ci, &p), Some(Exclusion::OversizedLegacy));
        ci.file_size = 256 * 1024;
        assert_eq!(exclusion_for(&ci, &p), None);

        let mut other = record("Ver: 3.3", "x");
        other.file_size = 1024 * 1024;
        assert_eq!(exclusion_for(&other, &p), None);
    }

    #[test]
    fn missing_version() {
        let mut ci = record("", "x");
        ci.report.parsed_version = None;
        assert_eq!(exclusion_for(&ci, &policy()), Some(Exclusion::MissingVersion));

        let mut ci = record("Ver: 3.5", "x");
        ci.report.version.clear();
        ci.report.parsed_version = Some(ParsedVersion::default());
        assert_eq!(exclusion_for(&ci, &policy()), Some(Exclusion::MissingVersion));

        // a bare `Ver:` line carries no version even if something parsed it
        let mut ci = record("Ver:", "x");
        ci.report.parsed_version = Some(ParsedVersion::default());
        assert_eq!(exclusion_for(&ci, &policy()), Some(Exclusion::MissingVersion));
    }

    #[test]
    fn apply_filters_counts_reasons() {
        let mut index = DayIndex::new();
        index.insert(
            "2026-10-10".to_string(),
            vec![record("Ver: 3.5.14000", "a"), record("Ver: 3.5.16000", "b")],
        );
        let mut stats = RunStats::default();
        apply_filters(&mut index, &policy(), &mut stats);
        let recs = &index["2026-10-10"];
        assert!(recs[0].is_deleted);
        assert!(!recs[1].is_deleted);
        assert_eq!(stats.excluded.get("below-build-floor"), Some(&1));
    }

    #[test]
    fn priority_then_version_desc() {
        let mut index = DayIndex::new();
        index.insert(
            "d".to_string(),
            vec![
                record("Ver: 3.5.16000", "a"),
                record("Ver: 3.6.17000", "b"),
                record("Ver: 3.5.16500", "c"),
                record("Ver: 3.6.17100", "d"),
            ],
        );
        sort_days(&mut index, "Ver: 3.6");
        let versions: Vec<&str> = index["d"].iter().map(|c| c.report.version.as_str()).collect();
        assert_eq!(
            versions,
            vec!["Ver: 3.6.17100", "Ver: 3.6.17000", "Ver: 3.5.16500", "Ver: 3.5.16000"]
        );
    }

    #[test]
    fn ties_by_line_length_then_text() {
        let mut index = DayIndex::new();
        index.insert(
            "d".to_string(),
            vec![
                record("Ver: 3.5.16000", "bbb"),
                record("Ver: 3.5.16000", "aaa"),
                record("Ver: 3.5.16000", "cccc"),
            ],
        );
        sort_days(&mut index, "Ver: 3.6");
        let lines: Vec<&str> = index["d"].iter().map(|c| c.first_crash_line()).collect();
        assert_eq!(lines, vec!["cccc", "aaa", "bbb"]);
    }

    #[test]
    fn version_disp_set_once_per_run() {
        let mut index = DayIndex::new();
        index.insert(
            "d".to_string(),
            vec![
                record("Ver: 3.5.16000", "a"),
                record("Ver: 3.5.16000", "b"),
                record("Ver: 3.5.15900", "c"),
            ],
        );
        sort_days(&mut index, "");
        let disp: Vec<&str> = index["d"].iter().map(|c| c.version_disp.as_str()).collect();
        assert_eq!(disp, vec!["3.5.16000", "", "3.5.15900"]);
    }

    #[test]
    fn days_listed_newest_first() {
        let mut index = DayIndex::new();
        for d in ["2026-09-30", "2026-10-02", "2026-10-01"] {
            index.insert(d.to_string(), Vec::new());
        }
        assert_eq!(
            days_newest_first(&index),
            vec!["2026-10-02", "2026-10-01", "2026-09-30"]
        );
    }
}
