//! Fetch, cache and delete decisions for every uploaded report.
//!
//! The listing is consumed page by page; each key becomes a task on a
//! [`JoinSet`], admitted through a [`Semaphore`] so no more than
//! `policy.concurrency` reports are fetched and parsed at once. Each task
//! decides between:
//!
//! 1. **hard delete**: the upload day is older than the retention window,
//!    or the body matches the denylist. The remote object and the local
//!    cache file are removed;
//! 2. **cache hit**: `<data_dir>/<day>/<file>.txt` already exists;
//! 3. **download**: fetch the object with a fixed number of attempts.
//!
//! Accepted records are pushed into a mutex-guarded [`DayIndex`]. The
//! function returns only after every task has been joined, so later stages
//! always see a complete index.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::{Config, PolicyConfig, SymbolsConfig};
use crate::models::{CrashInfo, DayIndex, Exclusion, RunStats};
use crate::parse::{parse_crash, ParseLimits};
use crate::progress::{FetchProgressEvent, FetchProgressReporter, REPORT_EVERY};
use crate::store::ObjectStore;
use crate::symbolicate::Symbolicator;

/// Everything a fetch task needs, shared between tasks.
pub struct FetchContext {
    pub store: Arc<dyn ObjectStore>,
    pub prefix: String,
    pub include: GlobSet,
    pub data_dir: PathBuf,
    pub policy: PolicyConfig,
    pub symbols: SymbolsConfig,
    /// Reference time for the retention window.
    pub now: DateTime<Utc>,
}

impl FetchContext {
    pub fn new(config: &Config, store: Arc<dyn ObjectStore>, now: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            store,
            prefix: config.store.prefix.clone(),
            include: build_globset(&config.store.include_globs)?,
            data_dir: config.paths.data_dir.clone(),
            policy: config.policy.clone(),
            symbols: config.symbols.clone(),
            now,
        })
    }

    fn limits(&self) -> ParseLimits {
        ParseLimits {
            exception_lines: self.policy.exception_lines,
            crash_lines: self.policy.crash_lines,
        }
    }

    fn matches_include(&self, key: &str) -> bool {
        let rel = key
            .strip_prefix(&self.prefix)
            .unwrap_or(key)
            .trim_start_matches('/');
        self.include.is_match(rel)
    }
}

/// What happened to one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Accepted { from_cache: bool },
    Deleted(Exclusion),
    /// Key does not follow the `<yyyy>/<mm>/<dd>/<file>` layout.
    Invalid,
}

/// Fetch and parse every report under the configured prefix.
///
/// Returns the complete day index and the fetch counters. The first fatal
/// error from any task aborts the remaining ones.
pub async fn fetch_all(
    ctx: Arc<FetchContext>,
    reporter: &dyn FetchProgressReporter,
) -> Result<(DayIndex, RunStats)> {
    let semaphore = Arc::new(Semaphore::new(ctx.policy.concurrency));
    let index = Arc::new(Mutex::new(DayIndex::new()));
    let mut tasks: JoinSet<Result<FetchOutcome>> = JoinSet::new();
    let mut stats = RunStats::default();
    let mut processed = 0u64;

    reporter.report(FetchProgressEvent::Listing {
        location: format!("{}/{}", ctx.store.describe(), ctx.prefix),
    });

    let mut token: Option<String> = None;
    loop {
        let page = ctx
            .store
            .list_page(&ctx.prefix, token.take())
            .await
            .with_context(|| format!("Failed to list reports under '{}'", ctx.prefix))?;

        for obj in page.objects {
            if !ctx.matches_include(&obj.key) {
                debug!(key = %obj.key, "skipping key not matching include globs");
                stats.invalid += 1;
                continue;
            }
            stats.listed += 1;

            let permit = semaphore.clone().acquire_owned().await?;
            let ctx = Arc::clone(&ctx);
            let index = Arc::clone(&index);
            tasks.spawn(async move {
                let outcome = process_key(&ctx, &obj.key, &index).await;
                drop(permit);
                outcome
            });

            while let Some(res) = tasks.try_join_next() {
                tally(&mut stats, res??);
                processed += 1;
                report_every(reporter, processed, stats.listed);
            }
        }

        match page.next_token {
            Some(next) => token = Some(next),
            None => break,
        }
    }

    while let Some(res) = tasks.join_next().await {
        tally(&mut stats, res??);
        processed += 1;
        report_every(reporter, processed, stats.listed);
    }

    reporter.report(FetchProgressEvent::Done {
        downloaded: stats.downloaded,
        cached: stats.cached,
        deleted: stats.deleted,
        invalid: stats.invalid,
    });
    info!(
        listed = stats.listed,
        downloaded = stats.downloaded,
        cached = stats.cached,
        deleted = stats.deleted,
        invalid = stats.invalid,
        "fetch finished"
    );

    let index = match Arc::into_inner(index) {
        Some(index) => index.into_inner(),
        None => bail!("day index still shared after all fetch tasks joined"),
    };
    Ok((index, stats))
}

fn tally(stats: &mut RunStats, outcome: FetchOutcome) {
    match outcome {
        FetchOutcome::Accepted { from_cache: true } => stats.cached += 1,
        FetchOutcome::Accepted { from_cache: false } => stats.downloaded += 1,
        FetchOutcome::Deleted(reason) => {
            stats.deleted += 1;
            stats.count_exclusion(reason);
        }
        FetchOutcome::Invalid => stats.invalid += 1,
    }
}

fn report_every(reporter: &dyn FetchProgressReporter, n: u64, listed: u64) {
    if n % REPORT_EVERY == 0 {
        reporter.report(FetchProgressEvent::Fetched { n, listed });
    }
}

/// Decide, fetch, parse and index a single report.
pub async fn process_key(
    ctx: &FetchContext,
    key: &str,
    index: &Mutex<DayIndex>,
) -> Result<FetchOutcome> {
    let Some((day, date)) = day_from_key(key) else {
        debug!(key, "key does not match <yyyy>/<mm>/<dd>/<file> layout");
        return Ok(FetchOutcome::Invalid);
    };
    let (file_name_txt, file_name_html) = file_names(key);
    let path_txt = ctx.data_dir.join(&day).join(&file_name_txt);

    if is_outdated(date, ctx.now, Duration::days(ctx.policy.retention_days)) {
        debug!(key, day = %day, reason = "outdated", "deleting report");
        hard_delete(ctx.store.as_ref(), key, &path_txt).await;
        return Ok(FetchOutcome::Deleted(Exclusion::Outdated));
    }

    let (bytes, from_cache) = match tokio::fs::read(&path_txt).await {
        Ok(bytes) => (bytes, true),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            let bytes = download_with_retry(
                ctx.store.as_ref(),
                key,
                &path_txt,
                ctx.policy.download_attempts,
                std::time::Duration::from_millis(ctx.policy.retry_delay_ms),
            )
            .await?;
            (bytes, false)
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", path_txt.display()));
        }
    };

    let body = String::from_utf8_lossy(&bytes).into_owned();
    let report = parse_crash(&body, ctx.limits());
    let crash_lines_linked = Symbolicator::new(&ctx.symbols, &ctx.policy.noise_frames)
        .link_all(&report.crash_lines, &report.git_sha1);

    if let Some(needle) = denylisted(&body, &ctx.policy.denylist) {
        debug!(key, day = %day, reason = "denylisted", needle, "deleting report");
        hard_delete(ctx.store.as_ref(), key, &path_txt).await;
        return Ok(FetchOutcome::Deleted(Exclusion::Denylisted));
    }

    let ci = CrashInfo {
        day: day.clone(),
        report,
        crash_lines_linked,
        file_size: bytes.len() as u64,
        file_name_txt,
        file_name_html,
        store_key: key.to_string(),
        path_txt,
        body,
        ..Default::default()
    };
    index.lock().await.entry(day).or_default().push(ci);

    Ok(FetchOutcome::Accepted { from_cache })
}

/// Extract the upload day from `<prefix>/<yyyy>/<mm>/<dd>/<file>`.
///
/// Returns the normalized `YYYY-MM-DD` key and the parsed date.
pub fn day_from_key(key: &str) -> Option<(String, NaiveDate)> {
    let parts: Vec<&str> = key.split('/').collect();
    if parts.len() < 4 {
        return None;
    }
    let n = parts.len();
    let (year, month, day) = (parts[n - 4], parts[n - 3], parts[n - 2]);
    if year.len() != 4 || month.len() != 2 || day.len() != 2 {
        return None;
    }
    let normalized = format!("{}-{}-{}", year, month, day);
    let date = NaiveDate::parse_from_str(&normalized, "%Y-%m-%d").ok()?;
    Some((normalized, date))
}

/// `true` when more than `retention` has passed since the start (UTC
/// midnight) of `day`. Exactly `retention` old is still kept.
pub fn is_outdated(day: NaiveDate, now: DateTime<Utc>, retention: Duration) -> bool {
    let Some(start) = day.and_hms_opt(0, 0, 0) else {
        return false;
    };
    now.signed_duration_since(start.and_utc()) > retention
}

/// Cache and page file names derived from the key's base name.
pub fn file_names(key: &str) -> (String, String) {
    let base = key.rsplit('/').next().unwrap_or(key).to_string();
    let stem = base.strip_suffix(".txt").unwrap_or(&base);
    let html = format!("{}.html", stem);
    (base, html)
}

/// First denylist entry contained in `body`.
pub fn denylisted<'a>(body: &str, denylist: &'a [String]) -> Option<&'a str> {
    denylist
        .iter()
        .find(|needle| !needle.is_empty() && body.contains(needle.as_str()))
        .map(|s| s.as_str())
}

/// Remove the remote object and the local copy. Failures are logged, not
/// returned: a later run will retry the delete.
async fn hard_delete(store: &dyn ObjectStore, key: &str, path_txt: &Path) {
    if let Err(e) = store.delete(key).await {
        warn!(key, error = %e, "failed to delete remote report");
    }
    match tokio::fs::remove_file(path_txt).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path_txt.display(), error = %e, "failed to delete cached report"),
    }
}

/// Download `key` into `path`, trying up to `attempts` times with a fixed
/// `delay` between attempts.
///
/// # Errors
///
/// Fails when every attempt failed or the downloaded body cannot be
/// written to the cache.
pub async fn download_with_retry(
    store: &dyn ObjectStore,
    key: &str,
    path: &Path,
    attempts: u32,
    delay: std::time::Duration,
) -> Result<Vec<u8>> {
    let mut last_err = None;

    for attempt in 1..=attempts {
        match store.get(key).await {
            Ok(bytes) => {
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .with_context(|| format!("Failed to create {}", parent.display()))?;
                }
                write_atomic(path, &bytes).await?;
                return Ok(bytes);
            }
            Err(e) => {
                warn!(key, attempt, attempts, error = %e, "download failed");
                last_err = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("no download attempts made")))
        .with_context(|| format!("Failed to download '{}' after {} attempts", key, attempts))
}

/// Write through a `.tmp` sibling so an interrupted run never leaves a
/// truncated file that a later run would take as a cache hit.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, bytes)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to move {} into place", tmp.display()))
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
