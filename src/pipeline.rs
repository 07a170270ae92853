//! End-to-end run orchestration.
//!
//! ```text
//! list keys ─▶ fetch/parse/classify (concurrent) ─▶ join
//!          ─▶ filter ─▶ sort per day ─▶ render ─▶ publish
//! ```
//!
//! The fetch stage is the only concurrent one; everything after the join
//! works on the complete day index.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

use crate::aggregate;
use crate::config::Config;
use crate::fetch::{self, FetchContext};
use crate::models::{DayIndex, RunStats};
use crate::progress::FetchProgressReporter;
use crate::publish::{self, Uploader};
use crate::render;
use crate::store::ObjectStore;

/// Result of one pipeline run.
#[derive(Debug)]
pub struct RunSummary {
    pub stats: RunStats,
    /// Public URL of the published site, when an uploader was given.
    pub url: Option<String>,
    pub index: DayIndex,
}

/// Run the whole pipeline once.
///
/// `now` anchors the retention window. Passing `None` for `uploader` stops
/// after the site has been written to `paths.html_dir`.
pub async fn run(
    config: &Config,
    store: Arc<dyn ObjectStore>,
    uploader: Option<&dyn Uploader>,
    reporter: &dyn FetchProgressReporter,
    now: DateTime<Utc>,
) -> Result<RunSummary> {
    let html_dir = &config.paths.html_dir;
    render::clear_dir(html_dir)?;

    let ctx = Arc::new(FetchContext::new(config, store, now)?);
    let (mut index, mut stats) = fetch::fetch_all(ctx, reporter).await?;

    aggregate::apply_filters(&mut index, &config.policy, &mut stats);
    aggregate::sort_days(&mut index, &config.policy.priority_version_prefix);

    let site = render::render_site(&index, &config.policy.safe_modules);
    render::write_site(html_dir, &site)?;
    stats.days = index.len() as u64;
    stats.crashes_rendered = index
        .values()
        .flatten()
        .filter(|ci| !ci.is_deleted)
        .count() as u64;
    info!(
        days = stats.days,
        crashes = stats.crashes_rendered,
        dir = %html_dir.display(),
        "rendered site"
    );

    let url = match uploader {
        Some(uploader) => Some(publish::publish_dir(html_dir, uploader).await?),
        None => None,
    };

    Ok(RunSummary { stats, url, index })
}

/// Print a run summary in the same plain style as other commands.
pub fn print_summary(summary: &RunSummary) {
    let s = &summary.stats;
    println!("run");
    println!("  listed: {}", s.listed);
    println!("  downloaded: {}", s.downloaded);
    println!("  cached: {}", s.cached);
    println!("  deleted: {}", s.deleted);
    println!("  invalid: {}", s.invalid);
    for (reason, n) in &s.excluded {
        println!("  excluded ({}): {}", reason, n);
    }
    println!("  days: {}", s.days);
    println!("  crashes rendered: {}", s.crashes_rendered);
    if let Some(url) = &summary.url {
        println!("  published: {}", url);
    }
    println!("ok");
}
