//! Fetch progress reporting.
//!
//! Reports what the fetch stage is doing so an operator watching a long run
//! sees how many reports have been looked at. Progress is emitted on
//! **stderr** so stdout remains parseable for scripts.

use std::io::Write;

/// How often (in processed reports) a `Fetched` event is emitted.
pub const REPORT_EVERY: u64 = 100;

/// A single progress event for the fetch stage.
#[derive(Clone, Debug)]
pub enum FetchProgressEvent {
    /// Listing started for this store location. Total unknown.
    Listing { location: String },
    /// `n` reports processed so far out of `listed` dispatched.
    Fetched { n: u64, listed: u64 },
    /// All workers joined.
    Done {
        downloaded: u64,
        cached: u64,
        deleted: u64,
        invalid: u64,
    },
}

/// Reports fetch progress. Implementations write to stderr (human or JSON).
pub trait FetchProgressReporter: Send + Sync {
    fn report(&self, event: FetchProgressEvent);
}

/// Human-friendly progress on stderr: "fetch  1,200 / 5,000 reports".
pub struct StderrProgress;

impl FetchProgressReporter for StderrProgress {
    fn report(&self, event: FetchProgressEvent) {
        let line = match &event {
            FetchProgressEvent::Listing { location } => {
                format!("fetch {}  listing...\n", location)
            }
            FetchProgressEvent::Fetched { n, listed } => {
                format!(
                    "fetch  {} / {} reports\n",
                    format_number(*n),
                    format_number(*listed)
                )
            }
            FetchProgressEvent::Done {
                downloaded,
                cached,
                deleted,
                invalid,
            } => format!(
                "fetch done  downloaded {}  cached {}  deleted {}  invalid {}\n",
                format_number(*downloaded),
                format_number(*cached),
                format_number(*deleted),
                format_number(*invalid)
            ),
        };
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl FetchProgressReporter for JsonProgress {
    fn report(&self, event: FetchProgressEvent) {
        let obj = match &event {
            FetchProgressEvent::Listing { location } => serde_json::json!({
                "event": "progress",
                "phase": "listing",
                "location": location,
            }),
            FetchProgressEvent::Fetched { n, listed } => serde_json::json!({
                "event": "progress",
                "phase": "fetching",
                "n": n,
                "listed": listed,
            }),
            FetchProgressEvent::Done {
                downloaded,
                cached,
                deleted,
                invalid,
            } => serde_json::json!({
                "event": "progress",
                "phase": "done",
                "downloaded": downloaded,
                "cached": cached,
                "deleted": deleted,
                "invalid": invalid,
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl FetchProgressReporter for NoProgress {
    fn report(&self, _event: FetchProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Parse the `--progress` flag. `auto` picks human output when stderr
    /// is a TTY and nothing otherwise.
    pub fn from_flag(flag: &str) -> anyhow::Result<Self> {
        match flag {
            "auto" => Ok(Self::default_for_tty()),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            "off" => Ok(ProgressMode::Off),
            other => anyhow::bail!(
                "Unknown progress mode: '{}'. Must be auto, human, json, or off.",
                other
            ),
        }
    }

    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn FetchProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
