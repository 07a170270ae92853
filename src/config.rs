//! TOML configuration parsing.
//!
//! Every policy constant the pipeline applies (retention window, worker
//! width, block caps, size and build thresholds, substring lists) is a
//! field here with its documented default, so a deployment can see and
//! tune the whole policy in one file.
//!
//! # Example
//!
//! ```toml
//! [store]
//! kind = "s3"
//! bucket = "crash-uploads"
//! region = "us-east-1"
//! prefix = "uploadedfiles/app-crashes/"
//!
//! [paths]
//! data_dir = "./data/crashes"
//! html_dir = "./data/crashes-html"
//!
//! [policy]
//! min_build = 15600
//! priority_version_prefix = "Ver: 3.6"
//!
//! [publish]
//! enabled = true
//! key_prefix = "crash-reports"
//! public_url_base = "https://crash-uploads.s3.amazonaws.com"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    pub paths: PathsConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub symbols: SymbolsConfig,
    #[serde(default)]
    pub publish: PublishConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// `"s3"` or `"fs"`.
    pub kind: String,
    #[serde(default)]
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for S3-compatible services (MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: Option<String>,
    /// Root directory for the `fs` store.
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// Key prefix under which reports are uploaded.
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.txt".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    /// Local cache of raw `.txt` bodies, laid out as `<data_dir>/<day>/<file>`.
    pub data_dir: PathBuf,
    /// Rendered site. Cleared at the start of every run.
    pub html_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PolicyConfig {
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_download_attempts")]
    pub download_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_exception_lines")]
    pub exception_lines: usize,
    #[serde(default = "default_crash_lines")]
    pub crash_lines: usize,
    /// Builds at or below this number are hidden.
    #[serde(default = "default_min_build")]
    pub min_build: u64,
    /// Main branch whose reports are dropped when larger than `oversize_bytes`.
    #[serde(default = "default_oversize_branch")]
    pub oversize_branch: String,
    #[serde(default = "default_oversize_bytes")]
    pub oversize_bytes: u64,
    /// Raw version lines starting with this sort first within a day.
    #[serde(default = "default_priority_version_prefix")]
    pub priority_version_prefix: String,
    /// Report bodies containing any of these are deleted everywhere.
    #[serde(default = "default_denylist")]
    pub denylist: Vec<String>,
    /// Stack frames containing any of these belong to the crash handler
    /// itself and are not shown.
    #[serde(default = "default_noise_frames")]
    pub noise_frames: Vec<String>,
    /// `Module:` lines naming anything else are highlighted.
    #[serde(default = "default_safe_modules")]
    pub safe_modules: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            concurrency: default_concurrency(),
            download_attempts: default_download_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            exception_lines: default_exception_lines(),
            crash_lines: default_crash_lines(),
            min_build: default_min_build(),
            oversize_branch: default_oversize_branch(),
            oversize_bytes: default_oversize_bytes(),
            priority_version_prefix: default_priority_version_prefix(),
            denylist: default_denylist(),
            noise_frames: default_noise_frames(),
            safe_modules: default_safe_modules(),
        }
    }
}

fn default_retention_days() -> i64 {
    14
}
fn default_concurrency() -> usize {
    64
}
fn default_download_attempts() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    500
}
fn default_exception_lines() -> usize {
    5
}
fn default_crash_lines() -> usize {
    32
}
fn default_min_build() -> u64 {
    15600
}
fn default_oversize_branch() -> String {
    "3.2".to_string()
}
fn default_oversize_bytes() -> u64 {
    256 * 1024
}
fn default_priority_version_prefix() -> String {
    "Ver: 3.6".to_string()
}
fn default_denylist() -> Vec<String> {
    [
        // forks shipping our crash handler under their own name
        "SumatraPDF-Fork.exe",
        "PDFXEdit_Lite",
        "JingPDF.exe",
        // releases with known, already fixed crashes
        "Ver: 3.1.2 ",
        "Ver: 3.1.1 ",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_noise_frames() -> Vec<String> {
    [
        "!CrashMe",
        "!CrashIf",
        "!DebugCrashIf",
        "!GetCallstack",
        "!_GetStackFrameInfo",
        "!GetExceptionInfo",
        "!CrashDumpExceptionHandler",
        "!RaiseException",
        "!_invoke_watson",
        "!_invalid_parameter",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_safe_modules() -> Vec<String> {
    [
        "sumatrapdf.exe",
        "libmupdf.dll",
        "pdffilter.dll",
        "previewer.dll",
        "ntdll.dll",
        "kernel32.dll",
        "kernelbase.dll",
        "user32.dll",
        "win32u.dll",
        "gdi32.dll",
        "gdi32full.dll",
        "gdiplus.dll",
        "comctl32.dll",
        "comdlg32.dll",
        "shell32.dll",
        "shlwapi.dll",
        "ole32.dll",
        "oleaut32.dll",
        "combase.dll",
        "rpcrt4.dll",
        "msvcrt.dll",
        "msvcp_win.dll",
        "ucrtbase.dll",
        "advapi32.dll",
        "sechost.dll",
        "uxtheme.dll",
        "dwmapi.dll",
        "version.dll",
        "windowscodecs.dll",
        "dbghelp.dll",
        "imm32.dll",
        "bcryptprimitives.dll",
        "cryptbase.dll",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Where stack frames are linked to.
#[derive(Debug, Deserialize, Clone)]
pub struct SymbolsConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_org")]
    pub org: String,
    #[serde(default = "default_repo")]
    pub repo: String,
    /// Absolute build-machine paths stripped from displayed frames.
    #[serde(default = "default_build_path_prefixes")]
    pub build_path_prefixes: Vec<String>,
    /// Path component that marks the root of the source repository.
    #[serde(default = "default_repo_markers")]
    pub repo_markers: Vec<String>,
}

impl Default for SymbolsConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            org: default_org(),
            repo: default_repo(),
            build_path_prefixes: default_build_path_prefixes(),
            repo_markers: default_repo_markers(),
        }
    }
}

fn default_host() -> String {
    "github.com".to_string()
}
fn default_org() -> String {
    "sumatrapdfreader".to_string()
}
fn default_repo() -> String {
    "sumatrapdf".to_string()
}
fn default_build_path_prefixes() -> Vec<String> {
    vec![
        "d:\\a\\sumatrapdf\\sumatrapdf\\".to_string(),
        "c:\\users\\kjk\\src\\sumatrapdf\\".to_string(),
    ]
}
fn default_repo_markers() -> Vec<String> {
    vec!["sumatrapdf\\".to_string(), "sumatrapdf/".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct PublishConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default)]
    pub public_url_base: String,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            key_prefix: default_key_prefix(),
            public_url_base: String::new(),
        }
    }
}

fn default_key_prefix() -> String {
    "crash-reports".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    match config.store.kind.as_str() {
        "s3" => {
            if config.store.bucket.is_empty() {
                bail!("store.bucket must be set when store.kind is 's3'");
            }
        }
        "fs" => {
            if config.store.root.is_none() {
                bail!("store.root must be set when store.kind is 'fs'");
            }
        }
        other => bail!("Unknown store kind: '{}'. Must be s3 or fs.", other),
    }

    let policy = &config.policy;
    if policy.concurrency == 0 {
        bail!("policy.concurrency must be >= 1");
    }
    if policy.download_attempts == 0 {
        bail!("policy.download_attempts must be >= 1");
    }
    if policy.exception_lines == 0 || policy.crash_lines == 0 {
        bail!("policy.exception_lines and policy.crash_lines must be >= 1");
    }
    if policy.retention_days < 0 {
        bail!("policy.retention_days must be >= 0");
    }

    if config.publish.enabled && config.publish.public_url_base.is_empty() {
        bail!("publish.public_url_base must be set when publishing is enabled");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[store]
kind = "fs"
root = "/tmp/store"
prefix = "crashes/"

[paths]
data_dir = "/tmp/data"
html_dir = "/tmp/html"
"#;

    #[test]
    fn defaults_match_documented_policy() {
        let cfg = parse_config(MINIMAL).unwrap();
        assert_eq!(cfg.policy.retention_days, 14);
        assert_eq!(cfg.policy.concurrency, 64);
        assert_eq!(cfg.policy.download_attempts, 3);
        assert_eq!(cfg.policy.retry_delay_ms, 500);
        assert_eq!(cfg.policy.exception_lines, 5);
        assert_eq!(cfg.policy.crash_lines, 32);
        assert_eq!(cfg.policy.oversize_branch, "3.2");
        assert_eq!(cfg.policy.oversize_bytes, 262_144);
        assert_eq!(cfg.store.include_globs, vec!["**/*.txt"]);
        assert!(!cfg.publish.enabled);
    }

    #[test]
    fn s3_requires_bucket() {
        let toml = MINIMAL.replace("kind = \"fs\"", "kind = \"s3\"");
        let err = parse_config(&toml).unwrap_err();
        assert!(err.to_string().contains("store.bucket"));
    }

    #[test]
    fn rejects_zero_concurrency() {
        let toml = format!("{}\n[policy]\nconcurrency = 0\n", MINIMAL);
        assert!(parse_config(&toml).is_err());
    }

    #[test]
    fn rejects_unknown_store() {
        let toml = MINIMAL.replace("kind = \"fs\"", "kind = \"gcs\"");
        let err = parse_config(&toml).unwrap_err();
        assert!(err.to_string().contains("Unknown store kind"));
    }

    #[test]
    fn publish_needs_url() {
        let toml = format!("{}\n[publish]\nenabled = true\n", MINIMAL);
        assert!(parse_config(&toml).is_err());
    }
}
