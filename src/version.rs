//! Parsing of the `Ver:` line of a crash report.
//!
//! The caller strips the `Ver:` prefix, leaving e.g.
//! `3.2.11495 pre-release 64-bit` or `3.3`.

use anyhow::{Context, Result};

use crate::models::ParsedVersion;

/// Strip the `Ver:` prefix and surrounding whitespace from a raw line.
pub fn strip_version_prefix(line: &str) -> &str {
    let line = line.trim();
    line.strip_prefix("Ver:").unwrap_or(line).trim()
}

/// Parse a version string such as `3.2.11495 pre-release 64-bit`.
///
/// A three-part version yields a numeric `build`, a two-part one a
/// `main_branch`; anything else is kept verbatim as `main_branch`.
///
/// # Errors
///
/// Returns an error when a three-part version has a non-numeric build.
pub fn parse_version(s: &str) -> Result<ParsedVersion> {
    let mut parsed = ParsedVersion::default();
    let mut tokens = s.split_whitespace();
    let Some(ver) = tokens.next() else {
        return Ok(parsed);
    };

    let parts: Vec<&str> = ver.split('.').collect();
    match parts.len() {
        3 => {
            parsed.build = parts[2]
                .parse::<u64>()
                .with_context(|| format!("invalid build number in version '{}'", ver))?;
        }
        2 => parsed.main_branch = parts.join("."),
        _ => parsed.main_branch = ver.to_string(),
    }

    for tok in tokens {
        match tok {
            "pre-release" => parsed.is_pre_release = true,
            "64-bit" => parsed.is_64_bit = true,
            _ => {}
        }
    }
    Ok(parsed)
}
