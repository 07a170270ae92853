//! Mapping of raw stack frames to links into the source repository.
//!
//! Frames written by the crash handler look like
//!
//! ```text
//! <address> <section:offset> <module!symbol+0x12> <file+line>
//! ```
//!
//! The first two fields are dropped for display. When the last field is a
//! path inside the source repository followed by `+<line>`, the frame is
//! linked to that line at the commit the build was made from.

use crate::config::SymbolsConfig;
use crate::models::CrashLine;

/// Frame prefix written when native symbolication failed on the client.
const UNRESOLVED_PREFIX: &str = "GetStackFrameInfo()";

/// Turns raw frames into [`CrashLine`]s.
pub struct Symbolicator<'a> {
    symbols: &'a SymbolsConfig,
    noise_frames: &'a [String],
}

impl<'a> Symbolicator<'a> {
    pub fn new(symbols: &'a SymbolsConfig, noise_frames: &'a [String]) -> Self {
        Self {
            symbols,
            noise_frames,
        }
    }

    /// Link every frame that is not part of the crash handler itself.
    pub fn link_all(&self, crash_lines: &[String], git_sha1: &str) -> Vec<CrashLine> {
        crash_lines
            .iter()
            .filter(|l| !self.is_noise(l))
            .map(|l| self.link(l, git_sha1))
            .collect()
    }

    pub fn is_noise(&self, line: &str) -> bool {
        self.noise_frames.iter().any(|n| line.contains(n.as_str()))
    }

    /// Convert one frame. Never fails; unrecognized shapes come back as
    /// plain text.
    pub fn link(&self, line: &str, git_sha1: &str) -> CrashLine {
        if line.starts_with(UNRESOLVED_PREFIX) {
            return CrashLine::plain(line);
        }

        let fields: Vec<&str> = line.splitn(4, ' ').collect();
        if fields.len() < 3 {
            return CrashLine::plain(line);
        }

        let text = self.strip_build_path(&fields[2..].join(" "));
        let url = match fields.get(3) {
            Some(location) if !git_sha1.is_empty() => self
                .source_location(location)
                .map(|(path, line_no)| self.source_url(git_sha1, &path, line_no))
                .unwrap_or_default(),
            _ => String::new(),
        };
        CrashLine { text, url }
    }

    fn strip_build_path(&self, s: &str) -> String {
        let mut out = s.to_string();
        for prefix in &self.symbols.build_path_prefixes {
            out = replace_ignore_ascii_case(&out, prefix, "");
        }
        out
    }

    /// Split `<repo path>+<line>` into a forward-slash path and line number.
    fn source_location(&self, location: &str) -> Option<(String, u32)> {
        let mut loc = self.strip_build_path(location.trim());
        let lower = loc.to_ascii_lowercase();
        for marker in &self.symbols.repo_markers {
            if let Some(pos) = lower.find(&marker.to_ascii_lowercase()) {
                loc = loc[pos + marker.len()..].to_string();
                break;
            }
        }

        let (path, line_no) = loc.rsplit_once('+')?;
        let line_no = line_no.parse::<u32>().ok()?;
        let path = path.replace('\\', "/");
        if path.is_empty() || path.contains(':') || path.starts_with('/') {
            return None;
        }
        Some((path, line_no))
    }

    fn source_url(&self, git_sha1: &str, path: &str, line_no: u32) -> String {
        format!(
            "https://{}/{}/{}/blob/{}/{}#L{}",
            self.symbols.host, self.symbols.org, self.symbols.repo, git_sha1, path, line_no
        )
    }
}

/// ASCII case-insensitive replacement; build paths differ in drive-letter
/// and directory case between machines.
fn replace_ignore_ascii_case(haystack: &str, needle: &str, with: &str) -> String {
    if needle.is_empty() {
        return haystack.to_string();
    }
    let lower_hay = haystack.to_ascii_lowercase();
    let lower_needle = needle.to_ascii_lowercase();
    let mut out = String::with_capacity(haystack.len());
    let mut last = 0;
    for (idx, _) in lower_hay.match_indices(&lower_needle) {
        out.push_str(&haystack[last..idx]);
        out.push_str(with);
        last = idx + needle.len();
    }
    out.push_str(&haystack[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHA: &str = "deadbeefdeadbeefdeadbeefdeadbeefdeadbeef";

    fn symbols() -> SymbolsConfig {
        SymbolsConfig::default()
    }

    fn noise() -> Vec<String> {
        vec!["!CrashMe".to_string()]
    }

    #[test]
    fn links_repo_relative_path() {
        let cfg = symbols();
        let noise = noise();
        let sym = Symbolicator::new(&cfg, &noise);
        let l = sym.link("0000000140001000 01: 0000000000001000 src/Foo.cpp+42", SHA);
        assert!(l.url.ends_with(&format!("/blob/{}/src/Foo.cpp#L42", SHA)));
        assert_eq!(
            l.url,
            format!(
                "https://github.com/sumatrapdfreader/sumatrapdf/blob/{}/src/Foo.cpp#L42",
                SHA
            )
        );
        assert_eq!(l.text, "0000000000001000 src/Foo.cpp+42");
    }

    #[test]
    fn strips_build_path_and_converts_backslashes() {
        let cfg = symbols();
        let noise = noise();
        let sym = Symbolicator::new(&cfg, &noise);
        let l = sym.link(
            "00007FF6A1B2C3D4 01:0000000000012345 SumatraPDF.exe!Foo+0x12 D:\\a\\sumatrapdf\\sumatrapdf\\src\\Foo.cpp+42",
            SHA,
        );
        assert_eq!(l.text, "SumatraPDF.exe!Foo+0x12 src\\Foo.cpp+42");
        assert!(l.url.ends_with("/src/Foo.cpp#L42"));
    }

    #[test]
    fn repo_marker_anywhere_in_path() {
        let cfg = symbols();
        let noise = noise();
        let sym = Symbolicator::new(&cfg, &noise);
        let l = sym.link(
            "1 2 SumatraPDF.exe!Foo+0x12 e:\\build\\sumatrapdf\\mupdf\\source\\fitz\\a.c+7",
            SHA,
        );
        assert!(l.url.ends_with("/mupdf/source/fitz/a.c#L7"));
    }

    #[test]
    fn unresolved_frames_pass_through() {
        let cfg = symbols();
        let noise = noise();
        let sym = Symbolicator::new(&cfg, &noise);
        let line = "GetStackFrameInfo(): SymFromAddr() failed";
        assert_eq!(sym.link(line, SHA), CrashLine::plain(line));
    }

    #[test]
    fn system_frames_have_no_url() {
        let cfg = symbols();
        let noise = noise();
        let sym = Symbolicator::new(&cfg, &noise);
        let l = sym.link("1 2 ntdll.dll!RtlUserThreadStart+0x21", SHA);
        assert_eq!(l.text, "ntdll.dll!RtlUserThreadStart+0x21");
        assert!(l.url.is_empty());

        let l = sym.link("1 2 vcruntime.dll!x d:\\agent\\_work\\crt\\x.cpp+77", SHA);
        assert!(l.url.is_empty());
    }

    #[test]
    fn no_url_without_commit() {
        let cfg = symbols();
        let noise = noise();
        let sym = Symbolicator::new(&cfg, &noise);
        let l = sym.link("1 2 src/Foo.cpp+42", "");
        assert!(l.url.is_empty());
        assert_eq!(l.text, "src/Foo.cpp+42");
    }

    #[test]
    fn short_lines_are_plain() {
        let cfg = symbols();
        let noise = noise();
        let sym = Symbolicator::new(&cfg, &noise);
        assert_eq!(sym.link("SumatraPDF.exe", SHA), CrashLine::plain("SumatraPDF.exe"));
    }

    #[test]
    fn noise_frames_dropped() {
        let cfg = symbols();
        let noise = noise();
        let sym = Symbolicator::new(&cfg, &noise);
        let lines = vec![
            "1 2 SumatraPDF.exe!CrashMe+0x1".to_string(),
            "1 2 SumatraPDF.exe!Real+0x1".to_string(),
        ];
        let linked = sym.link_all(&lines, SHA);
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].text, "SumatraPDF.exe!Real+0x1");
    }
}
