//! Line-oriented parser for the plain-text crash reports.
//!
//! A report is a loose sequence of `Key: value` lines plus two multi-line
//! blocks: the exception block started by `Exception:` and the crashed
//! thread's stack started by `Crashed thread:`. The parser makes a single
//! forward pass, never fails, and leaves anything it does not find at its
//! zero value.
//!
//! ```text
//! Crash file: C:\Users\x\AppData\Local\SumatraPDF\crashinfo.txt
//! Ver: 3.5.15432 pre-release 64-bit
//! Git: 0123456789abcdef0123456789abcdef01234567 [https://...]
//! OS: Windows 10 22H2 19045
//!
//! Exception: C0000005 EXCEPTION_ACCESS_VIOLATION
//! Faulting IP: 00007FF6A1B2C3D4 01:0000000000012345 SumatraPDF.exe
//!
//! Crashed thread:
//! 00007FF6A1B2C3D4 01:0000000000012345 SumatraPDF.exe!Foo+0x12 d:\a\sumatrapdf\sumatrapdf\src\Foo.cpp+42
//! ```

use tracing::warn;

use crate::models::CrashReport;
use crate::version::{parse_version, strip_version_prefix};

/// Lengths of the bare address tokens that appear in place of frames the
/// crash handler could not resolve (64-bit and 32-bit).
const NOISE_TOKEN_LENS: [usize; 2] = [16, 8];

/// Caps on the two multi-line blocks.
#[derive(Debug, Clone, Copy)]
pub struct ParseLimits {
    pub exception_lines: usize,
    pub crash_lines: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            exception_lines: 5,
            crash_lines: 32,
        }
    }
}

enum State {
    Scan,
    Exception(Vec<String>),
    CrashLines(Vec<String>),
}

/// Parse one report body.
pub fn parse_crash(body: &str, limits: ParseLimits) -> CrashReport {
    let mut report = CrashReport::default();
    let body = body.replace("\r\n", "\n");
    let mut state = State::Scan;

    for line in body.split('\n') {
        state = match state {
            State::Scan => scan_line(line, &mut report, limits),
            State::Exception(mut buf) => {
                if line.trim().is_empty() {
                    report.exception_info = finish_exception(buf);
                    State::Scan
                } else {
                    buf.push(line.to_string());
                    if buf.len() >= limits.exception_lines {
                        report.exception_info = finish_exception(buf);
                        State::Scan
                    } else {
                        State::Exception(buf)
                    }
                }
            }
            State::CrashLines(mut buf) => {
                if line.trim().is_empty() || line.starts_with("Thread:") {
                    report.crash_lines = finish_crash_lines(buf);
                    State::Scan
                } else {
                    buf.push(line.to_string());
                    if buf.len() >= limits.crash_lines {
                        report.crash_lines = finish_crash_lines(buf);
                        State::Scan
                    } else {
                        State::CrashLines(buf)
                    }
                }
            }
        };
    }

    match state {
        State::Scan => {}
        State::Exception(buf) => report.exception_info = finish_exception(buf),
        State::CrashLines(buf) => report.crash_lines = finish_crash_lines(buf),
    }
    report
}

fn scan_line(line: &str, report: &mut CrashReport, limits: ParseLimits) -> State {
    if line.starts_with("Crash file:") {
        report.crash_file = line.trim().to_string();
    } else if line.starts_with("OS:") {
        report.os = line.trim().to_string();
    } else if line.starts_with("Git:") {
        report.git_sha1 = line
            .split_whitespace()
            .nth(1)
            .unwrap_or_default()
            .to_string();
    } else if line.starts_with("Ver:") {
        report.version = line.trim().to_string();
        let ver = strip_version_prefix(line);
        if ver.is_empty() {
            warn!("empty version line");
        } else {
            match parse_version(ver) {
                Ok(parsed) => report.parsed_version = Some(parsed),
                Err(e) => warn!(version = ver, error = %e, "unparsable version line"),
            }
        }
    } else if line.starts_with("Exception:") {
        let buf = vec![line.to_string()];
        if buf.len() >= limits.exception_lines {
            report.exception_info = finish_exception(buf);
            return State::Scan;
        }
        return State::Exception(buf);
    } else if line.starts_with("Crashed thread:") {
        return State::CrashLines(Vec::new());
    }
    State::Scan
}

fn finish_exception(buf: Vec<String>) -> Vec<String> {
    buf.into_iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

fn finish_crash_lines(buf: Vec<String>) -> Vec<String> {
    buf.into_iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty() && !is_noise_token(l))
        .collect()
}

/// A raw memory address with nothing decodable next to it.
fn is_noise_token(s: &str) -> bool {
    !s.contains(' ') && !s.contains('.') && NOISE_TOKEN_LENS.contains(&s.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Crash file: C:\\Users\\x\\crashinfo.txt\r\n\
Ver: 3.5.15432 pre-release 64-bit\r\n\
Git: 0123456789abcdef0123456789abcdef01234567 [https://github.com/x]\r\n\
OS: Windows 10 22H2 19045\r\n\
\r\n\
Exception: C0000005 EXCEPTION_ACCESS_VIOLATION\r\n\
Faulting IP: 00007FF6A1B2C3D4 01:0000000000012345 SumatraPDF.exe\r\n\
\r\n\
Crashed thread:\r\n\
00007FF6A1B2C3D4 01:0000000000012345 SumatraPDF.exe!Foo+0x12 src\\Foo.cpp+42\r\n\
00007FF6A1B2C3D4 01:0000000000012345 SumatraPDF.exe!Bar+0x1 src\\Bar.cpp+7\r\n\
\r\n\
Thread: 1234\r\n\
00007FF6A1B2C3D4 01:0000000000012345 ntdll.dll!NtWait+0x14\r\n";

    #[test]
    fn parses_scalar_fields() {
        let r = parse_crash(SAMPLE, ParseLimits::default());
        assert_eq!(r.crash_file, "Crash file: C:\\Users\\x\\crashinfo.txt");
        assert_eq!(r.os, "OS: Windows 10 22H2 19045");
        assert_eq!(r.git_sha1, "0123456789abcdef0123456789abcdef01234567");
        assert_eq!(r.version, "Ver: 3.5.15432 pre-release 64-bit");
        let v = r.parsed_version.unwrap();
        assert_eq!(v.build, 15432);
        assert!(v.is_pre_release && v.is_64_bit);
    }

    #[test]
    fn collects_blocks() {
        let r = parse_crash(SAMPLE, ParseLimits::default());
        assert_eq!(r.exception_info.len(), 2);
        assert!(r.exception_info[0].starts_with("Exception: C0000005"));
        assert_eq!(r.crash_lines.len(), 2);
        assert!(r.crash_lines[0].ends_with("src\\Foo.cpp+42"));
        assert!(r.crash_lines.iter().all(|l| !l.contains("NtWait")));
    }

    #[test]
    fn removes_noise_tokens() {
        let body = "Crashed thread:\n0000000000000001\n0000003F\nabc.dll!Foo+0x1\n";
        let r = parse_crash(body, ParseLimits::default());
        assert_eq!(r.crash_lines, vec!["abc.dll!Foo+0x1"]);
    }

    #[test]
    fn exception_block_capped() {
        let body = "Exception: one\ntwo\nthree\nfour\nfive\nsix\n";
        let r = parse_crash(body, ParseLimits::default());
        assert_eq!(r.exception_info, vec!["Exception: one", "two", "three", "four", "five"]);
    }

    #[test]
    fn crash_lines_capped() {
        let mut body = String::from("Crashed thread:\n");
        for i in 0..40 {
            body.push_str(&format!("frame {}\n", i));
        }
        let r = parse_crash(&body, ParseLimits::default());
        assert_eq!(r.crash_lines.len(), 32);
        assert_eq!(r.crash_lines[31], "frame 31");
    }

    #[test]
    fn thread_line_ends_stack() {
        let body = "Crashed thread:\na.dll!A\nThread: 7\nb.dll!B\n";
        let r = parse_crash(body, ParseLimits::default());
        assert_eq!(r.crash_lines, vec!["a.dll!A"]);
    }

    #[test]
    fn block_open_at_end_of_input_is_kept() {
        let r = parse_crash("Crashed thread:\na.dll!A", ParseLimits::default());
        assert_eq!(r.crash_lines, vec!["a.dll!A"]);
    }

    #[test]
    fn malformed_input_degrades_to_empty() {
        let r = parse_crash("garbage\n\nmore garbage", ParseLimits::default());
        assert_eq!(r, CrashReport::default());
    }

    #[test]
    fn empty_version_line_is_unparsed() {
        let r = parse_crash("Ver:\nOS: x\n", ParseLimits::default());
        assert_eq!(r.version, "Ver:");
        assert!(r.parsed_version.is_none());

        let r = parse_crash("Ver:   \r\n", ParseLimits::default());
        assert!(r.parsed_version.is_none());
    }

    #[test]
    fn bad_build_leaves_version_unparsed() {
        let r = parse_crash("Ver: 3.2.abc\n", ParseLimits::default());
        assert_eq!(r.version, "Ver: 3.2.abc");
        assert!(r.parsed_version.is_none());
    }

    #[test]
    fn git_without_sha() {
        let r = parse_crash("Git:\n", ParseLimits::default());
        assert_eq!(r.git_sha1, "");
    }
}
