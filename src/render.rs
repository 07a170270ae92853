//! Static HTML report.
//!
//! Two templates: a per-day index (navigation strip of all days plus one
//! row per visible crash) and a per-crash detail page (linked stack
//! followed by the raw report). Rendering is a pure function of the day
//! index; nothing here filters or reorders records.
//!
//! Output file set:
//!
//! | File | Content |
//! |------|---------|
//! | `<YYYY-MM-DD>.html` | day index |
//! | `index.html` | copy of the newest day index |
//! | `<report>.html` | crash detail, named after the report's `.txt` |

use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::io::ErrorKind;
use std::path::Path;
use tracing::warn;

use crate::aggregate::days_newest_first;
use crate::models::{CrashInfo, DayIndex};

const STYLE: &str = r#"body { font-family: system-ui, sans-serif; font-size: 14px; margin: 1em 2em; }
.days { margin-bottom: 1em; }
.days a { margin-right: 0.6em; }
table { border-collapse: collapse; }
td { padding: 2px 8px; vertical-align: top; }
td.ver { white-space: nowrap; color: #555; }
pre { font-size: 12px; background: #f6f6f6; padding: 8px; overflow-x: auto; }
.frames div { font-family: monospace; font-size: 12px; }
.suspicious { background: #ffd6d6; font-weight: bold; }"#;

const LANDING_PAGE: &str = "index.html";

/// Rendered site: relative file name → file bytes.
pub type Site = BTreeMap<String, Vec<u8>>;

/// Render every page for `index`.
pub fn render_site(index: &DayIndex, safe_modules: &[String]) -> Site {
    let mut site = Site::new();
    let days = days_newest_first(index);
    let mut reserved: BTreeSet<String> = days.iter().map(|d| format!("{}.html", d)).collect();
    reserved.insert(LANDING_PAGE.to_string());

    for day in &days {
        let records: Vec<&CrashInfo> = index[day].iter().filter(|ci| !ci.is_deleted).collect();
        let page = render_day_page(day, &days, &records);
        site.insert(format!("{}.html", day), page.into_bytes());

        for ci in records {
            if reserved.contains(&ci.file_name_html) || site.contains_key(&ci.file_name_html) {
                warn!(
                    key = %ci.store_key,
                    page = %ci.file_name_html,
                    "crash page name collides with another page, not rendered"
                );
                continue;
            }
            site.insert(
                ci.file_name_html.clone(),
                render_crash_page(ci, safe_modules).into_bytes(),
            );
        }
    }

    let landing = match days.first() {
        Some(newest) => site[&format!("{}.html", newest)].clone(),
        None => render_day_page("", &days, &[]).into_bytes(),
    };
    site.insert(LANDING_PAGE.to_string(), landing);
    site
}

/// Day index page.
pub fn render_day_page(day: &str, days: &[String], records: &[&CrashInfo]) -> String {
    let mut nav = String::new();
    for d in days {
        if d == day {
            nav.push_str(&format!("<b>{}</b>\n", escape_html(d)));
        } else {
            nav.push_str(&format!(
                "<a href=\"{}.html\">{}</a>\n",
                escape_html(d),
                escape_html(d)
            ));
        }
    }

    let mut rows = String::new();
    for ci in records {
        let first = ci.first_crash_line();
        let label = if first.is_empty() { "(no stack)" } else { first };
        rows.push_str(&format!(
            "<tr><td class=\"ver\">{}</td><td><a href=\"{}\">{}</a></td></tr>\n",
            escape_html(&ci.version_disp),
            escape_html(&ci.file_name_html),
            escape_html(label)
        ));
    }

    let title = if day.is_empty() {
        "Crashes".to_string()
    } else {
        format!("Crashes {}", day)
    };

    format!(
        r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>
{style}
</style>
</head>
<body>
<div class="days">
{nav}</div>
<p>{count} crashes</p>
<table>
{rows}</table>
</body>
</html>
"#,
        title = escape_html(&title),
        style = STYLE,
        nav = nav,
        count = records.len(),
        rows = rows,
    )
}

/// Crash detail page.
pub fn render_crash_page(ci: &CrashInfo, safe_modules: &[String]) -> String {
    let mut frames = String::new();
    for line in &ci.crash_lines_linked {
        if line.url.is_empty() {
            frames.push_str(&format!("<div>{}</div>\n", escape_html(&line.text)));
        } else {
            frames.push_str(&format!(
                "<div><a href=\"{}\" target=\"_blank\">{}</a></div>\n",
                escape_html(&line.url),
                escape_html(&line.text)
            ));
        }
    }

    let mut header = String::new();
    for field in [&ci.report.version, &ci.report.os, &ci.report.crash_file] {
        if !field.is_empty() {
            header.push_str(&format!("<div>{}</div>\n", escape_html(field)));
        }
    }
    for line in &ci.report.exception_info {
        header.push_str(&format!("<div>{}</div>\n", escape_html(line)));
    }

    format!(
        r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>
{style}
</style>
</head>
<body>
<p><a href="{day}.html">{day}</a> / {title}</p>
{header}<div class="frames">
{frames}</div>
<pre>{body}</pre>
</body>
</html>
"#,
        title = escape_html(&ci.file_name_txt),
        style = STYLE,
        day = escape_html(&ci.day),
        header = header,
        frames = frames,
        body = highlight_body(&ci.body, safe_modules),
    )
}

/// Escape the raw body, wrapping `Module:` lines for modules outside the
/// allowlist so injected DLLs stand out.
pub fn highlight_body(body: &str, safe_modules: &[String]) -> String {
    let body = body.replace("\r\n", "\n");
    let mut out = String::with_capacity(body.len() + body.len() / 8);
    for (i, line) in body.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        if is_suspicious_module(line, safe_modules) {
            out.push_str("<span class=\"suspicious\">");
            out.push_str(&escape_html(line));
            out.push_str("</span>");
        } else {
            out.push_str(&escape_html(line));
        }
    }
    out
}

/// `Module: <base> <size> <path>` line naming a module not on the list.
pub fn is_suspicious_module(line: &str, safe_modules: &[String]) -> bool {
    let trimmed = line.trim();
    if !trimmed.to_ascii_lowercase().starts_with("module:") {
        return false;
    }
    let Some(path) = trimmed.split_whitespace().last() else {
        return false;
    };
    let name = path.rsplit(['\\', '/']).next().unwrap_or(path).to_ascii_lowercase();
    !safe_modules.iter().any(|m| m.eq_ignore_ascii_case(&name))
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Empty `dir`, creating it if needed.
pub fn clear_dir(dir: &Path) -> Result<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e).with_context(|| format!("Failed to clear {}", dir.display())),
    }
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))
}

/// Write the rendered pages into `dir`.
pub fn write_site(dir: &Path, site: &Site) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    for (name, bytes) in site {
        let path = dir.join(name);
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CrashLine, CrashReport};

    fn crash(day: &str, name: &str, deleted: bool) -> CrashInfo {
        CrashInfo {
            day: day.to_string(),
            report: CrashReport {
                version: "Ver: 3.5.16000".to_string(),
                ..Default::default()
            },
            version_disp: "3.5.16000".to_string(),
            crash_lines_linked: vec![
                CrashLine {
                    text: "SumatraPDF.exe!Foo+0x1 src\\Foo.cpp+42".to_string(),
                    url: "https://github.com/o/r/blob/abc/src/Foo.cpp#L42".to_string(),
                },
                CrashLine::plain("ntdll.dll!Bar<int>+0x2"),
            ],
            is_deleted: deleted,
            file_name_txt: format!("{}.txt", name),
            file_name_html: format!("{}.html", name),
            body: "Ver: 3.5.16000\r\nModule: 7FF0 1000 C:\\Windows\\ntdll.dll\r\nModule: 7FF1 1000 C:\\evil\\hook.dll\r\n".to_string(),
            ..Default::default()
        }
    }

    fn safe() -> Vec<String> {
        vec!["ntdll.dll".to_string(), "SumatraPDF.exe".to_string()]
    }

    #[test]
    fn site_has_expected_files() {
        let mut index = DayIndex::new();
        index.insert("2026-10-01".to_string(), vec![crash("2026-10-01", "a", false)]);
        index.insert(
            "2026-10-02".to_string(),
            vec![crash("2026-10-02", "b", false), crash("2026-10-02", "c", true)],
        );
        let site = render_site(&index, &safe());
        let names: Vec<&str> = site.keys().map(|k| k.as_str()).collect();
        assert_eq!(
            names,
            vec!["2026-10-01.html", "2026-10-02.html", "a.html", "b.html", "index.html"]
        );
        assert_eq!(site["index.html"], site["2026-10-02.html"]);
    }

    #[test]
    fn day_page_lists_days_and_rows() {
        let days = vec!["2026-10-02".to_string(), "2026-10-01".to_string()];
        let c = crash("2026-10-02", "b", false);
        let html = render_day_page("2026-10-02", &days, &[&c]);
        assert!(html.contains("<b>2026-10-02</b>"));
        assert!(html.contains("<a href=\"2026-10-01.html\">2026-10-01</a>"));
        assert!(html.contains("<a href=\"b.html\">SumatraPDF.exe!Foo+0x1 src\\Foo.cpp+42</a>"));
        assert!(html.contains("3.5.16000"));
    }

    #[test]
    fn crash_page_links_and_escapes() {
        let c = crash("2026-10-02", "b", false);
        let html = render_crash_page(&c, &safe());
        assert!(html.contains("href=\"https://github.com/o/r/blob/abc/src/Foo.cpp#L42\""));
        assert!(html.contains("ntdll.dll!Bar&lt;int&gt;+0x2"));
        assert!(html.contains("<span class=\"suspicious\">Module: 7FF1 1000 C:\\evil\\hook.dll</span>"));
        assert!(!html.contains("<span class=\"suspicious\">Module: 7FF0"));
    }

    #[test]
    fn suspicious_module_detection() {
        let safe = safe();
        assert!(!is_suspicious_module("Module: 1 2 C:\\Windows\\NTDLL.DLL", &safe));
        assert!(is_suspicious_module("module: 1 2 C:\\x\\inject.dll", &safe));
        assert!(!is_suspicious_module("Crashed thread:", &safe));
    }

    #[test]
    fn crash_pages_never_replace_day_or_landing_pages() {
        let mut index = DayIndex::new();
        index.insert(
            "2026-10-01".to_string(),
            vec![crash("2026-10-01", "index", false), crash("2026-10-01", "a", false)],
        );
        index.insert(
            "2026-10-02".to_string(),
            vec![
                crash("2026-10-02", "2026-10-01", false),
                crash("2026-10-02", "b", false),
            ],
        );
        let site = render_site(&index, &safe());
        let names: Vec<&str> = site.keys().map(|k| k.as_str()).collect();
        assert_eq!(
            names,
            vec!["2026-10-01.html", "2026-10-02.html", "a.html", "b.html", "index.html"]
        );
        assert_eq!(site["index.html"], site["2026-10-02.html"]);
        let day = String::from_utf8_lossy(&site["2026-10-01.html"]);
        assert!(day.contains("<b>2026-10-01</b>"));
    }

    #[test]
    fn empty_index_still_has_landing_page() {
        let site = render_site(&DayIndex::new(), &safe());
        assert_eq!(site.len(), 1);
        assert!(site.contains_key("index.html"));
    }

    #[test]
    fn clear_and_write() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().join("html");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("stale.html"), "old").unwrap();
        clear_dir(&dir).unwrap();
        let mut site = Site::new();
        site.insert("index.html".to_string(), b"new".to_vec());
        write_site(&dir, &site).unwrap();
        assert!(!dir.join("stale.html").exists());
        assert_eq!(std::fs::read(dir.join("index.html")).unwrap(), b"new");
    }
}
