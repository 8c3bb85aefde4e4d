//! Plain-text processing report built from batch log lines.

use chrono::{DateTime, Utc};
use zip_content_replacer_core::models::{LogLevel, LogLine};

const TITLE: &str = "ZIP Content Replacer - Processing Report";

/// Render `lines` as a report generated at `generated`.
pub fn render_report(lines: &[LogLine], generated: DateTime<Utc>) -> String {
    let mut out = String::new();
    out.push_str(TITLE);
    out.push('\n');
    out.push_str(&"=".repeat(TITLE.len()));
    out.push('\n');
    out.push_str(&format!(
        "Generated: {}\n\n",
        generated.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    for line in lines {
        out.push_str(&line.to_string());
        out.push('\n');
    }
    out
}

/// Lines of exactly `level`, or all lines when `level` is `None`.
pub fn filter_lines(lines: &[LogLine], level: Option<LogLevel>) -> Vec<&LogLine> {
    lines
        .iter()
        .filter(|l| level.map_or(true, |lvl| l.level == lvl))
        .collect()
}

/// Count of lines per level, in display order.
pub fn summarize(lines: &[LogLine]) -> Vec<(LogLevel, usize)> {
    [
        LogLevel::Success,
        LogLevel::Error,
        LogLevel::Warning,
        LogLevel::Info,
        LogLevel::Skip,
    ]
    .into_iter()
    .map(|lvl| (lvl, lines.iter().filter(|l| l.level == lvl).count()))
    .collect()
}
