//! Shared CLI output: JSON results on stdout, styled status lines on stderr.

use serde::Serialize;
use std::io::IsTerminal;
use webvakt::ChangeRecord;

/// Verbosity chosen on the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputMode {
    pub quiet: bool,
    pub verbose: bool,
}

/// Message sent back with every successful check.
pub const SUCCESS_MESSAGE: &str = "Changes detected successfully.";

/// The result envelope printed by `webvakt check`.
#[derive(Debug, Serialize)]
pub struct CheckResponse<'a> {
    pub message: &'static str,
    pub changes: &'a [ChangeRecord],
}

impl<'a> CheckResponse<'a> {
    pub fn new(changes: &'a [ChangeRecord]) -> Self {
        Self {
            message: SUCCESS_MESSAGE,
            changes,
        }
    }
}

/// Check if color output is enabled.
pub fn color_enabled() -> bool {
    // Respect NO_COLOR env (https://no-color.org/)
    if std::env::var("NO_COLOR").is_ok() || std::env::var("WEBVAKT_NO_COLOR").is_ok() {
        return false;
    }
    std::io::stderr().is_terminal()
}

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const DIM: &str = "\x1b[2m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Colored string builder.
pub struct Styled {
    use_color: bool,
}

impl Styled {
    pub fn new() -> Self {
        Self {
            use_color: color_enabled(),
        }
    }

    /// Green checkmark symbol.
    pub fn ok_sym(&self) -> &str {
        if self.use_color {
            "\x1b[32m\u{2713}\x1b[0m"
        } else {
            "OK"
        }
    }

    /// Yellow warning symbol.
    pub fn warn_sym(&self) -> &str {
        if self.use_color {
            "\x1b[33m\u{26a0}\x1b[0m"
        } else {
            "??"
        }
    }

    pub fn green(&self, s: &str) -> String {
        self.paint(GREEN, s)
    }

    pub fn yellow(&self, s: &str) -> String {
        self.paint(YELLOW, s)
    }

    pub fn dim(&self, s: &str) -> String {
        self.paint(DIM, s)
    }

    pub fn bold(&self, s: &str) -> String {
        self.paint(BOLD, s)
    }

    fn paint(&self, code: &str, s: &str) -> String {
        if self.use_color {
            format!("{code}{s}{RESET}")
        } else {
            s.to_string()
        }
    }
}

/// Print a section header.
pub fn print_section(s: &Styled, title: &str) {
    eprintln!("  {}", s.bold(title));
}

/// Print a check result line with symbol and label/value.
pub fn print_check(symbol: &str, label: &str, value: &str) {
    eprintln!("    {symbol} {label:<30} {value}");
}

/// Print an indented detail/fix line under a check.
pub fn print_detail(msg: &str) {
    eprintln!("                                     {msg}");
}

/// One stderr line per change, e.g. `#price (text) changed`.
pub fn print_change_summary(s: &Styled, url: &str, changes: &[ChangeRecord]) {
    if changes.is_empty() {
        eprintln!("  {} No changes on {url}", s.ok_sym());
        return;
    }
    eprintln!(
        "  {} {} on {url}",
        s.warn_sym(),
        s.yellow(&format!("{} change(s)", changes.len()))
    );
    for change in changes {
        let note = match &change.error {
            Some(e) => s.dim(&format!("broken: {e}")),
            None => s.dim("changed"),
        };
        eprintln!(
            "      monitor {} {} ({}) {note}",
            change.monitor_id, change.selector, change.comparison_type
        );
    }
}

/// Print JSON output to stdout.
pub fn print_json<T: Serialize>(value: &T) {
    if let Ok(s) = serde_json::to_string_pretty(value) {
        println!("{s}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webvakt::{ComparisonType, MonitorSpec};

    fn sample() -> ChangeRecord {
        let monitor =
            MonitorSpec::new(5, "#x", ComparisonType::Text).expecting(serde_json::json!("Hi"));
        let detected_at = "2024-05-01T08:30:00Z".parse().unwrap();
        ChangeRecord::new(&monitor, serde_json::json!("Hello"), detected_at)
    }

    #[test]
    fn test_response_envelope() {
        let changes = vec![sample()];
        let value = serde_json::to_value(CheckResponse::new(&changes)).unwrap();

        assert_eq!(value["message"], "Changes detected successfully.");
        assert_eq!(value["changes"][0]["MonitorID"], 5);
        assert_eq!(value["changes"][0]["current"], "Hello");
    }

    #[test]
    fn test_empty_envelope_still_has_changes_array() {
        let value = serde_json::to_value(CheckResponse::new(&[])).unwrap();
        assert_eq!(value["changes"], serde_json::json!([]));
    }

    #[test]
    fn test_plain_styling_without_color() {
        let s = Styled { use_color: false };
        assert_eq!(s.green("ok"), "ok");
        assert_eq!(s.ok_sym(), "OK");
    }
}
