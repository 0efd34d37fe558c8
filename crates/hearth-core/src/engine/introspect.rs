//! Read-only reflection over namespace entries.

use crate::config::EngineConfig;
use crate::interp::Value;
use crate::protocol::VariableInfo;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

const KB: u64 = 1024;
const MB: u64 = 1024 * 1024;

/// Build the reflection record for one entry.
pub fn describe(name: &str, value: &Value) -> VariableInfo {
    let size_bytes = value.approximate_size();
    VariableInfo {
        name: name.to_string(),
        type_name: value.type_name().to_string(),
        size_bytes,
        size: format_size(size_bytes),
        preview: preview(value),
    }
}

/// Case-insensitive substring match; an empty pattern matches everything.
pub fn matches_pattern(name: &str, pattern: &str) -> bool {
    pattern.is_empty() || name.to_lowercase().contains(&pattern.to_lowercase())
}

/// `repr(value)` cut to the preview length, with an ellipsis when cut.
pub fn preview(value: &Value) -> String {
    let max = EngineConfig::PREVIEW_MAX_CHARS;
    // Rendering is bounded in bytes; four bytes per char covers any UTF-8.
    let rendered = catch_unwind(AssertUnwindSafe(|| value.repr_bounded(max * 4 + 4)));
    let Ok(text) = rendered else {
        return EngineConfig::PREVIEW_PLACEHOLDER.to_string();
    };

    if text.chars().count() > max {
        let mut cut: String = text.chars().take(max).collect();
        cut.push_str(EngineConfig::PREVIEW_ELLIPSIS);
        cut
    } else {
        text
    }
}

pub fn format_size(bytes: u64) -> String {
    if bytes < KB {
        format!("{} B", bytes)
    } else if bytes < MB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    }
}

/// `"{minutes}m {seconds}s"`
pub fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    format!("{}m {}s", secs / 60, secs % 60)
}

pub fn format_memory(bytes: Option<u64>) -> String {
    match bytes {
        Some(bytes) => format!("{:.1} MB", bytes as f64 / MB as f64),
        None => "unavailable".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_truncates_long_values() {
        let long = Value::list((0..100).map(Value::Int).collect());
        let text = preview(&long);
        assert_eq!(text.chars().count(), 50 + 3);
        assert!(text.starts_with("[0, 1, 2"));
        assert!(text.ends_with("..."));
    }

    #[test]
    fn test_preview_keeps_short_values() {
        assert_eq!(preview(&Value::from("hi")), "'hi'");
        assert_eq!(preview(&Value::Int(42)), "42");
    }

    #[test]
    fn test_preview_exactly_at_limit_has_no_ellipsis() {
        let text = "a".repeat(48);
        let value = Value::from(text.as_str());
        assert_eq!(preview(&value).chars().count(), 50);
        assert!(!preview(&value).ends_with("..."));
    }

    #[test]
    fn test_preview_multibyte_text() {
        let value = Value::from("é".repeat(80).as_str());
        let text = preview(&value);
        assert_eq!(text.chars().count(), 53);
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(28), "28 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(3 * MB), "3.0 MB");
    }

    #[test]
    fn test_format_uptime_and_memory() {
        assert_eq!(format_uptime(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_memory(Some(MB + MB / 2)), "1.5 MB");
        assert_eq!(format_memory(None), "unavailable");
    }

    #[test]
    fn test_pattern_is_case_insensitive() {
        assert!(matches_pattern("DataFrame", "frame"));
        assert!(matches_pattern("x", ""));
        assert!(!matches_pattern("x", "y"));
    }

    #[test]
    fn test_describe() {
        let info = describe("x", &Value::Int(1));
        assert_eq!(info.type_name, "int");
        assert_eq!(info.size, format_size(info.size_bytes));
        assert_eq!(info.preview, "1");
    }
}
