//! Human-readable rendering of kernel results for terminal callers.

use crate::error::KernelError;
use crate::protocol::{Action, ExecuteResult, InspectResult, ResetResult, StatusResult};

pub fn format_execute(result: &ExecuteResult) -> String {
    let mut parts = Vec::new();
    if result.success {
        parts.push("OK".to_string());
        if !result.stdout.is_empty() {
            parts.push(format!("--- Output ---\n{}", result.stdout));
        }
        if !result.stderr.is_empty() {
            parts.push(format!("--- Stderr ---\n{}", result.stderr));
        }
        if parts.len() == 1 {
            return "OK (no output)".to_string();
        }
    } else {
        parts.push("ERROR execution failed".to_string());
        if !result.stdout.is_empty() {
            parts.push(format!("--- Output ---\n{}", result.stdout));
        }
        if !result.stderr.is_empty() {
            parts.push(format!("--- Stderr ---\n{}", result.stderr));
        }
        if let Some(error) = &result.error {
            parts.push(format!("--- Error ---\n{}", error));
        }
    }
    parts.join("\n")
}

pub fn format_status(result: &StatusResult) -> String {
    format!(
        "KERNEL running\n\
         ├─ Uptime: {}\n\
         ├─ Variables: {}\n\
         └─ Memory: {}",
        result.uptime_human, result.variable_count, result.memory_usage
    )
}

pub fn format_inspect(result: &InspectResult, pattern: &str) -> String {
    if result.count == 0 {
        if pattern.is_empty() {
            return "INSPECT no variables in the kernel (fresh or just reset)".to_string();
        }
        return format!("INSPECT no variables matching '{}'", pattern);
    }

    let mut lines = vec![format!("KERNEL variables ({})", result.count)];
    for var in &result.variables {
        lines.push(format!("├─ {} ({}, {})", var.name, var.type_name, var.size));
        lines.push(format!("│   └─ {}", var.preview));
    }
    lines.join("\n")
}

pub fn format_reset(result: &ResetResult) -> String {
    if result.success {
        format!("RESET {}", result.message)
    } else {
        format!("ERROR {}", result.message)
    }
}

/// Message for a command issued while no kernel is running.
pub fn not_running(action: Action) -> String {
    match action {
        Action::Status => "KERNEL not running\n(it starts on the next execute)".to_string(),
        Action::Inspect => "INSPECT kernel not running, no variables to show".to_string(),
        Action::Reset => "RESET kernel not running, nothing to reset".to_string(),
        Action::Execute => "ERROR kernel not running".to_string(),
    }
}

/// One-line rendering of a caller-side failure.
pub fn format_error(err: &KernelError) -> String {
    match err {
        KernelError::Timeout(deadline) => format!(
            "TIMEOUT no reply after {}s; the code may still be running (use `restart` to stop it)",
            deadline.as_secs_f64()
        ),
        KernelError::Unresponsive => "ERROR kernel unresponsive, try again later".to_string(),
        KernelError::Unreachable { addr } => {
            format!("ERROR kernel not started or connection refused ({})", addr)
        }
        KernelError::Busy => "ERROR kernel busy, try again later".to_string(),
        KernelError::StartFailed { message, exit_code } => match exit_code {
            Some(code) => format!("ERROR kernel failed to start (exit code {}): {}", code, message),
            None => format!("ERROR kernel failed to start: {}", message),
        },
        KernelError::Remote { message } => format!("ERROR {}", message),
        other => format!("FATAL kernel connection error: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::VariableInfo;
    use std::time::Duration;

    fn execute(success: bool, stdout: &str, stderr: &str, error: Option<&str>) -> ExecuteResult {
        ExecuteResult {
            success,
            stdout: stdout.into(),
            stderr: stderr.into(),
            error: error.map(Into::into),
        }
    }

    #[test]
    fn test_execute_sections() {
        let text = format_execute(&execute(true, "1\n", "warn\n", None));
        assert_eq!(text, "OK\n--- Output ---\n1\n\n--- Stderr ---\nwarn\n");

        assert_eq!(format_execute(&execute(true, "", "", None)), "OK (no output)");

        let text = format_execute(&execute(false, "a\n", "", Some("Traceback ...\nNameError\n")));
        assert!(text.starts_with("ERROR"));
        assert!(text.contains("--- Output ---\na\n"));
        assert!(text.ends_with("--- Error ---\nTraceback ...\nNameError\n"));
    }

    #[test]
    fn test_status_tree() {
        let text = format_status(&StatusResult {
            success: true,
            uptime_seconds: 932.0,
            uptime_human: "15m 32s".into(),
            variable_count: 8,
            memory_usage_bytes: None,
            memory_usage: "unavailable".into(),
        });
        assert_eq!(
            text,
            "KERNEL running\n├─ Uptime: 15m 32s\n├─ Variables: 8\n└─ Memory: unavailable"
        );
    }

    #[test]
    fn test_inspect_listing() {
        let result = InspectResult {
            success: true,
            count: 1,
            variables: vec![VariableInfo {
                name: "config".into(),
                type_name: "dict".into(),
                size_bytes: 1228,
                size: "1.2 KB".into(),
                preview: "{'a': 1}".into(),
            }],
        };
        let text = format_inspect(&result, "");
        assert_eq!(
            text,
            "KERNEL variables (1)\n├─ config (dict, 1.2 KB)\n│   └─ {'a': 1}"
        );

        let empty = InspectResult {
            success: true,
            count: 0,
            variables: Vec::new(),
        };
        assert!(format_inspect(&empty, "df").contains("'df'"));
        assert!(format_inspect(&empty, "").contains("no variables"));
    }

    #[test]
    fn test_errors() {
        let text = format_error(&KernelError::Timeout(Duration::from_secs(60)));
        assert!(text.starts_with("TIMEOUT no reply after 60s"));
        assert!(format_error(&KernelError::Busy).contains("busy"));
        let text = format_error(&KernelError::StartFailed {
            message: "process exited".into(),
            exit_code: Some(2),
        });
        assert!(text.contains("exit code 2"));
        assert!(not_running(Action::Status).contains("not running"));
    }
}
