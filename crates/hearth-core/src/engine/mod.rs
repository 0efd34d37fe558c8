//! The execution engine: a persistent namespace plus the four operations
//! the kernel serves against it.
//!
//! The engine is single-threaded by construction (values are `Rc`), which
//! matches the listener's strictly sequential connection handling.

mod capture;
mod introspect;
mod namespace;

pub use capture::{CaptureGuard, Captured, Streams};
pub use introspect::{describe, format_memory, format_size, format_uptime, matches_pattern, preview};
pub use namespace::{is_visible, Namespace};

use crate::config::EngineConfig;
use crate::interp::{release_cycles, ExcKind, Fault, Interpreter};
use crate::platform;
use crate::protocol::{ExecuteResult, InspectResult, ResetResult, StatusResult};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Owns the namespace and the output streams of one kernel process.
pub struct ExecutionEngine {
    namespace: Namespace,
    streams: Streams,
    started: Instant,
    max_depth: usize,
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionEngine {
    pub fn new() -> Self {
        Self {
            namespace: Namespace::new(),
            streams: Streams::new(),
            started: Instant::now(),
            max_depth: EngineConfig::MAX_CALL_DEPTH,
        }
    }

    /// Override the nested call limit.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Run `code` against the live namespace with output captured.
    ///
    /// Bindings made before a fault are kept.
    pub fn execute(&mut self, code: &str) -> ExecuteResult {
        debug!("Executing {} bytes of code", code.len());
        let max_depth = self.max_depth;
        let mut capture = CaptureGuard::new(&mut self.streams);

        let outcome = {
            let namespace = &mut self.namespace;
            let out: &mut Streams = &mut capture;
            catch_unwind(AssertUnwindSafe(|| {
                Interpreter::new(namespace, out)
                    .with_max_depth(max_depth)
                    .run(code)
            }))
        };
        let captured = capture.take();
        drop(capture);

        let fault = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(fault)) => Some(fault),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!("Interpreter panicked: {}", message);
                Some(Fault::new(ExcKind::InternalError, message))
            }
        };

        match fault {
            None => ExecuteResult {
                success: true,
                stdout: captured.stdout,
                stderr: captured.stderr,
                error: None,
            },
            Some(fault) => {
                debug!("Execution failed: {}", fault);
                ExecuteResult {
                    success: false,
                    stdout: captured.stdout,
                    stderr: captured.stderr,
                    error: Some(fault.render()),
                }
            }
        }
    }

    /// Describe visible namespace entries whose name contains `pattern`.
    pub fn inspect(&self, pattern: &str) -> InspectResult {
        let variables: Vec<_> = self
            .namespace
            .visible()
            .filter(|(name, _)| matches_pattern(name, pattern))
            .map(|(name, value)| describe(name, value))
            .collect();

        InspectResult {
            success: true,
            count: variables.len(),
            variables,
        }
    }

    /// Drop every binding. Uptime is unaffected.
    ///
    /// Containers that reference themselves are emptied first so their
    /// memory is actually returned.
    pub fn reset(&mut self) -> ResetResult {
        let old = std::mem::take(&mut self.namespace);
        let cleared = old.len();
        release_cycles(old.into_values());
        info!("Namespace reset ({} bindings cleared)", cleared);
        ResetResult {
            success: true,
            message: "Kernel reset: all variables cleared".to_string(),
        }
    }

    pub fn status(&self) -> StatusResult {
        let uptime = self.uptime();
        let memory = platform::current_process_memory();
        StatusResult {
            success: true,
            uptime_seconds: (uptime.as_secs_f64() * 10.0).round() / 10.0,
            uptime_human: format_uptime(uptime),
            variable_count: self.namespace.visible_count(),
            memory_usage_bytes: memory,
            memory_usage: format_memory(memory),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "interpreter panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::Value;
    use std::rc::Rc;

    #[test]
    fn test_scenario_persist_reset_and_undefined() {
        let mut engine = ExecutionEngine::new();

        let result = engine.execute("x = 1\nprint(x)");
        assert!(result.success);
        assert_eq!(result.stdout, "1\n");

        let result = engine.execute("print(x+1)");
        assert_eq!(result.stdout, "2\n");

        let reset = engine.reset();
        assert!(reset.message.contains("cleared"));
        assert_eq!(engine.inspect("").count, 0);

        let result = engine.execute("print(x)");
        assert!(!result.success);
        let trace = result.error.unwrap();
        assert!(trace.contains("NameError"));
        assert!(trace.contains("'x' is not defined"));
    }

    #[test]
    fn test_fresh_status() {
        let engine = ExecutionEngine::new();
        let first = engine.status();
        assert_eq!(first.variable_count, 0);
        assert!(first.uptime_seconds < 5.0);
        let second = engine.status();
        assert!(second.uptime_seconds >= first.uptime_seconds);
    }

    #[test]
    fn test_partial_effect_on_fault() {
        let mut engine = ExecutionEngine::new();
        let result = engine.execute("x = 1\nraise Exception()");
        assert!(!result.success);

        let result = engine.execute("print(x)");
        assert!(result.success);
        assert_eq!(result.stdout, "1\n");
    }

    #[test]
    fn test_output_before_fault_is_returned() {
        let mut engine = ExecutionEngine::new();
        let result = engine.execute("import sys\nprint('a')\nprint('b', file=sys.stderr)\n1/0");
        assert!(!result.success);
        assert_eq!(result.stdout, "a\n");
        assert_eq!(result.stderr, "b\n");
        assert!(result
            .error
            .unwrap()
            .ends_with("ZeroDivisionError: division by zero\n"));
    }

    #[test]
    fn test_streams_restored_after_execute() {
        let mut engine = ExecutionEngine::new();
        engine.execute("1/0");
        assert!(!engine.streams.is_capturing());
        engine.execute("pass");
        assert!(!engine.streams.is_capturing());
    }

    #[test]
    fn test_syntax_error_is_execution_fault() {
        let mut engine = ExecutionEngine::new();
        let result = engine.execute("x = = 1");
        assert!(!result.success);
        assert!(result.error.unwrap().contains("SyntaxError"));
    }

    #[test]
    fn test_inspect_hides_reserved_and_filters() {
        let mut engine = ExecutionEngine::new();
        engine.execute("_hidden = 1\nalpha = [1, 2]\nAlphabet = 'abc'\nbeta = 2.5");

        let all = engine.inspect("");
        assert_eq!(all.count, 3);
        let names: Vec<_> = all.variables.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "Alphabet", "beta"]);

        let filtered = engine.inspect("ALPHA");
        assert_eq!(filtered.count, 2);
        assert_eq!(filtered.variables[0].type_name, "list");
        assert_eq!(filtered.variables[0].preview, "[1, 2]");
    }

    #[test]
    fn test_status_and_inspect_are_read_only() {
        let mut engine = ExecutionEngine::new();
        engine.execute("a = 1\nb = 2");
        let before = engine.inspect("");
        engine.status();
        engine.inspect("a");
        assert_eq!(engine.inspect(""), before);
        assert_eq!(engine.status().variable_count, 2);
    }

    #[test]
    fn test_reset_keeps_uptime() {
        let mut engine = ExecutionEngine::new();
        std::thread::sleep(Duration::from_millis(20));
        let before = engine.uptime();
        engine.reset();
        assert!(engine.uptime() >= before);
    }

    #[test]
    fn test_reset_frees_self_referencing_containers() {
        let mut engine = ExecutionEngine::new();
        let result = engine.execute("a = []\na.append(a)\nd = {}\nd['self'] = d\nt = (a, d)");
        assert!(result.success);

        let weak_list = match engine.namespace().get("a") {
            Some(Value::List(items)) => Rc::downgrade(items),
            other => panic!("unexpected binding {:?}", other),
        };
        let weak_dict = match engine.namespace().get("d") {
            Some(Value::Dict(dict)) => Rc::downgrade(dict),
            other => panic!("unexpected binding {:?}", other),
        };

        engine.reset();
        assert!(weak_list.upgrade().is_none());
        assert!(weak_dict.upgrade().is_none());
        assert!(engine.execute("x = [1]\nprint(x)").success);
    }

    #[test]
    fn test_comparing_cyclic_containers_is_a_fault() {
        let mut engine = ExecutionEngine::new();
        let result = engine.execute("a = []\na.append(a)\nb = []\nb.append(b)\nprint(a == b)");
        assert!(!result.success);
        assert!(result.error.unwrap().contains("RecursionError"));

        let result = engine.execute("print(a < b)");
        assert!(result.error.unwrap().contains("RecursionError"));

        // Identity short-circuits, and the engine stays usable.
        let result = engine.execute("print(a == a, a in [a], [[1, [2]]] == [[1, [2]]])");
        assert_eq!(result.stdout, "True True True\n");
    }

    #[test]
    fn test_recursion_limit_reports_fault() {
        let mut engine = ExecutionEngine::new().with_max_depth(25);
        let result = engine.execute("def f():\n    return f()\nf()");
        assert!(!result.success);
        assert!(result.error.unwrap().contains("RecursionError"));
        // The engine stays usable.
        assert!(engine.execute("print('ok')").success);
    }
}
