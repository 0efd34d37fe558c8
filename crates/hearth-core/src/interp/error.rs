//! Runtime exceptions and traceback rendering.

use crate::config::EngineConfig;
use std::fmt;
use std::rc::Rc;

/// Built-in exception classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExcKind {
    Exception,
    ArithmeticError,
    ZeroDivisionError,
    OverflowError,
    LookupError,
    KeyError,
    IndexError,
    NameError,
    TypeError,
    ValueError,
    AttributeError,
    RuntimeError,
    RecursionError,
    NotImplementedError,
    AssertionError,
    ImportError,
    ModuleNotFoundError,
    StopIteration,
    SyntaxError,
    /// A fault in the interpreter itself, surfaced like any other exception.
    InternalError,
}

impl ExcKind {
    pub const ALL: &'static [ExcKind] = &[
        ExcKind::Exception,
        ExcKind::ArithmeticError,
        ExcKind::ZeroDivisionError,
        ExcKind::OverflowError,
        ExcKind::LookupError,
        ExcKind::KeyError,
        ExcKind::IndexError,
        ExcKind::NameError,
        ExcKind::TypeError,
        ExcKind::ValueError,
        ExcKind::AttributeError,
        ExcKind::RuntimeError,
        ExcKind::RecursionError,
        ExcKind::NotImplementedError,
        ExcKind::AssertionError,
        ExcKind::ImportError,
        ExcKind::ModuleNotFoundError,
        ExcKind::StopIteration,
        ExcKind::SyntaxError,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ExcKind::Exception => "Exception",
            ExcKind::ArithmeticError => "ArithmeticError",
            ExcKind::ZeroDivisionError => "ZeroDivisionError",
            ExcKind::OverflowError => "OverflowError",
            ExcKind::LookupError => "LookupError",
            ExcKind::KeyError => "KeyError",
            ExcKind::IndexError => "IndexError",
            ExcKind::NameError => "NameError",
            ExcKind::TypeError => "TypeError",
            ExcKind::ValueError => "ValueError",
            ExcKind::AttributeError => "AttributeError",
            ExcKind::RuntimeError => "RuntimeError",
            ExcKind::RecursionError => "RecursionError",
            ExcKind::NotImplementedError => "NotImplementedError",
            ExcKind::AssertionError => "AssertionError",
            ExcKind::ImportError => "ImportError",
            ExcKind::ModuleNotFoundError => "ModuleNotFoundError",
            ExcKind::StopIteration => "StopIteration",
            ExcKind::SyntaxError => "SyntaxError",
            ExcKind::InternalError => "InternalError",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.name() == name)
    }

    pub fn parent(&self) -> Option<ExcKind> {
        match self {
            ExcKind::Exception => None,
            ExcKind::ZeroDivisionError | ExcKind::OverflowError => Some(ExcKind::ArithmeticError),
            ExcKind::KeyError | ExcKind::IndexError => Some(ExcKind::LookupError),
            ExcKind::RecursionError | ExcKind::NotImplementedError => Some(ExcKind::RuntimeError),
            ExcKind::ModuleNotFoundError => Some(ExcKind::ImportError),
            _ => Some(ExcKind::Exception),
        }
    }

    /// True if `self` is `other` or derives from it.
    pub fn is_subclass_of(&self, other: ExcKind) -> bool {
        let mut current = Some(*self);
        while let Some(kind) = current {
            if kind == other {
                return true;
            }
            current = kind.parent();
        }
        false
    }
}

impl fmt::Display for ExcKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An exception instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionObj {
    pub kind: ExcKind,
    pub message: String,
}

impl ExceptionObj {
    pub fn new(kind: ExcKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct TraceFrame {
    depth: usize,
    line: usize,
    scope: Rc<str>,
}

/// A raised exception travelling up the call stack.
#[derive(Debug, Clone)]
pub struct Fault {
    exc: Rc<ExceptionObj>,
    /// Innermost frame first.
    trace: Vec<TraceFrame>,
    /// Set for errors detected before execution started.
    syntax_line: Option<usize>,
}

impl Fault {
    pub fn new(kind: ExcKind, message: impl Into<String>) -> Self {
        Self::from_exception(Rc::new(ExceptionObj::new(kind, message)))
    }

    pub fn from_exception(exc: Rc<ExceptionObj>) -> Self {
        Self {
            exc,
            trace: Vec::new(),
            syntax_line: None,
        }
    }

    pub fn syntax(message: impl Into<String>, line: usize) -> Self {
        Self {
            syntax_line: Some(line),
            ..Self::new(ExcKind::SyntaxError, message)
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ExcKind::TypeError, message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::new(ExcKind::ValueError, message)
    }

    pub fn kind(&self) -> ExcKind {
        self.exc.kind
    }

    pub fn kind_name(&self) -> &'static str {
        self.exc.kind.name()
    }

    pub fn message(&self) -> &str {
        &self.exc.message
    }

    pub fn exception(&self) -> Rc<ExceptionObj> {
        Rc::clone(&self.exc)
    }

    /// Note the statement that was running in the frame at `depth`.
    ///
    /// Only the first (innermost) statement per frame is kept, so enclosing
    /// compound statements in the same frame do not add entries.
    pub fn record_frame(&mut self, depth: usize, line: usize, scope: &Rc<str>) {
        if self.syntax_line.is_some() || self.trace.last().is_some_and(|f| f.depth == depth) {
            return;
        }
        self.trace.push(TraceFrame {
            depth,
            line,
            scope: Rc::clone(scope),
        });
    }

    /// Line of the innermost recorded frame.
    pub fn line(&self) -> Option<usize> {
        self.syntax_line.or_else(|| self.trace.first().map(|f| f.line))
    }

    /// `Kind: message`, or just `Kind` for an empty message.
    pub fn summary(&self) -> String {
        if self.exc.message.is_empty() {
            self.kind_name().to_string()
        } else {
            format!("{}: {}", self.kind_name(), self.exc.message)
        }
    }

    /// Full traceback text, outermost frame first.
    pub fn render(&self) -> String {
        let source = EngineConfig::SOURCE_NAME;
        let mut out = String::from("Traceback (most recent call last):\n");
        if let Some(line) = self.syntax_line {
            out.push_str(&format!("  File \"{}\", line {}\n", source, line));
        }
        for frame in self.trace.iter().rev() {
            out.push_str(&format!(
                "  File \"{}\", line {}, in {}\n",
                source, frame.line, frame.scope
            ));
        }
        out.push_str(&self.summary());
        out.push('\n');
        out
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hierarchy() {
        assert!(ExcKind::ZeroDivisionError.is_subclass_of(ExcKind::ArithmeticError));
        assert!(ExcKind::KeyError.is_subclass_of(ExcKind::Exception));
        assert!(!ExcKind::KeyError.is_subclass_of(ExcKind::IndexError));
        assert!(ExcKind::ValueError.is_subclass_of(ExcKind::ValueError));
    }

    #[test]
    fn test_from_name_roundtrip() {
        for kind in ExcKind::ALL {
            assert_eq!(ExcKind::from_name(kind.name()), Some(*kind));
        }
        assert_eq!(ExcKind::from_name("InternalError"), None);
    }

    #[test]
    fn test_render_orders_frames_outermost_first() {
        let module: Rc<str> = Rc::from("<module>");
        let func: Rc<str> = Rc::from("f");

        let mut fault = Fault::new(ExcKind::ZeroDivisionError, "division by zero");
        fault.record_frame(1, 2, &func);
        fault.record_frame(1, 1, &func);
        fault.record_frame(0, 4, &module);

        let text = fault.render();
        assert_eq!(
            text,
            "Traceback (most recent call last):\n  \
             File \"<kernel>\", line 4, in <module>\n  \
             File \"<kernel>\", line 2, in f\n\
             ZeroDivisionError: division by zero\n"
        );
        assert_eq!(fault.line(), Some(2));
    }

    #[test]
    fn test_syntax_error_render() {
        let fault = Fault::syntax("invalid syntax", 3);
        let text = fault.render();
        assert!(text.contains("line 3\n"));
        assert!(text.ends_with("SyntaxError: invalid syntax\n"));
    }

    #[test]
    fn test_summary_without_message() {
        assert_eq!(Fault::new(ExcKind::StopIteration, "").summary(), "StopIteration");
    }
}
