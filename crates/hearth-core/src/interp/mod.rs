//! Interpreter for the snippet language run by the kernel.
//!
//! A small Python-flavoured language: indentation blocks, functions,
//! exceptions, lists, dicts and f-strings. Source goes through
//! [`lexer`] → [`parser`] → [`eval`]; values live in [`value`].
//!
//! The interpreter never touches process stdio. Everything it prints goes
//! through an [`Output`] supplied by the caller.

mod ast;
mod builtins;
mod error;
mod eval;
mod format;
mod lexer;
mod ops;
mod parser;
mod value;

pub use error::{ExcKind, ExceptionObj, Fault};
pub use eval::Interpreter;
pub use value::{release_cycles, StreamKind, Value};

/// Destination for `print` and stream writes.
pub trait Output {
    fn write(&mut self, stream: StreamKind, text: &str);
}
