//! Hearth Core - a persistent snippet kernel and the tools to drive it.
//!
//! A kernel process keeps one namespace alive across requests. Callers talk
//! to it over a one-shot-per-connection JSON protocol on a loopback TCP
//! endpoint, and a supervisor starts, adopts, stops and restarts it.
//!
//! # Example
//!
//! ```rust,ignore
//! use hearth_core::{KernelSettings, RpcCaller, Supervisor};
//!
//! #[tokio::main]
//! async fn main() -> hearth_core::Result<()> {
//!     let settings = KernelSettings::from_env()?;
//!     let caller = RpcCaller::new(Supervisor::new(settings));
//!
//!     caller.execute("x = 40 + 2").await?;
//!     let result = caller.execute("print(x)").await?;
//!     assert_eq!(result.stdout, "42\n");
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod interp;
pub mod lifecycle;
pub mod platform;
pub mod protocol;
pub mod server;
pub mod supervisor;

// Re-export commonly used types
pub use client::RpcCaller;
pub use config::KernelSettings;
pub use engine::ExecutionEngine;
pub use error::{KernelError, Result};
pub use lifecycle::ShutdownHook;
pub use protocol::{
    ExecuteResult, InspectResult, Request, ResetResult, Response, StatusResult, VariableInfo,
};
pub use server::{Dispatcher, KernelListener};
pub use supervisor::{KernelProcess, KernelStatus, StartOutcome, Supervisor};
