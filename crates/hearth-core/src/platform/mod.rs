//! Platform abstraction layer.
//!
//! All `#[cfg]` blocks for OS-specific behavior live here rather than
//! scattered through the supervisor.
//!
//! - `process` - liveness, termination, port owner lookup
//! - `memory` - resident memory reporting

pub mod memory;
pub mod process;

pub use memory::{current_process_memory, process_memory};
pub use process::{
    find_port_owners, is_process_alive, terminate_child, terminate_process, Termination,
};
