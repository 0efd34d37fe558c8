//! Stop the kernel when a long-lived caller goes away.
//!
//! A [`ShutdownHook`] fires at most once: on Ctrl-C / SIGTERM once
//! [`ShutdownHook::install_signal_handler`] has run, or when the hook is
//! dropped.

use crate::error::{KernelError, Result};
use crate::supervisor::Supervisor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Exit status used after an interrupt, as shells report SIGINT.
const INTERRUPTED_EXIT_CODE: i32 = 130;

struct HookState {
    supervisor: Supervisor,
    fired: AtomicBool,
}

impl HookState {
    fn fire(&self, reason: &str) -> Result<bool> {
        if self.fired.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }
        info!("Shutting down kernel ({})", reason);
        self.supervisor.stop_blocking()
    }
}

/// Owns kernel shutdown for the lifetime of a caller.
pub struct ShutdownHook {
    state: Arc<HookState>,
}

impl ShutdownHook {
    pub fn new(supervisor: Supervisor) -> Self {
        Self {
            state: Arc::new(HookState {
                supervisor,
                fired: AtomicBool::new(false),
            }),
        }
    }

    /// Stop the kernel and exit on Ctrl-C or SIGTERM.
    ///
    /// Only one handler can be registered per process.
    pub fn install_signal_handler(&self) -> Result<()> {
        let state = Arc::clone(&self.state);
        ctrlc::set_handler(move || {
            if let Err(e) = state.fire("signal") {
                warn!("Kernel shutdown on signal failed: {}", e);
            }
            std::process::exit(INTERRUPTED_EXIT_CODE);
        })
        .map_err(|e| KernelError::Other(format!("failed to install signal handler: {}", e)))
    }

    /// Stop the kernel now. Later calls, and the drop, do nothing.
    pub fn fire(&self) -> Result<bool> {
        self.state.fire("requested")
    }

    pub fn is_fired(&self) -> bool {
        self.state.fired.load(Ordering::SeqCst)
    }

    /// Leave the kernel running when the hook is dropped.
    pub fn disarm(&self) {
        self.state.fired.store(true, Ordering::SeqCst);
    }
}

impl Drop for ShutdownHook {
    fn drop(&mut self) {
        if let Err(e) = self.state.fire("caller exiting") {
            warn!("Kernel shutdown on exit failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelSettings;
    use tempfile::TempDir;

    fn supervisor(dir: &TempDir) -> Supervisor {
        // Nothing listens on a freshly released port.
        let addr = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        let settings = KernelSettings::from_lookup(|_| None)
            .unwrap()
            .with_endpoint(addr)
            .with_state_dir(dir.path())
            .with_kernel_bin("hearth-kernel-missing");
        Supervisor::new(settings)
    }

    #[test]
    fn test_fire_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let hook = ShutdownHook::new(supervisor(&dir));
        assert!(!hook.is_fired());
        assert!(!hook.fire().unwrap());
        assert!(hook.is_fired());
        // Already fired: no second stop attempt.
        assert!(!hook.fire().unwrap());
    }

    #[test]
    fn test_disarm_marks_fired() {
        let dir = TempDir::new().unwrap();
        let hook = ShutdownHook::new(supervisor(&dir));
        hook.disarm();
        assert!(hook.is_fired());
        drop(hook);
    }

    #[test]
    fn test_drop_fires() {
        let dir = TempDir::new().unwrap();
        let hook = ShutdownHook::new(supervisor(&dir));
        let state = Arc::clone(&hook.state);
        drop(hook);
        assert!(state.fired.load(Ordering::SeqCst));
    }
}
