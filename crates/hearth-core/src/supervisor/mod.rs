//! Client-side supervision of the kernel process.
//!
//! "Running" means the endpoint accepts connections, not that this
//! supervisor spawned something: a kernel started by another caller is
//! adopted instead of duplicated.

pub mod launcher;

pub use launcher::{probe, probe_blocking, LaunchConfig};

use crate::config::{KernelSettings, SupervisorConfig};
use crate::error::{KernelError, Result};
use crate::platform::{self, Termination};
use std::net::SocketAddr;
use std::process::Child;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Derived kernel state. Never stored; recomputed by probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelStatus {
    Stopped,
    Starting,
    Running,
    /// Our child is alive but the endpoint does not answer.
    Unresponsive,
}

impl KernelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KernelStatus::Stopped => "stopped",
            KernelStatus::Starting => "starting",
            KernelStatus::Running => "running",
            KernelStatus::Unresponsive => "unresponsive",
        }
    }
}

impl std::fmt::Display for KernelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the supervised kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelProcess {
    /// Set only for a kernel this supervisor spawned.
    pub pid: Option<u32>,
    pub endpoint: SocketAddr,
    pub status: KernelStatus,
}

/// How a successful `start` came about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The endpoint was already served by some kernel.
    Adopted,
    Spawned { pid: u32 },
}

/// Starts, probes, stops and restarts the kernel.
///
/// Cheap to clone; clones share the owned child handle.
#[derive(Clone)]
pub struct Supervisor {
    settings: KernelSettings,
    launch: LaunchConfig,
    child: Arc<Mutex<Option<Child>>>,
    starting: Arc<AtomicBool>,
    poll_attempts: u32,
    poll_interval: Duration,
}

impl Supervisor {
    pub fn new(settings: KernelSettings) -> Self {
        let launch = LaunchConfig::from_settings(&settings);
        Self {
            settings,
            launch,
            child: Arc::new(Mutex::new(None)),
            starting: Arc::new(AtomicBool::new(false)),
            poll_attempts: SupervisorConfig::START_POLL_ATTEMPTS,
            poll_interval: SupervisorConfig::START_POLL_INTERVAL,
        }
    }

    /// Replace the launch configuration.
    pub fn with_launch(mut self, launch: LaunchConfig) -> Self {
        self.launch = launch;
        self
    }

    /// Override the readiness polling budget.
    pub fn with_start_polling(mut self, attempts: u32, interval: Duration) -> Self {
        self.poll_attempts = attempts.max(1);
        self.poll_interval = interval;
        self
    }

    pub fn endpoint(&self) -> SocketAddr {
        self.settings.endpoint
    }

    pub fn settings(&self) -> &KernelSettings {
        &self.settings
    }

    /// PID of the kernel this supervisor spawned, if it is still tracked.
    pub fn pid(&self) -> Option<u32> {
        self.lock_child().as_ref().map(Child::id)
    }

    fn lock_child(&self) -> MutexGuard<'_, Option<Child>> {
        // A panic while holding the lock leaves the handle itself intact.
        self.child.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether the owned child is still running. Forgets it once it exited.
    fn owned_child_alive(&self) -> bool {
        let mut guard = self.lock_child();
        let Some(child) = guard.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                debug!("Kernel PID {} exited with {}", child.id(), status);
                *guard = None;
                false
            }
            Err(e) => {
                warn!("Failed to poll kernel PID {}: {}", child.id(), e);
                platform::is_process_alive(child.id())
            }
        }
    }

    /// Reachable, or our child is alive and may still be starting.
    pub async fn is_running(&self) -> bool {
        if probe(self.endpoint(), SupervisorConfig::LIVENESS_PROBE_TIMEOUT).await {
            return true;
        }
        self.owned_child_alive()
    }

    pub async fn status(&self) -> KernelProcess {
        let status = if probe(self.endpoint(), SupervisorConfig::LIVENESS_PROBE_TIMEOUT).await {
            KernelStatus::Running
        } else if self.starting.load(Ordering::SeqCst) {
            KernelStatus::Starting
        } else if self.owned_child_alive() {
            KernelStatus::Unresponsive
        } else {
            KernelStatus::Stopped
        };
        KernelProcess {
            pid: self.pid(),
            endpoint: self.endpoint(),
            status,
        }
    }

    /// Make the endpoint reachable: adopt a running kernel or spawn one and
    /// poll until it listens.
    pub async fn start(&self) -> Result<StartOutcome> {
        let endpoint = self.endpoint();
        if probe(endpoint, SupervisorConfig::START_PROBE_TIMEOUT).await {
            info!("Kernel already listening on {}, adopting it", endpoint);
            return Ok(StartOutcome::Adopted);
        }

        self.starting.store(true, Ordering::SeqCst);
        let result = self.spawn_and_wait().await;
        self.starting.store(false, Ordering::SeqCst);
        result
    }

    async fn spawn_and_wait(&self) -> Result<StartOutcome> {
        // A child that is alive but not listening is stale.
        if self.owned_child_alive() {
            warn!("Owned kernel is alive but unreachable, terminating it first");
            self.terminate_owned().await?;
        }

        let child = self.launch.spawn()?;
        let pid = child.id();
        *self.lock_child() = Some(child);

        for attempt in 1..=self.poll_attempts {
            if probe(self.endpoint(), SupervisorConfig::START_PROBE_TIMEOUT).await {
                info!("Kernel PID {} ready after {} probe(s)", pid, attempt);
                return Ok(StartOutcome::Spawned { pid });
            }

            if let Some(status) = self.exited_child_status() {
                return Err(KernelError::StartFailed {
                    message: format!(
                        "kernel exited with {} before listening on {} (see {})",
                        status,
                        self.endpoint(),
                        self.launch.log_file.display()
                    ),
                    exit_code: status.code(),
                });
            }

            tokio::time::sleep(self.poll_interval).await;
        }

        warn!("Kernel PID {} never became reachable, terminating it", pid);
        self.terminate_owned().await?;
        Err(KernelError::StartFailed {
            message: format!(
                "kernel did not listen on {} after {} attempts (see {})",
                self.endpoint(),
                self.poll_attempts,
                self.launch.log_file.display()
            ),
            exit_code: None,
        })
    }

    /// Exit status of the owned child if it has exited; forgets the handle.
    fn exited_child_status(&self) -> Option<std::process::ExitStatus> {
        let mut guard = self.lock_child();
        let status = guard.as_mut()?.try_wait().ok()??;
        *guard = None;
        Some(status)
    }

    async fn terminate_owned(&self) -> Result<()> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.terminate_owned_blocking())
            .await
            .map_err(|e| KernelError::Other(format!("terminate task failed: {}", e)))?
            .map(|_| ())
    }

    fn terminate_owned_blocking(&self) -> Result<bool> {
        let Some(mut child) = self.lock_child().take() else {
            return Ok(false);
        };
        let pid = child.id();
        info!("Stopping kernel PID {}", pid);
        match platform::terminate_child(&mut child, SupervisorConfig::STOP_GRACE_PERIOD)? {
            Termination::Survived => {
                warn!("Kernel PID {} survived termination", pid);
                Ok(false)
            }
            outcome => {
                debug!("Kernel PID {} termination: {:?}", pid, outcome);
                Ok(outcome.stopped())
            }
        }
    }

    /// Stop the kernel without a runtime. Used from signal handlers and
    /// `Drop`.
    ///
    /// Terminates the owned child first; if the endpoint still answers
    /// (adopted or foreign kernel), terminates whatever listens on the port.
    /// Returns whether anything was stopped.
    pub fn stop_blocking(&self) -> Result<bool> {
        let mut stopped = self.terminate_owned_blocking()?;

        if probe_blocking(self.endpoint(), SupervisorConfig::START_PROBE_TIMEOUT) {
            let own_pid = std::process::id();
            for pid in platform::find_port_owners(self.endpoint().port()) {
                if pid == own_pid {
                    continue;
                }
                info!("Stopping process {} listening on {}", pid, self.endpoint());
                match platform::terminate_process(pid, SupervisorConfig::STOP_GRACE_PERIOD) {
                    Ok(outcome) if outcome.stopped() => stopped = true,
                    Ok(Termination::Survived) => warn!("Process {} survived termination", pid),
                    Ok(_) => {}
                    Err(e) => warn!("Failed to stop process {}: {}", pid, e),
                }
            }
        }

        if stopped {
            info!("Kernel stopped");
        } else {
            debug!("No kernel to stop on {}", self.endpoint());
        }
        Ok(stopped)
    }

    pub async fn stop(&self) -> Result<bool> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.stop_blocking())
            .await
            .map_err(|e| KernelError::Other(format!("stop task failed: {}", e)))?
    }

    /// Stop, wait for the port to be released, then start with retries.
    /// Discards the namespace together with the process.
    pub async fn restart(&self) -> Result<StartOutcome> {
        self.stop().await?;
        tokio::time::sleep(SupervisorConfig::RESTART_DELAY).await;
        self.start_with_retries(
            SupervisorConfig::RESTART_ATTEMPTS,
            SupervisorConfig::RESTART_RETRY_DELAY,
        )
        .await
    }

    /// Up to `attempts` starts with `delay` between failures.
    pub async fn start_with_retries(&self, attempts: u32, delay: Duration) -> Result<StartOutcome> {
        let attempts = attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.start().await {
                Ok(outcome) => return Ok(outcome),
                Err(e) => {
                    warn!("Kernel start attempt {}/{} failed: {}", attempt, attempts, e);
                    last_error = Some(e);
                }
            }
            if attempt < attempts {
                tokio::time::sleep(delay).await;
            }
        }
        Err(last_error.unwrap_or_else(|| KernelError::Other("kernel start not attempted".into())))
    }

    /// No-op when running; otherwise start with retries.
    pub async fn ensure_running(&self, attempts: u32, delay: Duration) -> Result<()> {
        if self.is_running().await {
            return Ok(());
        }
        self.start_with_retries(attempts, delay).await.map(|_| ())
    }
}
