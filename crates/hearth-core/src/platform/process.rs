//! Platform-specific process management.
//!
//! Liveness checks, graceful-then-forced termination, and locating the
//! process that listens on a TCP port.

use crate::config::SupervisorConfig;
use crate::error::{KernelError, Result};
use std::process::Child;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Check if a process with the given PID is alive.
///
/// # Platform Behavior
/// - **Linux/macOS**: `kill(pid, 0)` via nix
/// - **Other**: sysinfo process table lookup
pub fn is_process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        // Out-of-range PIDs would wrap into process-group targets.
        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        if raw <= 0 {
            return false;
        }
        match kill(Pid::from_raw(raw), None) {
            Ok(()) => true,
            // Exists but owned by someone else.
            Err(nix::errno::Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    #[cfg(not(unix))]
    {
        use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

        let pid = Pid::from_u32(pid);
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::new(),
        );
        system.process(pid).is_some()
    }
}

/// How a termination request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Nothing was running under the PID.
    NotRunning,
    /// Exited within the grace period.
    Graceful,
    /// Exited after a forced kill.
    Killed,
    /// Still running after the forced kill.
    Survived,
}

impl Termination {
    /// Whether a running process was brought down by this request.
    pub fn stopped(self) -> bool {
        matches!(self, Termination::Graceful | Termination::Killed)
    }
}

/// Terminate a process we did not spawn, such as a kernel found on the port.
///
/// # Platform Behavior
/// - **Linux/macOS**: SIGTERM, wait up to `grace`, then SIGKILL
/// - **Windows**: `taskkill /PID {pid} /F /T`
pub fn terminate_process(pid: u32, grace: Duration) -> Result<Termination> {
    if !is_process_alive(pid) {
        debug!("Process {} is not running", pid);
        return Ok(Termination::NotRunning);
    }
    terminate_with(pid, grace, || !is_process_alive(pid))
}

/// Terminate a child we spawned. Exit is observed through the handle, which
/// also reaps it.
pub fn terminate_child(child: &mut Child, grace: Duration) -> Result<Termination> {
    if !child_running(child) {
        return Ok(Termination::NotRunning);
    }
    let pid = child.id();
    terminate_with(pid, grace, || !child_running(child))
}

fn child_running(child: &mut Child) -> bool {
    match child.try_wait() {
        Ok(None) => true,
        Ok(Some(status)) => {
            debug!("Process {} exited with {}", child.id(), status);
            false
        }
        Err(e) => {
            warn!("Failed to poll process {}: {}", child.id(), e);
            is_process_alive(child.id())
        }
    }
}

/// Poll `exited` until it holds or `limit` elapses.
fn wait_for_exit(limit: Duration, exited: &mut impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    loop {
        if exited() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(SupervisorConfig::STOP_POLL_INTERVAL);
    }
}

#[cfg(unix)]
fn terminate_with(
    pid: u32,
    grace: Duration,
    mut exited: impl FnMut() -> bool,
) -> Result<Termination> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid)
        .map_err(|_| KernelError::Other(format!("PID {} out of range", pid)))?;
    let target = Pid::from_raw(raw);

    match kill(target, Signal::SIGTERM) {
        Ok(()) => debug!("Sent SIGTERM to process {}", pid),
        Err(Errno::ESRCH) => return Ok(Termination::NotRunning),
        Err(e) => warn!("Failed to send SIGTERM to {}: {}", pid, e),
    }
    if wait_for_exit(grace, &mut exited) {
        return Ok(Termination::Graceful);
    }

    warn!("Process {} outlived {:?} grace period, sending SIGKILL", pid, grace);
    match kill(target, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => {
            return Err(KernelError::Other(format!(
                "Failed to kill process {}: {}",
                pid, e
            )))
        }
    }
    Ok(if wait_for_exit(SupervisorConfig::KILL_SETTLE_PERIOD, &mut exited) {
        Termination::Killed
    } else {
        Termination::Survived
    })
}

#[cfg(windows)]
fn terminate_with(
    pid: u32,
    _grace: Duration,
    mut exited: impl FnMut() -> bool,
) -> Result<Termination> {
    use std::process::Command;

    debug!("Terminating process {} with taskkill", pid);
    let output = Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/F", "/T"])
        .output()
        .map_err(|e| KernelError::Other(format!("Failed to run taskkill: {}", e)))?;
    if !output.status.success() {
        warn!(
            "taskkill failed for {}: {}",
            pid,
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(if wait_for_exit(SupervisorConfig::KILL_SETTLE_PERIOD, &mut exited) {
        Termination::Killed
    } else {
        Termination::Survived
    })
}

#[cfg(not(any(unix, windows)))]
fn terminate_with(
    _pid: u32,
    _grace: Duration,
    _exited: impl FnMut() -> bool,
) -> Result<Termination> {
    Err(KernelError::Other(
        "Process termination not implemented for this platform".into(),
    ))
}

/// PIDs of processes listening on TCP `port`.
///
/// Best-effort: returns an empty list if the lookup tool (`lsof` on Unix,
/// `netstat` on Windows) is missing or fails.
pub fn find_port_owners(port: u16) -> Vec<u32> {
    #[cfg(unix)]
    {
        find_port_owners_unix(port)
    }

    #[cfg(windows)]
    {
        find_port_owners_windows(port)
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = port;
        Vec::new()
    }
}

#[cfg(unix)]
fn find_port_owners_unix(port: u16) -> Vec<u32> {
    use std::process::Command;

    let output = match Command::new("lsof")
        .args(["-t", &format!("-iTCP:{}", port), "-sTCP:LISTEN"])
        .output()
    {
        Ok(o) => o,
        Err(e) => {
            debug!("Failed to run lsof: {}", e);
            return Vec::new();
        }
    };

    // lsof exits 1 when nothing matches.
    if !output.status.success() {
        return Vec::new();
    }

    parse_pid_lines(&String::from_utf8_lossy(&output.stdout))
}

#[cfg(windows)]
fn find_port_owners_windows(port: u16) -> Vec<u32> {
    use std::process::Command;

    let output = match Command::new("netstat").args(["-ano", "-p", "TCP"]).output() {
        Ok(o) => o,
        Err(e) => {
            debug!("Failed to run netstat: {}", e);
            return Vec::new();
        }
    };

    if !output.status.success() {
        return Vec::new();
    }

    parse_netstat(&String::from_utf8_lossy(&output.stdout), port)
}

#[cfg_attr(not(unix), allow(dead_code))]
fn parse_pid_lines(text: &str) -> Vec<u32> {
    let mut pids: Vec<u32> = text
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect();
    pids.sort_unstable();
    pids.dedup();
    pids
}

/// Parse `netstat -ano` rows: `TCP  127.0.0.1:9999  0.0.0.0:0  LISTENING  1234`.
#[cfg_attr(not(windows), allow(dead_code))]
fn parse_netstat(text: &str, port: u16) -> Vec<u32> {
    let suffix = format!(":{}", port);
    let mut pids: Vec<u32> = text
        .lines()
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 5 || !cols[3].eq_ignore_ascii_case("LISTENING") {
                return None;
            }
            if !cols[1].ends_with(&suffix) {
                return None;
            }
            cols[4].parse().ok()
        })
        .collect();
    pids.sort_unstable();
    pids.dedup();
    pids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_process_alive_self() {
        assert!(is_process_alive(std::process::id()));
    }

    #[test]
    fn test_is_process_alive_out_of_range() {
        assert!(!is_process_alive(u32::MAX));
        assert!(!is_process_alive(0));
    }

    #[test]
    fn test_terminate_nonexistent() {
        let result = terminate_process(u32::MAX, Duration::from_millis(100));
        assert!(matches!(result, Ok(Termination::NotRunning)));
    }

    #[cfg(unix)]
    #[test]
    fn test_terminate_child_is_graceful_and_reaped() {
        let mut child = std::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .unwrap();
        let outcome = terminate_child(&mut child, Duration::from_secs(2)).unwrap();
        assert_eq!(outcome, Termination::Graceful);
        // Already reaped through the handle.
        assert!(child.try_wait().unwrap().is_some());
        assert_eq!(
            terminate_child(&mut child, Duration::from_secs(2)).unwrap(),
            Termination::NotRunning
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_terminate_child_ignoring_sigterm_is_killed() {
        let mut child = std::process::Command::new("sh")
            .args(["-c", "trap '' TERM; exec sleep 30"])
            .spawn()
            .unwrap();
        // Give the shell time to install the trap.
        std::thread::sleep(Duration::from_millis(200));
        let outcome = terminate_child(&mut child, Duration::from_millis(300)).unwrap();
        assert_eq!(outcome, Termination::Killed);
        assert!(outcome.stopped());
    }

    #[cfg(unix)]
    #[test]
    fn test_terminate_process_by_pid() {
        let mut child = std::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .unwrap();
        let pid = child.id();
        // Reap concurrently so the PID does not linger as a zombie.
        let reaper = std::thread::spawn(move || child.wait());
        let outcome = terminate_process(pid, Duration::from_secs(2)).unwrap();
        assert!(outcome.stopped());
        assert!(reaper.join().unwrap().is_ok());
    }

    #[test]
    fn test_parse_pid_lines() {
        assert_eq!(parse_pid_lines("123\n456\n123\n\n"), vec![123, 456]);
        assert!(parse_pid_lines("").is_empty());
    }

    #[test]
    fn test_parse_netstat() {
        let text = "\
  Proto  Local Address          Foreign Address        State           PID
  TCP    127.0.0.1:9999         0.0.0.0:0              LISTENING       4242
  TCP    127.0.0.1:19999        0.0.0.0:0              LISTENING       7
  TCP    127.0.0.1:50000        127.0.0.1:9999         ESTABLISHED     99
";
        assert_eq!(parse_netstat(text, 9999), vec![4242]);
    }
}
