//! Spawning the kernel process.

use crate::config::{EnvVars, KernelSettings, SupervisorConfig};
use crate::error::{KernelError, Result};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tracing::{debug, info};

#[cfg(unix)]
use std::os::unix::process::CommandExt;

#[cfg(windows)]
use std::os::windows::process::CommandExt;

/// Everything needed to spawn one kernel.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    /// Kernel executable.
    pub kernel_bin: PathBuf,
    /// Endpoint the kernel is told to bind.
    pub endpoint: SocketAddr,
    /// Working directory of the child.
    pub working_dir: PathBuf,
    /// Receives the child's stdout and stderr.
    pub log_file: PathBuf,
    /// Extra arguments after the endpoint flags.
    pub extra_args: Vec<String>,
    /// Environment on top of [`SupervisorConfig::SPAWN_ENV`].
    pub env_vars: HashMap<String, String>,
}

impl LaunchConfig {
    pub fn from_settings(settings: &KernelSettings) -> Self {
        Self {
            kernel_bin: settings.kernel_bin.clone(),
            endpoint: settings.endpoint,
            working_dir: settings.workspace_dir(),
            log_file: settings.log_file(),
            extra_args: Vec::new(),
            env_vars: HashMap::new(),
        }
    }

    /// Add an extra argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    /// Add an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    /// Build the command without spawning it.
    pub fn command(&self) -> Result<Command> {
        fs::create_dir_all(&self.working_dir)
            .map_err(|e| KernelError::io_with_path(e, &self.working_dir))?;
        if let Some(parent) = self.log_file.parent() {
            fs::create_dir_all(parent).map_err(|e| KernelError::io_with_path(e, parent))?;
        }

        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file)
            .map_err(|e| KernelError::io_with_path(e, &self.log_file))?;
        let log_err = log
            .try_clone()
            .map_err(|e| KernelError::io_with_path(e, &self.log_file))?;

        let mut cmd = Command::new(&self.kernel_bin);
        cmd.arg("--host")
            .arg(self.endpoint.ip().to_string())
            .arg("--port")
            .arg(self.endpoint.port().to_string())
            .args(&self.extra_args)
            .current_dir(&self.working_dir)
            // Files, not pipes: nobody drains a pipe while the kernel runs.
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));

        for (key, value) in SupervisorConfig::SPAWN_ENV {
            cmd.env(key, value);
        }
        cmd.env(EnvVars::HOST, self.endpoint.ip().to_string());
        cmd.env(EnvVars::PORT, self.endpoint.port().to_string());
        for (key, value) in &self.env_vars {
            cmd.env(key, value);
        }

        // Own process group so a Ctrl-C in the caller's terminal does not hit
        // the kernel; shutdown goes through the supervisor instead.
        #[cfg(unix)]
        cmd.process_group(0);

        #[cfg(windows)]
        {
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x00000200;
            cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
        }

        Ok(cmd)
    }

    /// Spawn the kernel. Readiness is the caller's concern.
    pub fn spawn(&self) -> Result<Child> {
        let mut cmd = self.command()?;
        info!(
            "Launching kernel {} on {}",
            self.kernel_bin.display(),
            self.endpoint
        );
        let child = cmd.spawn().map_err(|e| KernelError::StartFailed {
            message: format!("failed to spawn {}: {}", self.kernel_bin.display(), e),
            exit_code: None,
        })?;
        debug!(
            "Kernel PID {}, logging to {}",
            child.id(),
            self.log_file.display()
        );
        Ok(child)
    }
}

/// Whether something accepts TCP connections on `addr` within `timeout`.
pub async fn probe(addr: SocketAddr, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, tokio::net::TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}

/// Blocking variant of [`probe`] for code running outside the runtime.
pub fn probe_blocking(addr: SocketAddr, timeout: Duration) -> bool {
    std::net::TcpStream::connect_timeout(&addr, timeout).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> LaunchConfig {
        let settings = KernelSettings::from_lookup(|_| None)
            .unwrap()
            .with_state_dir(dir.path())
            .with_kernel_bin("hearth-kernel-missing");
        LaunchConfig::from_settings(&settings)
    }

    #[test]
    fn test_command_prepares_directories() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        config.command().unwrap();
        assert!(config.working_dir.is_dir());
        assert!(config.log_file.exists());
    }

    #[test]
    fn test_command_carries_endpoint_and_env() {
        let dir = TempDir::new().unwrap();
        let cmd = config(&dir).with_env("EXTRA", "1").command().unwrap();

        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, vec!["--host", "127.0.0.1", "--port", "9999"]);

        let envs: HashMap<_, _> = cmd
            .get_envs()
            .filter_map(|(k, v)| Some((k.to_string_lossy().into_owned(), v?.to_string_lossy().into_owned())))
            .collect();
        assert_eq!(envs.get("OMP_NUM_THREADS").map(String::as_str), Some("1"));
        assert_eq!(envs.get("TQDM_DISABLE").map(String::as_str), Some("1"));
        assert_eq!(envs.get("EXTRA").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_spawn_missing_binary_is_start_failure() {
        let dir = TempDir::new().unwrap();
        let err = config(&dir).spawn().unwrap_err();
        assert!(matches!(err, KernelError::StartFailed { exit_code: None, .. }));
    }

    #[tokio::test]
    async fn test_probe() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert!(probe(addr, Duration::from_secs(1)).await);
        drop(listener);
        assert!(!probe(addr, Duration::from_secs(1)).await);
        assert!(!probe_blocking(addr, Duration::from_secs(1)));
    }
}
