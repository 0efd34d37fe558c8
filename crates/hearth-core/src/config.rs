//! Centralized configuration for hearth.
//!
//! Fixed tuning constants are grouped in unit structs. Values that vary per
//! installation (endpoint, kernel binary, state directory) live in
//! [`KernelSettings`], loaded from the environment.

use crate::error::{KernelError, Result};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Wire protocol configuration.
pub struct ProtocolConfig;

impl ProtocolConfig {
    /// Terminates every request document.
    pub const SENTINEL: &'static [u8] = b"\n__END__\n";
    pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;
    pub const READ_CHUNK_SIZE: usize = 4096;
    /// How long the kernel waits for a complete request frame.
    pub const SERVER_READ_TIMEOUT: Duration = Duration::from_secs(30);
}

/// Execution engine configuration.
pub struct EngineConfig;

impl EngineConfig {
    /// Identifiers starting with this prefix are hidden from inspect/status.
    pub const RESERVED_PREFIX: &'static str = "_";
    pub const PREVIEW_MAX_CHARS: usize = 50;
    pub const PREVIEW_ELLIPSIS: &'static str = "...";
    pub const PREVIEW_PLACEHOLDER: &'static str = "<preview unavailable>";
    pub const MAX_CALL_DEPTH: usize = 200;
    /// Stack of the thread that runs the engine; sized for `MAX_CALL_DEPTH`.
    pub const THREAD_STACK_SIZE: usize = 64 * 1024 * 1024;
    pub const SOURCE_NAME: &'static str = "<kernel>";
}

/// Process supervisor configuration.
pub struct SupervisorConfig;

impl SupervisorConfig {
    /// Probe timeout while polling a freshly spawned kernel.
    pub const START_PROBE_TIMEOUT: Duration = Duration::from_secs(1);
    /// Probe timeout for liveness checks (generous to avoid false negatives under load).
    pub const LIVENESS_PROBE_TIMEOUT: Duration = Duration::from_secs(3);
    pub const START_POLL_INTERVAL: Duration = Duration::from_millis(200);
    pub const START_POLL_ATTEMPTS: u32 = 50;
    pub const STOP_GRACE_PERIOD: Duration = Duration::from_secs(3);
    pub const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);
    /// How long a forced kill may take before the process counts as survived.
    pub const KILL_SETTLE_PERIOD: Duration = Duration::from_secs(1);
    /// Lets the OS release the port before a restart rebinds it.
    pub const RESTART_DELAY: Duration = Duration::from_secs(2);
    pub const RESTART_ATTEMPTS: u32 = 3;
    pub const RESTART_RETRY_DELAY: Duration = Duration::from_secs(1);
    pub const LOG_FILE_NAME: &'static str = "kernel.log";
    pub const WORKSPACE_DIR_NAME: &'static str = "workspace";

    /// Environment applied to every spawned kernel.
    pub const SPAWN_ENV: &'static [(&'static str, &'static str)] = &[
        ("PYTHONIOENCODING", "utf-8"),
        ("HEARTH_IO_ENCODING", "utf-8"),
        ("GIT_TERMINAL_PROMPT", "0"),
        ("GIT_LFS_SKIP_SMUDGE", "1"),
        ("OPENBLAS_NUM_THREADS", "1"),
        ("OMP_NUM_THREADS", "1"),
        ("MKL_NUM_THREADS", "1"),
        ("NUMEXPR_NUM_THREADS", "1"),
        ("VECLIB_MAXIMUM_THREADS", "1"),
        ("TQDM_DISABLE", "1"),
        ("HEARTH_NETWORK_TIMEOUT", "30"),
    ];
}

/// RPC caller configuration.
pub struct RpcConfig;

impl RpcConfig {
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
    pub const EXECUTE_DEADLINE: Duration = Duration::from_secs(60);
    pub const EXECUTE_READ_TIMEOUT: Duration = Duration::from_secs(30);
    pub const COMMAND_READ_TIMEOUT: Duration = Duration::from_secs(5);
    pub const RESET_READ_TIMEOUT: Duration = Duration::from_secs(300);
    pub const ENSURE_START_ATTEMPTS: u32 = 3;
    pub const ENSURE_START_DELAY: Duration = Duration::from_secs(1);
    /// Fixed delay before the single retry after an empty response.
    pub const EMPTY_RESPONSE_RETRY_DELAY: Duration = Duration::from_secs(3);
    pub const COMMAND_ATTEMPTS: u32 = 3;
    pub const REFUSED_RETRY_DELAY: Duration = Duration::from_secs(1);
    pub const BUSY_RETRY_DELAY: Duration = Duration::from_secs(2);
}

/// Environment variable names.
pub struct EnvVars;

impl EnvVars {
    pub const HOST: &'static str = "HEARTH_HOST";
    pub const PORT: &'static str = "HEARTH_PORT";
    pub const KERNEL_BIN: &'static str = "HEARTH_KERNEL_BIN";
    pub const STATE_DIR: &'static str = "HEARTH_STATE_DIR";
}

pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
pub const DEFAULT_PORT: u16 = 9999;
pub const KERNEL_BIN_NAME: &str = "hearth-kernel";

/// Per-installation settings shared by the kernel and its callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelSettings {
    /// The one endpoint a kernel may bind.
    pub endpoint: SocketAddr,
    /// Executable started by the supervisor.
    pub kernel_bin: PathBuf,
    /// Holds the kernel log and working directory.
    pub state_dir: PathBuf,
}

impl KernelSettings {
    /// Load settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings using an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = match lookup(EnvVars::HOST) {
            Some(raw) => raw.trim().parse::<IpAddr>().map_err(|e| KernelError::Config {
                message: format!("{} '{}' is not an IP address: {}", EnvVars::HOST, raw, e),
            })?,
            None => DEFAULT_HOST,
        };

        let port = match lookup(EnvVars::PORT) {
            Some(raw) => raw.trim().parse::<u16>().map_err(|e| KernelError::Config {
                message: format!("{} '{}' is not a port: {}", EnvVars::PORT, raw, e),
            })?,
            None => DEFAULT_PORT,
        };

        let kernel_bin = lookup(EnvVars::KERNEL_BIN)
            .map(PathBuf::from)
            .unwrap_or_else(default_kernel_bin);

        let state_dir = lookup(EnvVars::STATE_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(default_state_dir);

        Ok(Self {
            endpoint: SocketAddr::new(host, port),
            kernel_bin,
            state_dir,
        })
    }

    /// Replace the endpoint, keeping everything else.
    pub fn with_endpoint(mut self, endpoint: SocketAddr) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Replace the kernel executable.
    pub fn with_kernel_bin(mut self, path: impl Into<PathBuf>) -> Self {
        self.kernel_bin = path.into();
        self
    }

    /// Replace the state directory.
    pub fn with_state_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_dir = path.into();
        self
    }

    /// Path of the kernel's combined stdout/stderr log.
    pub fn log_file(&self) -> PathBuf {
        self.state_dir.join(SupervisorConfig::LOG_FILE_NAME)
    }

    /// Working directory of the spawned kernel.
    pub fn workspace_dir(&self) -> PathBuf {
        self.state_dir.join(SupervisorConfig::WORKSPACE_DIR_NAME)
    }
}

/// `hearth-kernel` sitting next to the running executable.
fn default_kernel_bin() -> PathBuf {
    let mut name = PathBuf::from(KERNEL_BIN_NAME);
    if cfg!(windows) {
        name.set_extension("exe");
    }
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(&name)))
        .unwrap_or(name)
}

fn default_state_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("hearth")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let settings = KernelSettings::from_lookup(|_| None).unwrap();
        assert_eq!(settings.endpoint, SocketAddr::new(DEFAULT_HOST, DEFAULT_PORT));
        assert!(settings.state_dir.ends_with("hearth"));
        assert!(settings
            .kernel_bin
            .to_string_lossy()
            .contains(KERNEL_BIN_NAME));
    }

    #[test]
    fn test_env_overrides() {
        let settings = KernelSettings::from_lookup(lookup_from(&[
            (EnvVars::HOST, "127.0.0.2"),
            (EnvVars::PORT, "4567"),
            (EnvVars::KERNEL_BIN, "/opt/hearth/kernel"),
            (EnvVars::STATE_DIR, "/var/lib/hearth"),
        ]))
        .unwrap();

        assert_eq!(settings.endpoint, "127.0.0.2:4567".parse().unwrap());
        assert_eq!(settings.kernel_bin, PathBuf::from("/opt/hearth/kernel"));
        assert_eq!(settings.log_file(), PathBuf::from("/var/lib/hearth/kernel.log"));
        assert_eq!(settings.workspace_dir(), PathBuf::from("/var/lib/hearth/workspace"));
    }

    #[test]
    fn test_invalid_port_is_config_error() {
        let result = KernelSettings::from_lookup(lookup_from(&[(EnvVars::PORT, "not-a-port")]));
        assert!(matches!(result, Err(KernelError::Config { .. })));
    }

    #[test]
    fn test_sentinel_is_not_valid_json_content() {
        // serde_json escapes raw newlines inside strings, so the sentinel can
        // only appear between documents.
        let doc = serde_json::to_vec(&serde_json::json!({"code": "a\n__END__\nb"})).unwrap();
        assert!(!doc
            .windows(ProtocolConfig::SENTINEL.len())
            .any(|w| w == ProtocolConfig::SENTINEL));
    }
}
