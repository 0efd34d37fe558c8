//! Hearth CLI - run code in the persistent kernel and manage its process.

mod session;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hearth_core::client::format;
use hearth_core::protocol::Action;
use hearth_core::{KernelError, KernelSettings, RpcCaller, StartOutcome, Supervisor};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "hearth")]
#[command(about = "Run code in a persistent hearth kernel")]
struct Args {
    /// Kernel host (overrides HEARTH_HOST)
    #[arg(long, global = true)]
    host: Option<IpAddr>,

    /// Kernel port (overrides HEARTH_PORT)
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Kernel executable (overrides HEARTH_KERNEL_BIN)
    #[arg(long, global = true)]
    kernel_bin: Option<PathBuf>,

    /// Directory for the kernel log and workspace (overrides HEARTH_STATE_DIR)
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute code in the kernel, starting it if needed
    Exec {
        /// Code to run; read from stdin when omitted
        code: Option<String>,

        /// Read the code from a file instead
        #[arg(short, long, conflicts_with = "code")]
        file: Option<PathBuf>,

        /// Seconds to wait for a reply
        #[arg(short, long, default_value_t = 60)]
        timeout: u64,
    },
    /// List kernel variables whose name contains PATTERN
    Inspect {
        #[arg(default_value = "")]
        pattern: String,
    },
    /// Clear every kernel variable without restarting the process
    Reset,
    /// Show kernel uptime, variable count and memory
    Status,
    /// Start the kernel, or adopt one already running
    Start,
    /// Stop the kernel
    Stop,
    /// Stop the kernel and start a fresh one
    Restart,
    /// Interactive session that owns the kernel until it exits
    Session {
        /// Seconds to wait for each reply
        #[arg(short, long, default_value_t = 60)]
        timeout: u64,
    },
}

impl Args {
    fn settings(&self) -> Result<KernelSettings> {
        let mut settings = KernelSettings::from_env()?;
        if self.host.is_some() || self.port.is_some() {
            let host = self.host.unwrap_or(settings.endpoint.ip());
            let port = self.port.unwrap_or(settings.endpoint.port());
            settings = settings.with_endpoint(SocketAddr::new(host, port));
        }
        if let Some(bin) = &self.kernel_bin {
            settings = settings.with_kernel_bin(bin);
        }
        if let Some(dir) = &self.state_dir {
            settings = settings.with_state_dir(dir);
        }
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let supervisor = Supervisor::new(args.settings()?);

    match args.command {
        Command::Exec {
            code,
            file,
            timeout,
        } => {
            let code = read_code(code, file).await?;
            let caller = RpcCaller::new(supervisor).with_execute_deadline(Duration::from_secs(timeout));
            match caller.execute(&code).await {
                Ok(result) => {
                    println!("{}", format::format_execute(&result));
                    Ok(exit_code(result.success))
                }
                Err(e) => report(&e),
            }
        }
        Command::Inspect { pattern } => {
            let caller = RpcCaller::new(supervisor).with_auto_start(false);
            match caller.inspect(&pattern).await {
                Ok(result) => {
                    println!("{}", format::format_inspect(&result, &pattern));
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => report_command(Action::Inspect, &e),
            }
        }
        Command::Reset => {
            let caller = RpcCaller::new(supervisor).with_auto_start(false);
            match caller.reset().await {
                Ok(result) => {
                    println!("{}", format::format_reset(&result));
                    Ok(exit_code(result.success))
                }
                Err(e) => report_command(Action::Reset, &e),
            }
        }
        Command::Status => {
            let caller = RpcCaller::new(supervisor).with_auto_start(false);
            match caller.status().await {
                Ok(result) => {
                    println!("{}", format::format_status(&result));
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => report_command(Action::Status, &e),
            }
        }
        Command::Start => match supervisor.start().await {
            Ok(StartOutcome::Adopted) => {
                println!("Kernel already running on {}", supervisor.endpoint());
                Ok(ExitCode::SUCCESS)
            }
            Ok(StartOutcome::Spawned { pid }) => {
                println!("Kernel started on {} (PID {})", supervisor.endpoint(), pid);
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => report(&e),
        },
        Command::Stop => {
            if supervisor.stop().await? {
                println!("Kernel stopped");
            } else {
                println!("No kernel running on {}", supervisor.endpoint());
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Restart => match supervisor.restart().await {
            Ok(_) => {
                println!("Kernel restarted on {}, all variables cleared", supervisor.endpoint());
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => report(&e),
        },
        Command::Session { timeout } => {
            session::run(supervisor, Duration::from_secs(timeout)).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn read_code(code: Option<String>, file: Option<PathBuf>) -> Result<String> {
    if let Some(code) = code {
        return Ok(code);
    }
    if let Some(path) = file {
        return tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()));
    }
    let mut code = String::new();
    tokio::io::stdin()
        .read_to_string(&mut code)
        .await
        .context("failed to read code from stdin")?;
    Ok(code)
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn report(err: &KernelError) -> Result<ExitCode> {
    println!("{}", format::format_error(err));
    Ok(ExitCode::FAILURE)
}

/// Commands against a stopped kernel are not failures.
fn report_command(action: Action, err: &KernelError) -> Result<ExitCode> {
    if matches!(err, KernelError::Unreachable { .. }) {
        println!("{}", format::not_running(action));
        return Ok(ExitCode::SUCCESS);
    }
    report(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_args() {
        let args = Args::try_parse_from(["hearth", "exec", "print(1)", "--timeout", "5"]).unwrap();
        match args.command {
            Command::Exec { code, timeout, .. } => {
                assert_eq!(code.as_deref(), Some("print(1)"));
                assert_eq!(timeout, 5);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_exec_code_and_file_conflict() {
        assert!(Args::try_parse_from(["hearth", "exec", "x", "--file", "a.txt"]).is_err());
    }

    #[test]
    fn test_global_flags_override_settings() {
        let args = Args::try_parse_from([
            "hearth",
            "status",
            "--port",
            "4242",
            "--state-dir",
            "/tmp/hearth-test",
        ])
        .unwrap();
        let settings = args.settings().unwrap();
        assert_eq!(settings.endpoint.port(), 4242);
        assert_eq!(settings.state_dir, PathBuf::from("/tmp/hearth-test"));
    }

    #[test]
    fn test_inspect_pattern_defaults_to_everything() {
        let args = Args::try_parse_from(["hearth", "inspect"]).unwrap();
        assert!(matches!(args.command, Command::Inspect { pattern } if pattern.is_empty()));
    }
}
