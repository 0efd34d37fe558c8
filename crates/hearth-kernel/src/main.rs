//! Hearth kernel - one persistent execution engine behind a loopback endpoint.
//!
//! Normally started by the supervisor, which passes `--host`/`--port` and
//! redirects stdout/stderr into the kernel log file.

use anyhow::{Context, Result};
use clap::Parser;
use hearth_core::config::{EngineConfig, EnvVars, DEFAULT_HOST, DEFAULT_PORT};
use hearth_core::{Dispatcher, ExecutionEngine, KernelListener};
use std::net::{IpAddr, SocketAddr};
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "hearth-kernel")]
#[command(about = "Persistent execution kernel for hearth")]
struct Args {
    /// Host to bind to
    #[arg(long, env = EnvVars::HOST, default_value_t = DEFAULT_HOST)]
    host: IpAddr,

    /// Port to listen on
    #[arg(short, long, env = EnvVars::PORT, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging; RUST_LOG overrides the level.
    let level = if args.debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let addr = SocketAddr::new(args.host, args.port);
    info!("Starting hearth kernel (PID {})", std::process::id());

    // The engine is single-threaded and recursion-heavy: give it a thread
    // with a deep stack and a runtime confined to that thread.
    let worker = std::thread::Builder::new()
        .name("hearth-kernel".to_string())
        .stack_size(EngineConfig::THREAD_STACK_SIZE)
        .spawn(move || serve(addr))
        .context("failed to spawn kernel thread")?;

    match worker.join() {
        Ok(result) => result,
        Err(_) => anyhow::bail!("kernel thread panicked"),
    }
}

fn serve(addr: SocketAddr) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build kernel runtime")?;

    runtime.block_on(async {
        let listener = KernelListener::bind(addr).await?;
        let mut dispatcher = Dispatcher::new(ExecutionEngine::new());
        listener
            .serve_until(&mut dispatcher, shutdown_signal())
            .await?;
        info!("Kernel exiting");
        Ok(())
    })
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults_and_overrides() {
        let args = Args::try_parse_from(["hearth-kernel"]).unwrap();
        assert_eq!(args.host, DEFAULT_HOST);
        assert!(!args.debug);

        let args =
            Args::try_parse_from(["hearth-kernel", "--host", "127.0.0.1", "--port", "4242", "-d"])
                .unwrap();
        assert_eq!(args.port, 4242);
        assert!(args.debug);
    }

    #[test]
    fn test_args_reject_bad_port() {
        assert!(Args::try_parse_from(["hearth-kernel", "--port", "70000"]).is_err());
    }
}
