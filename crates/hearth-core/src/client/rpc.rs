//! Caller side of one protocol exchange.
//!
//! Every call opens a fresh connection, writes one framed request and reads
//! until the bytes parse or the kernel closes the connection. Timeouts only
//! bound how long the caller waits: the kernel keeps running whatever it
//! was given.

use crate::config::{ProtocolConfig, RpcConfig};
use crate::error::{KernelError, Result};
use crate::protocol::{
    write_request, ExecuteResult, InspectResult, Request, ResetResult, Response,
    ResponseAccumulator, StatusResult,
};
use crate::supervisor::Supervisor;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// Sends requests to the kernel behind a [`Supervisor`].
#[derive(Clone)]
pub struct RpcCaller {
    supervisor: Supervisor,
    execute_deadline: Duration,
    auto_start: bool,
}

impl RpcCaller {
    pub fn new(supervisor: Supervisor) -> Self {
        Self {
            supervisor,
            execute_deadline: RpcConfig::EXECUTE_DEADLINE,
            auto_start: true,
        }
    }

    /// Total time `execute` waits for a reply.
    pub fn with_execute_deadline(mut self, deadline: Duration) -> Self {
        self.execute_deadline = deadline;
        self
    }

    /// When disabled, `inspect`, `reset` and `status` never start a kernel
    /// and fail with [`KernelError::Unreachable`] if none is running.
    /// `execute` always starts one.
    pub fn with_auto_start(mut self, enabled: bool) -> Self {
        self.auto_start = enabled;
        self
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub fn endpoint(&self) -> SocketAddr {
        self.supervisor.endpoint()
    }

    /// Run `code` in the kernel, starting it first if needed.
    ///
    /// A connection closed without a single byte is retried once after a
    /// fixed delay before surfacing as [`KernelError::Unresponsive`].
    pub async fn execute(&self, code: &str) -> Result<ExecuteResult> {
        self.supervisor
            .ensure_running(RpcConfig::ENSURE_START_ATTEMPTS, RpcConfig::ENSURE_START_DELAY)
            .await?;

        let request = Request::execute(code);
        let response = match self.execute_once(&request).await {
            Err(KernelError::Unresponsive) => {
                warn!(
                    "Empty response from kernel, retrying in {:?}",
                    RpcConfig::EMPTY_RESPONSE_RETRY_DELAY
                );
                tokio::time::sleep(RpcConfig::EMPTY_RESPONSE_RETRY_DELAY).await;
                self.execute_once(&request).await?
            }
            other => other?,
        };

        match response.into_result()? {
            Response::Execute(result) => Ok(result),
            other => Err(unexpected("execute", &other)),
        }
    }

    pub async fn inspect(&self, pattern: &str) -> Result<InspectResult> {
        match self
            .command(&Request::inspect(pattern), RpcConfig::COMMAND_READ_TIMEOUT)
            .await?
        {
            Response::Inspect(result) => Ok(result),
            other => Err(unexpected("inspect", &other)),
        }
    }

    pub async fn reset(&self) -> Result<ResetResult> {
        match self
            .command(&Request::Reset, RpcConfig::RESET_READ_TIMEOUT)
            .await?
        {
            Response::Reset(result) => Ok(result),
            other => Err(unexpected("reset", &other)),
        }
    }

    pub async fn status(&self) -> Result<StatusResult> {
        match self
            .command(&Request::Status, RpcConfig::COMMAND_READ_TIMEOUT)
            .await?
        {
            Response::Status(result) => Ok(result),
            other => Err(unexpected("status", &other)),
        }
    }

    async fn execute_once(&self, request: &Request) -> Result<Response> {
        exchange(
            self.endpoint(),
            request,
            RpcConfig::EXECUTE_READ_TIMEOUT,
            self.execute_deadline,
        )
        .await
    }

    /// Short request with bounded retries on refused, reset or empty
    /// connections.
    async fn command(&self, request: &Request, read_timeout: Duration) -> Result<Response> {
        if self.auto_start {
            self.supervisor
                .ensure_running(RpcConfig::ENSURE_START_ATTEMPTS, RpcConfig::ENSURE_START_DELAY)
                .await?;
        } else if !self.supervisor.is_running().await {
            return Err(KernelError::Unreachable {
                addr: self.endpoint().to_string(),
            });
        }

        exchange_with_retries(self.endpoint(), request, read_timeout)
            .await?
            .into_result()
    }
}

/// Runs [`exchange`] up to [`RpcConfig::COMMAND_ATTEMPTS`] times while the
/// failure is retryable. A busy kernel gets the longer delay.
async fn exchange_with_retries(
    addr: SocketAddr,
    request: &Request,
    read_timeout: Duration,
) -> Result<Response> {
    let attempts = RpcConfig::COMMAND_ATTEMPTS;
    let mut attempt = 1;
    loop {
        let err = match exchange(addr, request, read_timeout, read_timeout).await {
            Ok(response) => return Ok(response),
            Err(e) if e.is_retryable() && attempt < attempts => e,
            Err(e) => return Err(e),
        };
        let delay = match err {
            KernelError::Busy => RpcConfig::BUSY_RETRY_DELAY,
            _ => RpcConfig::REFUSED_RETRY_DELAY,
        };
        debug!(
            "{} request attempt {}/{} failed ({}), retrying in {:?}",
            request.action(),
            attempt,
            attempts,
            err,
            delay
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// One request/response exchange on a fresh connection.
///
/// Reads are retried with `read_timeout` each until a complete response
/// parses, the kernel closes the connection, or `deadline` elapses.
pub async fn exchange(
    addr: SocketAddr,
    request: &Request,
    read_timeout: Duration,
    deadline: Duration,
) -> Result<Response> {
    let started = Instant::now();
    let mut stream = match tokio::time::timeout(RpcConfig::CONNECT_TIMEOUT, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => return Err(classify_io(e, addr)),
        Err(_) => {
            return Err(KernelError::Unreachable {
                addr: addr.to_string(),
            })
        }
    };

    write_request(&mut stream, request)
        .await
        .map_err(|e| match e {
            KernelError::Io {
                source: Some(source),
                ..
            } => classify_io(source, addr),
            other => other,
        })?;

    let mut response = ResponseAccumulator::new();
    let mut chunk = vec![0u8; ProtocolConfig::READ_CHUNK_SIZE];
    loop {
        let remaining = deadline.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            warn!(
                "No complete {} response after {:?} ({} bytes received)",
                request.action(),
                deadline,
                response.len()
            );
            return Err(KernelError::Timeout(deadline));
        }

        match tokio::time::timeout(read_timeout.min(remaining), stream.read(&mut chunk)).await {
            // Slow kernel; keep waiting until the total deadline.
            Err(_) => continue,
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => {
                response.push(&chunk[..n])?;
                if let Some(parsed) = response.try_complete() {
                    return Ok(parsed);
                }
            }
            Ok(Err(e)) => return Err(classify_io(e, addr)),
        }
    }

    if response.is_empty() {
        return Err(KernelError::Unresponsive);
    }
    response.finish()
}

fn classify_io(err: std::io::Error, addr: SocketAddr) -> KernelError {
    match err.kind() {
        ErrorKind::ConnectionRefused | ErrorKind::AddrNotAvailable => KernelError::Unreachable {
            addr: addr.to_string(),
        },
        ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe => {
            KernelError::Busy
        }
        _ => KernelError::from(err),
    }
}

fn unexpected(expected: &str, got: &Response) -> KernelError {
    let got = match got {
        Response::Execute(_) => "execute",
        Response::Inspect(_) => "inspect",
        Response::Reset(_) => "reset",
        Response::Status(_) => "status",
        Response::Error(_) => "error",
    };
    KernelError::protocol(format!("expected {} response, got {}", expected, got))
}
