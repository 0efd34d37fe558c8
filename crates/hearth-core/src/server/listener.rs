//! The kernel's accept loop.
//!
//! Connections are handled strictly one at a time on the calling task:
//! each one is read, dispatched, answered and closed before the next
//! `accept`. Engine operations therefore never interleave and the namespace
//! needs no locking. A slow `execute` delays every other request.

use super::dispatcher::Dispatcher;
use crate::error::{KernelError, Result};
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// A bound kernel endpoint.
pub struct KernelListener {
    listener: TcpListener,
    addr: SocketAddr,
}

impl KernelListener {
    /// Bind `addr`. Fails if another kernel already owns the endpoint.
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|e| KernelError::Io {
            message: format!("failed to bind kernel endpoint {}: {}", addr, e),
            path: None,
            source: Some(e),
        })?;
        let addr = listener.local_addr()?;
        info!("Kernel listening on {}", addr);
        Ok(Self { listener, addr })
    }

    /// The bound address (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serve connections until `shutdown` completes.
    ///
    /// Shutdown is only observed between connections; an in-flight
    /// exchange always runs to completion.
    pub async fn serve_until<F>(&self, dispatcher: &mut Dispatcher, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Kernel listener shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!("Connection from {}", peer);
                            if let Err(e) = dispatcher.serve_connection(stream).await {
                                // The peer usually gave up waiting; nothing to report back.
                                debug!("Connection {} ended with error: {}", peer, e);
                            }
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
            }
        }
    }

    /// Serve connections forever.
    pub async fn serve(&self, dispatcher: &mut Dispatcher) -> Result<()> {
        self.serve_until(dispatcher, std::future::pending()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ExecutionEngine;
    use crate::protocol::{decode_response, write_request, Request, Response};
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    async fn exchange(addr: SocketAddr, request: Request) -> Response {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        write_request(&mut stream, &request).await.unwrap();
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes).await.unwrap();
        decode_response(&bytes).unwrap()
    }

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[tokio::test]
    async fn test_sequential_requests_share_namespace() {
        let listener = KernelListener::bind(loopback()).await.unwrap();
        let addr = listener.local_addr();
        let mut dispatcher = Dispatcher::new(ExecutionEngine::new());
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let server = listener.serve_until(&mut dispatcher, async {
            let _ = stop_rx.await;
        });
        let client = async move {
            let first = exchange(addr, Request::execute("x = 1")).await;
            let second = exchange(addr, Request::execute("print(x + 1)")).await;
            let _ = stop_tx.send(());
            (first, second)
        };

        let (served, (first, second)) = tokio::join!(server, client);
        served.unwrap();
        assert!(first.is_success());
        match second {
            Response::Execute(r) => assert_eq!(r.stdout, "2\n"),
            other => panic!("unexpected response {:?}", other),
        }
        assert!(dispatcher.engine().namespace().contains("x"));
    }

    #[tokio::test]
    async fn test_concurrent_clients_are_served_one_at_a_time() {
        let listener = KernelListener::bind(loopback()).await.unwrap();
        let addr = listener.local_addr();
        let mut engine = ExecutionEngine::new();
        assert!(engine.execute("log = []").success);
        let mut dispatcher = Dispatcher::new(engine);
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let server = listener.serve_until(&mut dispatcher, async {
            let _ = stop_rx.await;
        });
        let clients = async move {
            let mut handles = Vec::new();
            for i in 0..8 {
                let code = format!("log.append({})\nprint(len(log))", i);
                handles.push(tokio::spawn(exchange(addr, Request::execute(code))));
            }
            let mut seen = Vec::new();
            for handle in handles {
                match handle.await.unwrap() {
                    Response::Execute(r) => {
                        assert!(r.success);
                        seen.push(r.stdout.trim().parse::<usize>().unwrap());
                    }
                    other => panic!("unexpected response {:?}", other),
                }
            }
            let _ = stop_tx.send(());
            seen
        };

        let (served, mut seen) = tokio::join!(server, clients);
        served.unwrap();
        seen.sort_unstable();
        assert_eq!(seen, (1..=8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_second_bind_fails() {
        let first = KernelListener::bind(loopback()).await.unwrap();
        let result = KernelListener::bind(first.local_addr()).await;
        assert!(matches!(result, Err(KernelError::Io { .. })));
    }

    #[tokio::test]
    async fn test_malformed_request_does_not_stop_listener() {
        use tokio::io::AsyncWriteExt;

        let listener = KernelListener::bind(loopback()).await.unwrap();
        let addr = listener.local_addr();
        let mut dispatcher = Dispatcher::new(ExecutionEngine::new());
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let server = listener.serve_until(&mut dispatcher, async {
            let _ = stop_rx.await;
        });
        let client = async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(b"garbage\n__END__\n").await.unwrap();
            let mut bytes = Vec::new();
            stream.read_to_end(&mut bytes).await.unwrap();
            let bad = decode_response(&bytes).unwrap();

            let good = exchange(addr, Request::Status).await;
            let _ = stop_tx.send(());
            (bad, good)
        };

        let (served, (bad, good)) = tokio::join!(server, client);
        served.unwrap();
        assert!(matches!(bad, Response::Error(_)));
        assert!(matches!(good, Response::Status(_)));
    }
}
