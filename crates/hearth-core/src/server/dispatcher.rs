//! Routes one decoded request to the execution engine.

use crate::config::ProtocolConfig;
use crate::engine::ExecutionEngine;
use crate::error::{KernelError, Result};
use crate::protocol::{decode_request, read_request_frame, write_response, Request, Response};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

/// Owns the engine and answers requests one at a time.
pub struct Dispatcher {
    engine: ExecutionEngine,
}

impl Dispatcher {
    pub fn new(engine: ExecutionEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    /// Run a decoded request.
    pub fn dispatch(&mut self, request: Request) -> Response {
        debug!("Dispatching {} request", request.action());
        match request {
            Request::Execute { code } => Response::Execute(self.engine.execute(&code)),
            Request::Inspect { pattern } => Response::Inspect(self.engine.inspect(&pattern)),
            Request::Reset => Response::Reset(self.engine.reset()),
            Request::Status => Response::Status(self.engine.status()),
        }
    }

    /// Decode a raw frame and dispatch it. Malformed frames produce an
    /// error document instead of a failure.
    pub fn handle_frame(&mut self, frame: &[u8]) -> Response {
        match decode_request(frame) {
            Ok(request) => self.dispatch(request),
            Err(e) => {
                warn!("Rejected malformed request: {}", e);
                Response::error(e.to_string())
            }
        }
    }

    /// Serve exactly one exchange on `stream`: read a frame, answer it.
    ///
    /// Returns once the response is written. A peer that connects and
    /// closes without sending anything gets no response.
    pub async fn serve_connection<S>(&mut self, mut stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let read = tokio::time::timeout(
            ProtocolConfig::SERVER_READ_TIMEOUT,
            read_request_frame(&mut stream),
        )
        .await;

        let response = match read {
            Ok(Ok(Some(frame))) => self.handle_frame(&frame),
            Ok(Ok(None)) => {
                debug!("Peer closed without sending a request");
                return Ok(());
            }
            Ok(Err(e)) => {
                warn!("Failed to read request frame: {}", e);
                Response::error(e.to_string())
            }
            Err(_) => {
                let e = KernelError::protocol(format!(
                    "no complete request within {:?}",
                    ProtocolConfig::SERVER_READ_TIMEOUT
                ));
                warn!("{}", e);
                Response::error(e.to_string())
            }
        };

        write_response(&mut stream, &response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode_response, write_request};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(ExecutionEngine::new())
    }

    #[test]
    fn test_dispatch_routes_by_action() {
        let mut d = dispatcher();
        let response = d.dispatch(Request::execute("x = 41 + 1"));
        assert!(response.is_success());

        match d.dispatch(Request::inspect("x")) {
            Response::Inspect(r) => {
                assert_eq!(r.count, 1);
                assert_eq!(r.variables[0].preview, "42");
            }
            other => panic!("unexpected response {:?}", other),
        }

        assert!(matches!(d.dispatch(Request::Reset), Response::Reset(_)));
        match d.dispatch(Request::Status) {
            Response::Status(s) => assert_eq!(s.variable_count, 0),
            other => panic!("unexpected response {:?}", other),
        }
    }

    #[test]
    fn test_malformed_frame_yields_error_document() {
        let mut d = dispatcher();
        let response = d.handle_frame(b"{not json");
        assert!(matches!(response, Response::Error(_)));

        let response = d.handle_frame(br#"{"action":"launch"}"#);
        assert!(matches!(response, Response::Error(ref e) if e.error.contains("unknown action")));

        // The engine is untouched and still serves requests.
        assert!(d.dispatch(Request::execute("print(1)")).is_success());
    }

    #[tokio::test]
    async fn test_serve_connection_one_exchange() {
        let mut d = dispatcher();
        let (mut client, server) = tokio::io::duplex(64 * 1024);

        write_request(&mut client, &Request::execute("print('hi')"))
            .await
            .unwrap();
        d.serve_connection(server).await.unwrap();

        let mut bytes = Vec::new();
        client.read_to_end(&mut bytes).await.unwrap();
        match decode_response(&bytes).unwrap() {
            Response::Execute(r) => {
                assert!(r.success);
                assert_eq!(r.stdout, "hi\n");
            }
            other => panic!("unexpected response {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_incomplete_frame_is_answered_with_error() {
        let mut d = dispatcher();
        let (mut client, server) = tokio::io::duplex(1024);
        client.write_all(br#"{"action":"status"}"#).await.unwrap();
        client.shutdown().await.unwrap();

        d.serve_connection(server).await.unwrap();

        let mut bytes = Vec::new();
        client.read_to_end(&mut bytes).await.unwrap();
        let response = decode_response(&bytes).unwrap();
        assert!(matches!(response, Response::Error(ref e) if e.error.contains("incomplete frame")));
    }

    #[tokio::test]
    async fn test_silent_peer_gets_no_response() {
        let mut d = dispatcher();
        let (mut client, server) = tokio::io::duplex(1024);
        client.shutdown().await.unwrap();

        d.serve_connection(server).await.unwrap();

        let mut bytes = Vec::new();
        client.read_to_end(&mut bytes).await.unwrap();
        assert!(bytes.is_empty());
    }
}
