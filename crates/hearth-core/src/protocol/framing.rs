//! Request/response framing.
//!
//! ```text
//! request:  [UTF-8 JSON bytes][\n__END__\n]
//! response: [UTF-8 JSON bytes]  <EOF>
//! ```

use super::message::{Request, Response};
use crate::config::ProtocolConfig;
use crate::error::{KernelError, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Read one sentinel-terminated request frame.
///
/// Returns the document bytes without the sentinel, or `None` when the peer
/// closed the connection without sending anything. Bytes after the sentinel
/// are ignored; connections are one-shot.
pub async fn read_request_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let sentinel = ProtocolConfig::SENTINEL;
    let mut buf = Vec::new();
    let mut chunk = [0u8; ProtocolConfig::READ_CHUNK_SIZE];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(KernelError::protocol(format!(
                "incomplete frame: connection closed after {} bytes without end marker",
                buf.len()
            )));
        }

        // Only the tail can newly contain the sentinel.
        let search_from = buf.len().saturating_sub(sentinel.len() - 1);
        buf.extend_from_slice(&chunk[..n]);

        if let Some(pos) = find_subslice(&buf[search_from..], sentinel) {
            buf.truncate(search_from + pos);
            return Ok(Some(buf));
        }

        if buf.len() > ProtocolConfig::MAX_FRAME_SIZE {
            return Err(KernelError::FrameTooLarge {
                size: buf.len(),
                max: ProtocolConfig::MAX_FRAME_SIZE,
            });
        }
    }
}

/// Decode a request document.
pub fn decode_request(frame: &[u8]) -> Result<Request> {
    let text = std::str::from_utf8(frame)
        .map_err(|_| KernelError::protocol("invalid UTF-8 in request frame"))?;
    Ok(serde_json::from_str(text)?)
}

/// Write a request followed by the sentinel.
pub async fn write_request<W: AsyncWriteExt + Unpin>(writer: &mut W, request: &Request) -> Result<()> {
    let mut payload = serde_json::to_vec(request)?;
    payload.extend_from_slice(ProtocolConfig::SENTINEL);
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Write a response document. The caller closes the connection afterwards.
pub async fn write_response<W: AsyncWriteExt + Unpin>(writer: &mut W, response: &Response) -> Result<()> {
    let payload = serde_json::to_vec(response)?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Decode a complete response document.
pub fn decode_response(bytes: &[u8]) -> Result<Response> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| KernelError::protocol("invalid UTF-8 in response"))?;
    Ok(serde_json::from_str(text)?)
}

/// Collects response bytes until they form a complete document.
#[derive(Debug, Default)]
pub struct ResponseAccumulator {
    buf: Vec<u8>,
}

impl ResponseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. Fails once the response outgrows the frame limit.
    pub fn push(&mut self, chunk: &[u8]) -> Result<()> {
        self.buf.extend_from_slice(chunk);
        if self.buf.len() > ProtocolConfig::MAX_FRAME_SIZE {
            return Err(KernelError::FrameTooLarge {
                size: self.buf.len(),
                max: ProtocolConfig::MAX_FRAME_SIZE,
            });
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Parse the bytes gathered so far, if they are a complete document.
    pub fn try_complete(&self) -> Option<Response> {
        if self.buf.is_empty() {
            return None;
        }
        decode_response(&self.buf).ok()
    }

    /// Parse the bytes gathered so far, reporting why they are not a response.
    pub fn finish(&self) -> Result<Response> {
        decode_response(&self.buf)
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::{ExecuteResult, ResetResult};
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_request_frame_roundtrip() {
        let mut buf = Vec::new();
        write_request(&mut buf, &Request::execute("x = 1\nprint(x)"))
            .await
            .unwrap();
        assert!(buf.ends_with(ProtocolConfig::SENTINEL));

        let mut cursor = std::io::Cursor::new(buf);
        let frame = read_request_frame(&mut cursor).await.unwrap().unwrap();
        assert_eq!(decode_request(&frame).unwrap(), Request::execute("x = 1\nprint(x)"));
    }

    #[tokio::test]
    async fn test_read_empty_stream_returns_none() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        assert!(read_request_frame(&mut cursor).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_sentinel_is_protocol_error() {
        let mut cursor = std::io::Cursor::new(br#"{"action":"status"}"#.to_vec());
        let err = read_request_frame(&mut cursor).await.unwrap_err();
        assert!(matches!(err, KernelError::Protocol { .. }));
    }

    #[tokio::test]
    async fn test_sentinel_split_across_reads() {
        let (mut client, mut server) = tokio::io::duplex(64);

        let writer = tokio::spawn(async move {
            client.write_all(br#"{"action":"reset"}"#).await.unwrap();
            client.write_all(b"\n__EN").await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            client.write_all(b"D__\n").await.unwrap();
            client
        });

        let frame = read_request_frame(&mut server).await.unwrap().unwrap();
        assert_eq!(decode_request(&frame).unwrap(), Request::Reset);
        drop(writer.await.unwrap());
    }

    #[test]
    fn test_decode_request_rejects_invalid_utf8() {
        let err = decode_request(&[0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, KernelError::Protocol { .. }));
    }

    #[test]
    fn test_accumulator_completes_only_on_full_document() {
        let response = Response::Reset(ResetResult {
            success: true,
            message: "ok".into(),
        });
        let bytes = serde_json::to_vec(&response).unwrap();
        let (head, tail) = bytes.split_at(bytes.len() / 2);

        let mut acc = ResponseAccumulator::new();
        assert!(acc.try_complete().is_none());
        acc.push(head).unwrap();
        assert!(acc.try_complete().is_none());
        acc.push(tail).unwrap();
        assert_eq!(acc.try_complete(), Some(response));
    }

    #[tokio::test]
    async fn test_write_response_is_plain_document() {
        let response = Response::Execute(ExecuteResult {
            success: true,
            stdout: "1\n".into(),
            stderr: String::new(),
            error: None,
        });
        let mut buf = Vec::new();
        write_response(&mut buf, &response).await.unwrap();
        assert!(!buf.ends_with(ProtocolConfig::SENTINEL));
        assert_eq!(decode_response(&buf).unwrap(), response);
    }
}
