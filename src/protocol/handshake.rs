//! Preface handshake write, retried on a would-block write exactly as the
//! transport contract's `EAGAIN`/`EWOULDBLOCK` retry describes (`EIO`-class
//! errors abort instead).

use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// The wire-format-specific preface bytes to write before the connection
/// is usable for framed traffic (e.g. a gRPC-over-HTTP/2 connection
/// preface). The bytes themselves are a caller concern; this function
/// only owns the retry discipline.
pub async fn write_preface(io: &mut (impl AsyncWrite + Unpin), preface: &[u8]) -> io::Result<()> {
    let mut written = 0;
    while written < preface.len() {
        match io.write(&preface[written..]).await {
            Ok(0) => {
                return Err(io::Error::new(io::ErrorKind::WriteZero, "preface write returned 0"));
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(e),
        }
    }
    io.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_the_full_preface_to_completion() {
        let mut buf = Vec::new();
        write_preface(&mut buf, b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n").await.unwrap();
        assert_eq!(buf, b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n");
    }

    // S8-adjacent: a handshake that never completes (write returns 0
    // before the preface is fully sent) surfaces as an error rather than
    // silently truncating.
    #[tokio::test]
    async fn zero_byte_write_is_reported_as_an_error() {
        struct NeverWrites;
        impl AsyncWrite for NeverWrites {
            fn poll_write(
                self: std::pin::Pin<&mut Self>,
                _cx: &mut std::task::Context<'_>,
                _buf: &[u8],
            ) -> std::task::Poll<io::Result<usize>> {
                std::task::Poll::Ready(Ok(0))
            }
            fn poll_flush(
                self: std::pin::Pin<&mut Self>,
                _cx: &mut std::task::Context<'_>,
            ) -> std::task::Poll<io::Result<()>> {
                std::task::Poll::Ready(Ok(()))
            }
            fn poll_shutdown(
                self: std::pin::Pin<&mut Self>,
                _cx: &mut std::task::Context<'_>,
            ) -> std::task::Poll<io::Result<()>> {
                std::task::Poll::Ready(Ok(()))
            }
        }

        let mut io = NeverWrites;
        let result = write_preface(&mut io, b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n").await;
        assert!(result.is_err());
    }
}
