//! Generic `CheckMessage`/`HandleMessage` contract every protocol checker
//! implements, generalizing the teacher's `HttpConnection::parse` so other
//! wire formats can plug in behind the same accept/dispatch loop.

use crate::transport::buffer::NonContiguousBuffer;
use memchr::memchr;

/// Result of running a checker over however much data has arrived so far.
#[derive(Debug)]
pub enum CheckOutcome<M> {
    /// A full message was found; `consumed` bytes should be dropped from
    /// the front of the buffer and `message` dispatched.
    PacketFull { message: M, consumed: usize },
    /// Not enough data yet; the caller should read more and retry.
    PacketLess,
    /// The data read so far can never form a valid message.
    PacketErr,
}

/// A pluggable protocol checker/framer, sitting between raw bytes off the
/// wire and a dispatchable application-level message.
pub trait ConnectionHandler: Send {
    type Message;

    /// Scans `buffer` for one complete message. Must not assume `buffer`
    /// starts a message on the first call only — a checker is re-invoked
    /// from byte zero of whatever remains after each `PacketFull` split.
    fn check_message(&mut self, buffer: &[u8]) -> CheckOutcome<Self::Message>;
}

/// A minimal HTTP/1.x line-based checker used to demonstrate and test the
/// `ConnectionHandler` contract independent of the teacher's in-place
/// `Parser` (which owns a fixed pre-allocated buffer tied to one
/// connection's lifetime rather than an arbitrary `&[u8]`). It frames a
/// request by locating the blank line that ends the headers, then either
/// the declared `Content-Length` bytes of body or none.
pub struct HttpFrameChecker;

/// One framed HTTP/1.x request: the raw header block plus the body slice,
/// as byte ranges within the buffer that was scanned.
#[derive(Debug, PartialEq, Eq)]
pub struct HttpFrame {
    pub head_len: usize,
    pub body_len: usize,
}

impl HttpFrameChecker {
    fn content_length(head: &[u8]) -> Option<usize> {
        for line in head.split(|&b| b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            let mut parts = line.splitn(2, |&b| b == b':');
            let name = parts.next()?;
            let value = parts.next()?;
            if name.eq_ignore_ascii_case(b"content-length") {
                let value = std::str::from_utf8(value).ok()?.trim();
                return value.parse().ok();
            }
        }
        None
    }
}

impl ConnectionHandler for HttpFrameChecker {
    type Message = HttpFrame;

    fn check_message(&mut self, buffer: &[u8]) -> CheckOutcome<HttpFrame> {
        let Some(head_end) = find_header_terminator(buffer) else {
            return CheckOutcome::PacketLess;
        };

        let head = &buffer[..head_end];
        let body_len = Self::content_length(head).unwrap_or(0);
        let total = head_end + body_len;

        if buffer.len() < total {
            return CheckOutcome::PacketLess;
        }

        CheckOutcome::PacketFull { message: HttpFrame { head_len: head_end, body_len }, consumed: total }
    }
}

/// Finds the end (exclusive) of the header block, i.e. just past `\r\n\r\n`
/// or `\n\n`.
fn find_header_terminator(buffer: &[u8]) -> Option<usize> {
    let mut search_from = 0;
    loop {
        let rel = memchr(b'\n', &buffer[search_from..])?;
        let idx = search_from + rel;
        if buffer.get(idx + 1) == Some(&b'\n') {
            return Some(idx + 2);
        }
        if idx >= 2 && &buffer[idx - 1..=idx] == b"\r\n" && buffer.get(idx + 1..idx + 3) == Some(b"\r\n") {
            return Some(idx + 3);
        }
        search_from = idx + 1;
    }
}

/// Runs `handler` against `buf`, draining complete messages from the front
/// as they're found, until the buffer is exhausted of full messages.
pub fn drain_messages<H: ConnectionHandler>(handler: &mut H, buf: &mut NonContiguousBuffer) -> Vec<H::Message> {
    let mut out = Vec::new();
    loop {
        let linear = buf.linearize();
        match handler.check_message(&linear) {
            CheckOutcome::PacketFull { message, consumed } => {
                buf.skip(consumed);
                out.push(message);
            }
            CheckOutcome::PacketLess | CheckOutcome::PacketErr => break,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    // S4: two complete HTTP/1.1 requests delivered in a single read,
    // emitting two PACKET_FULL items from one buffer.
    #[test]
    fn s4_two_requests_in_one_buffer_are_both_framed() {
        let mut buffer = NonContiguousBuffer::new();
        buffer.push(Bytes::from_static(
            b"GET /a HTTP/1.1\r\nHost: x\r\n\r\nGET /b HTTP/1.1\r\nHost: x\r\n\r\n",
        ));

        let mut checker = HttpFrameChecker;
        let messages = drain_messages(&mut checker, &mut buffer);

        assert_eq!(messages.len(), 2);
        assert!(buffer.is_empty());
    }

    #[test]
    fn incomplete_headers_report_packet_less() {
        let mut checker = HttpFrameChecker;
        let outcome = checker.check_message(b"GET /a HTTP/1.1\r\nHost: x\r\n");
        assert!(matches!(outcome, CheckOutcome::PacketLess));
    }

    #[test]
    fn waits_for_full_declared_body() {
        let mut checker = HttpFrameChecker;
        let partial = checker.check_message(b"POST /a HTTP/1.1\r\nContent-Length: 5\r\n\r\nhel");
        assert!(matches!(partial, CheckOutcome::PacketLess));

        let full = checker.check_message(b"POST /a HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello");
        match full {
            CheckOutcome::PacketFull { consumed, message } => {
                assert_eq!(consumed, "POST /a HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello".len());
                assert_eq!(message.body_len, 5);
            }
            other => panic!("expected PacketFull, got {other:?}"),
        }
    }
}
