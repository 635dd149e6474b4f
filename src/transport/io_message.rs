//! The unit a connection's read/write half hands to and receives from the
//! protocol-checking layer: a buffer plus enough addressing/ordering
//! metadata to route a reply back to the right peer and, for multiplexed
//! protocols, the right in-flight call.

use crate::transport::address::Address;
use crate::transport::buffer::NonContiguousBuffer;
use crate::transport::conn::ConnId;

/// One message's worth of bytes in flight, tagged with where it came from
/// (or is going to) and, for protocols that multiplex several concurrent
/// exchanges over one connection, a sequence id correlating a request with
/// its eventual response.
#[derive(Debug)]
pub struct IoMessage {
    pub conn_id: ConnId,
    pub buffer: NonContiguousBuffer,
    pub peer_addr: Option<Address>,
    pub sequence_id: Option<u64>,
}

impl IoMessage {
    pub fn new(conn_id: ConnId, buffer: NonContiguousBuffer) -> Self {
        IoMessage { conn_id, buffer, peer_addr: None, sequence_id: None }
    }

    pub fn with_peer_addr(mut self, peer_addr: Address) -> Self {
        self.peer_addr = Some(peer_addr);
        self
    }

    pub fn with_sequence_id(mut self, sequence_id: u64) -> Self {
        self.sequence_id = Some(sequence_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn builder_methods_set_optional_fields() {
        let mut buf = NonContiguousBuffer::new();
        buf.push(Bytes::from_static(b"hello"));

        let msg = IoMessage::new(ConnId::new(0, 1), buf)
            .with_peer_addr(Address::Unknown)
            .with_sequence_id(42);

        assert_eq!(msg.sequence_id, Some(42));
        assert_eq!(msg.peer_addr, Some(Address::Unknown));
        assert_eq!(msg.buffer.byte_size(), 5);
    }
}
