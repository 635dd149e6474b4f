//! Connection metadata and id encoding, generalizing the teacher's
//! `server::connection::Connection{created, request_count}` into the
//! richer entity the data model names, while keeping its reset-not
//! -reallocate pattern.

use crate::transport::address::Address;
use std::any::Any;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Weak;
use std::time::Instant;

/// 64-bit connection id: high 32 bits identify the owning bind adapter,
/// low 32 bits are a per-adapter monotonic (wrapping) counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(pub u64);

impl ConnId {
    pub fn new(adapter_index: u32, sequence: u32) -> Self {
        ConnId(((adapter_index as u64) << 32) | sequence as u64)
    }

    pub fn adapter_index(self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub fn sequence(self) -> u32 {
        self.0 as u32
    }
}

/// Per-adapter monotonic id allocator; wraps rather than errors, matching
/// the teacher's own "never fail a hot-path counter" style elsewhere
/// (e.g. `filter_id`'s bounded counter is the one place that does assert,
/// because filter ids are a small closed set — connection ids are not).
pub struct ConnIdAllocator {
    adapter_index: u32,
    next: AtomicU32,
}

impl ConnIdAllocator {
    pub fn new(adapter_index: u32) -> Self {
        ConnIdAllocator { adapter_index, next: AtomicU32::new(0) }
    }

    pub fn next_id(&self) -> ConnId {
        let sequence = self.next.fetch_add(1, Ordering::Relaxed);
        ConnId::new(self.adapter_index, sequence)
    }
}

/// The kind of peer transport a connection was accepted over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnType {
    Tcp,
    Udp,
    Uds,
}

/// A connection's tagged, open-extension opaque state slot. The known set
/// (plain HTTP request/response in flight, a demultiplexed stream) gets
/// first-class variants; `Other` is the escape hatch for protocols this
/// crate doesn't know about, replacing `std::any` used bare in the
/// private slot.
pub enum ConnState {
    Empty,
    Http(HttpInflight),
    Stream(StreamInflight),
    Other(Box<dyn Any + Send>),
}

impl Default for ConnState {
    fn default() -> Self {
        ConnState::Empty
    }
}

/// In-flight HTTP/1.x request state the distillation names beyond what
/// the teacher's `Parser`/`Request` already track in their own fields:
/// the chunked-decoding progress and body-delivery mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpInflight {
    pub remaining_content_bytes: usize,
    pub chunk_state: Option<crate::protocol::chunked::ChunkState>,
    pub new_request: bool,
    pub is_chunked: bool,
    pub is_blocking: bool,
}

/// In-flight multiplexed-stream state: which stream ids are currently
/// live on this connection.
#[derive(Debug, Clone, Default)]
pub struct StreamInflight {
    pub live_stream_ids: Vec<u64>,
}

/// A connection's metadata, as opposed to its socket — reset, not
/// reallocated, across its lifetime, exactly like the teacher's
/// `Connection` today.
pub struct Connection {
    pub id: ConnId,
    pub conn_type: ConnType,
    pub peer_addr: Address,
    pub created: Instant,
    pub last_activity: Instant,
    pub request_count: usize,
    pub state: ConnState,
}

impl Connection {
    pub fn new(id: ConnId, conn_type: ConnType, peer_addr: Address) -> Self {
        let now = Instant::now();
        Connection { id, conn_type, peer_addr, created: now, last_activity: now, request_count: 0, state: ConnState::Empty }
    }

    /// Resets this connection's metadata for reuse by a new peer,
    /// preserving the allocation (the teacher's `reset()`-don't-reallocate
    /// idiom at the connection level).
    pub fn reset(&mut self, id: ConnId, peer_addr: Address) {
        let now = Instant::now();
        self.id = id;
        self.peer_addr = peer_addr;
        self.created = now;
        self.last_activity = now;
        self.request_count = 0;
        self.state = ConnState::Empty;
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn idle_for(&self) -> std::time::Duration {
        self.last_activity.elapsed()
    }
}

/// A connection as held by a [`crate::transport::conn_manager::ConnectionManager`]
/// shard: the connection's metadata plus a weak back-pointer to the
/// adapter that owns it, avoiding the adapter<->connection strong
/// reference cycle the Design Notes call out.
pub struct ManagedConnection {
    pub conn: std::sync::Mutex<Connection>,
    pub owning_adapter: Weak<crate::transport::bind_adapter::BindAdapterHandle>,
}
