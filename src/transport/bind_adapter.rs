//! Generalizes the teacher's single-protocol `Server`/`ServerBuilder`
//! (`server::server_impl`) into a per-bind listener-plus-worker-pool unit
//! that owns one [`ConnectionManager`] and drives an idle-eviction sweep,
//! independent of which wire format its connections speak.

use crate::transport::address::Address;
use crate::transport::conn::{ConnIdAllocator, ConnType, Connection, ManagedConnection};
use crate::transport::conn_manager::ConnectionManager;
use socket2::{Domain, Protocol, Socket, Type};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};

/// Lifecycle state a [`BindAdapter`] can be driven through at runtime,
/// generalizing the teacher's "the server just runs forever" `launch()`
/// into the explicit stop states a multi-adapter runtime needs (one
/// adapter stopping must not take the whole process down).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterLifecycle {
    /// Accepting new connections and serving existing ones.
    Running,
    /// No longer accepting new connections; existing ones keep running.
    StopListen,
    /// Neither accepting new connections nor serving existing ones.
    Stopped,
    /// Torn down; the adapter's resources have been released.
    Destroyed,
}

/// The handle a [`ManagedConnection`] holds a weak back-reference to.
/// Kept deliberately small (just what a connection needs to ask its
/// owner): the full [`BindAdapter`] isn't `Sync`-shareable as a whole
/// because the listener itself is consumed by the accept loop.
pub struct BindAdapterHandle {
    pub adapter_index: u32,
    pub connections: Arc<ConnectionManager>,
    lifecycle: Mutex<AdapterLifecycle>,
}

impl BindAdapterHandle {
    pub fn lifecycle(&self) -> AdapterLifecycle {
        *self.lifecycle.lock().expect("lifecycle mutex poisoned")
    }

    fn set_lifecycle(&self, state: AdapterLifecycle) {
        *self.lifecycle.lock().expect("lifecycle mutex poisoned") = state;
    }

    #[cfg(test)]
    pub(crate) fn for_test(adapter_index: u32, connections: Arc<ConnectionManager>) -> Self {
        BindAdapterHandle { adapter_index, connections, lifecycle: Mutex::new(AdapterLifecycle::Running) }
    }
}

/// Binds one listening socket and fans accepted connections out across a
/// pre-spawned worker pool, exactly like the teacher's `Server` — but
/// generalized to: `SO_REUSEPORT` multi-adapter binding on the same port,
/// a keyed [`ConnectionManager`] instead of an anonymous queue, and a
/// periodic idle-eviction sweep.
pub struct BindAdapter {
    listener: TcpListener,
    handle: Arc<BindAdapterHandle>,
    id_allocator: ConnIdAllocator,
    idle_timeout: Duration,
    sweep_interval: Duration,
}

/// What to do with a freshly accepted stream before it's handed to a
/// protocol-specific connection loop — the generalized replacement for
/// the teacher's inline `filter(...)`/`filter_async(...)` early-reject
/// check in `spawn_worker`.
pub trait AcceptHook: Send + Sync + 'static {
    /// Return `Err` to reject the connection before any bytes are read.
    /// Rejections are not counted against `max_conn_num`.
    fn accept(&self, peer: SocketAddr, local: SocketAddr) -> Result<(), String>;
}

impl AcceptHook for () {
    fn accept(&self, _peer: SocketAddr, _local: SocketAddr) -> Result<(), String> {
        Ok(())
    }
}

impl BindAdapter {
    /// Binds `addr` with `SO_REUSEPORT` set before `listen()`, so several
    /// adapters (e.g. one per worker thread) can share one port — the
    /// portable replacement for the teacher's bare `TcpListener::bind`,
    /// which assumes exactly one listener per port.
    pub fn bind(addr: SocketAddr, adapter_index: u32, max_conn_num: usize) -> io::Result<BindAdapter> {
        let domain = if addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        #[cfg(unix)]
        socket.set_reuse_port(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(1024)?;

        let listener = TcpListener::from_std(socket.into())?;
        let handle = Arc::new(BindAdapterHandle {
            adapter_index,
            connections: Arc::new(ConnectionManager::new(max_conn_num)),
            lifecycle: Mutex::new(AdapterLifecycle::Running),
        });

        Ok(BindAdapter {
            listener,
            handle,
            id_allocator: ConnIdAllocator::new(adapter_index),
            idle_timeout: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(10),
        })
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration, sweep_interval: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self.sweep_interval = sweep_interval;
        self
    }

    pub fn handle(&self) -> Arc<BindAdapterHandle> {
        self.handle.clone()
    }

    /// Accepts connections until the adapter is driven out of
    /// [`AdapterLifecycle::Running`], handing each accepted stream to
    /// `conn_establish` after `accept_hook` passes.
    ///
    /// `conn_establish` is the per-connection protocol loop (HTTP, a
    /// multiplexed stream protocol, ...); this function owns only the
    /// accept step, registration, and eventual deregistration, mirroring
    /// the separation the teacher's `Server::launch`/`spawn_worker` split
    /// already has between accepting and per-connection work.
    pub async fn serve<Hook, F, Fut>(&mut self, accept_hook: Arc<Hook>, conn_establish: F) -> io::Result<()>
    where
        Hook: AcceptHook,
        F: Fn(TcpStream, Arc<ManagedConnection>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let conn_establish = Arc::new(conn_establish);
        self.spawn_idle_sweep();

        loop {
            if self.handle.lifecycle() != AdapterLifecycle::Running {
                return Ok(());
            }

            let (stream, peer) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(_) => continue,
            };

            let Ok(local) = stream.local_addr() else { continue };

            if let Err(_reason) = accept_hook.accept(peer, local) {
                drop(stream);
                continue;
            }

            let id = self.id_allocator.next_id();
            let managed = Arc::new(ManagedConnection {
                conn: Mutex::new(Connection::new(id, ConnType::Tcp, Address::from(peer))),
                owning_adapter: Arc::downgrade(&self.handle),
            });

            if self.handle.connections.insert(managed.clone()).is_err() {
                drop(stream);
                continue;
            }

            let connections = self.handle.connections.clone();
            let conn_establish = conn_establish.clone();
            tokio::spawn(async move {
                (conn_establish.as_ref())(stream, managed.clone()).await;
                let id = managed.conn.lock().expect("connection mutex poisoned").id;
                connections.remove(id);
            });
        }
    }

    /// Stops accepting new connections but leaves in-flight ones running.
    pub fn stop_listen(&self) {
        self.handle.set_lifecycle(AdapterLifecycle::StopListen);
    }

    pub fn stop(&self) {
        self.handle.set_lifecycle(AdapterLifecycle::Stopped);
    }

    pub fn destroy(&self) {
        self.handle.set_lifecycle(AdapterLifecycle::Destroyed);
    }

    fn spawn_idle_sweep(&self) {
        let handle = self.handle.clone();
        let idle_timeout = self.idle_timeout;
        let sweep_interval = self.sweep_interval;
        let stop = Arc::new(AtomicBool::new(false));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            loop {
                ticker.tick().await;
                if stop.load(Ordering::Relaxed) {
                    return;
                }
                let deadline = tokio::time::Instant::now() - idle_timeout;
                let evicted = handle.connections.evict_idle_before(deadline.into_std());
                if !evicted.is_empty() {
                    tracing::debug!(target: "bind_adapter", count = evicted.len(), "evicted idle connections");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_assigns_a_real_local_address() {
        crate::test_support::init_tracing();
        let adapter = BindAdapter::bind("127.0.0.1:0".parse().unwrap(), 0, 16).unwrap();
        assert!(adapter.listener.local_addr().unwrap().port() > 0);
    }

    #[tokio::test]
    async fn stop_listen_halts_the_accept_loop() {
        let mut adapter = BindAdapter::bind("127.0.0.1:0".parse().unwrap(), 1, 16).unwrap();
        let handle = adapter.handle();
        handle.set_lifecycle(AdapterLifecycle::StopListen);

        let result = adapter
            .serve(Arc::new(()), |_stream, _managed| async {})
            .await;
        assert!(result.is_ok());
    }

    struct RejectAll;
    impl AcceptHook for RejectAll {
        fn accept(&self, _peer: SocketAddr, _local: SocketAddr) -> Result<(), String> {
            Err("rejected".into())
        }
    }

    // Property 8 adjacent: a rejected accept never reaches conn_establish
    // and is not counted in the connection manager.
    #[tokio::test]
    async fn rejected_accept_hook_prevents_registration() {
        let mut adapter = BindAdapter::bind("127.0.0.1:0".parse().unwrap(), 2, 16).unwrap();
        let addr = adapter.listener.local_addr().unwrap();
        let handle = adapter.handle();

        let accept_hook = Arc::new(RejectAll);
        let established = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let established_clone = established.clone();

        let serve_handle = tokio::spawn(async move {
            let _ = adapter
                .serve(accept_hook, move |_stream, _managed| {
                    let established = established_clone.clone();
                    async move {
                        established.fetch_add(1, Ordering::Relaxed);
                    }
                })
                .await;
        });

        let _ = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(established.load(Ordering::Relaxed), 0);
        assert_eq!(handle.connections.live_count(), 0);
        serve_handle.abort();
    }
}
