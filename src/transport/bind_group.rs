//! Multi-adapter dispatch: picks which [`BindAdapter`](super::bind_adapter::BindAdapter)
//! a freshly accepted peer is attributed to when several adapters share one
//! logical bind (e.g. one per `accept_thread_num` worker, bound with
//! `SO_REUSEPORT`).
//!
//! The kernel already load-balances accepts across `SO_REUSEPORT` listeners;
//! `BindGroup` sits one layer above that for callers that want a say in
//! which adapter's connection manager a peer counts against — e.g. sticky
//! routing by peer address, or a custom weighting instead of round-robin.

use crate::transport::bind_adapter::BindAdapterHandle;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

type DispatchFn = dyn Fn(&SocketAddr, usize) -> usize + Send + Sync;

/// A set of adapter handles sharing one logical bind, plus the function
/// that picks which one a new peer is dispatched to.
pub struct BindGroup {
    handles: Vec<Arc<BindAdapterHandle>>,
    dispatch_accept_function: Option<Arc<DispatchFn>>,
    next: AtomicUsize,
}

impl BindGroup {
    /// Round-robin dispatch across `handles`, the default every adapter
    /// group uses unless `with_dispatch_accept_function` overrides it.
    pub fn new(handles: Vec<Arc<BindAdapterHandle>>) -> Self {
        BindGroup { handles, dispatch_accept_function: None, next: AtomicUsize::new(0) }
    }

    /// Overrides the default round-robin dispatch with a caller-supplied
    /// function of `(peer, adapter_count) -> adapter_index`. The returned
    /// index is taken modulo the group's adapter count, so a caller can't
    /// panic the group with an out-of-range pick.
    pub fn with_dispatch_accept_function(
        mut self,
        f: impl Fn(&SocketAddr, usize) -> usize + Send + Sync + 'static,
    ) -> Self {
        self.dispatch_accept_function = Some(Arc::new(f));
        self
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Picks the adapter `peer` should be attributed to.
    ///
    /// # Panics
    /// Panics if the group has no adapters — a `BindGroup` with zero
    /// members is a caller construction error, not a runtime condition.
    pub fn pick(&self, peer: &SocketAddr) -> Arc<BindAdapterHandle> {
        assert!(!self.handles.is_empty(), "BindGroup has no adapters to dispatch to");

        let index = match &self.dispatch_accept_function {
            Some(f) => f(peer, self.handles.len()) % self.handles.len(),
            None => self.next.fetch_add(1, Ordering::Relaxed) % self.handles.len(),
        };
        self.handles[index].clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::conn_manager::ConnectionManager;

    fn handle(adapter_index: u32) -> Arc<BindAdapterHandle> {
        Arc::new(BindAdapterHandle::for_test(adapter_index, Arc::new(ConnectionManager::new(16))))
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:1".parse().unwrap()
    }

    #[test]
    fn default_dispatch_is_round_robin() {
        let group = BindGroup::new(vec![handle(0), handle(1), handle(2)]);
        let picks: Vec<u32> = (0..6).map(|_| group.pick(&peer()).adapter_index).collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn custom_dispatch_function_is_used_when_set() {
        let group = BindGroup::new(vec![handle(0), handle(1)]).with_dispatch_accept_function(|_peer, _count| 1);
        assert_eq!(group.pick(&peer()).adapter_index, 1);
        assert_eq!(group.pick(&peer()).adapter_index, 1);
    }

    #[test]
    fn out_of_range_custom_pick_is_wrapped_not_panicked() {
        let group = BindGroup::new(vec![handle(0), handle(1)]).with_dispatch_accept_function(|_peer, count| count + 5);
        // (2 + 5) % 2 == 1
        assert_eq!(group.pick(&peer()).adapter_index, 1);
    }
}
