//! Shared-global object pool: a handful of mutex-protected pools, each
//! thread bound round-robin to one of them.

use super::slot::{max_free_num, Chunk, Poolable, Slot};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Number of mutex-protected global pools a [`GlobalPool`] fans out across.
const GLOBAL_POOL_NUM: usize = 4;

struct GlobalShard<T> {
    chunks: Vec<Chunk<T>>,
    /// Free list of slots handed back by threads (including ones that have
    /// since exited), bounded by `max_free_num::<T>()`.
    returned: Vec<Slot<T>>,
    next_chunk_id: u32,
}

impl<T> GlobalShard<T> {
    fn new() -> Self {
        GlobalShard { chunks: Vec::new(), returned: Vec::new(), next_chunk_id: 0 }
    }
}

/// A pool backed by `GLOBAL_POOL_NUM` mutex-protected shards, round-robin
/// assigned to calling threads.
pub struct GlobalPool<T: Poolable + Send> {
    shards: Vec<Mutex<GlobalShard<T>>>,
    assign_cursor: AtomicUsize,
    live_count: AtomicUsize,
}

impl<T: Poolable + Send> Default for GlobalPool<T> {
    fn default() -> Self {
        GlobalPool {
            shards: (0..GLOBAL_POOL_NUM).map(|_| Mutex::new(GlobalShard::new())).collect(),
            assign_cursor: AtomicUsize::new(0),
            live_count: AtomicUsize::new(0),
        }
    }
}

fn thread_binding(cursor: &AtomicUsize) -> usize {
    thread_local! {
        static BOUND_SHARD: std::cell::Cell<Option<usize>> = const { std::cell::Cell::new(None) };
    }
    BOUND_SHARD.with(|cell| {
        if let Some(idx) = cell.get() {
            return idx;
        }
        let idx = cursor.fetch_add(1, Ordering::Relaxed) % GLOBAL_POOL_NUM;
        cell.set(Some(idx));
        idx
    })
}

impl<T: Poolable + Send> GlobalPool<T> {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn live_count(&self) -> usize {
        self.live_count.load(Ordering::SeqCst)
    }

    pub fn allocate(&self, value: T) -> GlobalPoolGuard<'_, T> {
        let shard_idx = thread_binding(&self.assign_cursor);
        let mut shard = self.shards[shard_idx].lock().expect("pool mutex poisoned");

        if let Some(mut slot) = shard.returned.pop() {
            slot.value = Some(value);
            self.live_count.fetch_add(1, Ordering::SeqCst);
            return GlobalPoolGuard { pool: self, shard_idx, slot: Some(slot) };
        }

        let within_budget = match T::MAX_OBJECT_NUM {
            Some(max) => self.live_count.load(Ordering::Relaxed) < max,
            None => true,
        };

        let need_free_to_system = if within_budget {
            let current_has_room = shard
                .chunks
                .last()
                .map(|c| c.slots.len() < c.slots.capacity())
                .unwrap_or(false);
            if !current_has_room {
                let size = super::slot::chunk_size::<T>();
                let id = shard.next_chunk_id;
                shard.next_chunk_id += 1;
                shard.chunks.push(Chunk { id, slots: Vec::with_capacity(size) });
            }
            false
        } else {
            true
        };

        self.live_count.fetch_add(1, Ordering::SeqCst);
        let slot = Slot::new(value, 0, shard_idx as u32, need_free_to_system);
        GlobalPoolGuard { pool: self, shard_idx, slot: Some(slot) }
    }

    fn deallocate(&self, shard_idx: usize, mut slot: Slot<T>) {
        self.live_count.fetch_sub(1, Ordering::SeqCst);
        slot.value = None;

        if slot.need_free_to_system {
            return;
        }

        let mut shard = self.shards[shard_idx].lock().expect("pool mutex poisoned");
        shard.returned.push(slot);

        let max_free = max_free_num::<T>();
        if shard.returned.len() > max_free {
            let excess = shard.returned.len() - max_free;
            if let Some(chunk) = shard.chunks.last_mut() {
                for _ in 0..excess {
                    if let Some(s) = shard.returned.pop() {
                        chunk.slots.push(s);
                    }
                }
            } else {
                shard.returned.truncate(max_free);
            }
        }
    }
}

/// RAII handle returned by [`GlobalPool::allocate`].
pub struct GlobalPoolGuard<'p, T: Poolable + Send> {
    pool: &'p GlobalPool<T>,
    shard_idx: usize,
    slot: Option<Slot<T>>,
}

impl<'p, T: Poolable + Send> std::ops::Deref for GlobalPoolGuard<'p, T> {
    type Target = T;
    fn deref(&self) -> &T {
        self.slot.as_ref().unwrap().value.as_ref().unwrap()
    }
}

impl<'p, T: Poolable + Send> std::ops::DerefMut for GlobalPoolGuard<'p, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.slot.as_mut().unwrap().value.as_mut().unwrap()
    }
}

impl<'p, T: Poolable + Send> Drop for GlobalPoolGuard<'p, T> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.pool.deallocate(self.shard_idx, slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    impl Poolable for u32 {
        const MAX_FREE: usize = 8;
    }

    #[test]
    fn allocate_then_drop_recycles_without_leaking() {
        let pool = GlobalPool::<u32>::new();
        for i in 0..500u32 {
            let guard = pool.allocate(i);
            assert_eq!(*guard, i);
        }
        assert_eq!(pool.live_count(), 0);
    }

    #[test]
    fn returned_free_list_is_bounded_by_max_free_num() {
        let pool = GlobalPool::<u32>::new();
        let max_free = max_free_num::<u32>();

        let guards: Vec<_> = (0..(max_free as u32 + 200)).map(|i| pool.allocate(i)).collect();
        let shard_idx = guards[0].shard_idx;
        drop(guards);

        let shard = pool.shards[shard_idx].lock().unwrap();
        assert!(shard.returned.len() <= max_free, "returned free list must stay bounded by max_free_num");
    }

    #[test]
    fn concurrent_use_from_many_threads_is_leak_free() {
        use std::sync::Arc;

        let pool = Arc::new(GlobalPool::<u32>::new());
        let mut handles = Vec::new();
        for t in 0..8u32 {
            let pool = pool.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..200u32 {
                    let guard = pool.allocate(t * 1000 + i);
                    assert_eq!(*guard, t * 1000 + i);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(pool.live_count(), 0);
    }
}
