//! Object pool slot: the fixed-size cell allocated and recycled by
//! [`super::local::LocalPool`] and [`super::global::GlobalPool`].

/// Selects pool tuning per type at compile time via a trait association,
/// per the data model's "two allocation strategies... selected per type".
pub trait Poolable: Sized {
    /// Upper bound on a thread's local free list length before excess
    /// slots are returned to their chunk.
    const MAX_FREE: usize = 64;

    /// Lower bound the free list is replenished toward before going empty.
    const MIN_FREE: usize = Self::MAX_FREE / 2;

    /// Global cap on live slots of this type across the whole process.
    /// `None` means unbounded.
    const MAX_OBJECT_NUM: Option<usize> = None;
}

/// A pooled cell: the stored value plus the two flag bits and linkage the
/// data model calls for.
///
/// `owner_thread` and `chunk_id` are only meaningful for the shared-nothing
/// strategy; the global strategy leaves them at their default.
pub struct Slot<T> {
    pub(crate) value: Option<T>,
    /// Set when this slot was allocated directly via the system allocator
    /// (past `MAX_OBJECT_NUM`, or as an emergency fallback) rather than
    /// from a chunk; only this path individually frees a slot.
    pub(crate) need_free_to_system: bool,
    pub(crate) owner_thread: u64,
    pub(crate) chunk_id: u32,
}

impl<T> Slot<T> {
    pub(crate) fn new(value: T, owner_thread: u64, chunk_id: u32, need_free_to_system: bool) -> Self {
        Slot {
            value: Some(value),
            need_free_to_system,
            owner_thread,
            chunk_id,
        }
    }

    #[inline]
    pub(crate) fn take(&mut self) -> T {
        self.value.take().expect("slot value already taken")
    }
}

/// A contiguous, aligned allocation of `chunk_size` slots, the bulk
/// allocation unit both pool strategies carve free lists out of.
pub(crate) struct Chunk<T> {
    pub(crate) id: u32,
    pub(crate) slots: Vec<Slot<T>>,
}

/// `chunk_size = max(8, PAGE / sizeof(slot))`, approximated with a 4 KiB
/// page and the size of `T` (never below 8 as the data model requires).
pub(crate) fn chunk_size<T>() -> usize {
    const PAGE: usize = 4096;
    let per_slot = std::mem::size_of::<T>().max(1);
    (PAGE / per_slot).max(8)
}

/// `max_free_num = max(64, 2*PAGE / sizeof(slot))`.
pub(crate) fn max_free_num<T>() -> usize {
    const PAGE: usize = 4096;
    let per_slot = std::mem::size_of::<T>().max(1);
    (2 * PAGE / per_slot).max(64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_size_is_never_below_eight() {
        assert!(chunk_size::<[u8; 8192]>() >= 8);
    }

    #[test]
    fn max_free_num_is_never_below_sixty_four() {
        assert!(max_free_num::<[u8; 8192]>() >= 64);
    }
}
