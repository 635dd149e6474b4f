//! Five-level hierarchical timing wheel for request-timeout tracking.
//!
//! A line-faithful port of the cascading timing wheel used by the
//! connection-pool client to track one in-flight request's deadline per
//! connection. The C++ original links `TimerNode`s into intrusive raw
//! doubly-linked lists and casts from link pointer back to owning node via
//! `offsetof`. Rust has no safe equivalent of that cast, so nodes live in
//! an arena (`Vec<Option<Node<D>>>`) and links are arena indices instead of
//! pointers — the one place this port deliberately diverges from a literal
//! translation, since the rest of the ecosystem's slot-table code (seen
//! across the pack' object-pool-shaped examples) consistently reaches for
//! index-linked arenas over intrusive pointers.

const FIRST_LEVEL_BITS: u32 = 10;
const SECOND_LEVEL_BITS: u32 = 6;
const THIRD_LEVEL_BITS: u32 = 6;
const FOURTH_LEVEL_BITS: u32 = 6;
const FIFTH_LEVEL_BITS: u32 = 4;

const FIRST_LEVEL_SIZE: usize = 1 << FIRST_LEVEL_BITS;
const SECOND_LEVEL_SIZE: usize = 1 << SECOND_LEVEL_BITS;
const THIRD_LEVEL_SIZE: usize = 1 << THIRD_LEVEL_BITS;
const FOURTH_LEVEL_SIZE: usize = 1 << FOURTH_LEVEL_BITS;
const FIFTH_LEVEL_SIZE: usize = 1 << FIFTH_LEVEL_BITS;

const FIRST_LEVEL_MASK: u64 = (FIRST_LEVEL_SIZE - 1) as u64;
const SECOND_LEVEL_MASK: u64 = (SECOND_LEVEL_SIZE - 1) as u64;
const THIRD_LEVEL_MASK: u64 = (THIRD_LEVEL_SIZE - 1) as u64;
const FOURTH_LEVEL_MASK: u64 = (FOURTH_LEVEL_SIZE - 1) as u64;
const FIFTH_LEVEL_MASK: u64 = (FIFTH_LEVEL_SIZE - 1) as u64;

type NodeIdx = usize;

struct Node<D> {
    expire_time_ms: u64,
    data: D,
    prev: NodeIdx,
    next: NodeIdx,
    /// Index of the bucket list this node currently lives in, or
    /// `usize::MAX` if it has been removed but not yet reclaimed (never
    /// observable outside this module).
    bucket: BucketRef,
}

/// Identifies one of the five levels' bucket arrays, to let a node be
/// unlinked from whichever bucket list currently holds it.
#[derive(Clone, Copy, PartialEq, Eq)]
enum BucketRef {
    L1(usize),
    L2(usize),
    L3(usize),
    L4(usize),
    L5(usize),
}

/// Opaque handle returned by [`TimingWheel::add`]. Callers hold this to
/// later call [`TimingWheel::delete`]; it does not borrow the wheel.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TimerHandle(NodeIdx);

/// A circular doubly-linked bucket: head index into the arena, or `None`
/// when empty. Nodes form a ring via `prev`/`next` arena indices; there is
/// no sentinel node (unlike the C++ original's `TimerLinkEntry` head),
/// since `Option<NodeIdx>` already expresses "empty" without one.
#[derive(Clone, Copy)]
struct Bucket {
    head: Option<NodeIdx>,
}

impl Bucket {
    const fn empty() -> Self {
        Bucket { head: None }
    }
}

/// Hierarchical timing wheel with levels sized `{1024, 64, 64, 64, 16}`.
pub struct TimingWheel<D> {
    nodes: Vec<Option<Node<D>>>,
    free_indices: Vec<NodeIdx>,
    last_expire_time_ms: u64,
    l1: [Bucket; FIRST_LEVEL_SIZE],
    l2: [Bucket; SECOND_LEVEL_SIZE],
    l3: [Bucket; THIRD_LEVEL_SIZE],
    l4: [Bucket; FOURTH_LEVEL_SIZE],
    l5: [Bucket; FIFTH_LEVEL_SIZE],
}

impl<D> TimingWheel<D> {
    pub fn new(now_ms: u64) -> Self {
        TimingWheel {
            nodes: Vec::new(),
            free_indices: Vec::new(),
            last_expire_time_ms: now_ms,
            l1: [Bucket::empty(); FIRST_LEVEL_SIZE],
            l2: [Bucket::empty(); SECOND_LEVEL_SIZE],
            l3: [Bucket::empty(); THIRD_LEVEL_SIZE],
            l4: [Bucket::empty(); FOURTH_LEVEL_SIZE],
            l5: [Bucket::empty(); FIFTH_LEVEL_SIZE],
        }
    }

    /// Adds a node expiring at `expire_time_ms`, carrying `data` (the
    /// client's send-queue iterator/index in the original; here, any
    /// caller-chosen payload). O(1).
    pub fn add(&mut self, expire_time_ms: u64, data: D) -> TimerHandle {
        let idx = self.alloc_node(expire_time_ms, data);
        self.link_into_level(idx);
        TimerHandle(idx)
    }

    /// Unlinks and reclaims a node. O(1).
    pub fn delete(&mut self, handle: TimerHandle) -> Option<D> {
        let idx = handle.0;
        self.unlink(idx);
        let node = self.nodes[idx].take()?;
        self.free_indices.push(idx);
        Some(node.data)
    }

    /// Advances time to `now_ms` one millisecond at a time, invoking
    /// `timeout_handle` for every node that expires, in non-decreasing
    /// expire-time order. No-op if `now_ms <= last_expire_time_ms`.
    pub fn do_timeout(&mut self, now_ms: u64, mut timeout_handle: impl FnMut(D)) -> bool {
        let mut fired_any = false;

        while now_ms >= self.last_expire_time_ms {
            let index = (self.last_expire_time_ms & FIRST_LEVEL_MASK) as usize;

            if index == 0 {
                let idx2 = ((self.last_expire_time_ms >> FIRST_LEVEL_BITS) & SECOND_LEVEL_MASK) as usize;
                self.cascade_level(2, idx2);

                if idx2 == 0 {
                    let idx3 = ((self.last_expire_time_ms >> (FIRST_LEVEL_BITS + SECOND_LEVEL_BITS))
                        & THIRD_LEVEL_MASK) as usize;
                    self.cascade_level(3, idx3);

                    if idx3 == 0 {
                        let idx4 = ((self.last_expire_time_ms
                            >> (FIRST_LEVEL_BITS + SECOND_LEVEL_BITS + THIRD_LEVEL_BITS))
                            & FOURTH_LEVEL_MASK) as usize;
                        self.cascade_level(4, idx4);

                        if idx4 == 0 {
                            let idx5 = ((self.last_expire_time_ms
                                >> (FIRST_LEVEL_BITS + SECOND_LEVEL_BITS + THIRD_LEVEL_BITS + FOURTH_LEVEL_BITS))
                                & FIFTH_LEVEL_MASK) as usize;
                            self.cascade_level(5, idx5);
                        }
                    }
                }
            }

            let mut cursor = self.l1[index].head;
            self.l1[index].head = None;

            while let Some(node_idx) = cursor {
                fired_any = true;
                let next = self.nodes[node_idx].as_ref().unwrap().next;
                let next = if next == node_idx { None } else { Some(next) };

                let node = self.nodes[node_idx].take().expect("node present while linked");
                self.free_indices.push(node_idx);
                timeout_handle(node.data);

                cursor = next;
            }

            self.last_expire_time_ms += 1;
        }

        fired_any
    }

    fn alloc_node(&mut self, expire_time_ms: u64, data: D) -> NodeIdx {
        let node = Node { expire_time_ms, data, prev: 0, next: 0, bucket: BucketRef::L1(0) };
        if let Some(idx) = self.free_indices.pop() {
            self.nodes[idx] = Some(node);
            idx
        } else {
            self.nodes.push(Some(node));
            self.nodes.len() - 1
        }
    }

    fn link_into_level(&mut self, idx: NodeIdx) {
        let expire = self.nodes[idx].as_ref().unwrap().expire_time_ms;
        let due = expire as i128 - self.last_expire_time_ms as i128;

        let bucket_ref = if due < 0 {
            BucketRef::L1((self.last_expire_time_ms & FIRST_LEVEL_MASK) as usize)
        } else if due < FIRST_LEVEL_SIZE as i128 {
            BucketRef::L1((expire & FIRST_LEVEL_MASK) as usize)
        } else if due < (1i128 << (FIRST_LEVEL_BITS + SECOND_LEVEL_BITS)) {
            BucketRef::L2(((expire >> FIRST_LEVEL_BITS) & SECOND_LEVEL_MASK) as usize)
        } else if due < (1i128 << (FIRST_LEVEL_BITS + SECOND_LEVEL_BITS + THIRD_LEVEL_BITS)) {
            BucketRef::L3(((expire >> (FIRST_LEVEL_BITS + SECOND_LEVEL_BITS)) & THIRD_LEVEL_MASK) as usize)
        } else if due
            < (1i128 << (FIRST_LEVEL_BITS + SECOND_LEVEL_BITS + THIRD_LEVEL_BITS + FOURTH_LEVEL_BITS))
        {
            BucketRef::L4(
                ((expire >> (FIRST_LEVEL_BITS + SECOND_LEVEL_BITS + THIRD_LEVEL_BITS)) & FOURTH_LEVEL_MASK)
                    as usize,
            )
        } else {
            BucketRef::L5(
                ((expire
                    >> (FIRST_LEVEL_BITS + SECOND_LEVEL_BITS + THIRD_LEVEL_BITS + FOURTH_LEVEL_BITS))
                    & FIFTH_LEVEL_MASK) as usize,
            )
        };

        self.insert_tail(bucket_ref, idx);
        self.nodes[idx].as_mut().unwrap().bucket = bucket_ref;
    }

    fn bucket_mut(&mut self, r: BucketRef) -> &mut Bucket {
        match r {
            BucketRef::L1(i) => &mut self.l1[i],
            BucketRef::L2(i) => &mut self.l2[i],
            BucketRef::L3(i) => &mut self.l3[i],
            BucketRef::L4(i) => &mut self.l4[i],
            BucketRef::L5(i) => &mut self.l5[i],
        }
    }

    fn insert_tail(&mut self, bucket_ref: BucketRef, idx: NodeIdx) {
        let bucket = self.bucket_mut(bucket_ref);
        match bucket.head {
            None => {
                bucket.head = Some(idx);
                let node = self.nodes[idx].as_mut().unwrap();
                node.prev = idx;
                node.next = idx;
            }
            Some(head) => {
                let tail = self.nodes[head].as_ref().unwrap().prev;
                self.nodes[tail].as_mut().unwrap().next = idx;
                self.nodes[head].as_mut().unwrap().prev = idx;
                let node = self.nodes[idx].as_mut().unwrap();
                node.prev = tail;
                node.next = head;
            }
        }
    }

    fn unlink(&mut self, idx: NodeIdx) {
        let Some(node) = self.nodes[idx].as_ref() else { return };
        let (prev, next, bucket_ref) = (node.prev, node.next, node.bucket);

        if prev == idx {
            // Sole element in its bucket.
            self.bucket_mut(bucket_ref).head = None;
            return;
        }

        self.nodes[prev].as_mut().unwrap().next = next;
        self.nodes[next].as_mut().unwrap().prev = prev;

        let bucket = self.bucket_mut(bucket_ref);
        if bucket.head == Some(idx) {
            bucket.head = Some(next);
        }
    }

    /// Drains bucket `index` at level `level` and reinserts every node
    /// into its correctly-sized lower-level bucket. Returns the bare
    /// `index` parameter, mirroring the C++ `Cascade`'s return value — the
    /// decision on whether to cascade the *next* level up is made by the
    /// caller comparing that same index against zero (has this level
    /// wrapped), never by whether this call found anything to move.
    fn cascade_level(&mut self, level: u8, index: usize) -> usize {
        let bucket_ref = match level {
            2 => BucketRef::L2(index),
            3 => BucketRef::L3(index),
            4 => BucketRef::L4(index),
            5 => BucketRef::L5(index),
            _ => unreachable!("cascade only ever targets levels 2-5"),
        };

        let bucket = self.bucket_mut(bucket_ref);
        let Some(head) = bucket.head.take() else { return index };

        let mut collected = Vec::new();
        let mut cursor = head;
        loop {
            let next = self.nodes[cursor].as_ref().unwrap().next;
            collected.push(cursor);
            if next == head {
                break;
            }
            cursor = next;
        }

        for idx in &collected {
            self.link_into_level(*idx);
        }

        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_delete_round_trips_payload() {
        let mut wheel = TimingWheel::<&'static str>::new(0);
        let handle = wheel.add(500, "hello");
        assert_eq!(wheel.delete(handle), Some("hello"));
        assert_eq!(wheel.delete(handle), None, "deleting twice is a no-op");
    }

    #[test]
    fn no_op_when_now_does_not_advance() {
        let mut wheel = TimingWheel::<u32>::new(100);
        let mut fired = Vec::new();
        assert!(!wheel.do_timeout(50, |d| fired.push(d)));
        assert!(fired.is_empty());
    }

    // Property 6 / scenario S6: at t=0, nodes expiring at 1, 1023, 1024,
    // 65600; DoTimeout(1023) fires the first two in order;
    // DoTimeout(65600) fires the remaining two in order.
    #[test]
    fn s6_ordering_across_cascades() {
        let mut wheel = TimingWheel::<u32>::new(0);
        wheel.add(1, 1);
        wheel.add(1023, 2);
        wheel.add(1024, 3);
        wheel.add(65600, 4);

        let mut fired = Vec::new();
        wheel.do_timeout(1023, |d| fired.push(d));
        assert_eq!(fired, vec![1, 2]);

        fired.clear();
        wheel.do_timeout(65600, |d| fired.push(d));
        assert_eq!(fired, vec![3, 4]);
    }

    #[test]
    fn nodes_fire_in_non_decreasing_expire_time_order_for_arbitrary_interleaving() {
        let mut wheel = TimingWheel::<u32>::new(0);
        let expires = [5u64, 2, 2000, 70_000, 1, 100_000];
        for (i, &e) in expires.iter().enumerate() {
            wheel.add(e, i as u32);
        }

        let mut fired = Vec::new();
        wheel.do_timeout(200_000, |d| fired.push(d));

        let mut expected: Vec<(u64, u32)> =
            expires.iter().enumerate().map(|(i, &e)| (e, i as u32)).collect();
        expected.sort_by_key(|(e, _)| *e);
        let expected_order: Vec<u32> = expected.into_iter().map(|(_, i)| i).collect();

        assert_eq!(fired, expected_order);
    }

    #[test]
    fn degenerate_bucket_for_expiry_before_last_expire_time() {
        let mut wheel = TimingWheel::<u32>::new(1000);
        // Expires in the past relative to the wheel's current time: must
        // still fire, on the very next tick.
        wheel.add(1, 99);

        let mut fired = Vec::new();
        wheel.do_timeout(1000, |d| fired.push(d));
        assert_eq!(fired, vec![99]);
    }

    // Regression for a cascade-chain bug: cascading level 3 (and beyond)
    // must be gated on level 2's *index* having wrapped to zero, not on
    // whether level 2's bucket happened to have anything in it. Node `2`
    // is engineered to occupy L2 bucket 0 at the moment L2 wraps; node `1`
    // sits in L3 and can only reach L1 by a level-3 cascade firing at that
    // same tick. A cascade gated on bucket occupancy skips the level-3
    // cascade here (L2's bucket wasn't empty) and node `1` never migrates
    // down in time, firing far later than its expiry (or not at all within
    // this test's horizon) instead of at t=70000.
    #[test]
    fn cascade_to_next_level_runs_even_when_the_lower_level_bucket_is_nonempty() {
        let mut wheel = TimingWheel::<u32>::new(0);
        wheel.add(70_000, 1);

        let mut fired = Vec::new();
        wheel.do_timeout(1000, |d| fired.push(d));
        assert!(fired.is_empty());

        wheel.add(66_000, 2);

        wheel.do_timeout(100_000, |d| fired.push(d));
        assert_eq!(fired, vec![2, 1]);
    }

    #[test]
    fn delete_before_expiry_prevents_callback() {
        let mut wheel = TimingWheel::<u32>::new(0);
        let handle = wheel.add(10, 7);
        wheel.delete(handle);

        let mut fired = Vec::new();
        wheel.do_timeout(100, |d| fired.push(d));
        assert!(fired.is_empty());
    }
}
