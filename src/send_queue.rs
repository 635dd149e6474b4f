//! Shared send queue used by a connection-pool client: one pending
//! message slot per connection, with an associated timing-wheel deadline.
//! Capacity-1 `ArrayQueue` slots, grounded in the teacher's own
//! `crossbeam::queue` usage (`SegQueue` for the stream/error queues in
//! `server_impl.rs`) — `ArrayQueue` here because each slot is genuinely
//! single-item, unlike the unbounded accept queues.

use crate::timing_wheel::{TimerHandle, TimingWheel};
use crossbeam::queue::ArrayQueue;

/// One pending-message slot per connection id within a pool.
pub struct SharedSendQueue<M> {
    slots: Vec<ArrayQueue<(M, TimerHandle)>>,
}

impl<M> SharedSendQueue<M> {
    pub fn new(capacity: usize) -> Self {
        SharedSendQueue { slots: (0..capacity).map(|_| ArrayQueue::new(1)).collect() }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Registers `message` as pending on `index`'s slot with a deadline of
    /// `expire_time_ms`, returning the message back on `Err` if the slot
    /// already holds a pending message (a connection can have only one
    /// outstanding send at a time).
    pub fn push(&self, index: usize, message: M, wheel: &mut TimingWheel<usize>, expire_time_ms: u64) -> Result<(), M> {
        let handle = wheel.add(expire_time_ms, index);
        match self.slots[index].push((message, handle)) {
            Ok(()) => Ok(()),
            Err((message, handle)) => {
                wheel.delete(handle);
                Err(message)
            }
        }
    }

    /// Takes the pending message for `index`, if any, cancelling its
    /// timing-wheel deadline since it was served in time.
    pub fn pop(&self, index: usize, wheel: &mut TimingWheel<usize>) -> Option<M> {
        let (message, handle) = self.slots[index].pop()?;
        wheel.delete(handle);
        Some(message)
    }

    /// Drains every slot whose deadline has passed as of `now_ms`,
    /// delegating the cascade-and-fire algorithm to the timing wheel.
    /// Returns the indices that timed out, each already popped from its
    /// slot (the message itself, if the caller needs it for an error
    /// response, is discarded here since this path means no response
    /// arrived in time).
    pub fn do_timeout(&self, now_ms: u64, wheel: &mut TimingWheel<usize>) -> Vec<usize> {
        let mut timed_out = Vec::new();
        wheel.do_timeout(now_ms, |index| timed_out.push(index));
        for &index in &timed_out {
            self.slots[index].pop();
        }
        timed_out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_then_pop_round_trips_and_clears_the_timer() {
        let queue: SharedSendQueue<&'static str> = SharedSendQueue::new(4);
        let mut wheel = TimingWheel::new(0);

        queue.push(2, "hello", &mut wheel, 100).unwrap();
        let popped = queue.pop(2, &mut wheel);
        assert_eq!(popped, Some("hello"));
        assert_eq!(queue.pop(2, &mut wheel), None);
    }

    #[test]
    fn second_push_to_an_occupied_slot_is_rejected() {
        let queue: SharedSendQueue<&'static str> = SharedSendQueue::new(4);
        let mut wheel = TimingWheel::new(0);

        queue.push(0, "first", &mut wheel, 100).unwrap();
        let result = queue.push(0, "second", &mut wheel, 100);
        assert_eq!(result, Err("second"));
    }

    #[test]
    fn do_timeout_drains_expired_slots() {
        let queue: SharedSendQueue<&'static str> = SharedSendQueue::new(4);
        let mut wheel = TimingWheel::new(0);

        queue.push(1, "late", &mut wheel, 50).unwrap();
        let timed_out = queue.do_timeout(100, &mut wheel);

        assert_eq!(timed_out, vec![1]);
        assert_eq!(queue.pop(1, &mut wheel), None);
    }
}
