//! Fixed-window limiter sharded over `window_size` one-second buckets.
//!
//! A line-faithful port of `seconds_limiter.cc`'s double-checked-locking
//! bucket reset: on the exact second boundary, two threads may both
//! observe a stale bucket and contend for the mutex; the second one
//! observes the reset already happened and does not reset again.

use super::flow_controller::FlowController;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

const DEFAULT_WINDOW_SIZE: i32 = 10;

struct SecondsCounter {
    count: AtomicI64,
    access_timestamp: AtomicI64,
}

/// Fixed-window (sharded) flow controller.
///
/// `limit` admits up to `limit` requests per wall-clock second;
/// `window_size` buckets are indexed by `now_s % window_size`, spreading
/// contention across seconds so that concurrent callers in the same
/// second only contend on one bucket's reset, not a single global counter.
pub struct SecondsLimiter {
    limit: i64,
    is_report: bool,
    window_size: i32,
    counters: Vec<SecondsCounter>,
    reset_lock: Mutex<()>,
}

impl SecondsLimiter {
    pub fn new(limit: i64, is_report: bool, window_size: i32) -> Self {
        let window_size = if window_size <= 0 { DEFAULT_WINDOW_SIZE } else { window_size };
        let counters = (0..window_size)
            .map(|_| SecondsCounter { count: AtomicI64::new(0), access_timestamp: AtomicI64::new(0) })
            .collect();

        SecondsLimiter { limit, is_report, window_size, counters, reset_lock: Mutex::new(()) }
    }

    fn now_s(&self) -> i64 {
        SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_secs() as i64
    }
}

impl FlowController for SecondsLimiter {
    fn check_limit(&self) -> bool {
        let now_s = self.now_s();
        let bucket = (now_s % self.window_size as i64) as usize;
        let counter = &self.counters[bucket];

        let access = counter.access_timestamp.load(Ordering::Relaxed);
        if access != now_s {
            let _guard = self.reset_lock.lock().expect("seconds limiter mutex poisoned");
            let access = counter.access_timestamp.load(Ordering::Acquire);
            if access != now_s {
                counter.count.fetch_and(0, Ordering::Relaxed);
                counter.access_timestamp.store(now_s, Ordering::Release);
            }
        }

        let result = counter.count.fetch_add(1, Ordering::Relaxed);
        let reject = (result + 1) > self.limit;

        if self.is_report {
            tracing::debug!(
                target: "overload_control",
                limiter = "seconds",
                current = result + 1,
                max = self.limit,
                window_size = self.window_size,
                admitted = !reject,
                "flow controller decision"
            );
        }

        !reject
    }

    fn current_count(&self) -> i64 {
        let now_s = self.now_s();
        let bucket = (now_s % self.window_size as i64) as usize;
        let counter = &self.counters[bucket];

        if counter.access_timestamp.load(Ordering::Relaxed) != now_s {
            return 0;
        }
        counter.count.load(Ordering::Relaxed)
    }

    fn max_count(&self) -> i64 {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    // S1: limit=3, window=10; issue 4 calls at t=0 -> [false,false,false,true]
    // (inverted here: admit=[true,true,true,false]); GetCurrCounter()==3.
    #[test]
    fn s1_seconds_limiter_admits_exactly_limit_then_rejects() {
        let limiter = SecondsLimiter::new(3, false, 10);

        let results: Vec<bool> = (0..4).map(|_| limiter.check_limit()).collect();
        assert_eq!(results, vec![true, true, true, false]);
        assert_eq!(limiter.current_count(), 3);
    }

    #[test]
    fn window_size_clamps_to_default_when_non_positive() {
        let limiter = SecondsLimiter::new(5, false, 0);
        assert_eq!(limiter.counters.len(), DEFAULT_WINDOW_SIZE as usize);

        let limiter = SecondsLimiter::new(5, false, -3);
        assert_eq!(limiter.counters.len(), DEFAULT_WINDOW_SIZE as usize);
    }

    #[test]
    fn stale_bucket_reports_zero_current_count() {
        let limiter = SecondsLimiter::new(10, false, 10);
        // No check_limit call yet this second in this bucket: timestamp is
        // still the zero-initialized default, which never equals now_s.
        assert_eq!(limiter.current_count(), 0);
    }

    #[test]
    fn concurrent_admits_on_rollover_do_not_double_reset() {
        // Exercise the double-checked-lock path under contention: many
        // threads hammering check_limit should never see more admits than
        // `limit` within one second, which would indicate the bucket was
        // reset twice (undercounting).
        let limiter = Arc::new(SecondsLimiter::new(50, false, 10));
        let mut handles = Vec::new();
        for _ in 0..16 {
            let limiter = limiter.clone();
            handles.push(thread::spawn(move || {
                (0..100).filter(|_| limiter.check_limit()).count()
            }));
        }

        let total_admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert!(total_admitted <= 50, "admitted {total_admitted} exceeds limit of 50");
    }

    #[test]
    fn max_count_returns_configured_limit() {
        let limiter = SecondsLimiter::new(42, false, 10);
        assert_eq!(limiter.max_count(), 42);
    }
}
