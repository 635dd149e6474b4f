//! Sliding-window limiter: a circular array of cells advanced by a tick,
//! rather than fixed one-second buckets.
//!
//! Ported from `smooth_limiter.h`'s `SmoothLimiter`/`OnNextFrame`/
//! `TickTimer` trio, generalized from the original's bespoke tick-timer
//! class to a plain `tokio::time::interval` task (the fiber-runtime timer
//! internals it otherwise relies on are out of scope per the purpose and
//! scope section).

use super::flow_controller::FlowController;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

/// Default number of time-frames (cells) per second.
pub const DEFAULT_NUM_FRAMES: usize = 100;

/// Sliding-window flow controller.
pub struct SmoothLimiter {
    limit: i64,
    is_report: bool,
    window_size: usize,
    cells: Vec<AtomicI64>,
    current_index: AtomicUsize,
}

impl SmoothLimiter {
    pub fn new(limit: i64, is_report: bool, window_size: usize) -> Self {
        let window_size = if window_size == 0 { DEFAULT_NUM_FRAMES } else { window_size };
        SmoothLimiter {
            limit,
            is_report,
            window_size,
            cells: (0..window_size).map(|_| AtomicI64::new(0)).collect(),
            current_index: AtomicUsize::new(0),
        }
    }

    /// The period between ticks for this limiter's configured granularity
    /// (`1 / window_size` seconds).
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs(1) / self.window_size as u32
    }

    /// Advances the window by one cell, as if called by the limiter's own
    /// `tokio::time::interval` tick task. The newly-entered cell is zeroed
    /// with `Release` ordering *before* the index publishing store, so a
    /// concurrent reader that observes the new index via `Acquire` never
    /// sees the cell's prior-cycle count.
    pub fn on_next_frame(&self) {
        let current = self.current_index.load(Ordering::Relaxed);
        let next = (current + 1) % self.window_size;
        self.cells[next].store(0, Ordering::Release);
        self.current_index.store(next, Ordering::Release);
    }

    /// Spawns the single tick task driving this limiter's window, per
    /// cell-sharing instance (`Arc` so the task outlives the caller's
    /// reference). Returns the task handle so a caller may abort it.
    #[cfg(feature = "overload-control")]
    pub fn spawn_ticker(self: std::sync::Arc<Self>) -> tokio::task::JoinHandle<()> {
        let period = self.tick_period();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                self.on_next_frame();
            }
        })
    }
}

impl FlowController for SmoothLimiter {
    fn check_limit(&self) -> bool {
        let index = self.current_index.load(Ordering::Acquire);
        self.cells[index].fetch_add(1, Ordering::Relaxed);

        let total: i64 = self.cells.iter().map(|c| c.load(Ordering::Relaxed)).sum();
        let admit = total <= self.limit;

        if self.is_report {
            tracing::debug!(
                target: "overload_control",
                limiter = "smooth",
                current = total,
                max = self.limit,
                window_size = self.window_size,
                admitted = admit,
                "flow controller decision"
            );
        }

        admit
    }

    fn current_count(&self) -> i64 {
        self.cells.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }

    fn max_count(&self) -> i64 {
        self.limit
    }
}
