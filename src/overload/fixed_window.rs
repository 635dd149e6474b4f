//! Fixed-window limiter: a thin wrapper over [`SecondsLimiter`] with a
//! single bucket, exactly as the data model describes it.

use super::flow_controller::FlowController;
use super::seconds_limiter::SecondsLimiter;

pub struct FixedWindowLimiter {
    inner: SecondsLimiter,
}

impl FixedWindowLimiter {
    pub fn new(limit: i64, is_report: bool) -> Self {
        FixedWindowLimiter { inner: SecondsLimiter::new(limit, is_report, 1) }
    }
}

impl FlowController for FixedWindowLimiter {
    fn check_limit(&self) -> bool {
        self.inner.check_limit()
    }

    fn current_count(&self) -> i64 {
        self.inner.current_count()
    }

    fn max_count(&self) -> i64 {
        self.inner.max_count()
    }
}
