//! Common trait every flow-limiting algorithm implements, collapsing the
//! source's several near-duplicate rate-limiter aggregates into one generic
//! abstraction, per the Design Notes.

use std::sync::Arc;

/// A rate-limit admission object registered per service or method.
///
/// **Polarity**: `check_limit` returns `true` to admit, `false` to reject —
/// the inverse of the original `CheckLimit`'s true-means-overloaded
/// convention. This is the resolved form of the open question in the
/// Design Notes ("recommend: true-on-admit"); see `DESIGN.md`.
pub trait FlowController: Send + Sync {
    /// Returns `true` if the request should be admitted, `false` if it
    /// should be rejected as overload.
    fn check_limit(&self) -> bool;

    /// The total number of requests counted in the controller's current
    /// window.
    fn current_count(&self) -> i64;

    /// The configured maximum request limit.
    fn max_count(&self) -> i64;
}

pub type FlowControllerArc = Arc<dyn FlowController>;
