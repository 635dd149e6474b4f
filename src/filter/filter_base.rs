//! Filter trait: cross-cutting plugin hooks fired at fixed [`FilterPoint`]s.

use super::filter_id::next_filter_id;
use super::filter_point::FilterPoint;

/// Outcome of running a filter chain at one point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStatus {
    /// Continue to the next filter in the chain.
    Continue,
    /// Interrupt the execution of the filter chain; the handler invocation
    /// for this request is skipped.
    Reject,
}

/// A cross-cutting plugin hook invoked at one or more [`FilterPoint`]s.
///
/// `Args` plays the role of the C++ template parameter pack on
/// `trpc::Filter<Args...>`: a filter's `invoke` receives whatever payload
/// is meaningful at the points it subscribes to.
pub trait Filter<Args>: Send + Sync {
    /// Human-readable name, used in logs and diagnostics.
    fn name(&self) -> &str;

    /// Points at which this filter should run.
    fn filter_points(&self) -> &[FilterPoint];

    /// Runs the filter. Implementations set `status` to
    /// [`FilterStatus::Reject`] to short-circuit the chain.
    fn invoke(&self, status: &mut FilterStatus, point: FilterPoint, args: Args);

    /// The filter's process-unique id, allocated once at construction time
    /// via [`next_filter_id`]. Implementations should store this in a field
    /// populated by [`FilterIdAllocator::default`] rather than recomputing
    /// it, matching the C++ base class's constructor-time allocation.
    fn filter_id(&self) -> u16;
}

/// Embeds a process-unique filter id, allocated once on construction.
///
/// Concrete filters should hold one of these and delegate `filter_id()` to
/// it, mirroring `trpc::Filter`'s constructor-allocated `filter_id_` field.
#[derive(Debug)]
pub struct FilterIdAllocator(u16);

impl Default for FilterIdAllocator {
    #[inline]
    fn default() -> Self {
        FilterIdAllocator(next_filter_id())
    }
}

impl FilterIdAllocator {
    #[inline]
    pub fn id(&self) -> u16 {
        self.0
    }
}

/// Runs a chain of filters at `point` in insertion order, stopping (but not
/// unwinding past) the first [`FilterStatus::Reject`].
///
/// Returns the resulting status: `Continue` if every filter in the chain
/// ran to completion, `Reject` otherwise.
pub fn run_chain<Args: Clone>(
    filters: &[Box<dyn Filter<Args>>],
    point: FilterPoint,
    args: Args,
) -> FilterStatus {
    let mut status = FilterStatus::Continue;
    for filter in filters {
        if !filter.filter_points().contains(&point) {
            continue;
        }
        filter.invoke(&mut status, point, args.clone());
        if status == FilterStatus::Reject {
            break;
        }
    }
    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingFilter {
        id: FilterIdAllocator,
        points: Vec<FilterPoint>,
        hits: Arc<AtomicUsize>,
        reject: bool,
    }

    impl Filter<()> for CountingFilter {
        fn name(&self) -> &str {
            "counting"
        }

        fn filter_points(&self) -> &[FilterPoint] {
            &self.points
        }

        fn invoke(&self, status: &mut FilterStatus, _point: FilterPoint, _args: ()) {
            self.hits.fetch_add(1, Ordering::SeqCst);
            if self.reject {
                *status = FilterStatus::Reject;
            }
        }

        fn filter_id(&self) -> u16 {
            self.id.id()
        }
    }

    #[test]
    fn chain_runs_in_insertion_order_until_reject() {
        let hits = Arc::new(AtomicUsize::new(0));
        let first = Box::new(CountingFilter {
            id: FilterIdAllocator::default(),
            points: vec![FilterPoint::ServerPostRecvMsg],
            hits: hits.clone(),
            reject: true,
        });
        let second = Box::new(CountingFilter {
            id: FilterIdAllocator::default(),
            points: vec![FilterPoint::ServerPostRecvMsg],
            hits: hits.clone(),
            reject: false,
        });

        let chain: Vec<Box<dyn Filter<()>>> = vec![first, second];
        let status = run_chain(&chain, FilterPoint::ServerPostRecvMsg, ());

        assert_eq!(status, FilterStatus::Reject);
        assert_eq!(hits.load(Ordering::SeqCst), 1, "second filter must not run after reject");
    }

    #[test]
    fn chain_skips_filters_not_subscribed_to_the_point() {
        let hits = Arc::new(AtomicUsize::new(0));
        let filter = Box::new(CountingFilter {
            id: FilterIdAllocator::default(),
            points: vec![FilterPoint::ServerPreRpcInvoke],
            hits: hits.clone(),
            reject: false,
        });
        let chain: Vec<Box<dyn Filter<()>>> = vec![filter];

        let status = run_chain(&chain, FilterPoint::ServerPostRecvMsg, ());

        assert_eq!(status, FilterStatus::Continue);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
