//! The overload controller as a [`Filter`], run at
//! [`FilterPoint::ServerPostRecvMsg`] per the external contract: rejecting
//! here, right after a message is framed and before RPC dispatch, means a
//! denied request never reaches a handler.

use crate::filter::filter_base::{Filter, FilterIdAllocator, FilterStatus};
use crate::filter::filter_point::FilterPoint;
use crate::overload::registry::FlowControllerRegistry;
use std::sync::Arc;

/// The service/method pair a filter invocation checks admission for.
#[derive(Debug, Clone)]
pub struct RpcTarget {
    pub service: Arc<str>,
    pub method: Arc<str>,
}

/// Runs [`FlowControllerRegistry::check_admit`] for every received
/// message, rejecting the filter chain (and thus the request) when the
/// registry says the service or method is over its configured rate.
pub struct OverloadFilter {
    id: FilterIdAllocator,
    registry: Arc<FlowControllerRegistry>,
    points: [FilterPoint; 1],
}

impl OverloadFilter {
    pub fn new(registry: Arc<FlowControllerRegistry>) -> Self {
        OverloadFilter {
            id: FilterIdAllocator::default(),
            registry,
            points: [FilterPoint::ServerPostRecvMsg],
        }
    }
}

impl Filter<RpcTarget> for OverloadFilter {
    fn name(&self) -> &str {
        "overload_control"
    }

    fn filter_points(&self) -> &[FilterPoint] {
        &self.points
    }

    fn invoke(&self, status: &mut FilterStatus, _point: FilterPoint, args: RpcTarget) {
        if !self.registry.check_admit(&args.service, &args.method) {
            tracing::warn!(
                target: "overload_control",
                service = %args.service,
                method = %args.method,
                "request rejected: over configured rate limit"
            );
            *status = FilterStatus::Reject;
        }
    }

    fn filter_id(&self) -> u16 {
        self.id.id()
    }
}
