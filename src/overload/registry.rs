//! Single generic flow-controller registry, collapsing the source's
//! near-duplicate fixed-window/smooth/window-limit aggregates into one
//! name -> controller map, per the Design Notes.

use super::fixed_window::FixedWindowLimiter;
use super::flow_controller::{FlowController, FlowControllerArc};
use super::seconds_limiter::SecondsLimiter;
use super::smooth_limiter::SmoothLimiter;
use crate::error::{CoreError, CoreResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

const SHARD_COUNT: usize = 128;

/// A parsed `NAME(MAX_RPS)` limiter descriptor, per the flow-control YAML
/// schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimiterKind {
    Default,
    Seconds,
    Smooth,
}

/// Parses a limiter descriptor of the form `NAME(MAX_RPS)`.
///
/// Returns `None` for malformed descriptors (unknown name, non-numeric or
/// non-positive RPS, missing parens) — callers are expected to log an
/// error and leave the service/method unrestricted, per the overload
/// control contract.
pub fn parse_descriptor(descriptor: &str) -> Option<(LimiterKind, i64)> {
    let open = descriptor.find('(')?;
    if !descriptor.ends_with(')') {
        return None;
    }
    let name = &descriptor[..open];
    let rps_str = &descriptor[open + 1..descriptor.len() - 1];
    let rps: i64 = rps_str.parse().ok()?;
    if rps < 1 {
        return None;
    }

    let kind = match name {
        "default" => LimiterKind::Default,
        "seconds" => LimiterKind::Seconds,
        "smooth" => LimiterKind::Smooth,
        _ => return None,
    };

    Some((kind, rps))
}

fn build_controller(kind: LimiterKind, max_rps: i64, window_size: i32, is_report: bool) -> Arc<dyn FlowController> {
    match kind {
        LimiterKind::Default => Arc::new(FixedWindowLimiter::new(max_rps, is_report)),
        LimiterKind::Seconds => Arc::new(SecondsLimiter::new(max_rps, is_report, window_size)),
        LimiterKind::Smooth => Arc::new(SmoothLimiter::new(max_rps, is_report, window_size.max(0) as usize)),
    }
}

/// Global name -> controller map, sharded 128-way like the connection
/// manager, since both are registries hit on every request.
pub struct FlowControllerRegistry {
    shards: Vec<Mutex<HashMap<String, FlowControllerArc>>>,
}

impl Default for FlowControllerRegistry {
    fn default() -> Self {
        FlowControllerRegistry {
            shards: (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }
}

fn shard_index(key: &str) -> usize {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() as usize) % SHARD_COUNT
}

impl FlowControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a limiter for `key` (a service name, or
    /// `"/service/method"`) from a `NAME(MAX_RPS)` descriptor. Returns
    /// `None` and logs an error for a malformed descriptor, leaving `key`
    /// unrestricted, exactly as the overload control contract specifies.
    pub fn register(
        &self,
        key: &str,
        descriptor: &str,
        window_size: i32,
        is_report: bool,
    ) -> Option<FlowControllerArc> {
        let Some((kind, max_rps)) = parse_descriptor(descriptor) else {
            tracing::error!(target: "overload_control", key, descriptor, "malformed flow limiter descriptor");
            return None;
        };

        let controller = build_controller(kind, max_rps, window_size, is_report);
        let shard = &self.shards[shard_index(key)];
        shard.lock().expect("registry mutex poisoned").insert(key.to_string(), controller.clone());
        Some(controller)
    }

    pub fn get(&self, key: &str) -> Option<FlowControllerArc> {
        let shard = &self.shards[shard_index(key)];
        shard.lock().expect("registry mutex poisoned").get(key).cloned()
    }

    /// Two-level admission check: looks up a service-level controller by
    /// `service`, then a method-level controller by `"{service}/{method}"`;
    /// admits only if every controller found admits.
    pub fn check_admit(&self, service: &str, method: &str) -> bool {
        let service_admits = self.get(service).map(|c| c.check_limit()).unwrap_or(true);
        if !service_admits {
            return false;
        }

        let method_key = format!("{service}/{method}");
        self.get(&method_key).map(|c| c.check_limit()).unwrap_or(true)
    }
}

/// Process-wide default registry slot, for services that don't build
/// their own `FlowControllerRegistry` and instead bind against a single
/// global instance. `OnceLock` gives one-time cell allocation; the
/// `Mutex<Option<_>>` inside it gives the explicit init/shutdown lifecycle
/// a plain `OnceLock` can't express on its own (it never un-initializes).
static GLOBAL: OnceLock<Mutex<Option<Arc<FlowControllerRegistry>>>> = OnceLock::new();

fn global_cell() -> &'static Mutex<Option<Arc<FlowControllerRegistry>>> {
    GLOBAL.get_or_init(|| Mutex::new(None))
}

/// Initializes (or re-initializes) the process-wide default registry,
/// returning the instance now installed.
pub fn init_global() -> Arc<FlowControllerRegistry> {
    let mut guard = global_cell().lock().expect("global registry mutex poisoned");
    let registry = Arc::new(FlowControllerRegistry::new());
    *guard = Some(registry.clone());
    registry
}

/// Returns the process-wide default registry. `InternalInvariant` if
/// [`init_global`] was never called, or if [`shutdown_global`] tore it
/// down and nothing has re-initialized it since.
pub fn global() -> CoreResult<Arc<FlowControllerRegistry>> {
    global_cell()
        .lock()
        .expect("global registry mutex poisoned")
        .clone()
        .ok_or_else(|| CoreError::InternalInvariant("flow controller registry used before init or after shutdown".into()))
}

/// Tears down the process-wide default registry. A subsequent [`global`]
/// call returns `InternalInvariant` until [`init_global`] runs again.
pub fn shutdown_global() {
    *global_cell().lock().expect("global registry mutex poisoned") = None;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_registry_is_unavailable_before_init_and_after_shutdown() {
        shutdown_global();
        assert!(matches!(global(), Err(CoreError::InternalInvariant(_))));

        let initialized = init_global();
        assert!(Arc::ptr_eq(&initialized, &global().unwrap()));

        shutdown_global();
        assert!(matches!(global(), Err(CoreError::InternalInvariant(_))));
    }

    #[test]
    fn parses_well_formed_descriptors() {
        assert_eq!(parse_descriptor("default(2)"), Some((LimiterKind::Default, 2)));
        assert_eq!(parse_descriptor("seconds(10)"), Some((LimiterKind::Seconds, 10)));
        assert_eq!(parse_descriptor("smooth(100)"), Some((LimiterKind::Smooth, 100)));
    }

    #[test]
    fn rejects_malformed_descriptors() {
        for bad in ["bogus(2)", "default(0)", "default(-1)", "default(x)", "default", "default(2"] {
            assert_eq!(parse_descriptor(bad), None, "input: {bad:?}");
        }
    }

    // Property 10 / S1-style end-to-end: a service bound with
    // "default(2)" admits calls 1 and 2, rejects call 3, within the same
    // second.
    #[test]
    fn end_to_end_service_limiter_admits_then_rejects() {
        let registry = FlowControllerRegistry::new();
        registry.register("my.Service", "default(2)", 10, false);

        assert!(registry.check_admit("my.Service", "Method"));
        assert!(registry.check_admit("my.Service", "Method"));
        assert!(!registry.check_admit("my.Service", "Method"));
    }

    #[test]
    fn unregistered_key_is_unrestricted() {
        let registry = FlowControllerRegistry::new();
        for _ in 0..1000 {
            assert!(registry.check_admit("unknown.Service", "Method"));
        }
    }

    #[test]
    fn malformed_descriptor_leaves_key_unrestricted() {
        let registry = FlowControllerRegistry::new();
        let result = registry.register("my.Service", "nonsense", 10, false);
        assert!(result.is_none());
        assert!(registry.check_admit("my.Service", "Method"));
    }

    #[test]
    fn method_level_limiter_is_independent_of_service_level() {
        let registry = FlowControllerRegistry::new();
        registry.register("my.Service", "default(100)", 10, false);
        registry.register("my.Service/Method", "default(1)", 10, false);

        assert!(registry.check_admit("my.Service", "Method"));
        assert!(!registry.check_admit("my.Service", "Method"));
        // A different method on the same service is governed only by the
        // service-level limiter, which still has room.
        assert!(registry.check_admit("my.Service", "Other"));
    }
}
