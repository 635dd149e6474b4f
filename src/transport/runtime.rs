//! Backend runtime construction: DEFAULT (reactor-thread pool) vs FIBER
//! (cooperative task-per-scheduling-group).
//!
//! The two backends differ in how a `BindAdapter`'s worker tasks are
//! scheduled, not in anything about the transport/protocol/overload-control
//! surface above them — a `tokio::runtime::Runtime` built by
//! [`build_default`] and a scheduling-group runtime built by
//! [`fiber::build_scheduling_group`] both drive the exact same
//! `BindAdapter::serve` accept loop.

use std::io;
use tokio::runtime::Runtime;

/// Builds the DEFAULT backend: one OS-thread-per-core multi-threaded
/// runtime, matching the teacher's own `#[tokio::main]`/`Runtime::new`
/// convention (`server/server_impl.rs`'s `ServerBuilder::run`).
pub fn build_default(worker_threads: usize) -> io::Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads.max(1))
        .enable_all()
        .build()
}

/// FIBER backend: one single-threaded runtime per scheduling group, with
/// tasks pinned to a `LocalSet` rather than load-balanced across worker
/// threads. Models FIBER's cooperative M:N user-space scheduler without
/// reimplementing an actual M:N scheduler — each "scheduling group" here is
/// one OS thread running one `LocalSet`, which is as close as a
/// `current_thread` tokio runtime gets to FIBER's single-thread-owns-its-
/// tasks scheduling discipline.
#[cfg(feature = "fiber")]
pub mod fiber {
    use std::io;
    use tokio::runtime::Runtime;
    use tokio::task::LocalSet;

    /// A single scheduling group: one `current_thread` runtime plus the
    /// `LocalSet` its non-`Send` tasks are pinned to.
    pub struct SchedulingGroup {
        pub runtime: Runtime,
        pub local_set: LocalSet,
    }

    pub fn build_scheduling_group() -> io::Result<SchedulingGroup> {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
        Ok(SchedulingGroup { runtime, local_set: LocalSet::new() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_backend_runs_a_task() {
        let runtime = build_default(2).unwrap();
        let result = runtime.block_on(async { 1 + 1 });
        assert_eq!(result, 2);
    }

    #[cfg(feature = "fiber")]
    #[test]
    fn fiber_backend_runs_a_local_task() {
        let group = fiber::build_scheduling_group().unwrap();
        let result = group.local_set.block_on(&group.runtime, async {
            let local = tokio::task::spawn_local(async { 1 + 1 });
            local.await.unwrap()
        });
        assert_eq!(result, 2);
    }
}
