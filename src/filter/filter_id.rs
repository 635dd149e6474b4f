//! Process-global monotonic filter id allocation.
//!
//! Ported from `filter_id_counter.cc`: ids are handed out starting at
//! 10000 and must stay below 65535 for the lifetime of the process.

use crate::error::{CoreError, CoreResult};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

const FIRST_FILTER_ID: u32 = 10000;
const MAX_FILTER_ID: u32 = 65535;

static NEXT_FILTER_ID: AtomicU32 = AtomicU32::new(FIRST_FILTER_ID);
static ACTIVE: AtomicBool = AtomicBool::new(true);

/// (Re-)activates filter id allocation after [`shutdown`]. Does not reset
/// the counter — ids already handed out stay unique for the process
/// lifetime even across a shutdown/init cycle.
pub fn init() {
    ACTIVE.store(true, Ordering::SeqCst);
}

/// Deactivates filter id allocation. Any subsequent [`try_next_filter_id`]
/// call returns `InternalInvariant` until [`init`] runs again.
pub fn shutdown() {
    ACTIVE.store(false, Ordering::SeqCst);
}

/// Fallible counterpart to [`next_filter_id`], for call sites that can
/// propagate a `CoreError` instead of panicking on a shutdown counter.
pub fn try_next_filter_id() -> CoreResult<u16> {
    if !ACTIVE.load(Ordering::SeqCst) {
        return Err(CoreError::InternalInvariant("filter id counter used after shutdown".into()));
    }
    Ok(next_filter_id())
}

/// Allocates the next filter id.
///
/// # Panics
/// Panics if filter construction would exceed [`MAX_FILTER_ID`] ids over
/// the process lifetime — this is the "bounded by 65535" invariant from
/// the data model, and it is not something a correctly configured process
/// should ever hit.
#[inline]
pub fn next_filter_id() -> u16 {
    let id = NEXT_FILTER_ID.fetch_add(1, Ordering::Relaxed);
    assert!(
        id < MAX_FILTER_ID,
        "filter id space exhausted (more than {} filters constructed)",
        MAX_FILTER_ID - FIRST_FILTER_ID
    );
    id as u16
}
