// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Fork-join dispatch for per-node work.
//!
//! With the `parallel` feature, work runs on the rayon global pool. Every call returns only
//! after all items are processed, so consecutive calls act as phase barriers.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

static PARALLEL_DISABLED: AtomicBool = AtomicBool::new(false);

/// Force every update pass to run on the calling thread. Intended for debugging.
pub fn set_parallel_disabled(disabled: bool) {
    PARALLEL_DISABLED.store(disabled, Ordering::Relaxed);
}

/// Whether [`set_parallel_disabled`] is in effect.
pub fn parallel_disabled() -> bool {
    PARALLEL_DISABLED.load(Ordering::Relaxed)
}

/// Run `f` on every item. Sequential for zero or one items.
pub(crate) fn for_each<T: Send>(items: Vec<T>, f: impl Fn(T) + Sync + Send) {
    #[cfg(feature = "parallel")]
    if items.len() > 1 && !parallel_disabled() {
        use rayon::prelude::*;
        items.into_par_iter().for_each(f);
        return;
    }
    items.into_iter().for_each(f);
}
