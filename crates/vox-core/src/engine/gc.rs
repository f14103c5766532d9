//! RT-safe garbage collection for retired pipeline state
//!
//! This module provides a global `basedrop` collector that enables deferred
//! deallocation of anything the audio thread lets go of: parameter
//! snapshots, removed effect modules, and whole chains replaced by a swap.
//! When a `Shared<T>` or `Owned<T>` is dropped on the audio thread, it doesn't
//! free memory - it enqueues the pointer for the background GC thread.
//!
//! ## Why This Matters
//!
//! A retired chain can hold several seconds of delay-line memory. Freeing it
//! inside the callback means a trip into the allocator, which can block and
//! cause an audible dropout.
//!
//! ## Usage
//!
//! ```ignore
//! use basedrop::Owned;
//! use crate::engine::gc::gc_handle;
//!
//! let chain = Owned::new(&gc_handle(), EffectChain::with_format(format));
//! // Sent to the audio thread; when the audio thread drops it,
//! // deallocation happens on the GC thread.
//! ```

use basedrop::{Collector, Handle};
use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

/// How often the GC thread reclaims queued allocations
const COLLECT_INTERVAL: Duration = Duration::from_millis(50);

/// Global handle for creating Shared<T>/Owned<T> allocations
///
/// Initialized once; the actual Collector lives on a dedicated GC thread.
static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

/// Initialize the global collector and return a handle
fn init_gc() -> Handle {
    let (tx, rx) = mpsc::channel();

    thread::Builder::new()
        .name("vox-gc".to_string())
        .spawn(move || {
            // Collector is !Sync, so it is created and kept on this thread
            let mut collector = Collector::new();
            tx.send(collector.handle()).expect("Failed to send GC handle");

            log::info!("Audio GC thread started");

            loop {
                collector.collect();
                thread::sleep(COLLECT_INTERVAL);
            }
        })
        .expect("Failed to spawn audio GC thread");

    rx.recv().expect("Failed to receive GC handle")
}

/// Get a handle for creating deferred-drop allocations
///
/// The handle is lightweight and can be cloned.
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(init_gc).clone()
}
