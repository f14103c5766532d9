//! Parameter store with snapshot-publish semantics
//!
//! The control thread owns a [`ParamStore`] and edits a private working copy
//! of every effect parameter. Each edit (or batch of edits) builds a new,
//! immutable [`ParamSnapshot`] and publishes it through a `basedrop`
//! `SharedCell`. The audio thread holds a [`ParamReader`] and loads whatever
//! snapshot is current at the top of each frame: it never waits, and it never
//! sees a half-applied batch.
//!
//! Retired snapshots are freed on the GC thread (see [`crate::engine::gc`]),
//! so dropping the audio thread's reference never deallocates in the callback.

mod snapshot;
mod store;

pub use snapshot::*;
pub use store::*;
