//! Audio engine - audio thread, command/event queues, chain editing
//!
//! - `processor`: the per-frame work of the audio thread
//! - `driver`: the dedicated thread that runs it
//! - `command` / `events`: lock-free queues between control and audio threads
//! - `editor`: control-side mirror of the chain and generation counter
//! - `atomics`: lock-free counters and flags readable from any thread
//! - `gc`: deferred deallocation for anything the audio thread releases

mod atomics;
mod command;
mod driver;
mod editor;
mod events;
pub mod gc;
mod processor;

pub use atomics::*;
pub use command::*;
pub use driver::*;
pub use editor::*;
pub use events::*;
pub use processor::*;
