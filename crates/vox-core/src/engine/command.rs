//! Lock-free command queue from the control thread to the audio thread
//!
//! The control thread pushes commands via an `rtrb` SPSC queue and the audio
//! thread drains it at the start of every cycle, so chain edits and
//! transport changes only ever land on frame boundaries.
//!
//! # Real-Time Safety
//!
//! - Push and pop are wait-free and never allocate
//! - Anything heap-backed travels inside `basedrop::Owned`, so a command the
//!   audio thread drops (a replaced chain, a rejected slot) is released on
//!   the collector thread
//!
//! ```ignore
//! let (mut tx, rx) = command_channel(256);
//! tx.send(EngineCommand::Transport(TransportCommand::Resume))?;
//! ```

use basedrop::Owned;

use crate::effect::{ChainSlot, EffectChain, ModuleId};

/// Default capacity of the command queue
///
/// Replacing a chain is a single command, so bursts stay small; the headroom
/// covers rapid per-module edits from a UI.
pub const COMMAND_QUEUE_CAPACITY: usize = 256;

/// Edits applied to the bound effect chain
pub enum ChainCommand {
    // ─────────────────────────────────────────────────────────────
    // Structure
    // ─────────────────────────────────────────────────────────────
    /// Insert a prepared module at a position in processing order
    Insert { position: usize, slot: ChainSlot },
    /// Remove a module (released by the collector)
    Remove(ModuleId),
    /// Move a module to a new position in processing order
    Move { module: ModuleId, position: usize },
    /// Swap in a whole new chain
    ///
    /// The old chain is dropped on the audio thread through `Owned`, which
    /// hands its memory to the collector.
    Replace(Owned<EffectChain>),

    // ─────────────────────────────────────────────────────────────
    // Module state
    // ─────────────────────────────────────────────────────────────
    /// Enable or disable a module (disabled modules freeze their state)
    SetEnabled { module: ModuleId, enabled: bool },
    /// Disable a module and clear its state
    DisableAndReset(ModuleId),
    /// Clear one module's state
    Reset(ModuleId),
    /// Clear every module's state
    ResetAll,
}

/// Session transport changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportCommand {
    /// Stop consuming frames; optionally flush every module
    Pause { reset_effects: bool },
    /// Realign the rings and continue processing
    Resume,
}

/// Commands sent from the control thread to the audio thread
pub enum EngineCommand {
    /// A chain edit tagged with the generation the control side assigned
    Chain { generation: u64, command: ChainCommand },
    Transport(TransportCommand),
}

/// Reasons a command could not be queued
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Command queue is full")]
    QueueFull,

    #[error("Audio thread is gone")]
    Disconnected,
}

/// Control-side end of the command queue
pub struct CommandSender {
    producer: rtrb::Producer<EngineCommand>,
}

impl CommandSender {
    /// Queue a command (non-blocking)
    ///
    /// On failure the command is dropped here, on the control thread.
    pub fn send(&mut self, cmd: EngineCommand) -> Result<(), CommandError> {
        if self.producer.is_abandoned() {
            return Err(CommandError::Disconnected);
        }
        self.producer.push(cmd).map_err(|_| CommandError::QueueFull)
    }

    /// Check if the queue has space for more commands
    pub fn has_space(&self) -> bool {
        self.producer.slots() > 0
    }
}

/// Create a new command channel (sender/consumer pair)
///
/// - `CommandSender`: owned by the control thread
/// - `Consumer`: owned by the audio thread
pub fn command_channel(capacity: usize) -> (CommandSender, rtrb::Consumer<EngineCommand>) {
    let (producer, consumer) = rtrb::RingBuffer::new(capacity.max(1));
    (CommandSender { producer }, consumer)
}
