//! Transport error types

use thiserror::Error;

use super::TransportState;
use crate::effect::preset::PresetError;
use crate::effect::{ChainError, ModuleId};
use crate::engine::{CommandError, EditError};
use crate::params::ParamError;
use crate::types::FormatError;

/// Errors returned by [`Pipeline`](super::Pipeline) operations
#[derive(Error, Debug)]
pub enum TransportError {
    /// Operation not allowed in the current state
    #[error("Cannot {action} while {state:?}")]
    InvalidTransition {
        action: &'static str,
        state: TransportState,
    },

    /// Configuration describes an unsupported frame format
    #[error("Invalid pipeline configuration: {0}")]
    InvalidConfig(#[from] FormatError),

    /// The audio thread could not be started
    #[error("Failed to spawn audio thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),

    /// The audio thread is not draining its command queue
    #[error("Command queue is full")]
    CommandQueueFull,

    /// The audio thread exited before it was asked to stop
    #[error("Audio thread is gone")]
    Disconnected,

    /// The device failed; the session has been stopped
    #[error("Audio device failure")]
    DeviceFailure,

    #[error("Unknown module {0}")]
    UnknownModule(ModuleId),

    #[error("Effect chain is full")]
    ChainFull,

    #[error("Chain edit rejected: {0}")]
    Chain(ChainError),

    #[error(transparent)]
    Param(#[from] ParamError),

    #[error(transparent)]
    Preset(#[from] PresetError),
}

impl From<ChainError> for TransportError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::Full => TransportError::ChainFull,
            ChainError::UnknownModule(id) => TransportError::UnknownModule(id),
            other => TransportError::Chain(other),
        }
    }
}

impl From<CommandError> for TransportError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::QueueFull => TransportError::CommandQueueFull,
            CommandError::Disconnected => TransportError::Disconnected,
        }
    }
}

impl From<EditError> for TransportError {
    fn from(err: EditError) -> Self {
        match err {
            EditError::Chain(e) => e.into(),
            EditError::Command(e) => e.into(),
        }
    }
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;
