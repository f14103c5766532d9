//! Status events from the audio thread to the control thread

use crate::effect::{ChainError, EffectFault, EffectKind, ModuleFault, ModuleId};

use super::atomics::PipelineAtomics;

/// Default capacity of the event queue
pub const EVENT_QUEUE_CAPACITY: usize = 256;

/// Something the audio thread wants the control side to know
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineEvent {
    /// A module faulted; its frame was silenced and it was reset
    ModuleFault {
        module: ModuleId,
        kind: EffectKind,
        fault: EffectFault,
    },
    /// A chain edit could not be applied
    ChainRejected { generation: u64, error: ChainError },
    /// The audio thread is now running the chain of this generation
    ChainBound { generation: u64 },
    Paused { reset_effects: bool },
    /// Processing continues; stale input frames were discarded
    Resumed { realigned_frames: usize },
    /// The device reported an unrecoverable error; processing has ended
    DeviceFailure,
    Stopped,
}

impl From<ModuleFault> for PipelineEvent {
    fn from(fault: ModuleFault) -> Self {
        PipelineEvent::ModuleFault {
            module: fault.module,
            kind: fault.kind,
            fault: fault.fault,
        }
    }
}

/// Audio-side end of the event queue
///
/// Never blocks: when the queue is full the event is dropped and counted.
pub struct EventSender {
    producer: rtrb::Producer<PipelineEvent>,
}

impl EventSender {
    #[inline]
    pub fn send(&mut self, event: PipelineEvent, atomics: &PipelineAtomics) {
        if self.producer.push(event).is_err() {
            atomics.record_dropped_event();
        }
    }
}

/// Create a new event channel
pub fn event_channel(capacity: usize) -> (EventSender, rtrb::Consumer<PipelineEvent>) {
    let (producer, consumer) = rtrb::RingBuffer::new(capacity.max(1));
    (EventSender { producer }, consumer)
}
