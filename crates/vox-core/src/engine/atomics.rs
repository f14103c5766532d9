//! Lock-free pipeline state for control-thread access

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::time::Duration;

/// What the audio thread is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    Running,
    Paused,
    Stopped,
    Failed,
}

impl ProcessorState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ProcessorState::Paused,
            2 => ProcessorState::Stopped,
            3 => ProcessorState::Failed,
            _ => ProcessorState::Running,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ProcessorState::Running => 0,
            ProcessorState::Paused => 1,
            ProcessorState::Stopped => 2,
            ProcessorState::Failed => 3,
        }
    }
}

/// Lock-free pipeline state for control access
///
/// The audio thread writes these after every cycle; the control thread reads
/// them without any lock. Counters use `Ordering::Relaxed` since they only
/// need visibility. The stop flag uses Release/Acquire so that everything
/// the control thread did before requesting a stop is visible when the audio
/// thread observes it.
pub struct PipelineAtomics {
    /// Frames run through the chain
    frames_processed: AtomicU64,
    /// Module faults observed (each silenced one frame)
    module_faults: AtomicU64,
    /// Generation of the chain the audio thread has bound
    bound_generation: AtomicU64,
    /// Status events dropped because the event queue was full
    events_dropped: AtomicU64,
    /// Duration of the last processing cycle in nanoseconds
    last_cycle_ns: AtomicU64,
    /// Longest processing cycle seen in nanoseconds
    max_cycle_ns: AtomicU64,
    state: AtomicU8,
    stop_requested: AtomicBool,
    device_fault: AtomicBool,
}

impl PipelineAtomics {
    pub fn new() -> Self {
        Self {
            frames_processed: AtomicU64::new(0),
            module_faults: AtomicU64::new(0),
            bound_generation: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            last_cycle_ns: AtomicU64::new(0),
            max_cycle_ns: AtomicU64::new(0),
            state: AtomicU8::new(ProcessorState::Running.as_u8()),
            stop_requested: AtomicBool::new(false),
            device_fault: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn module_faults(&self) -> u64 {
        self.module_faults.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn bound_generation(&self) -> u64 {
        self.bound_generation.load(Ordering::Acquire)
    }

    #[inline]
    pub fn events_dropped(&self) -> u64 {
        self.events_dropped.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn last_cycle(&self) -> Duration {
        Duration::from_nanos(self.last_cycle_ns.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn max_cycle(&self) -> Duration {
        Duration::from_nanos(self.max_cycle_ns.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn state(&self) -> ProcessorState {
        ProcessorState::from_u8(self.state.load(Ordering::Relaxed))
    }

    /// Ask the audio thread to stop at the top of its next cycle
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    #[inline]
    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Flag an unrecoverable device error (callable from device callbacks)
    pub fn signal_device_fault(&self) {
        self.device_fault.store(true, Ordering::Release);
    }

    #[inline]
    pub fn device_fault(&self) -> bool {
        self.device_fault.load(Ordering::Acquire)
    }

    // Audio-thread writers

    #[inline]
    pub(crate) fn record_frame(&self, cycle_ns: u64) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
        self.last_cycle_ns.store(cycle_ns, Ordering::Relaxed);
        self.max_cycle_ns.fetch_max(cycle_ns, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_fault(&self) {
        self.module_faults.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_dropped_event(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn set_bound_generation(&self, generation: u64) {
        self.bound_generation.store(generation, Ordering::Release);
    }

    #[inline]
    pub(crate) fn set_state(&self, state: ProcessorState) {
        self.state.store(state.as_u8(), Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            frames_processed: self.frames_processed(),
            module_faults: self.module_faults(),
            bound_generation: self.bound_generation(),
            events_dropped: self.events_dropped(),
            last_cycle: self.last_cycle(),
            max_cycle: self.max_cycle(),
            state: self.state(),
        }
    }
}

impl Default for PipelineAtomics {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy of the pipeline counters at one moment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames_processed: u64,
    pub module_faults: u64,
    pub bound_generation: u64,
    pub events_dropped: u64,
    pub last_cycle: Duration,
    pub max_cycle: Duration,
    pub state: ProcessorState,
}
