//! Transport controller - session lifecycle and control-side API
//!
//! [`Pipeline`] is the single owner of everything on the control side: the
//! configuration, the parameter store, the staged chain layout and, while a
//! session exists, the command/event queues and the audio thread handle.
//!
//! ```text
//!            start()              pause() / pause_and_reset()
//!   Idle ─────────────▶ Running ◀──────────────────────────▶ Paused
//!    ▲                     │              resume()             │
//!    │ (next start)        │ stop() / device failure           │ stop()
//!    └──────────────── Stopped ◀───────────────────────────────┘
//! ```
//!
//! Effect and parameter edits are accepted in every state. While a session
//! exists they are forwarded to the audio thread and land on the next frame
//! boundary; otherwise they only change the staged layout, which the next
//! `start()` builds its chain from.

mod error;

pub use error::{TransportError, TransportResult};

use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use basedrop::Owned;

use crate::buffer::{
    frame_ring, visualization_feed, FrameWriter, LevelMeters, PlaybackReader, RingStats, VizReader,
};
use crate::config::PipelineConfig;
use crate::effect::preset::{PresetDocument, PresetModule, VoicePreset};
use crate::effect::{EffectKind, ModuleId};
use crate::engine::gc::gc_handle;
use crate::engine::{
    command_channel, event_channel, spawn_audio_thread, AudioProcessor, ChainEditor, CommandSender,
    CycleOutcome, EngineCommand, ModuleEntry, PipelineAtomics, PipelineEvent, PipelineStats, ProcessorIo,
    ProcessorState, TransportCommand,
};
use crate::params::{ParamStore, ParamValues};
use crate::types::FrameFormat;

/// Lifecycle state of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Idle,
    Running,
    Paused,
    Stopped,
}

/// Lets a device backend report an unrecoverable error
///
/// Safe to call from any thread, including device callbacks.
#[derive(Clone)]
pub struct DeviceFaultHandle {
    atomics: Arc<PipelineAtomics>,
}

impl DeviceFaultHandle {
    pub fn signal(&self) {
        self.atomics.signal_device_fault();
    }
}

/// Endpoints handed to the device (or file) side of a session
pub struct SessionIo {
    /// Producer end of the input ring
    pub capture: FrameWriter,
    /// Consumer end of the output ring
    pub playback: PlaybackReader,
    /// Lossy post-chain feed for meters and waveforms
    pub visualization: VizReader,
    pub device_fault: DeviceFaultHandle,
}

/// Point-in-time copy of one ring's counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RingCounters {
    pub written: u64,
    pub read: u64,
    pub overruns: u64,
    pub underruns: u64,
    pub discarded: u64,
}

impl From<&RingStats> for RingCounters {
    fn from(stats: &RingStats) -> Self {
        Self {
            written: stats.written(),
            read: stats.read(),
            overruns: stats.overruns(),
            underruns: stats.underruns(),
            discarded: stats.discarded(),
        }
    }
}

/// Counters of a running session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub pipeline: PipelineStats,
    pub input: RingCounters,
    pub output: RingCounters,
    pub visualization_dropped: u64,
}

struct Session {
    commands: CommandSender,
    events: rtrb::Consumer<PipelineEvent>,
    atomics: Arc<PipelineAtomics>,
    thread: Option<JoinHandle<CycleOutcome>>,
    input: Arc<RingStats>,
    output: Arc<RingStats>,
    meters: Arc<LevelMeters>,
    reported_drops: u64,
}

/// The voice effects pipeline
pub struct Pipeline {
    config: PipelineConfig,
    format: FrameFormat,
    params: ParamStore,
    editor: ChainEditor,
    state: TransportState,
    session: Option<Session>,
    /// Removed modules whose values stay published until the audio thread
    /// has caught up with the edit that removed them
    stale_params: Vec<ModuleId>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> TransportResult<Self> {
        let config = config.validate()?;
        let format = config.format()?;
        Ok(Self {
            config,
            format,
            params: ParamStore::new(),
            editor: ChainEditor::new(),
            state: TransportState::Idle,
            session: None,
            stale_params: Vec::new(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn format(&self) -> &FrameFormat {
        &self.format
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn params(&self) -> &ParamStore {
        &self.params
    }

    /// Staged chain layout in processing order
    pub fn layout(&self) -> &[ModuleEntry] {
        self.editor.layout()
    }

    /// Change the configuration; only while no session exists
    pub fn set_config(&mut self, config: PipelineConfig) -> TransportResult<()> {
        self.require(&[TransportState::Idle, TransportState::Stopped], "reconfigure")?;
        let config = config.validate()?;
        self.format = config.format()?;
        self.config = config;
        log::info!("Pipeline: reconfigured to {:?}", self.format);
        Ok(())
    }

    fn require(&self, allowed: &[TransportState], action: &'static str) -> TransportResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(TransportError::InvalidTransition {
                action,
                state: self.state,
            })
        }
    }

    fn set_state(&mut self, state: TransportState) {
        if self.state != state {
            log::info!("Pipeline: {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    fn sender(session: &mut Option<Session>) -> Option<&mut CommandSender> {
        session.as_mut().map(|s| &mut s.commands)
    }

    // ─────────────────────────────────────────────────────────────
    // Transport
    // ─────────────────────────────────────────────────────────────

    /// Allocate the buffers, bind the chain and start the audio thread
    pub fn start(&mut self) -> TransportResult<SessionIo> {
        self.require(&[TransportState::Idle, TransportState::Stopped], "start")?;
        if self.state == TransportState::Stopped {
            self.set_state(TransportState::Idle);
        }
        self.prune_stale_params();

        let format = self.format;
        let config = &self.config;
        let chain = self.editor.build_chain(format)?;
        let module_count = chain.len();

        let (capture, input) = frame_ring(&format, config.ring_depth);
        let (output, playback) = frame_ring(&format, config.ring_depth);
        let (viz_publisher, visualization) = visualization_feed(&format, config.visualization_depth);
        let (commands, command_rx) = command_channel(config.command_capacity);
        let (event_tx, events) = event_channel(config.event_capacity);
        let atomics = Arc::new(PipelineAtomics::new());
        let resync_mark = Arc::new(AtomicU64::new(0));

        let input_stats = Arc::clone(input.stats());
        let output_stats = Arc::clone(output.stats());
        let meters = Arc::clone(viz_publisher.meters());

        let processor = AudioProcessor::new(
            Owned::new(&gc_handle(), chain),
            self.params.reader(),
            ProcessorIo {
                input,
                output,
                visualization: viz_publisher,
                commands: command_rx,
                events: event_tx,
            },
            Arc::clone(&atomics),
            Arc::clone(&resync_mark),
            config.output_limit,
        );
        let thread = spawn_audio_thread(processor).map_err(TransportError::ThreadSpawn)?;

        self.session = Some(Session {
            commands,
            events,
            atomics: Arc::clone(&atomics),
            thread: Some(thread),
            input: input_stats,
            output: output_stats,
            meters,
            reported_drops: 0,
        });
        log::info!(
            "Pipeline: session started ({} Hz, {} frames x {} ch, {} modules)",
            format.sample_rate(),
            format.block_size(),
            format.channels(),
            module_count
        );
        self.set_state(TransportState::Running);

        Ok(SessionIo {
            capture,
            playback: PlaybackReader::new(playback, resync_mark),
            visualization,
            device_fault: DeviceFaultHandle { atomics },
        })
    }

    /// Stop consuming frames; module state is kept
    pub fn pause(&mut self) -> TransportResult<()> {
        self.pause_inner(false)
    }

    /// Stop consuming frames and clear every module's state
    pub fn pause_and_reset(&mut self) -> TransportResult<()> {
        self.pause_inner(true)
    }

    fn pause_inner(&mut self, reset_effects: bool) -> TransportResult<()> {
        self.check_device()?;
        self.require(&[TransportState::Running], "pause")?;
        self.send_transport(TransportCommand::Pause { reset_effects })?;
        self.set_state(TransportState::Paused);
        Ok(())
    }

    /// Continue after a pause; stale input and output are discarded
    pub fn resume(&mut self) -> TransportResult<()> {
        self.check_device()?;
        self.require(&[TransportState::Paused], "resume")?;
        self.send_transport(TransportCommand::Resume)?;
        self.set_state(TransportState::Running);
        Ok(())
    }

    /// Stop the audio thread and release the session
    pub fn stop(&mut self) -> TransportResult<()> {
        if self.check_device().is_err() {
            // Device failure already ended the session
            return Ok(());
        }
        self.require(&[TransportState::Running, TransportState::Paused], "stop")?;
        self.shutdown();
        self.set_state(TransportState::Stopped);
        Ok(())
    }

    fn send_transport(&mut self, command: TransportCommand) -> TransportResult<()> {
        let sender = Self::sender(&mut self.session).ok_or(TransportError::InvalidTransition {
            action: "control transport",
            state: self.state,
        })?;
        sender.send(EngineCommand::Transport(command))?;
        Ok(())
    }

    /// End the session if the device reported a failure
    fn check_device(&mut self) -> TransportResult<()> {
        let failed = self
            .session
            .as_ref()
            .is_some_and(|s| s.atomics.device_fault() || s.atomics.state() == ProcessorState::Failed);
        if failed {
            log::error!("Pipeline: audio device failure, stopping session");
            self.shutdown();
            self.set_state(TransportState::Stopped);
            return Err(TransportError::DeviceFailure);
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        session.atomics.request_stop();
        if let Some(thread) = session.thread.take() {
            match thread.join() {
                Ok(outcome) => log::info!("Pipeline: audio thread finished ({:?})", outcome),
                Err(_) => log::error!("Pipeline: audio thread panicked"),
            }
        }
        let stats = session.atomics.snapshot();
        log::info!(
            "Pipeline: session ended after {} frames ({} module faults)",
            stats.frames_processed,
            stats.module_faults
        );
        // Nothing can read the old session's parameters any more
        self.prune_stale_params();
    }

    /// Drain status events from the audio thread
    ///
    /// A device failure ends the session here and moves the pipeline to
    /// Stopped.
    pub fn poll_events(&mut self) -> Vec<PipelineEvent> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        let events: Vec<PipelineEvent> = std::iter::from_fn(|| session.events.pop().ok()).collect();

        for event in &events {
            match event {
                PipelineEvent::ModuleFault { module, kind, fault } => {
                    log::warn!("Pipeline: {} {} faulted ({}), frame silenced", kind, module, fault)
                }
                PipelineEvent::ChainRejected { generation, error } => {
                    log::warn!("Pipeline: chain edit {} rejected: {}", generation, error)
                }
                PipelineEvent::DeviceFailure => log::error!("Pipeline: device failure reported"),
                other => log::debug!("Pipeline: {:?}", other),
            }
        }
        let dropped = session.atomics.events_dropped();
        if dropped > session.reported_drops {
            log::warn!("Pipeline: {} status events dropped", dropped - session.reported_drops);
            session.reported_drops = dropped;
        }

        // Ends the session if the device failed
        let _ = self.check_device();
        self.prune_stale_params();
        events
    }

    /// Session counters, or `None` when no session exists
    pub fn stats(&self) -> Option<SessionStats> {
        self.session.as_ref().map(|s| SessionStats {
            pipeline: s.atomics.snapshot(),
            input: RingCounters::from(s.input.as_ref()),
            output: RingCounters::from(s.output.as_ref()),
            visualization_dropped: s.meters.dropped(),
        })
    }

    /// True once the audio thread runs the most recently requested chain
    pub fn is_quiescent(&self) -> bool {
        self.session
            .as_ref()
            .map_or(true, |s| s.atomics.bound_generation() >= self.editor.requested_generation())
    }

    /// Wait (polling) until [`is_quiescent`](Self::is_quiescent) or timeout
    pub fn wait_quiescent(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_quiescent() {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        true
    }

    fn prune_stale_params(&mut self) {
        if !self.stale_params.is_empty() && self.is_quiescent() {
            self.params.unregister_all(self.stale_params.drain(..));
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Effect chain
    // ─────────────────────────────────────────────────────────────

    /// Append a module to the end of the chain
    pub fn add_effect(&mut self, kind: EffectKind) -> TransportResult<ModuleId> {
        self.insert_effect(usize::MAX, kind)
    }

    /// Insert a module at `position` in processing order
    pub fn insert_effect(&mut self, position: usize, kind: EffectKind) -> TransportResult<ModuleId> {
        let sender = Self::sender(&mut self.session);
        let id = self.editor.insert(position, kind, &self.format, sender)?;
        self.params.register(id, kind.info());
        log::debug!("Pipeline: inserted {} {} at {}", kind, id, position.min(self.editor.layout().len() - 1));
        Ok(id)
    }

    pub fn remove_effect(&mut self, id: ModuleId) -> TransportResult<()> {
        let sender = Self::sender(&mut self.session);
        let entry = self.editor.remove(id, sender)?;
        self.stale_params.push(id);
        self.prune_stale_params();
        log::debug!("Pipeline: removed {} {}", entry.kind, id);
        Ok(())
    }

    pub fn move_effect(&mut self, id: ModuleId, position: usize) -> TransportResult<()> {
        let sender = Self::sender(&mut self.session);
        self.editor.move_to(id, position, sender)?;
        log::debug!("Pipeline: moved {} to {}", id, position);
        Ok(())
    }

    pub fn enable_effect(&mut self, id: ModuleId) -> TransportResult<()> {
        let sender = Self::sender(&mut self.session);
        Ok(self.editor.set_enabled(id, true, sender)?)
    }

    /// Bypass a module; its state is frozen until re-enabled
    pub fn disable_effect(&mut self, id: ModuleId) -> TransportResult<()> {
        let sender = Self::sender(&mut self.session);
        Ok(self.editor.set_enabled(id, false, sender)?)
    }

    /// Bypass a module and clear its state
    pub fn disable_and_reset_effect(&mut self, id: ModuleId) -> TransportResult<()> {
        let sender = Self::sender(&mut self.session);
        Ok(self.editor.disable_and_reset(id, sender)?)
    }

    pub fn reset_effect(&mut self, id: ModuleId) -> TransportResult<()> {
        let sender = Self::sender(&mut self.session);
        Ok(self.editor.reset(id, sender)?)
    }

    pub fn reset_all_effects(&mut self) -> TransportResult<()> {
        let sender = Self::sender(&mut self.session);
        Ok(self.editor.reset_all(sender)?)
    }

    /// Replace the whole chain with fresh modules at their default values
    pub fn replace_chain(&mut self, kinds: &[EffectKind]) -> TransportResult<Vec<ModuleId>> {
        let modules: Vec<PresetModule> = kinds.iter().map(|&k| PresetModule::new(k)).collect();
        self.install(&modules)
    }

    /// Swap in a new chain and its parameter values
    ///
    /// The values of the new modules are published before the chain swap is
    /// queued, so the new chain never runs a frame on defaults.
    fn install(&mut self, modules: &[PresetModule]) -> TransportResult<Vec<ModuleId>> {
        let ids: Vec<ModuleId> = self.editor.upcoming_ids(modules.len()).collect();
        let layout: Vec<(EffectKind, bool)> = modules.iter().map(|m| (m.kind, m.enabled)).collect();
        if layout.len() > crate::effect::MAX_MODULES {
            return Err(TransportError::ChainFull);
        }

        self.params.register_modules(
            ids.iter().zip(modules).map(|(&id, m)| (id, m.kind.info())),
            |batch| {
                for (&id, module) in ids.iter().zip(modules) {
                    for (name, &value) in &module.params {
                        batch.set(id, name, value)?;
                    }
                }
                Ok(())
            },
        )?;

        let previous: Vec<ModuleId> = self.editor.layout().iter().map(|e| e.id).collect();
        let sender = Self::sender(&mut self.session);
        match self.editor.replace(&layout, &self.format, sender) {
            Ok(_) => {
                self.stale_params.extend(previous);
                self.prune_stale_params();
                log::debug!("Pipeline: chain replaced ({} modules)", ids.len());
                Ok(ids)
            }
            Err(e) => {
                self.params.unregister_all(ids);
                Err(e.into())
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Parameters
    // ─────────────────────────────────────────────────────────────

    fn require_module(&self, id: ModuleId) -> TransportResult<()> {
        if self.editor.contains(id) {
            Ok(())
        } else {
            Err(TransportError::UnknownModule(id))
        }
    }

    /// Set one parameter; out-of-range values are clamped and the applied
    /// value is returned
    pub fn set_param(&mut self, id: ModuleId, name: &str, value: f32) -> TransportResult<f32> {
        self.require_module(id)?;
        Ok(self.params.set(id, name, value)?)
    }

    pub fn param(&self, id: ModuleId, name: &str) -> TransportResult<f32> {
        self.require_module(id)?;
        Ok(self.params.get(id, name)?)
    }

    /// Values of every module in the current layout
    pub fn snapshot_params(&self) -> ParamValues {
        let mut values = ParamValues::new();
        for entry in self.editor.layout() {
            if let Ok(params) = self.params.module_values(entry.id) {
                for (name, value) in params {
                    values.insert(entry.id, name, value);
                }
            }
        }
        values
    }

    /// Restore captured values as one snapshot; any unknown module or
    /// parameter rejects the whole restore
    pub fn restore_params(&mut self, values: &ParamValues) -> TransportResult<()> {
        if let Some((id, _, _)) = values.iter().find(|(id, _, _)| !self.editor.contains(*id)) {
            return Err(TransportError::UnknownModule(id));
        }
        Ok(self.params.restore(values)?)
    }

    // ─────────────────────────────────────────────────────────────
    // Presets
    // ─────────────────────────────────────────────────────────────

    pub fn apply_preset(&mut self, preset: VoicePreset) -> TransportResult<Vec<ModuleId>> {
        log::info!("Pipeline: applying preset '{}'", preset);
        self.import_preset(&preset.document())
    }

    /// Replace the chain with the layout and values of a preset document
    pub fn import_preset(&mut self, doc: &PresetDocument) -> TransportResult<Vec<ModuleId>> {
        doc.validate()?;
        self.install(&doc.modules)
    }

    /// Capture the current layout and values as a preset document
    pub fn export_preset(&self, name: &str) -> PresetDocument {
        let modules = self
            .editor
            .layout()
            .iter()
            .map(|entry| {
                let params = self
                    .params
                    .module_values(entry.id)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(name, value)| (name.to_string(), value))
                    .collect();
                PresetModule {
                    kind: entry.kind,
                    enabled: entry.enabled,
                    params,
                }
            })
            .collect();
        PresetDocument {
            name: name.to_string(),
            description: String::new(),
            modules,
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}
