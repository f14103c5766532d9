//! Audio-thread side of a session
//!
//! [`AudioProcessor`] owns everything the audio thread touches: the bound
//! chain, the working frame, the consuming end of the input ring and the
//! producing ends of the output ring and visualization feed. One call to
//! [`process_cycle`](AudioProcessor::process_cycle) is one frame boundary:
//!
//! 1. stop / device-fault flags
//! 2. pending commands (chain edits, pause/resume)
//! 3. read one input frame, run the chain against the current parameter
//!    snapshot, limit, write the output and offer it to the visualization
//!
//! An input ring that stays empty for a whole block period counts one input
//! underrun per period.
//!
//! Nothing in here allocates, locks or logs. Anything released (old chains,
//! removed modules, stale snapshots) is held in `basedrop` containers and
//! freed on the collector thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use basedrop::Owned;

use super::atomics::{PipelineAtomics, ProcessorState};
use super::command::{ChainCommand, EngineCommand, TransportCommand};
use super::events::{EventSender, PipelineEvent};
use crate::buffer::{FrameReader, FrameWriter, VizPublisher};
use crate::effect::{ChainError, EffectChain};
use crate::params::ParamReader;
use crate::types::{Frame, FrameFormat};

/// Largest magnitude the output limiter lets through
pub const OUTPUT_CEILING: f32 = 1.0;

/// Result of one processing cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A frame went through the chain
    Processed,
    /// No input frame was available
    Idle,
    Paused,
    Stopped,
    DeviceFailed,
}

/// Queue and ring endpoints handed to the audio thread
pub struct ProcessorIo {
    pub input: FrameReader,
    pub output: FrameWriter,
    pub visualization: VizPublisher,
    pub commands: rtrb::Consumer<EngineCommand>,
    pub events: EventSender,
}

/// Everything the audio thread owns for one session
pub struct AudioProcessor {
    format: FrameFormat,
    chain: Owned<EffectChain>,
    params: ParamReader,
    io: ProcessorIo,
    frame: Frame,
    atomics: Arc<PipelineAtomics>,
    /// Output frames written before the last resume; the playback reader
    /// drops any of those it has not played yet
    resync_mark: Arc<AtomicU64>,
    output_limit: bool,
    paused: bool,
    period: Duration,
    /// Start of the current stretch without input
    starved_since: Option<Instant>,
    finished: Option<CycleOutcome>,
}

impl AudioProcessor {
    pub fn new(
        chain: Owned<EffectChain>,
        params: ParamReader,
        io: ProcessorIo,
        atomics: Arc<PipelineAtomics>,
        resync_mark: Arc<AtomicU64>,
        output_limit: bool,
    ) -> Self {
        let format = *chain.format();
        atomics.set_bound_generation(chain.generation());
        atomics.set_state(ProcessorState::Running);
        Self {
            format,
            chain,
            params,
            io,
            frame: Frame::silence(&format),
            atomics,
            resync_mark,
            output_limit,
            paused: false,
            period: format.period(),
            starved_since: None,
            finished: None,
        }
    }

    pub fn format(&self) -> &FrameFormat {
        &self.format
    }

    pub fn chain(&self) -> &EffectChain {
        &self.chain
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Run one frame boundary
    pub fn process_cycle(&mut self) -> CycleOutcome {
        if let Some(outcome) = self.finished {
            return outcome;
        }
        if self.atomics.stop_requested() {
            return self.finish(CycleOutcome::Stopped);
        }
        if self.atomics.device_fault() {
            return self.finish(CycleOutcome::DeviceFailed);
        }

        self.apply_commands();

        if self.paused {
            return CycleOutcome::Paused;
        }
        if self.io.input.available_frames() == 0 {
            self.check_starvation();
            return CycleOutcome::Idle;
        }
        self.starved_since = None;
        if !self.io.input.read(&mut self.frame) {
            return CycleOutcome::Idle;
        }

        let started = Instant::now();
        let snapshot = self.params.load();
        if let Err(fault) = self.chain.process(&mut self.frame, &snapshot) {
            self.atomics.record_fault();
            self.io.events.send(fault.into(), &self.atomics);
        }
        drop(snapshot);

        if self.output_limit {
            self.frame.clamp(OUTPUT_CEILING);
        }
        self.io.output.write(&self.frame);
        self.io.visualization.publish(&self.frame);

        self.atomics.record_frame(started.elapsed().as_nanos() as u64);
        CycleOutcome::Processed
    }

    /// Drain the command queue (frame boundary only)
    fn apply_commands(&mut self) {
        while let Ok(cmd) = self.io.commands.pop() {
            match cmd {
                EngineCommand::Chain { generation, command } => self.apply_chain(generation, command),
                EngineCommand::Transport(TransportCommand::Pause { reset_effects }) => {
                    if reset_effects {
                        self.chain.reset_all();
                    }
                    self.paused = true;
                    self.atomics.set_state(ProcessorState::Paused);
                    self.io.events.send(PipelineEvent::Paused { reset_effects }, &self.atomics);
                }
                EngineCommand::Transport(TransportCommand::Resume) => {
                    let realigned_frames = self.io.input.realign();
                    self.resync_mark
                        .store(self.io.output.stats().written(), Ordering::Release);
                    self.paused = false;
                    self.starved_since = None;
                    self.atomics.set_state(ProcessorState::Running);
                    self.io.events.send(PipelineEvent::Resumed { realigned_frames }, &self.atomics);
                }
            }
        }
    }

    fn apply_chain(&mut self, generation: u64, command: ChainCommand) {
        let result = match command {
            ChainCommand::Insert { position, slot } => self.chain.insert(position, slot),
            // The removed slot drops here; Owned defers the free
            ChainCommand::Remove(id) => self.chain.remove(id).map(drop).ok_or(ChainError::UnknownModule(id)),
            ChainCommand::Move { module, position } => self.chain.move_to(module, position),
            ChainCommand::SetEnabled { module, enabled } => self.chain.set_enabled(module, enabled),
            ChainCommand::DisableAndReset(id) => self.chain.disable_and_reset(id),
            ChainCommand::Reset(id) => self.chain.reset_module(id),
            ChainCommand::ResetAll => {
                self.chain.reset_all();
                Ok(())
            }
            ChainCommand::Replace(chain) => {
                if *chain.format() != self.format {
                    Err(ChainError::FormatMismatch)
                } else {
                    // Old chain drops here; Owned defers the free
                    self.chain = chain;
                    self.io.events.send(PipelineEvent::ChainBound { generation }, &self.atomics);
                    Ok(())
                }
            }
        };

        if let Err(error) = result {
            self.io.events.send(PipelineEvent::ChainRejected { generation, error }, &self.atomics);
        }
        self.chain.set_generation(generation);
        self.atomics.set_bound_generation(generation);
    }

    fn check_starvation(&mut self) {
        let now = Instant::now();
        let since = *self.starved_since.get_or_insert(now);
        if now.duration_since(since) >= self.period {
            self.io.input.record_underrun();
            self.starved_since = Some(now);
        }
    }

    fn finish(&mut self, outcome: CycleOutcome) -> CycleOutcome {
        let (state, event) = match outcome {
            CycleOutcome::DeviceFailed => (ProcessorState::Failed, PipelineEvent::DeviceFailure),
            _ => (ProcessorState::Stopped, PipelineEvent::Stopped),
        };
        self.atomics.set_state(state);
        self.io.events.send(event, &self.atomics);
        self.finished = Some(outcome);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{frame_ring, visualization_feed, PlaybackReader, VizReader};
    use crate::effect::{ChainSlot, EffectKind, ModuleId};
    use crate::engine::command::{command_channel, CommandSender};
    use crate::engine::events::event_channel;
    use crate::engine::gc::gc_handle;
    use crate::params::ParamStore;

    struct Harness {
        processor: AudioProcessor,
        capture: FrameWriter,
        playback: FrameReader,
        visualization: VizReader,
        commands: CommandSender,
        events: rtrb::Consumer<PipelineEvent>,
        atomics: Arc<PipelineAtomics>,
        resync_mark: Arc<AtomicU64>,
    }

    fn format() -> FrameFormat {
        FrameFormat::mono(44100, 64).unwrap()
    }

    fn harness(chain: EffectChain, store: &ParamStore) -> Harness {
        let format = *chain.format();
        let (capture, input) = frame_ring(&format, 8);
        let (output, playback) = frame_ring(&format, 8);
        let (viz_tx, visualization) = visualization_feed(&format, 4);
        let (commands, command_rx) = command_channel(64);
        let (event_tx, events) = event_channel(64);
        let atomics = Arc::new(PipelineAtomics::new());
        let resync_mark = Arc::new(AtomicU64::new(0));

        let processor = AudioProcessor::new(
            Owned::new(&gc_handle(), chain),
            store.reader(),
            ProcessorIo {
                input,
                output,
                visualization: viz_tx,
                commands: command_rx,
                events: event_tx,
            },
            Arc::clone(&atomics),
            Arc::clone(&resync_mark),
            true,
        );
        Harness {
            processor,
            capture,
            playback,
            visualization,
            commands,
            events,
            atomics,
            resync_mark,
        }
    }

    fn chain_with(kinds: &[EffectKind]) -> EffectChain {
        let format = format();
        EffectChain::from_slots(
            format,
            kinds
                .iter()
                .enumerate()
                .map(|(i, &k)| ChainSlot::instantiate(ModuleId(i as u32), k, &format)),
        )
        .unwrap()
    }

    fn drain(events: &mut rtrb::Consumer<PipelineEvent>) -> Vec<PipelineEvent> {
        std::iter::from_fn(|| events.pop().ok()).collect()
    }

    fn chain_cmd(generation: u64, command: ChainCommand) -> EngineCommand {
        EngineCommand::Chain { generation, command }
    }

    #[test]
    fn test_frame_passes_through_disabled_chain() {
        let mut store = ParamStore::new();
        store.register(ModuleId(0), EffectKind::Echo.info());
        let mut chain = chain_with(&[EffectKind::Echo]);
        chain.set_enabled(ModuleId(0), false).unwrap();
        let mut h = harness(chain, &store);

        let input: Vec<f32> = (0..64).map(|i| (i as f32 / 64.0) - 0.5).collect();
        assert!(h.capture.write_samples(&input));
        assert_eq!(h.processor.process_cycle(), CycleOutcome::Processed);
        assert_eq!(h.processor.process_cycle(), CycleOutcome::Idle);

        let mut out = vec![0.0; 64];
        assert!(h.playback.read_samples(&mut out));
        assert_eq!(out, input);
        assert_eq!(h.visualization.latest().unwrap().as_slice(), &input[..]);
        assert_eq!(h.atomics.frames_processed(), 1);
    }

    #[test]
    fn test_output_limiter_clamps() {
        let store = ParamStore::new();
        let mut h = harness(EffectChain::with_format(format()), &store);
        assert!(h.capture.write_samples(&[1.5; 64]));
        h.processor.process_cycle();

        let mut out = vec![0.0; 64];
        assert!(h.playback.read_samples(&mut out));
        assert!(out.iter().all(|&s| s == OUTPUT_CEILING));
    }

    #[test]
    fn test_chain_edits_apply_at_frame_boundary() {
        let mut store = ParamStore::new();
        store.register(ModuleId(5), EffectKind::Distortion.info());
        store.set(ModuleId(5), "trim", 0.5).unwrap();
        let mut h = harness(EffectChain::with_format(format()), &store);

        let slot = ChainSlot::instantiate(ModuleId(5), EffectKind::Distortion, &format());
        h.commands.send(chain_cmd(1, ChainCommand::Insert { position: 0, slot })).unwrap();
        assert!(h.capture.write_samples(&[0.5; 64]));
        h.processor.process_cycle();

        assert_eq!(h.atomics.bound_generation(), 1);
        assert_eq!(h.processor.chain().len(), 1);
        let mut out = vec![0.0; 64];
        h.playback.read_samples(&mut out);
        assert!(out.iter().all(|&s| s == 0.25));

        h.commands.send(chain_cmd(2, ChainCommand::Remove(ModuleId(5)))).unwrap();
        h.commands.send(chain_cmd(3, ChainCommand::Remove(ModuleId(5)))).unwrap();
        h.processor.process_cycle();
        assert!(h.processor.chain().is_empty());
        assert_eq!(h.atomics.bound_generation(), 3);
        assert!(drain(&mut h.events).contains(&PipelineEvent::ChainRejected {
            generation: 3,
            error: ChainError::UnknownModule(ModuleId(5)),
        }));
    }

    #[test]
    fn test_replace_rejects_other_format() {
        let store = ParamStore::new();
        let mut h = harness(EffectChain::with_format(format()), &store);
        let other = EffectChain::with_format(FrameFormat::mono(48000, 64).unwrap());
        h.commands
            .send(chain_cmd(1, ChainCommand::Replace(Owned::new(&gc_handle(), other))))
            .unwrap();
        h.processor.process_cycle();

        assert_eq!(h.processor.chain().format(), &format());
        assert_eq!(
            drain(&mut h.events),
            vec![PipelineEvent::ChainRejected {
                generation: 1,
                error: ChainError::FormatMismatch
            }]
        );
    }

    #[test]
    fn test_module_fault_reported_and_silenced() {
        let store = ParamStore::new();
        let mut h = harness(chain_with(&[EffectKind::Gain]), &store);
        let mut bad = vec![0.1; 64];
        bad[10] = f32::NAN;
        assert!(h.capture.write_samples(&bad));
        assert_eq!(h.processor.process_cycle(), CycleOutcome::Processed);

        let mut out = vec![1.0; 64];
        assert!(h.playback.read_samples(&mut out));
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(h.atomics.module_faults(), 1);
        assert!(matches!(
            drain(&mut h.events)[..],
            [PipelineEvent::ModuleFault { module: ModuleId(0), kind: EffectKind::Gain, .. }]
        ));
    }

    #[test]
    fn test_pause_and_resume() {
        let store = ParamStore::new();
        let Harness {
            mut processor,
            mut capture,
            playback,
            mut commands,
            mut events,
            atomics,
            resync_mark,
            ..
        } = harness(EffectChain::with_format(format()), &store);
        let mut playback = PlaybackReader::new(playback, Arc::clone(&resync_mark));

        // Processed before the pause but never played
        assert!(capture.write_samples(&[0.05; 64]));
        assert_eq!(processor.process_cycle(), CycleOutcome::Processed);

        commands
            .send(EngineCommand::Transport(TransportCommand::Pause { reset_effects: false }))
            .unwrap();
        assert!(capture.write_samples(&[0.1; 64]));
        assert!(capture.write_samples(&[0.2; 64]));
        assert_eq!(processor.process_cycle(), CycleOutcome::Paused);
        assert_eq!(atomics.state(), ProcessorState::Paused);
        assert_eq!(playback.available_frames(), 1);

        commands.send(EngineCommand::Transport(TransportCommand::Resume)).unwrap();
        // Stale input discarded on resume
        assert_eq!(processor.process_cycle(), CycleOutcome::Idle);
        assert_eq!(resync_mark.load(Ordering::Acquire), 1);
        assert_eq!(
            drain(&mut events),
            vec![
                PipelineEvent::Paused { reset_effects: false },
                PipelineEvent::Resumed { realigned_frames: 2 }
            ]
        );

        // Fresh audio processed before playback notices the resume survives
        assert!(capture.write_samples(&[0.3; 64]));
        assert_eq!(processor.process_cycle(), CycleOutcome::Processed);
        let mut out = vec![0.0; 64];
        assert!(playback.read_or_silence(&mut out));
        assert!(out.iter().all(|&s| s == 0.3));
        assert_eq!(playback.stats().discarded(), 1);
        assert!(!playback.read_or_silence(&mut out));
    }

    #[test]
    fn test_input_starvation_counts_underruns() {
        let store = ParamStore::new();
        let mut h = harness(EffectChain::with_format(format()), &store);
        let input_stats = Arc::clone(h.capture.stats());

        // The first empty poll only starts the clock
        assert_eq!(h.processor.process_cycle(), CycleOutcome::Idle);
        assert_eq!(input_stats.underruns(), 0);

        std::thread::sleep(format().period() * 3);
        assert_eq!(h.processor.process_cycle(), CycleOutcome::Idle);
        assert_eq!(input_stats.underruns(), 1);

        // Arriving input ends the stretch
        assert!(h.capture.write_samples(&[0.1; 64]));
        assert_eq!(h.processor.process_cycle(), CycleOutcome::Processed);
        assert_eq!(h.processor.process_cycle(), CycleOutcome::Idle);
        assert_eq!(input_stats.underruns(), 1);
    }

    #[test]
    fn test_pause_with_reset_flushes_modules() {
        let store = ParamStore::new();
        let mut h = harness(chain_with(&[EffectKind::Echo]), &store);
        let mut impulse = vec![0.0; 64];
        impulse[0] = 1.0;
        assert!(h.capture.write_samples(&impulse));
        h.processor.process_cycle();

        h.commands
            .send(EngineCommand::Transport(TransportCommand::Pause { reset_effects: true }))
            .unwrap();
        h.commands.send(EngineCommand::Transport(TransportCommand::Resume)).unwrap();
        h.processor.process_cycle();

        let mut out = vec![0.0; 64];
        h.playback.read_samples(&mut out);
        for _ in 0..200 {
            assert!(h.capture.write_samples(&[0.0; 64]));
            h.processor.process_cycle();
            assert!(h.playback.read_samples(&mut out));
            assert!(out.iter().all(|&s| s == 0.0));
        }
    }

    #[test]
    fn test_stop_and_device_fault_are_terminal() {
        let store = ParamStore::new();
        let mut h = harness(EffectChain::with_format(format()), &store);
        h.atomics.request_stop();
        assert_eq!(h.processor.process_cycle(), CycleOutcome::Stopped);
        assert_eq!(h.processor.process_cycle(), CycleOutcome::Stopped);
        assert_eq!(drain(&mut h.events), vec![PipelineEvent::Stopped]);

        let mut h = harness(EffectChain::with_format(format()), &store);
        h.atomics.signal_device_fault();
        assert!(h.capture.write_samples(&[0.1; 64]));
        assert_eq!(h.processor.process_cycle(), CycleOutcome::DeviceFailed);
        assert_eq!(h.atomics.state(), ProcessorState::Failed);
        assert_eq!(drain(&mut h.events), vec![PipelineEvent::DeviceFailure]);
    }

    #[test]
    fn test_concurrent_chain_swaps() {
        const SWAPS: u64 = 10_000;
        // Three trim levels; every output frame must carry exactly one
        let trims = [0.25f32, 0.5, 0.75];
        let input = 0.5f32;

        let mut store = ParamStore::new();
        for (i, &trim) in trims.iter().enumerate() {
            store.register(ModuleId(i as u32), EffectKind::Distortion.info());
            store.set(ModuleId(i as u32), "trim", trim).unwrap();
        }

        let format = format();
        let Harness {
            mut processor,
            mut capture,
            mut playback,
            mut commands,
            atomics,
            ..
        } = harness(EffectChain::with_format(format), &store);

        let worker_atomics = Arc::clone(&atomics);
        let worker = std::thread::spawn(move || {
            let expected: Vec<f32> = trims.iter().map(|t| input * t).collect();
            let mut out = vec![0.0; 64];
            let mut frames = 0u64;
            while worker_atomics.bound_generation() < SWAPS {
                capture.write_samples(&[input; 64]);
                processor.process_cycle();
                if playback.read_samples(&mut out) {
                    frames += 1;
                    assert_eq!(out.len(), 64);
                    let first = out[0];
                    assert!(out.iter().all(|&s| s == first), "mixed frame");
                    assert!(first == input || expected.contains(&first), "unexpected {first}");
                }
            }
            frames
        });

        for generation in 1..=SWAPS {
            let id = ModuleId((generation % 3) as u32);
            let slot = ChainSlot::instantiate(id, EffectKind::Distortion, &format);
            let chain = EffectChain::from_slots(format, [slot]).unwrap().with_generation(generation);
            while !commands.has_space() {
                std::thread::yield_now();
            }
            commands
                .send(chain_cmd(generation, ChainCommand::Replace(Owned::new(&gc_handle(), chain))))
                .unwrap();
        }

        let frames = worker.join().unwrap();
        assert!(frames > 0);
        assert_eq!(atomics.bound_generation(), SWAPS);
    }
}
