//! Dedicated audio thread
//!
//! Drives an [`AudioProcessor`] at the session frame rate: every wake-up
//! processes all input frames that are ready, then sleeps for a fraction of
//! the block period. Exits when the processor reports Stopped or a device
//! failure.

use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::processor::{AudioProcessor, CycleOutcome};

/// Name of the processing thread
pub const AUDIO_THREAD_NAME: &str = "vox-audio";

/// Wake-ups per block period while waiting for input
const POLLS_PER_PERIOD: u32 = 4;

/// Spawn the audio thread; the join handle yields the final outcome
pub fn spawn_audio_thread(mut processor: AudioProcessor) -> io::Result<JoinHandle<CycleOutcome>> {
    let idle_wait = (processor.format().period() / POLLS_PER_PERIOD).max(Duration::from_micros(100));

    thread::Builder::new().name(AUDIO_THREAD_NAME.to_string()).spawn(move || loop {
        match processor.process_cycle() {
            CycleOutcome::Processed => {}
            CycleOutcome::Idle | CycleOutcome::Paused => thread::sleep(idle_wait),
            outcome @ (CycleOutcome::Stopped | CycleOutcome::DeviceFailed) => return outcome,
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU64;
    use std::sync::Arc;

    use basedrop::Owned;

    use super::*;
    use crate::buffer::{frame_ring, visualization_feed};
    use crate::effect::EffectChain;
    use crate::engine::atomics::PipelineAtomics;
    use crate::engine::command::command_channel;
    use crate::engine::events::event_channel;
    use crate::engine::gc::gc_handle;
    use crate::engine::processor::ProcessorIo;
    use crate::params::ParamStore;
    use crate::types::FrameFormat;

    #[test]
    fn test_thread_processes_and_stops() {
        let format = FrameFormat::mono(44100, 128).unwrap();
        let store = ParamStore::new();
        let (mut capture, input) = frame_ring(&format, 8);
        let (output, mut playback) = frame_ring(&format, 8);
        let (visualization, _viz) = visualization_feed(&format, 2);
        let (_commands, command_rx) = command_channel(8);
        let (events, _event_rx) = event_channel(8);
        let atomics = Arc::new(PipelineAtomics::new());

        let processor = AudioProcessor::new(
            Owned::new(&gc_handle(), EffectChain::with_format(format)),
            store.reader(),
            ProcessorIo {
                input,
                output,
                visualization,
                commands: command_rx,
                events,
            },
            Arc::clone(&atomics),
            Arc::new(AtomicU64::new(0)),
            true,
        );
        let handle = spawn_audio_thread(processor).unwrap();

        for _ in 0..4 {
            assert!(capture.write_samples(&[0.25; 128]));
        }
        let mut out = vec![0.0; 128];
        let mut received = 0;
        for _ in 0..1000 {
            while playback.read_samples(&mut out) {
                assert!(out.iter().all(|&s| s == 0.25));
                received += 1;
            }
            if received == 4 {
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(received, 4);

        atomics.request_stop();
        assert_eq!(handle.join().unwrap(), CycleOutcome::Stopped);
    }
}
