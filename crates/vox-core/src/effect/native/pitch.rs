//! Pitch shift effect - time-domain overlap-add
//!
//! Every frame (one hop) starts a new Hann-windowed grain of `W` output
//! samples, where `W = max(4 × hop, 1024)`. A grain reads the input history
//! at `ratio` samples per output sample, so its content is pitched by
//! `ratio` while the grain itself lasts exactly `W` samples; overlapping
//! grains are summed into an accumulator and the first hop of it is emitted.
//!
//! Consecutive grains continue each other: grain `k + 1` starts reading where
//! grain `k` was one hop in. That keeps overlapping grains sample-identical
//! until the read position drifts out of the valid part of the history
//! (too close to the write head when shifting up, too far behind when
//! shifting down). Then the read position is spliced by about half a window,
//! and a short cross-correlation search picks the offset where the waveform
//! lines up best with where it would have continued.
//!
//! The ratio is latched per grain, so a change only takes effect at the next
//! window boundary. A ratio of exactly 1.0 leaves the frame untouched; the
//! grain engine keeps running underneath so switching in and out of
//! identity is a one-frame crossfade rather than a restart.

use std::f64::consts::TAU;

use crate::effect::{Effect, EffectFault, EffectInfo, ParamInfo};
use crate::params::ModuleParams;
use crate::types::{Frame, FrameFormat};

/// Shortest analysis window
const MIN_WINDOW: usize = 1024;

/// Longest correlation segment used to align a splice
const MAX_CORRELATION_LEN: usize = 256;

/// Largest offset searched either side of a nominal splice
const MAX_SEARCH: usize = 128;

const MAX_SEMITONES: f32 = 12.0;

const SEMITONES: usize = 0;

static PARAMS: [ParamInfo; 1] = [ParamInfo::new("semitones", 0.0)
    .with_range(-MAX_SEMITONES, MAX_SEMITONES)
    .with_unit("st")];

pub static PITCH_SHIFT_INFO: EffectInfo = EffectInfo {
    name: "Pitch Shift",
    category: "Pitch",
    params: &PARAMS,
};

/// Convert a semitone offset to a playback ratio (0 → exactly 1.0)
#[inline]
pub fn semitones_to_ratio(semitones: f32) -> f64 {
    2f64.powf(semitones as f64 / 12.0)
}

/// Overlap-add pitch shifter
///
/// Parameters:
/// - semitones: Shift in semitones (-12 to +12)
pub struct PitchShiftEffect {
    hop: usize,
    window_len: usize,
    /// Hann window pre-scaled by the overlap-add normalization
    window: Vec<f32>,
    /// Per-channel input history, power-of-two length
    history: Vec<Vec<f32>>,
    mask: u64,
    /// Absolute count of input samples written (per channel)
    written: u64,
    /// Per-channel overlap-add accumulator, one window long
    accum: Vec<Vec<f32>>,
    /// Read position (absolute input index) of the newest grain
    read_pos: f64,
    /// Ratio latched for the newest grain
    ratio: f64,
    primed: bool,
    was_identity: bool,
    nominal_lag: f64,
    max_lag: f64,
    splice: f64,
}

impl PitchShiftEffect {
    pub fn new(format: &FrameFormat) -> Self {
        let hop = format.block_size();
        let window_len = (4 * hop).max(MIN_WINDOW);
        let history_len = (4 * window_len).next_power_of_two();
        let channels = format.channels();

        // Periodic Hann sums to W / (2H) at hop H
        let norm = 2.0 * hop as f64 / window_len as f64;
        let window = (0..window_len)
            .map(|i| ((0.5 - 0.5 * (TAU * i as f64 / window_len as f64).cos()) * norm) as f32)
            .collect();

        Self {
            hop,
            window_len,
            window,
            history: vec![vec![0.0; history_len]; channels],
            mask: history_len as u64 - 1,
            // Treat the zeroed history as already written
            written: history_len as u64,
            accum: vec![vec![0.0; window_len]; channels],
            read_pos: 0.0,
            ratio: 1.0,
            primed: false,
            was_identity: true,
            // Middle of the valid lag range at the largest ratio (2.0)
            nominal_lag: (3 * window_len) as f64,
            max_lag: (history_len - 2) as f64,
            splice: (window_len / 2) as f64,
        }
    }

    /// Analysis window length in samples
    pub fn window_len(&self) -> usize {
        self.window_len
    }

    /// Ratio latched for the most recent grain
    pub fn current_ratio(&self) -> f64 {
        self.ratio
    }

    fn write_history(&mut self, frame: &Frame) {
        let channels = frame.channels();
        for (i, group) in frame.as_slice().chunks_exact(channels).enumerate() {
            let idx = ((self.written + i as u64) & self.mask) as usize;
            for (history, &x) in self.history.iter_mut().zip(group) {
                history[idx] = x;
            }
        }
        self.written += frame.frames() as u64;
    }

    #[inline]
    fn sample_at(history: &[f32], mask: u64, pos: f64) -> f32 {
        let whole = pos.floor();
        let frac = (pos - whole) as f32;
        let idx = whole as u64;
        let a = history[(idx & mask) as usize];
        let b = history[((idx + 1) & mask) as usize];
        a + (b - a) * frac
    }

    /// Choose where the next grain reads from
    fn place_grain(&mut self, ratio: f64) {
        let total = self.written as f64;
        let min_lag = self.window_len as f64 * ratio + 2.0;

        let continued = if self.primed {
            self.read_pos + self.hop as f64 * self.ratio
        } else {
            total - self.nominal_lag
        };
        self.primed = true;

        let lag = total - continued;
        self.read_pos = if lag < min_lag || lag > self.max_lag {
            self.splice_from(continued, min_lag)
        } else {
            continued
        };
        self.ratio = ratio;
    }

    /// Move the read position back into the valid lag range, aligned with
    /// the waveform at `continued`
    fn splice_from(&self, continued: f64, min_lag: f64) -> f64 {
        let total = self.written as f64;
        let max_lag = self.max_lag;
        let in_range = |pos: f64| {
            let lag = total - pos;
            lag >= min_lag && lag <= max_lag
        };

        let mut target = continued;
        for _ in 0..16 {
            if total - target < min_lag {
                target -= self.splice;
            } else if total - target > max_lag {
                target += self.splice;
            } else {
                break;
            }
        }
        if !in_range(target) {
            target = total - self.nominal_lag.clamp(min_lag, max_lag);
        }

        // Offsets keeping the spliced position inside the valid range
        let search = MAX_SEARCH.min(self.window_len / 4) as f64;
        let lo = (total - max_lag - target).ceil().max(-search);
        let hi = (total - min_lag - target).floor().min(search);
        if lo > hi {
            return target;
        }

        // The continuation must itself be readable to compare against
        let continued_lag = total - continued;
        let len = MAX_CORRELATION_LEN
            .min(self.window_len / 2)
            .min((continued_lag - 2.0).max(0.0) as usize);
        if len < 16 || continued_lag > max_lag {
            return target;
        }

        let history = &self.history[0];
        let mask = self.mask;
        let reference = continued.floor() as u64;
        let base = target.floor() as i64;

        let mut best_offset = 0.0;
        let mut best_score = f64::NEG_INFINITY;
        let mut offset = lo as i64;
        while offset <= hi as i64 {
            let candidate = (base + offset) as u64;
            let mut dot = 0.0f64;
            let mut energy = 1e-9f64;
            for i in 0..len as u64 {
                let r = history[((reference + i) & mask) as usize] as f64;
                let c = history[((candidate + i) & mask) as usize] as f64;
                dot += r * c;
                energy += c * c;
            }
            let score = dot / energy.sqrt();
            if score > best_score {
                best_score = score;
                best_offset = offset as f64;
            }
            offset += 1;
        }
        target + best_offset
    }

    fn synthesize_grain(&mut self) {
        let mask = self.mask;
        for (history, accum) in self.history.iter().zip(&mut self.accum) {
            let mut pos = self.read_pos;
            for (acc, &w) in accum.iter_mut().zip(&self.window) {
                *acc += w * Self::sample_at(history, mask, pos);
                pos += self.ratio;
            }
        }
    }

    /// Emit the finished hop from the accumulator into `frame`
    fn emit(&mut self, frame: &mut Frame, fade: Option<bool>) {
        let channels = frame.channels();
        let hop = frame.frames();
        for (i, group) in frame.iter_frames_mut().enumerate() {
            // fade: Some(true) = dry → wet, Some(false) = wet → dry
            let t = (i + 1) as f32 / hop as f32;
            for (c, sample) in group.iter_mut().enumerate().take(channels) {
                let wet = self.accum[c][i];
                *sample = match fade {
                    None => wet,
                    Some(true) => *sample + (wet - *sample) * t,
                    Some(false) => wet + (*sample - wet) * t,
                };
            }
        }
    }

    fn advance_accum(&mut self) {
        let hop = self.hop;
        for accum in &mut self.accum {
            accum.copy_within(hop.., 0);
            let len = accum.len();
            accum[len - hop..].fill(0.0);
        }
    }
}

impl Effect for PitchShiftEffect {
    fn process(&mut self, frame: &mut Frame, params: &ModuleParams<'_>) -> Result<(), EffectFault> {
        let semitones = params.get(SEMITONES);
        let semitones = if semitones.is_nan() { 0.0 } else { semitones.clamp(-MAX_SEMITONES, MAX_SEMITONES) };
        let ratio = semitones_to_ratio(semitones);
        let identity = ratio == 1.0;

        self.write_history(frame);
        self.place_grain(ratio);
        self.synthesize_grain();

        match (self.was_identity, identity) {
            (true, true) => {}
            (false, false) => self.emit(frame, None),
            (true, false) => self.emit(frame, Some(true)),
            (false, true) => self.emit(frame, Some(false)),
        }
        self.advance_accum();
        self.was_identity = identity;
        Ok(())
    }

    fn reset(&mut self) {
        for history in &mut self.history {
            history.fill(0.0);
        }
        for accum in &mut self.accum {
            accum.fill(0.0);
        }
        self.written = self.mask + 1;
        self.primed = false;
        self.was_identity = true;
        self.ratio = 1.0;
    }

    fn info(&self) -> &'static EffectInfo {
        &PITCH_SHIFT_INFO
    }

    fn latency_samples(&self) -> u32 {
        if self.was_identity {
            0
        } else {
            self.nominal_lag as u32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::native::testing::{mono, run, sine, tone_amplitude, SR};

    fn noise(len: usize) -> Vec<f32> {
        let mut state = 0x2545_f491u32;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state as f32 / u32::MAX as f32) * 2.0 - 1.0
            })
            .collect()
    }

    #[test]
    fn test_semitone_ratio() {
        assert_eq!(semitones_to_ratio(0.0), 1.0);
        assert!((semitones_to_ratio(12.0) - 2.0).abs() < 1e-12);
        assert!((semitones_to_ratio(-12.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_window_sizing() {
        assert_eq!(PitchShiftEffect::new(&mono(256)).window_len(), 1024);
        assert_eq!(PitchShiftEffect::new(&mono(64)).window_len(), 1024);
        assert_eq!(PitchShiftEffect::new(&mono(512)).window_len(), 2048);
    }

    #[test]
    fn test_unity_ratio_is_bit_exact() {
        let format = mono(256);
        let mut shifter = PitchShiftEffect::new(&format);
        let input = noise(SR as usize / 4);
        let out = run(&mut shifter, &format, &[0.0], &input);
        assert_eq!(out, input);
    }

    #[test]
    fn test_octave_up() {
        let format = mono(256);
        let mut shifter = PitchShiftEffect::new(&format);
        let input = sine(440.0, SR as usize, 0.5);
        let out = run(&mut shifter, &format, &[12.0], &input);
        let tail = &out[SR as usize / 2..];

        let shifted = tone_amplitude(tail, 880.0);
        let original = tone_amplitude(tail, 440.0);
        assert!(shifted > 0.2, "880Hz amplitude {shifted}");
        assert!(shifted > 4.0 * original, "880Hz {shifted} vs 440Hz {original}");
    }

    #[test]
    fn test_octave_down() {
        let format = mono(256);
        let mut shifter = PitchShiftEffect::new(&format);
        let input = sine(440.0, SR as usize, 0.5);
        let out = run(&mut shifter, &format, &[-12.0], &input);
        let tail = &out[SR as usize / 2..];

        let shifted = tone_amplitude(tail, 220.0);
        let original = tone_amplitude(tail, 440.0);
        assert!(shifted > 0.2, "220Hz amplitude {shifted}");
        assert!(shifted > 4.0 * original, "220Hz {shifted} vs 440Hz {original}");
    }

    #[test]
    fn test_ratio_latched_per_window() {
        let format = mono(256);
        let mut shifter = PitchShiftEffect::new(&format);
        let mut frame = Frame::silence(&format);
        let up = [7.0];
        shifter.process(&mut frame, &ModuleParams::from_values(&PITCH_SHIFT_INFO, &up)).unwrap();
        assert!((shifter.current_ratio() - semitones_to_ratio(7.0)).abs() < 1e-12);
    }

    #[test]
    fn test_return_to_identity_after_crossfade() {
        let format = mono(256);
        let mut shifter = PitchShiftEffect::new(&format);
        let input = noise(256 * 12);

        run(&mut shifter, &format, &[5.0], &input[..256 * 10]);
        // One crossfade frame, then exact pass-through
        run(&mut shifter, &format, &[0.0], &input[256 * 10..256 * 11]);
        let out = run(&mut shifter, &format, &[0.0], &input[256 * 11..]);
        assert_eq!(out, &input[256 * 11..]);
    }

    #[test]
    fn test_output_stays_finite_across_ratio_sweep() {
        let format = mono(128);
        let mut shifter = PitchShiftEffect::new(&format);
        let input = noise(128 * 200);
        let mut frame = Frame::silence(&format);
        for (i, chunk) in input.chunks_exact(128).enumerate() {
            let st = [((i % 25) as f32 - 12.0)];
            frame.copy_from_slice(chunk);
            shifter
                .process(&mut frame, &ModuleParams::from_values(&PITCH_SHIFT_INFO, &st))
                .unwrap();
            assert!(frame.is_finite());
            assert!(frame.peak() < 4.0);
        }
    }

    #[test]
    fn test_reset_silences() {
        let format = mono(256);
        let mut shifter = PitchShiftEffect::new(&format);
        run(&mut shifter, &format, &[-5.0], &noise(4096));
        shifter.reset();
        let out = run(&mut shifter, &format, &[-5.0], &vec![0.0; 4096]);
        assert!(out.iter().all(|&s| s == 0.0));
    }
}
