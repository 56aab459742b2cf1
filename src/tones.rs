//! Click and snare waveforms for every subdivision voice.
//!
//! Both tone modes share one algorithm: a sine fundamental plus a weighted
//! overtone under an exponential decay for clicks, and decaying noise over a
//! low sine body for the backbeat. Only the parameter table differs.

use std::f32::consts::TAU;
use std::sync::Arc;

use rand::Rng;

use crate::control::{ToneMode, Voice};

/// Overtone weight relative to the fundamental.
const OVERTONE_WEIGHT: f32 = 0.35;
const DEFAULT_HARMONIC: f32 = 1.8;

const SNARE_BODY_HZ: f32 = 220.0;
const SNARE_BODY_WEIGHT: f32 = 0.25;
const SNARE_NOISE_WEIGHT: f32 = 0.75;
const SNARE_DECAY: f32 = 34.0;

/// Sample rate and channel count of the device the bank was built for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputFormat {
    pub sample_rate: u32,
    pub channels:    u16,
}

impl Default for OutputFormat {
    fn default() -> Self { Self { sample_rate: 48_000, channels: 2 } }
}

// ── Parameter table ───────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq)]
enum ToneSpec {
    Click { freq: f32, duration: f32, decay: f32, gain: f32, harmonic: f32 },
    Snare { duration: f32, gain: f32 },
}

const fn click(freq: f32, duration: f32, decay: f32, gain: f32, harmonic: f32) -> ToneSpec {
    ToneSpec::Click { freq, duration, decay, gain, harmonic }
}

fn spec_for(mode: ToneMode, voice: Voice) -> ToneSpec {
    match (mode, voice) {
        (ToneMode::Electronic, Voice::Accent)    => click(1600.0, 0.045, 42.0, 1.0, DEFAULT_HARMONIC),
        (ToneMode::Electronic, Voice::Backbeat)  => ToneSpec::Snare { duration: 0.055, gain: 1.0 },
        (ToneMode::Electronic, Voice::Quarter)   => click(950.0, 0.035, 36.0, 1.0, DEFAULT_HARMONIC),
        (ToneMode::Electronic, Voice::Eighth)    => click(1250.0, 0.025, 42.0, 1.0, DEFAULT_HARMONIC),
        (ToneMode::Electronic, Voice::Sixteenth) => click(760.0, 0.020, 50.0, 1.0, DEFAULT_HARMONIC),
        (ToneMode::Electronic, Voice::Triplet)   => click(1080.0, 0.025, 42.0, 1.0, DEFAULT_HARMONIC),

        (ToneMode::Woody, Voice::Accent)    => click(620.0, 0.030, 95.0, 1.0, 2.1),
        (ToneMode::Woody, Voice::Backbeat)  => ToneSpec::Snare { duration: 0.050, gain: 0.85 },
        (ToneMode::Woody, Voice::Quarter)   => click(520.0, 0.025, 110.0, 0.9, 1.95),
        (ToneMode::Woody, Voice::Eighth)    => click(880.0, 0.020, 120.0, 0.75, 2.25),
        (ToneMode::Woody, Voice::Sixteenth) => click(760.0, 0.018, 130.0, 0.65, 2.4),
        (ToneMode::Woody, Voice::Triplet)   => click(700.0, 0.020, 120.0, 0.7, 2.2),
    }
}

// ── Synthesis ─────────────────────────────────────────────────────────────────

fn frame_count(sample_rate: u32, duration: f32) -> usize {
    ((sample_rate as f32 * duration) as usize).max(1)
}

fn render_click(sr: u32, freq: f32, duration: f32, decay: f32, gain: f32, harmonic: f32) -> Vec<f32> {
    let srf = sr as f32;
    (0..frame_count(sr, duration))
        .map(|i| {
            let t = i as f32 / srf;
            let env = (-t * decay).exp();
            let fundamental = (TAU * freq * t).sin();
            let overtone = OVERTONE_WEIGHT * (TAU * freq * harmonic * t).sin();
            (fundamental + overtone) * env * gain
        })
        .collect()
}

fn render_snare<R: Rng>(sr: u32, duration: f32, gain: f32, rng: &mut R) -> Vec<f32> {
    let srf = sr as f32;
    (0..frame_count(sr, duration))
        .map(|i| {
            let t = i as f32 / srf;
            let noise: f32 = rng.gen_range(-1.0..=1.0);
            let body = (TAU * SNARE_BODY_HZ * t).sin() * SNARE_BODY_WEIGHT;
            let env = (-t * SNARE_DECAY).exp();
            (noise * SNARE_NOISE_WEIGHT + body) * env * gain
        })
        .collect()
}

fn render<R: Rng>(spec: ToneSpec, sr: u32, rng: &mut R) -> Vec<f32> {
    match spec {
        ToneSpec::Click { freq, duration, decay, gain, harmonic } =>
            render_click(sr, freq, duration, decay, gain, harmonic),
        ToneSpec::Snare { duration, gain } => render_snare(sr, duration, gain, rng),
    }
}

// ── Bank ──────────────────────────────────────────────────────────────────────

/// One immutable mono buffer per voice. Replaced wholesale on regeneration;
/// instances already playing keep their own `Arc` and finish undisturbed.
#[derive(Clone, Debug)]
pub struct ToneBank {
    pub mode:   ToneMode,
    pub format: OutputFormat,
    buffers:    [Arc<[f32]>; Voice::COUNT],
}

impl ToneBank {
    pub fn generate(mode: ToneMode, format: OutputFormat) -> Self {
        Self::generate_with_rng(mode, format, &mut rand::thread_rng())
    }

    pub fn generate_with_rng<R: Rng>(mode: ToneMode, format: OutputFormat, rng: &mut R) -> Self {
        let sr = format.sample_rate.max(1);
        let buffers = Voice::ALL.map(|v| Arc::<[f32]>::from(render(spec_for(mode, v), sr, rng)));
        Self { mode, format, buffers }
    }

    #[inline]
    pub fn buffer(&self, voice: Voice) -> &Arc<[f32]> {
        &self.buffers[voice.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn bank(mode: ToneMode) -> ToneBank {
        let fmt = OutputFormat { sample_rate: 48_000, channels: 2 };
        ToneBank::generate_with_rng(mode, fmt, &mut StdRng::seed_from_u64(7))
    }

    #[test]
    fn buffer_lengths_follow_durations() {
        let b = bank(ToneMode::Electronic);
        assert_eq!(b.buffer(Voice::Accent).len(), (48_000.0f32 * 0.045) as usize);
        assert_eq!(b.buffer(Voice::Backbeat).len(), (48_000.0f32 * 0.055) as usize);
        assert_eq!(b.buffer(Voice::Sixteenth).len(), (48_000.0f32 * 0.020) as usize);
    }

    #[test]
    fn clicks_start_silent_and_decay() {
        let b = bank(ToneMode::Woody);
        let q = b.buffer(Voice::Quarter);
        assert_eq!(q[0], 0.0);
        let head: f32 = q[..q.len() / 4].iter().map(|s| s.abs()).fold(0.0, f32::max);
        let tail: f32 = q[3 * q.len() / 4..].iter().map(|s| s.abs()).fold(0.0, f32::max);
        assert!(tail < head * 0.5, "head={head} tail={tail}");
    }

    #[test]
    fn samples_stay_bounded() {
        for mode in [ToneMode::Electronic, ToneMode::Woody] {
            let b = bank(mode);
            for v in Voice::ALL {
                let peak = b.buffer(v).iter().map(|s| s.abs()).fold(0.0, f32::max);
                assert!(peak <= 1.35 + 1e-3, "{:?} {:?} peak={peak}", mode, v);
                assert!(peak > 0.0);
            }
        }
    }

    #[test]
    fn modes_differ_only_by_table() {
        let e = bank(ToneMode::Electronic);
        let w = bank(ToneMode::Woody);
        assert_ne!(e.buffer(Voice::Accent).len(), w.buffer(Voice::Accent).len());
        assert_eq!(e.mode, ToneMode::Electronic);
        assert_eq!(w.mode, ToneMode::Woody);
    }

    #[test]
    fn tiny_sample_rate_still_yields_one_frame() {
        let fmt = OutputFormat { sample_rate: 1, channels: 1 };
        let b = ToneBank::generate_with_rng(ToneMode::Electronic, fmt, &mut StdRng::seed_from_u64(1));
        for v in Voice::ALL {
            assert_eq!(b.buffer(v).len(), 1);
        }
    }
}
