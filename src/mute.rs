//! Per-bar mute decisions for the training patterns.
//!
//! The pattern is evaluated once per bar, at the bar-head tick. Fixed mode is
//! a pure function of the bar number; random mode walks a two-phase state
//! machine whose run lengths are drawn from the configured bounds.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::control::ControlState;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase { Play, Mute }

impl Phase {
    fn flipped(self) -> Self {
        match self { Self::Play => Self::Mute, Self::Mute => Self::Play }
    }
}

/// Inclusive bar-count bounds for one random phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunBounds {
    pub min: u32,
    pub max: u32,
}

impl RunBounds {
    /// Lower bound is at least 1; upper bound is silently raised to the lower.
    pub fn new(min: u32, max: u32) -> Self {
        let min = min.max(1);
        Self { min, max: max.max(min) }
    }

    pub fn draw<R: Rng>(self, rng: &mut R) -> u32 {
        rng.gen_range(self.min..=self.max)
    }
}

/// Which pattern applies to the current bar.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrainingMode {
    Fixed { play_bars: u32, mute_bars: u32 },
    Random { play: RunBounds, mute: RunBounds },
}

impl TrainingMode {
    pub fn from_control(c: &ControlState) -> Self {
        if c.random_training {
            Self::Random {
                play: RunBounds::new(c.rnd_play_min, c.rnd_play_max),
                mute: RunBounds::new(c.rnd_mute_min, c.rnd_mute_max),
            }
        } else {
            Self::Fixed { play_bars: c.play_bars, mute_bars: c.mute_bars }
        }
    }
}

/// Fixed cycle: the last `mute_bars` of every `play_bars + mute_bars` bars are muted.
pub fn fixed_cycle_muted(bar: u64, play_bars: u32, mute_bars: u32) -> bool {
    let cycle = (u64::from(play_bars) + u64::from(mute_bars)).max(1);
    let offset = (bar.max(1) - 1) % cycle;
    offset >= u64::from(play_bars)
}

// ── Engine ────────────────────────────────────────────────────────────────────

pub struct MuteEngine {
    phase:          Phase,
    bars_remaining: u32,
    rng:            StdRng,
}

impl MuteEngine {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_rng(rng: StdRng) -> Self {
        Self { phase: Phase::Play, bars_remaining: 1, rng }
    }

    /// Back to a play run at playback start. The first run length is seeded
    /// from `play_bars`, not drawn from the random bounds.
    pub fn reset(&mut self, control: &ControlState) {
        self.phase = Phase::Play;
        self.bars_remaining = control.play_bars.max(1);
    }

    pub fn phase(&self) -> Phase { self.phase }

    pub fn bars_remaining(&self) -> u32 { self.bars_remaining }

    /// Decide whether `bar` is muted. Random bookkeeping only advances when
    /// `bar_head` is set, and it advances even while force-play is on.
    pub fn evaluate(&mut self, bar: u64, bar_head: bool, control: &ControlState) -> bool {
        let mode = TrainingMode::from_control(control);

        if let (TrainingMode::Random { play, mute }, true) = (mode, bar_head) {
            self.bars_remaining = self.bars_remaining.saturating_sub(1);
            if self.bars_remaining == 0 {
                self.phase = self.phase.flipped();
                let bounds = match self.phase { Phase::Play => play, Phase::Mute => mute };
                self.bars_remaining = bounds.draw(&mut self.rng);
            }
        }

        if control.force_play {
            return false;
        }
        match mode {
            TrainingMode::Random { .. } => self.phase == Phase::Mute,
            TrainingMode::Fixed { play_bars, mute_bars } => fixed_cycle_muted(bar, play_bars, mute_bars),
        }
    }
}

impl Default for MuteEngine {
    fn default() -> Self { Self::new() }
}

// ── Per-bar cache ─────────────────────────────────────────────────────────────

/// Mute decision for the bar in progress, reused by every tick of that bar.
#[derive(Clone, Copy, Debug, Default)]
pub struct BarMute {
    bar:   Option<u64>,
    muted: bool,
}

impl BarMute {
    pub fn clear(&mut self) { self.bar = None; }

    /// Evaluate at a bar head, or whenever the bar number moved without one
    /// (a meter change mid-bar); otherwise return the cached value.
    pub fn resolve(&mut self, engine: &mut MuteEngine, bar: u64, bar_head: bool, control: &ControlState) -> bool {
        if bar_head || self.bar != Some(bar) {
            self.muted = engine.evaluate(bar, bar_head, control);
            self.bar = Some(bar);
        }
        self.muted
    }
}
