use std::time::Duration;

/// Sub-beat resolution of the scheduler.
pub const TICKS_PER_BEAT: u64 = 12;

// ── Voices ────────────────────────────────────────────────────────────────────

/// One subdivision's sound source. Each voice owns a channel in the output graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Voice { Accent, Backbeat, Quarter, Eighth, Sixteenth, Triplet }

impl Voice {
    pub const COUNT: usize = 6;
    pub const ALL: [Voice; Voice::COUNT] = [
        Self::Accent, Self::Backbeat, Self::Quarter,
        Self::Eighth, Self::Sixteenth, Self::Triplet,
    ];

    #[inline]
    pub fn index(self) -> usize { self as usize }

    pub fn name(self) -> &'static str {
        match self {
            Self::Accent    => "Accent",
            Self::Backbeat  => "Backbeat",
            Self::Quarter   => "4th",
            Self::Eighth    => "8th",
            Self::Sixteenth => "16th",
            Self::Triplet   => "Triplet",
        }
    }
}

// ── Tone mode ─────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ToneMode {
    #[default]
    Electronic,
    Woody,
}

impl ToneMode {
    pub fn next(self) -> Self {
        match self { Self::Electronic => Self::Woody, Self::Woody => Self::Electronic }
    }
    pub fn name(self) -> &'static str {
        match self { Self::Electronic => "Electronic", Self::Woody => "Woody" }
    }
}

// ── Mixer levels ──────────────────────────────────────────────────────────────

/// Linear volumes in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Mix {
    pub master:    f32,
    pub accent:    f32,
    pub backbeat:  f32,
    pub quarter:   f32,
    pub eighth:    f32,
    pub sixteenth: f32,
    pub triplet:   f32,
    /// Attenuation applied to every voice during a muted bar.
    pub mute_dim:  f32,
}

impl Default for Mix {
    fn default() -> Self {
        Self {
            master: 0.8, accent: 0.8, backbeat: 0.0, quarter: 0.5,
            eighth: 0.0, sixteenth: 0.0, triplet: 0.0, mute_dim: 0.0,
        }
    }
}

impl Mix {
    pub fn voice(&self, voice: Voice) -> f32 {
        match voice {
            Voice::Accent    => self.accent,
            Voice::Backbeat  => self.backbeat,
            Voice::Quarter   => self.quarter,
            Voice::Eighth    => self.eighth,
            Voice::Sixteenth => self.sixteenth,
            Voice::Triplet   => self.triplet,
        }
    }

    pub fn voice_mut(&mut self, voice: Voice) -> &mut f32 {
        match voice {
            Voice::Accent    => &mut self.accent,
            Voice::Backbeat  => &mut self.backbeat,
            Voice::Quarter   => &mut self.quarter,
            Voice::Eighth    => &mut self.eighth,
            Voice::Sixteenth => &mut self.sixteenth,
            Voice::Triplet   => &mut self.triplet,
        }
    }
}

// ── Control state ─────────────────────────────────────────────────────────────

/// Full configuration snapshot driving scheduling and mixing.
///
/// The engine never mutates a pushed snapshot; the application edits its own
/// copy and pushes a fresh one through `Metronome::update_control_state`.
#[derive(Clone, Debug, PartialEq)]
pub struct ControlState {
    pub bpm:            u32,
    pub beats_per_bar:  u32,
    pub play_bars:      u32,
    pub mute_bars:      u32,
    pub random_training: bool,
    pub force_play:     bool,
    pub rnd_play_min:   u32,
    pub rnd_play_max:   u32,
    pub rnd_mute_min:   u32,
    pub rnd_mute_max:   u32,
    pub mix:            Mix,
    /// Per-voice "keeps sounding during mute bars", indexed by `Voice::index`.
    pub audible_in_mute: [bool; Voice::COUNT],
    pub tone_mode:      ToneMode,
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            bpm:             120,
            beats_per_bar:   4,
            play_bars:       3,
            mute_bars:       1,
            random_training: false,
            force_play:      false,
            rnd_play_min:    1,
            rnd_play_max:    2,
            rnd_mute_min:    1,
            rnd_mute_max:    2,
            mix:             Mix::default(),
            audible_in_mute: [false; Voice::COUNT],
            tone_mode:       ToneMode::Electronic,
        }
    }
}

impl ControlState {
    #[inline]
    pub fn safe_bpm(&self) -> u32 { self.bpm.max(1) }

    #[inline]
    pub fn ticks_per_bar(&self) -> u64 {
        TICKS_PER_BEAT * u64::from(self.beats_per_bar.max(1))
    }

    /// Period of the tick timer: `60 / bpm / 12` seconds.
    pub fn tick_interval(&self) -> Duration {
        let seconds = 60.0 / f64::from(self.safe_bpm()) / TICKS_PER_BEAT as f64;
        Duration::from_nanos(((seconds * 1e9) as u64).max(1))
    }

    pub fn beat_interval(&self) -> Duration {
        Duration::from_secs_f64(60.0 / f64::from(self.safe_bpm()))
    }

    #[inline]
    pub fn audible_during_mute(&self, voice: Voice) -> bool {
        self.audible_in_mute[voice.index()]
    }

    /// Enforce the caller-side range invariants before a push: every random
    /// bound is at least 1 and each max is raised to its min.
    pub fn normalized(mut self) -> Self {
        self.bpm            = self.bpm.max(1);
        self.beats_per_bar  = self.beats_per_bar.max(1);
        self.rnd_play_min   = self.rnd_play_min.max(1);
        self.rnd_mute_min   = self.rnd_mute_min.max(1);
        self.rnd_play_max   = self.rnd_play_max.max(self.rnd_play_min);
        self.rnd_mute_max   = self.rnd_mute_max.max(self.rnd_mute_min);
        let m = &mut self.mix;
        for v in [
            &mut m.master, &mut m.accent, &mut m.backbeat, &mut m.quarter,
            &mut m.eighth, &mut m.sixteenth, &mut m.triplet, &mut m.mute_dim,
        ] {
            *v = v.clamp(0.0, 1.0);
        }
        self
    }
}

// ── Tick coordinate ───────────────────────────────────────────────────────────

/// Bar/beat/tick position derived from the scheduler's running tick count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickCoord {
    /// Sub-tick within the beat, `0..12`.
    pub tick: u64,
    /// 1-based beat within the bar.
    pub beat: u64,
    /// 1-based bar number.
    pub bar: u64,
    /// True on the first tick of a bar.
    pub bar_head: bool,
}

impl TickCoord {
    pub fn at(total_ticks: u64, ticks_per_bar: u64) -> Self {
        let tpb = ticks_per_bar.max(1);
        let in_bar = total_ticks % tpb;
        Self {
            tick:     total_ticks % TICKS_PER_BEAT,
            beat:     in_bar / TICKS_PER_BEAT + 1,
            bar:      total_ticks / tpb + 1,
            bar_head: in_bar == 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_interval_at_120_bpm() {
        let c = ControlState { bpm: 120, ..ControlState::default() };
        let secs = c.tick_interval().as_secs_f64();
        assert!((secs - 60.0 / 120.0 / 12.0).abs() < 1e-9, "secs={secs}");
    }

    #[test]
    fn zero_bpm_is_clamped() {
        let c = ControlState { bpm: 0, ..ControlState::default() };
        assert_eq!(c.tick_interval(), Duration::from_secs(5));
    }

    #[test]
    fn coordinates_walk_through_a_bar() {
        let tpb = 12 * 3;
        assert_eq!(TickCoord::at(0, tpb), TickCoord { tick: 0, beat: 1, bar: 1, bar_head: true });
        assert_eq!(TickCoord::at(13, tpb), TickCoord { tick: 1, beat: 2, bar: 1, bar_head: false });
        assert_eq!(TickCoord::at(35, tpb), TickCoord { tick: 11, beat: 3, bar: 1, bar_head: false });
        assert_eq!(TickCoord::at(36, tpb), TickCoord { tick: 0, beat: 1, bar: 2, bar_head: true });
    }

    #[test]
    fn normalized_raises_max_to_min() {
        let c = ControlState {
            rnd_play_min: 3, rnd_play_max: 1,
            rnd_mute_min: 0, rnd_mute_max: 0,
            ..ControlState::default()
        }
        .normalized();
        assert_eq!((c.rnd_play_min, c.rnd_play_max), (3, 3));
        assert_eq!((c.rnd_mute_min, c.rnd_mute_max), (1, 1));
    }
}
