use std::time::Instant;

use crossbeam::channel::Receiver;

use crate::beat::{BeatEvent, TimingLog};
use crate::control::{ControlState, Voice};
use crate::metronome::Metronome;
use crate::mute::Phase;
use crate::visual::VisualClock;

pub const BPM_RANGE:           (u32, u32) = (40, 300);
pub const BEATS_PER_BAR_RANGE: (u32, u32) = (1, 8);
const BAR_COUNT_MAX: u32 = 16;
const VOLUME_STEP:   f32 = 0.05;
const DEFAULT_MASTER: f32 = 0.8;

// ── Focus ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// Tempo and meter.
    Tempo,
    /// Play/mute bar counts.
    Training,
    /// Per-voice levels.
    Mixer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingField { PlayBars, MuteBars, RndPlayMin, RndPlayMax, RndMuteMin, RndMuteMax }

impl TrainingField {
    pub const ALL: [TrainingField; 6] = [
        Self::PlayBars, Self::MuteBars,
        Self::RndPlayMin, Self::RndPlayMax, Self::RndMuteMin, Self::RndMuteMax,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::PlayBars   => "Play bars",
            Self::MuteBars   => "Mute bars",
            Self::RndPlayMin => "Rnd play min",
            Self::RndPlayMax => "Rnd play max",
            Self::RndMuteMin => "Rnd mute min",
            Self::RndMuteMax => "Rnd mute max",
        }
    }

    /// Fixed-cycle fields only matter outside random training and vice versa.
    pub fn is_random(self) -> bool {
        !matches!(self, Self::PlayBars | Self::MuteBars)
    }

    pub fn value(self, c: &ControlState) -> u32 {
        match self {
            Self::PlayBars   => c.play_bars,
            Self::MuteBars   => c.mute_bars,
            Self::RndPlayMin => c.rnd_play_min,
            Self::RndPlayMax => c.rnd_play_max,
            Self::RndMuteMin => c.rnd_mute_min,
            Self::RndMuteMax => c.rnd_mute_max,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixerChannel { Master, Voice(Voice), MuteDim }

impl MixerChannel {
    pub const ALL: [MixerChannel; 8] = [
        Self::Master,
        Self::Voice(Voice::Accent), Self::Voice(Voice::Backbeat), Self::Voice(Voice::Quarter),
        Self::Voice(Voice::Eighth), Self::Voice(Voice::Sixteenth), Self::Voice(Voice::Triplet),
        Self::MuteDim,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Master   => "Master",
            Self::Voice(v) => v.name(),
            Self::MuteDim  => "Mute dim",
        }
    }

    pub fn level(self, c: &ControlState) -> f32 {
        match self {
            Self::Master   => c.mix.master,
            Self::Voice(v) => c.mix.voice(v),
            Self::MuteDim  => c.mix.mute_dim,
        }
    }

    fn level_mut(self, c: &mut ControlState) -> &mut f32 {
        match self {
            Self::Master   => &mut c.mix.master,
            Self::Voice(v) => c.mix.voice_mut(v),
            Self::MuteDim  => &mut c.mix.mute_dim,
        }
    }
}

// ── App state ─────────────────────────────────────────────────────────────────

pub struct App {
    metronome:   Metronome,
    beats:       Receiver<BeatEvent>,
    /// Our editable copy; pushed to the engine after every change.
    pub control: ControlState,
    pub visual:  VisualClock,
    pub log:     TimingLog,
    /// Most recent beat while playing.
    pub current: Option<BeatEvent>,

    pub mode:           AppMode,
    pub training_field: usize,
    pub mixer_channel:  usize,
    previous_master:    f32,

    pub status_msg: String,
}

impl App {
    pub fn new(metronome: Metronome, control: ControlState) -> Self {
        let beats = metronome.beat_events();
        metronome.update_control_state(control.clone());
        Self {
            metronome,
            beats,
            visual:          VisualClock::new(control.bpm),
            control,
            log:             TimingLog::new(),
            current:         None,
            mode:            AppMode::Tempo,
            training_field:  0,
            mixer_channel:   0,
            previous_master: DEFAULT_MASTER,
            status_msg:      "Space to start".to_string(),
        }
    }

    pub fn is_playing(&self) -> bool { self.metronome.is_playing() }

    pub fn audio_ready(&self) -> bool { self.metronome.loaded_tones().is_some() }

    pub fn training_phase(&self) -> (Phase, u32) { self.metronome.training_phase() }

    fn push(&self) {
        self.metronome.update_control_state(self.control.clone());
    }

    // ── Transport ─────────────────────────────────────────────────────────

    pub fn toggle_play(&mut self) {
        if self.metronome.is_playing() {
            self.metronome.stop();
            self.visual.stop();
            self.log.stopped();
            self.current = None;
            self.status_msg = "Stopped".to_string();
        } else {
            self.push();
            self.metronome.start();
            self.visual.start(true, Instant::now());
            self.log.started(self.control.bpm);
            self.status_msg = if self.audio_ready() {
                format!("Playing at {} BPM", self.control.bpm)
            } else {
                "Playing without audio output".to_string()
            };
        }
    }

    /// Drain pending beat events into the timing log.
    pub fn poll_beats(&mut self) {
        while let Ok(ev) = self.beats.try_recv() {
            if !self.metronome.is_playing() {
                continue;
            }
            self.log.record(&ev, self.control.beat_interval(), &self.visual);
            self.current = Some(ev);
        }
    }

    /// Visual phase right now, `None` while stopped.
    pub fn phase(&self) -> Option<f64> {
        self.visual.phase_at(Instant::now())
    }

    // ── Tempo ─────────────────────────────────────────────────────────────

    pub fn set_bpm(&mut self, bpm: u32) {
        let bpm = bpm.clamp(BPM_RANGE.0, BPM_RANGE.1);
        if bpm == self.control.bpm {
            return;
        }
        self.visual.retempo(bpm, Instant::now());
        self.control.bpm = bpm;
        self.push();
        self.metronome.update_timing();
        self.status_msg = format!("BPM: {bpm}");
    }

    pub fn bpm_step(&mut self, delta: i32) {
        self.set_bpm(self.control.bpm.saturating_add_signed(delta));
    }

    pub fn beats_per_bar_step(&mut self, delta: i32) {
        let n = self.control.beats_per_bar.saturating_add_signed(delta)
            .clamp(BEATS_PER_BAR_RANGE.0, BEATS_PER_BAR_RANGE.1);
        self.control.beats_per_bar = n;
        self.push();
        self.status_msg = format!("Beats per bar: {n}");
    }

    // ── Training ──────────────────────────────────────────────────────────

    pub fn toggle_random(&mut self) {
        self.control.random_training = !self.control.random_training;
        self.push();
        self.status_msg = if self.control.random_training { "Training: random".to_string() }
                          else                            { "Training: fixed".to_string() };
    }

    pub fn toggle_force_play(&mut self) {
        self.control.force_play = !self.control.force_play;
        self.push();
        self.status_msg = if self.control.force_play { "Force play: on".to_string() }
                          else                       { "Force play: off".to_string() };
    }

    pub fn training_field(&self) -> TrainingField {
        TrainingField::ALL[self.training_field]
    }

    pub fn training_up(&mut self) {
        let n = TrainingField::ALL.len();
        self.training_field = if self.training_field == 0 { n - 1 } else { self.training_field - 1 };
    }

    pub fn training_down(&mut self) {
        self.training_field = (self.training_field + 1) % TrainingField::ALL.len();
    }

    /// Adjust the selected field, keeping every random max at or above its min.
    pub fn training_adjust(&mut self, delta: i32) {
        let field = self.training_field();
        let step = |v: u32, lo: u32| v.saturating_add_signed(delta).clamp(lo, BAR_COUNT_MAX);
        let c = &mut self.control;
        match field {
            TrainingField::PlayBars => c.play_bars = step(c.play_bars, 1),
            TrainingField::MuteBars => c.mute_bars = step(c.mute_bars, 0),
            TrainingField::RndPlayMin => {
                c.rnd_play_min = step(c.rnd_play_min, 1);
                c.rnd_play_max = c.rnd_play_max.max(c.rnd_play_min);
            }
            TrainingField::RndPlayMax => {
                c.rnd_play_max = step(c.rnd_play_max, 1);
                c.rnd_play_min = c.rnd_play_min.min(c.rnd_play_max);
            }
            TrainingField::RndMuteMin => {
                c.rnd_mute_min = step(c.rnd_mute_min, 1);
                c.rnd_mute_max = c.rnd_mute_max.max(c.rnd_mute_min);
            }
            TrainingField::RndMuteMax => {
                c.rnd_mute_max = step(c.rnd_mute_max, 1);
                c.rnd_mute_min = c.rnd_mute_min.min(c.rnd_mute_max);
            }
        }
        self.push();
        self.status_msg = format!("{}: {}", field.label(), field.value(&self.control));
    }

    // ── Mixer ─────────────────────────────────────────────────────────────

    pub fn mixer_channel(&self) -> MixerChannel {
        MixerChannel::ALL[self.mixer_channel]
    }

    pub fn mixer_up(&mut self) {
        let n = MixerChannel::ALL.len();
        self.mixer_channel = if self.mixer_channel == 0 { n - 1 } else { self.mixer_channel - 1 };
    }

    pub fn mixer_down(&mut self) {
        self.mixer_channel = (self.mixer_channel + 1) % MixerChannel::ALL.len();
    }

    pub fn mixer_adjust(&mut self, delta: f32) {
        let ch = self.mixer_channel();
        let level = ch.level_mut(&mut self.control);
        *level = ((*level + delta) * 100.0).round().clamp(0.0, 100.0) / 100.0;
        let pct = (*level * 100.0).round() as u32;
        self.push();
        self.status_msg = format!("{}: {}%", ch.label(), pct);
    }

    pub fn mixer_step(&mut self, up: bool) {
        self.mixer_adjust(if up { VOLUME_STEP } else { -VOLUME_STEP });
    }

    /// Flip "keeps sounding during mute bars" for the selected voice.
    pub fn toggle_audible_in_mute(&mut self) {
        let MixerChannel::Voice(v) = self.mixer_channel() else {
            self.status_msg = "Only voices can sound during mute".to_string();
            return;
        };
        let flag = &mut self.control.audible_in_mute[v.index()];
        *flag = !*flag;
        let on = *flag;
        self.push();
        self.status_msg = if on { format!("{} audible in mute bars", v.name()) }
                          else  { format!("{} silent in mute bars", v.name()) };
    }

    /// Master to zero and back, remembering the level it had.
    pub fn toggle_master_mute(&mut self) {
        if self.control.mix.master > 0.0 {
            self.previous_master = self.control.mix.master;
            self.control.mix.master = 0.0;
            self.status_msg = "Master muted".to_string();
        } else {
            self.control.mix.master = if self.previous_master > 0.0 { self.previous_master } else { DEFAULT_MASTER };
            self.status_msg = format!("Master: {:.0}%", self.control.mix.master * 100.0);
        }
        self.push();
    }

    pub fn cycle_tone(&mut self) {
        self.control.tone_mode = self.control.tone_mode.next();
        self.push();
        self.status_msg = format!("Tone: {}", self.control.tone_mode.name());
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
        self.status_msg = "Log cleared".to_string();
    }

    // ── Mode cycling ──────────────────────────────────────────────────────

    /// Cycle focus: Tempo → Training → Mixer → Tempo.
    pub fn toggle_mode(&mut self) {
        self.mode = match self.mode {
            AppMode::Tempo    => AppMode::Training,
            AppMode::Training => AppMode::Mixer,
            AppMode::Mixer    => AppMode::Tempo,
        };
        self.status_msg = match self.mode {
            AppMode::Tempo    => "Focus: Tempo".to_string(),
            AppMode::Training => "Focus: Training".to_string(),
            AppMode::Mixer    => "Focus: Mixer".to_string(),
        };
    }

    // ── Arrow keys, routed by focus ───────────────────────────────────────

    pub fn up(&mut self) {
        match self.mode {
            AppMode::Tempo    => self.bpm_step(1),
            AppMode::Training => self.training_up(),
            AppMode::Mixer    => self.mixer_up(),
        }
    }

    pub fn down(&mut self) {
        match self.mode {
            AppMode::Tempo    => self.bpm_step(-1),
            AppMode::Training => self.training_down(),
            AppMode::Mixer    => self.mixer_down(),
        }
    }

    pub fn left(&mut self) {
        match self.mode {
            AppMode::Tempo    => self.beats_per_bar_step(-1),
            AppMode::Training => self.training_adjust(-1),
            AppMode::Mixer    => self.mixer_step(false),
        }
    }

    pub fn right(&mut self) {
        match self.mode {
            AppMode::Tempo    => self.beats_per_bar_step(1),
            AppMode::Training => self.training_adjust(1),
            AppMode::Mixer    => self.mixer_step(true),
        }
    }

    pub fn shutdown(&mut self) {
        if self.metronome.is_playing() {
            self.metronome.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioOutput, VoiceGraph};
    use crate::tones::OutputFormat;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct NoDevice;

    impl AudioOutput for NoDevice {
        fn open(&mut self, _: Arc<Mutex<VoiceGraph>>) -> anyhow::Result<OutputFormat> {
            anyhow::bail!("no device")
        }
        fn resume(&mut self) -> anyhow::Result<()> { Ok(()) }
        fn pause(&mut self) {}
    }

    fn app() -> App {
        let control = ControlState::default();
        App::new(Metronome::new(Box::new(NoDevice), control.clone()), control)
    }

    #[test]
    fn focus_cycles_through_three_panels() {
        let mut a = app();
        assert_eq!(a.mode, AppMode::Tempo);
        a.toggle_mode();
        assert_eq!(a.mode, AppMode::Training);
        a.toggle_mode();
        assert_eq!(a.mode, AppMode::Mixer);
        a.toggle_mode();
        assert_eq!(a.mode, AppMode::Tempo);
    }

    #[test]
    fn tempo_keys_clamp() {
        let mut a = app();
        a.set_bpm(10);
        assert_eq!(a.control.bpm, BPM_RANGE.0);
        a.bpm_step(5);
        assert_eq!(a.control.bpm, 45);
        a.set_bpm(1_000);
        assert_eq!(a.control.bpm, BPM_RANGE.1);
        assert_eq!(a.visual.bpm(), BPM_RANGE.1);

        for _ in 0..20 {
            a.left();
        }
        assert_eq!(a.control.beats_per_bar, 1);
        for _ in 0..20 {
            a.right();
        }
        assert_eq!(a.control.beats_per_bar, 8);
    }

    #[test]
    fn random_bounds_stay_ordered() {
        let mut a = app();
        a.mode = AppMode::Training;
        a.training_field = 2; // rnd play min
        for _ in 0..5 {
            a.right();
        }
        assert_eq!(a.control.rnd_play_min, 6);
        assert_eq!(a.control.rnd_play_max, 6);

        a.down(); // rnd play max
        for _ in 0..10 {
            a.left();
        }
        assert_eq!(a.control.rnd_play_max, 1);
        assert_eq!(a.control.rnd_play_min, 1);
    }

    #[test]
    fn mute_bars_may_reach_zero() {
        let mut a = app();
        a.mode = AppMode::Training;
        a.training_field = 1;
        for _ in 0..5 {
            a.left();
        }
        assert_eq!(a.control.mute_bars, 0);
        a.training_field = 0;
        for _ in 0..5 {
            a.left();
        }
        assert_eq!(a.control.play_bars, 1);
    }

    #[test]
    fn mixer_steps_and_clamps() {
        let mut a = app();
        a.mode = AppMode::Mixer;
        a.down(); // accent
        for _ in 0..10 {
            a.right();
        }
        assert_eq!(a.control.mix.accent, 1.0);
        a.mixer_channel = MixerChannel::ALL.len() - 1;
        a.left();
        assert_eq!(a.control.mix.mute_dim, 0.0);
        a.right();
        assert!((a.control.mix.mute_dim - 0.05).abs() < 1e-6);
    }

    #[test]
    fn enter_toggles_audible_in_mute_for_voices_only() {
        let mut a = app();
        a.mixer_channel = 4; // 8th
        a.toggle_audible_in_mute();
        assert!(a.control.audible_in_mute[Voice::Eighth.index()]);
        a.toggle_audible_in_mute();
        assert!(!a.control.audible_in_mute[Voice::Eighth.index()]);

        a.mixer_channel = 0;
        a.toggle_audible_in_mute();
        assert!(a.control.audible_in_mute.iter().all(|&f| !f));
    }

    #[test]
    fn master_mute_restores_previous_level() {
        let mut a = app();
        a.control.mix.master = 0.6;
        a.toggle_master_mute();
        assert_eq!(a.control.mix.master, 0.0);
        a.toggle_master_mute();
        assert_eq!(a.control.mix.master, 0.6);

        // muted by dragging to zero: restore falls back to the last remembered level
        a.control.mix.master = 0.0;
        a.toggle_master_mute();
        assert_eq!(a.control.mix.master, 0.6);
    }

    #[test]
    fn start_logs_and_collects_beats() {
        let mut a = app();
        a.set_bpm(BPM_RANGE.0);
        a.toggle_play();
        assert!(a.is_playing());
        assert!(!a.audio_ready());
        assert!(a.phase().is_some());

        std::thread::sleep(Duration::from_millis(100));
        a.poll_beats();
        let first = a.current.expect("first beat");
        assert_eq!((first.bar, first.beat), (1, 1));

        a.toggle_play();
        assert!(!a.is_playing());
        assert!(a.phase().is_none());
        let lines: Vec<&str> = a.log.lines().collect();
        assert_eq!(lines[0], "[START] BPM:40");
        assert!(lines[1].starts_with("[PLAY] Bar:1 Beat:1 (Df:N/A)"));
        assert_eq!(*lines.last().unwrap(), "[STOP]");
    }
}
