//! Tick scheduler: a dedicated timer thread firing twelve ticks per beat.
//!
//! Every firing takes one short lock over the engine state (control
//! snapshot, tick counter, mute bookkeeping), then schedules sounds and
//! reports the beat with the lock released.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};

use crate::audio::{locked, AudioOutput, VoiceGraph};
use crate::beat::BeatEvent;
use crate::control::{ControlState, TickCoord, ToneMode};
use crate::dispatch::dispatch;
use crate::mute::{BarMute, MuteEngine, Phase};
use crate::tones::ToneBank;

/// Nice value requested for the timer thread.
#[cfg(unix)]
const TIMER_NICE: libc::c_int = -10;

struct EngineState {
    control:     ControlState,
    playing:     bool,
    total_ticks: u64,
    mute:        MuteEngine,
    bar_mute:    BarMute,
    /// Bumped on every stop and re-arm; a timer holding an older value is dead.
    generation:  u64,
    last_fire:   Option<Instant>,
    /// Present once the output opened; rendered for its format.
    tones:       Option<Arc<ToneBank>>,
}

/// Everything the timer thread touches.
struct Shared {
    state:   Mutex<EngineState>,
    graph:   Arc<Mutex<VoiceGraph>>,
    beat_tx: Sender<BeatEvent>,
}

pub struct Metronome {
    shared: Arc<Shared>,
    output: Box<dyn AudioOutput>,
    beats:  Receiver<BeatEvent>,
    /// Dropping this wakes and ends the running timer thread.
    timer:  Option<Sender<()>>,
}

impl Metronome {
    pub fn new(output: Box<dyn AudioOutput>, control: ControlState) -> Self {
        Self::with_mute_engine(output, control, MuteEngine::new())
    }

    pub fn with_mute_engine(output: Box<dyn AudioOutput>, control: ControlState, mute: MuteEngine) -> Self {
        let (beat_tx, beats) = channel::unbounded();
        let state = EngineState {
            control,
            playing:     false,
            total_ticks: 0,
            mute,
            bar_mute:    BarMute::default(),
            generation:  0,
            last_fire:   None,
            tones:       None,
        };
        let shared = Arc::new(Shared {
            state: Mutex::new(state),
            graph: Arc::new(Mutex::new(VoiceGraph::new())),
            beat_tx,
        });
        Self { shared, output, beats, timer: None }
    }

    // ── Transport ─────────────────────────────────────────────────────────────

    pub fn start(&mut self) {
        if self.is_playing() {
            return;
        }
        self.prepare_audio();

        let mut st = locked(&self.shared.state);
        st.playing = true;
        st.total_ticks = 0;
        st.last_fire = None;
        let control = st.control.clone();
        st.mute.reset(&control);
        st.bar_mute.clear();
        st.generation += 1;
        let generation = st.generation;
        drop(st);

        let interval = control.tick_interval();
        tracing::info!(bpm = control.safe_bpm(), beats_per_bar = control.beats_per_bar, "metronome started");
        self.arm(generation, Instant::now(), interval);
    }

    pub fn stop(&mut self) {
        {
            let mut st = locked(&self.shared.state);
            if !st.playing {
                return;
            }
            st.playing = false;
            st.generation += 1;
        }
        self.timer = None;
        locked(&self.shared.graph).silence();
        self.output.pause();
        tracing::info!(ticks = self.total_ticks(), "metronome stopped");
    }

    /// Re-arm the timer at the current tempo. The tick count and mute state
    /// carry over; the next tick lands one new interval after the last one.
    pub fn update_timing(&mut self) {
        let mut st = locked(&self.shared.state);
        if !st.playing {
            return;
        }
        st.generation += 1;
        let generation = st.generation;
        let interval = st.control.tick_interval();
        let bpm = st.control.safe_bpm();
        let now = Instant::now();
        let first = st.last_fire.map_or(now, |t| (t + interval).max(now));
        drop(st);

        tracing::debug!(bpm, ?interval, "timer re-armed");
        self.arm(generation, first, interval);
    }

    /// Replace the control snapshot. A tone-mode change regenerates the bank
    /// before the next tick can read it.
    pub fn update_control_state(&self, control: ControlState) {
        let mut st = locked(&self.shared.state);
        let regen = st
            .tones
            .as_ref()
            .filter(|bank| bank.mode != control.tone_mode)
            .map(|bank| bank.format);
        st.control = control;
        if let Some(format) = regen {
            let mode = st.control.tone_mode;
            st.tones = Some(Arc::new(ToneBank::generate(mode, format)));
            tracing::info!(mode = mode.name(), "tone bank regenerated");
        }
    }

    // ── Observers ─────────────────────────────────────────────────────────────

    /// Beat events, one per beat while playing. Cloned receivers share the stream.
    pub fn beat_events(&self) -> Receiver<BeatEvent> {
        self.beats.clone()
    }

    pub fn is_playing(&self) -> bool {
        locked(&self.shared.state).playing
    }

    pub fn total_ticks(&self) -> u64 {
        locked(&self.shared.state).total_ticks
    }

    /// Random-training phase and the bars left in it.
    pub fn training_phase(&self) -> (Phase, u32) {
        let st = locked(&self.shared.state);
        (st.mute.phase(), st.mute.bars_remaining())
    }

    /// Tone mode of the loaded bank; `None` while running without audio.
    pub fn loaded_tones(&self) -> Option<ToneMode> {
        locked(&self.shared.state).tones.as_ref().map(|bank| bank.mode)
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    /// Open the output on first use and resume it afterwards. Failure leaves
    /// the scheduler running silently.
    fn prepare_audio(&mut self) {
        if locked(&self.shared.state).tones.is_some() {
            if let Err(e) = self.output.resume() {
                tracing::warn!("{e:#}");
            }
            return;
        }
        match self.output.open(Arc::clone(&self.shared.graph)) {
            Ok(format) => {
                let mut st = locked(&self.shared.state);
                st.tones = Some(Arc::new(ToneBank::generate(st.control.tone_mode, format)));
            }
            Err(e) => tracing::warn!("audio unavailable, running silent: {e:#}"),
        }
    }

    fn arm(&mut self, generation: u64, first: Instant, interval: Duration) {
        let (cancel_tx, cancel_rx) = channel::bounded::<()>(0);
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("metronome-timer".into())
            .spawn(move || run_timer(&shared, generation, first, interval, &cancel_rx));
        match spawned {
            Ok(_) => self.timer = Some(cancel_tx),
            Err(e) => {
                tracing::error!("cannot spawn timer thread: {e}");
                self.timer = None;
            }
        }
    }
}

impl Drop for Metronome {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Timer thread ──────────────────────────────────────────────────────────────

fn run_timer(shared: &Shared, generation: u64, first: Instant, interval: Duration, cancel: &Receiver<()>) {
    raise_priority();
    let mut next = first;
    loop {
        match cancel.recv_deadline(next) {
            Err(RecvTimeoutError::Timeout) => {}
            _ => return,
        }
        if !shared.fire(generation) {
            return;
        }
        // Absolute deadlines; if we fell more than a tick behind, resync
        // instead of bursting.
        next += interval;
        let now = Instant::now();
        if now > next + interval {
            next = now;
        }
    }
}

impl Shared {
    /// One tick. Returns false once this timer's generation is stale.
    fn fire(&self, generation: u64) -> bool {
        let (coord, muted, control, tones) = {
            let mut guard = locked(&self.state);
            let st = &mut *guard;
            if !st.playing || st.generation != generation {
                return false;
            }
            st.last_fire = Some(Instant::now());
            let control = st.control.clone();
            let coord = TickCoord::at(st.total_ticks, control.ticks_per_bar());
            let muted = st.bar_mute.resolve(&mut st.mute, coord.bar, coord.bar_head, &control);
            st.total_ticks += 1;
            (coord, muted, control, st.tones.clone())
        };

        dispatch(coord.tick, coord.beat, muted, &control, tones.as_deref(), &self.graph);

        if coord.tick == 0 {
            let _ = self.beat_tx.send(BeatEvent {
                beat:      coord.beat,
                bar:       coord.bar,
                is_mute:   muted,
                timestamp: Instant::now(),
            });
        }
        true
    }
}

#[cfg(unix)]
fn raise_priority() {
    // SAFETY: plain syscall on the calling thread, no pointers involved.
    let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, TIMER_NICE) };
    if rc != 0 {
        tracing::debug!("timer priority unchanged: {}", std::io::Error::last_os_error());
    }
}

#[cfg(not(unix))]
fn raise_priority() {}
