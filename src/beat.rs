use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::visual::{visual_error, VisualClock};

pub const LOG_CAPACITY: usize = 400;

/// Emitted by the scheduler on the first tick of every beat.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BeatEvent {
    /// 1-based beat within the bar.
    pub beat:      u64,
    /// 1-based bar number.
    pub bar:       u64,
    pub is_mute:   bool,
    /// Captured at emission, after the tick's sounds were scheduled.
    pub timestamp: Instant,
}

// ── Timing log ────────────────────────────────────────────────────────────────

/// Rolling text log of beat timing, newest line last.
#[derive(Debug, Default)]
pub struct TimingLog {
    lines:     VecDeque<String>,
    last_beat: Option<Instant>,
}

impl TimingLog {
    pub fn new() -> Self { Self::default() }

    pub fn lines(&self) -> impl DoubleEndedIterator<Item = &str> + ExactSizeIterator {
        self.lines.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize { self.lines.len() }

    pub fn is_empty(&self) -> bool { self.lines.is_empty() }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.last_beat = None;
    }

    pub fn started(&mut self, bpm: u32) {
        self.last_beat = None;
        self.push(format!("[START] BPM:{bpm}"));
    }

    pub fn stopped(&mut self) {
        self.push("[STOP]".to_string());
    }

    /// Log one beat. Drift is the gap since the previous beat minus the
    /// nominal beat interval; the visual error is read off `clock` at the
    /// event's own timestamp.
    pub fn record(&mut self, ev: &BeatEvent, beat_interval: Duration, clock: &VisualClock) {
        let drift = match self.last_beat {
            Some(prev) => {
                let actual = ev.timestamp.saturating_duration_since(prev).as_secs_f64();
                format!("{:+.1}ms", (actual - beat_interval.as_secs_f64()) * 1000.0)
            }
            None => "N/A".to_string(),
        };
        self.last_beat = Some(ev.timestamp);

        let vis = clock.phase_at(ev.timestamp).map(visual_error).unwrap_or(0.0);
        let mode = if ev.is_mute { "MUTE" } else { "PLAY" };
        self.push(format!("[{mode}] Bar:{} Beat:{} (Df:{drift}) | Vis:{vis:.4}°", ev.bar, ev.beat));
    }

    fn push(&mut self, line: String) {
        tracing::debug!(target: "timing", "{line}");
        self.lines.push_back(line);
        while self.lines.len() > LOG_CAPACITY {
            self.lines.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(bar: u64, beat: u64, is_mute: bool, timestamp: Instant) -> BeatEvent {
        BeatEvent { beat, bar, is_mute, timestamp }
    }

    #[test]
    fn first_beat_has_no_drift() {
        let t0 = Instant::now();
        let mut clock = VisualClock::new(120);
        clock.start(true, t0);
        let mut log = TimingLog::new();
        log.started(120);
        log.record(&ev(1, 1, false, t0), Duration::from_millis(500), &clock);
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines, ["[START] BPM:120", "[PLAY] Bar:1 Beat:1 (Df:N/A) | Vis:0.0000°"]);
    }

    #[test]
    fn drift_is_actual_minus_expected() {
        let t0 = Instant::now();
        let clock = VisualClock::new(120);
        let mut log = TimingLog::new();
        let interval = Duration::from_millis(500);
        log.record(&ev(1, 1, false, t0), interval, &clock);
        log.record(&ev(1, 2, false, t0 + Duration::from_micros(502_300)), interval, &clock);
        log.record(&ev(2, 1, true, t0 + Duration::from_micros(1_001_000)), interval, &clock);
        let lines: Vec<&str> = log.lines().collect();
        assert!(lines[1].contains("(Df:+2.3ms)"), "{}", lines[1]);
        assert!(lines[2].starts_with("[MUTE] Bar:2 Beat:1 (Df:-1.3ms)"), "{}", lines[2]);
    }

    #[test]
    fn start_resets_drift_reference() {
        let t0 = Instant::now();
        let clock = VisualClock::new(60);
        let mut log = TimingLog::new();
        log.record(&ev(1, 1, false, t0), Duration::from_secs(1), &clock);
        log.stopped();
        log.started(60);
        log.record(&ev(1, 1, false, t0 + Duration::from_secs(7)), Duration::from_secs(1), &clock);
        assert!(log.lines().last().unwrap().contains("Df:N/A"));
    }

    #[test]
    fn log_is_capped() {
        let mut log = TimingLog::new();
        for bpm in 0..(LOG_CAPACITY as u32 + 25) {
            log.started(bpm);
        }
        assert_eq!(log.len(), LOG_CAPACITY);
        assert_eq!(log.lines().next(), Some("[START] BPM:25"));
        log.clear();
        assert!(log.is_empty());
    }
}
