use std::time::Instant;

/// Half-swing of the pendulum, in degrees.
pub const PENDULUM_SPREAD_DEG: f64 = 30.0;

/// Continuous beat-unit phase for the on-screen pendulum.
///
/// `phase(t) = anchor_phase + (t - anchor_time) * bpm / 60`. Purely cosmetic:
/// the tick scheduler never reads it.
#[derive(Clone, Copy, Debug)]
pub struct VisualClock {
    anchor_phase: f64,
    anchor_time:  Option<Instant>,
    bpm:          u32,
}

impl VisualClock {
    pub fn new(bpm: u32) -> Self {
        Self { anchor_phase: 0.0, anchor_time: None, bpm: bpm.max(1) }
    }

    pub fn bpm(&self) -> u32 { self.bpm }

    /// Anchor at phase 0 when `reset` is set or the clock was never anchored;
    /// otherwise keep counting from the existing anchor.
    pub fn start(&mut self, reset: bool, now: Instant) {
        if reset || self.anchor_time.is_none() {
            self.anchor_phase = 0.0;
            self.anchor_time = Some(now);
        }
    }

    pub fn stop(&mut self) {
        self.anchor_time = None;
        self.anchor_phase = 0.0;
    }

    /// Phase at `t`, or `None` while stopped.
    pub fn phase_at(&self, t: Instant) -> Option<f64> {
        let anchor = self.anchor_time?;
        let elapsed = t.saturating_duration_since(anchor).as_secs_f64();
        Some(self.anchor_phase + elapsed * f64::from(self.bpm) / 60.0)
    }

    /// Switch tempo without a visible jump: freeze the phase reached under the
    /// old tempo as the new anchor, then continue at the new rate.
    pub fn retempo(&mut self, bpm: u32, now: Instant) {
        if let Some(phase) = self.phase_at(now) {
            self.anchor_phase = phase;
            self.anchor_time = Some(now);
        }
        self.bpm = bpm.max(1);
    }
}

/// Pendulum angle in degrees; an extreme (±spread) lands on every beat.
pub fn pendulum_angle(phase: f64) -> f64 {
    PENDULUM_SPREAD_DEG * (phase * std::f64::consts::PI).cos()
}

/// How far the pendulum is from its extreme at `phase`, in degrees.
pub fn visual_error(phase: f64) -> f64 {
    PENDULUM_SPREAD_DEG - pendulum_angle(phase).abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn phase_advances_at_bpm_rate() {
        let t0 = Instant::now();
        let mut v = VisualClock::new(120);
        assert_eq!(v.phase_at(t0), None);
        v.start(true, t0);
        let p = v.phase_at(t0 + Duration::from_millis(1500)).unwrap();
        assert!((p - 3.0).abs() < 1e-9, "p={p}");
    }

    #[test]
    fn start_without_reset_keeps_anchor() {
        let t0 = Instant::now();
        let mut v = VisualClock::new(60);
        v.start(true, t0);
        v.start(false, t0 + Duration::from_secs(2));
        let p = v.phase_at(t0 + Duration::from_secs(3)).unwrap();
        assert!((p - 3.0).abs() < 1e-9);
    }

    #[test]
    fn retempo_has_no_jump() {
        let t0 = Instant::now();
        let frame = Duration::from_millis(16);
        let mut v = VisualClock::new(100);
        v.start(true, t0);

        let t1 = t0 + Duration::from_millis(2_345);
        let before = v.phase_at(t1).unwrap();
        v.retempo(200, t1);
        let at = v.phase_at(t1).unwrap();
        let after = v.phase_at(t1 + frame).unwrap();

        assert!((at - before).abs() < 1e-12);
        assert!(after >= at);
        // one frame at the new tempo, never more
        assert!(after - at <= 200.0 / 60.0 * frame.as_secs_f64() + 1e-9);
    }

    #[test]
    fn slowing_down_never_runs_backwards() {
        let t0 = Instant::now();
        let mut v = VisualClock::new(240);
        v.start(true, t0);
        let mut last = 0.0;
        for i in 1..=200u64 {
            let t = t0 + Duration::from_millis(16 * i);
            if i % 25 == 0 {
                v.retempo(if v.bpm() > 60 { v.bpm() - 60 } else { 240 }, t);
            }
            let p = v.phase_at(t).unwrap();
            assert!(p >= last, "i={i} p={p} last={last}");
            last = p;
        }
    }

    #[test]
    fn stop_clears_anchor() {
        let t0 = Instant::now();
        let mut v = VisualClock::new(90);
        v.start(true, t0);
        v.stop();
        v.retempo(120, t0);
        assert_eq!(v.phase_at(t0), None);
        assert_eq!(v.bpm(), 120);
    }

    #[test]
    fn pendulum_hits_extremes_on_beats() {
        assert!((pendulum_angle(0.0) - 30.0).abs() < 1e-9);
        assert!((pendulum_angle(1.0) + 30.0).abs() < 1e-9);
        assert!(visual_error(2.0).abs() < 1e-9);
        assert!((visual_error(0.5) - 30.0).abs() < 1e-9);
    }
}
