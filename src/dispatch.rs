//! Per-tick voice selection and gain staging.

use std::sync::Mutex;

use crate::audio::{locked, VoiceGraph};
use crate::control::{ControlState, Voice};
use crate::tones::ToneBank;

/// Voices that may sound on `tick` of `beat`, before any mute filtering.
/// A voice with zero volume is never a candidate.
pub fn candidates(tick: u64, beat: u64, c: &ControlState) -> impl Iterator<Item = Voice> {
    let audible = |v: Voice| (c.mix.voice(v) > 0.0).then_some(v);

    let (first, second) = match tick {
        0 => {
            let backbeat = if beat == 2 || beat == 4 { audible(Voice::Backbeat) } else { None };
            let pulse = if beat == 1 { audible(Voice::Accent) } else { audible(Voice::Quarter) };
            (backbeat, pulse)
        }
        6     => (audible(Voice::Eighth), None),
        3 | 9 => (audible(Voice::Sixteenth), None),
        4 | 8 => (audible(Voice::Triplet), None),
        _     => (None, None),
    };
    [first, second].into_iter().flatten()
}

/// Effective gain for a candidate voice, or `None` when it must stay silent.
pub fn voice_gain(voice: Voice, muted: bool, c: &ControlState) -> Option<f32> {
    let mute_scale = if muted { c.mix.mute_dim } else { 1.0 };
    if mute_scale <= 0.0 {
        return None;
    }
    if muted && !c.force_play && !c.audible_during_mute(voice) {
        return None;
    }
    let gain = c.mix.voice(voice) * mute_scale * c.mix.master;
    (gain > 0.0).then_some(gain)
}

/// Everything that fires on this tick, with gains.
pub fn plan(tick: u64, beat: u64, muted: bool, c: &ControlState) -> impl Iterator<Item = (Voice, f32)> + '_ {
    candidates(tick, beat, c).filter_map(move |v| voice_gain(v, muted, c).map(|g| (v, g)))
}

/// Trigger this tick's voices on the output graph. Without a tone bank
/// (no audio device yet) nothing is scheduled.
pub fn dispatch(
    tick: u64,
    beat: u64,
    muted: bool,
    c: &ControlState,
    tones: Option<&ToneBank>,
    graph: &Mutex<VoiceGraph>,
) {
    let Some(bank) = tones else { return };
    let mut fired = plan(tick, beat, muted, c).peekable();
    if fired.peek().is_none() {
        return;
    }
    let mut g = locked(graph);
    for (voice, gain) in fired {
        g.trigger(voice, bank.buffer(voice).clone(), gain);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::Mix;
    use crate::tones::OutputFormat;

    fn all_on() -> ControlState {
        ControlState {
            mix: Mix {
                master: 1.0, accent: 1.0, backbeat: 1.0, quarter: 1.0,
                eighth: 1.0, sixteenth: 1.0, triplet: 1.0, mute_dim: 0.5,
            },
            ..ControlState::default()
        }
    }

    fn voices(tick: u64, beat: u64, c: &ControlState) -> Vec<Voice> {
        candidates(tick, beat, c).collect()
    }

    #[test]
    fn beat_starts_pick_accent_backbeat_or_quarter() {
        let c = all_on();
        assert_eq!(voices(0, 1, &c), [Voice::Accent]);
        assert_eq!(voices(0, 2, &c), [Voice::Backbeat, Voice::Quarter]);
        assert_eq!(voices(0, 3, &c), [Voice::Quarter]);
        assert_eq!(voices(0, 4, &c), [Voice::Backbeat, Voice::Quarter]);
    }

    #[test]
    fn subdivision_ticks() {
        let c = all_on();
        assert_eq!(voices(6, 1, &c), [Voice::Eighth]);
        assert_eq!(voices(3, 1, &c), [Voice::Sixteenth]);
        assert_eq!(voices(9, 2, &c), [Voice::Sixteenth]);
        assert_eq!(voices(4, 3, &c), [Voice::Triplet]);
        assert_eq!(voices(8, 3, &c), [Voice::Triplet]);
        for tick in [1, 2, 5, 7, 10, 11] {
            assert!(voices(tick, 1, &c).is_empty(), "tick {tick}");
        }
    }

    #[test]
    fn zero_volume_is_never_a_candidate() {
        let mut c = all_on();
        c.mix.accent = 0.0;
        c.mix.backbeat = 0.0;
        assert!(voices(0, 1, &c).is_empty());
        assert_eq!(voices(0, 2, &c), [Voice::Quarter]);
    }

    #[test]
    fn muted_bar_without_dim_drops_voice() {
        let mut c = ControlState::default();
        c.mix.quarter = 0.8;
        c.mix.master = 0.8;
        c.mix.mute_dim = 0.0;
        assert_eq!(voice_gain(Voice::Quarter, true, &c), None);
        assert!(plan(0, 2, true, &c).next().is_none());
    }

    #[test]
    fn muted_bar_honours_per_voice_flag() {
        let mut c = all_on();
        assert_eq!(voice_gain(Voice::Eighth, true, &c), None);
        c.audible_in_mute[Voice::Eighth.index()] = true;
        assert_eq!(voice_gain(Voice::Eighth, true, &c), Some(0.5));
    }

    #[test]
    fn force_play_bypasses_flags_but_keeps_dim() {
        let mut c = all_on();
        c.force_play = true;
        assert_eq!(voice_gain(Voice::Triplet, true, &c), Some(0.5));
        assert_eq!(voice_gain(Voice::Triplet, false, &c), Some(1.0));
    }

    #[test]
    fn gain_is_volume_times_master() {
        let mut c = ControlState::default();
        c.mix.accent = 0.5;
        c.mix.master = 0.8;
        let g = voice_gain(Voice::Accent, false, &c).unwrap();
        assert!((g - 0.4).abs() < 1e-6);
        c.mix.master = 0.0;
        assert_eq!(voice_gain(Voice::Accent, false, &c), None);
    }

    #[test]
    fn dispatch_triggers_on_the_graph() {
        let c = all_on();
        let bank = ToneBank::generate(c.tone_mode, OutputFormat { sample_rate: 8_000, channels: 1 });
        let graph = Mutex::new(VoiceGraph::new());
        locked(&graph).attach();

        dispatch(0, 2, false, &c, Some(&bank), &graph);
        dispatch(0, 2, false, &c, Some(&bank), &graph);
        let g = locked(&graph);
        assert_eq!(g.active_instances(Voice::Backbeat), 2);
        assert_eq!(g.active_instances(Voice::Quarter), 2);
        assert_eq!(g.active_instances(Voice::Accent), 0);
    }

    #[test]
    fn dispatch_without_bank_is_silent() {
        let c = all_on();
        let graph = Mutex::new(VoiceGraph::new());
        locked(&graph).attach();
        dispatch(0, 1, false, &c, None, &graph);
        assert_eq!(locked(&graph).active_instances(Voice::Accent), 0);
    }
}
