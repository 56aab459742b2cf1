use std::path::PathBuf;

use clap::Parser;

use crate::control::{ControlState, Mix, ToneMode, Voice};

#[derive(Parser, Debug)]
#[command(name = "rusttuipulse")]
#[command(about = "Practice metronome with bar-muting training", long_about = None)]
pub struct Cli {
    /// Tempo in beats per minute
    #[arg(short, long, default_value = "120")]
    pub bpm: u32,

    /// Beats in one bar
    #[arg(short = 'n', long, default_value = "4")]
    pub beats_per_bar: u32,

    /// Bars played before the mute section (fixed training)
    #[arg(long, default_value = "3")]
    pub play_bars: u32,

    /// Bars muted after the play section (fixed training)
    #[arg(long, default_value = "1")]
    pub mute_bars: u32,

    /// Random run lengths instead of a fixed cycle
    #[arg(short, long)]
    pub random: bool,

    #[arg(long, default_value = "1")]
    pub rnd_play_min: u32,

    #[arg(long, default_value = "2")]
    pub rnd_play_max: u32,

    #[arg(long, default_value = "1")]
    pub rnd_mute_min: u32,

    #[arg(long, default_value = "2")]
    pub rnd_mute_max: u32,

    /// Click sound set
    #[arg(short, long, value_enum, default_value_t = ToneMode::Electronic)]
    pub tone: ToneMode,

    /// Master volume, 0.0 to 1.0
    #[arg(short, long, default_value = "0.8")]
    pub master: f32,

    /// Output device name (see --list-devices)
    #[arg(short, long)]
    pub device: Option<String>,

    /// Fixed output buffer size in frames
    #[arg(long)]
    pub buffer_size: Option<u32>,

    /// Print output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Where log output goes; the terminal belongs to the UI
    #[arg(long, default_value = "rusttuipulse.log")]
    pub log_file: PathBuf,
}

impl Cli {
    /// Initial snapshot, clamped into range.
    pub fn control_state(&self) -> ControlState {
        ControlState {
            bpm:             self.bpm,
            beats_per_bar:   self.beats_per_bar,
            play_bars:       self.play_bars,
            mute_bars:       self.mute_bars,
            random_training: self.random,
            rnd_play_min:    self.rnd_play_min,
            rnd_play_max:    self.rnd_play_max,
            rnd_mute_min:    self.rnd_mute_min,
            rnd_mute_max:    self.rnd_mute_max,
            tone_mode:       self.tone,
            mix:             Mix { master: self.master, ..Mix::default() },
            audible_in_mute: [false; Voice::COUNT],
            ..ControlState::default()
        }
        .normalized()
    }
}
