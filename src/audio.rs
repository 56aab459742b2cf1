use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Stream, StreamConfig};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::control::Voice;
use crate::tones::OutputFormat;

/// Lock that survives a panic on another thread; timing must keep going.
pub fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── Voice graph ───────────────────────────────────────────────────────────────

/// One triggered copy of a voice buffer, decaying at its own gain.
#[derive(Clone, Debug)]
struct Playback {
    buffer: Arc<[f32]>,
    pos:    usize,
    gain:   f32,
}

/// Multi-voice output graph: one channel per voice, each holding any number
/// of concurrently decaying instances. Rendered mono by the audio callback.
#[derive(Debug, Default)]
pub struct VoiceGraph {
    channels: [Vec<Playback>; Voice::COUNT],
    attached: bool,
}

impl VoiceGraph {
    pub fn new() -> Self { Self::default() }

    /// Called once a stream is pulling from the graph. Until then triggers are
    /// dropped so nothing piles up without a device.
    pub fn attach(&mut self) { self.attached = true; }

    /// Start a new instance on the voice's channel. Earlier instances keep playing.
    pub fn trigger(&mut self, voice: Voice, buffer: Arc<[f32]>, gain: f32) {
        if !self.attached || buffer.is_empty() || gain <= 0.0 {
            return;
        }
        self.channels[voice.index()].push(Playback { buffer, pos: 0, gain });
    }

    /// Stop every instance on every channel.
    pub fn silence(&mut self) {
        for ch in &mut self.channels {
            ch.clear();
        }
    }

    pub fn active_instances(&self, voice: Voice) -> usize {
        self.channels[voice.index()].len()
    }

    /// Mix the next `out.len()` mono frames into `out` (overwritten).
    pub fn render(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        for ch in &mut self.channels {
            for p in ch.iter_mut() {
                let n = (p.buffer.len() - p.pos).min(out.len());
                for (o, s) in out[..n].iter_mut().zip(&p.buffer[p.pos..p.pos + n]) {
                    *o += *s * p.gain;
                }
                p.pos += n;
            }
            ch.retain(|p| p.pos < p.buffer.len());
        }
        for o in out.iter_mut() {
            *o = o.clamp(-1.0, 1.0);
        }
    }
}

// ── Output capability ─────────────────────────────────────────────────────────

/// Device side of the graph: something that pulls frames from a `VoiceGraph`.
pub trait AudioOutput {
    /// Open the device and start pulling from `graph`. Returns the format the
    /// tone bank should be rendered for.
    fn open(&mut self, graph: Arc<Mutex<VoiceGraph>>) -> Result<OutputFormat>;
    fn resume(&mut self) -> Result<()>;
    fn pause(&mut self);
}

/// cpal-backed output. The stream is not `Send`, so this stays on the thread
/// that opened it.
pub struct CpalOutput {
    device_name: Option<String>,
    buffer_size: Option<u32>,
    stream:      Option<Stream>,
}

impl CpalOutput {
    pub fn new(device_name: Option<String>, buffer_size: Option<u32>) -> Self {
        Self { device_name, buffer_size, stream: None }
    }

    fn pick_device(&self) -> Result<cpal::Device> {
        let host = cpal::default_host();
        if let Some(name) = &self.device_name {
            for d in host.output_devices().context("Cannot enumerate output devices")? {
                if d.name().map(|n| n == *name).unwrap_or(false) {
                    return Ok(d);
                }
            }
            anyhow::bail!("Requested device not found: {name}");
        }
        host.default_output_device().context("No output device found")
    }
}

impl AudioOutput for CpalOutput {
    fn open(&mut self, graph: Arc<Mutex<VoiceGraph>>) -> Result<OutputFormat> {
        let device = self.pick_device()?;
        let supported = device
            .default_output_config()
            .context("No default output config")?;

        let format = OutputFormat {
            sample_rate: supported.sample_rate().0,
            channels:    supported.channels(),
        };
        let sample_format = supported.sample_format();
        let mut config: StreamConfig = supported.into();
        if let Some(frames) = self.buffer_size {
            config.buffer_size = BufferSize::Fixed(frames);
        }
        let channels = format.channels as usize;

        let stream = match sample_format {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, Arc::clone(&graph), channels)?,
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, Arc::clone(&graph), channels)?,
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, Arc::clone(&graph), channels)?,
            fmt => anyhow::bail!("Unsupported sample format: {:?}", fmt),
        };
        stream.play().context("Failed to start audio stream")?;

        tracing::info!(
            device = %device.name().unwrap_or_else(|_| "?".into()),
            sample_rate = format.sample_rate,
            channels = format.channels,
            buffer = ?self.buffer_size,
            "audio output opened"
        );
        self.stream = Some(stream);
        locked(&graph).attach();
        Ok(format)
    }

    fn resume(&mut self) -> Result<()> {
        if let Some(s) = &self.stream {
            s.play().context("Failed to resume audio stream")?;
        }
        Ok(())
    }

    fn pause(&mut self) {
        if let Some(s) = &self.stream {
            if let Err(e) = s.pause() {
                tracing::warn!("audio pause failed: {e}");
            }
        }
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    graph: Arc<Mutex<VoiceGraph>>,
    channels: usize,
) -> Result<Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let err_fn = |err| tracing::error!("Audio stream error: {}", err);
    let mut mono: Vec<f32> = Vec::new();

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let frame_count = data.len() / channels;
            if mono.len() < frame_count {
                mono.resize(frame_count, 0.0);
            }
            locked(&graph).render(&mut mono[..frame_count]);
            for (frame, &sample) in data.chunks_mut(channels).zip(&mono[..frame_count]) {
                let value = T::from_sample(sample);
                for out in frame.iter_mut() {
                    *out = value;
                }
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

/// Names of every output device on the default host.
pub fn list_output_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let mut names = Vec::new();
    for dev in host.output_devices().context("Cannot enumerate output devices")? {
        names.push(dev.name().unwrap_or_else(|_| "<unnamed>".into()));
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize) -> Arc<[f32]> {
        (0..n).map(|i| (i + 1) as f32 * 0.01).collect::<Vec<_>>().into()
    }

    #[test]
    fn detached_graph_drops_triggers() {
        let mut g = VoiceGraph::new();
        g.trigger(Voice::Accent, ramp(8), 1.0);
        assert_eq!(g.active_instances(Voice::Accent), 0);
    }

    #[test]
    fn retrigger_plays_concurrently() {
        let mut g = VoiceGraph::new();
        g.attach();
        let buf = ramp(4);
        g.trigger(Voice::Quarter, Arc::clone(&buf), 1.0);
        let mut out = [0.0f32; 2];
        g.render(&mut out);
        g.trigger(Voice::Quarter, Arc::clone(&buf), 0.5);
        assert_eq!(g.active_instances(Voice::Quarter), 2);

        g.render(&mut out);
        // first instance at frames 2,3 plus second at frames 0,1 (half gain)
        assert!((out[0] - (0.03 + 0.005)).abs() < 1e-6);
        assert!((out[1] - (0.04 + 0.010)).abs() < 1e-6);
        assert_eq!(g.active_instances(Voice::Quarter), 1);

        g.render(&mut out);
        assert_eq!(g.active_instances(Voice::Quarter), 0);
    }

    #[test]
    fn channels_are_independent() {
        let mut g = VoiceGraph::new();
        g.attach();
        g.trigger(Voice::Accent, ramp(3), 1.0);
        g.trigger(Voice::Eighth, ramp(10), 1.0);
        let mut out = [0.0f32; 4];
        g.render(&mut out);
        assert_eq!(g.active_instances(Voice::Accent), 0);
        assert_eq!(g.active_instances(Voice::Eighth), 1);
        assert!((out[3] - 0.04).abs() < 1e-6);
    }

    #[test]
    fn silence_clears_everything() {
        let mut g = VoiceGraph::new();
        g.attach();
        for v in Voice::ALL {
            g.trigger(v, ramp(16), 0.3);
        }
        g.silence();
        let mut out = [1.0f32; 4];
        g.render(&mut out);
        assert_eq!(out, [0.0; 4]);
    }

    #[test]
    fn mix_is_clamped() {
        let mut g = VoiceGraph::new();
        g.attach();
        let loud: Arc<[f32]> = vec![1.0f32; 4].into();
        for v in Voice::ALL {
            g.trigger(v, Arc::clone(&loud), 1.0);
        }
        let mut out = [0.0f32; 4];
        g.render(&mut out);
        assert!(out.iter().all(|&s| s == 1.0));
    }
}
