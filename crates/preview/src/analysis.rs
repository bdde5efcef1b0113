//! Turns decoded PCM into [`AudioFrame`] snapshots.

use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::audio::{AudioFrame, AUDIO_TEXTURE_WIDTH};
use crate::error::AudioError;

/// Samples per analysis window; the real FFT yields half as many bins.
pub const FFT_SIZE: usize = AUDIO_TEXTURE_WIDTH * 2;

/// Interleaved floating point PCM held in memory.
#[derive(Debug, Clone)]
pub struct PcmTrack {
    samples: Vec<f32>,
    channels: u16,
    sample_rate: u32,
}

impl PcmTrack {
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Result<Self, AudioError> {
        if sample_rate == 0 {
            return Err(AudioError::InvalidSampleRate(sample_rate));
        }
        if samples.is_empty() {
            return Err(AudioError::Empty);
        }
        if channels == 0 || samples.len() % channels as usize != 0 {
            return Err(AudioError::MismatchedChannels {
                samples: samples.len(),
                channels,
            });
        }
        Ok(Self {
            samples,
            channels,
            sample_rate,
        })
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration(&self) -> f64 {
        self.frame_count() as f64 / f64::from(self.sample_rate)
    }

    /// Down-mixed sample at `frame`, or silence outside the track.
    fn mono(&self, frame: i64) -> f32 {
        if frame < 0 || frame as usize >= self.frame_count() {
            return 0.0;
        }
        let channels = self.channels as usize;
        let start = frame as usize * channels;
        self.samples[start..start + channels].iter().sum::<f32>() / channels as f32
    }
}

/// Hann-windowed FFT over a window centred on the presentation time.
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    mono: Vec<f32>,
}

impl std::fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumAnalyzer")
            .field("fft_size", &FFT_SIZE)
            .finish()
    }
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SpectrumAnalyzer {
    pub fn new() -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);
        let window = (0..FFT_SIZE)
            .map(|i| 0.5 - 0.5 * ((2.0 * PI * i as f32) / (FFT_SIZE as f32 - 1.0)).cos())
            .collect();
        Self {
            fft,
            window,
            buffer: vec![Complex::new(0.0, 0.0); FFT_SIZE],
            mono: vec![0.0; FFT_SIZE],
        }
    }

    pub fn analyze(&mut self, track: &PcmTrack, time: f64) -> AudioFrame {
        let centre = (time.max(0.0) * f64::from(track.sample_rate)).round() as i64;
        let start = centre - (FFT_SIZE / 2) as i64;
        for (offset, sample) in self.mono.iter_mut().enumerate() {
            *sample = track.mono(start + offset as i64);
        }

        for ((slot, sample), weight) in self.buffer.iter_mut().zip(&self.mono).zip(&self.window) {
            *slot = Complex::new(sample * weight, 0.0);
        }
        self.fft.process(&mut self.buffer);

        let mut frame = AudioFrame::silent();
        let scale = AUDIO_TEXTURE_WIDTH as f32;
        for (magnitude, bin) in frame.spectrum.iter_mut().zip(&self.buffer) {
            *magnitude = (bin.norm() / scale).clamp(0.0, 1.0);
        }
        for (wave, sample) in frame.waveform.iter_mut().zip(self.mono.iter().step_by(2)) {
            *wave = sample.clamp(-1.0, 1.0);
        }
        frame
    }
}
