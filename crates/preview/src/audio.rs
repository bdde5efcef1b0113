//! Audio snapshot type and its 512×2 texture encoding.

use serde::{Deserialize, Serialize};

/// Entries per row of the audio texture.
pub const AUDIO_TEXTURE_WIDTH: usize = 512;
pub const AUDIO_TEXTURE_HEIGHT: usize = 2;

/// One analysed slice of audio: spectrum magnitudes in `[0, 1]` and waveform
/// samples in `[-1, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub spectrum: [f32; AUDIO_TEXTURE_WIDTH],
    pub waveform: [f32; AUDIO_TEXTURE_WIDTH],
}

impl Default for AudioFrame {
    fn default() -> Self {
        Self::silent()
    }
}

impl AudioFrame {
    pub fn silent() -> Self {
        Self {
            spectrum: [0.0; AUDIO_TEXTURE_WIDTH],
            waveform: [0.0; AUDIO_TEXTURE_WIDTH],
        }
    }

    /// Builds a frame from possibly short or partially undefined slices.
    /// Missing or non-finite entries fall back to silence.
    pub fn from_slices(spectrum: &[f32], waveform: &[f32]) -> Self {
        let mut frame = Self::silent();
        for (dst, src) in frame.spectrum.iter_mut().zip(spectrum) {
            if src.is_finite() {
                *dst = *src;
            }
        }
        for (dst, src) in frame.waveform.iter_mut().zip(waveform) {
            if src.is_finite() {
                *dst = *src;
            }
        }
        frame
    }
}

/// Texel format of the audio texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioTextureFormat {
    /// RGBA8, each value quantised to a byte.
    #[default]
    Unorm8,
    /// RGBA32F passthrough for higher precision.
    Float32,
}

impl AudioTextureFormat {
    pub fn bytes_per_texel(self) -> usize {
        match self {
            AudioTextureFormat::Unorm8 => 4,
            AudioTextureFormat::Float32 => 16,
        }
    }
}

impl std::str::FromStr for AudioTextureFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "unorm8" | "rgba8" => Ok(AudioTextureFormat::Unorm8),
            "float32" | "rgba32f" => Ok(AudioTextureFormat::Float32),
            other => Err(format!(
                "unknown audio texture format '{other}' (expected unorm8 or float32)"
            )),
        }
    }
}

/// Maps a magnitude in `[0, 1]` onto a byte.
pub fn encode_magnitude(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).floor() as u8
}

/// Maps a waveform sample in `[-1, 1]` onto a byte via `(v + 1) / 2 * 255`.
pub fn encode_waveform(value: f32) -> u8 {
    ((value.clamp(-1.0, 1.0) + 1.0) * 0.5 * 255.0).floor() as u8
}

/// Owns the pixel data of the audio texture and rewrites it in place.
///
/// Row 0 holds the spectrum, row 1 the waveform. Every texel is grey
/// (`r = g = b`) with full alpha.
#[derive(Debug, Clone)]
pub struct AudioTextureEncoder {
    format: AudioTextureFormat,
    bytes: Vec<u8>,
    generation: u64,
}

impl AudioTextureEncoder {
    pub fn new(format: AudioTextureFormat) -> Self {
        let mut encoder = Self {
            format,
            bytes: vec![0; AUDIO_TEXTURE_WIDTH * AUDIO_TEXTURE_HEIGHT * format.bytes_per_texel()],
            generation: 0,
        };
        encoder.update(&AudioFrame::silent());
        encoder.generation = 0;
        encoder
    }

    pub fn format(&self) -> AudioTextureFormat {
        self.format
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn bytes_per_row(&self) -> usize {
        AUDIO_TEXTURE_WIDTH * self.format.bytes_per_texel()
    }

    /// Texture size as fed to `iAudioHistoryResolution`.
    pub fn resolution(&self) -> [f32; 3] {
        [AUDIO_TEXTURE_WIDTH as f32, AUDIO_TEXTURE_HEIGHT as f32, 1.0]
    }

    /// Number of updates applied so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn update(&mut self, frame: &AudioFrame) {
        let row = self.bytes_per_row();
        let (spectrum_row, waveform_row) = self.bytes.split_at_mut(row);
        match self.format {
            AudioTextureFormat::Unorm8 => {
                write_unorm_row(spectrum_row, frame.spectrum.iter().map(|v| encode_magnitude(*v)));
                write_unorm_row(waveform_row, frame.waveform.iter().map(|v| encode_waveform(*v)));
            }
            AudioTextureFormat::Float32 => {
                write_float_row(spectrum_row, frame.spectrum.iter().map(|v| v.clamp(0.0, 1.0)));
                write_float_row(
                    waveform_row,
                    frame.waveform.iter().map(|v| (v.clamp(-1.0, 1.0) + 1.0) * 0.5),
                );
            }
        }
        self.generation += 1;
    }

    /// Reads back the red channel of one texel as a normalized value.
    pub fn texel(&self, x: usize, y: usize) -> Option<f32> {
        if x >= AUDIO_TEXTURE_WIDTH || y >= AUDIO_TEXTURE_HEIGHT {
            return None;
        }
        let offset = y * self.bytes_per_row() + x * self.format.bytes_per_texel();
        match self.format {
            AudioTextureFormat::Unorm8 => Some(f32::from(self.bytes[offset]) / 255.0),
            AudioTextureFormat::Float32 => {
                let raw: [u8; 4] = self.bytes[offset..offset + 4].try_into().ok()?;
                Some(f32::from_ne_bytes(raw))
            }
        }
    }
}

fn write_unorm_row(row: &mut [u8], values: impl Iterator<Item = u8>) {
    for (texel, value) in row.chunks_exact_mut(4).zip(values) {
        texel.copy_from_slice(&[value, value, value, 255]);
    }
}

fn write_float_row(row: &mut [u8], values: impl Iterator<Item = f32>) {
    for (texel, value) in row.chunks_exact_mut(16).zip(values) {
        texel.copy_from_slice(bytemuck::cast_slice(&[value, value, value, 1.0f32]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unorm_texel(encoder: &AudioTextureEncoder, x: usize, y: usize) -> [u8; 4] {
        let offset = y * encoder.bytes_per_row() + x * 4;
        let mut texel = [0u8; 4];
        texel.copy_from_slice(&encoder.bytes()[offset..offset + 4]);
        texel
    }

    #[test]
    fn magnitude_and_waveform_byte_mapping() {
        assert_eq!(encode_magnitude(0.0), 0);
        assert_eq!(encode_magnitude(1.0), 255);
        assert_eq!(encode_magnitude(0.5), 127);
        assert_eq!(encode_magnitude(3.0), 255);
        assert_eq!(encode_waveform(-1.0), 0);
        assert_eq!(encode_waveform(1.0), 255);
        assert!((i16::from(encode_waveform(0.0)) - 128).abs() <= 1);
    }

    #[test]
    fn encodes_grey_texels_with_opaque_alpha() {
        let mut encoder = AudioTextureEncoder::new(AudioTextureFormat::Unorm8);
        let mut frame = AudioFrame::silent();
        frame.spectrum[3] = 1.0;
        frame.waveform[7] = -1.0;
        encoder.update(&frame);

        assert_eq!(encoder.bytes().len(), 512 * 2 * 4);
        assert_eq!(unorm_texel(&encoder, 3, 0), [255, 255, 255, 255]);
        assert_eq!(unorm_texel(&encoder, 4, 0), [0, 0, 0, 255]);
        assert_eq!(unorm_texel(&encoder, 7, 1), [0, 0, 0, 255]);
        assert_eq!(unorm_texel(&encoder, 8, 1), [127, 127, 127, 255]);
        assert_eq!(encoder.generation(), 1);
    }

    #[test]
    fn silence_is_mid_scale_waveform() {
        let encoder = AudioTextureEncoder::new(AudioTextureFormat::Unorm8);
        for x in [0, 255, 511] {
            assert_eq!(encoder.texel(x, 0), Some(0.0));
            let wave = encoder.texel(x, 1).expect("in range");
            assert!((wave - 0.5).abs() < 1.0 / 255.0);
        }
        assert_eq!(encoder.texel(512, 0), None);
    }

    #[test]
    fn short_and_undefined_inputs_default_to_silence() {
        let frame = AudioFrame::from_slices(&[0.25, f32::NAN], &[0.5]);
        assert_eq!(frame.spectrum[0], 0.25);
        assert_eq!(frame.spectrum[1], 0.0);
        assert_eq!(frame.spectrum[511], 0.0);
        assert_eq!(frame.waveform[0], 0.5);
        assert_eq!(frame.waveform[1], 0.0);
    }

    #[test]
    fn float_variant_passes_values_through() {
        let mut encoder = AudioTextureEncoder::new(AudioTextureFormat::Float32);
        let mut frame = AudioFrame::silent();
        frame.spectrum[10] = 0.3;
        frame.waveform[10] = 0.5;
        encoder.update(&frame);
        assert_eq!(encoder.bytes().len(), 512 * 2 * 16);
        assert_eq!(encoder.texel(10, 0), Some(0.3));
        assert_eq!(encoder.texel(10, 1), Some(0.75));
        assert_eq!(encoder.texel(11, 1), Some(0.5));
    }

    #[test]
    fn update_rewrites_in_place() {
        let mut encoder = AudioTextureEncoder::new(AudioTextureFormat::Unorm8);
        let before = encoder.bytes().as_ptr();
        encoder.update(&AudioFrame::from_slices(&[1.0; 512], &[1.0; 512]));
        assert_eq!(encoder.bytes().as_ptr(), before);
        assert_eq!(encoder.texel(511, 1), Some(1.0));
    }
}
