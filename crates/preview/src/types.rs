use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Shadertoy exposes four optional input channels (`iChannel0-3`).
pub const CHANNEL_COUNT: usize = 4;

/// Texture unit reserved for the audio FFT/waveform texture. Not user-assignable.
pub const AUDIO_TEXTURE_SLOT: u32 = CHANNEL_COUNT as u32;

/// Camera projection selected for the preview.
///
/// The numeric codes are what the shader sees through `iCameraMode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CameraMode {
    #[default]
    #[serde(rename = "2d")]
    Standard2d,
    #[serde(rename = "equirect")]
    Equirectangular,
    #[serde(rename = "ll180")]
    TiltedDome,
}

impl CameraMode {
    pub const ALL: [CameraMode; 3] = [
        CameraMode::Standard2d,
        CameraMode::Equirectangular,
        CameraMode::TiltedDome,
    ];

    pub fn code(self) -> i32 {
        match self {
            CameraMode::Standard2d => 0,
            CameraMode::Equirectangular => 1,
            CameraMode::TiltedDome => 2,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|mode| mode.code() == code)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CameraMode::Standard2d => "2d",
            CameraMode::Equirectangular => "equirect",
            CameraMode::TiltedDome => "ll180",
        }
    }

    /// Cycles through the modes in code order; used by keyboard shortcuts.
    pub fn next(self) -> Self {
        Self::from_code((self.code() + 1) % Self::ALL.len() as i32).unwrap_or_default()
    }
}

impl fmt::Display for CameraMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CameraMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "2d" => Ok(CameraMode::Standard2d),
            "equirect" => Ok(CameraMode::Equirectangular),
            "ll180" => Ok(CameraMode::TiltedDome),
            other => Err(format!(
                "unknown camera mode '{other}' (expected 2d, equirect or ll180)"
            )),
        }
    }
}

pub const MIN_TILT_DEG: f32 = 0.0;
pub const MAX_TILT_DEG: f32 = 90.0;

/// The two camera controls surfaced to the interactive preview.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CameraState {
    mode: CameraMode,
    tilt_deg: f32,
}

impl CameraState {
    /// Builds a camera state, clamping the tilt into `[0, 90]` degrees.
    pub fn new(mode: CameraMode, tilt_deg: f32) -> Self {
        let tilt_deg = if tilt_deg.is_finite() {
            tilt_deg.clamp(MIN_TILT_DEG, MAX_TILT_DEG)
        } else {
            MIN_TILT_DEG
        };
        Self { mode, tilt_deg }
    }

    pub fn mode(&self) -> CameraMode {
        self.mode
    }

    pub fn tilt_deg(&self) -> f32 {
        self.tilt_deg
    }

    pub fn with_mode(self, mode: CameraMode) -> Self {
        Self::new(mode, self.tilt_deg)
    }

    pub fn with_tilt(self, tilt_deg: f32) -> Self {
        Self::new(self.mode, tilt_deg)
    }
}

/// Pointer state tracked in surface pixels with a top-left origin.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MouseState {
    position: Option<(f64, f64)>,
    pressed_anchor: Option<(f64, f64)>,
    is_pressed: bool,
}

impl MouseState {
    pub fn cursor_moved(&mut self, x: f64, y: f64) {
        self.position = Some((x, y));
        if self.is_pressed {
            self.pressed_anchor.get_or_insert((x, y));
        }
    }

    pub fn button_pressed(&mut self) {
        self.is_pressed = true;
        if let Some(pos) = self.position {
            self.pressed_anchor = Some(pos);
        }
    }

    pub fn button_released(&mut self) {
        self.is_pressed = false;
        self.pressed_anchor = None;
    }

    pub fn is_pressed(&self) -> bool {
        self.is_pressed
    }

    /// Converts to Shadertoy's bottom-left `iMouse` layout: xy is the live
    /// position, zw the press anchor.
    pub fn as_uniform(&self, height: f32) -> [f32; 4] {
        let mut data = [0.0; 4];

        if let Some((x, y)) = self.position {
            data[0] = x as f32;
            data[1] = height - y as f32;
        }

        if let Some((x, y)) = self.pressed_anchor {
            data[2] = x as f32;
            data[3] = height - y as f32;
        }

        data
    }
}

/// Collection of user-bindable image channels (slots 0-3).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChannelBindings {
    sources: [Option<PathBuf>; CHANNEL_COUNT],
}

impl ChannelBindings {
    /// Creates an empty bindings table with all channels unassigned.
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates an image path with the given channel.
    pub fn set_texture(&mut self, channel: usize, path: PathBuf) -> Result<()> {
        if channel >= CHANNEL_COUNT {
            anyhow::bail!(
                "channel {} exceeds supported channel count ({}); slot {} is reserved for audio",
                channel,
                CHANNEL_COUNT,
                AUDIO_TEXTURE_SLOT
            );
        }
        self.sources[channel] = Some(path);
        Ok(())
    }

    pub fn texture(&self, channel: usize) -> Option<&PathBuf> {
        self.sources.get(channel).and_then(Option::as_ref)
    }

    /// Exposes the underlying channel slots for GPU resource creation.
    pub fn slots(&self) -> &[Option<PathBuf>; CHANNEL_COUNT] {
        &self.sources
    }
}

/// Output color handling for the wgpu surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorSpaceMode {
    /// Gamma-encoded swapchain, which is what Shadertoy shaders expect.
    #[default]
    Auto,
    /// Treat shader outputs as gamma-encoded; use non-sRGB surfaces.
    Gamma,
    /// Treat shader outputs as linear and let an sRGB swapchain convert.
    Linear,
}

impl FromStr for ColorSpaceMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(ColorSpaceMode::Auto),
            "gamma" => Ok(ColorSpaceMode::Gamma),
            "linear" => Ok(ColorSpaceMode::Linear),
            other => Err(format!(
                "unknown color space '{other}' (expected auto, gamma or linear)"
            )),
        }
    }
}
