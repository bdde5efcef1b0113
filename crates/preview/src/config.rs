//! Preview configuration: defaults, then an optional TOML/JSON file, then
//! command-line overrides.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::audio::AudioTextureFormat;
use crate::renderer::RendererSettings;
use crate::types::{
    CameraMode, CameraState, ChannelBindings, ColorSpaceMode, CHANNEL_COUNT, MAX_TILT_DEG,
    MIN_TILT_DEG,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to parse JSON configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub width: u32,
    pub height: u32,
    pub camera_mode: CameraMode,
    pub camera_tilt_deg: f32,
    /// Scrub range of the preview timeline in seconds.
    pub duration_sec: f32,
    pub sample_rate: u32,
    pub audio_format: AudioTextureFormat,
    pub color_space: ColorSpaceMode,
    /// Channel slot (`"0"`..`"3"`) to image path.
    pub channels: BTreeMap<String, PathBuf>,
    /// Audio file analysed into the audio texture; silent when unset.
    pub audio: Option<PathBuf>,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            camera_mode: CameraMode::default(),
            camera_tilt_deg: 0.0,
            duration_sec: 10.0,
            sample_rate: 44_100,
            audio_format: AudioTextureFormat::default(),
            color_space: ColorSpaceMode::default(),
            channels: BTreeMap::new(),
            audio: None,
        }
    }
}

impl PreviewConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(input)?)
    }

    /// Reads a `.toml` or `.json` file, picking the format from the extension.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        let parse: fn(&str) -> Result<Self, ConfigError> = match extension.as_deref() {
            Some("toml") => Self::from_toml_str,
            Some("json") => Self::from_json_str,
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "unsupported configuration format for {} (expected .toml or .json)",
                    path.display()
                )))
            }
        };
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = parse(&contents)?;
        tracing::debug!(path = %path.display(), "loaded preview configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "surface size must be non-zero (got {}x{})",
                self.width, self.height
            )));
        }
        if !(MIN_TILT_DEG..=MAX_TILT_DEG).contains(&self.camera_tilt_deg) {
            return Err(ConfigError::Invalid(format!(
                "camera_tilt_deg {} outside [{MIN_TILT_DEG}, {MAX_TILT_DEG}]",
                self.camera_tilt_deg
            )));
        }
        if self.duration_sec.is_nan() || self.duration_sec <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "duration_sec must be positive (got {})",
                self.duration_sec
            )));
        }
        if self.sample_rate == 0 {
            return Err(ConfigError::Invalid("sample_rate must be positive".into()));
        }
        self.channel_bindings().map(|_| ())
    }

    pub fn channel_bindings(&self) -> Result<ChannelBindings, ConfigError> {
        let mut bindings = ChannelBindings::new();
        for (slot, path) in &self.channels {
            let index: usize = slot.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("channel key '{slot}' is not a slot number"))
            })?;
            if index >= CHANNEL_COUNT {
                return Err(ConfigError::Invalid(format!(
                    "channel slot {index} is not user-assignable (0-{} only)",
                    CHANNEL_COUNT - 1
                )));
            }
            bindings
                .set_texture(index, path.clone())
                .map_err(|err| ConfigError::Invalid(err.to_string()))?;
        }
        Ok(bindings)
    }

    pub fn camera_state(&self) -> CameraState {
        CameraState::new(self.camera_mode, self.camera_tilt_deg)
    }

    pub fn renderer_settings(&self) -> RendererSettings {
        RendererSettings {
            duration: self.duration_sec,
            sample_rate: self.sample_rate as f32,
            audio_format: self.audio_format,
            camera: self.camera_state(),
        }
    }

    /// Applies only the values the user actually supplied.
    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some((width, height)) = overrides.size {
            self.width = width;
            self.height = height;
        }
        if let Some(mode) = overrides.camera_mode {
            self.camera_mode = mode;
        }
        if let Some(tilt) = overrides.camera_tilt_deg {
            self.camera_tilt_deg = tilt;
        }
        if let Some(duration) = overrides.duration_sec {
            self.duration_sec = duration;
        }
        if let Some(format) = overrides.audio_format {
            self.audio_format = format;
        }
        if let Some(color_space) = overrides.color_space {
            self.color_space = color_space;
        }
        if let Some(audio) = &overrides.audio {
            self.audio = Some(audio.clone());
        }
    }
}

/// Values supplied on the command line; `None` leaves the layer below intact.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub size: Option<(u32, u32)>,
    pub camera_mode: Option<CameraMode>,
    pub camera_tilt_deg: Option<f32>,
    pub duration_sec: Option<f32>,
    pub audio_format: Option<AudioTextureFormat>,
    pub color_space: Option<ColorSpaceMode>,
    pub audio: Option<PathBuf>,
}
