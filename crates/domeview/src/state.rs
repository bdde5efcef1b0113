use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use preview::{load_track, PreviewConfig, PreviewError, TrackAudioFeed};

use crate::cli::Args;

/// Everything the event loop needs besides the renderer itself.
#[derive(Debug)]
pub struct AppState {
    pub config: PreviewConfig,
    pub shader_path: PathBuf,
    pub last_error: Option<PreviewError>,
}

impl AppState {
    /// Layers defaults, the optional config file and command-line overrides.
    pub fn from_args(args: &Args) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => PreviewConfig::load(path)
                .with_context(|| format!("failed to load configuration {}", path.display()))?,
            None => PreviewConfig::default(),
        };
        config.apply(&args.overrides()?);
        config.validate().context("invalid preview configuration")?;

        Ok(Self {
            config,
            shader_path: args.shader.clone(),
            last_error: None,
        })
    }

    /// Decodes the configured audio file, if any. The track's sample rate
    /// replaces the configured `iSampleRate`.
    pub fn load_audio(&mut self) -> Result<Option<TrackAudioFeed>> {
        let Some(path) = &self.config.audio else {
            return Ok(None);
        };
        let track = load_track(path)
            .with_context(|| format!("failed to load audio {}", path.display()))?;
        self.config.sample_rate = track.sample_rate();
        Ok(Some(TrackAudioFeed::new(track)))
    }

    pub fn read_shader(&self) -> Result<String> {
        read_shader(&self.shader_path)
    }

    /// Keeps the latest compile outcome so a failing reload stays visible
    /// until the next successful one.
    pub fn record_compile(&mut self, result: Result<(), PreviewError>) {
        match result {
            Ok(()) => {
                if self.last_error.take().is_some() {
                    tracing::info!(shader = %self.shader_path.display(), "shader compiles again");
                }
            }
            Err(err) => {
                tracing::error!(
                    shader = %self.shader_path.display(),
                    "{}",
                    err.diagnostic().unwrap_or("shader rejected")
                );
                self.last_error = Some(err);
            }
        }
    }
}

fn read_shader(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read shader at {}", path.display()))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use clap::Parser;
    use preview::{CameraMode, ShaderStage};

    use super::*;

    #[test]
    fn command_line_overrides_config_file() {
        let mut config = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("temp file");
        writeln!(config, "camera_mode = \"equirect\"\nduration_sec = 20.0").expect("write");
        let path = config.path().to_string_lossy().into_owned();

        let args = Args::try_parse_from([
            "domeview",
            "shader.frag",
            "--config",
            path.as_str(),
            "--camera",
            "ll180",
        ])
        .expect("valid arguments");
        let state = AppState::from_args(&args).expect("state");
        assert_eq!(state.config.camera_mode, CameraMode::TiltedDome);
        assert_eq!(state.config.duration_sec, 20.0);
        assert_eq!(state.shader_path, PathBuf::from("shader.frag"));
    }

    #[test]
    fn invalid_overrides_are_rejected() {
        let args = Args::try_parse_from(["domeview", "shader.frag", "--tilt", "120"])
            .expect("valid arguments");
        assert!(AppState::from_args(&args).is_err());
    }

    #[test]
    fn compile_errors_are_kept_until_a_success() {
        let args = Args::try_parse_from(["domeview", "shader.frag"]).expect("valid arguments");
        let mut state = AppState::from_args(&args).expect("state");
        state.record_compile(Err(PreviewError::ShaderCompile {
            stage: ShaderStage::Fragment,
            log: "ERROR: 0:3: 'x' : undeclared identifier".into(),
        }));
        assert!(state.last_error.is_some());
        state.record_compile(Ok(()));
        assert!(state.last_error.is_none());
    }

    #[test]
    fn configured_audio_file_becomes_a_track_feed() {
        let mut wav = tempfile::Builder::new()
            .suffix(".wav")
            .tempfile()
            .expect("temp file");
        let samples = vec![0u8; 2 * 2_205];
        let data_len = samples.len() as u32;
        wav.write_all(b"RIFF").expect("write");
        wav.write_all(&(36 + data_len).to_le_bytes()).expect("write");
        wav.write_all(b"WAVEfmt ").expect("write");
        for field in [16u32.to_le_bytes(), [1, 0, 1, 0], 22_050u32.to_le_bytes()] {
            wav.write_all(&field).expect("write");
        }
        wav.write_all(&44_100u32.to_le_bytes()).expect("write");
        wav.write_all(&[2, 0, 16, 0]).expect("write");
        wav.write_all(b"data").expect("write");
        wav.write_all(&data_len.to_le_bytes()).expect("write");
        wav.write_all(&samples).expect("write");
        let path = wav.path().to_string_lossy().into_owned();

        let args = Args::try_parse_from(["domeview", "shader.frag", "--audio", path.as_str()])
            .expect("valid arguments");
        let mut state = AppState::from_args(&args).expect("state");
        let feed = state.load_audio().expect("decodes").expect("feed");
        assert_eq!(feed.track().sample_rate(), 22_050);
        assert_eq!(feed.track().frame_count(), 2_205);
        assert_eq!(state.config.sample_rate, 22_050);
    }

    #[test]
    fn no_audio_means_no_feed() {
        let args = Args::try_parse_from(["domeview", "shader.frag"]).expect("valid arguments");
        let mut state = AppState::from_args(&args).expect("state");
        assert!(state.load_audio().expect("nothing to load").is_none());
        assert_eq!(state.config.sample_rate, 44_100);
    }

    #[test]
    fn missing_shader_file_reports_path() {
        let dir = tempfile::tempdir().expect("temp dir");
        let missing = dir.path().join("absent.frag");
        let err = read_shader(&missing).unwrap_err();
        assert!(err.to_string().contains("absent.frag"));
    }
}
