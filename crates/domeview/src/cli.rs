use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use preview::{AudioTextureFormat, CameraMode, ColorSpaceMode, ConfigOverrides};

#[derive(Parser, Debug)]
#[command(
    name = "domeview",
    author,
    version,
    about = "Preview Shadertoy-style shaders through flat, equirectangular and dome cameras"
)]
pub struct Args {
    /// Fragment shader defining `mainImage` (or `main`).
    #[arg(value_name = "SHADER")]
    pub shader: PathBuf,

    /// Configuration file (`.toml` or `.json`).
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override the window size (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT")]
    pub size: Option<String>,

    /// Camera projection: `2d`, `equirect`, or `ll180`.
    #[arg(long, value_name = "MODE")]
    pub camera: Option<CameraMode>,

    /// Dome tilt in degrees (0-90).
    #[arg(long, value_name = "DEGREES")]
    pub tilt: Option<f32>,

    /// Audio texture precision: `unorm8` or `float32`.
    #[arg(long, value_name = "FORMAT")]
    pub audio_format: Option<AudioTextureFormat>,

    /// Output color space handling: `auto`, `gamma`, or `linear`.
    #[arg(long, value_name = "MODE")]
    pub color_space: Option<ColorSpaceMode>,

    /// Audio file (WAV, FLAC, Ogg Vorbis or MP3) driving the audio texture.
    #[arg(long, value_name = "PATH")]
    pub audio: Option<PathBuf>,

    /// Scrub range of the timeline in seconds.
    #[arg(long, value_name = "SECONDS")]
    pub duration: Option<f32>,

    /// Start playing immediately instead of paused at t=0.
    #[arg(long)]
    pub play: bool,
}

impl Args {
    pub fn overrides(&self) -> Result<ConfigOverrides> {
        let size = self
            .size
            .as_deref()
            .map(parse_surface_size)
            .transpose()?;
        Ok(ConfigOverrides {
            size,
            camera_mode: self.camera,
            camera_tilt_deg: self.tilt,
            duration_sec: self.duration,
            audio_format: self.audio_format,
            color_space: self.color_space,
            audio: self.audio.clone(),
        })
    }
}

pub fn parse() -> Args {
    Args::parse()
}

pub fn parse_surface_size(spec: &str) -> Result<(u32, u32)> {
    let trimmed = spec.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| anyhow::anyhow!("expected WxH format, e.g. 1920x1080"))?;

    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid width in size specification"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid height in size specification"))?;

    if width == 0 || height == 0 {
        anyhow::bail!("surface dimensions must be greater than zero");
    }

    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_surface_sizes() {
        assert_eq!(parse_surface_size("1280x720").unwrap(), (1280, 720));
        assert_eq!(parse_surface_size(" 800 X 600 ").unwrap(), (800, 600));
        assert!(parse_surface_size("0x720").is_err());
        assert!(parse_surface_size("1280").is_err());
    }

    #[test]
    fn only_supplied_flags_become_overrides() {
        let args = Args::try_parse_from([
            "domeview",
            "demo.frag",
            "--camera",
            "ll180",
            "--tilt",
            "30",
            "--audio",
            "loop.wav",
            "--play",
        ])
        .expect("valid arguments");
        assert!(args.play);
        let overrides = args.overrides().expect("valid overrides");
        assert_eq!(overrides.camera_mode, Some(CameraMode::TiltedDome));
        assert_eq!(overrides.camera_tilt_deg, Some(30.0));
        assert_eq!(overrides.size, None);
        assert_eq!(overrides.audio_format, None);
        assert_eq!(overrides.audio, Some(PathBuf::from("loop.wav")));
    }

    #[test]
    fn rejects_unknown_camera_modes() {
        assert!(Args::try_parse_from(["domeview", "demo.frag", "--camera", "fisheye"]).is_err());
    }
}
