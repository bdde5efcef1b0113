//! Shader preview engine for dome and panorama content.
//!
//! User fragment code written against the Shadertoy conventions is wrapped
//! into a self-contained GLSL program, fed a fixed uniform contract plus an
//! audio spectrum texture, and drawn as a full-viewport quad:
//!
//! ```text
//!   user GLSL ──▶ ShaderSourceTransformer ──▶ GraphicsBackend::compile_program
//!                                                   │
//!   PlaybackClock ─┐                                ▼
//!   AudioFeed ─────┼─▶ ShaderRenderer::render ──▶ uniforms + audio texture ──▶ draw_quad
//!   CameraState ───┘
//! ```
//!
//! The renderer is generic over its [`GraphicsBackend`]. [`WgpuBackend`]
//! draws into a window; [`HeadlessBackend`] records draws for tests and
//! tooling.

pub mod analysis;
pub mod audio;
pub mod backend;
pub mod clock;
pub mod config;
pub mod decode;
pub mod error;
pub mod events;
pub mod feed;
pub mod gpu;
pub mod headless;
pub mod projection;
pub mod renderer;
pub mod transform;
pub mod types;
pub mod uniforms;

pub use analysis::{PcmTrack, SpectrumAnalyzer, FFT_SIZE};
pub use audio::{
    AudioFrame, AudioTextureEncoder, AudioTextureFormat, AUDIO_TEXTURE_HEIGHT, AUDIO_TEXTURE_WIDTH,
};
pub use backend::GraphicsBackend;
pub use clock::{Clock, FrameTiming, ManualClock, PlaybackClock, PlaybackState, SystemClock};
pub use config::{ConfigError, ConfigOverrides, PreviewConfig};
pub use decode::{decode_track, load_track};
pub use error::{AudioError, PreviewError, ShaderStage};
pub use events::{EventBus, PlaybackEvent};
pub use feed::{AudioFeed, ChannelAudioFeed, SilentFeed, TrackAudioFeed};
pub use gpu::{WgpuBackend, WgpuBackendOptions, WgpuLocation, WgpuProgram};
pub use headless::{DrawCall, HeadlessBackend};
pub use projection::CameraRig;
pub use renderer::{FrameStatus, RendererSettings, ShaderProgram, ShaderRenderer};
pub use transform::{ShaderSourceTransformer, WrappedShader};
pub use types::{
    CameraMode, CameraState, ChannelBindings, ColorSpaceMode, MouseState, AUDIO_TEXTURE_SLOT,
    CHANNEL_COUNT,
};
pub use uniforms::{UniformBindingTable, UniformFrame, UniformId, UniformValue};
