use std::time::Instant;

use crossbeam_channel::Receiver;

use crate::audio::{AudioFrame, AudioTextureEncoder, AudioTextureFormat};
use crate::backend::GraphicsBackend;
use crate::clock::{Clock, PlaybackClock, SystemClock};
use crate::error::PreviewError;
use crate::events::{EventBus, PlaybackEvent};
use crate::feed::{AudioFeed, SilentFeed};
use crate::projection::CameraRig;
use crate::transform::ShaderSourceTransformer;
use crate::types::{CameraState, MouseState, CHANNEL_COUNT};
use crate::uniforms::{UniformBindingTable, UniformFrame};

/// Knobs fixed for the lifetime of a renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct RendererSettings {
    /// Scrub range in seconds, exposed as `iDuration`.
    pub duration: f32,
    /// Nominal audio sample rate, exposed as `iSampleRate`.
    pub sample_rate: f32,
    pub audio_format: AudioTextureFormat,
    pub camera: CameraState,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            duration: 10.0,
            sample_rate: 44_100.0,
            audio_format: AudioTextureFormat::default(),
            camera: CameraState::default(),
        }
    }
}

/// A linked program together with the uniform locations resolved for it.
pub struct ShaderProgram<B: GraphicsBackend> {
    handle: B::Program,
    bindings: UniformBindingTable<B::Location>,
    has_user_main: bool,
}

impl<B: GraphicsBackend> ShaderProgram<B> {
    pub fn handle(&self) -> &B::Program {
        &self.handle
    }

    pub fn bindings(&self) -> &UniformBindingTable<B::Location> {
        &self.bindings
    }

    pub fn has_user_main(&self) -> bool {
        self.has_user_main
    }
}

/// Outcome of one [`ShaderRenderer::render`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Drawn { frame: u64 },
    /// No program is bound yet; nothing was drawn or counted.
    NoProgram,
    /// The surface rejected the frame; it was not counted.
    Dropped,
}

#[derive(Debug)]
struct FrameStats {
    window_start: Instant,
    frames: u32,
}

impl FrameStats {
    fn new() -> Self {
        Self {
            window_start: Instant::now(),
            frames: 0,
        }
    }

    /// Logs fps roughly once per second.
    fn record(&mut self, frame: u64, time: f64) {
        self.frames += 1;
        let elapsed = self.window_start.elapsed().as_secs_f64();
        if elapsed >= 1.0 {
            let fps = (f64::from(self.frames) / elapsed * 10.0).round() / 10.0;
            tracing::debug!(fps, frame, time, "render stats");
            self.window_start = Instant::now();
            self.frames = 0;
        }
    }
}

/// Drives one shader program on an injected drawing surface.
///
/// All state lives on the caller's thread. The host loop calls [`tick`]
/// once per display refresh and stops rescheduling when it returns `false`.
///
/// [`tick`]: ShaderRenderer::tick
pub struct ShaderRenderer<B: GraphicsBackend, C: Clock = SystemClock> {
    backend: B,
    transformer: ShaderSourceTransformer,
    program: Option<ShaderProgram<B>>,
    clock: PlaybackClock<C>,
    settings: RendererSettings,
    camera: CameraState,
    rig: CameraRig,
    mouse: MouseState,
    audio_feed: Box<dyn AudioFeed>,
    audio_frame: AudioFrame,
    audio_failing: bool,
    encoder: AudioTextureEncoder,
    events: EventBus,
    stats: FrameStats,
}

impl<B: GraphicsBackend> ShaderRenderer<B, SystemClock> {
    pub fn with_system_clock(backend: B, settings: RendererSettings) -> Self {
        Self::new(backend, SystemClock::new(), settings)
    }
}

impl<B: GraphicsBackend, C: Clock> ShaderRenderer<B, C> {
    /// Builds a paused renderer at time zero with no program bound.
    pub fn new(backend: B, clock: C, settings: RendererSettings) -> Self {
        let camera = settings.camera;
        let rig = CameraRig {
            tilt_deg: camera.tilt_deg(),
            ..CameraRig::default()
        };
        Self {
            backend,
            transformer: ShaderSourceTransformer::new(),
            program: None,
            clock: PlaybackClock::new(clock),
            encoder: AudioTextureEncoder::new(settings.audio_format),
            settings,
            camera,
            rig,
            mouse: MouseState::default(),
            audio_feed: Box::new(SilentFeed),
            audio_frame: AudioFrame::silent(),
            audio_failing: false,
            events: EventBus::new(),
            stats: FrameStats::new(),
        }
    }

    /// Transforms and links `source`, replacing the active program only on
    /// success. On failure the previous program stays bound untouched.
    pub fn compile(&mut self, source: &str) -> Result<(), PreviewError> {
        let wrapped = self.transformer.transform(source);
        let handle = match self
            .backend
            .compile_program(self.transformer.vertex_source(), &wrapped.source)
        {
            Ok(handle) => handle,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    kept_previous = self.program.is_some(),
                    "shader compile failed"
                );
                return Err(err);
            }
        };

        let backend = &self.backend;
        let bindings = UniformBindingTable::resolve(|name| backend.uniform_location(&handle, name));
        tracing::debug!(
            active_uniforms = bindings.active_count(),
            user_main = wrapped.has_user_main,
            "compiled shader"
        );

        let replacement = ShaderProgram {
            handle,
            bindings,
            has_user_main: wrapped.has_user_main,
        };
        if let Some(previous) = self.program.replace(replacement) {
            self.backend.release_program(previous.handle);
        }
        Ok(())
    }

    pub fn play(&mut self) {
        if self.clock.play() {
            self.events.publish(PlaybackEvent::Play {
                time: self.clock.current_time(),
            });
        }
    }

    pub fn pause(&mut self) {
        if self.clock.pause() {
            self.events.publish(PlaybackEvent::Pause {
                time: self.clock.current_time(),
            });
        }
    }

    /// Jumps to `time`. A paused renderer draws once so scrubbing is visible.
    pub fn seek(&mut self, time: f64) {
        if !self.clock.seek(time) {
            tracing::warn!(time, "ignoring seek to non-finite time");
            return;
        }
        self.events.publish(PlaybackEvent::Seek { time });
        if !self.clock.is_playing() {
            self.render();
        }
    }

    /// Applies new camera controls. A paused renderer draws once.
    pub fn set_camera_state(&mut self, camera: CameraState) {
        self.camera = camera;
        self.rig.tilt_deg = camera.tilt_deg();
        self.events.publish(PlaybackEvent::CameraChanged(camera));
        if !self.clock.is_playing() {
            self.render();
        }
    }

    /// One scheduled step of the render loop. Does nothing while paused.
    /// Returns whether the caller should schedule another tick.
    pub fn tick(&mut self) -> bool {
        if !self.clock.is_playing() {
            return false;
        }
        self.clock.tick();
        self.render();
        self.clock.is_playing()
    }

    /// Draws one frame at the current time with the active program.
    pub fn render(&mut self) -> FrameStatus {
        if self.program.is_none() {
            return FrameStatus::NoProgram;
        }

        self.pull_audio();
        self.encoder.update(&self.audio_frame);
        self.backend.upload_audio_texture(&self.encoder);

        let uniforms = self.uniform_frame();
        let Some(program) = self.program.as_mut() else {
            return FrameStatus::NoProgram;
        };
        let backend = &mut self.backend;
        let handle = &mut program.handle;
        program.bindings.write(&uniforms, |location, value| {
            backend.set_uniform(handle, location, value);
        });

        match backend.draw_quad(handle) {
            Ok(()) => {
                let timing = self.clock.record_frame();
                tracing::trace!(frame = timing.frame, time = timing.time, "drew frame");
                self.stats.record(timing.frame, timing.time);
                FrameStatus::Drawn {
                    frame: timing.frame,
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "dropped frame");
                FrameStatus::Dropped
            }
        }
    }

    /// Samples the audio feed once; failures keep the last frame.
    fn pull_audio(&mut self) {
        match self.audio_feed.frame_at(self.clock.current_time()) {
            Ok(Some(frame)) => {
                self.audio_frame = frame;
                self.audio_failing = false;
            }
            Ok(None) => {}
            Err(err) => {
                if !self.audio_failing {
                    tracing::warn!(error = %err, "audio feed failed; keeping last frame");
                }
                self.audio_failing = true;
            }
        }
    }

    fn uniform_frame(&self) -> UniformFrame {
        let (width, height) = self.backend.viewport();
        let timing = self.clock.pending_frame();
        let time = timing.time as f32;

        let mut frame = UniformFrame::new(width, height);
        frame.time = time;
        frame.time_delta = timing.delta as f32;
        frame.frame_rate = timing.frame_rate() as f32;
        frame.frame = i32::try_from(timing.frame).unwrap_or(i32::MAX);
        frame.mouse = self.mouse.as_uniform(height as f32);
        frame.sample_rate = self.settings.sample_rate;
        frame.duration = self.settings.duration;
        frame.channel_time = [time; CHANNEL_COUNT];
        for (slot, resolution) in frame.channel_resolution.iter_mut().enumerate() {
            *resolution = self.backend.channel_resolution(slot);
        }
        frame.audio_resolution = self.encoder.resolution();
        frame.camera_mode = self.camera.mode();
        frame.camera = self.rig;
        frame
    }

    pub fn set_audio_feed(&mut self, feed: Box<dyn AudioFeed>) {
        self.audio_feed = feed;
        self.audio_failing = false;
    }

    pub fn set_mouse(&mut self, mouse: MouseState) {
        self.mouse = mouse;
    }

    pub fn mouse_mut(&mut self) -> &mut MouseState {
        &mut self.mouse
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.backend.resize(width, height);
    }

    pub fn subscribe(&mut self) -> Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    pub fn camera_state(&self) -> CameraState {
        self.camera
    }

    pub fn current_time(&self) -> f64 {
        self.clock.current_time()
    }

    pub fn frame_count(&self) -> u64 {
        self.clock.frame_count()
    }

    pub fn is_playing(&self) -> bool {
        self.clock.is_playing()
    }

    pub fn has_program(&self) -> bool {
        self.program.is_some()
    }

    pub fn program(&self) -> Option<&ShaderProgram<B>> {
        self.program.as_ref()
    }

    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Releases the active program and hands the surface back.
    pub fn into_backend(mut self) -> B {
        if let Some(program) = self.program.take() {
            self.backend.release_program(program.handle);
        }
        self.backend
    }
}

#[cfg(test)]
mod tests {
    use crossbeam_channel::unbounded;

    use super::*;
    use crate::clock::ManualClock;
    use crate::error::ShaderStage;
    use crate::headless::HeadlessBackend;
    use crate::types::CameraMode;
    use crate::uniforms::UniformValue;

    const GRADIENT: &str = r"
void mainImage(out vec4 fragColor, in vec2 fragCoord) {
    vec2 uv = fragCoord / iResolution.xy;
    fragColor = vec4(uv, 0.5 + 0.5 * sin(iTime + float(iFrame)), 1.0);
}
";

    const DOME: &str = r"
void mainImage(out vec4 fragColor, in vec2 fragCoord) {
    vec2 uv = fragCoord / iResolution.xy;
    vec3 dir = cameraDirLL180(uv, iCameraTiltDeg, mat3(1.0));
    float level = texture(iAudioHistoryTex, vec2(uv.x, 0.25)).r;
    fragColor = vec4(dir * 0.5 + 0.5, float(iCameraMode) + level);
}
";

    type TestRenderer = ShaderRenderer<HeadlessBackend, ManualClock>;

    fn renderer() -> (ManualClock, TestRenderer) {
        let wall = ManualClock::new();
        let renderer = ShaderRenderer::new(
            HeadlessBackend::new(640, 360),
            wall.clone(),
            RendererSettings::default(),
        );
        (wall, renderer)
    }

    fn last_uniform(renderer: &TestRenderer, name: &str) -> Option<UniformValue> {
        renderer.backend().last_draw().and_then(|draw| draw.uniform(name))
    }

    #[test]
    fn render_without_program_is_a_no_op() {
        let (_, mut renderer) = renderer();
        assert_eq!(renderer.render(), FrameStatus::NoProgram);
        renderer.seek(2.0);
        assert_eq!(renderer.frame_count(), 0);
        assert!(renderer.backend().draws().is_empty());
        assert_eq!(renderer.backend().audio_uploads(), 0);
    }

    #[test]
    fn draws_write_only_resolved_uniforms() {
        let (_, mut renderer) = renderer();
        renderer.compile(GRADIENT).expect("compiles");
        assert_eq!(renderer.render(), FrameStatus::Drawn { frame: 0 });

        let draw = renderer.backend().last_draw().expect("one draw");
        assert_eq!(draw.uniform("iTime"), Some(UniformValue::Float(0.0)));
        assert_eq!(draw.uniform("iFrame"), Some(UniformValue::Int(0)));
        assert_eq!(
            draw.uniform("iResolution"),
            Some(UniformValue::Vec3([640.0, 360.0, 1.0]))
        );
        assert_eq!(draw.uniform("iMouse"), None);
        assert_eq!(draw.uniform("iCameraMode"), None);

        let mut names: Vec<_> = draw.uniforms.iter().map(|(name, _)| name.clone()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), draw.uniforms.len());
        assert_eq!(draw.audio_uploads, 1);
    }

    #[test]
    fn failed_compile_keeps_previous_program() {
        let (_, mut renderer) = renderer();
        renderer.compile(GRADIENT).expect("compiles");
        renderer.render();
        let first = renderer.backend().last_draw().expect("draw").program;

        let err = renderer
            .compile("void mainImage(out vec4 c, in vec2 p) { c = vec4(1.0);")
            .unwrap_err();
        assert!(matches!(
            err,
            PreviewError::ShaderCompile {
                stage: ShaderStage::Fragment,
                ..
            }
        ));
        renderer.backend_mut().fail_next_link("error: linking failed");
        assert!(matches!(
            renderer.compile(DOME),
            Err(PreviewError::ShaderLink { .. })
        ));

        assert_eq!(renderer.render(), FrameStatus::Drawn { frame: 1 });
        assert_eq!(renderer.backend().last_draw().expect("draw").program, first);
        assert!(renderer.backend().released_programs().is_empty());
        assert_eq!(renderer.backend().live_program_count(), 1);
    }

    #[test]
    fn recompile_releases_the_replaced_program() {
        let (_, mut renderer) = renderer();
        renderer.compile(GRADIENT).expect("compiles");
        let first = renderer.program().expect("program").handle().id();
        renderer.compile(DOME).expect("compiles");
        assert_eq!(renderer.backend().released_programs(), &[first]);
        assert_eq!(renderer.backend().live_program_count(), 1);

        let backend = renderer.into_backend();
        assert_eq!(backend.live_program_count(), 0);
    }

    #[test]
    fn seek_while_paused_draws_once_at_the_target_time() {
        let (wall, mut renderer) = renderer();
        renderer.compile(GRADIENT).expect("compiles");
        renderer.seek(3.0);
        assert_eq!(renderer.backend().draws().len(), 1);
        assert_eq!(last_uniform(&renderer, "iTime"), Some(UniformValue::Float(3.0)));

        wall.advance(5.0);
        assert!(!renderer.tick());
        assert_eq!(renderer.backend().draws().len(), 1);
        assert_eq!(renderer.current_time(), 3.0);
    }

    #[test]
    fn playing_ticks_advance_time_until_paused() {
        let (wall, mut renderer) = renderer();
        renderer.compile(GRADIENT).expect("compiles");
        renderer.seek(3.0);
        renderer.play();

        let mut last = renderer.current_time();
        for _ in 0..4 {
            wall.advance(1.0 / 60.0);
            assert!(renderer.tick());
            assert!(renderer.current_time() > last);
            last = renderer.current_time();
        }
        assert_eq!(renderer.frame_count(), 5);
        assert_eq!(last_uniform(&renderer, "iFrame"), Some(UniformValue::Int(4)));

        renderer.pause();
        let frozen = renderer.current_time();
        wall.advance(1.0);
        assert!(!renderer.tick());
        assert_eq!(renderer.current_time(), frozen);
        assert_eq!(renderer.frame_count(), 5);
    }

    #[test]
    fn paused_redraw_repeats_the_last_drawn_time() {
        let (wall, mut renderer) = renderer();
        renderer.compile(GRADIENT).expect("compiles");
        renderer.play();
        wall.advance(1.0);
        assert!(renderer.tick());
        assert_eq!(last_uniform(&renderer, "iTime"), Some(UniformValue::Float(1.0)));

        wall.advance(0.5);
        renderer.pause();
        assert_eq!(renderer.current_time(), 1.0);
        renderer.set_camera_state(CameraState::new(CameraMode::TiltedDome, 30.0));
        assert_eq!(last_uniform(&renderer, "iTime"), Some(UniformValue::Float(1.0)));
    }

    #[test]
    fn camera_change_redraws_while_paused() {
        let (_, mut renderer) = renderer();
        renderer.compile(DOME).expect("compiles");
        renderer.set_camera_state(CameraState::new(CameraMode::TiltedDome, 65.0));

        assert_eq!(renderer.frame_count(), 1);
        assert_eq!(last_uniform(&renderer, "iCameraMode"), Some(UniformValue::Int(2)));
        assert_eq!(
            last_uniform(&renderer, "iCameraTiltDeg"),
            Some(UniformValue::Float(65.0))
        );
        assert_eq!(last_uniform(&renderer, "iAudioHistoryTex"), Some(UniformValue::Sampler(4)));
    }

    #[test]
    fn audio_is_pulled_once_per_draw_and_survives_feed_failure() {
        let (_, mut renderer) = renderer();
        renderer.compile(DOME).expect("compiles");
        let (tx, rx) = unbounded();
        renderer.set_audio_feed(Box::new(crate::feed::ChannelAudioFeed::new(rx)));

        tx.send(AudioFrame::from_slices(&[1.0], &[-1.0])).expect("send");
        renderer.render();
        let bytes = renderer.backend().last_audio_bytes().to_vec();
        assert_eq!(&bytes[..4], &[255, 255, 255, 255]);
        assert_eq!(&bytes[512 * 4..512 * 4 + 4], &[0, 0, 0, 255]);

        drop(tx);
        assert!(matches!(renderer.render(), FrameStatus::Drawn { .. }));
        assert_eq!(renderer.backend().last_audio_bytes(), &bytes[..]);
        assert_eq!(renderer.backend().audio_uploads(), 2);
    }

    #[test]
    fn dropped_frames_are_not_counted() {
        let (_, mut renderer) = renderer();
        renderer.compile(GRADIENT).expect("compiles");
        renderer.backend_mut().fail_next_draws(1);
        assert_eq!(renderer.render(), FrameStatus::Dropped);
        assert_eq!(renderer.frame_count(), 0);
        assert_eq!(renderer.render(), FrameStatus::Drawn { frame: 0 });
    }

    #[test]
    fn playback_events_reach_subscribers() {
        let (wall, mut renderer) = renderer();
        let events = renderer.subscribe();
        renderer.play();
        wall.advance(2.0);
        renderer.tick();
        renderer.pause();
        renderer.seek(0.5);

        let received: Vec<_> = events.try_iter().collect();
        assert_eq!(
            received,
            vec![
                PlaybackEvent::Play { time: 0.0 },
                PlaybackEvent::Pause { time: 2.0 },
                PlaybackEvent::Seek { time: 0.5 },
            ]
        );
    }

    #[test]
    fn frame_delta_and_rate_follow_the_clock() {
        let (wall, mut renderer) = renderer();
        renderer.compile("void mainImage(out vec4 c, in vec2 p) { c = vec4(iTimeDelta, iFrameRate, iDuration, 1.0); }")
            .expect("compiles");
        renderer.play();
        renderer.tick();
        wall.advance(0.5);
        renderer.tick();
        assert_eq!(last_uniform(&renderer, "iTimeDelta"), Some(UniformValue::Float(0.5)));
        assert_eq!(last_uniform(&renderer, "iFrameRate"), Some(UniformValue::Float(2.0)));
        assert_eq!(last_uniform(&renderer, "iDuration"), Some(UniformValue::Float(10.0)));
    }
}
