use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use preview::{
    CameraState, FrameStatus, GraphicsBackend, ShaderRenderer, WgpuBackend, WgpuBackendOptions,
};
use tracing_subscriber::EnvFilter;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, KeyEvent, MouseButton, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::WindowBuilder;

use crate::cli::Args;
use crate::state::AppState;

const SEEK_STEP_SEC: f64 = 1.0;
const TILT_STEP_DEG: f32 = 5.0;

pub fn run(args: Args) -> Result<()> {
    initialise_tracing();

    let mut app = AppState::from_args(&args)?;
    let audio_feed = app.load_audio()?;
    tracing::debug!(config = ?app.config, "resolved preview configuration");

    let event_loop = EventLoop::new().map_err(|err| anyhow!("failed to create event loop: {err}"))?;
    let window = WindowBuilder::new()
        .with_title(format!("domeview - {}", app.shader_path.display()))
        .with_inner_size(PhysicalSize::new(app.config.width, app.config.height))
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create preview window: {err}"))?;
    let window = Arc::new(window);

    let size = window.inner_size();
    let options = WgpuBackendOptions {
        size: (size.width, size.height),
        color_space: app.config.color_space,
        audio_format: app.config.audio_format,
        channels: app.config.channel_bindings()?,
    };
    let backend =
        WgpuBackend::new(window.clone(), &options).context("failed to initialise GPU backend")?;
    let mut renderer = ShaderRenderer::with_system_clock(backend, app.config.renderer_settings());
    if let Some(feed) = audio_feed {
        renderer.set_audio_feed(Box::new(feed));
    }

    let source = app.read_shader()?;
    let compiled = renderer.compile(&source);
    app.record_compile(compiled);

    if args.play {
        renderer.play();
    }
    window.request_redraw();
    tracing::info!(
        shader = %app.shader_path.display(),
        camera = %renderer.camera_state().mode(),
        "space: play/pause, left/right: seek, home: rewind, c: camera, up/down: tilt, r: reload"
    );

    let run_result = event_loop.run(move |event, elwt| match event {
        Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => elwt.exit(),
            WindowEvent::KeyboardInput { event, .. } => {
                if is_key(&event, NamedKey::Escape) {
                    elwt.exit();
                } else if handle_key(&event, &mut renderer, &mut app) {
                    window.request_redraw();
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                renderer.mouse_mut().cursor_moved(position.x, position.y);
            }
            WindowEvent::MouseInput {
                state: button_state,
                button: MouseButton::Left,
                ..
            } => match button_state {
                ElementState::Pressed => renderer.mouse_mut().button_pressed(),
                ElementState::Released => renderer.mouse_mut().button_released(),
            },
            WindowEvent::Resized(new_size) => {
                renderer.resize(new_size.width, new_size.height);
                window.request_redraw();
            }
            WindowEvent::RedrawRequested => {
                if renderer.is_playing() {
                    renderer.tick();
                } else if let FrameStatus::Dropped = renderer.render() {
                    tracing::debug!("paused frame dropped; waiting for the next redraw request");
                }
            }
            _ => {}
        },
        Event::AboutToWait => {
            if renderer.is_playing() {
                window.request_redraw();
            }
            elwt.set_control_flow(ControlFlow::Wait);
        }
        _ => {}
    });

    run_result.map_err(|err| anyhow!("window event loop error: {err}"))
}

fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn is_key(event: &KeyEvent, key: NamedKey) -> bool {
    event.state == ElementState::Pressed && event.logical_key == Key::Named(key)
}

fn is_char(event: &KeyEvent, ch: &str) -> bool {
    event.state == ElementState::Pressed
        && !event.repeat
        && matches!(&event.logical_key, Key::Character(value) if value.eq_ignore_ascii_case(ch))
}

/// Maps one key press onto a playback or camera operation. Returns `true`
/// when the window needs a fresh frame that the operation did not draw.
fn handle_key<B: GraphicsBackend>(
    event: &KeyEvent,
    renderer: &mut ShaderRenderer<B>,
    app: &mut AppState,
) -> bool {
    let duration = f64::from(app.config.duration_sec);
    let camera = renderer.camera_state();

    if is_key(event, NamedKey::Space) && !event.repeat {
        if renderer.is_playing() {
            renderer.pause();
        } else {
            renderer.play();
            return true;
        }
    } else if is_key(event, NamedKey::ArrowLeft) {
        renderer.seek((renderer.current_time() - SEEK_STEP_SEC).clamp(0.0, duration));
    } else if is_key(event, NamedKey::ArrowRight) {
        renderer.seek((renderer.current_time() + SEEK_STEP_SEC).clamp(0.0, duration));
    } else if is_key(event, NamedKey::Home) {
        renderer.seek(0.0);
    } else if is_key(event, NamedKey::ArrowUp) {
        renderer.set_camera_state(camera.with_tilt(camera.tilt_deg() + TILT_STEP_DEG));
        tracing::info!(tilt = renderer.camera_state().tilt_deg(), "camera tilt");
    } else if is_key(event, NamedKey::ArrowDown) {
        renderer.set_camera_state(camera.with_tilt(camera.tilt_deg() - TILT_STEP_DEG));
        tracing::info!(tilt = renderer.camera_state().tilt_deg(), "camera tilt");
    } else if is_char(event, "c") {
        let next = CameraState::new(camera.mode().next(), camera.tilt_deg());
        renderer.set_camera_state(next);
        tracing::info!(camera = %next.mode(), "camera mode");
    } else if is_char(event, "r") {
        match app.read_shader() {
            Ok(source) => {
                let compiled = renderer.compile(&source);
                app.record_compile(compiled);
                return true;
            }
            Err(err) => tracing::error!("{err:#}"),
        }
    }
    false
}
