//! wgpu drawing surface.
//!
//! - `context` owns the instance, device and swapchain for a window.
//! - `reflect` runs wrapped GLSL through naga and maps uniform names to
//!   std140 offsets and texture slots.
//! - `pipeline` turns a validated pair of stages into a render pipeline with
//!   its own uniform buffer.
//! - `channels` loads image channels and keeps the audio texture current.

mod channels;
mod context;
mod pipeline;
mod reflect;

use std::sync::Arc;

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::audio::{AudioTextureEncoder, AudioTextureFormat};
use crate::backend::GraphicsBackend;
use crate::error::PreviewError;
use crate::types::{ChannelBindings, ColorSpaceMode};
use crate::uniforms::UniformValue;

use channels::TextureSet;
use context::GpuContext;
use pipeline::PipelineLayouts;

pub use pipeline::WgpuProgram;
pub use reflect::WgpuLocation;

/// Options fixed for the lifetime of a [`WgpuBackend`].
#[derive(Debug, Clone, Default)]
pub struct WgpuBackendOptions {
    pub size: (u32, u32),
    pub color_space: ColorSpaceMode,
    pub audio_format: AudioTextureFormat,
    pub channels: ChannelBindings,
}

/// [`GraphicsBackend`] drawing into a window surface with wgpu.
pub struct WgpuBackend {
    context: GpuContext,
    layouts: PipelineLayouts,
    textures: TextureSet,
}

impl WgpuBackend {
    /// Creates the device and surface for `window`. The window is kept alive
    /// by the surface.
    pub fn new<W>(window: Arc<W>, options: &WgpuBackendOptions) -> Result<Self, PreviewError>
    where
        W: HasDisplayHandle + HasWindowHandle + Send + Sync + 'static,
    {
        let context = GpuContext::new(window, options.size, options.color_space)?;
        let layouts = PipelineLayouts::new(&context.device);
        let textures = TextureSet::new(
            &context.device,
            &context.queue,
            &options.channels,
            options.audio_format,
            context.color_space,
        );
        tracing::info!(
            width = context.config.width,
            height = context.config.height,
            format = ?context.surface_format,
            "wgpu backend ready"
        );
        Ok(Self {
            context,
            layouts,
            textures,
        })
    }

    fn acquire_frame(&self) -> Result<wgpu::SurfaceTexture, PreviewError> {
        match self.context.surface.get_current_texture() {
            Ok(frame) => Ok(frame),
            Err(err @ (wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated)) => {
                self.context.reconfigure();
                Err(PreviewError::Surface(err.to_string()))
            }
            Err(err) => Err(PreviewError::Surface(err.to_string())),
        }
    }
}

impl GraphicsBackend for WgpuBackend {
    type Program = WgpuProgram;
    type Location = WgpuLocation;

    fn compile_program(&mut self, vertex: &str, fragment: &str) -> Result<WgpuProgram, PreviewError> {
        WgpuProgram::new(
            &self.context.device,
            &self.layouts,
            &self.textures.layout,
            self.context.surface_format,
            vertex,
            fragment,
        )
    }

    fn uniform_location(&self, program: &WgpuProgram, name: &str) -> Option<WgpuLocation> {
        program.location(name)
    }

    fn set_uniform(&mut self, program: &mut WgpuProgram, location: WgpuLocation, value: UniformValue) {
        program.write(location, value);
    }

    fn upload_audio_texture(&mut self, encoder: &AudioTextureEncoder) {
        self.textures
            .upload_audio(&self.context.device, &self.context.queue, encoder);
    }

    fn draw_quad(&mut self, program: &mut WgpuProgram) -> Result<(), PreviewError> {
        let frame = self.acquire_frame()?;
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        program.flush(&self.context.queue);

        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("preview frame encoder"),
                });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("preview render pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            render_pass.set_pipeline(&program.pipeline);
            render_pass.set_bind_group(0, &program.uniform_bind_group, &[]);
            render_pass.set_bind_group(1, &self.textures.bind_group, &[]);
            render_pass.set_vertex_buffer(0, program.quad.slice(..));
            render_pass.draw(0..4, 0..1);
        }
        self.context.queue.submit(Some(encoder.finish()));
        frame.present();
        Ok(())
    }

    fn release_program(&mut self, program: WgpuProgram) {
        drop(program);
    }

    fn viewport(&self) -> (u32, u32) {
        self.context.size()
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.context.resize(width, height);
    }

    fn channel_resolution(&self, slot: usize) -> [f32; 3] {
        self.textures
            .channel_resolution(slot)
            .unwrap_or([1.0, 1.0, 1.0])
    }
}
