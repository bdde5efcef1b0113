use std::fmt;

use crate::audio::AudioTextureEncoder;
use crate::error::PreviewError;
use crate::uniforms::UniformValue;

/// Drawing surface injected into [`crate::ShaderRenderer`].
///
/// A backend owns the graphics context; programs it hands out are owned by
/// the renderer and must be given back through [`release_program`] once they
/// are replaced.
///
/// [`release_program`]: GraphicsBackend::release_program
pub trait GraphicsBackend {
    /// A compiled and linked program plus any per-program GPU resources.
    type Program;
    /// Resolved handle of one active uniform.
    type Location: Copy + fmt::Debug;

    /// Compiles both stages and links them. On failure nothing is left
    /// allocated.
    fn compile_program(
        &mut self,
        vertex: &str,
        fragment: &str,
    ) -> Result<Self::Program, PreviewError>;

    /// Location of `name` in `program`, or `None` when the program does not
    /// use it.
    fn uniform_location(&self, program: &Self::Program, name: &str) -> Option<Self::Location>;

    fn set_uniform(
        &mut self,
        program: &mut Self::Program,
        location: Self::Location,
        value: UniformValue,
    );

    /// Copies the encoder's bytes into the audio texture slot.
    fn upload_audio_texture(&mut self, encoder: &AudioTextureEncoder);

    /// Draws the four-vertex full-viewport strip with `program`.
    fn draw_quad(&mut self, program: &mut Self::Program) -> Result<(), PreviewError>;

    fn release_program(&mut self, program: Self::Program);

    fn viewport(&self) -> (u32, u32);

    fn resize(&mut self, width: u32, height: u32);

    /// Size of the image bound to a generic channel slot. Unbound slots
    /// report `(1, 1, 1)`.
    fn channel_resolution(&self, _slot: usize) -> [f32; 3] {
        [1.0, 1.0, 1.0]
    }
}
