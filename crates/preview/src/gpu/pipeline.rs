use std::borrow::Cow;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::error::{PreviewError, ShaderStage};
use crate::uniforms::UniformValue;

use super::reflect::{self, UniformReflection, WgpuLocation};

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct QuadVertex {
    position: [f32; 2],
}

/// Full-viewport triangle strip.
const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex {
        position: [-1.0, -1.0],
    },
    QuadVertex {
        position: [1.0, -1.0],
    },
    QuadVertex {
        position: [-1.0, 1.0],
    },
    QuadVertex {
        position: [1.0, 1.0],
    },
];

pub(crate) struct PipelineLayouts {
    pub uniform_layout: wgpu::BindGroupLayout,
}

impl PipelineLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("uniform layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        Self { uniform_layout }
    }
}

/// One linked program with every GPU object it draws with. Dropping it
/// releases them.
pub struct WgpuProgram {
    pub(crate) pipeline: wgpu::RenderPipeline,
    pub(crate) quad: wgpu::Buffer,
    uniform_buffer: wgpu::Buffer,
    pub(crate) uniform_bind_group: wgpu::BindGroup,
    staging: Vec<u8>,
    reflection: UniformReflection,
}

impl WgpuProgram {
    pub(crate) fn new(
        device: &wgpu::Device,
        layouts: &PipelineLayouts,
        texture_layout: &wgpu::BindGroupLayout,
        surface_format: wgpu::TextureFormat,
        vertex: &str,
        fragment: &str,
    ) -> Result<Self, PreviewError> {
        let vertex_stage = reflect::parse_stage(vertex, ShaderStage::Vertex)?;
        let fragment_stage = reflect::parse_stage(fragment, ShaderStage::Fragment)?;
        let reflection = UniformReflection::from_stage(&fragment_stage);

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("preview vertex shader"),
            source: wgpu::ShaderSource::Naga(Cow::Owned(vertex_stage.module)),
        });
        let fragment_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("preview fragment shader"),
            source: wgpu::ShaderSource::Naga(Cow::Owned(fragment_stage.module)),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("preview pipeline layout"),
            bind_group_layouts: &[&layouts.uniform_layout, texture_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("preview pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: Some("main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &wgpu::vertex_attr_array![0 => Float32x2],
                }],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some("main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
            cache: None,
        });

        let block_size = reflection.block_size();
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("preview uniforms"),
            size: block_size as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("preview uniform bind group"),
            layout: &layouts.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let quad = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("quad vertices"),
            contents: bytemuck::cast_slice(&QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });

        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(PreviewError::ShaderLink {
                log: error.to_string(),
            });
        }

        Ok(Self {
            pipeline,
            quad,
            uniform_buffer,
            uniform_bind_group,
            staging: vec![0; block_size as usize],
            reflection,
        })
    }

    pub(crate) fn location(&self, name: &str) -> Option<WgpuLocation> {
        self.reflection.location(name)
    }

    /// Stores `value` in the block image; flushed by [`Self::flush`].
    pub(crate) fn write(&mut self, location: WgpuLocation, value: UniformValue) {
        let WgpuLocation::Block { offset } = location else {
            // Texture slots are fixed by the layout.
            return;
        };
        write_std140(&mut self.staging, offset as usize, value);
    }

    pub(crate) fn flush(&self, queue: &wgpu::Queue) {
        queue.write_buffer(&self.uniform_buffer, 0, &self.staging);
    }
}

/// Writes one value at `offset`. Out-of-range writes are dropped.
fn write_std140(block: &mut [u8], offset: usize, value: UniformValue) {
    let bytes: &[u8] = match &value {
        UniformValue::Float(v) => bytemuck::bytes_of(v),
        UniformValue::Int(v) => bytemuck::bytes_of(v),
        UniformValue::Vec2(v) => bytemuck::cast_slice(v),
        UniformValue::Vec3(v) => bytemuck::cast_slice(v),
        UniformValue::Vec4(v) => bytemuck::cast_slice(v),
        UniformValue::Sampler(_) => return,
    };
    match block.get_mut(offset..offset + bytes.len()) {
        Some(target) => target.copy_from_slice(bytes),
        None => tracing::warn!(offset, len = bytes.len(), "uniform write outside block"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn std140_writes_land_at_their_offsets() {
        let mut block = vec![0u8; 48];
        write_std140(&mut block, 0, UniformValue::Vec3([1.0, 2.0, 3.0]));
        write_std140(&mut block, 12, UniformValue::Float(4.0));
        write_std140(&mut block, 16, UniformValue::Int(-2));
        write_std140(&mut block, 32, UniformValue::Vec4([5.0, 6.0, 7.0, 8.0]));

        let floats: Vec<f32> = block
            .chunks_exact(4)
            .map(|chunk| f32::from_ne_bytes(chunk.try_into().unwrap()))
            .collect();
        assert_eq!(&floats[..4], &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(i32::from_ne_bytes(block[16..20].try_into().unwrap()), -2);
        assert_eq!(&floats[8..], &[5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn out_of_range_and_sampler_writes_are_ignored() {
        let mut block = vec![0u8; 16];
        write_std140(&mut block, 8, UniformValue::Vec4([1.0; 4]));
        write_std140(&mut block, 0, UniformValue::Sampler(3));
        assert!(block.iter().all(|&byte| byte == 0));
    }
}
