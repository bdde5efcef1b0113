use std::path::Path;

use anyhow::{Context, Result};
use image::imageops::flip_vertical_in_place;
use image::GenericImageView;
use wgpu::util::{DeviceExt, TextureDataOrder};

use crate::audio::{
    AudioTextureEncoder, AudioTextureFormat, AUDIO_TEXTURE_HEIGHT, AUDIO_TEXTURE_WIDTH,
};
use crate::transform::{sampler_binding, texture_binding};
use crate::types::{ChannelBindings, AUDIO_TEXTURE_SLOT, CHANNEL_COUNT};

use super::context::SurfaceColorSpace;

pub(crate) struct ChannelResources {
    pub _texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    pub resolution: [f32; 3],
}

/// Image channels plus the audio texture, bound together as the texture set.
pub(crate) struct TextureSet {
    pub layout: wgpu::BindGroupLayout,
    pub bind_group: wgpu::BindGroup,
    channels: Vec<ChannelResources>,
    audio_texture: wgpu::Texture,
    audio_view: wgpu::TextureView,
    audio_sampler: wgpu::Sampler,
    audio_format: AudioTextureFormat,
}

impl TextureSet {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        bindings: &ChannelBindings,
        audio_format: AudioTextureFormat,
        color_space: SurfaceColorSpace,
    ) -> Self {
        let channels = create_channel_resources(device, queue, bindings, color_space);
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("texture set layout"),
            entries: &build_layout_entries(),
        });
        let audio_texture = create_audio_texture(device, audio_format);
        let audio_view = audio_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let audio_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("audio sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let bind_group = build_bind_group(device, &layout, &channels, &audio_view, &audio_sampler);

        Self {
            layout,
            bind_group,
            channels,
            audio_texture,
            audio_view,
            audio_sampler,
            audio_format,
        }
    }

    pub fn channel_resolution(&self, slot: usize) -> Option<[f32; 3]> {
        self.channels.get(slot).map(|channel| channel.resolution)
    }

    /// Copies the encoder rows into the audio texture, recreating it when the
    /// encoder switched formats.
    pub fn upload_audio(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &AudioTextureEncoder,
    ) {
        if encoder.format() != self.audio_format {
            tracing::debug!(format = ?encoder.format(), "recreating audio texture");
            self.audio_format = encoder.format();
            self.audio_texture = create_audio_texture(device, self.audio_format);
            self.audio_view = self
                .audio_texture
                .create_view(&wgpu::TextureViewDescriptor::default());
            self.bind_group = build_bind_group(
                device,
                &self.layout,
                &self.channels,
                &self.audio_view,
                &self.audio_sampler,
            );
        }

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.audio_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            encoder.bytes(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(encoder.bytes_per_row() as u32),
                rows_per_image: Some(AUDIO_TEXTURE_HEIGHT as u32),
            },
            wgpu::Extent3d {
                width: AUDIO_TEXTURE_WIDTH as u32,
                height: AUDIO_TEXTURE_HEIGHT as u32,
                depth_or_array_layers: 1,
            },
        );
    }
}

fn audio_texture_format(format: AudioTextureFormat) -> wgpu::TextureFormat {
    match format {
        AudioTextureFormat::Unorm8 => wgpu::TextureFormat::Rgba8Unorm,
        AudioTextureFormat::Float32 => wgpu::TextureFormat::Rgba32Float,
    }
}

fn create_audio_texture(device: &wgpu::Device, format: AudioTextureFormat) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("audio history texture"),
        size: wgpu::Extent3d {
            width: AUDIO_TEXTURE_WIDTH as u32,
            height: AUDIO_TEXTURE_HEIGHT as u32,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: audio_texture_format(format),
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    })
}

/// Texture/sampler pairs for the four image slots followed by the audio slot.
/// The audio slot is non-filterable so a 32-bit float texture binds without
/// extra device features.
fn build_layout_entries() -> Vec<wgpu::BindGroupLayoutEntry> {
    let mut entries = Vec::with_capacity((CHANNEL_COUNT + 1) * 2);
    for slot in 0..=AUDIO_TEXTURE_SLOT {
        let filterable = slot != AUDIO_TEXTURE_SLOT;
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: texture_binding(slot),
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                multisampled: false,
                view_dimension: wgpu::TextureViewDimension::D2,
                sample_type: wgpu::TextureSampleType::Float { filterable },
            },
            count: None,
        });
        let sampler_type = if filterable {
            wgpu::SamplerBindingType::Filtering
        } else {
            wgpu::SamplerBindingType::NonFiltering
        };
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: sampler_binding(slot),
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(sampler_type),
            count: None,
        });
    }
    entries
}

fn build_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    channels: &[ChannelResources],
    audio_view: &wgpu::TextureView,
    audio_sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    let mut entries = Vec::with_capacity((channels.len() + 1) * 2);
    for (slot, channel) in channels.iter().enumerate() {
        entries.push(wgpu::BindGroupEntry {
            binding: texture_binding(slot as u32),
            resource: wgpu::BindingResource::TextureView(&channel.view),
        });
        entries.push(wgpu::BindGroupEntry {
            binding: sampler_binding(slot as u32),
            resource: wgpu::BindingResource::Sampler(&channel.sampler),
        });
    }
    entries.push(wgpu::BindGroupEntry {
        binding: texture_binding(AUDIO_TEXTURE_SLOT),
        resource: wgpu::BindingResource::TextureView(audio_view),
    });
    entries.push(wgpu::BindGroupEntry {
        binding: sampler_binding(AUDIO_TEXTURE_SLOT),
        resource: wgpu::BindingResource::Sampler(audio_sampler),
    });

    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("texture set bind group"),
        layout,
        entries: &entries,
    })
}

fn create_channel_resources(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    bindings: &ChannelBindings,
    color_space: SurfaceColorSpace,
) -> Vec<ChannelResources> {
    let mut resources = Vec::with_capacity(CHANNEL_COUNT);
    for (index, binding) in bindings.slots().iter().enumerate() {
        let resource = match binding {
            Some(path) => match load_texture_channel(device, queue, index, path, color_space) {
                Ok(resource) => resource,
                Err(error) => {
                    tracing::warn!(
                        channel = index,
                        path = %path.display(),
                        error = %error,
                        "failed to load texture channel; using placeholder"
                    );
                    create_placeholder_texture(device, queue, index, color_space)
                }
            },
            None => create_placeholder_texture(device, queue, index, color_space),
        };
        resources.push(resource);
    }
    resources
}

fn channel_texture_format(color_space: SurfaceColorSpace) -> wgpu::TextureFormat {
    match color_space {
        SurfaceColorSpace::Gamma => wgpu::TextureFormat::Rgba8Unorm,
        SurfaceColorSpace::Linear => wgpu::TextureFormat::Rgba8UnormSrgb,
    }
}

fn linear_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    })
}

/// Opaque black 1x1 stand-in for unbound slots.
fn create_placeholder_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    index: usize,
    color_space: SurfaceColorSpace,
) -> ChannelResources {
    let data = [0u8, 0, 0, 255];
    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some(&format!("placeholder channel texture #{index}")),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: channel_texture_format(color_space),
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        TextureDataOrder::LayerMajor,
        &data,
    );

    ChannelResources {
        view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
        sampler: linear_sampler(device),
        _texture: texture,
        resolution: [1.0, 1.0, 1.0],
    }
}

fn load_texture_channel(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    index: usize,
    path: &Path,
    color_space: SurfaceColorSpace,
) -> Result<ChannelResources> {
    let image = image::open(path).with_context(|| {
        format!(
            "failed to open texture for channel {} at {}",
            index,
            path.display()
        )
    })?;
    let (width, height) = image.dimensions();
    let mut rgba = image.to_rgba8();
    flip_vertical_in_place(&mut rgba);

    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some(&format!("channel texture #{index}")),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: channel_texture_format(color_space),
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        TextureDataOrder::LayerMajor,
        &rgba,
    );
    tracing::debug!(channel = index, width, height, path = %path.display(), "loaded channel texture");

    Ok(ChannelResources {
        view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
        sampler: linear_sampler(device),
        _texture: texture,
        resolution: [width as f32, height as f32, 1.0],
    })
}
