//! Front-end validation and uniform reflection for wrapped GLSL.
//!
//! Shaders are parsed with naga's GLSL frontend, validated, and then
//! inspected so the renderer can resolve uniform names to byte offsets in
//! the std140 block and to texture slots.

use std::collections::HashMap;

use wgpu::naga;

use crate::error::{PreviewError, ShaderStage};
use crate::transform::{texture_global_name, TEXTURE_SET, UNIFORM_BLOCK_BINDING, UNIFORM_SET};
use crate::types::{AUDIO_TEXTURE_SLOT, CHANNEL_COUNT};
use crate::uniforms::UniformId;

const TEXTURE_SLOTS: usize = CHANNEL_COUNT + 1;

/// A location inside a compiled wgpu program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WgpuLocation {
    /// Byte offset inside the uniform block.
    Block { offset: u32 },
    /// Texture slot bound in the texture set.
    Texture { slot: u32 },
}

/// Parsed and validated shader stage.
pub(crate) struct ParsedStage {
    pub module: naga::Module,
    pub info: naga::valid::ModuleInfo,
}

/// Parses and validates one GLSL stage, reporting the frontend's own
/// diagnostics on failure.
pub(crate) fn parse_stage(source: &str, stage: ShaderStage) -> Result<ParsedStage, PreviewError> {
    let naga_stage = match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    };
    let mut frontend = naga::front::glsl::Frontend::default();
    let options = naga::front::glsl::Options::from(naga_stage);
    let module = frontend
        .parse(&options, source)
        .map_err(|errors| PreviewError::ShaderCompile {
            stage,
            log: errors.emit_to_string(source),
        })?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    let info = validator
        .validate(&module)
        .map_err(|error| PreviewError::ShaderCompile {
            stage,
            log: error.emit_to_string(source),
        })?;

    Ok(ParsedStage { module, info })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MemberLayout {
    offset: u32,
    /// Element stride and length for array members.
    array: Option<(u32, u32)>,
}

/// Uniform names a fragment module actually exposes.
#[derive(Debug, Clone, Default)]
pub(crate) struct UniformReflection {
    block_size: u32,
    members: HashMap<String, MemberLayout>,
    textures: [bool; TEXTURE_SLOTS],
}

impl UniformReflection {
    pub fn from_stage(stage: &ParsedStage) -> Self {
        let module = &stage.module;
        let entry_info = module
            .entry_points
            .iter()
            .position(|entry| entry.stage == naga::ShaderStage::Fragment)
            .map(|index| stage.info.get_entry_point(index));

        let mut reflection = Self::default();
        for (handle, global) in module.global_variables.iter() {
            let used = entry_info.is_some_and(|info| !info[handle].is_empty());
            let Some(binding) = &global.binding else {
                continue;
            };

            if binding.group == UNIFORM_SET
                && binding.binding == UNIFORM_BLOCK_BINDING
                && global.space == naga::AddressSpace::Uniform
            {
                if let naga::TypeInner::Struct { members, span } = &module.types[global.ty].inner {
                    reflection.block_size = *span;
                    if !used {
                        continue;
                    }
                    for member in members {
                        let Some(name) = &member.name else { continue };
                        let array = match &module.types[member.ty].inner {
                            naga::TypeInner::Array {
                                size: naga::ArraySize::Constant(len),
                                stride,
                                ..
                            } => Some((*stride, len.get())),
                            _ => None,
                        };
                        reflection.members.insert(
                            name.clone(),
                            MemberLayout {
                                offset: member.offset,
                                array,
                            },
                        );
                    }
                }
                continue;
            }

            if binding.group == TEXTURE_SET && used {
                if let Some(name) = &global.name {
                    reflection.mark_texture(name);
                }
            }
        }
        reflection
    }

    fn mark_texture(&mut self, global_name: &str) {
        for slot in 0..TEXTURE_SLOTS as u32 {
            if texture_global_name(slot) == global_name {
                self.textures[slot as usize] = true;
            }
        }
    }

    /// Size of the uniform block, rounded up to a 16-byte multiple.
    pub fn block_size(&self) -> u32 {
        self.block_size.max(16).next_multiple_of(16)
    }

    pub fn location(&self, name: &str) -> Option<WgpuLocation> {
        let (base, index) = split_array_name(name)?;
        if let Some(slot) = texture_slot(base) {
            return self.textures[slot as usize].then_some(WgpuLocation::Texture { slot });
        }
        let member = self.members.get(base)?;
        let offset = match (member.array, index) {
            (Some((stride, len)), Some(index)) if index < len => member.offset + stride * index,
            (None, None) => member.offset,
            _ => return None,
        };
        Some(WgpuLocation::Block { offset })
    }
}

/// Maps a sampler uniform name to its texture slot.
fn texture_slot(base: &str) -> Option<u32> {
    if base == UniformId::AudioHistory.base_name() {
        return Some(AUDIO_TEXTURE_SLOT);
    }
    (0..CHANNEL_COUNT as u8)
        .find(|&index| UniformId::Channel(index).base_name() == base)
        .map(u32::from)
}

/// Splits `iChannelTime[2]` into `("iChannelTime", Some(2))`.
fn split_array_name(name: &str) -> Option<(&str, Option<u32>)> {
    match name.split_once('[') {
        None => Some((name, None)),
        Some((base, rest)) => {
            let index = rest.strip_suffix(']')?.trim().parse().ok()?;
            Some((base, Some(index)))
        }
    }
}
