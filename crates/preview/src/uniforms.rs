//! Fixed uniform contract shared by the source transformer, the binding table
//! and every drawing surface.
//!
//! Each entry is resolved once per linked program. Names the program does not
//! use resolve to `None` and are skipped on every write; that is the normal
//! case for most shaders, not an error.

use std::borrow::Cow;

use chrono::{Datelike, Local, Timelike};

use crate::projection::CameraRig;
use crate::types::{CameraMode, AUDIO_TEXTURE_SLOT, CHANNEL_COUNT};

/// Shader-side type of a uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Float,
    Int,
    Vec2,
    Vec3,
    Vec4,
    Sampler,
}

impl UniformKind {
    pub fn glsl_type(self) -> &'static str {
        match self {
            UniformKind::Float => "float",
            UniformKind::Int => "int",
            UniformKind::Vec2 => "vec2",
            UniformKind::Vec3 => "vec3",
            UniformKind::Vec4 => "vec4",
            UniformKind::Sampler => "sampler2D",
        }
    }
}

/// A single per-draw value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    /// Texture unit the sampler reads from.
    Sampler(u32),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            UniformValue::Float(_) => UniformKind::Float,
            UniformValue::Int(_) => UniformKind::Int,
            UniformValue::Vec2(_) => UniformKind::Vec2,
            UniformValue::Vec3(_) => UniformKind::Vec3,
            UniformValue::Vec4(_) => UniformKind::Vec4,
            UniformValue::Sampler(_) => UniformKind::Sampler,
        }
    }
}

/// Every uniform the preview knows how to feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformId {
    Resolution,
    Time,
    TimeDelta,
    FrameRate,
    Frame,
    Mouse,
    Date,
    SampleRate,
    Duration,
    PassIndex,
    TileOffset,
    ChannelTime(u8),
    ChannelResolution(u8),
    Channel(u8),
    AudioHistory,
    AudioHistoryResolution,
    CameraMode,
    CameraStereo,
    CameraPos,
    CameraDir,
    CameraUp,
    CameraFov,
    CameraTiltDeg,
    CameraIpd,
    Jitter,
    SampleIndex,
}

pub const UNIFORM_COUNT: usize = 35;

impl UniformId {
    /// The descriptor table, in declaration order.
    pub const ALL: [UniformId; UNIFORM_COUNT] = [
        UniformId::Resolution,
        UniformId::Time,
        UniformId::TimeDelta,
        UniformId::FrameRate,
        UniformId::Frame,
        UniformId::Mouse,
        UniformId::Date,
        UniformId::SampleRate,
        UniformId::Duration,
        UniformId::PassIndex,
        UniformId::TileOffset,
        UniformId::ChannelTime(0),
        UniformId::ChannelTime(1),
        UniformId::ChannelTime(2),
        UniformId::ChannelTime(3),
        UniformId::ChannelResolution(0),
        UniformId::ChannelResolution(1),
        UniformId::ChannelResolution(2),
        UniformId::ChannelResolution(3),
        UniformId::Channel(0),
        UniformId::Channel(1),
        UniformId::Channel(2),
        UniformId::Channel(3),
        UniformId::AudioHistory,
        UniformId::AudioHistoryResolution,
        UniformId::CameraMode,
        UniformId::CameraStereo,
        UniformId::CameraPos,
        UniformId::CameraDir,
        UniformId::CameraUp,
        UniformId::CameraFov,
        UniformId::CameraTiltDeg,
        UniformId::CameraIpd,
        UniformId::Jitter,
        UniformId::SampleIndex,
    ];

    /// Identifier as written in shader source, without any array subscript.
    pub fn base_name(self) -> &'static str {
        match self {
            UniformId::Resolution => "iResolution",
            UniformId::Time => "iTime",
            UniformId::TimeDelta => "iTimeDelta",
            UniformId::FrameRate => "iFrameRate",
            UniformId::Frame => "iFrame",
            UniformId::Mouse => "iMouse",
            UniformId::Date => "iDate",
            UniformId::SampleRate => "iSampleRate",
            UniformId::Duration => "iDuration",
            UniformId::PassIndex => "iPassIndex",
            UniformId::TileOffset => "iTileOffset",
            UniformId::ChannelTime(_) => "iChannelTime",
            UniformId::ChannelResolution(_) => "iChannelResolution",
            UniformId::Channel(0) => "iChannel0",
            UniformId::Channel(1) => "iChannel1",
            UniformId::Channel(2) => "iChannel2",
            UniformId::Channel(_) => "iChannel3",
            UniformId::AudioHistory => "iAudioHistoryTex",
            UniformId::AudioHistoryResolution => "iAudioHistoryResolution",
            UniformId::CameraMode => "iCameraMode",
            UniformId::CameraStereo => "iCameraStereo",
            UniformId::CameraPos => "iCameraPos",
            UniformId::CameraDir => "iCameraDir",
            UniformId::CameraUp => "iCameraUp",
            UniformId::CameraFov => "iCameraFov",
            UniformId::CameraTiltDeg => "iCameraTiltDeg",
            UniformId::CameraIpd => "iCameraIPD",
            UniformId::Jitter => "iJitter",
            UniformId::SampleIndex => "iSampleIndex",
        }
    }

    pub fn array_index(self) -> Option<usize> {
        match self {
            UniformId::ChannelTime(index) | UniformId::ChannelResolution(index) => {
                Some(index as usize)
            }
            _ => None,
        }
    }

    /// Lookup name as a driver would see it, e.g. `iChannelTime[2]`.
    pub fn name(self) -> Cow<'static, str> {
        match self.array_index() {
            Some(index) => Cow::Owned(format!("{}[{index}]", self.base_name())),
            None => Cow::Borrowed(self.base_name()),
        }
    }

    pub fn kind(self) -> UniformKind {
        match self {
            UniformId::Time
            | UniformId::TimeDelta
            | UniformId::FrameRate
            | UniformId::SampleRate
            | UniformId::Duration
            | UniformId::ChannelTime(_)
            | UniformId::CameraFov
            | UniformId::CameraTiltDeg
            | UniformId::CameraIpd => UniformKind::Float,
            UniformId::Frame
            | UniformId::PassIndex
            | UniformId::CameraMode
            | UniformId::CameraStereo
            | UniformId::SampleIndex => UniformKind::Int,
            UniformId::TileOffset | UniformId::Jitter => UniformKind::Vec2,
            UniformId::Resolution
            | UniformId::ChannelResolution(_)
            | UniformId::AudioHistoryResolution
            | UniformId::CameraPos
            | UniformId::CameraDir
            | UniformId::CameraUp => UniformKind::Vec3,
            UniformId::Mouse | UniformId::Date => UniformKind::Vec4,
            UniformId::Channel(_) | UniformId::AudioHistory => UniformKind::Sampler,
        }
    }

    pub fn is_sampler(self) -> bool {
        self.kind() == UniformKind::Sampler
    }

    /// Distinct base names, in declaration order.
    pub fn base_names() -> Vec<&'static str> {
        let mut names: Vec<&'static str> = Vec::with_capacity(UNIFORM_COUNT);
        for id in Self::ALL {
            let name = id.base_name();
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }
}

/// Transient per-frame value set written before every draw.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformFrame {
    pub resolution: [f32; 3],
    pub time: f32,
    pub time_delta: f32,
    pub frame_rate: f32,
    pub frame: i32,
    pub mouse: [f32; 4],
    pub date: [f32; 4],
    pub sample_rate: f32,
    pub duration: f32,
    pub pass_index: i32,
    pub tile_offset: [f32; 2],
    pub channel_time: [f32; CHANNEL_COUNT],
    pub channel_resolution: [[f32; 3]; CHANNEL_COUNT],
    pub audio_resolution: [f32; 3],
    pub camera_mode: CameraMode,
    pub camera_stereo: i32,
    pub camera: CameraRig,
    /// Subpixel offset reserved for multi-sample accumulation; zero in the preview.
    pub jitter: [f32; 2],
    /// Reserved for multi-sample accumulation; zero in the preview.
    pub sample_index: i32,
}

impl UniformFrame {
    pub fn new(width: u32, height: u32) -> Self {
        let mut frame = Self {
            resolution: [width as f32, height as f32, 1.0],
            time: 0.0,
            time_delta: 0.0,
            frame_rate: 0.0,
            frame: 0,
            mouse: [0.0; 4],
            date: [0.0; 4],
            sample_rate: 44_100.0,
            duration: 0.0,
            pass_index: 0,
            tile_offset: [0.0; 2],
            channel_time: [0.0; CHANNEL_COUNT],
            channel_resolution: [[1.0, 1.0, 1.0]; CHANNEL_COUNT],
            audio_resolution: [0.0; 3],
            camera_mode: CameraMode::Standard2d,
            camera_stereo: 0,
            camera: CameraRig::default(),
            jitter: [0.0; 2],
            sample_index: 0,
        };
        frame.refresh_date();
        frame
    }

    /// Updates `iDate` to (year, month starting at 0, day, seconds since midnight).
    pub fn refresh_date(&mut self) {
        let local_now = Local::now();
        let seconds_since_midnight = local_now.num_seconds_from_midnight() as f32
            + local_now.nanosecond() as f32 / 1_000_000_000.0;
        self.date = [
            local_now.year() as f32,
            local_now.month0() as f32,
            local_now.day() as f32,
            seconds_since_midnight,
        ];
    }

    pub fn value(&self, id: UniformId) -> UniformValue {
        let camera = &self.camera;
        match id {
            UniformId::Resolution => UniformValue::Vec3(self.resolution),
            UniformId::Time => UniformValue::Float(self.time),
            UniformId::TimeDelta => UniformValue::Float(self.time_delta),
            UniformId::FrameRate => UniformValue::Float(self.frame_rate),
            UniformId::Frame => UniformValue::Int(self.frame),
            UniformId::Mouse => UniformValue::Vec4(self.mouse),
            UniformId::Date => UniformValue::Vec4(self.date),
            UniformId::SampleRate => UniformValue::Float(self.sample_rate),
            UniformId::Duration => UniformValue::Float(self.duration),
            UniformId::PassIndex => UniformValue::Int(self.pass_index),
            UniformId::TileOffset => UniformValue::Vec2(self.tile_offset),
            UniformId::ChannelTime(index) => {
                UniformValue::Float(self.channel_time[index as usize % CHANNEL_COUNT])
            }
            UniformId::ChannelResolution(index) => {
                UniformValue::Vec3(self.channel_resolution[index as usize % CHANNEL_COUNT])
            }
            UniformId::Channel(index) => UniformValue::Sampler(u32::from(index)),
            UniformId::AudioHistory => UniformValue::Sampler(AUDIO_TEXTURE_SLOT),
            UniformId::AudioHistoryResolution => UniformValue::Vec3(self.audio_resolution),
            UniformId::CameraMode => UniformValue::Int(self.camera_mode.code()),
            UniformId::CameraStereo => UniformValue::Int(self.camera_stereo),
            UniformId::CameraPos => UniformValue::Vec3(camera.position.to_array()),
            UniformId::CameraDir => UniformValue::Vec3(camera.direction.to_array()),
            UniformId::CameraUp => UniformValue::Vec3(camera.up.to_array()),
            UniformId::CameraFov => UniformValue::Float(camera.fov),
            UniformId::CameraTiltDeg => UniformValue::Float(camera.tilt_deg),
            UniformId::CameraIpd => UniformValue::Float(camera.ipd),
            UniformId::Jitter => UniformValue::Vec2(self.jitter),
            UniformId::SampleIndex => UniformValue::Int(self.sample_index),
        }
    }
}

/// Uniform locations resolved once per linked program.
#[derive(Debug, Clone)]
pub struct UniformBindingTable<L> {
    locations: [Option<L>; UNIFORM_COUNT],
}

impl<L: Copy> UniformBindingTable<L> {
    /// Queries `lookup` once for every entry of the descriptor table.
    pub fn resolve(mut lookup: impl FnMut(&str) -> Option<L>) -> Self {
        Self {
            locations: std::array::from_fn(|slot| lookup(&UniformId::ALL[slot].name())),
        }
    }

    pub fn location(&self, id: UniformId) -> Option<L> {
        UniformId::ALL
            .iter()
            .position(|candidate| *candidate == id)
            .and_then(|slot| self.locations[slot])
    }

    pub fn is_active(&self, id: UniformId) -> bool {
        self.location(id).is_some()
    }

    pub fn active_count(&self) -> usize {
        self.locations.iter().filter(|slot| slot.is_some()).count()
    }

    /// Hands every resolved uniform to `sink` exactly once, skipping absent
    /// entries. Returns how many values were written.
    pub fn write(&self, frame: &UniformFrame, mut sink: impl FnMut(L, UniformValue)) -> usize {
        let mut written = 0;
        for (id, location) in UniformId::ALL.iter().zip(self.locations.iter()) {
            if let Some(location) = location {
                sink(*location, frame.value(*id));
                written += 1;
            }
        }
        written
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn descriptor_table_is_unique_and_typed() {
        let mut seen = HashMap::new();
        for id in UniformId::ALL {
            assert!(seen.insert(id.name(), id).is_none(), "duplicate {id:?}");
        }
        assert_eq!(seen.len(), UNIFORM_COUNT);
        assert_eq!(UniformId::ChannelTime(2).name(), "iChannelTime[2]");
        assert_eq!(UniformId::CameraIpd.name(), "iCameraIPD");
        assert_eq!(UniformId::base_names().len(), UNIFORM_COUNT - 6);
    }

    #[test]
    fn frame_values_match_declared_kinds() {
        let frame = UniformFrame::new(640, 360);
        for id in UniformId::ALL {
            assert_eq!(frame.value(id).kind(), id.kind(), "{id:?}");
        }
        assert_eq!(
            frame.value(UniformId::Resolution),
            UniformValue::Vec3([640.0, 360.0, 1.0])
        );
        assert_eq!(
            frame.value(UniformId::AudioHistory),
            UniformValue::Sampler(AUDIO_TEXTURE_SLOT)
        );
    }

    #[test]
    fn date_uses_zero_based_month() {
        let frame = UniformFrame::new(1, 1);
        assert!(frame.date[0] >= 2000.0);
        assert!((0.0..12.0).contains(&frame.date[1]));
        assert!((1.0..=31.0).contains(&frame.date[2]));
        assert!((0.0..86_401.0).contains(&frame.date[3]));
    }

    #[test]
    fn absent_uniforms_are_skipped_silently() {
        let active = ["iTime", "iResolution", "iChannelTime[1]"];
        let table = UniformBindingTable::resolve(|name| {
            active.iter().position(|candidate| *candidate == name)
        });
        assert_eq!(table.active_count(), 3);
        assert!(table.is_active(UniformId::ChannelTime(1)));
        assert!(!table.is_active(UniformId::ChannelTime(0)));
        assert!(!table.is_active(UniformId::Mouse));

        let mut frame = UniformFrame::new(8, 8);
        frame.time = 2.5;
        let mut writes = Vec::new();
        let written = table.write(&frame, |location, value| writes.push((location, value)));
        assert_eq!(written, 3);
        assert!(writes.contains(&(0, UniformValue::Float(2.5))));
        assert!(writes.contains(&(1, UniformValue::Vec3([8.0, 8.0, 1.0]))));
    }

    #[test]
    fn every_resolved_uniform_is_written_once() {
        let mut next = 0usize;
        let table = UniformBindingTable::resolve(|_| {
            next += 1;
            Some(next)
        });
        assert_eq!(table.active_count(), UNIFORM_COUNT);
        let mut counts: HashMap<usize, usize> = HashMap::new();
        let frame = UniformFrame::new(2, 2);
        table.write(&frame, |location, _| {
            *counts.entry(location).or_default() += 1;
        });
        assert_eq!(counts.len(), UNIFORM_COUNT);
        assert!(counts.values().all(|count| *count == 1));
    }
}
