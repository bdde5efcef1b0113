//! GPU-free drawing surface that records what would have been drawn.
//!
//! Used by the renderer tests and by tooling that only needs to validate
//! shader text. The compile step is a structural check, not a GLSL parser.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::audio::AudioTextureEncoder;
use crate::backend::GraphicsBackend;
use crate::error::{PreviewError, ShaderStage};
use crate::transform::{
    defines_entry_point, helper_functions, strip_comments, USER_SOURCE_MARKER,
};
use crate::types::CHANNEL_COUNT;
use crate::uniforms::{UniformId, UniformValue};

#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessProgram {
    id: u64,
    uniform_names: Vec<String>,
    pending: Vec<(usize, UniformValue)>,
}

impl HeadlessProgram {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Full names (`iChannelTime[1]` style) this program exposes.
    pub fn uniform_names(&self) -> &[String] {
        &self.uniform_names
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeadlessLocation(usize);

/// One recorded draw.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub program: u64,
    pub viewport: (u32, u32),
    pub uniforms: Vec<(String, UniformValue)>,
    /// Audio uploads seen before this draw.
    pub audio_uploads: usize,
}

impl DrawCall {
    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        self.uniforms
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, value)| *value)
    }
}

#[derive(Debug, Default)]
pub struct HeadlessBackend {
    width: u32,
    height: u32,
    next_program: u64,
    live_programs: HashSet<u64>,
    released: Vec<u64>,
    draws: Vec<DrawCall>,
    audio_uploads: usize,
    last_audio: Vec<u8>,
    channel_resolutions: [Option<[f32; 3]>; CHANNEL_COUNT],
    fail_compile: Option<String>,
    fail_link: Option<String>,
    fail_draws: usize,
}

impl HeadlessBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            next_program: 1,
            ..Self::default()
        }
    }

    /// Makes the next fragment compile fail with `log`.
    pub fn fail_next_compile(&mut self, log: impl Into<String>) {
        self.fail_compile = Some(log.into());
    }

    /// Makes the next link fail with `log`.
    pub fn fail_next_link(&mut self, log: impl Into<String>) {
        self.fail_link = Some(log.into());
    }

    /// Makes the next `count` draws fail as if the surface were lost.
    pub fn fail_next_draws(&mut self, count: usize) {
        self.fail_draws = count;
    }

    pub fn set_channel_resolution(&mut self, slot: usize, width: u32, height: u32) {
        if let Some(entry) = self.channel_resolutions.get_mut(slot) {
            *entry = Some([width as f32, height as f32, 1.0]);
        }
    }

    pub fn draws(&self) -> &[DrawCall] {
        &self.draws
    }

    pub fn last_draw(&self) -> Option<&DrawCall> {
        self.draws.last()
    }

    pub fn released_programs(&self) -> &[u64] {
        &self.released
    }

    pub fn live_program_count(&self) -> usize {
        self.live_programs.len()
    }

    pub fn audio_uploads(&self) -> usize {
        self.audio_uploads
    }

    pub fn last_audio_bytes(&self) -> &[u8] {
        &self.last_audio
    }
}

fn identifier_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let names = UniformId::base_names().join("|");
        Regex::new(&format!(r"\b(?:{names})\b")).expect("valid regex")
    })
}

/// Reports the first unbalanced bracket in the style of a GL driver log.
/// Line numbers restart after the user source marker.
fn check_structure(source: &str, stage: ShaderStage) -> Result<(), PreviewError> {
    let code = strip_comments(source);
    if !defines_entry_point(&code) {
        return Err(PreviewError::ShaderCompile {
            stage,
            log: "ERROR: 0:0: 'main' : function not defined".to_string(),
        });
    }

    let mut stack: Vec<(char, usize)> = Vec::new();
    let mut line_no = 0;
    for line in code.lines() {
        line_no += 1;
        if line.trim() == USER_SOURCE_MARKER {
            line_no = 0;
            continue;
        }
        for ch in line.chars() {
            match ch {
                '{' | '(' => stack.push((ch, line_no)),
                '}' | ')' => {
                    let expected = if ch == '}' { '{' } else { '(' };
                    match stack.pop() {
                        Some((open, _)) if open == expected => {}
                        _ => {
                            return Err(PreviewError::ShaderCompile {
                                stage,
                                log: format!("ERROR: 0:{line_no}: '{ch}' : syntax error"),
                            });
                        }
                    }
                }
                _ => {}
            }
        }
    }
    if let Some((open, line_no)) = stack.pop() {
        return Err(PreviewError::ShaderCompile {
            stage,
            log: format!("ERROR: 0:{line_no}: '{open}' : unexpected end of file"),
        });
    }
    Ok(())
}

fn helper_call_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let names: Vec<&str> = helper_functions()
            .iter()
            .map(|(name, _)| name.as_str())
            .collect();
        Regex::new(&format!(r"\b({})\s*\(", names.join("|"))).expect("valid regex")
    })
}

/// Names referenced by the user portion of a wrapped shader, including the
/// uniforms read by any preamble helper it calls.
fn referenced_uniforms(fragment: &str) -> Vec<String> {
    let user = fragment
        .find(USER_SOURCE_MARKER)
        .map(|at| &fragment[at + USER_SOURCE_MARKER.len()..])
        .unwrap_or(fragment);
    let user = strip_comments(user);

    let mut scanned: Vec<&str> = vec![&user];
    let mut called: HashSet<&str> = HashSet::new();
    let mut next = 0;
    while let Some(text) = scanned.get(next).copied() {
        for caps in helper_call_regex().captures_iter(text) {
            let Some(name) = caps.get(1).map(|m| m.as_str()) else {
                continue;
            };
            if let Some((helper, body)) = helper_functions().iter().find(|(n, _)| n == name) {
                if called.insert(helper.as_str()) {
                    scanned.push(body.as_str());
                }
            }
        }
        next += 1;
    }

    let used: HashSet<&str> = scanned
        .iter()
        .flat_map(|text| identifier_regex().find_iter(text))
        .map(|m| m.as_str())
        .collect();
    UniformId::ALL
        .iter()
        .filter(|id| used.contains(id.base_name()))
        .map(|id| id.name().into_owned())
        .collect()
}

impl GraphicsBackend for HeadlessBackend {
    type Program = HeadlessProgram;
    type Location = HeadlessLocation;

    fn compile_program(
        &mut self,
        vertex: &str,
        fragment: &str,
    ) -> Result<HeadlessProgram, PreviewError> {
        check_structure(vertex, ShaderStage::Vertex)?;
        if let Some(log) = self.fail_compile.take() {
            return Err(PreviewError::ShaderCompile {
                stage: ShaderStage::Fragment,
                log,
            });
        }
        check_structure(fragment, ShaderStage::Fragment)?;
        if let Some(log) = self.fail_link.take() {
            return Err(PreviewError::ShaderLink { log });
        }

        let id = self.next_program;
        self.next_program += 1;
        self.live_programs.insert(id);
        Ok(HeadlessProgram {
            id,
            uniform_names: referenced_uniforms(fragment),
            pending: Vec::new(),
        })
    }

    fn uniform_location(&self, program: &HeadlessProgram, name: &str) -> Option<HeadlessLocation> {
        program
            .uniform_names
            .iter()
            .position(|candidate| candidate == name)
            .map(HeadlessLocation)
    }

    fn set_uniform(
        &mut self,
        program: &mut HeadlessProgram,
        location: HeadlessLocation,
        value: UniformValue,
    ) {
        program.pending.push((location.0, value));
    }

    fn upload_audio_texture(&mut self, encoder: &AudioTextureEncoder) {
        self.audio_uploads += 1;
        self.last_audio.clear();
        self.last_audio.extend_from_slice(encoder.bytes());
    }

    fn draw_quad(&mut self, program: &mut HeadlessProgram) -> Result<(), PreviewError> {
        let pending = std::mem::take(&mut program.pending);
        if self.fail_draws > 0 {
            self.fail_draws -= 1;
            return Err(PreviewError::Surface("surface lost".to_string()));
        }
        let uniforms = pending
            .into_iter()
            .map(|(slot, value)| (program.uniform_names[slot].clone(), value))
            .collect();
        self.draws.push(DrawCall {
            program: program.id,
            viewport: (self.width, self.height),
            uniforms,
            audio_uploads: self.audio_uploads,
        });
        Ok(())
    }

    fn release_program(&mut self, program: HeadlessProgram) {
        self.live_programs.remove(&program.id);
        self.released.push(program.id);
    }

    fn viewport(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    fn channel_resolution(&self, slot: usize) -> [f32; 3] {
        self.channel_resolutions
            .get(slot)
            .copied()
            .flatten()
            .unwrap_or([1.0, 1.0, 1.0])
    }
}
