//! Rewrites user fragment code into a self-contained Vulkan-flavoured GLSL
//! shader carrying the preview's uniform contract.

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;

use crate::types::{AUDIO_TEXTURE_SLOT, CHANNEL_COUNT};
use crate::uniforms::UniformId;

/// Marker separating the injected preamble from the user body. Compiler line
/// numbers after it refer to the user's own source.
pub const USER_SOURCE_MARKER: &str = "#line 1";

/// Descriptor set holding the uniform block.
pub const UNIFORM_SET: u32 = 0;
pub const UNIFORM_BLOCK_BINDING: u32 = 0;
/// Descriptor set holding every texture/sampler pair.
pub const TEXTURE_SET: u32 = 1;
pub const UNIFORM_BLOCK_NAME: &str = "PreviewUniforms";

pub fn texture_binding(slot: u32) -> u32 {
    slot * 2
}

pub fn sampler_binding(slot: u32) -> u32 {
    slot * 2 + 1
}

/// Name of the separate texture global backing a sampler slot.
pub fn texture_global_name(slot: u32) -> String {
    if slot == AUDIO_TEXTURE_SLOT {
        "preview_audio_texture".to_string()
    } else {
        format!("preview_channel{slot}_texture")
    }
}

fn sampler_global_name(slot: u32) -> String {
    if slot == AUDIO_TEXTURE_SLOT {
        "preview_audio_sampler".to_string()
    } else {
        format!("preview_channel{slot}_sampler")
    }
}

/// Constant pass-through vertex stage for the four-vertex strip.
pub const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) in vec2 position;

void main() {
    gl_Position = vec4(position, 0.0, 1.0);
}
";

/// Projection helpers shared with [`crate::projection`].
const CAMERA_HELPERS: &str = r"const float PREVIEW_PI = 3.14159265359;
const float PREVIEW_HALF_PI = 1.57079632679;

mat3 buildCameraBasis(vec3 dir, vec3 up) {
    vec3 f = normalize(dir);
    vec3 r = normalize(cross(up, f));
    vec3 u = cross(f, r);
    return mat3(r, u, f);
}

vec3 cameraDirEquirect(vec2 uv, mat3 camBasis) {
    float lon = (uv.x * 2.0 - 1.0) * PREVIEW_PI;
    float lat = (uv.y * 2.0 - 1.0) * PREVIEW_HALF_PI;
    vec3 dir = vec3(cos(lat) * sin(lon), sin(lat), cos(lat) * cos(lon));
    return normalize(camBasis * dir);
}

// camBasis is accepted for call-site compatibility; the dome is world-aligned.
vec3 cameraDirLL180(vec2 uv, float tiltDeg, mat3 camBasis) {
    vec2 p = uv * 2.0 - 1.0;
    float r = min(length(p), 1.0);
    float az = atan(p.y, p.x);
    float theta = r * PREVIEW_HALF_PI;
    float lat = clamp(radians(tiltDeg) - theta, -PREVIEW_HALF_PI, PREVIEW_HALF_PI);
    return normalize(vec3(cos(lat) * sin(az), sin(lat), cos(lat) * cos(az)));
}

vec3 cameraRayDir(vec2 uv) {
    mat3 basis = buildCameraBasis(iCameraDir, iCameraUp);
    if (iCameraMode == 2) {
        return cameraDirLL180(uv, iCameraTiltDeg, basis);
    }
    return cameraDirEquirect(uv, basis);
}

// Row 0 holds the spectrum, row 1 the waveform.
float sampleAudioSpectrum(float x) {
    return texture(iAudioHistoryTex, vec2(x, 0.25)).r;
}

float sampleAudioWaveform(float x) {
    return texture(iAudioHistoryTex, vec2(x, 0.75)).r * 2.0 - 1.0;
}
";

/// Captures the rasteriser coordinate, then routes every later
/// `gl_FragCoord` read through the bottom-left remapped copy.
const FRAG_COORD_REMAP: &str = r"vec4 preview_gl_FragCoord;

// Vulkan rasterises with a top-left origin; Shadertoy code expects bottom-left.
void previewCaptureFragCoord() {
    preview_gl_FragCoord = vec4(gl_FragCoord.x, iResolution.y - gl_FragCoord.y, gl_FragCoord.zw);
}

#define gl_FragCoord preview_gl_FragCoord
";

/// Call injected at the top of every entry point so the remapped
/// coordinate is valid before user code runs.
const CAPTURE_CALL: &str = "previewCaptureFragCoord();";

/// Entry point appended when the user body only defines `mainImage`.
const MAIN_WRAPPER: &str = r"
void main() {
    previewCaptureFragCoord();
    vec2 fragCoord = gl_FragCoord.xy + iTileOffset;
    vec4 color = vec4(0.0, 0.0, 0.0, 1.0);
    mainImage(color, fragCoord);
    fragColor = color;
}
";

/// Result of wrapping one user shader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedShader {
    /// Complete fragment source handed to the drawing surface.
    pub source: String,
    /// `true` when the user body defined `main()` itself. No wrapper is
    /// appended then; the coordinate capture is injected into its body.
    pub has_user_main: bool,
}

/// Deterministic rewrite of user fragment code. Stateless; a single instance
/// is reused for every compile.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShaderSourceTransformer;

impl ShaderSourceTransformer {
    pub fn new() -> Self {
        Self
    }

    pub fn vertex_source(&self) -> &'static str {
        VERTEX_SHADER_GLSL
    }

    pub fn transform(&self, source: &str) -> WrappedShader {
        let has_user_main = defines_entry_point(source);
        let mut body = strip_conflicting_declarations(source);
        if has_user_main {
            body = inject_capture_call(&body);
        }

        let preamble = fragment_preamble();
        let mut wrapped = String::with_capacity(
            preamble.len() + body.len() + MAIN_WRAPPER.len() + USER_SOURCE_MARKER.len() + 64,
        );
        wrapped.push_str(preamble);
        push_legacy_constants(&mut wrapped, source);
        wrapped.push_str(USER_SOURCE_MARKER);
        wrapped.push('\n');
        wrapped.push_str(&body);
        if !body.ends_with('\n') {
            wrapped.push('\n');
        }
        if !has_user_main {
            wrapped.push_str(MAIN_WRAPPER);
        }

        WrappedShader {
            source: wrapped,
            has_user_main,
        }
    }
}

fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^[ \t]*#[ \t]*version[^\n]*").expect("valid regex"))
}

fn uniform_declaration_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let names = UniformId::base_names().join("|");
        let pattern = format!(
            r"uniform\s+(?:(?:lowp|mediump|highp)\s+)?\w+\s+(?:{names})\s*(?:\[\s*\d*\s*\])?\s*;"
        );
        Regex::new(&pattern).expect("valid regex")
    })
}

fn output_declaration_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?:layout\s*\([^)]*\)\s*)?out\s+(?:(?:lowp|mediump|highp)\s+)?vec4\s+fragColor\s*;",
        )
        .expect("valid regex")
    })
}

fn main_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bvoid\s+main\s*\(\s*(?:void\s*)?\)").expect("valid regex"))
}

fn main_definition_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\bvoid\s+main\s*\(\s*(?:void\s*)?\)\s*\{").expect("valid regex")
    })
}

fn legacy_constant_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"#[ \t]*define[ \t]+(PI|HALFPI)\b|\bfloat\s+(PI|HALFPI)\b")
            .expect("valid regex")
    })
}

fn function_header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\w+\s+(\w+)\s*\([^)]*\)\s*\{").expect("valid regex")
    })
}

/// Every helper function the preamble defines, with its body text.
pub(crate) fn helper_functions() -> &'static [(String, String)] {
    static HELPERS: OnceLock<Vec<(String, String)>> = OnceLock::new();
    HELPERS.get_or_init(|| {
        let code = format!("{FRAG_COORD_REMAP}\n{CAMERA_HELPERS}");
        let code = strip_comments(&code);
        let mut helpers = Vec::new();
        for caps in function_header_regex().captures_iter(&code) {
            let (Some(header), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let rest = &code[header.end()..];
            let mut depth = 1usize;
            let end = rest.char_indices().find_map(|(at, ch)| {
                match ch {
                    '{' => depth += 1,
                    '}' => depth -= 1,
                    _ => {}
                }
                (depth == 0).then_some(at)
            });
            if let Some(end) = end {
                helpers.push((name.as_str().to_string(), rest[..end].to_string()));
            }
        }
        helpers
    })
}

fn comment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)/\*.*?\*/|//[^\n]*").expect("valid regex"))
}

/// Blanks out `//` and `/* */` comments, keeping line breaks so line
/// numbers still match the input.
pub(crate) fn strip_comments(source: &str) -> Cow<'_, str> {
    comment_regex().replace_all(source, |caps: &regex::Captures<'_>| {
        let newlines = caps[0].matches('\n').count();
        format!(" {}", "\n".repeat(newlines))
    })
}

/// Whether the source defines `void main()` outside of comments.
pub fn defines_entry_point(source: &str) -> bool {
    main_regex().is_match(&strip_comments(source))
}

/// Puts the coordinate capture on the same line as the opening brace of
/// the user's `main`, so line numbers are unchanged.
fn inject_capture_call(body: &str) -> String {
    main_definition_regex()
        .replace_all(body, |caps: &regex::Captures<'_>| {
            format!("{} {CAPTURE_CALL}", &caps[0])
        })
        .into_owned()
}

/// Declares `PI` and `HALFPI` unless the user source defines them itself.
fn push_legacy_constants(out: &mut String, source: &str) {
    let code = strip_comments(source);
    let mut declared = [false; 2];
    for caps in legacy_constant_regex().captures_iter(&code) {
        match caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str()) {
            Some("PI") => declared[0] = true,
            Some("HALFPI") => declared[1] = true,
            _ => {}
        }
    }
    if !declared[0] {
        out.push_str("const float PI = PREVIEW_PI;\n");
    }
    if !declared[1] {
        out.push_str("const float HALFPI = PREVIEW_HALF_PI;\n");
    }
}

/// Removes the version directive and every declaration the preamble supplies.
/// The directive's line is left empty so user line numbers are unchanged.
fn strip_conflicting_declarations(source: &str) -> String {
    let without_version = version_regex().replacen(source, 1, "");
    let without_uniforms = uniform_declaration_regex().replace_all(&without_version, "");
    output_declaration_regex()
        .replace_all(&without_uniforms, "")
        .into_owned()
}

fn fragment_preamble() -> &'static str {
    static PREAMBLE: OnceLock<String> = OnceLock::new();
    PREAMBLE.get_or_init(build_preamble)
}

fn build_preamble() -> String {
    let mut out = String::from("#version 450\nprecision highp float;\n\n");
    out.push_str("layout(location = 0) out vec4 fragColor;\n\n");

    out.push_str(&format!(
        "layout(std140, set = {UNIFORM_SET}, binding = {UNIFORM_BLOCK_BINDING}) uniform {UNIFORM_BLOCK_NAME} {{\n"
    ));
    for id in UniformId::ALL {
        if id.is_sampler() {
            continue;
        }
        let ty = id.kind().glsl_type();
        match id.array_index() {
            Some(0) => out.push_str(&format!(
                "    {ty} {}[{CHANNEL_COUNT}];\n",
                id.base_name()
            )),
            Some(_) => {}
            None => out.push_str(&format!("    {ty} {};\n", id.base_name())),
        }
    }
    out.push_str("};\n\n");

    let slots = (0..CHANNEL_COUNT as u32).chain(std::iter::once(AUDIO_TEXTURE_SLOT));
    for slot in slots.clone() {
        out.push_str(&format!(
            "layout(set = {TEXTURE_SET}, binding = {}) uniform texture2D {};\n",
            texture_binding(slot),
            texture_global_name(slot)
        ));
        out.push_str(&format!(
            "layout(set = {TEXTURE_SET}, binding = {}) uniform sampler {};\n",
            sampler_binding(slot),
            sampler_global_name(slot)
        ));
    }
    out.push('\n');
    for slot in slots {
        let alias = if slot == AUDIO_TEXTURE_SLOT {
            UniformId::AudioHistory.base_name().to_string()
        } else {
            format!("iChannel{slot}")
        };
        out.push_str(&format!(
            "#define {alias} sampler2D({}, {})\n",
            texture_global_name(slot),
            sampler_global_name(slot)
        ));
    }
    out.push('\n');
    out.push_str(FRAG_COORD_REMAP);
    out.push('\n');
    out.push_str(CAMERA_HELPERS);
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAIN_IMAGE_ONLY: &str = r"
void mainImage(out vec4 fragColor, in vec2 fragCoord) {
    vec2 uv = fragCoord / iResolution.xy;
    fragColor = vec4(uv, 0.5 + 0.5 * sin(iTime), 1.0);
}
";

    fn count(haystack: &str, pattern: &str) -> usize {
        Regex::new(pattern)
            .expect("test regex")
            .find_iter(haystack)
            .count()
    }

    #[test]
    fn wraps_main_image_with_a_single_entry_point() {
        let wrapped = ShaderSourceTransformer::new().transform(MAIN_IMAGE_ONLY);
        assert!(!wrapped.has_user_main);
        assert_eq!(count(&wrapped.source, r"void\s+main\s*\("), 1);
        assert!(wrapped.source.contains("mainImage(color, fragCoord);"));
        assert!(wrapped.source.contains("+ iTileOffset"));
    }

    #[test]
    fn user_entry_point_gets_no_wrapper() {
        let source = r"
#version 300 es
precision highp float;
out vec4 fragColor;
void main() {
    fragColor = vec4(1.0);
}
";
        let wrapped = ShaderSourceTransformer::new().transform(source);
        assert!(wrapped.has_user_main);
        assert_eq!(count(&wrapped.source, r"void\s+main\s*\("), 1);
        assert_eq!(count(&wrapped.source, r"#version"), 1);
        assert!(wrapped.source.starts_with("#version 450"));
        assert_eq!(count(&wrapped.source, r"out\s+vec4\s+fragColor\s*;"), 1);
    }

    fn user_lines(wrapped: &str) -> Vec<&str> {
        let marker = wrapped.find(USER_SOURCE_MARKER).expect("user marker present");
        wrapped[marker..].lines().skip(1).collect()
    }

    #[test]
    fn version_line_is_blanked_not_removed() {
        let source = "#version 300 es\nvoid mainImage(out vec4 c, in vec2 p) {\n    c = vec4(1.0);\n}\n";
        let wrapped = ShaderSourceTransformer::new().transform(source);
        let lines = user_lines(&wrapped.source);
        assert_eq!(lines[0].trim(), "");
        assert!(lines[1].starts_with("void mainImage"));
        assert_eq!(lines[2].trim(), "c = vec4(1.0);");
    }

    #[test]
    fn user_main_reads_the_remapped_frag_coord() {
        let source = "void main()\n{\n    fragColor = vec4(gl_FragCoord.xy / iResolution.xy, 0.0, 1.0);\n}\n";
        let wrapped = ShaderSourceTransformer::new().transform(source);
        assert!(wrapped.has_user_main);

        let marker = wrapped.source.find(USER_SOURCE_MARKER).expect("marker");
        let remap = wrapped
            .source
            .find("#define gl_FragCoord preview_gl_FragCoord")
            .expect("gl_FragCoord remapped");
        assert!(remap < marker);

        let lines = user_lines(&wrapped.source);
        assert_eq!(lines[0], "void main()");
        assert_eq!(lines[1], "{ previewCaptureFragCoord();");
        assert!(lines[2].contains("gl_FragCoord.xy"));
        assert_eq!(count(&wrapped.source, r"previewCaptureFragCoord\(\);"), 1);
        assert!(!wrapped.source.contains("mainImage(color"));
    }

    #[test]
    fn main_image_wrapper_captures_before_calling_user_code() {
        let wrapped = ShaderSourceTransformer::new().transform(MAIN_IMAGE_ONLY);
        let capture = wrapped
            .source
            .rfind("previewCaptureFragCoord();")
            .expect("capture call");
        let call = wrapped.source.find("mainImage(color").expect("wrapper call");
        assert!(capture < call);
        assert!(wrapped
            .source
            .contains("iResolution.y - gl_FragCoord.y, gl_FragCoord.zw"));
    }

    #[test]
    fn legacy_pi_constants_yield_to_user_definitions() {
        let transformer = ShaderSourceTransformer::new();
        let plain = transformer.transform(MAIN_IMAGE_ONLY);
        assert!(plain.source.contains("const float PI = PREVIEW_PI;"));
        assert!(plain.source.contains("const float HALFPI = PREVIEW_HALF_PI;"));

        let with_pi = transformer.transform(&format!("#define PI 3.14159\n{MAIN_IMAGE_ONLY}"));
        assert!(!with_pi.source.contains("const float PI ="));
        assert!(with_pi.source.contains("const float HALFPI = PREVIEW_HALF_PI;"));

        let with_halfpi =
            transformer.transform(&format!("const float HALFPI = 1.5708;\n{MAIN_IMAGE_ONLY}"));
        assert!(with_halfpi.source.contains("const float PI = PREVIEW_PI;"));
        assert_eq!(count(&with_halfpi.source, r"float\s+HALFPI\b"), 1);

        let commented = transformer.transform(&format!("// #define PI 3.0\n{MAIN_IMAGE_ONLY}"));
        assert!(commented.source.contains("const float PI = PREVIEW_PI;"));
    }

    #[test]
    fn helper_functions_are_indexed_with_their_bodies() {
        let helpers = helper_functions();
        let body = |name: &str| {
            helpers
                .iter()
                .find(|(candidate, _)| candidate == name)
                .map(|(_, body)| body.as_str())
                .unwrap_or_else(|| panic!("{name} not indexed"))
        };
        assert!(body("cameraRayDir").contains("iCameraTiltDeg"));
        assert!(body("previewCaptureFragCoord").contains("iResolution.y"));
        assert!(!body("buildCameraBasis").contains("cameraRayDir"));
        assert_eq!(helpers.len(), 7);
    }

    #[test]
    fn strips_user_uniform_redeclarations() {
        let source = format!(
            "uniform vec3 iResolution;\nuniform highp float iTime;\nuniform float iChannelTime[4];\nuniform sampler2D iChannel0;\n{MAIN_IMAGE_ONLY}"
        );
        let wrapped = ShaderSourceTransformer::new().transform(&source);
        assert_eq!(count(&wrapped.source, r"\biResolution\s*;"), 1);
        assert_eq!(count(&wrapped.source, r"\biTime\s*;"), 1);
        assert_eq!(count(&wrapped.source, r"\biChannelTime\[4\]\s*;"), 1);
        assert_eq!(count(&wrapped.source, r"uniform\s+sampler2D"), 0);
        assert_eq!(count(&wrapped.source, r"#define iChannel0 "), 1);
    }

    #[test]
    fn leaves_similarly_named_identifiers_alone() {
        let source = format!("uniform float iTimeScale;\n{MAIN_IMAGE_ONLY}");
        let wrapped = ShaderSourceTransformer::new().transform(&source);
        assert!(wrapped.source.contains("uniform float iTimeScale;"));
    }

    #[test]
    fn commented_out_main_still_gets_a_wrapper() {
        let source = format!("// void main() {{ }}\n{MAIN_IMAGE_ONLY}");
        let wrapped = ShaderSourceTransformer::new().transform(&source);
        assert!(!wrapped.has_user_main);
        assert!(wrapped.source.contains("mainImage(color, fragCoord);"));
    }

    #[test]
    fn preamble_declares_every_uniform_and_helper() {
        let wrapped = ShaderSourceTransformer::new().transform(MAIN_IMAGE_ONLY);
        for name in UniformId::base_names() {
            assert!(wrapped.source.contains(name), "missing {name}");
        }
        for helper in ["buildCameraBasis", "cameraDirEquirect", "cameraDirLL180"] {
            assert!(wrapped.source.contains(&format!("{helper}(")));
        }
        assert!(wrapped.source.contains("precision highp float;"));
        let marker = wrapped
            .source
            .find(USER_SOURCE_MARKER)
            .expect("user marker present");
        assert!(wrapped.source[marker..].contains("void mainImage"));
    }

    #[test]
    fn transform_is_deterministic() {
        let transformer = ShaderSourceTransformer::new();
        assert_eq!(
            transformer.transform(MAIN_IMAGE_ONLY),
            transformer.transform(MAIN_IMAGE_ONLY)
        );
    }
}
