use std::fmt;

/// Pipeline stage a compile diagnostic belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// Failures surfaced by the preview renderer and its drawing surfaces.
///
/// Compile and link variants carry the raw diagnostic text reported by the
/// shader frontend or driver so callers can show it verbatim.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PreviewError {
    #[error("{stage} shader compilation failed:\n{log}")]
    ShaderCompile { stage: ShaderStage, log: String },
    #[error("shader program linking failed:\n{log}")]
    ShaderLink { log: String },
    #[error("graphics context unavailable: {0}")]
    UnsupportedContext(String),
    #[error("surface error: {0}")]
    Surface(String),
}

impl PreviewError {
    /// Raw diagnostic text for compile/link failures.
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            PreviewError::ShaderCompile { log, .. } | PreviewError::ShaderLink { log } => {
                Some(log.as_str())
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AudioError {
    #[error("invalid sample rate {0}")]
    InvalidSampleRate(u32),
    #[error("pcm buffer of {samples} samples does not divide into {channels} channels")]
    MismatchedChannels { samples: usize, channels: u16 },
    #[error("audio track contains no samples")]
    Empty,
    #[error("audio producer disconnected")]
    Disconnected,
    #[error("failed to open audio file {path}: {message}")]
    Open { path: String, message: String },
    #[error("failed to decode audio: {0}")]
    Decode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_error_keeps_driver_log() {
        let err = PreviewError::ShaderCompile {
            stage: ShaderStage::Fragment,
            log: "0:12: 'foo' : undeclared identifier".into(),
        };
        assert_eq!(err.diagnostic(), Some("0:12: 'foo' : undeclared identifier"));
        assert!(err.to_string().starts_with("fragment shader compilation failed"));
        assert!(PreviewError::UnsupportedContext("no adapter".into())
            .diagnostic()
            .is_none());
    }
}
