//! Error taxonomy shared by every crate in the engine (renderer-agnostic).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("asset not found: {path}")]
    AssetNotFound { path: String },

    #[error("I/O error while reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode image '{name}': {reason}")]
    DecodeError { name: String, reason: String },

    #[error("unsupported image format for '{name}': {format}")]
    UnsupportedFormat { name: String, format: String },

    #[error("parse error in '{source_name}'{}: {reason}", line_suffix(.line))]
    ParseError {
        source_name: String,
        line: Option<usize>,
        reason: String,
    },

    #[error("unsupported feature in '{source_name}': {feature}")]
    UnsupportedFeature { source_name: String, feature: String },

    #[error("invalid dimensions for '{name}': {reason}")]
    InvalidDimensions { name: String, reason: String },

    #[error("atlas {width}x{height} does not fit cubemap layout {layout}")]
    InvalidAtlasLayout {
        width: u32,
        height: u32,
        layout: String,
    },

    #[error("degenerate camera: {reason}")]
    DegenerateCamera { reason: String },

    #[error("handle {handle} was already released")]
    DoubleFree { handle: String },

    #[error("invalid handle {handle}: {reason}")]
    InvalidHandle { handle: String, reason: String },

    #[error("backend error: {0}")]
    Backend(String),
}

fn line_suffix(line: &Option<usize>) -> String {
    match line {
        Some(line) => format!(" (line {line})"),
        None => String::new(),
    }
}

impl EngineError {
    /// Map an I/O failure for `path`, keeping "not found" distinct from other failures.
    pub fn from_io(path: impl Into<String>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::AssetNotFound { path }
        } else {
            Self::Io { path, source }
        }
    }

    pub fn parse(source_name: &str, line: Option<usize>, reason: impl Into<String>) -> Self {
        Self::ParseError {
            source_name: source_name.to_owned(),
            line,
            reason: reason.into(),
        }
    }

    pub fn unsupported_feature(source_name: &str, feature: impl Into<String>) -> Self {
        Self::UnsupportedFeature {
            source_name: source_name.to_owned(),
            feature: feature.into(),
        }
    }

    pub fn invalid_dimensions(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidDimensions {
            name: name.to_owned(),
            reason: reason.into(),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
