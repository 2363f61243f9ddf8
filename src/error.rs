//! Error types for planning, configuration and checkpoint handling

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum UnetError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Length mismatch: patch size has {patch} axes, spacings has {spacings}")]
    LengthMismatch { patch: usize, spacings: usize },

    #[error("Unsupported dimension: {0} (expected 2 or 3)")]
    UnsupportedDim(usize),

    #[error("Task config not found: {0}")]
    MissingConfig(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Recorder error: {0}")]
    Recorder(#[from] burn::record::RecorderError),
}

pub type UnetResult<T> = Result<T, UnetError>;
