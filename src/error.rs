use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("failed to load {}: {reason}", path.display())]
    DecodeLoad { path: PathBuf, reason: String },

    #[error("seek failed: {0}")]
    Seek(String),

    #[error("no active track")]
    NoActiveTrack,

    #[error("track index {index} is out of range for a playlist of {len}")]
    InvalidIndex { index: usize, len: usize },
}

impl PlaybackError {
    pub fn decode_load(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::DecodeLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PlaybackError>;
