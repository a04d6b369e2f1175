use std::path::PathBuf;

use thiserror::Error;

use crate::asset_keys::AssetKeyError;

mod document;
mod library;
mod player;

pub use document::{AnchorPoint, AnimationDocument, Frame, FrameList};
pub use library::AnimationLibrary;
pub use player::{Animation, AnimationEvent, PlaybackMode};

#[derive(Debug, Error)]
pub enum AnimationLoadError {
    #[error("failed to read animation file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid animation key '{key}': {source}")]
    InvalidKey {
        key: String,
        #[source]
        source: AssetKeyError,
    },
}
