//! facematch-core — Face gallery search.
//!
//! Encodes face crops with ArcFace (ONNX Runtime, CPU) and ranks gallery
//! identities by cosine similarity.

pub mod gallery;
pub mod matcher;
pub mod recognizer;
pub mod types;

pub use gallery::{DirectoryGallery, GalleryError, GalleryProvider, InMemoryGallery};
pub use matcher::{search_matching_faces, MatchError, ProgressSink, SearchParams};
pub use recognizer::{crop_face, EncoderError, FaceEncoder, OnnxEncoder};
pub use types::{BoundingBox, Embedding, GalleryRecord, MatchResult};

/// Default model directory: `~/.local/share/facematch/models`.
pub fn default_model_dir() -> std::path::PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    std::path::PathBuf::from(home).join(".local/share/facematch/models")
}
