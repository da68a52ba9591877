//! Face encoding — crop a face out of an image and turn it into an embedding.
//!
//! [`OnnxEncoder`] runs an ArcFace ResNet-50 export through ONNX Runtime.

use crate::types::{BoundingBox, Embedding};
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

const ARCFACE_INPUT_SIZE: u32 = 112;
const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 128.0;
const ARCFACE_EMBEDDING_DIM: usize = 512;

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face crop is empty")]
    EmptyCrop,
    #[error("encoder session lock poisoned")]
    Poisoned,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Turns a cropped face into a fixed-length embedding.
pub trait FaceEncoder: Send + Sync {
    fn encode(&self, face: &RgbImage) -> Result<Embedding, EncoderError>;
}

/// Cut the region `y1..y2`, `x1..x2` out of `image`.
///
/// The box is clamped to the image bounds; a box that falls outside yields
/// an empty image.
pub fn crop_face(image: &RgbImage, bbox: &BoundingBox) -> RgbImage {
    let x = bbox.x1.min(image.width());
    let y = bbox.y1.min(image.height());
    let w = bbox.x2.min(image.width()).saturating_sub(x);
    let h = bbox.y2.min(image.height()).saturating_sub(y);
    imageops::crop_imm(image, x, y, w, h).to_image()
}

/// ArcFace encoder backed by ONNX Runtime.
///
/// `Session::run` needs exclusive access, so the session sits behind a mutex
/// and a single encoder can be shared by every worker.
pub struct OnnxEncoder {
    session: Mutex<Session>,
}

impl OnnxEncoder {
    /// Load the ArcFace ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, EncoderError> {
        if !Path::new(model_path).exists() {
            return Err(EncoderError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded ArcFace model"
        );

        Ok(Self {
            session: Mutex::new(session),
        })
    }

    /// Resize an RGB face crop to 112x112 and lay it out as a NCHW float tensor.
    fn preprocess(face: &RgbImage) -> Array4<f32> {
        let size = ARCFACE_INPUT_SIZE;
        let resized = imageops::resize(face, size, size, FilterType::Triangle);
        let mut tensor = Array4::<f32>::zeros((1, 3, size as usize, size as usize));

        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] =
                    (pixel.0[c] as f32 - ARCFACE_MEAN) / ARCFACE_STD;
            }
        }

        tensor
    }
}

impl FaceEncoder for OnnxEncoder {
    fn encode(&self, face: &RgbImage) -> Result<Embedding, EncoderError> {
        if face.width() == 0 || face.height() == 0 {
            return Err(EncoderError::EmptyCrop);
        }

        let input = Self::preprocess(face);

        let mut session = self.session.lock().map_err(|_| EncoderError::Poisoned)?;
        let outputs = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EncoderError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw_data.len() != ARCFACE_EMBEDDING_DIM {
            return Err(EncoderError::InferenceFailed(format!(
                "expected {ARCFACE_EMBEDDING_DIM}-dim embedding, got {}",
                raw_data.len()
            )));
        }

        Ok(Embedding::new(raw_data.to_vec()).normalized())
    }
}
