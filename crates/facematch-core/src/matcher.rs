//! Gallery search: rank known persons for every face box in an image.

use crate::gallery::{GalleryError, GalleryProvider};
use crate::recognizer::{crop_face, EncoderError, FaceEncoder};
use crate::types::{BoundingBox, MatchResult};
use image::RgbImage;
use thiserror::Error;

/// Default minimum progress increase between two published updates.
pub const DEFAULT_PROGRESS_STEP: f32 = 0.01;

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("gallery: {0}")]
    Gallery(#[from] GalleryError),
    #[error("encoder: {0}")]
    Encoder(#[from] EncoderError),
    #[error("gallery record {person_id} has a {actual}-dim embedding, probe has {expected}")]
    DimensionMismatch {
        person_id: String,
        expected: usize,
        actual: usize,
    },
}

/// Receives progress updates for a running search.
pub trait ProgressSink: Send + Sync {
    fn publish(&self, token: &str, progress: f32);
}

#[derive(Debug, Clone, Copy)]
pub struct SearchParams {
    /// Inclusive lower bound on cosine similarity for a candidate.
    pub threshold: f32,
    /// Progress must advance at least this much before it is published again.
    pub progress_step: f32,
}

impl SearchParams {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            progress_step: DEFAULT_PROGRESS_STEP,
        }
    }
}

/// Search the gallery for every box, in box order.
///
/// The gallery is snapshotted once. For box `i` and record `j` the running
/// progress is `(i+1)(j+1) / (M·N)`; it is published whenever it exceeds the
/// last published value by `params.progress_step`. 1.0 is always published
/// last, once every box is done.
///
/// Candidates are sorted by descending similarity. The sort is stable, so
/// equal scores keep gallery scan order.
///
/// A gallery record whose dimension differs from the probe fails the whole
/// search with [`MatchError::DimensionMismatch`].
pub fn search_matching_faces<G, E, S>(
    image: &RgbImage,
    boxes: &[BoundingBox],
    gallery: &G,
    encoder: &E,
    params: &SearchParams,
    token: &str,
    sink: &S,
) -> Result<Vec<MatchResult>, MatchError>
where
    G: GalleryProvider + ?Sized,
    E: FaceEncoder + ?Sized,
    S: ProgressSink + ?Sized,
{
    let records = gallery.records()?;
    let num_boxes = boxes.len();
    let num_records = records.len();
    let total = (num_boxes * num_records) as f32;
    tracing::debug!(token, boxes = num_boxes, gallery = num_records, "search started");

    let mut results = Vec::with_capacity(num_boxes);
    let mut last_published = 0.0f32;

    for (i, bbox) in boxes.iter().enumerate() {
        let face = crop_face(image, bbox);
        let probe = encoder.encode(&face)?.normalized();

        let mut candidates: Vec<(&str, f32)> = Vec::new();
        for (j, record) in records.iter().enumerate() {
            if record.embedding.values.len() != probe.values.len() {
                return Err(MatchError::DimensionMismatch {
                    person_id: record.person_id.clone(),
                    expected: probe.values.len(),
                    actual: record.embedding.values.len(),
                });
            }
            let similarity = probe.similarity(&record.embedding);
            if similarity >= params.threshold {
                candidates.push((record.person_id.as_str(), similarity));
            }

            let progress = ((i + 1) * (j + 1)) as f32 / total;
            if progress - last_published >= params.progress_step {
                sink.publish(token, progress);
                last_published = progress;
            }
        }

        candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
        tracing::trace!(token, box_index = i, matches = candidates.len(), "box searched");

        results.push(MatchResult {
            bbox: *bbox,
            matched_ids: candidates.into_iter().map(|(id, _)| id.to_string()).collect(),
        });
    }

    sink.publish(token, 1.0);
    Ok(results)
}
