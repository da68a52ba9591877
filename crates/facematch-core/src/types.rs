use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Face bounding box in pixel coordinates, `(x1, y1)` inclusive and
/// `(x2, y2)` exclusive.
///
/// Serialized as `[x1, y1, x2, y2]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[u32; 4]", into = "[u32; 4]")]
pub struct BoundingBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl BoundingBox {
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }

    /// True when the box has a positive area (`x1 < x2` and `y1 < y2`).
    pub fn is_well_formed(&self) -> bool {
        self.x1 < self.x2 && self.y1 < self.y2
    }

    /// True when the box lies entirely inside an image of the given size.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x2 <= width && self.y2 <= height
    }
}

impl From<[u32; 4]> for BoundingBox {
    fn from([x1, y1, x2, y2]: [u32; 4]) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl From<BoundingBox> for [u32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{},{},{}", self.x1, self.y1, self.x2, self.y2)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseBoxError {
    #[error("expected 4 comma-separated coordinates, got {0}")]
    WrongArity(usize),
    #[error("invalid coordinate {0:?}")]
    InvalidCoordinate(String),
}

impl FromStr for BoundingBox {
    type Err = ParseBoxError;

    /// Parse `"x1,y1,x2,y2"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(ParseBoxError::WrongArity(parts.len()));
        }
        let mut coords = [0u32; 4];
        for (slot, part) in coords.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| ParseBoxError::InvalidCoordinate((*part).to_string()))?;
        }
        Ok(coords.into())
    }
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// L2 norm of the vector.
    pub fn norm(&self) -> f32 {
        self.values.iter().map(|v| v * v).sum::<f32>().sqrt()
    }

    /// Unit-length copy of this embedding. A zero vector is returned as-is.
    pub fn normalized(&self) -> Embedding {
        let norm = self.norm();
        if norm > 0.0 {
            Embedding {
                values: self.values.iter().map(|v| v / norm).collect(),
            }
        } else {
            self.clone()
        }
    }

    /// Cosine similarity: dot product of the two L2-normalized vectors.
    ///
    /// Returns a value in [-1, 1]; 0.0 if either vector is all zeros.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 {
            dot / denom
        } else {
            0.0
        }
    }
}

/// One known person in the gallery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalleryRecord {
    pub person_id: String,
    pub embedding: Embedding,
}

impl GalleryRecord {
    pub fn new(person_id: impl Into<String>, values: Vec<f32>) -> Self {
        Self {
            person_id: person_id.into(),
            embedding: Embedding::new(values),
        }
    }
}

/// Matches for a single input bounding box, best similarity first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub bbox: BoundingBox,
    #[serde(rename = "matched_faces")]
    pub matched_ids: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let a = Embedding::new(vec![1.0, 0.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0, 0.0]);
        assert!((a.similarity(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_ignores_magnitude() {
        let a = Embedding::new(vec![3.0, 4.0]);
        let b = Embedding::new(vec![0.6, 0.8]);
        assert!((a.similarity(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![-1.0, 0.0]);
        assert!((a.similarity(&b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0]);
        assert_eq!(a.similarity(&b), 0.0);
    }

    #[test]
    fn test_normalized_has_unit_norm() {
        let e = Embedding::new(vec![3.0, 4.0]).normalized();
        assert!((e.norm() - 1.0).abs() < 1e-6);
        assert_eq!(Embedding::new(vec![0.0, 0.0]).normalized().values, vec![0.0, 0.0]);
    }

    #[test]
    fn test_bbox_parse() {
        let b: BoundingBox = "10, 20,30,40".parse().unwrap();
        assert_eq!(b, BoundingBox::new(10, 20, 30, 40));
        assert_eq!(b.width(), 20);
        assert_eq!(b.height(), 20);
        assert_eq!(
            "1,2,3".parse::<BoundingBox>(),
            Err(ParseBoxError::WrongArity(3))
        );
        assert_eq!(
            "1,2,x,4".parse::<BoundingBox>(),
            Err(ParseBoxError::InvalidCoordinate("x".into()))
        );
    }

    #[test]
    fn test_bbox_geometry_checks() {
        assert!(BoundingBox::new(0, 0, 10, 10).is_well_formed());
        assert!(!BoundingBox::new(10, 0, 10, 10).is_well_formed());
        assert!(!BoundingBox::new(0, 5, 10, 2).is_well_formed());
        assert!(BoundingBox::new(0, 0, 10, 10).fits_within(10, 10));
        assert!(!BoundingBox::new(0, 0, 11, 10).fits_within(10, 10));
    }

    #[test]
    fn test_match_result_wire_format() {
        let r = MatchResult {
            bbox: BoundingBox::new(1, 2, 3, 4),
            matched_ids: vec!["alice".into()],
        };
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"bbox": [1, 2, 3, 4], "matched_faces": ["alice"]})
        );
        let back: MatchResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, r);
    }
}
