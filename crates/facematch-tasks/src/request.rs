//! Validated search submissions.

use crate::error::TaskError;
use facematch_core::BoundingBox;
use image::RgbImage;
use std::path::Path;

/// Image file extensions accepted for upload.
pub const ALLOWED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// An image plus the face boxes to search for.
///
/// Construction checks the box geometry, so a request that reaches the
/// dispatcher is always well formed.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    image: RgbImage,
    boxes: Vec<BoundingBox>,
}

impl SearchRequest {
    pub fn new(image: RgbImage, boxes: Vec<BoundingBox>) -> Result<Self, TaskError> {
        if boxes.is_empty() {
            return Err(TaskError::InvalidInput("no bounding boxes given".into()));
        }
        let (width, height) = image.dimensions();
        for (i, bbox) in boxes.iter().enumerate() {
            if !bbox.is_well_formed() {
                return Err(TaskError::InvalidInput(format!(
                    "box {i} ({bbox}) has no area"
                )));
            }
            if !bbox.fits_within(width, height) {
                return Err(TaskError::InvalidInput(format!(
                    "box {i} ({bbox}) exceeds image bounds {width}x{height}"
                )));
            }
        }
        Ok(Self { image, boxes })
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn boxes(&self) -> &[BoundingBox] {
        &self.boxes
    }
}

/// Decode a png/jpg/jpeg file into an RGB image.
pub fn load_image(path: &Path) -> Result<RgbImage, TaskError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(TaskError::InvalidInput(format!(
            "unsupported image extension {:?} (expected one of {ALLOWED_EXTENSIONS:?})",
            ext
        )));
    }

    let img = image::open(path).map_err(|e| {
        TaskError::InvalidInput(format!("unreadable image {}: {e}", path.display()))
    })?;
    Ok(img.to_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn img() -> RgbImage {
        RgbImage::new(100, 80)
    }

    #[test]
    fn test_valid_request() {
        let boxes = vec![BoundingBox::new(0, 0, 100, 80), BoundingBox::new(10, 10, 20, 20)];
        let req = SearchRequest::new(img(), boxes.clone()).unwrap();
        assert_eq!(req.boxes(), boxes.as_slice());
        assert_eq!(req.image().dimensions(), (100, 80));
    }

    #[test]
    fn test_rejects_empty_boxes() {
        assert!(matches!(
            SearchRequest::new(img(), vec![]),
            Err(TaskError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_rejects_degenerate_box() {
        let err = SearchRequest::new(img(), vec![BoundingBox::new(10, 10, 10, 20)]).unwrap_err();
        assert!(err.to_string().contains("no area"));
    }

    #[test]
    fn test_rejects_out_of_bounds_box() {
        let err = SearchRequest::new(img(), vec![BoundingBox::new(0, 0, 101, 80)]).unwrap_err();
        assert!(err.to_string().contains("exceeds image bounds"));
    }

    #[test]
    fn test_load_image_extension_and_decode() {
        let tmp = tempfile::tempdir().unwrap();

        let bad_ext = tmp.path().join("face.gif");
        assert!(matches!(load_image(&bad_ext), Err(TaskError::InvalidInput(_))));

        let garbage = tmp.path().join("face.jpg");
        std::fs::write(&garbage, b"not an image").unwrap();
        assert!(matches!(load_image(&garbage), Err(TaskError::InvalidInput(_))));

        let good = tmp.path().join("face.PNG");
        RgbImage::new(4, 3).save_with_format(&good, image::ImageFormat::Png).unwrap();
        assert_eq!(load_image(&good).unwrap().dimensions(), (4, 3));
    }
}
