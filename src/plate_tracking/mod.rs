pub mod contour_analyzer;
pub mod feature_selector;
pub mod optical_flow;
pub mod orchestrator;
pub mod shape_classifier;

use opencv::core::Point2f;
use opencv::core::Vector;
use opencv::prelude::Mat;
use opencv::prelude::MatTraitConst;

use crate::error::{Error, Result};

/// Minimum corner count required to start or continue a tracking session.
pub const MIN_TRACK_POINTS: usize = 4;

/// Persisted tracking context: the previous frame's grayscale image plus the
/// point set to seed the next optical-flow step. Either fully present with at
/// least [`MIN_TRACK_POINTS`] points or absent, never partial.
pub struct TrackState {
    pub(crate) prev_gray: Mat,
    pub(crate) points: Vector<Point2f>,
}

impl TrackState {
    /// Returns `None` when there are too few points to track.
    pub fn new(prev_gray: Mat, points: Vector<Point2f>) -> Option<Self> {
        if points.len() < MIN_TRACK_POINTS {
            return None;
        }
        Some(Self { prev_gray, points })
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }
}

/// Builds an owned RGBA frame from a raw pixel buffer.
pub fn rgba_frame(bytes: &[u8], width: i32, height: i32) -> Result<Mat> {
    let expected = width as usize * height as usize * 4;
    if bytes.len() != expected || width <= 0 || height <= 0 {
        return Err(Error::BadFrame {
            got: bytes.len(),
            width,
            height,
        });
    }
    let flat = Mat::from_slice(bytes)?;
    let shaped = flat.reshape(4, height)?;
    Ok(shaped.try_clone()?)
}
