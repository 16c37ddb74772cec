use log::info;
use opencv::core::Rect;
use opencv::core::Size;
use opencv::core::Vector;
use opencv::imgproc::cvt_color;
use opencv::imgproc::COLOR_RGBA2GRAY;
use opencv::objdetect::CascadeClassifier;
use opencv::prelude::CascadeClassifierTrait;
use opencv::prelude::Mat;

use crate::error::{Error, Result};

const SCALE_FACTOR: f64 = 1.5;
const MIN_NEIGHBORS: i32 = 3;

/// Multi-scale Haar-cascade plate detector.
pub struct ShapeClassifier {
    model: CascadeClassifier,
    loaded: bool,
}

impl ShapeClassifier {
    pub fn new() -> Result<Self> {
        Ok(Self {
            model: CascadeClassifier::default()?,
            loaded: false,
        })
    }

    /// Loads the cascade XML from disk. A failed load leaves the classifier
    /// unusable and every `detect` call failing fast.
    pub fn load(&mut self, path: &str) -> Result<()> {
        if !self.model.load(path)? {
            return Err(Error::ModelNotReady);
        }
        self.loaded = true;
        info!("cascade classifier loaded from {}", path);
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.loaded
    }

    /// Returns the first candidate plate rectangle, or `None` when the frame
    /// holds no plate. Read-only on the frame.
    pub fn detect(&mut self, frame: &Mat) -> Result<Option<Rect>> {
        if !self.loaded {
            return Err(Error::ModelNotReady);
        }

        let mut gray = Mat::default();
        cvt_color(frame, &mut gray, COLOR_RGBA2GRAY, 0)?;

        let mut detections = Vector::<Rect>::new();
        self.model.detect_multi_scale(
            &gray,
            &mut detections,
            SCALE_FACTOR,
            MIN_NEIGHBORS,
            0,
            Size::default(),
            Size::default(),
        )?;

        if detections.is_empty() {
            return Ok(None);
        }
        Ok(Some(detections.get(0)?))
    }
}
