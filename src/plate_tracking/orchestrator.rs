use log::debug;
use opencv::core::Point;
use opencv::core::Scalar;
use opencv::imgproc::circle;
use opencv::imgproc::cvt_color;
use opencv::imgproc::COLOR_RGBA2GRAY;
use opencv::imgproc::LINE_AA;
use opencv::prelude::Mat;
use opencv::prelude::MatExprTraitConst;
use opencv::prelude::MatTraitConst;

use crate::error::Result;
use crate::plate_tracking::contour_analyzer::find_plate_quad;
use crate::plate_tracking::feature_selector::select_corners;
use crate::plate_tracking::optical_flow::track_step;
use crate::plate_tracking::shape_classifier::ShapeClassifier;
use crate::plate_tracking::{TrackState, MIN_TRACK_POINTS};

/// Per-frame dispatch between detection and tracking.
///
/// Holds the single [`TrackState`]: absent means the next frame runs the
/// detection pipeline, present means it runs an optical-flow step. The state
/// moves by value into each tracking step and comes back replaced or gone.
pub struct FrameOrchestrator {
    classifier: ShapeClassifier,
    state: Option<TrackState>,
}

unsafe impl Send for FrameOrchestrator {}

impl FrameOrchestrator {
    pub fn new() -> Result<Self> {
        Ok(Self {
            classifier: ShapeClassifier::new()?,
            state: None,
        })
    }

    pub fn load_classifier(&mut self, path: &str) -> Result<()> {
        self.classifier.load(path)
    }

    pub fn is_tracking(&self) -> bool {
        self.state.is_some()
    }

    /// Processes one RGBA frame. `Ok(None)` means nothing is tracked right
    /// now; `Ok(Some(mask))` carries the frame-sized overlay for the current
    /// detection or tracking result.
    pub fn process_frame(&mut self, frame: &Mat) -> Result<Option<Mat>> {
        match self.state.take() {
            None => self.run_detection(frame),
            Some(state) => {
                let (next_state, mask) = track_step(state, frame)?;
                self.state = next_state;
                Ok(mask)
            }
        }
    }

    fn run_detection(&mut self, frame: &Mat) -> Result<Option<Mat>> {
        let roi = match self.classifier.detect(frame)? {
            Some(roi) => roi,
            None => return Ok(None),
        };
        debug!(
            "plate candidate at ({}, {}) {}x{}",
            roi.x, roi.y, roi.width, roi.height
        );

        let quad_mask = find_plate_quad(frame, roi)?;
        let corners = select_corners(&quad_mask)?;
        if corners.len() < MIN_TRACK_POINTS {
            debug!("only {} trackable corners, staying in detection", corners.len());
            return Ok(None);
        }

        let mut mask = Mat::zeros(frame.rows(), frame.cols(), frame.typ())?.to_mat()?;
        let white = Scalar::new(255.0, 255.0, 255.0, 255.0);
        for corner in corners.iter() {
            let at = Point::new(corner.x.round() as i32, corner.y.round() as i32);
            circle(&mut mask, at, 3, white, -1, LINE_AA, 0)?;
        }

        let mut gray = Mat::default();
        cvt_color(frame, &mut gray, COLOR_RGBA2GRAY, 0)?;
        self.state = TrackState::new(gray, corners);

        Ok(Some(mask))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use opencv::core::CV_8UC4;

    #[test]
    fn frame_without_a_plate_leaves_the_orchestrator_detecting() {
        let mut orchestrator = FrameOrchestrator::new().unwrap();
        orchestrator
            .load_classifier("tests/fixtures/reject_all_cascade.xml")
            .unwrap();

        let frame = Mat::zeros(64, 64, CV_8UC4).unwrap().to_mat().unwrap();
        let mask = orchestrator.process_frame(&frame).unwrap();

        assert!(mask.is_none());
        assert!(!orchestrator.is_tracking());
    }
}
