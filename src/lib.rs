//! License plate detection and corner tracking.
//!
//! The pipeline finds a plate with a Haar cascade, extracts the plate's inner
//! quadrilateral through contour analysis, seeds up to four corner features
//! and follows them across frames with pyramidal Lucas-Kanade optical flow.
//! Each processed frame yields an RGBA overlay mask with the tracked ring, or
//! nothing when no plate is currently held.
//!
//! Processing runs on a dedicated worker thread behind [`CvClient`], a
//! request/response handle with strict one-in-flight pairing. The unrelated
//! [`quad_render`] module texture-maps an image onto an arbitrary
//! quadrilateral for overlay rendering.

pub mod error;
pub mod metrics;
pub mod plate_tracking;
pub mod quad_render;
pub mod worker;

pub use error::{Error, Result};
pub use plate_tracking::orchestrator::FrameOrchestrator;
pub use worker::CvClient;
