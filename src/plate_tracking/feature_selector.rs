use opencv::core::no_array;
use opencv::core::Point2f;
use opencv::core::Vector;
use opencv::imgproc::cvt_color;
use opencv::imgproc::good_features_to_track;
use opencv::imgproc::COLOR_RGBA2GRAY;
use opencv::prelude::Mat;

use crate::error::Result;

const MAX_CORNERS: i32 = 4;
const QUALITY_LEVEL: f64 = 0.01;
const MIN_DISTANCE: f64 = 10.0;
const BLOCK_SIZE: i32 = 3;
// Harris response coefficient, unused with the min-eigenvalue measure but
// part of the fixed parameterization.
const HARRIS_K: f64 = 0.04;

/// Picks up to four trackable corners inside the filled quadrilateral mask
/// using the min-eigenvalue corner measure. Points come back in
/// detector-native order.
pub fn select_corners(mask: &Mat) -> Result<Vector<Point2f>> {
    let mut gray = Mat::default();
    cvt_color(mask, &mut gray, COLOR_RGBA2GRAY, 0)?;

    let mut corners = Vector::<Point2f>::new();
    good_features_to_track(
        &gray,
        &mut corners,
        MAX_CORNERS,
        QUALITY_LEVEL,
        MIN_DISTANCE,
        &no_array(),
        BLOCK_SIZE,
        false,
        HARRIS_K,
    )?;

    Ok(corners)
}
