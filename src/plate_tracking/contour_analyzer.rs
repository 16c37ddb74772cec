use opencv::core::no_array;
use opencv::core::Point;
use opencv::core::Rect;
use opencv::core::Scalar;
use opencv::core::Vector;
use opencv::imgproc::approx_poly_dp;
use opencv::imgproc::arc_length;
use opencv::imgproc::bounding_rect;
use opencv::imgproc::canny;
use opencv::imgproc::contour_area;
use opencv::imgproc::convex_hull;
use opencv::imgproc::cvt_color;
use opencv::imgproc::draw_contours;
use opencv::imgproc::find_contours;
use opencv::imgproc::CHAIN_APPROX_SIMPLE;
use opencv::imgproc::COLOR_RGBA2GRAY;
use opencv::imgproc::FILLED;
use opencv::imgproc::LINE_8;
use opencv::imgproc::RETR_LIST;
use opencv::prelude::Mat;
use opencv::prelude::MatExprTraitConst;
use opencv::prelude::MatTraitConst;

use crate::error::Result;

/// Polygon class of a contour approximation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContourShape {
    Square,
    Rectangle,
    Unidentified,
}

const APPROX_EPSILON_RATIO: f64 = 0.04;
const SQUARE_RATIO_MIN: f64 = 0.95;
const SQUARE_RATIO_MAX: f64 = 1.05;
const MIN_AREA_RATIO: f64 = 0.1;
const MAX_AREA_RATIO: f64 = 0.9;

/// Classifies a contour by its polygon approximation: four vertices with a
/// near-unit bounding-box aspect are squares, other four-vertex polygons are
/// rectangles, anything else is unidentified.
pub fn classify_contour(contour: &Vector<Point>) -> Result<ContourShape> {
    let mut approx = Vector::<Point>::new();
    let epsilon = APPROX_EPSILON_RATIO * arc_length(contour, true)?;
    approx_poly_dp(contour, &mut approx, epsilon, true)?;

    if approx.len() != 4 {
        return Ok(ContourShape::Unidentified);
    }

    let bounds = bounding_rect(&approx)?;
    let ratio = bounds.width as f64 / bounds.height as f64;
    if (SQUARE_RATIO_MIN..=SQUARE_RATIO_MAX).contains(&ratio) {
        Ok(ContourShape::Square)
    } else {
        Ok(ContourShape::Rectangle)
    }
}

/// Finds the plate's inner quadrilateral inside `roi` and returns it as a
/// frame-sized RGBA mask of filled convex hulls (white on black).
///
/// The ROI pixels are copied into a blank frame-sized canvas first so contour
/// coordinates stay in frame space. Rectangle contours covering between 10%
/// and 90% of the ROI area survive; everything else is noise or the ROI
/// border itself.
pub fn find_plate_quad(frame: &Mat, roi: Rect) -> Result<Mat> {
    let plate = Mat::zeros(frame.rows(), frame.cols(), frame.typ())?.to_mat()?;
    let src_roi = Mat::roi(frame, roi)?;
    let mut dst_roi = Mat::roi(&plate, roi)?;
    src_roi.copy_to(&mut dst_roi)?;

    let mut gray = Mat::default();
    cvt_color(&plate, &mut gray, COLOR_RGBA2GRAY, 0)?;
    let mut edges = Mat::default();
    canny(&gray, &mut edges, 0.0, 255.0, 3, false)?;

    let mut contours = Vector::<Vector<Point>>::new();
    find_contours(
        &edges,
        &mut contours,
        RETR_LIST,
        CHAIN_APPROX_SIMPLE,
        Point::default(),
    )?;

    let roi_area = roi.width as f64 * roi.height as f64;
    let mut hulls = Vector::<Vector<Point>>::new();
    for contour in &contours {
        if classify_contour(&contour)? != ContourShape::Rectangle {
            continue;
        }
        let area = contour_area(&contour, false)?;
        if area > MIN_AREA_RATIO * roi_area && area < MAX_AREA_RATIO * roi_area {
            let mut hull = Vector::<Point>::new();
            convex_hull(&contour, &mut hull, false, true)?;
            hulls.push(hull);
        }
    }

    let mut mask = Mat::zeros(frame.rows(), frame.cols(), frame.typ())?.to_mat()?;
    let white = Scalar::new(255.0, 255.0, 255.0, 255.0);
    for i in 0..hulls.len() {
        draw_contours(
            &mut mask,
            &hulls,
            i as i32,
            white,
            FILLED,
            LINE_8,
            &no_array(),
            i32::MAX,
            Point::default(),
        )?;
    }

    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed_polygon(points: &[(i32, i32)]) -> Vector<Point> {
        points.iter().map(|&(x, y)| Point::new(x, y)).collect()
    }

    #[test]
    fn square_contour_is_classified_as_square() {
        let square = closed_polygon(&[(0, 0), (100, 0), (100, 100), (0, 100)]);
        assert_eq!(classify_contour(&square).unwrap(), ContourShape::Square);
    }

    #[test]
    fn oblong_contour_is_classified_as_rectangle() {
        let rect = closed_polygon(&[(0, 0), (200, 0), (200, 100), (0, 100)]);
        assert_eq!(classify_contour(&rect).unwrap(), ContourShape::Rectangle);
    }

    #[test]
    fn triangle_contour_is_unidentified() {
        let triangle = closed_polygon(&[(0, 0), (100, 0), (50, 90)]);
        assert_eq!(
            classify_contour(&triangle).unwrap(),
            ContourShape::Unidentified
        );
    }
}
