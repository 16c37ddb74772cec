use log::{debug, warn};
use opencv::core::Point;
use opencv::core::Point2f;
use opencv::core::Scalar;
use opencv::core::Size;
use opencv::core::TermCriteria;
use opencv::core::TermCriteria_COUNT;
use opencv::core::TermCriteria_EPS;
use opencv::core::Vector;
use opencv::imgproc::circle;
use opencv::imgproc::cvt_color;
use opencv::imgproc::line;
use opencv::imgproc::COLOR_RGBA2GRAY;
use opencv::imgproc::LINE_8;
use opencv::imgproc::LINE_AA;
use opencv::prelude::Mat;
use opencv::prelude::MatExprTraitConst;
use opencv::prelude::MatTraitConst;
use opencv::video::calc_optical_flow_pyr_lk;

use crate::error::Result;
use crate::plate_tracking::{TrackState, MIN_TRACK_POINTS};

const LK_WINDOW: i32 = 15;
const LK_MAX_PYRAMID_LEVEL: i32 = 2;
const LK_MAX_ITERATIONS: i32 = 10;
const LK_EPSILON: f64 = 0.03;
const OUTLIER_DISTANCE_RATIO: f32 = 1.05;

/// Re-orders `points` into a clockwise ring around their extreme-midpoint
/// centroid and returns that centroid.
///
/// The centroid is not a true mean: its y is the midpoint of the min/max y
/// found by sorting on y, and x the analogue via a descending sort on x. Each
/// point's polar angle is then normalized against the angle of whichever
/// point sits first in the list after those sorts, so every angle below the
/// reference gains a full turn before the ascending sort. The reference is
/// order-dependent by design. An empty input is left untouched and reports
/// an origin centroid.
pub fn order_clockwise(points: &mut Vec<Point2f>) -> Point2f {
    if points.is_empty() {
        return Point2f::default();
    }
    points.sort_by(|a, b| a.y.total_cmp(&b.y));
    let cy = (points[0].y + points[points.len() - 1].y) / 2.0;
    points.sort_by(|a, b| b.x.total_cmp(&a.x));
    let cx = (points[0].x + points[points.len() - 1].x) / 2.0;
    let center = Point2f::new(cx, cy);

    let mut reference: Option<f32> = None;
    let mut angled: Vec<(f32, Point2f)> = points
        .iter()
        .map(|p| {
            let mut angle = (p.y - center.y).atan2(p.x - center.x);
            match reference {
                None => reference = Some(angle),
                Some(start) => {
                    if angle < start {
                        angle += 2.0 * std::f32::consts::PI;
                    }
                }
            }
            (angle, *p)
        })
        .collect();
    angled.sort_by(|a, b| a.0.total_cmp(&b.0));

    points.clear();
    points.extend(angled.into_iter().map(|(_, p)| p));
    center
}

/// Removes points farther than 1.05x the mean centroid distance, in a single
/// pass over the ring.
///
/// The pass has skip-on-removal semantics: when a point is removed, the
/// element that slides into its slot is not examined, so an outlier directly
/// behind another outlier can survive until the next frame's pass.
pub fn drop_distance_outliers(points: &mut Vec<Point2f>, center: Point2f) {
    if points.is_empty() {
        return;
    }
    let mean: f32 = points
        .iter()
        .map(|p| centroid_distance(*p, center))
        .sum::<f32>()
        / points.len() as f32;
    let limit = mean * OUTLIER_DISTANCE_RATIO;

    let mut i = 0;
    while i < points.len() {
        if centroid_distance(points[i], center) > limit {
            points.remove(i);
        }
        i += 1;
    }
}

fn centroid_distance(p: Point2f, center: Point2f) -> f32 {
    ((p.x - center.x).powi(2) + (p.y - center.y).powi(2)).sqrt()
}

/// Advances a tracking session by one frame.
///
/// Consumes the previous [`TrackState`] and returns the replacement (absent
/// when tracking was lost) together with this frame's overlay mask. The point
/// set persisted for the next step is the angle-sorted, pre-outlier-filter
/// set; the distance filter only shapes the ring rendered for this frame.
pub fn track_step(state: TrackState, frame: &Mat) -> Result<(Option<TrackState>, Option<Mat>)> {
    let mut gray = Mat::default();
    cvt_color(frame, &mut gray, COLOR_RGBA2GRAY, 0)?;

    let mut next_points = Vector::<Point2f>::new();
    let mut status = Vector::<u8>::new();
    let mut flow_errors = Vector::<f32>::new();
    let criteria = TermCriteria::new(
        TermCriteria_COUNT + TermCriteria_EPS,
        LK_MAX_ITERATIONS,
        LK_EPSILON,
    )?;

    // A malformed point set makes the flow call itself fail; losing one
    // frame's points must not kill the session, so it degrades to a lost
    // track and the orchestrator re-detects on the next frame.
    if let Err(e) = calc_optical_flow_pyr_lk(
        &state.prev_gray,
        &gray,
        &state.points,
        &mut next_points,
        &mut status,
        &mut flow_errors,
        Size::new(LK_WINDOW, LK_WINDOW),
        LK_MAX_PYRAMID_LEVEL,
        criteria,
        0,
        1e-4,
    ) {
        warn!("optical flow failed, dropping track: {}", e);
        return Ok((None, None));
    }

    let mut retained: Vec<Point2f> = Vec::with_capacity(next_points.len());
    for (i, found) in status.iter().enumerate() {
        if found == 1 {
            retained.push(next_points.get(i)?);
        }
    }
    if retained.is_empty() {
        debug!("no points survived the status filter");
        return Ok((None, None));
    }

    let center = order_clockwise(&mut retained);
    let persisted: Vector<Point2f> = retained.iter().copied().collect();

    let mut ring = retained;
    drop_distance_outliers(&mut ring, center);

    let mut mask = Mat::zeros(frame.rows(), frame.cols(), frame.typ())?.to_mat()?;
    if ring.len() >= MIN_TRACK_POINTS {
        draw_ring(&mut mask, &ring)?;
    }

    match TrackState::new(gray, persisted) {
        Some(next_state) => Ok((Some(next_state), Some(mask))),
        None => {
            debug!("tracked point count dropped below {}", MIN_TRACK_POINTS);
            Ok((None, None))
        }
    }
}

/// Draws the ring points and their closed loop onto the mask. The closing
/// last-to-first segment uses the 8-connected flag where the others are
/// anti-aliased, matching the distinct flag the loop was drawn with.
fn draw_ring(mask: &mut Mat, ring: &[Point2f]) -> Result<()> {
    let green = Scalar::new(0.0, 255.0, 0.0, 255.0);
    for (i, p) in ring.iter().enumerate() {
        let at = round_point(*p);
        circle(mask, at, 2, green, -1, LINE_AA, 0)?;
        if let Some(next) = ring.get(i + 1) {
            line(mask, at, round_point(*next), green, 2, LINE_AA, 0)?;
        } else {
            line(mask, at, round_point(ring[0]), green, 2, LINE_8, 0)?;
        }
    }
    Ok(())
}

fn round_point(p: Point2f) -> Point {
    Point::new(p.x.round() as i32, p.y.round() as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(coords: &[(f32, f32)]) -> Vec<Point2f> {
        coords.iter().map(|&(x, y)| Point2f::new(x, y)).collect()
    }

    #[test]
    fn centroid_of_square_is_extreme_midpoint() {
        let mut square = points(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]);
        let center = order_clockwise(&mut square);
        assert_eq!(center, Point2f::new(5.0, 5.0));
    }

    #[test]
    fn square_corners_sort_into_the_same_ring_for_different_permutations() {
        let mut first = points(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]);
        let mut second = points(&[(10.0, 10.0), (0.0, 0.0), (0.0, 10.0), (10.0, 0.0)]);
        let mut third = points(&[(0.0, 10.0), (10.0, 10.0), (10.0, 0.0), (0.0, 0.0)]);

        order_clockwise(&mut first);
        order_clockwise(&mut second);
        order_clockwise(&mut third);

        // the double coordinate sort canonicalizes the list before angles are
        // assigned, so all permutations of the square agree
        let expected = points(&[(10.0, 0.0), (10.0, 10.0), (0.0, 10.0), (0.0, 0.0)]);
        assert_eq!(first, expected);
        assert_eq!(second, expected);
        assert_eq!(third, expected);
    }

    #[test]
    fn ordering_an_empty_list_is_a_no_op() {
        let mut empty: Vec<Point2f> = Vec::new();
        let center = order_clockwise(&mut empty);
        assert!(empty.is_empty());
        assert_eq!(center, Point2f::default());
    }

    #[test]
    fn ring_order_is_clockwise_on_screen() {
        let mut square = points(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]);
        let center = order_clockwise(&mut square);

        // with y growing downward, screen-clockwise means the cross product
        // of consecutive centroid offsets stays positive
        for i in 0..square.len() {
            let a = square[i];
            let b = square[(i + 1) % square.len()];
            let cross = (a.x - center.x) * (b.y - center.y) - (a.y - center.y) * (b.x - center.x);
            assert!(cross > 0.0, "segment {} is not clockwise", i);
        }
    }

    #[test]
    fn distant_outlier_is_dropped() {
        let center = Point2f::new(0.0, 0.0);
        // four points at distance 10, one at 20; mean is 12, limit 12.6
        let mut ring = points(&[(10.0, 0.0), (0.0, 10.0), (20.0, 0.0), (-10.0, 0.0), (0.0, -10.0)]);
        drop_distance_outliers(&mut ring, center);
        assert_eq!(
            ring,
            points(&[(10.0, 0.0), (0.0, 10.0), (-10.0, 0.0), (0.0, -10.0)])
        );
    }

    #[test]
    fn outlier_behind_a_removed_outlier_survives_the_pass() {
        let center = Point2f::new(0.0, 0.0);
        // distances 10, 10, 10, 20, 20; mean 14, limit 14.7; removing the
        // first outlier slides the second into its slot, which the single
        // pass never examines
        let mut ring = points(&[
            (10.0, 0.0),
            (0.0, 10.0),
            (-10.0, 0.0),
            (20.0, 0.0),
            (0.0, 20.0),
        ]);
        drop_distance_outliers(&mut ring, center);
        assert_eq!(
            ring,
            points(&[(10.0, 0.0), (0.0, 10.0), (-10.0, 0.0), (0.0, 20.0)])
        );
    }

    #[test]
    fn all_points_within_limit_are_kept() {
        let center = Point2f::new(5.0, 5.0);
        let mut ring = points(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]);
        let before = ring.clone();
        drop_distance_outliers(&mut ring, center);
        assert_eq!(ring, before);
    }
}
