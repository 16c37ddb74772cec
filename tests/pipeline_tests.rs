//! Cross-module pipeline tests: worker protocol, contour analysis and the
//! optical-flow tracking step on synthetic frames.

use std::time::Duration;

use opencv::core::{count_non_zero, Point2f, Rect, Scalar, Vector, CV_8UC4};
use opencv::imgproc::{cvt_color, rectangle, COLOR_RGBA2GRAY, LINE_8};
use opencv::prelude::{Mat, MatExprTraitConst, MatTraitConst, MatTraitConstManual};

use plate_tracker::plate_tracking::contour_analyzer::find_plate_quad;
use plate_tracker::plate_tracking::optical_flow::track_step;
use plate_tracker::plate_tracking::{rgba_frame, TrackState};
use plate_tracker::{CvClient, Error};

fn blank_rgba(rows: i32, cols: i32) -> Mat {
    Mat::zeros(rows, cols, CV_8UC4).unwrap().to_mat().unwrap()
}

fn frame_with_white_rect(rows: i32, cols: i32, rect: Rect) -> Mat {
    let mut frame = blank_rgba(rows, cols);
    rectangle(
        &mut frame,
        rect,
        Scalar::new(255.0, 255.0, 255.0, 255.0),
        -1,
        LINE_8,
        0,
    )
    .unwrap();
    frame
}

fn to_gray(frame: &Mat) -> Mat {
    let mut gray = Mat::default();
    cvt_color(frame, &mut gray, COLOR_RGBA2GRAY, 0).unwrap();
    gray
}

fn non_zero_pixels(rgba: &Mat) -> i32 {
    count_non_zero(&to_gray(rgba)).unwrap()
}

// =============================================================================
// Worker protocol
// =============================================================================

#[test]
fn detection_before_classifier_load_fails_fast() {
    let mut client = CvClient::start().unwrap();
    let frame = blank_rgba(120, 160);
    let err = client.process_frame(frame).unwrap_err();
    assert!(matches!(err, Error::ModelNotReady), "got {:?}", err);
}

#[test]
fn loading_a_missing_cascade_leaves_detection_unavailable() {
    let mut client = CvClient::start().unwrap();
    assert!(client.load_classifier("does/not/exist.xml").is_err());

    let frame = blank_rgba(120, 160);
    let err = client.process_frame(frame).unwrap_err();
    assert!(matches!(err, Error::ModelNotReady), "got {:?}", err);
}

#[test]
fn a_timed_out_frame_does_not_poison_later_requests() {
    let mut client = CvClient::start()
        .unwrap()
        .with_frame_timeout(Duration::ZERO);

    let err = client.process_frame(blank_rgba(60, 80)).unwrap_err();
    assert!(matches!(err, Error::ResponseTimeout(_)), "got {:?}", err);

    // the worker's late answer to the first frame must not be handed to the
    // next request as a mismatched tag
    let err = client.load_classifier("does/not/exist.xml").unwrap_err();
    assert!(matches!(err, Error::ModelNotReady), "got {:?}", err);
}

#[test]
fn worker_survives_repeated_requests() {
    let mut client = CvClient::start().unwrap();
    for _ in 0..3 {
        let frame = blank_rgba(60, 80);
        assert!(client.process_frame(frame).is_err());
    }
}

// =============================================================================
// Contour analysis
// =============================================================================

#[test]
fn find_plate_quad_fills_the_inner_rectangle() {
    let frame = frame_with_white_rect(200, 200, Rect::new(50, 50, 100, 40));
    let mask = find_plate_quad(&frame, Rect::new(40, 40, 120, 60)).unwrap();

    assert_eq!(mask.rows(), 200);
    assert_eq!(mask.cols(), 200);
    assert!(non_zero_pixels(&mask) > 0, "mask is empty");
}

#[test]
fn find_plate_quad_is_idempotent() {
    let frame = frame_with_white_rect(200, 200, Rect::new(50, 50, 100, 40));
    let roi = Rect::new(40, 40, 120, 60);

    let first = find_plate_quad(&frame, roi).unwrap();
    let second = find_plate_quad(&frame, roi).unwrap();

    assert_eq!(
        first.data_bytes().unwrap(),
        second.data_bytes().unwrap(),
        "masks differ between runs"
    );
}

#[test]
fn find_plate_quad_ignores_contours_outside_the_roi() {
    // the rectangle sits entirely outside the ROI, so nothing survives
    let frame = frame_with_white_rect(200, 200, Rect::new(120, 120, 60, 30));
    let mask = find_plate_quad(&frame, Rect::new(0, 0, 80, 80)).unwrap();
    assert_eq!(non_zero_pixels(&mask), 0);
}

// =============================================================================
// Optical-flow tracking step
// =============================================================================

#[test]
fn static_square_keeps_its_track_and_renders_a_ring() {
    let rect = Rect::new(60, 60, 80, 60);
    let frame = frame_with_white_rect(200, 200, rect);
    let prev_gray = to_gray(&frame);

    let corners: Vector<Point2f> = [
        (60.0, 60.0),
        (140.0, 60.0),
        (140.0, 120.0),
        (60.0, 120.0),
    ]
    .iter()
    .map(|&(x, y)| Point2f::new(x, y))
    .collect();

    let state = TrackState::new(prev_gray, corners).unwrap();
    let (next_state, mask) = track_step(state, &frame).unwrap();

    let next_state = next_state.expect("track lost on a static frame");
    assert_eq!(next_state.point_count(), 4);

    let mask = mask.expect("no overlay for a live track");
    assert!(non_zero_pixels(&mask) > 0, "ring was not drawn");
}

#[test]
fn failing_flow_primitive_degrades_to_tracking_lost() {
    // the previous frame's size disagrees with the new frame, so the flow
    // call itself errors; the session must fold back to detection instead
    // of propagating
    let prev_gray = to_gray(&blank_rgba(50, 50));
    let corners: Vector<Point2f> = [(5.0, 5.0), (20.0, 5.0), (20.0, 20.0), (5.0, 20.0)]
        .iter()
        .map(|&(x, y)| Point2f::new(x, y))
        .collect();
    let state = TrackState::new(prev_gray, corners).unwrap();

    let frame = blank_rgba(200, 200);
    let (next_state, mask) = track_step(state, &frame).unwrap();
    assert!(next_state.is_none());
    assert!(mask.is_none());
}

#[test]
fn track_state_requires_four_points() {
    let gray = to_gray(&blank_rgba(50, 50));
    let three: Vector<Point2f> = [(1.0, 1.0), (2.0, 2.0), (3.0, 3.0)]
        .iter()
        .map(|&(x, y)| Point2f::new(x, y))
        .collect();
    assert!(TrackState::new(gray, three).is_none());
}

// =============================================================================
// Frame construction
// =============================================================================

#[test]
fn rgba_frame_round_trips_buffer_dimensions() {
    let bytes = vec![0u8; 16 * 8 * 4];
    let frame = rgba_frame(&bytes, 16, 8).unwrap();
    assert_eq!(frame.cols(), 16);
    assert_eq!(frame.rows(), 8);
    assert_eq!(frame.typ(), CV_8UC4);
}

#[test]
fn rgba_frame_rejects_a_short_buffer() {
    let bytes = vec![0u8; 10];
    assert!(matches!(
        rgba_frame(&bytes, 16, 8),
        Err(Error::BadFrame { .. })
    ));
}
