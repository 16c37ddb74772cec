//! Texture-maps a source image onto an arbitrary quadrilateral.
//!
//! The destination quadrilateral is subdivided into a 9x9 grid of cells, each
//! split into two triangles carrying source-texture coordinates proportional
//! to their cell. Every triangle gets the unique affine transform mapping its
//! texture corners onto its screen corners; the warped source is composited
//! through a triangle mask, the Mat equivalent of canvas clip-and-draw.

use opencv::core::Point;
use opencv::core::Point2f;
use opencv::core::Scalar;
use opencv::core::Size;
use opencv::core::Vector;
use opencv::core::BORDER_CONSTANT;
use opencv::core::CV_8UC1;
use opencv::imgproc::fill_convex_poly;
use opencv::imgproc::warp_affine;
use opencv::imgproc::INTER_LINEAR;
use opencv::imgproc::LINE_8;
use opencv::prelude::Mat;
use opencv::prelude::MatExprTraitConst;
use opencv::prelude::MatTraitConst;
use opencv::prelude::MatTraitConstManual;

use crate::error::Result;

const GRID_ROWS: i32 = 9;
const GRID_COLS: i32 = 9;

/// Destination corners of the quadrilateral, in device pixels.
#[derive(Debug, Clone, Copy)]
pub struct QuadCorners {
    pub top_left: Point2f,
    pub top_right: Point2f,
    pub bottom_right: Point2f,
    pub bottom_left: Point2f,
}

/// One subdivision triangle: three destination points paired with three
/// source-texture coordinates.
#[derive(Debug, Clone, Copy)]
pub struct TexturedTriangle {
    pub dst: [Point2f; 3],
    pub tex: [Point2f; 3],
}

/// Row-major 2x3 affine matrix `[m11, m21, dx, m12, m22, dy]` mapping
/// texture coordinates onto destination coordinates, or `None` when the
/// texture triangle is degenerate.
pub fn affine_from_triangle(tri: &TexturedTriangle) -> Option<[f64; 6]> {
    let [d0, d1, d2] = tri.dst;
    let [t0, t1, t2] = tri.tex;
    let (x0, y0, x1, y1, x2, y2) = (
        d0.x as f64,
        d0.y as f64,
        d1.x as f64,
        d1.y as f64,
        d2.x as f64,
        d2.y as f64,
    );
    let (sx0, sy0, sx1, sy1, sx2, sy2) = (
        t0.x as f64,
        t0.y as f64,
        t1.x as f64,
        t1.y as f64,
        t2.x as f64,
        t2.y as f64,
    );

    let denom = sx0 * (sy2 - sy1) - sx1 * sy2 + sx2 * sy1 + (sx1 - sx2) * sy0;
    if denom == 0.0 {
        return None;
    }

    let m11 = -(sy0 * (x2 - x1) - sy1 * x2 + sy2 * x1 + (sy1 - sy2) * x0) / denom;
    let m12 = (sy1 * y2 + sy0 * (y1 - y2) - sy2 * y1 + (sy2 - sy1) * y0) / denom;
    let m21 = (sx0 * (x2 - x1) - sx1 * x2 + sx2 * x1 + (sx1 - sx2) * x0) / denom;
    let m22 = -(sx1 * y2 + sx0 * (y1 - y2) - sx2 * y1 + (sx2 - sx1) * y0) / denom;
    let dx = (sx0 * (sy2 * x1 - sy1 * x2) + sy0 * (sx1 * x2 - sx2 * x1) + (sx2 * sy1 - sx1 * sy2) * x0)
        / denom;
    let dy = (sx0 * (sy2 * y1 - sy1 * y2) + sy0 * (sx1 * y2 - sx2 * y1) + (sx2 * sy1 - sx1 * sy2) * y0)
        / denom;

    Some([m11, m21, dx, m12, m22, dy])
}

/// Subdivides the quadrilateral into the triangle grid. Vertices carry small
/// fixed nudges so adjacent triangles overlap slightly instead of leaving
/// visible seams.
pub fn quad_geometry(image_size: Size, corners: &QuadCorners) -> Vec<TexturedTriangle> {
    let mut triangles = Vec::with_capacity((GRID_ROWS * GRID_COLS * 2) as usize);

    let dx1 = corners.bottom_left.x - corners.top_left.x;
    let dy1 = corners.bottom_left.y - corners.top_left.y;
    let dx2 = corners.bottom_right.x - corners.top_right.x;
    let dy2 = corners.bottom_right.y - corners.top_right.y;

    let img_w = image_size.width as f32;
    let img_h = image_size.height as f32;

    for row in 0..GRID_ROWS {
        let cur_row = row as f32 / GRID_ROWS as f32;
        let next_row = (row + 1) as f32 / GRID_ROWS as f32;

        let cur_row_x1 = corners.top_left.x + dx1 * cur_row;
        let cur_row_y1 = corners.top_left.y + dy1 * cur_row;
        let cur_row_x2 = corners.top_right.x + dx2 * cur_row;
        let cur_row_y2 = corners.top_right.y + dy2 * cur_row;

        let next_row_x1 = corners.top_left.x + dx1 * next_row;
        let next_row_y1 = corners.top_left.y + dy1 * next_row;
        let next_row_x2 = corners.top_right.x + dx2 * next_row;
        let next_row_y2 = corners.top_right.y + dy2 * next_row;

        for col in 0..GRID_COLS {
            let cur_col = col as f32 / GRID_COLS as f32;
            let next_col = (col + 1) as f32 / GRID_COLS as f32;

            let d_cur_x = cur_row_x2 - cur_row_x1;
            let d_cur_y = cur_row_y2 - cur_row_y1;
            let d_next_x = next_row_x2 - next_row_x1;
            let d_next_y = next_row_y2 - next_row_y1;

            let top_left_x = cur_row_x1 + d_cur_x * cur_col;
            let top_left_y = cur_row_y1 + d_cur_y * cur_col;
            let top_right_x = cur_row_x1 + d_cur_x * next_col;
            let top_right_y = cur_row_y1 + d_cur_y * next_col;
            let bottom_right_x = next_row_x1 + d_next_x * next_col;
            let bottom_right_y = next_row_y1 + d_next_y * next_col;
            let bottom_left_x = next_row_x1 + d_next_x * cur_col;
            let bottom_left_y = next_row_y1 + d_next_y * cur_col;

            let u1 = cur_col * img_w;
            let u2 = next_col * img_w;
            let v1 = cur_row * img_h;
            let v2 = next_row * img_h;

            // fixed per-vertex nudge table, not a general antialiasing pass
            triangles.push(TexturedTriangle {
                dst: [
                    Point2f::new(top_left_x - 1.0, top_left_y),
                    Point2f::new(bottom_right_x + 2.0, bottom_right_y + 1.0),
                    Point2f::new(bottom_left_x - 1.0, bottom_left_y + 1.0),
                ],
                tex: [
                    Point2f::new(u1, v1),
                    Point2f::new(u2, v2),
                    Point2f::new(u1, v2),
                ],
            });
            triangles.push(TexturedTriangle {
                dst: [
                    Point2f::new(top_left_x - 2.0, top_left_y),
                    Point2f::new(top_right_x + 1.0, top_right_y),
                    Point2f::new(bottom_right_x + 1.0, bottom_right_y + 1.0),
                ],
                tex: [
                    Point2f::new(u1, v1),
                    Point2f::new(u2, v1),
                    Point2f::new(u2, v2),
                ],
            });
        }
    }

    triangles
}

/// Draws `image` perspective-warped into the quadrilateral on `canvas`.
/// Degenerate triangles are skipped without drawing or reporting.
pub fn render_quad(canvas: &mut Mat, image: &Mat, corners: &QuadCorners) -> Result<()> {
    let canvas_size = canvas.size()?;
    for tri in quad_geometry(image.size()?, corners) {
        let matrix = match affine_from_triangle(&tri) {
            Some(m) => m,
            None => continue,
        };
        let transform = Mat::from_slice_2d(&[
            [matrix[0], matrix[1], matrix[2]],
            [matrix[3], matrix[4], matrix[5]],
        ])?;

        let mut warped = Mat::default();
        warp_affine(
            image,
            &mut warped,
            &transform,
            canvas_size,
            INTER_LINEAR,
            BORDER_CONSTANT,
            Scalar::default(),
        )?;

        let mut clip = Mat::zeros(canvas_size.height, canvas_size.width, CV_8UC1)?.to_mat()?;
        let outline: Vector<Point> = tri
            .dst
            .iter()
            .map(|p| Point::new(p.x.round() as i32, p.y.round() as i32))
            .collect();
        fill_convex_poly(&mut clip, &outline, Scalar::all(255.0), LINE_8, 0)?;

        warped.copy_to_masked(canvas, &clip)?;
    }
    Ok(())
}
