//! Warps an input image onto a skewed quadrilateral and saves the result.

use std::env;

use log::error;
use opencv::core::{Point2f, Vector};
use opencv::imgcodecs::{imread, imwrite, IMREAD_COLOR};
use opencv::prelude::{Mat, MatExprTraitConst, MatTraitConst};

use plate_tracker::quad_render::{render_quad, QuadCorners};

const CANVAS_WIDTH: i32 = 800;
const CANVAS_HEIGHT: i32 = 600;

fn run(input_path: &str, output_path: &str) -> plate_tracker::Result<()> {
    let image = imread(input_path, IMREAD_COLOR)?;

    let mut canvas =
        Mat::zeros(CANVAS_HEIGHT, CANVAS_WIDTH, image.typ())?.to_mat()?;
    let corners = QuadCorners {
        top_left: Point2f::new(150.0, 80.0),
        top_right: Point2f::new(680.0, 140.0),
        bottom_right: Point2f::new(620.0, 520.0),
        bottom_left: Point2f::new(90.0, 430.0),
    };

    render_quad(&mut canvas, &image, &corners)?;
    imwrite(output_path, &canvas, &Vector::new())?;
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = env::args().skip(1);
    let input_path = args.next().unwrap_or_else(|| "data/badge.png".to_string());
    let output_path = args.next().unwrap_or_else(|| "warped.png".to_string());

    if let Err(e) = run(&input_path, &output_path) {
        error!("{}", e);
        std::process::exit(1);
    }
}
