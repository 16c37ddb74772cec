//! Offline runner: reads a video file, feeds each frame through the worker
//! and writes the annotated result to `output.avi`.

use std::env;
use std::time::{Duration, Instant};

use log::{error, info};
use opencv::core::{add, no_array, Size};
use opencv::imgproc::{cvt_color, resize, COLOR_BGR2RGBA, COLOR_RGBA2BGR, INTER_LINEAR};
use opencv::prelude::{Mat, MatTraitConst, VideoCaptureTrait, VideoWriterTrait};
use opencv::videoio::{VideoCapture, VideoWriter, CAP_ANY};

use plate_tracker::{metrics, CvClient};

const FRAME_WIDTH: i32 = 640;
const FRAME_HEIGHT: i32 = 480;
const FPS: u64 = 20;

fn run(video_path: &str, cascade_path: &str, output_path: &str) -> plate_tracker::Result<()> {
    let mut client = CvClient::start()?;
    client.load_classifier(cascade_path)?;

    let mut capture = VideoCapture::from_file(video_path, CAP_ANY)?;
    let mut writer = VideoWriter::new(
        output_path,
        VideoWriter::fourcc('M', 'J', 'P', 'G')?,
        FPS as f64,
        Size::new(FRAME_WIDTH, FRAME_HEIGHT),
        true,
    )?;

    let frame_interval = Duration::from_millis(1000 / FPS);
    let mut frames = 0u64;
    let mut overlays = 0u64;

    loop {
        let pacing = Instant::now();

        let mut image = Mat::default();
        if !capture.read(&mut image)? || image.empty() {
            break;
        }

        let mut resized = Mat::default();
        resize(
            &image,
            &mut resized,
            Size::new(FRAME_WIDTH, FRAME_HEIGHT),
            0.0,
            0.0,
            INTER_LINEAR,
        )?;

        let mut rgba = Mat::default();
        cvt_color(&resized, &mut rgba, COLOR_BGR2RGBA, 0)?;

        frames += 1;
        if let Some(mask) = client.process_frame(rgba)? {
            overlays += 1;
            let mut mask_bgr = Mat::default();
            cvt_color(&mask, &mut mask_bgr, COLOR_RGBA2BGR, 0)?;
            let mut annotated = Mat::default();
            add(&resized, &mask_bgr, &mut annotated, &no_array(), -1)?;
            writer.write(&annotated)?;
        } else {
            writer.write(&resized)?;
        }

        let elapsed = pacing.elapsed();
        if frame_interval > elapsed {
            spin_sleep::sleep(frame_interval - elapsed);
        }
    }

    writer.release()?;
    info!("processed {} frames, {} with overlays", frames, overlays);
    println!("{}", metrics::render());
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = env::args().skip(1);
    let video_path = args.next().unwrap_or_else(|| "data/plates.mp4".to_string());
    let cascade_path = args
        .next()
        .unwrap_or_else(|| "models/haarcascade_number_plate.xml".to_string());
    let output_path = args.next().unwrap_or_else(|| "output.avi".to_string());

    if let Err(e) = run(&video_path, &cascade_path, &output_path) {
        error!("{}", e);
        std::process::exit(1);
    }
}
