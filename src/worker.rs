//! Dedicated worker thread and its request/response client.
//!
//! One worker owns the [`FrameOrchestrator`]; the caller talks to it through
//! [`CvClient`] over bounded crossbeam channels. Every request carries a
//! correlation tag echoed on the response, and the client takes `&mut self`
//! on each operation so at most one request is ever in flight.

use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, info};
use opencv::prelude::Mat;

use crate::error::{Error, Result};
use crate::metrics;
use crate::plate_tracking::orchestrator::FrameOrchestrator;

/// The one-time cascade load can be slow on a cold cache.
pub const CLASSIFIER_LOAD_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_secs(10);

enum Request {
    LoadClassifier { path: String, tag: u64 },
    ProcessFrame { frame: Mat, tag: u64 },
}

unsafe impl Send for Request {}

struct Response {
    tag: u64,
    outcome: Result<Option<Mat>>,
}

unsafe impl Send for Response {}

/// Client handle for the frame-processing worker.
pub struct CvClient {
    requests: Option<Sender<Request>>,
    responses: Receiver<Response>,
    worker: Option<thread::JoinHandle<()>>,
    next_tag: u64,
    frame_timeout: Duration,
}

impl CvClient {
    /// Spawns the worker thread with a fresh orchestrator.
    pub fn start() -> Result<Self> {
        let orchestrator = FrameOrchestrator::new()?;
        let (request_tx, request_rx) = bounded::<Request>(1);
        let (response_tx, response_rx) = bounded::<Response>(1);

        let worker = thread::spawn(move || worker_loop(orchestrator, request_rx, response_tx));

        Ok(Self {
            requests: Some(request_tx),
            responses: response_rx,
            worker: Some(worker),
            next_tag: 0,
            frame_timeout: DEFAULT_FRAME_TIMEOUT,
        })
    }

    pub fn with_frame_timeout(mut self, timeout: Duration) -> Self {
        self.frame_timeout = timeout;
        self
    }

    /// Loads the cascade asset on the worker. Failure leaves the detection
    /// path unusable but the worker alive.
    pub fn load_classifier(&mut self, path: &str) -> Result<()> {
        let tag = self.take_tag();
        self.dispatch(
            Request::LoadClassifier {
                path: path.to_string(),
                tag,
            },
            tag,
            CLASSIFIER_LOAD_TIMEOUT,
        )
        .map(|_| ())
    }

    /// Runs one frame through the pipeline and waits for its result.
    pub fn process_frame(&mut self, frame: Mat) -> Result<Option<Mat>> {
        let tag = self.take_tag();
        let timeout = self.frame_timeout;
        self.dispatch(Request::ProcessFrame { frame, tag }, tag, timeout)
    }

    fn take_tag(&mut self) -> u64 {
        self.next_tag += 1;
        self.next_tag
    }

    fn dispatch(&mut self, request: Request, tag: u64, timeout: Duration) -> Result<Option<Mat>> {
        let requests = self.requests.as_ref().ok_or(Error::WorkerGone)?;
        requests.send(request).map_err(|_| Error::WorkerGone)?;

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let response = match self.responses.recv_timeout(remaining) {
                Ok(response) => response,
                Err(RecvTimeoutError::Timeout) => return Err(Error::ResponseTimeout(timeout)),
                Err(RecvTimeoutError::Disconnected) => return Err(Error::WorkerGone),
            };
            if response.tag < tag {
                // answer to an earlier request whose caller already timed
                // out; drop it and keep waiting for ours
                debug!("discarding stale response for tag {}", response.tag);
                continue;
            }
            if response.tag != tag {
                return Err(Error::CorrelationMismatch {
                    want: tag,
                    got: response.tag,
                });
            }
            return response.outcome;
        }
    }
}

impl Drop for CvClient {
    fn drop(&mut self) {
        // closing the request channel ends the worker loop
        self.requests.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn worker_loop(
    mut orchestrator: FrameOrchestrator,
    requests: Receiver<Request>,
    responses: Sender<Response>,
) {
    info!("cv worker started");
    while let Ok(request) = requests.recv() {
        let response = match request {
            Request::LoadClassifier { path, tag } => Response {
                tag,
                outcome: orchestrator.load_classifier(&path).map(|_| None),
            },
            Request::ProcessFrame { frame, tag } => {
                let was_tracking = orchestrator.is_tracking();
                let started = Instant::now();
                let outcome = orchestrator.process_frame(&frame);
                metrics::FRAME_LATENCY_SECONDS.observe(started.elapsed().as_secs_f64());

                let label = match &outcome {
                    Ok(None) => "empty",
                    Ok(Some(_)) if was_tracking => "tracked",
                    Ok(Some(_)) => "detected",
                    Err(_) => "error",
                };
                metrics::FRAME_OUTCOMES.with_label_values(&[label]).inc();

                Response { tag, outcome }
            }
        };
        if responses.send(response).is_err() {
            break;
        }
    }
    info!("cv worker stopped");
}
