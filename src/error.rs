use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Detection was requested before the cascade model finished loading,
    /// or the model file could not be read.
    #[error("cascade classifier model is not loaded")]
    ModelNotReady,

    #[error("frame buffer of {got} bytes does not match {width}x{height} RGBA")]
    BadFrame { got: usize, width: i32, height: i32 },

    #[error("worker thread is gone")]
    WorkerGone,

    #[error("timed out after {0:?} waiting for worker response")]
    ResponseTimeout(Duration),

    #[error("response tag {got} does not match request tag {want}")]
    CorrelationMismatch { want: u64, got: u64 },

    #[error(transparent)]
    OpenCv(#[from] opencv::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
