//! Top-level worker error taxonomy

use crate::descriptor::DescriptorError;
use crate::engine::EngineError;
use crate::queue::QueueError;
use thiserror::Error;

/// Faults surfaced by the download worker body.
///
/// Configuration errors are not retryable and force an immediate Failure;
/// everything else is caught at the worker boundary and, unless a result
/// was already committed, also forced into Failure.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("invalid work configuration: {0}")]
    Config(String),

    #[error("foreground promotion failed: {0}")]
    Foreground(String),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
