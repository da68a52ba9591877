use crate::registry::TaskToken;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("task not found: {0}")]
    NotFound(TaskToken),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("worker pool is shut down")]
    PoolClosed,
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}
