//! facematch-tasks — Asynchronous gallery searches addressed by token.
//!
//! A [`SearchService`] queues each search on a fixed pool of worker threads
//! and records progress and results in a concurrent [`TaskRegistry`] that
//! callers poll without blocking.

pub mod config;
pub mod error;
pub mod pool;
pub mod registry;
pub mod request;
pub mod service;

pub use config::Config;
pub use error::TaskError;
pub use registry::{TaskCounts, TaskRegistry, TaskResult, TaskToken};
pub use request::{load_image, SearchRequest};
pub use service::SearchService;
