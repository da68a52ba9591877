//! Search dispatch: mint a token, queue the search, poll it by token.

use crate::config::Config;
use crate::error::TaskError;
use crate::pool::WorkerPool;
use crate::registry::{TaskCounts, TaskOutcome, TaskRegistry, TaskResult, TaskToken};
use crate::request::SearchRequest;
use facematch_core::{search_matching_faces, FaceEncoder, GalleryProvider, SearchParams};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

/// Owns the task registry and the worker pool.
///
/// All operations are non-blocking; searches run on pool threads and report
/// into the registry, which pollers read by token.
pub struct SearchService {
    registry: Arc<TaskRegistry>,
    pool: WorkerPool,
    gallery: Arc<dyn GalleryProvider>,
    encoder: Arc<dyn FaceEncoder>,
    params: SearchParams,
}

impl SearchService {
    pub fn new(
        config: &Config,
        gallery: Arc<dyn GalleryProvider>,
        encoder: Arc<dyn FaceEncoder>,
    ) -> Result<Self, TaskError> {
        let pool = WorkerPool::new(config.workers)?;
        Ok(Self {
            registry: Arc::new(TaskRegistry::new()),
            pool,
            gallery,
            encoder,
            params: SearchParams {
                threshold: config.match_threshold,
                progress_step: config.progress_step,
            },
        })
    }

    /// Register the task at progress 0.0, queue it, and return its token
    /// without waiting for it to start.
    pub fn submit(&self, request: SearchRequest) -> Result<TaskToken, TaskError> {
        let token = TaskToken::generate();
        self.registry.register(token.clone());

        let registry = Arc::clone(&self.registry);
        let gallery = Arc::clone(&self.gallery);
        let encoder = Arc::clone(&self.encoder);
        let params = self.params;
        let job_token = token.clone();

        let queued = self.pool.execute(move || {
            run_search(&registry, gallery.as_ref(), encoder.as_ref(), &params, &job_token, request);
        });
        if let Err(e) = queued {
            self.registry.delete(token.as_str());
            return Err(e);
        }

        tracing::info!(token = %token, queued = self.pool.queued(), "search submitted");
        Ok(token)
    }

    pub fn progress(&self, token: &str) -> Result<f32, TaskError> {
        self.registry.progress(token)
    }

    pub fn result(&self, token: &str) -> Result<TaskResult, TaskError> {
        self.registry.result(token)
    }

    pub fn delete(&self, token: &str) -> bool {
        let deleted = self.registry.delete(token);
        tracing::debug!(token, deleted, "delete task");
        deleted
    }

    pub fn counts(&self) -> TaskCounts {
        self.registry.counts()
    }

    /// Drop finished tasks older than `grace`.
    pub fn evict_completed(&self, grace: Duration) -> usize {
        let evicted = self.registry.evict_completed(grace);
        if evicted > 0 {
            tracing::info!(evicted, "evicted finished tasks");
        }
        evicted
    }

    pub fn workers(&self) -> usize {
        self.pool.size()
    }

    /// Finish queued searches and stop the workers.
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }
}

/// Body of one queued search. Errors and panics both end as `Failed`.
fn run_search(
    registry: &TaskRegistry,
    gallery: &dyn GalleryProvider,
    encoder: &dyn FaceEncoder,
    params: &SearchParams,
    token: &TaskToken,
    request: SearchRequest,
) {
    tracing::debug!(token = %token, boxes = request.boxes().len(), "search started");

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        search_matching_faces(
            request.image(),
            request.boxes(),
            gallery,
            encoder,
            params,
            token.as_str(),
            registry,
        )
    }));

    let outcome = match outcome {
        Ok(Ok(results)) => {
            tracing::info!(token = %token, boxes = results.len(), "search finished");
            TaskOutcome::Succeeded(results.into())
        }
        Ok(Err(e)) => {
            tracing::warn!(token = %token, error = %e, "search failed");
            TaskOutcome::Failed(e.to_string())
        }
        Err(_) => {
            tracing::error!(token = %token, "search panicked");
            TaskOutcome::Failed("search panicked".into())
        }
    };

    registry.complete(token.as_str(), outcome);
}
