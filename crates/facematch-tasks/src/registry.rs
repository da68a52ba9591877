//! Token-keyed task state shared by workers and pollers.
//!
//! Each entry is written only by the worker running that task. Entries live in
//! a sharded map, so tasks on different shards never contend.

use crate::error::TaskError;
use dashmap::DashMap;
use facematch_core::{MatchResult, ProgressSink};
use serde::Serialize;
use std::borrow::Borrow;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Highest progress a task can report before its outcome is recorded.
const MAX_RUNNING_PROGRESS: f32 = 0.999_999_94;

/// Opaque identifier of one submitted search.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TaskToken(String);

impl TaskToken {
    /// Mint a fresh random (UUID v4) token.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskToken {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Borrow<str> for TaskToken {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Terminal state of a task.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Succeeded(Arc<[MatchResult]>),
    Failed(String),
}

/// What a poller sees when asking for a result.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskResult {
    Ready(Arc<[MatchResult]>),
    /// Known task, still running.
    Pending,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaskCounts {
    pub total: usize,
    pub completed: usize,
}

struct TaskEntry {
    progress: f32,
    outcome: Option<TaskOutcome>,
    completed_at: Option<Instant>,
}

#[derive(Default)]
pub struct TaskRegistry {
    tasks: DashMap<TaskToken, TaskEntry>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new task at progress 0.0 with no result.
    pub fn register(&self, token: TaskToken) {
        self.tasks.insert(
            token,
            TaskEntry {
                progress: 0.0,
                outcome: None,
                completed_at: None,
            },
        );
    }

    /// Raise a running task's progress. Lower values are ignored, and values
    /// are held just below 1.0 until [`complete`](Self::complete) is called.
    pub fn advance(&self, token: &str, progress: f32) {
        if let Some(mut entry) = self.tasks.get_mut(token) {
            if entry.outcome.is_none() {
                let capped = progress.clamp(0.0, MAX_RUNNING_PROGRESS);
                if capped > entry.progress {
                    entry.progress = capped;
                }
            }
        }
    }

    /// Record the outcome and set progress to 1.0 in one write.
    ///
    /// An outcome is recorded at most once; later calls are ignored.
    pub fn complete(&self, token: &str, outcome: TaskOutcome) {
        let Some(mut entry) = self.tasks.get_mut(token) else {
            tracing::debug!(token, "task deleted before completion; dropping outcome");
            return;
        };
        if entry.outcome.is_some() {
            tracing::warn!(token, "task already completed; ignoring second outcome");
            return;
        }
        entry.outcome = Some(outcome);
        entry.progress = 1.0;
        entry.completed_at = Some(Instant::now());
    }

    pub fn progress(&self, token: &str) -> Result<f32, TaskError> {
        self.tasks
            .get(token)
            .map(|e| e.progress)
            .ok_or_else(|| TaskError::NotFound(token.into()))
    }

    /// Non-blocking result read. Repeated reads return the same value.
    pub fn result(&self, token: &str) -> Result<TaskResult, TaskError> {
        let entry = self
            .tasks
            .get(token)
            .ok_or_else(|| TaskError::NotFound(token.into()))?;
        Ok(match &entry.outcome {
            None => TaskResult::Pending,
            Some(TaskOutcome::Succeeded(results)) => TaskResult::Ready(Arc::clone(results)),
            Some(TaskOutcome::Failed(reason)) => TaskResult::Failed(reason.clone()),
        })
    }

    /// Remove all state for a token. Returns false if it was unknown.
    pub fn delete(&self, token: &str) -> bool {
        self.tasks.remove(token).is_some()
    }

    /// Number of registered tasks and how many of them reached 1.0.
    pub fn counts(&self) -> TaskCounts {
        let mut counts = TaskCounts {
            total: 0,
            completed: 0,
        };
        for entry in self.tasks.iter() {
            counts.total += 1;
            if entry.progress == 1.0 {
                counts.completed += 1;
            }
        }
        counts
    }

    /// Drop tasks whose outcome has been available for longer than `grace`.
    /// Returns how many were removed.
    pub fn evict_completed(&self, grace: Duration) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|_, entry| match entry.completed_at {
            Some(at) => at.elapsed() <= grace,
            None => true,
        });
        before.saturating_sub(self.tasks.len())
    }
}

impl ProgressSink for TaskRegistry {
    fn publish(&self, token: &str, progress: f32) {
        self.advance(token, progress);
    }
}
