use std::path::PathBuf;
use std::sync::Arc;

use facematch_core::BoundingBox;
use facematch_tasks::{load_image, SearchRequest, SearchService, TaskError, TaskResult};
use tokio::sync::oneshot;
use zbus::interface;

pub const BUS_NAME: &str = "org.facematch.FaceMatch1";
pub const OBJECT_PATH: &str = "/org/facematch/FaceMatch1";

/// D-Bus interface for the face search daemon.
///
/// Bus name: org.facematch.FaceMatch1
/// Object path: /org/facematch/FaceMatch1
pub struct FaceMatchService {
    service: Arc<SearchService>,
    match_threshold: f32,
}

impl FaceMatchService {
    pub fn new(service: Arc<SearchService>, match_threshold: f32) -> Self {
        Self {
            service,
            match_threshold,
        }
    }
}

#[interface(name = "org.facematch.FaceMatch1")]
impl FaceMatchService {
    /// Queue a search of the faces in `boxes` (x1, y1, x2, y2) within the
    /// image at `image_path`. Returns the task token immediately.
    async fn submit(
        &self,
        image_path: &str,
        boxes: Vec<(u32, u32, u32, u32)>,
    ) -> zbus::fdo::Result<String> {
        tracing::info!(image_path, boxes = boxes.len(), "submit requested");
        let boxes = boxes
            .into_iter()
            .map(|(x1, y1, x2, y2)| BoundingBox::new(x1, y1, x2, y2))
            .collect();
        let request = prepare_request(PathBuf::from(image_path), boxes).await?;
        let token = self.service.submit(request).map_err(to_fdo)?;
        Ok(token.to_string())
    }

    /// Progress of a task in [0, 1].
    async fn get_progress(&self, token: &str) -> zbus::fdo::Result<f64> {
        self.service
            .progress(token)
            .map(f64::from)
            .map_err(to_fdo)
    }

    /// Result of a task as JSON: `{"status": "pending" | "ready" | "failed", ...}`.
    async fn get_result(&self, token: &str) -> zbus::fdo::Result<String> {
        let result = self.service.result(token).map_err(to_fdo)?;
        Ok(result_json(&result).to_string())
    }

    /// Release a task. Returns false if the token was unknown.
    async fn delete_task(&self, token: &str) -> zbus::fdo::Result<bool> {
        Ok(self.service.delete(token))
    }

    /// (total, completed) task counts.
    async fn count_tasks(&self) -> zbus::fdo::Result<(u64, u64)> {
        let counts = self.service.counts();
        Ok((counts.total as u64, counts.completed as u64))
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let counts = self.service.counts();
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workers": self.service.workers(),
            "match_threshold": self.match_threshold,
            "tasks_total": counts.total,
            "tasks_completed": counts.completed,
        })
        .to_string())
    }
}

/// Decode the image and check the boxes on a dedicated thread, so the D-Bus
/// executor keeps answering polls while a large upload is decoded.
async fn prepare_request(
    path: PathBuf,
    boxes: Vec<BoundingBox>,
) -> zbus::fdo::Result<SearchRequest> {
    let (reply_tx, reply_rx) = oneshot::channel();
    std::thread::Builder::new()
        .name("facematch-decode".into())
        .spawn(move || {
            let request = load_image(&path).and_then(|image| SearchRequest::new(image, boxes));
            let _ = reply_tx.send(request);
        })
        .map_err(|e| zbus::fdo::Error::Failed(format!("failed to spawn decode thread: {e}")))?;

    reply_rx
        .await
        .map_err(|_| zbus::fdo::Error::Failed("decode thread exited".into()))?
        .map_err(to_fdo)
}

fn to_fdo(err: TaskError) -> zbus::fdo::Error {
    match err {
        TaskError::NotFound(_) | TaskError::InvalidInput(_) => {
            zbus::fdo::Error::InvalidArgs(err.to_string())
        }
        TaskError::PoolClosed | TaskError::Spawn(_) => zbus::fdo::Error::Failed(err.to_string()),
    }
}

fn result_json(result: &TaskResult) -> serde_json::Value {
    match result {
        TaskResult::Pending => serde_json::json!({ "status": "pending" }),
        TaskResult::Ready(results) => serde_json::json!({
            "status": "ready",
            "result": &results[..],
        }),
        TaskResult::Failed(reason) => serde_json::json!({
            "status": "failed",
            "error": reason,
        }),
    }
}
