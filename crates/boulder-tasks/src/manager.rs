//! Admission-controlled background task manager
//!
//! Tasks are admitted against per-provider and per-model running counters;
//! work over the limit waits in a persisted queue and is promoted
//! automatically when a running task reaches a terminal status. Counters
//! are mutated only in matched increment/decrement pairs around execution,
//! so they cannot leak when a call fails.
//!
//! Persistence is write-through for the queue and debounced for task
//! status, with a forced save on shutdown. Single writer assumed; there is
//! no cross-process lock.

use boulder_core::{BoulderError, FallbackConfig, Result, TaskLimitsConfig};
use boulder_router::{CallRequest, FallbackRouter};
use chrono::Utc;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::task::{BackgroundTask, QueuedCall, TaskStatus};

const TASKS_FILE: &str = "tasks.json";
const QUEUE_FILE: &str = "queue.json";

struct Inner {
    tasks: HashMap<String, BackgroundTask>,
    queue: Vec<QueuedCall>,
    running_per_provider: HashMap<String, usize>,
    running_per_model: HashMap<String, usize>,
    dirty: bool,
}

#[derive(Clone)]
pub struct TaskManager {
    limits: TaskLimitsConfig,
    fallback: FallbackConfig,
    router: Arc<FallbackRouter>,
    state_dir: PathBuf,
    inner: Arc<Mutex<Inner>>,
}

impl TaskManager {
    pub fn new(
        working_dir: impl AsRef<Path>,
        limits: TaskLimitsConfig,
        fallback: FallbackConfig,
        router: Arc<FallbackRouter>,
    ) -> Self {
        Self {
            limits,
            fallback,
            router,
            state_dir: working_dir.as_ref().join(".boulder"),
            inner: Arc::new(Mutex::new(Inner {
                tasks: HashMap::new(),
                queue: Vec::new(),
                running_per_provider: HashMap::new(),
                running_per_model: HashMap::new(),
                dirty: false,
            })),
        }
    }

    /// Restore persisted tasks and queue from a previous process.
    ///
    /// Tasks persisted as `running` were interrupted by the crash and are
    /// marked failed; queued items whose task is still pending are
    /// re-dispatched through normal admission.
    pub async fn load(&self) {
        let mut tasks: HashMap<String, BackgroundTask> =
            self.read_json(TASKS_FILE).await.unwrap_or_default();
        let queue: Vec<QueuedCall> = self.read_json(QUEUE_FILE).await.unwrap_or_default();

        let mut interrupted = 0usize;
        for task in tasks.values_mut() {
            if task.status == TaskStatus::Running {
                task.status = TaskStatus::Failed;
                task.error = Some("interrupted by process restart".to_string());
                task.completed_at = Some(Utc::now());
                interrupted += 1;
            }
        }
        if interrupted > 0 {
            info!(interrupted, "Marked interrupted background tasks as failed");
        }

        {
            let mut inner = self.inner.lock().expect("task manager poisoned");
            inner.queue = queue
                .into_iter()
                .filter(|item| {
                    tasks
                        .get(&item.task_id)
                        .is_some_and(|t| t.status == TaskStatus::Pending)
                })
                .collect();
            inner.tasks = tasks;
            inner.dirty = true;
        }

        self.save_queue().await;
        self.flush().await;
        self.pump().await;
    }

    /// Admit a new background call, returning its task id.
    ///
    /// The task starts immediately if the provider and model counters are
    /// under their limits, otherwise it waits in the queue.
    pub async fn submit(
        &self,
        expert: &str,
        prompt: &str,
        context: Option<&str>,
    ) -> Result<String> {
        let model = self.fallback.default_model.clone();
        let task = BackgroundTask::new(expert, model.clone());
        let id = task.id.clone();

        {
            let mut inner = self.inner.lock().expect("task manager poisoned");
            inner.queue.push(QueuedCall {
                task_id: id.clone(),
                expert: expert.to_string(),
                model,
                prompt: prompt.to_string(),
                context: context.map(|c| c.to_string()),
            });
            inner.tasks.insert(id.clone(), task);
            inner.dirty = true;
        }
        debug!(task_id = %id, expert, "Background task admitted");

        self.save_queue().await;
        self.pump().await;
        Ok(id)
    }

    /// Cancel a task. Pending tasks leave the queue; running tasks keep
    /// executing but their eventual result is discarded.
    pub async fn cancel(&self, task_id: &str) -> Result<()> {
        let was_pending = {
            let mut inner = self.inner.lock().expect("task manager poisoned");
            let task = inner
                .tasks
                .get(task_id)
                .ok_or_else(|| BoulderError::Task(format!("unknown task {}", task_id)))?;

            match task.status {
                TaskStatus::Pending => {
                    inner.queue.retain(|item| item.task_id != task_id);
                    let task = inner
                        .tasks
                        .get_mut(task_id)
                        .expect("task checked above");
                    task.status = TaskStatus::Cancelled;
                    task.completed_at = Some(Utc::now());
                    inner.dirty = true;
                    true
                }
                TaskStatus::Running => {
                    let task = inner
                        .tasks
                        .get_mut(task_id)
                        .expect("task checked above");
                    task.status = TaskStatus::Cancelled;
                    task.completed_at = Some(Utc::now());
                    inner.dirty = true;
                    false
                }
                status => {
                    return Err(BoulderError::Task(format!(
                        "task {} is already {}",
                        task_id, status
                    )))
                }
            }
        };

        info!(task_id, was_pending, "Background task cancelled");
        if was_pending {
            self.save_queue().await;
        }
        Ok(())
    }

    pub fn status(&self, task_id: &str) -> Option<BackgroundTask> {
        self.inner
            .lock()
            .expect("task manager poisoned")
            .tasks
            .get(task_id)
            .cloned()
    }

    /// All tasks, oldest first
    pub fn list(&self) -> Vec<BackgroundTask> {
        let mut tasks: Vec<_> = self
            .inner
            .lock()
            .expect("task manager poisoned")
            .tasks
            .values()
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    pub fn running_for_model(&self, model: &str) -> usize {
        self.inner
            .lock()
            .expect("task manager poisoned")
            .running_per_model
            .get(model)
            .copied()
            .unwrap_or(0)
    }

    /// Persist task status if anything changed since the last flush
    pub async fn flush(&self) {
        let snapshot = {
            let mut inner = self.inner.lock().expect("task manager poisoned");
            if !inner.dirty {
                return;
            }
            inner.dirty = false;
            inner.tasks.clone()
        };
        self.write_json(TASKS_FILE, &snapshot).await;
    }

    /// Debounced persistence loop; cancelled by aborting the handle
    pub fn spawn_flush_loop(&self) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        let interval = Duration::from_millis(manager.limits.flush_interval_ms);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                manager.flush().await;
            }
        })
    }

    /// Forced final save of both files
    pub async fn shutdown(&self) {
        {
            let mut inner = self.inner.lock().expect("task manager poisoned");
            inner.dirty = true;
        }
        self.flush().await;
        self.save_queue().await;
    }

    /// Dispatch every queued item the counters currently admit.
    ///
    /// Returns a boxed future because this is mutually recursive with
    /// `execute` through the spawned task.
    fn pump(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(self.pump_inner())
    }

    async fn pump_inner(&self) {
        loop {
            let admitted = {
                let mut inner = self.inner.lock().expect("task manager poisoned");
                let position = inner.queue.iter().position(|item| {
                    let provider = self.fallback.provider_of(&item.expert);
                    let provider_running = inner
                        .running_per_provider
                        .get(&provider)
                        .copied()
                        .unwrap_or(0);
                    let model_running = inner
                        .running_per_model
                        .get(&item.model)
                        .copied()
                        .unwrap_or(0);
                    provider_running < self.provider_limit(&provider)
                        && model_running < self.model_limit(&item.model)
                });
                let Some(position) = position else {
                    break;
                };

                let item = inner.queue.remove(position);
                let provider = self.fallback.provider_of(&item.expert);
                *inner.running_per_provider.entry(provider).or_insert(0) += 1;
                *inner.running_per_model.entry(item.model.clone()).or_insert(0) += 1;
                if let Some(task) = inner.tasks.get_mut(&item.task_id) {
                    task.status = TaskStatus::Running;
                    task.started_at = Some(Utc::now());
                }
                inner.dirty = true;
                item
            };

            debug!(task_id = %admitted.task_id, "Dispatching background task");
            self.save_queue().await;

            let manager = self.clone();
            tokio::spawn(async move {
                manager.execute(admitted).await;
            });
        }
    }

    async fn execute(&self, item: QueuedCall) {
        let mut request = CallRequest::new(item.expert.clone(), item.prompt.clone());
        if let Some(context) = &item.context {
            request = request.with_context(context.clone());
        }
        let result = self.router.call_with_fallback(&request).await;

        {
            let mut inner = self.inner.lock().expect("task manager poisoned");

            // Matched decrement: runs exactly once per dispatch, on every
            // outcome, so admission counters cannot leak.
            let provider = self.fallback.provider_of(&item.expert);
            if let Some(count) = inner.running_per_provider.get_mut(&provider) {
                *count = count.saturating_sub(1);
            }
            if let Some(count) = inner.running_per_model.get_mut(&item.model) {
                *count = count.saturating_sub(1);
            }

            if let Some(task) = inner.tasks.get_mut(&item.task_id) {
                if task.status == TaskStatus::Cancelled {
                    debug!(task_id = %item.task_id, "Discarding result of cancelled task");
                } else {
                    match &result {
                        Ok(routed) => {
                            task.status = TaskStatus::Completed;
                            task.result = Some(routed.response.clone());
                        }
                        Err(e) => {
                            task.status = TaskStatus::Failed;
                            task.error = Some(e.to_string());
                        }
                    }
                    task.completed_at = Some(Utc::now());
                }
            }
            inner.dirty = true;
        }

        // A freed slot may admit the next queued task. `pump` returns a
        // boxed future because it is mutually recursive with this function
        // through the spawned task.
        self.pump().await;
    }

    fn provider_limit(&self, provider: &str) -> usize {
        self.limits
            .per_provider
            .get(provider)
            .copied()
            .unwrap_or(self.limits.default_per_provider)
    }

    fn model_limit(&self, model: &str) -> usize {
        self.limits
            .per_model
            .get(model)
            .copied()
            .unwrap_or(self.limits.default_per_model)
    }

    async fn save_queue(&self) {
        let snapshot = {
            self.inner
                .lock()
                .expect("task manager poisoned")
                .queue
                .clone()
        };
        self.write_json(QUEUE_FILE, &snapshot).await;
    }

    async fn read_json<T: serde::de::DeserializeOwned>(&self, file: &str) -> Option<T> {
        let path = self.state_dir.join(file);
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                return None;
            }
        };
        match serde_json::from_slice(&data) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Skipping invalid file {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Fail-open write
    async fn write_json<T: serde::Serialize>(&self, file: &str, value: &T) {
        let path = self.state_dir.join(file);
        let result = async {
            fs::create_dir_all(&self.state_dir).await?;
            let data = serde_json::to_vec_pretty(value)?;
            fs::write(&path, data).await?;
            Ok::<(), BoulderError>(())
        }
        .await;
        if let Err(e) = result {
            warn!("Failed to persist {} (continuing): {}", path.display(), e);
        }
    }
}
