//! C10 — Task Scheduler: admission control, per-session serialization, tiered
//! concurrency, and streaming progress.
//!
//! Grounded on `original_source/.../performance_optimizer.py`, replacing its
//! `asyncio.sleep`-based stage simulation with real elapsed stage durations
//! driven by `tokio::time::sleep`.

use crate::config::{ResourceMultipliers, Tier};
use crate::error::{GatewayError, GatewayResult};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

/// The eight named stages walked for every task (§4.10).
const STAGES: [&str; 8] = [
    "initializing",
    "analyzing",
    "optimizing_pipeline",
    "allocating_resources",
    "processing",
    "applying_algorithms",
    "optimizing_output",
    "finalizing",
];

const MIN_DURATION_SECS: u64 = 20;

/// Lifecycle state of a [`ProcessingTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

/// One entry in a task's append-only progress log.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ProgressLogEntry {
    pub ts: DateTime<Utc>,
    pub stage: String,
    pub progress: u8,
}

/// A submitted long-running processing job (§3, Entity: ProcessingTask).
#[derive(Debug, Clone)]
pub struct ProcessingTask {
    pub task_id: Uuid,
    pub tenant_id: String,
    pub user_id: String,
    pub session_key: String,
    pub operation_type: String,
    pub tier: Tier,
    pub complexity_score: u32,
    pub estimated_duration_s: u64,
    pub optimized_duration_s: u64,
    pub status: TaskStatus,
    pub progress: u8,
    pub current_stage: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub progress_log: Vec<ProgressLogEntry>,
}

/// One frame on a task's progress stream (§6: progress stream frame).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ProgressFrame {
    pub frame_type: ProgressFrameType,
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub progress: u8,
    pub current_stage: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub remaining_s: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressFrameType {
    ProgressUpdate,
    TaskCompleted,
}

/// Outcome of [`TaskScheduler::submit`].
#[derive(Debug, Clone)]
pub enum SubmitResult {
    Accepted { task: ProcessingTask },
    Rejected { reason: String },
}

fn sizing(complexity_score: u32, tier: Tier, multipliers: &ResourceMultipliers, base_stage_seconds: u64) -> (u64, u64) {
    let estimated = complexity_score as u64 * base_stage_seconds;
    let multiplier = multipliers.for_tier(tier);
    let optimized = ((estimated as f64) / multiplier).floor() as u64;
    (estimated, optimized.max(MIN_DURATION_SECS))
}

struct TaskRecord {
    task: RwLock<ProcessingTask>,
    progress_tx: broadcast::Sender<ProgressFrame>,
}

/// Admission control + per-session lock + tier-weighted concurrency + progress stream.
pub struct TaskScheduler {
    tasks: DashMap<Uuid, Arc<TaskRecord>>,
    session_index: DashMap<(String, String), Uuid>,
    multipliers: ResourceMultipliers,
    base_stage_seconds: u64,
}

impl TaskScheduler {
    pub fn new(multipliers: ResourceMultipliers, base_stage_seconds: u64) -> Self {
        Self {
            tasks: DashMap::new(),
            session_index: DashMap::new(),
            multipliers,
            base_stage_seconds,
        }
    }

    /// Rejects with `"session_busy"` if an active task already holds the
    /// `(tenant_id, session_key)` slot, unless the tier allows parallel
    /// sessions (premium/enterprise) (§4.10).
    pub async fn submit(
        &self,
        tenant_id: &str,
        user_id: &str,
        session_key: &str,
        operation_type: &str,
        complexity_score: u32,
        tier: Tier,
    ) -> GatewayResult<SubmitResult> {
        let session_key_pair = (tenant_id.to_string(), session_key.to_string());

        if !tier.allows_parallel_sessions() {
            if let Some(existing_id) = self.session_index.get(&session_key_pair) {
                if let Some(record) = self.tasks.get(&*existing_id) {
                    let status = record.task.read().await.status;
                    if matches!(status, TaskStatus::Queued | TaskStatus::Processing) {
                        return Ok(SubmitResult::Rejected {
                            reason: "session_busy".to_string(),
                        });
                    }
                }
            }
        }

        let (estimated_duration_s, optimized_duration_s) =
            sizing(complexity_score, tier, &self.multipliers, self.base_stage_seconds);

        let task = ProcessingTask {
            task_id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            user_id: user_id.to_string(),
            session_key: session_key.to_string(),
            operation_type: operation_type.to_string(),
            tier,
            complexity_score,
            estimated_duration_s,
            optimized_duration_s,
            status: TaskStatus::Queued,
            progress: 0,
            current_stage: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            progress_log: Vec::new(),
        };

        let task_id = task.task_id;
        let (progress_tx, _rx) = broadcast::channel(STAGES.len() + 2);
        let record = Arc::new(TaskRecord {
            task: RwLock::new(task.clone()),
            progress_tx,
        });

        self.tasks.insert(task_id, record.clone());
        self.session_index.insert(session_key_pair, task_id);

        self.spawn_execution(record);

        Ok(SubmitResult::Accepted { task })
    }

    fn spawn_execution(&self, record: Arc<TaskRecord>) {
        tokio::spawn(async move {
            run_task(record).await;
        });
    }

    /// Sets `status=cancelled` if the task has not completed; the in-flight
    /// stage is allowed to finish but no further stages run (§4.10).
    pub async fn cancel(&self, task_id: Uuid) -> bool {
        let Some(record) = self.tasks.get(&task_id) else {
            return false;
        };
        let mut task = record.task.write().await;
        if matches!(task.status, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled) {
            return false;
        }
        task.status = TaskStatus::Cancelled;
        true
    }

    /// Yields every progress update since subscription until the task
    /// reaches a terminal state, then closes. Multiple concurrent streams
    /// see the same sequence (§4.10).
    pub fn subscribe(&self, task_id: Uuid) -> Option<broadcast::Receiver<ProgressFrame>> {
        self.tasks.get(&task_id).map(|r| r.progress_tx.subscribe())
    }

    pub async fn get(&self, task_id: Uuid) -> Option<ProcessingTask> {
        let record = self.tasks.get(&task_id)?;
        Some(record.task.read().await.clone())
    }

    /// Informational queue snapshot, used by tests to assert the concurrency
    /// invariants in spec §8. Not a production code path.
    pub async fn queue_snapshot(&self) -> Vec<(Uuid, TaskStatus)> {
        let mut out = Vec::new();
        for entry in self.tasks.iter() {
            let status = entry.value().task.read().await.status;
            out.push((*entry.key(), status));
        }
        out
    }
}

async fn run_task(record: Arc<TaskRecord>) {
    {
        let mut task = record.task.write().await;
        if task.status == TaskStatus::Cancelled {
            return;
        }
        task.status = TaskStatus::Processing;
        task.started_at = Some(Utc::now());
    }

    let optimized = {
        let task = record.task.read().await;
        task.optimized_duration_s
    };
    let stage_duration = std::time::Duration::from_secs_f64(optimized as f64 / STAGES.len() as f64);

    for (i, stage) in STAGES.iter().enumerate() {
        {
            let task = record.task.read().await;
            if task.status == TaskStatus::Cancelled {
                return;
            }
        }

        tokio::time::sleep(stage_duration).await;

        let progress = (((i + 1) as f64 / STAGES.len() as f64) * 100.0) as u8;
        let remaining = STAGES.len().saturating_sub(i + 1) as u64 * stage_duration.as_secs();

        let frame = {
            let mut task = record.task.write().await;
            if task.status == TaskStatus::Cancelled {
                return;
            }
            task.current_stage = Some(stage.to_string());
            task.progress = progress;
            task.progress_log.push(ProgressLogEntry {
                ts: Utc::now(),
                stage: stage.to_string(),
                progress,
            });

            ProgressFrame {
                frame_type: ProgressFrameType::ProgressUpdate,
                task_id: task.task_id,
                status: task.status,
                progress,
                current_stage: task.current_stage.clone(),
                timestamp: Utc::now(),
                remaining_s: Some(remaining),
            }
        };

        let _ = record.progress_tx.send(frame);
    }

    let final_frame = {
        let mut task = record.task.write().await;
        task.status = TaskStatus::Completed;
        task.progress = 100;
        task.completed_at = Some(Utc::now());

        ProgressFrame {
            frame_type: ProgressFrameType::TaskCompleted,
            task_id: task.task_id,
            status: task.status,
            progress: 100,
            current_stage: task.current_stage.clone(),
            timestamp: Utc::now(),
            remaining_s: Some(0),
        }
    };

    let _ = record.progress_tx.send(final_frame);
}

/// Maps an unknown tier string into a typed configuration error.
pub fn unknown_tier(raw: &str) -> GatewayError {
    GatewayError::configuration_error(format!("unknown scheduler tier: {raw}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn multipliers() -> ResourceMultipliers {
        ResourceMultipliers::default()
    }

    #[test]
    fn sizing_applies_tier_multiplier_and_floor() {
        let (estimated, optimized) = sizing(10, Tier::Standard, &multipliers(), 15);
        assert_eq!(estimated, 150);
        assert_eq!(optimized, 150); // multiplier 1.0, above floor

        let (_, optimized) = sizing(1, Tier::Enterprise, &multipliers(), 15);
        assert_eq!(optimized, MIN_DURATION_SECS); // floored
    }

    #[tokio::test]
    async fn s7_session_exclusivity_standard_tier() {
        let scheduler = TaskScheduler::new(multipliers(), 1);
        let r1 = scheduler
            .submit("t1", "u1", "s1", "op", 1, Tier::Standard)
            .await
            .unwrap();
        assert!(matches!(r1, SubmitResult::Accepted { .. }));

        let r2 = scheduler
            .submit("t1", "u1", "s1", "op", 1, Tier::Standard)
            .await
            .unwrap();
        match r2 {
            SubmitResult::Rejected { reason } => assert_eq!(reason, "session_busy"),
            _ => panic!("expected session_busy rejection"),
        }

        let r3 = scheduler
            .submit("t1", "u1", "s1", "op", 1, Tier::Premium)
            .await
            .unwrap();
        assert!(matches!(r3, SubmitResult::Accepted { .. }));
    }

    #[tokio::test]
    async fn cancel_marks_cancelled_before_completion() {
        let scheduler = TaskScheduler::new(multipliers(), 60);
        let SubmitResult::Accepted { task } = scheduler
            .submit("t1", "u1", "s1", "op", 10, Tier::Standard)
            .await
            .unwrap()
        else {
            panic!("expected acceptance");
        };

        assert!(scheduler.cancel(task.task_id).await);
        let fetched = scheduler.get(task.task_id).await.unwrap();
        assert_eq!(fetched.status, TaskStatus::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn progress_is_monotonic_and_terminates() {
        let scheduler = TaskScheduler::new(multipliers(), 1);
        let SubmitResult::Accepted { task } = scheduler
            .submit("t1", "u1", "s1", "op", 1, Tier::Standard)
            .await
            .unwrap()
        else {
            panic!("expected acceptance");
        };

        let mut rx = scheduler.subscribe(task.task_id).unwrap();
        let mut last_progress = 0u8;
        loop {
            tokio::time::advance(std::time::Duration::from_secs(5)).await;
            match rx.try_recv() {
                Ok(frame) => {
                    assert!(frame.progress >= last_progress);
                    last_progress = frame.progress;
                    if frame.frame_type == ProgressFrameType::TaskCompleted {
                        break;
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => continue,
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(e) => panic!("channel closed unexpectedly: {e:?}"),
            }
        }
        assert_eq!(last_progress, 100);
    }
}
