use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use discovery_core::{Clock, DiscoveryError, RunRecord, RunState, StrategyConfig};
use discovery_orchestrator::Orchestrator;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Default bound on outstanding queued-but-unstarted runs (§5 Backpressure).
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

pub struct QueuedJob {
    run_id: Uuid,
    strategy_id: String,
}

/// Decouples the HTTP trigger from execution. Registered strategies run at
/// most one active (`queued`/`running`) job at a time; a second trigger for
/// the same strategy returns the existing `run_id` instead of enqueuing a
/// duplicate. Grounded on this corpus's `DashMap`-backed task registry,
/// generalized from a DB-reconciliation loop into an explicit bounded FIFO
/// queue with one `RunRecord` per unit of work.
pub struct JobRunner {
    records: DashMap<Uuid, RunRecord>,
    active: DashMap<String, Uuid>,
    sender: mpsc::Sender<QueuedJob>,
}

impl JobRunner {
    /// Builds the runner and returns the receiving half of its queue; the
    /// caller spawns `run_worker` on that receiver (kept separate so
    /// construction never implicitly starts a background task).
    pub fn new(queue_capacity: usize) -> (Arc<Self>, mpsc::Receiver<QueuedJob>) {
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        (
            Arc::new(Self {
                records: DashMap::new(),
                active: DashMap::new(),
                sender,
            }),
            receiver,
        )
    }

    /// `limit` is accepted for signature fidelity with the HTTP trigger
    /// (`POST /discovery/trigger?strategy={id}&limit={n}`) but isn't
    /// consumed here - it bounds the response the facade later serves from
    /// the cache, not the run itself. Returns `(run_id, newly_enqueued)`.
    pub fn enqueue(
        &self,
        strategy_id: &str,
        _limit: usize,
        now: DateTime<Utc>,
    ) -> Result<(Uuid, bool), DiscoveryError> {
        if let Some(existing) = self.active.get(strategy_id) {
            let run_id = *existing;
            drop(existing);
            if let Some(record) = self.records.get(&run_id) {
                if matches!(record.state, RunState::Queued | RunState::Running) {
                    return Ok((run_id, false));
                }
            }
        }

        let run_id = Uuid::new_v4();
        self.sender
            .try_send(QueuedJob {
                run_id,
                strategy_id: strategy_id.to_string(),
            })
            .map_err(|_| DiscoveryError::QueueBusy)?;

        self.records.insert(run_id, RunRecord::new(run_id, strategy_id, now));
        self.active.insert(strategy_id.to_string(), run_id);
        info!(%run_id, strategy_id, "run enqueued");
        Ok((run_id, true))
    }

    pub fn poll(&self, run_id: Uuid) -> Result<RunRecord, DiscoveryError> {
        self.records
            .get(&run_id)
            .map(|r| r.clone())
            .ok_or(DiscoveryError::UnknownRun(run_id))
    }

    pub fn queue_depth(&self) -> usize {
        self.active.len()
    }

    /// Drains the queue one job at a time, runs the orchestrator to
    /// completion (including its own timeout handling), records the final
    /// `RunRecord`, and frees the strategy for its next trigger. Never
    /// retries a failed or timed-out run.
    pub async fn run_worker(
        self: Arc<Self>,
        orchestrator: Arc<Orchestrator>,
        strategies: Arc<HashMap<String, StrategyConfig>>,
        mut receiver: mpsc::Receiver<QueuedJob>,
        clock: Arc<dyn Clock>,
    ) {
        while let Some(job) = receiver.recv().await {
            match strategies.get(&job.strategy_id) {
                Some(strategy) => {
                    let now = clock.now();
                    let record = orchestrator.run(strategy, job.run_id, now).await;
                    info!(run_id = %job.run_id, state = ?record.state, "run finished");
                    self.records.insert(job.run_id, record);
                }
                None => {
                    warn!(strategy_id = %job.strategy_id, "enqueued run references unknown strategy");
                    if let Some(mut record) = self.records.get_mut(&job.run_id) {
                        record.state = RunState::Failed;
                        record.error = Some(format!("unknown strategy '{}'", job.strategy_id));
                        record.finished_at = Some(clock.now());
                    }
                }
            }
            self.active.remove(&job.strategy_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_is_idempotent_while_run_is_active() {
        let (runner, _receiver) = JobRunner::new(DEFAULT_QUEUE_CAPACITY);
        let now = Utc::now();

        let (first_id, first_new) = runner.enqueue("default", 10, now).unwrap();
        assert!(first_new);

        let (second_id, second_new) = runner.enqueue("default", 25, now).unwrap();
        assert_eq!(first_id, second_id);
        assert!(!second_new);
    }

    #[test]
    fn poll_unknown_run_is_an_error() {
        let (runner, _receiver) = JobRunner::new(DEFAULT_QUEUE_CAPACITY);
        let err = runner.poll(Uuid::new_v4()).unwrap_err();
        assert_eq!(err.code(), "unknown_run");
    }

    #[test]
    fn enqueue_fills_queue_then_rejects() {
        let (runner, _receiver) = JobRunner::new(1);
        let now = Utc::now();
        runner.enqueue("a", 10, now).unwrap();
        let err = runner.enqueue("b", 10, now).unwrap_err();
        assert_eq!(err.code(), "queue_busy");
    }

    #[test]
    fn enqueue_records_queued_state_up_front() {
        let (runner, _receiver) = JobRunner::new(DEFAULT_QUEUE_CAPACITY);
        let (run_id, _) = runner.enqueue("default", 10, Utc::now()).unwrap();
        assert_eq!(runner.poll(run_id).unwrap().state, RunState::Queued);
    }
}
