//! Step API handed to a running workflow.
//!
//! Every step is keyed by its name within the run. A step whose output is
//! already in the run-log is not executed again; its stored output is
//! returned instead. Sleeps are steps too: the first visit records the
//! wake-up instant and later visits only wait out what is left of it.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use super::store::WorkflowStore;
use super::WorkflowError;

pub struct WorkflowStep {
    run_id: String,
    store: WorkflowStore,
    completed: HashMap<String, serde_json::Value>,
}

impl WorkflowStep {
    /// Load the run-log of `run_id` so completed steps are replayed from it.
    pub async fn load(run_id: impl Into<String>, store: WorkflowStore) -> Result<Self, WorkflowError> {
        let run_id = run_id.into();
        let completed = store
            .load_steps(&run_id)
            .await?
            .into_iter()
            .map(|step| (step.name, step.output))
            .collect();
        Ok(Self {
            run_id,
            store,
            completed,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Run `f` once per run and persist its output under `name`.
    pub async fn do_step<T, F, Fut>(&mut self, name: &str, f: F) -> Result<T, WorkflowError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, WorkflowError>>,
    {
        if let Some(output) = self.completed.get(name) {
            tracing::debug!(run_id = %self.run_id, step = name, "Replaying completed step");
            return Ok(serde_json::from_value(output.clone())?);
        }

        let value = f().await.map_err(|e| WorkflowError::Step {
            step: name.to_string(),
            message: e.to_string(),
        })?;

        let output = serde_json::to_value(&value)?;
        let record = self.store.record_step(&self.run_id, name, &output).await?;
        tracing::info!(run_id = %self.run_id, step = name, "Workflow step completed");

        self.completed.insert(record.name, record.output);
        Ok(value)
    }

    /// Durable sleep: persists the wake-up instant, then waits until it.
    pub async fn sleep(&mut self, name: &str, duration: Duration) -> Result<(), WorkflowError> {
        let wake_at: DateTime<Utc> = match self.completed.get(name) {
            Some(output) => serde_json::from_value(output.clone())?,
            None => {
                let delta = chrono::Duration::from_std(duration)
                    .map_err(|e| WorkflowError::Step {
                        step: name.to_string(),
                        message: e.to_string(),
                    })?;
                let wake_at = Utc::now() + delta;
                let record = self
                    .store
                    .record_step(&self.run_id, name, &serde_json::to_value(wake_at)?)
                    .await?;
                self.completed.insert(record.name, record.output.clone());
                serde_json::from_value(record.output)?
            }
        };

        let remaining = (wake_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        tracing::debug!(
            run_id = %self.run_id,
            step = name,
            remaining_ms = remaining.as_millis() as u64,
            "Workflow sleeping"
        );
        if !remaining.is_zero() {
            tokio::time::sleep(remaining).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn step_for(run_id: &str) -> (WorkflowStep, WorkflowStore) {
        let store = WorkflowStore::new(connect_in_memory().await.unwrap());
        store.insert_run(run_id, "test", &json!({})).await.unwrap();
        (WorkflowStep::load(run_id, store.clone()).await.unwrap(), store)
    }

    #[tokio::test]
    async fn test_do_step_runs_once_per_name() {
        let (mut step, store) = step_for("r1").await;
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        let first: String = step
            .do_step("greet", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("hello".to_string())
            })
            .await
            .unwrap();

        // A fresh step handle replays from the run-log.
        let mut replay = WorkflowStep::load("r1", store).await.unwrap();
        let second: String = replay
            .do_step("greet", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("different".to_string())
            })
            .await
            .unwrap();

        assert_eq!(first, "hello");
        assert_eq!(second, "hello");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_step_is_not_recorded() {
        let (mut step, store) = step_for("r2").await;

        let err = step
            .do_step::<String, _, _>("explode", || async {
                Err(WorkflowError::Corrupt("boom".to_string()))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, WorkflowError::Step { ref step, .. } if step == "explode"));
        assert!(store.load_steps("r2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sleep_records_wake_time() {
        let (mut step, store) = step_for("r3").await;
        let before = Utc::now();

        step.sleep("nap", Duration::from_millis(20)).await.unwrap();

        let steps = store.load_steps("r3").await.unwrap();
        assert_eq!(steps.len(), 1);
        let wake_at: DateTime<Utc> = serde_json::from_value(steps[0].output.clone()).unwrap();
        assert!(wake_at >= before + chrono::Duration::milliseconds(20));
        assert!(Utc::now() >= wake_at);
    }

    #[tokio::test]
    async fn test_sleep_past_wake_time_returns_immediately() {
        let (_, store) = step_for("r4").await;
        let past = Utc::now() - chrono::Duration::seconds(60);
        store.record_step("r4", "nap", &json!(past)).await.unwrap();

        let mut step = WorkflowStep::load("r4", store).await.unwrap();
        let started = std::time::Instant::now();
        step.sleep("nap", Duration::from_secs(30)).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
