//! Interview workflow: question, wait, evaluate, persist.

use async_trait::async_trait;
use shared_types::{InterviewEvaluation, DEFAULT_ROLE};
use std::time::Duration;

use super::{Workflow, WorkflowError, WorkflowEvent, WorkflowStep};

pub const INTERVIEW_WORKFLOW: &str = "interview";

pub const STEP_GENERATE_QUESTION: &str = "generate question";
pub const STEP_WAIT_FOR_ANSWER: &str = "wait for answer";
pub const STEP_EVALUATE: &str = "evaluate";
pub const STEP_PERSIST: &str = "persist";

#[derive(Debug, Clone)]
pub struct InterviewWorkflow {
    answer_wait: Duration,
}

impl InterviewWorkflow {
    pub fn new(answer_wait: Duration) -> Self {
        Self { answer_wait }
    }
}

impl Default for InterviewWorkflow {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

/// `role` from the run params; absent, blank or non-string counts as default.
pub fn interview_role(params: &serde_json::Value) -> String {
    match params.get("role").and_then(|v| v.as_str()) {
        Some(role) if !role.is_empty() => role.to_string(),
        _ => DEFAULT_ROLE.to_string(),
    }
}

pub fn opening_question(role: &str) -> String {
    format!("What's a recent project where you used {role} skills?")
}

#[async_trait]
impl Workflow for InterviewWorkflow {
    fn name(&self) -> &str {
        INTERVIEW_WORKFLOW
    }

    async fn run(
        &self,
        event: WorkflowEvent,
        step: &mut WorkflowStep,
    ) -> Result<serde_json::Value, WorkflowError> {
        let role = interview_role(&event.params);

        let question = opening_question(&role);
        step.do_step(STEP_GENERATE_QUESTION, || async move { Ok(question) })
            .await?;

        step.sleep(STEP_WAIT_FOR_ANSWER, self.answer_wait).await?;

        // Placeholder scoring
        let evaluation = step
            .do_step(STEP_EVALUATE, || async {
                Ok(InterviewEvaluation {
                    score: 4,
                    pros: "Clear structure".to_string(),
                    cons: "Could be more specific".to_string(),
                })
            })
            .await?;

        let persisted = step
            .do_step(STEP_PERSIST, || async move { Ok(evaluation) })
            .await?;

        Ok(serde_json::to_value(persisted)?)
    }
}
