//! Advisory field-value plans from a natural-language collaborator.

use crate::captcha::{bounded_prefix, detect_captcha};
use crate::llm::ChatClient;
use crate::models::{RecipientProfile, SenderProfile, SubmissionPlan};
use crate::prompts::{PLAN_SYSTEM_PROMPT, build_plan_prompt, parse_plan};
use crate::vocabulary::Vocabulary;
use async_trait::async_trait;
use std::sync::Arc;

/// Everything the planner gets to see about one attempt.
#[derive(Debug, Clone)]
pub(crate) struct PlanInput<'a> {
    pub target_url: &'a str,
    pub html_snapshot: &'a str,
    pub message: &'a str,
    pub sender: &'a SenderProfile,
    pub recipient: &'a RecipientProfile,
}

/// Proposes a plan for one form. Never fails: `None` means "fill heuristically".
#[async_trait]
pub(crate) trait Planner: Send + Sync {
    async fn plan(&self, input: &PlanInput<'_>) -> Option<SubmissionPlan>;
}

/// Planner used when no collaborator is configured.
pub(crate) struct NoPlanner;

#[async_trait]
impl Planner for NoPlanner {
    async fn plan(&self, _input: &PlanInput<'_>) -> Option<SubmissionPlan> {
        None
    }
}

pub(crate) struct LlmPlanner {
    client: Option<ChatClient>,
    vocabulary: Arc<Vocabulary>,
    snippet_limit: usize,
}

impl LlmPlanner {
    pub(crate) fn new(
        client: Option<ChatClient>,
        vocabulary: Arc<Vocabulary>,
        snippet_limit: usize,
    ) -> Self {
        Self {
            client,
            vocabulary,
            snippet_limit,
        }
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn plan(&self, input: &PlanInput<'_>) -> Option<SubmissionPlan> {
        let Some(client) = &self.client else {
            tracing::info!(target: "planner", "No API key configured; skipping plan");
            return None;
        };

        let snippet = bounded_prefix(input.html_snapshot, self.snippet_limit);
        if detect_captcha(&self.vocabulary, snippet, self.snippet_limit) {
            tracing::info!(target: "planner", "CAPTCHA marker in snippet for {}; no plan", input.target_url);
            return None;
        }

        let prompt = build_plan_prompt(
            input.target_url,
            snippet,
            input.message,
            input.sender,
            input.recipient,
            self.snippet_limit,
        );
        let reply = match client.complete_json(PLAN_SYSTEM_PROMPT, &prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(target: "planner", "Plan request failed for {}: {}", input.target_url, e);
                return None;
            }
        };

        match parse_plan(&reply) {
            Ok(Some(plan)) => {
                tracing::info!(
                    target: "planner",
                    "Plan for {} covers {} fields",
                    input.target_url,
                    plan.fields.len()
                );
                Some(plan)
            }
            Ok(None) => {
                tracing::info!(target: "planner", "Collaborator reported a CAPTCHA on {}", input.target_url);
                None
            }
            Err(e) => {
                tracing::warn!(target: "planner", "Unusable plan for {}: {}", input.target_url, e);
                None
            }
        }
    }
}
