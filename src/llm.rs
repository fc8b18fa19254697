//! Minimal OpenAI-compatible chat-completions client.

use crate::config::Config;
use crate::error::{AppError, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize, Debug)]
struct ChatResponseRaw {
    choices: Vec<ChoiceRaw>,
}

#[derive(Deserialize, Debug)]
struct ChoiceRaw {
    message: MessageRaw,
}

#[derive(Deserialize, Debug)]
struct MessageRaw {
    #[serde(default)]
    content: Option<String>,
}

/// Chat client used by both the planner and the judge.
#[derive(Clone)]
pub(crate) struct ChatClient {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl ChatClient {
    /// Returns `None` when no API key is configured.
    pub(crate) fn from_config(config: &Config) -> Result<Option<Self>> {
        let Some(api_key) = config
            .llm_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
        else {
            return Ok(None);
        };
        let http = Client::builder()
            .timeout(config.llm_timeout)
            .build()
            .map_err(|e| AppError::Llm(format!("Failed to build client: {}", e)))?;
        Ok(Some(Self {
            http,
            api_key: api_key.to_string(),
            base_url: config.llm_base_url.trim_end_matches('/').to_string(),
            model: config.llm_model.clone(),
        }))
    }

    /// Sends one system+user exchange and returns the reply text, asking for a JSON object.
    pub(crate) async fn complete_json(&self, system: &str, user: &str) -> Result<String> {
        let start = std::time::Instant::now();
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(target: "planner", "LLM request failed: {}", e);
                AppError::Llm(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::warn!(target: "planner", "LLM API error {}: {}", status, error_text);
            return Err(AppError::Llm(format!("API error {}: {}", status, error_text)));
        }

        let raw: ChatResponseRaw = response
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Unreadable response: {}", e)))?;

        let content = raw
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::Llm("Empty response".to_string()))?;

        tracing::debug!(
            target: "planner",
            "LLM completion from {} in {}ms",
            self.model,
            start.elapsed().as_millis()
        );
        Ok(content)
    }
}
