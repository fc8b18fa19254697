//! Prompt assembly and tolerant parsing of model replies.

use crate::captcha::bounded_prefix;
use crate::error::{AppError, Result};
use crate::models::{RecipientProfile, SenderProfile, SubmissionPlan};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)```").unwrap());

pub(crate) const PLAN_SYSTEM_PROMPT: &str = "You fill in website contact forms for B2B outreach. \
Answer with a single JSON object and nothing else.";

pub(crate) const JUDGE_SYSTEM_PROMPT: &str = "You decide whether a contact form submission succeeded \
by reading the page shown after submitting. Answer with a single JSON object and nothing else.";

/// Builds the user prompt asking for a field-name to value plan.
pub(crate) fn build_plan_prompt(
    target_url: &str,
    html: &str,
    message: &str,
    sender: &SenderProfile,
    recipient: &RecipientProfile,
    snippet_limit: usize,
) -> String {
    let sender_json = serde_json::to_string_pretty(sender).unwrap_or_else(|_| "{}".to_string());
    let recipient_json =
        serde_json::to_string_pretty(recipient).unwrap_or_else(|_| "{}".to_string());
    format!(
        r#"Contact form URL: {target_url}

HTML of the page (possibly truncated):
<html_snippet>
{snippet}
</html_snippet>

Sender (fill the form with these details):
{sender_json}

Recipient company:
{recipient_json}

Message to put into the inquiry body:
<message>
{message}
</message>

Return JSON of the form:
{{"method": "GET" | "POST", "action": "<form action URL>", "fields": {{"<input name>": "<value>"}}}}

Rules:
- Use the exact `name` attributes of the form controls as keys in "fields".
- Put the message into the inquiry/body textarea.
- For selects, radios and checkboxes give the option value to choose; agree to privacy/consent checkboxes.
- If the page shows a CAPTCHA (reCAPTCHA, hCaptcha or similar), return {{"captcha": true}} and nothing else."#,
        snippet = bounded_prefix(html, snippet_limit),
    )
}

/// Builds the user prompt asking whether the final page shows success.
pub(crate) fn build_judge_prompt(url: &str, html: &str, snippet_limit: usize) -> String {
    format!(
        r#"Page URL after submitting: {url}

HTML of the page (possibly truncated):
<html_snippet>
{snippet}
</html_snippet>

Return JSON: {{"status": "success" | "failure" | "unknown", "reason": "<short explanation>"}}
Use "success" only if the page clearly confirms the inquiry was received, "failure" only if it clearly shows a validation or sending error."#,
        snippet = bounded_prefix(html, snippet_limit),
    )
}

/// Extracts the first JSON object from a reply, ignoring code fences and surrounding prose.
pub(crate) fn extract_json_object(reply: &str) -> Option<&str> {
    let body = CODE_FENCE
        .captures(reply)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(reply);

    let start = body.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in body[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&body[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

#[derive(Deserialize)]
struct PlanReply {
    #[serde(default)]
    captcha: bool,
    #[serde(flatten)]
    plan: SubmissionPlan,
}

/// Parses a planning reply. `Ok(None)` means the model reported a CAPTCHA.
pub(crate) fn parse_plan(reply: &str) -> Result<Option<SubmissionPlan>> {
    let json = extract_json_object(reply)
        .ok_or_else(|| AppError::Llm("No JSON object in planner reply".to_string()))?;
    let parsed: PlanReply = serde_json::from_str(json)
        .map_err(|e| AppError::Llm(format!("Malformed plan: {}", e)))?;
    if parsed.captcha {
        return Ok(None);
    }
    Ok(Some(parsed.plan))
}

/// What the judging assistant answered.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub(crate) struct AssistantVerdict {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub reason: Option<String>,
}

pub(crate) fn parse_verdict(reply: &str) -> Result<AssistantVerdict> {
    let json = extract_json_object(reply)
        .ok_or_else(|| AppError::Llm("No JSON object in judge reply".to_string()))?;
    serde_json::from_str(json).map_err(|e| AppError::Llm(format!("Malformed verdict: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HttpMethod;

    #[test]
    fn test_extract_from_fenced_reply() {
        let reply = "Here you go:\n```json\n{\"status\": \"success\", \"reason\": \"thanks {page}\"}\n```";
        assert_eq!(
            extract_json_object(reply),
            Some("{\"status\": \"success\", \"reason\": \"thanks {page}\"}")
        );
    }

    #[test]
    fn test_extract_nested_object_with_prose() {
        let reply = r#"Sure. {"fields": {"a": "b"}} trailing"#;
        assert_eq!(extract_json_object(reply), Some(r#"{"fields": {"a": "b"}}"#));
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("{ unterminated"), None);
    }

    #[test]
    fn test_parse_plan() {
        let plan = parse_plan(r#"{"method":"POST","action":"/send","fields":{"email":"a@b.com"}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(plan.method, HttpMethod::Post);
        assert_eq!(plan.fields.len(), 1);

        assert_eq!(parse_plan(r#"{"captcha": true}"#).unwrap(), None);
        assert!(parse_plan("I cannot help with that").is_err());
    }

    #[test]
    fn test_parse_verdict() {
        let verdict = parse_verdict(r#"{"status":"failure","reason":"required field"}"#).unwrap();
        assert_eq!(verdict.status, "failure");
        assert_eq!(verdict.reason.as_deref(), Some("required field"));
    }

    #[test]
    fn test_prompts_bound_the_snippet() {
        let html = "あ".repeat(100);
        let prompt = build_judge_prompt("https://example.com/thanks", &html, 30);
        assert!(prompt.contains(&"あ".repeat(10)));
        assert!(!prompt.contains(&"あ".repeat(11)));

        let prompt = build_plan_prompt(
            "https://example.com/contact",
            "<form></form>",
            "hello",
            &SenderProfile::default(),
            &RecipientProfile::default(),
            20_000,
        );
        assert!(prompt.contains("<form></form>"));
        assert!(prompt.contains("hello"));
    }
}
