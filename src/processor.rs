//! Functions for processing individual outreach records.

use crate::domain::normalize_url;
use crate::models::{OutreachJob, ProcessingResult, SubmissionRequest};
use crate::submitter::FormSubmitter;
use std::sync::Arc;

/// Fills `{placeholder}` tokens in a message template from the job's profiles.
/// Unknown tokens are left untouched; known tokens without a value become empty.
pub(crate) fn render_message(template: &str, job: &OutreachJob) -> String {
    let value = |v: &Option<String>| v.as_deref().unwrap_or("").trim().to_string();
    let recipient = &job.recipient;
    let sender = &job.sender;
    let replacements = [
        ("{company_name}", value(&recipient.company_name)),
        ("{industry}", value(&recipient.industry)),
        ("{prefecture}", value(&recipient.prefecture)),
        ("{website}", value(&recipient.website)),
        ("{sender_company}", value(&sender.company)),
        ("{sender_name}", sender.full_name().unwrap_or_default()),
    ];

    replacements
        .iter()
        .fold(template.to_string(), |message, (token, value)| {
            message.replace(token, value)
        })
}

fn skipped(job: OutreachJob, reason: String) -> ProcessingResult {
    ProcessingResult {
        job_input: job,
        submission: None,
        submitted: false,
        verdict: None,
        submission_skipped: true,
        submission_skip_reason: Some(reason),
    }
}

/// Processes a single outreach record: validate, render the message, submit.
///
/// Never fails; problems with the record are reported as a skip reason.
pub(crate) async fn process_job(submitter: Arc<FormSubmitter>, job: OutreachJob) -> ProcessingResult {
    let record_id = job
        .recipient
        .company_name
        .as_deref()
        .or(job.recipient.contact_form_url.as_deref())
        .unwrap_or("Unknown Record")
        .to_string();
    tracing::info!(target: "submit_task", "[{}] Starting processing.", record_id);

    let url_input = job
        .recipient
        .contact_form_url
        .as_deref()
        .unwrap_or("")
        .trim()
        .to_string();

    let mut missing_parts = Vec::new();
    if url_input.is_empty() {
        missing_parts.push("contact form URL");
    }
    if job.message_template.trim().is_empty() {
        missing_parts.push("message");
    }
    if !missing_parts.is_empty() {
        let reason = format!("Missing {}", missing_parts.join(", "));
        tracing::warn!(target: "submit_task", "[{}] Skipping record. Reason: {}", record_id, reason);
        return skipped(job, reason);
    }

    let target_url = match normalize_url(&url_input) {
        Ok(url) => url,
        Err(e) => {
            let reason = format!("Invalid contact form URL '{}': {}", url_input, e);
            tracing::warn!(target: "submit_task", "[{}] Skipping record. Reason: {}", record_id, reason);
            return skipped(job, reason);
        }
    };

    let request = SubmissionRequest {
        target_url: target_url.to_string(),
        page_html_snapshot: job.page_html_snapshot.clone(),
        message_body: render_message(&job.message_template, &job),
        sender: job.sender.clone(),
        recipient: job.recipient.clone(),
    };

    let result = submitter.submit(&request, job.plan.clone()).await;
    let verdict = result.debug_report.verdict();
    if result.ok {
        tracing::info!(target: "submit_task", "[{}] ✓ Submitted (verdict {:?}).", record_id, verdict);
    } else {
        tracing::info!(
            target: "submit_task",
            "[{}] ✗ Not submitted (verdict {:?}, error {:?}).",
            record_id,
            verdict,
            result.debug_report.error_kind
        );
    }

    ProcessingResult {
        job_input: job,
        submitted: result.ok,
        verdict,
        submission: Some(result),
        submission_skipped: false,
        submission_skip_reason: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::{RecipientProfile, SenderProfile};

    fn job() -> OutreachJob {
        OutreachJob {
            recipient: RecipientProfile {
                contact_form_url: Some("example.com/contact".to_string()),
                company_name: Some("株式会社サンプル".to_string()),
                industry: Some("製造業".to_string()),
                ..Default::default()
            },
            sender: SenderProfile {
                company: Some("株式会社テスト".to_string()),
                last_name: Some("山田".to_string()),
                first_name: Some("太郎".to_string()),
                ..Default::default()
            },
            message_template: "{company_name} ご担当者様\n{industry}向けのご提案です。{sender_company} {sender_name} {unknown}".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_render_message() {
        let job = job();
        let message = render_message(&job.message_template, &job);
        assert_eq!(
            message,
            "株式会社サンプル ご担当者様\n製造業向けのご提案です。株式会社テスト 山田 太郎 {unknown}"
        );
    }

    #[test]
    fn test_render_message_with_missing_values() {
        let job = OutreachJob::default();
        assert_eq!(render_message("Dear {company_name}team", &job), "Dear team");
    }

    #[tokio::test]
    async fn test_skips_record_without_url_or_message() {
        let submitter = Arc::new(FormSubmitter::new(Arc::new(Config::default())).unwrap());
        let mut record = job();
        record.recipient.contact_form_url = None;
        record.message_template = "  ".to_string();

        let result = process_job(submitter, record).await;
        assert!(result.submission_skipped);
        assert!(!result.submitted);
        assert_eq!(
            result.submission_skip_reason.as_deref(),
            Some("Missing contact form URL, message")
        );
    }

    #[tokio::test]
    async fn test_skips_record_with_bad_url() {
        let submitter = Arc::new(FormSubmitter::new(Arc::new(Config::default())).unwrap());
        let mut record = job();
        record.recipient.contact_form_url = Some("http://".to_string());
        let result = process_job(submitter, record).await;
        assert!(result.submission_skipped);
        assert!(result.submission.is_none());
    }

    #[test]
    fn test_result_serializes_flat() {
        let result = skipped(job(), "Missing message".to_string());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["recipient"]["company_name"], "株式会社サンプル");
        assert_eq!(json["submission_skipped"], true);
        assert!(json.get("submission").is_none());
    }
}
