//! Defines the core data structures used in the form-courier application.

use crate::dom::FormScope;
use crate::error::ErrorKind;
use crate::locator::LocateStrategy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// The company sending the outreach. Every attribute is optional.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub(crate) struct SenderProfile {
    pub company: Option<String>,
    pub last_name: Option<String>,
    pub first_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub postal_code: Option<String>,
    pub prefecture: Option<String>,
    pub address: Option<String>,
    pub website: Option<String>,
}

impl SenderProfile {
    /// "Last First", skipping whichever part is missing.
    pub(crate) fn full_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.last_name.as_deref(), self.first_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

/// The prospect being contacted, as produced by the discovery pipeline.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub(crate) struct RecipientProfile {
    pub contact_form_url: Option<String>,
    pub company_name: Option<String>,
    pub website: Option<String>,
    pub industry: Option<String>,
    pub prefecture: Option<String>,
}

/// Immutable input for one outreach attempt.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub(crate) struct SubmissionRequest {
    pub target_url: String,
    /// Pre-fetched HTML for the planner; the live page is used when absent.
    #[serde(default)]
    pub page_html_snapshot: Option<String>,
    pub message_body: String,
    #[serde(default)]
    pub sender: SenderProfile,
    #[serde(default)]
    pub recipient: RecipientProfile,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub(crate) enum HttpMethod {
    #[default]
    Get,
    Post,
}

/// Advisory field-name to value mapping proposed for one specific form.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub(crate) struct SubmissionPlan {
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

/// Values used to fill fields that the plan does not cover.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub(crate) struct AutoFillProfile {
    pub company: String,
    pub full_name: String,
    pub last_name: String,
    pub first_name: String,
    pub email: String,
    pub phone: String,
    pub postal: String,
    pub prefecture: String,
    pub address: String,
    pub subject: String,
    pub message: String,
}

impl AutoFillProfile {
    /// Overlays the sender's details and the rendered message on top of the fallback record.
    pub(crate) fn for_request(fallback: &AutoFillProfile, request: &SubmissionRequest) -> Self {
        let pick = |value: Option<&String>, default: &str| {
            value
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .unwrap_or(default)
                .to_string()
        };
        let sender = &request.sender;
        let full_name = sender.full_name().unwrap_or_else(|| fallback.full_name.clone());

        AutoFillProfile {
            company: pick(sender.company.as_ref(), &fallback.company),
            full_name,
            last_name: pick(sender.last_name.as_ref(), &fallback.last_name),
            first_name: pick(sender.first_name.as_ref(), &fallback.first_name),
            email: pick(sender.email.as_ref(), &fallback.email),
            phone: pick(sender.phone.as_ref(), &fallback.phone),
            postal: pick(sender.postal_code.as_ref(), &fallback.postal),
            prefecture: pick(sender.prefecture.as_ref(), &fallback.prefecture),
            address: pick(sender.address.as_ref(), &fallback.address),
            subject: fallback.subject.clone(),
            message: pick(Some(&request.message_body), &fallback.message),
        }
    }
}

/// Page-wide structural counts, summed over every rendering context.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct StructuralCensus {
    pub forms: usize,
    pub inputs: usize,
    pub meaningful_inputs: usize,
    pub selects: usize,
    pub checkboxes: usize,
    pub textareas: usize,
    pub has_send_control: bool,
}

impl std::ops::AddAssign for StructuralCensus {
    fn add_assign(&mut self, other: Self) {
        self.forms += other.forms;
        self.inputs += other.inputs;
        self.meaningful_inputs += other.meaningful_inputs;
        self.selects += other.selects;
        self.checkboxes += other.checkboxes;
        self.textareas += other.textareas;
        self.has_send_control |= other.has_send_control;
    }
}

/// Filled-versus-total counts for the chosen form only.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct FillCensus {
    pub text_total: usize,
    pub text_filled: usize,
    pub textarea_total: usize,
    pub textarea_filled: usize,
    pub select_total: usize,
    pub select_filled: usize,
    pub checkbox_total: usize,
    pub checkbox_checked: usize,
    pub radio_total: usize,
    pub radio_checked: usize,
}

/// What the autofill passes did to the form.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub(crate) struct FillReport {
    pub plan_fields_applied: usize,
    pub plan_fields_missing: Vec<String>,
    pub heuristic_filled: usize,
    pub failures: usize,
    pub census: FillCensus,
}

/// Result of one click attempt.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ActionOutcome {
    pub clicked: bool,
    pub clicked_confirm: bool,
    pub clicked_submit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub navigated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub(crate) enum JudgeVerdict {
    Success,
    Failure,
    Unknown,
}

/// Which tier of the judge produced the verdict.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub(crate) enum VerdictSource {
    Keyword,
    Assistant,
    KeywordFallback,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub(crate) struct Judgement {
    pub verdict: JudgeVerdict,
    pub source: VerdictSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub success_hits: Vec<String>,
    pub error_hits: Vec<String>,
}

/// Pipeline stage names used in the debug report.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub(crate) enum Stage {
    Session,
    Load,
    Captcha,
    BaselineCensus,
    Locate,
    Plan,
    Autofill,
    PostFillCensus,
    Confirm,
    Submit,
    Judge,
}

/// Tagged result of a single pipeline step.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub(crate) enum StepOutcome {
    Ok(String),
    Skipped(String),
    Failed(String),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub(crate) struct StageRecord {
    pub stage: Stage,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

/// Summary of the located fill target.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub(crate) struct TargetSummary {
    pub scope: FormScope,
    pub strategy: LocateStrategy,
    pub frame_url: String,
    pub meaningful_controls: usize,
}

/// Everything the caller needs to understand what happened, stage by stage.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub(crate) struct DebugReport {
    pub target_url: String,
    pub captcha_detected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_census: Option<StructuralCensus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_fill_census: Option<StructuralCensus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<TargetSummary>,
    pub plan_used: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<SubmissionPlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill: Option<FillReport>,
    pub actions: Vec<ActionOutcome>,
    pub clicked_confirm: bool,
    pub clicked_submit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub judgement: Option<Judgement>,
    /// The condition that ended the attempt early, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Non-fatal degradations that happened along the way.
    pub degraded: Vec<ErrorKind>,
    pub stages: Vec<StageRecord>,
    pub elapsed_ms: u64,
}

impl DebugReport {
    pub(crate) fn new(target_url: &str) -> Self {
        DebugReport {
            target_url: target_url.to_string(),
            ..Default::default()
        }
    }

    pub(crate) fn record(&mut self, stage: Stage, outcome: StepOutcome) {
        self.stages.push(StageRecord { stage, outcome });
    }

    pub(crate) fn ok(&mut self, stage: Stage, detail: impl Into<String>) {
        self.record(stage, StepOutcome::Ok(detail.into()));
    }

    pub(crate) fn skipped(&mut self, stage: Stage, reason: impl Into<String>) {
        self.record(stage, StepOutcome::Skipped(reason.into()));
    }

    /// Records a failed stage and marks it as the reason the attempt stopped.
    pub(crate) fn fail(&mut self, stage: Stage, kind: ErrorKind, error: impl Into<String>) {
        self.record(stage, StepOutcome::Failed(error.into()));
        self.error_kind = Some(kind);
    }

    pub(crate) fn degrade(&mut self, kind: ErrorKind) {
        if !self.degraded.contains(&kind) {
            self.degraded.push(kind);
        }
    }

    #[cfg(test)]
    pub(crate) fn outcome_of(&self, stage: Stage) -> Option<&StepOutcome> {
        self.stages
            .iter()
            .rev()
            .find(|r| r.stage == stage)
            .map(|r| &r.outcome)
    }

    pub(crate) fn verdict(&self) -> Option<JudgeVerdict> {
        self.judgement.as_ref().map(|j| j.verdict)
    }
}

/// The only artifact returned to the caller of the engine.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub(crate) struct SubmissionResult {
    pub ok: bool,
    pub final_url: String,
    pub final_html: String,
    pub debug_report: DebugReport,
}

/// Input record for batch processing (one prospect per record).
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub(crate) struct OutreachJob {
    #[serde(default)]
    pub recipient: RecipientProfile,
    #[serde(default)]
    pub sender: SenderProfile,
    /// Message text; may contain `{company_name}`-style placeholders.
    #[serde(default)]
    pub message_template: String,
    /// An already-computed plan, bypassing the planner.
    #[serde(default)]
    pub plan: Option<SubmissionPlan>,
    /// Pre-fetched HTML handed to the planner instead of the live page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_html_snapshot: Option<String>,
    // Allow capturing other fields from the input JSON
    #[serde(flatten)]
    pub other_fields: HashMap<String, serde_json::Value>,
}

/// Represents the final output structure for each record, combining input and results.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub(crate) struct ProcessingResult {
    #[serde(flatten)]
    pub job_input: OutreachJob,

    /// The engine's result. Absent when the record was skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission: Option<SubmissionResult>,
    /// Convenience mirror of `submission.ok`.
    pub submitted: bool,
    /// Convenience mirror of the judge's verdict.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<JudgeVerdict>,

    /// Flag indicating if the record was skipped due to missing input.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    #[serde(default)]
    pub submission_skipped: bool,
    /// Reason why the record was skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_skip_reason: Option<String>,
}
