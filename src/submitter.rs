//! Runs one contact-form submission attempt end to end.
//!
//! Load, CAPTCHA gate, census, locate, plan, fill, census again, click twice, judge.
//! Nothing escapes as an error or panic: every stage leaves a tagged record in the
//! debug report, and the browsing session is closed on every path.

use crate::autofill::autofill;
use crate::browser::CdpSessionFactory;
use crate::captcha::captcha_markers;
use crate::census::collect_census;
use crate::config::{BrowserBackend, Config};
use crate::dom::FormScope;
use crate::domain::{display_host, normalize_url};
use crate::error::{ErrorKind, Result};
use crate::judge::{JudgeAssistant, LlmJudge, OutcomeJudge};
use crate::llm::ChatClient;
use crate::locator::locate_target;
use crate::models::{
    AutoFillProfile, DebugReport, JudgeVerdict, Stage, StepOutcome, SubmissionPlan,
    SubmissionRequest, SubmissionResult, TargetSummary,
};
use crate::planner::{LlmPlanner, NoPlanner, PlanInput, Planner};
use crate::session::{BrowsingSession, HttpSessionFactory, SessionFactory};
use crate::trigger::ClickSequence;
use crate::vocabulary::Vocabulary;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

/// Holds the shared collaborators used by every submission attempt.
pub(crate) struct FormSubmitter {
    config: Arc<Config>,
    vocabulary: Arc<Vocabulary>,
    sessions: Arc<dyn SessionFactory>,
    planner: Arc<dyn Planner>,
    judge: OutcomeJudge,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

impl FormSubmitter {
    /// Wires the configured session factory and, when an API key is configured, the LLM
    /// planner and judge.
    pub(crate) fn new(config: Arc<Config>) -> Result<Self> {
        let vocabulary = Arc::new(config.vocabulary());
        let client = ChatClient::from_config(&config)?;

        let planner: Arc<dyn Planner> = if config.planner_enabled {
            Arc::new(LlmPlanner::new(
                client.clone(),
                vocabulary.clone(),
                config.snippet_limit,
            ))
        } else {
            Arc::new(NoPlanner)
        };
        let assistant: Option<Arc<dyn JudgeAssistant>> = match client {
            Some(client) if config.judge_assistant_enabled => {
                Some(Arc::new(LlmJudge::new(client, config.snippet_limit)))
            }
            _ => None,
        };
        let sessions: Arc<dyn SessionFactory> = match config.browser_backend {
            BrowserBackend::Http => Arc::new(HttpSessionFactory::new(config.clone())),
            BrowserBackend::Chromium => Arc::new(CdpSessionFactory::new(config.clone())),
        };

        Ok(Self::with_parts(config, vocabulary, sessions, planner, assistant))
    }

    pub(crate) fn with_parts(
        config: Arc<Config>,
        vocabulary: Arc<Vocabulary>,
        sessions: Arc<dyn SessionFactory>,
        planner: Arc<dyn Planner>,
        assistant: Option<Arc<dyn JudgeAssistant>>,
    ) -> Self {
        let judge = OutcomeJudge::new(vocabulary.clone(), assistant, config.snippet_limit);
        Self {
            config,
            vocabulary,
            sessions,
            planner,
            judge,
        }
    }

    /// Attempts one submission. `plan` overrides the planner when given.
    pub(crate) async fn submit(
        &self,
        request: &SubmissionRequest,
        plan: Option<SubmissionPlan>,
    ) -> SubmissionResult {
        let start = Instant::now();
        let mut report = DebugReport::new(&request.target_url);

        let mut session = match self.sessions.open_session().await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(target: "submit_task", "Could not open a browsing session: {}", e);
                report.fail(Stage::Session, ErrorKind::Unexpected, e.to_string());
                report.elapsed_ms = start.elapsed().as_millis() as u64;
                return SubmissionResult {
                    ok: false,
                    final_url: request.target_url.clone(),
                    final_html: String::new(),
                    debug_report: report,
                };
            }
        };

        let pipeline = self.run_pipeline(&mut session, request, plan, &mut report);
        if let Err(payload) = AssertUnwindSafe(pipeline).catch_unwind().await {
            let message = panic_message(payload.as_ref());
            tracing::error!(target: "submit_task", "Submission pipeline panicked: {}", message);
            report.fail(Stage::Session, ErrorKind::Unexpected, format!("panic: {}", message));
        }

        let (final_url, final_html) = match session.page() {
            Some(page) => (page.url.to_string(), page.main_html().to_string()),
            None => (request.target_url.clone(), String::new()),
        };
        session.close().await;

        let ok = match report.verdict() {
            Some(JudgeVerdict::Success) => true,
            Some(JudgeVerdict::Unknown) => report.clicked_submit,
            _ => false,
        };
        report.elapsed_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            target: "submit_task",
            "Finished {}: ok={}, verdict={:?}, error_kind={:?}, {}ms",
            request.target_url,
            ok,
            report.verdict(),
            report.error_kind,
            report.elapsed_ms
        );

        SubmissionResult {
            ok,
            final_url,
            final_html,
            debug_report: report,
        }
    }

    /// Loads the page and reports CAPTCHA, census and target without filling or clicking.
    pub(crate) async fn inspect(&self, target_url: &str) -> DebugReport {
        let start = Instant::now();
        let mut report = DebugReport::new(target_url);

        match self.sessions.open_session().await {
            Ok(mut session) => {
                let steps = self.inspect_steps(&mut session, target_url, &mut report);
                if let Err(payload) = AssertUnwindSafe(steps).catch_unwind().await {
                    let message = panic_message(payload.as_ref());
                    tracing::error!(target: "submit_task", "Inspection panicked: {}", message);
                    report.fail(Stage::Session, ErrorKind::Unexpected, format!("panic: {}", message));
                }
                session.close().await;
            }
            Err(e) => report.fail(Stage::Session, ErrorKind::Unexpected, e.to_string()),
        }

        report.elapsed_ms = start.elapsed().as_millis() as u64;
        report
    }

    async fn inspect_steps(
        &self,
        session: &mut BrowsingSession,
        target_url: &str,
        report: &mut DebugReport,
    ) {
        if !self.load(session, target_url, report).await {
            return;
        }
        self.captcha_gate(session, report);
        self.baseline_census(session, report);
        self.locate(session, report);
    }

    async fn run_pipeline(
        &self,
        session: &mut BrowsingSession,
        request: &SubmissionRequest,
        plan: Option<SubmissionPlan>,
        report: &mut DebugReport,
    ) {
        if !self.load(session, &request.target_url, report).await {
            return;
        }
        if self.captcha_gate(session, report) {
            for stage in [Stage::Plan, Stage::Autofill, Stage::Confirm, Stage::Submit] {
                report.skipped(stage, "CAPTCHA present");
            }
            return;
        }
        self.baseline_census(session, report);
        let scope = self.locate(session, report);

        if let Some(scope) = &scope {
            let plan = self.resolve_plan(session, scope, request, plan, report).await;
            self.fill(session, scope, plan.as_ref(), request, report);
        } else {
            report.skipped(Stage::Plan, "no target form");
            report.skipped(Stage::Autofill, "no target form");
        }

        if let Some(page) = session.page() {
            report.post_fill_census = Some(collect_census(&self.vocabulary, page));
            report.ok(Stage::PostFillCensus, "collected");
        }

        self.click_through(session, scope.as_ref(), report).await;
        self.judge_outcome(session, report).await;
    }

    /// Returns false when there is nothing to act on.
    async fn load(
        &self,
        session: &mut BrowsingSession,
        target_url: &str,
        report: &mut DebugReport,
    ) -> bool {
        let url = match normalize_url(target_url) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(target: "submit_task", "Invalid target URL '{}': {}", target_url, e);
                report.fail(Stage::Load, ErrorKind::Unreachable, e.to_string());
                return false;
            }
        };
        let host = display_host(&url);
        tracing::info!(target: "submit_task", "[{}] Loading {}", host, url);

        match session.open(&url).await {
            Ok(page) => {
                report.ok(
                    Stage::Load,
                    format!(
                        "{} (status {}, {} contexts)",
                        page.url,
                        page.status,
                        page.contexts().len()
                    ),
                );
                true
            }
            Err(e) => {
                tracing::warn!(target: "submit_task", "[{}] Page load failed: {}", host, e);
                report.fail(Stage::Load, e.kind(), e.to_string());
                false
            }
        }
    }

    /// Returns true when a CAPTCHA marker was found in any context.
    fn captcha_gate(&self, session: &BrowsingSession, report: &mut DebugReport) -> bool {
        let Some(page) = session.page() else {
            return false;
        };
        let mut markers: Vec<&str> = page
            .contexts()
            .iter()
            .flat_map(|c| captcha_markers(&self.vocabulary, &c.html, self.config.captcha_scan_limit))
            .collect();
        markers.sort_unstable();
        markers.dedup();

        if markers.is_empty() {
            report.ok(Stage::Captcha, "no markers");
            return false;
        }
        tracing::info!(target: "submit_task", "CAPTCHA detected on {}: {:?}", page.url, markers);
        report.captcha_detected = true;
        report.fail(
            Stage::Captcha,
            ErrorKind::CaptchaBlocked,
            format!("markers: {}", markers.join(", ")),
        );
        true
    }

    fn baseline_census(&self, session: &BrowsingSession, report: &mut DebugReport) {
        if let Some(page) = session.page() {
            report.baseline_census = Some(collect_census(&self.vocabulary, page));
            report.ok(Stage::BaselineCensus, "collected");
        }
    }

    fn locate(&self, session: &BrowsingSession, report: &mut DebugReport) -> Option<FormScope> {
        let page = session.page()?;
        match locate_target(page) {
            Some(target) => {
                let frame_url = page
                    .context(target.scope.context)
                    .map(|c| c.url.to_string())
                    .unwrap_or_default();
                report.ok(
                    Stage::Locate,
                    format!(
                        "{:?} in context {} ({} meaningful controls)",
                        target.strategy, target.scope.context, target.meaningful_controls
                    ),
                );
                report.target = Some(TargetSummary {
                    scope: target.scope,
                    strategy: target.strategy,
                    frame_url,
                    meaningful_controls: target.meaningful_controls,
                });
                Some(target.scope)
            }
            None => {
                report.fail(Stage::Locate, ErrorKind::NoFormFound, "no fillable form on the page");
                None
            }
        }
    }

    async fn resolve_plan(
        &self,
        session: &BrowsingSession,
        scope: &FormScope,
        request: &SubmissionRequest,
        plan: Option<SubmissionPlan>,
        report: &mut DebugReport,
    ) -> Option<SubmissionPlan> {
        if let Some(plan) = plan {
            report.ok(Stage::Plan, format!("caller plan with {} fields", plan.fields.len()));
            report.plan_used = true;
            report.plan = Some(plan.clone());
            return Some(plan);
        }

        let snapshot = match &request.page_html_snapshot {
            Some(html) => html.clone(),
            None => session
                .page()
                .and_then(|p| p.context(scope.context))
                .map(|c| c.html.clone())
                .unwrap_or_default(),
        };
        let input = PlanInput {
            target_url: &request.target_url,
            html_snapshot: &snapshot,
            message: &request.message_body,
            sender: &request.sender,
            recipient: &request.recipient,
        };

        match self.planner.plan(&input).await {
            Some(plan) => {
                report.ok(Stage::Plan, format!("planner proposed {} fields", plan.fields.len()));
                report.plan_used = true;
                report.plan = Some(plan.clone());
                Some(plan)
            }
            None => {
                report.degrade(ErrorKind::PlanUnavailable);
                report.skipped(Stage::Plan, "no plan; heuristic-only fill");
                None
            }
        }
    }

    fn fill(
        &self,
        session: &mut BrowsingSession,
        scope: &FormScope,
        plan: Option<&SubmissionPlan>,
        request: &SubmissionRequest,
        report: &mut DebugReport,
    ) {
        let Some(page) = session.page_mut() else {
            report.skipped(Stage::Autofill, "no page");
            return;
        };
        let profile = AutoFillProfile::for_request(&self.config.autofill_fallback, request);
        let fill = autofill(page, scope, plan, &profile, &self.vocabulary);
        let detail = format!(
            "{} plan fields, {} heuristic fills, {} failures",
            fill.plan_fields_applied, fill.heuristic_filled, fill.failures
        );
        report.fill = Some(fill);
        report.ok(Stage::Autofill, detail);
    }

    async fn click_through(
        &self,
        session: &mut BrowsingSession,
        scope: Option<&FormScope>,
        report: &mut DebugReport,
    ) {
        let mut sequence = ClickSequence::new(self.config.click_pause);
        for stage in [Stage::Confirm, Stage::Submit] {
            let Some(outcome) = sequence.step(session, scope, &self.vocabulary).await else {
                break;
            };
            let record = match (&outcome.error, &outcome.label) {
                (Some(error), _) => StepOutcome::Failed(error.clone()),
                (None, Some(label)) if outcome.navigated => {
                    StepOutcome::Ok(format!("clicked '{}' and navigated", label))
                }
                (None, Some(label)) if outcome.clicked => StepOutcome::Skipped(format!(
                    "click on '{}' caused no navigation",
                    label
                )),
                _ => StepOutcome::Skipped("no confirm/send control".to_string()),
            };
            report.record(stage, record);
        }
        report.actions = sequence.outcomes();
        report.clicked_confirm = sequence.clicked_confirm();
        report.clicked_submit = sequence.clicked_submit();
    }

    async fn judge_outcome(&self, session: &BrowsingSession, report: &mut DebugReport) {
        let Some(page) = session.page() else {
            report.skipped(Stage::Judge, "no page");
            return;
        };
        let judgement = self.judge.judge(page.url.as_str(), page.main_html()).await;
        if judgement.verdict == JudgeVerdict::Unknown {
            report.degrade(ErrorKind::JudgeAmbiguous);
        }
        report.ok(
            Stage::Judge,
            format!("{:?} via {:?}", judgement.verdict, judgement.source),
        );
        report.judgement = Some(judgement);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SenderProfile, VerdictSource};
    use crate::session::{FetchedPage, NavRequest, PageFetcher, SessionSettings};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use warp::Filter;

    type Posts = Arc<Mutex<Vec<(String, HashMap<String, String>)>>>;

    const CONTACT: &str = "<form action='/thanks' method='post'><input name='email'><textarea name='msg'></textarea><button>送信</button></form>";
    const CAPTCHA: &str = "<form action='/thanks' method='post'><input name='email'><textarea name='msg'></textarea><button>送信</button></form><div class='g-recaptcha'></div>";
    const STEP: &str = r#"<form action="/step/confirm" method="post">
        <input name="company"><input name="email"><input type="checkbox" name="agree" value="yes">
        <input type="submit" value="入力内容を確認する"></form>"#;
    const STEP_CONFIRM: &str = r#"<p>以下の内容で送信します。</p>
        <form action="/step/done" method="post"><input type="hidden" name="email" value="a@b.com">
        <input type="submit" name="back" value="戻る"><input type="submit" name="send" value="送信する"></form>"#;
    const DONE: &str = "<h1>送信が完了しました</h1>";
    const RECEIVED: &str = "<p>Received.</p>";
    const FRAMED: &str = "<h1>Contact</h1><iframe src='/embed'></iframe>";
    const PSEUDO: &str = "<div><input name='email'><textarea name='msg'></textarea><button>送信</button></div>";

    async fn spawn_site() -> (String, Posts) {
        let posts: Posts = Arc::new(Mutex::new(Vec::new()));
        let sink = posts.clone();

        let get = |path: &'static str, body: &'static str| {
            warp::get()
                .and(warp::path(path))
                .and(warp::path::end())
                .map(move || warp::reply::html(body))
        };
        let pages = get("contact", CONTACT)
            .or(get("captcha", CAPTCHA))
            .unify()
            .or(get("step", STEP))
            .unify()
            .or(get("empty", ""))
            .unify()
            .or(get("framed", FRAMED))
            .unify()
            .or(get("embed", CONTACT))
            .unify()
            .or(get("pseudo", PSEUDO))
            .unify();

        let forms = warp::post()
            .and(warp::path::full())
            .and(warp::body::form())
            .map(move |path: warp::path::FullPath, form: HashMap<String, String>| {
                sink.lock().unwrap().push((path.as_str().to_string(), form));
                let body = match path.as_str() {
                    "/step/confirm" => STEP_CONFIRM,
                    "/step/done" => DONE,
                    _ => RECEIVED,
                };
                warp::reply::html(body)
            });

        let (addr, server) = warp::serve(pages.or(forms)).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        (format!("http://{}", addr), posts)
    }

    #[derive(Default)]
    struct CountingPlanner {
        calls: AtomicUsize,
        plan: Option<SubmissionPlan>,
    }

    #[async_trait]
    impl Planner for CountingPlanner {
        async fn plan(&self, _input: &PlanInput<'_>) -> Option<SubmissionPlan> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.plan.clone()
        }
    }

    fn test_config() -> Arc<Config> {
        Arc::new(Config {
            settle_delay: Duration::from_millis(1),
            click_pause: Duration::from_millis(1),
            navigation_timeout: Duration::from_secs(5),
            ..Config::default()
        })
    }

    fn submitter_with(planner: Arc<dyn Planner>) -> FormSubmitter {
        let config = test_config();
        FormSubmitter::with_parts(
            config.clone(),
            Arc::new(Vocabulary::default()),
            Arc::new(HttpSessionFactory::new(config)),
            planner,
            None,
        )
    }

    fn request(url: &str) -> SubmissionRequest {
        SubmissionRequest {
            target_url: url.to_string(),
            page_html_snapshot: None,
            message_body: "hello".to_string(),
            sender: SenderProfile {
                email: Some("a@b.com".to_string()),
                company: Some("株式会社テスト".to_string()),
                ..Default::default()
            },
            recipient: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_simple_form_is_filled_and_sent_once() {
        let (base, posts) = spawn_site().await;
        let submitter = submitter_with(Arc::new(NoPlanner));
        let result = submitter
            .submit(&request(&format!("{}/contact", base)), None)
            .await;

        let posts = posts.lock().unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].0, "/thanks");
        assert_eq!(posts[0].1.get("email").map(String::as_str), Some("a@b.com"));
        assert_eq!(posts[0].1.get("msg").map(String::as_str), Some("hello"));

        let report = &result.debug_report;
        assert_eq!(report.actions.len(), 2);
        assert!(report.actions[0].clicked && report.actions[0].clicked_submit);
        assert!(!report.actions[1].clicked);
        assert_eq!(report.verdict(), Some(JudgeVerdict::Unknown));
        assert!(report.degraded.contains(&ErrorKind::PlanUnavailable));
        assert!(report.degraded.contains(&ErrorKind::JudgeAmbiguous));
        assert_eq!(report.error_kind, None);
        assert!(result.ok);
        assert!(result.final_url.ends_with("/thanks"));
        assert!(result.final_html.contains("Received."));
    }

    #[tokio::test]
    async fn test_captcha_blocks_everything() {
        let (base, posts) = spawn_site().await;
        let planner = Arc::new(CountingPlanner::default());
        let submitter = submitter_with(planner.clone());
        let result = submitter
            .submit(&request(&format!("{}/captcha", base)), None)
            .await;

        assert!(!result.ok);
        assert!(result.debug_report.captcha_detected);
        assert_eq!(result.debug_report.error_kind, Some(ErrorKind::CaptchaBlocked));
        assert!(result.debug_report.fill.is_none());
        assert!(result.debug_report.actions.is_empty());
        assert_eq!(planner.calls.load(Ordering::SeqCst), 0);
        assert!(posts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_target() {
        let submitter = submitter_with(Arc::new(NoPlanner));
        let result = submitter.submit(&request("http://127.0.0.1:1/"), None).await;
        assert!(!result.ok);
        assert_eq!(result.debug_report.error_kind, Some(ErrorKind::Unreachable));
        assert!(matches!(
            result.debug_report.outcome_of(Stage::Load),
            Some(StepOutcome::Failed(_))
        ));
        assert_eq!(result.final_html, "");
    }

    #[tokio::test]
    async fn test_empty_page_reports_no_form() {
        let (base, _) = spawn_site().await;
        let submitter = submitter_with(Arc::new(NoPlanner));
        let result = submitter
            .submit(&request(&format!("{}/empty", base)), None)
            .await;
        assert!(!result.ok);
        assert_eq!(result.debug_report.error_kind, Some(ErrorKind::NoFormFound));
        assert!(!result.debug_report.clicked_submit);
        assert_eq!(result.debug_report.verdict(), Some(JudgeVerdict::Unknown));
    }

    #[tokio::test]
    async fn test_confirm_then_send_flow_succeeds() {
        let (base, posts) = spawn_site().await;
        let submitter = submitter_with(Arc::new(NoPlanner));
        let result = submitter
            .submit(&request(&format!("{}/step", base)), None)
            .await;

        let report = &result.debug_report;
        assert!(report.clicked_confirm);
        assert!(report.clicked_submit);
        assert_eq!(report.verdict(), Some(JudgeVerdict::Success));
        assert_eq!(
            report.judgement.as_ref().map(|j| j.source),
            Some(VerdictSource::Keyword)
        );
        assert!(result.ok);

        let posts = posts.lock().unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].1.get("agree").map(String::as_str), Some("yes"));
        assert_eq!(posts[0].1.get("company").map(String::as_str), Some("株式会社テスト"));
        assert_eq!(posts[1].0, "/step/done");
        assert_eq!(posts[1].1.get("send").map(String::as_str), Some("送信する"));
        assert!(!posts[1].1.contains_key("back"));
    }

    #[tokio::test]
    async fn test_caller_plan_wins_over_planner() {
        let (base, posts) = spawn_site().await;
        let planner = Arc::new(CountingPlanner::default());
        let submitter = submitter_with(planner.clone());
        let plan = SubmissionPlan {
            fields: [("msg".to_string(), "planned body".to_string())].into(),
            ..Default::default()
        };
        let result = submitter
            .submit(&request(&format!("{}/contact", base)), Some(plan))
            .await;

        assert!(result.debug_report.plan_used);
        assert_eq!(planner.calls.load(Ordering::SeqCst), 0);
        let posts = posts.lock().unwrap();
        assert_eq!(posts[0].1.get("msg").map(String::as_str), Some("planned body"));
        assert_eq!(posts[0].1.get("email").map(String::as_str), Some("a@b.com"));
    }

    #[tokio::test]
    async fn test_form_inside_iframe() {
        let (base, posts) = spawn_site().await;
        let submitter = submitter_with(Arc::new(NoPlanner));
        let result = submitter
            .submit(&request(&format!("{}/framed", base)), None)
            .await;

        let target = result.debug_report.target.as_ref().unwrap();
        assert_eq!(target.scope.context, 1);
        assert!(target.frame_url.ends_with("/embed"));
        assert_eq!(posts.lock().unwrap().len(), 1);
        assert!(result.debug_report.clicked_submit);
    }

    #[tokio::test]
    async fn test_pseudo_form_click_without_navigation_is_not_ok() {
        let (base, posts) = spawn_site().await;
        let submitter = submitter_with(Arc::new(NoPlanner));
        let result = submitter
            .submit(&request(&format!("{}/pseudo", base)), None)
            .await;

        let report = &result.debug_report;
        assert_eq!(report.error_kind, None);
        assert!(report.fill.is_some());
        assert!(report.actions.iter().all(|a| a.clicked && !a.navigated));
        assert!(!report.clicked_submit);
        assert!(!report.clicked_confirm);
        assert!(matches!(
            report.outcome_of(Stage::Submit),
            Some(StepOutcome::Skipped(reason)) if reason.contains("no navigation")
        ));
        assert_eq!(report.verdict(), Some(JudgeVerdict::Unknown));
        assert!(!result.ok);
        assert!(posts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_inspect_reports_structure_without_submitting() {
        let (base, posts) = spawn_site().await;
        let submitter = submitter_with(Arc::new(NoPlanner));
        let report = submitter.inspect(&format!("{}/step", base)).await;

        let census = report.baseline_census.unwrap();
        assert_eq!(census.forms, 1);
        assert_eq!(census.meaningful_inputs, 3);
        assert!(census.has_send_control);
        assert!(report.target.is_some());
        assert!(report.actions.is_empty());
        assert!(report.judgement.is_none());
        assert!(posts.lock().unwrap().is_empty());
    }

    struct PanickingFetcher;

    #[async_trait]
    impl PageFetcher for PanickingFetcher {
        async fn fetch(&self, _request: &NavRequest) -> Result<FetchedPage> {
            panic!("renderer crashed");
        }
    }

    struct PanickingSessions;

    #[async_trait]
    impl SessionFactory for PanickingSessions {
        async fn open_session(&self) -> Result<BrowsingSession> {
            Ok(BrowsingSession::new(
                Arc::new(PanickingFetcher),
                SessionSettings {
                    max_frames: 1,
                    settle_delay: Duration::from_millis(1),
                },
            ))
        }
    }

    #[tokio::test]
    async fn test_panic_inside_pipeline_becomes_report() {
        let config = test_config();
        let submitter = FormSubmitter::with_parts(
            config,
            Arc::new(Vocabulary::default()),
            Arc::new(PanickingSessions),
            Arc::new(NoPlanner),
            None,
        );
        let result = submitter
            .submit(&request("https://example.com/contact"), None)
            .await;
        assert!(!result.ok);
        assert_eq!(result.debug_report.error_kind, Some(ErrorKind::Unexpected));
        assert!(matches!(
            result.debug_report.outcome_of(Stage::Session),
            Some(StepOutcome::Failed(msg)) if msg.contains("renderer crashed")
        ));
    }
}
