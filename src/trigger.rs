//! Finds and presses confirm/submit-like controls.
//!
//! Many contact forms put a mandatory "confirm your input" page in front of the real submit,
//! so the trigger runs as a two-step sequence: confirm preferred first, submit preferred second.

use crate::dom::{FormScope, LoadedPage};
use crate::models::ActionOutcome;
use crate::session::{BrowsingSession, ClickEffect};
use crate::vocabulary::Vocabulary;
use serde::Serialize;
use std::time::Duration;
use tokio::time::sleep;

/// A clickable element that matched the button vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Candidate {
    pub context: usize,
    pub button: usize,
    pub label: String,
    pub is_confirm: bool,
    pub is_send: bool,
    pub priority: u8,
}

fn rank(
    vocabulary: &Vocabulary,
    context: usize,
    button: usize,
    label: &str,
    prefer_confirm: bool,
) -> Option<Candidate> {
    if label.trim().is_empty() {
        return None;
    }
    let is_confirm = vocabulary.is_confirm(label);
    let is_send = vocabulary.is_send(label);
    let priority = match (is_confirm, is_send, prefer_confirm) {
        (true, _, true) => 1,
        (false, true, true) => 2,
        (_, true, false) => 1,
        (true, false, false) => 2,
        (false, false, _) => return None,
    };
    Some(Candidate {
        context,
        button,
        label: label.to_string(),
        is_confirm,
        is_send,
        priority,
    })
}

/// Picks the best candidate, searching the scope first and then the whole page.
///
/// Ties are broken by document order. A scope taken on an earlier page generation is
/// treated as empty, which sends the search to the whole page.
pub(crate) fn pick_candidate(
    page: &LoadedPage,
    scope: Option<&FormScope>,
    vocabulary: &Vocabulary,
    prefer_confirm: bool,
) -> Option<Candidate> {
    let best = |candidates: Vec<Candidate>| candidates.into_iter().min_by_key(|c| c.priority);

    if let Some(scope) = scope.filter(|s| page.is_current(s)) {
        if let Some(context) = page.context(scope.context) {
            let in_scope: Vec<Candidate> = context
                .buttons_in(scope.boundary)
                .filter_map(|(i, b)| rank(vocabulary, context.index, i, &b.text, prefer_confirm))
                .collect();
            if let Some(candidate) = best(in_scope) {
                return Some(candidate);
            }
        }
        tracing::debug!(target: "trigger", "No action control inside the form, searching the whole page");
    }

    let page_wide: Vec<Candidate> = page
        .contexts()
        .iter()
        .flat_map(|context| {
            context
                .buttons
                .iter()
                .enumerate()
                .filter_map(|(i, b)| rank(vocabulary, context.index, i, &b.text, prefer_confirm))
        })
        .collect();
    best(page_wide)
}

/// Picks and presses one control. Never fails: a click error is reported in the outcome.
///
/// `clicked_confirm`/`clicked_submit` are only set when the click actually navigated.
pub(crate) async fn trigger_action(
    session: &mut BrowsingSession,
    scope: Option<&FormScope>,
    vocabulary: &Vocabulary,
    prefer_confirm: bool,
) -> ActionOutcome {
    let candidate = match session.page() {
        Some(page) => pick_candidate(page, scope, vocabulary, prefer_confirm),
        None => None,
    };
    let Some(candidate) = candidate else {
        tracing::info!(target: "trigger", "No confirm/send control found (prefer_confirm={})", prefer_confirm);
        return ActionOutcome::default();
    };

    tracing::info!(
        target: "trigger",
        "Clicking '{}' (confirm={}, send={})",
        candidate.label,
        candidate.is_confirm,
        candidate.is_send
    );

    let mut outcome = ActionOutcome {
        clicked: true,
        clicked_confirm: candidate.is_confirm,
        clicked_submit: candidate.is_send,
        label: Some(candidate.label.clone()),
        ..Default::default()
    };

    match session.click(candidate.context, candidate.button).await {
        Ok(ClickEffect::Navigated { url, status }) => {
            tracing::debug!(target: "trigger", "Click navigated to {} ({})", url, status);
            outcome.navigated = true;
        }
        Ok(ClickEffect::NoNavigation) => {
            // No request was sent.
            tracing::info!(target: "trigger", "Click on '{}' caused no navigation", candidate.label);
            outcome.clicked_confirm = false;
            outcome.clicked_submit = false;
        }
        Err(e) => {
            tracing::warn!(target: "trigger", "Click on '{}' failed: {}", candidate.label, e);
            outcome.clicked = false;
            outcome.clicked_confirm = false;
            outcome.clicked_submit = false;
            outcome.error = Some(e.to_string());
        }
    }
    outcome
}

/// Position in the confirm-then-submit sequence.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ClickPhase {
    AwaitingConfirm,
    AwaitingSubmit,
    Done,
}

impl ClickPhase {
    /// Whether the click made in this phase prefers confirm controls; `None` once done.
    pub(crate) fn prefer_confirm(self) -> Option<bool> {
        match self {
            ClickPhase::AwaitingConfirm => Some(true),
            ClickPhase::AwaitingSubmit => Some(false),
            ClickPhase::Done => None,
        }
    }

    pub(crate) fn next(self) -> Self {
        match self {
            ClickPhase::AwaitingConfirm => ClickPhase::AwaitingSubmit,
            ClickPhase::AwaitingSubmit | ClickPhase::Done => ClickPhase::Done,
        }
    }
}

/// Drives the two click attempts and remembers what each one did.
#[derive(Debug, Clone)]
pub(crate) struct ClickSequence {
    phase: ClickPhase,
    pause: Duration,
    history: Vec<(ClickPhase, ActionOutcome)>,
}

impl ClickSequence {
    pub(crate) fn new(pause: Duration) -> Self {
        Self {
            phase: ClickPhase::AwaitingConfirm,
            pause,
            history: Vec::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn phase(&self) -> ClickPhase {
        self.phase
    }

    /// Performs the click for the current phase and advances. Returns `None` once done.
    pub(crate) async fn step(
        &mut self,
        session: &mut BrowsingSession,
        scope: Option<&FormScope>,
        vocabulary: &Vocabulary,
    ) -> Option<&ActionOutcome> {
        let prefer_confirm = self.phase.prefer_confirm()?;
        if self.phase == ClickPhase::AwaitingSubmit {
            sleep(self.pause).await;
        }
        let outcome = trigger_action(session, scope, vocabulary, prefer_confirm).await;
        self.history.push((self.phase, outcome));
        self.phase = self.phase.next();
        self.history.last().map(|(_, o)| o)
    }

    /// Runs every remaining phase.
    #[cfg(test)]
    pub(crate) async fn run(
        &mut self,
        session: &mut BrowsingSession,
        scope: Option<&FormScope>,
        vocabulary: &Vocabulary,
    ) {
        while self.step(session, scope, vocabulary).await.is_some() {}
    }

    #[cfg(test)]
    pub(crate) fn history(&self) -> &[(ClickPhase, ActionOutcome)] {
        &self.history
    }

    pub(crate) fn outcomes(&self) -> Vec<ActionOutcome> {
        self.history.iter().map(|(_, o)| o.clone()).collect()
    }

    pub(crate) fn clicked_confirm(&self) -> bool {
        self.history.iter().any(|(_, o)| o.clicked_confirm)
    }

    pub(crate) fn clicked_submit(&self) -> bool {
        self.history.iter().any(|(_, o)| o.clicked_submit)
    }
}
