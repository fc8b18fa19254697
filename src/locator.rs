//! Picks the single most plausible fill/submit target on a multi-frame page.

use crate::dom::{FormScope, LoadedPage, ScopeBoundary};
use serde::{Deserialize, Serialize};

/// Which rule produced the target.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub(crate) enum LocateStrategy {
    /// A `<form>` element holding at least one meaningful control.
    FormElement,
    /// A body with meaningful controls but no wrapping `<form>`.
    BodyPseudoForm,
    /// The main document taken as a whole.
    MainDocument,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LocatedTarget {
    pub scope: FormScope,
    pub strategy: LocateStrategy,
    pub meaningful_controls: usize,
}

/// Locates the form to fill. Returns `None` when nothing fillable exists anywhere,
/// which is an ordinary outcome rather than an error.
///
/// Priority:
/// 1. the first `<form>` (across all contexts, in order) with a meaningful control;
/// 2. the first context whose body has meaningful controls, as a pseudo-form;
/// 3. the main document as a whole.
pub(crate) fn locate_target(page: &LoadedPage) -> Option<LocatedTarget> {
    for context in page.contexts() {
        for form in &context.forms {
            let boundary = ScopeBoundary::Form(form.index);
            let meaningful = context.meaningful_count(boundary);
            if meaningful > 0 {
                tracing::debug!(
                    target: "locator",
                    "Selected form #{} in context {} ({} meaningful controls)",
                    form.index,
                    context.index,
                    meaningful
                );
                return Some(LocatedTarget {
                    scope: page.scope(context.index, boundary),
                    strategy: LocateStrategy::FormElement,
                    meaningful_controls: meaningful,
                });
            }
        }
    }

    for context in page.contexts() {
        let meaningful = context.meaningful_count(ScopeBoundary::Body);
        if meaningful > 0 {
            tracing::debug!(
                target: "locator",
                "No qualifying <form>; using body of context {} as pseudo-form ({} controls)",
                context.index,
                meaningful
            );
            return Some(LocatedTarget {
                scope: page.scope(context.index, ScopeBoundary::Body),
                strategy: LocateStrategy::BodyPseudoForm,
                meaningful_controls: meaningful,
            });
        }
    }

    let main = page.context(0)?;
    let meaningful = main.meaningful_count(ScopeBoundary::Document);
    if meaningful > 0 {
        tracing::debug!(
            target: "locator",
            "Falling back to the whole main document ({} controls)",
            meaningful
        );
        return Some(LocatedTarget {
            scope: page.scope(0, ScopeBoundary::Document),
            strategy: LocateStrategy::MainDocument,
            meaningful_controls: meaningful,
        });
    }

    tracing::info!(target: "locator", "No fillable target found on {}", page.url);
    None
}
