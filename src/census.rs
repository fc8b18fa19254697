//! Read-only structural census of a loaded page.

use crate::dom::{ControlKind, FrameContext, LoadedPage, ScopeBoundary};
use crate::models::{FillCensus, StructuralCensus};
use crate::vocabulary::Vocabulary;

fn census_of_context(vocabulary: &Vocabulary, context: &FrameContext) -> StructuralCensus {
    let mut census = StructuralCensus {
        forms: context.forms.len(),
        ..Default::default()
    };

    for control in &context.controls {
        match control.kind {
            ControlKind::Select => census.selects += 1,
            ControlKind::TextArea => census.textareas += 1,
            _ => {}
        }
        if control.tag == "input" {
            census.inputs += 1;
            if control.is_meaningful() {
                census.meaningful_inputs += 1;
            }
            if control.kind == ControlKind::Checkbox {
                census.checkboxes += 1;
            }
        }
    }

    census.has_send_control = context
        .buttons
        .iter()
        .any(|button| vocabulary.is_action_label(&button.text));

    census
}

/// Counts forms and controls in every rendering context and sums the results.
pub(crate) fn collect_census(vocabulary: &Vocabulary, page: &LoadedPage) -> StructuralCensus {
    let mut total = StructuralCensus::default();
    for context in page.contexts() {
        let census = census_of_context(vocabulary, context);
        tracing::debug!(
            target: "census",
            "Context {} ({}): {:?}",
            context.index,
            context.url,
            census
        );
        total += census;
    }
    total
}

/// Filled-versus-total counts for the controls inside one scope.
pub(crate) fn fill_census(context: &FrameContext, boundary: ScopeBoundary) -> FillCensus {
    let mut census = FillCensus::default();
    for (_, control) in context.controls_in(boundary) {
        let filled = control.has_value();
        let (total, done) = match control.kind {
            ControlKind::Text => (&mut census.text_total, &mut census.text_filled),
            ControlKind::TextArea => (&mut census.textarea_total, &mut census.textarea_filled),
            ControlKind::Select => (&mut census.select_total, &mut census.select_filled),
            ControlKind::Checkbox => (&mut census.checkbox_total, &mut census.checkbox_checked),
            ControlKind::Radio => (&mut census.radio_total, &mut census.radio_checked),
            _ => continue,
        };
        *total += 1;
        if filled {
            *done += 1;
        }
    }
    census
}
