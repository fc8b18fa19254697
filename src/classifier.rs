//! Maps a form control onto the semantic role it most likely plays.

use crate::dom::Control;
use crate::vocabulary::{Vocabulary, contains_any};
use serde::{Deserialize, Serialize};

/// Semantic role of a fillable field.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub(crate) enum FieldKind {
    Company,
    FullName,
    LastName,
    FirstName,
    Email,
    Phone,
    Postal,
    Prefecture,
    Address,
    Subject,
    Message,
    Other,
}

/// Classifies a field from its `name`, `placeholder` and `type` attributes.
///
/// The vocabulary rules are checked in order and the first rule with a keyword contained
/// in the (lowercased) attribute text wins.
pub(crate) fn classify(
    vocabulary: &Vocabulary,
    name: Option<&str>,
    placeholder: Option<&str>,
    input_type: &str,
) -> FieldKind {
    let haystack = format!(
        "{} {} {}",
        name.unwrap_or_default(),
        placeholder.unwrap_or_default(),
        input_type
    )
    .to_lowercase();

    vocabulary
        .field_rules
        .iter()
        .find(|rule| contains_any(&haystack, &rule.keywords))
        .map(|rule| rule.kind)
        .unwrap_or(FieldKind::Other)
}

/// Convenience wrapper over [`classify`] for a parsed control.
pub(crate) fn classify_control(vocabulary: &Vocabulary, control: &Control) -> FieldKind {
    classify(
        vocabulary,
        control.name.as_deref(),
        control.placeholder.as_deref(),
        &control.input_type,
    )
}
