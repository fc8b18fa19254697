//! Fills the located form: plan-driven pass first, heuristic residual pass second.

use crate::census::fill_census;
use crate::classifier::{FieldKind, classify_control};
use crate::dom::{Control, ControlKind, FormScope, FrameContext, LoadedPage};
use crate::models::{AutoFillProfile, FillReport, SubmissionPlan};
use crate::vocabulary::Vocabulary;
use std::collections::HashSet;

/// Plan values that mean "leave unchecked".
fn is_truthy(value: &str) -> bool {
    let value = value.trim();
    !(value.is_empty() || value == "0" || value.eq_ignore_ascii_case("false"))
}

fn profile_value(profile: &AutoFillProfile, kind: FieldKind) -> &str {
    let value = match kind {
        FieldKind::Company => &profile.company,
        FieldKind::FullName => &profile.full_name,
        FieldKind::LastName => &profile.last_name,
        FieldKind::FirstName => &profile.first_name,
        FieldKind::Email => &profile.email,
        FieldKind::Phone => &profile.phone,
        FieldKind::Postal => &profile.postal,
        FieldKind::Prefecture => &profile.prefecture,
        FieldKind::Address => &profile.address,
        FieldKind::Subject => &profile.subject,
        FieldKind::Message => &profile.message,
        FieldKind::Other => &profile.company,
    };
    if value.is_empty() && kind == FieldKind::Other {
        "-"
    } else {
        value
    }
}

/// Name, else id, for log lines.
fn control_label(control: &Control) -> String {
    control
        .name
        .clone()
        .or_else(|| control.id.as_ref().map(|id| format!("#{}", id)))
        .unwrap_or_else(|| "<unnamed>".to_string())
}

/// Applies the plan's entries to the controls with matching names.
/// Returns the indices of every control the plan touched.
fn apply_plan(
    context: &mut FrameContext,
    scope: &FormScope,
    plan: &SubmissionPlan,
    report: &mut FillReport,
) -> HashSet<usize> {
    let mut touched = HashSet::new();

    for (name, value) in &plan.fields {
        let indices = context.controls_named(scope.boundary, name);
        if indices.is_empty() {
            tracing::debug!(target: "autofill", "Plan field '{}' not present in form, skipping", name);
            report.plan_fields_missing.push(name.clone());
            continue;
        }

        // A grouped checkbox/radio whose values include the planned one: check just that.
        let exact_choice = indices.iter().copied().find(|&i| {
            let control = &context.controls[i];
            matches!(control.kind, ControlKind::Checkbox | ControlKind::Radio)
                && control.value == *value
        });

        for index in indices {
            let kind = context.controls[index].kind;
            let result = match kind {
                ControlKind::Select => context.select_option(index, value),
                ControlKind::Checkbox | ControlKind::Radio => {
                    let checked = match exact_choice {
                        Some(choice) => choice == index,
                        None => is_truthy(value),
                    };
                    if kind == ControlKind::Radio && !checked && exact_choice.is_some() {
                        // Selecting the chosen radio already cleared the rest of the group.
                        touched.insert(index);
                        continue;
                    }
                    context.set_checked(index, checked)
                }
                ControlKind::Text | ControlKind::TextArea => context.set_text(index, value),
                other => {
                    tracing::debug!(target: "autofill", "Plan field '{}' targets a {:?} control, skipping", name, other);
                    continue;
                }
            };

            match result {
                Ok(()) => {
                    touched.insert(index);
                    report.plan_fields_applied += 1;
                }
                Err(e) => {
                    report.failures += 1;
                    tracing::warn!(target: "autofill", "Plan fill failed for '{}': {}", name, e);
                }
            }
        }
    }

    touched
}

/// Fills every still-empty meaningful control from the profile.
fn fill_residual(
    context: &mut FrameContext,
    scope: &FormScope,
    vocabulary: &Vocabulary,
    profile: &AutoFillProfile,
    touched: &HashSet<usize>,
    report: &mut FillReport,
) {
    let candidates: Vec<usize> = context
        .controls_in(scope.boundary)
        .filter(|(i, c)| c.is_meaningful() && !touched.contains(i))
        .map(|(i, _)| i)
        .collect();

    for index in candidates {
        let control = &context.controls[index];
        let already_set = match control.kind {
            ControlKind::Radio => context.radio_group_checked(index),
            _ => control.has_value(),
        };
        if already_set {
            continue;
        }

        let label = control_label(control);
        let kind = control.kind;
        let result = match kind {
            ControlKind::Select => {
                let first_real = control
                    .options
                    .iter()
                    .enumerate()
                    .filter(|(i, o)| !(*i == 0 && o.is_placeholder()))
                    .map(|(_, o)| o)
                    .find(|o| !o.value.trim().is_empty())
                    .map(|o| o.value.clone());
                match first_real {
                    Some(value) => context.select_option(index, &value),
                    None => continue,
                }
            }
            ControlKind::Checkbox | ControlKind::Radio => context.set_checked(index, true),
            ControlKind::Text | ControlKind::TextArea => {
                let kind = classify_control(vocabulary, control);
                let value = profile_value(profile, kind).to_string();
                if value.is_empty() {
                    tracing::debug!(target: "autofill", "No profile value for '{}' ({:?})", label, kind);
                    continue;
                }
                tracing::debug!(target: "autofill", "Heuristic fill '{}' as {:?}", label, kind);
                context.set_text(index, &value)
            }
            _ => continue,
        };

        match result {
            Ok(()) => report.heuristic_filled += 1,
            Err(e) => {
                report.failures += 1;
                tracing::warn!(target: "autofill", "Heuristic fill failed for '{}': {}", label, e);
            }
        }
    }
}

/// Fills the form at `scope`. Individual control failures are counted, never propagated.
pub(crate) fn autofill(
    page: &mut LoadedPage,
    scope: &FormScope,
    plan: Option<&SubmissionPlan>,
    profile: &AutoFillProfile,
    vocabulary: &Vocabulary,
) -> FillReport {
    let mut report = FillReport::default();
    if !page.is_current(scope) {
        tracing::warn!(target: "autofill", "Form scope is stale; nothing filled");
        return report;
    }
    let Some(context) = page.context_mut(scope.context) else {
        return report;
    };

    let touched = match plan {
        Some(plan) => apply_plan(context, scope, plan, &mut report),
        None => HashSet::new(),
    };
    fill_residual(context, scope, vocabulary, profile, &touched, &mut report);

    report.census = fill_census(context, scope.boundary);
    tracing::info!(
        target: "autofill",
        "Autofill done: {} plan fields, {} heuristic fills, {} failures",
        report.plan_fields_applied,
        report.heuristic_filled,
        report.failures
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{ScopeBoundary, test_page};
    use crate::locator::locate_target;
    use std::collections::BTreeMap;

    fn profile() -> AutoFillProfile {
        AutoFillProfile {
            company: "株式会社テスト".into(),
            full_name: "山田 太郎".into(),
            last_name: "山田".into(),
            first_name: "太郎".into(),
            email: "a@b.com".into(),
            phone: "03-0000-0000".into(),
            message: "hello".into(),
            ..Default::default()
        }
    }

    fn plan(fields: &[(&str, &str)]) -> SubmissionPlan {
        SubmissionPlan {
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
            ..Default::default()
        }
    }

    fn value_of(page: &LoadedPage, name: &str) -> String {
        let ctx = &page.contexts()[0];
        let i = ctx.controls_named(ScopeBoundary::Document, name)[0];
        ctx.controls[i].value.clone()
    }

    fn checked(page: &LoadedPage, name: &str) -> bool {
        let ctx = &page.contexts()[0];
        let i = ctx.controls_named(ScopeBoundary::Document, name)[0];
        ctx.controls[i].checked
    }

    #[test]
    fn test_heuristic_fill_without_plan() {
        let mut page = test_page(
            "<form><input name='email'><textarea name='msg'></textarea><button>送信</button></form>",
        );
        let target = locate_target(&page).unwrap();
        let report = autofill(&mut page, &target.scope, None, &profile(), &Vocabulary::default());
        assert_eq!(value_of(&page, "email"), "a@b.com");
        assert_eq!(value_of(&page, "msg"), "hello");
        assert_eq!(report.heuristic_filled, 2);
        assert_eq!(report.census.text_filled, 1);
        assert_eq!(report.census.textarea_filled, 1);
    }

    #[test]
    fn test_heuristic_pass_never_overwrites_plan_values() {
        let mut page = test_page("<form><input name='email'><input name='company'></form>");
        let target = locate_target(&page).unwrap();
        let plan = plan(&[("email", "v")]);
        let report = autofill(
            &mut page,
            &target.scope,
            Some(&plan),
            &profile(),
            &Vocabulary::default(),
        );
        assert_eq!(value_of(&page, "email"), "v");
        assert_eq!(value_of(&page, "company"), "株式会社テスト");
        assert_eq!(report.plan_fields_applied, 1);
    }

    #[test]
    fn test_site_defaults_are_preserved() {
        let mut page = test_page("<form><input name='company' value='既定値'></form>");
        let target = locate_target(&page).unwrap();
        autofill(&mut page, &target.scope, None, &profile(), &Vocabulary::default());
        assert_eq!(value_of(&page, "company"), "既定値");
    }

    #[test]
    fn test_unreferenced_checkbox_ends_checked() {
        let mut page = test_page(
            "<form><input name='email'><input type='checkbox' name='agree'><input type='checkbox' name='news'></form>",
        );
        let target = locate_target(&page).unwrap();
        let plan = plan(&[("news", "0")]);
        autofill(
            &mut page,
            &target.scope,
            Some(&plan),
            &profile(),
            &Vocabulary::default(),
        );
        assert!(checked(&page, "agree"));
        assert!(!checked(&page, "news"));
    }

    #[test]
    fn test_select_fill_by_plan_and_by_default() {
        let mut page = test_page(
            r#"<form>
                 <select name="kind"><option value="">--</option><option value="a">A</option><option value="b">資料請求</option></select>
                 <select name="pref"><option value="">選択</option><option value="tokyo">東京都</option></select>
               </form>"#,
        );
        let target = locate_target(&page).unwrap();
        let plan = plan(&[("kind", "資料請求")]);
        autofill(
            &mut page,
            &target.scope,
            Some(&plan),
            &profile(),
            &Vocabulary::default(),
        );
        assert_eq!(value_of(&page, "kind"), "b");
        assert_eq!(value_of(&page, "pref"), "tokyo");
    }

    #[test]
    fn test_value_less_placeholder_option_is_replaced() {
        let mut page = test_page(
            r#"<form>
                 <select name="pref"><option>選択してください</option><option>北海道</option><option>東京都</option></select>
                 <select name="plan"><option value="basic">Basic</option><option value="pro">Pro</option></select>
               </form>"#,
        );
        let target = locate_target(&page).unwrap();
        let report = autofill(&mut page, &target.scope, None, &profile(), &Vocabulary::default());
        assert_eq!(value_of(&page, "pref"), "北海道");
        assert_eq!(value_of(&page, "plan"), "basic");
        assert_eq!(report.census.select_filled, 2);
    }

    #[test]
    fn test_radio_group_gets_one_choice() {
        let mut page = test_page(
            r#"<form><input type="radio" name="type" value="x"><input type="radio" name="type" value="y">
               <input type="radio" name="size" value="s"><input type="radio" name="size" value="l"></form>"#,
        );
        let target = locate_target(&page).unwrap();
        let plan = plan(&[("size", "l")]);
        autofill(
            &mut page,
            &target.scope,
            Some(&plan),
            &profile(),
            &Vocabulary::default(),
        );
        let ctx = &page.contexts()[0];
        let checked: Vec<(&str, bool)> = ctx
            .controls
            .iter()
            .map(|c| (c.value.as_str(), c.checked))
            .collect();
        assert_eq!(
            checked,
            vec![("x", true), ("y", false), ("s", false), ("l", true)]
        );
    }

    #[test]
    fn test_single_failure_does_not_abort_pass() {
        let mut page = test_page(
            "<form><input name='email' disabled><input name='company'><textarea name='msg'></textarea></form>",
        );
        let target = locate_target(&page).unwrap();
        let plan = plan(&[("missing", "x")]);
        let report = autofill(
            &mut page,
            &target.scope,
            Some(&plan),
            &profile(),
            &Vocabulary::default(),
        );
        assert_eq!(report.failures, 1);
        assert_eq!(report.plan_fields_missing, vec!["missing".to_string()]);
        assert_eq!(value_of(&page, "company"), "株式会社テスト");
        assert_eq!(value_of(&page, "msg"), "hello");
    }

    #[test]
    fn test_stale_scope_fills_nothing() {
        let mut page = test_page("<form><input name='email'></form>");
        let mut scope = locate_target(&page).unwrap().scope;
        scope.generation += 1;
        let report = autofill(&mut page, &scope, None, &profile(), &Vocabulary::default());
        assert_eq!(report.heuristic_filled, 0);
        assert_eq!(value_of(&page, "email"), "");
    }
}
