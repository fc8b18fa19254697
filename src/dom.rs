//! In-memory model of a loaded page and its rendering contexts.
//!
//! HTML is parsed once with `scraper` into owned structures (forms, controls, clickable
//! elements). Fill operations mutate that model, and form submission serializes it the
//! way a browser would, so the rest of the engine never touches raw markup.

use crate::error::{AppError, Result};
use crate::models::HttpMethod;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

static FORM_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("form").unwrap());
static CONTROL_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("input, textarea, select").unwrap());
static CLICKABLE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("button, input[type=submit], input[type=button], input[type=image], a")
        .unwrap()
});
static OPTION_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("option").unwrap());
static FRAME_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("iframe, frame").unwrap());

/// Kind of a form control, derived from its tag and `type` attribute.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ControlKind {
    Text,
    TextArea,
    Select,
    Checkbox,
    Radio,
    File,
    Hidden,
    Submit,
    Button,
    Image,
    Reset,
}

impl ControlKind {
    fn from_input_type(input_type: &str) -> Self {
        match input_type {
            "hidden" => ControlKind::Hidden,
            "submit" => ControlKind::Submit,
            "button" => ControlKind::Button,
            "image" => ControlKind::Image,
            "reset" => ControlKind::Reset,
            "checkbox" => ControlKind::Checkbox,
            "radio" => ControlKind::Radio,
            "file" => ControlKind::File,
            _ => ControlKind::Text,
        }
    }

    /// Whether a control of this kind counts as a "meaningful" fillable control.
    pub(crate) fn is_meaningful(self) -> bool {
        !matches!(
            self,
            ControlKind::Hidden
                | ControlKind::Submit
                | ControlKind::Button
                | ControlKind::Image
                | ControlKind::Reset
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SelectOption {
    pub value: String,
    pub label: String,
    /// False when `value` was taken from the label.
    pub has_value_attr: bool,
}

impl SelectOption {
    /// An empty or value-less option such as "選択してください".
    pub(crate) fn is_placeholder(&self) -> bool {
        !self.has_value_attr || self.value.trim().is_empty()
    }
}

/// A single `<input>`, `<textarea>` or `<select>` and its live state.
#[derive(Debug, Clone)]
pub(crate) struct Control {
    pub kind: ControlKind,
    pub tag: String,
    /// Lowercased `type` attribute; `"textarea"`/`"select"` for those tags.
    pub input_type: String,
    pub name: Option<String>,
    pub id: Option<String>,
    pub placeholder: Option<String>,
    pub value: String,
    pub checked: bool,
    pub disabled: bool,
    pub readonly: bool,
    pub options: Vec<SelectOption>,
    /// Index of the owning `<form>` within the context, if any.
    pub form: Option<usize>,
    pub in_body: bool,
}

impl Control {
    pub(crate) fn is_meaningful(&self) -> bool {
        self.kind.is_meaningful()
    }

    /// Whether the control already holds something a user (or the site) put there.
    pub(crate) fn has_value(&self) -> bool {
        match self.kind {
            ControlKind::Checkbox | ControlKind::Radio => self.checked,
            ControlKind::Select => !self.value.trim().is_empty() && !self.shows_placeholder(),
            _ => !self.value.trim().is_empty(),
        }
    }

    /// Whether a select is still on its leading placeholder option.
    pub(crate) fn shows_placeholder(&self) -> bool {
        self.kind == ControlKind::Select
            && self
                .options
                .first()
                .is_some_and(|o| o.is_placeholder() && o.value == self.value)
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ClickableKind {
    Button,
    InputSubmit,
    InputButton,
    InputImage,
    Anchor,
}

/// Anything a user could press to move the form forward.
#[derive(Debug, Clone)]
pub(crate) struct Clickable {
    pub kind: ClickableKind,
    /// Visible label with whitespace collapsed.
    pub text: String,
    pub name: Option<String>,
    pub value: Option<String>,
    pub href: Option<String>,
    /// Effective `type` for buttons (`submit` unless stated otherwise).
    pub button_type: String,
    pub form: Option<usize>,
    pub in_body: bool,
}

impl Clickable {
    /// Whether pressing this control submits its owning form.
    pub(crate) fn submits_form(&self) -> bool {
        match self.kind {
            ClickableKind::Button => self.button_type == "submit",
            ClickableKind::InputSubmit | ClickableKind::InputImage => true,
            ClickableKind::InputButton | ClickableKind::Anchor => false,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FormInfo {
    pub index: usize,
    pub action: Option<String>,
    pub method: HttpMethod,
    pub enctype: Option<String>,
}

/// Where a nested frame's document comes from.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FrameSource {
    Url(Url),
    Inline(String),
}

/// One rendering context: the main document or a nested frame.
#[derive(Debug, Clone)]
pub(crate) struct FrameContext {
    pub index: usize,
    pub url: Url,
    pub html: String,
    pub forms: Vec<FormInfo>,
    pub controls: Vec<Control>,
    pub buttons: Vec<Clickable>,
    pub frame_sources: Vec<FrameSource>,
}

/// The part of a context that acts as the fill/submit boundary.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "type", content = "index", rename_all = "snake_case")]
pub(crate) enum ScopeBoundary {
    /// A real `<form>` element, by index within the context.
    Form(usize),
    /// Everything under `<body>`, treated as a pseudo-form.
    Body,
    /// The whole document, including anything parsed outside `<body>`.
    Document,
}

impl ScopeBoundary {
    fn contains(self, form: Option<usize>, in_body: bool) -> bool {
        match self {
            ScopeBoundary::Form(i) => form == Some(i),
            ScopeBoundary::Body => in_body,
            ScopeBoundary::Document => true,
        }
    }
}

/// A (context, boundary) pair pinned to one page generation.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FormScope {
    pub context: usize,
    pub boundary: ScopeBoundary,
    pub generation: u64,
}

/// A loaded page: the main document plus every nested frame that could be fetched.
#[derive(Debug, Clone)]
pub(crate) struct LoadedPage {
    pub url: Url,
    pub status: u16,
    pub generation: u64,
    contexts: Vec<FrameContext>,
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_text(element: &ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

fn non_empty_attr(element: &ElementRef<'_>, name: &str) -> Option<String> {
    element
        .value()
        .attr(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn is_in_body(element: &ElementRef<'_>) -> bool {
    element
        .ancestors()
        .any(|node| node.value().as_element().is_some_and(|e| e.name() == "body"))
}

fn looks_like_button(element: &ElementRef<'_>) -> bool {
    let class = element.value().attr("class").unwrap_or_default().to_lowercase();
    let role = element.value().attr("role").unwrap_or_default();
    class.contains("btn") || class.contains("button") || role.eq_ignore_ascii_case("button")
}

fn parse_control(element: &ElementRef<'_>, form: Option<usize>) -> Control {
    let tag = element.value().name().to_lowercase();
    let attr = |name: &str| non_empty_attr(element, name);

    let (kind, input_type) = match tag.as_str() {
        "textarea" => (ControlKind::TextArea, "textarea".to_string()),
        "select" => (ControlKind::Select, "select".to_string()),
        _ => {
            let input_type = attr("type")
                .map(|t| t.to_lowercase())
                .unwrap_or_else(|| "text".to_string());
            (ControlKind::from_input_type(&input_type), input_type)
        }
    };

    let options: Vec<(SelectOption, bool)> = if kind == ControlKind::Select {
        element
            .select(&OPTION_SELECTOR)
            .map(|option| {
                let label = element_text(&option);
                let value_attr = option.value().attr("value");
                let value = value_attr
                    .map(str::to_string)
                    .unwrap_or_else(|| label.clone());
                let selected = option.value().attr("selected").is_some();
                let has_value_attr = value_attr.is_some();
                (
                    SelectOption {
                        value,
                        label,
                        has_value_attr,
                    },
                    selected,
                )
            })
            .collect()
    } else {
        Vec::new()
    };

    let value = match kind {
        ControlKind::TextArea => element.text().collect::<String>().trim().to_string(),
        ControlKind::Select => options
            .iter()
            .find(|(_, selected)| *selected)
            .or_else(|| options.first())
            .map(|(o, _)| o.value.clone())
            .unwrap_or_default(),
        ControlKind::Checkbox | ControlKind::Radio => {
            element.value().attr("value").unwrap_or("on").to_string()
        }
        _ => element.value().attr("value").unwrap_or_default().to_string(),
    };

    Control {
        kind,
        tag,
        input_type,
        name: attr("name"),
        id: attr("id"),
        placeholder: attr("placeholder"),
        value,
        checked: element.value().attr("checked").is_some(),
        disabled: element.value().attr("disabled").is_some(),
        readonly: element.value().attr("readonly").is_some(),
        options: options.into_iter().map(|(o, _)| o).collect(),
        form,
        in_body: is_in_body(element),
    }
}

fn parse_clickable(element: &ElementRef<'_>, form: Option<usize>) -> Option<Clickable> {
    let tag = element.value().name().to_lowercase();
    let attr = |name: &str| non_empty_attr(element, name);

    let (kind, text, button_type) = match tag.as_str() {
        "button" => {
            let mut text = element_text(element);
            if text.is_empty() {
                text = attr("value")
                    .or_else(|| attr("aria-label"))
                    .or_else(|| attr("title"))
                    .unwrap_or_default();
            }
            let button_type = attr("type")
                .map(|t| t.to_lowercase())
                .unwrap_or_else(|| "submit".to_string());
            if button_type == "reset" {
                return None;
            }
            (ClickableKind::Button, text, button_type)
        }
        "input" => {
            let input_type = attr("type").map(|t| t.to_lowercase()).unwrap_or_default();
            match input_type.as_str() {
                "submit" => (
                    ClickableKind::InputSubmit,
                    attr("value").unwrap_or_else(|| "submit".to_string()),
                    input_type,
                ),
                "button" => (
                    ClickableKind::InputButton,
                    attr("value").unwrap_or_default(),
                    input_type,
                ),
                "image" => (
                    ClickableKind::InputImage,
                    attr("alt").or_else(|| attr("value")).unwrap_or_default(),
                    input_type,
                ),
                _ => return None,
            }
        }
        "a" => {
            if !looks_like_button(element) {
                return None;
            }
            (ClickableKind::Anchor, element_text(element), String::new())
        }
        _ => return None,
    };

    Some(Clickable {
        kind,
        text: collapse_whitespace(&text),
        name: attr("name"),
        value: element.value().attr("value").map(str::to_string),
        href: attr("href"),
        button_type,
        form,
        in_body: is_in_body(element),
    })
}

fn parse_frame_source(element: &ElementRef<'_>, base: &Url) -> Option<FrameSource> {
    if let Some(srcdoc) = element.value().attr("srcdoc") {
        return Some(FrameSource::Inline(srcdoc.to_string()));
    }
    let src = non_empty_attr(element, "src")?;
    let lowered = src.to_lowercase();
    if lowered.starts_with("about:")
        || lowered.starts_with("javascript:")
        || lowered.starts_with("data:")
    {
        return None;
    }
    match base.join(&src) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Some(FrameSource::Url(url)),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(target: "session", "Ignoring frame with unparsable src '{}': {}", src, e);
            None
        }
    }
}

impl FrameContext {
    /// Parses a document into a context. Never fails: broken or empty markup simply
    /// produces a context without controls.
    pub(crate) fn parse(index: usize, url: Url, html: &str) -> Self {
        let document = Html::parse_document(html);

        let mut owners = HashMap::new();
        let mut forms = Vec::new();
        for (form_index, form_element) in document.select(&FORM_SELECTOR).enumerate() {
            let method = match form_element.value().attr("method") {
                Some(m) if m.trim().eq_ignore_ascii_case("post") => HttpMethod::Post,
                _ => HttpMethod::Get,
            };
            forms.push(FormInfo {
                index: form_index,
                action: form_element.value().attr("action").map(|a| a.trim().to_string()),
                method,
                enctype: non_empty_attr(&form_element, "enctype"),
            });
            for element in form_element.select(&CONTROL_SELECTOR) {
                owners.insert(element.id(), form_index);
            }
            for element in form_element.select(&CLICKABLE_SELECTOR) {
                owners.insert(element.id(), form_index);
            }
        }

        let controls = document
            .select(&CONTROL_SELECTOR)
            .map(|element| parse_control(&element, owners.get(&element.id()).copied()))
            .collect();

        let buttons = document
            .select(&CLICKABLE_SELECTOR)
            .filter_map(|element| parse_clickable(&element, owners.get(&element.id()).copied()))
            .collect();

        let frame_sources = document
            .select(&FRAME_SELECTOR)
            .filter_map(|element| parse_frame_source(&element, &url))
            .collect();

        FrameContext {
            index,
            url,
            html: html.to_string(),
            forms,
            controls,
            buttons,
            frame_sources,
        }
    }

    /// Controls inside `boundary`, with their indices in `self.controls`.
    pub(crate) fn controls_in(
        &self,
        boundary: ScopeBoundary,
    ) -> impl Iterator<Item = (usize, &Control)> + '_ {
        self.controls
            .iter()
            .enumerate()
            .filter(move |(_, c)| boundary.contains(c.form, c.in_body))
    }

    /// Clickable elements inside `boundary`, with their indices in `self.buttons`.
    pub(crate) fn buttons_in(
        &self,
        boundary: ScopeBoundary,
    ) -> impl Iterator<Item = (usize, &Clickable)> + '_ {
        self.buttons
            .iter()
            .enumerate()
            .filter(move |(_, b)| boundary.contains(b.form, b.in_body))
    }

    pub(crate) fn meaningful_count(&self, boundary: ScopeBoundary) -> usize {
        self.controls_in(boundary)
            .filter(|(_, c)| c.is_meaningful())
            .count()
    }

    /// Indices of controls in `boundary` whose `name` equals `name`.
    pub(crate) fn controls_named(&self, boundary: ScopeBoundary, name: &str) -> Vec<usize> {
        self.controls_in(boundary)
            .filter(|(_, c)| c.name.as_deref() == Some(name))
            .map(|(i, _)| i)
            .collect()
    }

    fn control_mut(&mut self, index: usize) -> Result<&mut Control> {
        let control = self
            .controls
            .get_mut(index)
            .ok_or_else(|| AppError::Fill(format!("no control at index {}", index)))?;
        if control.disabled || control.readonly {
            return Err(AppError::Fill(format!(
                "control '{}' is disabled or read-only",
                control.name.as_deref().unwrap_or("?")
            )));
        }
        Ok(control)
    }

    /// Types `value` into a text-like control.
    pub(crate) fn set_text(&mut self, index: usize, value: &str) -> Result<()> {
        let control = self.control_mut(index)?;
        match control.kind {
            ControlKind::Text | ControlKind::TextArea => {
                control.value = value.to_string();
                Ok(())
            }
            other => Err(AppError::Fill(format!(
                "cannot type into a {:?} control",
                other
            ))),
        }
    }

    /// Selects the option whose value, or failing that whose label, equals `wanted`.
    pub(crate) fn select_option(&mut self, index: usize, wanted: &str) -> Result<()> {
        let control = self.control_mut(index)?;
        if control.kind != ControlKind::Select {
            return Err(AppError::Fill(format!(
                "cannot select an option on a {:?} control",
                control.kind
            )));
        }
        let wanted = wanted.trim();
        let chosen = control
            .options
            .iter()
            .find(|o| o.value == wanted)
            .or_else(|| control.options.iter().find(|o| o.label == wanted))
            .map(|o| o.value.clone())
            .ok_or_else(|| AppError::Fill(format!("no option matching '{}'", wanted)))?;
        control.value = chosen;
        Ok(())
    }

    /// Checks or unchecks a checkbox or radio. Checking a radio clears the rest of its group.
    pub(crate) fn set_checked(&mut self, index: usize, checked: bool) -> Result<()> {
        let control = self.control_mut(index)?;
        match control.kind {
            ControlKind::Checkbox => {
                control.checked = checked;
                Ok(())
            }
            ControlKind::Radio => {
                control.checked = checked;
                let (name, form) = (control.name.clone(), control.form);
                if checked && name.is_some() {
                    for (i, other) in self.controls.iter_mut().enumerate() {
                        if i != index
                            && other.kind == ControlKind::Radio
                            && other.name == name
                            && other.form == form
                        {
                            other.checked = false;
                        }
                    }
                }
                Ok(())
            }
            other => Err(AppError::Fill(format!("cannot check a {:?} control", other))),
        }
    }

    /// Whether any radio sharing this control's group is checked.
    pub(crate) fn radio_group_checked(&self, index: usize) -> bool {
        let Some(control) = self.controls.get(index) else {
            return false;
        };
        if control.name.is_none() {
            return control.checked;
        }
        self.controls.iter().any(|other| {
            other.kind == ControlKind::Radio
                && other.name == control.name
                && other.form == control.form
                && other.checked
        })
    }

    /// Serializes the successful controls of `boundary` as name/value pairs, plus the
    /// submitter's own name/value when it has one.
    pub(crate) fn form_payload(
        &self,
        boundary: ScopeBoundary,
        submitter: Option<&Clickable>,
    ) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for (_, control) in self.controls_in(boundary) {
            let Some(name) = control.name.as_deref() else {
                continue;
            };
            if control.disabled {
                continue;
            }
            match control.kind {
                ControlKind::Checkbox | ControlKind::Radio => {
                    if control.checked {
                        pairs.push((name.to_string(), control.value.clone()));
                    }
                }
                ControlKind::Select if control.options.is_empty() => {}
                ControlKind::Submit
                | ControlKind::Button
                | ControlKind::Image
                | ControlKind::Reset
                | ControlKind::File => {}
                _ => pairs.push((name.to_string(), control.value.clone())),
            }
        }
        if let Some(button) = submitter {
            if let Some(name) = &button.name {
                pairs.push((name.clone(), button.value.clone().unwrap_or_default()));
            }
        }
        pairs
    }
}

impl LoadedPage {
    pub(crate) fn new(url: Url, status: u16, contexts: Vec<FrameContext>, generation: u64) -> Self {
        LoadedPage {
            url,
            status,
            generation,
            contexts,
        }
    }

    /// Every addressable rendering context, main document first.
    pub(crate) fn contexts(&self) -> &[FrameContext] {
        &self.contexts
    }

    pub(crate) fn context(&self, index: usize) -> Option<&FrameContext> {
        self.contexts.get(index)
    }

    pub(crate) fn context_mut(&mut self, index: usize) -> Option<&mut FrameContext> {
        self.contexts.get_mut(index)
    }

    pub(crate) fn main_html(&self) -> &str {
        self.contexts
            .first()
            .map(|c| c.html.as_str())
            .unwrap_or_default()
    }

    /// Whether `scope` was taken on this very page (and not on a page since navigated away).
    pub(crate) fn is_current(&self, scope: &FormScope) -> bool {
        scope.generation == self.generation && scope.context < self.contexts.len()
    }

    pub(crate) fn scope(&self, context: usize, boundary: ScopeBoundary) -> FormScope {
        FormScope {
            context,
            boundary,
            generation: self.generation,
        }
    }
}

#[cfg(test)]
pub(crate) fn test_page(html: &str) -> LoadedPage {
    let url = Url::parse("https://example.com/contact").unwrap();
    let context = FrameContext::parse(0, url.clone(), html);
    LoadedPage::new(url, 200, vec![context], 0)
}
