//! Keyword taxonomies used by the detectors and heuristics.
//!
//! Every list here is plain data. The defaults are tuned for Japanese-language business
//! contact forms; a `[vocabulary]` table in the configuration file replaces a list wholesale
//! rather than merging into it.

use crate::classifier::FieldKind;
use serde::Deserialize;

/// A keyword rule mapping any of `keywords` onto a semantic field role.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct FieldRule {
    pub kind: FieldKind,
    pub keywords: Vec<String>,
}

/// The complete set of heuristic vocabularies.
#[derive(Debug, Clone)]
pub(crate) struct Vocabulary {
    /// Markup fragments that betray a CAPTCHA integration.
    pub captcha_markers: Vec<String>,
    /// Labels of "confirm your input" style controls.
    pub confirm_words: Vec<String>,
    /// Labels of final send/submit controls.
    pub send_words: Vec<String>,
    /// Phrases that indicate the submission was accepted.
    pub success_phrases: Vec<String>,
    /// Phrases that indicate a validation or server error.
    pub error_phrases: Vec<String>,
    /// Ordered field rules; the first matching rule wins.
    pub field_rules: Vec<FieldRule>,
}

/// Optional replacements read from the `[vocabulary]` table of the config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct VocabularyOverrides {
    pub captcha_markers: Option<Vec<String>>,
    pub confirm_words: Option<Vec<String>>,
    pub send_words: Option<Vec<String>>,
    pub success_phrases: Option<Vec<String>>,
    pub error_phrases: Option<Vec<String>>,
    pub field_rules: Option<Vec<FieldRule>>,
}

fn owned(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_lowercase()).collect()
}

fn rule(kind: FieldKind, keywords: &[&str]) -> FieldRule {
    FieldRule {
        kind,
        keywords: owned(keywords),
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        let captcha_markers = owned(&[
            "g-recaptcha",
            "grecaptcha",
            "google.com/recaptcha",
            "recaptcha/api.js",
            "recaptcha/enterprise.js",
            "h-captcha",
            "hcaptcha.com",
            "cf-turnstile",
            "challenges.cloudflare.com/turnstile",
            "data-sitekey",
            "captcha.js",
        ]);

        let confirm_words = owned(&["確認", "confirm", "次へ", "review"]);

        let send_words = owned(&[
            "送信",
            "submit",
            "send",
            "送る",
            "問い合わせる",
            "お問い合わせする",
            "申し込",
            "申込",
        ]);

        let success_phrases = owned(&[
            "送信が完了しました",
            "送信いたしました",
            "送信されました",
            "お問い合わせを受け付けました",
            "受け付けました",
            "受付が完了しました",
            "ありがとうございました",
            "ありがとうございます。",
            "thank you for your",
            "has been sent",
            "successfully submitted",
        ]);

        let error_phrases = owned(&[
            "必須項目が入力されていません",
            "入力内容をご確認ください",
            "必須項目です",
            "入力されていません",
            "正しく入力してください",
            "エラーが発生しました",
            "送信に失敗しました",
            "is required",
            "please correct",
        ]);

        let field_rules = vec![
            rule(FieldKind::Email, &["email", "e-mail", "mail", "メール"]),
            rule(FieldKind::Phone, &["tel", "phone", "電話", "携帯"]),
            rule(FieldKind::Postal, &["zip", "postal", "postcode", "郵便", "〒"]),
            rule(FieldKind::Prefecture, &["pref", "都道府県", "region"]),
            rule(
                FieldKind::Address,
                &["address", "addr", "住所", "所在地", "city", "street"],
            ),
            rule(
                FieldKind::Company,
                &[
                    "company",
                    "corp",
                    "organization",
                    "organisation",
                    "会社",
                    "企業",
                    "法人",
                    "団体",
                    "貴社",
                    "御社",
                    "社名",
                ],
            ),
            rule(FieldKind::Subject, &["subject", "title", "件名", "題名", "用件"]),
            rule(
                FieldKind::Message,
                &[
                    "message",
                    "msg",
                    "inquiry",
                    "enquiry",
                    "comment",
                    "body",
                    "content",
                    "本文",
                    "内容",
                    "問い合わせ",
                    "ご質問",
                    "詳細",
                    "textarea",
                ],
            ),
            rule(
                FieldKind::FullName,
                &["fullname", "full_name", "full-name", "氏名", "お名前", "名前", "your-name"],
            ),
            rule(FieldKind::LastName, &["last", "family", "surname", "sei", "姓", "苗字"]),
            rule(FieldKind::FirstName, &["first", "given", "mei", "名"]),
            rule(FieldKind::FullName, &["name"]),
        ];

        Vocabulary {
            captcha_markers,
            confirm_words,
            send_words,
            success_phrases,
            error_phrases,
            field_rules,
        }
    }
}

impl Vocabulary {
    /// Builds the default vocabulary with any configured lists swapped in.
    pub(crate) fn with_overrides(overrides: &VocabularyOverrides) -> Self {
        let mut vocabulary = Vocabulary::default();
        let lower = |list: &Vec<String>| list.iter().map(|w| w.to_lowercase()).collect();

        if let Some(list) = &overrides.captcha_markers {
            vocabulary.captcha_markers = lower(list);
        }
        if let Some(list) = &overrides.confirm_words {
            vocabulary.confirm_words = lower(list);
        }
        if let Some(list) = &overrides.send_words {
            vocabulary.send_words = lower(list);
        }
        if let Some(list) = &overrides.success_phrases {
            vocabulary.success_phrases = lower(list);
        }
        if let Some(list) = &overrides.error_phrases {
            vocabulary.error_phrases = lower(list);
        }
        if let Some(rules) = &overrides.field_rules {
            vocabulary.field_rules = rules
                .iter()
                .map(|r| FieldRule {
                    kind: r.kind,
                    keywords: lower(&r.keywords),
                })
                .collect();
        }
        vocabulary
    }

    /// True when `label` contains a confirm-style word.
    pub(crate) fn is_confirm(&self, label: &str) -> bool {
        contains_any(&label.to_lowercase(), &self.confirm_words)
    }

    /// True when `label` contains a send-style word.
    pub(crate) fn is_send(&self, label: &str) -> bool {
        contains_any(&label.to_lowercase(), &self.send_words)
    }

    /// True when `label` looks like either a send or a confirm control.
    pub(crate) fn is_action_label(&self, label: &str) -> bool {
        self.is_confirm(label) || self.is_send(label)
    }
}

/// Returns the needles found in an already-lowercased haystack.
pub(crate) fn matching<'a>(haystack_lower: &str, needles: &'a [String]) -> Vec<&'a str> {
    needles
        .iter()
        .filter(|n| !n.is_empty() && haystack_lower.contains(n.as_str()))
        .map(String::as_str)
        .collect()
}

pub(crate) fn contains_any(haystack_lower: &str, needles: &[String]) -> bool {
    needles
        .iter()
        .any(|n| !n.is_empty() && haystack_lower.contains(n.as_str()))
}
