//! Classifies the page reached after submitting.
//!
//! Keyword matching decides the clear cases; only pages hitting both or neither phrase
//! list are passed to the optional assistant.

use crate::captcha::bounded_prefix;
use crate::error::Result;
use crate::llm::ChatClient;
use crate::models::{JudgeVerdict, Judgement, VerdictSource};
use crate::prompts::{AssistantVerdict, JUDGE_SYSTEM_PROMPT, build_judge_prompt, parse_verdict};
use crate::vocabulary::{Vocabulary, matching};
use async_trait::async_trait;
use std::sync::Arc;

/// External judge consulted for ambiguous pages.
#[async_trait]
pub(crate) trait JudgeAssistant: Send + Sync {
    async fn classify(&self, url: &str, html: &str) -> Result<AssistantVerdict>;
}

pub(crate) struct LlmJudge {
    client: ChatClient,
    snippet_limit: usize,
}

impl LlmJudge {
    pub(crate) fn new(client: ChatClient, snippet_limit: usize) -> Self {
        Self {
            client,
            snippet_limit,
        }
    }
}

#[async_trait]
impl JudgeAssistant for LlmJudge {
    async fn classify(&self, url: &str, html: &str) -> Result<AssistantVerdict> {
        let prompt = build_judge_prompt(url, html, self.snippet_limit);
        let reply = self.client.complete_json(JUDGE_SYSTEM_PROMPT, &prompt).await?;
        parse_verdict(&reply)
    }
}

/// Result of the keyword tier alone.
fn keyword_verdict(success_hits: &[String], error_hits: &[String]) -> JudgeVerdict {
    match (success_hits.is_empty(), error_hits.is_empty()) {
        (false, true) => JudgeVerdict::Success,
        (true, false) => JudgeVerdict::Failure,
        _ => JudgeVerdict::Unknown,
    }
}

pub(crate) struct OutcomeJudge {
    vocabulary: Arc<Vocabulary>,
    assistant: Option<Arc<dyn JudgeAssistant>>,
    snippet_limit: usize,
}

impl OutcomeJudge {
    pub(crate) fn new(
        vocabulary: Arc<Vocabulary>,
        assistant: Option<Arc<dyn JudgeAssistant>>,
        snippet_limit: usize,
    ) -> Self {
        Self {
            vocabulary,
            assistant,
            snippet_limit,
        }
    }

    /// Classifies the final page. Never fails.
    pub(crate) async fn judge(&self, url: &str, html: &str) -> Judgement {
        let snippet = bounded_prefix(html, self.snippet_limit);
        let haystack = snippet.to_lowercase();
        let to_owned = |hits: Vec<&str>| hits.into_iter().map(str::to_string).collect::<Vec<_>>();
        let success_hits = to_owned(matching(&haystack, &self.vocabulary.success_phrases));
        let error_hits = to_owned(matching(&haystack, &self.vocabulary.error_phrases));
        let keyword = keyword_verdict(&success_hits, &error_hits);

        let mut judgement = Judgement {
            verdict: keyword,
            source: VerdictSource::Keyword,
            reason: None,
            success_hits,
            error_hits,
        };

        if keyword != JudgeVerdict::Unknown {
            tracing::info!(target: "judge", "Keyword verdict for {}: {:?}", url, keyword);
            return judgement;
        }

        let Some(assistant) = &self.assistant else {
            tracing::info!(target: "judge", "Ambiguous page at {} and no assistant configured", url);
            return judgement;
        };

        match assistant.classify(url, snippet).await {
            Ok(answer) => {
                judgement.verdict = match answer.status.trim().to_lowercase().as_str() {
                    "success" => JudgeVerdict::Success,
                    "failure" => JudgeVerdict::Failure,
                    _ => JudgeVerdict::Unknown,
                };
                judgement.source = VerdictSource::Assistant;
                judgement.reason = answer.reason;
                tracing::info!(target: "judge", "Assistant verdict for {}: {:?}", url, judgement.verdict);
            }
            Err(e) => {
                tracing::warn!(target: "judge", "Assistant failed for {}, keeping keyword verdict: {}", url, e);
                judgement.source = VerdictSource::KeywordFallback;
                judgement.reason = Some(e.to_string());
            }
        }
        judgement
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    struct FixedAssistant(Option<&'static str>);

    #[async_trait]
    impl JudgeAssistant for FixedAssistant {
        async fn classify(&self, _url: &str, _html: &str) -> Result<AssistantVerdict> {
            match self.0 {
                Some(status) => Ok(AssistantVerdict {
                    status: status.to_string(),
                    reason: Some("stub".to_string()),
                }),
                None => Err(AppError::Llm("offline".to_string())),
            }
        }
    }

    fn judge_with(assistant: Option<FixedAssistant>) -> OutcomeJudge {
        OutcomeJudge::new(
            Arc::new(Vocabulary::default()),
            assistant.map(|a| Arc::new(a) as Arc<dyn JudgeAssistant>),
            20_000,
        )
    }

    const URL: &str = "https://example.com/thanks";

    #[tokio::test]
    async fn test_keyword_tier_is_mutually_exclusive() {
        let judge = judge_with(None);
        let success = judge.judge(URL, "<p>送信が完了しました</p>").await;
        assert_eq!(success.verdict, JudgeVerdict::Success);
        assert_eq!(success.source, VerdictSource::Keyword);

        let failure = judge.judge(URL, "<p>必須項目が入力されていません</p>").await;
        assert_eq!(failure.verdict, JudgeVerdict::Failure);

        let both = judge
            .judge(URL, "<p>送信が完了しました</p><p>入力内容をご確認ください</p>")
            .await;
        assert_eq!(both.verdict, JudgeVerdict::Unknown);

        let neither = judge.judge(URL, "<p>Welcome</p>").await;
        assert_eq!(neither.verdict, JudgeVerdict::Unknown);
        assert!(neither.success_hits.is_empty() && neither.error_hits.is_empty());
    }

    #[tokio::test]
    async fn test_step_indicator_is_not_a_success() {
        let judge = judge_with(None);
        let confirm_page = "<ol class='steps'><li>入力</li><li class='current'>確認</li><li>送信完了</li></ol>\
            <form><input name='email' value='a@b.com'><button type='button'>送信する</button></form>";
        let judgement = judge.judge(URL, confirm_page).await;
        assert_eq!(judgement.verdict, JudgeVerdict::Unknown);
        assert!(judgement.success_hits.is_empty());

        let receipt_page = "<ol class='steps'><li>入力</li><li>確認</li><li>受付完了</li></ol>";
        assert_eq!(judge.judge(URL, receipt_page).await.verdict, JudgeVerdict::Unknown);
    }

    #[tokio::test]
    async fn test_assistant_only_consulted_when_ambiguous() {
        let judge = judge_with(Some(FixedAssistant(Some("failure"))));
        let clear = judge.judge(URL, "<p>ありがとうございました</p>").await;
        assert_eq!(clear.verdict, JudgeVerdict::Success);
        assert_eq!(clear.source, VerdictSource::Keyword);

        let ambiguous = judge.judge(URL, "<p>Welcome</p>").await;
        assert_eq!(ambiguous.verdict, JudgeVerdict::Failure);
        assert_eq!(ambiguous.source, VerdictSource::Assistant);
        assert_eq!(ambiguous.reason.as_deref(), Some("stub"));
    }

    #[tokio::test]
    async fn test_assistant_answers_outside_vocabulary_are_unknown() {
        let judge = judge_with(Some(FixedAssistant(Some("probably"))));
        let judgement = judge.judge(URL, "<p>Welcome</p>").await;
        assert_eq!(judgement.verdict, JudgeVerdict::Unknown);
        assert_eq!(judgement.source, VerdictSource::Assistant);
    }

    #[tokio::test]
    async fn test_assistant_failure_falls_back() {
        let judge = judge_with(Some(FixedAssistant(None)));
        let judgement = judge.judge(URL, "<p>Welcome</p>").await;
        assert_eq!(judgement.verdict, JudgeVerdict::Unknown);
        assert_eq!(judgement.source, VerdictSource::KeywordFallback);
    }

    #[tokio::test]
    async fn test_phrases_beyond_the_bound_are_ignored() {
        let judge = OutcomeJudge::new(Arc::new(Vocabulary::default()), None, 64);
        let html = format!("{}送信が完了しました", "x".repeat(100));
        assert_eq!(judge.judge(URL, &html).await.verdict, JudgeVerdict::Unknown);
    }
}
