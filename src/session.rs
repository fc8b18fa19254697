//! Browsing sessions: page loading, frame discovery and click-driven navigation.
//!
//! A session owns its own transport (a `reqwest::Client` with a private cookie jar, or a
//! Chromium instance with a throwaway profile), so nothing leaks between two submissions
//! running side by side.

use crate::config::Config;
use crate::dom::{ClickableKind, FrameContext, FrameSource, LoadedPage, ScopeBoundary};
use crate::error::{AppError, Result};
use crate::models::HttpMethod;
use async_trait::async_trait;
use reqwest::Client;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use url::Url;

/// A single navigation the session should perform.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct NavRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub form: Vec<(String, String)>,
}

impl NavRequest {
    pub(crate) fn get(url: Url) -> Self {
        NavRequest {
            method: HttpMethod::Get,
            url,
            form: Vec::new(),
        }
    }

    /// URL actually requested: GET submissions carry the form in the query string.
    pub(crate) fn target_url(&self) -> Url {
        let mut url = self.url.clone();
        if self.method == HttpMethod::Get && !self.form.is_empty() {
            url.set_query(None);
            url.query_pairs_mut().extend_pairs(self.form.iter());
        }
        url
    }
}

/// A fetched document after redirects.
#[derive(Debug, Clone)]
pub(crate) struct FetchedPage {
    pub url: Url,
    pub status: u16,
    pub html: String,
}

/// Transport used by a session to retrieve documents.
#[async_trait]
pub(crate) trait PageFetcher: Send + Sync {
    async fn fetch(&self, request: &NavRequest) -> Result<FetchedPage>;

    /// Loads a nested frame document without replacing the current one.
    async fn fetch_frame(&self, url: &Url) -> Result<FetchedPage> {
        self.fetch(&NavRequest::get(url.clone())).await
    }

    /// Releases whatever the transport holds open.
    async fn close(&self) {}
}

/// `reqwest`-backed fetcher with a private cookie store.
pub(crate) struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub(crate) fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.navigation_timeout)
            .cookie_store(true)
            .build()
            .map_err(|e| {
                AppError::Generic(anyhow::anyhow!("Failed to build HTTP client: {}", e))
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, request: &NavRequest) -> Result<FetchedPage> {
        tracing::debug!(target: "session", "{:?} {}", request.method, request.url);

        let builder = match request.method {
            HttpMethod::Get => self.client.get(request.target_url()),
            HttpMethod::Post => self.client.post(request.url.clone()).form(&request.form),
        };

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                tracing::warn!(target: "session", "Timeout loading {}: {}", request.url, e);
            } else {
                tracing::warn!(target: "session", "Request error loading {}: {}", request.url, e);
            }
            AppError::Request(e)
        })?;

        let url = response.url().clone();
        let status = response.status().as_u16();
        let html = response.text().await?;
        Ok(FetchedPage { url, status, html })
    }
}

/// Creates one fresh session per submission attempt.
#[async_trait]
pub(crate) trait SessionFactory: Send + Sync {
    async fn open_session(&self) -> Result<BrowsingSession>;
}

/// Factory producing sessions backed by [`HttpFetcher`].
pub(crate) struct HttpSessionFactory {
    config: Arc<Config>,
}

impl HttpSessionFactory {
    pub(crate) fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SessionFactory for HttpSessionFactory {
    async fn open_session(&self) -> Result<BrowsingSession> {
        let fetcher = HttpFetcher::new(&self.config)?;
        Ok(BrowsingSession::new(
            Arc::new(fetcher),
            SessionSettings::from_config(&self.config),
        ))
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct SessionSettings {
    pub max_frames: usize,
    pub settle_delay: Duration,
}

impl SessionSettings {
    pub(crate) fn from_config(config: &Config) -> Self {
        Self {
            max_frames: config.max_frames,
            settle_delay: config.settle_delay,
        }
    }
}

/// What a click did to the page.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ClickEffect {
    Navigated { url: Url, status: u16 },
    NoNavigation,
}

/// One isolated browsing session holding the current page.
pub(crate) struct BrowsingSession {
    fetcher: Arc<dyn PageFetcher>,
    settings: SessionSettings,
    page: Option<LoadedPage>,
    generation: u64,
    closed: bool,
}

impl BrowsingSession {
    pub(crate) fn new(fetcher: Arc<dyn PageFetcher>, settings: SessionSettings) -> Self {
        Self {
            fetcher,
            settings,
            page: None,
            generation: 0,
            closed: false,
        }
    }

    pub(crate) fn page(&self) -> Option<&LoadedPage> {
        self.page.as_ref()
    }

    pub(crate) fn page_mut(&mut self) -> Option<&mut LoadedPage> {
        self.page.as_mut()
    }

    #[cfg(test)]
    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    /// Loads `url` as the main document together with its nested frames.
    /// Fails only when the main document cannot be retrieved with a success status.
    pub(crate) async fn open(&mut self, url: &Url) -> Result<&LoadedPage> {
        if self.closed {
            return Err(AppError::Task("session already closed".to_string()));
        }
        let fetched = self
            .fetcher
            .fetch(&NavRequest::get(url.clone()))
            .await
            .map_err(|e| AppError::Unreachable(format!("{}: {}", url, e)))?;

        if !(200..300).contains(&fetched.status) {
            return Err(AppError::HttpStatus {
                status: fetched.status,
                url: fetched.url.to_string(),
            });
        }

        self.install(fetched).await;
        self.page
            .as_ref()
            .ok_or_else(|| AppError::Task("page missing after load".to_string()))
    }

    /// Builds the page model for a fetched main document, loading frames breadth-first.
    async fn install(&mut self, fetched: FetchedPage) {
        self.generation += 1;
        let main = FrameContext::parse(0, fetched.url.clone(), &fetched.html);
        let mut pending: VecDeque<(FrameSource, Url)> = main
            .frame_sources
            .iter()
            .cloned()
            .map(|source| (source, main.url.clone()))
            .collect();
        let mut contexts = vec![main];

        while let Some((source, parent_url)) = pending.pop_front() {
            if contexts.len() > self.settings.max_frames {
                tracing::debug!(target: "session", "Frame limit reached, ignoring remaining frames");
                break;
            }
            let index = contexts.len();
            let context = match source {
                FrameSource::Inline(html) => FrameContext::parse(index, parent_url, &html),
                FrameSource::Url(frame_url) => {
                    match self.fetcher.fetch_frame(&frame_url).await {
                        Ok(frame) => FrameContext::parse(index, frame.url, &frame.html),
                        Err(e) => {
                            tracing::warn!(target: "session", "Frame {} failed to load: {}", frame_url, e);
                            FrameContext::parse(index, frame_url, "")
                        }
                    }
                }
            };
            pending.extend(
                context
                    .frame_sources
                    .iter()
                    .cloned()
                    .map(|source| (source, context.url.clone())),
            );
            contexts.push(context);
        }

        tracing::info!(
            target: "session",
            "Loaded {} (status {}, {} contexts)",
            fetched.url,
            fetched.status,
            contexts.len()
        );
        self.page = Some(LoadedPage::new(
            fetched.url,
            fetched.status,
            contexts,
            self.generation,
        ));
    }

    /// Works out which navigation pressing `button_index` in `context_index` would cause.
    fn navigation_for(
        &self,
        context_index: usize,
        button_index: usize,
    ) -> Result<Option<NavRequest>> {
        let page = self
            .page
            .as_ref()
            .ok_or_else(|| AppError::Click("no page loaded".to_string()))?;
        let context = page
            .context(context_index)
            .ok_or_else(|| AppError::Click(format!("no context {}", context_index)))?;
        let button = context
            .buttons
            .get(button_index)
            .ok_or_else(|| AppError::Click(format!("no clickable {}", button_index)))?;

        if button.kind == ClickableKind::Anchor {
            let Some(href) = button.href.as_deref() else {
                return Ok(None);
            };
            if href.starts_with('#') || href.to_lowercase().starts_with("javascript:") {
                return Ok(None);
            }
            return Ok(Some(NavRequest::get(context.url.join(href)?)));
        }

        if !button.submits_form() {
            return Ok(None);
        }
        let Some(form_index) = button.form else {
            return Ok(None);
        };
        let form = context
            .forms
            .get(form_index)
            .ok_or_else(|| AppError::Click(format!("no form {}", form_index)))?;
        if form
            .enctype
            .as_deref()
            .is_some_and(|e| e.eq_ignore_ascii_case("multipart/form-data"))
        {
            tracing::debug!(target: "session", "Form #{} is multipart; sending urlencoded instead", form.index);
        }

        let action = match form.action.as_deref() {
            Some(action) if !action.is_empty() => context.url.join(action)?,
            _ => context.url.clone(),
        };
        let payload = context.form_payload(ScopeBoundary::Form(form_index), Some(button));
        Ok(Some(NavRequest {
            method: form.method,
            url: action,
            form: payload,
        }))
    }

    /// Presses a clickable element and, if that navigates, loads the resulting page and
    /// waits for the settle delay.
    pub(crate) async fn click(
        &mut self,
        context_index: usize,
        button_index: usize,
    ) -> Result<ClickEffect> {
        if self.closed {
            return Err(AppError::Task("session already closed".to_string()));
        }
        let Some(request) = self.navigation_for(context_index, button_index)? else {
            tracing::debug!(target: "session", "Click caused no navigation");
            return Ok(ClickEffect::NoNavigation);
        };

        let fetched = self.fetcher.fetch(&request).await?;
        let effect = ClickEffect::Navigated {
            url: fetched.url.clone(),
            status: fetched.status,
        };
        self.install(fetched).await;
        sleep(self.settings.settle_delay).await;
        Ok(effect)
    }

    /// Releases the session. Safe to call more than once.
    pub(crate) async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.page = None;
        self.fetcher.close().await;
        tracing::debug!(target: "session", "Session closed");
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves fixed documents by URL and records every request it sees.
    #[derive(Default)]
    pub(crate) struct StaticFetcher {
        pub pages: HashMap<String, String>,
        pub requests: Mutex<Vec<NavRequest>>,
    }

    impl StaticFetcher {
        pub(crate) fn with_page(mut self, url: &str, html: &str) -> Self {
            self.pages.insert(url.to_string(), html.to_string());
            self
        }
    }

    #[async_trait]
    impl PageFetcher for StaticFetcher {
        async fn fetch(&self, request: &NavRequest) -> Result<FetchedPage> {
            if let Ok(mut requests) = self.requests.lock() {
                requests.push(request.clone());
            }
            let mut key = request.url.clone();
            key.set_query(None);
            match self.pages.get(key.as_str()) {
                Some(html) => Ok(FetchedPage {
                    url: request.url.clone(),
                    status: 200,
                    html: html.clone(),
                }),
                None => Err(AppError::Unreachable(request.url.to_string())),
            }
        }
    }

    pub(crate) fn settings() -> SessionSettings {
        SessionSettings {
            max_frames: 4,
            settle_delay: Duration::from_millis(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{StaticFetcher, settings};
    use super::*;

    fn session(fetcher: StaticFetcher) -> (BrowsingSession, Arc<StaticFetcher>) {
        let fetcher = Arc::new(fetcher);
        (BrowsingSession::new(fetcher.clone(), settings()), fetcher)
    }

    #[tokio::test]
    async fn test_open_loads_nested_frames() {
        let fetcher = StaticFetcher::default()
            .with_page(
                "https://example.com/contact",
                r#"<iframe src="/embed"></iframe><iframe srcdoc="<form><input name='a'></form>"></iframe>"#,
            )
            .with_page("https://example.com/embed", "<form><input name='email'></form>");
        let (mut session, _) = session(fetcher);
        let url = Url::parse("https://example.com/contact").unwrap();
        let page = session.open(&url).await.unwrap();
        assert_eq!(page.contexts().len(), 3);
        assert_eq!(page.contexts()[1].url.as_str(), "https://example.com/embed");
        assert_eq!(page.contexts()[2].controls.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_frame_contributes_empty_context() {
        let fetcher = StaticFetcher::default()
            .with_page("https://example.com/", r#"<iframe src="https://gone.example.net/"></iframe>"#);
        let (mut session, _) = session(fetcher);
        let page = session
            .open(&Url::parse("https://example.com/").unwrap())
            .await
            .unwrap();
        assert_eq!(page.contexts().len(), 2);
        assert!(page.contexts()[1].controls.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_main_document() {
        let (mut session, _) = session(StaticFetcher::default());
        let err = session
            .open(&Url::parse("https://nowhere.example/").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unreachable(_)));
    }

    #[tokio::test]
    async fn test_click_submits_form_with_live_values() {
        let fetcher = StaticFetcher::default()
            .with_page(
                "https://example.com/contact",
                r#"<form action="done" method="post"><input name="email"><button name="go" value="1">送信</button></form>"#,
            )
            .with_page("https://example.com/done", "<p>ok</p>");
        let (mut session, fetcher) = session(fetcher);
        session
            .open(&Url::parse("https://example.com/contact").unwrap())
            .await
            .unwrap();
        session
            .page_mut()
            .unwrap()
            .context_mut(0)
            .unwrap()
            .set_text(0, "a@b.com")
            .unwrap();

        let effect = session.click(0, 0).await.unwrap();
        assert!(matches!(effect, ClickEffect::Navigated { status: 200, .. }));
        assert_eq!(session.page().unwrap().generation, 2);

        let requests = fetcher.requests.lock().unwrap();
        let last = requests.last().unwrap();
        assert_eq!(last.method, HttpMethod::Post);
        assert_eq!(last.url.as_str(), "https://example.com/done");
        assert_eq!(
            last.form,
            vec![
                ("email".to_string(), "a@b.com".to_string()),
                ("go".to_string(), "1".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_plain_button_does_not_navigate() {
        let fetcher = StaticFetcher::default().with_page(
            "https://example.com/",
            r#"<form><input name="q"><button type="button">確認</button></form>"#,
        );
        let (mut session, _) = session(fetcher);
        session
            .open(&Url::parse("https://example.com/").unwrap())
            .await
            .unwrap();
        assert_eq!(session.click(0, 0).await.unwrap(), ClickEffect::NoNavigation);
        assert_eq!(session.page().unwrap().generation, 1);
    }

    #[test]
    fn test_get_submission_moves_form_into_query() {
        let request = NavRequest {
            method: HttpMethod::Get,
            url: Url::parse("https://example.com/search?old=1").unwrap(),
            form: vec![("q".to_string(), "見積 依頼".to_string())],
        };
        assert_eq!(
            request.target_url().as_str(),
            "https://example.com/search?q=%E8%A6%8B%E7%A9%8D+%E4%BE%9D%E9%A0%BC"
        );

        let post = NavRequest {
            method: HttpMethod::Post,
            ..request
        };
        assert_eq!(post.target_url().as_str(), "https://example.com/search?old=1");
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (mut session, _) = session(StaticFetcher::default());
        session.close().await;
        session.close().await;
        assert!(session.is_closed());
        assert!(session.page().is_none());
        assert!(session.click(0, 0).await.is_err());
    }
}
