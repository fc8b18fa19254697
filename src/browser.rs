//! Chromium-backed page transport driven over the DevTools protocol.
//!
//! Each session launches its own browser with a throwaway profile, so cookies never leak
//! between submissions. Pages load in a real tab and page scripts run before the rendered
//! DOM is read back into the page model.

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::HttpMethod;
use crate::session::{
    BrowsingSession, FetchedPage, NavRequest, PageFetcher, SessionFactory, SessionSettings,
};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use url::Url;

/// Status of the current document, when the browser exposes it.
const STATUS_SCRIPT: &str = "(() => { const e = performance.getEntriesByType('navigation')[0]; \
     return e && e.responseStatus ? e.responseStatus : null; })()";

fn browser_error(context: &str, e: impl Display) -> AppError {
    AppError::Browser(format!("{}: {}", context, e))
}

/// Command-line switches passed to Chromium.
fn launch_args(config: &Config) -> Vec<String> {
    let mut args: Vec<String> = [
        "--disable-background-networking",
        "--disable-breakpad",
        "--disable-component-update",
        "--disable-default-apps",
        "--disable-dev-shm-usage",
        "--disable-extensions",
        "--disable-popup-blocking",
        "--disable-prompt-on-repost",
        "--disable-sync",
        "--no-first-run",
        "--no-default-browser-check",
        "--password-store=basic",
        "--use-mock-keychain",
    ]
    .iter()
    .map(|arg| arg.to_string())
    .collect();
    if config.headless {
        args.push("--headless=new".to_string());
        args.push("--mute-audio".to_string());
    }
    args.push(format!("--user-agent={}", config.user_agent));
    args
}

fn browser_config(config: &Config, profile_dir: &Path) -> Result<BrowserConfig> {
    let mut builder = BrowserConfig::builder()
        .request_timeout(config.navigation_timeout)
        .launch_timeout(Duration::from_secs(20))
        .user_data_dir(profile_dir)
        .args(launch_args(config));
    if !config.headless {
        builder = builder.with_head();
    }
    if config.no_sandbox {
        builder = builder.no_sandbox();
    }
    if let Some(executable) = &config.chrome_executable {
        builder = builder.chrome_executable(executable);
    }
    builder
        .build()
        .map_err(|e| browser_error("invalid browser configuration", e))
}

/// Script that builds a detached form and submits it, replaying a POST inside the tab.
///
/// The prototype `submit` is used so a control named `submit` cannot shadow it.
fn post_script(action: &Url, fields: &[(String, String)]) -> Result<String> {
    let action = serde_json::to_string(action.as_str())?;
    let fields = serde_json::to_string(fields)?;
    Ok(format!(
        "(() => {{ const f = document.createElement('form'); f.method = 'post'; f.action = {}; \
         for (const [n, v] of {}) {{ const i = document.createElement('input'); \
         i.type = 'hidden'; i.name = n; i.value = v; f.appendChild(i); }} \
         document.documentElement.appendChild(f); HTMLFormElement.prototype.submit.call(f); \
         return true; }})()",
        action, fields
    ))
}

/// One browser with a single main tab.
pub(crate) struct CdpFetcher {
    browser: Mutex<Option<Browser>>,
    page: Page,
    handler: Mutex<Option<JoinHandle<()>>>,
    profile_dir: PathBuf,
    navigation_timeout: Duration,
    render_delay: Duration,
}

impl CdpFetcher {
    pub(crate) async fn launch(config: &Config) -> Result<Self> {
        let profile_dir =
            std::env::temp_dir().join(format!("form-courier-{:016x}", rand::random::<u64>()));
        let (browser, mut handler) = Browser::launch(browser_config(config, &profile_dir)?)
            .await
            .map_err(|e| browser_error("failed to launch chromium", e))?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!(target: "browser", "DevTools handler stopped: {}", e);
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler.abort();
                return Err(browser_error("failed to open a tab", e));
            }
        };
        tracing::debug!(target: "browser", "Launched chromium with profile {}", profile_dir.display());

        Ok(Self {
            browser: Mutex::new(Some(browser)),
            page,
            handler: Mutex::new(Some(handler)),
            profile_dir,
            navigation_timeout: config.navigation_timeout,
            render_delay: config.render_delay,
        })
    }

    /// Reads the rendered document out of `tab`.
    async fn read_back(&self, tab: &Page, requested: &Url) -> Result<FetchedPage> {
        sleep(self.render_delay).await;
        let html = tab
            .content()
            .await
            .map_err(|e| browser_error("failed to read the document", e))?;
        let url = tab
            .url()
            .await
            .ok()
            .flatten()
            .and_then(|u| Url::parse(&u).ok())
            .unwrap_or_else(|| requested.clone());
        let status = match tab.evaluate(STATUS_SCRIPT).await {
            Ok(result) => result.into_value::<Option<u16>>().ok().flatten(),
            Err(_) => None,
        }
        .unwrap_or(200);
        Ok(FetchedPage { url, status, html })
    }

    async fn navigate(&self, request: &NavRequest) -> Result<()> {
        match request.method {
            HttpMethod::Get => {
                self.page
                    .goto(request.target_url().as_str())
                    .await
                    .map_err(|e| AppError::Unreachable(format!("{}: {}", request.url, e)))?;
            }
            HttpMethod::Post => {
                let script = post_script(&request.url, &request.form)?;
                if let Err(e) = self.page.evaluate(script).await {
                    tracing::debug!(target: "browser", "Submit script for {} reported: {}", request.url, e);
                }
                self.page
                    .wait_for_navigation()
                    .await
                    .map_err(|e| AppError::Unreachable(format!("{}: {}", request.url, e)))?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PageFetcher for CdpFetcher {
    async fn fetch(&self, request: &NavRequest) -> Result<FetchedPage> {
        tracing::debug!(target: "browser", "{:?} {}", request.method, request.url);
        timeout(self.navigation_timeout, self.navigate(request))
            .await
            .map_err(|_| AppError::Unreachable(format!("timed out loading {}", request.url)))??;
        self.read_back(&self.page, &request.url).await
    }

    async fn fetch_frame(&self, url: &Url) -> Result<FetchedPage> {
        let tab = {
            let guard = self.browser.lock().await;
            let browser = guard
                .as_ref()
                .ok_or_else(|| AppError::Browser("browser already closed".to_string()))?;
            timeout(self.navigation_timeout, browser.new_page(url.as_str()))
                .await
                .map_err(|_| AppError::Unreachable(format!("timed out loading frame {}", url)))?
                .map_err(|e| browser_error("failed to open frame tab", e))?
        };
        let fetched = self.read_back(&tab, url).await;
        if let Err(e) = tab.close().await {
            tracing::debug!(target: "browser", "Frame tab for {} did not close cleanly: {}", url, e);
        }
        fetched
    }

    async fn close(&self) {
        if let Some(mut browser) = self.browser.lock().await.take() {
            if let Err(e) = browser.close().await {
                tracing::warn!(target: "browser", "Chromium did not shut down cleanly: {}", e);
            }
        }
        if let Some(handler) = self.handler.lock().await.take() {
            handler.abort();
        }
        if let Err(e) = tokio::fs::remove_dir_all(&self.profile_dir).await {
            tracing::debug!(target: "browser", "Could not remove profile {}: {}", self.profile_dir.display(), e);
        }
    }
}

/// Factory producing sessions backed by [`CdpFetcher`].
pub(crate) struct CdpSessionFactory {
    config: Arc<Config>,
}

impl CdpSessionFactory {
    pub(crate) fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SessionFactory for CdpSessionFactory {
    async fn open_session(&self) -> Result<BrowsingSession> {
        let fetcher = CdpFetcher::launch(&self.config).await?;
        Ok(BrowsingSession::new(
            Arc::new(fetcher),
            SessionSettings::from_config(&self.config),
        ))
    }
}
