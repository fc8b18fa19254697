//! Defines the configuration settings for the form-courier application.

use crate::models::AutoFillProfile;
use crate::vocabulary::{Vocabulary, VocabularyOverrides};
use anyhow::Context;
use clap::{Args, ValueEnum};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Transport that loads pages for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub(crate) enum BrowserBackend {
    /// Plain HTTP requests; page scripts never run.
    #[default]
    Http,
    /// A Chromium tab driven over the DevTools protocol.
    Chromium,
}

/// Settings shared by every subcommand.
#[derive(Args, Debug, Default, Clone)]
pub(crate) struct SettingsArgs {
    /// Path to configuration file (TOML format)
    #[arg(long = "config", global = true, env = "FORM_COURIER_CONFIG")]
    pub config_file: Option<String>,

    /// Maximum number of submissions running at once
    #[arg(long, global = true, env = "FORM_COURIER_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// Per-navigation timeout in seconds
    #[arg(long, global = true, env = "FORM_COURIER_NAVIGATION_TIMEOUT")]
    pub navigation_timeout: Option<u64>,

    /// Delay after each navigation, in milliseconds
    #[arg(long, global = true, env = "FORM_COURIER_SETTLE_DELAY_MS")]
    pub settle_delay_ms: Option<u64>,

    /// Pause between the confirm and the submit click, in milliseconds
    #[arg(long, global = true, env = "FORM_COURIER_CLICK_PAUSE_MS")]
    pub click_pause_ms: Option<u64>,

    /// Page transport: plain HTTP or a headless Chromium
    #[arg(long = "browser", global = true, value_enum, env = "FORM_COURIER_BROWSER")]
    pub browser_backend: Option<BrowserBackend>,

    /// Chrome/Chromium binary used by the chromium backend
    #[arg(long, global = true, env = "FORM_COURIER_CHROME")]
    pub chrome_executable: Option<PathBuf>,

    /// Maximum number of nested frames loaded per page
    #[arg(long, global = true, env = "FORM_COURIER_MAX_FRAMES")]
    pub max_frames: Option<usize>,

    /// User agent string for HTTP requests
    #[arg(long, global = true, env = "FORM_COURIER_USER_AGENT")]
    pub user_agent: Option<String>,

    /// Minimum sleep between batch jobs (seconds)
    #[arg(long, global = true, env = "FORM_COURIER_MIN_SLEEP")]
    pub min_sleep: Option<f32>,

    /// Maximum sleep between batch jobs (seconds)
    #[arg(long, global = true, env = "FORM_COURIER_MAX_SLEEP")]
    pub max_sleep: Option<f32>,

    /// Base URL of the OpenAI-compatible API
    #[arg(long, global = true, env = "FORM_COURIER_LLM_BASE_URL")]
    pub llm_base_url: Option<String>,

    /// Model used for planning and judging
    #[arg(long, global = true, env = "FORM_COURIER_LLM_MODEL")]
    pub llm_model: Option<String>,

    /// API key for the language model
    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub llm_api_key: Option<String>,

    /// Never ask the language model for a fill plan
    #[arg(long, global = true, env = "FORM_COURIER_NO_PLANNER")]
    pub no_planner: bool,

    /// Never ask the language model to judge ambiguous result pages
    #[arg(long, global = true, env = "FORM_COURIER_NO_JUDGE_ASSISTANT")]
    pub no_judge_assistant: bool,
}

/// TOML Configuration file structure
#[derive(Deserialize, Debug, Default)]
struct ConfigFile {
    network: Option<NetworkConfig>,
    page: Option<PageConfig>,
    processing: Option<ProcessingConfig>,
    llm: Option<LlmConfig>,
    browser: Option<BrowserFileConfig>,
    autofill: Option<AutoFillProfile>,
    vocabulary: Option<VocabularyOverrides>,
}

#[derive(Deserialize, Debug, Default)]
struct NetworkConfig {
    navigation_timeout: Option<u64>,
    settle_delay_ms: Option<u64>,
    click_pause_ms: Option<u64>,
    user_agent: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct PageConfig {
    snippet_limit: Option<usize>,
    captcha_scan_limit: Option<usize>,
    max_frames: Option<usize>,
}

#[derive(Deserialize, Debug, Default)]
struct ProcessingConfig {
    max_concurrency: Option<usize>,
    min_sleep: Option<f32>,
    max_sleep: Option<f32>,
}

#[derive(Deserialize, Debug, Default)]
struct BrowserFileConfig {
    backend: Option<BrowserBackend>,
    executable: Option<PathBuf>,
    headless: Option<bool>,
    no_sandbox: Option<bool>,
    render_delay_ms: Option<u64>,
}

#[derive(Deserialize, Debug, Default)]
struct LlmConfig {
    base_url: Option<String>,
    model: Option<String>,
    api_key: Option<String>,
    timeout: Option<u64>,
    planner_enabled: Option<bool>,
    judge_enabled: Option<bool>,
}

/// Application configuration settings.
#[derive(Clone)]
pub(crate) struct Config {
    /// Timeout for each page navigation.
    pub navigation_timeout: Duration,
    /// Wait after each navigation so late content is in place.
    pub settle_delay: Duration,
    /// Pause between the confirm-preferred and submit-preferred click.
    pub click_pause: Duration,
    /// Upper bound, in bytes, of HTML handed to the planner and judge.
    pub snippet_limit: usize,
    /// Upper bound, in bytes, of HTML scanned for CAPTCHA markers per context.
    pub captcha_scan_limit: usize,
    /// Maximum nested frames loaded per page.
    pub max_frames: usize,
    /// User agent string to use for HTTP requests.
    pub user_agent: String,
    pub browser_backend: BrowserBackend,
    /// Browser binary; `None` lets the launcher search the usual locations.
    pub chrome_executable: Option<PathBuf>,
    pub headless: bool,
    pub no_sandbox: bool,
    /// Extra wait in the Chromium backend after each load, for script-rendered forms.
    pub render_delay: Duration,
    /// Maximum number of concurrent submissions in batch mode.
    pub max_concurrency: usize,
    /// Minimum and maximum sleep between batch jobs (seconds).
    pub sleep_between_jobs: (f32, f32),
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_api_key: Option<String>,
    pub llm_timeout: Duration,
    pub planner_enabled: bool,
    pub judge_assistant_enabled: bool,
    /// Values used for fields the sender profile leaves empty.
    pub autofill_fallback: AutoFillProfile,
    pub vocabulary_overrides: VocabularyOverrides,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            navigation_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_millis(1500),
            click_pause: Duration::from_millis(800),
            snippet_limit: 20_000,
            captcha_scan_limit: 20_000,
            max_frames: 8,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".to_string(),
            browser_backend: BrowserBackend::Http,
            chrome_executable: None,
            headless: true,
            no_sandbox: false,
            render_delay: Duration::from_millis(500),
            max_concurrency: 3,
            sleep_between_jobs: (0.5, 2.0),
            llm_base_url: "https://api.openai.com/v1".to_string(),
            llm_model: "gpt-4o-mini".to_string(),
            llm_api_key: None,
            llm_timeout: Duration::from_secs(60),
            planner_enabled: true,
            judge_assistant_enabled: true,
            autofill_fallback: AutoFillProfile {
                subject: "お問い合わせ".to_string(),
                ..Default::default()
            },
            vocabulary_overrides: VocabularyOverrides::default(),
        }
    }
}

impl Config {
    /// The heuristic vocabulary with configured replacements applied.
    pub(crate) fn vocabulary(&self) -> Vocabulary {
        Vocabulary::with_overrides(&self.vocabulary_overrides)
    }
}

/// Load configuration from a TOML file
fn load_config_file(file_path: &str) -> anyhow::Result<ConfigFile> {
    let content = fs::read_to_string(file_path)
        .with_context(|| format!("Failed to read configuration file: {}", file_path))?;
    let config = parse_config_file(&content)
        .with_context(|| format!("Failed to parse TOML configuration from {}", file_path))?;
    tracing::info!("Loaded configuration from {}", file_path);
    Ok(config)
}

fn parse_config_file(content: &str) -> anyhow::Result<ConfigFile> {
    Ok(toml::from_str(content)?)
}

fn apply_file_config(config: &mut Config, file_config: ConfigFile) {
    if let Some(network) = file_config.network {
        if let Some(timeout) = network.navigation_timeout {
            config.navigation_timeout = Duration::from_secs(timeout);
        }
        if let Some(delay) = network.settle_delay_ms {
            config.settle_delay = Duration::from_millis(delay);
        }
        if let Some(pause) = network.click_pause_ms {
            config.click_pause = Duration::from_millis(pause);
        }
        if let Some(user_agent) = network.user_agent {
            config.user_agent = user_agent;
        }
    }

    if let Some(page) = file_config.page {
        if let Some(limit) = page.snippet_limit {
            config.snippet_limit = limit;
        }
        if let Some(limit) = page.captcha_scan_limit {
            config.captcha_scan_limit = limit;
        }
        if let Some(frames) = page.max_frames {
            config.max_frames = frames;
        }
    }

    if let Some(processing) = file_config.processing {
        if let Some(concurrency) = processing.max_concurrency {
            config.max_concurrency = concurrency;
        }
        if let Some(min_sleep) = processing.min_sleep {
            config.sleep_between_jobs.0 = min_sleep;
        }
        if let Some(max_sleep) = processing.max_sleep {
            config.sleep_between_jobs.1 = max_sleep;
        }
    }

    if let Some(browser) = file_config.browser {
        if let Some(backend) = browser.backend {
            config.browser_backend = backend;
        }
        if browser.executable.is_some() {
            config.chrome_executable = browser.executable;
        }
        if let Some(headless) = browser.headless {
            config.headless = headless;
        }
        if let Some(no_sandbox) = browser.no_sandbox {
            config.no_sandbox = no_sandbox;
        }
        if let Some(delay) = browser.render_delay_ms {
            config.render_delay = Duration::from_millis(delay);
        }
    }

    if let Some(llm) = file_config.llm {
        if let Some(base_url) = llm.base_url {
            config.llm_base_url = base_url;
        }
        if let Some(model) = llm.model {
            config.llm_model = model;
        }
        if llm.api_key.is_some() {
            config.llm_api_key = llm.api_key;
        }
        if let Some(timeout) = llm.timeout {
            config.llm_timeout = Duration::from_secs(timeout);
        }
        if let Some(enabled) = llm.planner_enabled {
            config.planner_enabled = enabled;
        }
        if let Some(enabled) = llm.judge_enabled {
            config.judge_assistant_enabled = enabled;
        }
    }

    if let Some(profile) = file_config.autofill {
        config.autofill_fallback = profile;
    }
    if let Some(vocabulary) = file_config.vocabulary {
        config.vocabulary_overrides = vocabulary;
    }
}

/// Apply command line arguments to the Config instance
fn apply_cli_args(config: &mut Config, args: &SettingsArgs) {
    if let Some(concurrency) = args.concurrency {
        config.max_concurrency = concurrency;
    }
    if let Some(timeout) = args.navigation_timeout {
        config.navigation_timeout = Duration::from_secs(timeout);
    }
    if let Some(delay) = args.settle_delay_ms {
        config.settle_delay = Duration::from_millis(delay);
    }
    if let Some(pause) = args.click_pause_ms {
        config.click_pause = Duration::from_millis(pause);
    }
    if let Some(backend) = args.browser_backend {
        config.browser_backend = backend;
    }
    if args.chrome_executable.is_some() {
        config.chrome_executable = args.chrome_executable.clone();
    }
    if let Some(frames) = args.max_frames {
        config.max_frames = frames;
    }
    if let Some(ref agent) = args.user_agent {
        config.user_agent = agent.clone();
    }
    if let Some(min_sleep) = args.min_sleep {
        config.sleep_between_jobs.0 = min_sleep;
    }
    if let Some(max_sleep) = args.max_sleep {
        config.sleep_between_jobs.1 = max_sleep;
    }
    if let Some(ref base_url) = args.llm_base_url {
        config.llm_base_url = base_url.clone();
    }
    if let Some(ref model) = args.llm_model {
        config.llm_model = model.clone();
    }
    if args.llm_api_key.is_some() {
        config.llm_api_key = args.llm_api_key.clone();
    }
    if args.no_planner {
        config.planner_enabled = false;
    }
    if args.no_judge_assistant {
        config.judge_assistant_enabled = false;
    }
}

fn validate_config(config: &mut Config) {
    if config.sleep_between_jobs.0 < 0.0 {
        config.sleep_between_jobs.0 = 0.0;
        tracing::warn!("Min sleep was negative. Setting to 0.");
    }
    if config.sleep_between_jobs.0 > config.sleep_between_jobs.1 {
        config.sleep_between_jobs.1 = config.sleep_between_jobs.0;
        tracing::warn!(
            "Min sleep was greater than max sleep. Setting both to {}",
            config.sleep_between_jobs.0
        );
    }

    if config.max_concurrency == 0 {
        config.max_concurrency = 1;
        tracing::warn!("Concurrency was set to 0. Setting to 1.");
    }

    if config.navigation_timeout.is_zero() {
        config.navigation_timeout = Duration::from_secs(30);
        tracing::warn!("Navigation timeout was 0. Setting to 30s.");
    }

    if config.snippet_limit < 1_000 {
        config.snippet_limit = 1_000;
        tracing::warn!("Snippet limit below 1000 bytes. Setting to 1000.");
    }

    if config.captcha_scan_limit == 0 {
        config.captcha_scan_limit = 20_000;
        tracing::warn!("CAPTCHA scan limit was 0. Setting to 20000.");
    }
}

pub(crate) fn build_config(args: &SettingsArgs) -> anyhow::Result<Config> {
    let mut config = Config::default();

    if let Some(ref file_path) = args.config_file {
        let file_config = load_config_file(file_path)?;
        apply_file_config(&mut config, file_config);
    } else {
        for path in ["./form-courier.toml", "./config.toml"] {
            if Path::new(path).exists() {
                match load_config_file(path) {
                    Ok(file_config) => {
                        apply_file_config(&mut config, file_config);
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load configuration from {}: {:#}", path, e);
                    }
                }
            }
        }
    }

    apply_cli_args(&mut config, args);
    validate_config(&mut config);

    tracing::debug!(
        "Final configuration: backend={:?}, concurrency={}, navigation_timeout={:?}, settle_delay={:?}, max_frames={}, llm_key_present={}",
        config.browser_backend,
        config.max_concurrency,
        config.navigation_timeout,
        config.settle_delay,
        config.max_frames,
        config.llm_api_key.is_some()
    );

    Ok(config)
}

pub(crate) fn random_sleep_duration(config: &Config) -> Duration {
    use rand::Rng;
    let (min, max) = config.sleep_between_jobs;
    if min >= max {
        return Duration::from_secs_f32(min);
    }
    let duration_secs = rand::thread_rng().gen_range(min..max);
    Duration::from_secs_f32(duration_secs)
}
