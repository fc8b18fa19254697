//! Defines the custom error types for the form-courier application.

use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;
use url::ParseError as UrlParseError;

/// The primary error type for the form submission process.
#[derive(Error, Debug)]
pub(crate) enum AppError {
    /// Error related to file input/output operations.
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),

    /// Error during JSON serialization or deserialization.
    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error parsing a URL.
    #[error("URL Parsing Error: {0}")]
    UrlParse(#[from] UrlParseError),

    /// Error making HTTP requests via reqwest.
    #[error("HTTP Request Error: {0}")]
    Request(#[from] reqwest::Error),

    /// The target page answered with a non-success status.
    #[error("HTTP Status {status} for {url}")]
    HttpStatus {
        /// The status code returned by the server.
        status: u16,
        /// The URL that was requested.
        url: String,
    },

    /// The page could not be loaded at all (network failure, timeout, bad status).
    #[error("Target Unreachable: {0}")]
    Unreachable(String),

    /// A single control could not be filled.
    #[error("Fill Error: {0}")]
    Fill(String),

    /// A click could not be translated into a navigation.
    #[error("Click Error: {0}")]
    Click(String),

    /// The Chromium backend failed to launch or lost its DevTools connection.
    #[error("Browser Error: {0}")]
    Browser(String),

    /// Error returned by the text-generation collaborator.
    #[error("LLM Error: {0}")]
    Llm(String),

    /// Error related to concurrency or task execution.
    #[error("Task Execution Error: {0}")]
    Task(String),

    /// An underlying error that doesn't fit other categories, using anyhow.
    #[error("Generic Error: {0}")]
    Generic(#[from] anyhow::Error),

    /// Indicates insufficient input data to proceed (e.g., missing form URL or message).
    #[error("Insufficient Input Data: {0}")]
    InsufficientInput(String),
}

pub(crate) type Result<T> = std::result::Result<T, AppError>;

/// Coarse classification of why an attempt did not end in a clean submission.
///
/// Carried in the debug report so callers can tell "the site rejected it" apart from
/// "we never found a form" without reading logs.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ErrorKind {
    /// Navigation or network failure on the main document.
    Unreachable,
    /// A CAPTCHA marker was detected; nothing was attempted.
    CaptchaBlocked,
    /// No form or pseudo-form with meaningful controls was located.
    NoFormFound,
    /// The planner declined or failed; heuristic-only fill was used.
    PlanUnavailable,
    /// The judge could not decide between success and failure.
    JudgeAmbiguous,
    /// Anything else that went wrong inside the session.
    Unexpected,
}

impl AppError {
    /// Maps an error onto the coarse taxonomy reported to callers.
    pub(crate) fn kind(&self) -> ErrorKind {
        match self {
            AppError::Request(_) | AppError::HttpStatus { .. } | AppError::Unreachable(_) => {
                ErrorKind::Unreachable
            }
            AppError::Llm(_) => ErrorKind::PlanUnavailable,
            _ => ErrorKind::Unexpected,
        }
    }
}
