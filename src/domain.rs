//! Utility functions for handling target URLs.

use crate::error::{AppError, Result};
use url::Url;

/// Parses a contact-form URL, adding `https://` when the scheme is missing.
///
/// Only `http` and `https` URLs with a host are accepted.
pub(crate) fn normalize_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::InsufficientInput(
            "Contact form URL is empty".to_string(),
        ));
    }
    let lowered = trimmed.to_ascii_lowercase();
    let with_scheme = if lowered.starts_with("http://") || lowered.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let url = Url::parse(&with_scheme).map_err(|e| {
        tracing::warn!("Failed to parse URL '{}' (original: {}): {}", with_scheme, raw, e);
        AppError::UrlParse(e)
    })?;

    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(AppError::InsufficientInput(format!(
            "Not a web page URL: {}",
            raw
        )));
    }
    Ok(url)
}

/// Lowercased host without a leading `www.`, for log labels.
pub(crate) fn display_host(url: &Url) -> String {
    let host = url.host_str().unwrap_or("unknown-host");
    host.strip_prefix("www.").unwrap_or(host).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_adds_scheme() {
        assert_eq!(
            normalize_url("example.co.jp/contact").unwrap().as_str(),
            "https://example.co.jp/contact"
        );
        assert_eq!(
            normalize_url("  http://example.com/inquiry/ ").unwrap().as_str(),
            "http://example.com/inquiry/"
        );
    }

    #[test]
    fn test_normalize_accepts_uppercase_scheme() {
        assert_eq!(
            normalize_url("HTTPS://Example.com/Contact").unwrap().as_str(),
            "https://example.com/Contact"
        );
        assert_eq!(
            normalize_url("Http://example.com").unwrap().as_str(),
            "http://example.com/"
        );
    }

    #[test]
    fn test_normalize_rejects_empty_and_hostless() {
        assert!(matches!(
            normalize_url(""),
            Err(AppError::InsufficientInput(_))
        ));
        assert!(normalize_url("http://").is_err());
        assert!(normalize_url("https://exa mple.com").is_err());
    }

    #[test]
    fn test_display_host() {
        let url = Url::parse("https://WWW.Example.com:8080/contact").unwrap();
        assert_eq!(display_host(&url), "example.com");
    }
}
