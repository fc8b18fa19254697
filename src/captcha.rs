//! CAPTCHA detection.
//!
//! Detection is a plain case-insensitive scan for known integration markers. A positive
//! result is a hard stop for the engine: solving CAPTCHAs is not something it attempts.

use crate::vocabulary::{Vocabulary, matching};

/// Truncates `html` to at most `limit` bytes without splitting a UTF-8 character.
pub(crate) fn bounded_prefix(html: &str, limit: usize) -> &str {
    if html.len() <= limit {
        return html;
    }
    let mut end = limit;
    while !html.is_char_boundary(end) {
        end -= 1;
    }
    &html[..end]
}

/// Returns the CAPTCHA markers found in the first `scan_limit` bytes of `html`.
pub(crate) fn captcha_markers<'a>(
    vocabulary: &'a Vocabulary,
    html: &str,
    scan_limit: usize,
) -> Vec<&'a str> {
    let haystack = bounded_prefix(html, scan_limit).to_lowercase();
    matching(&haystack, &vocabulary.captcha_markers)
}

/// Whether `html` carries any known CAPTCHA marker.
pub(crate) fn detect_captcha(vocabulary: &Vocabulary, html: &str, scan_limit: usize) -> bool {
    !captcha_markers(vocabulary, html, scan_limit).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: usize = 20_000;

    #[test]
    fn test_detects_known_markers() {
        let vocab = Vocabulary::default();
        let samples = [
            r#"<div class="g-recaptcha" data-sitekey="xyz"></div>"#,
            r#"<script src="https://www.google.com/recaptcha/api.js"></script>"#,
            r#"<div class="H-CAPTCHA"></div>"#,
            r#"<div class="cf-turnstile"></div>"#,
        ];
        for html in samples {
            assert!(detect_captcha(&vocab, html, LIMIT), "missed marker in {}", html);
        }
    }

    #[test]
    fn test_clean_form_has_no_captcha() {
        let vocab = Vocabulary::default();
        let html = "<form><input name='email'><textarea name='msg'></textarea><button>送信</button></form>";
        assert!(!detect_captcha(&vocab, html, LIMIT));
    }

    #[test]
    fn test_detection_is_idempotent() {
        let vocab = Vocabulary::default();
        let html = r#"<form><div class="g-recaptcha"></div></form>"#;
        let first = detect_captcha(&vocab, html, LIMIT);
        let second = detect_captcha(&vocab, html, LIMIT);
        assert!(first && second);
    }

    #[test]
    fn test_scan_is_bounded() {
        let vocab = Vocabulary::default();
        let html = format!("{}<div class=\"g-recaptcha\"></div>", "a".repeat(100));
        assert!(!detect_captcha(&vocab, &html, 50));
        assert!(detect_captcha(&vocab, &html, 200));
    }

    #[test]
    fn test_bounded_prefix_respects_char_boundaries() {
        let text = "送信しました";
        let prefix = bounded_prefix(text, 4);
        assert_eq!(prefix, "送");
        assert_eq!(bounded_prefix(text, 100), text);
    }
}
