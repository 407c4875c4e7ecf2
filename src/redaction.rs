//! C4 — Redactor: strips sensitive substrings before anything text-derived is persisted.

use once_cell::sync::Lazy;
use regex::{Regex, RegexSet};
use sha2::{Digest, Sha256};

const REPLACEMENT: &str = "[REDACTED]";

/// Ordered pattern set: secret/token/key assignments, SSN-like numbers,
/// 13-19 digit runs (card numbers), and email addresses. Grounded on
/// `redaction.py::DEFAULT_PATTERNS`.
static PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r#"(?i)(api[_-]?key|secret|token|password)\s*[:=]\s*["']?[\w\-\.]{8,}["']?"#)
            .unwrap(),
        Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap(),
        Regex::new(r"\b\d{13,19}\b").unwrap(),
        Regex::new(r"\b[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}\b").unwrap(),
    ]
});

static PATTERN_SET: Lazy<RegexSet> =
    Lazy::new(|| RegexSet::new(PATTERNS.iter().map(|r| r.as_str())).unwrap());

/// Result of applying the redaction pass to a piece of text (§4.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redaction {
    pub redacted: String,
    /// SHA-256 digest over the *redacted* text, never the original.
    pub digest: String,
    pub was_redacted: bool,
}

/// Applies the ordered pattern set, replacing each match with `[REDACTED]`,
/// then digests the result. Must run before any text-derived field reaches
/// the usage event store (§4.4, invariant 7).
pub fn redact(text: &str) -> Redaction {
    if text.is_empty() {
        return Redaction {
            redacted: String::new(),
            digest: digest_of(""),
            was_redacted: false,
        };
    }

    if !PATTERN_SET.is_match(text) {
        return Redaction {
            redacted: text.to_string(),
            digest: digest_of(text),
            was_redacted: false,
        };
    }

    let mut redacted = text.to_string();
    for pattern in PATTERNS.iter() {
        redacted = pattern.replace_all(&redacted, REPLACEMENT).into_owned();
    }

    let digest = digest_of(&redacted);
    Redaction {
        was_redacted: redacted != text,
        redacted,
        digest,
    }
}

fn digest_of(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_api_key_assignment() {
        let r = redact("api_key=sk-abcdef1234567890 please use this");
        assert!(r.was_redacted);
        assert!(r.redacted.contains(REPLACEMENT));
        assert!(!r.redacted.contains("sk-abcdef1234567890"));
    }

    #[test]
    fn redacts_email_addresses() {
        let r = redact("contact me at alice@example.com");
        assert!(r.was_redacted);
        assert!(!r.redacted.contains("alice@example.com"));
    }

    #[test]
    fn redacts_card_like_digit_runs() {
        let r = redact("card number 4111111111111111 expires soon");
        assert!(r.was_redacted);
        assert!(!r.redacted.contains("4111111111111111"));
    }

    #[test]
    fn plain_text_is_untouched() {
        let r = redact("just a normal prompt about the weather");
        assert!(!r.was_redacted);
        assert_eq!(r.redacted, "just a normal prompt about the weather");
    }

    #[test]
    fn digest_is_over_redacted_text_not_original() {
        let r = redact("token: abcdefgh12345678");
        let digest_of_redacted = digest_of(&r.redacted);
        assert_eq!(r.digest, digest_of_redacted);
        assert_ne!(r.digest, digest_of("token: abcdefgh12345678"));
    }
}
