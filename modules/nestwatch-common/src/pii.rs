//! Regex-based PII scan for listing text.
//!
//! Scraper adapters usually flag PII themselves; this is the fallback
//! applied during normalization when a raw listing arrives unflagged.

use regex::Regex;
use std::sync::LazyLock;

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{3}[-.\s]?\d{3}[-.\s]?\d{4}\b").unwrap());
// Local mobile format: 0XX-XXX XXXX / 07XXXXXXXX
static LOCAL_PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b0\d{2}[-.\s]?\d{3}[-.\s]?\d{4}\b").unwrap());
static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Z|a-z]{2,}\b").unwrap());
static ID_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{9}[VvXx]\b").unwrap());

/// Check if text contains PII patterns. Returns descriptions of what was found.
pub fn detect_pii(text: &str) -> Vec<String> {
    let mut findings = Vec::new();

    if PHONE_RE.is_match(text) || LOCAL_PHONE_RE.is_match(text) {
        findings.push("phone number detected".to_string());
    }
    if EMAIL_RE.is_match(text) {
        findings.push("email address detected".to_string());
    }
    if ID_NUMBER_RE.is_match(text) {
        findings.push("national ID pattern detected".to_string());
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_phone_numbers() {
        assert!(!detect_pii("Call 077-123 4567 for viewing").is_empty());
        assert!(!detect_pii("contact 555-867-5309").is_empty());
    }

    #[test]
    fn detects_emails() {
        let findings = detect_pii("write to owner@example.com today");
        assert!(findings.iter().any(|f| f.contains("email")));
    }

    #[test]
    fn clean_text_has_no_findings() {
        assert!(detect_pii("Spacious 3 bedroom house near the lake").is_empty());
    }
}
