//! Log redaction.
//!
//! Scrubs API keys, bearer tokens, email addresses and phone numbers from
//! free text before it reaches a log sink. User messages and tool observations
//! pass through here.

use regex::Regex;
use std::sync::LazyLock;

static API_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(sk-[a-zA-Z0-9_\-]{20,})|(Bearer\s+[a-zA-Z0-9\-\._~+/]+=*)").unwrap()
});
static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").unwrap());
static TELEPHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+?\d{1,3}[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}").unwrap()
});

/// Replace every sensitive match in `input` with a placeholder.
pub fn redact_sensitive_data(input: &str) -> String {
    // Tokens first: a long key can contain digit runs the phone pattern would eat.
    let rules: [(&LazyLock<Regex>, &str); 3] = [
        (&API_KEY_RE, "[REDACTED_TOKEN]"),
        (&EMAIL_RE, "[REDACTED_EMAIL]"),
        (&TELEPHONE_RE, "[REDACTED_PHONE]"),
    ];
    rules.iter().fold(input.to_string(), |text, (re, placeholder)| {
        re.replace_all(&text, *placeholder).into_owned()
    })
}
