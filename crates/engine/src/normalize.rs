//! Reduces raw bank descriptions to a canonical merchant token.
//!
//! Order of operations: noise cleanup, then the alias table, then the
//! generic fallback. The result is both the similarity key and the stored
//! `merchant_name` of a pattern. An empty result means "no merchant".

use std::sync::OnceLock;

use regex::Regex;

/// Maximum length of a fallback merchant token, in chars.
pub const MAX_MERCHANT_LEN: usize = 40;

// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

re!(re_txn_prefix,
    r"(?i)^(?:purchase\s+authorized\s+on|checkcard|check\s+card|debit\s+card|credit\s+card|debit|pos|dbt|ach|purchase)\b[\s:\-]*");
re!(re_processor_prefix,
    r"(?i)^(?:sq|tst|sp|pp|paypal|py|dd|bt)\s*\*\s*");
re!(re_store_number,
    r"#\s*\d+");
re!(re_date,
    r"\b\d{1,2}[/-]\d{1,2}[/-]\d{4}\b");
re!(re_trailing_digits,
    r"\s+\d{3,5}\s*$");
re!(re_trailing_state,
    r"\s+(?:AL|AK|AZ|AR|CA|CO|CT|DE|DC|FL|GA|HI|ID|IL|IN|IA|KS|KY|LA|ME|MD|MA|MI|MN|MS|MO|MT|NE|NV|NH|NJ|NM|NY|NC|ND|OH|OK|OR|PA|RI|SC|SD|TN|TX|UT|VT|VA|WA|WV|WI|WY)\s*$");
re!(re_trailing_reference,
    r"\s+([A-Za-z0-9]{8,})\s*$");
re!(re_segment_break,
    r" {2,}|\t");
re!(re_whitespace,
    r"\s+");

/// Ordered alias table; the first pattern found anywhere in the cleaned
/// description wins. Every canonical name maps back to itself.
const MERCHANT_ALIASES: &[(&str, &str)] = &[
    (r"(?i)wal-?mart", "Walmart"),
    (r"(?i)amazon|amzn", "Amazon"),
    (r"(?i)whole\s*foods", "Whole Foods"),
    (r"(?i)trader\s*joe", "Trader Joe's"),
    (r"(?i)costco", "Costco"),
    (r"(?i)\btarget\b", "Target"),
    (r"(?i)starbucks", "Starbucks"),
    (r"(?i)mcdonald", "McDonald's"),
    (r"(?i)chipotle", "Chipotle"),
    (r"(?i)uber\s*eats", "Uber Eats"),
    (r"(?i)\buber\b", "Uber"),
    (r"(?i)\blyft\b", "Lyft"),
    (r"(?i)door\s*dash", "DoorDash"),
    (r"(?i)netflix", "Netflix"),
    (r"(?i)spotify", "Spotify"),
    (r"(?i)\bhulu\b", "Hulu"),
    (r"(?i)apple\.com|itunes|\bapple\b", "Apple"),
    (r"(?i)google", "Google"),
    (r"(?i)kroger", "Kroger"),
    (r"(?i)safeway", "Safeway"),
    (r"(?i)walgreens", "Walgreens"),
    (r"(?i)\bcvs\b", "CVS"),
    (r"(?i)home\s*depot", "Home Depot"),
    (r"(?i)\blowe'?s\b", "Lowe's"),
    (r"(?i)\bshell\b", "Shell"),
    (r"(?i)chevron", "Chevron"),
    (r"(?i)exxon|\bmobil\b", "ExxonMobil"),
];

fn merchant_aliases() -> &'static [(Regex, &'static str)] {
    static ALIASES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    ALIASES.get_or_init(|| {
        MERCHANT_ALIASES
            .iter()
            .map(|(pat, name)| (Regex::new(pat).expect("invalid merchant alias"), *name))
            .collect()
    })
}

/// Reduces a raw transaction description to a canonical merchant token.
pub fn normalize_merchant(description: &str) -> String {
    let trimmed = description.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let cleaned = strip_noise(trimmed);
    if cleaned.trim().is_empty() {
        return String::new();
    }

    if let Some(canonical) = canonical_name(&cleaned) {
        return canonical.to_string();
    }

    fallback_token(&cleaned)
}

/// Looks the cleaned text up in the alias table.
pub fn canonical_name(cleaned: &str) -> Option<&'static str> {
    merchant_aliases()
        .iter()
        .find(|(re, _)| re.is_match(cleaned))
        .map(|(_, name)| *name)
}

fn strip_noise(text: &str) -> String {
    let mut s = text.to_string();

    // Leading markers can stack ("POS DEBIT SQ *CAFE").
    loop {
        let before = s.len();
        s = re_txn_prefix().replace(&s, "").into_owned();
        s = re_processor_prefix().replace(&s, "").into_owned();
        if s.len() == before || s.is_empty() {
            break;
        }
    }

    s = re_date().replace_all(&s, "").into_owned();
    s = re_store_number().replace_all(&s, "").into_owned();

    strip_trailing_noise(s)
}

/// Strips trailing reference codes, digit groups and state abbreviations.
/// They can stack ("... 12345 WA 9X8Y7Z6W5V"), so this runs to a fixpoint.
fn strip_trailing_noise(mut s: String) -> String {
    loop {
        let before = s.len();
        s = strip_trailing_reference(&s);
        s = re_trailing_digits().replace(&s, "").into_owned();
        s = re_trailing_state().replace(&s, "").into_owned();
        if s.len() == before {
            break;
        }
    }
    s.trim().to_string()
}

/// Removes a trailing 8+ char alphanumeric token, but only if it carries a
/// digit, so plain words like "SUPERCENTER" survive.
fn strip_trailing_reference(s: &str) -> String {
    match re_trailing_reference().captures(s) {
        Some(caps) if caps[1].chars().any(|c| c.is_ascii_digit()) => {
            let start = caps.get(0).map_or(s.len(), |m| m.start());
            s[..start].to_string()
        }
        _ => s.to_string(),
    }
}

fn fallback_token(cleaned: &str) -> String {
    let collapsed = re_whitespace().replace_all(cleaned.trim(), " ");
    let first_segment = re_segment_break()
        .split(&collapsed)
        .find(|seg| !seg.trim().is_empty())
        .unwrap_or("");
    let truncated: String = first_segment.trim().chars().take(MAX_MERCHANT_LEN).collect();

    // Truncation can expose a partial token that reads as trailing noise.
    strip_trailing_noise(truncated)
}
