// src/analyze/syllabus.rs
//! Syllabus text helpers: HTML → plain text, extra-credit/curve detection,
//! late-policy strictness extraction, and an anonymized fingerprint for logs.

use once_cell::sync::OnceCell;
use regex::Regex;
use serde_json::Value;

/// Cap on syllabus length handed to the interpretation collaborator.
pub const MAX_SYLLABUS_CHARS: usize = 12_000;

/// HTML body (Canvas `syllabus_body`) → plain text. Tags go before entities are
/// decoded, so an encoded `&lt;` survives as text.
pub fn html_to_text(html: &str) -> String {
    static RE_BLOCK: OnceCell<Regex> = OnceCell::new();
    let re_block = RE_BLOCK.get_or_init(|| {
        Regex::new(r"(?i)<\s*(br|/p|/li|/h[1-6]|/div|/tr)\s*/?>").expect("block-tag regex")
    });
    let out = re_block.replace_all(html, "\n");

    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[a-z!][^>]*>").expect("tag regex"));
    let out = re_tags.replace_all(&out, " ");

    normalize_text(&out)
}

/// Plain text cleanup: decode entities, fold typographic quotes, collapse whitespace.
/// Angle brackets are kept, so "<60" in a grading table stays put.
pub fn normalize_text(s: &str) -> String {
    let out = html_escape::decode_html_entities(s)
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace('\u{00A0}', " ");

    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"[ \t\r\f\v]+").expect("ws regex"));
    let out = re_ws.replace_all(&out, " ");

    static RE_NL: OnceCell<Regex> = OnceCell::new();
    let re_nl = RE_NL.get_or_init(|| Regex::new(r"\s*\n\s*").expect("newline regex"));
    re_nl.replace_all(&out, "\n").trim().to_string()
}

/// First `MAX_SYLLABUS_CHARS` characters.
pub fn truncate_for_interpretation(text: &str) -> &str {
    match text.char_indices().nth(MAX_SYLLABUS_CHARS) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}

/// True if the syllabus offers extra credit, bonus points or a grading curve.
/// A curve phrase preceded by a negation ("not curved", "no curve") does not count.
pub fn mentions_extra_credit(text: &str) -> bool {
    static RE_CREDIT: OnceCell<Regex> = OnceCell::new();
    let re_credit = RE_CREDIT.get_or_init(|| {
        Regex::new(r"(?i)\bextra[\s-]*credit\b|\bbonus\s+points?\b").expect("extra-credit regex")
    });
    if re_credit.is_match(text) {
        return true;
    }

    static RE_CURVE: OnceCell<Regex> = OnceCell::new();
    let re_curve = RE_CURVE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:(no|not|never|without|cannot|\w+n't)\W+(?:\w+\W+){0,3}?)?(?:graded\s+on\s+a\s+curve|curved?|curving)\b",
        )
        .expect("curve regex")
    });
    re_curve.captures_iter(text).any(|c| c.get(1).is_none())
}

/// Strictness 1..=10 from an interpretation object; `None` when absent or out of range.
pub fn strictness_from_interpretation(interpretation: &Value) -> Option<f64> {
    interpretation
        .get("late_policy_strictness")
        .and_then(Value::as_f64)
        .filter(|s| s.is_finite() && (1.0..=10.0).contains(s))
}

/// Short, non-reversible id for a syllabus so logs never carry the raw text.
pub fn fingerprint(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_html_and_entities() {
        let html = "<p>Exams&nbsp;are <b>40%</b></p><ul><li>Projects 30%</li></ul>";
        let out = html_to_text(html);
        assert!(out.contains("Exams are 40%"), "{out}");
        assert!(out.contains("Projects 30%"), "{out}");
        assert!(!out.contains('<'));
    }

    #[test]
    fn encoded_brackets_in_html_survive_as_text() {
        let out = html_to_text("<td>&lt;60 is failing</td><td>extra credit &gt;5 pts</td>");
        assert!(out.contains("<60 is failing"), "{out}");
        assert!(mentions_extra_credit(&out));
    }

    #[test]
    fn plain_text_keeps_angle_brackets() {
        let text = "Scores <60 are failing; extra credit raises scores >5 pts.";
        let out = normalize_text(text);
        assert_eq!(out, text);
        assert!(mentions_extra_credit(&out));
    }

    #[test]
    fn truncation_is_char_based() {
        let long = "é".repeat(MAX_SYLLABUS_CHARS + 10);
        assert_eq!(truncate_for_interpretation(&long).chars().count(), MAX_SYLLABUS_CHARS);
        assert_eq!(truncate_for_interpretation("short"), "short");
    }

    #[test]
    fn extra_credit_phrases() {
        assert!(mentions_extra_credit("There will be EXTRA CREDIT opportunities."));
        assert!(mentions_extra_credit("extra-credit homework"));
        assert!(mentions_extra_credit("The final exam may be curved."));
        assert!(mentions_extra_credit("Up to 5 bonus points."));
        assert!(!mentions_extra_credit("No late work accepted."));
        assert!(!mentions_extra_credit("Curvature of spacetime")); // word boundary
    }

    #[test]
    fn negated_curve_does_not_count() {
        assert!(!mentions_extra_credit("This course is not curved. There is no curve."));
        assert!(!mentions_extra_credit("Exams are never graded on a curve."));
        assert!(!mentions_extra_credit("The final isn't curved."));
        assert!(mentions_extra_credit("No late work. The final will be curved."));
        assert!(mentions_extra_credit("Midterms are graded on a curve."));
    }

    #[test]
    fn strictness_must_be_in_range() {
        assert_eq!(strictness_from_interpretation(&json!({"late_policy_strictness": 8})), Some(8.0));
        assert_eq!(strictness_from_interpretation(&json!({"late_policy_strictness": 0})), None);
        assert_eq!(strictness_from_interpretation(&json!({"late_policy_strictness": "9"})), None);
        assert_eq!(strictness_from_interpretation(&json!({})), None);
    }

    #[test]
    fn fingerprint_is_stable_and_short() {
        assert_eq!(fingerprint("abc"), fingerprint("abc"));
        assert_eq!(fingerprint("abc").len(), 12);
        assert_ne!(fingerprint("abc"), fingerprint("abd"));
    }
}
