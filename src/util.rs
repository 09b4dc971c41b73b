//! Small utility helpers used across modules.

use std::collections::HashSet;
use std::sync::LazyLock;

use base64::Engine;
use regex::Regex;
use sha2::{Digest, Sha256};

static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
/// Anything that is not a letter, digit or whitespace.
static NON_WORD: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"[^\p{Alphabetic}\p{N}\s]+").expect("valid regex"));

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
/// This is intentionally simple (no nested/conditional logic).
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Normalize question text for duplicate detection:
/// lowercase, punctuation stripped, whitespace collapsed.
pub fn normalize_question(s: &str) -> String {
  let lowered = s.to_lowercase();
  collapse_whitespace(&NON_WORD.replace_all(&lowered, " "))
}

/// Trim and turn every whitespace run (line breaks included) into one space.
pub fn collapse_whitespace(s: &str) -> String {
  WHITESPACE_RUN.replace_all(s.trim(), " ").into_owned()
}

/// Stable fingerprint of a question: base64(SHA-256(normalized text)).
pub fn fingerprint(question: &str) -> String {
  let digest = Sha256::digest(normalize_question(question).as_bytes());
  base64::engine::general_purpose::STANDARD.encode(digest)
}

/// Lowercased word set, used for cheap similarity checks.
pub fn word_set(s: &str) -> HashSet<String> {
  s.split_whitespace().map(|w| w.to_lowercase()).collect()
}

/// Jaccard similarity of two word sets (0.0 when either is empty).
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
  if a.is_empty() || b.is_empty() { return 0.0; }
  let inter = a.intersection(b).count();
  let union = a.union(b).count();
  if union == 0 { 0.0 } else { inter as f64 / union as f64 }
}

/// Truncate to at most `max` chars, appending "..." when something was cut.
pub fn truncate_chars(s: &str, max: usize) -> String {
  if s.chars().count() <= max { return s.to_string(); }
  let mut out: String = s.chars().take(max).collect();
  out.push_str("...");
  out
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    s.to_string()
  } else {
    let cut: String = s.chars().take(max).collect();
    format!("{}… ({} bytes total)", cut, s.len())
  }
}
