//! Content normalizer: cleans raw text (or extracted page text) and packs it
//! into sentence-aligned chunks inside the configured size window.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument};

use crate::config::{ChunkingConfig, Limits};
use crate::domain::{ContentChunk, SourceContent};
use crate::error::GenerationError;
use crate::util::collapse_whitespace;

/// A blank line (possibly holding spaces) separates paragraphs.
static PARAGRAPH_BREAK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n[ \t\r]*\n").expect("valid regex"));
/// Terminator run, optional closing quotes/brackets, then whitespace or end of text.
static SENTENCE_END: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r#"([.!?]+)["')\]”’]*(?:\s+|$)"#).expect("valid regex"));

/// Words that end with a period without ending the sentence.
const ABBREVIATIONS: &[&str] = &[
  "dr", "mr", "mrs", "ms", "prof", "sr", "jr", "st", "vs", "etc", "fig", "no", "eq", "e.g", "i.e", "cf", "approx", "al",
];

const CLOSERS: &[char] = &['"', '\'', ')', ']', '”', '’'];

#[instrument(level = "debug", skip_all, fields(pages = matches!(content, SourceContent::Pages(_))))]
pub fn normalize(
  content: &SourceContent,
  limits: &Limits,
  cfg: &ChunkingConfig,
) -> Result<Vec<ContentChunk>, GenerationError> {
  let text = match content {
    SourceContent::Text(t) => t.clone(),
    SourceContent::Pages(pages) => filter_pages(pages, cfg),
  };

  let actual = text.trim().chars().count();
  if actual < limits.min_content_chars {
    return Err(GenerationError::EmptyContent { min: limits.min_content_chars, actual });
  }

  let sentences = split_sentences(&text);
  let chunks = pack_sentences(sentences, cfg.min_chunk_chars, cfg.max_chunk_chars);
  if chunks.is_empty() {
    return Err(GenerationError::EmptyContent { min: limits.min_content_chars, actual: 0 });
  }

  debug!(target: "generation", chunks = chunks.len(), chars = actual, "Content normalized");
  Ok(
    chunks
      .into_iter()
      .enumerate()
      .map(|(index, sentences)| ContentChunk {
        index,
        text: sentences.join(" "),
        sentences,
        concepts: Vec::new(),
        anchor: None,
      })
      .collect(),
  )
}

/// Drop header/footer noise from extracted pages and join them in order.
pub fn filter_pages(pages: &[String], cfg: &ChunkingConfig) -> String {
  let prefixes: Vec<String> = cfg.page_skip_prefixes.iter().map(|p| p.to_lowercase()).collect();
  let mut kept = Vec::new();
  for page in pages {
    for line in page.lines() {
      let trimmed = line.trim();
      if trimmed.chars().count() < cfg.page_min_line_chars { continue; }
      let lower = trimmed.to_lowercase();
      if prefixes.iter().any(|p| lower.starts_with(p.as_str())) { continue; }
      kept.push(trimmed.to_string());
    }
  }
  kept.join("\n")
}

/// Split text into sentences. Blank lines end a sentence; single line breaks
/// are treated as spaces. Candidates come from `SENTENCE_END`; a period only
/// closes a sentence when it does not follow an abbreviation or an initial.
pub fn split_sentences(text: &str) -> Vec<String> {
  let mut out = Vec::new();
  for paragraph in PARAGRAPH_BREAK.split(text) {
    let paragraph = collapse_whitespace(paragraph);
    let mut start = 0;
    for caps in SENTENCE_END.captures_iter(&paragraph) {
      let (Some(whole), Some(terminators)) = (caps.get(0), caps.get(1)) else { continue };
      let candidate = &paragraph[start..whole.end()];
      let next = paragraph[whole.end()..].chars().next();
      if terminators.as_str().starts_with('.') && !is_boundary_after_period(candidate.trim_end(), next) {
        continue;
      }
      push_sentence(&mut out, candidate);
      start = whole.end();
    }
    push_sentence(&mut out, &paragraph[start..]);
  }
  out
}

fn push_sentence(out: &mut Vec<String>, s: &str) {
  let t = s.trim();
  if !t.is_empty() { out.push(t.to_string()); }
}

fn is_boundary_after_period(current: &str, next: Option<char>) -> bool {
  let Some(next) = next else { return true };
  if next.is_lowercase() { return false; }
  let word = current
    .trim_end_matches(|c: char| CLOSERS.contains(&c) || c == '.')
    .rsplit(|c: char| c.is_whitespace() || c == '(')
    .next()
    .unwrap_or("");
  let lower = word.to_lowercase();
  if ABBREVIATIONS.contains(&lower.as_str()) { return false; }
  // Single initials ("J. Smith") do not end sentences.
  let mut letters = word.chars();
  !matches!((letters.next(), letters.next()), (Some(ch), None) if ch.is_uppercase())
}

/// Greedy packing: close a chunk when the next sentence would overflow `max`.
/// A short trailing chunk is merged back when the result still fits.
pub fn pack_sentences(sentences: Vec<String>, min: usize, max: usize) -> Vec<Vec<String>> {
  let mut chunks: Vec<Vec<String>> = Vec::new();
  let mut current: Vec<String> = Vec::new();
  let mut current_len = 0usize;

  for s in sentences {
    let len = s.chars().count();
    if !current.is_empty() && current_len + 1 + len > max {
      chunks.push(std::mem::take(&mut current));
      current_len = 0;
    }
    if !current.is_empty() { current_len += 1; }
    current_len += len;
    current.push(s);
  }

  if !current.is_empty() {
    let merge = current_len < min
      && chunks
        .last()
        .map(|last| joined_len(last) + 1 + current_len <= max)
        .unwrap_or(false);
    match chunks.last_mut() {
      Some(last) if merge => last.extend(current),
      _ => chunks.push(current),
    }
  }
  chunks
}

fn joined_len(sentences: &[String]) -> usize {
  let chars: usize = sentences.iter().map(|s| s.chars().count()).sum();
  chars + sentences.len().saturating_sub(1)
}
