//! Answer/explanation synthesis and the metadata shared by both backends
//! (question type and context snippet).

use crate::domain::{ContentChunk, QuestionType, TaxonomyLevel};
use crate::engine::extract::content_words;
use crate::templates::answer_frame;
use crate::util::{fill_template, truncate_chars};

const SNIPPET_MAX_CHARS: usize = 200;

/// Classify a question by its opening word.
pub fn question_type(question: &str) -> QuestionType {
  let q = question.trim_start().to_lowercase();
  let starts = |words: &[&str]| words.iter().any(|w| q.starts_with(w));
  if starts(&["what", "who", "when", "where", "which"]) {
    QuestionType::Factual
  } else if starts(&["how", "why"]) {
    QuestionType::Explanatory
  } else if starts(&["compare", "analyze", "evaluate"]) {
    QuestionType::Analytical
  } else if starts(&["create", "design", "develop"]) {
    QuestionType::Creative
  } else {
    QuestionType::General
  }
}

/// The two source sentences sharing the most words with the question,
/// truncated to 200 characters.
pub fn context_snippet<S: AsRef<str>>(sentences: &[S], question: &str) -> String {
  let q = content_words(question);
  let mut scored: Vec<(usize, &str)> = sentences
    .iter()
    .map(|s| {
      let s = s.as_ref();
      (content_words(s).intersection(&q).count(), s)
    })
    .collect();
  // Stable: equal overlaps keep reading order.
  scored.sort_by(|a, b| b.0.cmp(&a.0));
  let joined = scored.iter().take(2).map(|(_, s)| *s).collect::<Vec<_>>().join(" ");
  truncate_chars(&joined, SNIPPET_MAX_CHARS)
}

/// Extractive answer built around the concept's source sentence.
pub fn local_answer(taxonomy: TaxonomyLevel, sentence: &str) -> String {
  fill_template(answer_frame(taxonomy), &[("sentence", sentence.trim())])
}

/// A rationale drawn from a second chunk sentence that shares content words
/// with the source sentence. `None` when no such sentence exists.
pub fn local_explanation(chunk: &ContentChunk, source: &str) -> Option<String> {
  let words = content_words(source);
  let mut best: Option<(usize, &str)> = None;
  for s in chunk.sentences.iter().filter(|s| s.as_str() != source) {
    let overlap = content_words(s).intersection(&words).count();
    if overlap > 0 && best.map(|(b, _)| overlap > b).unwrap_or(true) {
      best = Some((overlap, s.as_str()));
    }
  }
  best.map(|(_, s)| format!("Supporting context: {}", s))
}
