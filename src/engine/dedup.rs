//! Per-cell validation and deduplication of candidates.

use std::collections::HashSet;
use std::sync::Arc;

use crate::domain::QuestionCandidate;
use crate::engine::backend::AvoidList;
use crate::util::{jaccard, word_set};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
  Accepted,
  /// Fingerprint already known or accepted.
  Duplicate,
  /// Answer too close to an already accepted answer.
  SimilarAnswer,
  TooShort,
  EmptyAnswer,
}

impl Verdict {
  pub fn is_duplicate(self) -> bool {
    matches!(self, Verdict::Duplicate | Verdict::SimilarAnswer)
  }
}

pub struct Deduplicator {
  known: Arc<HashSet<String>>,
  seen: HashSet<String>,
  answers: Vec<HashSet<String>>,
  answer_threshold: Option<f64>,
  min_question_chars: usize,
  accepted: Vec<QuestionCandidate>,
  duplicates: usize,
  invalid: usize,
}

impl Deduplicator {
  /// `answer_threshold` turns on the answer-similarity check (remote output only).
  pub fn new(known: Arc<HashSet<String>>, min_question_chars: usize, answer_threshold: Option<f64>) -> Self {
    Self {
      known,
      seen: HashSet::new(),
      answers: Vec::new(),
      answer_threshold,
      min_question_chars,
      accepted: Vec::new(),
      duplicates: 0,
      invalid: 0,
    }
  }

  pub fn offer(&mut self, candidate: QuestionCandidate) -> Verdict {
    let verdict = self.judge(&candidate);
    match verdict {
      Verdict::Accepted => {
        self.seen.insert(candidate.fingerprint.clone());
        if self.answer_threshold.is_some() {
          self.answers.push(word_set(&candidate.answer));
        }
        self.accepted.push(candidate);
      }
      v if v.is_duplicate() => self.duplicates += 1,
      _ => self.invalid += 1,
    }
    verdict
  }

  fn judge(&self, c: &QuestionCandidate) -> Verdict {
    if c.question.trim().chars().count() < self.min_question_chars { return Verdict::TooShort; }
    if c.answer.trim().is_empty() { return Verdict::EmptyAnswer; }
    if self.seen.contains(&c.fingerprint) || self.known.contains(&c.fingerprint) {
      return Verdict::Duplicate;
    }
    if let Some(threshold) = self.answer_threshold {
      let words = word_set(&c.answer);
      if self.answers.iter().any(|a| jaccard(a, &words) > threshold) {
        return Verdict::SimilarAnswer;
      }
    }
    Verdict::Accepted
  }

  pub fn accepted_len(&self) -> usize { self.accepted.len() }
  pub fn duplicates(&self) -> usize { self.duplicates }
  pub fn invalid(&self) -> usize { self.invalid }

  pub fn avoid_list(&self) -> AvoidList {
    AvoidList {
      known: self.known.clone(),
      seen: self.seen.clone(),
      questions: self.accepted.iter().map(|c| c.question.clone()).collect(),
    }
  }

  pub fn into_accepted(self) -> Vec<QuestionCandidate> { self.accepted }
}
