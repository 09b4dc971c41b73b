//! Question paper composition.
//!
//! A paper is an explicit-quota generation run plus presentation: questions
//! are numbered in plan order, each carries the marks of its section, and the
//! answers move to a separate answer key.

use serde::Serialize;

use crate::domain::{
  CellCount, DifficultyLevel, GenerationOutcome, GenerationSummary, QuestionType, TaxonomyLevel,
};

/// One block of a paper: how many questions of a kind, and what each is worth.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PaperSection {
  pub taxonomy: TaxonomyLevel,
  pub difficulty: DifficultyLevel,
  pub count: usize,
  pub marks: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PaperSpec {
  pub title: String,
  pub instructions: String,
  pub sections: Vec<PaperSection>,
}

impl PaperSpec {
  pub fn cells(&self) -> Vec<CellCount> {
    self
      .sections
      .iter()
      .map(|s| CellCount { taxonomy: s.taxonomy, difficulty: s.difficulty, count: s.count })
      .collect()
  }

  fn marks_for(&self, taxonomy: TaxonomyLevel, difficulty: DifficultyLevel) -> Option<u32> {
    self.sections.iter().find(|s| s.taxonomy == taxonomy && s.difficulty == difficulty).map(|s| s.marks)
  }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PaperQuestion {
  pub question_number: usize,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  pub question: String,
  pub marks: u32,
  pub taxonomy_level: TaxonomyLevel,
  pub difficulty: DifficultyLevel,
  pub question_type: QuestionType,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnswerKeyEntry {
  pub question_number: usize,
  pub answer: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub explanation: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QuestionPaper {
  pub title: String,
  pub instructions: String,
  /// Sum of the marks of the delivered questions.
  pub total_marks: u32,
  pub questions: Vec<PaperQuestion>,
  pub answer_key: Vec<AnswerKeyEntry>,
  pub summary: GenerationSummary,
}

/// Number the delivered questions (from 1) and attach marks.
///
/// `ids` lines up with `outcome.questions`; missing entries mean unsaved.
pub fn compose(spec: &PaperSpec, outcome: GenerationOutcome, ids: Vec<Option<String>>) -> QuestionPaper {
  let mut questions = Vec::with_capacity(outcome.questions.len());
  let mut answer_key = Vec::with_capacity(outcome.questions.len());
  let mut ids = ids.into_iter();
  for (i, q) in outcome.questions.into_iter().enumerate() {
    let question_number = i + 1;
    let c = q.candidate;
    questions.push(PaperQuestion {
      question_number,
      id: ids.next().flatten(),
      question: c.question,
      marks: spec.marks_for(c.taxonomy_level, c.difficulty).unwrap_or(0),
      taxonomy_level: c.taxonomy_level,
      difficulty: c.difficulty,
      question_type: c.question_type,
    });
    answer_key.push(AnswerKeyEntry { question_number, answer: c.answer, explanation: c.explanation });
  }

  QuestionPaper {
    title: spec.title.clone(),
    instructions: spec.instructions.clone(),
    total_marks: questions.iter().map(|q| q.marks).sum(),
    questions,
    answer_key,
    summary: outcome.summary,
  }
}
