//! Domain models used by the engine: taxonomy/difficulty levels, requests,
//! chunks, plan items, candidates and the generation outcome.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::util::fingerprint;

/// Cognitive-taxonomy level, ordered from Remember to Create.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaxonomyLevel {
  #[serde(alias = "Remember")] Remember,
  #[serde(alias = "Understand")] Understand,
  #[serde(alias = "Apply")] Apply,
  #[serde(alias = "Analyze")] Analyze,
  #[serde(alias = "Evaluate")] Evaluate,
  #[serde(alias = "Create")] Create,
}

impl TaxonomyLevel {
  pub const ALL: [TaxonomyLevel; 6] = [
    TaxonomyLevel::Remember,
    TaxonomyLevel::Understand,
    TaxonomyLevel::Apply,
    TaxonomyLevel::Analyze,
    TaxonomyLevel::Evaluate,
    TaxonomyLevel::Create,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      TaxonomyLevel::Remember => "remember",
      TaxonomyLevel::Understand => "understand",
      TaxonomyLevel::Apply => "apply",
      TaxonomyLevel::Analyze => "analyze",
      TaxonomyLevel::Evaluate => "evaluate",
      TaxonomyLevel::Create => "create",
    }
  }
}

impl fmt::Display for TaxonomyLevel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Difficulty tier, independent of the taxonomy level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyLevel {
  #[serde(alias = "Easy")] Easy,
  #[serde(alias = "Medium")] Medium,
  #[serde(alias = "Hard")] Hard,
}

impl DifficultyLevel {
  pub const ALL: [DifficultyLevel; 3] = [DifficultyLevel::Easy, DifficultyLevel::Medium, DifficultyLevel::Hard];

  pub fn as_str(&self) -> &'static str {
    match self {
      DifficultyLevel::Easy => "easy",
      DifficultyLevel::Medium => "medium",
      DifficultyLevel::Hard => "hard",
    }
  }
}

impl fmt::Display for DifficultyLevel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Which generation strategy produced (or should produce) questions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
  #[default]
  Remote,
  Local,
}

/// Source content handed to the engine. Pages are already-extracted text.
#[derive(Clone, Debug)]
pub enum SourceContent {
  Text(String),
  Pages(Vec<String>),
}

/// An explicit cell quota, used instead of spreading `count` evenly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CellCount {
  pub taxonomy: TaxonomyLevel,
  pub difficulty: DifficultyLevel,
  pub count: usize,
}

/// A generation request. Treated as immutable once built.
#[derive(Clone, Debug)]
pub struct GenerationRequest {
  pub subject_id: i64,
  pub topic_id: Option<i64>,
  pub content: SourceContent,
  pub taxonomy_levels: Vec<TaxonomyLevel>,
  pub difficulty_levels: Vec<DifficultyLevel>,
  pub count: usize,
  pub backend: BackendKind,
  /// Ask the caller to suppress questions already saved for this subject.
  pub avoid_known_questions: bool,
  /// Explicit quotas in the caller's order. When set, `count` is their sum
  /// and the planner ignores the level lists.
  pub cells: Option<Vec<CellCount>>,
}

impl GenerationRequest {
  /// Same request, different backend. Used by the caller-level fallback.
  pub fn with_backend(&self, backend: BackendKind) -> Self {
    Self { backend, ..self.clone() }
  }
}

/// A ranked key phrase extracted from a chunk.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Concept {
  pub phrase: String,
  pub salience: f64,
  /// Sentence the phrase first appears in.
  pub sentence: String,
  pub proper: bool,
}

/// A bounded span of normalized source text plus what was extracted from it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ContentChunk {
  pub index: usize,
  pub text: String,
  pub sentences: Vec<String>,
  pub concepts: Vec<Concept>,
  /// Highest-scoring sentence, used as a question stem anchor.
  pub anchor: Option<String>,
}

/// One (taxonomy, difficulty, count) unit of generation work.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlanItem {
  pub taxonomy: TaxonomyLevel,
  pub difficulty: DifficultyLevel,
  pub count: usize,
  /// Chunk indices in the order this cell draws from them.
  pub chunk_order: Vec<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestionType {
  Factual,
  Explanatory,
  Analytical,
  Creative,
  General,
}

/// A generated question before it is accepted into a response.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QuestionCandidate {
  pub question: String,
  pub answer: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub explanation: Option<String>,
  pub taxonomy_level: TaxonomyLevel,
  pub difficulty: DifficultyLevel,
  pub question_type: QuestionType,
  pub context_snippet: String,
  pub fingerprint: String,
  pub provenance: BackendKind,
}

impl QuestionCandidate {
  /// Build a candidate; the fingerprint is derived from the question text.
  #[allow(clippy::too_many_arguments)]
  pub fn new(
    question: String,
    answer: String,
    explanation: Option<String>,
    taxonomy_level: TaxonomyLevel,
    difficulty: DifficultyLevel,
    question_type: QuestionType,
    context_snippet: String,
    provenance: BackendKind,
  ) -> Self {
    let fingerprint = fingerprint(&question);
    Self {
      question,
      answer,
      explanation,
      taxonomy_level,
      difficulty,
      question_type,
      context_snippet,
      fingerprint,
      provenance,
    }
  }
}

/// An accepted candidate with the request's subject/topic attached.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GeneratedQuestion {
  pub subject_id: i64,
  pub topic_id: Option<i64>,
  #[serde(flatten)]
  pub candidate: QuestionCandidate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShortfallReason {
  /// The backend ran out of distinct material.
  Exhausted,
  /// Candidates were produced but rejected as duplicates.
  Duplicates,
  /// The backend failed for this cell.
  BackendFailed,
}

/// A cell that delivered fewer questions than planned.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Shortfall {
  pub taxonomy_level: TaxonomyLevel,
  pub difficulty: DifficultyLevel,
  pub requested: usize,
  pub delivered: usize,
  pub missing: usize,
  pub reason: ShortfallReason,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub detail: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GenerationSummary {
  pub requested: usize,
  pub delivered: usize,
  pub backend: BackendKind,
  pub shortfalls: Vec<Shortfall>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub fallback_reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GenerationOutcome {
  pub questions: Vec<GeneratedQuestion>,
  pub summary: GenerationSummary,
}
