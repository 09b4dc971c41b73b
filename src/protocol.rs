//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{
    BackendKind, DifficultyLevel, GeneratedQuestion, GenerationRequest, GenerationSummary, SourceContent,
    TaxonomyLevel,
};
use crate::engine::paper::{PaperSection, PaperSpec};
use crate::error::GenerationError;

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    Generate {
        #[serde(rename = "requestId", default)]
        request_id: Option<String>,
        request: GenerateIn,
    },
    /// Cancels the in-flight generation, if any.
    Cancel,
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Accepted {
        #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
    Generated {
        #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        result: GenerateOut,
    },
    Cancelled {
        #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
    Error {
        #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        message: String,
    },
}

//
// HTTP request/response DTOs
//

fn default_num_questions() -> i64 { 10 }
fn default_true() -> bool { true }

/// Generation request as sent by clients. Either `context` (plain text) or
/// `pages` (already-extracted document pages) must be present.
#[derive(Clone, Debug, Deserialize)]
pub struct GenerateIn {
    pub subject_id: i64,
    #[serde(default)]
    pub topic_id: Option<i64>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub pages: Option<Vec<String>>,
    #[serde(default)]
    pub taxonomy_levels: Vec<TaxonomyLevel>,
    #[serde(default)]
    pub difficulty_levels: Vec<DifficultyLevel>,
    #[serde(default = "default_num_questions")]
    pub num_questions: i64,
    /// Explicit backend choice; wins over `use_openai`.
    #[serde(default)]
    pub backend: Option<BackendKind>,
    #[serde(default)]
    pub use_openai: Option<bool>,
    #[serde(default = "default_true")]
    pub save: bool,
    #[serde(default)]
    pub avoid_known_questions: bool,
}

/// Pages win over context when both are given.
fn source_content(pages: &Option<Vec<String>>, context: &Option<String>) -> Result<SourceContent, GenerationError> {
    match (pages, context) {
        (Some(pages), _) if !pages.is_empty() => Ok(SourceContent::Pages(pages.clone())),
        (_, Some(text)) => Ok(SourceContent::Text(text.clone())),
        _ => Err(GenerationError::InvalidRequest("either context or pages is required".into())),
    }
}

/// An explicit backend wins; otherwise `use_openai: false` selects local.
fn choose_backend(backend: Option<BackendKind>, use_openai: Option<bool>) -> BackendKind {
    backend.unwrap_or(match use_openai {
        Some(false) => BackendKind::Local,
        _ => BackendKind::Remote,
    })
}

fn positive_count(n: i64, field: &str) -> Result<usize, GenerationError> {
    usize::try_from(n)
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| GenerationError::InvalidRequest(format!("{field} must be positive, got {n}")))
}

impl GenerateIn {
    pub fn to_request(&self) -> Result<GenerationRequest, GenerationError> {
        Ok(GenerationRequest {
            subject_id: self.subject_id,
            topic_id: self.topic_id,
            content: source_content(&self.pages, &self.context)?,
            taxonomy_levels: self.taxonomy_levels.clone(),
            difficulty_levels: self.difficulty_levels.clone(),
            count: positive_count(self.num_questions, "num_questions")?,
            backend: choose_backend(self.backend, self.use_openai),
            avoid_known_questions: self.avoid_known_questions,
            cells: None,
        })
    }
}

fn default_paper_title() -> String { "Generated Question Paper".into() }
fn default_paper_instructions() -> String { "Answer all questions based on the given context.".into() }
fn default_section_count() -> i64 { 2 }
fn default_section_marks() -> u32 { 5 }

/// One `question_specs` entry of a paper request.
#[derive(Clone, Debug, Deserialize)]
pub struct QuestionSpecIn {
    pub taxonomy_level: TaxonomyLevel,
    pub difficulty: DifficultyLevel,
    #[serde(default = "default_section_count")]
    pub count: i64,
    #[serde(default = "default_section_marks")]
    pub marks: u32,
}

/// Question paper request: explicit per-level counts with marks.
#[derive(Clone, Debug, Deserialize)]
pub struct PaperIn {
    pub subject_id: i64,
    #[serde(default)]
    pub topic_id: Option<i64>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub pages: Option<Vec<String>>,
    #[serde(default = "default_paper_title")]
    pub title: String,
    #[serde(default = "default_paper_instructions")]
    pub instructions: String,
    #[serde(default)]
    pub question_specs: Vec<QuestionSpecIn>,
    #[serde(default)]
    pub backend: Option<BackendKind>,
    #[serde(default)]
    pub use_openai: Option<bool>,
    #[serde(default)]
    pub save: bool,
    #[serde(default)]
    pub avoid_known_questions: bool,
}

impl PaperIn {
    pub fn to_spec(&self) -> Result<PaperSpec, GenerationError> {
        let sections = self
            .question_specs
            .iter()
            .map(|s| {
                Ok(PaperSection {
                    taxonomy: s.taxonomy_level,
                    difficulty: s.difficulty,
                    count: positive_count(s.count, "question spec count")?,
                    marks: s.marks,
                })
            })
            .collect::<Result<Vec<_>, GenerationError>>()?;
        Ok(PaperSpec { title: self.title.clone(), instructions: self.instructions.clone(), sections })
    }

    pub fn to_request(&self, spec: &PaperSpec) -> Result<GenerationRequest, GenerationError> {
        let cells = spec.cells();
        let mut taxonomy_levels: Vec<TaxonomyLevel> = cells.iter().map(|c| c.taxonomy).collect();
        taxonomy_levels.sort();
        taxonomy_levels.dedup();
        let mut difficulty_levels: Vec<DifficultyLevel> = cells.iter().map(|c| c.difficulty).collect();
        difficulty_levels.sort();
        difficulty_levels.dedup();
        Ok(GenerationRequest {
            subject_id: self.subject_id,
            topic_id: self.topic_id,
            content: source_content(&self.pages, &self.context)?,
            taxonomy_levels,
            difficulty_levels,
            count: cells.iter().map(|c| c.count).sum(),
            backend: choose_backend(self.backend, self.use_openai),
            avoid_known_questions: self.avoid_known_questions,
            cells: Some(cells),
        })
    }
}

/// A delivered question; `id` is present when it was saved.
#[derive(Clone, Debug, Serialize)]
pub struct QuestionOut {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub question: GeneratedQuestion,
    pub verified: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct GenerateOut {
    pub questions: Vec<QuestionOut>,
    pub summary: GenerationSummary,
}

fn default_verified() -> bool { true }

#[derive(Debug, Default, Deserialize)]
pub struct VerifyIn {
    #[serde(default = "default_verified")]
    pub verified: bool,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub remote_enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorOut {
    pub error: String,
    pub kind: &'static str,
}
