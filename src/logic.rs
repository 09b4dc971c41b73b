//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - Running generation with the caller-level fallback policy
//!     (remote unavailable or failed → local, when enabled)
//!   - Storing delivered questions as unverified, one batch per request
//!   - Composing question papers (numbering, marks, answer key)
//!   - Fetching and verifying stored questions

use std::collections::HashSet;

use tracing::{info, instrument, warn};

use crate::domain::{BackendKind, GeneratedQuestion, GenerationOutcome, GenerationRequest};
use crate::engine::paper::{compose, QuestionPaper};
use crate::engine::PlanPreview;
use crate::error::{GenerationError, ServiceError};
use crate::protocol::{GenerateIn, GenerateOut, PaperIn, QuestionOut};
use crate::repository::StoredQuestion;
use crate::state::AppState;

/// Run the engine for a request, falling back to the local backend when the
/// remote one is missing or fails outright and the config allows it.
#[instrument(level = "info", skip(state, req), fields(subject_id = req.subject_id, backend = ?req.backend, count = req.count))]
pub async fn run_generation(state: &AppState, req: &GenerationRequest) -> Result<GenerationOutcome, ServiceError> {
  let known = if req.avoid_known_questions {
    state.repository.fingerprints_for_subject(req.subject_id).await?
  } else {
    HashSet::new()
  };
  let fallback_enabled = state.engine.config().fallback_to_local;

  let fallback_reason = match (req.backend, state.backend(req.backend)) {
    (_, Some(backend)) => match state.engine.generate(req, backend, known.clone()).await {
      Err(GenerationError::Backend(msg)) if fallback_enabled && req.backend == BackendKind::Remote => {
        warn!(target: "generation", error = %msg, "Remote generation failed; falling back to local backend");
        format!("remote backend failed: {msg}")
      }
      other => return Ok(other?),
    },
    (BackendKind::Remote, None) if fallback_enabled => {
      warn!(target: "generation", "Remote backend not configured; using local backend");
      "remote backend not configured (no OPENAI_API_KEY)".to_string()
    }
    (kind, None) => {
      return Err(GenerationError::Backend(format!("{kind:?} backend not configured")).into());
    }
  };

  let local_req = req.with_backend(BackendKind::Local);
  let mut outcome = state.engine.generate(&local_req, state.local.clone(), known).await?;
  outcome.summary.fallback_reason = Some(fallback_reason);
  Ok(outcome)
}

/// Full request path: convert, generate, optionally store.
pub async fn generate_questions(state: &AppState, body: &GenerateIn) -> Result<GenerateOut, ServiceError> {
  let outcome = run_request(state, body).await?;
  store_outcome(state, outcome, body.save).await
}

/// Convert and generate. Touches the store only to read known fingerprints,
/// so it is safe to abort.
#[instrument(level = "info", skip(state, body), fields(subject_id = body.subject_id))]
pub async fn run_request(state: &AppState, body: &GenerateIn) -> Result<GenerationOutcome, ServiceError> {
  let req = body.to_request()?;
  run_generation(state, &req).await
}

/// Store a finished outcome in one batch (when `save` is set) and shape the reply.
#[instrument(level = "info", skip(state, outcome), fields(delivered = outcome.questions.len()))]
pub async fn store_outcome(state: &AppState, outcome: GenerationOutcome, save: bool) -> Result<GenerateOut, ServiceError> {
  let ids = save_batch(state, &outcome.questions, save).await?;

  info!(
    target: "generation",
    requested = outcome.summary.requested,
    delivered = outcome.summary.delivered,
    fallback = outcome.summary.fallback_reason.is_some(),
    saved = save,
    "Generation request served"
  );
  let questions = outcome
    .questions
    .into_iter()
    .zip(ids)
    .map(|(question, id)| QuestionOut { id, question, verified: false })
    .collect();
  Ok(GenerateOut { questions, summary: outcome.summary })
}

/// One repository call for the whole batch; `None` ids when not saving.
async fn save_batch(state: &AppState, questions: &[GeneratedQuestion], save: bool) -> Result<Vec<Option<String>>, ServiceError> {
  if !save { return Ok(vec![None; questions.len()]); }
  Ok(state.repository.save_all(questions).await?.into_iter().map(Some).collect())
}

/// Build a question paper: explicit quotas, then numbering, marks and answer key.
#[instrument(level = "info", skip(state, body), fields(subject_id = body.subject_id, sections = body.question_specs.len()))]
pub async fn generate_paper(state: &AppState, body: &PaperIn) -> Result<QuestionPaper, ServiceError> {
  let spec = body.to_spec()?;
  let req = body.to_request(&spec)?;
  let outcome = run_generation(state, &req).await?;
  let ids = save_batch(state, &outcome.questions, body.save).await?;
  let paper = compose(&spec, outcome, ids);
  info!(
    target: "generation",
    subject_id = req.subject_id,
    questions = paper.questions.len(),
    total_marks = paper.total_marks,
    saved = body.save,
    "Question paper composed"
  );
  Ok(paper)
}

#[instrument(level = "info", skip(state, body), fields(subject_id = body.subject_id))]
pub async fn plan_questions(state: &AppState, body: &GenerateIn) -> Result<PlanPreview, ServiceError> {
  let req = body.to_request()?;
  Ok(state.engine.plan(&req).await?)
}

pub async fn get_question(state: &AppState, id: &str) -> Result<StoredQuestion, ServiceError> {
  Ok(state.repository.get(id).await?)
}

#[instrument(level = "info", skip(state))]
pub async fn verify_question(state: &AppState, id: &str, verified: bool) -> Result<StoredQuestion, ServiceError> {
  let q = state.repository.set_verified(id, verified).await?;
  info!(target: "questgen_backend", %id, verified, "Question verification updated");
  Ok(q)
}
