//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented; errors map to status codes in one place.

use std::sync::Arc;

use axum::{
  extract::{Path, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use tracing::{info, instrument, warn};

use crate::engine::paper::QuestionPaper;
use crate::engine::PlanPreview;
use crate::error::{GenerationError, RepositoryError, ServiceError};
use crate::logic::*;
use crate::protocol::*;
use crate::repository::StoredQuestion;
use crate::state::AppState;

impl IntoResponse for ServiceError {
  fn into_response(self) -> Response {
    let (status, kind) = match &self {
      ServiceError::Generation(GenerationError::EmptyContent { .. }) => (StatusCode::UNPROCESSABLE_ENTITY, "empty_content"),
      ServiceError::Generation(GenerationError::InvalidRequest(_)) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_request"),
      ServiceError::Generation(GenerationError::Backend(_)) => (StatusCode::BAD_GATEWAY, "backend_failed"),
      ServiceError::Repository(RepositoryError::NotFound(_)) => (StatusCode::NOT_FOUND, "not_found"),
      ServiceError::Repository(RepositoryError::Storage(_)) => (StatusCode::INTERNAL_SERVER_ERROR, "storage"),
    };
    warn!(target: "questgen_backend", status = status.as_u16(), kind, error = %self, "Request failed");
    (status, Json(ErrorOut { error: self.to_string(), kind })).into_response()
  }
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut { ok: true, remote_enabled: state.remote.is_some() })
}

#[instrument(level = "info", skip(state, body), fields(subject_id = body.subject_id, num_questions = body.num_questions))]
pub async fn http_post_generate(
  State(state): State<Arc<AppState>>,
  Json(body): Json<GenerateIn>,
) -> Result<Json<GenerateOut>, ServiceError> {
  let out = generate_questions(&state, &body).await?;
  info!(target: "generation", delivered = out.questions.len(), "HTTP generate served");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state, body), fields(subject_id = body.subject_id))]
pub async fn http_post_paper(
  State(state): State<Arc<AppState>>,
  Json(body): Json<PaperIn>,
) -> Result<Json<QuestionPaper>, ServiceError> {
  let paper = generate_paper(&state, &body).await?;
  info!(target: "generation", questions = paper.questions.len(), total_marks = paper.total_marks, "HTTP paper served");
  Ok(Json(paper))
}

#[instrument(level = "info", skip(state, body), fields(subject_id = body.subject_id))]
pub async fn http_post_plan(
  State(state): State<Arc<AppState>>,
  Json(body): Json<GenerateIn>,
) -> Result<Json<PlanPreview>, ServiceError> {
  Ok(Json(plan_questions(&state, &body).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_question(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<StoredQuestion>, ServiceError> {
  Ok(Json(get_question(&state, &id).await?))
}

/// Body is optional; an empty POST marks the question verified.
#[instrument(level = "info", skip(state, body))]
pub async fn http_post_verify(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  body: Option<Json<VerifyIn>>,
) -> Result<Json<StoredQuestion>, ServiceError> {
  let verified = body.map(|Json(b)| b.verified).unwrap_or(true);
  Ok(Json(verify_question(&state, &id, verified).await?))
}
