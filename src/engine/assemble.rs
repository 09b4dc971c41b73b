//! Assembler: merges per-cell results in canonical order and reports shortfalls.

use std::collections::HashSet;

use tracing::info;

use crate::domain::{
  BackendKind, GeneratedQuestion, GenerationOutcome, GenerationRequest, GenerationSummary, PlanItem,
  QuestionCandidate, Shortfall, ShortfallReason,
};
use crate::error::GenerationError;

/// What one cell runner produced.
#[derive(Debug)]
pub struct CellReport {
  pub item: PlanItem,
  pub accepted: Vec<QuestionCandidate>,
  pub duplicates: usize,
  pub failure: Option<String>,
}

impl CellReport {
  pub fn failed(item: PlanItem, message: impl Into<String>) -> Self {
    Self { item, accepted: Vec::new(), duplicates: 0, failure: Some(message.into()) }
  }
}

/// `reports` must already be in canonical cell order.
pub fn assemble(
  request: &GenerationRequest,
  backend: BackendKind,
  reports: Vec<CellReport>,
) -> Result<GenerationOutcome, GenerationError> {
  let all_failed = !reports.is_empty()
    && reports.iter().all(|r| r.failure.is_some() && r.accepted.is_empty());
  if all_failed {
    let msg = reports.iter().find_map(|r| r.failure.clone()).unwrap_or_default();
    return Err(GenerationError::Backend(msg));
  }

  let mut seen: HashSet<String> = HashSet::new();
  let mut questions = Vec::new();
  let mut shortfalls = Vec::new();

  for report in reports {
    let mut delivered = 0usize;
    let mut duplicates = report.duplicates;
    for candidate in report.accepted {
      if delivered == report.item.count { break; }
      if !seen.insert(candidate.fingerprint.clone()) {
        duplicates += 1;
        continue;
      }
      questions.push(GeneratedQuestion { subject_id: request.subject_id, topic_id: request.topic_id, candidate });
      delivered += 1;
    }

    if delivered < report.item.count {
      let reason = match (&report.failure, duplicates) {
        (Some(_), _) => ShortfallReason::BackendFailed,
        (None, d) if d > 0 => ShortfallReason::Duplicates,
        _ => ShortfallReason::Exhausted,
      };
      shortfalls.push(Shortfall {
        taxonomy_level: report.item.taxonomy,
        difficulty: report.item.difficulty,
        requested: report.item.count,
        delivered,
        missing: report.item.count - delivered,
        reason,
        detail: report.failure,
      });
    }
  }

  info!(
    target: "generation",
    requested = request.count,
    delivered = questions.len(),
    shortfalls = shortfalls.len(),
    "Questions assembled"
  );

  Ok(GenerationOutcome {
    summary: GenerationSummary {
      requested: request.count,
      delivered: questions.len(),
      backend,
      shortfalls,
      fallback_reason: None,
    },
    questions,
  })
}
