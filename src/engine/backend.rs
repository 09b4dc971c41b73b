//! The seam between the engine and a question-producing strategy.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{BackendKind, ContentChunk, PlanItem, QuestionCandidate};
use crate::error::GenerationError;

/// What a backend should not produce again: fingerprints already known to the
/// engine (saved questions, accepted candidates) and, for prompt-based
/// backends, the accepted question texts of the current cell.
#[derive(Clone, Debug, Default)]
pub struct AvoidList {
  pub known: Arc<HashSet<String>>,
  pub seen: HashSet<String>,
  pub questions: Vec<String>,
}

impl AvoidList {
  pub fn contains(&self, fingerprint: &str) -> bool {
    self.seen.contains(fingerprint) || self.known.contains(fingerprint)
  }
}

/// Produces candidates for one plan cell.
///
/// Backends may return fewer than `count` candidates; they should never
/// return more. Candidates must carry the cell's taxonomy and difficulty.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
  fn kind(&self) -> BackendKind;

  async fn generate(
    &self,
    chunks: &[ContentChunk],
    item: &PlanItem,
    count: usize,
    avoid: &AvoidList,
  ) -> Result<Vec<QuestionCandidate>, GenerationError>;
}
