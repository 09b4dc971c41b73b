//! Question generation engine.
//!
//! Pipeline: normalize → extract → plan → (fan-out per plan cell:
//! backend → dedup/validate, up to N pull rounds) → assemble.
//!
//! Cells run on a `JoinSet` bounded by a semaphore; results are merged in
//! canonical cell order, so local runs are reproducible. Dropping the future
//! returned by `generate` drops the `JoinSet` and aborts in-flight cells.

pub mod assemble;
pub mod backend;
pub mod dedup;
pub mod extract;
pub mod local;
pub mod normalize;
pub mod paper;
pub mod plan;
pub mod remote;
pub mod synth;

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

use crate::config::{GenerationConfig, ServiceConfig};
use crate::domain::{BackendKind, CellCount, ContentChunk, GenerationOutcome, GenerationRequest, PlanItem};
use crate::error::GenerationError;

use self::assemble::{assemble, CellReport};
use self::backend::GenerationBackend;
use self::dedup::Deduplicator;

/// Chunks and plan for a validated request.
#[derive(Debug)]
pub struct Prepared {
  pub chunks: Vec<ContentChunk>,
  pub plan: Vec<PlanItem>,
}

/// Dry-run view of a request, returned by the plan endpoint.
#[derive(Debug, Serialize)]
pub struct PlanPreview {
  pub chunks: Vec<ChunkPreview>,
  pub items: Vec<PlanItem>,
}

#[derive(Debug, Serialize)]
pub struct ChunkPreview {
  pub index: usize,
  pub chars: usize,
  pub concepts: Vec<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub anchor: Option<String>,
}

#[derive(Clone)]
pub struct Engine {
  config: Arc<ServiceConfig>,
}

impl Engine {
  pub fn new(config: ServiceConfig) -> Self {
    Self { config: Arc::new(config) }
  }

  pub fn config(&self) -> &ServiceConfig { &self.config }

  /// Input checks that fail before any processing.
  pub fn validate(&self, req: &GenerationRequest) -> Result<(), GenerationError> {
    if let Some(cells) = &req.cells {
      return self.validate_cells(cells, req.count);
    }
    if req.taxonomy_levels.is_empty() {
      return Err(GenerationError::InvalidRequest("at least one taxonomy level is required".into()));
    }
    if req.difficulty_levels.is_empty() {
      return Err(GenerationError::InvalidRequest("at least one difficulty level is required".into()));
    }
    let max = self.config.limits.max_questions;
    if req.count == 0 || req.count > max {
      return Err(GenerationError::InvalidRequest(format!("count must be between 1 and {max}, got {}", req.count)));
    }
    Ok(())
  }

  fn validate_cells(&self, cells: &[CellCount], count: usize) -> Result<(), GenerationError> {
    if cells.is_empty() {
      return Err(GenerationError::InvalidRequest("at least one question spec is required".into()));
    }
    let mut seen = HashSet::new();
    for cell in cells {
      if cell.count == 0 {
        return Err(GenerationError::InvalidRequest(format!(
          "count for {}/{} must be positive",
          cell.taxonomy, cell.difficulty
        )));
      }
      if !seen.insert((cell.taxonomy, cell.difficulty)) {
        return Err(GenerationError::InvalidRequest(format!(
          "{}/{} is listed more than once",
          cell.taxonomy, cell.difficulty
        )));
      }
    }
    let total: usize = cells.iter().map(|c| c.count).sum();
    let max = self.config.limits.max_paper_questions;
    if total > max {
      return Err(GenerationError::InvalidRequest(format!("question specs must total at most {max}, got {total}")));
    }
    if total != count {
      return Err(GenerationError::InvalidRequest(format!("count {count} does not match the question specs ({total})")));
    }
    Ok(())
  }

  #[instrument(level = "debug", skip_all, fields(subject_id = req.subject_id, count = req.count))]
  pub async fn prepare(&self, req: &GenerationRequest) -> Result<Prepared, GenerationError> {
    self.validate(req)?;
    let chunks = normalize::normalize(&req.content, &self.config.limits, &self.config.chunking)?;
    let chunks = extract::extract(chunks, &self.config.extraction).await;
    let plan = match &req.cells {
      Some(cells) => plan::explicit_plan(cells, chunks.len()),
      None => plan::build_plan(&req.taxonomy_levels, &req.difficulty_levels, req.count, chunks.len()),
    };
    Ok(Prepared { chunks, plan })
  }

  pub async fn plan(&self, req: &GenerationRequest) -> Result<PlanPreview, GenerationError> {
    let prepared = self.prepare(req).await?;
    Ok(PlanPreview {
      chunks: prepared
        .chunks
        .iter()
        .map(|c| ChunkPreview {
          index: c.index,
          chars: c.text.chars().count(),
          concepts: c.concepts.iter().map(|k| k.phrase.clone()).collect(),
          anchor: c.anchor.clone(),
        })
        .collect(),
      items: prepared.plan,
    })
  }

  /// Run the full pipeline against one backend.
  ///
  /// `known` holds fingerprints the caller wants suppressed (e.g. questions
  /// already saved for the subject). Shortfalls land in the summary; only a
  /// failure of every cell is an error.
  #[instrument(
    level = "info",
    skip_all,
    fields(subject_id = req.subject_id, count = req.count, backend = ?backend.kind(), known = known.len())
  )]
  pub async fn generate(
    &self,
    req: &GenerationRequest,
    backend: Arc<dyn GenerationBackend>,
    known: HashSet<String>,
  ) -> Result<GenerationOutcome, GenerationError> {
    let Prepared { chunks, plan } = self.prepare(req).await?;
    let chunks = Arc::new(chunks);
    let known = Arc::new(known);
    let gen = self.config.generation.clone();
    let min_question_chars = self.config.limits.min_question_chars;
    let semaphore = Arc::new(Semaphore::new(gen.concurrency.max(1)));

    let mut set = JoinSet::new();
    for (position, item) in plan.iter().cloned().enumerate() {
      let backend = backend.clone();
      let chunks = chunks.clone();
      let known = known.clone();
      let gen = gen.clone();
      let semaphore = semaphore.clone();
      set.spawn(async move {
        // The semaphore is never closed; a failed acquire just runs unbounded.
        let _permit = semaphore.acquire_owned().await.ok();
        let report = run_cell(backend.as_ref(), &chunks, item, known, &gen, min_question_chars).await;
        (position, report)
      });
    }

    let mut slots: Vec<Option<CellReport>> = plan.iter().map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
      match joined {
        Ok((position, report)) => {
          if let Some(slot) = slots.get_mut(position) { *slot = Some(report); }
        }
        Err(e) => warn!(target: "generation", error = %e, "Cell task failed"),
      }
    }

    let reports: Vec<CellReport> = slots
      .into_iter()
      .zip(plan)
      .map(|(slot, item)| slot.unwrap_or_else(|| CellReport::failed(item, "cell task aborted")))
      .collect();

    assemble(req, backend.kind(), reports)
  }
}

/// Pull from the backend until the cell's count is met, a round adds nothing
/// new, the round budget is spent or the backend fails.
async fn run_cell(
  backend: &dyn GenerationBackend,
  chunks: &[ContentChunk],
  item: PlanItem,
  known: Arc<HashSet<String>>,
  gen: &GenerationConfig,
  min_question_chars: usize,
) -> CellReport {
  let threshold = (backend.kind() == BackendKind::Remote).then_some(gen.answer_similarity_threshold);
  let mut dedup = Deduplicator::new(known, min_question_chars, threshold);
  let mut failure = None;

  for round in 0..gen.max_pull_rounds.max(1) {
    let need = item.count.saturating_sub(dedup.accepted_len());
    if need == 0 { break; }

    match backend.generate(chunks, &item, need, &dedup.avoid_list()).await {
      Err(e) => {
        warn!(target: "generation", taxonomy = %item.taxonomy, difficulty = %item.difficulty, round, error = %e, "Cell backend failed");
        failure = Some(match e {
          GenerationError::Backend(msg) => msg,
          other => other.to_string(),
        });
        break;
      }
      Ok(candidates) => {
        let before = dedup.accepted_len();
        for c in candidates { dedup.offer(c); }
        if dedup.accepted_len() == before { break; }
      }
    }
  }

  debug!(
    target: "generation",
    taxonomy = %item.taxonomy,
    difficulty = %item.difficulty,
    requested = item.count,
    accepted = dedup.accepted_len(),
    duplicates = dedup.duplicates(),
    invalid = dedup.invalid(),
    "Cell finished"
  );
  CellReport { duplicates: dedup.duplicates(), failure, accepted: dedup.into_accepted(), item }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::time::Duration;

  use async_trait::async_trait;

  use super::*;
  use crate::config::{ExtractionConfig, Prompts};
  use crate::domain::{DifficultyLevel, ShortfallReason, SourceContent, TaxonomyLevel};
  use crate::engine::local::LocalBackend;
  use crate::engine::remote::tests::{batch, Reply, ScriptedClient};
  use crate::engine::remote::RemoteBackend;
  use crate::error::ModelError;
  use crate::openai::ModelClient;
  use crate::util::fingerprint;

  const STACKS: &str = "Stacks support push and pop operations. Queues support enqueue and dequeue.";

  fn request(text: &str, t: Vec<TaxonomyLevel>, d: Vec<DifficultyLevel>, count: usize) -> GenerationRequest {
    GenerationRequest {
      subject_id: 1,
      topic_id: None,
      content: SourceContent::Text(text.into()),
      taxonomy_levels: t,
      difficulty_levels: d,
      count,
      backend: BackendKind::Local,
      avoid_known_questions: false,
      cells: None,
    }
  }

  fn remember_easy(count: usize) -> GenerationRequest {
    request(STACKS, vec![TaxonomyLevel::Remember], vec![DifficultyLevel::Easy], count)
  }

  fn local() -> Arc<dyn GenerationBackend> { Arc::new(LocalBackend) }

  fn remote(client: Arc<dyn ModelClient>) -> Arc<dyn GenerationBackend> {
    Arc::new(RemoteBackend::new(client, Prompts::default(), GenerationConfig::default()))
  }

  #[tokio::test]
  async fn local_stack_and_queue_scenario() {
    let engine = Engine::new(ServiceConfig::default());
    let out = engine.generate(&remember_easy(2), local(), HashSet::new()).await.unwrap();
    assert_eq!(out.questions.len(), 2);
    let concepts = ["stacks", "push", "pop operations", "queues", "enqueue"];
    for q in &out.questions {
      assert!(concepts.iter().any(|c| q.candidate.question.contains(c)), "{}", q.candidate.question);
      assert_eq!(q.candidate.taxonomy_level, TaxonomyLevel::Remember);
      assert_eq!(q.candidate.difficulty, DifficultyLevel::Easy);
    }
    assert_ne!(out.questions[0].candidate.fingerprint, out.questions[1].candidate.fingerprint);
    assert!(out.summary.shortfalls.is_empty());
  }

  #[tokio::test]
  async fn too_few_concepts_is_a_shortfall_not_an_error() {
    // Default extraction finds five concepts in this text; capping at two
    // leaves the cell without enough material for five questions.
    let mut cfg = ServiceConfig::default();
    cfg.extraction = ExtractionConfig { top_k: 2, ..ExtractionConfig::default() };
    let engine = Engine::new(cfg);
    let out = engine.generate(&remember_easy(5), local(), HashSet::new()).await.unwrap();
    assert_eq!(out.summary.delivered, 2);
    assert_eq!(out.summary.requested, 5);
    let s = &out.summary.shortfalls[0];
    assert_eq!((s.requested, s.delivered, s.missing, s.reason), (5, 2, 3, ShortfallReason::Exhausted));
  }

  #[tokio::test]
  async fn local_runs_are_idempotent_and_never_exceed_the_request() {
    let text = "Operating systems manage memory and processes. The kernel schedules threads on each CPU. \
                Virtual memory maps pages to frames. A page fault loads a missing page from disk. \
                File systems organize data into directories and inodes. Linux uses the ext4 file system.";
    let req = request(text, TaxonomyLevel::ALL.to_vec(), DifficultyLevel::ALL.to_vec(), 20);
    let engine = Engine::new(ServiceConfig::default());
    let a = engine.generate(&req, local(), HashSet::new()).await.unwrap();
    let b = engine.generate(&req, local(), HashSet::new()).await.unwrap();
    assert_eq!(a, b);
    assert!(a.questions.len() <= 20);
    let fps: HashSet<&str> = a.questions.iter().map(|q| q.candidate.fingerprint.as_str()).collect();
    assert_eq!(fps.len(), a.questions.len());
    let shortfall: usize = a.summary.shortfalls.iter().map(|s| s.missing).sum();
    assert_eq!(a.questions.len() + shortfall, 20);
  }

  #[tokio::test]
  async fn known_fingerprints_are_suppressed() {
    let engine = Engine::new(ServiceConfig::default());
    let known: HashSet<String> = [fingerprint("What is stacks?")].into_iter().collect();
    let out = engine.generate(&remember_easy(2), local(), known).await.unwrap();
    assert_eq!(out.questions.len(), 2);
    assert!(out.questions.iter().all(|q| q.candidate.question != "What is stacks?"));
  }

  #[tokio::test]
  async fn input_errors_fail_fast() {
    let engine = Engine::new(ServiceConfig::default());
    let err = engine.generate(&request("short", vec![TaxonomyLevel::Remember], vec![DifficultyLevel::Easy], 1), local(), HashSet::new())
      .await
      .unwrap_err();
    assert!(matches!(err, GenerationError::EmptyContent { .. }));
    assert!(engine.plan(&request("short", vec![TaxonomyLevel::Remember], vec![DifficultyLevel::Easy], 1)).await.is_err());

    for bad in [
      request(STACKS, vec![], vec![DifficultyLevel::Easy], 1),
      request(STACKS, vec![TaxonomyLevel::Remember], vec![], 1),
      request(STACKS, vec![TaxonomyLevel::Remember], vec![DifficultyLevel::Easy], 0),
      request(STACKS, vec![TaxonomyLevel::Remember], vec![DifficultyLevel::Easy], 21),
    ] {
      assert!(matches!(engine.validate(&bad), Err(GenerationError::InvalidRequest(_))));
    }
  }

  #[tokio::test]
  async fn plan_preview_for_single_cell() {
    let engine = Engine::new(ServiceConfig::default());
    let preview = engine.plan(&remember_easy(1)).await.unwrap();
    assert_eq!(preview.items.len(), 1);
    assert_eq!(preview.items[0].count, 1);
    assert_eq!(preview.chunks.len(), 1);
    assert_eq!(preview.chunks[0].concepts[0], "stacks");
  }

  #[tokio::test(start_paused = true)]
  async fn remote_timeout_then_success_meets_the_count() {
    let client = ScriptedClient::new(vec![Reply::Hang, Reply::Text(batch(&[("What is a stack?", "A last in, first out collection.")]))]);
    let engine = Engine::new(ServiceConfig::default());
    let out = engine.generate(&remember_easy(1), remote(client.clone()), HashSet::new()).await.unwrap();
    assert_eq!(out.questions.len(), 1);
    assert!(out.summary.shortfalls.is_empty());
    assert_eq!(client.call_count(), 2);
    assert_eq!(out.summary.backend, BackendKind::Remote);
  }

  #[tokio::test]
  async fn remote_duplicates_trigger_another_round() {
    let client = ScriptedClient::new(vec![
      Reply::Text(batch(&[("What is a stack?", "LIFO."), ("what is a STACK", "Also LIFO.")])),
      Reply::Text(batch(&[("What is a queue?", "A first in, first out collection.")])),
    ]);
    let engine = Engine::new(ServiceConfig::default());
    let out = engine.generate(&remember_easy(2), remote(client.clone()), HashSet::new()).await.unwrap();
    assert_eq!(out.questions.len(), 2);
    let calls = client.calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert!(calls[1].1.contains("- What is a stack?"));
  }

  #[tokio::test]
  async fn remote_that_only_repeats_reports_duplicates() {
    let client = ScriptedClient::new(vec![
      Reply::Text(batch(&[("What is a stack?", "LIFO."), ("What is a stack?", "LIFO again.")])),
      Reply::Text(batch(&[("What is a stack?", "LIFO.")])),
    ]);
    let engine = Engine::new(ServiceConfig::default());
    let out = engine.generate(&remember_easy(2), remote(client), HashSet::new()).await.unwrap();
    assert_eq!(out.questions.len(), 1);
    assert_eq!(out.summary.shortfalls[0].reason, ShortfallReason::Duplicates);
  }

  #[tokio::test]
  async fn every_cell_failing_is_a_backend_error() {
    let client = ScriptedClient::new(vec![]);
    let engine = Engine::new(ServiceConfig::default());
    let req = request(STACKS, vec![TaxonomyLevel::Remember], vec![DifficultyLevel::Easy, DifficultyLevel::Hard], 2);
    let err = engine.generate(&req, remote(client), HashSet::new()).await.unwrap_err();
    assert!(matches!(err, GenerationError::Backend(_)));
  }

  /// Fails every prompt that mentions the given difficulty.
  struct FailingFor(&'static str);

  #[async_trait]
  impl ModelClient for FailingFor {
    async fn complete_json(&self, _system: &str, user: &str, _temperature: f32) -> Result<String, ModelError> {
      if user.contains(self.0) {
        Err(ModelError::Status { status: 503, message: "overloaded".into() })
      } else {
        Ok(batch(&[("What is a stack?", "A last in, first out collection.")]))
      }
    }
  }

  #[tokio::test]
  async fn one_failing_cell_does_not_sink_the_others() {
    let engine = Engine::new(ServiceConfig::default());
    let req = request(STACKS, vec![TaxonomyLevel::Remember], vec![DifficultyLevel::Easy, DifficultyLevel::Hard], 2);
    let out = engine.generate(&req, remote(Arc::new(FailingFor("Difficulty: hard"))), HashSet::new()).await.unwrap();
    assert_eq!(out.questions.len(), 1);
    let s = &out.summary.shortfalls[0];
    assert_eq!((s.difficulty, s.reason), (DifficultyLevel::Hard, ShortfallReason::BackendFailed));
    assert!(s.detail.as_deref().unwrap_or_default().contains("overloaded"));
  }

  #[tokio::test]
  async fn explicit_cells_keep_their_order_and_counts() {
    let engine = Engine::new(ServiceConfig::default());
    let mut req = remember_easy(3);
    req.cells = Some(vec![
      CellCount { taxonomy: TaxonomyLevel::Understand, difficulty: DifficultyLevel::Hard, count: 1 },
      CellCount { taxonomy: TaxonomyLevel::Remember, difficulty: DifficultyLevel::Easy, count: 2 },
    ]);
    let out = engine.generate(&req, local(), HashSet::new()).await.unwrap();
    let kinds: Vec<_> = out.questions.iter().map(|q| (q.candidate.taxonomy_level, q.candidate.difficulty)).collect();
    assert_eq!(
      kinds,
      vec![
        (TaxonomyLevel::Understand, DifficultyLevel::Hard),
        (TaxonomyLevel::Remember, DifficultyLevel::Easy),
        (TaxonomyLevel::Remember, DifficultyLevel::Easy),
      ]
    );
    assert_eq!(out.summary.requested, 3);
  }

  #[tokio::test]
  async fn explicit_cells_are_validated() {
    let engine = Engine::new(ServiceConfig::default());
    let cell = |count| CellCount { taxonomy: TaxonomyLevel::Apply, difficulty: DifficultyLevel::Easy, count };
    for (cells, count) in [(vec![], 0), (vec![cell(0)], 0), (vec![cell(1), cell(1)], 2), (vec![cell(51)], 51), (vec![cell(2)], 3)] {
      let mut req = remember_easy(1);
      req.count = count;
      req.cells = Some(cells);
      assert!(matches!(engine.validate(&req), Err(GenerationError::InvalidRequest(_))), "{:?}", req.cells);
    }
    let mut req = remember_easy(1);
    req.count = 30;
    req.cells = Some(vec![cell(30)]);
    assert!(engine.validate(&req).is_ok(), "paper quotas may exceed the plain request cap");
  }

  /// Answers every call after a delay, tracking how many calls overlap.
  #[derive(Default)]
  struct SlowCounting {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    served: AtomicUsize,
  }

  #[async_trait]
  impl ModelClient for SlowCounting {
    async fn complete_json(&self, _system: &str, _user: &str, _temperature: f32) -> Result<String, ModelError> {
      let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
      self.peak.fetch_max(now, Ordering::SeqCst);
      tokio::time::sleep(Duration::from_millis(200)).await;
      self.in_flight.fetch_sub(1, Ordering::SeqCst);
      let question = format!("What does item {} describe?", self.served.fetch_add(1, Ordering::SeqCst));
      Ok(batch(&[(question.as_str(), "It describes one part of the text.")]))
    }
  }

  #[tokio::test(start_paused = true)]
  async fn concurrent_cells_never_exceed_the_limit() {
    let client = Arc::new(SlowCounting::default());
    let engine = Engine::new(ServiceConfig::default());
    let req = request(
      STACKS,
      vec![TaxonomyLevel::Remember, TaxonomyLevel::Understand],
      DifficultyLevel::ALL.to_vec(),
      6,
    );
    let out = engine.generate(&req, remote(client.clone()), HashSet::new()).await.unwrap();
    assert_eq!(out.questions.len(), 6);
    let peak = client.peak.load(Ordering::SeqCst);
    let limit = ServiceConfig::default().generation.concurrency;
    assert!(peak <= limit, "peak {peak} exceeded {limit}");
    assert!(peak > 1, "cells ran one at a time");
  }

  /// Never answers prompts that mention the given text.
  struct HangsFor(&'static str);

  #[async_trait]
  impl ModelClient for HangsFor {
    async fn complete_json(&self, _system: &str, user: &str, _temperature: f32) -> Result<String, ModelError> {
      if user.contains(self.0) {
        std::future::pending::<()>().await;
      }
      Ok(batch(&[("What is a stack?", "A last in, first out collection.")]))
    }
  }

  #[tokio::test(start_paused = true)]
  async fn a_hanging_cell_times_out_without_blocking_the_others() {
    let engine = Engine::new(ServiceConfig::default());
    let req = request(STACKS, vec![TaxonomyLevel::Remember], vec![DifficultyLevel::Easy, DifficultyLevel::Hard], 2);
    let started = tokio::time::Instant::now();
    let out = engine.generate(&req, remote(Arc::new(HangsFor("Difficulty: hard"))), HashSet::new()).await.unwrap();
    assert_eq!(out.questions.len(), 1);
    assert_eq!(out.questions[0].candidate.difficulty, DifficultyLevel::Easy);
    let s = &out.summary.shortfalls[0];
    assert_eq!((s.difficulty, s.reason), (DifficultyLevel::Hard, ShortfallReason::BackendFailed));
    assert!(s.detail.as_deref().unwrap_or_default().contains("timed out"));
    // First attempt plus one strict retry, each bounded by the call timeout.
    let timeout = ServiceConfig::default().generation.call_timeout_secs;
    assert!(started.elapsed() <= Duration::from_secs(2 * timeout + 1));
  }
}
