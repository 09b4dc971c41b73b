//! Question persistence.
//!
//! `QuestionRepository` is the storage seam; the service ships with an
//! in-memory implementation indexed by id and by subject. Saved questions
//! always start unverified.
//!
//! Both indexes sit behind a single lock so a batch lands atomically and
//! readers never see one index ahead of the other.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::domain::{BackendKind, DifficultyLevel, GeneratedQuestion, QuestionType, TaxonomyLevel};
use crate::error::RepositoryError;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StoredQuestion {
  pub id: String,
  pub subject_id: i64,
  pub topic_id: Option<i64>,
  pub content: String,
  pub answer: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub explanation: Option<String>,
  pub taxonomy_level: TaxonomyLevel,
  pub difficulty_level: DifficultyLevel,
  pub question_type: QuestionType,
  pub context_snippet: String,
  pub fingerprint: String,
  pub provenance: BackendKind,
  pub verified: bool,
}

impl StoredQuestion {
  pub fn from_generated(id: String, q: &GeneratedQuestion) -> Self {
    let c = &q.candidate;
    Self {
      id,
      subject_id: q.subject_id,
      topic_id: q.topic_id,
      content: c.question.clone(),
      answer: c.answer.clone(),
      explanation: c.explanation.clone(),
      taxonomy_level: c.taxonomy_level,
      difficulty_level: c.difficulty,
      question_type: c.question_type,
      context_snippet: c.context_snippet.clone(),
      fingerprint: c.fingerprint.clone(),
      provenance: c.provenance,
      verified: false,
    }
  }
}

#[async_trait]
pub trait QuestionRepository: Send + Sync {
  /// Store a question (unverified) and return its id.
  async fn save(&self, question: &GeneratedQuestion) -> Result<String, RepositoryError>;

  /// Store a batch (unverified): either every question lands or none does.
  /// Ids come back in input order.
  async fn save_all(&self, questions: &[GeneratedQuestion]) -> Result<Vec<String>, RepositoryError>;

  async fn get(&self, id: &str) -> Result<StoredQuestion, RepositoryError>;

  async fn set_verified(&self, id: &str, verified: bool) -> Result<StoredQuestion, RepositoryError>;

  /// Fingerprints of every question stored for a subject.
  async fn fingerprints_for_subject(&self, subject_id: i64) -> Result<HashSet<String>, RepositoryError>;
}

#[derive(Default)]
struct Indexes {
  by_id: HashMap<String, StoredQuestion>,
  by_subject: HashMap<i64, Vec<String>>,
}

impl Indexes {
  fn insert(&mut self, question: &GeneratedQuestion) -> String {
    let id = Uuid::new_v4().to_string();
    let stored = StoredQuestion::from_generated(id.clone(), question);
    self.by_subject.entry(stored.subject_id).or_default().push(id.clone());
    self.by_id.insert(id.clone(), stored);
    id
  }
}

#[derive(Clone, Default)]
pub struct MemoryQuestionRepository {
  inner: Arc<RwLock<Indexes>>,
}

impl MemoryQuestionRepository {
  pub fn new() -> Self { Self::default() }
}

#[async_trait]
impl QuestionRepository for MemoryQuestionRepository {
  #[instrument(level = "debug", skip(self, question), fields(subject_id = question.subject_id))]
  async fn save(&self, question: &GeneratedQuestion) -> Result<String, RepositoryError> {
    let id = self.inner.write().await.insert(question);
    debug!(target: "questgen_backend", %id, "Question stored");
    Ok(id)
  }

  #[instrument(level = "debug", skip_all, fields(count = questions.len()))]
  async fn save_all(&self, questions: &[GeneratedQuestion]) -> Result<Vec<String>, RepositoryError> {
    let mut inner = self.inner.write().await;
    let ids: Vec<String> = questions.iter().map(|q| inner.insert(q)).collect();
    debug!(target: "questgen_backend", stored = ids.len(), "Question batch stored");
    Ok(ids)
  }

  async fn get(&self, id: &str) -> Result<StoredQuestion, RepositoryError> {
    self.inner.read().await.by_id.get(id).cloned().ok_or_else(|| RepositoryError::NotFound(id.to_string()))
  }

  #[instrument(level = "debug", skip(self))]
  async fn set_verified(&self, id: &str, verified: bool) -> Result<StoredQuestion, RepositoryError> {
    let mut inner = self.inner.write().await;
    let q = inner.by_id.get_mut(id).ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
    q.verified = verified;
    Ok(q.clone())
  }

  async fn fingerprints_for_subject(&self, subject_id: i64) -> Result<HashSet<String>, RepositoryError> {
    let inner = self.inner.read().await;
    Ok(
      inner
        .by_subject
        .get(&subject_id)
        .into_iter()
        .flatten()
        .filter_map(|id| inner.by_id.get(id))
        .map(|q| q.fingerprint.clone())
        .collect(),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::QuestionCandidate;

  fn generated(subject_id: i64, q: &str) -> GeneratedQuestion {
    GeneratedQuestion {
      subject_id,
      topic_id: None,
      candidate: QuestionCandidate::new(
        q.into(),
        "An answer.".into(),
        None,
        TaxonomyLevel::Remember,
        DifficultyLevel::Easy,
        QuestionType::Factual,
        String::new(),
        BackendKind::Local,
      ),
    }
  }

  #[tokio::test]
  async fn saves_unverified_and_toggles_flag() {
    let repo = MemoryQuestionRepository::new();
    let id = repo.save(&generated(1, "What is a stack?")).await.unwrap();
    let q = repo.get(&id).await.unwrap();
    assert!(!q.verified);
    assert_eq!(q.content, "What is a stack?");
    assert!(repo.set_verified(&id, true).await.unwrap().verified);
    assert!(repo.get(&id).await.unwrap().verified);
  }

  #[tokio::test]
  async fn unknown_ids_are_not_found() {
    let repo = MemoryQuestionRepository::new();
    assert_eq!(repo.get("nope").await.unwrap_err(), RepositoryError::NotFound("nope".into()));
    assert!(matches!(repo.set_verified("nope", true).await, Err(RepositoryError::NotFound(_))));
  }

  #[tokio::test]
  async fn fingerprints_are_scoped_to_subject() {
    let repo = MemoryQuestionRepository::new();
    let a = generated(1, "What is a stack?");
    repo.save(&a).await.unwrap();
    repo.save(&generated(2, "What is a queue?")).await.unwrap();
    let fps = repo.fingerprints_for_subject(1).await.unwrap();
    assert_eq!(fps.len(), 1);
    assert!(fps.contains(&a.candidate.fingerprint));
    assert!(repo.fingerprints_for_subject(3).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn batch_save_returns_ids_in_order() {
    let repo = MemoryQuestionRepository::new();
    let batch = vec![generated(4, "What is a stack?"), generated(4, "What is a queue?")];
    let ids = repo.save_all(&batch).await.unwrap();
    assert_eq!(ids.len(), 2);
    assert_eq!(repo.get(&ids[0]).await.unwrap().content, "What is a stack?");
    assert_eq!(repo.get(&ids[1]).await.unwrap().content, "What is a queue?");
    assert_eq!(repo.fingerprints_for_subject(4).await.unwrap().len(), 2);
    assert!(repo.save_all(&[]).await.unwrap().is_empty());
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn concurrent_saves_and_fingerprint_reads_make_progress() {
    let repo = MemoryQuestionRepository::new();
    let mut set = tokio::task::JoinSet::new();
    for i in 0..500 {
      let writer = repo.clone();
      set.spawn(async move {
        writer.save(&generated(1, &format!("What is item {i}?"))).await.map(|_| ())
      });
      let reader = repo.clone();
      set.spawn(async move { reader.fingerprints_for_subject(1).await.map(|_| ()) });
    }
    let drained = tokio::time::timeout(std::time::Duration::from_secs(20), async {
      while let Some(joined) = set.join_next().await {
        joined.unwrap().unwrap();
      }
    })
    .await;
    assert!(drained.is_ok(), "repository calls stalled");
    assert_eq!(repo.fingerprints_for_subject(1).await.unwrap().len(), 500);
  }
}
