//! Remote backend: asks a chat model for a JSON batch of questions per cell.
//!
//! - The prompt embeds the cell's chunks (in cell order, capped), the ranked
//!   concepts, level verbs, a difficulty cue and already-accepted questions.
//! - Every call has a deadline. A malformed, empty, failed or late reply is
//!   retried once with a strict JSON-only system prompt; a second failure
//!   fails the cell.
//! - Levels on the returned candidates always come from the cell, never from
//!   the model.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::config::{GenerationConfig, Prompts};
use crate::domain::{BackendKind, ContentChunk, PlanItem, QuestionCandidate};
use crate::engine::backend::{AvoidList, GenerationBackend};
use crate::engine::synth::{context_snippet, question_type};
use crate::error::{GenerationError, ModelError};
use crate::openai::ModelClient;
use crate::templates::{difficulty_cue, taxonomy_verbs};
use crate::util::{fill_template, trunc_for_log};

const MAX_PROMPT_CONCEPTS: usize = 15;

#[derive(Deserialize)]
struct RawBatch {
  #[serde(default)]
  questions: Vec<RawQuestion>,
}

#[derive(Deserialize)]
struct RawQuestion {
  #[serde(default)]
  question: String,
  #[serde(default)]
  answer: String,
  #[serde(default)]
  explanation: Option<String>,
}

pub struct RemoteBackend {
  client: Arc<dyn ModelClient>,
  prompts: Prompts,
  cfg: GenerationConfig,
}

impl RemoteBackend {
  pub fn new(client: Arc<dyn ModelClient>, prompts: Prompts, cfg: GenerationConfig) -> Self {
    Self { client, prompts, cfg }
  }

  fn build_prompt(&self, chunks: &[ContentChunk], item: &PlanItem, count: usize, avoid: &AvoidList) -> String {
    let ordered: Vec<&ContentChunk> = item.chunk_order.iter().filter_map(|i| chunks.get(*i)).collect();
    let context = build_context(&ordered, self.cfg.max_context_chars);

    let mut concepts: Vec<&str> = Vec::new();
    for c in ordered.iter().flat_map(|c| c.concepts.iter()) {
      if concepts.len() >= MAX_PROMPT_CONCEPTS { break; }
      if !concepts.iter().any(|p| p.eq_ignore_ascii_case(&c.phrase)) { concepts.push(&c.phrase); }
    }

    let avoid_block = if avoid.questions.is_empty() {
      String::new()
    } else {
      let list = avoid.questions.iter().map(|q| format!("- {q}")).collect::<Vec<_>>().join("\n");
      fill_template(&self.prompts.avoid_template, &[("questions", list.as_str())])
    };

    fill_template(
      &self.prompts.generation_user_template,
      &[
        ("count", count.to_string().as_str()),
        ("taxonomy", item.taxonomy.as_str()),
        ("verbs", taxonomy_verbs(item.taxonomy)),
        ("difficulty", item.difficulty.as_str()),
        ("difficulty_cue", difficulty_cue(item.difficulty)),
        ("concepts", concepts.join(", ").as_str()),
        ("avoid", avoid_block.as_str()),
        ("context", context.as_str()),
      ],
    )
  }

  /// One model call under the per-call deadline, parsed into raw questions.
  async fn attempt(&self, system: &str, user: &str) -> Result<Vec<RawQuestion>, ModelError> {
    let secs = self.cfg.call_timeout_secs;
    let raw = tokio::time::timeout(
      Duration::from_secs(secs),
      self.client.complete_json(system, user, self.cfg.temperature),
    )
    .await
    .map_err(|_| ModelError::Timeout(secs))??;
    parse_questions(&raw)
  }
}

#[async_trait]
impl GenerationBackend for RemoteBackend {
  fn kind(&self) -> BackendKind { BackendKind::Remote }

  #[instrument(
    level = "info",
    skip(self, chunks, item, avoid),
    fields(taxonomy = %item.taxonomy, difficulty = %item.difficulty, model = %self.client.model_name())
  )]
  async fn generate(
    &self,
    chunks: &[ContentChunk],
    item: &PlanItem,
    count: usize,
    avoid: &AvoidList,
  ) -> Result<Vec<QuestionCandidate>, GenerationError> {
    if count == 0 { return Ok(Vec::new()); }
    let user = self.build_prompt(chunks, item, count, avoid);

    let raw = match self.attempt(&self.prompts.generation_system, &user).await {
      Ok(raw) => raw,
      Err(first) => {
        warn!(target: "generation", error = %first, "Model reply unusable; retrying with strict prompt");
        self.attempt(&self.prompts.strict_retry_system, &user).await.map_err(|second| {
          warn!(target: "generation", error = %second, "Strict retry failed");
          GenerationError::Backend(second.to_string())
        })?
      }
    };

    let sentences: Vec<&str> = item
      .chunk_order
      .iter()
      .filter_map(|i| chunks.get(*i))
      .flat_map(|c| c.sentences.iter().map(String::as_str))
      .collect();

    let out: Vec<QuestionCandidate> = raw
      .into_iter()
      .take(count)
      .map(|r| {
        let question = r.question.trim().to_string();
        let explanation = r.explanation.map(|e| e.trim().to_string()).filter(|e| !e.is_empty());
        QuestionCandidate::new(
          question.clone(),
          r.answer.trim().to_string(),
          explanation,
          item.taxonomy,
          item.difficulty,
          question_type(&question),
          context_snippet(&sentences, &question),
          BackendKind::Remote,
        )
      })
      .collect();

    info!(target: "generation", returned = out.len(), "Remote candidates received");
    Ok(out)
  }
}

/// Join chunk texts until the cap. A first chunk longer than the cap is cut
/// on a char boundary.
pub fn build_context(chunks: &[&ContentChunk], max_chars: usize) -> String {
  let mut out = String::new();
  let mut used = 0usize;
  for c in chunks {
    let len = c.text.chars().count();
    let sep = if out.is_empty() { 0 } else { 2 };
    if used + sep + len > max_chars {
      if out.is_empty() { out = c.text.chars().take(max_chars).collect(); }
      break;
    }
    if sep > 0 { out.push_str("\n\n"); }
    out.push_str(&c.text);
    used += sep + len;
  }
  out
}

static CODE_FENCE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?s)^\s*```[A-Za-z]*\s*(.*?)\s*```\s*$").expect("valid regex"));
/// First `{` through last `}`.
static JSON_OBJECT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"));

/// Lenient parse: tolerates code fences and prose around the object.
/// A reply with no usable question counts as malformed.
fn parse_questions(raw: &str) -> Result<Vec<RawQuestion>, ModelError> {
  let unfenced = CODE_FENCE.captures(raw).and_then(|c| c.get(1)).map_or(raw, |m| m.as_str());
  let body = JSON_OBJECT
    .find(unfenced)
    .map(|m| m.as_str())
    .ok_or_else(|| ModelError::Malformed(format!("no JSON object in reply: {}", trunc_for_log(raw, 120))))?;
  let batch: RawBatch = serde_json::from_str(body).map_err(|e| ModelError::Malformed(e.to_string()))?;
  let questions: Vec<RawQuestion> = batch.questions.into_iter().filter(|q| !q.question.trim().is_empty()).collect();
  if questions.is_empty() {
    return Err(ModelError::Malformed("reply contained no questions".into()));
  }
  Ok(questions)
}

#[cfg(test)]
pub(crate) mod tests {
  use std::collections::VecDeque;
  use std::sync::Mutex;

  use super::*;
  use crate::domain::{DifficultyLevel, TaxonomyLevel};

  /// Model double that replays a script of replies and records prompts.
  pub struct ScriptedClient {
    pub replies: Mutex<VecDeque<Reply>>,
    pub calls: Mutex<Vec<(String, String)>>,
  }

  pub enum Reply {
    Text(String),
    Fail(ModelError),
    /// Sleeps past any reasonable deadline.
    Hang,
  }

  impl ScriptedClient {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
      Arc::new(Self { replies: Mutex::new(replies.into()), calls: Mutex::new(Vec::new()) })
    }

    pub fn call_count(&self) -> usize { self.calls.lock().unwrap().len() }
  }

  #[async_trait]
  impl ModelClient for ScriptedClient {
    async fn complete_json(&self, system: &str, user: &str, _temperature: f32) -> Result<String, ModelError> {
      self.calls.lock().unwrap().push((system.to_string(), user.to_string()));
      let next = self.replies.lock().unwrap().pop_front();
      match next {
        Some(Reply::Text(t)) => Ok(t),
        Some(Reply::Fail(e)) => Err(e),
        Some(Reply::Hang) => {
          tokio::time::sleep(Duration::from_secs(3600)).await;
          Ok(String::new())
        }
        None => Err(ModelError::Transport("script exhausted".into())),
      }
    }
  }

  pub fn batch(pairs: &[(&str, &str)]) -> String {
    let items: Vec<serde_json::Value> = pairs
      .iter()
      .map(|(q, a)| serde_json::json!({ "question": q, "answer": a, "explanation": "From the text." }))
      .collect();
    serde_json::json!({ "questions": items }).to_string()
  }

  fn chunks() -> Vec<ContentChunk> {
    let sentences = vec![
      "Stacks support push and pop operations.".to_string(),
      "Queues support enqueue and dequeue.".to_string(),
    ];
    vec![ContentChunk { index: 0, text: sentences.join(" "), sentences, concepts: vec![], anchor: None }]
  }

  fn item() -> PlanItem {
    PlanItem { taxonomy: TaxonomyLevel::Analyze, difficulty: DifficultyLevel::Medium, count: 2, chunk_order: vec![0] }
  }

  fn backend(client: Arc<ScriptedClient>) -> RemoteBackend {
    RemoteBackend::new(client, Prompts::default(), GenerationConfig::default())
  }

  #[tokio::test]
  async fn tags_with_cell_levels_and_truncates_to_count() {
    let client = ScriptedClient::new(vec![Reply::Text(batch(&[
      ("Compare stacks and queues.", "Stacks are LIFO; queues are FIFO."),
      ("How do queues work?", "Enqueue at the back, dequeue at the front."),
      ("What is a third one?", "Extra."),
    ]))]);
    let out = backend(client.clone()).generate(&chunks(), &item(), 2, &AvoidList::default()).await.unwrap();
    assert_eq!(out.len(), 2);
    assert!(out.iter().all(|c| c.taxonomy_level == TaxonomyLevel::Analyze && c.difficulty == DifficultyLevel::Medium));
    assert_eq!(out[0].question_type, crate::domain::QuestionType::Analytical);
    assert_eq!(out[0].explanation.as_deref(), Some("From the text."));
    assert!(out[1].context_snippet.starts_with("Queues support enqueue and dequeue."));
    assert_eq!(client.call_count(), 1);
  }

  #[tokio::test]
  async fn prompt_names_levels_concepts_and_avoided_questions() {
    let client = ScriptedClient::new(vec![Reply::Text(batch(&[("What is a stack?", "LIFO.")]))]);
    let mut cs = chunks();
    let sentence = cs[0].sentences[0].clone();
    cs[0].concepts.push(crate::domain::Concept {
      phrase: "pop operations".into(),
      salience: 1.0,
      sentence,
      proper: false,
    });
    let avoid = AvoidList { questions: vec!["Define push.".into()], ..AvoidList::default() };
    backend(client.clone()).generate(&cs, &item(), 1, &avoid).await.unwrap();
    let (_, user) = client.calls.lock().unwrap()[0].clone();
    assert!(user.contains("Write exactly 1 exam questions"));
    assert!(user.contains("analyze"));
    assert!(user.contains("differentiate, examine, categorize, compare"));
    assert!(user.contains("pop operations"));
    assert!(user.contains("- Define push."));
    assert!(user.contains("Stacks support push and pop operations."));
  }

  #[tokio::test]
  async fn fenced_replies_are_accepted() {
    let fenced = format!("```json\n{}\n```", batch(&[("What is a queue?", "FIFO.")]));
    let client = ScriptedClient::new(vec![Reply::Text(fenced)]);
    let out = backend(client).generate(&chunks(), &item(), 1, &AvoidList::default()).await.unwrap();
    assert_eq!(out[0].question, "What is a queue?");
  }

  #[tokio::test]
  async fn malformed_reply_is_retried_once_with_strict_prompt() {
    let client = ScriptedClient::new(vec![
      Reply::Text("Sure! Here are your questions.".into()),
      Reply::Text(batch(&[("What is a queue?", "FIFO.")])),
    ]);
    let out = backend(client.clone()).generate(&chunks(), &item(), 1, &AvoidList::default()).await.unwrap();
    assert_eq!(out.len(), 1);
    let calls = client.calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].0, Prompts::default().strict_retry_system);
  }

  #[tokio::test(start_paused = true)]
  async fn timeout_then_success() {
    let client = ScriptedClient::new(vec![Reply::Hang, Reply::Text(batch(&[("What is a stack?", "LIFO.")]))]);
    let out = backend(client.clone()).generate(&chunks(), &item(), 1, &AvoidList::default()).await.unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(client.call_count(), 2);
  }

  #[tokio::test]
  async fn two_failures_fail_the_cell() {
    let client = ScriptedClient::new(vec![
      Reply::Fail(ModelError::Status { status: 500, message: "boom".into() }),
      Reply::Text(r#"{"questions": []}"#.into()),
    ]);
    let err = backend(client).generate(&chunks(), &item(), 1, &AvoidList::default()).await.unwrap_err();
    assert!(matches!(err, GenerationError::Backend(msg) if msg.contains("no questions")));
  }

  #[test]
  fn context_is_capped() {
    let cs = chunks();
    let refs: Vec<&ContentChunk> = cs.iter().collect();
    assert_eq!(build_context(&refs, 10).chars().count(), 10);
    let two = [refs[0], refs[0]];
    assert_eq!(build_context(&two, 6000), format!("{}\n\n{}", cs[0].text, cs[0].text));
    assert_eq!(build_context(&two, cs[0].text.len() + 1), cs[0].text);
  }
}
