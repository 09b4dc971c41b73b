//! Loading service configuration (engine limits + prompts) from TOML.
//!
//! Every section and field is optional; missing values take the defaults
//! below. See `ServiceConfig` for the expected schema:
//!
//! ```toml
//! fallback_to_local = true
//!
//! [limits]
//! max_questions = 20
//! max_paper_questions = 50
//!
//! [chunking]
//! min_chunk_chars = 200
//! max_chunk_chars = 800
//!
//! [generation]
//! concurrency = 3
//! call_timeout_secs = 30
//! ```

use serde::Deserialize;
use tracing::{error, info};

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
  pub limits: Limits,
  pub chunking: ChunkingConfig,
  pub extraction: ExtractionConfig,
  pub generation: GenerationConfig,
  pub prompts: Prompts,
  /// Re-run with the local backend when remote generation is unavailable or fails.
  pub fallback_to_local: bool,
}

impl Default for ServiceConfig {
  fn default() -> Self {
    Self {
      limits: Limits::default(),
      chunking: ChunkingConfig::default(),
      extraction: ExtractionConfig::default(),
      generation: GenerationConfig::default(),
      prompts: Prompts::default(),
      fallback_to_local: true,
    }
  }
}

/// Request and validation bounds.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Limits {
  pub max_questions: usize,
  /// Cap on the summed quotas of an explicit (question paper) request.
  pub max_paper_questions: usize,
  pub min_content_chars: usize,
  pub min_question_chars: usize,
}

impl Default for Limits {
  fn default() -> Self {
    Self { max_questions: 20, max_paper_questions: 50, min_content_chars: 10, min_question_chars: 5 }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
  pub min_chunk_chars: usize,
  pub max_chunk_chars: usize,
  /// Page mode only: shorter lines are treated as headers/footers.
  pub page_min_line_chars: usize,
  /// Page mode only: lines starting with these (case-insensitive) are dropped.
  pub page_skip_prefixes: Vec<String>,
}

impl Default for ChunkingConfig {
  fn default() -> Self {
    Self {
      min_chunk_chars: 200,
      max_chunk_chars: 800,
      page_min_line_chars: 30,
      page_skip_prefixes: vec!["subject code".into(), "publication".into(), "university".into()],
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
  pub top_k: usize,
  pub proper_noun_bonus: f64,
  /// Chunk count from which tagging runs on the blocking pool.
  pub parallel_threshold: usize,
}

impl Default for ExtractionConfig {
  fn default() -> Self {
    Self { top_k: 5, proper_noun_bonus: 0.5, parallel_threshold: 8 }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
  /// Max cells generating at the same time.
  pub concurrency: usize,
  /// Timeout for one remote model call.
  pub call_timeout_secs: u64,
  /// Cap on source text embedded in one remote prompt.
  pub max_context_chars: usize,
  pub temperature: f32,
  /// How many times a cell may go back to its backend for more candidates.
  pub max_pull_rounds: usize,
  /// Remote answers more similar than this (word Jaccard) to an accepted one are dropped.
  pub answer_similarity_threshold: f64,
}

impl Default for GenerationConfig {
  fn default() -> Self {
    Self {
      concurrency: 3,
      call_timeout_secs: 30,
      max_context_chars: 6000,
      temperature: 0.7,
      max_pull_rounds: 3,
      answer_similarity_threshold: 0.8,
    }
  }
}

/// Prompts used by the remote backend.
/// You can override them in TOML to tune tone/structure; keep the placeholders.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub generation_system: String,
  /// Placeholders: {count} {taxonomy} {verbs} {difficulty} {difficulty_cue} {concepts} {avoid} {context}
  pub generation_user_template: String,
  /// System prompt for the single retry after malformed output.
  pub strict_retry_system: String,
  /// Placeholder: {questions}
  pub avoid_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      generation_system: "You are an exam question writer for educators. Respond ONLY with strict JSON.".into(),
      generation_user_template: "Write exactly {count} exam questions from the source material below.\n\nCognitive level: {taxonomy} (use verbs such as: {verbs}).\nDifficulty: {difficulty} ({difficulty_cue}).\nKey concepts: {concepts}\n{avoid}\nRules:\n- Every question must be answerable from the source material.\n- Each question and answer must be different from the others.\n- Give a complete answer and a one-sentence explanation.\n\nReturn JSON: {\"questions\": [{\"question\": string, \"answer\": string, \"explanation\": string}]}\n\nSource material:\n{context}".into(),
      strict_retry_system: "Your previous reply was not usable. Return ONLY one JSON object of the form {\"questions\": [{\"question\": string, \"answer\": string, \"explanation\": string}]}. No prose, no markdown, no code fences.".into(),
      avoid_template: "Do not repeat or paraphrase these existing questions:\n{questions}\n".into(),
    }
  }
}

/// Parse a TOML document into a `ServiceConfig`.
pub fn parse_config(src: &str) -> Result<ServiceConfig, toml::de::Error> {
  toml::from_str::<ServiceConfig>(src)
}

/// Attempt to load `ServiceConfig` from QGEN_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_config_from_env() -> Option<ServiceConfig> {
  let path = std::env::var("QGEN_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_config(&s) {
      Ok(cfg) => {
        info!(target: "questgen_backend", %path, "Loaded service config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "questgen_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "questgen_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_document_yields_defaults() {
    let cfg = parse_config("").unwrap();
    assert_eq!(cfg.limits.max_questions, 20);
    assert_eq!(cfg.limits.max_paper_questions, 50);
    assert_eq!(cfg.chunking.max_chunk_chars, 800);
    assert_eq!(cfg.generation.concurrency, 3);
    assert!(cfg.fallback_to_local);
  }

  #[test]
  fn partial_sections_keep_other_defaults() {
    let cfg = parse_config(
      "fallback_to_local = false\n[generation]\nconcurrency = 5\n[extraction]\ntop_k = 2\n",
    )
    .unwrap();
    assert!(!cfg.fallback_to_local);
    assert_eq!(cfg.generation.concurrency, 5);
    assert_eq!(cfg.generation.call_timeout_secs, 30);
    assert_eq!(cfg.extraction.top_k, 2);
    assert_eq!(cfg.extraction.parallel_threshold, 8);
  }

  #[test]
  fn default_prompt_keeps_all_placeholders() {
    let p = Prompts::default();
    for key in ["{count}", "{taxonomy}", "{verbs}", "{difficulty}", "{difficulty_cue}", "{concepts}", "{avoid}", "{context}"] {
      assert!(p.generation_user_template.contains(key), "missing {key}");
    }
  }
}
