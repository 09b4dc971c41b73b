//! Local template backend: no network, fully deterministic.
//!
//! Walks concepts round-robin across the cell's chunk order (first concept of
//! every chunk, then the second, ...), fills a template from the cell's group
//! and synthesizes an extractive answer from the concept's source sentence.

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::{BackendKind, ContentChunk, PlanItem, QuestionCandidate};
use crate::engine::backend::{AvoidList, GenerationBackend};
use crate::engine::synth::{context_snippet, local_answer, local_explanation, question_type};
use crate::error::GenerationError;
use crate::templates::question_templates;
use crate::util::{fill_template, fingerprint};

#[derive(Clone, Copy, Debug, Default)]
pub struct LocalBackend;

impl LocalBackend {
  pub fn candidates(
    &self,
    chunks: &[ContentChunk],
    item: &PlanItem,
    count: usize,
    avoid: &AvoidList,
  ) -> Vec<QuestionCandidate> {
    let templates = question_templates(item.taxonomy, item.difficulty);
    let Some(single) = templates.iter().find(|t| !t.contains("{other}")) else { return Vec::new() };

    let ordered: Vec<&ContentChunk> = item.chunk_order.iter().filter_map(|i| chunks.get(*i)).collect();
    let rounds = ordered.iter().map(|c| c.concepts.len()).max().unwrap_or(0);

    let mut out = Vec::new();
    let mut produced: HashSet<String> = HashSet::new();
    for round in 0..rounds {
      for chunk in &ordered {
        if out.len() >= count { return out; }
        let Some(concept) = chunk.concepts.get(round) else { continue };

        let other = (chunk.concepts.len() > 1)
          .then(|| chunk.concepts[(round + 1) % chunk.concepts.len()].phrase.as_str());
        let mut template = templates[(round + chunk.index) % templates.len()];
        if template.contains("{other}") && other.is_none() { template = single; }

        let question = fill_template(
          template,
          &[
            ("concept", concept.phrase.as_str()),
            ("other", other.unwrap_or("")),
            ("sentence", concept.sentence.as_str()),
          ],
        );
        let fp = fingerprint(&question);
        if avoid.contains(&fp) || !produced.insert(fp) { continue; }

        out.push(QuestionCandidate::new(
          question.clone(),
          local_answer(item.taxonomy, &concept.sentence),
          local_explanation(chunk, &concept.sentence),
          item.taxonomy,
          item.difficulty,
          question_type(&question),
          context_snippet(&chunk.sentences, &question),
          BackendKind::Local,
        ));
      }
    }
    debug!(target: "generation", taxonomy = %item.taxonomy, difficulty = %item.difficulty, produced = out.len(), "Local candidates built");
    out
  }
}

#[async_trait]
impl GenerationBackend for LocalBackend {
  fn kind(&self) -> BackendKind { BackendKind::Local }

  async fn generate(
    &self,
    chunks: &[ContentChunk],
    item: &PlanItem,
    count: usize,
    avoid: &AvoidList,
  ) -> Result<Vec<QuestionCandidate>, GenerationError> {
    Ok(self.candidates(chunks, item, count, avoid))
  }
}
