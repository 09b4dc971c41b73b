//! Concept extractor.
//!
//! Tags each sentence with a small lexicon + suffix tagger, chunks noun
//! phrases (adjective/noun runs ending in a noun, at most three words) and
//! ranks them per chunk by `tf * idf + entity bonus`. The top-K phrases and
//! the best-scoring sentence (the anchor) are stored on the chunk.
//!
//! Everything here is deterministic for a given input: ties are broken by
//! first occurrence and the parallel path is awaited in chunk order.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument, warn};

use crate::config::ExtractionConfig;
use crate::domain::{Concept, ContentChunk};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tag {
  Noun,
  ProperNoun,
  Verb,
  Adjective,
  Adverb,
  Determiner,
  Preposition,
  Pronoun,
  Conjunction,
  Auxiliary,
  Number,
  Punct,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
  pub text: String,
  pub lower: String,
  pub tag: Tag,
}

/// One noun-phrase occurrence inside a chunk.
#[derive(Clone, Debug, PartialEq)]
pub struct PhraseOccurrence {
  pub key: String,
  pub surface: String,
  pub proper: bool,
  pub sentence: usize,
}

const DETERMINERS: &[&str] = &[
  "the", "a", "an", "this", "that", "these", "those", "each", "every", "some", "any", "no", "all", "both",
  "either", "neither", "another", "such", "its", "their", "his", "her", "our", "your", "my", "many", "much",
  "few", "several", "other", "more", "most", "less", "least",
];
const PREPOSITIONS: &[&str] = &[
  "of", "in", "on", "at", "by", "for", "with", "from", "to", "into", "onto", "over", "under", "between",
  "among", "through", "during", "before", "after", "about", "against", "without", "within", "across",
  "along", "around", "behind", "beyond", "upon", "via", "per", "than", "like", "toward", "towards",
];
const PRONOUNS: &[&str] = &[
  "it", "they", "them", "he", "she", "we", "you", "i", "me", "us", "him", "which", "who", "whom", "whose",
  "what", "itself", "themselves", "one", "ones",
];
const CONJUNCTIONS: &[&str] = &[
  "and", "or", "but", "nor", "so", "yet", "because", "although", "while", "whereas", "if", "unless",
  "since", "when", "where", "whether", "though", "as", "then",
];
const AUXILIARIES: &[&str] = &[
  "is", "are", "was", "were", "be", "been", "being", "am", "do", "does", "did", "has", "have", "had", "can",
  "could", "will", "would", "shall", "should", "may", "might", "must",
];
const ADVERBS: &[&str] = &[
  "not", "also", "very", "often", "usually", "always", "never", "only", "there", "here", "too", "just",
  "even", "still", "already", "however", "therefore", "thus", "typically", "generally", "first",
];
/// Base forms; inflections (-s, -es, -ed, -d) are resolved by stripping.
const VERB_BASES: &[&str] = &[
  "support", "use", "make", "create", "include", "enable", "allow", "provide", "require", "contain",
  "produce", "convert", "describe", "explain", "show", "represent", "store", "remove", "add", "return",
  "perform", "learn", "improve", "develop", "cause", "affect", "involve", "consist", "become", "take",
  "give", "get", "know", "raise", "follow", "mean", "refer", "define", "determine", "depend", "occur",
  "exist", "lead", "reduce", "apply", "combine", "connect", "build", "run", "hold", "keep", "seem",
  "appear", "tend", "implement", "compute", "measure", "insert", "delete", "share", "send", "receive",
  "read", "write", "find", "see", "say", "think", "grow", "move", "transfer", "transform", "generate",
  "analyze", "compare", "evaluate", "propose", "identify", "solve", "demonstrate", "limit", "protect",
  "manage", "operate", "absorb", "emit", "transmit", "regulate", "maintain", "prevent", "serve",
  "consider", "ensure", "offer", "enter", "leave", "produce", "carry", "break", "join", "split", "sort",
  "search", "traverse", "encrypt", "decrypt", "allocate", "execute", "schedule",
];
const IRREGULAR_VERBS: &[&str] = &[
  "known", "made", "took", "taken", "gave", "given", "got", "became", "led", "held", "kept", "built", "ran",
  "found", "saw", "seen", "said", "thought", "grew", "grown", "sent", "wrote", "written", "shown", "done",
  "began", "begun", "broke", "broken", "went", "gone", "came",
];
/// Nouns too generic to be concepts.
const GENERIC_NOUNS: &[&str] = &[
  "thing", "things", "way", "ways", "lot", "lots", "kind", "kinds", "something", "anything", "everything",
  "nothing", "etc", "example", "examples", "part", "parts",
];
/// "-ly" words that are not adverbs.
const LY_NOUNS: &[&str] = &["family", "supply", "assembly", "reply", "apply", "anomaly", "monopoly", "italy", "july"];
const ADJECTIVE_SUFFIXES: &[&str] = &["ous", "ive", "ful", "able", "ible", "ical", "ic", "less", "al"];

/// A word (letters/digits joined by inner hyphens or apostrophes) or a
/// single punctuation mark.
static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"[\p{Alphabetic}\p{N}]+(?:[-'’][\p{Alphabetic}\p{N}]+)*|[^\s\p{Alphabetic}\p{N}]").expect("valid regex")
});

/// Split a sentence into word and punctuation tokens.
/// Words keep internal hyphens and apostrophes ("first-in", "queue's").
pub fn tokenize(sentence: &str) -> Vec<String> {
  TOKEN.find_iter(sentence).map(|m| m.as_str().to_string()).collect()
}

/// Lowercased open-class words of a text (function words and very short tokens removed).
pub fn content_words(text: &str) -> HashSet<String> {
  tokenize(text)
    .into_iter()
    .map(|w| w.to_lowercase())
    .filter(|w| w.chars().count() > 2 && w.chars().any(|c| c.is_alphabetic()))
    .filter(|w| {
      let w = w.as_str();
      ![DETERMINERS, PREPOSITIONS, PRONOUNS, CONJUNCTIONS, AUXILIARIES, ADVERBS]
        .iter()
        .any(|list| list.contains(&w))
    })
    .collect()
}

fn is_capitalized(w: &str) -> bool {
  w.chars().next().map(|c| c.is_uppercase()).unwrap_or(false)
}

fn is_acronym(w: &str) -> bool {
  w.chars().count() >= 2
    && w.chars().all(|c| c.is_uppercase() || c.is_ascii_digit())
    && w.chars().any(|c| c.is_alphabetic())
}

fn is_lexicon_verb(lower: &str) -> bool {
  if IRREGULAR_VERBS.contains(&lower) || VERB_BASES.contains(&lower) { return true; }
  ["es", "s", "ed", "d"].iter().any(|suffix| {
    lower
      .strip_suffix(suffix)
      .map(|stem| stem.len() > 1 && VERB_BASES.contains(&stem))
      .unwrap_or(false)
  })
}

fn has_adjective_suffix(lower: &str) -> bool {
  lower.chars().count() > 4 && ADJECTIVE_SUFFIXES.iter().any(|s| lower.ends_with(s))
}

/// Tag one sentence. Closed classes come from the lexicons above; open-class
/// words fall back on suffix rules and default to nouns.
pub fn tag_sentence(sentence: &str) -> Vec<Token> {
  let words = tokenize(sentence);
  let first_word = words.iter().position(|w| w.chars().any(|c| c.is_alphabetic()));
  let mut tokens: Vec<Token> = Vec::with_capacity(words.len());

  for (i, text) in words.iter().enumerate() {
    let lower = text.to_lowercase();
    let prev = tokens.last().map(|t: &Token| (t.tag, t.lower.as_str()));
    let initial = Some(i) == first_word;
    let next_capitalized = words.get(i + 1).map(|w| is_capitalized(w)).unwrap_or(false);

    let tag = if !text.chars().any(|c| c.is_alphanumeric()) {
      Tag::Punct
    } else if text.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false) {
      Tag::Number
    } else if is_acronym(text) {
      Tag::ProperNoun
    } else if DETERMINERS.contains(&lower.as_str()) {
      Tag::Determiner
    } else if AUXILIARIES.contains(&lower.as_str()) {
      Tag::Auxiliary
    } else if PREPOSITIONS.contains(&lower.as_str()) {
      Tag::Preposition
    } else if PRONOUNS.contains(&lower.as_str()) {
      Tag::Pronoun
    } else if CONJUNCTIONS.contains(&lower.as_str()) {
      Tag::Conjunction
    } else if ADVERBS.contains(&lower.as_str()) {
      Tag::Adverb
    } else if is_capitalized(text) && (!initial || next_capitalized) {
      Tag::ProperNoun
    } else if is_lexicon_verb(&lower) {
      match prev {
        Some((Tag::Determiner | Tag::Adjective, _)) => Tag::Noun,
        Some((Tag::Preposition, p)) if p != "to" => Tag::Noun,
        _ => Tag::Verb,
      }
    } else if lower.ends_with("ly") && lower.len() > 4 && !LY_NOUNS.contains(&lower.as_str()) {
      Tag::Adverb
    } else if lower.ends_with("ing") && lower.len() > 4 {
      match prev {
        Some((Tag::Auxiliary, _)) => Tag::Verb,
        _ => Tag::Noun,
      }
    } else if lower.ends_with("ed") && lower.len() > 4 {
      match prev {
        Some((Tag::Determiner, _)) => Tag::Adjective,
        _ => Tag::Verb,
      }
    } else if has_adjective_suffix(&lower) {
      Tag::Adjective
    } else {
      Tag::Noun
    };

    tokens.push(Token { text: text.clone(), lower, tag });
  }
  tokens
}

/// Noun-phrase chunking over tagged tokens.
pub fn noun_phrases(tokens: &[Token]) -> Vec<(String, String, bool)> {
  let mut out = Vec::new();
  let mut run: Vec<&Token> = Vec::new();
  for tok in tokens.iter().map(Some).chain(std::iter::once(None)) {
    let extends = tok
      .map(|t| {
        matches!(t.tag, Tag::Noun | Tag::ProperNoun | Tag::Adjective)
          && !GENERIC_NOUNS.contains(&t.lower.as_str())
          && t.lower.chars().count() > 1
      })
      .unwrap_or(false);
    if extends {
      if let Some(t) = tok { run.push(t); }
      continue;
    }
    while run.last().map(|t| t.tag == Tag::Adjective).unwrap_or(false) {
      run.pop();
    }
    if !run.is_empty() {
      let start = run.len().saturating_sub(3);
      let words = &run[start..];
      let key = words.iter().map(|t| t.lower.as_str()).collect::<Vec<_>>().join(" ");
      let surface = words
        .iter()
        .map(|t| if t.tag == Tag::ProperNoun { t.text.as_str() } else { t.lower.as_str() })
        .collect::<Vec<_>>()
        .join(" ");
      let proper = words.iter().all(|t| t.tag == Tag::ProperNoun);
      out.push((key, surface, proper));
    }
    run.clear();
  }
  out
}

/// All phrase occurrences of one chunk, in reading order.
pub fn phrase_occurrences(sentences: &[String]) -> Vec<PhraseOccurrence> {
  let mut out = Vec::new();
  for (idx, sentence) in sentences.iter().enumerate() {
    for (key, surface, proper) in noun_phrases(&tag_sentence(sentence)) {
      out.push(PhraseOccurrence { key, surface, proper, sentence: idx });
    }
  }
  out
}

/// Extract ranked concepts and the anchor sentence for every chunk.
#[instrument(level = "debug", skip_all, fields(chunks = chunks.len()))]
pub async fn extract(mut chunks: Vec<ContentChunk>, cfg: &ExtractionConfig) -> Vec<ContentChunk> {
  if chunks.len() < cfg.parallel_threshold.max(1) {
    return extract_sync(chunks, cfg);
  }
  let per_chunk = tag_on_blocking_pool(&chunks).await;
  rank_chunks(&mut chunks, &per_chunk, cfg);
  chunks
}

/// Sequential variant; also the path for small inputs.
pub fn extract_sync(mut chunks: Vec<ContentChunk>, cfg: &ExtractionConfig) -> Vec<ContentChunk> {
  let per_chunk: Vec<_> = chunks.iter().map(|c| phrase_occurrences(&c.sentences)).collect();
  rank_chunks(&mut chunks, &per_chunk, cfg);
  chunks
}

async fn tag_on_blocking_pool(chunks: &[ContentChunk]) -> Vec<Vec<PhraseOccurrence>> {
  let handles: Vec<_> = chunks
    .iter()
    .map(|c| {
      let sentences = c.sentences.clone();
      tokio::task::spawn_blocking(move || phrase_occurrences(&sentences))
    })
    .collect();

  let mut out = Vec::with_capacity(chunks.len());
  for (handle, chunk) in handles.into_iter().zip(chunks) {
    match handle.await {
      Ok(occ) => out.push(occ),
      Err(e) => {
        warn!(target: "generation", chunk = chunk.index, error = %e, "Tagging task failed; tagging inline");
        out.push(phrase_occurrences(&chunk.sentences));
      }
    }
  }
  out
}

struct PhraseStats {
  key: String,
  surface: String,
  proper: bool,
  count: usize,
  first: usize,
  sentence: usize,
}

fn rank_chunks(chunks: &mut [ContentChunk], per_chunk: &[Vec<PhraseOccurrence>], cfg: &ExtractionConfig) {
  let n = chunks.len() as f64;
  let mut df: HashMap<&str, usize> = HashMap::new();
  for occ in per_chunk {
    let unique: HashSet<&str> = occ.iter().map(|o| o.key.as_str()).collect();
    for key in unique {
      *df.entry(key).or_default() += 1;
    }
  }

  for (chunk, occ) in chunks.iter_mut().zip(per_chunk) {
    let mut stats: Vec<PhraseStats> = Vec::new();
    let mut by_key: HashMap<&str, usize> = HashMap::new();
    for (pos, o) in occ.iter().enumerate() {
      match by_key.get(o.key.as_str()) {
        Some(&i) => stats[i].count += 1,
        None => {
          by_key.insert(o.key.as_str(), stats.len());
          stats.push(PhraseStats {
            key: o.key.clone(),
            surface: o.surface.clone(),
            proper: o.proper,
            count: 1,
            first: pos,
            sentence: o.sentence,
          });
        }
      }
    }

    let total = occ.len().max(1) as f64;
    let mut scored: Vec<(f64, &PhraseStats)> = stats
      .iter()
      .map(|s| {
        let tf = s.count as f64 / total;
        let idf = ((1.0 + n) / (1.0 + df.get(s.key.as_str()).copied().unwrap_or(0) as f64)).ln() + 1.0;
        let bonus = if s.proper { cfg.proper_noun_bonus } else { 0.0 };
        (tf * idf + bonus, s)
      })
      .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.first.cmp(&b.1.first)));
    scored.truncate(cfg.top_k);

    chunk.concepts = scored
      .iter()
      .map(|(score, s)| Concept {
        phrase: s.surface.clone(),
        salience: *score,
        sentence: chunk.sentences.get(s.sentence).cloned().unwrap_or_default(),
        proper: s.proper,
      })
      .collect();

    // Anchor: sentence with the highest summed salience of the kept phrases.
    let kept: HashMap<&str, f64> = scored.iter().map(|(score, s)| (s.key.as_str(), *score)).collect();
    let mut sentence_scores = vec![0.0f64; chunk.sentences.len()];
    let mut counted: HashSet<(usize, &str)> = HashSet::new();
    for o in occ {
      if let Some(score) = kept.get(o.key.as_str()) {
        if counted.insert((o.sentence, o.key.as_str())) {
          if let Some(slot) = sentence_scores.get_mut(o.sentence) { *slot += score; }
        }
      }
    }
    let mut best: Option<(usize, f64)> = None;
    for (i, score) in sentence_scores.iter().enumerate() {
      if best.map(|(_, b)| *score > b).unwrap_or(true) { best = Some((i, *score)); }
    }
    chunk.anchor = best.and_then(|(i, _)| chunk.sentences.get(i).cloned());

    debug!(
      target: "generation",
      chunk = chunk.index,
      concepts = ?chunk.concepts.iter().map(|c| c.phrase.as_str()).collect::<Vec<_>>(),
      "Concepts ranked"
    );
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn chunk(index: usize, sentences: &[&str]) -> ContentChunk {
    let sentences: Vec<String> = sentences.iter().map(|s| s.to_string()).collect();
    ContentChunk { index, text: sentences.join(" "), sentences, concepts: vec![], anchor: None }
  }

  fn tags(sentence: &str) -> Vec<(String, Tag)> {
    tag_sentence(sentence).into_iter().map(|t| (t.text, t.tag)).collect()
  }

  #[test]
  fn tokenizer_keeps_inner_hyphens_and_splits_punctuation() {
    assert_eq!(
      tokenize("Last-in, first-out (LIFO) order."),
      vec!["Last-in", ",", "first-out", "(", "LIFO", ")", "order", "."]
    );
    assert_eq!(tokenize("the queue's head -- x86 cores"), vec!["the", "queue's", "head", "-", "-", "x86", "cores"]);
  }

  #[test]
  fn tagger_handles_lexicon_verbs_and_entities() {
    let t = tags("Stacks support push and pop operations.");
    assert_eq!(t[0].1, Tag::Noun);
    assert_eq!(t[1].1, Tag::Verb);
    assert_eq!(t[2].1, Tag::Noun);
    assert_eq!(t[3].1, Tag::Conjunction);
    assert_eq!(t[6].1, Tag::Punct);

    let t = tags("Researchers at Google use the support vector machine in AI.");
    assert_eq!(t[2], ("Google".to_string(), Tag::ProperNoun));
    assert_eq!(t[3].1, Tag::Verb);
    assert_eq!(t[5].1, Tag::Noun, "verb after a determiner is a noun");
    assert_eq!(t[9], ("AI".to_string(), Tag::ProperNoun));
  }

  #[test]
  fn noun_phrases_cap_length_and_drop_trailing_adjectives() {
    let phrases = noun_phrases(&tag_sentence("Deep neural network models are powerful."));
    assert_eq!(phrases, vec![("neural network models".to_string(), "neural network models".to_string(), false)]);
  }

  #[test]
  fn stack_and_queue_concepts_in_reading_order() {
    let chunks = extract_sync(
      vec![chunk(0, &["Stacks support push and pop operations.", "Queues support enqueue and dequeue."])],
      &ExtractionConfig::default(),
    );
    let phrases: Vec<&str> = chunks[0].concepts.iter().map(|c| c.phrase.as_str()).collect();
    assert_eq!(phrases, vec!["stacks", "push", "pop operations", "queues", "enqueue"]);
    assert_eq!(chunks[0].anchor.as_deref(), Some("Stacks support push and pop operations."));
    assert_eq!(chunks[0].concepts[3].sentence, "Queues support enqueue and dequeue.");
  }

  #[test]
  fn top_k_limits_concepts() {
    let cfg = ExtractionConfig { top_k: 2, ..ExtractionConfig::default() };
    let chunks = extract_sync(
      vec![chunk(0, &["Stacks support push and pop operations.", "Queues support enqueue and dequeue."])],
      &cfg,
    );
    assert_eq!(chunks[0].concepts.len(), 2);
  }

  #[test]
  fn repeated_and_proper_phrases_rank_higher() {
    let chunks = extract_sync(
      vec![chunk(0, &[
        "A compiler reads source code.",
        "The compiler emits machine code for Linux.",
      ])],
      &ExtractionConfig::default(),
    );
    let phrases: Vec<&str> = chunks[0].concepts.iter().map(|c| c.phrase.as_str()).collect();
    assert_eq!(phrases[0], "Linux");
    assert_eq!(phrases[1], "compiler");
    assert!(chunks[0].concepts[0].proper);
  }

  #[test]
  fn phrases_unique_to_a_chunk_outrank_shared_ones() {
    let chunks = extract_sync(
      vec![
        chunk(0, &["Memory stores the heap."]),
        chunk(1, &["Memory stores the stack."]),
        chunk(2, &["Memory holds registers."]),
      ],
      &ExtractionConfig::default(),
    );
    assert_eq!(chunks[0].concepts[0].phrase, "heap");
    assert_eq!(chunks[1].concepts[0].phrase, "stack");
    assert_eq!(chunks[2].concepts[0].phrase, "registers");
  }

  #[tokio::test]
  async fn parallel_path_matches_sequential_path() {
    let input: Vec<ContentChunk> = (0..10)
      .map(|i| chunk(i, &["Binary trees store sorted keys.", "Hash tables map keys to buckets."]))
      .collect();
    let cfg = ExtractionConfig { parallel_threshold: 2, ..ExtractionConfig::default() };
    let parallel = extract(input.clone(), &cfg).await;
    let sequential = extract_sync(input, &cfg);
    assert_eq!(parallel, sequential);
  }
}
