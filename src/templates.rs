//! Built-in template bank for the local backend, plus the per-level cues the
//! remote prompt embeds. These guarantee the engine is useful without any
//! external config or model access.
//!
//! Placeholders: `{concept}`, `{other}` (a second concept from the same
//! chunk) and `{sentence}` (the concept's source sentence).

use crate::domain::{DifficultyLevel, TaxonomyLevel};

/// Question templates for one (taxonomy, difficulty) cell.
/// Every group holds at least one template without `{other}`.
pub fn question_templates(taxonomy: TaxonomyLevel, difficulty: DifficultyLevel) -> &'static [&'static str] {
  use DifficultyLevel::*;
  use TaxonomyLevel::*;
  match (taxonomy, difficulty) {
    (Remember, Easy) => &[
      "What is {concept}?",
      "Define {concept}.",
      "Identify {concept} as described in the text.",
    ],
    (Remember, Medium) => &[
      "What does the text state about {concept}?",
      "List the key facts given about {concept}.",
      "Which statement in the text mentions both {concept} and {other}?",
    ],
    (Remember, Hard) => &[
      "Recall precisely how the text characterizes {concept}, including any related terms.",
      "State every detail the text gives about {concept} and {other}.",
    ],
    (Understand, Easy) => &[
      "Explain the concept of {concept}.",
      "Summarize the main idea about {concept}.",
    ],
    (Understand, Medium) => &[
      "How does {concept} work, according to the text?",
      "Describe the relationship between {concept} and {other}.",
      "What is the significance of {concept}?",
    ],
    (Understand, Hard) => &[
      "Interpret the following statement in your own words and explain the role of {concept}: {sentence}",
      "Explain why {concept} matters for understanding {other}.",
    ],
    (Apply, Easy) => &[
      "Give an everyday example of {concept}.",
      "How would you use {concept} in a simple situation?",
    ],
    (Apply, Medium) => &[
      "How would you use {concept} in a real-world scenario?",
      "Demonstrate how {concept} can be applied to {other}.",
    ],
    (Apply, Hard) => &[
      "Apply the concept of {concept} to solve a new problem based on this statement: {sentence}",
      "What would happen if {concept} was implemented in {other}?",
    ],
    (Analyze, Easy) => &[
      "What are the main components of {concept}?",
      "How is {concept} different from {other}?",
    ],
    (Analyze, Medium) => &[
      "Compare and contrast {concept} and {other}.",
      "Break down the components of {concept}.",
      "What are the causes of {concept}?",
    ],
    (Analyze, Hard) => &[
      "Examine the assumptions behind this statement and categorize the role of {concept}: {sentence}",
      "Analyze the relationship between {concept} and {other}.",
      "What patterns can you identify in {concept}?",
    ],
    (Evaluate, Easy) => &[
      "What are the strengths and weaknesses of {concept}?",
      "Is {concept} useful? Justify your answer.",
    ],
    (Evaluate, Medium) => &[
      "Evaluate the effectiveness of {concept}.",
      "Assess the impact of {concept} on {other}.",
      "Justify your opinion about {concept}.",
    ],
    (Evaluate, Hard) => &[
      "Assess the validity of {concept} in the context of: {sentence}",
      "Which approach is better: {concept} or {other}? Explain.",
    ],
    (Create, Easy) => &[
      "Suggest a simple improvement to {concept}.",
      "Propose an alternative solution to {concept}.",
    ],
    (Create, Medium) => &[
      "Design a new approach to {concept}.",
      "Create a plan for implementing {concept}.",
      "Develop a strategy that combines {concept} and {other}.",
    ],
    (Create, Hard) => &[
      "Construct an argument for {concept}, building on this statement: {sentence}",
      "Develop a strategy for {concept}.",
      "Design a system that integrates {concept} with {other}, and justify your design choices.",
    ],
  }
}

/// Cognitive verbs named in the remote prompt for each level.
pub fn taxonomy_verbs(taxonomy: TaxonomyLevel) -> &'static str {
  match taxonomy {
    TaxonomyLevel::Remember => "define, list, recall, identify",
    TaxonomyLevel::Understand => "explain, summarize, interpret, classify",
    TaxonomyLevel::Apply => "apply, demonstrate, use, solve",
    TaxonomyLevel::Analyze => "differentiate, examine, categorize, compare",
    TaxonomyLevel::Evaluate => "assess, justify, critique, judge",
    TaxonomyLevel::Create => "design, propose, construct, develop",
  }
}

/// Complexity cue for the remote prompt.
pub fn difficulty_cue(difficulty: DifficultyLevel) -> &'static str {
  match difficulty {
    DifficultyLevel::Easy => "a single step, answerable from one statement in the text",
    DifficultyLevel::Medium => "connects two ideas from the text and needs a short explanation",
    DifficultyLevel::Hard => "multi-step reasoning that combines several ideas or extends beyond the text",
  }
}

/// Answer frames for the local synthesizer. `{sentence}` is the source sentence.
pub fn answer_frame(taxonomy: TaxonomyLevel) -> &'static str {
  match taxonomy {
    TaxonomyLevel::Remember | TaxonomyLevel::Understand => "{sentence}",
    TaxonomyLevel::Apply => "Based on the text: {sentence} Apply this statement to the situation in the question, naming each step.",
    TaxonomyLevel::Analyze => "Based on the text: {sentence} Break this statement into its parts and relate them to each other.",
    TaxonomyLevel::Evaluate => "Weigh the evidence in the text: {sentence} A strong answer states a judgement and supports it with this evidence.",
    TaxonomyLevel::Create => "Start from the text: {sentence} A strong answer proposes something new that builds on this statement and explains the reasoning.",
  }
}
