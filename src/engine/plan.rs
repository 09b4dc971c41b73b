//! Taxonomy/difficulty planner: spreads the requested total over the
//! cross-product of requested levels in canonical order, or takes explicit
//! per-cell quotas as given.

use std::collections::BTreeSet;

use crate::domain::{CellCount, DifficultyLevel, PlanItem, TaxonomyLevel};

/// Build the plan. Every cell gets `total / cells`; the first `total % cells`
/// cells in canonical order get one more. Zero-count cells are dropped.
///
/// Each item's `chunk_order` is the chunk list rotated to start at the
/// cell's position, so different cells lead with different chunks.
pub fn build_plan(
  taxonomy_levels: &[TaxonomyLevel],
  difficulty_levels: &[DifficultyLevel],
  total: usize,
  chunk_count: usize,
) -> Vec<PlanItem> {
  let taxonomies: BTreeSet<TaxonomyLevel> = taxonomy_levels.iter().copied().collect();
  let difficulties: BTreeSet<DifficultyLevel> = difficulty_levels.iter().copied().collect();

  let cells: Vec<(TaxonomyLevel, DifficultyLevel)> = taxonomies
    .iter()
    .flat_map(|t| difficulties.iter().map(move |d| (*t, *d)))
    .collect();
  if cells.is_empty() { return Vec::new(); }

  let base = total / cells.len();
  let remainder = total % cells.len();

  cells
    .into_iter()
    .enumerate()
    .map(|(position, (taxonomy, difficulty))| {
      let count = base + usize::from(position < remainder);
      PlanItem { taxonomy, difficulty, count, chunk_order: rotation(position, chunk_count) }
    })
    .filter(|item| item.count > 0)
    .collect()
}

/// Plan from explicit quotas, keeping the caller's order. Cells are assumed
/// distinct and non-empty (the engine validates that first).
pub fn explicit_plan(cells: &[CellCount], chunk_count: usize) -> Vec<PlanItem> {
  cells
    .iter()
    .enumerate()
    .map(|(position, cell)| PlanItem {
      taxonomy: cell.taxonomy,
      difficulty: cell.difficulty,
      count: cell.count,
      chunk_order: rotation(position, chunk_count),
    })
    .collect()
}

fn rotation(position: usize, chunk_count: usize) -> Vec<usize> {
  (0..chunk_count).map(|i| (position + i) % chunk_count.max(1)).collect()
}
