//! Relevance scoring.
//!
//! The score of a file is a single documented scalar:
//!
//! ```text
//! score = match_weight * log2(1 + match_count)
//!       + word_boundary_bonus   (any span starts or ends on a word boundary)
//!       + filename_weight       (the match hit the filename)
//!       + repo_priority_weight * repository.priority
//! ```
//!
//! `filename_weight` dominates the log-scaled match term for any realistic
//! match count, so filename hits surface above content-only files.
//! Documents within a shard are ordered by (score descending, doc id
//! ascending).

use serde::{Deserialize, Serialize};

/// Reference weights for the score scalar
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub match_weight: f64,
    pub word_boundary_bonus: f64,
    pub filename_weight: f64,
    pub repo_priority_weight: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            match_weight: 1.0,
            word_boundary_bonus: 0.8,
            filename_weight: 5.0,
            repo_priority_weight: 0.1,
        }
    }
}

/// Per-file scoring inputs
#[derive(Debug, Default)]
pub struct ScoreInput {
    pub match_count: usize,
    pub word_boundary_hit: bool,
    pub filename_match: bool,
    pub repo_priority: f64,
}

pub struct Scorer {
    weights: ScoreWeights,
}

impl Scorer {
    pub fn new(weights: ScoreWeights) -> Self {
        Self { weights }
    }

    pub fn with_defaults() -> Self {
        Self::new(ScoreWeights::default())
    }

    pub fn score(&self, input: &ScoreInput) -> f64 {
        let mut score = self.weights.match_weight * (1.0 + input.match_count as f64).log2();
        if input.word_boundary_hit {
            score += self.weights.word_boundary_bonus;
        }
        if input.filename_match {
            score += self.weights.filename_weight;
        }
        score + self.weights.repo_priority_weight * input.repo_priority
    }

    /// Score plus a human-readable breakdown for `debug_score`
    pub fn score_debug(&self, input: &ScoreInput) -> (f64, String) {
        let score = self.score(input);
        let debug = format!(
            "score={:.3} (matches={} boundary={} filename={} repo_priority={:.2})",
            score,
            input.match_count,
            input.word_boundary_hit,
            input.filename_match,
            input.repo_priority,
        );
        (score, debug)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_more_matches_score_higher() {
        let scorer = Scorer::with_defaults();
        let one = scorer.score(&ScoreInput {
            match_count: 1,
            ..Default::default()
        });
        let ten = scorer.score(&ScoreInput {
            match_count: 10,
            ..Default::default()
        });
        assert!(ten > one);
    }

    #[test]
    fn test_filename_outranks_content() {
        let scorer = Scorer::with_defaults();
        let filename = scorer.score(&ScoreInput {
            match_count: 0,
            filename_match: true,
            ..Default::default()
        });
        let content = scorer.score(&ScoreInput {
            match_count: 20,
            ..Default::default()
        });
        assert!(filename > content);
    }

    #[test]
    fn test_repo_priority_breaks_ties() {
        let scorer = Scorer::with_defaults();
        let low = scorer.score(&ScoreInput {
            match_count: 2,
            repo_priority: 0.0,
            ..Default::default()
        });
        let high = scorer.score(&ScoreInput {
            match_count: 2,
            repo_priority: 10.0,
            ..Default::default()
        });
        assert!(high > low);
    }
}
