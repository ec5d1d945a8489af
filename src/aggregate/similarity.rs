//! Identifier similarity for sub-entity deduplication

use crate::config::{AggregationConfig, SimilarityAlgorithm};
use std::collections::HashSet;

/// Lower-cases and collapses whitespace
pub fn normalize_identifier(identifier: &str) -> String {
    identifier
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Levenshtein edit distance over chars
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

/// `1 - distance / longer length`, in [0, 1]
pub fn levenshtein_similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

/// Jaccard index over whitespace-separated tokens
pub fn token_jaccard(a: &str, b: &str) -> f64 {
    let a: HashSet<&str> = a.split_whitespace().collect();
    let b: HashSet<&str> = b.split_whitespace().collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let shared = a.intersection(&b).count();
    let total = a.union(&b).count();
    shared as f64 / total as f64
}

/// Decides whether two identifiers name the same sub-entity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IdentifierMatcher {
    algorithm: SimilarityAlgorithm,
    threshold: f64,
}

impl IdentifierMatcher {
    pub fn new(algorithm: SimilarityAlgorithm, threshold: f64) -> Self {
        Self {
            algorithm,
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    pub fn from_config(config: &AggregationConfig) -> Self {
        Self::new(config.similarity_algorithm, config.similarity_threshold)
    }

    /// Similarity of two already-normalized identifiers
    pub fn similarity(&self, a: &str, b: &str) -> f64 {
        match self.algorithm {
            SimilarityAlgorithm::Exact => {
                if a == b {
                    1.0
                } else {
                    0.0
                }
            }
            SimilarityAlgorithm::Levenshtein => levenshtein_similarity(a, b),
            SimilarityAlgorithm::TokenJaccard => token_jaccard(a, b),
        }
    }

    pub fn matches(&self, a: &str, b: &str) -> bool {
        a == b || self.similarity(a, b) >= self.threshold
    }
}
