//! Pluggable similarity estimators
//!
//! A [`SimilarityEstimator`] maps two vectors to a score in `[0, 1]`,
//! symmetric in its arguments. Regions take the estimator as a strategy
//! object so the scoring model is chosen at construction time rather than
//! baked into the search path.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Scoring strategy for vector similarity
///
/// Implementations must be symmetric (`score(a, b) == score(b, a)`) and
/// return their maximum attainable value for `score(a, a)`. Degenerate
/// inputs an estimator cannot rank, such as zero-norm vectors under cosine,
/// are exempt from the self-score rule.
pub trait SimilarityEstimator: Send + Sync {
    /// Score two vectors in `[0, 1]`
    fn score(&self, a: &[f32], b: &[f32]) -> f32;
}

/// Deterministic cosine similarity, rescaled from `[-1, 1]` to `[0, 1]`
///
/// Zero-norm vectors take the cosine-0 convention: they score 0.5 against
/// everything, including themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct CosineEstimator;

impl SimilarityEstimator for CosineEstimator {
    fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        (cosine_similarity(a, b) + 1.0) / 2.0
    }
}

/// Calculate cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Statistical estimator based on random hyperplane sampling
///
/// Draws `trials` fixed hyperplanes from a seeded RNG at construction; the
/// score is the fraction of hyperplanes on which both vectors fall on the
/// same side. Reproducible for a fixed seed, and converges to a stable value
/// as `trials` grows.
pub struct SampledProjectionEstimator {
    projections: Vec<Vec<f32>>,
}

impl SampledProjectionEstimator {
    /// Create an estimator for `dimension`-length vectors using `trials`
    /// sampled hyperplanes drawn from `seed`
    pub fn new(dimension: usize, trials: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let projections = (0..trials)
            .map(|_| (0..dimension).map(|_| rng.gen_range(-1.0..1.0)).collect())
            .collect();
        Self { projections }
    }

    fn same_side(projection: &[f32], a: &[f32], b: &[f32]) -> bool {
        let dot = |v: &[f32]| -> f32 { projection.iter().zip(v.iter()).map(|(p, x)| p * x).sum() };
        (dot(a) >= 0.0) == (dot(b) >= 0.0)
    }
}

impl SimilarityEstimator for SampledProjectionEstimator {
    fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || self.projections.is_empty() {
            return 0.0;
        }
        let agreeing = self
            .projections
            .iter()
            .filter(|p| Self::same_side(p, a, b))
            .count();
        agreeing as f32 / self.projections.len() as f32
    }
}
