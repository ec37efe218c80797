//! Multi-class face classifier over embeddings.
//!
//! `LinearSvm` trains one linear hinge-loss model per class (one-vs-rest)
//! with Pegasos stochastic sub-gradient steps, then calibrates every
//! per-class score with a Platt sigmoid so `predict_proba` returns a
//! probability vector that sums to one.

use crate::common::{RosterError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Sorted set of person ids; a label's class index is its position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn fit<S: AsRef<str>>(labels: &[S]) -> Self {
        let mut classes: Vec<String> = labels.iter().map(|l| l.as_ref().to_string()).collect();
        classes.sort();
        classes.dedup();
        Self { classes }
    }

    pub fn transform(&self, label: &str) -> Option<usize> {
        self.classes.binary_search_by(|c| c.as_str().cmp(label)).ok()
    }

    pub fn inverse_transform(&self, index: usize) -> Option<&str> {
        self.classes.get(index).map(String::as_str)
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SvmParams {
    pub c: f32,
    pub epochs: usize,
    pub seed: u64,
}

impl Default for SvmParams {
    fn default() -> Self {
        Self { c: 1.0, epochs: 50, seed: 42 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct PlattScale {
    a: f32,
    b: f32,
}

impl PlattScale {
    fn probability(&self, score: f32) -> f32 {
        sigmoid(self.a * score + self.b)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearSvm {
    dim: usize,
    /// One row per class, `dim + 1` values with the bias last.
    weights: Vec<Vec<f32>>,
    platt: Vec<PlattScale>,
}

impl LinearSvm {
    /// `labels[i]` is the class index of `features[i]`; every index must be
    /// below `n_classes`.
    pub fn fit(features: &[Vec<f32>], labels: &[usize], n_classes: usize, params: SvmParams) -> Result<Self> {
        if features.is_empty() || features.len() != labels.len() {
            return Err(RosterError::Model(format!(
                "Training set has {} features and {} labels", features.len(), labels.len()
            )));
        }
        if n_classes < 2 {
            return Err(RosterError::InsufficientClasses { found: n_classes });
        }
        if let Some(bad) = labels.iter().find(|&&l| l >= n_classes) {
            return Err(RosterError::Model(format!("Label index {} out of range", bad)));
        }

        let dim = features[0].len();
        if dim == 0 || features.iter().any(|f| f.len() != dim) {
            return Err(RosterError::Model("Embeddings must share one non-zero dimension".into()));
        }

        let x = augmented_matrix(features, dim);
        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut weights = Vec::with_capacity(n_classes);
        let mut platt = Vec::with_capacity(n_classes);

        for class in 0..n_classes {
            let targets: Vec<f32> = labels.iter().map(|&l| if l == class { 1.0 } else { -1.0 }).collect();
            let w = pegasos(&x, &targets, params, &mut rng);
            let scores: Vec<f32> = x.rows().into_iter().map(|row| row.dot(&w)).collect();
            platt.push(fit_platt(&scores, &targets));
            weights.push(w.to_vec());
        }

        Ok(Self { dim, weights, platt })
    }

    pub fn n_classes(&self) -> usize {
        self.weights.len()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Raw per-class margins.
    pub fn decision_function(&self, embedding: &[f32]) -> Result<Vec<f32>> {
        if embedding.len() != self.dim {
            return Err(RosterError::Model(format!(
                "Embedding has dimension {}, model expects {}", embedding.len(), self.dim
            )));
        }

        Ok(self
            .weights
            .iter()
            .map(|w| {
                let (coef, bias) = w.split_at(self.dim);
                coef.iter().zip(embedding).map(|(a, b)| a * b).sum::<f32>() + bias[0]
            })
            .collect())
    }

    pub fn predict_proba(&self, embedding: &[f32]) -> Result<Vec<f32>> {
        let scores = self.decision_function(embedding)?;
        let raw: Vec<f32> = scores
            .iter()
            .zip(&self.platt)
            .map(|(&s, scale)| scale.probability(s))
            .collect();

        let total: f32 = raw.iter().sum();
        if total <= f32::EPSILON {
            let uniform = 1.0 / raw.len() as f32;
            return Ok(vec![uniform; raw.len()]);
        }
        Ok(raw.into_iter().map(|p| p / total).collect())
    }

    /// Best class index and its probability.
    pub fn predict(&self, embedding: &[f32]) -> Result<(usize, f32)> {
        let probabilities = self.predict_proba(embedding)?;
        let best = probabilities
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .ok_or_else(|| RosterError::Model("Classifier has no classes".into()))?;
        Ok(best)
    }
}

fn augmented_matrix(features: &[Vec<f32>], dim: usize) -> Array2<f32> {
    let mut x = Array2::<f32>::ones((features.len(), dim + 1));
    for (i, feature) in features.iter().enumerate() {
        for (j, &value) in feature.iter().enumerate() {
            x[[i, j]] = value;
        }
    }
    x
}

/// Pegasos for `min λ/2 |w|² + mean(hinge)`, with `λ = 1 / (C n)`.
fn pegasos(x: &Array2<f32>, targets: &[f32], params: SvmParams, rng: &mut StdRng) -> Array1<f32> {
    let n = x.nrows();
    let lambda = 1.0 / (params.c * n as f32);
    let radius = 1.0 / lambda.sqrt();
    let mut w = Array1::<f32>::zeros(x.ncols());
    let mut order: Vec<usize> = (0..n).collect();
    let mut t = 0usize;

    for _ in 0..params.epochs {
        order.shuffle(rng);
        for &i in &order {
            t += 1;
            let eta = 1.0 / (lambda * t as f32);
            let row: ArrayView1<f32> = x.row(i);
            let margin = targets[i] * row.dot(&w);

            w *= 1.0 - eta * lambda;
            if margin < 1.0 {
                w.scaled_add(eta * targets[i], &row);
            }

            let norm = w.dot(&w).sqrt();
            if norm > radius {
                w *= radius / norm;
            }
        }
    }

    w
}

/// Platt scaling with the usual smoothed targets.
fn fit_platt(scores: &[f32], targets: &[f32]) -> PlattScale {
    let positives = targets.iter().filter(|&&t| t > 0.0).count() as f32;
    let negatives = targets.len() as f32 - positives;
    let hi = (positives + 1.0) / (positives + 2.0);
    let lo = 1.0 / (negatives + 2.0);
    let soft: Vec<f32> = targets.iter().map(|&t| if t > 0.0 { hi } else { lo }).collect();

    let mut scale = PlattScale { a: 1.0, b: 0.0 };
    let n = scores.len() as f32;
    let learning_rate = 0.5;

    for _ in 0..500 {
        let (mut grad_a, mut grad_b) = (0.0f32, 0.0f32);
        for (&s, &y) in scores.iter().zip(&soft) {
            let diff = scale.probability(s) - y;
            grad_a += diff * s;
            grad_b += diff;
        }
        scale.a -= learning_rate * grad_a / n;
        scale.b -= learning_rate * grad_b / n;
    }

    scale
}

fn sigmoid(z: f32) -> f32 {
    1.0 / (1.0 + (-z).exp())
}
