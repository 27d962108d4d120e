/// Embedding ranker
///
/// Scores `sigmoid(u·v + b_item)` with user and item embeddings learned by
/// mini-batch gradient descent on binary cross-entropy. Implicit feedback only
/// carries positives, so each positive is paired with `negatives_per_positive`
/// items the user never touched, drawn fresh every epoch. Setting it to 0
/// trains on positives alone, which drives every score towards 1.
use std::collections::{HashMap, HashSet};

use ndarray::{Array1, Array2};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, AppResult},
    services::aggregator::Dataset,
};

/// Rejection-sampling attempts before giving up on one negative
const NEGATIVE_SAMPLE_ATTEMPTS: usize = 32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding width (d)
    pub dimensions: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
    pub negatives_per_positive: usize,
    /// Embeddings start uniform in (-init_scale, init_scale)
    pub init_scale: f32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimensions: 64,
            epochs: 10,
            batch_size: 64,
            learning_rate: 0.5,
            negatives_per_positive: 4,
            init_scale: 0.05,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRanker {
    user_embeddings: Array2<f32>,
    item_embeddings: Array2<f32>,
    item_bias: Array1<f32>,
}

/// One training example: (user, item, label)
type Example = (usize, usize, f32);

impl EmbeddingRanker {
    pub fn fit(dataset: &Dataset, config: &EmbeddingConfig, seed: u64) -> AppResult<Self> {
        if config.dimensions == 0 || config.batch_size == 0 {
            return Err(AppError::Training(
                "dimensions and batch_size must be positive".to_string(),
            ));
        }
        if config.init_scale <= 0.0 {
            return Err(AppError::Training("init_scale must be positive".to_string()));
        }

        let d = config.dimensions;
        let scale = config.init_scale;
        let num_items = dataset.index.num_items();
        let mut rng = StdRng::seed_from_u64(seed);

        let mut model = Self {
            user_embeddings: Array2::from_shape_fn((dataset.index.num_users(), d), |_| {
                rng.gen_range(-scale..scale)
            }),
            item_embeddings: Array2::from_shape_fn((num_items, d), |_| {
                rng.gen_range(-scale..scale)
            }),
            item_bias: Array1::zeros(num_items),
        };

        let positives: Vec<(usize, usize)> =
            dataset.entries.iter().map(|e| (e.user, e.item)).collect();
        let seen: Vec<HashSet<usize>> = dataset
            .items_by_user()
            .into_iter()
            .map(|items| items.into_iter().collect())
            .collect();

        for epoch in 0..config.epochs {
            let mut examples: Vec<Example> =
                Vec::with_capacity(positives.len() * (1 + config.negatives_per_positive));

            for &(user, item) in &positives {
                examples.push((user, item, 1.0));
                for _ in 0..config.negatives_per_positive {
                    if let Some(negative) = sample_negative(&mut rng, num_items, &seen[user]) {
                        examples.push((user, negative, 0.0));
                    }
                }
            }
            examples.shuffle(&mut rng);

            let mut loss = 0.0f64;
            for batch in examples.chunks(config.batch_size) {
                loss += model.apply_batch(batch, config.learning_rate);
            }

            tracing::debug!(
                epoch,
                examples = examples.len(),
                loss = if examples.is_empty() { 0.0 } else { loss / examples.len() as f64 },
                "Embedding epoch completed"
            );
        }

        Ok(model)
    }

    /// One gradient step on the mean loss of a batch; returns the summed loss
    fn apply_batch(&mut self, batch: &[Example], learning_rate: f32) -> f64 {
        let d = self.user_embeddings.ncols();
        let mut user_grads: HashMap<usize, Array1<f32>> = HashMap::new();
        let mut item_grads: HashMap<usize, Array1<f32>> = HashMap::new();
        let mut bias_grads: HashMap<usize, f32> = HashMap::new();
        let mut loss = 0.0f64;

        for &(user, item, label) in batch {
            let p = self.probability(user, item);
            loss += binary_cross_entropy(p, label);

            // dL/dlogit for sigmoid + BCE
            let g = p - label;
            user_grads
                .entry(user)
                .or_insert_with(|| Array1::zeros(d))
                .scaled_add(g, &self.item_embeddings.row(item));
            item_grads
                .entry(item)
                .or_insert_with(|| Array1::zeros(d))
                .scaled_add(g, &self.user_embeddings.row(user));
            *bias_grads.entry(item).or_insert(0.0) += g;
        }

        let step = learning_rate / batch.len() as f32;
        for (user, grad) in user_grads {
            self.user_embeddings.row_mut(user).scaled_add(-step, &grad);
        }
        for (item, grad) in item_grads {
            self.item_embeddings.row_mut(item).scaled_add(-step, &grad);
        }
        for (item, grad) in bias_grads {
            self.item_bias[item] -= step * grad;
        }

        loss
    }

    fn probability(&self, user: usize, item: usize) -> f32 {
        let logit = self
            .user_embeddings
            .row(user)
            .dot(&self.item_embeddings.row(item))
            + self.item_bias[item];
        sigmoid(logit)
    }

    pub fn score(&self, user: usize, item: usize) -> f32 {
        self.probability(user, item)
    }

    /// (users, items) covered by the embedding tables
    pub fn shape(&self) -> (usize, usize) {
        if self.user_embeddings.ncols() != self.item_embeddings.ncols()
            || self.item_bias.len() != self.item_embeddings.nrows()
        {
            return (usize::MAX, usize::MAX);
        }
        (self.user_embeddings.nrows(), self.item_embeddings.nrows())
    }
}

/// Uniform item the user has not interacted with, if one can be found
fn sample_negative(rng: &mut StdRng, num_items: usize, seen: &HashSet<usize>) -> Option<usize> {
    if seen.len() >= num_items {
        return None;
    }
    (0..NEGATIVE_SAMPLE_ATTEMPTS)
        .map(|_| rng.gen_range(0..num_items))
        .find(|candidate| !seen.contains(candidate))
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn binary_cross_entropy(p: f32, label: f32) -> f64 {
    let p = f64::from(p).clamp(1e-7, 1.0 - 1e-7);
    let y = f64::from(label);
    -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
}
