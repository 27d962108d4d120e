/// Latent-factor model trained with alternating least squares
///
/// The binary interaction matrix R (1 where a user watched or liked an item,
/// 0 elsewhere) is approximated by `P Qᵀ` minimising
/// `Σ (r_ui - p_u·q_i)² + λ(‖P‖² + ‖Q‖²)`. Because R is binary and every cell
/// is weighted equally, each half-step is a single ridge solve shared by all
/// rows: `p_u = (QᵀQ + λI)⁻¹ Σ_{i ∈ observed(u)} q_i`.
use ndarray::{Array1, Array2};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, AppResult},
    services::aggregator::Dataset,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatentFactorConfig {
    /// Number of latent factors (k)
    pub factors: usize,
    /// Alternating passes over users and items
    pub iterations: usize,
    /// Ridge penalty (λ)
    pub regularization: f32,
    /// Item factors start uniform in (-init_scale, init_scale)
    pub init_scale: f32,
}

impl Default for LatentFactorConfig {
    fn default() -> Self {
        Self {
            factors: 50,
            iterations: 20,
            regularization: 0.1,
            init_scale: 0.1,
        }
    }
}

/// User and item factor matrices, `users × k` and `items × k`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatentFactors {
    user_factors: Array2<f32>,
    item_factors: Array2<f32>,
}

impl LatentFactors {
    pub fn fit(dataset: &Dataset, config: &LatentFactorConfig, seed: u64) -> AppResult<Self> {
        if config.factors == 0 {
            return Err(AppError::Training("factors must be positive".to_string()));
        }
        if config.regularization <= 0.0 || config.init_scale <= 0.0 {
            return Err(AppError::Training(
                "regularization and init_scale must be positive".to_string(),
            ));
        }

        let k = config.factors;
        let scale = config.init_scale;
        let lambda = f64::from(config.regularization);
        let mut rng = StdRng::seed_from_u64(seed);

        let mut item_factors =
            Array2::from_shape_fn((dataset.index.num_items(), k), |_| rng.gen_range(-scale..scale));
        let mut user_factors = Array2::<f32>::zeros((dataset.index.num_users(), k));

        let items_by_user = dataset.items_by_user();
        let users_by_item = dataset.users_by_item();

        for iteration in 0..config.iterations {
            user_factors = solve_side(&item_factors, &items_by_user, lambda)?;
            item_factors = solve_side(&user_factors, &users_by_item, lambda)?;

            if tracing::enabled!(tracing::Level::DEBUG) {
                let rmse = observed_rmse(&user_factors, &item_factors, dataset);
                tracing::debug!(iteration, observed_rmse = rmse, "ALS pass completed");
            }
        }

        Ok(Self {
            user_factors,
            item_factors,
        })
    }

    /// Dot product of the factor rows, clipped to the rating scale
    pub fn score(&self, user: usize, item: usize) -> f32 {
        self.user_factors
            .row(user)
            .dot(&self.item_factors.row(item))
            .clamp(0.0, 1.0)
    }

    /// (users, items) covered by the factor tables
    pub fn shape(&self) -> (usize, usize) {
        if self.user_factors.ncols() != self.item_factors.ncols() {
            // Widths disagree, report a shape no index can match
            return (usize::MAX, usize::MAX);
        }
        (self.user_factors.nrows(), self.item_factors.nrows())
    }
}

/// Root mean squared error over observed entries, before clipping
fn observed_rmse(user_factors: &Array2<f32>, item_factors: &Array2<f32>, dataset: &Dataset) -> f64 {
    if dataset.entries.is_empty() {
        return 0.0;
    }
    let total: f64 = dataset
        .entries
        .iter()
        .map(|e| {
            let predicted = user_factors.row(e.user).dot(&item_factors.row(e.item));
            f64::from(e.rating - predicted).powi(2)
        })
        .sum();
    (total / dataset.entries.len() as f64).sqrt()
}

/// Solves every row of one side against the fixed other side
fn solve_side(
    fixed: &Array2<f32>,
    observed: &[Vec<usize>],
    regularization: f64,
) -> AppResult<Array2<f32>> {
    let k = fixed.ncols();
    let fixed = fixed.mapv(f64::from);

    let mut gram = fixed.t().dot(&fixed);
    for d in 0..k {
        gram[[d, d]] += regularization;
    }
    let lower = cholesky(&gram)?;

    let mut solved = Array2::<f32>::zeros((observed.len(), k));
    for (row, positions) in observed.iter().enumerate() {
        if positions.is_empty() {
            continue;
        }
        let mut rhs = Array1::<f64>::zeros(k);
        for &position in positions {
            rhs.scaled_add(1.0, &fixed.row(position));
        }
        let x = cholesky_solve(&lower, &rhs);
        solved.row_mut(row).assign(&x.mapv(|v| v as f32));
    }

    Ok(solved)
}

/// Lower-triangular L with L Lᵀ = a
fn cholesky(a: &Array2<f64>) -> AppResult<Array2<f64>> {
    let n = a.nrows();
    let mut lower = Array2::<f64>::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[[i, j]];
            for p in 0..j {
                sum -= lower[[i, p]] * lower[[j, p]];
            }
            if i == j {
                if sum <= 0.0 {
                    return Err(AppError::Training(
                        "normal equations are not positive definite".to_string(),
                    ));
                }
                lower[[i, j]] = sum.sqrt();
            } else {
                lower[[i, j]] = sum / lower[[j, j]];
            }
        }
    }

    Ok(lower)
}

/// Solves L Lᵀ x = b by forward then backward substitution
fn cholesky_solve(lower: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = b.len();

    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = b[i];
        for p in 0..i {
            sum -= lower[[i, p]] * y[p];
        }
        y[i] = sum / lower[[i, i]];
    }

    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = y[i];
        for p in (i + 1)..n {
            sum -= lower[[p, i]] * x[p];
        }
        x[i] = sum / lower[[i, i]];
    }

    x
}
