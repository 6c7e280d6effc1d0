//! Gradient-boosted regression trees
//!
//! Second-order boosting on squared error with L2 leaf regularisation,
//! per-round row subsampling, per-tree column subsampling and early stopping
//! against an evaluation set. Prediction uses the trees up to the best
//! evaluation round.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::MlError;

/// Boosting hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    /// Maximum number of boosting rounds
    pub n_estimators: usize,
    pub max_depth: usize,
    /// Shrinkage applied to every tree
    pub learning_rate: f64,
    /// Fraction of rows sampled per round
    pub subsample: f64,
    /// Fraction of columns sampled per tree
    pub colsample_bytree: f64,
    /// L2 regularisation on leaf weights
    pub lambda: f64,
    /// Minimum number of rows on each side of a split
    pub min_child_weight: f64,
    /// Stop after this many rounds without improvement on the evaluation set
    pub early_stopping_rounds: Option<usize>,
    pub seed: u64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 10,
            learning_rate: 0.1,
            subsample: 0.8,
            colsample_bytree: 0.8,
            lambda: 1.0,
            min_child_weight: 1.0,
            early_stopping_rounds: Some(10),
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf {
        weight: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        gain: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn predict(&self, row: &[f64]) -> f64 {
        match self {
            Node::Leaf { weight } => *weight,
            Node::Split {
                feature,
                threshold,
                left,
                right,
                ..
            } => {
                if row[*feature] < *threshold {
                    left.predict(row)
                } else {
                    right.predict(row)
                }
            }
        }
    }

    fn accumulate_gain(&self, gain: &mut [f64], splits: &mut [usize]) {
        if let Node::Split {
            feature,
            gain: g,
            left,
            right,
            ..
        } = self
        {
            gain[*feature] += g;
            splits[*feature] += 1;
            left.accumulate_gain(gain, splits);
            right.accumulate_gain(gain, splits);
        }
    }
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

/// Builds one tree on the gradients of the current round
struct TreeBuilder<'a> {
    x: &'a [Vec<f64>],
    gradients: &'a [f64],
    features: &'a [usize],
    params: &'a BoostingParams,
}

impl TreeBuilder<'_> {
    fn build(&self, rows: &[usize], depth: usize) -> Node {
        let g_sum: f64 = rows.iter().map(|&i| self.gradients[i]).sum();
        let h_sum = rows.len() as f64;
        let leaf = Node::Leaf {
            weight: -g_sum / (h_sum + self.params.lambda),
        };

        if depth >= self.params.max_depth || h_sum < 2.0 * self.params.min_child_weight {
            return leaf;
        }

        match self.best_split(rows, g_sum, h_sum) {
            Some(split) => Node::Split {
                feature: split.feature,
                threshold: split.threshold,
                gain: split.gain,
                left: Box::new(self.build(&split.left, depth + 1)),
                right: Box::new(self.build(&split.right, depth + 1)),
            },
            None => leaf,
        }
    }

    fn best_split(&self, rows: &[usize], g_sum: f64, h_sum: f64) -> Option<SplitCandidate> {
        let lambda = self.params.lambda;
        let parent_score = g_sum * g_sum / (h_sum + lambda);
        let mut best: Option<(usize, f64, f64)> = None;

        let mut sorted = rows.to_vec();
        for &feature in self.features {
            sorted.sort_by(|&a, &b| self.x[a][feature].total_cmp(&self.x[b][feature]));

            let mut g_left = 0.0;
            for pos in 0..sorted.len().saturating_sub(1) {
                g_left += self.gradients[sorted[pos]];
                let current = self.x[sorted[pos]][feature];
                let next = self.x[sorted[pos + 1]][feature];
                if current == next {
                    continue;
                }

                let h_left = (pos + 1) as f64;
                let h_right = h_sum - h_left;
                if h_left < self.params.min_child_weight || h_right < self.params.min_child_weight {
                    continue;
                }

                let g_right = g_sum - g_left;
                let gain = 0.5
                    * (g_left * g_left / (h_left + lambda) + g_right * g_right / (h_right + lambda)
                        - parent_score);
                if gain > best.map_or(0.0, |(_, _, g)| g) {
                    best = Some((feature, (current + next) / 2.0, gain));
                }
            }
        }

        let (feature, threshold, gain) = best?;
        let (left, right): (Vec<usize>, Vec<usize>) =
            rows.iter().partition(|&&i| self.x[i][feature] < threshold);
        Some(SplitCandidate {
            feature,
            threshold,
            gain,
            left,
            right,
        })
    }
}

/// Fitted boosted ensemble
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    pub params: BoostingParams,
    pub n_features: usize,
    base_score: f64,
    trees: Vec<Node>,
    /// Zero-based round with the best evaluation loss
    best_iteration: usize,
}

impl GradientBoostedTrees {
    /// Fit on `x`/`y`; with `eval` set, early stopping watches its RMSE
    pub fn fit(
        x: &[Vec<f64>],
        y: &[f64],
        eval: Option<(&[Vec<f64>], &[f64])>,
        params: BoostingParams,
    ) -> Result<Self, MlError> {
        if x.is_empty() || y.is_empty() {
            return Err(MlError::InvalidData("Cannot train on empty dataset".to_string()));
        }
        if x.len() != y.len() {
            return Err(MlError::InvalidData(format!(
                "Feature and target count mismatch: {} features, {} targets",
                x.len(),
                y.len()
            )));
        }
        let n_features = x[0].len();
        if n_features == 0 || x.iter().any(|r| r.len() != n_features) {
            return Err(MlError::InvalidData(
                "All feature vectors must have the same non-zero length".to_string(),
            ));
        }

        let mut rng = StdRng::seed_from_u64(params.seed);
        let base_score = y.iter().sum::<f64>() / y.len() as f64;
        let mut train_pred = vec![base_score; x.len()];
        let mut eval_pred = eval.map(|(ex, _)| vec![base_score; ex.len()]);

        let n_cols = ((params.colsample_bytree * n_features as f64).ceil() as usize).clamp(1, n_features);
        let mut all_features: Vec<usize> = (0..n_features).collect();

        let mut trees = Vec::with_capacity(params.n_estimators);
        let mut best_iteration = 0;
        let mut best_loss = f64::INFINITY;

        for round in 0..params.n_estimators {
            let gradients: Vec<f64> = train_pred.iter().zip(y).map(|(p, t)| p - t).collect();

            let mut rows: Vec<usize> = (0..x.len())
                .filter(|_| rng.gen::<f64>() < params.subsample)
                .collect();
            if rows.is_empty() {
                rows = (0..x.len()).collect();
            }

            all_features.shuffle(&mut rng);
            let mut features = all_features[..n_cols].to_vec();
            features.sort_unstable();

            let builder = TreeBuilder {
                x,
                gradients: &gradients,
                features: &features,
                params: &params,
            };
            let tree = builder.build(&rows, 0);

            for (pred, row) in train_pred.iter_mut().zip(x) {
                *pred += params.learning_rate * tree.predict(row);
            }
            trees.push(tree);

            let (Some((ex, ey)), Some(preds)) = (eval, eval_pred.as_mut()) else {
                best_iteration = round;
                continue;
            };
            let last = &trees[trees.len() - 1];
            for (pred, row) in preds.iter_mut().zip(ex) {
                *pred += params.learning_rate * last.predict(row);
            }
            let loss = rmse(preds, ey);
            if loss < best_loss {
                best_loss = loss;
                best_iteration = round;
            } else if params
                .early_stopping_rounds
                .is_some_and(|patience| round - best_iteration >= patience)
            {
                debug!(round, best_iteration, "early stopping");
                break;
            }
        }

        trees.truncate(best_iteration + 1);

        Ok(Self {
            params,
            n_features,
            base_score,
            trees,
            best_iteration,
        })
    }

    pub fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>, MlError> {
        x.iter()
            .map(|row| {
                if row.len() != self.n_features {
                    return Err(MlError::PredictionFailure(format!(
                        "Feature count mismatch: expected {}, got {}",
                        self.n_features,
                        row.len()
                    )));
                }
                Ok(self.base_score
                    + self
                        .trees
                        .iter()
                        .map(|t| self.params.learning_rate * t.predict(row))
                        .sum::<f64>())
            })
            .collect()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn best_iteration(&self) -> usize {
        self.best_iteration
    }

    /// Average split gain per feature, normalised to sum to 1
    pub fn feature_importances(&self) -> Vec<f64> {
        let mut gain = vec![0.0; self.n_features];
        let mut splits = vec![0usize; self.n_features];
        for tree in &self.trees {
            tree.accumulate_gain(&mut gain, &mut splits);
        }

        let mut importances: Vec<f64> = gain
            .iter()
            .zip(&splits)
            .map(|(&g, &n)| if n > 0 { g / n as f64 } else { 0.0 })
            .collect();
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for v in &mut importances {
                *v /= total;
            }
        }
        importances
    }
}

fn rmse(pred: &[f64], target: &[f64]) -> f64 {
    let mse = pred
        .iter()
        .zip(target)
        .map(|(p, t)| (p - t).powi(2))
        .sum::<f64>()
        / pred.len().max(1) as f64;
    mse.sqrt()
}
