//! L2-regularized logistic regression.
//!
//! Training is full-batch gradient descent from a zero start, so a fit is a
//! pure function of its inputs: the same rows and options always produce
//! bit-identical weights.

use serde::{Deserialize, Serialize};

use super::stable::{log_loss_logit, sigmoid};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainOptions {
    pub epochs: usize,
    pub learning_rate: f64,
    pub l2: f64,
}

impl Default for TrainOptions {
    fn default() -> Self {
        TrainOptions {
            epochs: 500,
            learning_rate: 0.1,
            l2: 1e-3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    pub weights: Vec<f64>,
    pub bias: f64,
}

impl LogisticModel {
    /// Fit on dense, already-scaled rows with 0/1 targets.
    ///
    /// Returns `None` when there are no rows, widths disagree, or the
    /// lengths of `rows` and `targets` differ.
    pub fn fit(rows: &[Vec<f64>], targets: &[f64], opts: TrainOptions) -> Option<Self> {
        if rows.is_empty() || rows.len() != targets.len() {
            return None;
        }
        let width = rows[0].len();
        if rows.iter().any(|r| r.len() != width) {
            return None;
        }
        let n = rows.len() as f64;
        let mut weights = vec![0.0; width];
        let mut bias = 0.0;
        let mut grad = vec![0.0; width];

        for _ in 0..opts.epochs {
            grad.iter_mut().for_each(|g| *g = 0.0);
            let mut grad_bias = 0.0;
            for (row, y) in rows.iter().zip(targets) {
                let err = sigmoid(dot(&weights, row) + bias) - y;
                for (g, x) in grad.iter_mut().zip(row) {
                    *g += err * x;
                }
                grad_bias += err;
            }
            for (w, g) in weights.iter_mut().zip(&grad) {
                *w -= opts.learning_rate * (g / n + opts.l2 * *w);
            }
            bias -= opts.learning_rate * grad_bias / n;
        }

        Some(LogisticModel { weights, bias })
    }

    pub fn width(&self) -> usize {
        self.weights.len()
    }

    pub fn logit(&self, row: &[f64]) -> f64 {
        dot(&self.weights, row) + self.bias
    }

    /// Probability of the positive class, in `[0, 1]`.
    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        sigmoid(self.logit(row))
    }

    /// Mean cross-entropy over a labeled set.
    pub fn mean_log_loss(&self, rows: &[Vec<f64>], targets: &[f64]) -> Option<f64> {
        if rows.is_empty() || rows.len() != targets.len() {
            return None;
        }
        let total: f64 = rows
            .iter()
            .zip(targets)
            .map(|(r, y)| log_loss_logit(self.logit(r), *y))
            .sum();
        Some(total / rows.len() as f64)
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn separable() -> (Vec<Vec<f64>>, Vec<f64>) {
        let rows = vec![
            vec![-2.0, 0.1],
            vec![-1.5, -0.2],
            vec![-1.0, 0.0],
            vec![1.0, 0.1],
            vec![1.5, -0.1],
            vec![2.0, 0.2],
        ];
        let targets = vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        (rows, targets)
    }

    #[test]
    fn learns_separable_direction() {
        let (rows, targets) = separable();
        let model = LogisticModel::fit(&rows, &targets, TrainOptions::default()).unwrap();
        assert!(model.weights[0] > 0.0);
        assert!(model.predict_proba(&[2.0, 0.0]) > 0.5);
        assert!(model.predict_proba(&[-2.0, 0.0]) < 0.5);
    }

    #[test]
    fn training_reduces_loss() {
        let (rows, targets) = separable();
        let zero = LogisticModel {
            weights: vec![0.0, 0.0],
            bias: 0.0,
        };
        let model = LogisticModel::fit(&rows, &targets, TrainOptions::default()).unwrap();
        assert!(
            model.mean_log_loss(&rows, &targets).unwrap()
                < zero.mean_log_loss(&rows, &targets).unwrap()
        );
    }

    #[test]
    fn fit_is_deterministic() {
        let (rows, targets) = separable();
        let a = LogisticModel::fit(&rows, &targets, TrainOptions::default()).unwrap();
        let b = LogisticModel::fit(&rows, &targets, TrainOptions::default()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn ragged_rows_rejected() {
        let rows = vec![vec![1.0], vec![1.0, 2.0]];
        assert!(LogisticModel::fit(&rows, &[0.0, 1.0], TrainOptions::default()).is_none());
        assert!(LogisticModel::fit(&[], &[], TrainOptions::default()).is_none());
    }

    proptest! {
        #[test]
        fn predictions_in_unit_interval(x in prop::collection::vec(-1e3f64..1e3, 2)) {
            let (rows, targets) = separable();
            let model = LogisticModel::fit(&rows, &targets, TrainOptions::default()).unwrap();
            let p = model.predict_proba(&x);
            prop_assert!((0.0..=1.0).contains(&p));
        }
    }
}
