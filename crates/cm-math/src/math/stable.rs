//! Numerically stable scalar primitives.
//!
//! All functions propagate NaN rather than panicking.

/// Logistic sigmoid, stable for large |x|.
pub fn sigmoid(x: f64) -> f64 {
    if x.is_nan() {
        return f64::NAN;
    }
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// `ln(1 + e^x)` without overflow.
pub fn log1p_exp(x: f64) -> f64 {
    if x.is_nan() {
        return f64::NAN;
    }
    if x > 35.0 {
        x
    } else if x < -35.0 {
        x.exp()
    } else {
        x.exp().ln_1p()
    }
}

/// `ln(Σ e^x_i)` with the max-shift trick.
pub fn log_sum_exp(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NEG_INFINITY;
    }
    if values.iter().any(|v| v.is_nan()) {
        return f64::NAN;
    }
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    if max == f64::INFINITY {
        return f64::INFINITY;
    }
    let sum: f64 = values.iter().map(|v| (v - max).exp()).sum();
    max + sum.ln()
}

/// Binary cross-entropy of a logit `z` against a 0/1 target.
///
/// Computed as `log1p_exp(z) - y*z`, which never takes the log of 0.
pub fn log_loss_logit(z: f64, y: f64) -> f64 {
    log1p_exp(z) - y * z
}

/// Clamp to `[0, 1]`, mapping NaN to 0.
pub fn clamp_unit(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn sigmoid_midpoint_and_tails() {
        assert!(approx_eq(sigmoid(0.0), 0.5, 1e-15));
        assert!(sigmoid(800.0) <= 1.0);
        assert!(sigmoid(-800.0) >= 0.0);
        assert!(sigmoid(-800.0).is_finite());
    }

    #[test]
    fn log1p_exp_matches_naive_in_safe_range() {
        for x in [-5.0, -1.0, 0.0, 1.0, 5.0] {
            let naive = (1.0 + f64::exp(x)).ln();
            assert!(approx_eq(log1p_exp(x), naive, 1e-12));
        }
        assert!(log1p_exp(1000.0).is_finite());
    }

    #[test]
    fn log_sum_exp_extremes() {
        assert!(approx_eq(log_sum_exp(&[0.0, 0.0]), 2f64.ln(), 1e-12));
        assert!(approx_eq(log_sum_exp(&[1000.0, 1000.0]), 1000.0 + 2f64.ln(), 1e-9));
        assert_eq!(log_sum_exp(&[]), f64::NEG_INFINITY);
        assert!(log_sum_exp(&[f64::NAN, 1.0]).is_nan());
    }

    #[test]
    fn log_loss_is_small_when_confident_and_right() {
        assert!(log_loss_logit(20.0, 1.0) < 1e-8);
        assert!(log_loss_logit(-20.0, 0.0) < 1e-8);
        assert!(log_loss_logit(20.0, 0.0) > 19.0);
    }

    #[test]
    fn clamp_unit_handles_nan() {
        assert_eq!(clamp_unit(f64::NAN), 0.0);
        assert_eq!(clamp_unit(1.5), 1.0);
        assert_eq!(clamp_unit(-0.2), 0.0);
    }

    proptest! {
        #[test]
        fn sigmoid_in_unit_interval(x in -1e6f64..1e6) {
            let s = sigmoid(x);
            prop_assert!((0.0..=1.0).contains(&s));
        }

        #[test]
        fn sigmoid_monotone(a in -50f64..50.0, d in 0.001f64..10.0) {
            prop_assert!(sigmoid(a + d) >= sigmoid(a));
        }
    }
}
