// Copyright 2022-2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Fixed polynomial predictors of order 0 to 4.

use crate::constant::fixed::MAX_ORDER;

/// Predictor coefficients of each order, most recent sample first.
const COEFS: [&[i64]; MAX_ORDER + 1] = [&[], &[1], &[2, -1], &[3, -3, 1], &[4, -6, 4, -1]];

/// Result of [`guess_order`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrderGuess {
    /// Order with the smallest sum of absolute residuals.
    pub order: usize,
    /// Expected bits per residual sample for each order.
    pub residual_bits_per_sample: [f32; MAX_ORDER + 1],
}

#[inline]
fn predict(order: usize, history: &[i64], t: usize) -> i64 {
    COEFS[order]
        .iter()
        .enumerate()
        .map(|(k, c)| c * history[t - 1 - k])
        .sum()
}

/// Chooses the fixed predictor order from the sums of absolute residuals.
///
/// The sums are taken over samples from index 4 so that every order sees the
/// same range. Ties are resolved to the lower order. Orders whose residual
/// would not fit in 32 bits are never chosen.
///
/// # Examples
///
/// ```
/// # use flacodec::fixed::*;
/// let ramp: Vec<i32> = (0..64).map(|t| 3 * t - 20).collect();
/// assert_eq!(guess_order(&ramp).order, 2);
/// let constant = vec![7i32; 64];
/// assert_eq!(guess_order(&constant).order, 1);
/// ```
pub fn guess_order(signal: &[i32]) -> OrderGuess {
    let mut totals = [0u64; MAX_ORDER + 1];
    let mut valid = [true; MAX_ORDER + 1];
    let start = MAX_ORDER.min(signal.len());
    for t in start..signal.len() {
        let x0 = i64::from(signal[t]);
        let x1 = i64::from(signal[t - 1]);
        let x2 = i64::from(signal[t - 2]);
        let x3 = i64::from(signal[t - 3]);
        let x4 = i64::from(signal[t - 4]);
        let errors = [
            x0,
            x0 - x1,
            x0 - 2 * x1 + x2,
            x0 - 3 * x1 + 3 * x2 - x3,
            x0 - 4 * x1 + 6 * x2 - 4 * x3 + x4,
        ];
        for (order, e) in errors.iter().enumerate() {
            let a = e.unsigned_abs();
            totals[order] = totals[order].saturating_add(a);
            if a > i32::MAX as u64 {
                valid[order] = false;
            }
        }
    }

    let len = signal.len().saturating_sub(start);
    let mut residual_bits_per_sample = [0.0f32; MAX_ORDER + 1];
    let mut order = 0;
    let mut smallest = u64::MAX;
    for o in 0..=MAX_ORDER {
        residual_bits_per_sample[o] = if totals[o] > 0 && len > 0 {
            (std::f64::consts::LN_2 * totals[o] as f64 / len as f64).log2() as f32
        } else {
            0.0
        };
        if valid[o] && totals[o] < smallest {
            smallest = totals[o];
            order = o;
        }
    }
    OrderGuess {
        order,
        residual_bits_per_sample,
    }
}

/// Computes the residual of the fixed predictor of `order`.
///
/// `dest` receives `signal.len() - order` values. Returns `false` if a
/// residual value does not fit in `i32`.
pub fn compute_residual(signal: &[i32], order: usize, dest: &mut Vec<i32>) -> bool {
    dest.clear();
    if order > MAX_ORDER || signal.len() < order {
        return false;
    }
    let coefs = COEFS[order];
    for t in order..signal.len() {
        let pred: i64 = coefs
            .iter()
            .enumerate()
            .map(|(k, c)| c * i64::from(signal[t - 1 - k]))
            .sum();
        let Ok(e) = i32::try_from(i64::from(signal[t]) - pred) else {
            return false;
        };
        dest.push(e);
    }
    true
}

/// Restores the signal in place.
///
/// `dest[..order]` must already contain the warm-up samples, and
/// `residual.len()` must equal `dest.len() - order`.
pub fn restore_signal(order: usize, residual: &[i32], dest: &mut [i64]) {
    debug_assert!(order <= MAX_ORDER);
    debug_assert_eq!(residual.len() + order, dest.len());
    for (i, r) in residual.iter().enumerate() {
        let t = i + order;
        dest[t] = predict(order, dest, t).wrapping_add(i64::from(*r));
    }
}

#[cfg(test)]
#[allow(clippy::pedantic, clippy::nursery, clippy::needless_range_loop)]
mod tests {
    use super::*;
    use crate::test_helper;

    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rstest::rstest;

    #[rstest]
    fn residual_and_restore_are_inverse(#[values(0, 1, 2, 3, 4)] order: usize) {
        let mut rng = StdRng::seed_from_u64(order as u64);
        let signal = test_helper::uniform_noise(&mut rng, 300, 1 << 20);
        let mut residual = vec![];
        assert!(compute_residual(&signal, order, &mut residual));
        assert_eq!(residual.len(), signal.len() - order);

        let mut restored: Vec<i64> = vec![0; signal.len()];
        for t in 0..order {
            restored[t] = i64::from(signal[t]);
        }
        restore_signal(order, &residual, &mut restored);
        for t in 0..signal.len() {
            assert_eq!(restored[t], i64::from(signal[t]));
        }
    }

    #[test]
    fn cubic_is_predicted_exactly_by_order_three() {
        let signal: Vec<i32> = (0..100i32).map(|t| t * t * t - 40 * t).collect();
        let mut residual = vec![];
        assert!(compute_residual(&signal, 3, &mut residual));
        let d = residual[3];
        assert!(residual.iter().skip(1).all(|&e| e == d));
        assert!(compute_residual(&signal, 4, &mut residual));
        assert!(residual.iter().all(|&e| e == 0));
    }

    #[test]
    fn overflowing_residual_is_reported() {
        let signal = vec![i32::MAX, i32::MIN, i32::MAX, i32::MIN, i32::MAX];
        let mut residual = vec![];
        assert!(compute_residual(&signal, 0, &mut residual));
        assert!(!compute_residual(&signal, 1, &mut residual));
        let guess = guess_order(&signal);
        assert_eq!(guess.order, 0);
    }

    #[test]
    fn guessed_bits_match_scale() {
        let mut rng = StdRng::seed_from_u64(7);
        let noise = test_helper::uniform_noise(&mut rng, 4096, 1 << 10);
        let guess = guess_order(&noise);
        assert_eq!(guess.order, 0);
        // Mean magnitude 512 for uniform noise of amplitude 1024.
        let expected = (std::f64::consts::LN_2 * 512.0).log2() as f32;
        assert!((guess.residual_bits_per_sample[0] - expected).abs() < 0.1);
        assert!(guess.residual_bits_per_sample[4] > guess.residual_bits_per_sample[0]);

        let short = guess_order(&[1, 2, 3]);
        assert_eq!(short.order, 0);
        assert_eq!(short.residual_bits_per_sample, [0.0; 5]);
    }
}
