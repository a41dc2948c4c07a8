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

//! Algorithms for quantized linear-prediction coding (QLPC).

use std::cell::RefCell;

use num_traits::AsPrimitive;
use num_traits::PrimInt;
use num_traits::WrappingAdd;
use num_traits::WrappingMul;

use super::apodization::get_window;
use super::apodization::Window;
use super::component::QuantizedParameters;
use super::constant::qlpc::MAX_ORDER as MAX_LPC_ORDER;
use super::constant::qlpc::MAX_PRECISION;
use super::constant::qlpc::MAX_SHIFT;
use super::constant::qlpc::MIN_PRECISION;
use super::constant::qlpc::MIN_SHIFT;

/// Computes the auto-correlation of `signal` for lags `0..dest.len()`.
///
/// Lags longer than the signal are set to zero.
pub fn auto_correlation(signal: &[f32], dest: &mut [f64]) {
    for (lag, d) in dest.iter_mut().enumerate() {
        *d = if lag < signal.len() {
            signal[lag..]
                .iter()
                .zip(signal)
                .map(|(&x, &y)| f64::from(x) * f64::from(y))
                .sum()
        } else {
            0.0
        };
    }
}

/// Unquantized predictors of every order up to the analyzed maximum.
#[derive(Clone, Debug, PartialEq)]
pub struct LpcAnalysis {
    coefs: Vec<f64>,
    errors: heapless::Vec<f64, MAX_LPC_ORDER>,
}

impl LpcAnalysis {
    /// Highest order available.
    ///
    /// This can be smaller than the requested order when the prediction error
    /// reaches zero early.
    pub fn max_order(&self) -> usize {
        self.errors.len()
    }

    /// Returns predictor coefficients of `order` (1-based), most recent sample
    /// first.
    pub fn coefs(&self, order: usize) -> &[f64] {
        let row = (order - 1) * MAX_LPC_ORDER;
        &self.coefs[row..row + order]
    }

    /// Returns prediction errors; `errors()[k]` belongs to order `k + 1`.
    pub fn errors(&self) -> &[f64] {
        &self.errors
    }

    /// Picks the order minimizing the estimated size of a subframe.
    pub fn best_order(&self, total_samples: usize, overhead_bits_per_order: usize) -> usize {
        compute_best_order(&self.errors, total_samples, overhead_bits_per_order)
    }
}

/// Runs Levinson-Durbin recursion over `autoc` up to `max_order`.
///
/// `autoc` must have at least `max_order + 1` elements and `autoc[0]` must be
/// non-zero.
pub fn compute_lp_coefficients(autoc: &[f64], max_order: usize) -> LpcAnalysis {
    debug_assert!(max_order > 0 && max_order <= MAX_LPC_ORDER);
    debug_assert!(autoc.len() > max_order);
    debug_assert!(autoc[0] != 0.0);

    let mut lpc = [0.0f64; MAX_LPC_ORDER];
    let mut ret = LpcAnalysis {
        coefs: vec![0.0; MAX_LPC_ORDER * MAX_LPC_ORDER],
        errors: heapless::Vec::new(),
    };
    let mut err = autoc[0];
    for i in 0..max_order {
        let mut r = -autoc[i + 1];
        for j in 0..i {
            r -= lpc[j] * autoc[i - j];
        }
        r /= err;

        lpc[i] = r;
        let half = i >> 1;
        for j in 0..half {
            let tmp = lpc[j];
            lpc[j] += r * lpc[i - 1 - j];
            lpc[i - 1 - j] += r * tmp;
        }
        if i & 1 != 0 {
            lpc[half] += lpc[half] * r;
        }
        err *= 1.0 - r * r;

        let row = i * MAX_LPC_ORDER;
        for j in 0..=i {
            ret.coefs[row + j] = -lpc[j];
        }
        // Capacity is `MAX_LPC_ORDER` and `i < MAX_LPC_ORDER`.
        let _ = ret.errors.push(err);
        if err == 0.0 {
            break;
        }
    }
    ret
}

#[inline]
fn expected_bits_with_scale(error: f64, error_scale: f64) -> f64 {
    if error > 0.0 {
        (0.5 * (error_scale * error).log2()).max(0.0)
    } else if error < 0.0 {
        1e32
    } else {
        0.0
    }
}

/// Estimates bits per residual sample from the prediction error.
pub fn expected_bits_per_residual_sample(error: f64, total_samples: usize) -> f64 {
    debug_assert!(total_samples > 0);
    expected_bits_with_scale(error, 0.5 / total_samples as f64)
}

/// Picks the order (1-based) with the smallest estimated cost.
pub fn compute_best_order(
    errors: &[f64],
    total_samples: usize,
    overhead_bits_per_order: usize,
) -> usize {
    debug_assert!(!errors.is_empty() && total_samples > 0);
    let error_scale = 0.5 / total_samples as f64;
    let mut best_order = 1;
    let mut best_bits = f64::from(u32::MAX);
    for (idx, &e) in errors.iter().enumerate() {
        let order = idx + 1;
        let bits = expected_bits_with_scale(e, error_scale)
            * total_samples.saturating_sub(order) as f64
            + (order * overhead_bits_per_order) as f64;
        if bits < best_bits {
            best_bits = bits;
            best_order = order;
        }
    }
    best_order
}

/// Quantizes `lp_coefs` into integers of `precision` bits.
///
/// Rounding errors are fed forward to the next coefficient. Returns `None`
/// when every coefficient is zero or when the required shift is below the
/// representable range.
pub fn quantize_coefficients(lp_coefs: &[f64], precision: usize) -> Option<QuantizedParameters> {
    debug_assert!((MIN_PRECISION..=MAX_PRECISION).contains(&precision));
    let sign_dropped = precision as i32 - 1;
    let qmax = (1i32 << sign_dropped) - 1;
    let qmin = -(1i32 << sign_dropped);

    let cmax = lp_coefs.iter().fold(0.0f64, |acc, c| acc.max(c.abs()));
    if cmax <= 0.0 || !cmax.is_finite() {
        return None;
    }
    let log2cmax = cmax.log2().floor() as i32;
    let mut shift = sign_dropped - log2cmax - 1;
    if shift > MAX_SHIFT {
        shift = MAX_SHIFT;
    } else if shift < MIN_SHIFT {
        return None;
    }

    let scale = if shift >= 0 {
        f64::from(1i32 << shift)
    } else {
        1.0 / f64::from(1i32 << -shift)
    };
    let mut coefs = heapless::Vec::<i32, MAX_LPC_ORDER>::new();
    let mut error = 0.0f64;
    for c in lp_coefs {
        error += c * scale;
        let q = (error.round() as i32).clamp(qmin, qmax);
        error -= f64::from(q);
        coefs.push(q).ok()?;
    }
    if coefs.iter().all(|&q| q == 0) {
        return None;
    }
    Some(QuantizedParameters::from_parts(
        coefs,
        precision as u8,
        shift.max(0) as i8,
    ))
}

/// Returns the default coefficient precision for the given stream shape.
pub const fn default_precision(bits_per_sample: usize, block_size: usize) -> usize {
    if bits_per_sample < 16 {
        let p = 2 + bits_per_sample / 2;
        if p < MIN_PRECISION {
            MIN_PRECISION
        } else {
            p
        }
    } else if bits_per_sample == 16 {
        match block_size {
            0..=192 => 7,
            193..=384 => 8,
            385..=576 => 9,
            577..=1152 => 10,
            1153..=2304 => 11,
            2305..=4608 => 12,
            _ => 13,
        }
    } else {
        match block_size {
            0..=384 => MAX_PRECISION - 2,
            385..=1152 => MAX_PRECISION - 1,
            _ => MAX_PRECISION,
        }
    }
}

/// Width of the accumulator used for the prediction sum.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Accumulator {
    I16,
    I32,
    I64,
}

impl Accumulator {
    /// Selects the narrowest accumulator that cannot overflow.
    ///
    /// The choice depends only on the stream parameters: a sum of `order`
    /// products of `bits_per_sample`-bit samples and `precision`-bit
    /// coefficients needs `bits_per_sample + precision + ceil(log2(order))`
    /// bits.
    pub fn select(bits_per_sample: usize, precision: usize, order: usize) -> Self {
        let order_bits = order.max(1).next_power_of_two().trailing_zeros() as usize;
        let bits = bits_per_sample + precision + order_bits;
        if bits <= 16 {
            Self::I16
        } else if bits <= 32 {
            Self::I32
        } else {
            Self::I64
        }
    }

    fn for_params(bits_per_sample: usize, params: &QuantizedParameters) -> Self {
        Self::select(bits_per_sample, params.precision(), params.order())
    }
}

#[inline]
fn predict<A, H>(coefs: &[i32], shift: usize, history: &[H], t: usize) -> i64
where
    A: PrimInt + WrappingAdd + WrappingMul + AsPrimitive<i64>,
    H: AsPrimitive<A>,
    i32: AsPrimitive<A>,
{
    let mut acc = A::zero();
    for (k, c) in coefs.iter().enumerate() {
        let c: A = c.as_();
        let x: A = history[t - 1 - k].as_();
        acc = acc.wrapping_add(&c.wrapping_mul(&x));
    }
    (acc >> shift).as_()
}

fn compute_residual_with<A>(
    signal: &[i32],
    params: &QuantizedParameters,
    dest: &mut Vec<i32>,
) -> bool
where
    A: PrimInt + WrappingAdd + WrappingMul + AsPrimitive<i64> + 'static,
    i32: AsPrimitive<A>,
{
    let order = params.order();
    let shift = params.shift() as usize;
    for t in order..signal.len() {
        let pred = predict::<A, i32>(params.coefs(), shift, signal, t);
        let Ok(e) = i32::try_from(i64::from(signal[t]) - pred) else {
            return false;
        };
        dest.push(e);
    }
    true
}

/// Computes the residual of the quantized predictor.
///
/// `signal` must fit in `bits_per_sample` bits. `dest` receives
/// `signal.len() - order` values. Returns `false` if a residual value does
/// not fit in `i32`.
pub fn compute_residual(
    signal: &[i32],
    params: &QuantizedParameters,
    bits_per_sample: usize,
    dest: &mut Vec<i32>,
) -> bool {
    dest.clear();
    if signal.len() < params.order() {
        return false;
    }
    match Accumulator::for_params(bits_per_sample, params) {
        Accumulator::I16 => compute_residual_with::<i16>(signal, params, dest),
        Accumulator::I32 => compute_residual_with::<i32>(signal, params, dest),
        Accumulator::I64 => compute_residual_with::<i64>(signal, params, dest),
    }
}

fn restore_signal_with<A>(params: &QuantizedParameters, residual: &[i32], dest: &mut [i64])
where
    A: PrimInt + WrappingAdd + WrappingMul + AsPrimitive<i64> + 'static,
    i64: AsPrimitive<A>,
    i32: AsPrimitive<A>,
{
    let order = params.order();
    let shift = params.shift() as usize;
    for (i, r) in residual.iter().enumerate() {
        let t = i + order;
        dest[t] = predict::<A, i64>(params.coefs(), shift, dest, t).wrapping_add(i64::from(*r));
    }
}

/// Restores the signal in place.
///
/// `dest[..order]` must already contain the warm-up samples, and
/// `residual.len()` must equal `dest.len() - order`.
pub fn restore_signal(
    params: &QuantizedParameters,
    bits_per_sample: usize,
    residual: &[i32],
    dest: &mut [i64],
) {
    debug_assert_eq!(residual.len() + params.order(), dest.len());
    match Accumulator::for_params(bits_per_sample, params) {
        Accumulator::I16 => restore_signal_with::<i16>(params, residual, dest),
        Accumulator::I32 => restore_signal_with::<i32>(params, residual, dest),
        Accumulator::I64 => restore_signal_with::<i64>(params, residual, dest),
    }
}

/// Working buffer for (unquantized) LPC estimation.
struct LpcEstimator {
    /// Buffer for storing windowed signal.
    windowed_signal: Vec<f32>,
    /// Buffer for storing auto-correlation coefficients.
    corr_coefs: Vec<f64>,
}

impl LpcEstimator {
    const fn new() -> Self {
        Self {
            windowed_signal: vec![],
            corr_coefs: vec![],
        }
    }

    fn fill_windowed_signal(&mut self, signal: &[i32], window: &[f32]) {
        self.windowed_signal.clear();
        for (t, &v) in signal.iter().enumerate() {
            self.windowed_signal.push(v as f32 * window[t]);
        }
    }

    fn analyze(&mut self, signal: &[i32], window: &Window, max_order: usize) -> Option<LpcAnalysis> {
        let max_order = max_order
            .min(MAX_LPC_ORDER)
            .min(signal.len().saturating_sub(1));
        if max_order == 0 {
            return None;
        }
        self.fill_windowed_signal(signal, &get_window(window, signal.len()));
        self.corr_coefs.clear();
        self.corr_coefs.resize(max_order + 1, 0.0);
        auto_correlation(&self.windowed_signal, &mut self.corr_coefs);
        if self.corr_coefs[0] == 0.0 {
            return None;
        }
        Some(compute_lp_coefficients(&self.corr_coefs, max_order))
    }
}

thread_local! {
    /// Global (thread-local) working buffer for LPC estimation.
    static LPC_ESTIMATOR: RefCell<LpcEstimator> = const { RefCell::new(LpcEstimator::new()) };
}

/// Windows `signal` and estimates predictors of orders up to `max_order`.
///
/// Returns `None` when the windowed signal has no energy or when the block is
/// too short for any predictor.
#[allow(clippy::module_name_repetitions)]
pub fn lpc_analysis(signal: &[i32], window: &Window, max_order: usize) -> Option<LpcAnalysis> {
    LPC_ESTIMATOR.with(|estimator| estimator.borrow_mut().analyze(signal, window, max_order))
}

#[cfg(test)]
#[allow(clippy::pedantic, clippy::nursery, clippy::needless_range_loop)]
mod tests {
    use super::*;
    use crate::assert_close;
    use crate::test_helper;

    use rand::rngs::StdRng;
    use rand::Rng;
    use rand::SeedableRng;
    use rstest::rstest;
    use std::f32::consts::PI;

    #[test]
    fn auto_correlation_computation() {
        let mut signal = [0f32; 128];
        for t in 0..signal.len() {
            signal[t] = (t as f32 / 32.0 * 2.0 * PI).sin() * 1024.0;
        }
        let mut corr = [0f64; 32];
        auto_correlation(&signal, &mut corr);

        let argmax = (0..32).max_by(|&a, &b| corr[a].total_cmp(&corr[b])).unwrap();
        let argmin = (0..32).min_by(|&a, &b| corr[a].total_cmp(&corr[b])).unwrap();
        assert_eq!(argmax, 0);
        assert_eq!(argmin, 16);

        let mut long_lag = [1f64; 4];
        auto_correlation(&[1.0, 2.0], &mut long_lag);
        assert_eq!(long_lag, [5.0, 2.0, 0.0, 0.0]);
    }

    fn ar2_signal(n: usize, seed: u64) -> Vec<i32> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut signal = vec![0i32; n];
        let mut x1 = 0.0f64;
        let mut x2 = 0.0f64;
        for t in 0..n {
            let x = 1.6 * x1 - 0.8 * x2 + rng.gen_range(-256.0..256.0);
            signal[t] = x.round() as i32;
            x2 = x1;
            x1 = x;
        }
        signal
    }

    #[test]
    fn levinson_recovers_ar2_process() {
        let signal = ar2_signal(8192, 1);
        let analysis = lpc_analysis(&signal, &Window::Rectangle, 8).unwrap();
        assert_eq!(analysis.max_order(), 8);
        let coefs = analysis.coefs(2);
        assert_close!(coefs[0], 1.6f64, 0.05f64);
        assert_close!(coefs[1], -0.8f64, 0.05f64);

        // Errors never increase with the order.
        for w in analysis.errors().windows(2) {
            assert!(w[1] <= w[0] * (1.0 + 1e-9));
        }
        assert_eq!(analysis.best_order(signal.len(), 16 + 12), 2);
    }

    #[test]
    fn levinson_stops_at_zero_error() {
        // Errors vanish at order 1 for a perfectly correlated lag.
        let autoc = [4.0, 4.0, 4.0, 4.0];
        let analysis = compute_lp_coefficients(&autoc, 3);
        assert_eq!(analysis.max_order(), 1);
        assert_close!(analysis.coefs(1)[0], 1.0f64);
        assert_eq!(analysis.errors(), &[0.0]);
    }

    #[test]
    fn lpc_with_pure_dc() {
        let signal = [12345; 7];
        let analysis = lpc_analysis(&signal, &Window::Rectangle, 1).unwrap();
        let qlpc = quantize_coefficients(analysis.coefs(1), 15).unwrap();
        let mut errors = vec![];
        assert!(compute_residual(&signal, &qlpc, 15, &mut errors));
        assert_eq!(errors.len(), 6);
        // Block edges bias the estimate below one.
        for e in errors {
            assert!(e.abs() < 2048);
        }
        assert!(lpc_analysis(&[0; 64], &Window::default(), 8).is_none());
        assert!(lpc_analysis(&[5], &Window::default(), 8).is_none());
    }

    #[test]
    fn expected_bits_and_best_order() {
        assert_eq!(expected_bits_per_residual_sample(0.0, 100), 0.0);
        assert_eq!(expected_bits_per_residual_sample(-1.0, 100), 1e32);
        assert_close!(expected_bits_per_residual_sample(800.0, 100), 1.0f64);
        // Tiny errors clamp to zero bits.
        assert_eq!(expected_bits_per_residual_sample(1.0, 100), 0.0);

        let errors = [1e8, 1e4, 0.99e4, 0.98e4];
        assert_eq!(compute_best_order(&errors, 4096, 200), 2);
        assert_eq!(compute_best_order(&errors, 4096, 0), 4);
    }

    #[test]
    fn quantization_respects_precision() {
        let q = quantize_coefficients(&[1.6, -0.8], 12).unwrap();
        assert_eq!(q.precision(), 12);
        // 1.6 has floor(log2) of 0, so the shift is 12 - 1 - 0 - 1.
        assert_eq!(q.shift(), 10);
        assert_eq!(q.coefs(), &[1638, -819]);

        let q = quantize_coefficients(&[3.9, -2.0, 0.1], 5).unwrap();
        for &c in q.coefs() {
            assert!((-16..=15).contains(&c));
        }

        // Large coefficients lead to a negative shift, which is folded into them.
        let q = quantize_coefficients(&[40000.0], 5).unwrap();
        assert_eq!(q.shift(), 0);
        assert_eq!(q.coefs(), &[10]);

        assert!(quantize_coefficients(&[0.0, 0.0], 12).is_none());
        assert!(quantize_coefficients(&[1e30], 12).is_none());
    }

    #[test]
    fn quantization_feeds_error_forward() {
        let coefs = [0.3; 16];
        let q = quantize_coefficients(&coefs, 5).unwrap();
        let shift = q.shift() as i32;
        let sum: i32 = q.coefs().iter().sum();
        let expected = 0.3 * 16.0 * f64::from(1 << shift);
        assert!((f64::from(sum) - expected).abs() <= 1.0);
    }

    #[test]
    fn default_precision_table() {
        assert_eq!(default_precision(8, 4096), 6);
        assert_eq!(default_precision(4, 4096), 5);
        assert_eq!(default_precision(16, 192), 7);
        assert_eq!(default_precision(16, 1152), 10);
        assert_eq!(default_precision(16, 4096), 12);
        assert_eq!(default_precision(16, 8192), 13);
        assert_eq!(default_precision(24, 256), 13);
        assert_eq!(default_precision(24, 1152), 14);
        assert_eq!(default_precision(24, 4096), 15);
    }

    #[test]
    fn accumulator_selection() {
        assert_eq!(Accumulator::select(8, 4, 2), Accumulator::I16);
        assert_eq!(Accumulator::select(8, 8, 1), Accumulator::I16);
        assert_eq!(Accumulator::select(8, 8, 2), Accumulator::I32);
        assert_eq!(Accumulator::select(16, 12, 8), Accumulator::I32);
        assert_eq!(Accumulator::select(16, 12, 9), Accumulator::I32);
        assert_eq!(Accumulator::select(16, 15, 3), Accumulator::I64);
        assert_eq!(Accumulator::select(24, 15, 32), Accumulator::I64);
    }

    #[test]
    fn accumulator_ignores_coefficient_values() {
        // Small coefficients don't narrow the accumulator below the bound.
        let small = QuantizedParameters::new(&[1, 0, 0, 0], 15, 0).unwrap();
        let large = QuantizedParameters::new(&[16383, -16384, 16383, -16384], 15, 0).unwrap();
        assert_eq!(
            Accumulator::for_params(16, &small),
            Accumulator::for_params(16, &large)
        );
        assert_eq!(Accumulator::for_params(16, &small), Accumulator::I64);
        assert_eq!(Accumulator::for_params(8, &small), Accumulator::I32);
    }

    #[rstest]
    fn qlpc_recovery(
        #[values(2, 12, 32)] order: usize,
        #[values((8, 7), (16, 12), (24, 15))] shape: (usize, usize),
    ) {
        let (bps, precision) = shape;
        let amplitude = 1i32 << (bps - 1);
        let mut rng = StdRng::seed_from_u64(order as u64);
        let n = 1024;
        let mut signal = test_helper::sinusoid_plus_noise(n, 37, amplitude as f32 * 0.6, 0);
        for v in signal.iter_mut() {
            *v = (*v + rng.gen_range(-64..64)).clamp(-amplitude, amplitude - 1);
        }

        let analysis = lpc_analysis(&signal, &Window::default(), order).unwrap();
        let order = analysis.max_order();
        let qlpc = quantize_coefficients(analysis.coefs(order), precision).unwrap();
        let mut residual = vec![];
        assert!(compute_residual(&signal, &qlpc, bps, &mut residual));
        assert_eq!(residual.len(), n - order);

        for t in order..n {
            let mut pred: i64 = 0;
            for (k, c) in qlpc.coefs().iter().enumerate() {
                pred += i64::from(signal[t - k - 1]) * i64::from(*c);
            }
            pred >>= qlpc.shift();
            assert_eq!(
                i64::from(residual[t - order]) + pred,
                i64::from(signal[t]),
                "Failed at t={t}"
            );
        }

        let mut restored: Vec<i64> = vec![0; n];
        for t in 0..order {
            restored[t] = i64::from(signal[t]);
        }
        restore_signal(&qlpc, bps, &residual, &mut restored);
        for t in 0..n {
            assert_eq!(restored[t], i64::from(signal[t]));
        }
    }

    #[test]
    fn qlpc_prediction_reduces_energy() {
        let signal = test_helper::sinusoid_plus_noise(4096, 100, 20000.0, 10);
        let analysis = lpc_analysis(&signal, &Window::default(), 8).unwrap();
        let order = analysis.best_order(signal.len(), 16 + 12);
        let qlpc = quantize_coefficients(analysis.coefs(order), 12).unwrap();
        let mut residual = vec![];
        assert!(compute_residual(&signal, &qlpc, 16, &mut residual));

        let energy = |xs: &[i32]| xs.iter().map(|&x| (x as f64).powi(2)).sum::<f64>();
        assert!(energy(&residual) * 100.0 < energy(&signal));
    }
}
