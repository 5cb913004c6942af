//! # Fast Fourier Transform (FFT) Module
//!
//! Computes the autocorrelation curve the pitch estimator searches. Lag
//! products come from a zero-padded FFT (Wiener-Khinchin), so a 4096-sample
//! window costs two transforms instead of a quadratic loop. Everything runs
//! in `f64`; the planned transforms are reused across windows.
//!
//! ## Features
//! - Linear (not circular) autocorrelation via zero padding to 2N
//! - Mean removal, so a DC offset cannot masquerade as a period
//! - Normalization by the energy of the two overlapping sub-windows
//! - Deterministic output for a given input

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Below this product of overlap energies a lag is treated as uncorrelated.
const ENERGY_FLOOR: f64 = 1e-20;

/// Planned forward/inverse transforms for one window length.
pub struct Autocorrelator {
    padded_len: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl Autocorrelator {
    /// Plans transforms for windows of `window_len` samples.
    pub fn new(window_len: usize) -> Self {
        let padded_len = padded_len(window_len);
        let mut planner = FftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(padded_len);
        let inverse = planner.plan_fft_inverse(padded_len);
        Self {
            padded_len,
            forward,
            inverse,
        }
    }

    /// Raw lag products `r(τ) = Σ x[i]·x[i+τ]` over the overlap, for
    /// `τ` in `0..=max_lag`.
    ///
    /// The padded length depends only on `signal.len()`, so the same signal
    /// yields the same bits whichever correlator processes it. Lengths other
    /// than the planned one get transforms planned on the spot.
    pub fn lag_products(&self, signal: &[f32], max_lag: usize) -> Vec<f64> {
        if signal.is_empty() {
            return Vec::new();
        }
        let padded_len = padded_len(signal.len());
        let (forward, inverse) = if padded_len == self.padded_len {
            (Arc::clone(&self.forward), Arc::clone(&self.inverse))
        } else {
            let mut planner = FftPlanner::<f64>::new();
            (
                planner.plan_fft_forward(padded_len),
                planner.plan_fft_inverse(padded_len),
            )
        };

        let mut buffer: Vec<Complex<f64>> = signal
            .iter()
            .map(|&sample| Complex::new(sample as f64, 0.0))
            .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
            .take(padded_len)
            .collect();

        forward.process(&mut buffer);
        for bin in buffer.iter_mut() {
            *bin = Complex::new(bin.norm_sqr(), 0.0);
        }
        inverse.process(&mut buffer);

        // rustfft leaves the inverse unscaled.
        let scale = 1.0 / padded_len as f64;
        let last = max_lag.min(signal.len().saturating_sub(1));
        buffer[..=last].iter().map(|c| c.re * scale).collect()
    }

    /// Autocorrelation of the mean-removed signal, normalized by the
    /// geometric mean of the energies of the two overlapping sub-windows, for
    /// lags `0..=max_lag`. Values lie in [-1, 1]; lags whose overlap carries
    /// no energy correlate to 0, so a constant signal yields a flat zero curve.
    pub fn normalized(&self, signal: &[f32], max_lag: usize) -> Vec<f64> {
        let signal = centered(signal);
        let products = self.lag_products(&signal, max_lag);
        let n = signal.len();

        // prefix[k] = energy of signal[..k]
        let mut prefix = Vec::with_capacity(n + 1);
        prefix.push(0.0);
        let mut running = 0.0;
        for &sample in &signal {
            running += sample as f64 * sample as f64;
            prefix.push(running);
        }

        products
            .iter()
            .enumerate()
            .map(|(lag, &product)| {
                let head = prefix[n - lag];
                let tail = prefix[n] - prefix[lag];
                let energy = head * tail;
                if energy > ENERGY_FLOOR {
                    (product / energy.sqrt()).clamp(-1.0, 1.0)
                } else {
                    0.0
                }
            })
            .collect()
    }
}

/// The signal minus its mean.
fn centered(signal: &[f32]) -> Vec<f32> {
    if signal.is_empty() {
        return Vec::new();
    }
    let mean = signal.iter().map(|&s| s as f64).sum::<f64>() / signal.len() as f64;
    signal.iter().map(|&s| (s as f64 - mean) as f32).collect()
}

/// Zero padding to at least twice the signal keeps the correlation linear.
fn padded_len(signal_len: usize) -> usize {
    (2 * signal_len.max(1)).next_power_of_two()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct_lag_products(signal: &[f32], max_lag: usize) -> Vec<f64> {
        (0..=max_lag)
            .map(|lag| {
                signal
                    .iter()
                    .zip(&signal[lag..])
                    .map(|(&a, &b)| a as f64 * b as f64)
                    .sum()
            })
            .collect()
    }

    fn test_signal(len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                let t = i as f32;
                0.6 * (0.07 * t).sin() + 0.3 * (0.31 * t + 1.0).sin() - 0.1 * (1.3 * t).cos()
            })
            .collect()
    }

    #[test]
    fn fft_products_match_direct_sum() {
        let signal = test_signal(1000);
        let correlator = Autocorrelator::new(1000);
        let fast = correlator.lag_products(&signal, 500);
        let slow = direct_lag_products(&signal, 500);

        assert_eq!(fast.len(), 501);
        for (lag, (a, b)) in fast.iter().zip(&slow).enumerate() {
            assert!((a - b).abs() < 1e-9, "lag {lag}: fft {a} vs direct {b}");
        }
    }

    #[test]
    fn zero_lag_normalizes_to_one() {
        let signal = test_signal(512);
        let curve = Autocorrelator::new(512).normalized(&signal, 256);
        assert!((curve[0] - 1.0).abs() < 1e-12);
        assert!(curve.iter().all(|c| (-1.0..=1.0).contains(c)));
    }

    #[test]
    fn silent_signal_correlates_to_zero() {
        let signal = vec![0.0f32; 256];
        let curve = Autocorrelator::new(256).normalized(&signal, 128);
        assert!(curve.iter().all(|&c| c == 0.0));
    }

    #[test]
    fn constant_signal_correlates_to_zero() {
        for level in [0.5f32, 0.05, -0.3] {
            let signal = vec![level; 1024];
            let curve = Autocorrelator::new(1024).normalized(&signal, 512);
            assert!(curve.iter().all(|&c| c == 0.0), "level {level}");
        }
    }

    #[test]
    fn offset_does_not_change_the_curve() {
        let signal = test_signal(1024);
        let shifted: Vec<f32> = signal.iter().map(|s| s + 0.4).collect();
        let correlator = Autocorrelator::new(1024);
        let plain = correlator.normalized(&signal, 512);
        let offset = correlator.normalized(&shifted, 512);
        for (lag, (a, b)) in plain.iter().zip(&offset).enumerate() {
            assert!((a - b).abs() < 0.05, "lag {lag}: {a} vs {b}");
        }
    }

    #[test]
    fn shorter_signal_than_plan_is_accepted() {
        let signal = test_signal(300);
        let correlator = Autocorrelator::new(512);
        let fast = correlator.lag_products(&signal, 1000);
        assert_eq!(fast.len(), 300);
        let slow = direct_lag_products(&signal, 299);
        assert!((fast[150] - slow[150]).abs() < 1e-9);
    }
}
