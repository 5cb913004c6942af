//! # Pitch Detection Module
//!
//! This module estimates the fundamental frequency of a single window of
//! audio using normalized autocorrelation.
//!
//! ## Features
//! - RMS noise gate ahead of any correlation work
//! - Normalized autocorrelation, comparable across lags
//! - Peak selection that resists octave errors and high-frequency aliasing
//! - Sub-sample peak interpolation: a cosine fit for narrow peaks, a parabola
//!   for broad ones
//!
//! "No pitch" is an ordinary outcome and is reported as `None`; nothing in
//! here returns an error.

use crate::config::EstimatorConfig;
use crate::fft::Autocorrelator;

/// Candidate peaks within this fraction of the strongest one are treated as
/// equally good, and the shortest lag among them wins. Period multiples
/// correlate about as well as the period itself, so taking the raw maximum
/// would report subharmonics.
pub const PEAK_TOLERANCE: f64 = 0.9;

/// Neighbour-to-peak ratio above which the cosine fit is ill-conditioned.
/// Such broad peaks belong to long periods, where the parabola's bias is
/// negligible.
const COSINE_FIT_LIMIT: f64 = 0.999;

/// A borrowed window of mono samples together with its capture rate.
#[derive(Debug, Clone, Copy)]
pub struct SampleWindow<'a> {
    samples: &'a [f32],
    sample_rate: u32,
}

impl<'a> SampleWindow<'a> {
    pub fn new(samples: &'a [f32], sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &'a [f32] {
        self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Root-mean-square amplitude of the window (0 for an empty window).
    pub fn rms(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let energy: f64 = self.samples.iter().map(|&s| s as f64 * s as f64).sum();
        (energy / self.samples.len() as f64).sqrt()
    }
}

/// Autocorrelation pitch estimator with transforms planned for one window
/// length.
///
/// `estimate` takes `&self` and keeps no state between calls, so one
/// estimator can serve any number of windows (or threads) and the result
/// only depends on the window and the configuration.
pub struct PitchEstimator {
    config: EstimatorConfig,
    correlator: Autocorrelator,
}

impl PitchEstimator {
    /// Creates an estimator for windows of `window_len` samples.
    ///
    /// Windows of other lengths are still accepted; they just pay for
    /// planning their own transforms.
    pub fn new(window_len: usize, config: EstimatorConfig) -> Self {
        Self {
            config,
            correlator: Autocorrelator::new(window_len),
        }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Estimates the fundamental frequency of `window`.
    ///
    /// The window passes through these gates in order:
    /// 1. RMS below `silence_threshold` → silence
    /// 2. Normalized autocorrelation over lags `0..=N/2`
    /// 3. Peak search between the lags of `max_frequency` and
    ///    `min_frequency`; the strongest peak must reach `clarity_threshold`
    /// 4. Sub-sample refinement of the chosen lag
    /// 5. `frequency = sample_rate / lag`, kept only inside
    ///    `min_frequency..=max_frequency`
    ///
    /// The range check applies to the refined frequency, so a tone sitting
    /// exactly on a bound may fall on either side of it by the refinement
    /// error (a few thousandths of a sample).
    ///
    /// # Returns
    /// * `Some(frequency)` - Detected fundamental in Hz
    /// * `None` - Silence, noise, or a pitch outside the supported range
    pub fn estimate(&self, window: &SampleWindow<'_>) -> Option<f64> {
        let samples = window.samples();
        if samples.len() < 4 || window.sample_rate() == 0 {
            return None;
        }

        // --- Noise Gate: runs before any correlation work ---
        if window.rms() < self.config.silence_threshold {
            return None;
        }

        let sample_rate = window.sample_rate() as f64;
        let half = samples.len() / 2;
        let lag_floor = ((sample_rate / self.config.max_frequency).floor() as usize).max(1);
        let lag_ceiling = ((sample_rate / self.config.min_frequency).ceil() as usize).min(half - 1);
        if lag_floor >= lag_ceiling {
            return None;
        }

        let curve = self.correlator.normalized(samples, half);
        let peak = select_peak(&curve, lag_floor, lag_ceiling, self.config.clarity_threshold)?;
        let lag = refine_peak(&curve, peak);

        let frequency = sample_rate / lag;
        if frequency.is_finite()
            && frequency >= self.config.min_frequency
            && frequency <= self.config.max_frequency
        {
            Some(frequency)
        } else {
            None
        }
    }
}

/// One-shot estimation that plans its transforms for this window only.
pub fn estimate_pitch(window: &SampleWindow<'_>, config: &EstimatorConfig) -> Option<f64> {
    PitchEstimator::new(window.len(), config.clone()).estimate(window)
}

/// Picks the lag of the fundamental from a normalized correlation curve.
///
/// Candidates are local maxima inside `floor..=ceiling`. `curve` must extend
/// at least one lag past `ceiling`.
fn select_peak(curve: &[f64], floor: usize, ceiling: usize, clarity: f64) -> Option<usize> {
    let is_peak = |lag: usize| curve[lag] > curve[lag - 1] && curve[lag] >= curve[lag + 1];

    let candidates: Vec<usize> = (floor..=ceiling).filter(|&lag| is_peak(lag)).collect();
    let strongest = candidates
        .iter()
        .map(|&lag| curve[lag])
        .fold(f64::NEG_INFINITY, f64::max);
    if candidates.is_empty() || strongest < clarity {
        return None;
    }

    let cutoff = strongest * PEAK_TOLERANCE;

    // A comparable peak below the floor means the true period is shorter
    // than the highest supported frequency allows; what we see above the
    // floor are its multiples.
    if (1..floor).any(|lag| is_peak(lag) && curve[lag] >= cutoff) {
        return None;
    }

    candidates.into_iter().find(|&lag| curve[lag] >= cutoff)
}

/// Returns the sub-sample lag of the curve's maximum near `peak`.
fn refine_peak(curve: &[f64], peak: usize) -> f64 {
    let y1 = curve[peak - 1];
    let y2 = curve[peak];
    let y3 = curve[peak + 1];

    let shift = cosine_shift(y1, y2, y3).unwrap_or_else(|| parabolic_shift(y1, y2, y3));
    peak as f64 + shift.clamp(-0.5, 0.5)
}

/// Offset of the crest of `A·cos(ω(k - δ))` passing through three points
/// one lag apart, centred on the middle one.
///
/// The correlation of a periodic tone has this shape around each period. A
/// parabola through the same points is pulled toward the middle sample by
/// an amount growing with `ω`, which near 5 kHz is several Hz.
fn cosine_shift(y1: f64, y2: f64, y3: f64) -> Option<f64> {
    if y2 <= 0.0 {
        return None;
    }
    // cos ω = (y1 + y3) / 2y2
    let ratio = (y1 + y3) / (2.0 * y2);
    if !(ratio > -1.0 && ratio < COSINE_FIT_LIMIT) {
        return None;
    }
    let omega = ratio.acos();
    // tan ωδ = (y3 - y1) / (2·y2·sin ω)
    Some(((y3 - y1) / (2.0 * y2 * omega.sin())).atan() / omega)
}

/// Offset of the vertex of the parabola through three points one lag apart.
fn parabolic_shift(y1: f64, y2: f64, y3: f64) -> f64 {
    let denominator = y1 - 2.0 * y2 + y3;
    if denominator >= -f64::EPSILON {
        return 0.0;
    }
    0.5 * (y1 - y3) / denominator
}
