//! Basis and window tables for the single-bin sliding DFT.
//!
//! The window spans a whole number of target periods, so the target
//! frequency falls exactly on bin `k = num_periods` of an `N`-point DFT and
//! every table below is periodic in `N`.

use std::f64::consts::PI;
use std::fmt;
use std::sync::Arc;

use rustfft::num_complex::Complex64;
use rustfft::{ Fft, FftPlanner };

use crate::config::{ SonarConfig, WindowKind };
use crate::error::SonarResult;

#[inline]
fn unit(bin: usize, pos: usize, n: usize) -> Complex64 {
    // reduce before scaling so large windows keep full angle precision
    let turns = ((bin * pos) % n) as f64;
    Complex64::from_polar(1.0, (-2.0 * PI * turns) / (n as f64))
}

pub struct Coefficients {
    window_kind: WindowKind,
    window_length: usize,
    nearest_period: usize,
    bin: usize,
    bin_frequency_hz: f64,
    a0: f64,
    a1: f64,
    /// `e^{-j2πkp/N}`
    center: Vec<Complex64>,
    /// `e^{-j2π(k-1)p/N}`
    lower: Vec<Complex64>,
    /// `e^{-j2π(k+1)p/N}`
    upper: Vec<Complex64>,
    /// `e^{+j2πp/N}`, rotates neighbour bins to the window origin.
    rotation: Vec<Complex64>,
    taper: Vec<f64>,
    /// `taper[m] * center[m]`
    windowed: Vec<Complex64>,
    fft: Arc<dyn Fft<f64>>,
}

impl fmt::Debug for Coefficients {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coefficients")
            .field("window_kind", &self.window_kind)
            .field("window_length", &self.window_length)
            .field("nearest_period", &self.nearest_period)
            .field("bin", &self.bin)
            .field("bin_frequency_hz", &self.bin_frequency_hz)
            .finish_non_exhaustive()
    }
}

impl Coefficients {
    pub fn from_config(config: &SonarConfig) -> SonarResult<Self> {
        config.validate()?;
        Ok(
            Self::new(
                config.sample_rate_hz,
                config.nearest_period(),
                config.num_periods,
                config.window
            )
        )
    }

    /// Builds the tables for a window of `nearest_period * num_periods`
    /// samples. Both counts must already be validated (period >= 2,
    /// periods >= 1).
    pub fn new(
        sample_rate_hz: u32,
        nearest_period: usize,
        num_periods: usize,
        window_kind: WindowKind
    ) -> Self {
        debug_assert!(nearest_period >= 2 && num_periods >= 1);
        let n = nearest_period * num_periods;
        let bin = num_periods;
        let (a0, a1) = window_kind.cosine_sum_terms();

        let center: Vec<Complex64> = (0..n).map(|p| unit(bin, p, n)).collect();
        let lower: Vec<Complex64> = (0..n).map(|p| unit(bin - 1, p, n)).collect();
        let upper: Vec<Complex64> = (0..n).map(|p| unit((bin + 1) % n, p, n)).collect();
        let rotation: Vec<Complex64> = (0..n).map(|p| unit(1, p, n).conj()).collect();
        let taper: Vec<f64> = (0..n).map(|m| window_kind.weight(m, n)).collect();
        let windowed = center
            .iter()
            .zip(&taper)
            .map(|(c, w)| *c * *w)
            .collect();

        let fft = FftPlanner::<f64>::new().plan_fft_forward(n);

        Self {
            window_kind,
            window_length: n,
            nearest_period,
            bin,
            bin_frequency_hz: (sample_rate_hz as f64) / (nearest_period as f64),
            a0,
            a1,
            center,
            lower,
            upper,
            rotation,
            taper,
            windowed,
            fft,
        }
    }

    pub fn window_length(&self) -> usize {
        self.window_length
    }

    pub fn nearest_period(&self) -> usize {
        self.nearest_period
    }

    pub fn bin(&self) -> usize {
        self.bin
    }

    /// Frequency the detector actually listens at, `sample_rate / nearest_period`.
    pub fn bin_frequency_hz(&self) -> f64 {
        self.bin_frequency_hz
    }

    pub fn window_kind(&self) -> WindowKind {
        self.window_kind
    }

    pub fn taper(&self) -> &[f64] {
        &self.taper
    }

    pub fn windowed_basis(&self) -> &[Complex64] {
        &self.windowed
    }

    /// Contributions of one sample at circular position `pos` to the
    /// `(k-1, k, k+1)` absolute-phase sums.
    #[inline]
    pub(crate) fn contributions(&self, sample: f64, pos: usize) -> [Complex64; 3] {
        [self.lower[pos] * sample, self.center[pos] * sample, self.upper[pos] * sample]
    }

    /// Windowed coefficient for a window whose oldest sample sits at circular
    /// position `origin`, given the absolute-phase sums of bins `k-1, k, k+1`.
    #[inline]
    pub(crate) fn combine(&self, sums: &[Complex64; 3], origin: usize) -> Complex64 {
        let rot = self.rotation[origin];
        let tapered =
            sums[1] * self.a0 - (sums[0] * rot.conj() + sums[2] * rot) * self.a1;
        // undo the absolute phase so the result matches a window-relative DFT
        tapered * self.center[origin].conj()
    }

    /// Exact absolute-phase sums for a history laid out by circular position.
    pub(crate) fn absolute_sums(
        &self,
        history: &[f64],
        buffer: &mut Vec<Complex64>,
        scratch: &mut Vec<Complex64>
    ) -> [Complex64; 3] {
        buffer.clear();
        buffer.extend(history.iter().map(|&x| Complex64::new(x, 0.0)));
        scratch.resize(self.fft.get_inplace_scratch_len(), Complex64::new(0.0, 0.0));
        self.fft.process_with_scratch(buffer, scratch);
        let n = self.window_length;
        [buffer[self.bin - 1], buffer[self.bin], buffer[(self.bin + 1) % n]]
    }

    /// From-scratch windowed single-bin DFT over `window`, oldest sample first.
    /// Shorter slices are treated as zero-padded at the old end.
    pub fn windowed_dft(&self, window: &[f64]) -> Complex64 {
        let n = self.window_length;
        let skip = n.saturating_sub(window.len());
        let tail = &window[window.len().saturating_sub(n)..];
        self.windowed[skip..]
            .iter()
            .zip(tail)
            .map(|(c, x)| *c * *x)
            .sum()
    }

    pub fn windowed_magnitude(&self, window: &[f64]) -> f64 {
        self.windowed_dft(window).norm()
    }
}
