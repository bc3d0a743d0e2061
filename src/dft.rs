//! Per-channel sliding single-bin DFT.

use std::sync::Arc;

use rustfft::num_complex::Complex64;

use crate::coefficients::Coefficients;

pub type AdcSample = i32;

/// Streaming estimate of one channel's Fourier coefficient at the target
/// frequency over its most recent `window_length` samples.
///
/// Each update adds the new sample's contribution and removes the one it
/// overwrites in the circular history, so the cost per sample does not depend
/// on the window length. Once per trip around the history the sums are
/// rebuilt exactly with an FFT to keep rounding from accumulating.
#[derive(Debug)]
pub struct SlidingDft {
    coefs: Arc<Coefficients>,
    history: Vec<f64>,
    sums: [Complex64; 3],
    coefficient: Complex64,
    magnitude: f64,
    count: u64,
    pos: usize,
    fft_buf: Vec<Complex64>,
    fft_scratch: Vec<Complex64>,
}

impl SlidingDft {
    pub fn new(coefs: Arc<Coefficients>) -> Self {
        let n = coefs.window_length();
        Self {
            coefs,
            history: vec![0.0; n],
            sums: [Complex64::new(0.0, 0.0); 3],
            coefficient: Complex64::new(0.0, 0.0),
            magnitude: 0.0,
            count: 0,
            pos: 0,
            fft_buf: Vec::with_capacity(n),
            fft_scratch: Vec::new(),
        }
    }

    pub fn update(&mut self, sample: AdcSample) {
        let x = sample as f64;
        let n = self.history.len();
        let pos = self.pos;

        let old = std::mem::replace(&mut self.history[pos], x);
        let add = self.coefs.contributions(x, pos);
        let sub = self.coefs.contributions(old, pos);
        for b in 0..3 {
            self.sums[b] += add[b] - sub[b];
        }

        self.count += 1;
        self.pos = if pos + 1 == n { 0 } else { pos + 1 };
        if self.pos == 0 {
            self.sums = self.coefs.absolute_sums(
                &self.history,
                &mut self.fft_buf,
                &mut self.fft_scratch
            );
        }

        // oldest sample is the next one to be overwritten
        self.coefficient = self.coefs.combine(&self.sums, self.pos);
        self.magnitude = self.coefficient.norm();
    }

    pub fn magnitude(&self) -> f64 {
        self.magnitude
    }

    pub fn coefficient(&self) -> Complex64 {
        self.coefficient
    }

    /// Samples seen since construction.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn window_length(&self) -> usize {
        self.history.len()
    }

    /// Current window contents, oldest first.
    pub fn window(&self) -> Vec<f64> {
        let (newer, older) = self.history.split_at(self.pos);
        older.iter().chain(newer).copied().collect()
    }

    /// Magnitude recomputed from scratch over the current window.
    pub fn direct_magnitude(&self) -> f64 {
        self.coefs.windowed_magnitude(&self.window())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WindowKind;
    use approx::assert_relative_eq;

    fn engine(window: WindowKind) -> SlidingDft {
        SlidingDft::new(Arc::new(Coefficients::new(48_000, 12, 8, window)))
    }

    #[test]
    fn silent_input_has_zero_magnitude() {
        let mut dft = engine(WindowKind::Hann);
        for _ in 0..500 {
            dft.update(0);
        }
        assert_eq!(dft.magnitude(), 0.0);
        assert_eq!(dft.count(), 500);
    }

    #[test]
    fn window_is_oldest_first() {
        let mut dft = SlidingDft::new(Arc::new(Coefficients::new(1_000, 2, 2, WindowKind::Hann)));
        for s in 1..=6 {
            dft.update(s);
        }
        assert_eq!(dft.window(), vec![3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn steady_tone_reaches_full_scale() {
        let mut dft = engine(WindowKind::Rectangular);
        for i in 0..1000 {
            let phase = (2.0 * std::f64::consts::PI * (i as f64)) / 12.0;
            dft.update((2000.0 * phase.sin()).round() as AdcSample);
        }
        assert_relative_eq!(dft.magnitude(), 2000.0 * 96.0 / 2.0, max_relative = 1e-3);
    }

    #[test]
    fn tracks_direct_dft_between_resyncs() {
        for kind in [WindowKind::Rectangular, WindowKind::Hann, WindowKind::Hamming] {
            let mut dft = engine(kind);
            for i in 0..400i32 {
                dft.update((i * 37) % 211 - 105);
                let direct = dft.direct_magnitude();
                assert!(
                    (dft.magnitude() - direct).abs() <= 1e-9 * direct.max(1.0),
                    "{kind:?} sample {i}: {} vs {direct}",
                    dft.magnitude()
                );
            }
        }
    }
}
