//! Detector configuration.
//!
//! Defaults describe a four-hydrophone array sampled at 300 kHz listening for
//! a 30 kHz pinger. Values can be loaded from a TOML file; any key left out
//! keeps its default.

use std::path::Path;

use serde::Deserialize;

use crate::error::{ SonarError, SonarResult };

/// Taper applied to the DFT window.
///
/// All variants are cosine-sum windows of order one, `w[m] = a0 - 2*a1*cos(2πm/N)`,
/// which is what lets the sliding update stay O(1) per sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    Rectangular,
    #[default]
    Hann,
    Hamming,
}

impl WindowKind {
    /// `(a0, a1)` such that the windowed bin is `a0*X[k] - a1*(X[k-1] + X[k+1])`.
    pub fn cosine_sum_terms(&self) -> (f64, f64) {
        match self {
            WindowKind::Rectangular => (1.0, 0.0),
            WindowKind::Hann => (0.5, 0.25),
            WindowKind::Hamming => (0.54, 0.23),
        }
    }

    /// Taper weight at position `m` of an `n`-sample window.
    pub fn weight(&self, m: usize, n: usize) -> f64 {
        let (a0, a1) = self.cosine_sum_terms();
        let phase = (2.0 * std::f64::consts::PI * (m as f64)) / (n as f64);
        a0 - 2.0 * a1 * phase.cos()
    }
}

/// How pairwise arrival offsets are estimated from captured chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TdoaMethod {
    /// Difference of chunk start indices.
    #[default]
    Onset,
    /// Onset difference refined by waveform cross-correlation.
    CrossCorrelation,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SonarConfig {
    pub channels: usize,
    pub sample_rate_hz: u32,
    pub target_freq_hz: u32,
    /// Whole target periods per DFT window. Longer windows reject neighbouring
    /// frequencies better but detect later.
    pub num_periods: usize,
    pub window: WindowKind,
    /// Magnitude a channel must exceed to start capturing.
    pub threshold: f64,
    /// Maximum samples stored per chunk.
    pub chunk_capacity: usize,
    /// Largest physically possible inter-hydrophone delay, in samples.
    pub max_samples_tdoa: u64,
    pub min_samples_between_pings: u64,
    pub max_samples_to_wait_for_first_ping: u64,
    pub tdoa_method: TdoaMethod,
}

impl Default for SonarConfig {
    fn default() -> Self {
        Self {
            channels: 4,
            sample_rate_hz: 300_000,
            target_freq_hz: 30_000,
            num_periods: 20,
            window: WindowKind::Hann,
            threshold: 40_000.0,
            chunk_capacity: 8192,
            // ~0.5 m baseline at 1500 m/s
            max_samples_tdoa: 100,
            min_samples_between_pings: 540_000,
            max_samples_to_wait_for_first_ping: 360_000,
            tdoa_method: TdoaMethod::Onset,
        }
    }
}

impl SonarConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> SonarResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| SonarError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| SonarError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Samples per target period, rounded to the nearest integer.
    pub fn nearest_period(&self) -> usize {
        if self.target_freq_hz == 0 {
            return 0;
        }
        ((self.sample_rate_hz as f64) / (self.target_freq_hz as f64)).round() as usize
    }

    pub fn window_length(&self) -> usize {
        self.nearest_period() * self.num_periods
    }

    pub fn validate(&self) -> SonarResult<()> {
        if self.channels == 0 {
            return Err(SonarError::NoChannels);
        }
        if self.sample_rate_hz == 0 {
            return Err(SonarError::InvalidSampleRate(self.sample_rate_hz));
        }
        if self.target_freq_hz == 0 {
            return Err(SonarError::InvalidTargetFrequency(self.target_freq_hz));
        }
        let period = self.nearest_period();
        if period < 2 {
            return Err(SonarError::TargetAboveNyquist {
                target_hz: self.target_freq_hz,
                sample_rate_hz: self.sample_rate_hz,
                period,
            });
        }
        if self.num_periods == 0 {
            return Err(SonarError::NoPeriods);
        }
        if self.chunk_capacity == 0 {
            return Err(SonarError::NoChunkCapacity);
        }
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return Err(SonarError::InvalidThreshold(self.threshold));
        }
        if self.min_samples_between_pings <= self.max_samples_tdoa {
            return Err(SonarError::ImplausibleBounds {
                max_tdoa: self.max_samples_tdoa,
                min_between: self.min_samples_between_pings,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let cfg = SonarConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.nearest_period(), 10);
        assert_eq!(cfg.window_length(), 200);
    }

    #[test]
    fn rejects_each_bad_field() {
        let bad = |f: fn(&mut SonarConfig)| {
            let mut cfg = SonarConfig::default();
            f(&mut cfg);
            cfg.validate().unwrap_err()
        };
        assert!(matches!(bad(|c| c.channels = 0), SonarError::NoChannels));
        assert!(matches!(bad(|c| c.sample_rate_hz = 0), SonarError::InvalidSampleRate(0)));
        assert!(matches!(bad(|c| c.target_freq_hz = 0), SonarError::InvalidTargetFrequency(0)));
        assert!(
            matches!(bad(|c| c.target_freq_hz = 250_000), SonarError::TargetAboveNyquist {
                period: 1,
                ..
            })
        );
        assert!(matches!(bad(|c| c.num_periods = 0), SonarError::NoPeriods));
        assert!(matches!(bad(|c| c.chunk_capacity = 0), SonarError::NoChunkCapacity));
        assert!(matches!(bad(|c| c.threshold = f64::NAN), SonarError::InvalidThreshold(_)));
        assert!(matches!(bad(|c| c.threshold = -1.0), SonarError::InvalidThreshold(_)));
        assert!(
            matches!(bad(|c| c.min_samples_between_pings = 100), SonarError::ImplausibleBounds {
                ..
            })
        );
    }

    #[test]
    fn toml_overrides_only_given_keys() {
        let cfg = SonarConfig::from_toml_str(
            r#"
            channels = 2
            threshold = 1500.0
            window = "hamming"
            tdoa_method = "cross_correlation"
            "#
        ).unwrap();
        assert_eq!(cfg.channels, 2);
        assert_eq!(cfg.threshold, 1500.0);
        assert_eq!(cfg.window, WindowKind::Hamming);
        assert_eq!(cfg.tdoa_method, TdoaMethod::CrossCorrelation);
        assert_eq!(cfg.sample_rate_hz, SonarConfig::default().sample_rate_hz);
    }

    #[test]
    fn hann_weights_taper_to_zero() {
        let n = 16;
        assert!(WindowKind::Hann.weight(0, n).abs() < 1e-12);
        assert!((WindowKind::Hann.weight(n / 2, n) - 1.0).abs() < 1e-12);
        assert_eq!(WindowKind::Rectangular.weight(3, n), 1.0);
    }
}
