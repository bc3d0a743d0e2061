//! Construction-time errors.
//!
//! Only controller construction and configuration loading can fail. The
//! per-sample path never returns an error.

use std::path::PathBuf;

pub type SonarResult<T> = Result<T, SonarError>;

#[derive(Debug, thiserror::Error)]
pub enum SonarError {
    #[error("channel count must be at least 1")]
    NoChannels,

    #[error("sample rate must be positive, got {0} Hz")]
    InvalidSampleRate(u32),

    #[error("target frequency must be positive, got {0} Hz")]
    InvalidTargetFrequency(u32),

    #[error("target frequency {target_hz} Hz leaves {period} samples per period at {sample_rate_hz} Hz (need at least 2)")]
    TargetAboveNyquist {
        target_hz: u32,
        sample_rate_hz: u32,
        period: usize,
    },

    #[error("number of periods per window must be at least 1")]
    NoPeriods,

    #[error("chunk capacity must be at least 1 sample")]
    NoChunkCapacity,

    #[error("detection threshold must be finite and positive, got {0}")]
    InvalidThreshold(f64),

    #[error(
        "min samples between pings ({min_between}) must exceed max samples TDOA ({max_tdoa})"
    )]
    ImplausibleBounds {
        max_tdoa: u64,
        min_between: u64,
    },

    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },
}
