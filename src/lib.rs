//! Real-time ping detection and time-difference-of-arrival extraction for a
//! hydrophone array.
//!
//! Each channel runs a sliding single-bin DFT tuned to the pinger frequency.
//! When a ping crosses the detection threshold the raw samples are captured
//! into a chunk; once every channel has heard the ping (or the listen window
//! closes) the chunks are compared pairwise to produce sample offsets.

pub mod logger;
pub mod error;
pub mod config;
pub mod coefficients;
pub mod dft;
pub mod chunk;
pub mod channel;
pub mod analyzer;
pub mod controller;
pub mod source;
pub mod synth;

pub use analyzer::{ ChannelPair, ChunkAnalyzer, Tdoa, TdoaReport };
pub use channel::ChannelState;
pub use chunk::{ Chunk, StopReason };
pub use config::{ SonarConfig, TdoaMethod, WindowKind };
pub use controller::{ ChannelCounts, CycleOutcome, CycleReport, SonarController, SonarState };
pub use dft::AdcSample;
pub use error::{ SonarError, SonarResult };
pub use source::{ FrameSource, ReceiverSource, SampleSource };
pub use synth::PingSynth;
