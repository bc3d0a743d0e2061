//! Pending chunk store and pairwise TDOA estimation.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;

use realfft::num_complex::Complex;
use realfft::RealFftPlanner;

use crate::chunk::Chunk;
use crate::config::{ SonarConfig, TdoaMethod };
use crate::dft::AdcSample;

/// Unordered channel pair, stored with `a < b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelPair {
    pub a: usize,
    pub b: usize,
}

impl ChannelPair {
    pub fn new(x: usize, y: usize) -> Self {
        if x <= y { Self { a: x, b: y } } else { Self { a: y, b: x } }
    }
}

impl fmt::Display for ChannelPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.a, self.b)
    }
}

/// Arrival offset of channel `b` relative to channel `a` of a pair. Positive
/// means the ping reached `b` later.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tdoa {
    pub samples: i64,
    pub sample_rate_hz: u32,
    /// Normalized correlation peak when the estimate was refined.
    pub correlation: Option<f64>,
}

impl Tdoa {
    pub fn seconds(&self) -> f64 {
        (self.samples as f64) / (self.sample_rate_hz as f64)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TdoaReport {
    pairs: BTreeMap<ChannelPair, Tdoa>,
}

impl TdoaReport {
    pub fn get(&self, pair: ChannelPair) -> Option<&Tdoa> {
        self.pairs.get(&pair)
    }

    /// Offset of `y` relative to `x` in samples, whichever order they are given in.
    pub fn offset_samples(&self, x: usize, y: usize) -> Option<i64> {
        let tdoa = self.pairs.get(&ChannelPair::new(x, y))?;
        Some(if x <= y { tdoa.samples } else { -tdoa.samples })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ChannelPair, &Tdoa)> {
        self.pairs.iter()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Holds finalized chunks until the cycle is analyzed.
pub struct ChunkAnalyzer {
    old_chunks: Vec<Chunk>,
    max_samples_tdoa: u64,
    min_samples_between_pings: u64,
    sample_rate_hz: u32,
    method: TdoaMethod,
    planner: RealFftPlanner<f64>,
}

impl fmt::Debug for ChunkAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkAnalyzer")
            .field("old_chunks", &self.old_chunks.len())
            .field("max_samples_tdoa", &self.max_samples_tdoa)
            .field("min_samples_between_pings", &self.min_samples_between_pings)
            .field("method", &self.method)
            .finish()
    }
}

impl ChunkAnalyzer {
    pub fn new(config: &SonarConfig) -> Self {
        Self {
            old_chunks: Vec::new(),
            max_samples_tdoa: config.max_samples_tdoa,
            min_samples_between_pings: config.min_samples_between_pings,
            sample_rate_hz: config.sample_rate_hz,
            method: config.tdoa_method,
            planner: RealFftPlanner::new(),
        }
    }

    pub fn push(&mut self, chunk: Chunk) {
        self.old_chunks.push(chunk);
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.old_chunks
    }

    /// Drops chunks that started more than `min_samples_between_pings` before
    /// `now` and keeps only the newest chunk per channel. Returns how many
    /// were dropped.
    pub fn purge(&mut self, now: u64) -> usize {
        let before = self.old_chunks.len();
        let horizon = now.saturating_sub(self.min_samples_between_pings);
        self.old_chunks.retain(|c| c.start_index() >= horizon);

        self.old_chunks.sort_by_key(|c| (c.channel(), c.start_index()));
        let mut newest: Vec<Chunk> = Vec::with_capacity(self.old_chunks.len());
        for chunk in self.old_chunks.drain(..) {
            match newest.last_mut() {
                Some(last) if last.channel() == chunk.channel() => {
                    *last = chunk;
                }
                _ => newest.push(chunk),
            }
        }
        self.old_chunks = newest;
        before - self.old_chunks.len()
    }

    /// Pairwise offsets for every pair of channels holding a chunk. Pairs
    /// farther apart than `max_samples_tdoa` are left out.
    pub fn analyze(&mut self) -> TdoaReport {
        let mut report = TdoaReport::default();
        let max = self.max_samples_tdoa as i64;

        for i in 0..self.old_chunks.len() {
            for j in i + 1..self.old_chunks.len() {
                let (first, second) = (&self.old_chunks[i], &self.old_chunks[j]);
                if first.channel() == second.channel() {
                    continue;
                }
                let (ca, cb) = if first.channel() < second.channel() {
                    (first, second)
                } else {
                    (second, first)
                };
                let onset = (cb.start_index() as i64) - (ca.start_index() as i64);

                let (samples, correlation) = match self.method {
                    TdoaMethod::Onset => (onset, None),
                    TdoaMethod::CrossCorrelation => {
                        // total offset onset + r must stay within ±max
                        let lags = -max - onset..=max - onset;
                        match
                            correlation_lag(&mut self.planner, ca.samples(), cb.samples(), lags)
                        {
                            Some((r, score)) => (onset + r, Some(score)),
                            None => (onset, None),
                        }
                    }
                };

                if samples.abs() > max {
                    continue;
                }
                report.pairs.insert(ChannelPair::new(ca.channel(), cb.channel()), Tdoa {
                    samples,
                    sample_rate_hz: self.sample_rate_hz,
                    correlation,
                });
            }
        }
        report
    }
}

/// Lag `r` within `lags` maximizing `sum_u x[u] * y[u + r]` of the
/// mean-removed waveforms, with the peak normalized to [-1, 1]. `None` when
/// either waveform is flat or no lag in range overlaps both.
pub fn correlation_lag(
    planner: &mut RealFftPlanner<f64>,
    x: &[AdcSample],
    y: &[AdcSample],
    lags: RangeInclusive<i64>
) -> Option<(i64, f64)> {
    if x.is_empty() || y.is_empty() {
        return None;
    }
    let lo = (*lags.start()).max(-((x.len() as i64) - 1));
    let hi = (*lags.end()).min((y.len() as i64) - 1);
    if lo > hi {
        return None;
    }

    let centered = |v: &[AdcSample]| -> Vec<f64> {
        let mean = v.iter().map(|&s| s as f64).sum::<f64>() / (v.len() as f64);
        v.iter().map(|&s| (s as f64) - mean).collect()
    };
    let xs = centered(x);
    let ys = centered(y);
    let ex: f64 = xs.iter().map(|v| v * v).sum();
    let ey: f64 = ys.iter().map(|v| v * v).sum();
    if ex <= 0.0 || ey <= 0.0 {
        return None;
    }

    let n = (x.len() + y.len()).next_power_of_two();
    let forward = planner.plan_fft_forward(n);
    let inverse = planner.plan_fft_inverse(n);

    let spectrum = |samples: &[f64]| -> Option<Vec<Complex<f64>>> {
        let mut input = forward.make_input_vec();
        input[..samples.len()].copy_from_slice(samples);
        let mut output = forward.make_output_vec();
        forward.process(&mut input, &mut output).ok()?;
        Some(output)
    };
    let xf = spectrum(&xs)?;
    let yf = spectrum(&ys)?;

    let mut cross: Vec<Complex<f64>> = xf
        .iter()
        .zip(&yf)
        .map(|(a, b)| a.conj() * *b)
        .collect();
    // DC and Nyquist bins of a real signal's spectrum are real
    let last = cross.len() - 1;
    cross[0].im = 0.0;
    cross[last].im = 0.0;

    let mut corr = inverse.make_output_vec();
    inverse.process(&mut cross, &mut corr).ok()?;

    let scale = (n as f64) * (ex * ey).sqrt();
    let mut best: Option<(i64, f64)> = None;
    for r in lo..=hi {
        let idx = if r >= 0 { r as usize } else { ((n as i64) + r) as usize };
        let score = corr[idx] / scale;
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((r, score));
        }
    }
    best
}
