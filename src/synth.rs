//! Synthetic multichannel ping recordings for dry runs and tests.

use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{ Distribution, Normal };

use crate::dft::AdcSample;

/// One tone burst on one channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Burst {
    pub channel: usize,
    /// Index of the first burst sample.
    pub start: u64,
    pub length: usize,
    pub amplitude: f64,
}

/// Renders tone bursts at `freq_hz` into per-channel sample vectors.
///
/// Each burst's phase is taken relative to its own start, so two bursts with
/// the same length and amplitude are identical apart from their offset.
#[derive(Debug, Clone)]
pub struct PingSynth {
    sample_rate_hz: u32,
    freq_hz: f64,
    channels: usize,
    total_samples: usize,
    bursts: Vec<Burst>,
    noise_sigma: f64,
    seed: u64,
}

impl PingSynth {
    pub fn new(sample_rate_hz: u32, freq_hz: f64, channels: usize, total_samples: usize) -> Self {
        Self {
            sample_rate_hz,
            freq_hz,
            channels,
            total_samples,
            bursts: Vec::new(),
            noise_sigma: 0.0,
            seed: 0,
        }
    }

    /// Adds white Gaussian noise with standard deviation `sigma` (in ADC
    /// counts) to every channel.
    pub fn with_noise(mut self, sigma: f64, seed: u64) -> Self {
        self.noise_sigma = sigma;
        self.seed = seed;
        self
    }

    pub fn burst(mut self, channel: usize, start: u64, length: usize, amplitude: f64) -> Self {
        self.bursts.push(Burst { channel, start, length, amplitude });
        self
    }

    pub fn render(&self) -> Vec<Vec<AdcSample>> {
        let mut out = vec![vec![0.0f64; self.total_samples]; self.channels];
        let step = (2.0 * PI * self.freq_hz) / (self.sample_rate_hz as f64);

        for burst in &self.bursts {
            let Some(buf) = out.get_mut(burst.channel) else {
                continue;
            };
            let start = burst.start as usize;
            let end = start.saturating_add(burst.length).min(buf.len());
            for (i, slot) in buf.iter_mut().enumerate().take(end).skip(start) {
                *slot += burst.amplitude * (step * ((i - start) as f64)).sin();
            }
        }

        if self.noise_sigma > 0.0 {
            if let Ok(normal) = Normal::new(0.0, self.noise_sigma) {
                let mut rng = StdRng::seed_from_u64(self.seed);
                for buf in &mut out {
                    for slot in buf.iter_mut() {
                        *slot += normal.sample(&mut rng);
                    }
                }
            }
        }

        out.into_iter()
            .map(|buf|
                buf
                    .into_iter()
                    .map(|v| v.round() as AdcSample)
                    .collect()
            )
            .collect()
    }
}
