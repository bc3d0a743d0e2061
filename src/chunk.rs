//! Raw captures of a single ping on a single channel.

use crate::dft::AdcSample;

/// Why a capture ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Magnitude fell back to or below the threshold.
    EnvelopeEnded,
    /// The chunk hit its capacity while the ping was still loud.
    BufferFull,
    /// The listen window closed while the channel was still capturing.
    ListenTimeout,
}

/// A chunk still being filled. Lives inside the channel's capturing state.
#[derive(Debug)]
pub struct ChunkBuilder {
    channel: usize,
    start_index: u64,
    samples: Vec<AdcSample>,
    capacity: usize,
}

impl ChunkBuilder {
    pub fn new(channel: usize, start_index: u64, capacity: usize) -> Self {
        Self {
            channel,
            start_index,
            samples: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a sample unless the chunk is already full. Returns whether the
    /// sample was stored.
    pub fn push(&mut self, sample: AdcSample) -> bool {
        if self.is_full() {
            return false;
        }
        self.samples.push(sample);
        true
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn channel(&self) -> usize {
        self.channel
    }

    pub fn start_index(&self) -> u64 {
        self.start_index
    }

    pub fn finalize(self, reason: StopReason) -> Chunk {
        Chunk {
            channel: self.channel,
            start_index: self.start_index,
            truncated: reason == StopReason::BufferFull,
            stop_reason: reason,
            capacity: self.capacity,
            samples: self.samples,
        }
    }
}

/// A finalized capture. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    channel: usize,
    start_index: u64,
    samples: Vec<AdcSample>,
    capacity: usize,
    truncated: bool,
    stop_reason: StopReason,
}

impl Chunk {
    pub fn channel(&self) -> usize {
        self.channel
    }

    /// Global index of the first captured sample (the rising edge).
    pub fn start_index(&self) -> u64 {
        self.start_index
    }

    /// Global index one past the last captured sample.
    pub fn end_index(&self) -> u64 {
        self.start_index + (self.samples.len() as u64)
    }

    pub fn samples(&self) -> &[AdcSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The ping outlasted the buffer; the tail was not recorded.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn stop_reason(&self) -> StopReason {
        self.stop_reason
    }
}
