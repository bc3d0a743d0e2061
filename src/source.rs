//! Where sample frames come from.
//!
//! A frame is one sample per channel for a single sample tick. The ADC driver
//! is outside this crate; these sources cover in-memory buffers and a bounded
//! queue filled by another thread.

use crossbeam_channel::Receiver;

use crate::dft::AdcSample;

pub trait SampleSource {
    /// Fills `frame` with the next tick's samples. Returns false once the
    /// source is exhausted; `frame` is then left untouched.
    fn next_frame(&mut self, frame: &mut [AdcSample]) -> bool;
}

/// Per-channel sample vectors played back in lockstep. Shorter channels read
/// as zero once they run out.
#[derive(Debug, Clone)]
pub struct FrameSource {
    channels: Vec<Vec<AdcSample>>,
    len: usize,
    pos: usize,
}

impl FrameSource {
    pub fn new(channels: Vec<Vec<AdcSample>>) -> Self {
        let len = channels.iter().map(Vec::len).max().unwrap_or(0);
        Self { channels, len, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.len - self.pos
    }
}

impl SampleSource for FrameSource {
    fn next_frame(&mut self, frame: &mut [AdcSample]) -> bool {
        if self.pos >= self.len {
            return false;
        }
        for (ch, slot) in frame.iter_mut().enumerate() {
            *slot = self.channels
                .get(ch)
                .and_then(|v| v.get(self.pos))
                .copied()
                .unwrap_or(0);
        }
        self.pos += 1;
        true
    }
}

/// Interleaved blocks (`frames * channels` samples each) arriving over a
/// bounded channel, e.g. from an audio callback. Ends when every sender is
/// dropped.
pub struct ReceiverSource {
    rx: Receiver<Vec<AdcSample>>,
    channels: usize,
    block: Vec<AdcSample>,
    pos: usize,
    frames_read: u64,
}

impl ReceiverSource {
    pub fn new(rx: Receiver<Vec<AdcSample>>, channels: usize) -> Self {
        Self {
            rx,
            channels: channels.max(1),
            block: Vec::new(),
            pos: 0,
            frames_read: 0,
        }
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }
}

impl SampleSource for ReceiverSource {
    fn next_frame(&mut self, frame: &mut [AdcSample]) -> bool {
        while self.pos + self.channels > self.block.len() {
            match self.rx.recv() {
                Ok(block) => {
                    self.block = block;
                    self.pos = 0;
                }
                Err(_) => {
                    return false;
                }
            }
        }
        let src = &self.block[self.pos..self.pos + self.channels];
        for (slot, value) in frame.iter_mut().zip(src.iter().chain(std::iter::repeat(&0))) {
            *slot = *value;
        }
        self.pos += self.channels;
        self.frames_read += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn frame_source_pads_short_channels() {
        let mut src = FrameSource::new(vec![vec![1, 2, 3], vec![9]]);
        let mut frame = [0; 2];
        assert!(src.next_frame(&mut frame));
        assert_eq!(frame, [1, 9]);
        assert!(src.next_frame(&mut frame));
        assert_eq!(frame, [2, 0]);
        assert!(src.next_frame(&mut frame));
        assert_eq!(src.remaining(), 0);
        assert!(!src.next_frame(&mut frame));
        assert_eq!(frame, [3, 0]);
    }

    #[test]
    fn receiver_source_deinterleaves_across_blocks() {
        let (tx, rx) = bounded(4);
        tx.send(vec![1, 10, 2]).unwrap();
        tx.send(vec![20, 3, 30]).unwrap();
        drop(tx);

        let mut src = ReceiverSource::new(rx, 2);
        let mut frame = [0; 2];
        assert!(src.next_frame(&mut frame));
        assert_eq!(frame, [1, 10]);
        // the partial frame at the end of the first block is dropped
        assert!(src.next_frame(&mut frame));
        assert_eq!(frame, [20, 3]);
        assert!(!src.next_frame(&mut frame));
        assert_eq!(src.frames_read(), 2);
    }
}
