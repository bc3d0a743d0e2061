//! Per-hydrophone capture state machine.

use std::fmt;
use std::sync::Arc;

use crate::chunk::{ Chunk, ChunkBuilder, StopReason };
use crate::coefficients::Coefficients;
use crate::dft::{ AdcSample, SlidingDft };

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
    /// Not waiting for a ping: the system is asleep, or this channel already
    /// captured one.
    Sleeping,
    /// Waiting for a rising edge.
    Listening,
    /// Logging samples until the envelope drops or the chunk fills.
    Capturing,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChannelState::Sleeping => "sleeping",
            ChannelState::Listening => "listening",
            ChannelState::Capturing => "capturing",
        };
        f.write_str(s)
    }
}

/// What a channel does with the current sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelAction {
    Idle,
    StartCapture,
    Append,
    StopCapture(StopReason),
}

/// Per-sample transition rule. `exceeds` is the detection test on the
/// updated magnitude, `chunk_full` the state of the chunk before this sample.
pub fn channel_action(state: ChannelState, exceeds: bool, chunk_full: bool) -> ChannelAction {
    match state {
        ChannelState::Sleeping => ChannelAction::Idle,
        ChannelState::Listening if exceeds => ChannelAction::StartCapture,
        ChannelState::Listening => ChannelAction::Idle,
        ChannelState::Capturing if !exceeds => ChannelAction::StopCapture(StopReason::EnvelopeEnded),
        ChannelState::Capturing if chunk_full => ChannelAction::StopCapture(StopReason::BufferFull),
        ChannelState::Capturing => ChannelAction::Append,
    }
}

/// Side effects a channel reports back to the controller.
#[derive(Debug)]
pub enum ChannelEvent {
    /// `Listening -> Capturing` at this global index.
    RisingEdge {
        index: u64,
    },
    /// `Capturing -> Sleeping` with the finalized chunk.
    CaptureFinished(Chunk),
}

#[derive(Debug)]
enum Phase {
    Sleeping,
    Listening,
    Capturing(ChunkBuilder),
}

#[derive(Debug)]
pub struct Channel {
    id: usize,
    dft: SlidingDft,
    phase: Phase,
    chunk_capacity: usize,
}

impl Channel {
    pub fn new(id: usize, coefs: Arc<Coefficients>, chunk_capacity: usize) -> Self {
        Self {
            id,
            dft: SlidingDft::new(coefs),
            phase: Phase::Sleeping,
            chunk_capacity,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> ChannelState {
        match self.phase {
            Phase::Sleeping => ChannelState::Sleeping,
            Phase::Listening => ChannelState::Listening,
            Phase::Capturing(_) => ChannelState::Capturing,
        }
    }

    pub fn magnitude(&self) -> f64 {
        self.dft.magnitude()
    }

    pub fn dft(&self) -> &SlidingDft {
        &self.dft
    }

    /// Samples held by the in-progress chunk, if capturing.
    pub fn capture_len(&self) -> Option<usize> {
        match &self.phase {
            Phase::Capturing(b) => Some(b.len()),
            _ => None,
        }
    }

    pub fn exceeds_threshold(&self, threshold: f64) -> bool {
        self.dft.magnitude() > threshold
    }

    /// Feeds one sample through the DFT and, when `detecting`, through the
    /// capture state machine.
    pub fn step(
        &mut self,
        index: u64,
        sample: AdcSample,
        threshold: f64,
        detecting: bool
    ) -> Option<ChannelEvent> {
        self.dft.update(sample);
        if !detecting {
            return None;
        }

        let full = matches!(&self.phase, Phase::Capturing(b) if b.is_full());
        match channel_action(self.state(), self.exceeds_threshold(threshold), full) {
            ChannelAction::Idle => None,
            ChannelAction::StartCapture => {
                let mut builder = ChunkBuilder::new(self.id, index, self.chunk_capacity);
                builder.push(sample);
                self.phase = Phase::Capturing(builder);
                Some(ChannelEvent::RisingEdge { index })
            }
            ChannelAction::Append => {
                if let Phase::Capturing(builder) = &mut self.phase {
                    builder.push(sample);
                }
                None
            }
            ChannelAction::StopCapture(reason) => {
                self.finish(reason).map(ChannelEvent::CaptureFinished)
            }
        }
    }

    /// `Sleeping -> Listening`. Returns false if the channel was not asleep.
    pub fn wake(&mut self) -> bool {
        if matches!(self.phase, Phase::Sleeping) {
            self.phase = Phase::Listening;
            true
        } else {
            false
        }
    }

    /// Puts the channel to sleep, finalizing a capture in progress.
    pub fn sleep(&mut self, reason: StopReason) -> Option<Chunk> {
        match self.phase {
            Phase::Capturing(_) => self.finish(reason),
            _ => {
                self.phase = Phase::Sleeping;
                None
            }
        }
    }

    /// Puts the channel to sleep, dropping a capture in progress. Returns
    /// whether a capture was discarded.
    pub fn abort(&mut self) -> bool {
        let was_capturing = matches!(self.phase, Phase::Capturing(_));
        self.phase = Phase::Sleeping;
        was_capturing
    }

    fn finish(&mut self, reason: StopReason) -> Option<Chunk> {
        match std::mem::replace(&mut self.phase, Phase::Sleeping) {
            Phase::Capturing(builder) => Some(builder.finalize(reason)),
            _ => None,
        }
    }
}
