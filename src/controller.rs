//! System-wide listen/sleep cycle.
//!
//! The controller is single-shot: `go` wakes every channel, feeds samples
//! until every channel has captured a ping or the listen window closes, then
//! analyzes the captured chunks and stays asleep.

use std::fmt;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::Arc;

use crate::analyzer::{ ChunkAnalyzer, TdoaReport };
use crate::channel::{ Channel, ChannelEvent, ChannelState };
use crate::chunk::{ Chunk, StopReason };
use crate::coefficients::Coefficients;
use crate::config::SonarConfig;
use crate::dft::AdcSample;
use crate::error::SonarResult;
use crate::logger::Logger;
use crate::source::SampleSource;
use crate::{ log_debug, log_info, log_warn };

const COMPONENT: &str = "controller";

/// State of the whole sonar system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SonarState {
    /// On and initialized but not in use (on the crane, before launch).
    Disabled,
    /// Learning the ping interval. Not used by the single-shot cycle.
    Training,
    /// Active but not listening; analysis happens here.
    Sleeping,
    /// Listening for pings on every channel.
    Listening,
    /// Active without ADC data (vehicle out of the water). Not used by the
    /// single-shot cycle.
    Idle,
}

impl fmt::Display for SonarState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SonarState::Disabled => "disabled",
            SonarState::Training => "training",
            SonarState::Sleeping => "sleeping",
            SonarState::Listening => "listening",
            SonarState::Idle => "idle",
        };
        f.write_str(s)
    }
}

/// Number of channels in each channel state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelCounts {
    pub sleeping: usize,
    pub listening: usize,
    pub capturing: usize,
}

impl ChannelCounts {
    pub fn all_sleeping(n: usize) -> Self {
        Self { sleeping: n, listening: 0, capturing: 0 }
    }

    pub fn total(&self) -> usize {
        self.sleeping + self.listening + self.capturing
    }

    fn slot(&mut self, state: ChannelState) -> &mut usize {
        match state {
            ChannelState::Sleeping => &mut self.sleeping,
            ChannelState::Listening => &mut self.listening,
            ChannelState::Capturing => &mut self.capturing,
        }
    }

    fn transfer(&mut self, from: ChannelState, to: ChannelState) {
        *self.slot(from) -= 1;
        *self.slot(to) += 1;
    }
}

/// How a listen window ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Every channel captured a ping.
    AllCaptured,
    /// The listen window closed first.
    ListenTimeout,
    /// The sample source ran dry while listening.
    SourceExhausted,
    /// Cancelled from outside; captures in progress were dropped.
    Aborted,
    /// `go` found the controller outside `Sleeping` and did not listen.
    NotArmed,
}

/// Result of one detect/capture/correlate cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    pub chunks: Vec<Chunk>,
    pub tdoas: TdoaReport,
    pub rising_edge: Option<u64>,
    pub samples_processed: u64,
}

impl CycleReport {
    pub fn chunk_for(&self, channel: usize) -> Option<&Chunk> {
        self.chunks.iter().find(|c| c.channel() == channel)
    }
}

/// Global transition rule, evaluated after every sample while listening.
pub fn sleep_trigger(
    state: SonarState,
    counts: ChannelCounts,
    listen_time_is_up: bool
) -> Option<CycleOutcome> {
    if state != SonarState::Listening {
        return None;
    }
    if counts.listening == 0 && counts.capturing == 0 {
        return Some(CycleOutcome::AllCaptured);
    }
    if listen_time_is_up {
        return Some(CycleOutcome::ListenTimeout);
    }
    None
}

pub struct SonarController {
    config: SonarConfig,
    coefs: Arc<Coefficients>,
    channels: Vec<Channel>,
    counts: ChannelCounts,
    state: SonarState,
    sample_index: u64,
    index_of_last_rising_edge: Option<u64>,
    index_of_last_wake: u64,
    analyzer: ChunkAnalyzer,
    outcome: Option<CycleOutcome>,
    report: Option<CycleReport>,
    cancel: Arc<AtomicBool>,
    logger: Option<Arc<Logger>>,
}

impl fmt::Debug for SonarController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SonarController")
            .field("state", &self.state)
            .field("counts", &self.counts)
            .field("sample_index", &self.sample_index)
            .field("rising_edge", &self.index_of_last_rising_edge)
            .field("analyzer", &self.analyzer)
            .finish_non_exhaustive()
    }
}

impl SonarController {
    pub fn new(config: SonarConfig) -> SonarResult<Self> {
        let coefs = Arc::new(Coefficients::from_config(&config)?);
        let channels = (0..config.channels)
            .map(|id| Channel::new(id, coefs.clone(), config.chunk_capacity))
            .collect();
        Ok(Self {
            counts: ChannelCounts::all_sleeping(config.channels),
            analyzer: ChunkAnalyzer::new(&config),
            config,
            coefs,
            channels,
            state: SonarState::Sleeping,
            sample_index: 0,
            index_of_last_rising_edge: None,
            index_of_last_wake: 0,
            outcome: None,
            report: None,
            cancel: Arc::new(AtomicBool::new(false)),
            logger: None,
        })
    }

    pub fn with_logger(mut self, logger: Arc<Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Flag another thread can raise to abort the running cycle.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn config(&self) -> &SonarConfig {
        &self.config
    }

    pub fn coefficients(&self) -> &Coefficients {
        &self.coefs
    }

    pub fn window_length(&self) -> usize {
        self.coefs.window_length()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn state(&self) -> SonarState {
        self.state
    }

    pub fn channel_state(&self, channel: usize) -> Option<ChannelState> {
        self.channels.get(channel).map(Channel::state)
    }

    pub fn mag(&self, channel: usize) -> Option<f64> {
        self.channels.get(channel).map(Channel::magnitude)
    }

    pub fn channel_counts(&self) -> ChannelCounts {
        self.counts
    }

    /// Global index of the next sample to arrive.
    pub fn sample_index(&self) -> u64 {
        self.sample_index
    }

    pub fn rising_edge(&self) -> Option<u64> {
        self.index_of_last_rising_edge
    }

    pub fn index_of_last_wake(&self) -> u64 {
        self.index_of_last_wake
    }

    pub fn outcome(&self) -> Option<CycleOutcome> {
        self.outcome
    }

    /// Finalized chunks waiting for analysis.
    pub fn pending_chunks(&self) -> &[Chunk] {
        self.analyzer.chunks()
    }

    /// Feeds one sample per channel. Values beyond the channel count are
    /// ignored and missing channels read as zero.
    pub fn receive_sample(&mut self, frame: &[AdcSample]) {
        let index = self.sample_index;
        let detecting = self.state == SonarState::Listening;
        let threshold = self.config.threshold;

        for (ch, channel) in self.channels.iter_mut().enumerate() {
            let sample = frame.get(ch).copied().unwrap_or(0);
            match channel.step(index, sample, threshold, detecting) {
                None => {}
                Some(ChannelEvent::RisingEdge { index }) => {
                    self.counts.transfer(ChannelState::Listening, ChannelState::Capturing);
                    if self.index_of_last_rising_edge.is_none() {
                        self.index_of_last_rising_edge = Some(index);
                    }
                    if let Some(log) = &self.logger {
                        let _ = log_debug!(
                            log,
                            COMPONENT,
                            "channel {} rising edge at {} (mag {:.1})",
                            ch,
                            index,
                            channel.magnitude()
                        );
                    }
                }
                Some(ChannelEvent::CaptureFinished(chunk)) => {
                    self.counts.transfer(ChannelState::Capturing, ChannelState::Sleeping);
                    if let Some(log) = &self.logger {
                        let _ = log_debug!(
                            log,
                            COMPONENT,
                            "channel {} captured {} samples from {} ({:?})",
                            ch,
                            chunk.len(),
                            chunk.start_index(),
                            chunk.stop_reason()
                        );
                    }
                    self.analyzer.push(chunk);
                }
            }
        }
        debug_assert_eq!(self.counts.total(), self.channels.len());

        self.sample_index += 1;

        if let Some(outcome) = sleep_trigger(self.state, self.counts, self.listen_time_is_up()) {
            self.sleep(outcome);
        }
    }

    /// True once more than `max_samples_to_wait_for_first_ping` samples have
    /// been received since the last wake.
    pub fn listen_time_is_up(&self) -> bool {
        let since_wake = self.sample_index.saturating_sub(self.index_of_last_wake);
        since_wake > self.config.max_samples_to_wait_for_first_ping
    }

    /// `Sleeping -> Listening`. Returns false when the controller was in any
    /// other state.
    pub fn wake(&mut self) -> bool {
        if self.state != SonarState::Sleeping {
            if let Some(log) = &self.logger {
                let _ = log_warn!(log, COMPONENT, "wake ignored in state {}", self.state);
            }
            return false;
        }
        for channel in &mut self.channels {
            if channel.wake() {
                self.counts.transfer(ChannelState::Sleeping, ChannelState::Listening);
            }
        }
        self.index_of_last_wake = self.sample_index;
        self.index_of_last_rising_edge = None;
        self.outcome = None;
        self.state = SonarState::Listening;
        if let Some(log) = &self.logger {
            let _ = log_info!(
                log,
                COMPONENT,
                "listening on {} channels at sample {} (window {} samples, {:.1} Hz)",
                self.channels.len(),
                self.sample_index,
                self.coefs.window_length(),
                self.coefs.bin_frequency_hz()
            );
        }
        true
    }

    /// `Listening -> Sleeping`. Captures still running are finalized.
    pub fn sleep(&mut self, outcome: CycleOutcome) {
        for channel in &mut self.channels {
            let before = channel.state();
            if let Some(chunk) = channel.sleep(StopReason::ListenTimeout) {
                self.analyzer.push(chunk);
            }
            if before != ChannelState::Sleeping {
                self.counts.transfer(before, ChannelState::Sleeping);
            }
        }
        self.state = SonarState::Sleeping;
        self.outcome = Some(outcome);
        if let Some(log) = &self.logger {
            let _ = log_info!(
                log,
                COMPONENT,
                "sleeping at sample {} ({:?}, {} chunk(s) pending)",
                self.sample_index,
                outcome,
                self.analyzer.chunks().len()
            );
        }
    }

    /// Forces every channel to sleep, dropping captures in progress. A
    /// listening system goes back to `Sleeping`; any other state is kept.
    pub fn abort(&mut self) {
        let discarded = self.channels
            .iter_mut()
            .map(Channel::abort)
            .filter(|&dropped| dropped)
            .count();
        self.counts = ChannelCounts::all_sleeping(self.channels.len());
        if self.state == SonarState::Listening {
            self.outcome = Some(CycleOutcome::Aborted);
            self.state = SonarState::Sleeping;
        }
        if let Some(log) = &self.logger {
            let _ = log_warn!(
                log,
                COMPONENT,
                "aborted at sample {}, {} capture(s) discarded",
                self.sample_index,
                discarded
            );
        }
    }

    /// Forces the system into `Disabled`. The DFT keeps tracking, nothing is
    /// captured until a new controller is built.
    pub fn disable(&mut self) {
        self.abort();
        self.state = SonarState::Disabled;
    }

    /// Purges stale chunks and computes the pairwise offsets for the
    /// chunks of the last listen window.
    pub fn analyze(&mut self) -> CycleReport {
        let dropped = self.analyzer.purge(self.sample_index);
        let tdoas = self.analyzer.analyze();
        if let Some(log) = &self.logger {
            let _ = log_info!(
                log,
                COMPONENT,
                "analyzed {} chunk(s) ({} purged), {} pair(s)",
                self.analyzer.chunks().len(),
                dropped,
                tdoas.len()
            );
            for (pair, tdoa) in tdoas.iter() {
                let _ = log_info!(
                    log,
                    COMPONENT,
                    "tdoa {}: {} samples ({:.6} s)",
                    pair,
                    tdoa.samples,
                    tdoa.seconds()
                );
            }
        }
        CycleReport {
            outcome: self.outcome.unwrap_or(CycleOutcome::NotArmed),
            chunks: self.analyzer.chunks().to_vec(),
            tdoas,
            rising_edge: self.index_of_last_rising_edge,
            samples_processed: self.sample_index,
        }
    }

    /// Runs one wake/listen/capture/sleep/analyze cycle, pulling frames from
    /// `source`. Blocks until the cycle ends. Later calls return the first
    /// cycle's report without listening again.
    pub fn go<S: SampleSource + ?Sized>(&mut self, source: &mut S) -> CycleReport {
        if let Some(report) = &self.report {
            if let Some(log) = &self.logger {
                let _ = log_warn!(log, COMPONENT, "single-shot cycle already ran");
            }
            return report.clone();
        }

        self.wake();
        let mut frame: Vec<AdcSample> = vec![0; self.channels.len()];
        while self.state == SonarState::Listening {
            if self.cancel.load(Ordering::SeqCst) {
                self.abort();
                break;
            }
            if !source.next_frame(&mut frame) {
                self.sleep(CycleOutcome::SourceExhausted);
                break;
            }
            self.receive_sample(&frame);
        }

        let report = self.analyze();
        self.report = Some(report.clone());
        report
    }
}
