use approx::assert_relative_eq;
use rand::rngs::StdRng;
use rand::{ Rng, SeedableRng };

use sonar_tdoa::{
    ChannelCounts,
    ChannelState,
    CycleOutcome,
    FrameSource,
    PingSynth,
    SonarConfig,
    SonarController,
    SonarState,
    StopReason,
    TdoaMethod,
};

const SR: u32 = 48_000;
const TARGET: u32 = 4_000;

fn config(channels: usize) -> SonarConfig {
    SonarConfig {
        channels,
        sample_rate_hz: SR,
        target_freq_hz: TARGET,
        num_periods: 8,
        threshold: 5_000.0,
        chunk_capacity: 2_048,
        max_samples_tdoa: 100,
        min_samples_between_pings: 48_000,
        max_samples_to_wait_for_first_ping: 24_000,
        ..SonarConfig::default()
    }
}

fn synth(channels: usize, total: usize) -> PingSynth {
    PingSynth::new(SR, TARGET as f64, channels, total)
}

fn counts_from_states(c: &SonarController) -> ChannelCounts {
    let mut counts = ChannelCounts::default();
    for ch in 0..c.channel_count() {
        match c.channel_state(ch) {
            Some(ChannelState::Sleeping) => {
                counts.sleeping += 1;
            }
            Some(ChannelState::Listening) => {
                counts.listening += 1;
            }
            Some(ChannelState::Capturing) => {
                counts.capturing += 1;
            }
            None => unreachable!(),
        }
    }
    counts
}

#[test]
fn two_channels_report_the_arrival_offset() -> anyhow::Result<()> {
    let data = synth(2, 6_000).burst(0, 1_000, 600, 1_000.0).burst(1, 1_050, 600, 1_000.0).render();
    let mut controller = SonarController::new(config(2))?;
    let report = controller.go(&mut FrameSource::new(data));

    assert_eq!(report.outcome, CycleOutcome::AllCaptured);
    assert_eq!(controller.state(), SonarState::Sleeping);
    assert_eq!(report.chunks.len(), 2);

    let first = report.chunk_for(0).expect("chunk on channel 0");
    let second = report.chunk_for(1).expect("chunk on channel 1");
    assert_eq!(second.start_index() - first.start_index(), 50);
    assert_eq!(report.rising_edge, Some(first.start_index()));
    assert_eq!(first.stop_reason(), StopReason::EnvelopeEnded);

    assert_eq!(report.tdoas.len(), 1);
    assert_eq!(report.tdoas.offset_samples(0, 1), Some(50));
    assert_eq!(report.tdoas.offset_samples(1, 0), Some(-50));
    let tdoa = report.tdoas.iter().next().map(|(_, t)| *t).expect("one pair");
    assert_relative_eq!(tdoa.seconds(), 50.0 / (SR as f64));
    Ok(())
}

#[test]
fn ping_on_one_channel_gives_no_pair() -> anyhow::Result<()> {
    let data = synth(2, 40_000).burst(0, 1_000, 600, 1_000.0).render();
    let mut controller = SonarController::new(config(2))?;
    let report = controller.go(&mut FrameSource::new(data));

    assert_eq!(report.outcome, CycleOutcome::ListenTimeout);
    assert_eq!(controller.state(), SonarState::Sleeping);
    assert!(report.chunk_for(0).is_some());
    assert!(report.chunk_for(1).is_none());
    assert!(report.tdoas.is_empty());
    assert_eq!(controller.channel_counts(), ChannelCounts::all_sleeping(2));
    // the silent channel keeps the window open for the whole wait
    assert_eq!(report.samples_processed, 24_001);
    Ok(())
}

#[test]
fn long_ping_is_truncated_at_capacity() -> anyhow::Result<()> {
    let cfg = SonarConfig { chunk_capacity: 256, ..config(2) };
    let data = synth(2, 8_000).burst(0, 1_000, 3_000, 1_000.0).burst(1, 1_030, 3_000, 1_000.0).render();
    let mut controller = SonarController::new(cfg)?;
    let report = controller.go(&mut FrameSource::new(data));

    assert_eq!(report.outcome, CycleOutcome::AllCaptured);
    for chunk in &report.chunks {
        assert_eq!(chunk.len(), 256);
        assert!(chunk.is_truncated());
        assert_eq!(chunk.stop_reason(), StopReason::BufferFull);
    }
    assert_eq!(controller.channel_state(0), Some(ChannelState::Sleeping));
    assert_eq!(controller.channel_state(1), Some(ChannelState::Sleeping));
    assert_eq!(report.tdoas.offset_samples(0, 1), Some(30));
    Ok(())
}

#[test]
fn silence_times_out_with_no_chunks() -> anyhow::Result<()> {
    let data = vec![vec![0; 30_000]; 2];
    let mut controller = SonarController::new(config(2))?;
    let report = controller.go(&mut FrameSource::new(data));

    assert_eq!(report.outcome, CycleOutcome::ListenTimeout);
    assert_eq!(controller.state(), SonarState::Sleeping);
    assert!(report.chunks.is_empty());
    assert!(report.rising_edge.is_none());
    assert_eq!(report.samples_processed, 24_001);
    Ok(())
}

#[test]
fn channel_counts_match_channel_states_every_sample() -> anyhow::Result<()> {
    let data = synth(3, 5_000)
        .burst(0, 1_000, 400, 1_000.0)
        .burst(1, 1_060, 400, 1_000.0)
        .burst(2, 1_090, 400, 1_000.0)
        .render();
    let mut controller = SonarController::new(config(3))?;
    assert_eq!(counts_from_states(&controller), controller.channel_counts());

    controller.wake();
    let mut source = FrameSource::new(data);
    let mut frame = [0; 3];
    let mut saw_capture = false;
    while controller.state() == SonarState::Listening {
        assert!(sonar_tdoa::SampleSource::next_frame(&mut source, &mut frame));
        controller.receive_sample(&frame);
        let counts = controller.channel_counts();
        assert_eq!(counts, counts_from_states(&controller));
        assert_eq!(counts.total(), 3);
        saw_capture |= counts.capturing > 0;
    }
    assert!(saw_capture);
    assert_eq!(controller.outcome(), Some(CycleOutcome::AllCaptured));
    assert_eq!(controller.pending_chunks().len(), 3);
    Ok(())
}

#[test]
fn offsets_never_exceed_the_plausible_bound() -> anyhow::Result<()> {
    // 200 samples apart: both capture, the pair is rejected
    let data = synth(2, 6_000).burst(0, 1_000, 600, 1_000.0).burst(1, 1_200, 600, 1_000.0).render();
    let mut controller = SonarController::new(config(2))?;
    let report = controller.go(&mut FrameSource::new(data));
    assert_eq!(report.chunks.len(), 2);
    assert!(report.tdoas.is_empty());

    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..5 {
        let delays: Vec<u64> = (0..3).map(|_| rng.random_range(0..=100)).collect();
        let mut s = synth(3, 6_000);
        for (ch, d) in delays.iter().enumerate() {
            s = s.burst(ch, 1_000 + d, 600, 1_000.0);
        }
        let mut controller = SonarController::new(config(3))?;
        let report = controller.go(&mut FrameSource::new(s.render()));
        assert_eq!(report.tdoas.len(), 3);
        for (pair, tdoa) in report.tdoas.iter() {
            assert!(tdoa.samples.unsigned_abs() <= 100);
            let expected = (delays[pair.b] as i64) - (delays[pair.a] as i64);
            assert_eq!(tdoa.samples, expected);
        }
    }
    Ok(())
}

#[test]
fn cross_correlation_recovers_offset_under_noise() -> anyhow::Result<()> {
    let cfg = SonarConfig { tdoa_method: TdoaMethod::CrossCorrelation, ..config(2) };
    let data = synth(2, 6_000)
        .burst(0, 1_000, 600, 1_000.0)
        .burst(1, 1_037, 600, 1_000.0)
        .with_noise(50.0, 3)
        .render();
    let mut controller = SonarController::new(cfg)?;
    let report = controller.go(&mut FrameSource::new(data));

    let offset = report.tdoas.offset_samples(0, 1).expect("pair 0-1");
    assert!((offset - 37).abs() <= 1, "offset {}", offset);
    let tdoa = report.tdoas.iter().next().map(|(_, t)| *t).expect("one pair");
    assert!(tdoa.correlation.is_some_and(|c| c > 0.5));
    Ok(())
}

#[test]
fn abort_drops_captures_in_progress() -> anyhow::Result<()> {
    let data = synth(2, 4_000).burst(0, 500, 2_000, 1_000.0).render();
    let mut controller = SonarController::new(config(2))?;
    controller.wake();

    let mut source = FrameSource::new(data);
    let mut frame = [0; 2];
    while controller.channel_state(0) != Some(ChannelState::Capturing) {
        assert!(sonar_tdoa::SampleSource::next_frame(&mut source, &mut frame));
        controller.receive_sample(&frame);
    }
    controller.abort();

    assert_eq!(controller.state(), SonarState::Sleeping);
    assert_eq!(controller.outcome(), Some(CycleOutcome::Aborted));
    assert_eq!(controller.channel_counts(), ChannelCounts::all_sleeping(2));
    assert!(controller.pending_chunks().is_empty());
    Ok(())
}

#[test]
fn late_weak_arrival_is_still_captured() -> anyhow::Result<()> {
    // channel 1 only just clears the threshold with a full window of tone,
    // so its edge comes more than max_samples_tdoa after channel 0's edge
    let data = synth(2, 6_000).burst(0, 1_000, 40, 2_000.0).burst(1, 1_040, 2_000, 209.0).render();
    let mut controller = SonarController::new(config(2))?;
    let report = controller.go(&mut FrameSource::new(data));

    assert_eq!(report.outcome, CycleOutcome::AllCaptured);
    let first = report.chunk_for(0).expect("chunk on channel 0");
    let late = report.chunk_for(1).expect("chunk on channel 1");
    assert!(first.end_index() < late.start_index());
    assert!(late.start_index() > first.start_index() + 100);
    assert!(late.start_index() < 1_040 + 96);
    // too far apart for the onset estimate
    assert!(report.tdoas.is_empty());
    Ok(())
}

#[test]
fn capture_running_at_timeout_is_kept() -> anyhow::Result<()> {
    let cfg = SonarConfig {
        max_samples_to_wait_for_first_ping: 1_200,
        chunk_capacity: 4_096,
        ..config(2)
    };
    let data = synth(2, 6_000).burst(0, 1_000, 3_000, 1_000.0).burst(1, 1_020, 3_000, 1_000.0).render();
    let mut controller = SonarController::new(cfg)?;
    let report = controller.go(&mut FrameSource::new(data));

    assert_eq!(report.outcome, CycleOutcome::ListenTimeout);
    assert_eq!(report.samples_processed, 1_201);
    assert_eq!(report.chunks.len(), 2);
    for chunk in &report.chunks {
        assert_eq!(chunk.stop_reason(), StopReason::ListenTimeout);
        assert!(!chunk.is_truncated());
        assert_eq!(chunk.end_index(), 1_201);
    }
    assert_eq!(report.tdoas.offset_samples(0, 1), Some(20));
    assert_eq!(controller.channel_counts(), ChannelCounts::all_sleeping(2));
    assert_eq!(counts_from_states(&controller), controller.channel_counts());
    Ok(())
}
