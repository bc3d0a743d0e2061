use anyhow::Result;
use std::sync::Arc;

use sonar_tdoa::controller::{ CycleReport, SonarController };
use sonar_tdoa::logger::Logger;
use sonar_tdoa::source::FrameSource;
use sonar_tdoa::synth::PingSynth;

/// Synth mode: one ping per channel at `first + delay[ch]`, optional noise,
/// one detection cycle over the result.
pub fn run_synth(cli: &crate::Config, logger: Arc<Logger>) -> Result<CycleReport> {
    let sonar = &cli.sonar;
    logger.info(
        &format!(
            "synth: {} channels, {} samples at {} Hz, ping {} samples at {} Hz, noise sigma {:.1}",
            sonar.channels,
            cli.synth_total_samples,
            sonar.sample_rate_hz,
            cli.synth_ping_samples,
            sonar.target_freq_hz,
            cli.synth_noise
        )
    )?;

    let mut synth = PingSynth::new(
        sonar.sample_rate_hz,
        sonar.target_freq_hz as f64,
        sonar.channels,
        cli.synth_total_samples
    ).with_noise(cli.synth_noise, cli.synth_seed);
    for (ch, delay) in cli.synth_delays.iter().take(sonar.channels).enumerate() {
        synth = synth.burst(
            ch,
            cli.synth_first_ping + delay,
            cli.synth_ping_samples,
            cli.synth_amplitude
        );
    }
    if cli.synth_delays.len() < sonar.channels {
        logger.warn(
            &format!(
                "only {} delay(s) for {} channels; the rest stay silent",
                cli.synth_delays.len(),
                sonar.channels
            )
        )?;
    }

    let mut source = FrameSource::new(synth.render());
    let mut controller = SonarController::new(sonar.clone())?.with_logger(logger.clone());
    let report = controller.go(&mut source);
    logger.info(&format!("synth: {} frame(s) left unread", source.remaining()))?;
    Ok(report)
}
