use anyhow::Result;
use cpal::traits::{ DeviceTrait, HostTrait, StreamTrait };
use crossbeam_channel::{ bounded, Sender, TrySendError };
use std::sync::{ atomic::{ AtomicU64, Ordering }, Arc };

use sonar_tdoa::controller::{ CycleReport, SonarController };
use sonar_tdoa::dft::AdcSample;
use sonar_tdoa::logger::Logger;
use sonar_tdoa::source::ReceiverSource;

use crate::mods::offline::to_adc;

/// Live mode: one detection cycle on a multichannel input device. Ctrl+C
/// aborts the cycle.
pub fn run_live(cli: &crate::Config, logger: Arc<Logger>) -> Result<CycleReport> {
    let sonar = &cli.sonar;

    let host = cpal::default_host();
    let device = match &cli.device_name {
        Some(name) =>
            host
                .input_devices()?
                .find(|d| d.name().map(|n| n.contains(name.as_str())).unwrap_or(false))
                .ok_or_else(|| anyhow::anyhow!("No input device matching '{}'", name))?,
        None =>
            host
                .default_input_device()
                .ok_or_else(|| anyhow::anyhow!("No default input device found"))?,
    };

    let channels = stream_channels(sonar.channels)?;
    let supported = supported_config(&device, sonar.sample_rate_hz, channels).ok_or_else(||
        anyhow::anyhow!(
            "Device does not offer {} channels at {} Hz",
            channels,
            sonar.sample_rate_hz
        )
    )?;
    let sample_format = supported.sample_format();
    let config = supported.config();

    logger.info(&format!("Input device: {}", device.name().unwrap_or_default()))?;
    logger.info(
        &format!(
            "Input: sample rate {} Hz, channels {}, format {:?}",
            config.sample_rate.0,
            config.channels,
            sample_format
        )
    )?;

    let (tx, rx) = bounded::<Vec<AdcSample>>(cli.queue_blocks);
    let dropped = Arc::new(AtomicU64::new(0));
    let stream = build_input_stream(
        &device,
        &config,
        sample_format,
        cli.adc_scale,
        tx,
        dropped.clone(),
        logger.clone()
    )?;

    let mut controller = SonarController::new(sonar.clone())?.with_logger(logger.clone());

    // ctrl+c to abort the cycle
    {
        let cancel = controller.cancel_handle();
        let _ = ctrlc::set_handler(move || {
            cancel.store(true, Ordering::SeqCst);
        });
    }

    stream.play()?;
    let mut source = ReceiverSource::new(rx, sonar.channels);
    let report = controller.go(&mut source);
    drop(stream);

    let lost = dropped.load(Ordering::Relaxed);
    if lost > 0 {
        logger.warn(&format!("{} input block(s) dropped: detector fell behind", lost))?;
    }
    logger.info(&format!("live: {} frame(s) processed", source.frames_read()))?;
    Ok(report)
}

pub fn build_input_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    scale: f64,
    tx: Sender<Vec<AdcSample>>,
    dropped: Arc<AtomicU64>,
    logger: Arc<Logger>
) -> Result<cpal::Stream> {
    let err_logger = logger.clone();
    let err_fn = move |e| {
        let _ = err_logger.error(&format!("audio stream error: {}", e));
    };

    match sample_format {
        cpal::SampleFormat::F32 =>
            Ok(
                device.build_input_stream(
                    config,
                    move |data: &[f32], _| {
                        let block = data
                            .iter()
                            .map(|&s| to_adc(s, scale))
                            .collect();
                        forward_block(block, &tx, &dropped);
                    },
                    err_fn,
                    None
                )?
            ),
        cpal::SampleFormat::I16 =>
            Ok(
                device.build_input_stream(
                    config,
                    move |data: &[i16], _| {
                        let block = data
                            .iter()
                            .map(|&s| s as AdcSample)
                            .collect();
                        forward_block(block, &tx, &dropped);
                    },
                    err_fn,
                    None
                )?
            ),
        cpal::SampleFormat::I32 =>
            Ok(
                device.build_input_stream(
                    config,
                    move |data: &[i32], _| forward_block(data.to_vec(), &tx, &dropped),
                    err_fn,
                    None
                )?
            ),
        cpal::SampleFormat::U16 =>
            Ok(
                device.build_input_stream(
                    config,
                    move |data: &[u16], _| {
                        let block = data
                            .iter()
                            .map(|&s| (s as AdcSample) - 32_768)
                            .collect();
                        forward_block(block, &tx, &dropped);
                    },
                    err_fn,
                    None
                )?
            ),
        _ => anyhow::bail!("Unsupported sample format"),
    }
}

/// The audio callback must not block; a full queue drops the block.
fn forward_block(block: Vec<AdcSample>, tx: &Sender<Vec<AdcSample>>, dropped: &AtomicU64) {
    if let Err(TrySendError::Full(_)) = tx.try_send(block) {
        dropped.fetch_add(1, Ordering::Relaxed);
    }
}

/// Channel count as the stream config expects it.
pub fn stream_channels(channels: usize) -> Result<u16> {
    u16::try_from(channels).map_err(|_|
        anyhow::anyhow!("{} channels exceed what an input stream can carry", channels)
    )
}

/// First supported input config with exactly `channels` channels whose rate
/// range covers `want`. Its sample format decides the callback type.
pub fn supported_config(
    device: &cpal::Device,
    want: u32,
    channels: u16
) -> Option<cpal::SupportedStreamConfig> {
    let configs = device.supported_input_configs().ok()?;
    for c in configs {
        let r = c.min_sample_rate().0..=c.max_sample_rate().0;
        if c.channels() == channels && r.contains(&want) {
            return Some(c.with_sample_rate(cpal::SampleRate(want)));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_count_must_fit_the_stream_config() {
        assert_eq!(stream_channels(4).unwrap(), 4);
        assert_eq!(stream_channels(65_535).unwrap(), u16::MAX);
        assert!(stream_channels(65_536).is_err());
    }
}
