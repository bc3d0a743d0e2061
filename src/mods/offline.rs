use anyhow::{ Context, Result };
use std::{ fs::File, path::Path, sync::Arc };
use symphonia::core::{
    audio::SampleBuffer,
    codecs::DecoderOptions,
    errors::Error,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};
use symphonia::default::{ get_codecs, get_probe };

use sonar_tdoa::controller::{ CycleReport, SonarController };
use sonar_tdoa::dft::AdcSample;
use sonar_tdoa::logger::Logger;
use sonar_tdoa::source::FrameSource;

#[derive(Debug)]
pub struct Recording {
    pub sr: u32,
    /// One vector per channel, already scaled to ADC counts.
    pub channels: Vec<Vec<AdcSample>>,
}

impl Recording {
    pub fn frames(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }
}

pub fn to_adc(sample: f32, scale: f64) -> AdcSample {
    ((sample as f64) * scale).round().clamp(AdcSample::MIN as f64, AdcSample::MAX as f64) as AdcSample
}

/// Decodes every channel of `path` and scales full-scale floats by `scale`.
pub fn load_recording<P: AsRef<Path>>(path: P, scale: f64) -> Result<Recording> {
    let path_ref = path.as_ref();

    let file = File::open(path_ref)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path_ref.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default()
    )?;
    let mut format = probed.format;

    let (track_id, codec_params) = {
        let track = format
            .default_track()
            .ok_or_else(|| anyhow::anyhow!("no default audio track found"))?;
        (track.id, track.codec_params.clone())
    };

    let mut decoder = get_codecs().make(&codec_params, &DecoderOptions::default())?;

    let sr = codec_params.sample_rate.ok_or_else(|| anyhow::anyhow!("unknown sample rate"))?;
    let channel_count = codec_params.channels.map(|c| c.count()).unwrap_or(1);

    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut channels: Vec<Vec<AdcSample>> = vec![Vec::new(); channel_count];

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(Error::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(Error::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(err) => {
                return Err(err.into());
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(Error::DecodeError(_)) => {
                continue;
            }
            Err(err) => {
                return Err(err.into());
            }
        };

        let spec = *decoded.spec();
        let chan_count = spec.channels.count().max(1);

        let needs_new = sample_buf
            .as_ref()
            .map(|b| b.capacity() < decoded.capacity())
            .unwrap_or(true);
        if needs_new {
            sample_buf = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
        }
        let Some(buf) = sample_buf.as_mut() else {
            continue;
        };

        buf.copy_interleaved_ref(decoded);
        for frame in buf.samples().chunks_exact(chan_count) {
            for (ch, &s) in frame.iter().enumerate().take(channels.len()) {
                channels[ch].push(to_adc(s, scale));
            }
        }
    }

    Ok(Recording { sr, channels })
}

/// Offline mode: run one detection cycle over a recorded file.
pub fn run_offline(cli: &crate::Config, logger: Arc<Logger>) -> Result<CycleReport> {
    if cli.input_path.is_empty() {
        anyhow::bail!("--input <PATH> is required in offline mode");
    }
    let path = Path::new(&cli.input_path);
    if !path.exists() {
        anyhow::bail!("Input file not found: {}", path.display());
    }

    logger.info(&format!("Decoding: {}", path.display()))?;
    let recording = load_recording(path, cli.adc_scale).with_context(||
        format!("decoding {}", path.display())
    )?;
    logger.info(
        &format!(
            "Decoded: sr={} Hz, channels={}, frames={}",
            recording.sr,
            recording.channels.len(),
            recording.frames()
        )
    )?;

    let mut sonar = cli.sonar.clone();
    if recording.sr != sonar.sample_rate_hz {
        logger.warn(
            &format!(
                "file rate {} Hz overrides configured {} Hz",
                recording.sr,
                sonar.sample_rate_hz
            )
        )?;
        sonar.sample_rate_hz = recording.sr;
    }
    if recording.channels.len() < sonar.channels {
        logger.warn(
            &format!(
                "file has {} channel(s), {} configured; missing channels read as silence",
                recording.channels.len(),
                sonar.channels
            )
        )?;
    }

    let mut controller = SonarController::new(sonar)?.with_logger(logger.clone());
    let mut source = FrameSource::new(recording.channels);
    Ok(controller.go(&mut source))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_scale_maps_to_adc_range() {
        assert_eq!(to_adc(1.0, 32_767.0), 32_767);
        assert_eq!(to_adc(-0.5, 32_767.0), -16_384);
        assert_eq!(to_adc(0.0, 32_767.0), 0);
        assert_eq!(to_adc(f32::MAX, 1e12), AdcSample::MAX);
    }
}
