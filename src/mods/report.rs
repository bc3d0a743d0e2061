use anyhow::Result;
use chrono::Utc;
use std::{ fs::OpenOptions, io::Write, path::Path };

use sonar_tdoa::config::SonarConfig;
use sonar_tdoa::controller::CycleReport;

const CSV_HEADER: &str = "timestamp,channel_a,channel_b,offset_samples,offset_s";

/// Human-readable cycle summary on stdout.
pub fn print_report(report: &CycleReport, sonar: &SonarConfig) {
    println!(
        "cycle ended: {:?} after {} samples ({:.3} s)",
        report.outcome,
        report.samples_processed,
        (report.samples_processed as f64) / (sonar.sample_rate_hz as f64)
    );
    if let Some(edge) = report.rising_edge {
        println!("first rising edge at sample {}", edge);
    }
    for chunk in &report.chunks {
        println!(
            "  ch{}: start {} len {}{}",
            chunk.channel(),
            chunk.start_index(),
            chunk.len(),
            if chunk.is_truncated() { " (truncated)" } else { "" }
        );
    }
    if report.tdoas.is_empty() {
        println!("no channel pair heard the ping");
        return;
    }
    for (pair, tdoa) in report.tdoas.iter() {
        match tdoa.correlation {
            Some(score) =>
                println!(
                    "  tdoa {}: {:+} samples ({:+.3} us, corr {:.2})",
                    pair,
                    tdoa.samples,
                    tdoa.seconds() * 1e6,
                    score
                ),
            None =>
                println!(
                    "  tdoa {}: {:+} samples ({:+.3} us)",
                    pair,
                    tdoa.samples,
                    tdoa.seconds() * 1e6
                ),
        }
    }
}

/// Appends one row per pair, writing the header first when the file is new.
/// Returns the number of rows written.
pub fn append_tdoa_csv<P: AsRef<Path>>(path: P, report: &CycleReport) -> Result<usize> {
    let path = path.as_ref();
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    let mut csv_file = OpenOptions::new().create(true).append(true).open(path)?;
    if csv_file.metadata()?.len() == 0 {
        writeln!(csv_file, "{}", CSV_HEADER)?;
    }

    let ts = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");
    for (pair, tdoa) in report.tdoas.iter() {
        writeln!(
            csv_file,
            "{},{},{},{},{:.9}",
            ts,
            pair.a,
            pair.b,
            tdoa.samples,
            tdoa.seconds()
        )?;
    }
    csv_file.flush()?;
    Ok(report.tdoas.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonar_tdoa::source::FrameSource;
    use sonar_tdoa::synth::PingSynth;
    use sonar_tdoa::SonarController;

    #[test]
    fn csv_gets_one_header_and_a_row_per_pair() -> Result<()> {
        let sonar = SonarConfig {
            channels: 2,
            sample_rate_hz: 48_000,
            target_freq_hz: 4_000,
            num_periods: 8,
            threshold: 5_000.0,
            chunk_capacity: 2_048,
            min_samples_between_pings: 48_000,
            max_samples_to_wait_for_first_ping: 24_000,
            ..SonarConfig::default()
        };
        let data = PingSynth::new(48_000, 4_000.0, 2, 4_000)
            .burst(0, 1_000, 600, 1_000.0)
            .burst(1, 1_050, 600, 1_000.0)
            .render();
        let mut controller = SonarController::new(sonar)?;
        let report = controller.go(&mut FrameSource::new(data));

        let path = std::env::temp_dir().join(format!("sonar_tdoa_csv_{}.csv", std::process::id()));
        let _ = std::fs::remove_file(&path);
        assert_eq!(append_tdoa_csv(&path, &report)?, 1);
        assert_eq!(append_tdoa_csv(&path, &report)?, 1);

        let content = std::fs::read_to_string(&path)?;
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER);
        assert!(lines[1].contains(",0,1,50,"));
        std::fs::remove_file(&path)?;
        Ok(())
    }
}
