//! src/main.rs

use anyhow::Result;
use std::{ env, path::PathBuf, sync::Arc };

use sonar_tdoa::config::{ SonarConfig, TdoaMethod, WindowKind };
use sonar_tdoa::logger::{ LogLevel, Logger };

// host modes live in src/mods/
mod mods;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Synth,
    Offline,
    Live,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub mode: Mode,
    pub log_path: String,
    pub log_level: LogLevel,
    pub echo: bool,
    pub config_path: Option<String>,
    pub tdoa_csv: Option<String>,

    pub sonar: SonarConfig,

    pub synth_total_samples: usize,
    pub synth_first_ping: u64,
    pub synth_delays: Vec<u64>,
    pub synth_ping_samples: usize,
    pub synth_amplitude: f64,
    pub synth_noise: f64,
    pub synth_seed: u64,

    pub input_path: String,
    pub adc_scale: f64,

    pub device_name: Option<String>,
    pub queue_blocks: usize,
}

impl Default for Config {
    fn default() -> Self {
        let default_log = env
            ::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join("build")
            .join("Detection.log")
            .to_string_lossy()
            .into_owned();

        Self {
            mode: Mode::Synth,
            log_path: default_log,
            log_level: LogLevel::Info,
            echo: false,
            config_path: None,
            tdoa_csv: None,

            sonar: SonarConfig::default(),

            synth_total_samples: 60_000,
            synth_first_ping: 10_000,
            synth_delays: vec![0, 20, 45, 70],
            synth_ping_samples: 1_200,
            synth_amplitude: 1_000.0,
            synth_noise: 0.0,
            synth_seed: 1,

            input_path: String::new(),
            adc_scale: 32_767.0,

            device_name: None,
            queue_blocks: 64,
        }
    }
}

fn print_usage(cfg: &Config) {
    println!("Usage: sonar-tdoa [OPTIONS]\n");
    println!("General:");
    println!("  --log-path <PATH>             Path to Detection.log (default: {})", cfg.log_path);
    println!(
        "  --log-level <LEVEL>           Log level: debug, info, warning, error (default: info)"
    );
    println!("  --echo                        Mirror log lines to stderr");
    println!("  --config <PATH>               TOML detector settings (flags below override it)");
    println!("  --tdoa-csv <PATH>             Append measured offsets to this CSV file");
    println!();
    println!("Modes:");
    println!("  --mode synth          (default) Run one cycle over synthesized pings");
    println!("  --mode offline        Run one cycle over a multichannel audio file");
    println!("  --mode live           Run one cycle on a multichannel input device\n");

    let s = &cfg.sonar;
    println!("Detector options:");
    println!("  --channels <N>                Hydrophone channels (default: {})", s.channels);
    println!("  --sample-rate, --sr <HZ>      ADC sample rate (default: {})", s.sample_rate_hz);
    println!("  --target-hz <HZ>              Pinger frequency (default: {})", s.target_freq_hz);
    println!("  --periods <N>                 Target periods per DFT window (default: {})", s.num_periods);
    println!("  --window <KIND>               rectangular, hann, hamming (default: hann)");
    println!("  --threshold <MAG>             Detection magnitude (default: {:.0})", s.threshold);
    println!("  --chunk-capacity <N>          Samples kept per capture (default: {})", s.chunk_capacity);
    println!("  --max-tdoa <N>                Largest plausible offset in samples (default: {})", s.max_samples_tdoa);
    println!(
        "  --min-between <N>             Samples between transmissions (default: {})",
        s.min_samples_between_pings
    );
    println!(
        "  --max-wait <N>                Samples to wait for a first ping (default: {})",
        s.max_samples_to_wait_for_first_ping
    );
    println!("  --tdoa-method <METHOD>        onset, xcorr (default: onset)\n");

    println!("Synth options:");
    println!("  --synth-samples <N>           Recording length (default: {})", cfg.synth_total_samples);
    println!("  --synth-first <N>             Index of the earliest arrival (default: {})", cfg.synth_first_ping);
    println!("  --synth-delays <A,B,..>       Per-channel arrival delays in samples (default: 0,20,45,70)");
    println!("  --synth-ping <N>              Ping length in samples (default: {})", cfg.synth_ping_samples);
    println!("  --synth-amplitude <VAL>       Ping amplitude in ADC counts (default: {:.0})", cfg.synth_amplitude);
    println!("  --synth-noise <SIGMA>         Gaussian noise in ADC counts (default: {:.0})", cfg.synth_noise);
    println!("  --synth-seed <N>              Noise seed (default: {})\n", cfg.synth_seed);

    println!("Offline/live options:");
    println!("  --input <PATH>                (offline) Audio file (.wav/.flac/.mkv/...)");
    println!("  --adc-scale <VAL>             Full-scale float to ADC counts (default: {:.0})", cfg.adc_scale);
    println!("  --device <NAME>               (live) Input device name (default: system default)");
    println!("  --queue-blocks <N>            (live) Blocks buffered between callback and detector (default: {})\n", cfg.queue_blocks);

    println!("Examples:");
    println!("  sonar-tdoa --mode synth --synth-delays 0,37,12,90 --synth-noise 200");
    println!("  sonar-tdoa --mode offline --input recording.wav --config array.toml --tdoa-csv tdoa.csv");
    println!("  sonar-tdoa --mode live --device \"USB ADC\" --sr 192000 --target-hz 25000");
}

fn value<'a>(args: &'a [String], i: usize, flag: &str) -> std::result::Result<&'a str, String> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| format!("Missing value for {}", flag))
}

fn number<T: std::str::FromStr>(
    args: &[String],
    i: usize,
    flag: &str
) -> std::result::Result<T, String> {
    let v = value(args, i, flag)?;
    v.parse().map_err(|_| format!("Invalid {} value: {}", flag, v))
}

fn parse_arguments() -> std::result::Result<Config, String> {
    let args: Vec<String> = env::args().collect();
    let mut config = Config::default();

    // the settings file goes first so individual flags override it
    if let Some(pos) = args.iter().position(|a| a == "--config") {
        let path = value(&args, pos, "--config")?.to_string();
        config.sonar = SonarConfig::from_file(&path).map_err(|e| e.to_string())?;
        config.config_path = Some(path);
    }

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_usage(&config);
                std::process::exit(0);
            }
            "--echo" => {
                config.echo = true;
                i += 1;
                continue;
            }
            "--config" => {}
            "--mode" => {
                match value(&args, i, "--mode")?.to_lowercase().as_str() {
                    "synth" => {
                        config.mode = Mode::Synth;
                    }
                    "offline" => {
                        config.mode = Mode::Offline;
                    }
                    "live" => {
                        config.mode = Mode::Live;
                    }
                    other => {
                        return Err(format!("Unknown mode: {}", other));
                    }
                }
            }
            "--log-path" => {
                config.log_path = value(&args, i, "--log-path")?.to_string();
            }
            "--log-level" => {
                config.log_level = value(&args, i, "--log-level")?.parse()?;
            }
            "--tdoa-csv" => {
                config.tdoa_csv = Some(value(&args, i, "--tdoa-csv")?.to_string());
            }

            "--channels" => {
                config.sonar.channels = number(&args, i, "--channels")?;
            }
            "--sample-rate" | "--sr" => {
                config.sonar.sample_rate_hz = number(&args, i, "--sample-rate")?;
            }
            "--target-hz" => {
                config.sonar.target_freq_hz = number(&args, i, "--target-hz")?;
            }
            "--periods" => {
                config.sonar.num_periods = number(&args, i, "--periods")?;
            }
            "--window" => {
                config.sonar.window = match value(&args, i, "--window")?.to_lowercase().as_str() {
                    "rectangular" | "rect" => WindowKind::Rectangular,
                    "hann" => WindowKind::Hann,
                    "hamming" => WindowKind::Hamming,
                    other => {
                        return Err(format!("Unknown window: {}", other));
                    }
                };
            }
            "--threshold" => {
                config.sonar.threshold = number(&args, i, "--threshold")?;
            }
            "--chunk-capacity" => {
                config.sonar.chunk_capacity = number(&args, i, "--chunk-capacity")?;
            }
            "--max-tdoa" => {
                config.sonar.max_samples_tdoa = number(&args, i, "--max-tdoa")?;
            }
            "--min-between" => {
                config.sonar.min_samples_between_pings = number(&args, i, "--min-between")?;
            }
            "--max-wait" => {
                config.sonar.max_samples_to_wait_for_first_ping = number(&args, i, "--max-wait")?;
            }
            "--tdoa-method" => {
                config.sonar.tdoa_method = match
                    value(&args, i, "--tdoa-method")?.to_lowercase().as_str()
                {
                    "onset" => TdoaMethod::Onset,
                    "xcorr" | "cross_correlation" | "cross-correlation" => TdoaMethod::CrossCorrelation,
                    other => {
                        return Err(format!("Unknown TDOA method: {}", other));
                    }
                };
            }

            "--synth-samples" => {
                config.synth_total_samples = number(&args, i, "--synth-samples")?;
            }
            "--synth-first" => {
                config.synth_first_ping = number(&args, i, "--synth-first")?;
            }
            "--synth-delays" => {
                config.synth_delays = value(&args, i, "--synth-delays")?
                    .split(',')
                    .map(|d| d.trim().parse::<u64>())
                    .collect::<std::result::Result<_, _>>()
                    .map_err(|_| "Invalid synth-delays value".to_string())?;
            }
            "--synth-ping" => {
                config.synth_ping_samples = number(&args, i, "--synth-ping")?;
            }
            "--synth-amplitude" => {
                config.synth_amplitude = number(&args, i, "--synth-amplitude")?;
            }
            "--synth-noise" => {
                config.synth_noise = number::<f64>(&args, i, "--synth-noise")?.max(0.0);
            }
            "--synth-seed" => {
                config.synth_seed = number(&args, i, "--synth-seed")?;
            }

            "--input" => {
                config.input_path = value(&args, i, "--input")?.to_string();
            }
            "--adc-scale" => {
                config.adc_scale = number(&args, i, "--adc-scale")?;
            }
            "--device" => {
                config.device_name = Some(value(&args, i, "--device")?.to_string());
            }
            "--queue-blocks" => {
                config.queue_blocks = number::<usize>(&args, i, "--queue-blocks")?.max(1);
            }
            other => {
                return Err(format!("Unknown argument: {}", other));
            }
        }
        i += 2;
    }

    config.sonar.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn main() -> Result<()> {
    let cli = match parse_arguments() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {}\n", e);
            print_usage(&Config::default());
            std::process::exit(1);
        }
    };

    let logger = Arc::new(
        Logger::new_with_level(&cli.log_path, true, cli.log_level)?.with_echo(cli.echo)
    );
    if let Some(path) = &cli.config_path {
        logger.info(&format!("Loaded detector settings from {}", path))?;
    }

    let report = match cli.mode {
        Mode::Synth => mods::synth::run_synth(&cli, logger.clone())?,
        Mode::Offline => mods::offline::run_offline(&cli, logger.clone())?,
        Mode::Live => mods::live::run_live(&cli, logger.clone())?,
    };

    mods::report::print_report(&report, &cli.sonar);
    if let Some(path) = &cli.tdoa_csv {
        let rows = mods::report::append_tdoa_csv(path, &report)?;
        logger.info(&format!("Wrote {} offset(s) to {}", rows, path))?;
    }
    Ok(())
}
