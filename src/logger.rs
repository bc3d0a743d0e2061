use std::fs::OpenOptions;
use std::io::{ self, Write };
use std::path::{ Path, PathBuf };
use std::str::FromStr;
use std::sync::Mutex;
use chrono::Utc;
use serde::Deserialize;

//  order of log (Debug < Info < Warning < Error).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    #[serde(alias = "warn")]
    Warning = 2,
    Error = 3,
}

impl LogLevel {
    fn as_str(&self) -> &str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Debug => "DEBUG",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other =>
                Err(format!("Invalid log level: {}. Valid options: debug, info, warning, error", other)),
        }
    }
}

/// Append-only detection log.
///
/// Every line is `[timestamp] [LEVEL] [component] message`. The file is
/// reopened per line so an external viewer can truncate it between cycles.
pub struct Logger {
    file_path: Option<PathBuf>,
    file_mutex: Mutex<()>,
    enabled: bool,
    echo: bool,
    min_level: LogLevel,
}

impl Logger {
    pub fn new<P: AsRef<Path>>(file_path: P, enabled: bool) -> Result<Self, io::Error> {
        Self::new_with_level(file_path, enabled, LogLevel::Debug)
    }

    pub fn new_with_level<P: AsRef<Path>>(
        file_path: P,
        enabled: bool,
        min_level: LogLevel
    ) -> Result<Self, io::Error> {
        let file_path = file_path.as_ref().to_path_buf();
        if enabled {
            if let Some(dir) = file_path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)?;
            }
            // ensure file exists
            OpenOptions::new().create(true).append(true).open(&file_path)?;
        }
        Ok(Logger {
            file_path: Some(file_path),
            file_mutex: Mutex::new(()),
            enabled,
            echo: false,
            min_level,
        })
    }

    /// Logger that never touches the filesystem. Lines still reach stderr
    /// when echo is switched on.
    pub fn disabled() -> Self {
        Logger {
            file_path: None,
            file_mutex: Mutex::new(()),
            enabled: false,
            echo: false,
            min_level: LogLevel::Info,
        }
    }

    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    fn should_log(&self, level: LogLevel) -> bool {
        (self.enabled || self.echo) && level >= self.min_level
    }

    pub fn log(&self, level: LogLevel, component: &str, message: &str) -> Result<(), io::Error> {
        if !self.should_log(level) {
            return Ok(());
        }

        let timestamp = Utc::now();
        let formatted_message = format!(
            "[{}] [{}] [{}] {}\n",
            timestamp.format("%Y-%m-%d %H:%M:%S%.3f UTC"),
            level.as_str(),
            component,
            message
        );

        if self.echo {
            eprint!("{}", formatted_message);
        }

        let path = match (&self.file_path, self.enabled) {
            (Some(p), true) => p,
            _ => {
                return Ok(());
            }
        };

        let _guard = self.file_mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(formatted_message.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    pub fn log_fmt(
        &self,
        level: LogLevel,
        component: &str,
        args: std::fmt::Arguments
    ) -> Result<(), io::Error> {
        if !self.should_log(level) {
            return Ok(());
        }
        self.log(level, component, &format!("{}", args))
    }

    pub fn info(&self, message: &str) -> Result<(), io::Error> {
        self.log(LogLevel::Info, "host", message)
    }
    pub fn warn(&self, message: &str) -> Result<(), io::Error> {
        self.log(LogLevel::Warning, "host", message)
    }
    pub fn error(&self, message: &str) -> Result<(), io::Error> {
        self.log(LogLevel::Error, "host", message)
    }
    pub fn debug(&self, message: &str) -> Result<(), io::Error> {
        self.log(LogLevel::Debug, "host", message)
    }

    pub fn clear(&self) -> Result<(), io::Error> {
        let path = match (&self.file_path, self.enabled) {
            (Some(p), true) => p,
            _ => {
                return Ok(());
            }
        };
        let _guard = self.file_mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        std::fs::write(path, "")?;
        Ok(())
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
    pub fn min_level(&self) -> LogLevel {
        self.min_level
    }
    pub fn set_min_level(&mut self, level: LogLevel) {
        self.min_level = level;
    }
}

#[macro_export]
macro_rules! log_info {
    (
        $logger:expr,
        $component:expr,
        $($arg:tt)*
    ) => {
        $logger.log_fmt($crate::logger::LogLevel::Info, $component, format_args!($($arg)*))
    };
}
#[macro_export]
macro_rules! log_warn {
    (
        $logger:expr,
        $component:expr,
        $($arg:tt)*
    ) => {
        $logger.log_fmt($crate::logger::LogLevel::Warning, $component, format_args!($($arg)*))
    };
}
#[macro_export]
macro_rules! log_error {
    (
        $logger:expr,
        $component:expr,
        $($arg:tt)*
    ) => {
        $logger.log_fmt($crate::logger::LogLevel::Error, $component, format_args!($($arg)*))
    };
}
#[macro_export]
macro_rules! log_debug {
    (
        $logger:expr,
        $component:expr,
        $($arg:tt)*
    ) => {
        $logger.log_fmt($crate::logger::LogLevel::Debug, $component, format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_parse_and_order() {
        assert_eq!("warn".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert_eq!("DEBUG".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert!("loud".parse::<LogLevel>().is_err());
        assert!(LogLevel::Debug < LogLevel::Error);
    }

    #[test]
    fn writes_lines_above_min_level() {
        let path = std::env::temp_dir().join(format!("sonar-tdoa-log-{}.log", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let logger = Logger::new_with_level(&path, true, LogLevel::Info).unwrap();
        logger.debug("hidden").unwrap();
        crate::log_info!(logger, "controller", "wake at {}", 42).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("hidden"));
        assert!(text.contains("[INFO] [controller] wake at 42"));

        logger.clear().unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().is_empty());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn disabled_logger_is_silent() {
        let logger = Logger::disabled();
        assert!(logger.file_path().is_none());
        logger.error("nothing happens").unwrap();
    }
}
