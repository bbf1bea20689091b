use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use colored::Colorize;
use log::{Level, LevelFilter, Log, Metadata, Record};
use time::OffsetDateTime;

use crate::config::Logger as LoggerConfig;

/// `log::Log` implementation: colorized console output plus, when enabled,
/// one append-only file per level under `logs/`.
pub struct BrokerLogger {
    console: bool,
    file: bool,
    log_dir: PathBuf,
    files: Mutex<Option<LevelFiles>>,
}

struct LevelFiles {
    debug: fs::File,
    error: fs::File,
    main: fs::File,
}

impl BrokerLogger {
    pub fn new(config: &LoggerConfig, log_dir: PathBuf) -> Self {
        Self {
            console: config.console,
            file: config.file,
            log_dir,
            files: Mutex::new(None),
        }
    }

    pub fn level_filter(config: &LoggerConfig) -> LevelFilter {
        match config.level.to_lowercase().as_str() {
            "trace" => LevelFilter::Trace,
            "debug" => LevelFilter::Debug,
            "warn" => LevelFilter::Warn,
            "error" => LevelFilter::Error,
            _ => LevelFilter::Info,
        }
    }

    /// Installs this logger as the global `log` sink. Call once from `main`.
    pub fn install(self, filter: LevelFilter) -> Result<(), log::SetLoggerError> {
        log::set_max_level(filter);
        log::set_boxed_logger(Box::new(self))
    }

    fn open_files(&self) -> std::io::Result<LevelFiles> {
        fs::create_dir_all(&self.log_dir)?;
        let open = |name: &str| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.log_dir.join(name))
        };
        Ok(LevelFiles {
            debug: open("debug.log")?,
            error: open("error.log")?,
            main: open("main.log")?,
        })
    }

    fn colorize(level: Level, text: &str) -> String {
        match level {
            Level::Error => text.red().to_string(),
            Level::Warn => text.yellow().to_string(),
            Level::Info => text.green().to_string(),
            Level::Debug => text.blue().to_string(),
            Level::Trace => text.normal().to_string(),
        }
    }
}

impl Log for BrokerLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let timestamp = OffsetDateTime::now_utc();
        let line = format!(
            "[{timestamp}] [{level}] {args}",
            level = record.level(),
            args = record.args()
        );

        if self.console {
            println!("{}", Self::colorize(record.level(), &line));
        }

        if self.file {
            let mut guard = self.files.lock().expect("log file mutex poisoned");
            if guard.is_none() {
                *guard = self.open_files().ok();
            }
            if let Some(files) = guard.as_mut() {
                let _ = writeln!(files.main, "{line}");
                match record.level() {
                    Level::Error => {
                        let _ = writeln!(files.error, "{line}");
                    }
                    Level::Debug | Level::Trace => {
                        let _ = writeln!(files.debug, "{line}");
                    }
                    _ => {}
                }
            }
        }
    }

    fn flush(&self) {
        if let Ok(mut guard) = self.files.lock() {
            if let Some(files) = guard.as_mut() {
                let _ = files.main.flush();
                let _ = files.error.flush();
                let _ = files.debug.flush();
            }
        }
    }
}
