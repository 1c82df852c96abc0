use chrono_tz::Tz;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, TimelineError};
use crate::time_utils::TimezoneHandler;

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Plot personal listening-history exports on a day/hour timeline
#[derive(Parser, Debug, Clone)]
#[command(
    name = "listening-timeline",
    about = "Plot personal listening-history exports on a day/hour timeline",
    version
)]
pub struct Settings {
    /// Export files, or directories to search for *.json exports
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Timezone used for local calendar days (auto-detected if not specified)
    #[arg(long, default_value = "auto")]
    pub timezone: String,

    /// Write the projection to this file instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Pretty-print the JSON output
    #[arg(long)]
    pub pretty: bool,

    /// Skip files that cannot be read or parsed instead of failing
    #[arg(long)]
    pub skip_invalid_files: bool,

    /// Abort if reading any single file takes longer than this many seconds
    #[arg(long)]
    pub read_timeout_secs: Option<u64>,

    /// Logging level
    #[arg(long, default_value = "WARNING", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR"])]
    pub log_level: String,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

impl Settings {
    /// Resolve `--timezone`, mapping `"auto"` to the host zone.
    ///
    /// Unlike [`crate::time_utils::TimezoneHandler::new`], an explicit but
    /// unknown zone is an error rather than a silent UTC fallback.
    pub fn resolve_timezone(&self) -> Result<Tz> {
        if self.timezone.eq_ignore_ascii_case("auto") {
            return Ok(TimezoneHandler::system().default_tz());
        }
        if !TimezoneHandler::validate_timezone(&self.timezone) {
            return Err(TimelineError::Config(format!(
                "unknown timezone \"{}\"",
                self.timezone
            )));
        }
        Ok(TimezoneHandler::new(&self.timezone).default_tz())
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_secs.map(Duration::from_secs)
    }

    /// Effective log level; `--debug` wins over `--log-level`.
    pub fn effective_log_level(&self) -> &str {
        if self.debug {
            "DEBUG"
        } else {
            &self.log_level
        }
    }
}
