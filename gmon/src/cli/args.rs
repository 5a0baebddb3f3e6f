//! CLI argument definitions

use clap::Parser;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "gmon", version, about = "Monitors goroutine lifecycles of a Go binary")]
pub struct Args {
    /// Path to executable file to be monitored
    #[arg(long)]
    pub path: String,

    /// Useful when tracing programs that have many running instances (0 = all)
    #[arg(long, default_value_t = 0)]
    pub pid: i32,

    /// Log level, one of DEBUG, INFO, WARN, ERROR
    #[arg(long, default_value = "INFO")]
    pub level: String,

    /// Port to be used for metrics server, /metrics endpoint
    #[arg(long, default_value_t = 5500)]
    pub metrics: u16,

    /// Port to be used for the profiling server; not started if 1023 or lower
    #[arg(long, default_value_t = 0)]
    pub pprof: u16,

    /// Drop goroutines from monitoring once their uptime exceeds this
    /// duration, e.g. "90s" or "5m" ("0" disables)
    #[arg(long, default_value = "0", value_parser = parse_threshold)]
    pub monitor_expiry_threshold: Duration,

    /// Path to the compiled eBPF object
    #[arg(long, default_value = "target/bpfel-unknown-none/release/gmon")]
    pub bpf_object: String,
}

impl Args {
    /// Log filter for the configured level; unknown values fall back to INFO
    #[must_use]
    pub fn level_filter(&self) -> log::LevelFilter {
        match self.level.to_ascii_lowercase().as_str() {
            "debug" => log::LevelFilter::Debug,
            "warn" => log::LevelFilter::Warn,
            "error" => log::LevelFilter::Error,
            _ => log::LevelFilter::Info,
        }
    }

    #[must_use]
    pub fn expiry_threshold(&self) -> Option<Duration> {
        (!self.monitor_expiry_threshold.is_zero()).then_some(self.monitor_expiry_threshold)
    }
}

fn parse_threshold(value: &str) -> Result<Duration, humantime::DurationError> {
    if value == "0" {
        return Ok(Duration::ZERO);
    }
    humantime::parse_duration(value)
}
