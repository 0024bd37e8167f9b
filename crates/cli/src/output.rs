//! CLI output formatting utilities.
//!
//! Provides consistent formatting for terminal output including colored status
//! messages, human-readable durations and ratios, and Unicode symbols.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

use strata_lib::execute::BuildStatus;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
  pub const CACHED: &str = "○";
  pub const SKIPPED: &str = "-";
}

pub fn truncate_hash(hash: &str) -> &str {
  let len = hash.len().min(12);
  &hash[..len]
}

pub fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs();
  let millis = duration.subsec_millis();

  if secs >= 60 {
    let mins = secs / 60;
    let remaining_secs = secs % 60;
    format!("{}m {}s", mins, remaining_secs)
  } else if secs > 0 {
    format!("{}.{:02}s", secs, millis / 10)
  } else {
    format!("{}ms", millis)
  }
}

pub fn format_ratio(ratio: f64) -> String {
  format!("{:.0}%", ratio * 100.0)
}

pub fn format_timestamp(unix_secs: u64) -> String {
  humantime::format_rfc3339_seconds(UNIX_EPOCH + Duration::from_secs(unix_secs)).to_string()
}

pub fn format_age(unix_secs: u64) -> String {
  let age = SystemTime::now()
    .duration_since(UNIX_EPOCH + Duration::from_secs(unix_secs))
    .unwrap_or_default();
  // Whole seconds keep the output short
  format!("{} ago", humantime::format_duration(Duration::from_secs(age.as_secs())))
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

/// Print one unit outcome line, e.g. `✓ app (1.20s)`.
pub fn print_unit(status: BuildStatus, id: &str, detail: &str) {
  let symbol = match status {
    BuildStatus::Success => symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()).to_string(),
    BuildStatus::Failure => symbols::ERROR.if_supports_color(Stream::Stdout, |s| s.red()).to_string(),
    BuildStatus::SkippedCached => symbols::CACHED.if_supports_color(Stream::Stdout, |s| s.cyan()).to_string(),
    BuildStatus::SkippedDependencyFailed => symbols::SKIPPED
      .if_supports_color(Stream::Stdout, |s| s.yellow())
      .to_string(),
    BuildStatus::Cancelled => symbols::WARNING.if_supports_color(Stream::Stdout, |s| s.yellow()).to_string(),
  };
  println!(
    "  {} {} {}",
    symbol,
    id,
    detail.if_supports_color(Stream::Stdout, |s| s.dimmed())
  );
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}
