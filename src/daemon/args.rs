use std::{num::NonZeroU32, path::PathBuf};

use clap::Parser;
use tracing::level_filters::LevelFilter;

use super::processing::scheduler::DEFAULT_FLUSH_EVERY;

#[derive(Parser)]
pub struct DaemonArgs {
  /// Run in the foreground instead of detaching.
  #[arg(long)]
  pub force: bool,
  #[arg(long)]
  pub dir: Option<PathBuf>,
  #[command(flatten)]
  pub config: DaemonConfig,
  /// This option is for debugging purposes only.
  #[arg(long = "log-console")]
  pub log_console : bool,
  #[arg(long = "log-filter")]
  pub log: Option<LevelFilter>
}

/// Settings of a running daemon.
#[derive(clap::Args, Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaemonConfig {
  /// Write counts to disk after this many keystrokes and clicks.
  #[arg(
    long = "flush-every",
    default_value_t = DEFAULT_FLUSH_EVERY,
    value_parser = parse_flush_every,
  )]
  pub flush_every: NonZeroU32,
}

impl Default for DaemonConfig {
  fn default() -> Self {
    Self {
      flush_every: DEFAULT_FLUSH_EVERY,
    }
  }
}

const MAX_FLUSH_EVERY: u32 = 50;

fn parse_flush_every(value: &str) -> Result<NonZeroU32, String> {
  let parsed = value
    .parse::<u32>()
    .map_err(|e| format!("{value:?} is not a number: {e}"))?;
  NonZeroU32::new(parsed)
    .filter(|v| v.get() <= MAX_FLUSH_EVERY)
    .ok_or_else(|| format!("must be between 1 and {MAX_FLUSH_EVERY}"))
}
