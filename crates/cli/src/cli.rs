use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "usagewatch")]
#[command(about = "Watch Claude.ai usage quotas from the terminal")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v debug, -vv trace)
	#[arg(short, long, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Log line format on stderr
	#[arg(long, value_enum, default_value = "text")]
	pub log_format: LogFormat,

	/// Config file (defaults to <config dir>/usagewatch/config.json)
	#[arg(long, value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// Session file, overriding the config
	#[arg(long, value_name = "FILE")]
	pub session_file: Option<PathBuf>,

	/// Seconds between polls, overriding the config
	#[arg(long, value_name = "SECS")]
	pub interval: Option<u64>,

	/// Check the stored session against the API and exit (0 valid, 1 invalid)
	#[arg(long, conflicts_with_all = ["login", "once"])]
	pub verify: bool,

	/// Sign in again even if a session is stored
	#[arg(long)]
	pub login: bool,

	/// Fetch usage once, print it, and exit
	#[arg(long)]
	pub once: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
	Text,
	Json,
}
