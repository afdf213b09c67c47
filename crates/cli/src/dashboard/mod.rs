//! Terminal rendering of the latest snapshot and status line.

mod reset;

use std::fmt::Display;

use chrono::{DateTime, TimeZone, Utc};
use colored::{ColoredString, Colorize};
use usagewatch::{QuotaWindow, UsageEvent, UsageSnapshot};

use reset::format_reset_label;

const BAR_WIDTH: usize = 24;
const LABEL_WIDTH: usize = 22;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
	Normal,
	Elevated,
	Critical,
}

impl Level {
	pub fn of(percent: f64) -> Self {
		if percent < 60.0 {
			Level::Normal
		} else if percent < 80.0 {
			Level::Elevated
		} else {
			Level::Critical
		}
	}

	fn paint(self, text: &str) -> ColoredString {
		match self {
			Level::Normal => text.green(),
			Level::Elevated => text.yellow(),
			Level::Critical => text.red(),
		}
	}
}

pub fn progress_bar(percent: f64) -> String {
	let filled = ((percent.clamp(0.0, 100.0) / 100.0) * BAR_WIDTH as f64).round() as usize;
	format!("{}{}", "█".repeat(filled), "░".repeat(BAR_WIDTH - filled))
}

/// Keeps only the most recent snapshot and status.
pub struct Dashboard<Tz: TimeZone> {
	tz: Tz,
	snapshot: Option<UsageSnapshot>,
	status: String,
}

impl<Tz> Dashboard<Tz>
where
	Tz: TimeZone,
	Tz::Offset: Display,
{
	pub fn new(tz: Tz) -> Self {
		Self {
			tz,
			snapshot: None,
			status: "Starting…".to_string(),
		}
	}

	pub fn set_status(&mut self, status: impl Into<String>) {
		self.status = status.into();
	}

	pub fn apply(&mut self, event: UsageEvent, now: DateTime<Utc>) {
		match event {
			UsageEvent::Snapshot(snapshot) => {
				self.status = format!("Last updated: {}", self.clock(snapshot.last_updated));
				self.snapshot = Some(snapshot);
			}
			UsageEvent::TransientError(message) => self.status = format!("Error: {message} ({})", self.clock(now)),
			UsageEvent::SessionExpired => self.status = "Session expired. Please sign in again.".to_string(),
			UsageEvent::Status(message) => self.status = message,
		}
	}

	#[cfg(test)]
	fn status(&self) -> &str {
		&self.status
	}

	pub fn render(&self, now: DateTime<Utc>) -> String {
		let mut out = format!("{}\n\n", "Claude usage".bold());
		match &self.snapshot {
			Some(snapshot) => {
				for (label, window) in [
					("Current session", &snapshot.current_session),
					("Weekly · all models", &snapshot.weekly_all),
					("Weekly · Sonnet only", &snapshot.weekly_sonnet),
				] {
					out.push_str(&self.row(label, window, now));
					out.push('\n');
				}
			}
			None => out.push_str(&format!("  {}\n", "Waiting for data".dimmed())),
		}
		out.push('\n');
		out.push_str(&self.status);
		out.push('\n');
		out
	}

	fn row(&self, label: &str, window: &QuotaWindow, now: DateTime<Utc>) -> String {
		let percent = window.percent();
		let level = Level::of(percent);
		format!(
			"  {label:<width$} {} {:>4}  {}",
			level.paint(&progress_bar(percent)),
			level.paint(&format!("{percent:.0}%")),
			format_reset_label(window.reset_at, now, &self.tz).dimmed(),
			width = LABEL_WIDTH,
		)
	}

	fn clock(&self, at: DateTime<Utc>) -> String {
		at.with_timezone(&self.tz).format("%H:%M:%S").to_string()
	}
}
