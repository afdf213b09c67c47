use std::fmt::Display;

use chrono::{DateTime, TimeZone, Utc};

/// Countdown label for a window's next reset, relative to `now`.
///
/// Under a day the label counts down in hours and minutes (truncated);
/// further out it names the weekday and wall-clock time in `tz`.
pub fn format_reset_label<Tz>(reset_at: Option<DateTime<Utc>>, now: DateTime<Utc>, tz: &Tz) -> String
where
	Tz: TimeZone,
	Tz::Offset: Display,
{
	let Some(reset_at) = reset_at else {
		return String::new();
	};

	let remaining = reset_at - now;
	if remaining <= chrono::Duration::zero() {
		return "Pending reset".to_string();
	}

	let minutes = remaining.num_minutes();
	if minutes < 60 {
		format!("Resets in {minutes}m")
	} else if remaining.num_hours() < 24 {
		format!("Resets in {}h {}m", remaining.num_hours(), minutes % 60)
	} else {
		format!("Resets {}", reset_at.with_timezone(tz).format("%a %-I:%M %p"))
	}
}
