//! Parsed usage snapshots.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use usagewatch_protocol::{UsagePayload, WindowPayload};

/// The API reports utilization already normalized to percent.
pub const QUOTA_LIMIT: u8 = 100;

/// One quota window. Absent source data decodes to 0% with no reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaWindow {
	pub usage_percent: u8,
	pub limit: u8,
	pub reset_at: Option<DateTime<Utc>>,
}

impl Default for QuotaWindow {
	fn default() -> Self {
		Self {
			usage_percent: 0,
			limit: QUOTA_LIMIT,
			reset_at: None,
		}
	}
}

impl QuotaWindow {
	pub fn from_payload(payload: Option<&WindowPayload>) -> Self {
		let Some(payload) = payload else {
			return Self::default();
		};
		Self {
			usage_percent: payload.utilization.map(truncate_percent).unwrap_or(0),
			limit: QUOTA_LIMIT,
			reset_at: payload.resets_at.as_deref().and_then(parse_reset),
		}
	}

	/// Consumed share as 0-100; 0 when the limit is 0.
	pub fn percent(&self) -> f64 {
		if self.limit == 0 {
			0.0
		} else {
			f64::from(self.usage_percent) / f64::from(self.limit) * 100.0
		}
	}
}

/// Result of one successful poll. Never mutated; the next poll replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
	/// Rolling five-hour window.
	pub current_session: QuotaWindow,
	/// Rolling seven-day window, all models.
	pub weekly_all: QuotaWindow,
	/// Rolling seven-day window, Sonnet only.
	pub weekly_sonnet: QuotaWindow,
	pub last_updated: DateTime<Utc>,
}

impl UsageSnapshot {
	pub fn from_payload(payload: &UsagePayload, now: DateTime<Utc>) -> Self {
		Self {
			current_session: QuotaWindow::from_payload(payload.five_hour.as_ref()),
			weekly_all: QuotaWindow::from_payload(payload.seven_day.as_ref()),
			weekly_sonnet: QuotaWindow::from_payload(payload.seven_day_sonnet.as_ref()),
			last_updated: now,
		}
	}
}

/// 73.9 becomes 73: truncation, clamped into 0..=100.
fn truncate_percent(utilization: f64) -> u8 {
	utilization.trunc().clamp(0.0, f64::from(QUOTA_LIMIT)) as u8
}

/// RFC 3339 first; offset-less timestamps are taken as UTC.
fn parse_reset(raw: &str) -> Option<DateTime<Utc>> {
	if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
		return Some(dt.with_timezone(&Utc));
	}
	match NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
		Ok(naive) => Some(naive.and_utc()),
		Err(e) => {
			debug!(target: "usagewatch.poll", value = raw, error = %e, "unparseable resets_at");
			None
		}
	}
}

#[cfg(test)]
mod tests {
	use chrono::TimeZone;
	use serde_json::json;

	use super::*;

	fn payload(value: serde_json::Value) -> UsagePayload {
		serde_json::from_value(value).unwrap()
	}

	#[test]
	fn utilization_is_truncated_not_rounded() {
		let window = QuotaWindow::from_payload(Some(&WindowPayload {
			utilization: Some(73.9),
			resets_at: None,
		}));
		assert_eq!(window.usage_percent, 73);
	}

	#[test]
	fn missing_sonnet_window_defaults() {
		let snapshot = UsageSnapshot::from_payload(
			&payload(json!({
				"five_hour": { "utilization": 10.0, "resets_at": "2026-01-25T14:35:08.123456+00:00" },
				"seven_day": { "utilization": 55.5, "resets_at": "2026-01-30T09:00:00Z" }
			})),
			Utc::now(),
		);
		assert_eq!(snapshot.weekly_sonnet, QuotaWindow::default());
		assert_eq!(snapshot.weekly_sonnet.usage_percent, 0);
		assert_eq!(snapshot.weekly_sonnet.limit, 100);
		assert!(snapshot.weekly_sonnet.reset_at.is_none());
		assert_eq!(snapshot.weekly_all.usage_percent, 55);
	}

	#[test]
	fn null_window_and_missing_fields_default() {
		let snapshot = UsageSnapshot::from_payload(
			&payload(json!({ "five_hour": null, "seven_day": {}, "seven_day_sonnet": { "utilization": 4 } })),
			Utc::now(),
		);
		assert_eq!(snapshot.current_session, QuotaWindow::default());
		assert_eq!(snapshot.weekly_all, QuotaWindow::default());
		assert_eq!(snapshot.weekly_sonnet.usage_percent, 4);
		assert!(snapshot.weekly_sonnet.reset_at.is_none());
	}

	#[test]
	fn reset_offsets_are_normalized_to_utc() {
		let reset = parse_reset("2026-01-25T23:35:08+09:00").unwrap();
		assert_eq!(reset, Utc.with_ymd_and_hms(2026, 1, 25, 14, 35, 8).unwrap());
	}

	#[test]
	fn naive_reset_is_taken_as_utc() {
		let reset = parse_reset("2026-01-25T14:35:08").unwrap();
		assert_eq!(reset, Utc.with_ymd_and_hms(2026, 1, 25, 14, 35, 8).unwrap());
	}

	#[test]
	fn garbage_reset_is_absent() {
		assert!(parse_reset("tomorrow-ish").is_none());
	}

	#[test]
	fn out_of_range_utilization_is_clamped() {
		assert_eq!(truncate_percent(-3.2), 0);
		assert_eq!(truncate_percent(140.0), 100);
		assert_eq!(truncate_percent(f64::NAN), 0);
	}

	#[test]
	fn percent_guards_zero_limit() {
		let window = QuotaWindow {
			usage_percent: 40,
			limit: 0,
			reset_at: None,
		};
		assert_eq!(window.percent(), 0.0);
	}
}
