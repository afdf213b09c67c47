//! JSON shapes served by the organizations and usage endpoints.
//!
//! Every field is optional on the wire. Defaults for missing windows are
//! applied when the payload is decoded into a snapshot, not here.

use serde::{Deserialize, Serialize};

/// One entry of `GET /api/organizations`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Organization {
	#[serde(default)]
	pub uuid: Option<String>,
	#[serde(default)]
	pub name: Option<String>,
}

/// Body of `GET /api/organizations/{id}/usage`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UsagePayload {
	#[serde(default)]
	pub five_hour: Option<WindowPayload>,
	#[serde(default)]
	pub seven_day: Option<WindowPayload>,
	#[serde(default)]
	pub seven_day_sonnet: Option<WindowPayload>,
}

/// A single quota window as reported by the service.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct WindowPayload {
	/// Percent of the window consumed, already normalized to 0-100.
	#[serde(default)]
	pub utilization: Option<f64>,
	/// ISO-8601 timestamp of the next reset.
	#[serde(default)]
	pub resets_at: Option<String>,
}
