//! Monitor configuration and derived service endpoints.
//!
//! Every field has a default, so an absent config file yields a working
//! setup. The file, when present, is JSON with camelCase keys:
//!
//! ```json
//! { "pollIntervalSecs": 120, "sessionFile": "/home/me/.usagewatch/session.json" }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

const APP_DIR: &str = "usagewatch";
const CONFIG_FILE: &str = "config.json";
const SESSION_FILE: &str = "session.json";

pub const DEFAULT_USER_AGENT: &str =
	"Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorConfig {
	pub service_url: String,
	pub cookie_domain: String,
	/// Overrides `<config dir>/usagewatch/session.json`.
	pub session_file: Option<PathBuf>,
	/// Overrides browser discovery.
	pub browser_executable: Option<PathBuf>,
	pub poll_interval_secs: u64,
	pub login_timeout_secs: u64,
	pub login_check_interval_secs: u64,
	pub probe_timeout_secs: u64,
	pub request_timeout_secs: u64,
	pub navigation_timeout_secs: u64,
	/// Cookies whose presence suggests a completed login.
	pub session_cookie_names: Vec<String>,
	/// Login is also suspected once the cookie count grows by more than this.
	pub cookie_growth_threshold: usize,
	pub user_agent: String,
}

impl Default for MonitorConfig {
	fn default() -> Self {
		Self {
			service_url: "https://claude.ai".to_string(),
			cookie_domain: ".claude.ai".to_string(),
			session_file: None,
			browser_executable: None,
			poll_interval_secs: 60,
			login_timeout_secs: 300,
			login_check_interval_secs: 3,
			probe_timeout_secs: 10,
			request_timeout_secs: 30,
			navigation_timeout_secs: 30,
			session_cookie_names: ["sessionKey", "__ssid", "lastActiveOrg"].map(str::to_string).to_vec(),
			cookie_growth_threshold: 3,
			user_agent: DEFAULT_USER_AGENT.to_string(),
		}
	}
}

impl MonitorConfig {
	/// Loads `path`, or the default config file when `path` is `None`.
	///
	/// A missing file yields defaults; a malformed one is an error.
	pub fn load(path: Option<&Path>) -> Result<Self> {
		let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
		let content = match std::fs::read_to_string(&path) {
			Ok(content) => content,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
			Err(e) => return Err(e.into()),
		};
		let config: Self = serde_json::from_str(&content).map_err(|e| Error::Config {
			path: path.clone(),
			reason: e.to_string(),
		})?;
		config.endpoints().map_err(|reason| Error::Config { path, reason })?;
		Ok(config)
	}

	pub fn session_file(&self) -> PathBuf {
		self.session_file
			.clone()
			.unwrap_or_else(|| config_dir().join(SESSION_FILE))
	}

	pub fn endpoints(&self) -> std::result::Result<ServiceEndpoints, String> {
		ServiceEndpoints::parse(&self.service_url)
	}

	pub fn poll_interval(&self) -> Duration {
		Duration::from_secs(self.poll_interval_secs.max(1))
	}

	pub fn login_timeout(&self) -> Duration {
		Duration::from_secs(self.login_timeout_secs)
	}

	pub fn login_check_interval(&self) -> Duration {
		Duration::from_secs(self.login_check_interval_secs.max(1))
	}

	pub fn probe_timeout(&self) -> Duration {
		Duration::from_secs(self.probe_timeout_secs)
	}

	pub fn request_timeout(&self) -> Duration {
		Duration::from_secs(self.request_timeout_secs)
	}

	pub fn navigation_timeout(&self) -> Duration {
		Duration::from_secs(self.navigation_timeout_secs)
	}
}

/// `<platform config dir>/usagewatch`, or `./config` when the platform has none.
pub fn config_dir() -> PathBuf {
	dirs::config_dir()
		.map(|dir| dir.join(APP_DIR))
		.unwrap_or_else(|| PathBuf::from("config"))
}

pub fn default_config_path() -> PathBuf {
	config_dir().join(CONFIG_FILE)
}

/// URLs of the landing page and the two API endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoints {
	base: Url,
}

impl ServiceEndpoints {
	pub fn parse(service_url: &str) -> std::result::Result<Self, String> {
		let base = Url::parse(service_url).map_err(|e| format!("serviceUrl {service_url:?}: {e}"))?;
		if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
			return Err(format!("serviceUrl {service_url:?} must be an http(s) URL"));
		}
		Ok(Self { base })
	}

	pub fn landing_url(&self) -> String {
		self.base.as_str().to_string()
	}

	pub fn organizations_url(&self) -> String {
		self.join("api/organizations")
	}

	pub fn usage_url(&self, organization_id: &str) -> String {
		self.join(&format!("api/organizations/{organization_id}/usage"))
	}

	fn join(&self, path: &str) -> String {
		format!("{}/{}", self.base.as_str().trim_end_matches('/'), path)
	}
}

#[cfg(test)]
mod tests {
	use tempfile::TempDir;

	use super::*;

	#[test]
	fn endpoints_are_derived_from_service_url() {
		let endpoints = ServiceEndpoints::parse("https://claude.ai").unwrap();
		assert_eq!(endpoints.landing_url(), "https://claude.ai/");
		assert_eq!(endpoints.organizations_url(), "https://claude.ai/api/organizations");
		assert_eq!(endpoints.usage_url("org-1"), "https://claude.ai/api/organizations/org-1/usage");
	}

	#[test]
	fn endpoints_reject_non_http_urls() {
		assert!(ServiceEndpoints::parse("file:///tmp").is_err());
		assert!(ServiceEndpoints::parse("not a url").is_err());
	}

	#[test]
	fn missing_file_yields_defaults() {
		let temp = TempDir::new().unwrap();
		let config = MonitorConfig::load(Some(&temp.path().join("absent.json"))).unwrap();
		assert_eq!(config, MonitorConfig::default());
		assert_eq!(config.login_timeout(), Duration::from_secs(300));
		assert_eq!(config.login_check_interval(), Duration::from_secs(3));
	}

	#[test]
	fn partial_file_overrides_only_given_fields() {
		let temp = TempDir::new().unwrap();
		let path = temp.path().join("config.json");
		std::fs::write(&path, r#"{ "pollIntervalSecs": 120, "cookieGrowthThreshold": 5 }"#).unwrap();

		let config = MonitorConfig::load(Some(&path)).unwrap();
		assert_eq!(config.poll_interval(), Duration::from_secs(120));
		assert_eq!(config.cookie_growth_threshold, 5);
		assert_eq!(config.service_url, "https://claude.ai");
	}

	#[test]
	fn malformed_file_is_a_config_error() {
		let temp = TempDir::new().unwrap();
		let path = temp.path().join("config.json");
		std::fs::write(&path, "{ not json").unwrap();
		assert!(matches!(MonitorConfig::load(Some(&path)), Err(Error::Config { .. })));
	}

	#[test]
	fn bad_service_url_is_rejected_at_load() {
		let temp = TempDir::new().unwrap();
		let path = temp.path().join("config.json");
		std::fs::write(&path, r#"{ "serviceUrl": "ftp://example.com" }"#).unwrap();
		assert!(matches!(MonitorConfig::load(Some(&path)), Err(Error::Config { .. })));
	}

	#[test]
	fn explicit_session_file_wins() {
		let config = MonitorConfig {
			session_file: Some(PathBuf::from("/tmp/s.json")),
			..MonitorConfig::default()
		};
		assert_eq!(config.session_file(), PathBuf::from("/tmp/s.json"));
	}
}
