//! Cookie shapes used by `Storage.setCookies` / `Storage.getCookies`.

use serde::{Deserialize, Serialize};

/// Cookie as reported by the browser.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
	pub name: String,
	pub value: String,
	#[serde(default)]
	pub domain: Option<String>,
	#[serde(default)]
	pub path: Option<String>,
	/// Seconds since the epoch; `-1` for session cookies.
	#[serde(default)]
	pub expires: Option<f64>,
	#[serde(default)]
	pub http_only: Option<bool>,
	#[serde(default)]
	pub secure: Option<bool>,
}

/// Cookie to inject into a browser context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CookieParam {
	pub name: String,
	pub value: String,
	pub domain: String,
	pub path: String,
}

impl CookieParam {
	/// Binds `name=value` to `domain` at the root path.
	pub fn rooted(name: impl Into<String>, value: impl Into<String>, domain: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			value: value.into(),
			domain: domain.into(),
			path: "/".to_string(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn browser_cookie_tolerates_missing_optional_fields() {
		let cookie: Cookie = serde_json::from_str(r#"{"name":"sessionKey","value":"sk-1"}"#).unwrap();
		assert_eq!(cookie.name, "sessionKey");
		assert!(cookie.domain.is_none());
	}

	#[test]
	fn rooted_param_serializes_camel_case() {
		let param = CookieParam::rooted("a", "b", ".claude.ai");
		let value = serde_json::to_value(&param).unwrap();
		assert_eq!(value["domain"], ".claude.ai");
		assert_eq!(value["path"], "/");
	}
}
