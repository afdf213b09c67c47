//! The automated-browser seam.
//!
//! The login flow and the polling engine never talk to a browser directly;
//! they hold a [`BrowserDriver`] and the sessions it launches. Production
//! uses [`ChromeDriver`](crate::ChromeDriver); tests script an in-memory fake.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use usagewatch_protocol::Cookie;

use crate::error::Result;
use crate::session_store::SessionRecord;

const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserMode {
	/// No window; used for verification and polling.
	Headless,
	/// A window the user signs in through.
	Visible,
}

/// Outcome of an authenticated request made from inside the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
	pub status: u16,
	pub body: String,
}

impl HttpResponse {
	pub fn new(status: u16, body: impl Into<String>) -> Self {
		Self {
			status,
			body: body.into(),
		}
	}

	pub fn is_ok(&self) -> bool {
		self.status == 200
	}

	pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
		serde_json::from_str(&self.body)
	}

	/// The first 200 characters of the body, for logs.
	pub fn body_preview(&self) -> &str {
		match self.body.char_indices().nth(PREVIEW_CHARS) {
			Some((end, _)) => &self.body[..end],
			None => &self.body,
		}
	}
}

/// Starts browser sessions seeded with a cookie set.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
	type Session: BrowserSession;

	/// Launches a browser with one context holding `cookies` and one open page.
	async fn launch(&self, mode: BrowserMode, cookies: &SessionRecord) -> Result<Self::Session>;
}

/// One browser, one context, one page.
///
/// Sessions are owned by a single task and never shared.
#[async_trait]
pub trait BrowserSession: Send {
	/// Navigates the page and waits for the document to finish loading.
	async fn goto(&mut self, url: &str) -> Result<()>;

	/// Every cookie currently held by the context.
	async fn cookies(&mut self) -> Result<Vec<Cookie>>;

	/// Credentialed GET issued by the page itself, bounded by `timeout`.
	///
	/// Moves the page to `url`'s origin first when it is elsewhere.
	async fn get(&mut self, url: &str, timeout: Duration) -> Result<HttpResponse>;

	/// Like [`get`](Self::get), but never navigates.
	///
	/// `None` when the page is not on `url`'s origin, e.g. while the user is
	/// on an identity provider's sign-in page.
	async fn get_in_place(&mut self, url: &str, timeout: Duration) -> Result<Option<HttpResponse>>;

	/// Throws away the context and page, then recreates both seeded with `cookies`.
	async fn reset_context(&mut self, cookies: &SessionRecord) -> Result<()>;

	/// Releases the page, the context, and the browser. Later calls do nothing.
	async fn close(&mut self);
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn preview_is_bounded_by_characters() {
		let body = "é".repeat(500);
		let response = HttpResponse::new(403, body);
		assert_eq!(response.body_preview().chars().count(), 200);

		let short = HttpResponse::new(500, "oops");
		assert_eq!(short.body_preview(), "oops");
	}

	#[test]
	fn only_200_is_ok() {
		assert!(HttpResponse::new(200, "").is_ok());
		assert!(!HttpResponse::new(204, "").is_ok());
	}
}
