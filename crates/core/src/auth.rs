//! Interactive login and non-interactive session verification.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};
use usagewatch_protocol::Cookie;

use crate::config::{MonitorConfig, ServiceEndpoints};
use crate::driver::{BrowserDriver, BrowserMode, BrowserSession};
use crate::error::{Error, Result};
use crate::session_store::{SessionRecord, SessionStore};

/// Heuristic for "the user has probably finished signing in".
///
/// Either a known session cookie has appeared, or the cookie jar grew by
/// more than `growth_threshold` since the wait began. Neither is proof; a
/// probe request confirms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginDetector {
	pub session_cookie_names: Vec<String>,
	pub growth_threshold: usize,
}

impl LoginDetector {
	pub fn from_config(config: &MonitorConfig) -> Self {
		Self {
			session_cookie_names: config.session_cookie_names.clone(),
			growth_threshold: config.cookie_growth_threshold,
		}
	}

	pub fn has_session_cookie(&self, cookies: &[Cookie]) -> bool {
		cookies
			.iter()
			.any(|c| self.session_cookie_names.iter().any(|name| *name == c.name))
	}

	pub fn session_likely(&self, initial_count: usize, cookies: &[Cookie]) -> bool {
		self.has_session_cookie(cookies) || cookies.len() > initial_count + self.growth_threshold
	}
}

/// Obtains a session through a visible browser, or checks a stored one.
pub struct AuthenticationFlow<D> {
	driver: Arc<D>,
	store: Arc<SessionStore>,
	endpoints: ServiceEndpoints,
	timeout: Duration,
	check_interval: Duration,
	probe_timeout: Duration,
	detector: LoginDetector,
}

impl<D: BrowserDriver> AuthenticationFlow<D> {
	pub fn new(driver: Arc<D>, store: Arc<SessionStore>, endpoints: ServiceEndpoints, config: &MonitorConfig) -> Self {
		Self {
			driver,
			store,
			endpoints,
			timeout: config.login_timeout(),
			check_interval: config.login_check_interval(),
			probe_timeout: config.probe_timeout(),
			detector: LoginDetector::from_config(config),
		}
	}

	/// Opens a visible browser on the landing page and waits for the user to sign in.
	///
	/// Returns the captured record once it has been persisted. The browser is
	/// closed on every path. Errors: [`Error::AuthTimeout`] when the wait
	/// bound elapses, any launch failure, or the store's write failure.
	pub async fn login_interactive(&self) -> Result<SessionRecord> {
		let mut session = self.driver.launch(BrowserMode::Visible, &SessionRecord::new()).await?;
		let outcome = self.await_login(&mut session).await;
		session.close().await;

		let record = outcome?;
		self.store.save(&record)?;
		info!(target: "usagewatch.auth", cookies = record.len(), "login captured");
		Ok(record)
	}

	async fn await_login(&self, session: &mut D::Session) -> Result<SessionRecord> {
		let landing = self.endpoints.landing_url();
		if let Err(e) = session.goto(&landing).await {
			warn!(target: "usagewatch.auth", url = %landing, error = %e, "landing page did not load; waiting anyway");
		}

		let started = Instant::now();
		let initial_count = match session.cookies().await {
			Ok(cookies) => cookies.len(),
			Err(_) => 0,
		};
		info!(target: "usagewatch.auth", timeout_secs = self.timeout.as_secs(), "waiting for sign-in");

		loop {
			if started.elapsed() > self.timeout {
				warn!(target: "usagewatch.auth", "sign-in wait timed out");
				return Err(Error::AuthTimeout(self.timeout));
			}

			match session.cookies().await {
				Ok(cookies) => {
					let named = self.detector.has_session_cookie(&cookies);
					debug!(
						target: "usagewatch.auth",
						elapsed_secs = started.elapsed().as_secs(),
						cookies = cookies.len(),
						session_cookie = named,
						"login check"
					);
					if self.detector.session_likely(initial_count, &cookies) && self.probe(session).await {
						let confirmed = session.cookies().await.unwrap_or(cookies);
						return Ok(SessionRecord::from_cookies(&confirmed));
					}
				}
				Err(e) => debug!(target: "usagewatch.auth", error = %e, "cookie read failed"),
			}

			tokio::time::sleep(self.check_interval).await;
		}
	}

	/// One request to the organizations list from the page the user is on.
	///
	/// The page is never navigated; while it is off the service origin the
	/// answer is "not yet".
	async fn probe(&self, session: &mut D::Session) -> bool {
		match session
			.get_in_place(&self.endpoints.organizations_url(), self.probe_timeout)
			.await
		{
			Ok(Some(response)) => {
				info!(target: "usagewatch.auth", status = response.status, "login probe");
				response.is_ok()
			}
			Ok(None) => {
				debug!(target: "usagewatch.auth", "page is off the service origin; sign-in still in progress");
				false
			}
			Err(e) => {
				debug!(target: "usagewatch.auth", error = %e, "login probe failed");
				false
			}
		}
	}

	/// True when `cookies` still authenticate against the organizations list.
	///
	/// Launch and request failures are logged and count as invalid.
	pub async fn verify_session(&self, cookies: &SessionRecord) -> bool {
		let mut session = match self.driver.launch(BrowserMode::Headless, cookies).await {
			Ok(session) => session,
			Err(e) => {
				warn!(target: "usagewatch.auth", error = %e, "verification browser failed to start");
				return false;
			}
		};

		let url = self.endpoints.organizations_url();
		let valid = match session.get(&url, self.probe_timeout).await {
			Ok(response) if response.is_ok() => true,
			Ok(response) => {
				info!(
					target: "usagewatch.auth",
					status = response.status,
					body = response.body_preview(),
					"stored session rejected"
				);
				false
			}
			Err(e) => {
				warn!(target: "usagewatch.auth", error = %e, "verification request failed");
				false
			}
		};
		session.close().await;
		valid
	}
}
