//! The polling engine: one headless browser kept alive across polls.
//!
//! State only moves forward: `Idle -> Running -> Stopped`. A stopped
//! engine cannot be restarted; build a new one.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};
use usagewatch_protocol::{Organization, UsagePayload};

use crate::config::{MonitorConfig, ServiceEndpoints};
use crate::driver::{BrowserDriver, BrowserMode, BrowserSession, HttpResponse};
use crate::error::{Error, FetchError, Result};
use crate::session_store::SessionRecord;
use crate::usage::UsageSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
	Idle,
	Running,
	Stopped,
}

pub struct UsagePollingEngine<D: BrowserDriver> {
	driver: Arc<D>,
	endpoints: ServiceEndpoints,
	request_timeout: Duration,
	cookies: SessionRecord,
	session: Option<D::Session>,
	/// Set when the last context recreation failed; the next request retries it.
	context_lost: bool,
	organization_id: Option<String>,
	state: EngineState,
}

impl<D: BrowserDriver> UsagePollingEngine<D> {
	pub fn new(driver: Arc<D>, endpoints: ServiceEndpoints, cookies: SessionRecord, config: &MonitorConfig) -> Self {
		Self {
			driver,
			endpoints,
			request_timeout: config.request_timeout(),
			cookies,
			session: None,
			context_lost: false,
			organization_id: None,
			state: EngineState::Idle,
		}
	}

	pub fn state(&self) -> EngineState {
		self.state
	}

	/// Cached organization, if one has been resolved since the last reset.
	pub fn organization_id(&self) -> Option<&str> {
		self.organization_id.as_deref()
	}

	/// Launches the headless browser seeded with the current cookies.
	///
	/// A no-op while running. Fails with [`Error::EngineStopped`] after `stop`.
	pub async fn start(&mut self) -> Result<()> {
		match self.state {
			EngineState::Running => return Ok(()),
			EngineState::Stopped => return Err(Error::EngineStopped),
			EngineState::Idle => {}
		}

		let session = self.driver.launch(BrowserMode::Headless, &self.cookies).await?;
		self.session = Some(session);
		self.state = EngineState::Running;
		info!(target: "usagewatch.poll", cookies = self.cookies.len(), "polling engine started");
		Ok(())
	}

	/// One poll; any failure is logged and yields `None`.
	pub async fn fetch_usage_data(&mut self) -> Option<UsageSnapshot> {
		match self.poll().await {
			Ok(snapshot) => Some(snapshot),
			Err(e) => {
				warn!(target: "usagewatch.poll", error = %e, "usage fetch failed");
				None
			}
		}
	}

	/// One poll as [`Error::SessionExpired`] or [`Error::TransientFetch`].
	pub async fn poll(&mut self) -> Result<UsageSnapshot> {
		Ok(self.try_fetch().await?)
	}

	/// One poll with the failure classified.
	///
	/// On 401/403 the browser context is recreated from the stored cookies and
	/// the organization cache is cleared, in that order, before returning
	/// [`FetchError::SessionExpired`]. There is no retry within the call.
	pub async fn try_fetch(&mut self) -> std::result::Result<UsageSnapshot, FetchError> {
		if self.state != EngineState::Running {
			return Err(FetchError::NotRunning);
		}

		let organization_id = match self.organization_id.clone() {
			Some(id) => id,
			None => {
				let id = self.resolve_organization().await?;
				self.organization_id = Some(id.clone());
				id
			}
		};

		let response = self.request(&self.endpoints.usage_url(&organization_id)).await?;
		match response.status {
			200 => {
				let payload: UsagePayload = response.json().map_err(|e| FetchError::Parse(e.to_string()))?;
				let snapshot = UsageSnapshot::from_payload(&payload, Utc::now());
				debug!(
					target: "usagewatch.poll",
					session = snapshot.current_session.usage_percent,
					weekly = snapshot.weekly_all.usage_percent,
					sonnet = snapshot.weekly_sonnet.usage_percent,
					"usage fetched"
				);
				Ok(snapshot)
			}
			status @ (401 | 403) => {
				self.recover_from_expiry().await;
				Err(FetchError::SessionExpired { status })
			}
			status => Err(FetchError::Status(status)),
		}
	}

	async fn resolve_organization(&mut self) -> std::result::Result<String, FetchError> {
		let response = self.request(&self.endpoints.organizations_url()).await?;
		if !response.is_ok() {
			return Err(FetchError::OrganizationLookup(response.status));
		}
		let organizations: Vec<Organization> = response.json().map_err(|e| FetchError::Parse(e.to_string()))?;
		let id = organizations
			.into_iter()
			.next()
			.and_then(|org| org.uuid)
			.filter(|id| !id.is_empty())
			.ok_or(FetchError::NoOrganization)?;
		info!(target: "usagewatch.poll", organization = %id, "organization resolved");
		Ok(id)
	}

	async fn request(&mut self, url: &str) -> std::result::Result<HttpResponse, FetchError> {
		let timeout = self.request_timeout;
		if self.context_lost {
			self.reset_context()
				.await
				.map_err(|e| FetchError::Transport(e.to_string()))?;
		}
		let session = self.session.as_mut().ok_or(FetchError::NotRunning)?;
		session
			.get(url, timeout)
			.await
			.map_err(|e| FetchError::Transport(e.to_string()))
	}

	/// Recreates the context from the current cookies. A failure leaves
	/// `context_lost` set so the next request tries again.
	async fn reset_context(&mut self) -> Result<()> {
		let Some(session) = self.session.as_mut() else {
			return Ok(());
		};
		match session.reset_context(&self.cookies).await {
			Ok(()) => {
				if self.context_lost {
					info!(target: "usagewatch.poll", "browser context restored");
				}
				self.context_lost = false;
				Ok(())
			}
			Err(e) => {
				self.context_lost = true;
				warn!(target: "usagewatch.poll", error = %e, "context reset failed");
				Err(e)
			}
		}
	}

	async fn recover_from_expiry(&mut self) {
		// Logged in reset_context; the retry happens on the next request.
		let _ = self.reset_context().await;
		self.organization_id = None;
	}

	/// Replaces the cookie set and recreates the browser context with it.
	///
	/// Before `start` this only replaces the cookies used at launch.
	pub async fn update_cookies(&mut self, cookies: SessionRecord) -> Result<()> {
		if self.state == EngineState::Stopped {
			return Err(Error::EngineStopped);
		}
		self.cookies = cookies;
		self.organization_id = None;
		self.reset_context().await?;
		info!(target: "usagewatch.poll", cookies = self.cookies.len(), "cookies updated");
		Ok(())
	}

	/// Releases the browser. Safe before `start` and safe to repeat.
	pub async fn stop(&mut self) {
		if self.state == EngineState::Stopped {
			return;
		}
		if let Some(mut session) = self.session.take() {
			session.close().await;
		}
		self.organization_id = None;
		self.state = EngineState::Stopped;
		info!(target: "usagewatch.poll", "polling engine stopped");
	}
}
