//! In-memory browser used by the integration tests.
//!
//! Every launched session shares one [`FakeState`], so a test can script
//! replies up front and inspect call counts afterwards.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use usagewatch::{BrowserDriver, BrowserMode, BrowserSession, Cookie, Error, HttpResponse, MonitorConfig, Result, SessionRecord, ServiceEndpoints};

pub const ORGS_BODY: &str = r#"[{"uuid":"org-1","name":"Personal"},{"uuid":"org-2","name":"Team"}]"#;
pub const USAGE_BODY: &str = r#"{
	"five_hour": { "utilization": 42.7, "resets_at": "2026-01-25T14:35:08.123456+00:00" },
	"seven_day": { "utilization": 18.0, "resets_at": "2026-01-30T09:00:00+00:00" },
	"seven_day_sonnet": null
}"#;

#[derive(Debug, Clone)]
pub enum Reply {
	Respond(u16, String),
	/// The in-page fetch throws.
	Fail,
}

impl Reply {
	pub fn status(status: u16) -> Self {
		Reply::Respond(status, String::new())
	}

	pub fn ok(body: &str) -> Self {
		Reply::Respond(200, body.to_string())
	}
}

#[derive(Debug, Default)]
pub struct FakeState {
	/// Replies for the organizations list; `ORGS_BODY` once exhausted.
	pub org_replies: VecDeque<Reply>,
	/// Replies for the usage endpoint; `USAGE_BODY` once exhausted.
	pub usage_replies: VecDeque<Reply>,
	/// One jar per `cookies()` call; the last jar repeats.
	pub jars: VecDeque<Vec<Cookie>>,
	pub fail_launch: bool,
	/// Number of upcoming `reset_context` calls that fail.
	pub failing_resets: usize,
	/// Where the user has taken the page; `None` means the service origin.
	pub page_origin: Option<String>,
	/// Cancels the token when the usage endpoint is hit for the n-th time.
	pub cancel_at_usage_call: Option<(usize, CancellationToken)>,

	pub launches: Vec<(BrowserMode, SessionRecord)>,
	pub gotos: Vec<String>,
	pub in_place_requests: usize,
	pub org_calls: usize,
	pub usage_calls: usize,
	pub resets: Vec<SessionRecord>,
	pub closes: usize,
}

#[derive(Clone, Default)]
pub struct FakeDriver {
	pub state: Arc<Mutex<FakeState>>,
}

impl FakeDriver {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn script(&self, f: impl FnOnce(&mut FakeState)) -> &Self {
		f(&mut self.state.lock());
		self
	}

	pub fn org_calls(&self) -> usize {
		self.state.lock().org_calls
	}

	pub fn usage_calls(&self) -> usize {
		self.state.lock().usage_calls
	}

	pub fn resets(&self) -> usize {
		self.state.lock().resets.len()
	}

	pub fn closes(&self) -> usize {
		self.state.lock().closes
	}
}

#[async_trait]
impl BrowserDriver for FakeDriver {
	type Session = FakeSession;

	async fn launch(&self, mode: BrowserMode, cookies: &SessionRecord) -> Result<FakeSession> {
		let mut state = self.state.lock();
		if state.fail_launch {
			return Err(Error::FatalStartup("no browser installed".into()));
		}
		state.launches.push((mode, cookies.clone()));
		Ok(FakeSession {
			state: Arc::clone(&self.state),
			closed: false,
		})
	}
}

pub struct FakeSession {
	state: Arc<Mutex<FakeState>>,
	closed: bool,
}

#[async_trait]
impl BrowserSession for FakeSession {
	async fn goto(&mut self, url: &str) -> Result<()> {
		self.state.lock().gotos.push(url.to_string());
		Ok(())
	}

	async fn cookies(&mut self) -> Result<Vec<Cookie>> {
		let mut state = self.state.lock();
		let jar = if state.jars.len() > 1 {
			state.jars.pop_front().unwrap_or_default()
		} else {
			state.jars.front().cloned().unwrap_or_default()
		};
		Ok(jar)
	}

	async fn get(&mut self, url: &str, _timeout: Duration) -> Result<HttpResponse> {
		let mut state = self.state.lock();
		if state.page_origin.take().is_some() {
			state.gotos.push("https://claude.ai/".to_string());
		}
		state.reply(url)
	}

	async fn get_in_place(&mut self, url: &str, _timeout: Duration) -> Result<Option<HttpResponse>> {
		let mut state = self.state.lock();
		state.in_place_requests += 1;
		if state.page_origin.is_some() {
			return Ok(None);
		}
		state.reply(url).map(Some)
	}

	async fn reset_context(&mut self, cookies: &SessionRecord) -> Result<()> {
		let mut state = self.state.lock();
		state.resets.push(cookies.clone());
		if state.failing_resets > 0 {
			state.failing_resets -= 1;
			return Err(Error::Script("Target closed".into()));
		}
		Ok(())
	}

	async fn close(&mut self) {
		if !self.closed {
			self.closed = true;
			self.state.lock().closes += 1;
		}
	}
}

impl FakeState {
	fn reply(&mut self, url: &str) -> Result<HttpResponse> {
		let reply = if url.ends_with("/usage") {
			self.usage_calls += 1;
			if let Some((at, token)) = &self.cancel_at_usage_call {
				if *at == self.usage_calls {
					token.cancel();
				}
			}
			self.usage_replies.pop_front().unwrap_or_else(|| Reply::ok(USAGE_BODY))
		} else if url.ends_with("/api/organizations") {
			self.org_calls += 1;
			self.org_replies.pop_front().unwrap_or_else(|| Reply::ok(ORGS_BODY))
		} else {
			Reply::status(404)
		};

		match reply {
			Reply::Respond(status, body) => Ok(HttpResponse::new(status, body)),
			Reply::Fail => Err(Error::Script("TypeError: Failed to fetch".into())),
		}
	}
}

pub fn cookie(name: &str, value: &str) -> Cookie {
	Cookie {
		name: name.to_string(),
		value: value.to_string(),
		domain: Some(".claude.ai".to_string()),
		path: Some("/".to_string()),
		expires: None,
		http_only: None,
		secure: None,
	}
}

pub fn stored_record() -> SessionRecord {
	[("sessionKey", "sk-ant-stored"), ("lastActiveOrg", "org-1")].into_iter().collect()
}

pub fn config() -> MonitorConfig {
	MonitorConfig::default()
}

pub fn endpoints() -> ServiceEndpoints {
	ServiceEndpoints::parse("https://claude.ai").unwrap()
}
