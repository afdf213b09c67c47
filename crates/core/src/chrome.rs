//! [`BrowserDriver`] backed by a locally launched Chromium over the DevTools protocol.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};
use url::Url;
use usagewatch_protocol::{
	AttachToTargetResult, Cookie, CreateBrowserContextResult, CreateTargetResult, EvaluateResult, GetCookiesResult,
	NavigateResult,
};
use usagewatch_runtime::{BrowserProcess, Connection, LaunchOptions};

use crate::config::MonitorConfig;
use crate::driver::{BrowserDriver, BrowserMode, BrowserSession, HttpResponse};
use crate::error::{Error, Result};
use crate::session_store::SessionRecord;

const READY_POLL: Duration = Duration::from_millis(100);
const TEARDOWN_STEP: Duration = Duration::from_secs(5);

/// Launches one Chromium per session.
#[derive(Debug, Clone)]
pub struct ChromeDriver {
	executable: Option<PathBuf>,
	settings: PageSettings,
}

#[derive(Debug, Clone)]
struct PageSettings {
	user_agent: String,
	cookie_domain: String,
	navigation_timeout: Duration,
}

impl ChromeDriver {
	pub fn new(config: &MonitorConfig) -> Self {
		Self {
			executable: config.browser_executable.clone(),
			settings: PageSettings {
				user_agent: config.user_agent.clone(),
				cookie_domain: config.cookie_domain.clone(),
				navigation_timeout: config.navigation_timeout(),
			},
		}
	}
}

#[async_trait]
impl BrowserDriver for ChromeDriver {
	type Session = ChromeSession;

	async fn launch(&self, mode: BrowserMode, cookies: &SessionRecord) -> Result<ChromeSession> {
		let mut options = match mode {
			BrowserMode::Headless => LaunchOptions::headless(),
			BrowserMode::Visible => LaunchOptions::visible(),
		};
		options.executable = self.executable.clone();

		let process = BrowserProcess::launch(&options).await.map_err(startup_error)?;
		let conn = Connection::connect(process.ws_endpoint()).await?;
		let mut session = ChromeSession {
			process,
			tab: Tab::new(conn, self.settings.clone()),
			closed: false,
		};

		if let Err(e) = session.tab.open_context(cookies).await {
			session.close().await;
			return Err(e);
		}
		info!(target: "usagewatch.browser", ?mode, cookies = cookies.len(), "browser session ready");
		Ok(session)
	}
}

#[derive(Debug)]
struct Page {
	context_id: String,
	target_id: String,
	session_id: String,
}

/// A browser process, its DevTools connection, and the one context/page pair in use.
pub struct ChromeSession {
	process: BrowserProcess,
	tab: Tab,
	closed: bool,
}

#[derive(Deserialize)]
struct FetchOutcome {
	status: u16,
	#[serde(default)]
	body: String,
}

/// The context/page pair and the connection they are driven through.
struct Tab {
	conn: Connection,
	settings: PageSettings,
	page: Option<Page>,
}

impl Tab {
	fn new(conn: Connection, settings: PageSettings) -> Self {
		Self {
			conn,
			settings,
			page: None,
		}
	}

	fn page(&self) -> Result<&Page> {
		self.page.as_ref().ok_or(Error::Browser(usagewatch_runtime::Error::ChannelClosed))
	}

	async fn open_context(&mut self, cookies: &SessionRecord) -> Result<()> {
		let created: CreateBrowserContextResult = self
			.conn
			.call("Target.createBrowserContext", json!({ "disposeOnDetach": true }), None)
			.await?;
		let context_id = created.browser_context_id;

		match self.open_page(&context_id, cookies).await {
			Ok((target_id, session_id)) => {
				debug!(target: "usagewatch.browser", context = %context_id, target_id = %target_id, "context opened");
				self.page = Some(Page {
					context_id,
					target_id,
					session_id,
				});
				Ok(())
			}
			Err(e) => {
				self.dispose_context(&context_id).await;
				Err(e)
			}
		}
	}

	async fn open_page(&self, context_id: &str, cookies: &SessionRecord) -> Result<(String, String)> {
		if !cookies.is_empty() {
			let params = cookies.to_cookie_params(&self.settings.cookie_domain);
			self.conn
				.send(
					"Storage.setCookies",
					json!({ "cookies": params, "browserContextId": context_id }),
					None,
				)
				.await?;
		}

		let target: CreateTargetResult = self
			.conn
			.call(
				"Target.createTarget",
				json!({ "url": "about:blank", "browserContextId": context_id }),
				None,
			)
			.await?;
		let attached: AttachToTargetResult = self
			.conn
			.call(
				"Target.attachToTarget",
				json!({ "targetId": target.target_id, "flatten": true }),
				None,
			)
			.await?;
		self.conn
			.send(
				"Network.setUserAgentOverride",
				json!({ "userAgent": self.settings.user_agent }),
				Some(&attached.session_id),
			)
			.await?;

		Ok((target.target_id, attached.session_id))
	}

	async fn close_context(&mut self) {
		let Some(page) = self.page.take() else {
			return;
		};
		self.teardown_step("Target.closeTarget", json!({ "targetId": page.target_id }))
			.await;
		self.dispose_context(&page.context_id).await;
	}

	async fn dispose_context(&self, context_id: &str) {
		self.teardown_step("Target.disposeBrowserContext", json!({ "browserContextId": context_id }))
			.await;
	}

	/// Sends a teardown command; failures and hangs are logged and ignored.
	async fn teardown_step(&self, method: &str, params: Value) {
		match tokio::time::timeout(TEARDOWN_STEP, self.conn.send(method, params, None)).await {
			Ok(Ok(_)) => {}
			Ok(Err(e)) => debug!(target: "usagewatch.browser", method, error = %e, "teardown step failed"),
			Err(_) => debug!(target: "usagewatch.browser", method, "teardown step timed out"),
		}
	}

	async fn evaluate(&self, expression: &str) -> Result<Value> {
		let page = self.page()?;
		let evaluated: EvaluateResult = self
			.conn
			.call(
				"Runtime.evaluate",
				json!({ "expression": expression, "awaitPromise": true, "returnByValue": true }),
				Some(&page.session_id),
			)
			.await?;
		if let Some(exception) = evaluated.exception_details {
			return Err(Error::Script(exception.message()));
		}
		Ok(evaluated.result.value.unwrap_or(Value::Null))
	}

	async fn goto(&self, url: &str) -> Result<()> {
		let page = self.page()?;
		let navigated: NavigateResult = self
			.conn
			.call("Page.navigate", json!({ "url": url }), Some(&page.session_id))
			.await?;
		if let Some(reason) = navigated.error_text.filter(|text| !text.is_empty()) {
			return Err(Error::Navigation {
				url: url.to_string(),
				reason,
			});
		}
		debug!(target: "usagewatch.browser", %url, frame = %navigated.frame_id, "navigated");
		self.wait_until_loaded(url).await
	}

	async fn wait_until_loaded(&self, url: &str) -> Result<()> {
		let ready = async {
			loop {
				// The execution context is torn down mid-navigation; errors mean "not yet".
				if let Ok(Value::String(state)) = self.evaluate("document.readyState").await {
					if state == "complete" {
						return;
					}
				}
				tokio::time::sleep(READY_POLL).await;
			}
		};
		tokio::time::timeout(self.settings.navigation_timeout, ready)
			.await
			.map_err(|_| Error::Navigation {
				url: url.to_string(),
				reason: format!("page did not finish loading within {:?}", self.settings.navigation_timeout),
			})
	}

	async fn cookies(&self) -> Result<Vec<Cookie>> {
		let page = self.page()?;
		let result: GetCookiesResult = self
			.conn
			.call("Storage.getCookies", json!({ "browserContextId": page.context_id }), None)
			.await?;
		Ok(result.cookies)
	}

	async fn on_origin(&self, origin: &str) -> Result<bool> {
		let current = self.evaluate("location.origin").await?;
		Ok(current.as_str() == Some(origin))
	}

	/// Runs the credentialed fetch on whatever document the page holds.
	async fn fetch(&self, url: &str, timeout: Duration) -> Result<HttpResponse> {
		let value = self.evaluate(&fetch_expression(url, timeout)).await?;
		let outcome: FetchOutcome = serde_json::from_value(value)?;
		Ok(HttpResponse::new(outcome.status, outcome.body))
	}

	async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse> {
		let origin = origin_of(url)?;
		let request = async {
			// Same-origin, so the request carries the context's cookies.
			if !self.on_origin(&origin).await? {
				debug!(target: "usagewatch.browser", %origin, "moving page to request origin");
				self.goto(&format!("{origin}/")).await?;
			}
			self.fetch(url, timeout).await
		};
		tokio::time::timeout(timeout, request)
			.await
			.unwrap_or_else(|_| Err(request_timed_out(url, timeout)))
	}

	async fn get_in_place(&self, url: &str, timeout: Duration) -> Result<Option<HttpResponse>> {
		let origin = origin_of(url)?;
		let request = async {
			if !self.on_origin(&origin).await? {
				debug!(target: "usagewatch.browser", %origin, "page is off the request origin");
				return Ok(None);
			}
			self.fetch(url, timeout).await.map(Some)
		};
		tokio::time::timeout(timeout, request)
			.await
			.unwrap_or_else(|_| Err(request_timed_out(url, timeout)))
	}
}

/// `scheme://host[:port]` of `url`.
fn origin_of(url: &str) -> Result<String> {
	let parsed = Url::parse(url).map_err(|e| Error::Navigation {
		url: url.to_string(),
		reason: e.to_string(),
	})?;
	Ok(parsed.origin().ascii_serialization())
}

fn request_timed_out(url: &str, timeout: Duration) -> Error {
	usagewatch_runtime::Error::Timeout(format!("GET {url}"), timeout).into()
}

/// Launch failures that mean no browser can run at all become [`Error::FatalStartup`].
fn startup_error(error: usagewatch_runtime::Error) -> Error {
	if error.is_unavailable() {
		Error::FatalStartup(error.to_string())
	} else {
		Error::Browser(error)
	}
}

/// `fetch` of `url` with credentials, returning `{ status, body }`.
fn fetch_expression(url: &str, timeout: Duration) -> String {
	let quoted = Value::String(url.to_string()).to_string();
	format!(
		r#"(async () => {{
	const response = await fetch({quoted}, {{ credentials: "include", signal: AbortSignal.timeout({ms}) }});
	return {{ status: response.status, body: await response.text() }};
}})()"#,
		ms = timeout.as_millis()
	)
}

#[async_trait]
impl BrowserSession for ChromeSession {
	async fn goto(&mut self, url: &str) -> Result<()> {
		self.tab.goto(url).await
	}

	async fn cookies(&mut self) -> Result<Vec<Cookie>> {
		self.tab.cookies().await
	}

	async fn get(&mut self, url: &str, timeout: Duration) -> Result<HttpResponse> {
		self.tab.get(url, timeout).await
	}

	async fn get_in_place(&mut self, url: &str, timeout: Duration) -> Result<Option<HttpResponse>> {
		self.tab.get_in_place(url, timeout).await
	}

	async fn reset_context(&mut self, cookies: &SessionRecord) -> Result<()> {
		self.tab.close_context().await;
		self.tab.open_context(cookies).await?;
		info!(target: "usagewatch.browser", cookies = cookies.len(), "browser context recreated");
		Ok(())
	}

	async fn close(&mut self) {
		if self.closed {
			return;
		}
		self.closed = true;

		self.tab.close_context().await;
		if !self.tab.conn.is_closed() {
			self.tab.teardown_step("Browser.close", json!({})).await;
			self.tab.conn.close().await;
		}
		self.process.kill();
		debug!(target: "usagewatch.browser", port = self.process.port(), "browser closed");
	}
}
