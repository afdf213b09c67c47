//! Wires the store, the login flow, and the poll worker to the terminal.
//!
//! The UI loop owns the dashboard and is the only place that prints it.
//! Workers report through one channel of [`UiEvent`]s.

use std::io::{IsTerminal, Write};
use std::sync::Arc;

use anyhow::{Context, anyhow};
use chrono::{Local, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use usagewatch::{
	AuthenticationFlow, BrowserDriver, ChromeDriver, Error, EventSink, MonitorConfig, ServiceEndpoints, SessionRecord,
	SessionStore, UsageEvent, UsagePollingEngine, poll_worker,
};

use crate::cli::Cli;
use crate::dashboard::Dashboard;
use crate::prompt;

enum UiEvent {
	Usage(UsageEvent),
	PromptAnswered,
	LoginFinished(usagewatch::Result<SessionRecord>),
	WorkerFailed(Error),
}

/// Forwards loop events into the UI channel.
struct UiSink(mpsc::UnboundedSender<UiEvent>);

impl EventSink for UiSink {
	fn emit(&self, event: UsageEvent) {
		if self.0.send(UiEvent::Usage(event)).is_err() {
			debug!(target: "usagewatch.app", "ui channel closed");
		}
	}
}

pub async fn run(cli: Cli) -> anyhow::Result<bool> {
	let mut config = MonitorConfig::load(cli.config.as_deref())?;
	if let Some(path) = cli.session_file {
		config.session_file = Some(path);
	}
	if let Some(secs) = cli.interval {
		config.poll_interval_secs = secs;
	}
	let endpoints = config.endpoints().map_err(|reason| anyhow!(reason))?;

	let store = Arc::new(SessionStore::new(config.session_file()));
	let driver = Arc::new(ChromeDriver::new(&config));
	let auth = Arc::new(AuthenticationFlow::new(
		Arc::clone(&driver),
		Arc::clone(&store),
		endpoints.clone(),
		&config,
	));
	let stored = store.load();

	if cli.verify {
		return verify(&auth, stored).await;
	}
	if cli.once {
		let Some(cookies) = stored else {
			println!("No stored session. Run without --once to sign in.");
			return Ok(false);
		};
		let engine = UsagePollingEngine::new(driver, endpoints, cookies, &config);
		return fetch_once(engine).await;
	}

	let app = App::new(config, endpoints, driver, auth);
	app.run(if cli.login { None } else { stored }).await
}

async fn verify(auth: &AuthenticationFlow<ChromeDriver>, stored: Option<SessionRecord>) -> anyhow::Result<bool> {
	let Some(cookies) = stored else {
		println!("No stored session.");
		return Ok(false);
	};
	if auth.verify_session(&cookies).await {
		println!("Stored session is valid.");
		Ok(true)
	} else {
		println!("Stored session is not valid. Sign in again.");
		Ok(false)
	}
}

async fn fetch_once<D: BrowserDriver>(mut engine: UsagePollingEngine<D>) -> anyhow::Result<bool> {
	if let Err(e) = engine.start().await {
		engine.stop().await;
		return Err(e).context("could not start the browser");
	}
	let polled = engine.poll().await;
	engine.stop().await;

	let mut dashboard = Dashboard::new(Local);
	match polled {
		Ok(snapshot) => {
			dashboard.apply(UsageEvent::Snapshot(snapshot), Utc::now());
			print!("{}", dashboard.render(Utc::now()));
			Ok(true)
		}
		Err(Error::SessionExpired) => {
			println!("Stored session has expired. Run without --once to sign in.");
			Ok(false)
		}
		Err(e) => {
			warn!(target: "usagewatch.app", error = %e, "usage fetch failed");
			println!("Failed to fetch usage data: {e}");
			Ok(false)
		}
	}
}

struct Worker {
	cookies: mpsc::UnboundedSender<SessionRecord>,
	handle: JoinHandle<()>,
}

struct App {
	config: MonitorConfig,
	endpoints: ServiceEndpoints,
	driver: Arc<ChromeDriver>,
	auth: Arc<AuthenticationFlow<ChromeDriver>>,
	dashboard: Dashboard<Local>,
	events: mpsc::UnboundedSender<UiEvent>,
	inbox: mpsc::UnboundedReceiver<UiEvent>,
	stop: CancellationToken,
	worker: Option<Worker>,
	login: Option<JoinHandle<()>>,
	prompting: bool,
}

impl App {
	fn new(
		config: MonitorConfig,
		endpoints: ServiceEndpoints,
		driver: Arc<ChromeDriver>,
		auth: Arc<AuthenticationFlow<ChromeDriver>>,
	) -> Self {
		let (events, inbox) = mpsc::unbounded_channel();
		Self {
			config,
			endpoints,
			driver,
			auth,
			dashboard: Dashboard::new(Local),
			events,
			inbox,
			stop: CancellationToken::new(),
			worker: None,
			login: None,
			prompting: false,
		}
	}

	async fn run(mut self, stored: Option<SessionRecord>) -> anyhow::Result<bool> {
		let stop = self.stop.clone();
		tokio::spawn(async move {
			if tokio::signal::ctrl_c().await.is_ok() {
				info!(target: "usagewatch.app", "interrupt received");
			}
			stop.cancel();
		});

		match stored {
			Some(cookies) => self.start_monitoring(cookies),
			None => self.show_login_prompt(None),
		}

		let outcome = self.event_loop().await;
		self.shutdown().await;
		outcome
	}

	async fn event_loop(&mut self) -> anyhow::Result<bool> {
		loop {
			let event = tokio::select! {
				_ = self.stop.cancelled() => return Ok(true),
				event = self.inbox.recv() => event,
			};
			let Some(event) = event else {
				return Ok(true);
			};

			match event {
				UiEvent::Usage(UsageEvent::SessionExpired) => {
					self.dashboard.apply(UsageEvent::SessionExpired, Utc::now());
					self.redraw();
					self.show_login_prompt(Some("Your session has expired."));
				}
				UiEvent::Usage(usage) => {
					self.dashboard.apply(usage, Utc::now());
					self.redraw();
				}
				UiEvent::PromptAnswered => {
					self.prompting = false;
					self.start_login();
				}
				UiEvent::LoginFinished(Ok(cookies)) => {
					self.login = None;
					self.dashboard.set_status("Signed in.");
					self.start_monitoring(cookies);
				}
				UiEvent::LoginFinished(Err(e)) => {
					self.login = None;
					if e.is_fatal() {
						return Err(e.into());
					}
					warn!(target: "usagewatch.app", error = %e, "login failed");
					self.show_login_prompt(Some(&format!("Login failed: {e}")));
				}
				UiEvent::WorkerFailed(e) => {
					self.worker = None;
					if e.is_fatal() {
						return Err(e.into());
					}
					self.dashboard
						.apply(UsageEvent::TransientError(e.to_string()), Utc::now());
					self.redraw();
					self.show_login_prompt(Some("Could not start monitoring."));
				}
			}
		}
	}

	/// Hands the cookies to the running worker, or starts one.
	fn start_monitoring(&mut self, cookies: SessionRecord) {
		if let Some(worker) = &self.worker {
			if worker.cookies.send(cookies.clone()).is_ok() {
				return;
			}
		}

		let engine = UsagePollingEngine::new(
			Arc::clone(&self.driver),
			self.endpoints.clone(),
			cookies,
			&self.config,
		);
		let (tx, rx) = mpsc::unbounded_channel();
		let interval = self.config.poll_interval();
		let events = self.events.clone();
		let stop = self.stop.clone();
		let handle = tokio::spawn(async move {
			let sink = UiSink(events.clone());
			if let Err(e) = poll_worker(engine, interval, &sink, rx, stop).await {
				let _ = events.send(UiEvent::WorkerFailed(e));
			}
		});
		self.worker = Some(Worker { cookies: tx, handle });
		self.dashboard.set_status("Connecting…");
		self.redraw();
	}

	fn show_login_prompt(&mut self, reason: Option<&str>) {
		if self.prompting || self.login.is_some() {
			return;
		}
		self.prompting = true;
		prompt::print_login_instructions(reason);

		let events = self.events.clone();
		let stop = self.stop.clone();
		tokio::spawn(async move {
			match prompt::wait_for_enter().await {
				Ok(true) => {
					let _ = events.send(UiEvent::PromptAnswered);
				}
				Ok(false) => {
					info!(target: "usagewatch.app", "stdin closed; exiting");
					stop.cancel();
				}
				Err(e) => {
					warn!(target: "usagewatch.app", error = %e, "could not read stdin");
					stop.cancel();
				}
			}
		});
	}

	fn start_login(&mut self) {
		let auth = Arc::clone(&self.auth);
		let events = self.events.clone();
		self.dashboard.set_status("Waiting for sign-in in the browser window…");
		self.redraw();
		self.login = Some(tokio::spawn(async move {
			let result = auth.login_interactive().await;
			let _ = events.send(UiEvent::LoginFinished(result));
		}));
	}

	async fn shutdown(&mut self) {
		self.stop.cancel();
		// Dropping the login future closes its browser.
		if let Some(login) = self.login.take() {
			login.abort();
			let _ = login.await;
		}
		if let Some(worker) = self.worker.take() {
			drop(worker.cookies);
			if let Err(e) = worker.handle.await {
				warn!(target: "usagewatch.app", error = %e, "poll worker panicked");
			}
		}
	}

	fn redraw(&self) {
		let mut out = std::io::stdout().lock();
		if out.is_terminal() {
			let _ = write!(out, "\x1b[2J\x1b[H");
		}
		let _ = write!(out, "{}", self.dashboard.render(Utc::now()));
		let _ = out.flush();
	}
}
