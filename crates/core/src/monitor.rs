//! The run loop and the events it reports.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::driver::BrowserDriver;
use crate::error::Result;
use crate::poller::UsagePollingEngine;
use crate::session_store::SessionRecord;
use crate::usage::UsageSnapshot;

/// What the loop tells the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsageEvent {
	Snapshot(UsageSnapshot),
	TransientError(String),
	/// The stored session did not work on the first poll; sign in again.
	SessionExpired,
	Status(String),
}

/// Receiver of loop events. Must not block.
pub trait EventSink: Send + Sync {
	fn emit(&self, event: UsageEvent);
}

impl EventSink for mpsc::UnboundedSender<UsageEvent> {
	fn emit(&self, event: UsageEvent) {
		if self.send(event).is_err() {
			debug!(target: "usagewatch.poll", "event receiver dropped");
		}
	}
}

/// Why [`run_loop`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
	/// `stop` was signalled.
	Stopped,
	/// The first fetch failed; the caller should re-authenticate.
	SessionExpired,
}

/// Polls until `stop` is cancelled or the first fetch fails.
///
/// The wait between cycles starts when a cycle finishes and is cut short by
/// `stop`. An in-flight fetch always completes before `stop` is observed.
pub async fn run_loop<D: BrowserDriver>(
	engine: &mut UsagePollingEngine<D>,
	interval: Duration,
	sink: &dyn EventSink,
	stop: &CancellationToken,
) -> LoopExit {
	let mut first_fetch = true;
	info!(target: "usagewatch.poll", interval_secs = interval.as_secs(), "poll loop started");

	loop {
		if stop.is_cancelled() {
			return LoopExit::Stopped;
		}

		match engine.fetch_usage_data().await {
			Some(snapshot) => {
				first_fetch = false;
				sink.emit(UsageEvent::Snapshot(snapshot));
			}
			None if first_fetch => {
				info!(target: "usagewatch.poll", "first fetch failed; stored session treated as invalid");
				sink.emit(UsageEvent::SessionExpired);
				return LoopExit::SessionExpired;
			}
			None => sink.emit(UsageEvent::TransientError("Failed to fetch usage data".to_string())),
		}

		tokio::select! {
			_ = stop.cancelled() => return LoopExit::Stopped,
			_ = tokio::time::sleep(interval) => {}
		}
	}
}

/// Owns the engine for its whole life: starts it, polls, and stops it.
///
/// After a session-expired exit the engine and its browser are kept and the
/// worker waits on `cookies`; the fresh record is applied with
/// `update_cookies` and the loop is re-entered with its first-fetch rule
/// armed again. Returns when `stop` is cancelled or `cookies` is closed.
///
/// Fails only when the engine cannot start.
pub async fn poll_worker<D: BrowserDriver>(
	mut engine: UsagePollingEngine<D>,
	interval: Duration,
	sink: &dyn EventSink,
	mut cookies: mpsc::UnboundedReceiver<SessionRecord>,
	stop: CancellationToken,
) -> Result<()> {
	if let Err(e) = engine.start().await {
		engine.stop().await;
		return Err(e);
	}
	sink.emit(UsageEvent::Status("Monitoring usage…".to_string()));

	loop {
		match run_loop(&mut engine, interval, sink, &stop).await {
			LoopExit::Stopped => break,
			LoopExit::SessionExpired => {
				let fresh = tokio::select! {
					_ = stop.cancelled() => None,
					fresh = cookies.recv() => fresh,
				};
				let Some(fresh) = fresh else {
					debug!(target: "usagewatch.poll", "no fresh cookies coming; worker exiting");
					break;
				};
				if let Err(e) = engine.update_cookies(fresh).await {
					sink.emit(UsageEvent::TransientError(e.to_string()));
				}
			}
		}
	}

	engine.stop().await;
	Ok(())
}
