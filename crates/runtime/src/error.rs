//! Runtime errors.

use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
	#[error("could not find a Chrome/Chromium executable; install Chrome or configure its path")]
	ExecutableNotFound,

	#[error("failed to launch browser: {0}")]
	Launch(String),

	#[error("debugging endpoint unavailable: {0}")]
	Probe(String),

	#[error("failed to connect to {url}: {source}")]
	Connect {
		url: String,
		#[source]
		source: tokio_tungstenite::tungstenite::Error,
	},

	#[error("{method} failed: {message} (code {code})")]
	Protocol { method: String, code: i64, message: String },

	#[error("browser connection closed")]
	ChannelClosed,

	#[error("{0} timed out after {1:?}")]
	Timeout(String, Duration),

	#[error(transparent)]
	WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

	#[error(transparent)]
	Http(#[from] reqwest::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Io(#[from] std::io::Error),
}

impl Error {
	/// True when the browser runtime itself is unusable, not just one call.
	pub fn is_unavailable(&self) -> bool {
		matches!(self, Error::ExecutableNotFound | Error::Launch(_) | Error::Probe(_))
	}
}
