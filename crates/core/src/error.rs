//! Error taxonomy shared by the store, the login flow, and the poller.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
	/// Session file exists but cannot be parsed. Callers treat it as "no session".
	#[error("session file {} is unreadable: {reason}", .path.display())]
	StorageCorrupt { path: PathBuf, reason: String },

	#[error("login was not completed within {}s", .0.as_secs())]
	AuthTimeout(Duration),

	/// The usage API rejected the cookies with 401/403.
	#[error("session expired; please sign in again")]
	SessionExpired,

	#[error("usage fetch failed: {0}")]
	TransientFetch(FetchError),

	/// The browser runtime is unavailable. The only error that ends the process.
	#[error("browser runtime unavailable: {0}")]
	FatalStartup(String),

	#[error("polling engine already stopped; construct a new one")]
	EngineStopped,

	#[error("navigation to {url} failed: {reason}")]
	Navigation { url: String, reason: String },

	#[error("page script failed: {0}")]
	Script(String),

	#[error("invalid configuration {}: {reason}", .path.display())]
	Config { path: PathBuf, reason: String },

	#[error(transparent)]
	Browser(#[from] usagewatch_runtime::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Io(#[from] std::io::Error),
}

impl Error {
	/// True when the process cannot continue: the browser cannot be started at all.
	pub fn is_fatal(&self) -> bool {
		matches!(self, Error::FatalStartup(_))
	}
}

impl From<FetchError> for Error {
	fn from(error: FetchError) -> Self {
		match error {
			FetchError::SessionExpired { .. } => Error::SessionExpired,
			other => Error::TransientFetch(other),
		}
	}
}

/// Why a single usage fetch produced nothing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
	#[error("polling engine is not running")]
	NotRunning,

	#[error("organization lookup returned status {0}")]
	OrganizationLookup(u16),

	#[error("no organization available for this account")]
	NoOrganization,

	#[error("session rejected with status {status}")]
	SessionExpired { status: u16 },

	#[error("usage endpoint returned status {0}")]
	Status(u16),

	#[error("request failed: {0}")]
	Transport(String),

	#[error("unexpected response body: {0}")]
	Parse(String),
}
