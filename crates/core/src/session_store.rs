//! Durable storage of the captured session cookies.
//!
//! On-disk format: one object with a `cookies` map, written indented.
//!
//! ```json
//! {
//!   "cookies": {
//!     "sessionKey": "sk-ant-..."
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use usagewatch_protocol::{Cookie, CookieParam};

use crate::error::{Error, Result};

/// All cookies of an authenticated browser context, by name.
///
/// Non-empty means a session is present, not that it is still valid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionRecord(BTreeMap<String, String>);

impl SessionRecord {
	pub fn new() -> Self {
		Self::default()
	}

	/// Name-to-value map of `cookies`; a later duplicate name wins.
	pub fn from_cookies(cookies: &[Cookie]) -> Self {
		Self(cookies.iter().map(|c| (c.name.clone(), c.value.clone())).collect())
	}

	pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
		self.0.insert(name.into(), value.into());
	}

	pub fn get(&self, name: &str) -> Option<&str> {
		self.0.get(name).map(String::as_str)
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
		self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
	}

	/// Injection parameters binding every cookie to `domain` at `/`.
	pub fn to_cookie_params(&self, domain: &str) -> Vec<CookieParam> {
		self.iter().map(|(name, value)| CookieParam::rooted(name, value, domain)).collect()
	}
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SessionRecord {
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
	}
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionFile {
	cookies: SessionRecord,
}

/// File-backed session persistence with an in-memory copy of the last
/// record loaded or saved.
#[derive(Debug)]
pub struct SessionStore {
	path: PathBuf,
	cached: Mutex<Option<SessionRecord>>,
}

impl SessionStore {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			cached: Mutex::new(None),
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Returns the current record, reading the file only if nothing is cached.
	///
	/// A missing file is `None`. A corrupt file is logged and also `None`:
	/// an unreadable session is no session.
	pub fn load(&self) -> Option<SessionRecord> {
		if let Some(record) = self.cached.lock().clone() {
			return Some(record);
		}

		match self.read_file() {
			Ok(Some(record)) => {
				debug!(target: "usagewatch.store", path = %self.path.display(), cookies = record.len(), "session loaded");
				*self.cached.lock() = Some(record.clone());
				Some(record)
			}
			Ok(None) => {
				debug!(target: "usagewatch.store", path = %self.path.display(), "no session file");
				None
			}
			Err(e) => {
				warn!(target: "usagewatch.store", error = %e, "ignoring stored session");
				None
			}
		}
	}

	/// Replaces the persisted record.
	///
	/// The write goes to a sibling temp file that is renamed over the target,
	/// so a failure never leaves a half-written session behind. The cached
	/// copy changes only after the rename succeeds.
	pub fn save(&self, record: &SessionRecord) -> Result<()> {
		let parent = match self.path.parent() {
			Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
			_ => PathBuf::from("."),
		};
		fs::create_dir_all(&parent)?;

		let file = SessionFile { cookies: record.clone() };
		let json = serde_json::to_string_pretty(&file)?;

		let mut tmp = NamedTempFile::new_in(&parent)?;
		tmp.write_all(json.as_bytes())?;
		tmp.as_file().sync_all()?;
		tmp.persist(&self.path).map_err(|e| e.error)?;

		*self.cached.lock() = Some(record.clone());
		info!(target: "usagewatch.store", path = %self.path.display(), cookies = record.len(), "session saved");
		Ok(())
	}

	fn read_file(&self) -> Result<Option<SessionRecord>> {
		let content = match fs::read_to_string(&self.path) {
			Ok(content) => content,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
			Err(e) => {
				return Err(Error::StorageCorrupt {
					path: self.path.clone(),
					reason: e.to_string(),
				});
			}
		};

		let file: SessionFile = serde_json::from_str(&content).map_err(|e| Error::StorageCorrupt {
			path: self.path.clone(),
			reason: e.to_string(),
		})?;
		Ok(Some(file.cookies))
	}
}
