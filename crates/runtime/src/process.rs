//! Browser process lifecycle: launch with remote debugging, wait for the
//! endpoint, kill on drop.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use tempfile::TempDir;
use tracing::{debug, info};
use usagewatch_protocol::VersionInfo;

use crate::error::{Error, Result};
use crate::finder::find_chrome_executable;
use crate::probe::fetch_version;

const ENDPOINT_POLL: Duration = Duration::from_millis(200);
const ENDPOINT_ATTEMPTS: u32 = 50;

/// How to start the browser.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
	pub headless: bool,
	/// Explicit executable; discovered with [`find_chrome_executable`] when unset.
	pub executable: Option<PathBuf>,
	/// Window size for visible browsers.
	pub window_size: (u32, u32),
	pub extra_args: Vec<String>,
}

impl Default for LaunchOptions {
	fn default() -> Self {
		Self {
			headless: true,
			executable: None,
			window_size: (1280, 720),
			extra_args: Vec::new(),
		}
	}
}

impl LaunchOptions {
	pub fn headless() -> Self {
		Self::default()
	}

	pub fn visible() -> Self {
		Self {
			headless: false,
			..Self::default()
		}
	}
}

/// A running browser owned by this process.
///
/// The child is killed and reaped when the value is dropped; its profile
/// directory is removed with it.
#[derive(Debug)]
pub struct BrowserProcess {
	child: Option<Child>,
	port: u16,
	version: VersionInfo,
	_user_data_dir: TempDir,
}

impl BrowserProcess {
	/// Spawns the browser and waits until its DevTools endpoint answers.
	pub async fn launch(options: &LaunchOptions) -> Result<Self> {
		let executable = match &options.executable {
			Some(path) => path.clone(),
			None => find_chrome_executable().ok_or(Error::ExecutableNotFound)?,
		};
		let user_data_dir = tempfile::Builder::new().prefix("usagewatch-profile-").tempdir()?;
		let port = free_port()?;
		let args = launch_args(options, port, user_data_dir.path());

		debug!(target: "usagewatch.browser", executable = %executable.display(), port, headless = options.headless, "spawning browser");
		let mut cmd = Command::new(&executable);
		cmd.args(&args).stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());

		let mut child = cmd
			.spawn()
			.map_err(|e| Error::Launch(format!("{}: {}", executable.display(), e)))?;

		let mut last_error = "endpoint not reachable".to_string();
		for _ in 0..ENDPOINT_ATTEMPTS {
			tokio::time::sleep(ENDPOINT_POLL).await;

			if let Ok(Some(status)) = child.try_wait() {
				return Err(Error::Launch(format!(
					"browser exited before its debugging endpoint became available (status: {status})"
				)));
			}

			match fetch_version(port).await {
				Ok(version) => {
					info!(target: "usagewatch.browser", pid = child.id(), port, browser = version.browser.as_deref().unwrap_or("unknown"), "browser ready");
					return Ok(Self {
						child: Some(child),
						port,
						version,
						_user_data_dir: user_data_dir,
					});
				}
				Err(e) => last_error = e.to_string(),
			}
		}

		let _ = child.kill();
		let _ = child.wait();
		Err(Error::Launch(format!("debugging endpoint on port {port} never came up: {last_error}")))
	}

	/// Browser-level WebSocket URL.
	pub fn ws_endpoint(&self) -> &str {
		&self.version.web_socket_debugger_url
	}

	pub fn port(&self) -> u16 {
		self.port
	}

	/// Kills the process if still running. Safe to call repeatedly.
	pub fn kill(&mut self) {
		if let Some(mut child) = self.child.take() {
			if let Err(e) = child.kill() {
				debug!(target: "usagewatch.browser", error = %e, "kill failed (already exited?)");
			}
			let _ = child.wait();
		}
	}
}

impl Drop for BrowserProcess {
	fn drop(&mut self) {
		self.kill();
	}
}

fn launch_args(options: &LaunchOptions, port: u16, user_data_dir: &Path) -> Vec<String> {
	let mut args = vec![
		format!("--remote-debugging-port={port}"),
		format!("--user-data-dir={}", user_data_dir.display()),
		"--no-first-run".to_string(),
		"--no-default-browser-check".to_string(),
		"--disable-blink-features=AutomationControlled".to_string(),
	];
	if options.headless {
		args.push("--headless=new".to_string());
	} else {
		let (w, h) = options.window_size;
		args.push(format!("--window-size={w},{h}"));
	}
	args.extend(options.extra_args.iter().cloned());
	args.push("about:blank".to_string());
	args
}

/// Asks the OS for an unused localhost port.
pub fn free_port() -> Result<u16> {
	let listener = std::net::TcpListener::bind(("127.0.0.1", 0))?;
	Ok(listener.local_addr()?.port())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn headless_args_carry_debug_port_and_profile() {
		let args = launch_args(&LaunchOptions::headless(), 9333, Path::new("/tmp/profile"));
		assert!(args.contains(&"--remote-debugging-port=9333".to_string()));
		assert!(args.contains(&"--user-data-dir=/tmp/profile".to_string()));
		assert!(args.contains(&"--headless=new".to_string()));
		assert!(!args.iter().any(|a| a.starts_with("--window-size")));
		assert_eq!(args.last().map(String::as_str), Some("about:blank"));
	}

	#[test]
	fn visible_args_size_the_window() {
		let args = launch_args(&LaunchOptions::visible(), 9333, Path::new("/tmp/profile"));
		assert!(args.contains(&"--window-size=1280,720".to_string()));
		assert!(!args.contains(&"--headless=new".to_string()));
	}

	#[test]
	fn free_port_is_bindable() {
		let port = free_port().unwrap();
		assert_ne!(port, 0);
		assert!(std::net::TcpListener::bind(("127.0.0.1", port)).is_ok());
	}

	#[tokio::test]
	async fn missing_executable_fails_launch() {
		let options = LaunchOptions {
			executable: Some(PathBuf::from("/definitely/not/chrome")),
			..LaunchOptions::headless()
		};
		let err = BrowserProcess::launch(&options).await.unwrap_err();
		assert!(matches!(err, Error::Launch(_)), "got {err}");
		assert!(err.is_unavailable());
	}
}
