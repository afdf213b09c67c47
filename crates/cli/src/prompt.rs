use std::io::{self, BufRead, Write};

use colored::Colorize;

pub fn print_login_instructions(reason: Option<&str>) {
	let mut out = io::stdout().lock();
	if let Some(reason) = reason {
		let _ = writeln!(out, "{}", reason.yellow());
	}
	let _ = writeln!(out, "{}", "Sign in to Claude".bold());
	let _ = writeln!(out, "A browser window will open on claude.ai. Sign in there; it closes by itself once the session is captured.");
	let _ = writeln!(out, "Press Enter to open the browser…");
	let _ = out.flush();
}

/// Blocks a pool thread until a line arrives. `false` means stdin is closed.
pub async fn wait_for_enter() -> io::Result<bool> {
	tokio::task::spawn_blocking(|| -> io::Result<bool> {
		let mut line = String::new();
		let read = io::stdin().lock().read_line(&mut line)?;
		Ok(read > 0)
	})
	.await
	.map_err(io::Error::other)?
}
