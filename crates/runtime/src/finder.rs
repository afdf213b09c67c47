//! Chromium-family executable discovery.

use std::path::{Path, PathBuf};

/// Returns the first installed Chromium-family browser, if any.
pub fn find_chrome_executable() -> Option<PathBuf> {
	candidates().into_iter().find_map(|candidate| resolve(&candidate))
}

fn resolve(candidate: &str) -> Option<PathBuf> {
	if is_path_like(candidate) {
		let path = Path::new(candidate);
		return path.exists().then(|| path.to_path_buf());
	}
	which::which(candidate).ok()
}

fn is_path_like(candidate: &str) -> bool {
	candidate.starts_with('/') || candidate.contains('\\') || candidate.contains(':')
}

fn candidates() -> Vec<String> {
	if cfg!(target_os = "macos") {
		[
			"/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
			"/Applications/Chromium.app/Contents/MacOS/Chromium",
			"/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
			"/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
		]
		.into_iter()
		.map(str::to_string)
		.collect()
	} else if cfg!(target_os = "windows") {
		windows_candidates(&program_roots())
	} else {
		[
			"google-chrome-stable",
			"google-chrome",
			"chromium",
			"chromium-browser",
			"microsoft-edge",
			"brave-browser",
			"/snap/bin/chromium",
		]
		.into_iter()
		.map(str::to_string)
		.collect()
	}
}

fn program_roots() -> Vec<PathBuf> {
	let roots: Vec<PathBuf> = ["PROGRAMFILES", "PROGRAMFILES(X86)", "LOCALAPPDATA"]
		.into_iter()
		.filter_map(|key| std::env::var(key).ok())
		.map(PathBuf::from)
		.collect();
	if roots.is_empty() {
		vec![PathBuf::from(r"C:\Program Files"), PathBuf::from(r"C:\Program Files (x86)")]
	} else {
		roots
	}
}

fn windows_candidates(roots: &[PathBuf]) -> Vec<String> {
	const SUFFIXES: &[&[&str]] = &[
		&["Google", "Chrome", "Application", "chrome.exe"],
		&["Microsoft", "Edge", "Application", "msedge.exe"],
		&["Chromium", "Application", "chrome.exe"],
	];

	let mut out: Vec<String> = roots
		.iter()
		.flat_map(|root| {
			SUFFIXES.iter().map(move |suffix| {
				let mut path = root.clone();
				path.extend(suffix.iter());
				path.to_string_lossy().to_string()
			})
		})
		.collect();
	out.extend(["chrome.exe", "msedge.exe"].map(str::to_string));
	out
}
