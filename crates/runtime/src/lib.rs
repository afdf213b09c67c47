//! Automated-browser runtime: locate Chromium, launch it with remote
//! debugging enabled, and talk to it over the DevTools WebSocket.
//!
//! Nothing here knows about sessions or usage; `usagewatch-core` builds its
//! browser contexts and pages on top of [`Connection`].

pub mod connection;
pub mod error;
pub mod finder;
pub mod probe;
pub mod process;

pub use connection::Connection;
pub use error::{Error, Result};
pub use finder::find_chrome_executable;
pub use probe::fetch_version;
pub use process::{BrowserProcess, LaunchOptions};
