//! Session acquisition and usage polling.
//!
//! Three components, leaves first:
//!
//! - [`SessionStore`] persists the captured cookie set.
//! - [`AuthenticationFlow`] obtains cookies through an interactive browser
//!   login and can check a stored set against the API.
//! - [`UsagePollingEngine`] keeps a headless browser context seeded with the
//!   cookies and fetches usage on demand; [`run_loop`] drives it on a fixed
//!   cadence and reports through an [`EventSink`], and [`poll_worker`]
//!   carries one engine across re-authentication.
//!
//! All browser access goes through [`BrowserDriver`] / [`BrowserSession`];
//! [`ChromeDriver`] is the DevTools-backed implementation.

pub mod auth;
pub mod chrome;
pub mod config;
pub mod driver;
pub mod error;
pub mod monitor;
pub mod poller;
pub mod session_store;
pub mod usage;

pub use auth::{AuthenticationFlow, LoginDetector};
pub use chrome::{ChromeDriver, ChromeSession};
pub use config::{MonitorConfig, ServiceEndpoints};
pub use driver::{BrowserDriver, BrowserMode, BrowserSession, HttpResponse};
pub use error::{Error, FetchError, Result};
pub use monitor::{EventSink, LoopExit, UsageEvent, poll_worker, run_loop};
pub use poller::{EngineState, UsagePollingEngine};
pub use session_store::{SessionRecord, SessionStore};
pub use usage::{QuotaWindow, UsageSnapshot};
pub use usagewatch_protocol::Cookie;
