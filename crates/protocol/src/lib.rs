//! Wire types for the DevTools protocol and the remote usage API.
//!
//! This crate contains the serde-serializable types exchanged with the
//! browser over its remote-debugging WebSocket, plus the JSON shapes served
//! by the usage endpoints. These types represent the "protocol layer" - the
//! shapes of data as they appear on the wire.
//!
//! Types in this crate are pure data. Higher-level behavior (decoding usage
//! windows into snapshots, cookie injection) lives in `usagewatch-core`.

pub mod cdp;
pub mod cookie;
pub mod usage_api;

pub use cdp::*;
pub use cookie::*;
pub use usage_api::*;
