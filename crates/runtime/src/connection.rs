//! JSON-RPC connection to the browser's DevTools WebSocket.
//!
//! Request/response correlation on top of the socket:
//! - each command gets a unique, increasing `id`
//! - a oneshot channel per pending command receives its reply
//! - frames without `id` are events; they are logged and dropped
//! - when the socket closes every pending command fails with
//!   [`Error::ChannelClosed`]
//!
//! A background task owns the read half for the lifetime of the connection.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};
use usagewatch_protocol::{Message, Request, Response};

use crate::error::{Error, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct PendingCall {
	method: String,
	reply: oneshot::Sender<Result<Value>>,
}

type Pending = Arc<Mutex<HashMap<u64, PendingCall>>>;

pub struct Connection {
	last_id: AtomicU64,
	pending: Pending,
	sink: tokio::sync::Mutex<SplitSink<WsStream, WsMessage>>,
	reader: JoinHandle<()>,
}

impl Connection {
	/// Opens the WebSocket and spawns the read loop.
	pub async fn connect(url: &str) -> Result<Self> {
		let (ws, _) = tokio_tungstenite::connect_async(url).await.map_err(|source| Error::Connect {
			url: url.to_string(),
			source,
		})?;
		let (sink, stream) = ws.split();
		let pending: Pending = Arc::default();
		let reader = tokio::spawn(read_loop(stream, Arc::clone(&pending)));
		debug!(target: "usagewatch.cdp", %url, "connected");

		Ok(Self {
			last_id: AtomicU64::new(1),
			pending,
			sink: tokio::sync::Mutex::new(sink),
			reader,
		})
	}

	/// Sends `method` and waits for its result.
	///
	/// `session_id` addresses an attached target; `None` addresses the browser.
	pub async fn send(&self, method: &str, params: Value, session_id: Option<&str>) -> Result<Value> {
		let id = self.last_id.fetch_add(1, Ordering::SeqCst);
		let (tx, rx) = oneshot::channel();
		self.pending.lock().insert(
			id,
			PendingCall {
				method: method.to_string(),
				reply: tx,
			},
		);
		if self.reader.is_finished() {
			self.pending.lock().remove(&id);
			return Err(Error::ChannelClosed);
		}

		let request = Request {
			id,
			method: method.to_string(),
			params,
			session_id: session_id.map(str::to_string),
		};
		let text = serde_json::to_string(&request)?;
		trace!(target: "usagewatch.cdp", id, method, "send");

		let sent = self.sink.lock().await.send(WsMessage::Text(text.into())).await;
		if let Err(e) = sent {
			self.pending.lock().remove(&id);
			return Err(e.into());
		}

		rx.await.map_err(|_| Error::ChannelClosed)?
	}

	/// [`send`](Self::send) with the result decoded into `T`.
	pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value, session_id: Option<&str>) -> Result<T> {
		let value = self.send(method, params, session_id).await?;
		Ok(serde_json::from_value(value)?)
	}

	/// True once the read loop has ended (socket closed or failed).
	pub fn is_closed(&self) -> bool {
		self.reader.is_finished()
	}

	/// Sends a close frame. Errors are ignored; the peer may already be gone.
	pub async fn close(&self) {
		let _ = self.sink.lock().await.close().await;
	}
}

impl Drop for Connection {
	fn drop(&mut self) {
		self.reader.abort();
	}
}

async fn read_loop(mut stream: SplitStream<WsStream>, pending: Pending) {
	while let Some(frame) = stream.next().await {
		let text = match frame {
			Ok(WsMessage::Text(text)) => text,
			Ok(WsMessage::Close(_)) => break,
			Ok(_) => continue,
			Err(e) => {
				debug!(target: "usagewatch.cdp", error = %e, "read failed");
				break;
			}
		};

		match serde_json::from_str::<Message>(&text) {
			Ok(Message::Response(response)) => dispatch(&pending, response),
			Ok(Message::Event(event)) => {
				trace!(target: "usagewatch.cdp", method = %event.method, session = event.session_id.as_deref().unwrap_or("-"), "event");
			}
			Err(e) => debug!(target: "usagewatch.cdp", error = %e, "unparseable frame"),
		}
	}

	// Dropping the senders fails every waiter with ChannelClosed.
	pending.lock().clear();
	debug!(target: "usagewatch.cdp", "connection closed");
}

fn dispatch(pending: &Pending, response: Response) {
	let Some(call) = pending.lock().remove(&response.id) else {
		debug!(target: "usagewatch.cdp", id = response.id, "reply for unknown id");
		return;
	};

	let outcome = match response.error {
		Some(err) => Err(Error::Protocol {
			method: call.method,
			code: err.code,
			message: err.message,
		}),
		None => Ok(response.result.unwrap_or(Value::Null)),
	};
	let _ = call.reply.send(outcome);
}
