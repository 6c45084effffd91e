//! One WebSocket connection per room membership.
//!
//! Opening a session spawns a task that owns the socket. Everything the socket
//! does comes back as a [`TransportEvent`]; failures never leave this module as
//! errors. There is no retry: once a session is `Closed` it stays closed.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// Lifecycle of one physical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
	Connecting,
	Open,
	Closed,
}

impl ConnectionState {
	/// The state after `next`, or `None` if that would go backwards.
	#[must_use]
	pub fn advance(self, next: Self) -> Option<Self> {
		match (self, next) {
			(Self::Connecting, Self::Open | Self::Closed) | (Self::Open, Self::Closed) => Some(next),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
	Open,
	/// A text frame, undecoded.
	Message(String),
	Close,
	Error(String),
}

/// Anything the sync engine can push frames into.
pub trait FrameSink {
	/// Queue a frame. Returns `false` if it was dropped.
	fn send_frame(&self, frame: String) -> bool;
}

pub struct TransportSession {
	endpoint: String,
	state: Arc<Mutex<ConnectionState>>,
	outgoing: mpsc::UnboundedSender<Message>,
}

impl TransportSession {
	/// Start connecting to `endpoint`. Must be called inside a tokio runtime.
	///
	/// The connection is closed when the returned session is dropped.
	pub fn open(endpoint: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
		// Fails when a provider is already installed, which is just as good.
		let _ = rustls::crypto::ring::default_provider().install_default();

		let endpoint = endpoint.into();
		let state = Arc::new(Mutex::new(ConnectionState::Connecting));
		let (event_tx, event_rx) = mpsc::unbounded_channel();
		let (outgoing, outgoing_rx) = mpsc::unbounded_channel();

		tokio::spawn(run(endpoint.clone(), Arc::clone(&state), outgoing_rx, event_tx));

		let session = Self {
			endpoint,
			state,
			outgoing,
		};
		(session, event_rx)
	}

	#[must_use]
	pub fn state(&self) -> ConnectionState {
		*self.state.lock()
	}

	#[must_use]
	pub fn endpoint(&self) -> &str {
		&self.endpoint
	}

	/// Send a text frame. Frames sent while not open are dropped.
	pub fn send(&self, frame: String) -> bool {
		let state = self.state();
		if state != ConnectionState::Open {
			tracing::debug!(endpoint = %self.endpoint, ?state, "dropping frame, socket not open");
			return false;
		}
		self.outgoing.send(Message::text(frame)).is_ok()
	}
}

impl FrameSink for TransportSession {
	fn send_frame(&self, frame: String) -> bool {
		self.send(frame)
	}
}

fn advance(state: &Mutex<ConnectionState>, next: ConnectionState) {
	let mut state = state.lock();
	if let Some(advanced) = state.advance(next) {
		*state = advanced;
	}
}

async fn run(
	endpoint: String,
	state: Arc<Mutex<ConnectionState>>,
	mut outgoing: mpsc::UnboundedReceiver<Message>,
	events: mpsc::UnboundedSender<TransportEvent>,
) {
	// Send errors below mean nobody listens for events any more; the socket is
	// still shut down properly.
	let socket = match tokio_tungstenite::connect_async(endpoint.as_str()).await {
		Ok((socket, _)) => socket,
		Err(error) => {
			tracing::warn!(%endpoint, %error, "connection failed");
			let _ = events.send(TransportEvent::Error(error.to_string()));
			advance(&state, ConnectionState::Closed);
			let _ = events.send(TransportEvent::Close);
			return;
		}
	};

	tracing::info!(%endpoint, "connected");
	advance(&state, ConnectionState::Open);
	let _ = events.send(TransportEvent::Open);

	let (mut writer, mut reader) = socket.split();
	loop {
		tokio::select! {
			frame = outgoing.recv() => match frame {
				Some(frame) => {
					if let Err(error) = writer.send(frame).await {
						tracing::warn!(%endpoint, %error, "send failed");
						let _ = events.send(TransportEvent::Error(error.to_string()));
						break;
					}
				}
				// The session was dropped.
				None => {
					let _ = writer.send(Message::Close(None)).await;
					break;
				}
			},
			message = reader.next() => match message {
				Some(Ok(Message::Text(text))) => {
					let _ = events.send(TransportEvent::Message(text.as_str().to_owned()));
				}
				Some(Ok(Message::Close(_))) | None => break,
				Some(Ok(_)) => {}
				Some(Err(error)) => {
					tracing::warn!(%endpoint, %error, "receive failed");
					let _ = events.send(TransportEvent::Error(error.to_string()));
					break;
				}
			},
		}
	}

	tracing::info!(%endpoint, "disconnected");
	advance(&state, ConnectionState::Closed);
	let _ = events.send(TransportEvent::Close);
}
