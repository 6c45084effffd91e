//! Whole-document synchronization for one room membership.
//!
//! Every `init` or `code_update` carries the full text and simply replaces
//! ours: the last snapshot delivered wins. Two members typing at once can
//! overwrite each other; nothing here merges.

use colab_protocol::{ClientMessage, RoomId, ServerMessage};

use crate::surface::EditingSurface;
use crate::transport::{ConnectionState, FrameSink, TransportEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
	Disconnected,
	Connecting,
	Synchronized,
}

/// What an inbound frame did to the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
	Applied,
	/// A snapshot identical to what we already hold.
	Unchanged,
	/// Unknown kind or not decodable.
	Ignored,
}

pub struct RoomSync<L> {
	room: RoomId,
	link: L,
	text: String,
	connection: ConnectionState,
	phase: SyncPhase,
	started: bool,
	initialized: bool,
}

impl<L: FrameSink> RoomSync<L> {
	pub fn new(room: RoomId, link: L) -> Self {
		Self {
			room,
			link,
			text: String::new(),
			connection: ConnectionState::Connecting,
			phase: SyncPhase::Disconnected,
			started: false,
			initialized: false,
		}
	}

	/// Mark the membership as connecting. A membership only ever starts once.
	pub fn start(&mut self) {
		if !self.started {
			self.started = true;
			self.phase = SyncPhase::Connecting;
		}
	}

	#[must_use]
	pub fn room(&self) -> &RoomId {
		&self.room
	}

	#[must_use]
	pub fn text(&self) -> &str {
		&self.text
	}

	#[must_use]
	pub fn phase(&self) -> SyncPhase {
		self.phase
	}

	/// Whether the room's `init` has arrived.
	#[must_use]
	pub fn is_initialized(&self) -> bool {
		self.initialized
	}

	#[must_use]
	pub fn connection(&self) -> ConnectionState {
		self.connection
	}

	#[must_use]
	pub fn link(&self) -> &L {
		&self.link
	}

	fn advance(&mut self, next: ConnectionState) {
		if let Some(next) = self.connection.advance(next) {
			self.connection = next;
		}
	}

	pub fn handle_event(&mut self, event: TransportEvent, surface: &mut impl EditingSurface) {
		match event {
			TransportEvent::Open => {
				self.advance(ConnectionState::Open);
				if self.connection == ConnectionState::Open {
					self.started = true;
					self.phase = SyncPhase::Synchronized;
					tracing::info!(room = %self.room, "synchronized");
				}
			}
			TransportEvent::Message(raw) => {
				self.apply_inbound(&raw, surface);
			}
			TransportEvent::Error(error) => {
				tracing::warn!(room = %self.room, %error, "transport error");
			}
			TransportEvent::Close => {
				self.advance(ConnectionState::Closed);
				self.phase = SyncPhase::Disconnected;
				tracing::info!(room = %self.room, "disconnected");
			}
		}
	}

	/// Apply a raw frame from the server.
	pub fn apply_inbound(&mut self, raw: &str, surface: &mut impl EditingSurface) -> Inbound {
		let message = match colab_protocol::decode::<ServerMessage<'_>>(raw) {
			Ok(message) => message,
			Err(error) => {
				tracing::warn!(room = %self.room, %error, "ignoring malformed frame");
				return Inbound::Ignored;
			}
		};

		match &message {
			ServerMessage::Init { .. } if self.initialized => {
				tracing::debug!(room = %self.room, "repeated init");
			}
			ServerMessage::Init { .. } => self.initialized = true,
			ServerMessage::CodeUpdate { .. } if !self.initialized => {
				tracing::debug!(room = %self.room, "update before init");
			}
			ServerMessage::CodeUpdate { .. } => {}
			ServerMessage::Unknown => {
				tracing::debug!(room = %self.room, raw, "ignoring frame of unknown type");
			}
		}

		let Some(snapshot) = message.snapshot() else {
			return Inbound::Ignored;
		};
		// A local edit may still be queued behind this frame, so the editor can
		// hold something other than our copy.
		if snapshot == self.text && snapshot == surface.text() {
			return Inbound::Unchanged;
		}

		snapshot.clone_into(&mut self.text);
		surface.set_text(&self.text);
		Inbound::Applied
	}

	/// Take a local edit. The text is kept either way; it is only sent while
	/// the connection is open and is not replayed later.
	pub fn emit_local_change(&mut self, text: String) -> bool {
		self.text = text;

		if self.connection != ConnectionState::Open {
			tracing::debug!(room = %self.room, connection = ?self.connection, "offline, edit kept locally");
			return false;
		}

		let frame = colab_protocol::encode(&ClientMessage::CodeUpdate {
			code: self.text.as_str().into(),
		});
		self.link.send_frame(frame)
	}
}
