//! In-memory room registry and per-room fan-out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use colab_protocol::{ClientMessage, RoomId};
use parking_lot::RwLock;
use tokio::sync::broadcast;

pub type MemberId = u64;

/// A frame one member sent, on its way to everyone else in the room.
#[derive(Debug, Clone)]
pub struct Relayed {
	pub from: MemberId,
	pub frame: Arc<str>,
}

struct Room {
	code: String,
	members: usize,
	relay: broadcast::Sender<Relayed>,
}

pub struct Rooms {
	rooms: RwLock<HashMap<RoomId, Room>>,
	next_member: AtomicU64,
	capacity: usize,
}

impl Rooms {
	#[must_use]
	pub fn new(capacity: usize) -> Self {
		Self {
			rooms: RwLock::default(),
			next_member: AtomicU64::new(0),
			capacity: capacity.max(1),
		}
	}

	/// Allocate a fresh room.
	pub fn create(&self) -> RoomId {
		let id = RoomId::new(uuid::Uuid::new_v4().to_string());
		self.insert(id.clone());
		id
	}

	/// Register a room under a known id. Existing rooms are left untouched.
	pub fn insert(&self, id: RoomId) {
		let (relay, _) = broadcast::channel(self.capacity);
		self.rooms.write().entry(id).or_insert(Room {
			code: String::new(),
			members: 0,
			relay,
		});
	}

	#[must_use]
	pub fn contains(&self, id: &RoomId) -> bool {
		self.rooms.read().contains_key(id)
	}

	/// The text the room currently holds, if the room exists.
	#[must_use]
	pub fn code(&self, id: &RoomId) -> Option<String> {
		self.rooms.read().get(id).map(|room| room.code.clone())
	}

	/// Join a room. Returns `None` if no such room was ever created.
	///
	/// The returned membership leaves the room when dropped.
	#[must_use]
	pub fn join(self: &Arc<Self>, id: &RoomId) -> Option<Membership> {
		let mut rooms = self.rooms.write();
		let room = rooms.get_mut(id)?;

		// Nothing survives an empty room.
		if room.members == 0 {
			room.code.clear();
		}
		room.members += 1;

		let member = self.next_member.fetch_add(1, Ordering::Relaxed);
		// Subscribed under the same lock that read `code`, so no update can slip between them.
		Some(Membership {
			rooms: Arc::clone(self),
			room: id.clone(),
			member,
			initial_code: room.code.clone(),
			receiver: room.relay.subscribe(),
		})
	}

	/// Record a frame from `from` and fan it out to the rest of the room.
	///
	/// Frames are relayed verbatim whether or not they parse. Only a `code_update`
	/// changes the room's text.
	pub fn publish(&self, id: &RoomId, from: MemberId, frame: &str) {
		let mut rooms = self.rooms.write();
		let Some(room) = rooms.get_mut(id) else {
			return;
		};

		match colab_protocol::decode::<ClientMessage<'_>>(frame) {
			Ok(ClientMessage::CodeUpdate { code }) => {
				room.code = code.into_owned();
			}
			Ok(ClientMessage::Unknown) => {
				tracing::debug!(room = %id, from, "relaying frame of unknown type");
			}
			Err(error) => {
				tracing::warn!(room = %id, from, %error, "relaying malformed frame");
			}
		}

		// Fails only when nobody is subscribed, which is fine.
		let _ = room.relay.send(Relayed {
			from,
			frame: frame.into(),
		});
	}

	fn leave(&self, id: &RoomId, member: MemberId) {
		if let Some(room) = self.rooms.write().get_mut(id) {
			room.members = room.members.saturating_sub(1);
			tracing::info!(room = %id, member, remaining = room.members, "member left");
		}
	}

	#[must_use]
	pub fn members(&self, id: &RoomId) -> usize {
		self.rooms.read().get(id).map_or(0, |room| room.members)
	}
}

impl Default for Rooms {
	fn default() -> Self {
		Self::new(256)
	}
}

/// One socket's place in a room.
pub struct Membership {
	rooms: Arc<Rooms>,
	room: RoomId,
	member: MemberId,
	initial_code: String,
	receiver: broadcast::Receiver<Relayed>,
}

impl Membership {
	#[must_use]
	pub fn member(&self) -> MemberId {
		self.member
	}

	#[must_use]
	pub fn room(&self) -> &RoomId {
		&self.room
	}

	/// The room text at the moment of joining.
	#[must_use]
	pub fn initial_code(&self) -> &str {
		&self.initial_code
	}

	/// Wait for the next frame from another member.
	///
	/// Returns `None` once the room is gone. Frames this member sent itself are skipped.
	pub async fn next_frame(&mut self) -> Option<Arc<str>> {
		loop {
			match self.receiver.recv().await {
				Ok(relayed) if relayed.from == self.member => {}
				Ok(relayed) => return Some(relayed.frame),
				Err(broadcast::error::RecvError::Lagged(skipped)) => {
					tracing::warn!(room = %self.room, member = self.member, skipped, "member lagging");
				}
				Err(broadcast::error::RecvError::Closed) => return None,
			}
		}
	}

	pub fn publish(&self, frame: &str) {
		self.rooms.publish(&self.room, self.member, frame);
	}
}

impl Drop for Membership {
	fn drop(&mut self) {
		self.rooms.leave(&self.room, self.member);
	}
}
