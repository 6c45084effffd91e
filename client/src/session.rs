//! A live room membership: transport, sync engine and suggestions wired to one surface.

use std::sync::Arc;
use std::time::Duration;

use colab_protocol::RoomId;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::api::ApiClient;
use crate::suggest::{SuggestionCoordinator, SuggestionSource};
use crate::surface::{EditingSurface, Registration};
use crate::sync::{RoomSync, SyncPhase};
use crate::transport::{ConnectionState, TransportEvent, TransportSession};

/// Leaving the room (or dropping this) closes the connection and takes the
/// session's listener and suggestion provider off the surface, so the same
/// surface can join again.
pub struct RoomSession<S: EditingSurface + Send + 'static> {
	room: RoomId,
	surface: Arc<Mutex<S>>,
	registrations: [Registration; 2],
	coordinator: SuggestionCoordinator<S>,
	connected: watch::Receiver<bool>,
	phase: watch::Receiver<SyncPhase>,
	initialized: watch::Receiver<bool>,
	pump: JoinHandle<()>,
}

impl<S: EditingSurface + Send + 'static> RoomSession<S> {
	/// Join `room` on the server behind `api`. Must be called inside a tokio runtime.
	pub fn join(api: &ApiClient, room: RoomId, surface: Arc<Mutex<S>>, debounce: Duration) -> Self {
		let endpoint = api.socket_url(&room);
		Self::join_with(endpoint, room, surface, Arc::new(api.clone()), debounce)
	}

	/// Join with an explicit socket endpoint and suggestion source.
	pub fn join_with(
		endpoint: String,
		room: RoomId,
		surface: Arc<Mutex<S>>,
		source: Arc<dyn SuggestionSource>,
		debounce: Duration,
	) -> Self {
		tracing::info!(%room, %endpoint, "joining room");
		let (transport, events) = TransportSession::open(endpoint);
		let mut engine = RoomSync::new(room.clone(), transport);
		engine.start();

		let coordinator = SuggestionCoordinator::new(&surface, source, debounce);
		let (edits_tx, edits) = mpsc::unbounded_channel();
		let registrations = {
			let mut surface = surface.lock();
			let listener = surface.on_change(Box::new(move |text| {
				// Fails once the session is gone; the edit stays in the surface.
				let _ = edits_tx.send(text.to_owned());
			}));
			let provider = surface.register_suggestion_provider(Arc::new(coordinator.clone()));
			[listener, provider]
		};

		let (connected_tx, connected) = watch::channel(false);
		let (phase_tx, phase) = watch::channel(engine.phase());
		let (initialized_tx, initialized) = watch::channel(false);
		let pump = tokio::spawn(pump(
			engine,
			events,
			edits,
			Arc::clone(&surface),
			Status {
				connected: connected_tx,
				phase: phase_tx,
				initialized: initialized_tx,
			},
		));

		Self {
			room,
			surface,
			registrations,
			coordinator,
			connected,
			phase,
			initialized,
			pump,
		}
	}

	#[must_use]
	pub fn room(&self) -> &RoomId {
		&self.room
	}

	#[must_use]
	pub fn surface(&self) -> &Arc<Mutex<S>> {
		&self.surface
	}

	#[must_use]
	pub fn text(&self) -> String {
		self.surface.lock().text()
	}

	#[must_use]
	pub fn is_connected(&self) -> bool {
		*self.connected.borrow()
	}

	/// Follows the connectivity indicator.
	#[must_use]
	pub fn connectivity(&self) -> watch::Receiver<bool> {
		self.connected.clone()
	}

	#[must_use]
	pub fn phase(&self) -> SyncPhase {
		*self.phase.borrow()
	}

	/// Wait until the membership reaches `phase`. Returns `false` if it never will.
	pub async fn wait_for(&self, phase: SyncPhase) -> bool {
		let mut phases = self.phase.clone();
		let reached = phases.wait_for(|current| *current == phase).await.is_ok();
		reached
	}

	/// Wait until the room's starting text has arrived. Returns `false` if the
	/// connection ended first.
	pub async fn ready(&self) -> bool {
		let mut initialized = self.initialized.clone();
		let reached = initialized.wait_for(|initialized| *initialized).await.is_ok();
		reached
	}

	pub fn leave(self) {
		drop(self);
	}
}

impl<S: EditingSurface + Send + 'static> Drop for RoomSession<S> {
	fn drop(&mut self) {
		tracing::info!(room = %self.room, "leaving room");
		self.coordinator.retire();
		let mut surface = self.surface.lock();
		for registration in self.registrations {
			surface.unregister(registration);
		}
		drop(surface);
		// Dropping the engine drops the transport, which closes the socket.
		self.pump.abort();
	}
}

struct Status {
	connected: watch::Sender<bool>,
	phase: watch::Sender<SyncPhase>,
	initialized: watch::Sender<bool>,
}

impl Status {
	fn publish(&self, engine: &RoomSync<TransportSession>) {
		self.connected.send_replace(engine.connection() == ConnectionState::Open);
		self.phase.send_replace(engine.phase());
		self.initialized.send_replace(engine.is_initialized());
	}
}

/// Serializes transport events and local edits for one membership.
async fn pump<S: EditingSurface>(
	mut engine: RoomSync<TransportSession>,
	mut events: mpsc::UnboundedReceiver<TransportEvent>,
	mut edits: mpsc::UnboundedReceiver<String>,
	surface: Arc<Mutex<S>>,
	status: Status,
) {
	loop {
		tokio::select! {
			event = events.recv() => {
				let Some(event) = event else {
					break;
				};
				let closed = event == TransportEvent::Close;
				engine.handle_event(event, &mut *surface.lock());
				status.publish(&engine);
				if closed {
					break;
				}
			}
			Some(text) = edits.recv() => {
				engine.emit_local_change(text);
			}
		}
	}
}
