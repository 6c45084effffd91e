//! Debounced inline suggestions.
//!
//! Every trigger bumps a generation counter and starts a timer. When the timer
//! fires, the attempt only goes ahead if its generation is still the newest,
//! and the same check runs again once the server answers. A superseded or
//! withdrawn attempt therefore never touches the document, even if its request
//! was already on the wire.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use colab_protocol::SuggestionRequest;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::surface::{EditingSurface, InlineSuggestion, SuggestionProvider};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(600);

/// Where suggestions come from.
#[async_trait]
pub trait SuggestionSource: Send + Sync {
	async fn suggest(&self, request: &SuggestionRequest) -> Result<Option<String>>;
}

struct Inner<S> {
	surface: Weak<Mutex<S>>,
	source: Arc<dyn SuggestionSource>,
	debounce: Duration,
	generation: AtomicU64,
	retired: AtomicBool,
	/// The newest attempt. Older ones are aborted when it replaces them.
	attempt: Mutex<Option<JoinHandle<()>>>,
}

pub struct SuggestionCoordinator<S> {
	inner: Arc<Inner<S>>,
	runtime: Handle,
}

impl<S> Clone for SuggestionCoordinator<S> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
			runtime: self.runtime.clone(),
		}
	}
}

impl<S: EditingSurface + Send + 'static> SuggestionCoordinator<S> {
	/// Must be called inside a tokio runtime; attempts are spawned onto it.
	///
	/// Only a weak reference to `surface` is kept, so the surface may own the
	/// coordinator as its suggestion provider.
	pub fn new(surface: &Arc<Mutex<S>>, source: Arc<dyn SuggestionSource>, debounce: Duration) -> Self {
		Self {
			inner: Arc::new(Inner {
				surface: Arc::downgrade(surface),
				source,
				debounce,
				generation: AtomicU64::new(0),
				retired: AtomicBool::new(false),
				attempt: Mutex::new(None),
			}),
			runtime: Handle::current(),
		}
	}

	/// Restart the debounce window.
	pub fn trigger(&self) {
		if self.inner.retired.load(Ordering::SeqCst) {
			return;
		}
		let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
		let inner = Arc::clone(&self.inner);
		let attempt = self.runtime.spawn(async move { inner.attempt(generation).await });
		if let Some(previous) = self.inner.attempt.lock().replace(attempt) {
			previous.abort();
		}
	}

	/// Drop whatever is pending or in flight.
	pub fn withdraw(&self) {
		self.inner.generation.fetch_add(1, Ordering::SeqCst);
		if let Some(previous) = self.inner.attempt.lock().take() {
			previous.abort();
		}
	}

	/// Withdraw and ignore every later trigger.
	pub fn retire(&self) {
		self.inner.retired.store(true, Ordering::SeqCst);
		self.withdraw();
	}
}

impl<S: EditingSurface> Inner<S> {
	fn is_current(&self, generation: u64) -> bool {
		self.generation.load(Ordering::SeqCst) == generation
	}

	async fn attempt(&self, generation: u64) {
		tokio::time::sleep(self.debounce).await;
		if !self.is_current(generation) {
			return;
		}
		let Some(surface) = self.surface.upgrade() else {
			return;
		};

		let request = {
			let surface = surface.lock();
			SuggestionRequest {
				code: surface.text(),
				cursor_position: surface.cursor_offset(),
				language: surface.language().to_owned(),
			}
		};
		let anchor = request.cursor_position;
		tracing::debug!(generation, cursor = anchor, "requesting suggestion");

		let suggestion = match self.source.suggest(&request).await {
			Ok(suggestion) => suggestion,
			Err(error) => {
				tracing::warn!(generation, error = %format!("{error:#}"), "suggestion request failed");
				return;
			}
		};

		if !self.is_current(generation) {
			tracing::debug!(generation, "discarding stale suggestion");
			return;
		}
		let Some(text) = suggestion.filter(|text| !text.is_empty()) else {
			return;
		};

		// The anchor is where the cursor was when we asked, even if it has moved since.
		surface.lock().offer_suggestion(InlineSuggestion { anchor, text });
	}
}

impl<S: EditingSurface + Send + 'static> SuggestionProvider for SuggestionCoordinator<S> {
	fn trigger(&self) {
		SuggestionCoordinator::trigger(self);
	}

	fn withdraw(&self) {
		SuggestionCoordinator::withdraw(self);
	}
}

#[cfg(test)]
mod tests {
	use std::collections::VecDeque;

	use anyhow::anyhow;

	use super::*;
	use crate::surface::{ChangeListener, Registration, TextBuffer};

	/// Answers with scripted replies, each after its own delay.
	#[derive(Default)]
	struct Scripted {
		replies: Mutex<VecDeque<(Duration, Result<Option<String>>)>>,
		requests: Mutex<Vec<SuggestionRequest>>,
		answered: AtomicU64,
	}

	impl Scripted {
		fn reply(self, delay_ms: u64, reply: Result<Option<&str>>) -> Self {
			let reply = reply.map(|text| text.map(str::to_owned));
			self.replies.lock().push_back((Duration::from_millis(delay_ms), reply));
			self
		}

		fn requests(&self) -> Vec<SuggestionRequest> {
			self.requests.lock().clone()
		}

		fn answered(&self) -> u64 {
			self.answered.load(Ordering::SeqCst)
		}
	}

	#[async_trait]
	impl SuggestionSource for Scripted {
		async fn suggest(&self, request: &SuggestionRequest) -> Result<Option<String>> {
			self.requests.lock().push(request.clone());
			let next = self.replies.lock().pop_front();
			let (delay, reply) = next.unwrap_or((Duration::ZERO, Ok(None)));
			tokio::time::sleep(delay).await;
			self.answered.fetch_add(1, Ordering::SeqCst);
			reply
		}
	}

	/// Records every insertion instead of editing anything.
	#[derive(Default)]
	struct Recording {
		text: String,
		cursor: usize,
		inserts: Vec<(usize, String)>,
	}

	impl EditingSurface for Recording {
		fn text(&self) -> String {
			self.text.clone()
		}

		fn set_text(&mut self, text: &str) {
			text.clone_into(&mut self.text);
		}

		fn cursor_offset(&self) -> usize {
			self.cursor
		}

		fn insert_at(&mut self, offset: usize, text: &str) {
			self.inserts.push((offset, text.to_owned()));
		}

		fn language(&self) -> &str {
			"python"
		}

		fn on_change(&mut self, _listener: ChangeListener) -> Registration {
			Registration(0)
		}

		fn register_suggestion_provider(&mut self, _provider: Arc<dyn SuggestionProvider>) -> Registration {
			Registration(0)
		}

		fn unregister(&mut self, _registration: Registration) {}
	}

	fn as_source(source: &Arc<Scripted>) -> Arc<dyn SuggestionSource> {
		source.clone()
	}

	fn ms(ms: u64) -> Duration {
		Duration::from_millis(ms)
	}

	fn typing_setup(source: Scripted) -> (Arc<Mutex<TextBuffer>>, Arc<Scripted>) {
		let surface = Arc::new(Mutex::new(TextBuffer::new("python")));
		let source = Arc::new(source);
		let coordinator = SuggestionCoordinator::new(&surface, as_source(&source), DEFAULT_DEBOUNCE);
		surface.lock().register_suggestion_provider(Arc::new(coordinator));
		(surface, source)
	}

	#[tokio::test(start_paused = true)]
	async fn rapid_typing_issues_one_request() {
		let (surface, source) = typing_setup(Scripted::default());

		for key in ["i", "m", "p", "o", "r", "t"] {
			surface.lock().type_text(key);
			tokio::time::sleep(ms(100)).await;
		}
		tokio::time::sleep(ms(1000)).await;

		let requests = source.requests();
		assert_eq!(requests.len(), 1);
		assert_eq!(requests[0].code, "import");
		assert_eq!(requests[0].cursor_position, 6);
		assert_eq!(requests[0].language, "python");
	}

	#[tokio::test(start_paused = true)]
	async fn nothing_before_the_window_elapses() {
		let (surface, source) = typing_setup(Scripted::default());
		surface.lock().type_text("d");
		tokio::time::sleep(ms(599)).await;
		assert!(source.requests().is_empty());
		tokio::time::sleep(ms(2)).await;
		assert_eq!(source.requests().len(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn snapshot_is_taken_when_the_window_elapses() {
		let (surface, source) = typing_setup(Scripted::default());
		surface.lock().type_text("ab");
		tokio::time::sleep(ms(300)).await;
		// A remote update lands mid-window.
		surface.lock().set_text("a");
		tokio::time::sleep(ms(400)).await;

		let requests = source.requests();
		assert_eq!(requests.len(), 1);
		assert_eq!(requests[0].code, "a");
		assert_eq!(requests[0].cursor_position, 1);
	}

	#[tokio::test(start_paused = true)]
	async fn suggestion_lands_at_captured_cursor() {
		let (surface, _source) = typing_setup(Scripted::default().reply(0, Ok(Some(" os"))));
		surface.lock().type_text("import");
		tokio::time::sleep(ms(700)).await;

		assert_eq!(surface.lock().text(), "import os");
	}

	#[tokio::test(start_paused = true)]
	async fn late_reply_of_superseded_request_is_dropped() {
		let source = Scripted::default()
			.reply(1000, Ok(Some("FIRST")))
			.reply(100, Ok(Some("SECOND")));
		let (surface, source) = typing_setup(source);

		// First window elapses at 600 and its request hangs until 1600.
		surface.lock().type_text("a");
		tokio::time::sleep(ms(800)).await;
		assert_eq!(source.requests().len(), 1);

		// Second window elapses at 1400, answered at 1500.
		surface.lock().type_text("b");
		tokio::time::sleep(ms(2000)).await;

		assert_eq!(source.requests().len(), 2);
		assert_eq!(surface.lock().text(), "abSECOND");
	}

	#[tokio::test(start_paused = true)]
	async fn superseded_attempts_are_aborted() {
		let source = Scripted::default()
			.reply(1000, Ok(Some("FIRST")))
			.reply(1000, Ok(Some("SECOND")))
			.reply(0, Ok(None));
		let (surface, source) = typing_setup(source);

		surface.lock().type_text("a");
		tokio::time::sleep(ms(700)).await;
		surface.lock().type_text("b");
		tokio::time::sleep(ms(700)).await;
		assert_eq!(source.requests().len(), 2);
		surface.lock().move_cursor(0);
		tokio::time::sleep(ms(3000)).await;

		// Neither hanging request ran to completion.
		assert_eq!(source.answered(), 0);
		assert_eq!(surface.lock().text(), "ab");
	}

	#[tokio::test(start_paused = true)]
	async fn trigger_inside_window_cancels_first() {
		let source = Scripted::default().reply(0, Ok(Some("ONLY")));
		let (surface, source) = typing_setup(source);

		surface.lock().type_text("a");
		tokio::time::sleep(ms(300)).await;
		surface.lock().type_text("b");
		tokio::time::sleep(ms(1000)).await;

		assert_eq!(source.requests().len(), 1);
		assert_eq!(surface.lock().text(), "abONLY");
	}

	#[tokio::test(start_paused = true)]
	async fn withdraw_discards_in_flight_reply() {
		let source = Scripted::default().reply(500, Ok(Some("late")));
		let (surface, source) = typing_setup(source);

		surface.lock().type_text("x");
		tokio::time::sleep(ms(700)).await;
		assert_eq!(source.requests().len(), 1);
		surface.lock().move_cursor(0);
		tokio::time::sleep(ms(1000)).await;

		assert_eq!(surface.lock().text(), "x");
	}

	#[tokio::test(start_paused = true)]
	async fn absent_suggestion_inserts_nothing() {
		let surface = Arc::new(Mutex::new(Recording::default()));
		let source = Arc::new(Scripted::default().reply(0, Ok(None)).reply(0, Ok(Some(""))));
		let coordinator = SuggestionCoordinator::new(&surface, as_source(&source), ms(10));

		coordinator.trigger();
		tokio::time::sleep(ms(50)).await;
		coordinator.trigger();
		tokio::time::sleep(ms(50)).await;

		assert_eq!(source.requests().len(), 2);
		assert!(surface.lock().inserts.is_empty());
	}

	#[tokio::test(start_paused = true)]
	async fn failures_are_swallowed() {
		let surface = Arc::new(Mutex::new(Recording {
			text: "def".to_owned(),
			cursor: 3,
			..Recording::default()
		}));
		let source = Arc::new(
			Scripted::default()
				.reply(0, Err(anyhow!("connection refused")))
				.reply(0, Ok(Some(" f():"))),
		);
		let coordinator = SuggestionCoordinator::new(&surface, as_source(&source), ms(10));

		coordinator.trigger();
		tokio::time::sleep(ms(50)).await;
		assert!(surface.lock().inserts.is_empty());

		// The next attempt is unaffected.
		coordinator.trigger();
		tokio::time::sleep(ms(50)).await;
		assert_eq!(surface.lock().inserts, [(3, " f():".to_owned())]);
	}

	#[tokio::test(start_paused = true)]
	async fn retired_coordinator_stays_quiet() {
		let surface = Arc::new(Mutex::new(Recording::default()));
		let source = Arc::new(Scripted::default().reply(0, Ok(Some("x"))));
		let coordinator = SuggestionCoordinator::new(&surface, as_source(&source), ms(10));

		coordinator.trigger();
		coordinator.retire();
		coordinator.trigger();
		tokio::time::sleep(ms(50)).await;

		assert!(source.requests().is_empty());
		assert!(surface.lock().inserts.is_empty());
	}
}
