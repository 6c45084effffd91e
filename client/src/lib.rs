#![deny(
	absolute_paths_not_starting_with_crate,
	keyword_idents,
	macro_use_extern_crate,
	meta_variable_misuse,
	missing_abi,
	missing_copy_implementations,
	non_ascii_idents,
	nonstandard_style,
	noop_method_call,
	rust_2018_idioms,
	unused_qualifications
)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

//! Client side of a shared editing room.
//!
//! A [`RoomSession`] keeps an [`EditingSurface`] in step with everyone else in
//! the room over one WebSocket, and offers inline suggestions after the user
//! pauses typing.

use std::time::Duration;

use anyhow::Result;

pub mod api;
pub mod session;
pub mod suggest;
pub mod surface;
pub mod sync;
pub mod transport;

pub use api::ApiClient;
pub use colab_protocol::RoomId;
pub use session::RoomSession;
pub use suggest::{SuggestionCoordinator, SuggestionSource, DEFAULT_DEBOUNCE};
pub use surface::{EditingSurface, InlineSuggestion, Registration, SuggestionProvider, TextBuffer};
pub use sync::{RoomSync, SyncPhase};
pub use transport::{ConnectionState, TransportEvent, TransportSession};

#[derive(Debug, Clone)]
pub struct ClientConfig {
	/// Base URL of the HTTP API. The socket endpoint is derived from it.
	pub api_url: String,
	/// Language id sent along with suggestion requests.
	pub language: String,
	pub debounce: Duration,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			api_url: "http://127.0.0.1:8000".to_owned(),
			language: "python".to_owned(),
			debounce: DEFAULT_DEBOUNCE,
		}
	}
}

impl ClientConfig {
	/// # Errors
	///
	/// If the HTTP client cannot be built.
	pub fn api_client(&self) -> Result<ApiClient> {
		ApiClient::new(self.api_url.as_str())
	}
}
