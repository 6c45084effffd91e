//! HTTP side of the server: room creation and suggestions.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use colab_protocol::{RoomCreated, RoomId, SuggestionRequest, SuggestionResponse};
use reqwest::Client;

use crate::suggest::SuggestionSource;

const CONNECT_TIMEOUT_SECS: u64 = 5;
const REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct ApiClient {
	base_url: String,
	http: Client,
}

impl ApiClient {
	/// # Errors
	///
	/// If the HTTP client cannot be built.
	pub fn new(base_url: impl Into<String>) -> Result<Self> {
		let http = Client::builder()
			.timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
			.connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
			.build()
			.context("building HTTP client")?;
		Ok(Self {
			base_url: base_url.into(),
			http,
		})
	}

	fn url(&self, path: &str) -> String {
		let base = self.base_url.trim_end_matches('/');
		let path = path.trim_start_matches('/');
		format!("{base}/{path}")
	}

	/// The WebSocket endpoint of `room`: the API URL with `http` swapped for `ws`.
	#[must_use]
	pub fn socket_url(&self, room: &RoomId) -> String {
		let url = self.url(&format!("ws/{room}"));
		match url.strip_prefix("http") {
			Some(rest) => format!("ws{rest}"),
			None => url,
		}
	}

	/// Ask the server for a fresh room.
	///
	/// # Errors
	///
	/// If the server is unreachable or answers with an error.
	pub async fn create_room(&self) -> Result<RoomId> {
		let created: RoomCreated = self
			.http
			.post(self.url("rooms"))
			.send()
			.await
			.context("creating room")?
			.error_for_status()?
			.json()
			.await
			.context("decoding room id")?;
		Ok(created.room_id)
	}
}

#[async_trait]
impl SuggestionSource for ApiClient {
	async fn suggest(&self, request: &SuggestionRequest) -> Result<Option<String>> {
		let response: SuggestionResponse = self
			.http
			.post(self.url("autocomplete"))
			.json(request)
			.send()
			.await
			.context("requesting suggestion")?
			.error_for_status()?
			.json()
			.await
			.context("decoding suggestion")?;
		Ok(response.into_suggestion())
	}
}
