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

use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use colab_protocol::{RoomCreated, SuggestionRequest, SuggestionResponse};
use tower_http::cors::CorsLayer;

pub mod autocomplete;
pub mod rooms;
mod socket;

pub use rooms::Rooms;

/// Server settings, read from the command line or the environment.
#[derive(Debug, Clone, Copy, clap::Parser)]
#[command(name = "colab-server", about = "Relay server for shared editing rooms")]
pub struct Config {
	/// Address to listen on.
	#[arg(long, env = "COLAB_ADDRESS", default_value = "127.0.0.1:8000")]
	pub address: SocketAddr,
	/// How many relayed frames a slow member may fall behind before it skips some.
	#[arg(long, env = "COLAB_BROADCAST_CAPACITY", default_value_t = 256)]
	pub broadcast_capacity: usize,
}

async fn create_room(extract::State(rooms): extract::State<Arc<Rooms>>) -> Json<RoomCreated> {
	let room_id = rooms.create();
	tracing::info!(room = %room_id, "room created");
	Json(RoomCreated { room_id })
}

async fn socket(
	extract::State(rooms): extract::State<Arc<Rooms>>,
	extract::Path(room): extract::Path<String>,
	upgrade: extract::WebSocketUpgrade,
) -> Response {
	tracing::info!(%room, "socket connection");
	upgrade.on_upgrade(move |socket| async move {
		if let Err(error) = socket::handle_connection(&rooms, room.into(), socket).await {
			tracing::error!(%error, "client error");
		}
	})
}

async fn suggest(Json(request): Json<SuggestionRequest>) -> Json<SuggestionResponse> {
	let suggestion = autocomplete::suggest(&request.code, request.cursor_position);
	tracing::debug!(
		cursor = request.cursor_position,
		language = %request.language,
		found = suggestion.is_some(),
		"autocomplete"
	);
	Json(SuggestionResponse {
		suggestion: suggestion.map(str::to_owned),
	})
}

/// All HTTP and WebSocket routes, sharing one room registry.
pub fn router(rooms: Arc<Rooms>) -> Router {
	Router::new()
		.route("/rooms", post(create_room))
		.route("/ws/:room_id", get(socket))
		.route("/autocomplete", post(suggest))
		.layer(CorsLayer::permissive())
		.with_state(rooms)
}

/// Serve on an already bound listener until the process is stopped.
///
/// # Errors
///
/// If the listener cannot be handed to the runtime or the server fails.
pub async fn serve(listener: TcpListener, rooms: Arc<Rooms>) -> Result<()> {
	let address = listener.local_addr().context("reading listener address")?;
	tracing::info!(%address, "listening");
	axum::Server::from_tcp(listener)
		.context("adopting listener")?
		.serve(router(rooms).into_make_service())
		.await
		.context("serving")
}
