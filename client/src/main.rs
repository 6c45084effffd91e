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

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colab_client::{
	ClientConfig, EditingSurface, InlineSuggestion, RoomId, RoomSession, SuggestionProvider, TextBuffer,
};
use colab_client::surface::{ChangeListener, Registration};
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "colab", about = "Edit a shared room from the terminal")]
struct Args {
	/// Base URL of the server's HTTP API.
	#[arg(long, env = "COLAB_API_URL", default_value = "http://127.0.0.1:8000")]
	api_url: String,
	/// Language sent with suggestion requests.
	#[arg(long, env = "COLAB_LANGUAGE", default_value = "python")]
	language: String,
	/// Pause after typing before a suggestion is requested.
	#[arg(long, env = "COLAB_DEBOUNCE_MS", default_value_t = 600)]
	debounce_ms: u64,
	#[command(subcommand)]
	command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
	/// Create a room and print its id.
	Create,
	/// Join a room.
	///
	/// Every line read from stdin is typed at the cursor, with `\n` standing
	/// for a line break. `:accept` inserts the last suggestion, `:quit` leaves.
	Join { room: String },
}

/// A text buffer that prints what the room does to it.
struct Console {
	buffer: TextBuffer,
	pending: Option<InlineSuggestion>,
}

impl EditingSurface for Console {
	fn text(&self) -> String {
		self.buffer.text()
	}

	fn set_text(&mut self, text: &str) {
		self.buffer.set_text(text);
		self.pending = None;
		println!("--- remote update ---\n{text}\n---");
	}

	fn cursor_offset(&self) -> usize {
		self.buffer.cursor_offset()
	}

	fn insert_at(&mut self, offset: usize, text: &str) {
		self.buffer.insert_at(offset, text);
	}

	fn language(&self) -> &str {
		self.buffer.language()
	}

	fn offer_suggestion(&mut self, suggestion: InlineSuggestion) {
		println!("suggestion: {:?} (:accept to insert)", suggestion.text);
		self.pending = Some(suggestion);
	}

	fn on_change(&mut self, listener: ChangeListener) -> Registration {
		self.buffer.on_change(listener)
	}

	fn register_suggestion_provider(&mut self, provider: Arc<dyn SuggestionProvider>) -> Registration {
		self.buffer.register_suggestion_provider(provider)
	}

	fn unregister(&mut self, registration: Registration) {
		self.buffer.unregister(registration);
	}
}

async fn join(config: &ClientConfig, room: RoomId) -> Result<()> {
	let api = config.api_client()?;
	let surface = Arc::new(Mutex::new(Console {
		buffer: TextBuffer::new(config.language.as_str()),
		pending: None,
	}));
	let session = RoomSession::join(&api, room, Arc::clone(&surface), config.debounce);
	println!("room {}", session.room());

	let mut connectivity = session.connectivity();
	let mut lines = BufReader::new(tokio::io::stdin()).lines();
	loop {
		tokio::select! {
			changed = connectivity.changed() => {
				if changed.is_err() {
					println!("disconnected");
					break;
				}
				let connected = *connectivity.borrow_and_update();
				println!("{}", if connected { "connected" } else { "disconnected" });
			}
			line = lines.next_line() => {
				let Some(line) = line.context("reading stdin")? else {
					break;
				};
				match line.as_str() {
					":quit" => break,
					":accept" => {
						let mut surface = surface.lock();
						if let Some(suggestion) = surface.pending.take() {
							surface.insert_at(suggestion.anchor, &suggestion.text);
						}
					}
					_ => {
						let mut surface = surface.lock();
						surface.pending = None;
						surface.buffer.type_text(&line.replace("\\n", "\n"));
					}
				}
			}
		}
	}

	session.leave();
	Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
		.with_writer(std::io::stderr)
		.init();

	let args = Args::parse();
	let config = ClientConfig {
		api_url: args.api_url,
		language: args.language,
		debounce: Duration::from_millis(args.debounce_ms),
	};

	match args.command {
		Command::Create => {
			let room = config.api_client()?.create_room().await?;
			println!("{room}");
		}
		Command::Join { room } => join(&config, room.into()).await?,
	}

	Ok(())
}
