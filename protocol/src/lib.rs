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

use std::borrow::Cow;
use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Opaque room identifier, allocated by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
	#[must_use]
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	#[must_use]
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl Display for RoomId {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<String> for RoomId {
	fn from(id: String) -> Self {
		Self(id)
	}
}

impl From<&str> for RoomId {
	fn from(id: &str) -> Self {
		Self(id.to_owned())
	}
}

/// A message from the client to the server.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage<'a> {
	/// "Server, the whole document is now `code`."
	CodeUpdate { code: Cow<'a, str> },
	/// Any `type` we do not understand. Relayed, never applied.
	#[serde(other)]
	Unknown,
}

/// A message from the server to the client.
///
/// Both document-carrying kinds hold a full snapshot, never a delta.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage<'a> {
	/// Sent once, right after joining a room.
	Init { code: Cow<'a, str> },
	/// Another member replaced the document.
	CodeUpdate { code: Cow<'a, str> },
	#[serde(other)]
	Unknown,
}

impl ServerMessage<'_> {
	/// The document snapshot carried by this message, if any.
	#[must_use]
	pub fn snapshot(&self) -> Option<&str> {
		match self {
			Self::Init { code } | Self::CodeUpdate { code } => Some(code.as_ref()),
			Self::Unknown => None,
		}
	}
}

/// Response body of `POST /rooms`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomCreated {
	pub room_id: RoomId,
}

/// Request body of `POST /autocomplete`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionRequest {
	pub code: String,
	/// Offset of the cursor in characters from the start of `code`.
	pub cursor_position: usize,
	pub language: String,
}

/// Response body of `POST /autocomplete`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionResponse {
	#[serde(default)]
	pub suggestion: Option<String>,
}

impl SuggestionResponse {
	/// The suggestion, treating an empty string the same as an absent one.
	#[must_use]
	pub fn into_suggestion(self) -> Option<String> {
		self.suggestion.filter(|suggestion| !suggestion.is_empty())
	}
}

/// Encode a value using the standard wire format.
pub fn encode<T: Serialize>(v: &T) -> String {
	serde_json::to_string(v).unwrap_or_else(|error| unreachable!("encode error: {error}"))
}

/// Decode a value using the standard wire format.
///
/// # Errors
///
/// If the data is not valid JSON or lacks a `type` field.
pub fn decode<'a, T: Deserialize<'a>>(raw: &'a str) -> Result<T, serde_json::Error> {
	serde_json::from_str(raw)
}
