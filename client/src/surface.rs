//! The capabilities the sync and suggestion engines need from an editor widget.
//!
//! Offsets are in characters, matching the `cursorPosition` sent to the server.

use std::sync::Arc;

pub type ChangeListener = Box<dyn FnMut(&str) + Send>;

/// Identifies a listener or provider so it can be taken off the surface again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Registration(pub u64);

/// Receives the editor's requests for inline suggestions.
pub trait SuggestionProvider: Send + Sync {
	/// The user typed; a suggestion may be wanted once they pause.
	fn trigger(&self);
	/// Whatever was asked for is no longer wanted.
	fn withdraw(&self);
}

/// Text proposed for insertion at `anchor`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineSuggestion {
	pub anchor: usize,
	pub text: String,
}

pub trait EditingSurface {
	fn text(&self) -> String;

	/// Replace the whole document with a remote snapshot.
	///
	/// Change listeners are not told: the text did not come from the user.
	fn set_text(&mut self, text: &str);

	fn cursor_offset(&self) -> usize;

	/// Insert `text` at a character offset, as if the user had typed it there.
	fn insert_at(&mut self, offset: usize, text: &str);

	fn language(&self) -> &str;

	/// Hand a suggestion to the widget. Widgets that can show ghost text should
	/// override this; the fallback accepts it straight away.
	fn offer_suggestion(&mut self, suggestion: InlineSuggestion) {
		self.insert_at(suggestion.anchor, &suggestion.text);
	}

	/// Call `listener` with the full text after every user edit.
	fn on_change(&mut self, listener: ChangeListener) -> Registration;

	fn register_suggestion_provider(&mut self, provider: Arc<dyn SuggestionProvider>) -> Registration;

	/// Remove a listener or provider. Unknown registrations are ignored.
	fn unregister(&mut self, registration: Registration);
}

/// Byte index of the `offset`th character, clamped to the end.
fn byte_index(text: &str, offset: usize) -> usize {
	text.char_indices().nth(offset).map_or(text.len(), |(index, _)| index)
}

/// A plain in-memory editor with a single cursor.
pub struct TextBuffer {
	text: String,
	cursor: usize,
	language: String,
	listeners: Vec<(Registration, ChangeListener)>,
	providers: Vec<(Registration, Arc<dyn SuggestionProvider>)>,
	next_registration: u64,
}

impl TextBuffer {
	#[must_use]
	pub fn new(language: impl Into<String>) -> Self {
		Self {
			text: String::new(),
			cursor: 0,
			language: language.into(),
			listeners: Vec::new(),
			providers: Vec::new(),
			next_registration: 0,
		}
	}

	fn next_registration(&mut self) -> Registration {
		self.next_registration += 1;
		Registration(self.next_registration)
	}

	fn len_chars(&self) -> usize {
		self.text.chars().count()
	}

	fn changed(&mut self) {
		for (_, listener) in &mut self.listeners {
			listener(&self.text);
		}
	}

	fn insert(&mut self, offset: usize, text: &str) {
		let offset = offset.min(self.len_chars());
		self.text.insert_str(byte_index(&self.text, offset), text);
		self.cursor = offset + text.chars().count();
	}

	/// Type at the cursor. Fires change listeners and asks for a suggestion.
	pub fn type_text(&mut self, text: &str) {
		self.insert(self.cursor, text);
		self.changed();
		for (_, provider) in &self.providers {
			provider.trigger();
		}
	}

	/// Delete the character before the cursor, if any.
	pub fn backspace(&mut self) {
		if self.cursor == 0 {
			return;
		}
		let start = byte_index(&self.text, self.cursor - 1);
		let end = byte_index(&self.text, self.cursor);
		self.text.replace_range(start..end, "");
		self.cursor -= 1;
		self.changed();
		for (_, provider) in &self.providers {
			provider.trigger();
		}
	}

	/// Move the cursor. Any pending suggestion is dropped.
	pub fn move_cursor(&mut self, offset: usize) {
		self.cursor = offset.min(self.len_chars());
		for (_, provider) in &self.providers {
			provider.withdraw();
		}
	}
}

impl EditingSurface for TextBuffer {
	fn text(&self) -> String {
		self.text.clone()
	}

	fn set_text(&mut self, text: &str) {
		text.clone_into(&mut self.text);
		self.cursor = self.cursor.min(self.len_chars());
	}

	fn cursor_offset(&self) -> usize {
		self.cursor
	}

	fn insert_at(&mut self, offset: usize, text: &str) {
		self.insert(offset, text);
		self.changed();
	}

	fn language(&self) -> &str {
		&self.language
	}

	fn on_change(&mut self, listener: ChangeListener) -> Registration {
		let registration = self.next_registration();
		self.listeners.push((registration, listener));
		registration
	}

	fn register_suggestion_provider(&mut self, provider: Arc<dyn SuggestionProvider>) -> Registration {
		let registration = self.next_registration();
		self.providers.push((registration, provider));
		registration
	}

	fn unregister(&mut self, registration: Registration) {
		self.listeners.retain(|(id, _)| *id != registration);
		self.providers.retain(|(id, _)| *id != registration);
	}
}
