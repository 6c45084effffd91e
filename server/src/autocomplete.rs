//! Keyword-driven inline suggestions.
//!
//! A stand-in for a real completion model: looks at what precedes the cursor
//! and, if it ends in a known keyword, proposes the rest of the statement.

const RULES: &[(&str, &str)] = &[
	("def", " my_function():\n    pass"),
	("class", " MyClass:\n    def __init__(self):\n        pass"),
	("import", " os"),
	("print", "('Hello World')"),
	("if", " __name__ == \"__main__\":\n    pass"),
	("for", " i in range(10):\n    print(i)"),
	("try", ":\n    pass\nexcept Exception as e:\n    print(e)"),
	("return", " True"),
];

/// Text to insert at `cursor` (a character offset into `code`), if any.
///
/// Offsets past the end are clamped. The first matching rule wins.
#[must_use]
pub fn suggest(code: &str, cursor: usize) -> Option<&'static str> {
	let before = match code.char_indices().nth(cursor) {
		Some((index, _)) => &code[..index],
		None => code,
	};
	let before = before.trim();

	RULES
		.iter()
		.find(|(keyword, _)| before.ends_with(keyword))
		.map(|&(_, suggestion)| suggestion)
}
