//! # Target parser
//!
//! Parses textual target paths into a [`TargetPath`].
//!
//! ## Supported Syntax
//!
//! ```text
//! target  = root segment* marker?
//! root    = ident
//! segment = "." ident | "[" string "]"
//! string  = '"' char* '"' | "'" char* "'"
//! marker  = "#get" | "#set"
//! ident   = (alpha | "_" | "$") (alnum | "_" | "$")*
//! ```
//!
//! Inside a string a backslash escapes the next character.

use std::fmt;

/// A parse failure with the byte offset it was detected at.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ParseError {
	pub message: String,
	pub position: usize,
}

impl fmt::Display for ParseError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "parse error at position {}: {}", self.position, self.message)
	}
}

impl std::error::Error for ParseError {}

/// A syntactically valid target path, not yet resolved against a realm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetPath {
	pub root: String,
	pub segments: Vec<String>,
	/// `#set` marker: the path addresses the write half of a property.
	pub setter: bool,
}

impl TargetPath {
	/// Member named by the path: the last segment, or the root for one-segment paths.
	pub fn member(&self) -> &str {
		self.segments.last().unwrap_or(&self.root)
	}

	/// Canonical display form, without marker. Non-identifier segments are
	/// written in bracket form with double quotes.
	pub fn canonical(&self) -> String {
		let mut out = self.root.clone();
		for segment in &self.segments {
			if is_ident(segment) {
				out.push('.');
				out.push_str(segment);
			} else {
				out.push_str("[\"");
				for ch in segment.chars() {
					if matches!(ch, '"' | '\\') {
						out.push('\\');
					}
					out.push(ch);
				}
				out.push_str("\"]");
			}
		}
		out
	}
}

impl fmt::Display for TargetPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.canonical())?;
		if self.setter {
			f.write_str("#set")?;
		}
		Ok(())
	}
}

fn is_ident_start(ch: char) -> bool {
	ch.is_alphabetic() || ch == '_' || ch == '$'
}

fn is_ident_continue(ch: char) -> bool {
	ch.is_alphanumeric() || ch == '_' || ch == '$'
}

/// Whether `s` is a syntactically valid identifier.
pub fn is_ident(s: &str) -> bool {
	let mut chars = s.chars();
	chars.next().is_some_and(is_ident_start) && chars.all(is_ident_continue)
}

struct Parser<'a> {
	input: &'a str,
	position: usize,
}

impl<'a> Parser<'a> {
	fn new(input: &'a str) -> Self {
		Self { input, position: 0 }
	}

	fn peek(&self) -> Option<char> {
		self.input.chars().next()
	}

	fn next(&mut self) -> Option<char> {
		let ch = self.peek()?;
		self.position += ch.len_utf8();
		self.input = &self.input[ch.len_utf8()..];
		Some(ch)
	}

	fn is_end(&self) -> bool {
		self.input.is_empty()
	}

	fn take(&mut self, expected: char) -> Result<(), ParseError> {
		match self.next() {
			Some(ch) if ch == expected => Ok(()),
			Some(ch) => Err(ParseError {
				message: format!("expected '{expected}', found '{ch}'"),
				position: self.position - ch.len_utf8(),
			}),
			None => Err(self.error(format!("expected '{expected}', found end of input"))),
		}
	}

	fn take_while(&mut self, predicate: impl Fn(char) -> bool) -> &'a str {
		let len = self
			.input
			.char_indices()
			.find(|&(_, ch)| !predicate(ch))
			.map_or(self.input.len(), |(i, _)| i);
		let (taken, rest) = self.input.split_at(len);
		self.input = rest;
		self.position += len;
		taken
	}

	fn error(&self, message: String) -> ParseError {
		ParseError {
			message,
			position: self.position,
		}
	}
}

/// Parses a target path.
///
/// # Errors
///
/// Returns a [`ParseError`] if the input does not match the grammar.
pub fn parse(s: &str) -> Result<TargetPath, ParseError> {
	let mut parser = Parser::new(s);
	let root = parse_ident(&mut parser)?;
	let mut segments = Vec::new();
	let mut setter = false;

	while let Some(ch) = parser.peek() {
		match ch {
			'.' => {
				parser.next();
				segments.push(parse_ident(&mut parser)?);
			}
			'[' => {
				parser.next();
				segments.push(parse_string(&mut parser)?);
				parser.take(']')?;
			}
			'#' => {
				setter = parse_marker(&mut parser)?;
				break;
			}
			other => return Err(parser.error(format!("unexpected '{other}'"))),
		}
	}

	if !parser.is_end() {
		return Err(parser.error(format!("expected end of input, found '{}'", parser.input)));
	}

	Ok(TargetPath {
		root,
		segments,
		setter,
	})
}

/// Grammar: `ident = (alpha | "_" | "$") (alnum | "_" | "$")*`
fn parse_ident(parser: &mut Parser) -> Result<String, ParseError> {
	match parser.peek() {
		Some(ch) if is_ident_start(ch) => Ok(parser.take_while(is_ident_continue).to_string()),
		Some(ch) => Err(parser.error(format!("expected identifier, found '{ch}'"))),
		None => Err(parser.error("expected identifier, found end of input".to_string())),
	}
}

/// Grammar: `string = '"' char* '"' | "'" char* "'"`
fn parse_string(parser: &mut Parser) -> Result<String, ParseError> {
	let quote = match parser.peek() {
		Some(q @ ('"' | '\'')) => q,
		Some(ch) => return Err(parser.error(format!("expected quoted string, found '{ch}'"))),
		None => return Err(parser.error("expected quoted string, found end of input".to_string())),
	};
	let start = parser.position;
	parser.next();

	let mut out = String::new();
	loop {
		match parser.next() {
			Some(ch) if ch == quote => return Ok(out),
			Some('\\') => match parser.next() {
				Some(escaped) => out.push(escaped),
				None => break,
			},
			Some(ch) => out.push(ch),
			None => break,
		}
	}
	Err(ParseError {
		message: "unterminated string".to_string(),
		position: start,
	})
}

/// Grammar: `marker = "#get" | "#set"`. Returns whether the marker selects the write path.
fn parse_marker(parser: &mut Parser) -> Result<bool, ParseError> {
	let start = parser.position;
	parser.take('#')?;
	match parser.take_while(|ch| ch.is_ascii_alphabetic()) {
		"get" => Ok(false),
		"set" => Ok(true),
		other => Err(ParseError {
			message: format!("unknown marker '#{other}', expected '#get' or '#set'"),
			position: start,
		}),
	}
}
