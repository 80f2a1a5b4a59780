//! Primary codec for table-literal settings files.
//!
//! A table-literal file holds a single assignment of a nested table to a name:
//!
//! ```lua
//! cfg = {
//! 	["name"] = "Training server",
//! 	["port"] = 10308,
//! 	["missionList"] = {
//! 		[1] = "Caucasus.miz",
//! 		[2] = "Syria.miz",
//! 	},
//! }
//! ```
//!
//! Tables whose keys are exactly `1..n` become sequences, every other table
//! becomes a mapping. `nil` fields are dropped.

use std::ops::Range;

use logos::Logos;
use snailquote::unescape;

use crate::Mapping;
use crate::SettingsError;
use crate::SettingsResult;
use crate::Value;

/// Name used for the assignment when neither the caller nor the file provide
/// one.
pub const DEFAULT_ROOT_NAME: &str = "cfg";

/// Deepest nesting of tables accepted by the parser.
pub const MAX_TABLE_DEPTH: usize = 128;

#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(skip(r"([ \t\r\n\f]+|--[^\n]*)", allow_greedy = true))]
enum RawToken {
	#[token("{")]
	BraceOpen,
	#[token("}")]
	BraceClose,
	#[token("[")]
	BracketOpen,
	#[token("]")]
	BracketClose,
	#[token("=")]
	Assign,
	#[token(",")]
	Comma,
	#[token(";")]
	Semicolon,
	#[token("-")]
	Minus,
	#[token("true")]
	True,
	#[token("false")]
	False,
	#[token("nil")]
	Nil,
	#[token("return")]
	Return,
	#[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
	Ident,
	#[regex(r#""([^"\\]|\\.)*""#)]
	DoubleQuotedString,
	#[regex(r"'([^'\\]|\\.)*'")]
	SingleQuotedString,
	#[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?")]
	Number,
}

/// A parsed table-literal document.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDocument {
	/// The left-hand name of the assignment, if the file had one.
	pub name: Option<String>,
	/// The assigned table.
	pub root: Mapping,
}

enum TableKey {
	Index(i64),
	Name(String),
}

struct TableParser<'a> {
	source: &'a str,
	tokens: Vec<(Result<RawToken, ()>, Range<usize>)>,
	cursor: usize,
	depth: usize,
}

impl<'a> TableParser<'a> {
	fn new(source: &'a str) -> Self {
		Self {
			source,
			tokens: RawToken::lexer(source).spanned().collect(),
			cursor: 0,
			depth: 0,
		}
	}

	fn peek(&self) -> Option<RawToken> {
		self.peek_at(0)
	}

	fn peek_at(&self, offset: usize) -> Option<RawToken> {
		self.tokens
			.get(self.cursor + offset)
			.and_then(|(token, _)| token.ok())
	}

	fn slice(&self) -> &'a str {
		let (_, span) = &self.tokens[self.cursor];
		&self.source[span.clone()]
	}

	fn offset(&self) -> usize {
		self.tokens
			.get(self.cursor)
			.map_or(self.source.len(), |(_, span)| span.start)
	}

	fn error(&self, reason: impl Into<String>) -> SettingsError {
		let (line, column) = line_column(self.source, self.offset());
		SettingsError::TableSyntax {
			line,
			column,
			reason: reason.into(),
		}
	}

	fn unexpected(&self, expected: &str) -> SettingsError {
		match self.tokens.get(self.cursor) {
			None => self.error(format!("expected {expected}, found end of input")),
			Some((Err(()), _)) => self.error(format!("unrecognized input `{}`", self.slice())),
			Some((Ok(_), _)) => self.error(format!("expected {expected}, found `{}`", self.slice())),
		}
	}

	fn expect(&mut self, token: RawToken, expected: &str) -> SettingsResult<()> {
		if self.peek() == Some(token) {
			self.cursor += 1;
			Ok(())
		} else {
			Err(self.unexpected(expected))
		}
	}

	fn document(&mut self) -> SettingsResult<TableDocument> {
		let name = match (self.peek(), self.peek_at(1)) {
			(Some(RawToken::Ident), Some(RawToken::Assign)) => {
				let name = self.slice().to_string();
				self.cursor += 2;
				Some(name)
			}
			(Some(RawToken::Return), _) => {
				self.cursor += 1;
				None
			}
			_ => None,
		};

		if self.peek() != Some(RawToken::BraceOpen) {
			return Err(self.unexpected("`{`"));
		}

		let root = match self.value()? {
			Some(Value::Mapping(map)) => map,
			Some(other) => {
				return Err(self.error(format!(
					"the root table must have string keys, found a {}",
					other.type_name()
				)));
			}
			None => return Err(self.error("the root table must not be `nil`")),
		};

		if self.cursor < self.tokens.len() {
			return Err(self.unexpected("end of input"));
		}

		Ok(TableDocument { name, root })
	}

	/// Parse a value. `nil` yields `None`.
	fn value(&mut self) -> SettingsResult<Option<Value>> {
		let value = match self.peek() {
			Some(RawToken::BraceOpen) => return self.table().map(Some),
			Some(RawToken::DoubleQuotedString | RawToken::SingleQuotedString) => {
				Value::String(self.string()?)
			}
			Some(RawToken::Number) => self.number(false)?,
			Some(RawToken::Minus) => {
				self.cursor += 1;
				if self.peek() != Some(RawToken::Number) {
					return Err(self.unexpected("a number after `-`"));
				}
				self.number(true)?
			}
			Some(RawToken::True) => {
				self.cursor += 1;
				Value::Boolean(true)
			}
			Some(RawToken::False) => {
				self.cursor += 1;
				Value::Boolean(false)
			}
			Some(RawToken::Nil) => {
				self.cursor += 1;
				return Ok(None);
			}
			_ => return Err(self.unexpected("a value")),
		};

		Ok(Some(value))
	}

	/// Strip the quotes from the current string token and unescape it.
	fn string(&mut self) -> SettingsResult<String> {
		let value = unquote(self.slice())
			.map_err(|e| self.error(format!("invalid string escape: {e}")))?;

		self.cursor += 1;
		Ok(value)
	}

	fn number(&mut self, negative: bool) -> SettingsResult<Value> {
		let slice = self.slice();
		let is_float = slice.contains('.') || slice.contains('e') || slice.contains('E');

		let value = if is_float {
			let parsed: f64 = slice
				.parse()
				.map_err(|_| self.error(format!("invalid number `{slice}`")))?;
			Value::Float(if negative { -parsed } else { parsed })
		} else {
			let digits = if negative {
				format!("-{slice}")
			} else {
				slice.to_string()
			};
			let parsed: i64 = digits
				.parse()
				.map_err(|_| self.error(format!("integer out of range `{digits}`")))?;
			Value::Integer(parsed)
		};

		self.cursor += 1;
		Ok(value)
	}

	fn table(&mut self) -> SettingsResult<Value> {
		if self.depth >= MAX_TABLE_DEPTH {
			return Err(self.error(format!("tables nested deeper than {MAX_TABLE_DEPTH} levels")));
		}
		self.expect(RawToken::BraceOpen, "`{`")?;
		self.depth += 1;

		let mut entries: Vec<(TableKey, Value)> = vec![];
		let mut next_position = 1;

		while self.peek() != Some(RawToken::BraceClose) {
			let key = match (self.peek(), self.peek_at(1)) {
				(Some(RawToken::BracketOpen), _) => {
					self.cursor += 1;
					let key = self.bracketed_key()?;
					self.expect(RawToken::BracketClose, "`]`")?;
					self.expect(RawToken::Assign, "`=`")?;
					key
				}
				(Some(RawToken::Ident), Some(RawToken::Assign)) => {
					let name = self.slice().to_string();
					self.cursor += 2;
					TableKey::Name(name)
				}
				_ => {
					let key = TableKey::Index(next_position);
					next_position += 1;
					key
				}
			};

			if let Some(value) = self.value()? {
				entries.push((key, value));
			}

			match self.peek() {
				Some(RawToken::Comma | RawToken::Semicolon) => self.cursor += 1,
				Some(RawToken::BraceClose) => {}
				_ => return Err(self.unexpected("`,` or `}`")),
			}
		}

		self.expect(RawToken::BraceClose, "`}`")?;
		self.depth -= 1;

		Ok(build_table(entries))
	}

	fn bracketed_key(&mut self) -> SettingsResult<TableKey> {
		match self.value()? {
			Some(Value::String(name)) => Ok(TableKey::Name(name)),
			Some(Value::Integer(index)) => Ok(TableKey::Index(index)),
			_ => Err(self.error("table keys must be strings or integers")),
		}
	}
}

/// Decide between a sequence and a mapping for a parsed table. Later
/// duplicates of a key win.
fn build_table(entries: Vec<(TableKey, Value)>) -> Value {
	let mut indices: Vec<i64> = entries
		.iter()
		.filter_map(|(key, _)| {
			match key {
				TableKey::Index(index) => Some(*index),
				TableKey::Name(_) => None,
			}
		})
		.collect();
	indices.sort_unstable();

	let is_sequence = !entries.is_empty()
		&& indices.len() == entries.len()
		&& indices.iter().copied().eq(1..=entries.len() as i64);

	if is_sequence {
		let mut items: Vec<(i64, Value)> = entries
			.into_iter()
			.filter_map(|(key, value)| {
				match key {
					TableKey::Index(index) => Some((index, value)),
					TableKey::Name(_) => None,
				}
			})
			.collect();
		items.sort_by_key(|(index, _)| *index);

		return Value::Sequence(items.into_iter().map(|(_, value)| value).collect());
	}

	Value::Mapping(
		entries
			.into_iter()
			.map(|(key, value)| {
				let key = match key {
					TableKey::Index(index) => index.to_string(),
					TableKey::Name(name) => name,
				};
				(key, value)
			})
			.collect(),
	)
}

/// Strip the quotes from a `"..."` or `'...'` literal and resolve its
/// backslash escapes.
pub(crate) fn unquote(slice: &str) -> Result<String, snailquote::UnescapeError> {
	let inner = &slice[1..slice.len() - 1];
	if !inner.contains('\\') {
		return Ok(inner.to_string());
	}

	if slice.starts_with('"') {
		return unescape(slice);
	}

	let mut quoted = String::with_capacity(slice.len() + 2);
	let mut escaped = false;
	quoted.push('"');
	for ch in inner.chars() {
		if ch == '"' && !escaped {
			quoted.push('\\');
		}
		escaped = ch == '\\' && !escaped;
		quoted.push(ch);
	}
	quoted.push('"');

	unescape(&quoted)
}

fn line_column(source: &str, offset: usize) -> (usize, usize) {
	let before = &source[..offset.min(source.len())];
	let line = before.matches('\n').count() + 1;
	let column = before
		.rfind('\n')
		.map_or(before.chars().count(), |newline| {
			before[newline + 1..].chars().count()
		}) + 1;

	(line, column)
}

/// Parse a table-literal document.
pub fn parse_table_literal(source: &str) -> SettingsResult<TableDocument> {
	TableParser::new(source).document()
}

/// Serialize `root` as `name = { ... }` with tab indentation.
pub fn serialize_table_literal(name: &str, root: &Mapping) -> SettingsResult<String> {
	let mut output = format!("{name} = ");
	write_mapping(&mut output, root, 0)?;
	output.push('\n');

	Ok(output)
}

fn write_value(output: &mut String, value: &Value, level: usize) -> SettingsResult<()> {
	match value {
		Value::String(string) => output.push_str(&quote(string)),
		Value::Integer(integer) => output.push_str(&integer.to_string()),
		Value::Float(float) => {
			if !float.is_finite() {
				return Err(SettingsError::Serialize(format!(
					"`{float}` has no table literal representation"
				)));
			}
			output.push_str(&format!("{float:?}"));
		}
		Value::Boolean(boolean) => output.push_str(if *boolean { "true" } else { "false" }),
		Value::Sequence(items) => {
			if items.is_empty() {
				output.push_str("{}");
				return Ok(());
			}

			output.push_str("{\n");
			for (index, item) in items.iter().enumerate() {
				push_indent(output, level + 1);
				output.push_str(&format!("[{}] = ", index + 1));
				write_value(output, item, level + 1)?;
				output.push_str(",\n");
			}
			push_indent(output, level);
			output.push('}');
		}
		Value::Mapping(map) => write_mapping(output, map, level)?,
	}

	Ok(())
}

fn write_mapping(output: &mut String, map: &Mapping, level: usize) -> SettingsResult<()> {
	if map.is_empty() {
		output.push_str("{}");
		return Ok(());
	}

	output.push_str("{\n");
	for (key, value) in map.iter() {
		push_indent(output, level + 1);
		output.push_str(&format!("[{}] = ", quote(key)));
		write_value(output, value, level + 1)?;
		output.push_str(",\n");
	}
	push_indent(output, level);
	output.push('}');

	Ok(())
}

fn push_indent(output: &mut String, level: usize) {
	for _ in 0..level {
		output.push('\t');
	}
}

fn quote(value: &str) -> String {
	let mut quoted = String::with_capacity(value.len() + 2);
	quoted.push('"');
	for ch in value.chars() {
		match ch {
			'"' => quoted.push_str("\\\""),
			'\\' => quoted.push_str("\\\\"),
			'\n' => quoted.push_str("\\n"),
			'\r' => quoted.push_str("\\r"),
			'\t' => quoted.push_str("\\t"),
			_ => quoted.push(ch),
		}
	}
	quoted.push('"');
	quoted
}
