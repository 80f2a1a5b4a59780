use std::fmt;
use std::fmt::Display;
use std::str::FromStr;

use derive_more::Deref;

use crate::EXPRESSION_PREFIX;
use crate::SettingsError;
use crate::SettingsResult;

/// One step of a [`PathSpec`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
	/// Descend into the mapping entry with this key.
	Literal(String),
	/// `*`: descend into every element of a sequence.
	Wildcard,
	/// `$expression`: descend only where the expression holds. Stores the text
	/// after the `$`.
	Predicate(String),
}

impl Segment {
	/// Classify a single segment by its prefix.
	pub fn parse(text: &str) -> SettingsResult<Self> {
		if text.is_empty() {
			return Err(SettingsError::InvalidPath("empty path segment".into()));
		}

		if text == "*" {
			return Ok(Segment::Wildcard);
		}

		if let Some(expression) = text.strip_prefix(EXPRESSION_PREFIX) {
			if expression.trim().is_empty() {
				return Err(SettingsError::InvalidPath(format!(
					"empty predicate expression after `{EXPRESSION_PREFIX}`"
				)));
			}
			return Ok(Segment::Predicate(expression.to_string()));
		}

		Ok(Segment::Literal(text.to_string()))
	}
}

impl Display for Segment {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Segment::Literal(key) => f.write_str(key),
			Segment::Wildcard => f.write_str("*"),
			Segment::Predicate(expression) => write!(f, "{EXPRESSION_PREFIX}{expression}"),
		}
	}
}

/// A parsed, immutable path such as `missions/*/name` or
/// `players/$ucid == 'abc'/name`.
///
/// Segments are separated by `/`, so predicate expressions cannot contain a
/// slash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deref)]
pub struct PathSpec(Vec<Segment>);

impl PathSpec {
	/// Parse a slash-delimited path. Leading and trailing slashes are ignored.
	pub fn parse(input: &str) -> SettingsResult<Self> {
		let trimmed = input.trim().trim_matches('/');
		if trimmed.is_empty() {
			return Err(SettingsError::InvalidPath("empty path".into()));
		}

		let segments = trimmed
			.split('/')
			.map(Segment::parse)
			.collect::<SettingsResult<Vec<_>>>()
			.map_err(|e| {
				match e {
					SettingsError::InvalidPath(reason) => {
						SettingsError::InvalidPath(format!("{reason} in `{input}`"))
					}
					other => other,
				}
			})?;

		Ok(Self(segments))
	}

	/// Build a path from already classified segments.
	pub fn from_segments(segments: impl IntoIterator<Item = Segment>) -> Self {
		Self(segments.into_iter().collect())
	}

	pub fn segments(&self) -> &[Segment] {
		&self.0
	}

	/// The number of segments; no query result lies deeper than this.
	pub fn depth(&self) -> usize {
		self.0.len()
	}
}

impl FromStr for PathSpec {
	type Err = SettingsError;

	fn from_str(input: &str) -> Result<Self, Self::Err> {
		Self::parse(input)
	}
}

impl Display for PathSpec {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for (index, segment) in self.0.iter().enumerate() {
			if index > 0 {
				f.write_str("/")?;
			}
			write!(f, "{segment}")?;
		}
		Ok(())
	}
}
