use std::fmt;
use std::fmt::Display;
use std::path::Path;

use tracing::debug;
use tracing::error;

use crate::Mapping;
use crate::SettingsError;
use crate::SettingsResult;
use crate::TableDocument;
use crate::Value;
use crate::parse_fallback;
use crate::parse_table_literal;
use crate::serialize_table_literal;

/// The serialization form of a settings file, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Format {
	/// `name = { ... }` table literals (`.lua`).
	TableLiteral,
	/// JSON (`.json`).
	Json,
}

impl Format {
	/// Detect the format from the extension of `path`, ignoring case.
	pub fn from_path(path: &Path) -> SettingsResult<Self> {
		let extension = path
			.extension()
			.and_then(|e| e.to_str())
			.unwrap_or("")
			.to_ascii_lowercase();

		Self::from_extension(&extension)
	}

	pub fn from_extension(extension: &str) -> SettingsResult<Self> {
		match extension {
			"lua" => Ok(Self::TableLiteral),
			"json" => Ok(Self::Json),
			other => Err(SettingsError::UnsupportedFormat(other.to_string())),
		}
	}

	pub fn extension(self) -> &'static str {
		match self {
			Self::TableLiteral => "lua",
			Self::Json => "json",
		}
	}
}

impl Display for Format {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.extension())
	}
}

/// Parse settings file content.
///
/// Table literals that the primary codec rejects are handed to the fallback
/// parser. When that fails as well, or recovers nothing, the primary codec's
/// error is reported.
pub fn decode(
	content: &str,
	format: Format,
	list_keys: &[String],
	path_display: &str,
) -> SettingsResult<TableDocument> {
	match format {
		Format::TableLiteral => {
			let mut document = match parse_table_literal(content) {
				Ok(document) => document,
				Err(primary) => {
					debug!("exception while reading {path_display}: {primary}");
					recover(content, list_keys, path_display, &primary)?
				}
			};

			for key in list_keys {
				if let Some(value) = document.root.get_mut(key) {
					if matches!(value, Value::Mapping(map) if map.is_empty()) {
						*value = Value::Sequence(vec![]);
					}
				}
			}

			Ok(document)
		}
		Format::Json => {
			let root: Mapping = serde_json::from_str(content).map_err(|e| {
				error!("error while parsing {path_display}");
				SettingsError::Parse {
					path: path_display.to_string(),
					reason: e.to_string(),
				}
			})?;

			Ok(TableDocument { name: None, root })
		}
	}
}

fn recover(
	content: &str,
	list_keys: &[String],
	path_display: &str,
	primary: &SettingsError,
) -> SettingsResult<TableDocument> {
	let failure = || {
		error!("error while parsing {path_display}");
		SettingsError::Parse {
			path: path_display.to_string(),
			reason: primary.to_string(),
		}
	};

	match parse_fallback(content, list_keys) {
		Ok(document) if !document.root.is_empty() => {
			debug!(
				"recovered {} top-level keys from {path_display} with the fallback parser",
				document.root.len()
			);
			Ok(document)
		}
		Ok(_) => Err(failure()),
		Err(fallback) => {
			debug!("fallback parser gave up on {path_display}: {fallback}");
			Err(failure())
		}
	}
}

/// Serialize a settings tree. `name` is only used by table literals.
pub fn encode(root: &Mapping, format: Format, name: &str) -> SettingsResult<String> {
	match format {
		Format::TableLiteral => serialize_table_literal(name, root),
		Format::Json => {
			let mut content = serde_json::to_string_pretty(root)?;
			content.push('\n');
			Ok(content)
		}
	}
}
