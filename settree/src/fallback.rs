//! Line-based recovery parser for table-literal files.
//!
//! Only used when [`parse_table_literal`](crate::parse_table_literal) rejects a
//! file. The first line (the assignment header) is skipped and every other
//! line is matched against two statement shapes:
//!
//! ```lua
//! cfg["name"] = "Training server"
//! cfg["missionList"] = {}
//! cfg["missionList"][1] = "Caucasus.miz"
//! cfg["advanced"]["allow_ownship_export"] = true
//! ```
//!
//! Lines that match neither shape are ignored.

use std::collections::BTreeMap;
use std::collections::HashMap;

use tracing::debug;

use crate::Mapping;
use crate::SettingsError;
use crate::SettingsResult;
use crate::TableDocument;
use crate::Value;

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Statement<'a> {
	/// `root["key"] = value`
	Assign { key: &'a str, value: &'a str },
	/// `root["key"][member] = value`
	AssignMember {
		key: &'a str,
		member: &'a str,
		value: &'a str,
	},
}

impl<'a> Statement<'a> {
	pub(crate) fn parse(line: &'a str) -> Option<Self> {
		let line = line.trim();
		let bracket = line.find('[')?;
		if !is_identifier(&line[..bracket]) {
			return None;
		}

		let rest = line[bracket..].strip_prefix("[\"")?;
		let end = rest.find("\"]")?;
		let key = &rest[..end];
		let rest = &rest[end + 2..];

		if let Some(rest) = rest.strip_prefix('[') {
			let end = if rest.starts_with('"') {
				rest[1..].find("\"]").map(|end| end + 2)?
			} else {
				rest.find(']')?
			};
			let member = &rest[..end];
			let value = assigned_value(&rest[end + 1..])?;

			return Some(Statement::AssignMember { key, member, value });
		}

		let value = assigned_value(rest)?;
		Some(Statement::Assign { key, value })
	}
}

fn assigned_value(rest: &str) -> Option<&str> {
	let value = rest.trim_start().strip_prefix('=')?.trim();
	(!value.is_empty()).then_some(value)
}

fn is_identifier(text: &str) -> bool {
	let mut chars = text.chars();
	chars
		.next()
		.is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
		&& chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

fn header_name(line: &str) -> Option<String> {
	let (name, _) = line.split_once('=')?;
	let name = name.trim();
	is_identifier(name).then(|| name.to_string())
}

fn is_position(member: &str) -> bool {
	!member.is_empty() && member.bytes().all(|byte| byte.is_ascii_digit())
}

/// Classify a scalar literal: `"text"`, `true`, `false`, `{}` or an integer.
pub fn parse_literal(text: &str) -> SettingsResult<Value> {
	let text = text.trim();

	if let Some(quoted) = text.strip_prefix('"') {
		// An unterminated string still loses its last character.
		let inner = match quoted.strip_suffix('"') {
			Some(inner) => inner,
			None => {
				let mut chars = quoted.chars();
				if chars.next_back().is_none() {
					return Err(SettingsError::InvalidLiteral(text.to_string()));
				}
				chars.as_str()
			}
		};
		return Ok(Value::String(inner.to_string()));
	}

	match text {
		"true" => Ok(Value::Boolean(true)),
		"false" => Ok(Value::Boolean(false)),
		"{}" => Ok(Value::Mapping(Mapping::new())),
		_ => {
			text.parse::<i64>()
				.map(Value::Integer)
				.map_err(|_| SettingsError::InvalidLiteral(text.to_string()))
		}
	}
}

/// Recover a settings tree from straight-line assignment statements.
///
/// Top-level keys listed in `list_keys` start out as sequences when assigned
/// `{}`. Numeric members are 1-based sequence positions; they are collected
/// first and materialized in position order, so the resulting sequence does
/// not depend on the order of the lines.
///
/// An empty `root` in the result means nothing could be recovered.
pub fn parse_fallback(source: &str, list_keys: &[String]) -> SettingsResult<TableDocument> {
	let mut lines = source.lines();
	let name = lines.next().and_then(header_name);
	let mut root = Mapping::new();
	let mut positions: HashMap<String, BTreeMap<u64, Value>> = HashMap::new();

	for line in lines {
		let Some(statement) = Statement::parse(line) else {
			continue;
		};

		match statement {
			Statement::Assign { key, value } => {
				let value = if value == "{}" && list_keys.iter().any(|list_key| list_key == key) {
					Value::Sequence(vec![])
				} else {
					parse_literal(value)?
				};

				positions.remove(key);
				root.insert(key, value);
			}
			Statement::AssignMember { key, member, value } => {
				let value = parse_literal(value)?;
				let Some(target) = root.get_mut(key) else {
					debug!("skipping assignment to undeclared key `{key}`");
					continue;
				};

				if is_position(member) {
					let position: u64 = member
						.parse()
						.map_err(|_| SettingsError::InvalidLiteral(member.to_string()))?;

					// `{}` is ambiguous, the first position decides it was a list.
					if matches!(target, Value::Mapping(map) if map.is_empty()) {
						*target = Value::Sequence(vec![]);
					}

					match target {
						Value::Sequence(_) => {
							let replaced = positions
								.entry(key.to_string())
								.or_default()
								.insert(position, value);
							if replaced.is_some() {
								debug!("position {position} of `{key}` assigned twice, keeping the last value");
							}
						}
						Value::Mapping(map) => {
							map.insert(member, value);
						}
						_ => debug!("skipping positional assignment to scalar key `{key}`"),
					}
				} else {
					let member = match parse_literal(member)? {
						Value::String(member) => member,
						other => other.to_string(),
					};

					match target {
						Value::Mapping(map) => {
							map.insert(member, value);
						}
						_ => debug!("skipping member assignment to non-mapping key `{key}`"),
					}
				}
			}
		}
	}

	for (key, items) in positions {
		if let Some(Value::Sequence(sequence)) = root.get_mut(&key) {
			sequence.extend(items.into_values());
		}
	}

	Ok(TableDocument { name, root })
}
