use std::fmt;
use std::fmt::Display;

use float_cmp::approx_eq;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde::de::MapAccess;
use serde::de::SeqAccess;
use serde::de::Visitor;

/// A dynamic settings node.
///
/// Every settings file is parsed into a tree of `Value`s whose root is always
/// a [`Value::Mapping`].
#[derive(Debug, Clone)]
pub enum Value {
	/// A string scalar.
	String(String),
	/// An integer scalar.
	Integer(i64),
	/// A decimal scalar.
	Float(f64),
	/// A boolean scalar.
	Boolean(bool),
	/// An ordered list of nodes.
	Sequence(Vec<Value>),
	/// An ordered collection of uniquely keyed nodes.
	Mapping(Mapping),
}

impl PartialEq for Value {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Value::String(value), Value::String(other_value)) => value == other_value,
			(Value::Integer(value), Value::Integer(other_value)) => value == other_value,
			(Value::Float(value), Value::Float(other_value)) => {
				approx_eq!(f64, *value, *other_value, ulps = 2)
			}
			(Value::Boolean(value), Value::Boolean(other_value)) => value == other_value,
			(Value::Sequence(items), Value::Sequence(other_items)) => items == other_items,
			(Value::Mapping(map), Value::Mapping(other_map)) => map == other_map,
			_ => false,
		}
	}
}

impl Value {
	/// The name of this node's variant, used in diagnostics.
	pub fn type_name(&self) -> &'static str {
		match self {
			Value::String(_) => "string",
			Value::Integer(_) => "integer",
			Value::Float(_) => "float",
			Value::Boolean(_) => "boolean",
			Value::Sequence(_) => "sequence",
			Value::Mapping(_) => "mapping",
		}
	}

	/// Truthiness as used by predicate segments: `false`, zero, the empty
	/// string and empty collections are falsy.
	pub fn is_truthy(&self) -> bool {
		match self {
			Value::String(value) => !value.is_empty(),
			Value::Integer(value) => *value != 0,
			Value::Float(value) => *value != 0.0,
			Value::Boolean(value) => *value,
			Value::Sequence(items) => !items.is_empty(),
			Value::Mapping(map) => !map.is_empty(),
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Value::String(value) => Some(value),
			_ => None,
		}
	}

	pub fn as_i64(&self) -> Option<i64> {
		match self {
			Value::Integer(value) => Some(*value),
			_ => None,
		}
	}

	/// Numeric view of integers and floats.
	pub fn as_f64(&self) -> Option<f64> {
		match self {
			Value::Integer(value) => Some(*value as f64),
			Value::Float(value) => Some(*value),
			_ => None,
		}
	}

	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Value::Boolean(value) => Some(*value),
			_ => None,
		}
	}

	pub fn as_sequence(&self) -> Option<&[Value]> {
		match self {
			Value::Sequence(items) => Some(items),
			_ => None,
		}
	}

	pub fn as_sequence_mut(&mut self) -> Option<&mut Vec<Value>> {
		match self {
			Value::Sequence(items) => Some(items),
			_ => None,
		}
	}

	pub fn as_mapping(&self) -> Option<&Mapping> {
		match self {
			Value::Mapping(map) => Some(map),
			_ => None,
		}
	}

	pub fn as_mapping_mut(&mut self) -> Option<&mut Mapping> {
		match self {
			Value::Mapping(map) => Some(map),
			_ => None,
		}
	}

	/// Returns `true` for strings, numbers and booleans.
	pub fn is_scalar(&self) -> bool {
		!matches!(self, Value::Sequence(_) | Value::Mapping(_))
	}
}

/// Renders a node the way field interpolation substitutes it: scalars plainly,
/// sequences one element per line, mappings as JSON.
impl Display for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Value::String(value) => f.write_str(value),
			Value::Integer(value) => write!(f, "{value}"),
			Value::Float(value) => write!(f, "{value:?}"),
			Value::Boolean(value) => write!(f, "{value}"),
			Value::Sequence(items) => {
				for (index, item) in items.iter().enumerate() {
					if index > 0 {
						writeln!(f)?;
					}
					write!(f, "{item}")?;
				}
				Ok(())
			}
			Value::Mapping(map) => {
				let json = serde_json::to_string(map).map_err(|_| fmt::Error)?;
				f.write_str(&json)
			}
		}
	}
}

impl From<&str> for Value {
	fn from(value: &str) -> Self {
		Value::String(value.to_string())
	}
}

impl From<String> for Value {
	fn from(value: String) -> Self {
		Value::String(value)
	}
}

impl From<i64> for Value {
	fn from(value: i64) -> Self {
		Value::Integer(value)
	}
}

impl From<i32> for Value {
	fn from(value: i32) -> Self {
		Value::Integer(i64::from(value))
	}
}

impl From<f64> for Value {
	fn from(value: f64) -> Self {
		Value::Float(value)
	}
}

impl From<bool> for Value {
	fn from(value: bool) -> Self {
		Value::Boolean(value)
	}
}

impl From<Mapping> for Value {
	fn from(value: Mapping) -> Self {
		Value::Mapping(value)
	}
}

impl<T: Into<Value>> From<Vec<T>> for Value {
	fn from(value: Vec<T>) -> Self {
		Value::Sequence(value.into_iter().map(Into::into).collect())
	}
}

/// An insertion-ordered, string-keyed map of [`Value`]s.
///
/// Assigning an existing key replaces the value in place, so the key keeps its
/// original position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mapping {
	entries: Vec<(String, Value)>,
}

impl Mapping {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	fn position(&self, key: &str) -> Option<usize> {
		self.entries.iter().position(|(name, _)| name == key)
	}

	pub fn get(&self, key: &str) -> Option<&Value> {
		self.position(key).map(|index| &self.entries[index].1)
	}

	pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
		self.position(key).map(|index| &mut self.entries[index].1)
	}

	pub fn contains_key(&self, key: &str) -> bool {
		self.position(key).is_some()
	}

	/// Insert a value, returning the value previously stored under `key`.
	pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
		let key = key.into();
		let value = value.into();

		match self.position(&key) {
			Some(index) => Some(std::mem::replace(&mut self.entries[index].1, value)),
			None => {
				self.entries.push((key, value));
				None
			}
		}
	}

	/// Remove `key`, preserving the order of the remaining entries.
	pub fn remove(&mut self, key: &str) -> Option<Value> {
		self.position(key)
			.map(|index| self.entries.remove(index).1)
	}

	pub fn clear(&mut self) {
		self.entries.clear();
	}

	pub fn keys(&self) -> impl Iterator<Item = &str> {
		self.entries.iter().map(|(key, _)| key.as_str())
	}

	pub fn values(&self) -> impl Iterator<Item = &Value> {
		self.entries.iter().map(|(_, value)| value)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
		self.entries.iter().map(|(key, value)| (key.as_str(), value))
	}

	pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Value)> {
		self.entries
			.iter_mut()
			.map(|(key, value)| (key.as_str(), value))
	}
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Mapping {
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		let mut map = Mapping::new();
		map.extend(iter);
		map
	}
}

impl<K: Into<String>, V: Into<Value>> Extend<(K, V)> for Mapping {
	fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
		for (key, value) in iter {
			self.insert(key, value);
		}
	}
}

impl IntoIterator for Mapping {
	type IntoIter = std::vec::IntoIter<(String, Value)>;
	type Item = (String, Value);

	fn into_iter(self) -> Self::IntoIter {
		self.entries.into_iter()
	}
}

impl Serialize for Value {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		match self {
			Value::String(value) => serializer.serialize_str(value),
			Value::Integer(value) => serializer.serialize_i64(*value),
			Value::Float(value) => serializer.serialize_f64(*value),
			Value::Boolean(value) => serializer.serialize_bool(*value),
			Value::Sequence(items) => serializer.collect_seq(items),
			Value::Mapping(map) => map.serialize(serializer),
		}
	}
}

impl Serialize for Mapping {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_map(self.iter())
	}
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
	type Value = Value;

	fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
		formatter.write_str("a string, number, boolean, array or object")
	}

	fn visit_bool<E: serde::de::Error>(self, value: bool) -> Result<Value, E> {
		Ok(Value::Boolean(value))
	}

	fn visit_i64<E: serde::de::Error>(self, value: i64) -> Result<Value, E> {
		Ok(Value::Integer(value))
	}

	fn visit_u64<E: serde::de::Error>(self, value: u64) -> Result<Value, E> {
		Ok(i64::try_from(value).map_or(Value::Float(value as f64), Value::Integer))
	}

	fn visit_f64<E: serde::de::Error>(self, value: f64) -> Result<Value, E> {
		Ok(Value::Float(value))
	}

	fn visit_str<E: serde::de::Error>(self, value: &str) -> Result<Value, E> {
		Ok(Value::String(value.to_string()))
	}

	fn visit_string<E: serde::de::Error>(self, value: String) -> Result<Value, E> {
		Ok(Value::String(value))
	}

	fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
		let mut items = Vec::new();

		// `null` elements are dropped, mirroring `nil` in table literals.
		while let Some(item) = seq.next_element::<Option<Value>>()? {
			if let Some(item) = item {
				items.push(item);
			}
		}

		Ok(Value::Sequence(items))
	}

	fn visit_map<A: MapAccess<'de>>(self, access: A) -> Result<Value, A::Error> {
		MappingVisitor.visit_map(access).map(Value::Mapping)
	}
}

struct MappingVisitor;

impl<'de> Visitor<'de> for MappingVisitor {
	type Value = Mapping;

	fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
		formatter.write_str("an object")
	}

	fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Mapping, A::Error> {
		let mut map = Mapping::new();

		while let Some((key, value)) = access.next_entry::<String, Option<Value>>()? {
			if let Some(value) = value {
				map.insert(key, value);
			}
		}

		Ok(map)
	}
}

impl<'de> Deserialize<'de> for Value {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		deserializer.deserialize_any(ValueVisitor)
	}
}

impl<'de> Deserialize<'de> for Mapping {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		deserializer.deserialize_map(MappingVisitor)
	}
}
