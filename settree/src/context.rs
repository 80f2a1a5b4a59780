use crate::Mapping;
use crate::Value;

/// The fields visible to interpolation and expression evaluation.
///
/// Built from a mapping node. Any other node gives an empty context, so every
/// field lookup misses.
#[derive(Debug, Clone, Copy, Default)]
pub struct Context<'a> {
	fields: Option<&'a Mapping>,
}

impl<'a> Context<'a> {
	pub fn empty() -> Self {
		Self::default()
	}

	pub fn new(fields: &'a Mapping) -> Self {
		Self {
			fields: Some(fields),
		}
	}

	pub fn of(node: &'a Value) -> Self {
		Self {
			fields: node.as_mapping(),
		}
	}

	pub fn get(&self, name: &str) -> Option<&'a Value> {
		self.fields?.get(name)
	}

	pub fn is_empty(&self) -> bool {
		self.fields.is_none_or(Mapping::is_empty)
	}
}

impl<'a> From<&'a Mapping> for Context<'a> {
	fn from(fields: &'a Mapping) -> Self {
		Self::new(fields)
	}
}
