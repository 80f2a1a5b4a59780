use std::iter::FusedIterator;
use std::slice;

use tracing::trace;

use crate::Context;
use crate::PathSpec;
use crate::Segment;
use crate::Value;
use crate::expression::predicate_holds;

#[derive(Debug)]
enum Frame<'a> {
	/// A node reached at `depth`, not yet expanded.
	Node { node: &'a Value, depth: usize },
	/// Sequence elements still to visit. Matching elements are visited at
	/// `depth + 1`.
	Elements {
		elements: slice::Iter<'a, Value>,
		depth: usize,
		predicate: Option<&'a str>,
	},
}

/// Lazy depth-first iterator over every node matching a [`PathSpec`].
///
/// Results are yielded in document order. Keys that do not exist, wildcards
/// over non-sequences and predicates that are false or fail to evaluate all
/// silently prune their branch.
#[derive(Debug)]
pub struct Query<'a> {
	segments: &'a [Segment],
	stack: Vec<Frame<'a>>,
}

impl<'a> Query<'a> {
	pub fn new(tree: &'a Value, path: &'a PathSpec) -> Self {
		Self {
			segments: path.segments(),
			stack: vec![Frame::Node {
				node: tree,
				depth: 0,
			}],
		}
	}

	fn expand(&mut self, node: &'a Value, depth: usize) {
		let segments: &'a [Segment] = self.segments;
		match &segments[depth] {
			Segment::Literal(key) => {
				match node {
					Value::Mapping(map) => {
						if let Some(child) = map.get(key) {
							trace!(depth, key = key.as_str(), "key found");
							self.stack.push(Frame::Node {
								node: child,
								depth: depth + 1,
							});
						} else {
							trace!(depth, key = key.as_str(), "key missing, pruning");
						}
					}
					_ => trace!(depth, key = key.as_str(), "not a mapping, pruning"),
				}
			}
			Segment::Wildcard => {
				match node {
					Value::Sequence(items) => {
						trace!(depth, count = items.len(), "iterating over elements");
						self.stack.push(Frame::Elements {
							elements: items.iter(),
							depth,
							predicate: None,
						});
					}
					_ => trace!(depth, "wildcard over a {}, pruning", node.type_name()),
				}
			}
			Segment::Predicate(expression) => {
				match node {
					Value::Sequence(items) => {
						trace!(
							depth,
							count = items.len(),
							"searching pattern {expression} on elements"
						);
						self.stack.push(Frame::Elements {
							elements: items.iter(),
							depth,
							predicate: Some(expression.as_str()),
						});
					}
					_ => {
						if predicate_holds(expression, &Context::of(node)) {
							trace!(depth, "{expression} matches");
							self.stack.push(Frame::Node {
								node,
								depth: depth + 1,
							});
						} else {
							trace!(depth, "{expression} does not match, pruning");
						}
					}
				}
			}
		}
	}
}

impl<'a> Iterator for Query<'a> {
	type Item = &'a Value;

	fn next(&mut self) -> Option<Self::Item> {
		while let Some(frame) = self.stack.last_mut() {
			match frame {
				Frame::Elements {
					elements,
					depth,
					predicate,
				} => {
					let depth = *depth;
					let predicate = *predicate;
					let Some(element) = elements.next() else {
						self.stack.pop();
						continue;
					};

					if let Some(expression) = predicate {
						if !predicate_holds(expression, &Context::of(element)) {
							continue;
						}
						trace!(depth, "element matches {expression}");
					}

					self.stack.push(Frame::Node {
						node: element,
						depth: depth + 1,
					});
				}
				Frame::Node { node, depth } => {
					let node: &'a Value = *node;
					let depth = *depth;
					self.stack.pop();

					if depth == self.segments.len() {
						return Some(node);
					}

					self.expand(node, depth);
				}
			}
		}

		None
	}
}

impl FusedIterator for Query<'_> {}

/// Yield every node of `tree` that `path` leads to.
pub fn query<'a>(tree: &'a Value, path: &'a PathSpec) -> Query<'a> {
	Query::new(tree, path)
}

impl Value {
	/// Run a path query rooted at this node.
	pub fn query<'a>(&'a self, path: &'a PathSpec) -> Query<'a> {
		Query::new(self, path)
	}
}
