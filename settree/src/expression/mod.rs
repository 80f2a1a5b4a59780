//! A small, bounded expression language for predicate segments and
//! `$`-prefixed settings values.
//!
//! ```text
//! or         := and (("or" | "||") and)*
//! and        := not (("and" | "&&") not)*
//! not        := ("not" | "!") not | comparison
//! comparison := additive ((== | != | < | <= | > | >= | in | not in) additive)*
//! additive   := term (("+" | "-") term)*
//! term       := unary (("*" | "/" | "//" | "%") unary)*
//! unary      := "-" unary | primary
//! primary    := integer | float | string | true | false | identifier
//!             | "(" or ")" | "[" (or ("," or)*)? "]"
//! ```
//!
//! Identifiers are looked up in the [`Context`]. Integer arithmetic is checked,
//! `/` always produces a float, `//` and `%` round towards negative infinity.

use std::fmt;
use std::fmt::Display;
use std::str::FromStr;

use tracing::trace;

use crate::Context;
use crate::SettingsError;
use crate::SettingsResult;
use crate::Value;
use crate::interpolate;

mod eval;
mod lexer;
pub(crate) mod parser;

use self::eval::Evaluator;
use self::parser::Expr;

/// Strings starting with this character are evaluated as expressions.
pub const EXPRESSION_PREFIX: char = '$';

/// A parsed expression, ready to be evaluated against any number of contexts.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
	source: String,
	root: Expr,
}

impl Expression {
	pub fn parse(source: &str) -> SettingsResult<Self> {
		let root = parser::parse(source)?;

		Ok(Self {
			source: source.to_string(),
			root,
		})
	}

	pub fn source(&self) -> &str {
		&self.source
	}

	/// Evaluate against the fields of `context`. Referencing a field the
	/// context does not have is an error.
	pub fn evaluate(&self, context: &Context<'_>) -> SettingsResult<Value> {
		let evaluator = Evaluator {
			context,
			source: &self.source,
		};

		evaluator.eval(&self.root)
	}
}

impl FromStr for Expression {
	type Err = SettingsError;

	fn from_str(source: &str) -> Result<Self, Self::Err> {
		Self::parse(source)
	}
}

impl Display for Expression {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.source)
	}
}

/// Resolve a settings value.
///
/// Anything but a string starting with [`EXPRESSION_PREFIX`] is returned
/// unchanged. For `$`-strings the prefix is removed, `{field}` references are
/// interpolated from `context` and the result is evaluated.
///
/// ```rust
/// use settree::Context;
/// use settree::Mapping;
/// use settree::Value;
/// use settree::evaluate;
///
/// let fields: Mapping = [("coalition", "blue"), ("side", "blue")].into_iter().collect();
/// let context = Context::new(&fields);
///
/// let result = evaluate(&Value::from("$coalition == side"), &context).unwrap();
/// assert_eq!(result, Value::Boolean(true));
///
/// let literal = evaluate(&Value::from("coalition"), &context).unwrap();
/// assert_eq!(literal, Value::from("coalition"));
/// ```
pub fn evaluate(value: &Value, context: &Context<'_>) -> SettingsResult<Value> {
	let Some(source) = value
		.as_str()
		.and_then(|text| text.strip_prefix(EXPRESSION_PREFIX))
	else {
		return Ok(value.clone());
	};

	let source = interpolate(source, context, None);
	trace!("evaluating `{source}`");

	Expression::parse(&source)?.evaluate(context)
}

/// Whether a predicate segment holds for `context`. Failures count as a miss.
pub(crate) fn predicate_holds(expression: &str, context: &Context<'_>) -> bool {
	let source = interpolate(expression, context, None);

	match Expression::parse(&source).and_then(|parsed| parsed.evaluate(context)) {
		Ok(value) => value.is_truthy(),
		Err(e) => {
			trace!("predicate `{expression}` failed: {e}");
			false
		}
	}
}
