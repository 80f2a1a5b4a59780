use std::cmp::Ordering;

use float_cmp::approx_eq;

use super::parser::BinaryOperator;
use super::parser::CompareOperator;
use super::parser::Expr;
use crate::Context;
use crate::SettingsError;
use crate::SettingsResult;
use crate::Value;

/// Longest string, in bytes, that repetition may produce.
pub(crate) const MAX_REPEAT_LEN: usize = 1 << 20;

/// A numeric view of a value. Booleans count as `0` and `1`.
#[derive(Debug, Clone, Copy)]
enum Number {
	Integer(i64),
	Float(f64),
}

impl Number {
	fn of(value: &Value) -> Option<Self> {
		match value {
			Value::Integer(integer) => Some(Number::Integer(*integer)),
			Value::Float(float) => Some(Number::Float(*float)),
			Value::Boolean(boolean) => Some(Number::Integer(i64::from(*boolean))),
			_ => None,
		}
	}

	fn as_f64(self) -> f64 {
		match self {
			Number::Integer(integer) => integer as f64,
			Number::Float(float) => float,
		}
	}
}

/// Tree-walking evaluator. Borrows the source text for error messages.
pub(super) struct Evaluator<'c, 's> {
	pub(super) context: &'c Context<'c>,
	pub(super) source: &'s str,
}

impl Evaluator<'_, '_> {
	fn error(&self, reason: impl Into<String>) -> SettingsError {
		SettingsError::expression(self.source, reason)
	}

	pub(super) fn eval(&self, expr: &Expr) -> SettingsResult<Value> {
		match expr {
			Expr::Literal(value) => Ok(value.clone()),
			Expr::Field(name) => {
				self.context
					.get(name)
					.cloned()
					.ok_or_else(|| self.error(format!("field `{name}` is not defined")))
			}
			Expr::List(items) => {
				items
					.iter()
					.map(|item| self.eval(item))
					.collect::<SettingsResult<Vec<_>>>()
					.map(Value::Sequence)
			}
			Expr::Not(operand) => Ok(Value::Boolean(!self.eval(operand)?.is_truthy())),
			Expr::Negate(operand) => self.negate(&self.eval(operand)?),
			Expr::And(left, right) => {
				Ok(Value::Boolean(
					self.eval(left)?.is_truthy() && self.eval(right)?.is_truthy(),
				))
			}
			Expr::Or(left, right) => {
				Ok(Value::Boolean(
					self.eval(left)?.is_truthy() || self.eval(right)?.is_truthy(),
				))
			}
			Expr::Binary {
				operator,
				left,
				right,
			} => self.binary(*operator, &self.eval(left)?, &self.eval(right)?),
			Expr::Compare { first, rest } => {
				let mut left = self.eval(first)?;

				for (operator, right) in rest {
					let right = self.eval(right)?;
					if !self.compare(*operator, &left, &right)? {
						return Ok(Value::Boolean(false));
					}
					left = right;
				}

				Ok(Value::Boolean(true))
			}
		}
	}

	fn negate(&self, value: &Value) -> SettingsResult<Value> {
		match Number::of(value) {
			Some(Number::Integer(integer)) => {
				integer
					.checked_neg()
					.map(Value::Integer)
					.ok_or_else(|| self.error("integer overflow"))
			}
			Some(Number::Float(float)) => Ok(Value::Float(-float)),
			None => Err(self.error(format!("cannot negate a {}", value.type_name()))),
		}
	}

	fn binary(&self, operator: BinaryOperator, left: &Value, right: &Value) -> SettingsResult<Value> {
		match (operator, left, right) {
			(BinaryOperator::Add, Value::String(left), Value::String(right)) => {
				Ok(Value::String(format!("{left}{right}")))
			}
			(BinaryOperator::Add, Value::Sequence(left), Value::Sequence(right)) => {
				Ok(Value::Sequence(left.iter().chain(right).cloned().collect()))
			}
			(BinaryOperator::Multiply, Value::String(text), count)
			| (BinaryOperator::Multiply, count, Value::String(text)) => {
				let count = self.repeat_count(count)?;
				if text.len().checked_mul(count).is_none_or(|len| len > MAX_REPEAT_LEN) {
					return Err(self.error(format!(
						"repeated string would exceed {MAX_REPEAT_LEN} bytes"
					)));
				}
				Ok(Value::String(text.repeat(count)))
			}
			_ => {
				let (Some(left_number), Some(right_number)) = (Number::of(left), Number::of(right))
				else {
					return Err(self.error(format!(
						"unsupported operand types for `{}`: {} and {}",
						operator.symbol(),
						left.type_name(),
						right.type_name()
					)));
				};

				self.arithmetic(operator, left_number, right_number)
			}
		}
	}

	fn repeat_count(&self, count: &Value) -> SettingsResult<usize> {
		let Some(Number::Integer(count)) = Number::of(count) else {
			return Err(self.error(format!(
				"a string cannot be repeated by a {}",
				count.type_name()
			)));
		};

		Ok(usize::try_from(count).unwrap_or(0))
	}

	fn arithmetic(&self, operator: BinaryOperator, left: Number, right: Number) -> SettingsResult<Value> {
		let overflow = || self.error("integer overflow");
		let zero = || self.error("division by zero");

		if operator == BinaryOperator::Divide {
			let divisor = right.as_f64();
			if divisor == 0.0 {
				return Err(zero());
			}
			return Ok(Value::Float(left.as_f64() / divisor));
		}

		match (left, right) {
			(Number::Integer(left), Number::Integer(right)) => {
				let value = match operator {
					BinaryOperator::Add => left.checked_add(right).ok_or_else(overflow)?,
					BinaryOperator::Subtract => left.checked_sub(right).ok_or_else(overflow)?,
					BinaryOperator::Multiply => left.checked_mul(right).ok_or_else(overflow)?,
					BinaryOperator::FloorDivide => {
						if right == 0 {
							return Err(zero());
						}
						let quotient = left.checked_div(right).ok_or_else(overflow)?;
						if left % right != 0 && ((left < 0) != (right < 0)) {
							quotient - 1
						} else {
							quotient
						}
					}
					BinaryOperator::Remainder => {
						if right == 0 {
							return Err(zero());
						}
						let remainder = left.checked_rem(right).unwrap_or(0);
						if remainder != 0 && ((remainder < 0) != (right < 0)) {
							remainder + right
						} else {
							remainder
						}
					}
					BinaryOperator::Divide => unreachable!("true division is handled above"),
				};

				Ok(Value::Integer(value))
			}
			(left, right) => {
				let (left, right) = (left.as_f64(), right.as_f64());
				let value = match operator {
					BinaryOperator::Add => left + right,
					BinaryOperator::Subtract => left - right,
					BinaryOperator::Multiply => left * right,
					BinaryOperator::FloorDivide => {
						if right == 0.0 {
							return Err(zero());
						}
						(left / right).floor()
					}
					BinaryOperator::Remainder => {
						if right == 0.0 {
							return Err(zero());
						}
						let remainder = left % right;
						if remainder != 0.0 && ((remainder < 0.0) != (right < 0.0)) {
							remainder + right
						} else {
							remainder
						}
					}
					BinaryOperator::Divide => unreachable!("true division is handled above"),
				};

				Ok(Value::Float(value))
			}
		}
	}

	fn compare(&self, operator: CompareOperator, left: &Value, right: &Value) -> SettingsResult<bool> {
		let ordering = |left: &Value, right: &Value| {
			order(left, right).ok_or_else(|| {
				self.error(format!(
					"`{}` is not supported between a {} and a {}",
					operator.symbol(),
					left.type_name(),
					right.type_name()
				))
			})
		};

		match operator {
			CompareOperator::Equal => Ok(loosely_equal(left, right)),
			CompareOperator::NotEqual => Ok(!loosely_equal(left, right)),
			CompareOperator::Less => Ok(ordering(left, right)? == Ordering::Less),
			CompareOperator::LessEqual => Ok(ordering(left, right)? != Ordering::Greater),
			CompareOperator::Greater => Ok(ordering(left, right)? == Ordering::Greater),
			CompareOperator::GreaterEqual => Ok(ordering(left, right)? != Ordering::Less),
			CompareOperator::In => self.contains(right, left),
			CompareOperator::NotIn => self.contains(right, left).map(|found| !found),
		}
	}

	/// Membership: substrings of strings, elements of sequences, keys of
	/// mappings.
	fn contains(&self, container: &Value, item: &Value) -> SettingsResult<bool> {
		match (container, item) {
			(Value::String(haystack), Value::String(needle)) => Ok(haystack.contains(needle.as_str())),
			(Value::String(_), _) => {
				Err(self.error(format!(
					"`in <string>` requires a string, found a {}",
					item.type_name()
				)))
			}
			(Value::Sequence(items), _) => Ok(items.iter().any(|element| loosely_equal(element, item))),
			(Value::Mapping(map), Value::String(key)) => Ok(map.contains_key(key)),
			(Value::Mapping(_), _) => Ok(false),
			_ => {
				Err(self.error(format!(
					"a {} does not support membership tests",
					container.type_name()
				)))
			}
		}
	}
}

/// Equality where integers, floats and booleans compare by numeric value.
fn loosely_equal(left: &Value, right: &Value) -> bool {
	match (left, right) {
		(Value::Sequence(left), Value::Sequence(right)) => {
			left.len() == right.len() && left.iter().zip(right).all(|(l, r)| loosely_equal(l, r))
		}
		_ => {
			match (Number::of(left), Number::of(right)) {
				(Some(Number::Integer(l)), Some(Number::Integer(r))) => l == r,
				(Some(l), Some(r)) => approx_eq!(f64, l.as_f64(), r.as_f64(), ulps = 2),
				_ => left == right,
			}
		}
	}
}

/// Ordering of numbers, of strings and, lexicographically, of sequences.
fn order(left: &Value, right: &Value) -> Option<Ordering> {
	match (left, right) {
		(Value::String(left), Value::String(right)) => Some(left.cmp(right)),
		(Value::Sequence(left), Value::Sequence(right)) => {
			for (l, r) in left.iter().zip(right) {
				if !loosely_equal(l, r) {
					return order(l, r);
				}
			}
			Some(left.len().cmp(&right.len()))
		}
		_ => {
			match (Number::of(left)?, Number::of(right)?) {
				(Number::Integer(l), Number::Integer(r)) => Some(l.cmp(&r)),
				(l, r) => l.as_f64().partial_cmp(&r.as_f64()),
			}
		}
	}
}
