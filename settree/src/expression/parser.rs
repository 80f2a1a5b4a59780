use super::lexer::Lexeme;
use super::lexer::RawToken;
use super::lexer::tokenize;
use crate::SettingsError;
use crate::SettingsResult;
use crate::Value;
use crate::table::unquote;

/// Deepest syntax tree accepted by the parser. Parentheses, lists, unary
/// operators and every operator of a left-associative chain count one level.
pub(crate) const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
	Literal(Value),
	/// A reference to a field of the evaluation context.
	Field(String),
	List(Vec<Expr>),
	Not(Box<Expr>),
	Negate(Box<Expr>),
	And(Box<Expr>, Box<Expr>),
	Or(Box<Expr>, Box<Expr>),
	Binary {
		operator: BinaryOperator,
		left: Box<Expr>,
		right: Box<Expr>,
	},
	/// `a < b <= c` holds when every adjacent pair holds.
	Compare {
		first: Box<Expr>,
		rest: Vec<(CompareOperator, Expr)>,
	},
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOperator {
	Add,
	Subtract,
	Multiply,
	Divide,
	FloorDivide,
	Remainder,
}

impl BinaryOperator {
	pub(crate) fn symbol(self) -> &'static str {
		match self {
			BinaryOperator::Add => "+",
			BinaryOperator::Subtract => "-",
			BinaryOperator::Multiply => "*",
			BinaryOperator::Divide => "/",
			BinaryOperator::FloorDivide => "//",
			BinaryOperator::Remainder => "%",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompareOperator {
	Equal,
	NotEqual,
	Less,
	LessEqual,
	Greater,
	GreaterEqual,
	In,
	NotIn,
}

impl CompareOperator {
	pub(crate) fn symbol(self) -> &'static str {
		match self {
			CompareOperator::Equal => "==",
			CompareOperator::NotEqual => "!=",
			CompareOperator::Less => "<",
			CompareOperator::LessEqual => "<=",
			CompareOperator::Greater => ">",
			CompareOperator::GreaterEqual => ">=",
			CompareOperator::In => "in",
			CompareOperator::NotIn => "not in",
		}
	}
}

/// Recursive descent over the token stream, one method per precedence level.
struct ExpressionParser<'a> {
	source: &'a str,
	tokens: Vec<Lexeme<'a>>,
	cursor: usize,
	depth: usize,
}

impl<'a> ExpressionParser<'a> {
	fn peek(&self) -> Option<RawToken> {
		self.peek_at(0)
	}

	fn peek_at(&self, offset: usize) -> Option<RawToken> {
		self.tokens.get(self.cursor + offset).map(|(token, _)| *token)
	}

	fn advance(&mut self) -> Option<Lexeme<'a>> {
		let lexeme = self.tokens.get(self.cursor).copied();
		self.cursor += 1;
		lexeme
	}

	fn eat(&mut self, token: RawToken) -> bool {
		if self.peek() == Some(token) {
			self.cursor += 1;
			true
		} else {
			false
		}
	}

	fn error(&self, reason: impl Into<String>) -> SettingsError {
		SettingsError::expression(self.source, reason)
	}

	fn unexpected(&self, expected: &str) -> SettingsError {
		match self.tokens.get(self.cursor) {
			None => self.error(format!("expected {expected}, found end of input")),
			Some((token, text)) => {
				self.error(format!(
					"expected {expected}, found {} `{text}`",
					token.describe()
				))
			}
		}
	}

	fn expect(&mut self, token: RawToken, expected: &str) -> SettingsResult<()> {
		if self.eat(token) {
			Ok(())
		} else {
			Err(self.unexpected(expected))
		}
	}

	/// Run `parse` one nesting level deeper.
	fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> SettingsResult<T>) -> SettingsResult<T> {
		if self.depth >= MAX_DEPTH {
			return Err(self.error(format!("nesting deeper than {MAX_DEPTH} levels")));
		}

		self.depth += 1;
		let result = parse(self);
		self.depth -= 1;

		result
	}

	/// Count one more link of an operator chain against [`MAX_DEPTH`]. The
	/// caller restores `depth` once the chain ends.
	fn link(&mut self) -> SettingsResult<()> {
		if self.depth >= MAX_DEPTH {
			return Err(self.error(format!("operator chain deeper than {MAX_DEPTH} levels")));
		}

		self.depth += 1;
		Ok(())
	}

	fn expression(&mut self) -> SettingsResult<Expr> {
		let root = self.or()?;

		if self.cursor < self.tokens.len() {
			return Err(self.unexpected("end of expression"));
		}

		Ok(root)
	}

	fn or(&mut self) -> SettingsResult<Expr> {
		let depth = self.depth;
		let mut left = self.and()?;

		while self.eat(RawToken::Or) {
			self.link()?;
			let right = self.and()?;
			left = Expr::Or(Box::new(left), Box::new(right));
		}

		self.depth = depth;
		Ok(left)
	}

	fn and(&mut self) -> SettingsResult<Expr> {
		let depth = self.depth;
		let mut left = self.not()?;

		while self.eat(RawToken::And) {
			self.link()?;
			let right = self.not()?;
			left = Expr::And(Box::new(left), Box::new(right));
		}

		self.depth = depth;
		Ok(left)
	}

	fn not(&mut self) -> SettingsResult<Expr> {
		if self.eat(RawToken::Not) {
			let operand = self.nested(Self::not)?;
			return Ok(Expr::Not(Box::new(operand)));
		}

		self.comparison()
	}

	fn comparison(&mut self) -> SettingsResult<Expr> {
		let first = self.additive()?;
		let mut rest = vec![];

		loop {
			let operator = match self.peek() {
				Some(RawToken::Equal) => CompareOperator::Equal,
				Some(RawToken::NotEqual) => CompareOperator::NotEqual,
				Some(RawToken::Less) => CompareOperator::Less,
				Some(RawToken::LessEqual) => CompareOperator::LessEqual,
				Some(RawToken::Greater) => CompareOperator::Greater,
				Some(RawToken::GreaterEqual) => CompareOperator::GreaterEqual,
				Some(RawToken::In) => CompareOperator::In,
				Some(RawToken::Not) if self.peek_at(1) == Some(RawToken::In) => {
					self.cursor += 1;
					CompareOperator::NotIn
				}
				_ => break,
			};
			self.cursor += 1;
			rest.push((operator, self.additive()?));
		}

		if rest.is_empty() {
			return Ok(first);
		}

		Ok(Expr::Compare {
			first: Box::new(first),
			rest,
		})
	}

	fn additive(&mut self) -> SettingsResult<Expr> {
		let depth = self.depth;
		let mut left = self.term()?;

		loop {
			let operator = match self.peek() {
				Some(RawToken::Plus) => BinaryOperator::Add,
				Some(RawToken::Minus) => BinaryOperator::Subtract,
				_ => break,
			};
			self.cursor += 1;
			self.link()?;
			let right = self.term()?;
			left = Expr::Binary {
				operator,
				left: Box::new(left),
				right: Box::new(right),
			};
		}

		self.depth = depth;
		Ok(left)
	}

	fn term(&mut self) -> SettingsResult<Expr> {
		let depth = self.depth;
		let mut left = self.unary()?;

		loop {
			let operator = match self.peek() {
				Some(RawToken::Star) => BinaryOperator::Multiply,
				Some(RawToken::Slash) => BinaryOperator::Divide,
				Some(RawToken::DoubleSlash) => BinaryOperator::FloorDivide,
				Some(RawToken::Percent) => BinaryOperator::Remainder,
				_ => break,
			};
			self.cursor += 1;
			self.link()?;
			let right = self.unary()?;
			left = Expr::Binary {
				operator,
				left: Box::new(left),
				right: Box::new(right),
			};
		}

		self.depth = depth;
		Ok(left)
	}

	fn unary(&mut self) -> SettingsResult<Expr> {
		if self.eat(RawToken::Minus) {
			// Fold `-<number>` so that `-9223372036854775808` stays in range.
			if self.peek() == Some(RawToken::Number) {
				return self.number(true);
			}
			let operand = self.nested(Self::unary)?;
			return Ok(Expr::Negate(Box::new(operand)));
		}

		self.primary()
	}

	fn primary(&mut self) -> SettingsResult<Expr> {
		match self.peek() {
			Some(RawToken::Number) => self.number(false),
			Some(RawToken::DoubleQuotedString | RawToken::SingleQuotedString) => {
				let Some((_, text)) = self.advance() else {
					return Err(self.unexpected("a string"));
				};
				let value = unquote(text)
					.map_err(|e| self.error(format!("invalid string escape: {e}")))?;
				Ok(Expr::Literal(Value::String(value)))
			}
			Some(RawToken::True) => {
				self.cursor += 1;
				Ok(Expr::Literal(Value::Boolean(true)))
			}
			Some(RawToken::False) => {
				self.cursor += 1;
				Ok(Expr::Literal(Value::Boolean(false)))
			}
			Some(RawToken::Ident) => {
				let Some((_, name)) = self.advance() else {
					return Err(self.unexpected("a field name"));
				};
				Ok(Expr::Field(name.to_string()))
			}
			Some(RawToken::ParenOpen) => {
				self.cursor += 1;
				let inner = self.nested(Self::or)?;
				self.expect(RawToken::ParenClose, "`)`")?;
				Ok(inner)
			}
			Some(RawToken::BracketOpen) => {
				self.cursor += 1;
				self.nested(Self::list)
			}
			_ => Err(self.unexpected("a value")),
		}
	}

	/// The elements of a list literal, after its opening `[`. A trailing comma
	/// is allowed.
	fn list(&mut self) -> SettingsResult<Expr> {
		let mut items = vec![];

		while !self.eat(RawToken::BracketClose) {
			items.push(self.or()?);

			if !self.eat(RawToken::Comma) {
				self.expect(RawToken::BracketClose, "`,` or `]`")?;
				break;
			}
		}

		Ok(Expr::List(items))
	}

	fn number(&mut self, negative: bool) -> SettingsResult<Expr> {
		let Some((_, text)) = self.advance() else {
			return Err(self.unexpected("a number"));
		};

		if text.contains(['.', 'e', 'E']) {
			let parsed: f64 = text
				.parse()
				.map_err(|_| self.error(format!("invalid number `{text}`")))?;
			return Ok(Expr::Literal(Value::Float(if negative { -parsed } else { parsed })));
		}

		let digits = if negative {
			format!("-{text}")
		} else {
			text.to_string()
		};
		let parsed: i64 = digits
			.parse()
			.map_err(|_| self.error(format!("integer `{digits}` is out of range")))?;

		Ok(Expr::Literal(Value::Integer(parsed)))
	}
}

/// Parse an expression into its syntax tree.
pub(crate) fn parse(source: &str) -> SettingsResult<Expr> {
	let tokens = tokenize(source)?;
	if tokens.is_empty() {
		return Err(SettingsError::expression(source, "empty expression"));
	}

	let mut parser = ExpressionParser {
		source,
		tokens,
		cursor: 0,
		depth: 0,
	};

	parser.expression()
}
