use logos::Logos;

use crate::SettingsError;
use crate::SettingsResult;

/// Raw tokens produced by logos for predicate expressions.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\f]+")]
pub(super) enum RawToken {
	#[token("(")]
	ParenOpen,
	#[token(")")]
	ParenClose,
	#[token("[")]
	BracketOpen,
	#[token("]")]
	BracketClose,
	#[token(",")]
	Comma,
	#[token("==")]
	Equal,
	#[token("!=")]
	NotEqual,
	#[token("<=")]
	LessEqual,
	#[token(">=")]
	GreaterEqual,
	#[token("<")]
	Less,
	#[token(">")]
	Greater,
	#[token("+")]
	Plus,
	#[token("-")]
	Minus,
	#[token("*")]
	Star,
	#[token("//")]
	DoubleSlash,
	#[token("/")]
	Slash,
	#[token("%")]
	Percent,
	#[token("and")]
	#[token("&&")]
	And,
	#[token("or")]
	#[token("||")]
	Or,
	#[token("not")]
	#[token("!")]
	Not,
	#[token("in")]
	In,
	#[token("true")]
	#[token("True")]
	True,
	#[token("false")]
	#[token("False")]
	False,
	#[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
	Ident,
	#[regex(r#""([^"\\]|\\.)*""#)]
	DoubleQuotedString,
	#[regex(r"'([^'\\]|\\.)*'")]
	SingleQuotedString,
	#[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?")]
	Number,
}

impl RawToken {
	pub(super) fn describe(self) -> &'static str {
		match self {
			RawToken::ParenOpen => "`(`",
			RawToken::ParenClose => "`)`",
			RawToken::BracketOpen => "`[`",
			RawToken::BracketClose => "`]`",
			RawToken::Comma => "`,`",
			RawToken::Equal
			| RawToken::NotEqual
			| RawToken::LessEqual
			| RawToken::GreaterEqual
			| RawToken::Less
			| RawToken::Greater
			| RawToken::In => "a comparison operator",
			RawToken::Plus
			| RawToken::Minus
			| RawToken::Star
			| RawToken::DoubleSlash
			| RawToken::Slash
			| RawToken::Percent => "an arithmetic operator",
			RawToken::And | RawToken::Or | RawToken::Not => "a boolean operator",
			RawToken::True | RawToken::False => "a boolean",
			RawToken::Ident => "a field name",
			RawToken::DoubleQuotedString | RawToken::SingleQuotedString => "a string",
			RawToken::Number => "a number",
		}
	}
}

/// A recognized token together with the text it was lexed from.
pub(super) type Lexeme<'a> = (RawToken, &'a str);

/// Split `source` into tokens, rejecting any unrecognized input.
pub(super) fn tokenize(source: &str) -> SettingsResult<Vec<Lexeme<'_>>> {
	RawToken::lexer(source)
		.spanned()
		.map(|(token, span)| {
			let text = &source[span.clone()];
			match token {
				Ok(token) => Ok((token, text)),
				Err(()) => {
					Err(SettingsError::expression(
						source,
						format!("unrecognized input `{text}` at offset {}", span.start),
					))
				}
			}
		})
		.collect()
}
