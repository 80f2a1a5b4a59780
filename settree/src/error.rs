use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum SettingsError {
	#[error(transparent)]
	#[diagnostic(code(settree::io_error))]
	Io(#[from] std::io::Error),

	#[error("failed to parse settings file `{path}`: {reason}")]
	#[diagnostic(
		code(settree::parse),
		help("the file could be read neither by the primary codec nor by the line-based fallback")
	)]
	Parse { path: String, reason: String },

	#[error("table literal syntax error at {line}:{column}: {reason}")]
	#[diagnostic(code(settree::table_syntax))]
	TableSyntax {
		line: usize,
		column: usize,
		reason: String,
	},

	#[error(transparent)]
	#[diagnostic(code(settree::json))]
	Json(#[from] serde_json::Error),

	#[error("unsupported settings file format: `{0}`")]
	#[diagnostic(
		code(settree::unsupported_format),
		help("supported formats: lua, json")
	)]
	UnsupportedFormat(String),

	#[error("writing of `{path}` aborted due to empty settings")]
	#[diagnostic(
		code(settree::empty_write_refused),
		help("the in-memory settings were updated but the file on disk was left untouched")
	)]
	EmptyWriteRefused { path: String },

	#[error("invalid literal: `{0}`")]
	#[diagnostic(
		code(settree::invalid_literal),
		help("fallback values must be a quoted string, `true`, `false`, `{{}}` or an integer")
	)]
	InvalidLiteral(String),

	#[error("invalid path: {0}")]
	#[diagnostic(code(settree::invalid_path))]
	InvalidPath(String),

	#[error("invalid expression `{expression}`: {reason}")]
	#[diagnostic(code(settree::invalid_expression))]
	InvalidExpression { expression: String, reason: String },

	#[error("value cannot be serialized: {0}")]
	#[diagnostic(code(settree::serialize))]
	Serialize(String),
}

impl SettingsError {
	pub(crate) fn expression(expression: impl Into<String>, reason: impl Into<String>) -> Self {
		Self::InvalidExpression {
			expression: expression.into(),
			reason: reason.into(),
		}
	}
}

pub type SettingsResult<T> = Result<T, SettingsError>;
