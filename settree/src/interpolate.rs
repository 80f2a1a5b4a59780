use tracing::debug;

use crate::Context;
use crate::Value;

/// Replace `{field}` references in `template` with values from `context`.
///
/// - `{{` and `}}` produce literal braces.
/// - A format spec or conversion (`{name:>10}`, `{name!r}`) is accepted and
///   ignored.
/// - Scalars render plainly, sequences one element per line and mappings as
///   JSON.
/// - A missing field, or a field holding an empty string, is replaced with
///   `default` or with nothing.
/// - An unterminated `{` leaves the rest of the template untouched.
///
/// ```rust
/// use settree::Context;
/// use settree::Mapping;
/// use settree::interpolate;
///
/// let fields: Mapping = [("name", "Ana")].into_iter().collect();
/// let greeting = interpolate("Hello {name}", &Context::new(&fields), None);
/// assert_eq!(greeting, "Hello Ana");
///
/// let missing = interpolate("Hello {name}", &Context::empty(), Some("you"));
/// assert_eq!(missing, "Hello you");
/// ```
pub fn interpolate(template: &str, context: &Context<'_>, default: Option<&str>) -> String {
	let mut output = String::with_capacity(template.len());
	let mut rest = template;

	while let Some(index) = rest.find(['{', '}']) {
		output.push_str(&rest[..index]);
		let brace = &rest[index..];

		if brace.starts_with("{{") || brace.starts_with("}}") {
			output.push_str(&brace[..1]);
			rest = &brace[2..];
			continue;
		}

		if brace.starts_with('}') {
			output.push('}');
			rest = &brace[1..];
			continue;
		}

		let Some(end) = brace.find('}') else {
			output.push_str(brace);
			return output;
		};

		let field = &brace[1..end];
		let name = field
			.split_once([':', '!'])
			.map_or(field, |(name, _)| name)
			.trim();
		substitute(&mut output, name, context, default);
		rest = &brace[end + 1..];
	}

	output.push_str(rest);
	output
}

fn substitute(output: &mut String, name: &str, context: &Context<'_>, default: Option<&str>) {
	match context.get(name) {
		Some(Value::String(value)) if value.is_empty() => {
			output.push_str(default.unwrap_or_default());
		}
		Some(value) => output.push_str(&value.to_string()),
		None => {
			debug!("field `{name}` is missing, substituting the default");
			output.push_str(default.unwrap_or_default());
		}
	}
}
