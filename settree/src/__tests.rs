use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use std::time::SystemTime;

use rstest::rstest;
use similar_asserts::assert_eq;
use tempfile::TempDir;

use super::*;
use crate::expression::parser;
use crate::expression::parser::BinaryOperator;
use crate::expression::parser::CompareOperator;
use crate::expression::parser::Expr;
use crate::expression::parser::MAX_DEPTH;
use crate::fallback::Statement;

fn mapping(json: &str) -> Mapping {
	serde_json::from_str(json).unwrap_or_else(|e| panic!("invalid fixture {json}: {e}"))
}

fn tree(json: &str) -> Value {
	Value::Mapping(mapping(json))
}

fn values(json: &str) -> Vec<Value> {
	serde_json::from_str(json).unwrap_or_else(|e| panic!("invalid fixture {json}: {e}"))
}

fn settings_file(dir: &TempDir, name: &str, content: &str) -> SettingsResult<PathBuf> {
	let path = dir.path().join(name);
	fs::write(&path, content)?;
	Ok(path)
}

/// Rewrite the file and move its modification time clearly past any
/// previous write.
fn edit_externally(path: &Path, content: &str) -> SettingsResult<()> {
	fs::write(path, content)?;
	let file = fs::File::options().write(true).open(path)?;
	file.set_modified(SystemTime::now() + Duration::from_secs(10))?;
	Ok(())
}

fn server_tree() -> Value {
	tree(
		r#"{
			"name": "Training",
			"server": { "port": 10308, "public": true },
			"missions": [ { "name": "A", "slots": 4 }, { "name": "B", "slots": 12 } ],
			"players": [
				{ "ucid": "abc", "name": "X", "roles": ["admin"] },
				{ "ucid": "zzz", "name": "Y", "roles": [] }
			],
			"groups": [ { "units": ["u1", "u2"] }, { "units": ["u3"] }, { "callsign": "none" } ]
		}"#,
	)
}

const SERVER_SETTINGS: &str = r#"-- server settings
cfg = {
	["name"] = "Training \"server\"",
	port = 10308,
	['motd'] = 'it\'s live',
	["ratio"] = -0.5,
	["offset"] = -3,
	["missing"] = nil,
	["missionList"] = {
		[1] = "Caucasus.miz",
		[2] = "Syria.miz";
	},
	["coalitions"] = { "red", "blue" },
	["advanced"] = {
		["allow_ownship_export"] = true,
		[5] = false,
	},
}
"#;

const BROKEN_SETTINGS: &str = r#"cfg = {
cfg["name"] = "Recovered"
cfg["missionList"] = {}
cfg["missionList"][2] = "Syria.miz"
cfg["missionList"][1] = "Caucasus.miz"
cfg["advanced"] = {}
cfg["advanced"]["allow_ownship_export"] = true
"#;

// ---- values ----

#[test]
fn float_equality_is_not_transitive() {
	let base = 1000.0_f64;
	let near = f64::from_bits(base.to_bits() + 2);
	let far = f64::from_bits(base.to_bits() + 4);

	assert_eq!(Value::Float(base), Value::Float(near));
	assert_eq!(Value::Float(near), Value::Float(far));
	assert_ne!(Value::Float(base), Value::Float(far));
}

// ---- path queries ----

#[rstest]
#[case::wildcard("missions/*/name", r#"["A", "B"]"#)]
#[case::predicate_over_sequence("players/$ucid=='abc'/name", r#"["X"]"#)]
#[case::numeric_predicate("missions/$slots > 5/name", r#"["B"]"#)]
#[case::membership_predicate("players/$'admin' in roles/ucid", r#"["abc"]"#)]
#[case::truthy_field("players/$roles/name", r#"["X"]"#)]
#[case::interpolated_predicate("players/$'{ucid}' == 'zzz'/name", r#"["Y"]"#)]
#[case::predicate_gates_mapping("server/$port > 1000/port", "[10308]")]
#[case::failed_gate("server/$public == false/port", "[]")]
#[case::nested_wildcards("groups/*/units/*", r#"["u1", "u2", "u3"]"#)]
#[case::missing_key("missions/*/slot", "[]")]
#[case::wildcard_over_mapping("server/*", "[]")]
#[case::literal_over_sequence("missions/name", "[]")]
#[case::undefined_field("missions/$undefined == 1/name", "[]")]
#[case::surrounding_slashes("/missions/*/name/", r#"["A", "B"]"#)]
fn query_paths(#[case] path: &str, #[case] expected: &str) -> SettingsResult<()> {
	let tree = server_tree();
	let path = PathSpec::parse(path)?;
	let found: Vec<Value> = query(&tree, &path).cloned().collect();
	assert_eq!(found, values(expected));

	Ok(())
}

#[test]
fn query_is_lazy_and_fused() -> SettingsResult<()> {
	let tree = server_tree();
	let path: PathSpec = "missions/*/name".parse()?;
	let mut results = tree.query(&path);

	assert_eq!(results.next(), Some(&Value::from("A")));
	assert_eq!(results.next(), Some(&Value::from("B")));
	assert_eq!(results.next(), None);
	assert_eq!(results.next(), None);

	// A fresh query starts over.
	assert_eq!(tree.query(&path).count(), 2);

	Ok(())
}

#[test]
fn query_yields_whole_subtrees() -> SettingsResult<()> {
	let settings = server_tree();
	let path = PathSpec::parse("server")?;
	let found: Vec<&Value> = query(&settings, &path).collect();
	assert_eq!(found, [&tree(r#"{ "port": 10308, "public": true }"#)]);

	Ok(())
}

#[rstest]
#[case::empty("")]
#[case::only_slashes("//")]
#[case::empty_segment("missions//name")]
#[case::empty_predicate("missions/$/name")]
#[case::blank_predicate("missions/$   /name")]
fn invalid_paths(#[case] path: &str) {
	let result = PathSpec::parse(path);
	assert!(
		matches!(result, Err(SettingsError::InvalidPath(_))),
		"{path:?} parsed as {result:?}"
	);
}

#[test]
fn path_spec_segments_and_display() -> SettingsResult<()> {
	let path = PathSpec::parse("/players/$ucid == 'abc'/*/name/")?;
	assert_eq!(path.depth(), 4);
	assert_eq!(
		path.segments(),
		[
			Segment::Literal("players".into()),
			Segment::Predicate("ucid == 'abc'".into()),
			Segment::Wildcard,
			Segment::Literal("name".into()),
		]
	);
	assert_eq!(path.to_string(), "players/$ucid == 'abc'/*/name");
	assert_eq!(PathSpec::parse(&path.to_string())?, path);

	Ok(())
}

// ---- expressions ----

#[rstest]
#[case::arithmetic("$1 + 2 * 3", "{}", Value::Integer(7))]
#[case::grouping("$(1 + 2) * 3", "{}", Value::Integer(9))]
#[case::true_division("$7 / 2", "{}", Value::Float(3.5))]
#[case::floor_division("$7 // 2", "{}", Value::Integer(3))]
#[case::negative_floor_division("$-7 // 2", "{}", Value::Integer(-4))]
#[case::remainder_follows_divisor("$-7 % 3", "{}", Value::Integer(2))]
#[case::field_arithmetic("$count + 1", r#"{ "count": 41 }"#, Value::Integer(42))]
#[case::string_concatenation("$'ab' + 'cd'", "{}", Value::from("abcd"))]
#[case::string_repetition("$'ab' * 2", "{}", Value::from("abab"))]
#[case::list_concatenation("$[1, 2] + [3]", "{}", Value::from(vec![1, 2, 3]))]
#[case::substring("$'a' in 'cat'", "{}", Value::Boolean(true))]
#[case::not_in_sequence("$'x' not in tags", r#"{ "tags": ["a"] }"#, Value::Boolean(true))]
#[case::mapping_key("$'a' in roles", r#"{ "roles": { "a": 1 } }"#, Value::Boolean(true))]
#[case::chained_comparison("$1 < 2 < 3", "{}", Value::Boolean(true))]
#[case::chained_comparison_fails("$3 > 2 > 2", "{}", Value::Boolean(false))]
#[case::numeric_equality("$1 == 1.0", "{}", Value::Boolean(true))]
#[case::boolean_connectives("$True and not false", "{}", Value::Boolean(true))]
#[case::symbolic_connectives("$side == 'blue' || side == 'red'", r#"{ "side": "red" }"#, Value::Boolean(true))]
#[case::interpolation("$name == '{name}'", r#"{ "name": "Ana" }"#, Value::Boolean(true))]
#[case::literal_string("coalition", "{}", Value::from("coalition"))]
fn evaluate_values(
	#[case] input: &str,
	#[case] fields: &str,
	#[case] expected: Value,
) -> SettingsResult<()> {
	let fields = mapping(fields);
	let result = evaluate(&Value::from(input), &Context::new(&fields))?;
	assert_eq!(result, expected);

	Ok(())
}

#[test]
fn evaluate_passes_non_strings_through() -> SettingsResult<()> {
	let context = Context::empty();
	assert_eq!(evaluate(&Value::Integer(5), &context)?, Value::Integer(5));
	assert_eq!(evaluate(&Value::Boolean(false), &context)?, Value::Boolean(false));

	Ok(())
}

#[rstest]
#[case::division_by_zero("$1 / 0")]
#[case::floor_division_by_zero("$1 // 0")]
#[case::undefined_field("$missing")]
#[case::integer_overflow("$9223372036854775807 + 1")]
#[case::unordered_types("$'a' < 1")]
#[case::membership_in_integer("$'a' in 5")]
#[case::incomplete("$1 +")]
#[case::empty("$")]
#[case::oversized_repetition("$'ab' * 9223372036854775807")]
#[case::repetition_past_limit("$'ab' * 1048576")]
fn evaluate_errors(#[case] input: &str) {
	let result = evaluate(&Value::from(input), &Context::empty());
	assert!(
		matches!(result, Err(SettingsError::InvalidExpression { .. })),
		"{input:?} evaluated to {result:?}"
	);
}

#[test]
fn expression_errors_name_the_expression() {
	let error = evaluate(&Value::from("$1 / 0"), &Context::empty())
		.expect_err("division by zero should fail");
	insta::assert_snapshot!(error.to_string(), @"invalid expression `1 / 0`: division by zero");
}

#[test]
fn parsed_expressions_are_reusable() -> SettingsResult<()> {
	let expression: Expression = "slots > 5".parse()?;
	let small = mapping(r#"{ "slots": 4 }"#);
	let large = mapping(r#"{ "slots": 12 }"#);

	assert_eq!(expression.evaluate(&Context::new(&small))?, Value::Boolean(false));
	assert_eq!(expression.evaluate(&Context::new(&large))?, Value::Boolean(true));
	assert_eq!(expression.to_string(), "slots > 5");

	Ok(())
}

#[rstest]
#[case::addition("+")]
#[case::multiplication("*")]
#[case::conjunction("and")]
#[case::disjunction("or")]
fn long_operator_chains_are_rejected(#[case] operator: &str) {
	let input = format!("$1{}", format!(" {operator} 1").repeat(5000));
	let result = evaluate(&Value::from(input), &Context::empty());
	assert!(
		matches!(result, Err(SettingsError::InvalidExpression { .. })),
		"a chain of 5000 `{operator}` evaluated to {result:?}"
	);
}

#[test]
fn operator_chains_within_the_limit_evaluate() -> SettingsResult<()> {
	let input = format!("$1{}", " + 1".repeat(MAX_DEPTH - 1));
	let result = evaluate(&Value::from(input), &Context::empty())?;
	assert_eq!(result, Value::Integer(MAX_DEPTH as i64));

	Ok(())
}

fn field(name: &str) -> Box<Expr> {
	Box::new(Expr::Field(name.to_string()))
}

fn literal(value: impl Into<Value>) -> Box<Expr> {
	Box::new(Expr::Literal(value.into()))
}

#[test]
fn arithmetic_precedence() -> SettingsResult<()> {
	let expr = parser::parse("a + 2 * 3")?;
	assert_eq!(
		expr,
		Expr::Binary {
			operator: BinaryOperator::Add,
			left: field("a"),
			right: Box::new(Expr::Binary {
				operator: BinaryOperator::Multiply,
				left: literal(2),
				right: literal(3),
			}),
		}
	);

	Ok(())
}

#[test]
fn not_in_is_one_operator() -> SettingsResult<()> {
	let expr = parser::parse("'x' not in tags")?;
	assert_eq!(
		expr,
		Expr::Compare {
			first: literal("x"),
			rest: vec![(CompareOperator::NotIn, Expr::Field("tags".into()))],
		}
	);

	Ok(())
}

#[test]
fn not_binds_looser_than_comparison() -> SettingsResult<()> {
	let expr = parser::parse("not a == 1")?;
	assert_eq!(
		expr,
		Expr::Not(Box::new(Expr::Compare {
			first: field("a"),
			rest: vec![(CompareOperator::Equal, Expr::Literal(Value::Integer(1)))],
		}))
	);

	Ok(())
}

#[test]
fn negative_integer_limit() -> SettingsResult<()> {
	assert_eq!(
		parser::parse("-9223372036854775808")?,
		Expr::Literal(Value::Integer(i64::MIN))
	);

	Ok(())
}

#[rstest]
#[case::empty("")]
#[case::blank("   ")]
#[case::dangling_operator("a ==")]
#[case::unclosed_paren("(a == 1")]
#[case::unclosed_list("[1, 2")]
#[case::trailing_tokens("a b")]
#[case::assignment("a = 1")]
#[case::integer_overflow("9223372036854775808")]
fn parser_rejects(#[case] source: &str) {
	let result = parser::parse(source);
	assert!(
		matches!(result, Err(SettingsError::InvalidExpression { .. })),
		"{source:?} parsed as {result:?}"
	);
}

#[test]
fn nesting_is_bounded() {
	let deep = format!("{}1{}", "(".repeat(MAX_DEPTH + 1), ")".repeat(MAX_DEPTH + 1));
	assert!(parser::parse(&deep).is_err());

	let shallow = format!("{}1{}", "(".repeat(MAX_DEPTH - 1), ")".repeat(MAX_DEPTH - 1));
	assert!(parser::parse(&shallow).is_ok());
}

// ---- interpolation ----

#[test]
fn missing_field_interpolates_to_empty() {
	let greeting = interpolate("Hello {name}", &Context::empty(), None);
	assert_eq!(greeting, "Hello ");
}

#[rstest]
#[case::field("Hello {name}", None, "Hello Ana")]
#[case::escaped_braces("{{name}} is {name}", None, "{name} is Ana")]
#[case::format_spec_ignored("[{name:>10}]", None, "[Ana]")]
#[case::conversion_ignored("{name!r}", None, "Ana")]
#[case::sequence_per_line("{tags}", None, "red\nblue")]
#[case::mapping_as_json("{meta}", None, r#"{"level":1}"#)]
#[case::boolean("{public}", None, "true")]
#[case::float("{ratio}", None, "0.5")]
#[case::missing_with_default("{missing}", Some("n/a"), "n/a")]
#[case::empty_with_default("{empty}", Some("n/a"), "n/a")]
#[case::unterminated("open {name", None, "open {name")]
#[case::stray_closing_brace("a}b", None, "a}b")]
fn interpolate_fields(
	#[case] template: &str,
	#[case] default: Option<&str>,
	#[case] expected: &str,
) {
	let fields = mapping(
		r#"{
			"name": "Ana",
			"tags": ["red", "blue"],
			"meta": { "level": 1 },
			"public": true,
			"ratio": 0.5,
			"empty": ""
		}"#,
	);
	assert_eq!(interpolate(template, &Context::new(&fields), default), expected);
}

// ---- table literal codec ----

#[test]
fn parse_table_literal_document() -> SettingsResult<()> {
	let document = parse_table_literal(SERVER_SETTINGS)?;
	assert_eq!(document.name.as_deref(), Some("cfg"));
	assert_eq!(
		document.root,
		mapping(
			r#"{
				"name": "Training \"server\"",
				"port": 10308,
				"motd": "it's live",
				"ratio": -0.5,
				"offset": -3,
				"missionList": ["Caucasus.miz", "Syria.miz"],
				"coalitions": ["red", "blue"],
				"advanced": { "allow_ownship_export": true, "5": false }
			}"#
		)
	);

	Ok(())
}

#[test]
fn parse_table_literal_with_return() -> SettingsResult<()> {
	let document = parse_table_literal("return { [\"a\"] = 1 }")?;
	assert_eq!(document.name, None);
	assert_eq!(document.root, mapping(r#"{ "a": 1 }"#));

	Ok(())
}

#[rstest]
#[case::unclosed("cfg = {\n\t[\"a\"] = 1,\n")]
#[case::missing_separator("cfg = { [\"a\"] = 1 [\"b\"] = 2 }")]
#[case::sequence_root("cfg = { \"a\", \"b\" }")]
#[case::trailing_input("cfg = {} extra")]
#[case::boolean_key("cfg = { [true] = 1 }")]
fn table_literal_syntax_errors(#[case] source: &str) {
	let result = parse_table_literal(source);
	assert!(
		matches!(result, Err(SettingsError::TableSyntax { .. })),
		"{source:?} parsed as {result:?}"
	);
}

#[test]
fn table_syntax_errors_report_their_position() {
	let error = parse_table_literal("cfg = {\n\t[\"a\"] = ,\n}")
		.expect_err("a missing value should fail");
	insta::assert_snapshot!(
		error.to_string(),
		@"table literal syntax error at 2:10: expected a value, found `,`"
	);
}

#[test]
fn serialize_table_literal_layout() -> SettingsResult<()> {
	let root = mapping(
		r#"{
			"name": "Say \"hi\"",
			"port": 10308,
			"ratio": 0.5,
			"missionList": ["Caucasus.miz", "Syria.miz"],
			"advanced": { "allow_ownship_export": true },
			"empty": {}
		}"#,
	);
	let output = serialize_table_literal("cfg", &root)?;
	let expected = "cfg = {\n\t[\"name\"] = \"Say \\\"hi\\\"\",\n\t[\"port\"] = 10308,\n\t[\"ratio\"] = \
	                0.5,\n\t[\"missionList\"] = {\n\t\t[1] = \"Caucasus.miz\",\n\t\t[2] = \
	                \"Syria.miz\",\n\t},\n\t[\"advanced\"] = {\n\t\t[\"allow_ownship_export\"] = \
	                true,\n\t},\n\t[\"empty\"] = {},\n}\n";
	assert_eq!(output, expected);
	assert_eq!(parse_table_literal(&output)?.root, root);

	Ok(())
}

#[test]
fn deeply_nested_tables_are_rejected() {
	let depth = 5000;
	let source = format!(
		"cfg = {{ [\"a\"] = {}1{} }}",
		"{".repeat(depth),
		"}".repeat(depth)
	);
	let result = parse_table_literal(&source);
	assert!(
		matches!(result, Err(SettingsError::TableSyntax { .. })),
		"nested tables parsed as {result:?}"
	);
}

#[test]
fn nesting_up_to_the_limit_parses() -> SettingsResult<()> {
	let depth = MAX_TABLE_DEPTH - 1;
	let source = format!("cfg = {{ [\"a\"] = {}1{} }}", "{".repeat(depth - 1), "}".repeat(depth - 1));
	let document = parse_table_literal(&source)?;

	let mut node = document.root.get("a");
	for _ in 1..depth {
		node = match node {
			Some(Value::Sequence(items)) => items.first(),
			other => panic!("expected a sequence, found {other:?}"),
		};
	}
	assert_eq!(node, Some(&Value::Integer(1)));

	Ok(())
}

#[test]
fn serialize_rejects_non_finite_floats() {
	let root: Mapping = [("ratio", f64::NAN)].into_iter().collect();
	let result = serialize_table_literal("cfg", &root);
	assert!(matches!(result, Err(SettingsError::Serialize(_))));
}

// ---- fallback parser ----

#[test]
fn fallback_builds_sequences_from_positions() -> SettingsResult<()> {
	let source = "root = {\nroot[\"restricted\"] = {}\nroot[\"restricted\"][1] = \
	              \"red\"\nroot[\"restricted\"][2] = \"blue\"\n";
	let document = parse_fallback(source, &[])?;
	assert_eq!(document.name.as_deref(), Some("root"));
	assert_eq!(document.root, mapping(r#"{ "restricted": ["red", "blue"] }"#));

	Ok(())
}

#[test]
fn fallback_positions_are_order_independent() -> SettingsResult<()> {
	let source = "cfg = {\ncfg[\"list\"] = {}\ncfg[\"list\"][3] = \"c\"\ncfg[\"list\"][1] = \
	              \"a\"\ncfg[\"list\"][2] = \"b\"\n";
	let document = parse_fallback(source, &[])?;
	assert_eq!(document.root, mapping(r#"{ "list": ["a", "b", "c"] }"#));

	Ok(())
}

#[test]
fn fallback_recovers_every_declared_key() -> SettingsResult<()> {
	let document = parse_fallback(BROKEN_SETTINGS, &["missionList".to_string()])?;
	assert_eq!(
		document.root,
		mapping(
			r#"{
				"name": "Recovered",
				"missionList": ["Caucasus.miz", "Syria.miz"],
				"advanced": { "allow_ownship_export": true }
			}"#
		)
	);

	Ok(())
}

#[test]
fn fallback_list_keys_start_as_sequences() -> SettingsResult<()> {
	let source = "cfg = {\ncfg[\"missionList\"] = {}\ncfg[\"other\"] = {}\n";
	let document = parse_fallback(source, &["missionList".to_string()])?;
	assert_eq!(document.root.get("missionList"), Some(&Value::Sequence(vec![])));
	assert_eq!(document.root.get("other"), Some(&Value::Mapping(Mapping::new())));

	Ok(())
}

#[test]
fn fallback_skips_unknown_lines_and_undeclared_keys() -> SettingsResult<()> {
	let source = "cfg = {\n-- comment\ncfg[\"ghost\"][1] = 1\ncfg[\"port\"] = 10308\n}\n";
	let document = parse_fallback(source, &[])?;
	assert_eq!(document.root, mapping(r#"{ "port": 10308 }"#));

	Ok(())
}

#[rstest]
#[case::assign(r#"cfg["name"] = "x""#, Some(Statement::Assign { key: "name", value: r#""x""# }))]
#[case::member(
	r#"cfg["list"][2] = 5"#,
	Some(Statement::AssignMember { key: "list", member: "2", value: "5" })
)]
#[case::quoted_member(
	r#"	cfg["advanced"]["a]b"] = true"#,
	Some(Statement::AssignMember { key: "advanced", member: r#""a]b""#, value: "true" })
)]
#[case::no_root(r#"["name"] = "x""#, None)]
#[case::no_value(r#"cfg["name"] ="#, None)]
#[case::header("cfg = ", None)]
fn fallback_statements(#[case] line: &str, #[case] expected: Option<Statement<'_>>) {
	assert_eq!(Statement::parse(line), expected);
}

#[test]
fn fallback_keeps_non_ascii_values() -> SettingsResult<()> {
	let source = "cfg = {\ncfg[\"motd\"] = \"café ✈\"\ncfg[\"broken\"] = \"café\n";
	let document = parse_fallback(source, &[])?;
	assert_eq!(document.root, mapping(r#"{ "motd": "café ✈", "broken": "caf" }"#));

	Ok(())
}

#[test]
#[tracing_test::traced_test]
fn fallback_reports_repeated_positions() {
	let source = "cfg = {\ncfg[\"list\"] = {}\ncfg[\"list\"][1] = \"a\"\ncfg[\"list\"][1] = \"b\"\n";
	let document =
		parse_fallback(source, &[]).unwrap_or_else(|e| panic!("failed to recover settings: {e}"));

	assert_eq!(document.root, mapping(r#"{ "list": ["b"] }"#));
	assert!(logs_contain("position 1 of `list` assigned twice"));
}

#[rstest]
#[case::float("1.5")]
#[case::bare_word("yes")]
#[case::lone_quote("\"")]
fn fallback_rejects_invalid_literals(#[case] literal: &str) {
	let source = format!("cfg = {{\ncfg[\"value\"] = {literal}\n");
	let result = parse_fallback(&source, &[]);
	assert!(
		matches!(&result, Err(SettingsError::InvalidLiteral(text)) if text == literal),
		"{literal:?} parsed as {result:?}"
	);
}

#[rstest]
#[case::string("\"text\"", Value::from("text"))]
#[case::no_escape_processing(r#""a\nb""#, Value::from(r"a\nb"))]
#[case::boolean("false", Value::Boolean(false))]
#[case::negative("-12", Value::Integer(-12))]
#[case::empty_table("{}", Value::Mapping(Mapping::new()))]
#[case::non_ascii("\"café\"", Value::from("café"))]
#[case::unterminated("\"café", Value::from("caf"))]
#[case::empty_string("\"\"", Value::from(""))]
fn fallback_literals(#[case] text: &str, #[case] expected: Value) -> SettingsResult<()> {
	assert_eq!(parse_literal(text)?, expected);

	Ok(())
}

// ---- formats ----

#[rstest]
#[case::lua("settings.lua", Format::TableLiteral)]
#[case::json("settings.json", Format::Json)]
#[case::uppercase("SETTINGS.JSON", Format::Json)]
fn detect_formats(#[case] file: &str, #[case] expected: Format) -> SettingsResult<()> {
	assert_eq!(Format::from_path(Path::new(file))?, expected);

	Ok(())
}

#[test]
fn json_nulls_are_dropped() -> SettingsResult<()> {
	let document = decode(
		r#"{ "a": null, "b": [1, null, 2] }"#,
		Format::Json,
		&[],
		"settings.json",
	)?;
	assert_eq!(document.root, mapping(r#"{ "b": [1, 2] }"#));

	Ok(())
}

#[test]
fn json_is_written_pretty() -> SettingsResult<()> {
	let root = mapping(r#"{ "name": "Training", "ports": [1, 2] }"#);
	let output = encode(&root, Format::Json, DEFAULT_ROOT_NAME)?;
	assert_eq!(
		output,
		"{\n  \"name\": \"Training\",\n  \"ports\": [\n    1,\n    2\n  ]\n}\n"
	);

	Ok(())
}

// ---- settings store ----

#[test]
fn unsupported_formats_fail_fast() -> SettingsResult<()> {
	let dir = tempfile::tempdir()?;
	let error = SettingsStore::open(dir.path().join("settings.yaml"))
		.expect_err("yaml is not a supported format");
	insta::assert_snapshot!(error.to_string(), @"unsupported settings file format: `yaml`");

	Ok(())
}

#[test]
fn store_reads_table_literals() -> SettingsResult<()> {
	let dir = tempfile::tempdir()?;
	let path = settings_file(&dir, "serverSettings.lua", SERVER_SETTINGS)?;
	let mut store = SettingsStore::open(&path)?;

	assert_eq!(store.format(), Format::TableLiteral);
	assert_eq!(store.root_name(), "cfg");
	assert_eq!(store.get("port")?, Some(&Value::Integer(10308)));
	assert_eq!(store.get("absent")?, None);
	assert!(store.contains_key("missionList")?);

	Ok(())
}

#[test]
fn repeated_reads_do_not_reparse() -> SettingsResult<()> {
	let dir = tempfile::tempdir()?;
	let path = settings_file(&dir, "settings.json", r#"{ "name": "Training" }"#)?;
	let mut store = SettingsStore::open(&path)?;

	let first = store.tree()?.clone();
	let second = store.tree()?.clone();
	assert_eq!(first, second);
	assert_eq!(store.reloads(), 1);

	Ok(())
}

#[test]
fn external_edits_are_picked_up() -> SettingsResult<()> {
	let dir = tempfile::tempdir()?;
	let path = settings_file(&dir, "settings.json", r#"{ "name": "Training" }"#)?;
	let mut store = SettingsStore::open(&path)?;
	assert_eq!(store.get("name")?, Some(&Value::from("Training")));

	edit_externally(&path, r#"{ "name": "Operations" }"#)?;
	assert!(store.is_stale()?);
	assert_eq!(store.get("name")?, Some(&Value::from("Operations")));
	assert_eq!(store.reloads(), 2);
	assert!(!store.is_stale()?);

	Ok(())
}

#[test]
fn writes_do_not_trigger_reloads() -> SettingsResult<()> {
	let dir = tempfile::tempdir()?;
	let path = settings_file(&dir, "settings.json", r#"{ "name": "Training" }"#)?;
	let mut store = SettingsStore::open(&path)?;

	store.set("port", 10308)?;
	assert_eq!(store.get("port")?, Some(&Value::Integer(10308)));
	assert_eq!(store.reloads(), 1);

	Ok(())
}

#[rstest]
#[case::table_literal("settings.lua", "cfg = {\n\t[\"name\"] = \"Training\",\n}\n")]
#[case::json("settings.json", r#"{ "name": "Training" }"#)]
fn writes_round_trip(#[case] file: &str, #[case] initial: &str) -> SettingsResult<()> {
	let dir = tempfile::tempdir()?;
	let path = settings_file(&dir, file, initial)?;
	let mut store = SettingsStore::open(&path)?;

	let missions = mapping(
		r#"{
			"list": ["Caucasus.miz", "Syria.miz"],
			"advanced": { "ratio": 0.25, "offset": -3, "enabled": false }
		}"#,
	);
	store.set("missions", missions)?;
	let written = store.tree()?.clone();

	let mut reopened = SettingsStore::open(&path)?;
	assert_eq!(reopened.tree()?, &written);

	Ok(())
}

#[rstest]
#[case::escaped_text(Value::from("say \"hi\" from C:\\temp\nto café ✈\t!"))]
#[case::integer_limits(Value::from(vec![i64::MIN, i64::MAX]))]
#[case::floats(Value::from(vec![-0.25, 1e300, 2.5e-8, -1.5e-7]))]
#[case::sequence_of_mappings(Value::Sequence(values(
	r#"[{ "name": "A", "slots": 4 }, { "name": "B", "tags": ["x"] }]"#
)))]
#[case::integer_like_keys(tree(r#"{ "1": "first", "2": { "10": true } }"#))]
fn values_round_trip(
	#[values("settings.lua", "settings.json")] file: &str,
	#[case] value: Value,
) -> SettingsResult<()> {
	let initial = match Format::from_path(Path::new(file))? {
		Format::TableLiteral => "cfg = {\n\t[\"name\"] = \"Training\",\n}\n",
		Format::Json => r#"{ "name": "Training" }"#,
	};
	let dir = tempfile::tempdir()?;
	let path = settings_file(&dir, file, initial)?;
	let mut store = SettingsStore::open(&path)?;
	store.set("value", value.clone())?;

	let mut reopened = SettingsStore::open(&path)?;
	assert_eq!(reopened.get("value")?, Some(&value));

	Ok(())
}

#[test]
fn deeply_nested_files_fail_to_load() -> SettingsResult<()> {
	let dir = tempfile::tempdir()?;
	let content = format!("cfg = {{ [\"a\"] = {}1{} }}\n", "{".repeat(5000), "}".repeat(5000));
	let path = settings_file(&dir, "settings.lua", &content)?;

	let result = SettingsStore::open(&path);
	assert!(
		matches!(result, Err(SettingsError::Parse { .. })),
		"expected a parse error, got {result:?}"
	);

	Ok(())
}

#[test]
#[tracing_test::traced_test]
fn refuses_to_write_an_empty_tree() {
	let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("failed to create tempdir: {e}"));
	let content = "cfg = {\n\t[\"only\"] = 1,\n}\n";
	let path = settings_file(&dir, "settings.lua", content)
		.unwrap_or_else(|e| panic!("failed to write settings: {e}"));
	let mut store =
		SettingsStore::open(&path).unwrap_or_else(|e| panic!("failed to open store: {e}"));

	let result = store.remove("only");
	assert!(
		matches!(result, Err(SettingsError::EmptyWriteRefused { .. })),
		"expected the write to be refused, got {result:?}"
	);

	let on_disk =
		fs::read_to_string(&path).unwrap_or_else(|e| panic!("failed to read settings: {e}"));
	assert_eq!(on_disk, content);
	// The in-memory change is kept.
	assert_eq!(store.get("only").ok().flatten(), None);
	assert!(logs_contain("writing of settings.lua aborted due to empty settings"));
}

#[test]
#[tracing_test::traced_test]
fn store_recovers_with_the_fallback_parser() {
	let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("failed to create tempdir: {e}"));
	let path = settings_file(&dir, "serverSettings.lua", BROKEN_SETTINGS)
		.unwrap_or_else(|e| panic!("failed to write settings: {e}"));
	let options = StoreOptions::new().with_list_key("missionList");
	let mut store = SettingsStore::open_with(&path, options)
		.unwrap_or_else(|e| panic!("failed to open store: {e}"));

	let missions = store
		.get("missionList")
		.unwrap_or_else(|e| panic!("failed to read: {e}"))
		.cloned();
	assert_eq!(missions, Some(Value::from(vec!["Caucasus.miz", "Syria.miz"])));
	assert!(logs_contain("recovered 3 top-level keys"));

	// The next write replaces the broken file with a well-formed one.
	store
		.set("port", 10308)
		.unwrap_or_else(|e| panic!("failed to write: {e}"));
	let content =
		fs::read_to_string(&path).unwrap_or_else(|e| panic!("failed to read settings: {e}"));
	let document =
		parse_table_literal(&content).unwrap_or_else(|e| panic!("rewritten file is broken: {e}"));
	assert_eq!(document.root.get("port"), Some(&Value::Integer(10308)));
	assert_eq!(document.root.len(), 4);
}

#[test]
fn unparseable_files_report_the_primary_error() -> SettingsResult<()> {
	let dir = tempfile::tempdir()?;
	let path = settings_file(&dir, "settings.lua", "cfg = {\n\tthis is not a table\n")?;
	let error = SettingsStore::open(&path).expect_err("the file cannot be recovered");

	let SettingsError::Parse { reason, .. } = error else {
		panic!("expected a parse error, got {error:?}");
	};
	assert!(reason.starts_with("table literal syntax error"), "{reason}");

	Ok(())
}

#[test]
fn invalid_fallback_literals_fail_the_load() -> SettingsResult<()> {
	let dir = tempfile::tempdir()?;
	let path = settings_file(&dir, "settings.lua", "cfg = {\ncfg[\"ratio\"] = 1.5\n")?;
	let result = SettingsStore::open(&path);
	assert!(matches!(result, Err(SettingsError::Parse { .. })), "{result:?}");

	Ok(())
}

#[test]
fn broken_edits_keep_the_previous_tree() -> SettingsResult<()> {
	let dir = tempfile::tempdir()?;
	let path = settings_file(&dir, "settings.json", r#"{ "name": "Training" }"#)?;
	let mut store = SettingsStore::open(&path)?;

	edit_externally(&path, "{ not json")?;
	assert!(matches!(store.get("name"), Err(SettingsError::Parse { .. })));
	// The broken version is reported once, then the last good tree is served.
	assert_eq!(store.get("name")?, Some(&Value::from("Training")));

	Ok(())
}

#[test]
fn writes_keep_the_file_root_name() -> SettingsResult<()> {
	let dir = tempfile::tempdir()?;
	let path = settings_file(&dir, "mission.lua", "mission = {\n\t[\"a\"] = 1,\n}\n")?;
	let mut store = SettingsStore::open(&path)?;
	assert_eq!(store.root_name(), "mission");

	store.set("b", true)?;
	assert_eq!(
		fs::read_to_string(&path)?,
		"mission = {\n\t[\"a\"] = 1,\n\t[\"b\"] = true,\n}\n"
	);

	Ok(())
}

#[test]
fn configured_root_name_wins() -> SettingsResult<()> {
	let dir = tempfile::tempdir()?;
	let path = settings_file(&dir, "mission.lua", "mission = {\n\t[\"a\"] = 1,\n}\n")?;
	let mut store = SettingsStore::open_with(&path, StoreOptions::new().with_root("cfg"))?;

	store.set("a", 2)?;
	assert!(fs::read_to_string(&path)?.starts_with("cfg = {"));

	Ok(())
}

#[test]
fn configured_list_keys_apply_to_well_formed_files() -> SettingsResult<()> {
	let dir = tempfile::tempdir()?;
	let path = settings_file(&dir, "settings.lua", "cfg = {\n\t[\"missionList\"] = {},\n}\n")?;
	let mut store =
		SettingsStore::open_with(&path, StoreOptions::new().with_list_key("missionList"))?;

	assert_eq!(store.get("missionList")?, Some(&Value::Sequence(vec![])));

	Ok(())
}

#[test]
fn update_and_remove() -> SettingsResult<()> {
	let dir = tempfile::tempdir()?;
	let path = settings_file(&dir, "settings.json", r#"{ "a": 1, "b": 2 }"#)?;
	let mut store = SettingsStore::open(&path)?;

	let count = store.update(|root| {
		root.insert("c", 3);
		root.len()
	})?;
	assert_eq!(count, 3);
	assert_eq!(store.remove("a")?, Some(Value::Integer(1)));
	assert_eq!(store.remove("a")?, None);

	let reopened = SettingsStore::open(&path)?.tree()?.clone();
	assert_eq!(reopened, mapping(r#"{ "b": 2, "c": 3 }"#));

	Ok(())
}

#[test]
fn store_queries_see_fresh_data() -> SettingsResult<()> {
	let dir = tempfile::tempdir()?;
	let path = settings_file(&dir, "settings.json", r#"{ "missions": [{ "name": "A" }] }"#)?;
	let mut store = SettingsStore::open(&path)?;
	let spec = PathSpec::parse("missions/*/name")?;

	let before: Vec<Value> = store.query(&spec)?.cloned().collect();
	assert_eq!(before, values(r#"["A"]"#));

	edit_externally(&path, r#"{ "missions": [{ "name": "A" }, { "name": "B" }] }"#)?;
	let after: Vec<Value> = store.query(&spec)?.cloned().collect();
	assert_eq!(after, values(r#"["A", "B"]"#));

	Ok(())
}

#[test]
fn store_options_deserialize() -> SettingsResult<()> {
	let options: StoreOptions = serde_json::from_str(r#"{ "list_keys": ["missionList"] }"#)?;
	assert_eq!(options, StoreOptions::new().with_list_key("missionList"));

	Ok(())
}
