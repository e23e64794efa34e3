use std::collections::BTreeMap;

use serde::Serialize;
use tree_sitter::Node;

use crate::analysis::Module;
use crate::analysis::named_children;

/// A statically known value of a JavaScript expression.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Literal {
	Null,
	Bool(bool),
	Number(f64),
	String(String),
	Array(Vec<Literal>),
	Object(BTreeMap<String, Literal>),
	/// A function whose body is kept as source text and never evaluated.
	Opaque(OpaqueValue),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpaqueValue {
	#[serde(rename = "$source")]
	pub source: String,
}

impl Literal {
	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::String(value) => Some(value),
			_ => None,
		}
	}

	pub fn as_object(&self) -> Option<&BTreeMap<String, Literal>> {
		match self {
			Self::Object(entries) => Some(entries),
			_ => None,
		}
	}

	pub fn get(&self, key: &str) -> Option<&Literal> {
		self.as_object().and_then(|entries| entries.get(key))
	}

	pub fn is_opaque(&self) -> bool {
		matches!(self, Self::Opaque(_))
	}

	/// Convert into JSON. Opaque values become `null`.
	pub fn to_json(&self) -> serde_json::Value {
		match self {
			Self::Null | Self::Opaque(_) => serde_json::Value::Null,
			Self::Bool(value) => serde_json::Value::Bool(*value),
			Self::Number(value) => number_to_json(*value),
			Self::String(value) => serde_json::Value::String(value.clone()),
			Self::Array(items) => serde_json::Value::Array(items.iter().map(Literal::to_json).collect()),
			Self::Object(entries) => serde_json::Value::Object(
				entries
					.iter()
					.map(|(key, value)| (key.clone(), value.to_json()))
					.collect(),
			),
		}
	}
}

fn number_to_json(value: f64) -> serde_json::Value {
	if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
		return serde_json::Value::from(value as i64);
	}
	serde_json::Number::from_f64(value).map_or(serde_json::Value::Null, serde_json::Value::Number)
}

/// Why an expression could not be reduced to a literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralError {
	pub message: String,
	/// 1-indexed line of the offending expression.
	pub line: usize,
	/// 1-indexed column of the offending expression.
	pub column: usize,
}

impl LiteralError {
	fn new(node: Node<'_>, message: impl Into<String>) -> Self {
		let position = node.start_position();
		Self {
			message: message.into(),
			line: position.row + 1,
			column: position.column + 1,
		}
	}
}

/// Evaluates expressions built only from literals.
///
/// Functions are accepted as [`Literal::Opaque`] values under the object keys
/// listed in `opaque_keys`, at any depth below them.
pub struct LiteralEvaluator<'a> {
	module: &'a Module,
	opaque_keys: &'a [&'a str],
}

impl<'a> LiteralEvaluator<'a> {
	pub fn new(module: &'a Module) -> Self {
		Self {
			module,
			opaque_keys: &[],
		}
	}

	#[must_use]
	pub fn with_opaque_keys(mut self, keys: &'a [&'a str]) -> Self {
		self.opaque_keys = keys;
		self
	}

	pub fn evaluate(&self, node: Node<'_>) -> Result<Literal, LiteralError> {
		self.evaluate_inner(node, false)
	}

	fn evaluate_inner(&self, node: Node<'_>, allow_opaque: bool) -> Result<Literal, LiteralError> {
		let text = self.module.node_text(node);
		match node.kind() {
			"string" => Ok(Literal::String(unescape(strip_delimiters(text)))),
			"template_string" => {
				if named_children(node)
					.iter()
					.any(|child| child.kind() == "template_substitution")
				{
					return Err(LiteralError::new(node, "template strings with substitutions are not literals"));
				}
				Ok(Literal::String(unescape(strip_delimiters(text))))
			}
			"number" => parse_number(text)
				.map(Literal::Number)
				.ok_or_else(|| LiteralError::new(node, format!("invalid number `{text}`"))),
			"true" => Ok(Literal::Bool(true)),
			"false" => Ok(Literal::Bool(false)),
			"null" | "undefined" => Ok(Literal::Null),
			"identifier" if text == "undefined" => Ok(Literal::Null),
			"unary_expression" => self.evaluate_unary(node),
			"parenthesized_expression" | "as_expression" | "satisfies_expression" => {
				let inner = named_children(node)
					.into_iter()
					.find(|child| child.kind() != "comment")
					.ok_or_else(|| LiteralError::new(node, "empty expression"))?;
				self.evaluate_inner(inner, allow_opaque)
			}
			"array" => {
				let mut items = Vec::new();
				for element in named_children(node) {
					match element.kind() {
						"comment" => {}
						"spread_element" => {
							return Err(LiteralError::new(element, "spread elements are not literals"));
						}
						_ => items.push(self.evaluate_inner(element, allow_opaque)?),
					}
				}
				Ok(Literal::Array(items))
			}
			"object" => self.evaluate_object(node, allow_opaque),
			"arrow_function" | "function_expression" | "function" | "generator_function" if allow_opaque => {
				Ok(Literal::Opaque(OpaqueValue {
					source: text.to_string(),
				}))
			}
			kind => Err(LiteralError::new(
				node,
				format!("`{}` ({kind}) is not a literal value", abbreviate(text)),
			)),
		}
	}

	fn evaluate_unary(&self, node: Node<'_>) -> Result<Literal, LiteralError> {
		let operator = node
			.child_by_field_name("operator")
			.map(|operator| self.module.node_text(operator))
			.unwrap_or_default();
		let argument = node
			.child_by_field_name("argument")
			.ok_or_else(|| LiteralError::new(node, "unary expression without an argument"))?;

		match (operator, self.evaluate_inner(argument, false)?) {
			("-", Literal::Number(value)) => Ok(Literal::Number(-value)),
			("+", Literal::Number(value)) => Ok(Literal::Number(value)),
			_ => Err(LiteralError::new(
				node,
				format!("`{}` is not a literal value", abbreviate(self.module.node_text(node))),
			)),
		}
	}

	fn evaluate_object(&self, node: Node<'_>, allow_opaque: bool) -> Result<Literal, LiteralError> {
		let mut entries = BTreeMap::new();

		for member in named_children(node) {
			match member.kind() {
				"comment" => {}
				"pair" => {
					let key_node = member
						.child_by_field_name("key")
						.ok_or_else(|| LiteralError::new(member, "property without a key"))?;
					let key = self.property_key(key_node)?;
					let value_node = member
						.child_by_field_name("value")
						.ok_or_else(|| LiteralError::new(member, "property without a value"))?;
					let opaque = allow_opaque || self.opaque_keys.contains(&key.as_str());
					entries.insert(key, self.evaluate_inner(value_node, opaque)?);
				}
				"method_definition" => {
					let key_node = member
						.child_by_field_name("name")
						.ok_or_else(|| LiteralError::new(member, "method without a name"))?;
					let key = self.property_key(key_node)?;
					if !(allow_opaque || self.opaque_keys.contains(&key.as_str())) {
						return Err(LiteralError::new(member, format!("method `{key}` is not a literal value")));
					}
					entries.insert(
						key,
						Literal::Opaque(OpaqueValue {
							source: self.module.node_text(member).to_string(),
						}),
					);
				}
				"shorthand_property_identifier" => {
					return Err(LiteralError::new(
						member,
						format!("shorthand property `{}` references a variable", self.module.node_text(member)),
					));
				}
				"spread_element" => {
					return Err(LiteralError::new(member, "spread properties are not literals"));
				}
				kind => {
					return Err(LiteralError::new(member, format!("unsupported object member ({kind})")));
				}
			}
		}

		Ok(Literal::Object(entries))
	}

	fn property_key(&self, node: Node<'_>) -> Result<String, LiteralError> {
		let text = self.module.node_text(node);
		match node.kind() {
			"property_identifier" | "identifier" => Ok(text.to_string()),
			"string" => Ok(unescape(strip_delimiters(text))),
			"number" => parse_number(text)
				.map(|value| match number_to_json(value) {
					serde_json::Value::Number(number) => number.to_string(),
					_ => text.to_string(),
				})
				.ok_or_else(|| LiteralError::new(node, format!("invalid numeric key `{text}`"))),
			_ => Err(LiteralError::new(node, format!("computed key `{}` is not a literal", abbreviate(text)))),
		}
	}
}

fn strip_delimiters(text: &str) -> &str {
	let mut chars = text.chars();
	match (chars.next(), chars.next_back()) {
		(Some(first), Some(last)) if first == last && matches!(first, '"' | '\'' | '`') => {
			&text[1..text.len() - 1]
		}
		_ => text,
	}
}

/// Resolve JavaScript string escapes.
pub fn unescape(raw: &str) -> String {
	let mut result = String::with_capacity(raw.len());
	let mut chars = raw.chars().peekable();

	while let Some(ch) = chars.next() {
		if ch != '\\' {
			result.push(ch);
			continue;
		}

		match chars.next() {
			Some('n') => result.push('\n'),
			Some('t') => result.push('\t'),
			Some('r') => result.push('\r'),
			Some('b') => result.push('\u{8}'),
			Some('f') => result.push('\u{c}'),
			Some('v') => result.push('\u{b}'),
			Some('0') => result.push('\0'),
			Some('u') => {
				let code = if chars.peek() == Some(&'{') {
					chars.next();
					let digits: String = chars.by_ref().take_while(|ch| *ch != '}').collect();
					u32::from_str_radix(&digits, 16).ok()
				} else {
					let digits: String = chars.by_ref().take(4).collect();
					u32::from_str_radix(&digits, 16).ok()
				};
				result.extend(code.and_then(char::from_u32));
			}
			Some('x') => {
				let digits: String = chars.by_ref().take(2).collect();
				result.extend(u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32));
			}
			// Line continuation.
			Some('\n') => {}
			Some(other) => result.push(other),
			None => result.push('\\'),
		}
	}

	result
}

fn parse_number(text: &str) -> Option<f64> {
	let cleaned = text.replace('_', "");
	let lower = cleaned.to_ascii_lowercase();
	let (digits, radix) = if let Some(hex) = lower.strip_prefix("0x") {
		(hex, 16)
	} else if let Some(octal) = lower.strip_prefix("0o") {
		(octal, 8)
	} else if let Some(binary) = lower.strip_prefix("0b") {
		(binary, 2)
	} else {
		return lower.trim_end_matches('n').parse::<f64>().ok();
	};

	u64::from_str_radix(digits.trim_end_matches('n'), radix)
		.ok()
		.map(|value| value as f64)
}

fn abbreviate(text: &str) -> String {
	let first_line = text.lines().next().unwrap_or_default();
	if first_line.chars().count() > 40 || text.lines().nth(1).is_some() {
		format!("{}…", first_line.chars().take(40).collect::<String>())
	} else {
		first_line.to_string()
	}
}
