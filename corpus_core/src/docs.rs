//! Documentation comments attached to declarations.
//!
//! A declaration is documented either by a JSDoc block (`/** … */`) or by a
//! plain leading comment. For variable declarators the search walks up to the
//! enclosing declaration and export statement, but never past the top-level
//! statement, so a file header comment is not mistaken for documentation of a
//! nested binding.

use serde::Deserialize;
use serde::Serialize;
use tree_sitter::Node;

use crate::analysis::Declaration;
use crate::analysis::Module;
use crate::analysis::named_children;

/// One `@tag text` entry of a JSDoc block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocTag {
	pub name: String,
	pub text: String,
}

/// The description and tags of a JSDoc block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocMetadata {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub tags: Vec<DocTag>,
}

impl DocMetadata {
	/// The first tag with the given name.
	pub fn tag(&self, name: &str) -> Option<&DocTag> {
		self.tags.iter().find(|tag| tag.name == name)
	}
}

/// A plain-text description of the top-level symbol `name`.
///
/// Prefers the JSDoc description (with inline `{@link}` tags reduced to their
/// text) and falls back to a plain leading comment.
pub fn describe_symbol(module: &Module, name: &str) -> Option<String> {
	let declaration = module.find_declaration(name)?;
	let chain = documentation_chain(module, &declaration, &module.local_name(name));

	if let Some(comment) = find_comment(module, &chain, is_jsdoc) {
		let description = parse_jsdoc(&comment)
			.description
			.map(|description| render_inline_tags(&description))
			.filter(|description| !description.trim().is_empty());
		if description.is_some() {
			return description;
		}
	}

	find_comment(module, &chain, |comment| !is_jsdoc(comment))
		.map(|comment| strip_comment_markers(&comment))
		.filter(|text| !text.is_empty())
}

/// The JSDoc description and tags of the top-level symbol `name`, or `None`
/// when it has no JSDoc block.
pub fn parse_doc_metadata(module: &Module, name: &str) -> Option<DocMetadata> {
	let declaration = module.find_declaration(name)?;
	let chain = documentation_chain(module, &declaration, &module.local_name(name));
	find_comment(module, &chain, is_jsdoc).map(|comment| parse_jsdoc(&comment))
}

/// Nodes that may carry documentation for a declaration, innermost first.
fn documentation_chain<'tree>(
	module: &Module,
	declaration: &Declaration<'tree>,
	name: &str,
) -> Vec<Node<'tree>> {
	let mut chain = Vec::new();
	let start = find_declarator(module, declaration.node, name).unwrap_or(declaration.node);

	let mut current = Some(start);
	while let Some(node) = current {
		if node.kind() == "program" {
			break;
		}
		chain.push(node);
		if node.id() == declaration.statement.id() {
			break;
		}
		current = node.parent();
	}

	chain
}

fn find_declarator<'tree>(module: &Module, node: Node<'tree>, name: &str) -> Option<Node<'tree>> {
	if !matches!(node.kind(), "lexical_declaration" | "variable_declaration") {
		return None;
	}

	named_children(node).into_iter().find(|declarator| {
		declarator.kind() == "variable_declarator"
			&& declarator
				.child_by_field_name("name")
				.is_some_and(|pattern| pattern.kind() == "identifier" && module.node_text(pattern) == name)
	})
}

/// The closest comment matching `accept` that immediately precedes a node of
/// the chain.
fn find_comment(module: &Module, chain: &[Node<'_>], accept: impl Fn(&str) -> bool) -> Option<String> {
	chain.iter().find_map(|node| {
		leading_comments(module, *node)
			.into_iter()
			.rev()
			.find(|comment| accept(comment))
	})
}

/// Contiguous comments directly before `node`, in source order.
fn leading_comments(module: &Module, node: Node<'_>) -> Vec<String> {
	let mut comments = Vec::new();
	let mut boundary = node.start_byte();
	let mut current = node.prev_sibling();

	while let Some(sibling) = current {
		if sibling.kind() != "comment" {
			break;
		}
		let gap = &module.text()[sibling.end_byte()..boundary];
		if !gap.trim().is_empty() {
			break;
		}
		comments.push(module.node_text(sibling).to_string());
		boundary = sibling.start_byte();
		current = sibling.prev_sibling();
	}

	comments.reverse();
	comments
}

fn is_jsdoc(comment: &str) -> bool {
	comment.starts_with("/**") && comment != "/**/"
}

/// Strip `//`, `/*`, `*/` and per-line leading `*` from a plain comment.
pub fn strip_comment_markers(comment: &str) -> String {
	let body = if let Some(line) = comment.strip_prefix("//") {
		line
	} else {
		comment
			.strip_prefix("/*")
			.map(|rest| rest.strip_suffix("*/").unwrap_or(rest))
			.unwrap_or(comment)
	};

	body.lines()
		.map(|line| {
			let line = line.trim();
			let line = line.strip_prefix("//").unwrap_or(line);
			line.strip_prefix('*').unwrap_or(line).trim()
		})
		.collect::<Vec<_>>()
		.join("\n")
		.trim()
		.to_string()
}

/// Parse the text of a JSDoc block into its description and tags.
///
/// Malformed blocks degrade to best-effort text.
pub fn parse_jsdoc(comment: &str) -> DocMetadata {
	let body = comment
		.trim()
		.strip_prefix("/**")
		.unwrap_or(comment)
		.trim_end();
	let body = body.strip_suffix("*/").unwrap_or(body);

	let lines = dedent(
		body.lines()
			.map(|line| {
				let trimmed = line.trim_start();
				match trimmed.strip_prefix('*') {
					Some(rest) => rest.strip_prefix(' ').unwrap_or(rest),
					None => trimmed,
				}
				.trim_end()
			})
			.collect(),
	);

	let mut description = Vec::new();
	let mut tags: Vec<DocTag> = Vec::new();

	for line in lines {
		if let Some(tag) = parse_tag_line(&line) {
			tags.push(tag);
		} else if let Some(tag) = tags.last_mut() {
			if tag.text.is_empty() {
				tag.text = line.trim().to_string();
			} else {
				tag.text.push('\n');
				tag.text.push_str(line.trim());
			}
		} else {
			description.push(line);
		}
	}

	for tag in &mut tags {
		tag.text = tag.text.trim().to_string();
	}

	let description = description.join("\n").trim_matches('\n').trim_end().to_string();
	DocMetadata {
		description: (!description.trim().is_empty()).then_some(description),
		tags,
	}
}

fn parse_tag_line(line: &str) -> Option<DocTag> {
	let rest = line.trim_start().strip_prefix('@')?;
	let name_length = rest
		.find(|ch: char| !(ch.is_alphanumeric() || ch == '-' || ch == '_'))
		.unwrap_or(rest.len());
	if name_length == 0 {
		return None;
	}

	Some(DocTag {
		name: rest[..name_length].to_string(),
		text: rest[name_length..].trim().to_string(),
	})
}

/// Remove the indentation shared by every non-blank line.
fn dedent(lines: Vec<&str>) -> Vec<String> {
	let indent = lines
		.iter()
		.filter(|line| !line.trim().is_empty())
		.map(|line| line.len() - line.trim_start().len())
		.min()
		.unwrap_or(0);

	lines
		.into_iter()
		.map(|line| line.get(indent..).unwrap_or("").to_string())
		.collect()
}

/// Replace `{@link target}`, `{@link target text}` and `{@link target|text}`
/// (and the `linkcode`/`linkplain` variants) with their display text.
pub fn render_inline_tags(text: &str) -> String {
	let mut result = String::with_capacity(text.len());
	let mut rest = text;

	while let Some(start) = rest.find("{@link") {
		let Some(length) = rest[start..].find('}') else {
			break;
		};
		result.push_str(&rest[..start]);

		let inner = &rest[start + 1..start + length];
		let inner = inner
			.trim_start_matches("@linkcode")
			.trim_start_matches("@linkplain")
			.trim_start_matches("@link")
			.trim();
		let display = match inner.split_once('|') {
			Some((_, label)) => label.trim(),
			None => match inner.split_once(char::is_whitespace) {
				Some((_, label)) => label.trim(),
				None => inner,
			},
		};
		result.push_str(display);
		rest = &rest[start + length + 1..];
	}

	result.push_str(rest);
	result
}
