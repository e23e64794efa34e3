use std::collections::HashMap;

use markdown::ParseOptions;
use markdown::mdast::Node;
use markdown::to_mdast;
use serde::Deserialize;
use serde::Serialize;

use crate::CorpusError;
use crate::CorpusResult;
use crate::paths::create_slug;

/// A heading of a long-form document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
	/// Heading level, `1` for `#`.
	pub depth: u8,
	pub text: String,
}

impl Heading {
	pub fn new(depth: u8, text: impl Into<String>) -> Self {
		Self {
			depth,
			text: text.into(),
		}
	}
}

/// A heading and every deeper heading that follows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
	/// Slug of the title, unique within one document.
	pub id: String,
	pub title: String,
	pub depth: u8,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub children: Vec<Section>,
}

/// Nest a flat heading list into sections.
///
/// A heading's children are the immediately following headings of strictly
/// greater depth, up to the next heading of equal or lesser depth. Repeated
/// slugs are suffixed `-1`, `-2`, … in document order.
pub fn build_section_tree(headings: &[Heading]) -> Vec<Section> {
	let mut roots: Vec<Section> = Vec::new();
	let mut stack: Vec<Section> = Vec::new();
	let mut slug_counts: HashMap<String, usize> = HashMap::new();

	for heading in headings {
		while stack.last().is_some_and(|top| top.depth >= heading.depth) {
			if let Some(section) = stack.pop() {
				attach(&mut stack, &mut roots, section);
			}
		}

		stack.push(Section {
			id: unique_slug(&heading.text, &mut slug_counts),
			title: heading.text.clone(),
			depth: heading.depth,
			children: Vec::new(),
		});
	}

	while let Some(section) = stack.pop() {
		attach(&mut stack, &mut roots, section);
	}

	roots
}

fn attach(stack: &mut [Section], roots: &mut Vec<Section>, section: Section) {
	match stack.last_mut() {
		Some(parent) => parent.children.push(section),
		None => roots.push(section),
	}
}

/// Every slug handed out is recorded, so a generated `foo-1` also blocks a
/// later heading whose own slug is `foo-1`.
fn unique_slug(text: &str, counts: &mut HashMap<String, usize>) -> String {
	let base = create_slug(text);
	let mut slug = base.clone();

	while counts.contains_key(&slug) {
		let count = counts.entry(base.clone()).or_insert(0);
		*count += 1;
		slug = format!("{base}-{count}");
	}

	counts.insert(slug.clone(), 0);
	slug
}

fn parse_options(mdx: bool) -> ParseOptions {
	let mut options = if mdx {
		ParseOptions::mdx()
	} else {
		ParseOptions::gfm()
	};
	options.constructs.frontmatter = true;
	options
}

/// Parse a Markdown (or MDX) document. MDX that fails to parse, for example
/// because of an unbalanced expression, falls back to GFM.
fn parse_document(content: &str, mdx: bool) -> CorpusResult<Node> {
	if mdx {
		match to_mdast(content, &parse_options(true)) {
			Ok(node) => return Ok(node),
			Err(error) => {
				tracing::debug!(%error, "mdx parse failed, falling back to gfm");
			}
		}
	}

	to_mdast(content, &parse_options(false)).map_err(|e| CorpusError::Markdown(e.to_string()))
}

/// Headings of a document in document order.
pub fn extract_headings(content: &str, mdx: bool) -> CorpusResult<Vec<Heading>> {
	let mdast = parse_document(content, mdx)?;
	let mut headings = Vec::new();
	collect_headings(&mdast, &mut headings);
	Ok(headings)
}

fn collect_headings(node: &Node, headings: &mut Vec<Heading>) {
	if let Node::Heading(heading) = node {
		headings.push(Heading::new(heading.depth, node.to_string().trim()));
		return;
	}

	if let Some(children) = node.children() {
		for child in children {
			collect_headings(child, headings);
		}
	}
}

/// The YAML front matter of a document as JSON, or `None` when there is
/// none.
pub fn parse_front_matter(content: &str) -> CorpusResult<Option<serde_json::Value>> {
	let mdast = to_mdast(content, &parse_options(false)).map_err(|e| CorpusError::Markdown(e.to_string()))?;
	let Some(Node::Yaml(yaml)) = mdast.children().and_then(|children| children.first()) else {
		return Ok(None);
	};

	let value: serde_json::Value = serde_yaml_ng::from_str(&yaml.value).map_err(|e| {
		CorpusError::Configuration {
			location: "front matter".to_string(),
			message: e.to_string(),
		}
	})?;

	Ok((!value.is_null()).then_some(value))
}

/// Source of every top-level ESM block (`import`/`export`) of an MDX
/// document, joined with newlines.
pub fn mdx_module_source(content: &str) -> CorpusResult<String> {
	let mdast = parse_document(content, true)?;
	let blocks = mdast
		.children()
		.map(|children| {
			children
				.iter()
				.filter_map(|child| match child {
					Node::MdxjsEsm(esm) => Some(esm.value.as_str()),
					_ => None,
				})
				.collect::<Vec<_>>()
		})
		.unwrap_or_default();
	Ok(blocks.join("\n"))
}
