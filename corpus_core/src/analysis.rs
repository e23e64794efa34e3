use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use tree_sitter::Node;
use tree_sitter::Parser;
use tree_sitter::Tree;

use crate::CorpusError;
use crate::CorpusResult;
use crate::closure::extract_export_closure;
use crate::docs::DocMetadata;
use crate::docs::describe_symbol;
use crate::docs::parse_doc_metadata;
use crate::paths::extname;
use crate::project::Project;
use crate::project::normalize_line_endings;
use crate::sections::Heading;
use crate::sections::Section;
use crate::sections::build_section_tree;
use crate::sections::extract_headings;
use crate::sections::parse_front_matter;

/// The content kind of a source file, derived from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
	TypeScript,
	Tsx,
	JavaScript,
	Markdown,
	Mdx,
	Text,
}

impl Language {
	pub fn from_extension(extension: &str) -> Self {
		match extension.trim_start_matches('.').to_ascii_lowercase().as_str() {
			"ts" | "mts" | "cts" => Self::TypeScript,
			"tsx" => Self::Tsx,
			"js" | "jsx" | "mjs" | "cjs" => Self::JavaScript,
			"md" | "markdown" => Self::Markdown,
			"mdx" => Self::Mdx,
			_ => Self::Text,
		}
	}

	pub fn from_path(path: &Path) -> Self {
		Self::from_extension(extname(&path.to_string_lossy()))
	}

	/// Whether the language is parsed as a JavaScript/TypeScript module.
	pub fn is_script(self) -> bool {
		matches!(self, Self::TypeScript | Self::Tsx | Self::JavaScript)
	}

	pub fn is_document(self) -> bool {
		matches!(self, Self::Markdown | Self::Mdx)
	}

	fn grammar(self) -> tree_sitter::Language {
		match self {
			Self::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
			// JSX is legal in plain JavaScript files, so they use the TSX grammar.
			_ => tree_sitter_typescript::LANGUAGE_TSX.into(),
		}
	}
}

/// A parsed JavaScript/TypeScript module.
///
/// The module owns its text and syntax tree; every analysis borrows from it
/// and never mutates it.
#[derive(Debug, Clone)]
pub struct Module {
	path: PathBuf,
	text: String,
	tree: Tree,
}

impl Module {
	/// Parse `text` using the grammar selected by the extension of `path`.
	/// Extensions that are not scripts are parsed as TypeScript.
	pub fn parse(path: &Path, text: &str) -> CorpusResult<Self> {
		let language = match Language::from_path(path) {
			language if language.is_script() => language,
			_ => Language::TypeScript,
		};

		let mut parser = Parser::new();
		parser
			.set_language(&language.grammar())
			.map_err(|e| CorpusError::Parse {
				path: path.display().to_string(),
				reason: e.to_string(),
			})?;

		let text = normalize_line_endings(text);
		let tree = parser
			.parse(&text, None)
			.ok_or_else(|| CorpusError::Parse {
				path: path.display().to_string(),
				reason: "the parser produced no syntax tree".to_string(),
			})?;

		Ok(Self {
			path: path.to_path_buf(),
			text,
			tree,
		})
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn text(&self) -> &str {
		&self.text
	}

	pub fn root(&self) -> Node<'_> {
		self.tree.root_node()
	}

	/// Source text of a node of this module.
	pub fn node_text(&self, node: Node<'_>) -> &str {
		&self.text[node.byte_range()]
	}

	/// Classify every top-level statement.
	pub fn items(&self) -> Vec<Item<'_>> {
		named_children(self.root())
			.into_iter()
			.map(|node| classify_statement(self, node))
			.collect()
	}

	/// Every top-level declaration, exported or not.
	pub fn declarations(&self) -> Vec<Declaration<'_>> {
		self.items()
			.into_iter()
			.filter_map(|item| match item {
				Item::Declaration(declaration) => Some(declaration),
				_ => None,
			})
			.collect()
	}

	/// The local binding behind an exported name. An export list alias
	/// (`export { local as name }`) resolves to `local`; any other name is
	/// returned unchanged.
	pub fn local_name(&self, name: &str) -> String {
		self.items()
			.into_iter()
			.find_map(|item| match item {
				Item::ExportList { specifiers, .. } => specifiers
					.into_iter()
					.find(|specifier| specifier.exported == name)
					.map(|specifier| specifier.local),
				_ => None,
			})
			.unwrap_or_else(|| name.to_string())
	}

	/// Find the declaration binding `name` at the top level, following export
	/// list aliases. `default` finds the `export default` declaration.
	pub fn find_declaration(&self, name: &str) -> Option<Declaration<'_>> {
		let local = self.local_name(name);
		self.declarations().into_iter().find(|declaration| {
			declaration.names.iter().any(|declared| *declared == local)
				|| (declaration.default_export && local == "default")
		})
	}

	/// Every name this module exports, in source order.
	pub fn exports(&self) -> Vec<ExportInfo> {
		let items = self.items();
		let imported: HashSet<String> = items
			.iter()
			.filter_map(|item| match item {
				Item::Import(import) => Some(import.specifiers.iter().map(|specifier| specifier.local.clone())),
				_ => None,
			})
			.flatten()
			.collect();
		let mut exports = Vec::new();

		for item in items {
			match item {
				Item::Declaration(declaration) if declaration.exported => {
					let line = declaration.statement.start_position().row + 1;
					if declaration.default_export {
						exports.push(ExportInfo {
							name: "default".to_string(),
							kind: declaration.kind,
							line,
						});
					} else {
						for name in &declaration.names {
							exports.push(ExportInfo {
								name: name.clone(),
								kind: declaration.kind,
								line,
							});
						}
					}
				}
				Item::ExportList { node, specifiers } => {
					for specifier in specifiers {
						// An imported binding listed in `export { … }` forwards
						// another module's export.
						let kind = match self.find_declaration(&specifier.local) {
							Some(declaration) => declaration.kind,
							None if imported.contains(&specifier.local) => DeclarationKind::ReExport,
							None => DeclarationKind::Other,
						};
						exports.push(ExportInfo {
							name: specifier.exported,
							kind,
							line: node.start_position().row + 1,
						});
					}
				}
				Item::ReExport { node, names } => {
					for name in names {
						exports.push(ExportInfo {
							name,
							kind: DeclarationKind::ReExport,
							line: node.start_position().row + 1,
						});
					}
				}
				_ => {}
			}
		}

		exports
	}
}

/// The named children of a node, collected so callers can keep borrowing the
/// node freely.
pub(crate) fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
	let mut cursor = node.walk();
	node.named_children(&mut cursor).collect()
}

/// What kind of declaration a top-level statement introduces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeclarationKind {
	Function,
	Class,
	Variable,
	Interface,
	TypeAlias,
	Enum,
	Namespace,
	ReExport,
	Other,
}

/// A top-level declaration.
#[derive(Debug, Clone)]
pub struct Declaration<'tree> {
	/// The top-level statement, which is an `export_statement` for exported
	/// declarations.
	pub statement: Node<'tree>,
	/// The declaration itself, or the exported value of `export default`.
	pub node: Node<'tree>,
	pub kind: DeclarationKind,
	/// Bindings introduced at module scope.
	pub names: Vec<String>,
	pub exported: bool,
	pub default_export: bool,
}

/// One specifier of an import declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpecifier {
	/// The exported name in the source module (`default` for default
	/// imports, `*` for namespace imports).
	pub imported: String,
	/// The local binding.
	pub local: String,
	/// Source text of the specifier.
	pub text: String,
}

/// A parsed import declaration.
#[derive(Debug, Clone)]
pub struct ImportDeclaration<'tree> {
	pub node: Node<'tree>,
	pub source: String,
	pub specifiers: Vec<ImportSpecifier>,
	pub type_only: bool,
}

/// One entry of an `export { … }` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSpecifier {
	pub local: String,
	pub exported: String,
}

/// A classified top-level statement.
#[derive(Debug, Clone)]
pub enum Item<'tree> {
	Import(ImportDeclaration<'tree>),
	/// `export … from '…'` and `export * from '…'`.
	ReExport {
		node: Node<'tree>,
		names: Vec<String>,
	},
	/// `export { a, b as c }` without a source module.
	ExportList {
		node: Node<'tree>,
		specifiers: Vec<ExportSpecifier>,
	},
	Declaration(Declaration<'tree>),
	Comment(Node<'tree>),
	/// Expression statements and anything else that declares nothing.
	Other(Node<'tree>),
}

/// A name exported by a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportInfo {
	pub name: String,
	pub kind: DeclarationKind,
	/// 1-indexed line of the exporting statement.
	pub line: usize,
}

fn classify_statement<'tree>(module: &Module, node: Node<'tree>) -> Item<'tree> {
	match node.kind() {
		"comment" => Item::Comment(node),
		"import_statement" => Item::Import(parse_import(module, node)),
		"export_statement" => classify_export(module, node),
		_ => match declaration_kind(node) {
			Some(kind) => Item::Declaration(Declaration {
				statement: node,
				node,
				kind,
				names: declared_names(module, node),
				exported: false,
				default_export: false,
			}),
			None => Item::Other(node),
		},
	}
}

fn classify_export<'tree>(module: &Module, node: Node<'tree>) -> Item<'tree> {
	let children = named_children(node);

	if node.child_by_field_name("source").is_some() {
		let names = children
			.iter()
			.flat_map(|child| match child.kind() {
				"export_clause" => export_specifiers(module, *child)
					.into_iter()
					.map(|specifier| specifier.exported)
					.collect(),
				"namespace_export" => named_children(*child)
					.into_iter()
					.filter(|grandchild| matches!(grandchild.kind(), "identifier" | "string"))
					.map(|grandchild| unquote(module.node_text(grandchild)))
					.collect(),
				_ => Vec::new(),
			})
			.collect();
		return Item::ReExport { node, names };
	}

	if let Some(declaration) = node.child_by_field_name("declaration") {
		let is_default = has_default_keyword(node);
		return Item::Declaration(Declaration {
			statement: node,
			node: declaration,
			kind: declaration_kind(declaration).unwrap_or(DeclarationKind::Other),
			names: declared_names(module, declaration),
			exported: true,
			default_export: is_default,
		});
	}

	if let Some(value) = node.child_by_field_name("value") {
		let (kind, names) = match value.kind() {
			"function_expression" | "function" | "arrow_function" | "generator_function" => {
				(DeclarationKind::Function, optional_name(module, value))
			}
			"class" => (DeclarationKind::Class, optional_name(module, value)),
			_ => (DeclarationKind::Other, Vec::new()),
		};
		return Item::Declaration(Declaration {
			statement: node,
			node: value,
			kind,
			names,
			exported: true,
			default_export: true,
		});
	}

	if let Some(clause) = children.iter().find(|child| child.kind() == "export_clause") {
		return Item::ExportList {
			node,
			specifiers: export_specifiers(module, *clause),
		};
	}

	Item::Other(node)
}

fn has_default_keyword(node: Node<'_>) -> bool {
	let mut cursor = node.walk();
	let found = node
		.children(&mut cursor)
		.any(|child| !child.is_named() && child.kind() == "default");
	found
}

fn optional_name(module: &Module, node: Node<'_>) -> Vec<String> {
	node.child_by_field_name("name")
		.map(|name| vec![module.node_text(name).to_string()])
		.unwrap_or_default()
}

fn export_specifiers(module: &Module, clause: Node<'_>) -> Vec<ExportSpecifier> {
	named_children(clause)
		.into_iter()
		.filter(|child| child.kind() == "export_specifier")
		.filter_map(|specifier| {
			let local = specifier.child_by_field_name("name")?;
			let local = unquote(module.node_text(local));
			let exported = specifier
				.child_by_field_name("alias")
				.map_or_else(|| local.clone(), |alias| unquote(module.node_text(alias)));
			Some(ExportSpecifier { local, exported })
		})
		.collect()
}

fn parse_import<'tree>(module: &Module, node: Node<'tree>) -> ImportDeclaration<'tree> {
	let source = node
		.child_by_field_name("source")
		.map(|source| unquote(module.node_text(source)))
		.unwrap_or_default();
	let type_only = {
		let mut cursor = node.walk();
		let found = node
			.children(&mut cursor)
			.any(|child| !child.is_named() && child.kind() == "type");
		found
	};

	let mut specifiers = Vec::new();
	for clause in named_children(node)
		.into_iter()
		.filter(|child| child.kind() == "import_clause")
	{
		for part in named_children(clause) {
			match part.kind() {
				"identifier" => {
					let local = module.node_text(part).to_string();
					specifiers.push(ImportSpecifier {
						imported: "default".to_string(),
						text: local.clone(),
						local,
					});
				}
				"namespace_import" => {
					if let Some(name) = named_children(part)
						.into_iter()
						.find(|child| child.kind() == "identifier")
					{
						specifiers.push(ImportSpecifier {
							imported: "*".to_string(),
							local: module.node_text(name).to_string(),
							text: module.node_text(part).to_string(),
						});
					}
				}
				"named_imports" => {
					for specifier in named_children(part)
						.into_iter()
						.filter(|child| child.kind() == "import_specifier")
					{
						let Some(name) = specifier.child_by_field_name("name") else {
							continue;
						};
						let imported = unquote(module.node_text(name));
						let local = specifier
							.child_by_field_name("alias")
							.map_or_else(|| imported.clone(), |alias| module.node_text(alias).to_string());
						specifiers.push(ImportSpecifier {
							imported,
							local,
							text: module.node_text(specifier).to_string(),
						});
					}
				}
				_ => {}
			}
		}
	}

	ImportDeclaration {
		node,
		source,
		specifiers,
		type_only,
	}
}

fn declaration_kind(node: Node<'_>) -> Option<DeclarationKind> {
	let kind = match node.kind() {
		"function_declaration" | "generator_function_declaration" | "function_signature" => {
			DeclarationKind::Function
		}
		"class_declaration" | "abstract_class_declaration" => DeclarationKind::Class,
		"lexical_declaration" | "variable_declaration" => DeclarationKind::Variable,
		"interface_declaration" => DeclarationKind::Interface,
		"type_alias_declaration" => DeclarationKind::TypeAlias,
		"enum_declaration" => DeclarationKind::Enum,
		"module" | "internal_module" => DeclarationKind::Namespace,
		"ambient_declaration" => {
			return named_children(node)
				.into_iter()
				.find_map(declaration_kind)
				.or(Some(DeclarationKind::Other));
		}
		_ => return None,
	};
	Some(kind)
}

/// Module-scope bindings introduced by a declaration node.
pub(crate) fn declared_names(module: &Module, node: Node<'_>) -> Vec<String> {
	match node.kind() {
		"lexical_declaration" | "variable_declaration" => named_children(node)
			.into_iter()
			.filter(|child| child.kind() == "variable_declarator")
			.filter_map(|declarator| declarator.child_by_field_name("name"))
			.flat_map(|pattern| pattern_names(module, pattern))
			.collect(),
		"ambient_declaration" => named_children(node)
			.into_iter()
			.flat_map(|child| declared_names(module, child))
			.collect(),
		_ => node
			.child_by_field_name("name")
			.map(|name| vec![module.node_text(name).to_string()])
			.unwrap_or_default(),
	}
}

/// Identifiers bound by a binding pattern such as `{ a, b: [c] }`.
fn pattern_names(module: &Module, pattern: Node<'_>) -> Vec<String> {
	match pattern.kind() {
		"identifier" | "shorthand_property_identifier_pattern" => {
			vec![module.node_text(pattern).to_string()]
		}
		"pair_pattern" => pattern
			.child_by_field_name("value")
			.map(|value| pattern_names(module, value))
			.unwrap_or_default(),
		"object_assignment_pattern" | "assignment_pattern" => pattern
			.child_by_field_name("left")
			.map(|left| pattern_names(module, left))
			.unwrap_or_default(),
		_ => named_children(pattern)
			.into_iter()
			.flat_map(|child| pattern_names(module, child))
			.collect(),
	}
}

/// Remove surrounding quotes from a string literal's source text.
pub(crate) fn unquote(text: &str) -> String {
	let trimmed = text.trim();
	for quote in ['"', '\'', '`'] {
		if let Some(inner) = trimmed
			.strip_prefix(quote)
			.and_then(|rest| rest.strip_suffix(quote))
		{
			return inner.to_string();
		}
	}
	trimmed.to_string()
}

/// A request for [`analyze_source_text`].
#[derive(Debug, Clone, Default)]
pub struct AnalysisRequest {
	/// A tracked (or on-disk) file to analyze.
	pub path: Option<PathBuf>,
	/// Inline text to analyze instead of the file's contents.
	pub text: Option<String>,
	/// Overrides the language derived from `path`.
	pub language: Option<Language>,
	/// Include the export closure of every export.
	pub include_closures: bool,
}

impl AnalysisRequest {
	pub fn for_path(path: impl Into<PathBuf>) -> Self {
		Self {
			path: Some(path.into()),
			..Self::default()
		}
	}

	pub fn for_text(text: impl Into<String>, language: Language) -> Self {
		Self {
			text: Some(text.into()),
			language: Some(language),
			..Self::default()
		}
	}

	#[must_use]
	pub fn with_closures(mut self) -> Self {
		self.include_closures = true;
		self
	}
}

/// Documentation extracted for one export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportAnalysis {
	pub name: String,
	pub kind: DeclarationKind,
	pub line: usize,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub metadata: Option<DocMetadata>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub closure: Option<String>,
}

/// Headings, sections and front matter of a Markdown/MDX document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentAnalysis {
	pub headings: Vec<Heading>,
	pub sections: Vec<Section>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub front_matter: Option<serde_json::Value>,
}

/// The result of [`analyze_source_text`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Analysis {
	Module { exports: Vec<ExportAnalysis> },
	Document(DocumentAnalysis),
	Text { text: String },
}

/// Analyze a file or snippet.
///
/// Waits for every in-flight project refresh to settle first, so the result
/// reflects the most recently observed filesystem state, then dispatches on
/// the content kind.
pub async fn analyze_source_text(
	project: &Project,
	request: AnalysisRequest,
) -> CorpusResult<Analysis> {
	project.barrier().settled().await;

	let path = request
		.path
		.clone()
		.map(|path| project.resolve(&path))
		.unwrap_or_else(|| PathBuf::from("snippet.tsx"));
	let language = request
		.language
		.unwrap_or_else(|| Language::from_path(&path));

	let text = match (&request.text, project.file(&path)) {
		(Some(text), _) => text.clone(),
		(None, Some(file)) => file.text.clone(),
		(None, None) => normalize_line_endings(&tokio::fs::read_to_string(&path).await?),
	};

	tracing::debug!(path = %path.display(), ?language, "analyzing source text");

	if language.is_script() {
		let path = if Language::from_path(&path) == language {
			path
		} else {
			path.with_extension(script_extension(language))
		};
		let module = Module::parse(&path, &text)?;
		return Ok(Analysis::Module {
			exports: analyze_module(&module, request.include_closures)?,
		});
	}

	if language.is_document() {
		let headings = extract_headings(&text, language == Language::Mdx)?;
		let sections = build_section_tree(&headings);
		return Ok(Analysis::Document(DocumentAnalysis {
			headings,
			sections,
			front_matter: parse_front_matter(&text)?,
		}));
	}

	Ok(Analysis::Text { text })
}

fn script_extension(language: Language) -> &'static str {
	match language {
		Language::Tsx => "tsx",
		Language::JavaScript => "js",
		_ => "ts",
	}
}

/// Describe every export of a module.
pub fn analyze_module(module: &Module, include_closures: bool) -> CorpusResult<Vec<ExportAnalysis>> {
	module
		.exports()
		.into_iter()
		.map(|export| {
			let is_reexport = export.kind == DeclarationKind::ReExport;
			let closure = if include_closures && !is_reexport {
				Some(extract_export_closure(module, &export.name)?)
			} else {
				None
			};
			let (description, metadata) = if is_reexport {
				(None, None)
			} else {
				(
					describe_symbol(module, &export.name),
					parse_doc_metadata(module, &export.name),
				)
			};

			Ok(ExportAnalysis {
				name: export.name,
				kind: export.kind,
				line: export.line,
				description,
				metadata,
				closure,
			})
		})
		.collect()
}
