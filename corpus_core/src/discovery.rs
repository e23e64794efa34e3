use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::path::PathBuf;

use serde::Serialize;
use tree_sitter::Node;

use crate::CorpusError;
use crate::CorpusResult;
use crate::analysis::Item;
use crate::analysis::Module;
use crate::analysis::named_children;
use crate::config::EntrypointConfig;
use crate::literal::Literal;
use crate::literal::LiteralError;
use crate::literal::LiteralEvaluator;
use crate::paths::PathnameOptions;
use crate::project::Project;

/// Option keys whose values may contain functions.
const OPAQUE_OPTION_KEYS: &[&str] = &["schema", "loader", "loaders", "importMap"];

/// Option keys understood by collection discovery.
const KNOWN_OPTION_KEYS: &[&str] = &[
	"baseDirectory",
	"basePath",
	"basePathname",
	"packageName",
	"schema",
	"loader",
	"loaders",
	"importMap",
	"sort",
	"tsConfigFilePath",
];

/// Where a collection was declared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallSite {
	pub file: PathBuf,
	/// 1-indexed.
	pub line: usize,
	/// 1-indexed.
	pub column: usize,
}

impl fmt::Display for CallSite {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}:{}", self.file.display(), self.line, self.column)
	}
}

/// The literal options of a collection declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionOptions {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub base_directory: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub base_path: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub package_name: Option<String>,
	/// Dotted key path into each entry's metadata.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub sort: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub ts_config_file_path: Option<String>,
	/// Either one validator for every extension or an object keyed by
	/// extension.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub schema: Option<Literal>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub loader: Option<Literal>,
}

impl CollectionOptions {
	fn from_literal(value: &Literal, site: &CallSite) -> CorpusResult<Self> {
		let Some(entries) = value.as_object() else {
			return Err(configuration_error(site, "the collection options must be an object literal"));
		};

		for key in entries.keys() {
			if !KNOWN_OPTION_KEYS.contains(&key.as_str()) {
				tracing::warn!(call_site = %site, key, "unknown collection option");
			}
		}

		let string = |key: &str| -> CorpusResult<Option<String>> {
			match entries.get(key) {
				None | Some(Literal::Null) => Ok(None),
				Some(Literal::String(value)) => Ok(Some(value.clone())),
				Some(_) => Err(configuration_error(site, format!("option `{key}` must be a string"))),
			}
		};

		Ok(Self {
			base_directory: string("baseDirectory")?,
			base_path: string("basePath")?.or(string("basePathname")?),
			package_name: string("packageName")?,
			sort: string("sort")?,
			ts_config_file_path: string("tsConfigFilePath")?,
			schema: entries.get("schema").cloned(),
			loader: entries
				.get("loader")
				.or_else(|| entries.get("loaders"))
				.or_else(|| entries.get("importMap"))
				.cloned(),
		})
	}

	/// Pathname options with `baseDirectory` resolved against `base`, the
	/// directory the collection's pattern is relative to.
	pub fn pathname_options(&self, base: &Path) -> PathnameOptions {
		PathnameOptions {
			base_directory: self.base_directory.as_ref().map(|directory| base.join(directory)),
			base_pathname: self.base_path.clone(),
			package_name: self.package_name.clone(),
		}
	}

	/// The schema applying to files with `extension` (with or without the
	/// leading dot).
	pub fn schema_for(&self, extension: &str) -> Option<&Literal> {
		select_by_extension(self.schema.as_ref()?, extension)
	}
}

/// Select the value for `extension` from an object keyed by extension, or
/// return the value itself when it is not such an object.
fn select_by_extension<'a>(value: &'a Literal, extension: &str) -> Option<&'a Literal> {
	let bare = extension.trim_start_matches('.');
	match value {
		Literal::Object(entries) if entries.keys().any(|key| key.starts_with('.') || is_extension_key(key)) => {
			entries
				.get(bare)
				.or_else(|| entries.get(&format!(".{bare}")))
		}
		other => Some(other),
	}
}

fn is_extension_key(key: &str) -> bool {
	matches!(key, "ts" | "tsx" | "js" | "jsx" | "mjs" | "cjs" | "mts" | "cts" | "md" | "mdx" | "markdown")
}

/// One discovered collection declaration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionConfiguration {
	pub pattern: String,
	pub options: CollectionOptions,
	pub call_site: CallSite,
}

/// Collection configurations keyed by pattern.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CollectionRegistry {
	configurations: BTreeMap<String, CollectionConfiguration>,
}

impl CollectionRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Register a configuration. A repeated pattern replaces the earlier
	/// registration and logs a warning naming both call sites.
	pub fn register(&mut self, configuration: CollectionConfiguration) {
		if let Some(previous) = self.configurations.get(&configuration.pattern) {
			tracing::warn!(
				pattern = %configuration.pattern,
				previous = %previous.call_site,
				current = %configuration.call_site,
				"collection pattern declared more than once; the last declaration wins"
			);
		}
		self.configurations
			.insert(configuration.pattern.clone(), configuration);
	}

	pub fn get(&self, pattern: &str) -> Option<&CollectionConfiguration> {
		self.configurations.get(pattern)
	}

	/// Configurations in pattern order.
	pub fn iter(&self) -> impl Iterator<Item = &CollectionConfiguration> {
		self.configurations.values()
	}

	pub fn patterns(&self) -> Vec<&str> {
		self.configurations.keys().map(String::as_str).collect()
	}

	pub fn len(&self) -> usize {
		self.configurations.len()
	}

	pub fn is_empty(&self) -> bool {
		self.configurations.is_empty()
	}
}

/// Find every collection declaration across the project's tracked modules.
///
/// Files are visited in path order and calls in document order, so the
/// "last declaration wins" rule for repeated patterns is deterministic.
pub fn discover_collection_configurations(project: &Project) -> CorpusResult<CollectionRegistry> {
	let entrypoint = &project.options().entrypoint;
	let mut registry = CollectionRegistry::new();

	for file in project.files() {
		if !file.language().is_script() || !file.text.contains(entrypoint.module.as_str()) {
			continue;
		}

		let module = file.module()?;
		for configuration in find_collection_calls(&module, entrypoint)? {
			registry.register(configuration);
		}
	}

	tracing::debug!(collections = registry.len(), "discovered collection configurations");
	Ok(registry)
}

/// Collection declarations made by a single module.
pub fn find_collection_calls(
	module: &Module,
	entrypoint: &EntrypointConfig,
) -> CorpusResult<Vec<CollectionConfiguration>> {
	let bindings = entrypoint_bindings(module, entrypoint);
	if bindings.is_empty() {
		return Ok(Vec::new());
	}

	let mut calls = Vec::new();
	collect_calls(module, module.root(), &bindings, &entrypoint.export, &mut calls);

	calls
		.into_iter()
		.map(|call| parse_call(module, call))
		.collect()
}

/// How the entry-point function is reachable in a module.
#[derive(Debug, PartialEq, Eq)]
enum Binding {
	/// `import { createCollection as local } from "corpus"`
	Direct(String),
	/// `import * as namespace from "corpus"`
	Namespace(String),
}

fn entrypoint_bindings(module: &Module, entrypoint: &EntrypointConfig) -> Vec<Binding> {
	module
		.items()
		.into_iter()
		.filter_map(|item| match item {
			Item::Import(import) if import.source == entrypoint.module => Some(import.specifiers),
			_ => None,
		})
		.flatten()
		.filter_map(|specifier| {
			if specifier.imported == "*" {
				Some(Binding::Namespace(specifier.local))
			} else if specifier.imported == entrypoint.export {
				Some(Binding::Direct(specifier.local))
			} else {
				None
			}
		})
		.collect()
}

fn collect_calls<'tree>(
	module: &Module,
	node: Node<'tree>,
	bindings: &[Binding],
	export: &str,
	calls: &mut Vec<Node<'tree>>,
) {
	if node.kind() == "call_expression" && is_entrypoint_callee(module, node, bindings, export) {
		calls.push(node);
	}

	for child in named_children(node) {
		collect_calls(module, child, bindings, export, calls);
	}
}

fn is_entrypoint_callee(module: &Module, call: Node<'_>, bindings: &[Binding], export: &str) -> bool {
	let Some(callee) = call.child_by_field_name("function") else {
		return false;
	};

	match callee.kind() {
		"identifier" => {
			let name = module.node_text(callee);
			bindings
				.iter()
				.any(|binding| matches!(binding, Binding::Direct(local) if local == name))
		}
		"member_expression" => {
			let object = callee
				.child_by_field_name("object")
				.map(|object| module.node_text(object));
			let property = callee
				.child_by_field_name("property")
				.map(|property| module.node_text(property));
			property == Some(export)
				&& bindings.iter().any(|binding| {
					matches!(binding, Binding::Namespace(namespace) if object == Some(namespace.as_str()))
				})
		}
		_ => false,
	}
}

fn parse_call(module: &Module, call: Node<'_>) -> CorpusResult<CollectionConfiguration> {
	let position = call.start_position();
	let call_site = CallSite {
		file: module.path().to_path_buf(),
		line: position.row + 1,
		column: position.column + 1,
	};

	let arguments: Vec<Node<'_>> = call
		.child_by_field_name("arguments")
		.map(named_children)
		.unwrap_or_default()
		.into_iter()
		.filter(|argument| argument.kind() != "comment")
		.collect();

	let evaluator = LiteralEvaluator::new(module).with_opaque_keys(OPAQUE_OPTION_KEYS);

	let Some(pattern_node) = arguments.first() else {
		return Err(configuration_error(&call_site, "the first argument must be a glob pattern string"));
	};
	if !matches!(pattern_node.kind(), "string" | "template_string") {
		return Err(configuration_error(
			&call_site,
			format!(
				"the first argument must be a string literal, found `{}`",
				module.node_text(*pattern_node)
			),
		));
	}
	let pattern = match evaluator.evaluate(*pattern_node) {
		Ok(Literal::String(pattern)) => pattern,
		Ok(_) => {
			return Err(configuration_error(&call_site, "the first argument must be a string literal"));
		}
		Err(error) => return Err(literal_error(module, &error)),
	};

	let options = match arguments.get(1) {
		None => CollectionOptions::default(),
		Some(node) if node.kind() != "object" => {
			return Err(configuration_error(
				&call_site,
				format!(
					"the second argument must be an object literal, found `{}`",
					module.node_text(*node)
				),
			));
		}
		Some(node) => {
			let value = evaluator
				.evaluate(*node)
				.map_err(|error| literal_error(module, &error))?;
			CollectionOptions::from_literal(&value, &call_site)?
		}
	};

	Ok(CollectionConfiguration {
		pattern,
		options,
		call_site,
	})
}

fn configuration_error(site: &CallSite, message: impl Into<String>) -> CorpusError {
	CorpusError::Configuration {
		location: site.to_string(),
		message: message.into(),
	}
}

fn literal_error(module: &Module, error: &LiteralError) -> CorpusError {
	CorpusError::Configuration {
		location: format!("{}:{}:{}", module.path().display(), error.line, error.column),
		message: error.message.clone(),
	}
}
