use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;

use crate::CorpusError;
use crate::CorpusResult;
use crate::analysis::Item;
use crate::analysis::Language;
use crate::analysis::Module;
use crate::analysis::named_children;
use crate::discovery::CollectionConfiguration;
use crate::import_map::resolve_glob_files;
use crate::literal::LiteralEvaluator;
use crate::paths::extname;
use crate::project::Project;
use crate::project::normalize_line_endings;
use crate::sections::mdx_module_source;
use crate::sections::parse_front_matter;
use crate::tree::SourceNode;
use crate::tree::compute_order_map;
use crate::tree::compute_pathname_map;
use crate::tree::locale_compare;

/// Metadata keys that could pollute object prototypes in the consuming
/// JavaScript runtime.
const FORBIDDEN_KEYS: &[&str] = &["__proto__", "constructor", "prototype"];

/// One file of a collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionEntry {
	pub path: PathBuf,
	pub pathname: String,
	/// Dot-separated order key, e.g. `01.02`.
	pub order: String,
	pub extension: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub metadata: Option<Value>,
}

/// Load every file of a collection with its pathname, order key and
/// metadata.
///
/// Entries are sorted by the configured `sort` key path, falling back to
/// order keys.
pub fn load_collection(
	project: &Project,
	configuration: &CollectionConfiguration,
) -> CorpusResult<Vec<CollectionEntry>> {
	let options = &configuration.options;
	let matches = resolve_glob_files(project, &configuration.pattern, options.ts_config_file_path.as_deref())?;

	if matches.files.is_empty() && project.mode().is_production() {
		return Err(CorpusError::NotFound {
			pattern: configuration.pattern.clone(),
			directory: matches.base.display().to_string(),
		});
	}

	let tree = SourceNode::from_files(&matches.parent, &matches.files);
	let pathnames = compute_pathname_map(&tree, &options.pathname_options(&matches.base));
	let public: HashSet<PathBuf> = matches.files.iter().cloned().collect();
	let order = compute_order_map(&tree, Some(&public));

	let mut entries = Vec::with_capacity(matches.files.len());
	for path in &matches.files {
		let metadata = read_metadata(project, path)?;

		if let Some(metadata) = &metadata {
			reject_forbidden_keys(metadata, path)?;
		}

		let extension = extname(&path.to_string_lossy()).to_string();
		if let Some(schema) = options.schema_for(&extension) {
			match schema.to_json() {
				Value::Object(shape) => validate_shape(&shape, metadata.as_ref(), path)?,
				_ => {
					tracing::debug!(path = %path.display(), "skipping validation by an opaque schema");
				}
			}
		}

		if let Some(sort) = &options.sort {
			if metadata.is_none() {
				return Err(CorpusError::MissingMetadata {
					pattern: configuration.pattern.clone(),
					sort: sort.clone(),
					file: path.display().to_string(),
				});
			}
		}

		entries.push(CollectionEntry {
			pathname: pathnames.get(path).cloned().unwrap_or_default(),
			order: order.get(path).cloned().unwrap_or_default(),
			path: path.clone(),
			extension,
			metadata,
		});
	}

	match &options.sort {
		Some(sort) => entries.sort_by(|a, b| {
			compare_metadata(a.metadata.as_ref(), b.metadata.as_ref(), sort).then_with(|| a.order.cmp(&b.order))
		}),
		None => entries.sort_by(|a, b| a.order.cmp(&b.order)),
	}

	Ok(entries)
}

/// Read the metadata of a file: YAML front matter for Markdown, an
/// `export const metadata = { … }` literal for modules, and either for MDX
/// (the export wins).
pub fn read_metadata(project: &Project, path: &Path) -> CorpusResult<Option<Value>> {
	let text = match project.file(path) {
		Some(file) => file.text.clone(),
		None => normalize_line_endings(&std::fs::read_to_string(path)?),
	};

	match Language::from_path(path) {
		Language::Markdown => parse_front_matter(&text),
		Language::Mdx => {
			let source = mdx_module_source(&text)?;
			let exported = if source.is_empty() {
				None
			} else {
				metadata_export(&Module::parse(&path.with_extension("tsx"), &source)?)?
			};
			match exported {
				Some(metadata) => Ok(Some(metadata)),
				None => parse_front_matter(&text),
			}
		}
		language if language.is_script() => metadata_export(&Module::parse(path, &text)?),
		_ => Ok(None),
	}
}

/// The literal value of `export const metadata = …`, if the module has one.
pub fn metadata_export(module: &Module) -> CorpusResult<Option<Value>> {
	for item in module.items() {
		let Item::Declaration(declaration) = item else {
			continue;
		};
		if !declaration.exported || !declaration.names.iter().any(|name| name == "metadata") {
			continue;
		}

		let value = named_children(declaration.node)
			.into_iter()
			.filter(|child| child.kind() == "variable_declarator")
			.find(|declarator| {
				declarator
					.child_by_field_name("name")
					.is_some_and(|name| module.node_text(name) == "metadata")
			})
			.and_then(|declarator| declarator.child_by_field_name("value"));

		let Some(value) = value else {
			return Ok(None);
		};

		let literal = LiteralEvaluator::new(module)
			.evaluate(value)
			.map_err(|error| CorpusError::Configuration {
				location: format!("{}:{}:{}", module.path().display(), error.line, error.column),
				message: format!("`metadata` must be a literal: {}", error.message),
			})?;
		return Ok(Some(literal.to_json()));
	}

	Ok(None)
}

fn reject_forbidden_keys(value: &Value, path: &Path) -> CorpusResult<()> {
	match value {
		Value::Object(entries) => {
			for (key, child) in entries {
				if FORBIDDEN_KEYS.contains(&key.as_str()) {
					return Err(CorpusError::Validation(format!(
						"`{}` uses the reserved metadata key `{key}`",
						path.display()
					)));
				}
				reject_forbidden_keys(child, path)?;
			}
			Ok(())
		}
		Value::Array(items) => items.iter().try_for_each(|item| reject_forbidden_keys(item, path)),
		_ => Ok(()),
	}
}

/// Validate metadata against a shape such as `{ "title": "string", "order":
/// "number?" }`.
fn validate_shape(
	shape: &serde_json::Map<String, Value>,
	metadata: Option<&Value>,
	path: &Path,
) -> CorpusResult<()> {
	let empty = serde_json::Map::new();
	let fields = match metadata {
		Some(Value::Object(fields)) => fields,
		None => &empty,
		Some(_) => {
			return Err(CorpusError::Validation(format!(
				"metadata of `{}` must be an object",
				path.display()
			)));
		}
	};

	for (key, expected) in shape {
		let Some(expected) = expected.as_str() else {
			tracing::debug!(key, "skipping non-string schema field");
			continue;
		};
		let (type_name, optional) = match expected.strip_suffix('?') {
			Some(type_name) => (type_name, true),
			None => (expected, false),
		};

		match fields.get(key) {
			None | Some(Value::Null) if optional => {}
			None | Some(Value::Null) => {
				return Err(CorpusError::Validation(format!(
					"`{}` is missing required metadata field `{key}`",
					path.display()
				)));
			}
			Some(value) => {
				if !matches_type(value, type_name)? {
					return Err(CorpusError::Validation(format!(
						"metadata field `{key}` of `{}` must be a {type_name}",
						path.display()
					)));
				}
			}
		}
	}

	Ok(())
}

fn matches_type(value: &Value, type_name: &str) -> CorpusResult<bool> {
	let matches = match type_name {
		"string" => value.is_string(),
		"number" => value.is_number(),
		"boolean" => value.is_boolean(),
		"array" => value.is_array(),
		"object" => value.is_object(),
		"any" | "unknown" => true,
		other => {
			return Err(CorpusError::Validation(format!("unknown schema type `{other}`")));
		}
	};
	Ok(matches)
}

/// Compare two metadata records by a dotted key path. Missing values sort
/// last.
fn compare_metadata(a: Option<&Value>, b: Option<&Value>, sort: &str) -> Ordering {
	let a = a.and_then(|value| lookup(value, sort));
	let b = b.and_then(|value| lookup(value, sort));

	match (a, b) {
		(Some(Value::Number(a)), Some(Value::Number(b))) => a
			.as_f64()
			.partial_cmp(&b.as_f64())
			.unwrap_or(Ordering::Equal),
		(Some(Value::String(a)), Some(Value::String(b))) => locale_compare(a, b),
		(Some(a), Some(b)) => a.to_string().cmp(&b.to_string()),
		(Some(_), None) => Ordering::Less,
		(None, Some(_)) => Ordering::Greater,
		(None, None) => Ordering::Equal,
	}
}

fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
	path.split('.')
		.try_fold(value, |current, key| current.get(key))
		.filter(|value| !value.is_null())
}
