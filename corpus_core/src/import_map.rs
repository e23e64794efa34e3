use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::Path;
use std::path::PathBuf;

use globset::GlobBuilder;
use ignore::WalkBuilder;
use serde::Serialize;

use crate::CorpusError;
use crate::CorpusResult;
use crate::discovery::discover_collection_configurations;
use crate::paths::extname;
use crate::paths::glob_parent;
use crate::paths::normalize_separators;
use crate::project::Project;
use crate::project::is_ignored_directory_name;

/// A lazy import of every file with one extension below a glob parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportMapEntry {
	/// Extension with the leading dot.
	pub extension: String,
	/// Absolute static prefix of the pattern.
	pub glob_parent: PathBuf,
	/// JavaScript source of `(slug) => import(…)`.
	pub source: String,
}

/// The files matched by a collection pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobMatches {
	/// Directory the pattern is relative to.
	pub base: PathBuf,
	/// Absolute static prefix of the pattern.
	pub parent: PathBuf,
	/// Matched files, sorted.
	pub files: Vec<PathBuf>,
}

/// Resolve a collection pattern against the filesystem.
///
/// The pattern is relative to the directory of `ts_config_path` when given,
/// otherwise to the project root. Matching is on `/`-separated paths relative
/// to that directory, and `*` never crosses a separator.
pub fn resolve_glob_files(
	project: &Project,
	pattern: &str,
	ts_config_path: Option<&str>,
) -> CorpusResult<GlobMatches> {
	let base = ts_config_path
		.map(|path| project.resolve(Path::new(path)))
		.and_then(|path| path.parent().map(Path::to_path_buf))
		.unwrap_or_else(|| project.root().to_path_buf());

	let normalized = normalize_separators(pattern);
	let relative_pattern = normalized.trim_start_matches("./");
	// A top-level pattern's static prefix is `.`, which is the base itself.
	let parent = match glob_parent(relative_pattern) {
		prefix if prefix == "." => base.clone(),
		prefix => base.join(prefix),
	};

	let matcher = GlobBuilder::new(relative_pattern)
		.literal_separator(true)
		.build()
		.map_err(|e| CorpusError::InvalidGlob {
			pattern: pattern.to_string(),
			reason: e.to_string(),
		})?
		.compile_matcher();

	let mut files = Vec::new();
	if parent.is_dir() {
		let cache_directory = project.cache_directory();
		let walker = WalkBuilder::new(&parent)
			.hidden(true)
			.require_git(false)
			.git_ignore(!project.options().disable_gitignore)
			.filter_entry(move |entry| {
				let name = entry.file_name().to_string_lossy();
				entry.depth() == 0
					|| !(is_ignored_directory_name(&name) || entry.path() == cache_directory)
			})
			.build();

		for entry in walker {
			let entry = entry.map_err(|e| CorpusError::Io(std::io::Error::other(e)))?;
			if !entry.file_type().is_some_and(|kind| kind.is_file()) {
				continue;
			}
			let path = entry.into_path();
			let Ok(relative) = path.strip_prefix(&base) else {
				continue;
			};
			if matcher.is_match(normalize_separators(&relative.to_string_lossy())) {
				files.push(path);
			}
		}
	}
	files.sort();

	Ok(GlobMatches {
		base,
		parent,
		files,
	})
}

/// Compute one lazy import per distinct extension among the files matching
/// `pattern`.
///
/// No matches is a [`CorpusError::NotFound`] in production mode and an empty
/// list otherwise, because files may not exist yet during development.
pub fn resolve_glob_import_string(
	project: &Project,
	pattern: &str,
	ts_config_path: Option<&str>,
) -> CorpusResult<Vec<ImportMapEntry>> {
	let matches = resolve_glob_files(project, pattern, ts_config_path)?;

	if matches.files.is_empty() {
		if project.mode().is_production() {
			return Err(CorpusError::NotFound {
				pattern: pattern.to_string(),
				directory: matches.base.display().to_string(),
			});
		}
		tracing::debug!(pattern, "collection pattern matched no files");
		return Ok(Vec::new());
	}

	let extensions: BTreeSet<&str> = matches
		.files
		.iter()
		.filter_map(|file| file.to_str())
		.map(extname)
		.collect();

	let parent = escape_template(&normalize_separators(&matches.parent.to_string_lossy()));
	Ok(extensions
		.into_iter()
		.map(|extension| ImportMapEntry {
			extension: extension.to_string(),
			glob_parent: matches.parent.clone(),
			source: format!(
				"(slug) => import(`{parent}/${{slug}}{}`)",
				escape_template(extension)
			),
		})
		.collect())
}

/// Escape text for use inside a JavaScript template literal.
fn escape_template(text: &str) -> String {
	text.replace('\\', "\\\\")
		.replace('`', "\\`")
		.replace("${", "\\${")
}

/// Render the import-map module for patterns in sorted order.
pub fn render_import_map_module(maps: &BTreeMap<String, Vec<ImportMapEntry>>) -> String {
	if maps.is_empty() {
		return "export const importMaps = {};\n".to_string();
	}

	let mut output = String::from("export const importMaps = {\n");
	for (pattern, entries) in maps {
		output.push_str(&format!("  {}: {{\n", quote(pattern)));
		for entry in entries {
			output.push_str(&format!("    {}: {},\n", quote(&entry.extension), entry.source));
		}
		output.push_str("  },\n");
	}
	output.push_str("};\n");
	output
}

fn quote(text: &str) -> String {
	serde_json::to_string(text).unwrap_or_else(|_| format!("\"{text}\""))
}

/// The outcome of [`write_collection_import_maps`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportMapWrite {
	pub path: PathBuf,
	/// Whether the file content changed.
	pub changed: bool,
	pub collections: usize,
}

/// Discover every collection, resolve its pattern and write the import-map
/// module. The file is only written when its content differs.
pub fn write_collection_import_maps(project: &Project) -> CorpusResult<ImportMapWrite> {
	let registry = discover_collection_configurations(project)?;

	let mut maps = BTreeMap::new();
	for configuration in registry.iter() {
		let entries = resolve_glob_import_string(
			project,
			&configuration.pattern,
			configuration.options.ts_config_file_path.as_deref(),
		)?;
		maps.insert(configuration.pattern.clone(), entries);
	}

	let content = render_import_map_module(&maps);
	let path = project.import_map_path();
	let changed = !std::fs::read_to_string(&path).is_ok_and(|existing| existing == content);

	if changed {
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		std::fs::write(&path, &content)?;
		tracing::info!(path = %path.display(), collections = maps.len(), "wrote import map");
	}

	Ok(ImportMapWrite {
		path,
		changed,
		collections: maps.len(),
	})
}
