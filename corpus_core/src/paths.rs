use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

/// Default scheme used for editor-openable URIs.
pub const DEFAULT_EDITOR_SCHEME: &str = "vscode";

/// Characters that turn a path segment into a glob segment.
const GLOB_META_CHARS: &[char] = &['*', '?', '[', ']', '{', '}', '(', ')', '!', '+', '@'];

/// Options used when converting a filesystem path into a public pathname.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathnameOptions {
	/// Directory that pathnames are relative to. Relative values are resolved
	/// against the tree root.
	pub base_directory: Option<PathBuf>,
	/// Pathname prefix prepended to every pathname (e.g. `docs`).
	pub base_pathname: Option<String>,
	/// Package name stripped when it is the leading segment.
	pub package_name: Option<String>,
}

/// Replace Windows separators with `/`.
pub fn normalize_separators(path: &str) -> String {
	path.replace('\\', "/")
}

/// Join path fragments with `/`, collapsing repeated separators and trimming
/// a trailing separator. A leading separator on the first fragment is kept.
pub fn join<S: AsRef<str>>(parts: &[S]) -> String {
	let joined = parts
		.iter()
		.map(AsRef::as_ref)
		.filter(|part| !part.is_empty())
		.collect::<Vec<_>>()
		.join("/");

	let mut result = String::with_capacity(joined.len());
	let mut previous_was_separator = false;
	for ch in joined.chars() {
		if ch == '/' {
			if previous_was_separator {
				continue;
			}
			previous_was_separator = true;
		} else {
			previous_was_separator = false;
		}
		result.push(ch);
	}

	if result.len() > 1 && result.ends_with('/') {
		result.pop();
	}

	result
}

/// The extension of the last path segment including the leading dot, or an
/// empty string for dot-files and extensionless names.
pub fn extname(path: &str) -> &str {
	let name_start = path.rfind(['/', '\\']).map_or(0, |index| index + 1);
	let name = &path[name_start..];

	match name.rfind('.') {
		Some(0) | None => "",
		Some(index) => &name[index..],
	}
}

/// The last segment of a path, optionally without its extension.
pub fn basename(path: &str, strip_extension: bool) -> &str {
	let trimmed = path.trim_end_matches(['/', '\\']);
	let name_start = trimmed.rfind(['/', '\\']).map_or(0, |index| index + 1);
	let name = &trimmed[name_start..];

	if strip_extension {
		let extension = extname(name);
		&name[..name.len() - extension.len()]
	} else {
		name
	}
}

/// Strip a numeric ordering prefix such as `01.` or `2-` from a segment. A
/// segment that would become empty is returned unchanged.
pub fn remove_order_prefix(segment: &str) -> &str {
	let digits = segment.bytes().take_while(u8::is_ascii_digit).count();
	if digits == 0 {
		return segment;
	}

	let rest = &segment[digits..];
	match rest.strip_prefix(['.', '-']) {
		Some(stripped) if !stripped.is_empty() => stripped,
		_ => segment,
	}
}

/// Lower-kebab-case a single segment: `GettingStarted` → `getting-started`,
/// `HTMLParser` → `html-parser`, `my_file name` → `my-file-name`.
pub fn to_kebab_case(text: &str) -> String {
	let chars: Vec<char> = text.chars().collect();
	let mut words: Vec<String> = Vec::new();
	let mut current = String::new();

	for (index, &ch) in chars.iter().enumerate() {
		if ch.is_whitespace() || ch == '_' || ch == '-' {
			if !current.is_empty() {
				words.push(std::mem::take(&mut current));
			}
			continue;
		}

		if ch.is_uppercase() && !current.is_empty() {
			let previous = chars[index - 1];
			let next_is_lower = chars.get(index + 1).is_some_and(|next| next.is_lowercase());
			let starts_word = previous.is_lowercase()
				|| previous.is_ascii_digit()
				|| (previous.is_uppercase() && next_is_lower);
			if starts_word {
				words.push(std::mem::take(&mut current));
			}
		}

		current.extend(ch.to_lowercase());
	}

	if !current.is_empty() {
		words.push(current);
	}

	words.join("-")
}

/// Create a URL-safe slug from free text such as a heading.
pub fn create_slug(text: &str) -> String {
	let cleaned: String = text
		.chars()
		.filter(|ch| ch.is_alphanumeric() || ch.is_whitespace() || matches!(ch, '-' | '_'))
		.collect();
	to_kebab_case(&cleaned)
}

/// Compute the public pathname for a path relative to the tree root.
///
/// The extension of a file's final segment is removed, a leading package name
/// and base pathname are stripped, order prefixes are removed, and every
/// remaining segment is kebab-cased. `index` and `readme` files keep their own
/// trailing segment.
pub fn relative_path_to_pathname(relative: &Path, is_file: bool, options: &PathnameOptions) -> String {
	let mut segments: Vec<String> = relative
		.components()
		.filter_map(|component| match component {
			Component::Normal(segment) => Some(segment.to_string_lossy().into_owned()),
			_ => None,
		})
		.collect();

	if is_file {
		if let Some(last) = segments.last_mut() {
			*last = basename(last, true).to_string();
		}
	}

	if let Some(package_name) = &options.package_name {
		if segments.first().is_some_and(|first| first == package_name) {
			segments.remove(0);
		}
	}

	let base_segments: Vec<&str> = options
		.base_pathname
		.as_deref()
		.map(|base| base.split('/').filter(|segment| !segment.is_empty()).collect())
		.unwrap_or_default();

	if !base_segments.is_empty()
		&& segments.len() >= base_segments.len()
		&& segments
			.iter()
			.zip(&base_segments)
			.all(|(segment, base)| segment == base)
	{
		segments.drain(..base_segments.len());
	}

	let slugged = base_segments
		.iter()
		.map(|segment| (*segment).to_string())
		.chain(segments.iter().cloned())
		.map(|segment| to_kebab_case(remove_order_prefix(&segment)))
		.filter(|segment| !segment.is_empty())
		.collect::<Vec<_>>();

	format!("/{}", slugged.join("/"))
}

/// Compute the public pathname of `path` inside a tree rooted at `root`.
pub fn file_path_to_pathname(
	path: &Path,
	root: &Path,
	is_file: bool,
	options: &PathnameOptions,
) -> String {
	let base_directory = options.base_directory.as_ref().map(|base| {
		if base.is_absolute() {
			base.clone()
		} else {
			root.join(base)
		}
	});

	let relative = base_directory
		.as_deref()
		.and_then(|base| path.strip_prefix(base).ok())
		.or_else(|| path.strip_prefix(root).ok())
		.unwrap_or(path);

	relative_path_to_pathname(relative, is_file, options)
}

/// Whether a single pattern segment contains glob syntax.
pub fn is_glob_segment(segment: &str) -> bool {
	segment.contains(GLOB_META_CHARS)
}

/// The static, non-wildcard directory prefix of a glob pattern. A pattern
/// without wildcards resolves to its dirname; an empty prefix becomes `.`.
pub fn glob_parent(pattern: &str) -> String {
	let normalized = normalize_separators(pattern);
	let segments: Vec<&str> = normalized.split('/').collect();
	let static_count = segments
		.iter()
		.position(|segment| is_glob_segment(segment))
		.unwrap_or(segments.len().saturating_sub(1));

	let parent = segments[..static_count].join("/");
	if parent.is_empty() {
		if normalized.starts_with('/') {
			"/".to_string()
		} else {
			".".to_string()
		}
	} else {
		join(&[parent])
	}
}

/// Build an editor-openable URI, e.g. `vscode://file//abs/path.ts:10:2`.
pub fn editor_uri(path: &Path, line: Option<u32>, column: Option<u32>, scheme: Option<&str>) -> String {
	let scheme = scheme.unwrap_or(DEFAULT_EDITOR_SCHEME);
	let path = normalize_separators(&path.to_string_lossy());
	format!(
		"{scheme}://file/{path}:{}:{}",
		line.unwrap_or(0),
		column.unwrap_or(0)
	)
}

/// A `/`-separated key for `path` relative to `root`.
pub fn relative_key(root: &Path, path: &Path) -> String {
	let relative = path.strip_prefix(root).unwrap_or(path);
	normalize_separators(&relative.to_string_lossy())
}
