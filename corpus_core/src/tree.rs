use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;

use ignore::gitignore::Gitignore;
use serde::Deserialize;
use serde::Serialize;

use crate::CorpusError;
use crate::CorpusResult;
use crate::paths::PathnameOptions;
use crate::paths::extname;
use crate::paths::file_path_to_pathname;
use crate::project::build_gitignore;
use crate::project::is_ignored_directory_name;

/// Whether a [`SourceNode`] is a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
	File,
	Directory,
}

/// One filesystem entry of a source tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceNode {
	/// Absolute path of the entry.
	pub path: PathBuf,
	/// Base name including any extension.
	pub name: String,
	pub kind: NodeKind,
	/// Extension with the leading dot. Empty for directories and
	/// extensionless files.
	pub extension: String,
	/// Child entries, sorted by path. Always empty for files.
	pub children: Vec<SourceNode>,
}

impl SourceNode {
	pub fn file(path: impl Into<PathBuf>) -> Self {
		let path = path.into();
		let name = node_name(&path);
		let extension = extname(&name).to_string();
		Self {
			path,
			name,
			kind: NodeKind::File,
			extension,
			children: Vec::new(),
		}
	}

	pub fn directory(path: impl Into<PathBuf>, mut children: Vec<SourceNode>) -> Self {
		let path = path.into();
		children.sort_by(|a, b| a.path.cmp(&b.path));
		Self {
			name: node_name(&path),
			path,
			kind: NodeKind::Directory,
			extension: String::new(),
			children,
		}
	}

	pub fn is_directory(&self) -> bool {
		self.kind == NodeKind::Directory
	}

	/// Read a directory tree from disk. Hidden entries, `node_modules`,
	/// `target` and paths ignored by the root `.gitignore` are skipped.
	/// Symlinked directories that loop back are reported as
	/// [`CorpusError::SymlinkCycle`].
	pub fn read(root: &Path) -> CorpusResult<Self> {
		let gitignore = build_gitignore(root);
		let mut visited_dirs = HashSet::new();
		read_directory(root, &gitignore, &mut visited_dirs)
	}

	/// Build a tree rooted at `root` containing exactly the given files and
	/// the directories between them and the root. Files outside `root` are
	/// ignored.
	pub fn from_files(root: &Path, files: &[PathBuf]) -> Self {
		let mut relative: Vec<&Path> = files
			.iter()
			.filter_map(|file| file.strip_prefix(root).ok())
			.filter(|file| !file.as_os_str().is_empty())
			.collect();
		relative.sort();
		relative.dedup();
		build_from_relative(root, &relative)
	}

	/// Visit this node and every descendant, parents before children.
	pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a SourceNode)) {
		visit(self);
		for child in &self.children {
			child.walk(visit);
		}
	}

	/// Number of nodes in the tree including this one.
	pub fn len(&self) -> usize {
		1 + self.children.iter().map(SourceNode::len).sum::<usize>()
	}

	pub fn is_empty(&self) -> bool {
		self.children.is_empty()
	}
}

fn node_name(path: &Path) -> String {
	path.file_name()
		.map(|name| name.to_string_lossy().into_owned())
		.unwrap_or_default()
}

fn build_from_relative(path: &Path, relative: &[&Path]) -> SourceNode {
	let mut groups: BTreeMap<String, Vec<&Path>> = BTreeMap::new();
	let mut files: Vec<String> = Vec::new();

	for entry in relative {
		let mut components = entry.components();
		let Some(first) = components.next() else {
			continue;
		};
		let first = first.as_os_str().to_string_lossy().into_owned();
		let rest = components.as_path();
		if rest.as_os_str().is_empty() {
			files.push(first);
		} else {
			groups.entry(first).or_default().push(rest);
		}
	}

	files.retain(|name| !groups.contains_key(name));
	let mut children: Vec<SourceNode> = groups
		.into_iter()
		.map(|(name, rest)| build_from_relative(&path.join(name), &rest))
		.collect();
	children.extend(files.into_iter().map(|name| SourceNode::file(path.join(name))));

	SourceNode::directory(path, children)
}

fn read_directory(
	dir: &Path,
	gitignore: &Gitignore,
	visited_dirs: &mut HashSet<PathBuf>,
) -> CorpusResult<SourceNode> {
	let canonical = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
	if !visited_dirs.insert(canonical) {
		return Err(CorpusError::SymlinkCycle {
			path: dir.display().to_string(),
		});
	}

	let mut children = Vec::new();
	for entry in std::fs::read_dir(dir)? {
		let path = entry?.path();
		let name = node_name(&path);
		let is_dir = path.is_dir();

		if is_ignored_directory_name(&name) {
			continue;
		}

		if gitignore.matched(&path, is_dir).is_ignore() {
			continue;
		}

		if is_dir {
			children.push(read_directory(&path, gitignore, visited_dirs)?);
		} else {
			children.push(SourceNode::file(path));
		}
	}

	Ok(SourceNode::directory(dir, children))
}

/// Map every node of the tree (directories included) to its pathname.
pub fn compute_pathname_map(
	root: &SourceNode,
	options: &PathnameOptions,
) -> BTreeMap<PathBuf, String> {
	let mut pathnames = BTreeMap::new();
	root.walk(&mut |node| {
		let pathname = file_path_to_pathname(
			&node.path,
			&root.path,
			node.kind == NodeKind::File,
			options,
		);
		pathnames.insert(node.path.clone(), pathname);
	});
	pathnames
}

/// Map every ordered node below `root` to a dot-separated order key such as
/// `01.02`. When `public_paths` is provided only files in it are ordered;
/// directories are always ordered.
pub fn compute_order_map(
	root: &SourceNode,
	public_paths: Option<&HashSet<PathBuf>>,
) -> BTreeMap<PathBuf, String> {
	let mut order = BTreeMap::new();
	assign_order(root, "", public_paths, &mut order);
	order
}

fn assign_order(
	directory: &SourceNode,
	parent_key: &str,
	public_paths: Option<&HashSet<PathBuf>>,
	order: &mut BTreeMap<PathBuf, String>,
) {
	let mut entries: Vec<&SourceNode> = directory
		.children
		.iter()
		.filter(|child| {
			child.is_directory() || public_paths.is_none_or(|allowed| allowed.contains(&child.path))
		})
		.collect();
	entries.sort_by(|a, b| locale_compare(&a.name, &b.name));

	for (index, entry) in entries.into_iter().enumerate() {
		let local = format!("{:02}", index + 1);
		let key = if parent_key.is_empty() {
			local
		} else {
			format!("{parent_key}.{local}")
		};

		if entry.is_directory() {
			assign_order(entry, &key, public_paths, order);
		}
		order.insert(entry.path.clone(), key);
	}
}

/// Compare two names the way a locale-aware collator would for plain file
/// names: case-insensitively first, lowercase before uppercase on ties, then
/// by raw bytes.
pub fn locale_compare(a: &str, b: &str) -> Ordering {
	let folded = a.to_lowercase().cmp(&b.to_lowercase());
	if folded != Ordering::Equal {
		return folded;
	}

	for (left, right) in a.chars().zip(b.chars()) {
		if left == right {
			continue;
		}
		match (left.is_lowercase(), right.is_lowercase()) {
			(true, false) => return Ordering::Less,
			(false, true) => return Ordering::Greater,
			_ => {}
		}
	}

	a.cmp(b)
}
