use std::collections::BTreeMap;
use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use ignore::gitignore::Gitignore;
use ignore::gitignore::GitignoreBuilder;
use serde::Serialize;

use crate::CorpusError;
use crate::CorpusResult;
use crate::analysis::Language;
use crate::analysis::Module;
use crate::barrier::RefreshBarrier;
use crate::config::BuildMode;
use crate::config::CONFIG_FILE_CANDIDATES;
use crate::config::CorpusConfig;
use crate::config::DEFAULT_CACHE_DIRECTORY;
use crate::config::DEFAULT_IMPORT_MAP_PATH;
use crate::config::DEFAULT_MAX_FILE_SIZE;
use crate::config::DEFAULT_SERVER_PORT;
use crate::config::EntrypointConfig;

/// Options for controlling how a project is opened and tracked.
///
/// Use [`ProjectOptions::default()`] for sensible defaults or
/// [`ProjectOptions::from_config`] to construct from a [`CorpusConfig`].
#[derive(Debug, Clone)]
pub struct ProjectOptions {
	/// Gitignore-style patterns to exclude from tracking.
	pub exclude_patterns: Vec<String>,
	/// Maximum file size to track in bytes.
	pub max_file_size: u64,
	/// Whether to disable `.gitignore` integration.
	pub disable_gitignore: bool,
	/// Production builds fail on empty collections.
	pub mode: BuildMode,
	/// Build-cache directory relative to the root. Never tracked or watched.
	pub cache_directory: PathBuf,
	/// Output path of the generated import-map module relative to the root.
	pub import_map_path: PathBuf,
	/// Loader modules: watched, never registered as sources.
	pub loader_paths: Vec<PathBuf>,
	/// Where collection declarations are imported from.
	pub entrypoint: EntrypointConfig,
	/// Port of the refresh notification server.
	pub server_port: u16,
}

impl Default for ProjectOptions {
	fn default() -> Self {
		Self {
			exclude_patterns: Vec::new(),
			max_file_size: DEFAULT_MAX_FILE_SIZE,
			disable_gitignore: false,
			mode: BuildMode::Development,
			cache_directory: PathBuf::from(DEFAULT_CACHE_DIRECTORY),
			import_map_path: PathBuf::from(DEFAULT_IMPORT_MAP_PATH),
			loader_paths: Vec::new(),
			entrypoint: EntrypointConfig::default(),
			server_port: DEFAULT_SERVER_PORT,
		}
	}
}

impl ProjectOptions {
	/// Construct [`ProjectOptions`] from a [`CorpusConfig`]. The build mode
	/// falls back to `NODE_ENV` when the config does not set one.
	pub fn from_config(config: Option<&CorpusConfig>) -> Self {
		let defaults = Self::default();
		let Some(config) = config else {
			return Self {
				mode: BuildMode::from_env(),
				..defaults
			};
		};

		Self {
			exclude_patterns: config.exclude.patterns.clone(),
			max_file_size: config.max_file_size,
			disable_gitignore: config.disable_gitignore,
			mode: config.mode.unwrap_or_else(BuildMode::from_env),
			cache_directory: config
				.cache_directory
				.clone()
				.unwrap_or(defaults.cache_directory),
			import_map_path: config
				.import_map
				.clone()
				.unwrap_or(defaults.import_map_path),
			loader_paths: config.loader_paths.clone(),
			entrypoint: config.entrypoint.clone(),
			server_port: config.server.port,
		}
	}
}

/// The in-memory text of one tracked source file.
#[derive(Debug, Clone, Serialize)]
pub struct SourceFile {
	pub path: PathBuf,
	pub text: String,
}

impl SourceFile {
	pub fn language(&self) -> Language {
		Language::from_path(&self.path)
	}

	/// Parse this file as a JavaScript/TypeScript module.
	pub fn module(&self) -> CorpusResult<Module> {
		Module::parse(&self.path, &self.text)
	}
}

/// An open project: the explicit context every analysis, discovery and
/// generation operation is given.
///
/// Lifecycle: [`Project::open`] scans the root and tracks every supported
/// source file, [`Project::refresh`] re-reads one file or the whole tree, and
/// [`Project::close`] drops all tracked state. Every mutation holds a
/// [`RefreshBarrier`] guard so analysis never observes a half-applied edit.
#[derive(Debug)]
pub struct Project {
	root: PathBuf,
	options: ProjectOptions,
	files: RwLock<BTreeMap<PathBuf, Arc<SourceFile>>>,
	barrier: RefreshBarrier,
	closed: AtomicBool,
}

impl Project {
	/// Open a project rooted at `root`.
	pub fn open(root: impl AsRef<Path>, options: ProjectOptions) -> CorpusResult<Self> {
		let root = root.as_ref();
		let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
		let files = load_source_files(&root, &options)?;
		tracing::debug!(root = %root.display(), files = files.len(), "opened project");

		Ok(Self {
			root,
			options,
			files: RwLock::new(files),
			barrier: RefreshBarrier::new(),
			closed: AtomicBool::new(false),
		})
	}

	/// Open a project using the discovered `corpus.toml`, if any.
	pub fn open_with_config(root: impl AsRef<Path>) -> CorpusResult<Self> {
		let root = root.as_ref();
		let config = CorpusConfig::load(root)?;
		Self::open(root, ProjectOptions::from_config(config.as_ref()))
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	pub fn options(&self) -> &ProjectOptions {
		&self.options
	}

	pub fn mode(&self) -> BuildMode {
		self.options.mode
	}

	pub fn barrier(&self) -> &RefreshBarrier {
		&self.barrier
	}

	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::Acquire)
	}

	/// Absolute path of the build-cache directory.
	pub fn cache_directory(&self) -> PathBuf {
		self.resolve(&self.options.cache_directory)
	}

	/// Absolute path of the generated import-map module.
	pub fn import_map_path(&self) -> PathBuf {
		self.resolve(&self.options.import_map_path)
	}

	/// Absolute loader paths.
	pub fn loader_paths(&self) -> Vec<PathBuf> {
		self.options
			.loader_paths
			.iter()
			.map(|path| self.resolve(path))
			.collect()
	}

	pub fn is_loader_path(&self, path: &Path) -> bool {
		self.loader_paths()
			.iter()
			.any(|loader| path == loader || path.starts_with(loader))
	}

	pub fn is_cache_path(&self, path: &Path) -> bool {
		path.starts_with(self.cache_directory())
	}

	/// Resolve a path relative to the project root.
	pub fn resolve(&self, path: &Path) -> PathBuf {
		if path.is_absolute() {
			path.to_path_buf()
		} else {
			self.root.join(path)
		}
	}

	pub fn is_tracked(&self, path: &Path) -> bool {
		self.read_files().contains_key(path)
	}

	/// Paths of all tracked files in sorted order.
	pub fn tracked_paths(&self) -> Vec<PathBuf> {
		self.read_files().keys().cloned().collect()
	}

	pub fn file(&self, path: &Path) -> Option<Arc<SourceFile>> {
		self.read_files().get(path).cloned()
	}

	/// The tracked text of `path`.
	pub fn file_text(&self, path: &Path) -> Option<String> {
		self.file(path).map(|file| file.text.clone())
	}

	/// Parse a tracked file as a module.
	pub fn module(&self, path: &Path) -> CorpusResult<Option<Module>> {
		self.file(path).map(|file| file.module()).transpose()
	}

	/// All tracked files in path order.
	pub fn files(&self) -> Vec<Arc<SourceFile>> {
		self.read_files().values().cloned().collect()
	}

	/// Register a file with the project. Returns `true` when the file was not
	/// tracked before.
	pub async fn add_file(&self, path: &Path) -> CorpusResult<bool> {
		let _guard = self.barrier.begin();
		if self.is_closed() {
			return Ok(false);
		}

		let file = read_source_file(path, self.options.max_file_size).await?;
		let added = self
			.write_files()
			.insert(path.to_path_buf(), Arc::new(file))
			.is_none();
		tracing::debug!(path = %path.display(), added, "registered source file");
		Ok(added)
	}

	/// Unregister a file. Returns `true` when it was tracked.
	pub fn remove_file(&self, path: &Path) -> bool {
		let _guard = self.barrier.begin();
		let removed = self.write_files().remove(path).is_some();
		tracing::debug!(path = %path.display(), removed, "unregistered source file");
		removed
	}

	/// Re-read a single tracked file from disk, or rescan the whole project
	/// when `path` is `None`. A tracked file that no longer exists is
	/// unregistered.
	pub async fn refresh(&self, path: Option<&Path>) -> CorpusResult<()> {
		let _guard = self.barrier.begin();
		if self.is_closed() {
			return Ok(());
		}

		let Some(path) = path else {
			let root = self.root.clone();
			let options = self.options.clone();
			let files = tokio::task::spawn_blocking(move || load_source_files(&root, &options))
				.await
				.map_err(|e| CorpusError::Io(std::io::Error::other(e)))??;
			*self.write_files() = files;
			tracing::debug!(root = %self.root.display(), "refreshed project");
			return Ok(());
		};

		if !self.is_tracked(path) {
			return Ok(());
		}

		if !path.is_file() {
			self.write_files().remove(path);
			return Ok(());
		}

		let file = read_source_file(path, self.options.max_file_size).await?;
		self.write_files()
			.insert(path.to_path_buf(), Arc::new(file));
		tracing::debug!(path = %path.display(), "refreshed source file");
		Ok(())
	}

	/// Drop all tracked state. Later refreshes are no-ops.
	pub fn close(&self) {
		self.closed.store(true, Ordering::Release);
		self.write_files().clear();
	}

	fn read_files(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<PathBuf, Arc<SourceFile>>> {
		self.files.read().unwrap_or_else(PoisonError::into_inner)
	}

	fn write_files(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<PathBuf, Arc<SourceFile>>> {
		self.files.write().unwrap_or_else(PoisonError::into_inner)
	}
}

async fn read_source_file(path: &Path, max_file_size: u64) -> CorpusResult<SourceFile> {
	let metadata = tokio::fs::metadata(path).await?;
	if metadata.len() > max_file_size {
		return Err(CorpusError::FileTooLarge {
			path: path.display().to_string(),
			size: metadata.len(),
			limit: max_file_size,
		});
	}

	let raw = tokio::fs::read_to_string(path).await?;
	Ok(SourceFile {
		path: path.to_path_buf(),
		text: normalize_line_endings(&raw),
	})
}

fn load_source_files(
	root: &Path,
	options: &ProjectOptions,
) -> CorpusResult<BTreeMap<PathBuf, Arc<SourceFile>>> {
	let paths = collect_files(root, options)?;
	let mut files = BTreeMap::new();

	for path in paths {
		let metadata = std::fs::metadata(&path)?;
		if metadata.len() > options.max_file_size {
			return Err(CorpusError::FileTooLarge {
				path: path.display().to_string(),
				size: metadata.len(),
				limit: options.max_file_size,
			});
		}

		let raw = std::fs::read_to_string(&path)?;
		let text = normalize_line_endings(&raw);
		files.insert(path.clone(), Arc::new(SourceFile { path, text }));
	}

	Ok(files)
}

/// Normalize CRLF line endings to LF.
pub fn normalize_line_endings(content: &str) -> String {
	if content.contains('\r') {
		content.replace("\r\n", "\n").replace('\r', "\n")
	} else {
		content.to_string()
	}
}

/// Build a `Gitignore` matcher from exclude patterns. These follow
/// `.gitignore` syntax and are applied on top of any `.gitignore` rules.
fn build_exclude_matcher(root: &Path, patterns: &[String]) -> CorpusResult<Gitignore> {
	let mut builder = GitignoreBuilder::new(root);
	for pattern in patterns {
		builder.add_line(None, pattern).map_err(|e| {
			CorpusError::ConfigParse(format!("invalid exclude pattern `{pattern}`: {e}"))
		})?;
	}
	builder
		.build()
		.map_err(|e| CorpusError::ConfigParse(format!("failed to build exclude rules: {e}")))
}

/// Build a `Gitignore` matcher from the project's `.gitignore` file (if any).
pub(crate) fn build_gitignore(root: &Path) -> Gitignore {
	let mut builder = GitignoreBuilder::new(root);
	let gitignore_path = root.join(".gitignore");
	if gitignore_path.exists() {
		let _ = builder.add(gitignore_path);
	}
	builder.build().unwrap_or_else(|_| Gitignore::empty())
}

/// Collect every supported source file below `root`, sorted.
fn collect_files(root: &Path, options: &ProjectOptions) -> CorpusResult<Vec<PathBuf>> {
	let mut files = Vec::new();
	let mut visited_dirs = HashSet::new();

	let gitignore = if options.disable_gitignore {
		Gitignore::empty()
	} else {
		build_gitignore(root)
	};
	let custom_exclude = build_exclude_matcher(root, &options.exclude_patterns)?;
	let walk = Walk {
		gitignore: &gitignore,
		custom_exclude: &custom_exclude,
		cache_directory: root.join(&options.cache_directory),
	};

	walk.walk_dir(root, &mut files, &mut visited_dirs)?;
	files.sort();
	Ok(files)
}

pub(crate) fn is_ignored_directory_name(name: &str) -> bool {
	name.starts_with('.') || name == "node_modules" || name == "target"
}

fn has_project_config(dir: &Path) -> bool {
	CONFIG_FILE_CANDIDATES
		.iter()
		.any(|candidate| dir.join(candidate).is_file())
}

struct Walk<'a> {
	gitignore: &'a Gitignore,
	custom_exclude: &'a Gitignore,
	cache_directory: PathBuf,
}

impl Walk<'_> {
	fn walk_dir(
		&self,
		dir: &Path,
		files: &mut Vec<PathBuf>,
		visited_dirs: &mut HashSet<PathBuf>,
	) -> CorpusResult<()> {
		if !dir.is_dir() {
			return Ok(());
		}

		// Detect symlink cycles by tracking canonical paths.
		let canonical = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
		if !visited_dirs.insert(canonical) {
			return Err(CorpusError::SymlinkCycle {
				path: dir.display().to_string(),
			});
		}

		for entry in std::fs::read_dir(dir)? {
			let path = entry?.path();

			if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
				if is_ignored_directory_name(name) {
					continue;
				}
			}

			if path == self.cache_directory {
				continue;
			}

			let is_dir = path.is_dir();
			if self.gitignore.matched(&path, is_dir).is_ignore()
				|| self.custom_exclude.matched(&path, is_dir).is_ignore()
			{
				continue;
			}

			if is_dir {
				// Nested directories with their own config are separate projects.
				if has_project_config(&path) {
					continue;
				}
				self.walk_dir(&path, files, visited_dirs)?;
			} else if is_source_file(&path) {
				files.push(path);
			}
		}

		Ok(())
	}
}

/// Check if a file is a source file the project tracks.
pub fn is_source_file(path: &Path) -> bool {
	Language::from_path(path) != Language::Text
}
