use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::CorpusError;
use crate::CorpusResult;

/// Default maximum file size in bytes (10 MB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Supported config file locations in discovery order (highest precedence
/// first).
pub const CONFIG_FILE_CANDIDATES: [&str; 3] = ["corpus.toml", ".corpus.toml", ".config/corpus.toml"];

/// Default build-cache directory, relative to the project root.
pub const DEFAULT_CACHE_DIRECTORY: &str = ".corpus";

/// Default location of the generated import-map module, relative to the
/// project root.
pub const DEFAULT_IMPORT_MAP_PATH: &str = ".corpus/import-map.js";

/// Module specifier that exports the collection declaration function.
pub const DEFAULT_ENTRYPOINT_MODULE: &str = "corpus";

/// Name of the collection declaration function.
pub const DEFAULT_ENTRYPOINT_EXPORT: &str = "createCollection";

/// Default port of the refresh notification server.
pub const DEFAULT_SERVER_PORT: u16 = 5996;

/// Whether the project is being built for production or developed locally.
///
/// Production builds fail when a collection matches no files; development
/// tolerates empty collections because files may not exist yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
	#[default]
	Development,
	Production,
}

impl BuildMode {
	/// Read the mode from `NODE_ENV`, defaulting to development.
	pub fn from_env() -> Self {
		match std::env::var("NODE_ENV") {
			Ok(value) if value.eq_ignore_ascii_case("production") => Self::Production,
			_ => Self::Development,
		}
	}

	pub fn is_production(self) -> bool {
		self == Self::Production
	}
}

/// Configuration loaded from a `corpus.toml` file.
///
/// ```toml
/// mode = "development"
/// cache_directory = ".corpus"
/// import_map = ".corpus/import-map.js"
/// loader_paths = ["loaders"]
///
/// [entrypoint]
/// module = "corpus"
/// export = "createCollection"
///
/// [exclude]
/// patterns = ["generated/"]
///
/// [server]
/// port = 5996
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct CorpusConfig {
	/// Build mode. Falls back to `NODE_ENV` when absent.
	#[serde(default)]
	pub mode: Option<BuildMode>,
	/// Build-cache directory that the watcher ignores.
	#[serde(default)]
	pub cache_directory: Option<PathBuf>,
	/// Output path of the generated import-map module.
	#[serde(default)]
	pub import_map: Option<PathBuf>,
	/// Loader modules that are watched but never registered as project
	/// sources.
	#[serde(default)]
	pub loader_paths: Vec<PathBuf>,
	/// Where collection declarations are imported from.
	#[serde(default)]
	pub entrypoint: EntrypointConfig,
	/// Exclusion configuration using gitignore-style patterns.
	#[serde(default)]
	pub exclude: ExcludeConfig,
	/// Refresh notification server settings.
	#[serde(default)]
	pub server: ServerConfig,
	/// Maximum file size in bytes to track. Defaults to 10 MB.
	#[serde(default = "default_max_file_size")]
	pub max_file_size: u64,
	/// When true, `.gitignore` files are not used for filtering.
	#[serde(default)]
	pub disable_gitignore: bool,
}

/// The module and export name that declare collections.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct EntrypointConfig {
	#[serde(default = "default_entrypoint_module")]
	pub module: String,
	#[serde(default = "default_entrypoint_export")]
	pub export: String,
}

impl Default for EntrypointConfig {
	fn default() -> Self {
		Self {
			module: default_entrypoint_module(),
			export: default_entrypoint_export(),
		}
	}
}

/// Configuration for excluding files and directories from tracking.
///
/// Patterns follow gitignore syntax and are applied on top of any
/// `.gitignore` rules (unless `disable_gitignore` is set).
#[derive(Debug, Default, Deserialize)]
pub struct ExcludeConfig {
	#[serde(default)]
	pub patterns: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
	#[serde(default = "default_server_port")]
	pub port: u16,
}

impl Default for ServerConfig {
	fn default() -> Self {
		Self {
			port: DEFAULT_SERVER_PORT,
		}
	}
}

fn default_max_file_size() -> u64 {
	DEFAULT_MAX_FILE_SIZE
}

fn default_entrypoint_module() -> String {
	DEFAULT_ENTRYPOINT_MODULE.to_string()
}

fn default_entrypoint_export() -> String {
	DEFAULT_ENTRYPOINT_EXPORT.to_string()
}

fn default_server_port() -> u16 {
	DEFAULT_SERVER_PORT
}

impl CorpusConfig {
	/// Resolve the config path from known discovery candidates.
	#[must_use]
	pub fn resolve_path(root: &Path) -> Option<PathBuf> {
		CONFIG_FILE_CANDIDATES
			.iter()
			.map(|candidate| root.join(candidate))
			.find(|path| path.is_file())
	}

	/// Load the config from the first discovered config file at `root`.
	/// Returns `None` if no config file exists.
	pub fn load(root: &Path) -> CorpusResult<Option<CorpusConfig>> {
		let Some(config_path) = Self::resolve_path(root) else {
			return Ok(None);
		};

		let content = std::fs::read_to_string(&config_path)?;
		let config: CorpusConfig =
			toml::from_str(&content).map_err(|e| CorpusError::ConfigParse(e.to_string()))?;

		Ok(Some(config))
	}
}
