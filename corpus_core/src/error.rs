use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum CorpusError {
	#[error(transparent)]
	#[diagnostic(code(corpus::io_error))]
	Io(#[from] std::io::Error),

	#[error("failure to load markdown: {0}")]
	#[diagnostic(code(corpus::markdown))]
	Markdown(String),

	#[error("failed to parse `{path}`: {reason}")]
	#[diagnostic(code(corpus::parse))]
	Parse { path: String, reason: String },

	#[error("failed to parse config file: {0}")]
	#[diagnostic(
		code(corpus::config_parse),
		help("check that corpus.toml is valid TOML with optional [entrypoint], [exclude] and [server] sections")
	)]
	ConfigParse(String),

	#[error("invalid collection configuration at {location}: {message}")]
	#[diagnostic(
		code(corpus::configuration),
		help(
			"collection patterns and options must be written as literals: a string pattern and an \
			 object literal of strings, numbers, booleans, arrays and objects"
		)
	)]
	Configuration { location: String, message: String },

	#[error("collection `{pattern}` sorts by `{sort}` but `{file}` has no metadata")]
	#[diagnostic(
		code(corpus::missing_metadata),
		help("add front matter or an `export const metadata = {{ ... }}` to the file")
	)]
	MissingMetadata {
		pattern: String,
		sort: String,
		file: String,
	},

	#[error("no files found for collection pattern `{pattern}` in `{directory}`")]
	#[diagnostic(
		code(corpus::not_found),
		help(
			"check that the pattern is relative to the tsconfig directory (or the project root), \
			 that the files exist, and that they are not excluded by .gitignore"
		)
	)]
	NotFound { pattern: String, directory: String },

	#[error("export `{identifier}` not found in `{file}`")]
	#[diagnostic(
		code(corpus::extraction),
		help("only identifiers exported by the module itself can be extracted; re-exports are not inlineable")
	)]
	Extraction { identifier: String, file: String },

	#[error("validation failed: {0}")]
	#[diagnostic(code(corpus::validation))]
	Validation(String),

	#[error("invalid glob pattern `{pattern}`: {reason}")]
	#[diagnostic(code(corpus::invalid_glob))]
	InvalidGlob { pattern: String, reason: String },

	#[error("file too large: `{path}` is {size} bytes (limit: {limit} bytes)")]
	#[diagnostic(
		code(corpus::file_too_large),
		help("increase max_file_size in corpus.toml or exclude this file")
	)]
	FileTooLarge { path: String, size: u64, limit: u64 },

	#[error("symlink cycle detected at: `{path}`")]
	#[diagnostic(
		code(corpus::symlink_cycle),
		help("remove the circular symlink or exclude this path")
	)]
	SymlinkCycle { path: String },

	#[error("file watcher failed: {0}")]
	#[diagnostic(code(corpus::watcher))]
	Watcher(#[from] notify::Error),
}

pub type CorpusResult<T> = Result<T, CorpusError>;
pub type AnyError = Box<dyn std::error::Error>;
pub type AnyEmptyResult = Result<(), AnyError>;
pub type AnyResult<T> = Result<T, AnyError>;
