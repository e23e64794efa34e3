use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;

#[derive(Parser)]
#[command(
	author,
	version,
	about = "Index TypeScript, Markdown and MDX sources into pathnames, order keys and collections.",
	long_about = "corpus turns a directory of source files into an addressable, orderable, \
	              metadata-rich index.\n\nIt discovers literal `createCollection(pattern, options)` \
	              declarations, resolves their glob patterns into a generated import-map module \
	              and keeps everything in sync while files change.\n\nQuick start:\n  corpus \
	              collections  List discovered collections and their entries\n  corpus import-map   \
	              Write the import-map module\n  corpus watch        Keep the import map fresh and \
	              serve refresh notifications"
)]
pub struct CorpusCli {
	#[command(subcommand)]
	pub command: Option<Commands>,

	/// Path to the project root directory.
	#[arg(long, short, global = true)]
	pub path: Option<PathBuf>,

	/// Enable verbose output. Logs at `debug` unless `CORPUS_LOG` is set.
	#[arg(long, short, global = true, default_value_t = false)]
	pub verbose: bool,

	/// Disable colored output.
	#[arg(long, global = true, default_value_t = false)]
	pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
	/// Print the public pathname of every file and directory as JSON.
	///
	/// Order prefixes such as `01.` are removed and every segment is
	/// kebab-cased, so `01.getting-started/02.Installation.mdx` becomes
	/// `/getting-started/installation`.
	Pathnames {
		/// Directory that pathnames are relative to.
		#[arg(long)]
		base_directory: Option<PathBuf>,

		/// Pathname prefix added to every pathname, e.g. `docs`.
		#[arg(long)]
		base_pathname: Option<String>,

		/// Package name stripped when it is the leading segment.
		#[arg(long)]
		package_name: Option<String>,
	},
	/// Print the order key (`01`, `01.02`, ...) of every entry as JSON.
	Order,
	/// Analyze one file and print its exports or document structure as JSON.
	///
	/// Modules report each export with its kind, line, description and JSDoc
	/// tags. Markdown and MDX documents report headings, a nested section tree
	/// and front matter.
	Analyze {
		/// The file to analyze, relative to the project root.
		file: PathBuf,

		/// Print only the self-contained source of this export and the local
		/// declarations it depends on.
		#[arg(long)]
		export: Option<String>,

		/// Include the export closure of every export.
		#[arg(long, default_value_t = false)]
		closures: bool,
	},
	/// List discovered collections with their entries as JSON.
	Collections,
	/// Write the import-map module for every discovered collection.
	ImportMap {
		/// Fail when a collection pattern matches no files.
		#[arg(long, default_value_t = false)]
		production: bool,
	},
	/// Watch the project, regenerate the import map on changes and serve
	/// refresh notifications over a WebSocket.
	Watch {
		/// Port of the refresh server. Defaults to `server.port` in
		/// `corpus.toml`.
		#[arg(long)]
		port: Option<u16>,
	},
	/// Print an editor-openable URI for a file.
	EditorUri {
		/// The file, relative to the project root.
		#[arg(id = "file", value_name = "PATH")]
		path: PathBuf,

		/// 1-indexed line.
		#[arg(long)]
		line: Option<u32>,

		/// 1-indexed column.
		#[arg(long)]
		column: Option<u32>,

		/// URI scheme of the editor.
		#[arg(long, default_value = "vscode")]
		scheme: String,
	},
}
