use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use corpus_cli::Commands;
use corpus_cli::CorpusCli;
use corpus_core::AnalysisRequest;
use corpus_core::AnyEmptyResult;
use corpus_core::AnyError;
use corpus_core::BuildMode;
use corpus_core::CollectionEntry;
use corpus_core::CollectionOptions;
use corpus_core::CorpusConfig;
use corpus_core::CorpusError;
use corpus_core::Module;
use corpus_core::Project;
use corpus_core::ProjectOptions;
use corpus_core::SourceNode;
use corpus_core::analyze_source_text;
use corpus_core::compute_order_map;
use corpus_core::compute_pathname_map;
use corpus_core::create_watcher;
use corpus_core::discover_collection_configurations;
use corpus_core::extract_export_closure;
use corpus_core::load_collection;
use corpus_core::normalize_line_endings;
use corpus_core::paths::PathnameOptions;
use corpus_core::paths::editor_uri;
use corpus_core::paths::relative_key;
use corpus_core::write_collection_import_maps;
use corpus_rpc::RefreshServer;
use corpus_rpc::RpcError;
use owo_colors::OwoColorize;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

static USE_COLOR: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(true);

fn color_enabled() -> bool {
	USE_COLOR.load(std::sync::atomic::Ordering::Relaxed)
}

/// Apply ANSI color codes only when color is enabled.
macro_rules! colored {
	($text:expr,red) => {
		if color_enabled() {
			format!("{}", $text.red())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,green) => {
		if color_enabled() {
			format!("{}", $text.green())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,bold) => {
		if color_enabled() {
			format!("{}", $text.bold())
		} else {
			format!("{}", $text)
		}
	};
}

fn main() {
	let args = CorpusCli::parse();

	// Respect NO_COLOR env var and --no-color flag.
	let use_color = !args.no_color && std::env::var_os("NO_COLOR").is_none();
	if !use_color {
		USE_COLOR.store(false, std::sync::atomic::Ordering::Relaxed);
	}

	miette::set_hook(Box::new(move |_| {
		Box::new(
			miette::MietteHandlerOpts::new()
				.color(use_color)
				.unicode(use_color)
				.build(),
		)
	}))
	.ok();

	init_tracing(args.verbose, use_color);

	let result = match &args.command {
		Some(Commands::Pathnames {
			base_directory,
			base_pathname,
			package_name,
		}) => {
			let options = PathnameOptions {
				base_directory: base_directory.clone(),
				base_pathname: base_pathname.clone(),
				package_name: package_name.clone(),
			};
			run_pathnames(&args, &options)
		}
		Some(Commands::Order) => run_order(&args),
		Some(Commands::Analyze {
			file,
			export,
			closures,
		}) => run_analyze(&args, file, export.as_deref(), *closures),
		Some(Commands::Collections) => run_collections(&args),
		Some(Commands::ImportMap { production }) => run_import_map(&args, *production),
		Some(Commands::Watch { port }) => run_watch(&args, *port),
		Some(Commands::EditorUri {
			path,
			line,
			column,
			scheme,
		}) => run_editor_uri(&args, path, *line, *column, scheme),
		None => {
			eprintln!("No subcommand specified. Run `corpus --help` for usage.");
			process::exit(1);
		}
	};

	if let Err(e) = result {
		// Library errors carry diagnostic codes and help text.
		let e = match e.downcast::<CorpusError>() {
			Ok(corpus_err) => {
				let report: miette::Report = (*corpus_err).into();
				eprintln!("{report:?}");
				process::exit(2);
			}
			Err(e) => e,
		};
		match e.downcast::<RpcError>() {
			Ok(rpc_err) => {
				let report: miette::Report = (*rpc_err).into();
				eprintln!("{report:?}");
			}
			Err(e) => {
				eprintln!("{} {e}", colored!("error:", red));
			}
		}
		process::exit(2);
	}
}

/// Logs go to stderr so JSON output on stdout stays parseable.
fn init_tracing(verbose: bool, use_color: bool) {
	let default_level = if verbose { "debug" } else { "warn" };
	let filter =
		EnvFilter::try_from_env("CORPUS_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_ansi(use_color)
		.try_init()
		.ok();
}

fn resolve_root(args: &CorpusCli) -> PathBuf {
	let root = args
		.path
		.clone()
		.unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
	root.canonicalize().unwrap_or(root)
}

fn project_options(root: &Path) -> Result<ProjectOptions, Box<dyn std::error::Error>> {
	let config = CorpusConfig::load(root)?;
	Ok(ProjectOptions::from_config(config.as_ref()))
}

fn open_project(args: &CorpusCli) -> Result<Project, Box<dyn std::error::Error>> {
	let root = resolve_root(args);
	let options = project_options(&root)?;
	Ok(Project::open(&root, options)?)
}

/// Key for a path in JSON output. The root itself is `.`.
fn output_key(root: &Path, path: &Path) -> String {
	let key = relative_key(root, path);
	if key.is_empty() { ".".to_string() } else { key }
}

fn print_json(value: &impl Serialize) -> AnyEmptyResult {
	println!("{}", serde_json::to_string_pretty(value)?);
	Ok(())
}

fn run_pathnames(args: &CorpusCli, options: &PathnameOptions) -> AnyEmptyResult {
	let root = resolve_root(args);
	let tree = SourceNode::read(&root)?;

	let pathnames: BTreeMap<String, String> = compute_pathname_map(&tree, options)
		.into_iter()
		.map(|(path, pathname)| (output_key(&root, &path), pathname))
		.collect();

	print_json(&pathnames)
}

fn run_order(args: &CorpusCli) -> AnyEmptyResult {
	let root = resolve_root(args);
	let tree = SourceNode::read(&root)?;

	let order: BTreeMap<String, String> = compute_order_map(&tree, None)
		.into_iter()
		.map(|(path, key)| (output_key(&root, &path), key))
		.collect();

	print_json(&order)
}

fn run_analyze(
	args: &CorpusCli,
	file: &Path,
	export: Option<&str>,
	closures: bool,
) -> AnyEmptyResult {
	let project = open_project(args)?;
	let path = project.resolve(file);

	if let Some(identifier) = export {
		let module = match project.module(&path)? {
			Some(module) => module,
			None => {
				let text = normalize_line_endings(&std::fs::read_to_string(&path)?);
				Module::parse(&path, &text)?
			}
		};
		println!("{}", extract_export_closure(&module, identifier)?);
		return Ok(());
	}

	let mut request = AnalysisRequest::for_path(path);
	request.include_closures = closures;

	let runtime = tokio::runtime::Runtime::new()?;
	let analysis = runtime.block_on(analyze_source_text(&project, request))?;
	print_json(&analysis)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CollectionReport<'a> {
	pattern: &'a str,
	options: &'a CollectionOptions,
	call_site: String,
	entries: Vec<EntryReport>,
}

#[derive(Serialize)]
struct EntryReport {
	path: String,
	pathname: String,
	order: String,
	extension: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	metadata: Option<serde_json::Value>,
}

impl EntryReport {
	fn new(root: &Path, entry: CollectionEntry) -> Self {
		Self {
			path: output_key(root, &entry.path),
			pathname: entry.pathname,
			order: entry.order,
			extension: entry.extension,
			metadata: entry.metadata,
		}
	}
}

fn run_collections(args: &CorpusCli) -> AnyEmptyResult {
	let project = open_project(args)?;
	let root = project.root();
	let registry = discover_collection_configurations(&project)?;

	let mut reports = Vec::with_capacity(registry.len());
	for configuration in registry.iter() {
		let entries = load_collection(&project, configuration)?
			.into_iter()
			.map(|entry| EntryReport::new(root, entry))
			.collect();
		let site = &configuration.call_site;

		reports.push(CollectionReport {
			pattern: &configuration.pattern,
			options: &configuration.options,
			call_site: format!("{}:{}:{}", output_key(root, &site.file), site.line, site.column),
			entries,
		});
	}

	print_json(&reports)
}

fn run_import_map(args: &CorpusCli, production: bool) -> AnyEmptyResult {
	let root = resolve_root(args);
	let mut options = project_options(&root)?;
	if production {
		options.mode = BuildMode::Production;
	}

	let project = Project::open(&root, options)?;
	let written = write_collection_import_maps(&project)?;
	let path = output_key(project.root(), &written.path);

	if written.changed {
		println!(
			"{} {} collection(s) -> {path}",
			colored!("Wrote", green),
			written.collections
		);
	} else {
		println!("{path} is up to date ({} collection(s))", written.collections);
	}

	Ok(())
}

fn run_watch(args: &CorpusCli, port: Option<u16>) -> AnyEmptyResult {
	let project = Arc::new(open_project(args)?);
	let port = port.unwrap_or(project.options().server_port);

	let written = write_collection_import_maps(&project)?;
	println!(
		"{} {} collection(s) -> {}",
		colored!("Import map:", bold),
		written.collections,
		output_key(project.root(), &written.path)
	);

	let runtime = tokio::runtime::Runtime::new()?;
	runtime.block_on(async move {
		let server = RefreshServer::bind(("127.0.0.1", port)).await?;
		let notifier = server.notifier();
		println!(
			"{} ws://{}",
			colored!("Refresh server:", bold),
			server.local_addr()?
		);

		// One regeneration at a time; each change is announced after the
		// import map reflects it.
		let regenerating = Arc::new(tokio::sync::Mutex::new(()));
		let on_update = {
			let project = Arc::clone(&project);
			move |path: PathBuf| {
				let project = Arc::clone(&project);
				let notifier = notifier.clone();
				let regenerating = Arc::clone(&regenerating);
				async move {
					let guard = regenerating.lock().await;
					let regenerated = tokio::task::spawn_blocking({
						let project = Arc::clone(&project);
						move || write_collection_import_maps(&project)
					})
					.await;
					drop(guard);

					match regenerated {
						Ok(Ok(written)) if written.changed => {
							tracing::info!(collections = written.collections, "regenerated import map");
						}
						Ok(Ok(_)) => {}
						Ok(Err(error)) => tracing::warn!(%error, "failed to regenerate import map"),
						Err(error) => tracing::warn!(%error, "import map regeneration panicked"),
					}
					notifier.notify_changed(&path);
				}
			}
		};

		let _watcher = create_watcher(Arc::clone(&project), project.loader_paths(), on_update)?;
		println!("Watching {} (press Ctrl+C to stop)", project.root().display());

		tokio::select! {
			result = server.run() => result?,
			signal = tokio::signal::ctrl_c() => {
				signal?;
				println!("\n{}", colored!("Stopped watching.", green));
			}
		}

		Ok::<(), AnyError>(())
	})
}

fn run_editor_uri(
	args: &CorpusCli,
	path: &Path,
	line: Option<u32>,
	column: Option<u32>,
	scheme: &str,
) -> AnyEmptyResult {
	let path = if path.is_absolute() {
		path.to_path_buf()
	} else {
		resolve_root(args).join(path)
	};

	println!("{}", editor_uri(&path, line, column, Some(scheme)));
	Ok(())
}
