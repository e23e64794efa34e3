use std::collections::HashMap;
use std::future::Future;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::EventKind;
use notify::RecommendedWatcher;
use notify::RecursiveMode;
use notify::Watcher;
use notify::event::ModifyKind;
use notify::event::RenameMode;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::CorpusResult;
use crate::project::Project;
use crate::project::is_source_file;

/// Quiet period that closes a batch of filesystem events.
pub const WATCH_DEBOUNCE: Duration = Duration::from_millis(200);

/// A filesystem change relevant to a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
	Added(PathBuf),
	Removed(PathBuf),
	Changed(PathBuf),
}

impl WatchEvent {
	pub fn path(&self) -> &Path {
		match self {
			Self::Added(path) | Self::Removed(path) | Self::Changed(path) => path,
		}
	}

	/// Translate a raw notify event. Renames become a removal of the old path
	/// and an addition of the new one; access events are dropped.
	pub fn from_notify(event: &notify::Event) -> Vec<Self> {
		let paths = event.paths.iter().cloned();
		match event.kind {
			EventKind::Create(_) => paths.map(Self::Added).collect(),
			EventKind::Remove(_) => paths.map(Self::Removed).collect(),
			EventKind::Modify(ModifyKind::Name(RenameMode::From)) => paths.map(Self::Removed).collect(),
			EventKind::Modify(ModifyKind::Name(RenameMode::To)) => paths.map(Self::Added).collect(),
			EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
				let mut events = Vec::new();
				if let Some(from) = event.paths.first() {
					events.push(Self::Removed(from.clone()));
				}
				if let Some(to) = event.paths.get(1) {
					events.push(Self::Added(to.clone()));
				}
				events
			}
			EventKind::Modify(ModifyKind::Name(_)) => paths
				.map(|path| {
					if path.exists() {
						Self::Added(path)
					} else {
						Self::Removed(path)
					}
				})
				.collect(),
			EventKind::Modify(_) => paths.map(Self::Changed).collect(),
			EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
		}
	}

	/// Fold a later event for the same path into this one. A change after an
	/// addition (or a re-creation) is still an addition.
	fn merge(self, next: Self) -> Self {
		match (self, next) {
			(Self::Added(path) | Self::Removed(path), Self::Changed(_)) => Self::Added(path),
			(_, next) => next,
		}
	}
}

/// Collapse a batch of events to one per path, in order of first appearance.
///
/// A single write usually arrives as a create followed by one or more
/// modifications; those become one [`WatchEvent::Added`].
pub fn coalesce_events(events: impl IntoIterator<Item = WatchEvent>) -> Vec<WatchEvent> {
	let mut order = Vec::new();
	let mut merged: HashMap<PathBuf, WatchEvent> = HashMap::new();

	for event in events {
		let path = event.path().to_path_buf();
		let event = match merged.remove(&path) {
			Some(previous) => previous.merge(event),
			None => {
				order.push(path.clone());
				event
			}
		};
		merged.insert(path, event);
	}

	order
		.into_iter()
		.filter_map(|path| merged.remove(&path))
		.collect()
}

/// Keeps the filesystem watcher alive. Dropping it stops watching and
/// aborts event dispatch.
#[derive(Debug)]
pub struct ProjectWatcher {
	_watcher: RecommendedWatcher,
	task: JoinHandle<()>,
}

impl Drop for ProjectWatcher {
	fn drop(&mut self) {
		self.task.abort();
	}
}

/// Watch the project root recursively and every loader path outside it,
/// keeping the project in sync and calling `on_update` after each handled
/// change. Must be called from within a tokio runtime.
///
/// Raw events are batched until [`WATCH_DEBOUNCE`] passes without a new one,
/// then coalesced per path. Different paths are handled concurrently; events
/// for one path are handled in arrival order.
pub fn create_watcher<F, Fut>(
	project: Arc<Project>,
	loader_paths: Vec<PathBuf>,
	on_update: F,
) -> CorpusResult<ProjectWatcher>
where
	F: Fn(PathBuf) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = ()> + Send + 'static,
{
	let (sender, mut receiver) = mpsc::unbounded_channel();

	let mut watcher = notify::recommended_watcher(move |result: Result<notify::Event, notify::Error>| {
		match result {
			Ok(event) => {
				for event in WatchEvent::from_notify(&event) {
					let _ = sender.send(event);
				}
			}
			Err(error) => tracing::warn!(%error, "file watcher error"),
		}
	})?;

	watcher.watch(project.root(), RecursiveMode::Recursive)?;
	for loader in &loader_paths {
		if loader.starts_with(project.root()) {
			continue;
		}
		if !loader.exists() {
			tracing::warn!(path = %loader.display(), "loader path does not exist");
			continue;
		}
		let mode = if loader.is_dir() {
			RecursiveMode::Recursive
		} else {
			RecursiveMode::NonRecursive
		};
		watcher.watch(loader, mode)?;
	}
	tracing::debug!(root = %project.root().display(), loaders = loader_paths.len(), "watching project");

	let on_update = Arc::new(on_update);
	let loader_paths = Arc::new(loader_paths);
	let task = tokio::spawn(async move {
		let mut in_flight: HashMap<PathBuf, JoinHandle<()>> = HashMap::new();

		while let Some(first) = receiver.recv().await {
			let mut batch = vec![first];
			let mut closed = false;
			loop {
				match tokio::time::timeout(WATCH_DEBOUNCE, receiver.recv()).await {
					Ok(Some(event)) => batch.push(event),
					Ok(None) => {
						closed = true;
						break;
					}
					Err(_) => break,
				}
			}

			in_flight.retain(|_, handle| !handle.is_finished());
			for event in coalesce_events(batch) {
				let path = event.path().to_path_buf();
				let previous = in_flight.remove(&path);
				let project = Arc::clone(&project);
				let loader_paths = Arc::clone(&loader_paths);
				let on_update = Arc::clone(&on_update);

				let handle = tokio::spawn(async move {
					// Earlier changes to the same path settle first.
					if let Some(previous) = previous {
						let _ = previous.await;
					}
					if let Err(error) =
						handle_watch_event(&project, &loader_paths, event, |path| on_update(path)).await
					{
						tracing::warn!(%error, "failed to apply file change");
					}
				});
				in_flight.insert(path, handle);
			}

			if closed {
				break;
			}
		}
	});

	Ok(ProjectWatcher {
		_watcher: watcher,
		task,
	})
}

/// Whether a change to `path` is never relevant: anything inside the cache
/// directory, `node_modules` or `.git`.
pub fn is_ignored_change(project: &Project, path: &Path) -> bool {
	project.is_cache_path(path)
		|| path.components().any(|component| {
			matches!(component, Component::Normal(name) if name == "node_modules" || name == ".git")
		})
}

/// Apply one change to the project and report it through `on_update`.
///
/// Additions register supported source files that are not loader paths,
/// removals unregister tracked files and changes refresh tracked files.
/// Ignored paths are dropped without calling `on_update`.
pub async fn handle_watch_event<F, Fut>(
	project: &Project,
	loader_paths: &[PathBuf],
	event: WatchEvent,
	on_update: F,
) -> CorpusResult<()>
where
	F: FnOnce(PathBuf) -> Fut,
	Fut: Future<Output = ()>,
{
	let path = event.path().to_path_buf();
	if is_ignored_change(project, &path) {
		return Ok(());
	}

	let is_loader = loader_paths
		.iter()
		.any(|loader| path == *loader || path.starts_with(loader))
		|| project.is_loader_path(&path);

	match &event {
		WatchEvent::Added(path) => {
			if project.is_tracked(path) {
				project.refresh(Some(path)).await?;
			} else if !is_loader && path.is_file() && is_source_file(path) {
				project.add_file(path).await?;
			}
		}
		WatchEvent::Removed(path) => {
			if project.is_tracked(path) {
				project.remove_file(path);
			}
		}
		WatchEvent::Changed(path) => {
			if project.is_tracked(path) {
				project.refresh(Some(path)).await?;
			}
		}
	}

	tracing::debug!(?event, "handled file change");
	on_update(path).await;
	Ok(())
}
