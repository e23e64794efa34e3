use std::collections::BTreeSet;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use futures_util::SinkExt;
use futures_util::StreamExt;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::net::ToSocketAddrs;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinSet;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use crate::RpcMessage;
use crate::RpcResult;

const UPDATE_CAPACITY: usize = 256;

#[derive(Debug)]
struct ServerState {
	changes: broadcast::Sender<PathBuf>,
	connections: Mutex<HashMap<u64, BTreeSet<String>>>,
	next_id: AtomicU64,
}

impl ServerState {
	fn set_directories(&self, id: u64, directories: &BTreeSet<String>) {
		self.connections
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.insert(id, directories.clone());
	}

	fn forget(&self, id: u64) {
		self.connections
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.remove(&id);
	}
}

/// Publishes file changes to connected refresh clients. Cheap to clone and
/// usable after the server has been moved into [`RefreshServer::run`].
#[derive(Debug, Clone)]
pub struct RefreshNotifier {
	state: Arc<ServerState>,
}

impl RefreshNotifier {
	/// Announce that `path` changed. Every connection watching a directory
	/// that contains `path` receives one `refreshUpdate` per such directory.
	/// Returns the number of live connections the change was handed to.
	pub fn notify_changed(&self, path: &Path) -> usize {
		let delivered = self.state.changes.send(path.to_path_buf()).unwrap_or(0);
		tracing::debug!(path = %path.display(), delivered, "published change");
		delivered
	}

	/// The union of directories watched by all live connections.
	pub fn watched_directories(&self) -> BTreeSet<String> {
		self.state
			.connections
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.values()
			.flatten()
			.cloned()
			.collect()
	}

	pub fn connection_count(&self) -> usize {
		self.state
			.connections
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.len()
	}
}

/// The WebSocket side of the refresh protocol.
#[derive(Debug)]
pub struct RefreshServer {
	listener: TcpListener,
	notifier: RefreshNotifier,
}

impl RefreshServer {
	pub async fn bind(address: impl ToSocketAddrs) -> RpcResult<Self> {
		let listener = TcpListener::bind(address).await?;
		let (changes, _) = broadcast::channel(UPDATE_CAPACITY);
		let state = Arc::new(ServerState {
			changes,
			connections: Mutex::default(),
			next_id: AtomicU64::new(0),
		});

		Ok(Self {
			listener,
			notifier: RefreshNotifier { state },
		})
	}

	pub fn local_addr(&self) -> RpcResult<SocketAddr> {
		Ok(self.listener.local_addr()?)
	}

	pub fn notifier(&self) -> RefreshNotifier {
		self.notifier.clone()
	}

	pub fn notify_changed(&self, path: &Path) -> usize {
		self.notifier.notify_changed(path)
	}

	pub fn watched_directories(&self) -> BTreeSet<String> {
		self.notifier.watched_directories()
	}

	/// Accept connections until the future is dropped. Dropping it also
	/// closes every open connection.
	pub async fn run(self) -> RpcResult<()> {
		if let Ok(address) = self.listener.local_addr() {
			tracing::info!(%address, "refresh server listening");
		}

		let mut connections = JoinSet::new();
		loop {
			tokio::select! {
				accepted = self.listener.accept() => match accepted {
					Ok((stream, peer)) => {
						let state = Arc::clone(&self.notifier.state);
						connections.spawn(async move {
							if let Err(error) = handle_connection(stream, state).await {
								tracing::debug!(%peer, %error, "refresh connection ended with an error");
							}
						});
					}
					Err(error) => tracing::warn!(%error, "failed to accept refresh connection"),
				},
				Some(finished) = connections.join_next() => {
					if let Err(error) = finished {
						if error.is_panic() {
							tracing::warn!(%error, "refresh connection task panicked");
						}
					}
				}
			}
		}
	}
}

/// Removes a connection's directories however its task ends.
struct ConnectionGuard {
	state: Arc<ServerState>,
	id: u64,
}

impl Drop for ConnectionGuard {
	fn drop(&mut self) {
		self.state.forget(self.id);
	}
}

async fn handle_connection(stream: TcpStream, state: Arc<ServerState>) -> RpcResult<()> {
	let peer = stream.peer_addr().ok();
	let socket = accept_async(stream).await?;
	let (mut sink, mut source) = socket.split();

	let id = state.next_id.fetch_add(1, Ordering::Relaxed);
	let guard = ConnectionGuard {
		state: Arc::clone(&state),
		id,
	};
	let mut changes = state.changes.subscribe();
	let mut directories = BTreeSet::new();
	state.set_directories(id, &directories);
	tracing::debug!(?peer, id, "refresh client connected");

	loop {
		tokio::select! {
			frame = source.next() => match frame {
				Some(Ok(Message::Text(text))) => match RpcMessage::decode(&text) {
					Ok(RpcMessage::RefreshWatch(params)) => {
						directories.insert(params.directory);
						state.set_directories(id, &directories);
					}
					Ok(RpcMessage::RefreshUnwatch(params)) => {
						directories.remove(&params.directory);
						state.set_directories(id, &directories);
					}
					Ok(other) => tracing::debug!(?other, "ignoring refresh message"),
					Err(error) => tracing::warn!(%error, "ignoring malformed refresh frame"),
				},
				Some(Ok(Message::Close(_))) | None => break,
				Some(Ok(_)) => {}
				Some(Err(error)) => {
					tracing::debug!(%error, "refresh connection failed");
					break;
				}
			},
			changed = changes.recv() => match changed {
				Ok(path) => {
					for directory in directories.iter().filter(|directory| path.starts_with(directory.as_str())) {
						let frame = RpcMessage::update(directory.as_str()).encode()?;
						sink.send(Message::Text(frame)).await?;
					}
				}
				Err(RecvError::Lagged(skipped)) => {
					tracing::warn!(skipped, "refresh client fell behind; updates were dropped");
				}
				Err(RecvError::Closed) => break,
			},
		}
	}

	drop(guard);
	tracing::debug!(?peer, id, "refresh client disconnected");
	Ok(())
}
