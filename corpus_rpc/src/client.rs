use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::OnceLock;
use std::sync::PoisonError;
use std::time::Duration;

use futures_util::SinkExt;
use futures_util::StreamExt;
use futures_util::stream::SplitSink;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_tungstenite::MaybeTlsStream;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::RpcError;
use crate::RpcMessage;
use crate::RpcResult;

type Sink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Where the shared connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
	/// No subscription has been made yet, or the client shut down.
	Disconnected,
	/// Opening the first connection.
	Connecting,
	/// Connected, with every live directory sent to the server.
	Subscribed,
	/// The connection dropped or could not be opened; waiting to retry.
	Reconnecting,
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
	/// WebSocket URL, e.g. `ws://127.0.0.1:5996`.
	pub url: String,
	pub initial_backoff: Duration,
	pub max_backoff: Duration,
}

impl ClientOptions {
	pub fn new(url: impl Into<String>) -> Self {
		Self {
			url: url.into(),
			initial_backoff: Duration::from_millis(100),
			max_backoff: Duration::from_secs(5),
		}
	}

	/// Delay before retry number `attempt` (starting at 1): doubles from
	/// `initial_backoff` and never exceeds `max_backoff`.
	pub fn backoff(&self, attempt: u32) -> Duration {
		let factor = 1_u32 << attempt.saturating_sub(1).min(16);
		self.initial_backoff
			.saturating_mul(factor)
			.min(self.max_backoff)
	}
}

/// A `refreshUpdate` delivered to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshUpdate {
	pub directory: String,
}

#[derive(Debug)]
enum Command {
	Watch(String),
	Unwatch(String),
}

#[derive(Debug, Default)]
struct Subscribers {
	next_id: u64,
	directories: BTreeMap<String, HashMap<u64, mpsc::UnboundedSender<RefreshUpdate>>>,
}

#[derive(Debug)]
struct Shared {
	options: ClientOptions,
	state: watch::Sender<ConnectionState>,
	subscribers: Mutex<Subscribers>,
}

impl Shared {
	fn subscribers(&self) -> MutexGuard<'_, Subscribers> {
		self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
	}

	fn set_state(&self, state: ConnectionState) {
		let changed = self.state.send_if_modified(|current| {
			let changed = *current != state;
			*current = state;
			changed
		});
		if changed {
			tracing::debug!(?state, url = %self.options.url, "refresh connection state changed");
		}
	}

	fn live_directories(&self) -> Vec<String> {
		self.subscribers().directories.keys().cloned().collect()
	}

	/// Deliver an update to the subscribers of exactly `directory`.
	fn dispatch(&self, directory: &str) {
		let subscribers = self.subscribers();
		let Some(senders) = subscribers.directories.get(directory) else {
			tracing::debug!(directory, "update for a directory without subscribers");
			return;
		};
		for sender in senders.values() {
			let _ = sender.send(RefreshUpdate {
				directory: directory.to_string(),
			});
		}
	}
}

/// A refresh-notification client. All clones share one lazily opened
/// connection; subscriptions are multiplexed over it by directory.
#[derive(Debug, Clone)]
pub struct RefreshClient {
	shared: Arc<Shared>,
	commands: Arc<OnceLock<mpsc::UnboundedSender<Command>>>,
}

impl RefreshClient {
	pub fn new(options: ClientOptions) -> Self {
		let (state, _) = watch::channel(ConnectionState::Disconnected);
		Self {
			shared: Arc::new(Shared {
				options,
				state,
				subscribers: Mutex::default(),
			}),
			commands: Arc::new(OnceLock::new()),
		}
	}

	pub fn state(&self) -> ConnectionState {
		*self.shared.state.borrow()
	}

	pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
		self.shared.state.subscribe()
	}

	/// Resolve once the connection reaches `state`.
	pub async fn wait_for_state(&self, state: ConnectionState) {
		let mut receiver = self.state_changes();
		let _ = receiver.wait_for(|current| *current == state).await;
	}

	/// Subscribe to updates for exactly `directory`. The first subscription
	/// opens the shared connection, so this must be called from within a
	/// tokio runtime.
	pub fn subscribe(&self, directory: impl Into<String>) -> Subscription {
		let directory = directory.into();
		let (sender, receiver) = mpsc::unbounded_channel();

		let (id, first) = {
			let mut subscribers = self.shared.subscribers();
			let id = subscribers.next_id;
			subscribers.next_id += 1;
			let entry = subscribers.directories.entry(directory.clone()).or_default();
			entry.insert(id, sender);
			(id, entry.len() == 1)
		};

		let commands = self.connection().clone();
		if first {
			let _ = commands.send(Command::Watch(directory.clone()));
		}
		tracing::debug!(directory, first, "subscribed to refresh updates");

		Subscription {
			directory,
			id,
			receiver,
			shared: Arc::clone(&self.shared),
			commands,
		}
	}

	fn connection(&self) -> &mpsc::UnboundedSender<Command> {
		self.commands.get_or_init(|| {
			let (sender, receiver) = mpsc::unbounded_channel();
			tokio::spawn(drive(Arc::clone(&self.shared), receiver));
			sender
		})
	}
}

/// Updates for one directory. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
	directory: String,
	id: u64,
	receiver: mpsc::UnboundedReceiver<RefreshUpdate>,
	shared: Arc<Shared>,
	commands: mpsc::UnboundedSender<Command>,
}

impl Subscription {
	pub fn directory(&self) -> &str {
		&self.directory
	}

	/// The next update, or `None` once the client has shut down.
	pub async fn recv(&mut self) -> Option<RefreshUpdate> {
		self.receiver.recv().await
	}

	pub fn try_recv(&mut self) -> Option<RefreshUpdate> {
		self.receiver.try_recv().ok()
	}

	pub fn unsubscribe(self) {
		drop(self);
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		let last = {
			let mut subscribers = self.shared.subscribers();
			let Some(entry) = subscribers.directories.get_mut(&self.directory) else {
				return;
			};
			entry.remove(&self.id);
			let last = entry.is_empty();
			if last {
				subscribers.directories.remove(&self.directory);
			}
			last
		};

		if last {
			let _ = self.commands.send(Command::Unwatch(self.directory.clone()));
		}
		tracing::debug!(directory = %self.directory, last, "unsubscribed from refresh updates");
	}
}

enum SessionEnd {
	/// The connection dropped; reconnect.
	Dropped,
	/// Every client handle is gone; stop.
	Shutdown,
}

/// Owns the connection: connects, replays live directories, forwards
/// commands and dispatches updates, reconnecting with backoff.
async fn drive(shared: Arc<Shared>, mut commands: mpsc::UnboundedReceiver<Command>) {
	let mut attempt = 0_u32;

	loop {
		shared.set_state(if attempt == 0 {
			ConnectionState::Connecting
		} else {
			ConnectionState::Reconnecting
		});

		match connect_async(shared.options.url.as_str()).await {
			Ok((socket, _)) => {
				attempt = 0;
				match session(&shared, socket, &mut commands).await {
					SessionEnd::Shutdown => break,
					SessionEnd::Dropped => {
						tracing::info!(url = %shared.options.url, "refresh connection dropped");
					}
				}
			}
			Err(error) => {
				tracing::debug!(url = %shared.options.url, %error, attempt, "refresh connection failed");
			}
		}

		attempt = attempt.saturating_add(1);
		shared.set_state(ConnectionState::Reconnecting);

		// Commands received while waiting are covered by the replay on the
		// next connection.
		let deadline = Instant::now() + shared.options.backoff(attempt);
		loop {
			tokio::select! {
				() = tokio::time::sleep_until(deadline) => break,
				command = commands.recv() => {
					if command.is_none() {
						shared.set_state(ConnectionState::Disconnected);
						return;
					}
				}
			}
		}
	}

	shared.set_state(ConnectionState::Disconnected);
}

async fn session(
	shared: &Shared,
	socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
	commands: &mut mpsc::UnboundedReceiver<Command>,
) -> SessionEnd {
	let (mut sink, mut source) = socket.split();

	// Pending commands are superseded by the replay below.
	while commands.try_recv().is_ok() {}

	for directory in shared.live_directories() {
		if let Err(error) = send(&mut sink, &RpcMessage::watch(directory)).await {
			tracing::debug!(%error, "failed to replay subscriptions");
			return SessionEnd::Dropped;
		}
	}
	shared.set_state(ConnectionState::Subscribed);

	loop {
		tokio::select! {
			command = commands.recv() => {
				let message = match command {
					Some(Command::Watch(directory)) => RpcMessage::watch(directory),
					Some(Command::Unwatch(directory)) => RpcMessage::unwatch(directory),
					None => {
						let _ = sink.close().await;
						return SessionEnd::Shutdown;
					}
				};
				if let Err(error) = send(&mut sink, &message).await {
					tracing::debug!(%error, "failed to send refresh message");
					return SessionEnd::Dropped;
				}
			}
			frame = source.next() => match frame {
				Some(Ok(Message::Text(text))) => match RpcMessage::decode(&text) {
					Ok(RpcMessage::RefreshUpdate(params)) => shared.dispatch(&params.directory),
					Ok(other) => tracing::debug!(?other, "ignoring refresh message"),
					Err(error) => tracing::warn!(%error, "ignoring malformed refresh frame"),
				},
				Some(Ok(Message::Close(_))) | None => return SessionEnd::Dropped,
				Some(Ok(_)) => {}
				Some(Err(error)) => {
					tracing::debug!(%error, "refresh connection failed");
					return SessionEnd::Dropped;
				}
			},
		}
	}
}

async fn send(sink: &mut Sink, message: &RpcMessage) -> RpcResult<()> {
	let frame = message.encode()?;
	sink.send(Message::Text(frame)).await.map_err(RpcError::from)
}
