//! `corpus_rpc` carries refresh notifications between a running `corpus watch`
//! process and anything that renders collections.
//!
//! Every frame is a JSON text message over a WebSocket:
//!
//! ```json
//! {"method": "refreshWatch", "params": {"directory": "/site/docs"}}
//! {"method": "refreshUnwatch", "params": {"directory": "/site/docs"}}
//! {"method": "refreshUpdate", "params": {"directory": "/site/docs"}}
//! ```
//!
//! [`RefreshServer`] tracks the directories each connection watches and sends
//! a `refreshUpdate` for every watched directory containing a changed path.
//! [`RefreshClient`] multiplexes any number of [`Subscription`]s over one
//! shared connection and replays them after reconnecting. Updates sent while
//! a client is disconnected are not replayed.

pub use client::*;
pub use error::*;
pub use protocol::*;
pub use server::*;

mod client;
#[allow(unused_assignments)]
mod error;
mod protocol;
mod server;
