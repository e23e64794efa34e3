use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::RpcResult;

pub const METHOD_REFRESH_WATCH: &str = "refreshWatch";
pub const METHOD_REFRESH_UNWATCH: &str = "refreshUnwatch";
pub const METHOD_REFRESH_UPDATE: &str = "refreshUpdate";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryParams {
	pub directory: String,
}

/// One frame of the refresh protocol.
///
/// `refreshWatch` and `refreshUnwatch` travel from client to server,
/// `refreshUpdate` from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "method", content = "params", rename_all = "camelCase")]
pub enum RpcMessage {
	RefreshWatch(DirectoryParams),
	RefreshUnwatch(DirectoryParams),
	RefreshUpdate(DirectoryParams),
	/// A method this side does not know. Receivers ignore it.
	#[serde(skip_serializing)]
	Unknown { method: String },
}

#[derive(Deserialize)]
struct RawMessage {
	method: String,
	#[serde(default)]
	params: Value,
}

impl RpcMessage {
	pub fn watch(directory: impl Into<String>) -> Self {
		Self::RefreshWatch(DirectoryParams {
			directory: directory.into(),
		})
	}

	pub fn unwatch(directory: impl Into<String>) -> Self {
		Self::RefreshUnwatch(DirectoryParams {
			directory: directory.into(),
		})
	}

	pub fn update(directory: impl Into<String>) -> Self {
		Self::RefreshUpdate(DirectoryParams {
			directory: directory.into(),
		})
	}

	pub fn directory(&self) -> Option<&str> {
		match self {
			Self::RefreshWatch(params) | Self::RefreshUnwatch(params) | Self::RefreshUpdate(params) => {
				Some(&params.directory)
			}
			Self::Unknown { .. } => None,
		}
	}

	pub fn encode(&self) -> RpcResult<String> {
		Ok(serde_json::to_string(self)?)
	}

	/// Decode a text frame. Unknown methods decode to [`RpcMessage::Unknown`];
	/// malformed JSON or missing params are errors.
	pub fn decode(text: &str) -> RpcResult<Self> {
		let raw: RawMessage = serde_json::from_str(text)?;
		let params = || serde_json::from_value::<DirectoryParams>(raw.params.clone());

		let message = match raw.method.as_str() {
			METHOD_REFRESH_WATCH => Self::RefreshWatch(params()?),
			METHOD_REFRESH_UNWATCH => Self::RefreshUnwatch(params()?),
			METHOD_REFRESH_UPDATE => Self::RefreshUpdate(params()?),
			_ => Self::Unknown { method: raw.method },
		};
		Ok(message)
	}
}
