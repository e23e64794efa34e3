use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum RpcError {
	#[error(transparent)]
	#[diagnostic(code(corpus_rpc::io_error))]
	Io(#[from] std::io::Error),

	#[error("websocket failure: {0}")]
	#[diagnostic(code(corpus_rpc::websocket))]
	WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

	#[error("invalid refresh message: {0}")]
	#[diagnostic(
		code(corpus_rpc::json),
		help("messages are JSON objects of the form {{\"method\": string, \"params\": {{\"directory\": string}}}}")
	)]
	Json(#[from] serde_json::Error),

	#[error("the refresh connection is closed")]
	#[diagnostic(code(corpus_rpc::closed))]
	Closed,
}

impl From<tokio_tungstenite::tungstenite::Error> for RpcError {
	fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
		Self::WebSocket(Box::new(error))
	}
}

pub type RpcResult<T> = Result<T, RpcError>;
