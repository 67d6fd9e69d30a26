//! Client-side functionality for incidentd
//!
//! Talks to a running server over its Unix socket using the same
//! Content-Length framing as the server (`crate::jsonrpc::transport`).

pub mod transport;

pub use transport::{ClientInfo, ClientRequest, ConnectionState, JsonRpcClient};

pub use crate::jsonrpc::{JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
