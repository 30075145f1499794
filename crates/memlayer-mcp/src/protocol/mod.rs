//! JSON-RPC protocol layer for the tool server.

pub mod stdio;
pub mod types;
