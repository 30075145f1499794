//! Line-delimited JSON-RPC over stdin/stdout.
//!
//! Logging goes to stderr; stdout carries exactly one JSON response per
//! line so a host agent runtime can pipe the server.

use std::io::{self, BufRead, BufReader, Write};

use tracing::{debug, error, warn};

use super::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use crate::server::ToolServer;

/// stdio transport for the tool server
pub struct StdioTransport;

impl StdioTransport {
    pub fn new() -> Self {
        Self
    }

    /// Drive the server until stdin closes.
    pub async fn run(self, mut server: ToolServer) -> Result<(), io::Error> {
        let stdin = io::stdin();
        let stdout = io::stdout();

        let reader = BufReader::new(stdin.lock());
        let mut stdout = stdout.lock();

        for line in reader.lines() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    error!("failed to read line: {}", e);
                    break;
                }
            };
            if line.is_empty() {
                continue;
            }

            let request: JsonRpcRequest = match serde_json::from_str(&line) {
                Ok(r) => r,
                Err(e) => {
                    warn!("unparseable request: {}", e);
                    let response = JsonRpcResponse::error(None, JsonRpcError::parse_error());
                    write_response(&mut stdout, &response)?;
                    continue;
                }
            };

            debug!("handling {}", request.method);
            if let Some(response) = server.handle_request(request).await {
                write_response(&mut stdout, &response)?;
            }
        }

        Ok(())
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn write_response(stdout: &mut impl Write, response: &JsonRpcResponse) -> io::Result<()> {
    match serde_json::to_string(response) {
        Ok(json) => {
            writeln!(stdout, "{}", json)?;
            stdout.flush()
        }
        Err(e) => {
            error!("failed to serialize response: {}", e);
            // Minimal fallback so the client does not hang on a request
            let fallback =
                r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"Internal error"}}"#;
            writeln!(stdout, "{}", fallback)?;
            stdout.flush()
        }
    }
}
