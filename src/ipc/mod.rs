mod error;
mod handlers;
mod router;
mod types;

pub use router::handle_request;
pub use types::{AppState, Request};

use std::io::Write;

/// Writes one protocol line to stdout.
pub fn emit(line: &serde_json::Value) {
    let text = serde_json::to_string(line).unwrap_or_else(|_| "{\"ok\":false}".to_string());
    let mut out = std::io::stdout().lock();
    let _ = writeln!(out, "{text}");
    let _ = out.flush();
}
