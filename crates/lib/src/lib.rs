//! Ruta core library — source and agent registries, Facebook lead sync,
//! source-to-agent routing, dispatch, and the HTTP API used by the CLI.

pub mod agents;
pub mod api;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod facebook;
pub mod init;
pub mod leads;
pub mod llm;
pub mod routing;
pub mod sources;
pub mod sync;

/// Current time as an RFC 3339 string; stored on every write for display.
pub(crate) fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}
