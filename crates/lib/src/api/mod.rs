//! HTTP API: the REST control plane for the dashboard.
//!
//! Single port serves agents CRUD, source registration, Facebook sync,
//! source-to-agent mappings, and inbound dispatch. JSON in, JSON out;
//! errors are `{ "error": string }` with a non-2xx status.

mod server;
mod wire;

pub use server::{run_server, AppState};
