//! mpx-daemon
//!
//! HTTP surface of the workflow engine. `main.rs` wires config, storage,
//! tracing and middleware; handlers live in `routes`, shared state in
//! `state`, wire types in `api_types`.

pub mod api_types;
pub mod routes;
pub mod state;
