//! Filerelay Server - HTTP surface over the staging area and the cloud relay

pub mod config;
pub mod server;

pub use config::Config;
pub use server::{ApiError, ServerState, build_relay, build_router, run_server};
