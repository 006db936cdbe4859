//! Container engine client built on the `dockwire-http` wire layer.
//!
//! [`DockerClient`] exposes the engine operations over one injected
//! exchange; [`AttachSession`] carries interactive attach and exec streams.
//! The remaining modules back the `dockwire` binary.

#![deny(clippy::all)]

pub mod client;
pub mod color;
pub mod commands;
pub mod config;
pub mod error;
pub mod handlers;
pub mod model;
mod query;
pub mod session;
pub mod telemetry;
pub mod terminal;
pub mod tls;

pub use client::DockerClient;
pub use client::PendingWait;
pub use config::ClientConfig;
pub use error::CliError;
pub use session::AttachSession;
pub use tls::default_tls_context;
