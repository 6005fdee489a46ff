//! mailgate: drive SMTP sessions over a streaming HTTP connection.
//!
//! A client opens `POST /smtp/stream` and writes newline-delimited JSON
//! commands into the request body. The gateway answers with a
//! newline-delimited JSON stream of events in the response body.

pub mod cli;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod session;
pub mod smtp;

pub use config::GatewayConfig;
pub use error::{GatewayError, GatewayResult};
