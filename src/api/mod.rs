//! Operator API surface.

pub mod http;

pub use http::{ErrorResponse, HttpServer, HttpServerConfig, DEFAULT_PORT};
