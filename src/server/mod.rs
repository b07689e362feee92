//! HTTP/WebSocket server surface.
//!
//! - [`schemas`]: Request/response bodies
//! - [`http_api`]: Router, state and the non-streaming endpoints
//! - [`ws_api`]: Streaming and assistant WebSocket endpoints

pub mod http_api;
pub mod schemas;
pub mod ws_api;
