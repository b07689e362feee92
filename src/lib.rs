//! chat-relay: HTTP and WebSocket relay for conversational LLM completions.
//!
//! Forwards chat requests to an OpenAI-compatible provider and returns
//! generated text synchronously or incrementally, without the client ever
//! holding provider credentials. Assistant sessions can call back into the
//! client over the same WebSocket: tool-call requests are dispatched with
//! generated correlation ids and the matching results are routed back to the
//! suspended run, even when results arrive out of order.

pub mod config;
pub mod error;
pub mod provider;
pub mod relay;
pub mod server;
