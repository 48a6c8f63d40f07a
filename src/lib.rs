//! formatter-relay - streaming LLM tool endpoints with model fallback
//!
//! Serves a code formatter and three Oracle SQL helpers over HTTP. Each tool
//! request is assembled into a chat-completion prompt, sent to an ordered
//! cascade of models until one starts streaming, and relayed to the caller as
//! plain text.

pub mod cascade;
pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod provider;
pub mod relay;
pub mod telemetry;
pub mod tools;
