//! Requirement extraction for the precision product builder.
//!
//! The [`server`] module exposes the extraction endpoint that turns a chat
//! transcript into structured [`requirements`] through a hosted language model;
//! the [`chat`] module is the client-side session that drives it.

pub mod chat;
pub mod client;
pub mod config;
pub mod error;
pub mod extract;
pub mod llm;
pub mod requirements;
pub mod server;
pub mod telemetry;
pub mod types;
