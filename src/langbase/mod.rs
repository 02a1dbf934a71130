//! Langbase pipe client.
//!
//! Every external-service call the engine makes is a pipe run: a system
//! prompt plus a user message in, a JSON completion out.

mod client;
mod types;


pub use client::LangbaseClient;
pub use types::*;
