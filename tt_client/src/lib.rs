//! Internal modules for the todo tracker client.
//!
//! This library provides command parsing, the API client, token storage and
//! output formatting used by the `tt` binary.

pub mod api_client;
pub mod commands;
pub mod render;
pub mod token;
