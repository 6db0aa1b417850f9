//! KI Connect is a local chat client for hosted LLM providers.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns application state, the credential vault, the session gate,
//!   provider and model resolution, persistence, and streaming orchestration.
//! - [`api`] defines the request and response payloads of the two supported
//!   wire protocols and the model listing client.
//! - [`utils`] holds URL policy and routing, authentication headers, and
//!   logging setup.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`], which opens [`core::app::App`] and runs one
//! command against it.

pub mod api;
pub mod cli;
pub mod core;
pub mod utils;
