pub mod app;
pub mod builtin_providers;
pub mod chat;
pub mod chat_stream;
pub mod config;
pub mod message;
pub mod model_catalog;
pub mod persistence;
pub mod providers;
pub mod request;
pub mod session_gate;
pub mod state;
pub mod vault;
