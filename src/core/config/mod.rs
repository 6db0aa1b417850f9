//! Configuration in two layers: machine-local [`Settings`] in a TOML file,
//! and the user-facing [`Config`] entity that travels with the rest of the
//! persisted state.

pub mod data;
pub mod defaults;
pub mod io;

pub use data::{Config, Settings};
pub use defaults::ModelMaxUpdate;
pub use io::ConfigError;
