//! Configuration loading with env substitution.
//!
//! Config files: `wapanel.toml`, `wapanel.yaml`, or `wapanel.json`
//! Searched in `./` then `~/.config/wapanel/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;

pub use {
    error::{Error, Result},
    loader::{config_dir, discover_and_load, find_config_file, load_config},
    schema::{AutoReplyConfig, DispatchConfig, PanelConfig},
};
