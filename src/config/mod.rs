// src/config/mod.rs

//! Configuration loading and validation.
//!
//! - `model.rs`: the TOML-backed data model and the validated `ConfigFile`.
//! - `loader.rs`: reading a config file from disk.
//! - `validate.rs`: `RawConfigFile` → `ConfigFile`, including URI parsing.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_or_default};
pub use model::{ConfigFile, DEFAULT_URI, Endpoint, JobSection, RawConfigFile, ServerSection};
pub use validate::parse_uri;
