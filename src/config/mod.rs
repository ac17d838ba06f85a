//! Configuration loading for the course reader.
//!
//! All user-tunable settings are centralized here and loaded from
//! `conf/config.toml` if present. Any missing or invalid entries fall back to
//! sensible defaults so the reader can still open offline.

mod defaults;
mod io;
mod models;
mod tables;

pub use io::{config_path, load_config, parse_config, serialize_config};
pub use models::{AppConfig, LogLevel, MAX_TIMEOUT_SECS, MIN_TIMEOUT_SECS};
