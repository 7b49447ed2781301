//! Configuration management for mictape.
//!
//! Configuration is read from `~/.config/mictape/mictape.toml`, which setup
//! creates from the bundled template on first run.

pub mod file;

pub use file::{config_path, MictapeConfig};
