//! Shared terminal screens.

pub mod error;

pub use error::show_error_screen;
