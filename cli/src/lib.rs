//! CLI utilities for lingua.
//!
//! This crate provides common utilities for CLI applications.

pub mod config;
pub mod output;
pub mod paths;

pub use config::{load_config, mask_api_key, Config, Context};
pub use output::{format_bytes, print_success, print_verbose, Output, OutputFormat};
pub use paths::Paths;
