//! CLI commands module.

mod config;
mod speak;
mod util;
mod voices;

pub use config::ConfigCommand;
pub use speak::SpeakCommand;
pub use voices::VoicesCommand;

// Re-export utils for use in commands
pub(crate) use util::*;
