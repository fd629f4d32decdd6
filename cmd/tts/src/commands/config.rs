//! Configuration management commands.

use clap::{Args, Subcommand};

use lingua_cli::config::Context as CliContext;

use super::{get_config, print_success};
use crate::Cli;

/// Manage CLI configuration.
///
/// Contexts allow you to manage multiple synthesis services,
/// similar to kubectl's context management.
///
/// Configuration is stored in ~/.lingua/tts/config.yaml
#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    command: ConfigSubcommand,
}

#[derive(Subcommand)]
enum ConfigSubcommand {
    /// Add a new context
    #[command(name = "add-context")]
    AddContext {
        /// Context name
        name: String,
        /// Synthesis service base URL (required)
        #[arg(long)]
        base_url: String,
        /// API key
        #[arg(long)]
        api_key: Option<String>,
        /// Request timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Maximum retries
        #[arg(long)]
        max_retries: Option<u32>,
        /// Default voice ID
        #[arg(long)]
        default_voice: Option<String>,
        /// Language of plain text input
        #[arg(long)]
        default_lang: Option<String>,
        /// Speaking rate multiplier
        #[arg(long)]
        rate: Option<f64>,
        /// Pitch multiplier
        #[arg(long)]
        pitch: Option<f64>,
    },
    /// Delete a context
    #[command(name = "delete-context")]
    DeleteContext {
        /// Context name
        name: String,
    },
    /// Set the current context
    #[command(name = "use-context")]
    UseContext {
        /// Context name
        name: String,
    },
    /// Display the current context
    #[command(name = "get-context")]
    GetContext,
    /// List all contexts
    #[command(name = "list-contexts", alias = "get-contexts")]
    ListContexts,
    /// View the current configuration
    View,
}

impl ConfigCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        match &self.command {
            ConfigSubcommand::AddContext {
                name,
                base_url,
                api_key,
                timeout,
                max_retries,
                default_voice,
                default_lang,
                rate,
                pitch,
            } => {
                let mut cfg = get_config(cli)?;

                let ctx = CliContext {
                    base_url: base_url.clone(),
                    api_key: api_key.clone().unwrap_or_default(),
                    timeout: timeout.unwrap_or(0),
                    max_retries: *max_retries,
                    default_voice: default_voice.clone().unwrap_or_default(),
                    default_lang: default_lang.clone().unwrap_or_default(),
                    rate: *rate,
                    pitch: *pitch,
                    ..Default::default()
                };

                cfg.add_context(name, ctx)?;
                print_success(&format!("Context \"{}\" added successfully", name));
                Ok(())
            }

            ConfigSubcommand::DeleteContext { name } => {
                let mut cfg = get_config(cli)?;
                cfg.delete_context(name)?;
                print_success(&format!("Context \"{}\" deleted", name));
                Ok(())
            }

            ConfigSubcommand::UseContext { name } => {
                let mut cfg = get_config(cli)?;
                cfg.use_context(name)?;
                print_success(&format!("Switched to context \"{}\"", name));
                Ok(())
            }

            ConfigSubcommand::GetContext => {
                let cfg = get_config(cli)?;
                if cfg.current_context.is_empty() {
                    println!("No current context set");
                } else {
                    println!("{}", cfg.current_context);
                }
                Ok(())
            }

            ConfigSubcommand::ListContexts => {
                let cfg = get_config(cli)?;

                if cfg.contexts.is_empty() {
                    println!("No contexts configured");
                    return Ok(());
                }

                println!("{:<8} {:<20} {:<36} {}", "CURRENT", "NAME", "BASE_URL", "DEFAULT_VOICE");
                for (name, ctx) in &cfg.contexts {
                    let current = if name == &cfg.current_context { "*" } else { "" };
                    println!(
                        "{:<8} {:<20} {:<36} {}",
                        current, name, ctx.base_url, ctx.default_voice
                    );
                }
                Ok(())
            }

            ConfigSubcommand::View => {
                let cfg = get_config(cli)?;

                println!("Config file: {}", cfg.path().display());
                println!("Current context: {}", cfg.current_context);
                println!("Contexts: {}", cfg.contexts.len());

                if !cfg.contexts.is_empty() {
                    println!("\nContext details:");
                    for (name, ctx) in &cfg.contexts {
                        let ctx = ctx.masked();
                        println!("\n  {}:", name);
                        println!("    Base URL: {}", ctx.base_url);
                        if !ctx.api_key.is_empty() {
                            println!("    API Key: {}", ctx.api_key);
                        }
                        if ctx.timeout > 0 {
                            println!("    Timeout: {}s", ctx.timeout);
                        }
                        if let Some(retries) = ctx.max_retries {
                            println!("    Max Retries: {}", retries);
                        }
                        if !ctx.default_voice.is_empty() {
                            println!("    Default Voice: {}", ctx.default_voice);
                        }
                        if !ctx.default_lang.is_empty() {
                            println!("    Default Language: {}", ctx.default_lang);
                        }
                        if let Some(rate) = ctx.rate {
                            println!("    Rate: {}", rate);
                        }
                        if let Some(pitch) = ctx.pitch {
                            println!("    Pitch: {}", pitch);
                        }
                    }
                }

                Ok(())
            }
        }
    }
}
