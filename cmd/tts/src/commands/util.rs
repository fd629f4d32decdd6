//! Utility functions for CLI commands.

use std::path::PathBuf;
use std::time::Duration;

use lingua_cli::{load_config, Config, Context, Output, OutputFormat, Paths};
use lingua_tts::{HttpFetcher, PreferredVoices};

use crate::Cli;

pub const APP_NAME: &str = "tts";

/// Gets the global configuration.
pub fn get_config(cli: &Cli) -> anyhow::Result<Config> {
    load_config(APP_NAME, cli.config.as_deref())
}

/// Gets the context configuration to use.
pub fn get_context(cli: &Cli) -> anyhow::Result<Context> {
    let cfg = get_config(cli)?;

    match cfg.resolve_context(cli.context.as_deref()) {
        Some(ctx) => Ok(ctx.clone()),
        None => match cli.context.as_deref() {
            Some(name) => anyhow::bail!("context '{}' not found", name),
            None => anyhow::bail!(
                "no context specified. Use -c flag or set a default context with 'lingua-tts config use-context'"
            ),
        },
    }
}

/// Returns the path of the preferred-voice cache.
///
/// With a custom config file the cache lives next to it, otherwise in
/// ~/.lingua/tts/data.
pub fn preferred_voices_path(cli: &Cli) -> anyhow::Result<PathBuf> {
    if let Some(config) = cli.config.as_deref() {
        let dir = PathBuf::from(config)
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_default();
        return Ok(dir.join("data").join(lingua_cli::paths::PREFERRED_VOICES_FILE));
    }
    Ok(Paths::new(APP_NAME)?.preferred_voices_file())
}

/// Loads the preferred-voice cache.
pub fn load_preferred_voices(cli: &Cli) -> anyhow::Result<PreferredVoices> {
    let path = preferred_voices_path(cli)?;
    print_verbose(cli, &format!("Preferred voices: {}", path.display()));
    Ok(PreferredVoices::load(path)?)
}

/// Creates a synthesis fetcher from context configuration.
pub fn create_fetcher(ctx: &Context) -> anyhow::Result<HttpFetcher> {
    if ctx.base_url.is_empty() {
        anyhow::bail!("context '{}' has no base_url", ctx.name);
    }

    let mut builder = HttpFetcher::builder(&ctx.base_url).api_key(&ctx.api_key);
    if ctx.timeout > 0 {
        builder = builder.timeout(Duration::from_secs(ctx.timeout));
    }
    if let Some(retries) = ctx.max_retries {
        builder = builder.max_retries(retries);
    }

    Ok(builder.build()?)
}

/// Outputs result as JSON or YAML.
pub fn output_result<T: serde::Serialize>(cli: &Cli, result: &T) -> anyhow::Result<()> {
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Yaml
    };
    Output::new(format, cli.output.clone()).write(result)
}

/// Prints verbose output if enabled.
pub fn print_verbose(cli: &Cli, msg: &str) {
    lingua_cli::print_verbose(cli.verbose, msg);
}

pub use lingua_cli::{format_bytes, print_success};
