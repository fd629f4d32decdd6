//! Lingua TTS CLI - speaks multilingual text through a synthesis service.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{ConfigCommand, SpeakCommand, VoicesCommand};

/// Lingua TTS CLI - speaks multilingual text through a synthesis service.
///
/// This tool allows you to:
///   - Speak plain text or SSML with per-language voices
///   - Browse the voice catalog and pick preferred voices
///
/// Configuration is stored in ~/.lingua/tts/ and supports multiple contexts,
/// similar to kubectl's context management.
#[derive(Parser)]
#[command(name = "lingua-tts")]
#[command(about = "Multilingual text-to-speech CLI tool")]
#[command(version)]
pub struct Cli {
    /// Config file (default is ~/.lingua/tts/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Context name to use
    #[arg(short = 'c', long, global = true)]
    pub context: Option<String>,

    /// Output file (default: stdout)
    #[arg(short = 'o', long, global = true)]
    pub output: Option<String>,

    /// Input file (plain text or SSML)
    #[arg(short = 'f', long = "file", global = true)]
    pub input: Option<String>,

    /// Output as JSON (for piping)
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage CLI configuration
    Config(ConfigCommand),
    /// Browse voices and set preferences
    Voices(VoicesCommand),
    /// Speak text or SSML
    Speak(SpeakCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging: RUST_LOG wins, -v turns on debug output.
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Config(cmd) => cmd.run(&cli).await,
        Commands::Voices(cmd) => cmd.run(&cli).await,
        Commands::Speak(cmd) => cmd.run(&cli).await,
    }
}
