//! Voice catalog commands.

use std::sync::Arc;

use clap::{Args, Subcommand};
use serde::Serialize;

use lingua_tts::{builtin_voices, voices_for_lang, Voice, VoiceResolver, DEFAULT_CLIENT_NAME};

use super::{
    create_fetcher, get_context, load_preferred_voices, output_result, print_success,
    print_verbose,
};
use crate::Cli;

/// Browse voices and set preferences.
///
/// The built-in catalog is used unless --remote asks the synthesis service
/// of the current context for its voices.
#[derive(Args)]
pub struct VoicesCommand {
    #[command(subcommand)]
    command: VoicesSubcommand,

    /// Fetch the catalog from the synthesis service
    #[arg(long, global = true)]
    remote: bool,
}

#[derive(Subcommand)]
enum VoicesSubcommand {
    /// List voices
    List {
        /// Only voices able to speak this language
        #[arg(long)]
        lang: Option<String>,
    },
    /// Show the voice used for a language
    Resolve {
        /// Language tag, e.g. de-DE
        lang: String,
    },
    /// Remember a voice as preferred for its language
    Prefer {
        /// Voice ID
        id: String,
    },
}

#[derive(Serialize)]
struct Resolved<'a> {
    lang: &'a str,
    voice: String,
    preferred: Option<String>,
}

impl VoicesCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        match &self.command {
            VoicesSubcommand::List { lang } => {
                let voices = self.catalog(cli).await?;
                let voices = match lang {
                    Some(lang) => voices_for_lang(&voices, lang),
                    None => voices,
                };
                print_verbose(cli, &format!("{} voices", voices.len()));
                output_result(cli, &voices)
            }

            VoicesSubcommand::Resolve { lang } => {
                let voices = self.catalog(cli).await?;
                let prefs = Arc::new(load_preferred_voices(cli)?);
                let preferred = prefs.get(DEFAULT_CLIENT_NAME, lang);
                let resolver = VoiceResolver::new(DEFAULT_CLIENT_NAME, Arc::new(voices), prefs);
                output_result(
                    cli,
                    &Resolved {
                        lang,
                        voice: resolver.resolve(lang),
                        preferred,
                    },
                )
            }

            VoicesSubcommand::Prefer { id } => {
                let voices = self.catalog(cli).await?;
                let Some(voice) = voices.iter().find(|v| &v.id == id) else {
                    anyhow::bail!("unknown voice '{}'", id);
                };

                let prefs = load_preferred_voices(cli)?;
                prefs.set(DEFAULT_CLIENT_NAME, &voice.lang, &voice.id);
                prefs.save()?;
                print_success(&format!("Preferred voice for {} is now {}", voice.lang, voice.id));
                Ok(())
            }
        }
    }

    async fn catalog(&self, cli: &Cli) -> anyhow::Result<Vec<Voice>> {
        if !self.remote {
            return Ok(builtin_voices());
        }
        let ctx = get_context(cli)?;
        print_verbose(cli, &format!("Using context: {}", ctx.name));
        let fetcher = create_fetcher(&ctx)?;
        Ok(fetcher.list_voices().await?)
    }
}
