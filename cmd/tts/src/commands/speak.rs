//! Speak command.

use std::sync::Arc;

use clap::Args;

use lingua_tts::{
    builtin_voices, Event, FileSink, TtsClient, DEFAULT_BYTES_PER_SECOND, DEFAULT_PRIMARY_LANG,
};

use super::{
    create_fetcher, format_bytes, get_context, load_preferred_voices, print_success,
    print_verbose,
};
use crate::Cli;

/// Speak plain text or SSML.
///
/// Text comes from the argument, or from the file given with -f. Input
/// starting with <speak is treated as SSML. Press Ctrl-C to stop.
#[derive(Args)]
pub struct SpeakCommand {
    /// Text to speak
    text: Option<String>,

    /// Language of plain text (default: context default_lang, then "en")
    #[arg(long)]
    lang: Option<String>,

    /// Voice to use; also becomes the preferred voice for its language
    #[arg(long)]
    voice: Option<String>,

    /// Speaking rate multiplier, about 0.5 to 2.0
    #[arg(long)]
    rate: Option<f64>,

    /// Pitch multiplier, about 0.5 to 1.5
    #[arg(long)]
    pitch: Option<f64>,

    /// Write each segment's audio into this directory
    #[arg(long)]
    out_dir: Option<String>,

    /// Pace playback in real time
    #[arg(long)]
    realtime: bool,

    /// Fetch the voice catalog from the synthesis service
    #[arg(long)]
    remote_voices: bool,
}

impl SpeakCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let input = self.input(cli)?;
        let ctx = get_context(cli)?;
        print_verbose(cli, &format!("Using context: {}", ctx.name));

        let fetcher = create_fetcher(&ctx)?;
        let catalog = if self.remote_voices {
            fetcher.list_voices().await?
        } else {
            builtin_voices()
        };

        let mut sink = match &self.out_dir {
            Some(dir) => FileSink::new(dir),
            None => FileSink::discard(),
        };
        if self.realtime {
            sink = sink.paced(DEFAULT_BYTES_PER_SECOND);
        }

        let lang = self
            .lang
            .clone()
            .or_else(|| (!ctx.default_lang.is_empty()).then(|| ctx.default_lang.clone()))
            .unwrap_or_else(|| DEFAULT_PRIMARY_LANG.to_string());

        let client = TtsClient::builder(Arc::new(fetcher))
            .catalog(catalog)
            .preferred_voices(Arc::new(load_preferred_voices(cli)?))
            .sink(sink)
            .primary_lang(&lang)
            .rate(self.rate.or(ctx.rate).unwrap_or(1.0))
            .pitch(self.pitch.or(ctx.pitch).unwrap_or(1.0))
            .build();

        if !client.init().await {
            anyhow::bail!("synthesis service at {} is not usable", ctx.base_url);
        }

        let voice = self
            .voice
            .clone()
            .or_else(|| (!ctx.default_voice.is_empty()).then(|| ctx.default_voice.clone()));
        if let Some(voice) = voice {
            if !client.set_voice(&voice) {
                anyhow::bail!("unknown voice '{}'", voice);
            }
        }

        print_verbose(
            cli,
            &format!("Speaking {} in {} with {}", format_bytes(input.len()), lang, client.voice_id()),
        );

        let mut events = client.speak(&input)?;
        let mut failure = None;
        let mut segments = 0;

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    report(cli, &event)?;
                    match &event {
                        Event::End { .. } => segments += 1,
                        Event::Error { .. } if event.is_failure() => {
                            failure = Some(event.message().to_string());
                        }
                        _ => {}
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    print_verbose(cli, "Interrupted, stopping");
                    client.stop();
                }
            }
        }
        client.shutdown().await;

        if let Some(message) = failure {
            anyhow::bail!("speech failed: {}", message);
        }
        print_success(&format!("Spoke {} segment(s)", segments));
        Ok(())
    }

    fn input(&self, cli: &Cli) -> anyhow::Result<String> {
        match (&self.text, cli.input.as_deref()) {
            (Some(text), None) => Ok(text.clone()),
            (None, Some(path)) => Ok(std::fs::read_to_string(path)?),
            (Some(_), Some(_)) => anyhow::bail!("give either TEXT or -f, not both"),
            (None, None) => anyhow::bail!("nothing to speak, pass TEXT or use -f"),
        }
    }
}

/// Prints one event, as a JSON line with --json.
fn report(cli: &Cli, event: &Event) -> anyhow::Result<()> {
    if cli.json {
        println!("{}", serde_json::to_string(event)?);
    } else {
        println!("{:<9} {:<12} {}", event.code(), event.mark().unwrap_or("-"), event.message());
    }
    Ok(())
}
