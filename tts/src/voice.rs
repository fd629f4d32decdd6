//! Voice catalog and voice resolution.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::prefs::PreferredVoices;

/// Voice used when the catalog offers nothing better.
pub const DEFAULT_VOICE_ID: &str = "en-US-AriaNeural";

/// A selectable synthesis voice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    /// Voice identifier, unique within a catalog.
    pub id: String,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// Language tag, e.g. `de-DE`.
    pub lang: String,

    /// Voice gender as reported by the service.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub gender: String,

    /// True while the owning client is not initialized.
    #[serde(default)]
    pub disabled: bool,
}

impl Voice {
    /// Creates an enabled voice.
    pub fn new(id: impl Into<String>, name: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            lang: lang.into(),
            gender: String::new(),
            disabled: false,
        }
    }

    fn with_gender(mut self, gender: &str) -> Self {
        self.gender = gender.to_string();
        self
    }
}

/// Returns the static catalog of neural voices.
pub fn builtin_voices() -> Vec<Voice> {
    const VOICES: &[(&str, &str, &str, &str)] = &[
        ("en-US-AriaNeural", "Aria", "en-US", "Female"),
        ("en-US-JennyNeural", "Jenny", "en-US", "Female"),
        ("en-US-GuyNeural", "Guy", "en-US", "Male"),
        ("en-GB-SoniaNeural", "Sonia", "en-GB", "Female"),
        ("en-GB-RyanNeural", "Ryan", "en-GB", "Male"),
        ("en-AU-NatashaNeural", "Natasha", "en-AU", "Female"),
        ("de-DE-KatjaNeural", "Katja", "de-DE", "Female"),
        ("de-DE-ConradNeural", "Conrad", "de-DE", "Male"),
        ("fr-FR-DeniseNeural", "Denise", "fr-FR", "Female"),
        ("fr-FR-HenriNeural", "Henri", "fr-FR", "Male"),
        ("es-ES-ElviraNeural", "Elvira", "es-ES", "Female"),
        ("es-ES-AlvaroNeural", "Alvaro", "es-ES", "Male"),
        ("es-MX-DaliaNeural", "Dalia", "es-MX", "Female"),
        ("it-IT-ElsaNeural", "Elsa", "it-IT", "Female"),
        ("it-IT-DiegoNeural", "Diego", "it-IT", "Male"),
        ("pt-BR-FranciscaNeural", "Francisca", "pt-BR", "Female"),
        ("pt-PT-RaquelNeural", "Raquel", "pt-PT", "Female"),
        ("nl-NL-ColetteNeural", "Colette", "nl-NL", "Female"),
        ("pl-PL-ZofiaNeural", "Zofia", "pl-PL", "Female"),
        ("ru-RU-SvetlanaNeural", "Svetlana", "ru-RU", "Female"),
        ("ja-JP-NanamiNeural", "Nanami", "ja-JP", "Female"),
        ("ja-JP-KeitaNeural", "Keita", "ja-JP", "Male"),
        ("ko-KR-SunHiNeural", "SunHi", "ko-KR", "Female"),
        ("zh-CN-XiaoxiaoNeural", "Xiaoxiao", "zh-CN", "Female"),
        ("zh-CN-YunxiNeural", "Yunxi", "zh-CN", "Male"),
    ];

    let mut voices: Vec<Voice> = VOICES
        .iter()
        .map(|&(id, name, lang, gender)| Voice::new(id, name, lang).with_gender(gender))
        .collect();
    sort_voices(&mut voices);
    voices
}

/// Sorts voices by language, then by display name.
pub fn sort_voices(voices: &mut [Voice]) {
    voices.sort_by(|a, b| a.lang.cmp(&b.lang).then_with(|| a.name.cmp(&b.name)));
}

/// Returns the primary language subtag, lowercased (`"en-US"` → `"en"`).
pub fn primary_subtag(lang: &str) -> String {
    lang.split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// Derives the language of a voice from an id such as `de-DE-KatjaNeural`.
pub fn language_of_voice(voice_id: &str) -> Option<String> {
    let mut parts = voice_id.split('-');
    let lang = parts.next()?;
    let region = parts.next()?;
    let is_lang = (2..=3).contains(&lang.len()) && lang.chars().all(|c| c.is_ascii_alphabetic());
    let is_region = region.len() == 2 && region.chars().all(|c| c.is_ascii_alphabetic());
    (is_lang && is_region).then(|| format!("{lang}-{region}"))
}

fn same_language(voice_lang: &str, lang: &str) -> bool {
    !lang.is_empty() && primary_subtag(voice_lang) == primary_subtag(lang)
}

fn is_english_pool(voice_lang: &str) -> bool {
    voice_lang.eq_ignore_ascii_case("en-US") || voice_lang.eq_ignore_ascii_case("en-GB")
}

/// Returns the voices that can speak `lang`, sorted.
pub fn voices_for_lang(catalog: &[Voice], lang: &str) -> Vec<Voice> {
    let english = primary_subtag(lang) == "en";
    let mut voices: Vec<Voice> = catalog
        .iter()
        .filter(|v| same_language(&v.lang, lang) || (english && is_english_pool(&v.lang)))
        .cloned()
        .collect();
    sort_voices(&mut voices);
    voices
}

/// Picks a voice for `language`. First match wins:
///
/// 1. the preferred voice, if it is still in the catalog and enabled;
/// 2. an enabled voice with the same primary subtag, exact tag first;
/// 3. for English, any enabled `en-US` or `en-GB` voice;
/// 4. the first enabled voice;
/// 5. [`DEFAULT_VOICE_ID`].
pub fn resolve_voice(preferred: Option<&str>, catalog: &[Voice], language: &str) -> String {
    let enabled = || catalog.iter().filter(|v| !v.disabled);

    if let Some(id) = preferred {
        if enabled().any(|v| v.id == id) {
            return id.to_string();
        }
    }

    if let Some(v) = enabled().find(|v| v.lang.eq_ignore_ascii_case(language)) {
        return v.id.clone();
    }
    if let Some(v) = enabled().find(|v| same_language(&v.lang, language)) {
        return v.id.clone();
    }

    if language.to_ascii_lowercase().starts_with("en") {
        if let Some(v) = enabled().find(|v| is_english_pool(&v.lang)) {
            return v.id.clone();
        }
    }

    if let Some(v) = enabled().next() {
        return v.id.clone();
    }

    DEFAULT_VOICE_ID.to_string()
}

/// Resolves voices for one client against a catalog snapshot.
#[derive(Clone)]
pub struct VoiceResolver {
    client_name: String,
    catalog: Arc<Vec<Voice>>,
    prefs: Arc<PreferredVoices>,
}

impl VoiceResolver {
    /// Creates a resolver.
    pub fn new(
        client_name: impl Into<String>,
        catalog: Arc<Vec<Voice>>,
        prefs: Arc<PreferredVoices>,
    ) -> Self {
        Self {
            client_name: client_name.into(),
            catalog,
            prefs,
        }
    }

    /// Returns the voice id to use for `language`.
    pub fn resolve(&self, language: &str) -> String {
        let preferred = self.prefs.get(&self.client_name, language);
        let id = resolve_voice(preferred.as_deref(), &self.catalog, language);
        debug!(lang = %language, voice = %id, "tts: voice resolved");
        id
    }
}
