//! SSML segmentation.
//!
//! Splits an utterance written in a small SSML subset into speakable
//! [`Segment`]s, one per language run or `<mark/>`. The parser is lenient:
//! malformed markup never fails, it degrades to plain text in the default
//! language.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::warn;

use crate::voice::language_of_voice;

/// Default maximum number of characters per segment.
pub const DEFAULT_MAX_SEGMENT_CHARS: usize = 1000;

static TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?s)<!--.*?-->|<\?.*?\?>|<![A-Za-z][^>]*>|<(/?)\s*([A-Za-z_][\w:.\-]*)([^<>]*?)(/?)>",
    )
    .expect("valid tag pattern")
});

static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([A-Za-z_][\w:.\-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("valid attribute pattern")
});

static ENTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[A-Za-z]+);").expect("valid entity pattern")
});

/// One unit of speakable text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Text to speak, never empty.
    pub text: String,
    /// Language tag, e.g. `en-US`.
    pub language: String,
    /// Identifier unique within one utterance.
    pub name: String,
}

/// Splits SSML markup into segments.
#[derive(Debug, Clone)]
pub struct Segmenter {
    /// Maximum number of characters allowed in each segment.
    /// Longer language runs are split at sentence boundaries.
    /// Zero disables splitting. Defaults to 1000.
    pub max_chars_per_segment: usize,
}

impl Default for Segmenter {
    fn default() -> Self {
        Self {
            max_chars_per_segment: DEFAULT_MAX_SEGMENT_CHARS,
        }
    }
}

impl Segmenter {
    /// Creates a new segmenter with the specified max chars per segment.
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars_per_segment: max_chars,
        }
    }

    /// Segments the markup. Text outside any element carrying a language
    /// inherits `default_language`.
    pub fn segment(&self, markup: &str, default_language: &str) -> Vec<Segment> {
        if markup.trim().is_empty() {
            return Vec::new();
        }

        let runs = parse_runs(markup, default_language).unwrap_or_else(|| {
            warn!(len = markup.len(), "ssml: malformed markup, speaking it as plain text");
            vec![Run {
                text: collapse_whitespace(markup),
                language: default_language.to_string(),
                mark: None,
            }]
        });

        let mut used = HashSet::new();
        let mut segments = Vec::new();
        for run in runs {
            let pieces = split_text(&run.text, self.max_chars_per_segment);
            for (i, text) in pieces.into_iter().enumerate() {
                let mark = if i == 0 { run.mark.clone() } else { None };
                let name = unique_name(mark, segments.len(), &mut used);
                segments.push(Segment {
                    text,
                    language: run.language.clone(),
                    name,
                });
            }
        }
        segments
    }
}

/// Returns true if the input should be read as markup.
///
/// A `<speak>` root always counts, even when malformed. Any other input
/// starting with `<` counts when it parses, so bare fragments such as
/// `<lang xml:lang="de">Welt</lang>` keep their language runs.
pub fn is_ssml(input: &str) -> bool {
    let input = input.trim_start();
    input.starts_with("<speak") || (input.starts_with('<') && parse_runs(input, "").is_some())
}

/// Escapes text for use inside SSML.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Wraps plain text into a single-language SSML document.
pub fn wrap_plain(text: &str, language: &str) -> String {
    format!(
        r#"<speak version="1.0" xml:lang="{}">{}</speak>"#,
        escape(language),
        escape(text)
    )
}

/// Text collected between two segment boundaries.
struct Run {
    text: String,
    language: String,
    mark: Option<String>,
}

/// An open element.
struct Frame {
    name: String,
    language: String,
    boundary: bool,
}

/// Parses markup into language runs. Returns `None` on malformed input.
fn parse_runs(markup: &str, default_language: &str) -> Option<Vec<Run>> {
    let mut stack: Vec<Frame> = Vec::new();
    let mut runs = Vec::new();
    let mut current = Run {
        text: String::new(),
        language: default_language.to_string(),
        mark: None,
    };
    let mut last = 0;

    for caps in TAG_RE.captures_iter(markup) {
        let whole = caps.get(0)?;
        push_text(&mut current.text, &markup[last..whole.start()])?;
        last = whole.end();

        // Comments, processing instructions and doctypes.
        let Some(name) = caps.get(2).map(|m| m.as_str()) else {
            continue;
        };
        let closing = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
        let self_closing = caps.get(4).is_some_and(|m| !m.as_str().is_empty());
        let attrs = caps.get(3).map_or("", |m| m.as_str());
        let local = local_name(name);

        if closing {
            let frame = stack.pop()?;
            if frame.name != name {
                return None;
            }
            if frame.boundary {
                flush(&mut runs, &mut current);
                current.language = stack
                    .last()
                    .map_or_else(|| default_language.to_string(), |f| f.language.clone());
            }
            continue;
        }

        match local.as_str() {
            "mark" => {
                flush(&mut runs, &mut current);
                current.mark = attribute(attrs, "name").filter(|n| !n.is_empty());
            }
            "break" => current.text.push(' '),
            _ => {
                if let Some(language) = element_language(&local, attrs) {
                    if !self_closing {
                        flush(&mut runs, &mut current);
                        current.language = language.clone();
                        stack.push(Frame {
                            name: name.to_string(),
                            language,
                            boundary: true,
                        });
                    }
                    continue;
                }
            }
        }

        if !self_closing {
            stack.push(Frame {
                name: name.to_string(),
                language: current.language.clone(),
                boundary: false,
            });
        }
    }

    push_text(&mut current.text, &markup[last..])?;
    if !stack.is_empty() {
        return None;
    }
    flush(&mut runs, &mut current);
    Some(runs)
}

/// Appends raw character data, rejecting stray `<`.
fn push_text(buf: &mut String, raw: &str) -> Option<()> {
    if raw.contains('<') {
        return None;
    }
    buf.push_str(&decode_entities(raw));
    Some(())
}

/// Moves the buffered text into a run. A pending mark survives an empty
/// buffer so it still names the next text.
fn flush(runs: &mut Vec<Run>, current: &mut Run) {
    let text = collapse_whitespace(&current.text);
    current.text.clear();
    if text.is_empty() {
        return;
    }
    runs.push(Run {
        text,
        language: current.language.clone(),
        mark: current.mark.take(),
    });
}

fn local_name(name: &str) -> String {
    name.rsplit(':').next().unwrap_or(name).to_ascii_lowercase()
}

fn attribute(attrs: &str, key: &str) -> Option<String> {
    ATTR_RE
        .captures_iter(attrs)
        .find(|c| c[1].eq_ignore_ascii_case(key))
        .map(|c| {
            let value = c.get(2).or_else(|| c.get(3)).map_or("", |m| m.as_str());
            decode_entities(value).trim().to_string()
        })
}

/// Returns the language an element switches to, if any.
fn element_language(local: &str, attrs: &str) -> Option<String> {
    let explicit = attribute(attrs, "xml:lang")
        .or_else(|| attribute(attrs, "lang"))
        .filter(|l| !l.is_empty());
    if explicit.is_some() {
        return explicit;
    }
    if local == "voice" {
        return attribute(attrs, "name").and_then(|n| language_of_voice(&n));
    }
    None
}

fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    ENTITY_RE
        .replace_all(raw, |caps: &Captures| {
            let entity = &caps[1];
            let decoded = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .map(|hex| u32::from_str_radix(hex, 16).ok())
                    .unwrap_or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                    .and_then(char::from_u32),
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn unique_name(mark: Option<String>, index: usize, used: &mut HashSet<String>) -> String {
    let base = match mark {
        Some(m) if !used.contains(&m) => m,
        _ => format!("seg-{index}"),
    };
    let mut name = base.clone();
    let mut n = 1;
    while used.contains(&name) {
        name = format!("{base}-{n}");
        n += 1;
    }
    used.insert(name.clone());
    name
}

/// Splits text into pieces of at most `max_chars` characters.
fn split_text(text: &str, max_chars: usize) -> Vec<String> {
    if max_chars == 0 || text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut pieces = Vec::new();
    let mut rest = text;
    while rest.chars().count() > max_chars {
        let (head, tail) = rest.split_at(find_split(rest, max_chars));
        let head = head.trim();
        if !head.is_empty() {
            pieces.push(head.to_string());
        }
        rest = tail.trim_start();
    }
    if !rest.is_empty() {
        pieces.push(rest.to_string());
    }
    pieces
}

/// Returns the byte index to split at. Prefers the last sentence boundary
/// within the limit, then the last whitespace, then a hard cut.
/// `s` must be longer than `max_chars` characters.
fn find_split(s: &str, max_chars: usize) -> usize {
    let indexed: Vec<(usize, char)> = s.char_indices().take(max_chars + 1).collect();
    let chars: Vec<char> = indexed.iter().map(|&(_, c)| c).collect();
    let limit = max_chars.min(chars.len());

    for i in (0..limit).rev() {
        if is_sentence_boundary(chars[i], i, &chars) {
            return indexed[i].0 + chars[i].len_utf8();
        }
    }
    for i in (1..limit).rev() {
        if chars[i].is_whitespace() {
            return indexed[i].0;
        }
    }
    indexed.get(limit).map_or(s.len(), |&(b, _)| b)
}

/// Checks if a character ends a sentence.
fn is_sentence_boundary(c: char, idx: usize, chars: &[char]) -> bool {
    let prev = if idx > 0 { chars[idx - 1] } else { ' ' };
    let next = chars.get(idx + 1).copied().unwrap_or(' ');

    match c {
        // Decimal numbers and times (9.9, 10:15)
        '.' | ':' => !(next.is_ascii_digit() && prev.is_ascii_digit()),
        '。' | '？' | '！' | '；' | '…' | '?' | '!' | ';' => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(segments: &[Segment]) -> Vec<&str> {
        segments.iter().map(|s| s.text.as_str()).collect()
    }

    #[test]
    fn test_plain_text_inherits_default_language() {
        let segments = Segmenter::default().segment("Hello world", "en-US");
        assert_eq!(
            segments,
            vec![Segment {
                text: "Hello world".into(),
                language: "en-US".into(),
                name: "seg-0".into(),
            }]
        );
    }

    #[test]
    fn test_empty_input() {
        let segmenter = Segmenter::default();
        assert!(segmenter.segment("", "en").is_empty());
        assert!(segmenter.segment("   \n\t", "en").is_empty());
        assert!(segmenter.segment("<speak xml:lang=\"en\">  </speak>", "en").is_empty());
    }

    #[test]
    fn test_language_boundaries() {
        let markup = r#"<speak xml:lang="en-US"><lang xml:lang="en-US">Hello</lang><lang xml:lang="de-DE">Welt</lang></speak>"#;
        let segments = Segmenter::default().segment(markup, "fr-FR");

        assert_eq!(texts(&segments), vec!["Hello", "Welt"]);
        assert_eq!(segments[0].language, "en-US");
        assert_eq!(segments[1].language, "de-DE");
        assert_eq!(segments[0].name, "seg-0");
        assert_eq!(segments[1].name, "seg-1");
    }

    #[test]
    fn test_text_outside_boundary_returns_to_parent_language() {
        let markup = r#"<speak>Das Wort <lang xml:lang="en-GB">apple</lang> heißt Apfel.</speak>"#;
        let segments = Segmenter::default().segment(markup, "de-DE");

        assert_eq!(texts(&segments), vec!["Das Wort", "apple", "heißt Apfel."]);
        let langs: Vec<_> = segments.iter().map(|s| s.language.as_str()).collect();
        assert_eq!(langs, vec!["de-DE", "en-GB", "de-DE"]);
    }

    #[test]
    fn test_voice_name_sets_language() {
        let markup = r#"<speak><voice name="ja-JP-NanamiNeural">こんにちは</voice></speak>"#;
        let segments = Segmenter::default().segment(markup, "en");
        assert_eq!(segments[0].language, "ja-JP");
    }

    #[test]
    fn test_marks_name_segments() {
        let markup = r#"<speak xml:lang="en"><mark name="s1"/>First sentence. <mark name="s2"/>Second one.</speak>"#;
        let segments = Segmenter::default().segment(markup, "en");

        assert_eq!(texts(&segments), vec!["First sentence.", "Second one."]);
        assert_eq!(segments[0].name, "s1");
        assert_eq!(segments[1].name, "s2");
    }

    #[test]
    fn test_mark_before_language_switch_names_next_text() {
        let markup = r#"<speak><mark name="w"/><lang xml:lang="it-IT">ciao</lang></speak>"#;
        let segments = Segmenter::default().segment(markup, "en");
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].name, "w");
        assert_eq!(segments[0].language, "it-IT");
    }

    #[test]
    fn test_names_are_unique() {
        let markup = r#"<speak><mark name="a"/>one <mark name="a"/>two <mark name="seg-2"/>three</speak>"#;
        let segments = Segmenter::default().segment(markup, "en");
        let names: HashSet<_> = segments.iter().map(|s| s.name.clone()).collect();
        assert_eq!(names.len(), segments.len());
        assert_eq!(segments[0].name, "a");
    }

    #[test]
    fn test_formatting_elements_are_transparent() {
        let markup = r#"<speak><prosody rate="slow">very <emphasis>slow</emphasis></prosody><break time="200ms"/>text</speak>"#;
        let segments = Segmenter::default().segment(markup, "en");
        assert_eq!(texts(&segments), vec!["very slow text"]);
    }

    #[test]
    fn test_entities_are_decoded() {
        let segments = Segmenter::default().segment("<speak>Tom &amp; Jerry &lt;3 &#233;t&#xE9;</speak>", "en");
        assert_eq!(segments[0].text, "Tom & Jerry <3 été");
    }

    #[test]
    fn test_malformed_markup_degrades_to_plain_text() {
        let segmenter = Segmenter::default();

        let markup = r#"<speak>Hello <lang xml:lang="de">Welt</speak>"#;
        let segments = segmenter.segment(markup, "en-US");
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, markup);
        assert_eq!(segments[0].language, "en-US");

        let segments = segmenter.segment("a < b", "en");
        assert_eq!(texts(&segments), vec!["a < b"]);

        let segments = segmenter.segment("<speak>unclosed", "en");
        assert_eq!(texts(&segments), vec!["<speak>unclosed"]);
    }

    #[test]
    fn test_malformed_markup_respects_max_chars() {
        let segmenter = Segmenter::new(20);
        let markup = "<speak>First sentence here. Second one <b>follows.";
        let segments = segmenter.segment(markup, "en");

        assert!(segments.len() > 1);
        assert!(segments.iter().all(|s| s.text.chars().count() <= 20));
        assert!(segments.iter().all(|s| s.language == "en"));
        assert_eq!(segments[0].name, "seg-0");
        assert_eq!(texts(&segments).join(" "), markup);
    }

    #[test]
    fn test_is_ssml() {
        assert!(is_ssml("<speak>Hi</speak>"));
        assert!(is_ssml("  <speak>unclosed"));
        assert!(is_ssml(r#"<lang xml:lang="de">Welt</lang>"#));
        assert!(is_ssml(r#"<mark name="a"/>Hello"#));

        assert!(!is_ssml("Hello <b>world</b>"));
        assert!(!is_ssml("<3 you"));
        assert!(!is_ssml("<lang>unclosed"));
    }

    #[test]
    fn test_concatenation_preserves_order() {
        let markup = r#"<speak>one <lang xml:lang="de">zwei</lang> three <mark name="m"/>four <voice name="fr-FR-HenriNeural">cinq</voice></speak>"#;
        let segments = Segmenter::default().segment(markup, "en");
        let joined = texts(&segments).join(" ");
        assert_eq!(joined, "one zwei three four cinq");
    }

    #[test]
    fn test_long_runs_split_at_sentence_boundary() {
        let segmenter = Segmenter::new(20);
        let segments = segmenter.segment("Pi is 3.14 exactly. Then more text follows here.", "en");

        assert!(segments.iter().all(|s| s.text.chars().count() <= 20));
        assert_eq!(segments[0].text, "Pi is 3.14 exactly.");
        assert_eq!(
            texts(&segments).join(" "),
            "Pi is 3.14 exactly. Then more text follows here."
        );
        let names: HashSet<_> = segments.iter().map(|s| s.name.clone()).collect();
        assert_eq!(names.len(), segments.len());
    }

    #[test]
    fn test_split_without_boundary() {
        assert_eq!(split_text("abcdefgh", 3), vec!["abc", "def", "gh"]);
        assert_eq!(split_text("aaa bbb ccc", 5), vec!["aaa", "bbb", "ccc"]);
        assert_eq!(split_text("short", 0), vec!["short"]);
    }

    #[test]
    fn test_is_sentence_boundary() {
        let chars: Vec<char> = "Hello. World".chars().collect();
        assert!(is_sentence_boundary('.', 5, &chars));

        let chars: Vec<char> = "3.14".chars().collect();
        assert!(!is_sentence_boundary('.', 1, &chars));

        let chars: Vec<char> = "10:30".chars().collect();
        assert!(!is_sentence_boundary(':', 2, &chars));
    }

    #[test]
    fn test_wrap_plain_round_trip() {
        let text = "Tom & Jerry say \"1 < 2\"";
        let markup = wrap_plain(text, "en-GB");
        assert!(is_ssml(&markup));

        let segments = Segmenter::default().segment(&markup, "en");
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, text);
        assert_eq!(segments[0].language, "en-GB");
    }
}
