//! Canonical review text, as every model downstream sees it.

use unicode_segmentation::UnicodeSegmentation;
use whatlang::Lang;

///Normalizes raw review text. Lowercases (language aware), replaces emoji with
///`:name:` tags, collapses whitespace and collapses runs of 3+ identical chars to 2.
///Normalizing an already normalized text returns it unchanged.
/// # Example
/// ```
/// use review_pulse::normalize;
/// assert_eq!(normalize("Soooo   GOOD!!! 👍"), "soo good!! :thumbs_up:");
/// assert_eq!(normalize(""), "");
/// ```
pub fn normalize(raw: &str) -> String {
    let lowered = lowercase_for_language(raw);
    let tagged = demojize(&lowered);
    let spaced = collapse_whitespace(&tagged);
    collapse_repeats(&spaced)
}

///Lowercases text. Turkic languages keep the dotted/dotless i distinction.
pub fn lowercase_for_language(text: &str) -> String {
    let turkic = matches!(
        whatlang::detect_lang(text),
        Some(Lang::Tur) | Some(Lang::Aze)
    );
    if !turkic {
        return text.to_lowercase();
    }
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            'I' => out.push('ı'),
            'İ' => out.push('i'),
            other => out.extend(other.to_lowercase()),
        }
    }
    out
}

///Replaces every emoji grapheme with ` :emoji_name: `.
pub fn demojize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for grapheme in text.graphemes(true) {
        match lookup_emoji(grapheme) {
            Some(emoji) => {
                out.push_str(" :");
                out.push_str(&tag_name(emoji.name()));
                out.push_str(": ");
            }
            None => out.push_str(grapheme),
        }
    }
    out
}

fn lookup_emoji(grapheme: &str) -> Option<&'static emojis::Emoji> {
    // Skin tones and variation selectors share the base emoji's tag.
    let base: String = grapheme
        .chars()
        .filter(|c| !matches!(*c, '\u{FE0E}' | '\u{FE0F}' | '\u{1F3FB}'..='\u{1F3FF}'))
        .collect();
    if base.is_empty() || base == grapheme {
        return emojis::get(grapheme);
    }
    emojis::get(&base).or_else(|| emojis::get(grapheme))
}

fn tag_name(name: &str) -> String {
    let mut tag = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_alphanumeric() {
            tag.extend(c.to_lowercase());
        } else if !tag.ends_with('_') && !tag.is_empty() {
            tag.push('_');
        }
    }
    tag.trim_end_matches('_').to_string()
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

///Keeps at most two consecutive identical chars ("soooo" -> "soo").
pub fn collapse_repeats(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last: Option<char> = None;
    let mut run = 0usize;
    for c in text.chars() {
        if Some(c) == last {
            run += 1;
        } else {
            last = Some(c);
            run = 1;
        }
        if run <= 2 {
            out.push(c);
        }
    }
    out
}
