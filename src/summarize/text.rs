//! Text helpers for the summarizer: content cleaning, word-bounded
//! truncation, the local sentence-based fallback, and summary post-processing.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_BLOCKS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)\s*>").expect("block regex")
});
static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
static RE_DISALLOWED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[^\p{L}\p{N}\s.,!?'"\-]"#).expect("charset regex"));
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("ws regex"));

/// Strip markup, drop everything but letters, digits, whitespace and
/// `. , ! ? - ' "`, then collapse whitespace.
pub fn clean_content(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s);
    let out = RE_BLOCKS.replace_all(&decoded, " ");
    let out = RE_TAGS.replace_all(&out, " ");
    let out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");
    let out = RE_DISALLOWED.replace_all(&out, "");
    let out = RE_WS.replace_all(&out, " ");
    out.trim().to_string()
}

pub fn word_count(s: &str) -> usize {
    s.split_whitespace().count()
}

/// First `limit` whitespace-separated words, single-space joined.
pub fn truncate_words(s: &str, limit: usize) -> String {
    s.split_whitespace().take(limit).collect::<Vec<_>>().join(" ")
}

/// Split after `.`, `!` or `?` when followed by whitespace.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut prev_terminal = false;
    for (i, ch) in text.char_indices() {
        if prev_terminal && ch.is_whitespace() {
            let s = text[start..i].trim();
            if !s.is_empty() {
                out.push(s);
            }
            start = i;
        }
        prev_terminal = matches!(ch, '.' | '!' | '?');
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

/// Local summary: whole sentences in order until the next one would push the
/// total past `word_limit`.
pub fn fallback_summary(content: &str, word_limit: usize) -> String {
    let mut picked: Vec<&str> = Vec::new();
    let mut words = 0;
    for sentence in split_sentences(content) {
        let n = word_count(sentence);
        if words + n > word_limit {
            break;
        }
        picked.push(sentence);
        words += n;
    }
    picked.join(" ")
}

/// Final shape of every summary, whichever source produced it: cleaned, at
/// most `word_limit` words, no dangling `, ; : -`, ends in `.`, `!` or `?`.
pub fn format_summary(raw: &str, word_limit: usize) -> String {
    let cleaned = clean_content(raw);
    let mut out = if word_count(&cleaned) > word_limit {
        truncate_words(&cleaned, word_limit)
    } else {
        cleaned
    };

    let trimmed_len = out
        .trim_end_matches(|c: char| matches!(c, ',' | ';' | ':' | '-') || c.is_whitespace())
        .len();
    out.truncate(trimmed_len);

    if out.is_empty() {
        return out;
    }
    if !out.ends_with(['.', '!', '?']) {
        out.push('.');
    }
    out
}

/// Plain word truncation of raw article content, used when no summary could
/// be produced at all.
pub fn plain_excerpt(content: &str, word_limit: usize) -> String {
    let cleaned = clean_content(content);
    if word_count(&cleaned) <= word_limit {
        return cleaned;
    }
    format!("{}\u{2026}", truncate_words(&cleaned, word_limit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_strips_markup_and_odd_chars() {
        let s = "<p>Hello&nbsp;<b>world</b>!</p>\n<script>alert(1)</script> {ignore} the $100 <i>“quote”</i>";
        assert_eq!(clean_content(s), "Hello world ! ignore the 100 \"quote\"");
    }

    #[test]
    fn clean_keeps_unicode_letters() {
        assert_eq!(clean_content("Zprávy  z\tPrahy: útok?"), "Zprávy z Prahy útok?");
    }

    #[test]
    fn sentences_split_on_terminal_punctuation() {
        let s = "One two. Three four! Five? Six 3.5 seven";
        assert_eq!(
            split_sentences(s),
            vec!["One two.", "Three four!", "Five?", "Six 3.5 seven"]
        );
    }

    #[test]
    fn fallback_keeps_whole_sentences_within_limit() {
        let s = "A b c. D e f. G h i j.";
        assert_eq!(fallback_summary(s, 6), "A b c. D e f.");
        assert_eq!(fallback_summary(s, 5), "A b c.");
        assert_eq!(fallback_summary(s, 2), "");
        assert_eq!(fallback_summary("", 100), "");
    }

    #[test]
    fn format_truncates_to_exact_limit_with_terminal_punctuation() {
        let limit = 100;
        let text = (0..limit + 5)
            .map(|i| format!("w{i}"))
            .collect::<Vec<_>>()
            .join(" ");
        let out = format_summary(&text, limit);
        assert_eq!(word_count(&out), limit);
        assert!(out.ends_with('.'));
        assert!(out.starts_with("w0 w1"));
    }

    #[test]
    fn format_trims_orphan_punctuation() {
        assert_eq!(format_summary("Markets fell sharply,", 100), "Markets fell sharply.");
        assert_eq!(format_summary("Is it over? ", 100), "Is it over?");
        assert_eq!(format_summary("Talks continue -", 100), "Talks continue.");
        assert_eq!(format_summary("  ", 100), "");
    }

    #[test]
    fn excerpt_marks_truncation() {
        assert_eq!(plain_excerpt("<p>a b c</p>", 5), "a b c");
        assert_eq!(plain_excerpt("a b c d", 2), "a b\u{2026}");
    }
}
