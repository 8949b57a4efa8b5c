//! Text normalisation shared by the query engine, grouping and renderers.

use std::sync::OnceLock;

use regex::Regex;

fn whitespace_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("whitespace pattern is valid"))
}

/// Collapse every run of whitespace (including line breaks) into one space
/// and trim the ends.
pub fn collapse_whitespace(s: &str) -> String {
    whitespace_run().replace_all(s.trim(), " ").into_owned()
}

/// The first `max_chars` characters of `s` (not bytes).
pub fn take_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Single-line form of `s`, truncated to `max_chars` characters with a
/// trailing `...` when something was cut.
pub fn shorten(s: &str, max_chars: usize) -> String {
    let collapsed = collapse_whitespace(s);
    let head = take_chars(&collapsed, max_chars);
    if head.len() == collapsed.len() {
        collapsed
    } else {
        format!("{head}...")
    }
}

/// Replace CR/LF sequences with single spaces, leaving other spacing intact.
pub fn flatten_newlines(s: &str) -> String {
    s.replace("\r\n", " ").replace(['\n', '\r'], " ")
}

/// Case-insensitive substring test that also folds non-ASCII letters.
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a\r\n\tb   c \n"), "a b c");
    }

    #[test]
    fn test_take_chars_is_char_based() {
        assert_eq!(take_chars("ñandú", 3), "ñan");
        assert_eq!(take_chars("abc", 10), "abc");
    }

    #[test]
    fn test_shorten_adds_ellipsis_only_when_cut() {
        assert_eq!(shorten("hola\nmundo", 220), "hola mundo");
        let long = "x".repeat(300);
        let short = shorten(&long, 220);
        assert_eq!(short.chars().count(), 223);
        assert!(short.ends_with("..."));
    }

    #[test]
    fn test_contains_ignore_case_non_ascii() {
        assert!(contains_ignore_case("ACCESO DENEGADO.", "acceso denegado"));
        assert!(contains_ignore_case("ÉXITO", "éxito"));
    }
}
