//! Whitespace and casing helpers shared by every extractor.

use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Trim leading whitespace and collapse every internal run of whitespace to one space.
/// A single trailing newline survives if the input ended with one.
pub fn collapse_whitespace(s: &str) -> String {
    let has_trailing_newline = s.ends_with('\n');
    let body = s.trim_start().trim_end_matches('\n');
    let mut out = WHITESPACE_RUN.replace_all(body, " ").into_owned();
    if has_trailing_newline {
        out.push('\n');
    }
    out
}

/// Remove every whitespace character.
pub fn strip_all_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

/// `collapse_whitespace` with the trailing edge trimmed too; what extractors store.
pub fn clean(s: &str) -> String {
    collapse_whitespace(s).trim_end().to_string()
}

/// Upper-case the first letter of each word and lower-case the rest.
pub fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(|c| c.to_lowercase()))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_internal_runs_and_leading_space() {
        assert_eq!(collapse_whitespace("  Jazz \t in\n\nthe   Park"), "Jazz in the Park");
    }

    #[test]
    fn keeps_one_trailing_newline() {
        assert_eq!(collapse_whitespace("Concert\n\n\n"), "Concert\n");
        assert_eq!(collapse_whitespace("Concert  \n"), "Concert \n");
    }

    #[test]
    fn does_not_trim_trailing_spaces_without_newline() {
        assert_eq!(collapse_whitespace("Concert   "), "Concert ");
    }

    #[test]
    fn empty_and_blank_inputs() {
        assert_eq!(collapse_whitespace(""), "");
        assert_eq!(collapse_whitespace("   "), "");
        assert_eq!(collapse_whitespace(" \n"), "\n");
    }

    #[test]
    fn collapse_is_idempotent() {
        let samples = [
            "",
            "\n",
            "a",
            " a ",
            "a\n",
            "a\n \n",
            "\t\tline one\nline two\r\n",
            "  lots   of\t\tspace \n\n",
            "\u{a0}non-breaking\u{a0}\u{a0}space",
            "trailing space then newline \n",
            "\r\n",
        ];
        for s in samples {
            let once = collapse_whitespace(s);
            assert_eq!(collapse_whitespace(&once), once, "input {s:?}");
        }
    }

    #[test]
    fn strips_all_whitespace() {
        assert_eq!(strip_all_whitespace(" live music,\tfree \n"), "livemusic,free");
    }

    #[test]
    fn clean_trims_both_ends() {
        assert_eq!(clean("\n  Farmers  Market \n"), "Farmers Market");
    }

    #[test]
    fn title_cases_words() {
        assert_eq!(title_case("live MUSIC"), "Live Music");
        assert_eq!(title_case("  food   trucks "), "Food Trucks");
    }
}
