//! Title cleaning, string normalization and search query construction

use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

#[allow(clippy::expect_used)]
static PARENTHESIZED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([^)]*\)").expect("static pattern"));

#[allow(clippy::expect_used)]
static BRACKETED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*\]").expect("static pattern"));

#[allow(clippy::expect_used)]
static FEATURING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*\b(?:feat|ft)\..*$").expect("static pattern"));

/// Strip `(...)` and `[...]` groups and any `feat.`/`ft.` trailer from a track title
///
/// ```
/// use trackfetch::resolver::clean_title;
///
/// assert_eq!(clean_title("Song (Remastered 2011) [Live] feat. Someone"), "Song");
/// ```
pub fn clean_title(title: &str) -> String {
    let without_parens = PARENTHESIZED.replace_all(title, "");
    let without_brackets = BRACKETED.replace_all(&without_parens, "");
    let without_features = FEATURING.replace(&without_brackets, "");
    without_features.trim().to_string()
}

/// Normalize a string for fuzzy containment checks
///
/// Decomposes (NFKD) and drops combining marks, lowercases, keeps only alphanumerics
/// and whitespace, and collapses runs of whitespace into single spaces.
pub fn normalize(s: &str) -> String {
    let folded: String = s
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Search queries for a track, most specific first
pub fn query_variants(title: &str, artist: &str) -> Vec<String> {
    let cleaned = clean_title(title);
    vec![
        format!("{} {} official audio", artist, cleaned),
        format!("{} {} audio", artist, cleaned),
        format!("{} {} official", artist, title),
        format!("{} {}", artist, title),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_title_strips_groups_and_features() {
        assert_eq!(clean_title("Yellow (Remastered)"), "Yellow");
        assert_eq!(clean_title("Intro [Bonus Track]"), "Intro");
        assert_eq!(clean_title("Stay ft. Justin Bieber"), "Stay");
        assert_eq!(clean_title("Stay Feat. Someone (Radio Edit)"), "Stay");
        assert_eq!(clean_title("  Plain Title  "), "Plain Title");
    }

    #[test]
    fn test_clean_title_keeps_words_containing_ft() {
        // "ft" only counts as a featuring marker as a standalone word followed by a dot
        assert_eq!(clean_title("Left Behind"), "Left Behind");
        assert_eq!(clean_title("Craft. Beer"), "Craft. Beer");
    }

    #[test]
    fn test_normalize_folds_accents_case_and_punctuation() {
        assert_eq!(normalize("Beyoncé"), "beyonce");
        assert_eq!(normalize("  Sigur   Rós!  "), "sigur ros");
        assert_eq!(normalize("AC/DC - T.N.T."), "acdc tnt");
    }

    #[test]
    fn test_query_variants_order() {
        let variants = query_variants("Song (Live)", "Band");
        assert_eq!(
            variants,
            vec![
                "Band Song official audio",
                "Band Song audio",
                "Band Song (Live) official",
                "Band Song (Live)",
            ]
        );
    }
}
