//! URL slugs derived from titles

use std::collections::HashSet;

/// Longest slug produced by [`generate_slug`], before any uniqueness suffix
pub const MAX_SLUG_LENGTH: usize = 80;

const FALLBACK_SLUG: &str = "untitled";

/// Turn a title into a lower-case, hyphen separated ASCII slug.
///
/// Latin diacritics are folded (`é` → `e`, `ß` → `ss`), apostrophes are
/// dropped, and every other run of non-alphanumeric characters becomes a
/// single hyphen. Titles with nothing usable yield `"untitled"`.
pub fn generate_slug(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_separator = false;

    for c in title.chars().flat_map(char::to_lowercase) {
        if matches!(c, '\'' | '\u{2019}' | '\u{2018}') {
            continue;
        }

        let folded = fold(c);
        if folded.is_empty() {
            pending_separator = true;
            continue;
        }

        if pending_separator && !slug.is_empty() {
            slug.push('-');
        }
        pending_separator = false;
        slug.push_str(folded);
    }

    if slug.len() > MAX_SLUG_LENGTH {
        slug.truncate(MAX_SLUG_LENGTH);
        while slug.ends_with('-') {
            slug.pop();
        }
    }

    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

/// Return `candidate` when unused, otherwise the first free `candidate-N`
/// for N = 2, 3, ...
///
/// `existing` must contain every slug sharing the candidate's prefix.
pub fn ensure_unique_slug<S: AsRef<str>>(candidate: &str, existing: &[S]) -> String {
    let taken: HashSet<&str> = existing.iter().map(|s| s.as_ref()).collect();
    if !taken.contains(candidate) {
        return candidate.to_string();
    }

    (2u64..)
        .map(|n| format!("{candidate}-{n}"))
        .find(|slug| !taken.contains(slug.as_str()))
        .unwrap_or_else(|| format!("{candidate}-{}", uuid::Uuid::new_v4().simple()))
}

/// ASCII rendering of a lower-case character; empty for separators
fn fold(c: char) -> &'static str {
    const DIGITS_AND_LETTERS: &str = "0123456789abcdefghijklmnopqrstuvwxyz";
    if c.is_ascii_alphanumeric() {
        let i = DIGITS_AND_LETTERS.find(c).unwrap_or(0);
        return &DIGITS_AND_LETTERS[i..i + 1];
    }

    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => "a",
        'æ' => "ae",
        'ç' | 'ć' | 'ĉ' | 'č' => "c",
        'ď' | 'đ' | 'ð' => "d",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => "e",
        'ĝ' | 'ğ' | 'ģ' => "g",
        'ĥ' => "h",
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'į' | 'ı' => "i",
        'ĵ' => "j",
        'ķ' => "k",
        'ĺ' | 'ļ' | 'ľ' | 'ł' => "l",
        'ñ' | 'ń' | 'ņ' | 'ň' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => "o",
        'œ' => "oe",
        'ŕ' | 'ř' => "r",
        'ś' | 'ş' | 'š' | 'ș' => "s",
        'ß' => "ss",
        'ť' | 'ţ' | 'ț' => "t",
        'þ' => "th",
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' | 'ų' => "u",
        'ŵ' => "w",
        'ý' | 'ÿ' | 'ŷ' => "y",
        'ź' | 'ż' | 'ž' => "z",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_slug_basics() {
        assert_eq!(generate_slug("Q1 2026 Outlook"), "q1-2026-outlook");
        assert_eq!(generate_slug("  Hello,   World!  "), "hello-world");
        assert_eq!(generate_slug("snake_case-and--dashes"), "snake-case-and-dashes");
    }

    #[test]
    fn test_generate_slug_folds_diacritics_and_drops_apostrophes() {
        assert_eq!(generate_slug("Crème Brûlée Straße"), "creme-brulee-strasse");
        assert_eq!(generate_slug("Investor’s Guide to Łódź"), "investors-guide-to-lodz");
        assert_eq!(generate_slug("Don't Panic"), "dont-panic");
        assert_eq!(generate_slug("M&A Update"), "m-a-update");
    }

    #[test]
    fn test_generate_slug_never_empty() {
        assert_eq!(generate_slug(""), "untitled");
        assert_eq!(generate_slug("!!! ???"), "untitled");
        assert_eq!(generate_slug("日本語"), "untitled");
    }

    #[test]
    fn test_generate_slug_truncates_without_trailing_hyphen() {
        let title = format!("{} tail", "a".repeat(79));
        let slug = generate_slug(&title);

        assert!(slug.len() <= MAX_SLUG_LENGTH);
        assert!(!slug.ends_with('-'));
        assert_eq!(slug, "a".repeat(79));
    }

    #[test]
    fn test_ensure_unique_slug() {
        let none: [&str; 0] = [];
        assert_eq!(ensure_unique_slug("analyst", &none), "analyst");
        assert_eq!(ensure_unique_slug("analyst", &["analyst"]), "analyst-2");
        assert_eq!(
            ensure_unique_slug("analyst", &["analyst", "analyst-2", "analyst-4"]),
            "analyst-3"
        );
        assert_eq!(ensure_unique_slug("analyst", &["analyst-2"]), "analyst");
    }

    #[test]
    fn test_titles_with_same_base_get_distinct_slugs() {
        let first = generate_slug("Market Update!");
        let second = ensure_unique_slug(&generate_slug("market update"), &[first.clone()]);

        assert_eq!(first, "market-update");
        assert_eq!(second, "market-update-2");
    }
}
