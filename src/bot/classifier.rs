// src/bot/classifier.rs - Text normalization and duplicate equivalence classes

use regex::Regex;
use std::sync::LazyLock;

use crate::types::{DuplicateMode, EquivalenceClass};

/// Digits 0-9
const DIGITS: [&str; 10] = ["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"];

/// Keycap glyphs 0-10, fully-qualified and minimally-qualified forms
const KEYCAPS: [&str; 21] = [
    "0\u{FE0F}\u{20E3}", "1\u{FE0F}\u{20E3}", "2\u{FE0F}\u{20E3}", "3\u{FE0F}\u{20E3}",
    "4\u{FE0F}\u{20E3}", "5\u{FE0F}\u{20E3}", "6\u{FE0F}\u{20E3}", "7\u{FE0F}\u{20E3}",
    "8\u{FE0F}\u{20E3}", "9\u{FE0F}\u{20E3}",
    "0\u{20E3}", "1\u{20E3}", "2\u{20E3}", "3\u{20E3}", "4\u{20E3}",
    "5\u{20E3}", "6\u{20E3}", "7\u{20E3}", "8\u{20E3}", "9\u{20E3}",
    "\u{1F51F}",
];

/// Number words. "fourteen" is not part of the vocabulary.
const NUMBER_WORDS: [&str; 15] = [
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
    "eleven", "twelve", "thirteen", "fifteen",
];

const TENS_WORDS: [&str; 8] = [
    "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
];

const SCALE_WORDS: [&str; 5] = ["hundred", "thousand", "million", "billion", "trillion"];

/// Single alternation over the whole vocabulary, longest tokens first
static NUMERIC_VOCABULARY: LazyLock<Regex> = LazyLock::new(|| {
    let mut tokens: Vec<&str> = KEYCAPS
        .iter()
        .chain(SCALE_WORDS.iter())
        .chain(TENS_WORDS.iter())
        .chain(NUMBER_WORDS.iter())
        .chain(DIGITS.iter())
        .copied()
        .collect();
    tokens.sort_by_key(|t| std::cmp::Reverse(t.len()));

    let alternation = tokens
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&alternation).unwrap()
});

/// Markdown rewrites applied in order: code, links, line prefixes, then emphasis markers
static MARKDOWN_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (Regex::new(r"(?s)```[a-z0-9+#-]*\n?(.*?)```").unwrap(), "$1"),
        (Regex::new(r"`([^`]*)`").unwrap(), "$1"),
        (Regex::new(r"!?\[([^\]]*)\]\([^)]*\)").unwrap(), "$1"),
        (Regex::new(r"(?m)^[ \t]{0,3}#{1,6}[ \t]+").unwrap(), ""),
        (Regex::new(r"(?m)^[ \t]*>{1,3}[ \t]?").unwrap(), ""),
        (Regex::new(r"\*\*\*(\S(?:.*?\S)??)\*\*\*").unwrap(), "$1"),
        (Regex::new(r"\*\*(\S(?:.*?\S)??)\*\*").unwrap(), "$1"),
        (Regex::new(r"\*(\S(?:.*?\S)??)\*").unwrap(), "$1"),
        // `_` is a word character, so `\b` here means "not inside a word"
        (Regex::new(r"\b___(\S(?:.*?\S)??)___\b").unwrap(), "$1"),
        (Regex::new(r"\b__(\S(?:.*?\S)??)__\b").unwrap(), "$1"),
        (Regex::new(r"\b_(\S(?:.*?\S)??)_\b").unwrap(), "$1"),
        (Regex::new(r"~~(\S(?:.*?\S)??)~~").unwrap(), "$1"),
        (Regex::new(r"\|\|(.*?)\|\|").unwrap(), "$1"),
    ]
});

/// Remove markdown markup, keeping the visible text
pub fn strip_markdown(text: &str) -> String {
    let mut stripped = text.to_string();
    for (pattern, replacement) in MARKDOWN_RULES.iter() {
        stripped = pattern.replace_all(&stripped, *replacement).into_owned();
    }
    stripped
}

/// Lowercase, strip markup, trim
pub fn normalize(text: &str) -> String {
    strip_markdown(&text.to_lowercase()).trim().to_string()
}

/// True if the text contains any numeral-like token anywhere.
///
/// This is a lexical approximation, not a number parser: "someone" contains
/// "one" and is therefore numeral-like.
pub fn is_numeric_like(normalized: &str) -> bool {
    NUMERIC_VOCABULARY.is_match(normalized)
}

/// Normalized text together with its equivalence class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub normalized: String,
    pub class: EquivalenceClass,
}

impl Classified {
    /// Two messages are equivalent when their normalized text is identical,
    /// or when both fall in the numeric class.
    pub fn is_equivalent(&self, other: &Classified) -> bool {
        if self.normalized == other.normalized {
            return true;
        }
        self.class == EquivalenceClass::Numeric && other.class == EquivalenceClass::Numeric
    }
}

/// Normalize a message and assign its equivalence class
pub fn classify(text: &str, mode: DuplicateMode) -> Classified {
    let normalized = normalize(text);
    let class = match mode {
        DuplicateMode::Numeric if is_numeric_like(&normalized) => EquivalenceClass::Numeric,
        _ => EquivalenceClass::Literal(normalized.clone()),
    };
    Classified { normalized, class }
}

pub fn equivalent(a: &str, b: &str, mode: DuplicateMode) -> bool {
    classify(a, mode).is_equivalent(&classify(b, mode))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_emphasis_and_case() {
        assert_eq!(normalize("  **Hello** World  "), "hello world");
        assert_eq!(normalize("*hi*"), "hi");
        assert_eq!(normalize("__HI__"), "hi");
        assert_eq!(normalize("~~gone~~ ||secret||"), "gone secret");
        assert_eq!(normalize("`code`"), "code");
        assert_eq!(normalize("> quoted"), "quoted");
        assert_eq!(normalize("# Title"), "title");
        assert_eq!(normalize("[link](https://example.com)"), "link");
    }

    #[test]
    fn test_normalize_strips_each_of_several_spans() {
        assert_eq!(normalize("_a_ _b_"), "a b");
        assert_eq!(normalize("*a* *b*"), "a b");
        assert_eq!(normalize("**x** and **y**"), "x and y");
        assert_eq!(normalize("__a__ ~~b~~ ~~c~~"), "a b c");
        assert!(equivalent("_a_ _b_", "a b", DuplicateMode::Literal));
    }

    #[test]
    fn test_normalize_keeps_inner_underscores() {
        assert_eq!(normalize("snake_case_name"), "snake_case_name");
        assert_eq!(normalize("2 * 3"), "2 * 3");
    }

    #[test]
    fn test_identical_text_is_equivalent_in_every_mode() {
        for mode in [DuplicateMode::Literal, DuplicateMode::Numeric] {
            assert!(equivalent("hi", "hi", mode));
            assert!(equivalent("**HI**", "hi", mode));
            assert!(equivalent("5", "5", mode));
        }
    }

    #[test]
    fn test_literal_mode_ignores_numeric_class() {
        assert!(!equivalent("5", "five", DuplicateMode::Literal));
        assert_eq!(
            classify("5", DuplicateMode::Literal).class,
            EquivalenceClass::Literal("5".to_string())
        );
    }

    #[test]
    fn test_numeric_vocabulary() {
        for text in ["3", "five", "5\u{FE0F}\u{20E3}", "7\u{20E3}", "\u{1F51F}", "twenty", "a thousand", "count 42"] {
            assert!(is_numeric_like(&normalize(text)), "{} should be numeric", text);
        }
        assert!(!is_numeric_like("hello"));
        assert!(!is_numeric_like("good morning"));
        // substring policy: "someone" contains "one"
        assert!(is_numeric_like("someone"));
    }

    #[test]
    fn test_numeric_mode_groups_numbers() {
        assert!(equivalent("5", "five", DuplicateMode::Numeric));
        assert!(equivalent("3", "5\u{FE0F}\u{20E3}", DuplicateMode::Numeric));
        assert!(!equivalent("3", "hello", DuplicateMode::Numeric));
    }
}
