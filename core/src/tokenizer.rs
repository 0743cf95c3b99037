use lazy_static::lazy_static;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref RE: Regex = Regex::new(r"(?u)[\p{L}\p{N}][\p{L}\p{N}_']*").expect("valid regex");
}

/// Split text into terms: NFKC normalization, lowercasing, then runs of
/// letters/digits. No stemming and no stopword removal.
pub fn tokenize(text: &str) -> Vec<String> {
    let normalized = text.nfkc().collect::<String>().to_lowercase();
    RE.find_iter(&normalized)
        .map(|m| m.as_str().trim_end_matches('\'').to_string())
        .filter(|t| !t.is_empty())
        .collect()
}
