//! # Feature Extraction
//!
//! Turns a document's text into the feature set the sketcher hashes:
//! the set of character n-grams of the configured length. N-grams are
//! taken over Unicode scalar values, not bytes, so multi-byte characters
//! count as one position.

use rustc_hash::FxHashSet;

/// Extract the set of character n-grams from `text`.
///
/// Returns borrowed slices into `text`; duplicates are collapsed since
/// MinHash operates on sets. A text shorter than `n` characters yields an
/// empty set.
pub fn char_ngrams(text: &str, n: usize) -> FxHashSet<&str> {
    let mut features = FxHashSet::default();
    if n == 0 {
        return features;
    }

    // Byte offsets of every character boundary, including the end.
    let mut bounds: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    bounds.push(text.len());

    // bounds.len() is num_chars + 1.
    if bounds.len() > n {
        for i in 0..bounds.len() - n {
            features.insert(&text[bounds[i]..bounds[i + n]]);
        }
    }
    features
}

/// Look up the text field of a parsed JSONL document.
///
/// Returns `None` when the field is absent or not a string; the caller
/// treats both the same as an empty text.
pub fn document_text<'a>(doc: &'a serde_json::Value, field: &str) -> Option<&'a str> {
    doc.get(field).and_then(serde_json::Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(set: FxHashSet<&str>) -> Vec<&str> {
        let mut v: Vec<&str> = set.into_iter().collect();
        v.sort_unstable();
        v
    }

    #[test]
    fn test_ascii_ngrams() {
        let grams = char_ngrams("abcde", 3);
        assert_eq!(sorted(grams), vec!["abc", "bcd", "cde"]);
    }

    #[test]
    fn test_short_text_yields_nothing() {
        assert!(char_ngrams("abcd", 5).is_empty());
        assert!(char_ngrams("", 5).is_empty());
    }

    #[test]
    fn test_exact_length_yields_single_gram() {
        assert_eq!(sorted(char_ngrams("hello", 5)), vec!["hello"]);
    }

    #[test]
    fn test_multibyte_characters_count_once() {
        // Four characters, so only two trigrams.
        let grams = char_ngrams("aß¢d", 3);
        assert_eq!(sorted(grams), vec!["aß¢", "ß¢d"]);
    }

    #[test]
    fn test_repeated_grams_collapse() {
        // "aaaa" has three trigram positions but one distinct trigram.
        assert_eq!(sorted(char_ngrams("aaaa", 3)), vec!["aaa"]);
    }

    #[test]
    fn test_document_text_lookup() {
        let doc: serde_json::Value =
            serde_json::from_str(r#"{"text": "hi", "meta": 3}"#).unwrap();
        assert_eq!(document_text(&doc, "text"), Some("hi"));
        assert_eq!(document_text(&doc, "meta"), None);
        assert_eq!(document_text(&doc, "missing"), None);
    }
}
