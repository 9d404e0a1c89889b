//! Whitespace Normalization
//!
//! Shared by the chunker and anything else that must agree on what
//! "the text of a page" is once layout noise is removed.

/// Collapse every run of whitespace (newlines and tabs included) to a single
/// space and trim both ends.
pub fn normalize_whitespace(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_whitespace = false;

    for ch in raw.chars() {
        if ch.is_whitespace() {
            if !in_whitespace {
                out.push(' ');
                in_whitespace = true;
            }
        } else {
            out.push(ch);
            in_whitespace = false;
        }
    }

    // At most one leading and one trailing space can survive the collapse
    let trimmed = out.trim();
    if trimmed.len() == out.len() {
        out
    } else {
        trimmed.to_string()
    }
}

/// Number of characters (not bytes) in `text`.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_mixed_whitespace() {
        assert_eq!(
            normalize_whitespace("Hello   world\n\nThis is page one."),
            "Hello world This is page one."
        );
        assert_eq!(normalize_whitespace("a\t\tb\r\nc"), "a b c");
    }

    #[test]
    fn test_trims_both_ends() {
        assert_eq!(normalize_whitespace("  \n padded \t "), "padded");
    }

    #[test]
    fn test_whitespace_only_becomes_empty() {
        assert_eq!(normalize_whitespace(""), "");
        assert_eq!(normalize_whitespace(" \n\t\r "), "");
    }

    #[test]
    fn test_unicode_whitespace_is_collapsed() {
        // no-break space and em space are both whitespace
        assert_eq!(normalize_whitespace("a\u{00A0}\u{2003}b"), "a b");
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let samples = [
            "Hello   world\n\nThis is page one.",
            "  leading",
            "trailing \n",
            "Ünïcödé\u{2003}\u{2003}text",
            "",
        ];
        for raw in samples {
            let once = normalize_whitespace(raw);
            assert_eq!(normalize_whitespace(&once), once);
        }
    }

    #[test]
    fn test_char_len_counts_chars() {
        assert_eq!(char_len("héllo"), 5);
        assert_eq!("héllo".len(), 6);
    }
}
