//! Text normalization. `normalize` is pure, total, and idempotent:
//! running it twice produces the same output as running it once.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

static HYPHEN_WRAP: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(\p{L})-\n(\p{L})").unwrap()
});

static BULLET_PREFIX: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?m)^[ \t]*[-•◦▪‣·∙*]+[ \t]+").unwrap()
});

static INTRA_LINE_WS: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"[ \t]{2,}").unwrap()
});

static TRAILING_WS: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?m)[ \t]+$").unwrap()
});

static EXCESS_BLANK_LINES: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"\n{3,}").unwrap()
});

/// Canonicalize extracted text before chunking.
pub fn normalize(text: &str) -> String {
    // Unicode canonicalization first so later character classes see
    // canonical forms (ligatures decomposed, fullwidth folded).
    let text: String = text.nfkc().collect();

    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2039}' | '\u{203A}' => out.push('\''),
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{00AB}' | '\u{00BB}' => out.push('"'),
            '\u{2013}' | '\u{2014}' | '\u{2015}' | '\u{2212}' => out.push('-'),
            '\u{2026}' => out.push_str("..."),
            '\u{00A0}' | '\u{2007}' | '\u{202F}' => out.push(' '),
            // Zero-width characters and BOM
            '\u{200B}'..='\u{200D}' | '\u{FEFF}' | '\u{2060}' => {}
            '\r' => {} // CRLF and bare CR both collapse to the LF handling below
            c if c.is_control() && c != '\n' && c != '\t' => {}
            c => out.push(c),
        }
    }

    let out = HYPHEN_WRAP.replace_all(&out, "$1$2");
    let out = BULLET_PREFIX.replace_all(&out, "- ");
    let out = INTRA_LINE_WS.replace_all(&out, " ");
    let out = TRAILING_WS.replace_all(&out, "");
    let out = EXCESS_BLANK_LINES.replace_all(&out, "\n\n");
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smart_punctuation_becomes_ascii() {
        assert_eq!(normalize("\u{201C}hi\u{201D} \u{2014} it\u{2019}s"), "\"hi\" - it's");
    }

    #[test]
    fn hyphen_wrapped_words_are_rejoined() {
        assert_eq!(normalize("embed-\nding models"), "embedding models");
    }

    #[test]
    fn bullets_normalize_to_dash() {
        assert_eq!(normalize("• first\n  ◦ second\n* third"), "- first\n- second\n- third");
    }

    #[test]
    fn whitespace_and_blank_lines_collapse() {
        assert_eq!(normalize("a   b\t\tc\n\n\n\n\nd  \n"), "a b c\n\nd");
    }

    #[test]
    fn zero_width_and_controls_are_stripped() {
        assert_eq!(normalize("a\u{200B}b\u{0007}c\r\nd"), "abc\nd");
    }

    #[test]
    fn nfkc_folds_compatibility_forms() {
        assert_eq!(normalize("ﬁle ５"), "file 5");
    }

    #[test]
    fn idempotent() {
        let samples = [
            "• one\n• two\n\n\nem\u{2014}dash and hy-\nphen  gaps\t\there",
            "\u{FEFF}plain already-normal text\n\n- bullet",
            "",
        ];
        for s in samples {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "not idempotent for {s:?}");
        }
    }
}
