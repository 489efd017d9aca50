//! Canonical text form used before any hashing

use unicode_normalization::UnicodeNormalization;

/// Normalize text to NFKC and rewrite CRLF and lone CR line endings as LF.
///
/// Leading and trailing whitespace is content and is kept.
pub fn canonicalize(input: &str) -> String {
    let normalized: String = input.nfkc().collect();

    let mut out = String::with_capacity(normalized.len());
    let mut chars = normalized.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\r' {
            if chars.peek() == Some(&'\n') {
                chars.next();
            }
            out.push('\n');
        } else {
            out.push(c);
        }
    }
    out
}

/// Canonicalize raw bytes. Input that is not UTF-8 text canonicalizes to
/// the empty string rather than failing.
pub fn canonicalize_bytes(input: &[u8]) -> String {
    match std::str::from_utf8(input) {
        Ok(text) => canonicalize(text),
        Err(_) => String::new(),
    }
}
