//! Stylesheet `url(...)` reference scanning and replacement.
//!
//! Works on raw bytes so a stylesheet in any ASCII-compatible encoding
//! passes through unchanged outside the references that get replaced.

const URL_OPEN: &[u8] = b"url(";

/// One `url(...)` occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrlToken<'a> {
    /// Offset of the `u` of `url(`.
    pub start: usize,
    /// Offset one past the closing `)`.
    pub end: usize,
    /// Argument with surrounding whitespace and quotes removed.
    pub target: &'a str,
}

/// Finds every `url(...)` token: `url(` matched ASCII case-insensitively at
/// a word boundary, followed by a non-empty argument without parentheses and
/// a closing `)`. Arguments that are not valid UTF-8 are skipped.
pub fn url_tokens(css: &[u8]) -> Vec<UrlToken<'_>> {
    let mut tokens = Vec::new();
    let mut search = 0_usize;

    while let Some(start) = find_url_open(css, search) {
        let arg_start = start + URL_OPEN.len();
        search = arg_start;

        let Some(close) = css[arg_start..]
            .iter()
            .position(|byte| matches!(byte, b'(' | b')'))
            .map(|offset| arg_start + offset)
        else {
            break;
        };
        if css[close] == b'(' || close == arg_start {
            continue;
        }

        let Ok(raw) = std::str::from_utf8(&css[arg_start..close]) else {
            continue;
        };

        tokens.push(UrlToken {
            start,
            end: close + 1,
            target: trim_argument(raw),
        });
        search = close + 1;
    }

    tokens
}

/// Replaces `url(...)` references. `map` receives the cleaned argument and
/// returns the replacement argument, or `None` to keep the token as written.
/// Replacements are emitted unquoted: `url(<replacement>)`.
pub fn rewrite_stylesheet(css: &[u8], mut map: impl FnMut(&str) -> Option<String>) -> Vec<u8> {
    let mut out = Vec::with_capacity(css.len());
    let mut cursor = 0_usize;

    for token in url_tokens(css) {
        let Some(replacement) = map(token.target) else {
            continue;
        };
        out.extend_from_slice(&css[cursor..token.start]);
        out.extend_from_slice(URL_OPEN);
        out.extend_from_slice(replacement.as_bytes());
        out.push(b')');
        cursor = token.end;
    }

    out.extend_from_slice(&css[cursor..]);
    out
}

/// String form of [`rewrite_stylesheet`] for `<style>` text and `style`
/// attributes.
pub fn rewrite_style_text(css: &str, map: impl FnMut(&str) -> Option<String>) -> String {
    let rewritten = rewrite_stylesheet(css.as_bytes(), map);
    // Replacements are valid UTF-8 and only whole tokens are swapped.
    String::from_utf8(rewritten).unwrap_or_else(|error| {
        String::from_utf8_lossy(error.as_bytes()).into_owned()
    })
}

/// Cheap pre-check for style text worth scanning.
pub fn contains_url_reference(css: &str) -> bool {
    find_url_open(css.as_bytes(), 0).is_some()
}

fn find_url_open(css: &[u8], from: usize) -> Option<usize> {
    let mut idx = from;
    while idx + URL_OPEN.len() <= css.len() {
        if css[idx..idx + URL_OPEN.len()].eq_ignore_ascii_case(URL_OPEN)
            && (idx == 0 || !is_word_byte(css[idx - 1]))
        {
            return Some(idx);
        }
        idx += 1;
    }
    None
}

fn is_word_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

fn trim_argument(raw: &str) -> &str {
    raw.trim()
        .trim_matches(|ch: char| ch == '"' || ch == '\'')
        .trim()
}
