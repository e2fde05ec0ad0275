//! HTML tokenization and tree building.
//!
//! The parser is forgiving and never fails: anything that does not scan as
//! markup is kept as text. Raw-text element content is kept verbatim.

use mv_dom::Attribute;
use mv_dom::Document;
use mv_dom::Element;
use mv_dom::Node;
use mv_dom::is_void;

/// Parses an HTML string into a lossless document tree.
pub fn parse_document(input: &str) -> Document {
    build_tree(tokenize(input))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Start {
        name: String,
        attrs: Vec<Attribute>,
        self_closing: bool,
    },
    End {
        name: String,
    },
    Text(String),
    Comment(String),
    Declaration(String),
    ProcessingInstruction(String),
}

fn tokenize(input: &str) -> Vec<Token> {
    let bytes = input.as_bytes();
    let mut out = Vec::new();
    let mut idx = 0_usize;
    let mut text_start = 0_usize;

    while idx < bytes.len() {
        if bytes[idx] != b'<' {
            idx = find_byte(bytes, idx, b'<').unwrap_or(bytes.len());
            continue;
        }

        let Some((token, next)) = scan_markup(input, idx) else {
            idx += 1;
            continue;
        };

        if text_start < idx {
            out.push(Token::Text(input[text_start..idx].to_owned()));
        }

        let raw_text_tag = match &token {
            Token::Start {
                name, self_closing, ..
            } if !*self_closing && is_raw_text_tag(name) => Some(name.clone()),
            _ => None,
        };

        out.push(token);
        idx = next;

        if let Some(tag_name) = raw_text_tag {
            let (raw_text, closing) = read_raw_text_until_end_tag(input, idx, &tag_name);
            if !raw_text.is_empty() {
                out.push(Token::Text(raw_text.to_owned()));
            }
            match closing {
                Some(after_end) => {
                    out.push(Token::End { name: tag_name });
                    idx = after_end;
                }
                None => idx = bytes.len(),
            }
        }

        text_start = idx;
    }

    if text_start < bytes.len() {
        out.push(Token::Text(input[text_start..].to_owned()));
    }

    out
}

/// Scans one markup construct starting at `<`. `None` means the `<` is text.
fn scan_markup(input: &str, start: usize) -> Option<(Token, usize)> {
    let bytes = input.as_bytes();

    if starts_with(bytes, start, b"<!--") {
        let body_start = start + 4;
        return Some(match find_subslice(bytes, body_start, b"-->") {
            Some(end) => (Token::Comment(input[body_start..end].to_owned()), end + 3),
            None => (Token::Comment(input[body_start..].to_owned()), bytes.len()),
        });
    }

    if starts_with(bytes, start, b"<!") {
        let body_start = start + 2;
        let end = find_byte(bytes, body_start, b'>')?;
        return Some((Token::Declaration(input[body_start..end].to_owned()), end + 1));
    }

    if starts_with(bytes, start, b"<?") {
        let body_start = start + 2;
        let end = find_byte(bytes, body_start, b'>')?;
        return Some((
            Token::ProcessingInstruction(input[body_start..end].to_owned()),
            end + 1,
        ));
    }

    if starts_with(bytes, start, b"</") {
        return parse_end_tag(bytes, start);
    }

    parse_start_tag(input, start)
}

fn parse_end_tag(bytes: &[u8], start: usize) -> Option<(Token, usize)> {
    let name_start = start + 2;
    if !bytes.get(name_start).is_some_and(u8::is_ascii_alphabetic) {
        return None;
    }

    let mut idx = name_start;
    while idx < bytes.len() && is_tag_name_char(bytes[idx]) {
        idx += 1;
    }
    let name = String::from_utf8_lossy(&bytes[name_start..idx]).to_ascii_lowercase();
    let end = find_byte(bytes, idx, b'>')?;

    Some((Token::End { name }, end + 1))
}

fn parse_start_tag(input: &str, start: usize) -> Option<(Token, usize)> {
    let bytes = input.as_bytes();
    let name_start = start + 1;
    if !bytes.get(name_start).is_some_and(u8::is_ascii_alphabetic) {
        return None;
    }

    let mut idx = name_start;
    while idx < bytes.len() && is_tag_name_char(bytes[idx]) {
        idx += 1;
    }
    let name = input[name_start..idx].to_ascii_lowercase();
    let mut attrs = Vec::new();
    let mut self_closing = false;

    loop {
        idx = skip_spaces(bytes, idx);
        let byte = *bytes.get(idx)?;

        if byte == b'>' {
            idx += 1;
            break;
        }

        if byte == b'/' {
            idx = skip_spaces(bytes, idx + 1);
            if bytes.get(idx).copied() == Some(b'>') {
                self_closing = true;
                idx += 1;
                break;
            }
            continue;
        }

        let attr_start = idx;
        while idx < bytes.len() && is_attr_name_char(bytes[idx]) {
            idx += 1;
        }
        if idx == attr_start {
            // Stray quote or `=`; skip it like a browser would.
            idx += 1;
            continue;
        }
        let attr_name = &input[attr_start..idx];

        let after_name = skip_spaces(bytes, idx);
        if bytes.get(after_name).copied() != Some(b'=') {
            attrs.push(Attribute::from_raw(attr_name, None));
            continue;
        }

        idx = skip_spaces(bytes, after_name + 1);
        let quote = *bytes.get(idx)?;
        let raw_value = if quote == b'"' || quote == b'\'' {
            let value_start = idx + 1;
            let value_end = find_byte(bytes, value_start, quote)?;
            idx = value_end + 1;
            &input[value_start..value_end]
        } else {
            let value_start = idx;
            while idx < bytes.len() && !bytes[idx].is_ascii_whitespace() && bytes[idx] != b'>' {
                idx += 1;
            }
            &input[value_start..idx]
        };

        attrs.push(Attribute::from_raw(attr_name, Some(raw_value.to_owned())));
    }

    Some((
        Token::Start {
            name,
            attrs,
            self_closing,
        },
        idx,
    ))
}

fn build_tree(tokens: Vec<Token>) -> Document {
    let mut document = Document::default();
    let mut stack: Vec<Element> = Vec::new();

    for token in tokens {
        let node = match token {
            Token::Text(text) => Node::Text(text),
            Token::Comment(body) => Node::Comment(body),
            Token::Declaration(body) => Node::Declaration(body),
            Token::ProcessingInstruction(body) => Node::ProcessingInstruction(body),
            Token::Start {
                name,
                attrs,
                self_closing,
            } => {
                let mut element = Element::new(name);
                element.attrs = attrs;
                element.self_closing = self_closing;

                if self_closing || is_void(&element.name) {
                    element.has_end_tag = false;
                    Node::Element(element)
                } else {
                    stack.push(element);
                    continue;
                }
            }
            Token::End { name } => {
                // End tags without a matching open element are dropped.
                let Some(open_at) = stack.iter().rposition(|element| element.name == name) else {
                    continue;
                };

                while stack.len() > open_at {
                    let Some(mut element) = stack.pop() else {
                        break;
                    };
                    element.has_end_tag = stack.len() == open_at;
                    append_child(&mut stack, &mut document, Node::Element(element));
                }
                continue;
            }
        };

        append_child(&mut stack, &mut document, node);
    }

    while let Some(mut element) = stack.pop() {
        element.has_end_tag = false;
        append_child(&mut stack, &mut document, Node::Element(element));
    }

    document
}

fn append_child(stack: &mut [Element], document: &mut Document, node: Node) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => document.children.push(node),
    }
}

/// Elements whose content is not markup.
fn is_raw_text_tag(tag: &str) -> bool {
    matches!(tag, "script" | "style" | "textarea" | "title" | "xmp")
}

fn read_raw_text_until_end_tag<'a>(
    input: &'a str,
    start: usize,
    tag_name: &str,
) -> (&'a str, Option<usize>) {
    let bytes = input.as_bytes();
    let tag_bytes = tag_name.as_bytes();
    let mut idx = start;

    while let Some(candidate) = find_subslice(bytes, idx, b"</") {
        let name_start = candidate + 2;
        if starts_with_ignore_ascii_case(bytes, name_start, tag_bytes)
            && tag_name_boundary(bytes, name_start + tag_bytes.len())
        {
            if let Some(end) = find_byte(bytes, name_start, b'>') {
                return (&input[start..candidate], Some(end + 1));
            }
        }
        idx = candidate + 2;
    }

    (&input[start..], None)
}

fn tag_name_boundary(bytes: &[u8], idx: usize) -> bool {
    match bytes.get(idx).copied() {
        None => true,
        Some(byte) => byte.is_ascii_whitespace() || byte == b'>' || byte == b'/',
    }
}

fn skip_spaces(bytes: &[u8], mut idx: usize) -> usize {
    while idx < bytes.len() && bytes[idx].is_ascii_whitespace() {
        idx += 1;
    }
    idx
}

fn is_tag_name_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b':' | b'.')
}

fn is_attr_name_char(byte: u8) -> bool {
    !byte.is_ascii_whitespace() && !matches!(byte, b'"' | b'\'' | b'>' | b'/' | b'=')
}

fn starts_with(bytes: &[u8], idx: usize, pattern: &[u8]) -> bool {
    let end = idx.saturating_add(pattern.len());
    end <= bytes.len() && bytes[idx..end] == *pattern
}

fn starts_with_ignore_ascii_case(bytes: &[u8], idx: usize, pattern: &[u8]) -> bool {
    let end = idx.saturating_add(pattern.len());
    if end > bytes.len() {
        return false;
    }

    bytes[idx..end]
        .iter()
        .zip(pattern.iter())
        .all(|(left, right)| left.eq_ignore_ascii_case(right))
}

fn find_subslice(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if from >= bytes.len() {
        return None;
    }

    bytes[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|offset| from + offset)
}

fn find_byte(bytes: &[u8], from: usize, byte: u8) -> Option<usize> {
    bytes
        .get(from..)?
        .iter()
        .position(|candidate| *candidate == byte)
        .map(|offset| from + offset)
}
