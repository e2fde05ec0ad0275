//! Character encoding detection and UTF-8 normalization for HTML resources.

use encoding_rs::Encoding;
use encoding_rs::UTF_8;
use encoding_rs::WINDOWS_1252;
use mv_core::ViewerError;
use mv_core::ViewerResult;
use mv_store::Resource;
use tracing::debug;
use tracing::info;

const META_PRESCAN_BYTES: usize = 1024;

/// Where an encoding decision came from, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionSource {
    ByteOrderMark,
    ContentType,
    MetaPrescan,
    Utf8Sniff,
    /// Nothing matched; the legacy Western default was assumed.
    Default,
}

/// Resolved encoding for one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    pub encoding: &'static Encoding,
    pub source: DetectionSource,
}

impl Detection {
    /// True when the bytes should be re-encoded to UTF-8: the encoding is
    /// something else and was not merely assumed.
    pub fn needs_conversion(&self) -> bool {
        self.encoding != UTF_8 && self.source != DetectionSource::Default
    }
}

/// Determines the encoding of an HTML document.
///
/// A UTF-8 label on bytes that are not UTF-8 is not trusted: such a
/// document is treated as uncertain so its bytes pass through unchanged.
pub fn detect(body: &[u8], content_type: &str) -> Detection {
    let is_utf8 = Encoding::utf8_valid_up_to(body) == body.len();

    match declared_encoding(body, content_type) {
        Some(detection) if detection.encoding == UTF_8 && !is_utf8 => {
            debug!(
                source = ?detection.source,
                valid_up_to = Encoding::utf8_valid_up_to(body),
                "declared UTF-8 but the bytes are not"
            );
            uncertain()
        }
        Some(detection) => detection,
        None if is_utf8 => Detection {
            encoding: UTF_8,
            source: DetectionSource::Utf8Sniff,
        },
        None => uncertain(),
    }
}

fn declared_encoding(body: &[u8], content_type: &str) -> Option<Detection> {
    if let Some((encoding, _)) = Encoding::for_bom(body) {
        return Some(Detection {
            encoding,
            source: DetectionSource::ByteOrderMark,
        });
    }

    if let Some(encoding) = parse_charset_from_content_type(content_type)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
    {
        return Some(Detection {
            encoding,
            source: DetectionSource::ContentType,
        });
    }

    prescan_meta_charset(body).map(|encoding| Detection {
        encoding,
        source: DetectionSource::MetaPrescan,
    })
}

fn uncertain() -> Detection {
    Detection {
        encoding: WINDOWS_1252,
        source: DetectionSource::Default,
    }
}

/// Normalizes one resource in place. Non-HTML resources are left alone and
/// yield `None`.
pub fn normalize(resource: &mut Resource) -> ViewerResult<Option<Detection>> {
    if !resource.is_html() {
        return Ok(None);
    }

    let detection = detect(&resource.data, &resource.content_type);
    if !detection.needs_conversion() {
        debug!(
            location = resource.location(),
            encoding = detection.encoding.name(),
            source = ?detection.source,
            "keeping document encoding"
        );
        resource.text_encoding = Some(detection.encoding);
        return Ok(Some(detection));
    }

    let (decoded, actual, had_errors) = detection.encoding.decode(&resource.data);
    if had_errors {
        return Err(ViewerError::new(
            "charset.decode_failed",
            format!(
                "`{}` is not valid {}",
                resource.location(),
                actual.name()
            ),
        ));
    }

    info!(
        location = resource.location(),
        from = actual.name(),
        "converted document to UTF-8"
    );

    resource.data = decoded.into_owned().into_bytes();
    resource.content_type = strip_charset_param(&resource.content_type);
    resource.was_converted = true;
    resource.text_encoding = Some(UTF_8);
    Ok(Some(detection))
}

/// Decodes document bytes for editing; malformed sequences become U+FFFD.
pub fn decode_text(body: &[u8], encoding: &'static Encoding) -> String {
    let (text, _) = encoding.decode_without_bom_handling(body);
    text.into_owned()
}

/// Encodes edited text back into the document's encoding.
pub fn encode_text(text: &str, encoding: &'static Encoding) -> Vec<u8> {
    let (bytes, _, _) = encoding.encode(text);
    bytes.into_owned()
}

/// Removes any `charset` parameter, keeping the rest of the content type.
pub fn strip_charset_param(content_type: &str) -> String {
    let mut segments = content_type.split(';');
    let mut out = segments.next().unwrap_or_default().trim().to_owned();

    for segment in segments {
        let name = segment.split('=').next().unwrap_or_default().trim();
        if name.eq_ignore_ascii_case("charset") || segment.trim().is_empty() {
            continue;
        }
        out.push_str("; ");
        out.push_str(segment.trim());
    }

    out
}

fn parse_charset_from_content_type(content_type: &str) -> Option<String> {
    for part in content_type.split(';').skip(1) {
        let Some((name, value)) = part.split_once('=') else {
            continue;
        };
        if !name.trim().eq_ignore_ascii_case("charset") {
            continue;
        }

        let label = value.trim().trim_matches('"').trim_matches('\'');
        if !label.is_empty() {
            return Some(label.to_owned());
        }
    }

    None
}

/// Looks for `charset=` inside `<meta>` tags near the start of the document;
/// covers both `<meta charset>` and the `http-equiv` content form.
fn prescan_meta_charset(body: &[u8]) -> Option<&'static Encoding> {
    let prefix_len = body.len().min(META_PRESCAN_BYTES);
    let prefix = String::from_utf8_lossy(&body[..prefix_len]);
    let lower = prefix.to_ascii_lowercase();
    let mut search_start = 0_usize;

    while let Some(relative) = lower[search_start..].find("<meta") {
        let tag_start = search_start + relative;
        let tag_end = lower[tag_start..]
            .find('>')
            .map(|offset| tag_start + offset)
            .unwrap_or(lower.len());
        search_start = tag_end;

        let tag = &lower[tag_start..tag_end];
        let Some(charset_at) = tag.find("charset") else {
            continue;
        };
        let after_name = tag[charset_at + "charset".len()..].trim_start();
        let Some(value) = after_name.strip_prefix('=') else {
            continue;
        };

        let Some(label) = parse_charset_label(value) else {
            continue;
        };
        let Some(encoding) = Encoding::for_label(label.as_bytes()) else {
            continue;
        };

        // A document that declares UTF-16 in markup is ASCII-compatible, so
        // the declaration cannot be true.
        if encoding == encoding_rs::UTF_16LE || encoding == encoding_rs::UTF_16BE {
            return Some(UTF_8);
        }
        return Some(encoding);
    }

    None
}

fn parse_charset_label(input: &str) -> Option<String> {
    let trimmed = input.trim_start();
    if trimmed.is_empty() {
        return None;
    }

    let mut chars = trimmed.chars();
    let first = chars.next()?;

    if first == '"' || first == '\'' {
        let rest = &trimmed[first.len_utf8()..];
        let end = rest.find(first)?;
        let label = rest[..end].trim();
        return if label.is_empty() {
            None
        } else {
            Some(label.to_owned())
        };
    }

    let end = trimmed
        .find(|ch: char| ch.is_whitespace() || matches!(ch, '"' | '\'' | ';' | '>' | '/'))
        .unwrap_or(trimmed.len());
    let label = trimmed[..end].trim();
    if label.is_empty() {
        None
    } else {
        Some(label.to_owned())
    }
}
