//! MHTML archive parsing: top-level header, multipart split, per-part
//! metadata and transfer decoding.

use mailparse::MailHeaderMap;
use mailparse::MailParseError;
use mailparse::ParsedMail;
use mv_core::ViewerError;
use mv_core::ViewerResult;
use tracing::debug;
use tracing::warn;

/// Decoded archive: every leaf part in archive order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive {
    /// Lowercased `type/subtype` of the top-level Content-Type.
    pub media_type: String,
    pub boundary: String,
    pub parts: Vec<ArchivePart>,
}

/// Content-Transfer-Encoding label of a part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// `7bit`, `8bit`, `binary`, or no header at all.
    Identity,
    Base64,
    QuotedPrintable,
    /// Any other label; the body is passed through undecoded.
    Unrecognized,
}

impl TransferEncoding {
    pub fn from_header(value: Option<&str>) -> Self {
        let Some(value) = value else {
            return Self::Identity;
        };

        match value.trim().to_ascii_lowercase().as_str() {
            "" | "7bit" | "8bit" | "binary" => Self::Identity,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            _ => Self::Unrecognized,
        }
    }
}

/// One MIME body segment with its transfer encoding already removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivePart {
    /// Zero-based position in the archive.
    pub index: usize,
    content_type: String,
    content_location: Option<String>,
    content_id: Option<String>,
    transfer_encoding: TransferEncoding,
    pub body: Vec<u8>,
}

impl ArchivePart {
    pub fn content_location(&self) -> Option<&str> {
        self.content_location.as_deref()
    }

    /// Raw `Content-Type` value, or an empty string when absent.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// `Content-ID` with surrounding angle brackets removed.
    pub fn content_id(&self) -> Option<&str> {
        self.content_id.as_deref()
    }

    pub fn transfer_encoding(&self) -> TransferEncoding {
        self.transfer_encoding
    }
}

/// Parses a complete MHTML archive held in memory.
pub fn parse_archive(input: &[u8]) -> ViewerResult<Archive> {
    let mail = mailparse::parse_mail(input).map_err(|error| {
        ViewerError::new(
            "archive.header_invalid",
            format!("archive header block is malformed: {error}"),
        )
    })?;

    let content_type = mail.headers.get_first_value("Content-Type").ok_or_else(|| {
        ViewerError::new(
            "archive.content_type_missing",
            "archive has no top-level Content-Type header",
        )
    })?;

    let media_type = mail.ctype.mimetype.to_ascii_lowercase();
    if !media_type.starts_with("multipart/") {
        return Err(ViewerError::new(
            "archive.content_type_invalid",
            format!("Content-Type `{content_type}` is not a multipart type"),
        ));
    }

    let boundary = mail
        .ctype
        .params
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value.clone())
        .filter(|boundary| !boundary.is_empty())
        .ok_or_else(|| {
            ViewerError::new(
                "archive.boundary_missing",
                format!("Content-Type `{content_type}` has no boundary parameter"),
            )
        })?;

    if !mail.subparts.is_empty() && !has_close_delimiter(input, &boundary) {
        return Err(ViewerError::new(
            "archive.truncated",
            format!("archive ended before closing delimiter `--{boundary}--`"),
        ));
    }

    let mut parts = Vec::with_capacity(mail.subparts.len());
    for subpart in &mail.subparts {
        collect_leaf_parts(subpart, &mut parts)?;
    }

    Ok(Archive {
        media_type,
        boundary,
        parts,
    })
}

/// Returns the lowercased `type/subtype` of a content type, ignoring
/// parameters and tolerating malformed values.
pub fn media_essence(content_type: &str) -> String {
    if content_type.trim().is_empty() {
        return String::new();
    }
    mailparse::parse_content_type(content_type)
        .mimetype
        .to_ascii_lowercase()
}

// Nested multiparts contribute their leaves in document order.
fn collect_leaf_parts(mail: &ParsedMail<'_>, parts: &mut Vec<ArchivePart>) -> ViewerResult<()> {
    if !mail.subparts.is_empty() {
        for subpart in &mail.subparts {
            collect_leaf_parts(subpart, parts)?;
        }
        return Ok(());
    }

    let index = parts.len();
    let headers = &mail.headers;
    let raw_encoding = headers.get_first_value("Content-Transfer-Encoding");
    let transfer_encoding = TransferEncoding::from_header(raw_encoding.as_deref());
    if transfer_encoding == TransferEncoding::Unrecognized {
        warn!(
            part = index,
            encoding = raw_encoding.as_deref().unwrap_or_default(),
            "unrecognized transfer encoding, passing body through"
        );
    }

    let body = mail
        .get_body_raw()
        .map_err(|error| body_error(index, &error))?;

    let part = ArchivePart {
        index,
        content_type: headers
            .get_first_value("Content-Type")
            .map(|value| value.trim().to_owned())
            .unwrap_or_default(),
        content_location: headers
            .get_first_value("Content-Location")
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty()),
        content_id: headers
            .get_first_value("Content-ID")
            .and_then(|value| strip_angle_brackets(&value)),
        transfer_encoding,
        body,
    };

    debug!(
        part = index,
        location = part.content_location().unwrap_or_default(),
        content_type = part.content_type(),
        bytes = part.body.len(),
        "decoded archive part"
    );
    parts.push(part);
    Ok(())
}

fn body_error(index: usize, error: &MailParseError) -> ViewerError {
    let code = match error {
        MailParseError::Base64DecodeError(_) => "archive.base64_invalid",
        MailParseError::QuotedPrintableDecodeError(_) => "archive.quoted_printable_invalid",
        _ => "archive.body_invalid",
    };
    ViewerError::new(code, format!("part {index}: {error}"))
}

fn strip_angle_brackets(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let stripped = raw
        .strip_prefix('<')
        .and_then(|inner| inner.strip_suffix('>'))
        .unwrap_or(raw)
        .trim();
    if stripped.is_empty() {
        None
    } else {
        Some(stripped.to_owned())
    }
}

/// True when some line starts with `--boundary--`.
fn has_close_delimiter(input: &[u8], boundary: &str) -> bool {
    let close = format!("--{boundary}--").into_bytes();
    input
        .windows(close.len())
        .enumerate()
        .any(|(at, window)| window == close.as_slice() && (at == 0 || input[at - 1] == b'\n'))
}

#[cfg(test)]
mod tests {
    use super::TransferEncoding;
    use super::media_essence;
    use super::parse_archive;

    const SAMPLE: &str = "From: <Saved by Blink>\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/related;\r\n\
\ttype=\"text/html\";\r\n\
\tboundary=\"----MultipartBoundary--abc----\"\r\n\
\r\n\
------MultipartBoundary--abc----\r\n\
Content-Type: text/html\r\n\
Content-ID: <frame-1@mhtml.blink>\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\
Content-Location: http://example.com/\r\n\
\r\n\
<html><body class=3D\"x\">hi</body></html>\r\n\
------MultipartBoundary--abc----\r\n\
Content-Type: image/png\r\n\
Content-Transfer-Encoding: base64\r\n\
Content-Location: http://example.com/a.png\r\n\
\r\n\
iVBORw0K\r\n\
GgoAAAAN\r\n\
------MultipartBoundary--abc------\r\n";

    #[test]
    fn parses_parts_and_metadata() {
        let archive = match parse_archive(SAMPLE.as_bytes()) {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };

        assert_eq!(archive.media_type, "multipart/related");
        assert_eq!(archive.boundary, "----MultipartBoundary--abc----");
        assert_eq!(archive.parts.len(), 2);

        let page = &archive.parts[0];
        assert_eq!(page.content_location(), Some("http://example.com/"));
        assert_eq!(page.content_type(), "text/html");
        assert_eq!(page.content_id(), Some("frame-1@mhtml.blink"));
        assert_eq!(page.transfer_encoding(), TransferEncoding::QuotedPrintable);
        assert_eq!(page.body, b"<html><body class=\"x\">hi</body></html>");

        let image = &archive.parts[1];
        assert_eq!(image.index, 1);
        assert_eq!(image.transfer_encoding(), TransferEncoding::Base64);
        assert_eq!(image.body, b"\x89PNG\r\n\x1a\n\0\0\0\r".to_vec());
    }

    #[test]
    fn identity_parts_keep_their_bytes() {
        let input = b"Content-Type: multipart/related; boundary=b\n\n\
--b\nContent-Location: http://example.com/raw\n\nline one\nline two\n--b--\n";
        let archive = match parse_archive(input) {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        assert_eq!(archive.parts.len(), 1);
        assert_eq!(archive.parts[0].body, b"line one\nline two".to_vec());
        assert_eq!(archive.parts[0].content_type(), "");
        assert_eq!(
            archive.parts[0].transfer_encoding(),
            TransferEncoding::Identity
        );
    }

    #[test]
    fn missing_content_type_is_fatal() {
        let archive = parse_archive(b"Subject: nothing\r\n\r\nbody\r\n");
        assert_eq!(
            archive.err().map(|error| error.code),
            Some("archive.content_type_missing")
        );
    }

    #[test]
    fn missing_boundary_is_fatal() {
        let archive = parse_archive(b"Content-Type: multipart/related\r\n\r\n--x--\r\n");
        assert_eq!(
            archive.err().map(|error| error.code),
            Some("archive.boundary_missing")
        );
    }

    #[test]
    fn non_multipart_content_type_is_fatal() {
        let archive = parse_archive(b"Content-Type: garbage\r\n\r\n");
        assert_eq!(
            archive.err().map(|error| error.code),
            Some("archive.content_type_invalid")
        );
    }

    #[test]
    fn unterminated_archive_is_fatal() {
        let input = b"Content-Type: multipart/related; boundary=b\r\n\r\n\
--b\r\nContent-Location: http://example.com/\r\n\r\n<p>cut";
        assert_eq!(
            parse_archive(input).err().map(|error| error.code),
            Some("archive.truncated")
        );
    }

    #[test]
    fn bad_base64_part_is_fatal() {
        let input = b"Content-Type: multipart/related; boundary=b\r\n\r\n\
--b\r\nContent-Transfer-Encoding: base64\r\n\r\n!!!!\r\n--b--\r\n";
        let error = match parse_archive(input) {
            Ok(_) => panic!("invalid base64 accepted"),
            Err(error) => error,
        };
        assert_eq!(error.code, "archive.base64_invalid");
        assert!(error.message.starts_with("part 0:"));
    }

    #[test]
    fn nested_multiparts_are_flattened_in_order() {
        let input = b"Content-Type: multipart/related; boundary=outer\r\n\r\n\
--outer\r\nContent-Type: multipart/alternative; boundary=inner\r\n\r\n\
--inner\r\nContent-Type: text/html\r\nContent-Location: http://example.com/\r\n\r\n<p>a</p>\r\n\
--inner--\r\n\
--outer\r\nContent-Type: text/css\r\nContent-Location: http://example.com/s.css\r\n\r\np{}\r\n\
--outer--\r\n";
        let archive = match parse_archive(input) {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        let locations: Vec<_> = archive
            .parts
            .iter()
            .map(|part| (part.index, part.content_location()))
            .collect();
        assert_eq!(
            locations,
            vec![
                (0, Some("http://example.com/")),
                (1, Some("http://example.com/s.css"))
            ]
        );
    }

    #[test]
    fn transfer_encoding_labels_are_case_insensitive() {
        assert_eq!(
            TransferEncoding::from_header(Some(" BASE64 ")),
            TransferEncoding::Base64
        );
        assert_eq!(TransferEncoding::from_header(None), TransferEncoding::Identity);
        assert_eq!(
            TransferEncoding::from_header(Some("x-uuencode")),
            TransferEncoding::Unrecognized
        );
    }

    #[test]
    fn media_essence_ignores_parameters() {
        assert_eq!(media_essence("Text/HTML; charset=utf-8"), "text/html");
        assert_eq!(media_essence(""), "");
    }
}
