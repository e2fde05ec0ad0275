//! Reference classification, absolute resolution and local paths.

use mv_store::ContentIdIndex;
use percent_encoding::AsciiSet;
use percent_encoding::NON_ALPHANUMERIC;
use percent_encoding::percent_decode_str;
use percent_encoding::utf8_percent_encode;
use tracing::debug;
use url::Position;
use url::Url;

/// Everything except `A-Z a-z 0-9 - . _ ~` is escaped in local paths.
const LOCAL_PATH_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Schemes whose references are never rewritten.
const UNTOUCHED_SCHEMES: [&str; 4] = ["data:", "mailto:", "javascript:", "about:"];

/// How a reference found in a document is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reference<'a> {
    /// Left exactly as written.
    Untouched,
    /// `cid:` reference; carries the (still escaped) Content-ID.
    ContentId(&'a str),
    /// Anything else, resolved against the document base.
    Resolvable(&'a str),
}

pub fn classify(reference: &str) -> Reference<'_> {
    if UNTOUCHED_SCHEMES
        .iter()
        .any(|scheme| starts_with_ignore_ascii_case(reference, scheme))
    {
        return Reference::Untouched;
    }

    if starts_with_ignore_ascii_case(reference, "cid:") {
        return Reference::ContentId(&reference["cid:".len()..]);
    }

    Reference::Resolvable(reference)
}

/// Makes `reference` absolute against `base`.
///
/// A reference that already starts with a lowercase scheme is returned
/// unchanged. Protocol-relative and root-relative references take the scheme
/// (and authority) of `base`; anything else is joined onto the directory of
/// the base path with `.` and `..` segments folded.
pub fn resolve(base: &Url, reference: &str) -> String {
    if has_scheme(reference) {
        return reference.to_owned();
    }

    if reference.starts_with("//") {
        return format!("{}:{reference}", base.scheme());
    }

    let authority = &base[Position::BeforeHost..Position::AfterPort];
    if reference.starts_with('/') {
        return format!("{}://{authority}{reference}", base.scheme());
    }

    format!(
        "{}://{authority}{}",
        base.scheme(),
        join_relative(base.path(), reference)
    )
}

/// Server path for an absolute URL: `/` followed by the escaped URL.
pub fn local_path(absolute: &str) -> String {
    format!("/{}", utf8_percent_encode(absolute, LOCAL_PATH_ESCAPE))
}

/// Maps references found inside one resource to local paths.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceMapper<'a> {
    base: &'a Url,
    content_ids: &'a ContentIdIndex,
}

impl<'a> ReferenceMapper<'a> {
    pub fn new(base: &'a Url, content_ids: &'a ContentIdIndex) -> Self {
        Self { base, content_ids }
    }

    /// Absolute form of `reference`, or `None` when it must stay as written.
    pub fn absolute(&self, reference: &str) -> Option<String> {
        let reference = reference.trim_matches(|ch: char| ch.is_ascii_whitespace());

        match classify(reference) {
            Reference::Untouched => None,
            Reference::ContentId(content_id) => {
                let location = self.content_id_location(content_id)?;
                Some(resolve(self.base, location))
            }
            Reference::Resolvable(reference) => Some(resolve(self.base, reference)),
        }
    }

    /// Local server path for `reference`, or `None` when it must stay as
    /// written.
    pub fn local_path(&self, reference: &str) -> Option<String> {
        self.absolute(reference).map(|absolute| local_path(&absolute))
    }

    fn content_id_location(&self, content_id: &str) -> Option<&'a str> {
        let found = self.content_ids.location_for(content_id).or_else(|| {
            let decoded = percent_decode_str(content_id).decode_utf8().ok()?;
            self.content_ids.location_for(&decoded)
        });

        if found.is_none() {
            debug!(content_id, "unregistered cid reference left unchanged");
        }
        found
    }
}

/// `^[a-z]+:`
fn has_scheme(reference: &str) -> bool {
    let letters = reference
        .bytes()
        .take_while(|byte| byte.is_ascii_lowercase())
        .count();
    letters > 0 && reference.as_bytes().get(letters).copied() == Some(b':')
}

fn join_relative(base_path: &str, reference: &str) -> String {
    let directory = match base_path.rfind('/') {
        Some(idx) => &base_path[..idx],
        None => "",
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in directory.split('/').chain(reference.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    let mut joined = format!("/{}", segments.join("/"));
    if reference.ends_with('/') && !segments.is_empty() {
        joined.push('/');
    }
    joined
}

fn starts_with_ignore_ascii_case(value: &str, prefix: &str) -> bool {
    value
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

#[cfg(test)]
mod tests {
    use super::Reference;
    use super::classify;
    use super::local_path;
    use super::resolve;
    use url::Url;

    fn base(raw: &str) -> Url {
        match Url::parse(raw) {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        }
    }

    #[test]
    fn resolves_every_reference_form() {
        let page = base("http://example.com:8080/a/b/page.html?q=1");
        assert_eq!(resolve(&page, "https://cdn.test/x.js"), "https://cdn.test/x.js");
        assert_eq!(resolve(&page, "//cdn.test/x.js"), "http://cdn.test/x.js");
        assert_eq!(resolve(&page, "/root.css"), "http://example.com:8080/root.css");
        assert_eq!(resolve(&page, "img/logo.png"), "http://example.com:8080/a/b/img/logo.png");
        assert_eq!(resolve(&page, "../up.png"), "http://example.com:8080/a/up.png");
        assert_eq!(resolve(&page, "./../../../../top.png"), "http://example.com:8080/top.png");
    }

    #[test]
    fn keeps_trailing_slash_of_directory_references() {
        let page = base("http://example.com/a/page.html");
        assert_eq!(resolve(&page, "sub/"), "http://example.com/a/sub/");
        assert_eq!(resolve(&page, "../"), "http://example.com/");
    }

    #[test]
    fn only_lowercase_schemes_count_as_absolute() {
        let page = base("http://example.com/a/");
        assert_eq!(resolve(&page, "HTTP:x"), "http://example.com/a/HTTP:x");
    }

    #[test]
    fn escapes_everything_but_unreserved_bytes() {
        assert_eq!(
            local_path("http://example.com/img/logo.png"),
            "/http%3A%2F%2Fexample.com%2Fimg%2Flogo.png"
        );
        assert_eq!(local_path("http://a/b c?d=é~"), "/http%3A%2F%2Fa%2Fb%20c%3Fd%3D%C3%A9~");
    }

    #[test]
    fn classifies_schemes() {
        assert_eq!(classify("data:image/png;base64,AA"), Reference::Untouched);
        assert_eq!(classify("MailTo:me@example.com"), Reference::Untouched);
        assert_eq!(classify("javascript:void(0)"), Reference::Untouched);
        assert_eq!(classify("cid:part@x"), Reference::ContentId("part@x"));
        assert_eq!(classify("x.png"), Reference::Resolvable("x.png"));
    }
}
