//! Reference rewriting for HTML documents.

use crate::reference::ReferenceMapper;
use encoding_rs::UTF_8;
use mv_charset::decode_text;
use mv_charset::encode_text;
use mv_core::ViewerError;
use mv_core::ViewerResult;
use mv_css::contains_url_reference;
use mv_css::rewrite_style_text;
use mv_dom::Document;
use mv_dom::Element;
use mv_dom::Node;
use mv_html::parse_document;
use mv_store::ContentIdIndex;
use mv_store::Resource;
use tracing::debug;

/// Script appended to the initial document; reports that the page loaded.
pub const DONE_SIGNAL_SCRIPT: &str = "
window.addEventListener('load', function() {
  var req = new XMLHttpRequest();
  req.open('GET', '/done-signal');
  req.send();
});
";

/// Attributes holding a single URL that the browser will fetch.
const URL_ATTRIBUTES: [&str; 4] = ["src", "href", "background", "poster"];

/// Rewrites one HTML resource in place; returns the number of rewritten
/// references.
pub fn rewrite_html(resource: &mut Resource, content_ids: &ContentIdIndex) -> ViewerResult<usize> {
    let encoding = resource.text_encoding.unwrap_or(UTF_8);
    let mut document = parse_document(&decode_text(&resource.data, encoding));

    let mut base_hrefs = Vec::new();
    take_head_bases(&mut document.children, &mut base_hrefs);
    if let Some(href) = base_hrefs.first() {
        let base = resolve_base(resource, href)?;
        debug!(location = resource.location(), base = %base, "document base overridden");
        resource.base_url = base;
    }

    let mapper = ReferenceMapper::new(&resource.base_url, content_ids);
    let mut rewritten = 0_usize;
    document.for_each_element_mut(&mut |element| {
        rewritten += rewrite_element(element, &mapper);
    });

    if resource.was_converted {
        declare_utf8(&mut document);
    }
    if resource.is_initial_document {
        append_done_signal(&mut document);
    }

    debug!(
        location = resource.location(),
        references = rewritten,
        "rewrote HTML document"
    );
    resource.data = encode_text(&document.serialize(), encoding);
    Ok(rewritten)
}

/// True when `attribute` on `element` is a reference to rewrite. Anchor
/// `href` stays pointing at the live site.
pub fn is_rewritable(element: &Element, attribute: &str) -> bool {
    if element.is("a") && attribute.eq_ignore_ascii_case("href") {
        return false;
    }
    URL_ATTRIBUTES
        .iter()
        .any(|name| name.eq_ignore_ascii_case(attribute))
}

/// Elements a browser keeps in the head, whether or not `<head>` was
/// written out.
const HEAD_CONTENT: [&str; 10] = [
    "base", "basefont", "bgsound", "link", "meta", "noscript", "script", "style", "template",
    "title",
];

fn is_base_with_href(element: &Element) -> bool {
    element.is("base") && element.has_attr("href")
}

fn is_head_content(element: &Element) -> bool {
    HEAD_CONTENT.iter().any(|name| element.is(name))
}

enum HeadScan {
    Continue,
    BodyReached,
}

enum HeadStep {
    TakeBase,
    Descend,
    Skip,
    Stop,
}

/// Removes every `base[href]` a browser would place in the head, explicit
/// or implied, and returns their `href` values in document order. The scan
/// ends at the first body content.
fn take_head_bases(nodes: &mut Vec<Node>, hrefs: &mut Vec<String>) -> HeadScan {
    let mut idx = 0_usize;
    while idx < nodes.len() {
        let step = match &nodes[idx] {
            Node::Element(element) if is_base_with_href(element) => HeadStep::TakeBase,
            Node::Element(element) if element.is("html") || element.is("head") => {
                HeadStep::Descend
            }
            Node::Element(element) if is_head_content(element) => HeadStep::Skip,
            Node::Element(_) => HeadStep::Stop,
            Node::Text(text) if !text.trim().is_empty() => HeadStep::Stop,
            _ => HeadStep::Skip,
        };

        match step {
            HeadStep::TakeBase => {
                if let Node::Element(base) = nodes.remove(idx) {
                    hrefs.extend(base.attr_value("href"));
                }
                continue;
            }
            HeadStep::Descend => {
                if let Node::Element(element) = &mut nodes[idx] {
                    if let HeadScan::BodyReached = take_head_bases(&mut element.children, hrefs) {
                        return HeadScan::BodyReached;
                    }
                }
            }
            HeadStep::Skip => {}
            HeadStep::Stop => return HeadScan::BodyReached,
        }
        idx += 1;
    }
    HeadScan::Continue
}

/// Resolves a `<base href>` against the resource location.
fn resolve_base(resource: &Resource, href: &str) -> ViewerResult<url::Url> {
    resource.base_url.join(href.trim()).map_err(|error| {
        ViewerError::new(
            "rewrite.base_invalid",
            format!(
                "`{}` has an unusable <base href=\"{href}\">: {error}",
                resource.location()
            ),
        )
    })
}

fn rewrite_element(element: &mut Element, mapper: &ReferenceMapper<'_>) -> usize {
    let mut rewritten = 0_usize;

    for idx in 0..element.attrs.len() {
        let name = element.attrs[idx].name.clone();
        let value = element.attrs[idx].value();

        let replacement = if is_rewritable(element, &name) {
            mapper.local_path(&value)
        } else if name == "srcset" {
            rewrite_srcset(&value, mapper)
        } else if name == "style" && contains_url_reference(&value) {
            Some(rewrite_style_text(&value, |target| mapper.local_path(target)))
        } else {
            None
        };

        if let Some(replacement) = replacement {
            element.attrs[idx].set_value(&replacement);
            if name != "style" {
                rewritten += 1;
            }
        }
    }

    if rewritten > 0 {
        element.remove_attr("integrity");
    }

    if element.is("style") {
        let css = element.text();
        if contains_url_reference(&css) {
            element.set_text(rewrite_style_text(&css, |target| mapper.local_path(target)));
        }
    }

    rewritten
}

/// Rewrites every candidate URL of a `srcset` list, keeping descriptors and
/// separators as written.
fn rewrite_srcset(value: &str, mapper: &ReferenceMapper<'_>) -> Option<String> {
    let bytes = value.as_bytes();
    let mut out = String::with_capacity(value.len());
    let mut changed = false;
    let mut idx = 0_usize;

    while idx < bytes.len() {
        let separator_start = idx;
        while idx < bytes.len() && (bytes[idx].is_ascii_whitespace() || bytes[idx] == b',') {
            idx += 1;
        }
        out.push_str(&value[separator_start..idx]);
        if idx >= bytes.len() {
            break;
        }

        let url_start = idx;
        while idx < bytes.len() && !bytes[idx].is_ascii_whitespace() {
            idx += 1;
        }
        let mut url_end = idx;
        while url_end > url_start && bytes[url_end - 1] == b',' {
            url_end -= 1;
        }

        let candidate = &value[url_start..url_end];
        match mapper.local_path(candidate) {
            Some(path) => {
                out.push_str(&path);
                changed = true;
            }
            None => out.push_str(candidate),
        }

        if url_end < idx {
            // Candidate ended with its separator; no descriptors.
            out.push_str(&value[url_end..idx]);
            continue;
        }

        let descriptor_start = idx;
        while idx < bytes.len() && bytes[idx] != b',' {
            idx += 1;
        }
        out.push_str(&value[descriptor_start..idx]);
    }

    changed.then_some(out)
}

fn declare_utf8(document: &mut Document) {
    document.for_each_element_mut(&mut |element| {
        if !element.is("meta") {
            return;
        }
        let is_content_type = element
            .attr_value("http-equiv")
            .is_some_and(|value| value.trim().eq_ignore_ascii_case("content-type"));
        if is_content_type {
            element.set_attr("content", "text/html; charset=utf-8");
        }
        if element.has_attr("charset") {
            element.set_attr("charset", "utf-8");
        }
    });
}

fn append_done_signal(document: &mut Document) {
    let mut script = Element::new("script");
    script.set_text(DONE_SIGNAL_SCRIPT);

    if let Some(head) = document.find_first_mut(&|element| element.is("head")) {
        head.children.push(Node::Element(script));
        return;
    }

    let mut head = Element::new("head");
    head.children.push(Node::Element(script));

    if let Some(html) = document.find_first_mut(&|element| element.is("html")) {
        html.children.insert(0, Node::Element(head));
        return;
    }

    // No <html> either: place the head after any leading doctype/comments.
    let at = document
        .children
        .iter()
        .position(|node| match node {
            Node::Element(_) => true,
            Node::Text(text) => !text.trim().is_empty(),
            _ => false,
        })
        .unwrap_or(document.children.len());
    document.children.insert(at, Node::Element(head));
}
