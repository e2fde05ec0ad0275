//! Lossless HTML document tree.
//!
//! The tree keeps enough of the source (raw text, raw attribute values,
//! comments, declarations, omitted end tags) that serializing an unmodified
//! document reproduces its markup.

/// Parsed document: the top-level node list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    /// Character data exactly as written, entities included.
    Text(String),
    /// Inside of `<!-- ... -->`.
    Comment(String),
    /// Inside of `<! ... >`, e.g. `DOCTYPE html`.
    Declaration(String),
    /// Inside of `<? ... >`.
    ProcessingInstruction(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Lowercased tag name.
    pub name: String,
    pub attrs: Vec<Attribute>,
    pub children: Vec<Node>,
    /// Source used `/>`.
    pub self_closing: bool,
    /// Source carried an explicit end tag.
    pub has_end_tag: bool,
}

/// One attribute; the value is kept in source form (entities unexpanded).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Lowercased attribute name.
    pub name: String,
    raw_value: Option<String>,
}

impl Attribute {
    /// Creates an attribute from a plain value, escaping it as needed.
    pub fn new(name: impl Into<String>, value: &str) -> Self {
        Self {
            name: name.into().to_ascii_lowercase(),
            raw_value: Some(escape_attribute(value)),
        }
    }

    /// Creates an attribute from already-escaped source text; `None` is a
    /// bare attribute such as `defer`.
    pub fn from_raw(name: impl Into<String>, raw_value: Option<String>) -> Self {
        Self {
            name: name.into().to_ascii_lowercase(),
            raw_value,
        }
    }

    pub fn raw_value(&self) -> Option<&str> {
        self.raw_value.as_deref()
    }

    /// Value with character references expanded; empty for bare attributes.
    pub fn value(&self) -> String {
        self.raw_value
            .as_deref()
            .map(decode_entities)
            .unwrap_or_default()
    }

    pub fn set_value(&mut self, value: &str) {
        self.raw_value = Some(escape_attribute(value));
    }
}

impl Element {
    /// New element that serializes with an explicit end tag.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into().to_ascii_lowercase();
        let has_end_tag = !is_void(&name);
        Self {
            name,
            attrs: Vec::new(),
            children: Vec::new(),
            self_closing: false,
            has_end_tag,
        }
    }

    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn attr(&self, name: &str) -> Option<&Attribute> {
        self.attrs
            .iter()
            .find(|attr| attr.name.eq_ignore_ascii_case(name))
    }

    pub fn attr_mut(&mut self, name: &str) -> Option<&mut Attribute> {
        self.attrs
            .iter_mut()
            .find(|attr| attr.name.eq_ignore_ascii_case(name))
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    /// Decoded value of the first attribute with this name.
    pub fn attr_value(&self, name: &str) -> Option<String> {
        self.attr(name).map(Attribute::value)
    }

    /// Sets the first attribute with this name, appending it when absent.
    pub fn set_attr(&mut self, name: &str, value: &str) {
        match self.attr_mut(name) {
            Some(attr) => attr.set_value(value),
            None => self.attrs.push(Attribute::new(name, value)),
        }
    }

    /// Removes every attribute with this name; returns how many were removed.
    pub fn remove_attr(&mut self, name: &str) -> usize {
        let before = self.attrs.len();
        self.attrs.retain(|attr| !attr.name.eq_ignore_ascii_case(name));
        before - self.attrs.len()
    }

    /// Concatenated direct text children.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            if let Node::Text(text) = child {
                out.push_str(text);
            }
        }
        out
    }

    /// Replaces all children with a single text node.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.children = vec![Node::Text(text.into())];
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }
}

impl Document {
    /// First element in document order matching `predicate`.
    pub fn find_first(&self, predicate: &impl Fn(&Element) -> bool) -> Option<&Element> {
        find_in(&self.children, predicate)
    }

    pub fn find_first_mut(
        &mut self,
        predicate: &impl Fn(&Element) -> bool,
    ) -> Option<&mut Element> {
        find_in_mut(&mut self.children, predicate)
    }

    /// Calls `visit` on every element in document order (parents first).
    pub fn for_each_element_mut(&mut self, visit: &mut impl FnMut(&mut Element)) {
        visit_nodes_mut(&mut self.children, visit);
    }

    /// Removes every element (with its subtree) matching `predicate`;
    /// returns how many were removed.
    pub fn remove_elements(&mut self, predicate: &impl Fn(&Element) -> bool) -> usize {
        remove_in(&mut self.children, predicate)
    }

    pub fn serialize(&self) -> String {
        let mut out = String::new();
        serialize_nodes(&self.children, &mut out);
        out
    }
}

fn find_in<'a>(nodes: &'a [Node], predicate: &impl Fn(&Element) -> bool) -> Option<&'a Element> {
    for node in nodes {
        let Node::Element(element) = node else {
            continue;
        };
        if predicate(element) {
            return Some(element);
        }
        if let Some(found) = find_in(&element.children, predicate) {
            return Some(found);
        }
    }
    None
}

fn find_in_mut<'a>(
    nodes: &'a mut [Node],
    predicate: &impl Fn(&Element) -> bool,
) -> Option<&'a mut Element> {
    for node in nodes {
        let Node::Element(element) = node else {
            continue;
        };
        if predicate(element) {
            return Some(element);
        }
        if let Some(found) = find_in_mut(&mut element.children, predicate) {
            return Some(found);
        }
    }
    None
}

fn visit_nodes_mut(nodes: &mut [Node], visit: &mut impl FnMut(&mut Element)) {
    for node in nodes {
        if let Node::Element(element) = node {
            visit(element);
            visit_nodes_mut(&mut element.children, visit);
        }
    }
}

fn remove_in(nodes: &mut Vec<Node>, predicate: &impl Fn(&Element) -> bool) -> usize {
    let before = nodes.len();
    nodes.retain(|node| !matches!(node, Node::Element(element) if predicate(element)));
    let mut removed = before - nodes.len();

    for node in nodes.iter_mut() {
        if let Node::Element(element) = node {
            removed += remove_in(&mut element.children, predicate);
        }
    }
    removed
}

fn serialize_nodes(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Comment(comment) => {
                out.push_str("<!--");
                out.push_str(comment);
                out.push_str("-->");
            }
            Node::Declaration(decl) => {
                out.push_str("<!");
                out.push_str(decl);
                out.push('>');
            }
            Node::ProcessingInstruction(body) => {
                out.push_str("<?");
                out.push_str(body);
                out.push('>');
            }
            Node::Element(element) => serialize_element(element, out),
        }
    }
}

fn serialize_element(element: &Element, out: &mut String) {
    out.push('<');
    out.push_str(&element.name);
    for attr in &element.attrs {
        out.push(' ');
        out.push_str(&attr.name);
        if let Some(raw) = attr.raw_value() {
            out.push_str("=\"");
            out.push_str(&raw.replace('"', "&quot;"));
            out.push('"');
        }
    }
    if element.self_closing {
        out.push_str(" /");
    }
    out.push('>');

    serialize_nodes(&element.children, out);

    if element.has_end_tag {
        out.push_str("</");
        out.push_str(&element.name);
        out.push('>');
    }
}

/// Elements that never have content or an end tag.
pub fn is_void(name: &str) -> bool {
    matches!(
        name,
        "area"
            | "base"
            | "br"
            | "col"
            | "embed"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "param"
            | "source"
            | "track"
            | "wbr"
    )
}

/// Escapes a plain value for a double-quoted attribute.
pub fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Expands numeric and the common named character references. Unknown
/// references are kept verbatim.
pub fn decode_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut cursor = 0_usize;

    while let Some(rel_amp) = input[cursor..].find('&') {
        let amp = cursor + rel_amp;
        out.push_str(&input[cursor..amp]);

        let rest = &input[(amp + 1)..];
        let Some(rel_semi) = rest.find(';') else {
            out.push('&');
            cursor = amp + 1;
            continue;
        };

        let semi = amp + 1 + rel_semi;
        match decode_entity(&input[(amp + 1)..semi]) {
            Some(decoded) => {
                out.push(decoded);
                cursor = semi + 1;
            }
            None => {
                out.push('&');
                cursor = amp + 1;
            }
        }
    }

    out.push_str(&input[cursor..]);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "nbsp" => Some('\u{a0}'),
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let value = if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                entity.strip_prefix('#')?.parse::<u32>().ok()?
            };
            char::from_u32(value)
        }
    }
}
