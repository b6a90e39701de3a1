//! Minimal element model used for generated markup.
//!
//! Only what the renderer needs: attributes, a class list, children and
//! serialization. Attribute order is stable: `id`, `class`, `for` and `name`
//! come first, everything else follows in insertion order.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

/// Void elements: cannot have children or a closing tag.
/// https://html.spec.whatwg.org/multipage/syntax.html#void-elements
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input",
    "link", "meta", "param", "source", "track", "wbr",
];

/// Attributes serialized before all others, in this order.
const LEADING_ATTRIBUTES: &[&str] = &["id", "class", "for", "name"];

pub fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag.to_ascii_lowercase().as_str())
}

/// Capability for creating elements
pub trait Document {
    fn create_element(&self, tag: &str) -> Element;
}

/// Document used when rendering outside a browser
#[derive(Debug, Default, Clone, Copy)]
pub struct ServerDocument;

impl Document for ServerDocument {
    fn create_element(&self, tag: &str) -> Element {
        Element::new(tag)
    }
}

#[derive(Debug, Clone)]
pub enum Child {
    /// Text, escaped on output
    Text(String),
    /// Markup inserted verbatim
    Html(String),
    Element(Element),
}

#[derive(Debug)]
struct ElementData {
    tag: String,
    attributes: IndexMap<String, String>,
    children: Vec<Child>,
}

/// Shared handle to an element; clones refer to the same node
#[derive(Debug, Clone)]
pub struct Element(Rc<RefCell<ElementData>>);

impl Element {
    pub fn new(tag: &str) -> Self {
        Element(Rc::new(RefCell::new(ElementData {
            tag: tag.to_ascii_lowercase(),
            attributes: IndexMap::new(),
            children: Vec::new(),
        })))
    }

    pub fn tag_name(&self) -> String {
        self.0.borrow().tag.clone()
    }

    pub fn ptr_eq(&self, other: &Element) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn get_attribute(&self, name: &str) -> Option<String> {
        self.0.borrow().attributes.get(name).cloned()
    }

    pub fn set_attribute(&self, name: &str, value: impl Into<String>) {
        self.0
            .borrow_mut()
            .attributes
            .insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn remove_attribute(&self, name: &str) {
        self.0.borrow_mut().attributes.shift_remove(name);
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.0.borrow().attributes.contains_key(name)
    }

    pub fn class_list(&self) -> Vec<String> {
        self.get_attribute("class")
            .map(|classes| classes.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Add every whitespace-separated class in `names` that is not present yet
    pub fn add_class(&self, names: &str) {
        let mut classes = self.class_list();
        for name in names.split_whitespace() {
            if !classes.iter().any(|existing| existing == name) {
                classes.push(name.to_string());
            }
        }
        if !classes.is_empty() {
            self.set_attribute("class", classes.join(" "));
        }
    }

    /// Set a `data-*` attribute; camelCase keys are dasherized
    pub fn set_data(&self, key: &str, value: impl Into<String>) {
        let mut name = String::from("data-");
        for c in key.chars() {
            if c.is_ascii_uppercase() {
                name.push('-');
                name.push(c.to_ascii_lowercase());
            } else {
                name.push(c);
            }
        }
        self.set_attribute(&name, value);
    }

    pub fn append_child(&self, child: Element) {
        self.0.borrow_mut().children.push(Child::Element(child));
    }

    pub fn append_text(&self, text: impl Into<String>) {
        self.0.borrow_mut().children.push(Child::Text(text.into()));
    }

    pub fn append_html(&self, html: impl Into<String>) {
        self.0.borrow_mut().children.push(Child::Html(html.into()));
    }

    pub fn children(&self) -> Vec<Child> {
        self.0.borrow().children.clone()
    }

    /// Merge adjacent text children and drop empty ones, recursively
    pub fn normalize(&self) {
        let children = std::mem::take(&mut self.0.borrow_mut().children);
        let mut merged: Vec<Child> = Vec::with_capacity(children.len());
        for child in children {
            match child {
                Child::Text(text) if text.is_empty() => {}
                Child::Text(text) => match merged.last_mut() {
                    Some(Child::Text(previous)) => previous.push_str(&text),
                    _ => merged.push(Child::Text(text)),
                },
                Child::Element(element) => {
                    element.normalize();
                    merged.push(Child::Element(element));
                }
                html => merged.push(html),
            }
        }
        self.0.borrow_mut().children = merged;
    }

    pub fn opening_tag(&self) -> String {
        let data = self.0.borrow();
        let mut tag = format!("<{}", data.tag);

        let leading = LEADING_ATTRIBUTES
            .iter()
            .filter_map(|name| data.attributes.get_key_value(*name));
        let rest = data
            .attributes
            .iter()
            .filter(|(name, _)| !LEADING_ATTRIBUTES.contains(&name.as_str()));

        for (name, value) in leading.chain(rest) {
            tag.push(' ');
            tag.push_str(name);
            if !value.is_empty() {
                tag.push_str("=\"");
                tag.push_str(&escape_attribute(value));
                tag.push('"');
            }
        }
        tag.push('>');
        tag
    }

    pub fn inner_html(&self) -> String {
        let data = self.0.borrow();
        let mut html = String::new();
        for child in &data.children {
            match child {
                Child::Text(text) => html.push_str(&escape_text(text)),
                Child::Html(markup) => html.push_str(markup),
                Child::Element(element) => html.push_str(&element.outer_html()),
            }
        }
        html
    }

    pub fn outer_html(&self) -> String {
        let tag = self.tag_name();
        let mut html = self.opening_tag();
        if is_void_element(&tag) {
            return html;
        }
        html.push_str(&self.inner_html());
        html.push_str("</");
        html.push_str(&tag);
        html.push('>');
        html
    }

    /// Concatenated text of all descendants, markup stripped
    pub fn text_content(&self) -> String {
        let data = self.0.borrow();
        let mut text = String::new();
        for child in &data.children {
            match child {
                Child::Text(value) => text.push_str(value),
                Child::Html(markup) => text.push_str(&strip_tags(markup)),
                Child::Element(element) => text.push_str(&element.text_content()),
            }
        }
        text
    }
}

pub fn escape_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

pub fn escape_attribute(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Remove everything between `<` and `>`
pub fn strip_tags(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_attribute_order() {
        let el = Element::new("INPUT");
        el.set_attribute("type", "text");
        el.set_attribute("name", "title");
        el.set_attribute("data-x", "1");
        el.set_attribute("class", "wide");
        el.set_attribute("id", "field");
        assert_eq!(
            el.outer_html(),
            r#"<input id="field" class="wide" name="title" type="text" data-x="1">"#
        );
    }

    #[test]
    fn test_children_and_escaping() {
        let el = Element::new("p");
        el.append_text("a < b");
        el.append_html("<b>bold</b>");
        let child = Element::new("span");
        child.append_text("x");
        el.append_child(child);
        assert_eq!(el.inner_html(), "a &lt; b<b>bold</b><span>x</span>");
        assert_eq!(el.text_content(), "a < bboldx");
    }

    #[test]
    fn test_add_class_and_dataset() {
        let el = Element::new("div");
        el.add_class("a b");
        el.add_class("b c");
        el.set_data("heName", "main");
        assert_eq!(el.get_attribute("class").as_deref(), Some("a b c"));
        assert!(el.has_attribute("data-he-name"));
        el.remove_attribute("data-he-name");
        assert!(!el.has_attribute("data-he-name"));
    }

    #[test]
    fn test_normalize_merges_text() {
        let el = Element::new("div");
        el.append_text("a");
        el.append_text("");
        el.append_text("b");
        el.normalize();
        assert_eq!(el.children().len(), 1);
        assert_eq!(el.inner_html(), "ab");
    }
}
