//! Named content regions and their assembly into final output.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use futures_util::future::{FutureExt, LocalBoxFuture, Shared};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::content::{Content, Fragment, LOOP_MARKER, Renderable, push_text};
use crate::dom::Element;
use crate::error::{Error, Result};
use crate::expression::is_empty_whitespace_html;
use crate::renderer::Renderer;
use crate::scope::Scope;
use crate::value::Value;

/// Memoized assembly shared by every caller of [`BlockBuffer::assemble`]
pub type Assembly = Shared<LocalBoxFuture<'static, Result<()>>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentMode {
    /// A new definition of the block replaces the old one
    #[default]
    Replace,
    /// Definitions accumulate, each wrapped in its own `he-block`
    Push,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BlockOptions {
    pub class_name: Option<String>,
    pub content: ContentMode,
    /// Extra attributes for the generated `he-block` element
    pub attributes: IndexMap<String, String>,
}

impl BlockOptions {
    pub fn push() -> Self {
        Self {
            content: ContentMode::Push,
            ..Default::default()
        }
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        if value.is_nullish() {
            return Ok(Self::default());
        }
        serde_json::from_value(value.to_json())
            .map_err(|err| Error::runtime(format!("Invalid block options: {}", err)))
    }
}

/// Template rendered when its placeholder is resolved
#[derive(Debug)]
pub struct TemplateCall {
    pub name: String,
    pub scope: Scope,
    pub scope_id: usize,
    /// Nesting depth of the template that requested it
    pub depth: usize,
}

/// Slot filled with the block named `name` of scope `scope_id`
#[derive(Debug)]
pub struct AssignSlot {
    pub name: String,
    pub scope_id: usize,
    pub options: BlockOptions,
}

pub enum PlaceholderKind {
    Template(TemplateCall),
    Assign(AssignSlot),
    Renderable(Rc<dyn Renderable>),
}

/// Line whose content is only known after resolution
pub struct Placeholder {
    pub kind: PlaceholderKind,
    content: RefCell<Option<Content>>,
}

impl Placeholder {
    pub fn new(kind: PlaceholderKind) -> Rc<Self> {
        Rc::new(Self {
            kind,
            content: RefCell::new(None),
        })
    }

    pub fn is_resolved(&self) -> bool {
        self.content.borrow().is_some()
    }

    pub fn content(&self) -> Option<Content> {
        self.content.borrow().clone()
    }

    pub(crate) fn resolve(&self, content: Content) {
        *self.content.borrow_mut() = Some(content);
    }
}

impl fmt::Debug for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            PlaceholderKind::Template(call) => format!("template {}", call.name),
            PlaceholderKind::Assign(slot) => format!("assign {}", slot.name),
            PlaceholderKind::Renderable(_) => "renderable".to_string(),
        };
        f.debug_struct("Placeholder")
            .field("kind", &kind)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum Line {
    Text(String),
    Element(Element),
    Pending(Rc<Placeholder>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyState {
    Idle,
    Assembling,
    Assembled,
    Failed,
}

/// Where a block was defined
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockOrigin {
    pub template: Option<String>,
    pub scope_id: usize,
    pub level: usize,
}

pub struct BlockBuffer {
    name: String,
    block_id: usize,
    origin: BlockOrigin,
    options: RefCell<BlockOptions>,
    lines: RefCell<Vec<Line>>,
    elements: RefCell<Vec<usize>>,
    trims: RefCell<HashMap<usize, (bool, bool)>>,
    trim_blanks: RefCell<HashSet<usize>>,
    others: RefCell<Vec<Rc<BlockBuffer>>>,
    assembly: RefCell<Option<Assembly>>,
    state: Cell<AssemblyState>,
    serializing: Cell<bool>,
}

impl BlockBuffer {
    /// Create a buffer; unnamed buffers are called `nameless-<id>`
    pub fn new(
        name: Option<&str>,
        block_id: usize,
        origin: BlockOrigin,
        options: BlockOptions,
    ) -> Rc<Self> {
        Rc::new(Self {
            name: name.map_or_else(|| format!("nameless-{}", block_id), str::to_string),
            block_id,
            origin,
            options: RefCell::new(options),
            lines: RefCell::new(Vec::new()),
            elements: RefCell::new(Vec::new()),
            trims: RefCell::new(HashMap::new()),
            trim_blanks: RefCell::new(HashSet::new()),
            others: RefCell::new(Vec::new()),
            assembly: RefCell::new(None),
            state: Cell::new(AssemblyState::Idle),
            serializing: Cell::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn block_id(&self) -> usize {
        self.block_id
    }

    pub fn origin(&self) -> &BlockOrigin {
        &self.origin
    }

    pub fn options(&self) -> BlockOptions {
        self.options.borrow().clone()
    }

    pub fn is_push(&self) -> bool {
        self.options.borrow().content == ContentMode::Push
    }

    pub fn state(&self) -> AssemblyState {
        self.state.get()
    }

    pub fn is_assembling(&self) -> bool {
        self.state.get() == AssemblyState::Assembling
    }

    pub fn is_assembled(&self) -> bool {
        self.state.get() == AssemblyState::Assembled
    }

    pub fn lines(&self) -> Vec<Line> {
        self.lines.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.lines.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.borrow().is_empty()
    }

    /// Append a line and return its index
    pub fn push(&self, line: Line) -> usize {
        let mut lines = self.lines.borrow_mut();
        if matches!(line, Line::Element(_)) {
            self.elements.borrow_mut().push(lines.len());
        }
        lines.push(line);
        lines.len() - 1
    }

    pub fn push_text(&self, text: impl Into<String>) -> usize {
        self.push(Line::Text(text.into()))
    }

    pub fn push_element(&self, element: Element) -> usize {
        self.push(Line::Element(element))
    }

    pub fn push_placeholder(&self, placeholder: Rc<Placeholder>) -> usize {
        self.push(Line::Pending(placeholder))
    }

    /// Elements pushed directly into this buffer
    pub fn elements(&self) -> Vec<Element> {
        let lines = self.lines.borrow();
        self.elements
            .borrow()
            .iter()
            .filter_map(|index| match lines.get(*index) {
                Some(Line::Element(element)) => Some(element.clone()),
                _ => None,
            })
            .collect()
    }

    /// Mark the current position for whitespace trimming
    pub fn trim(&self, left: bool, right: bool) {
        let index = self.len();
        self.trims.borrow_mut().insert(index, (left, right));
        self.push_text("");
    }

    /// Drop everything before this position when it has no visible content
    pub fn trim_blank(&self) {
        let index = self.len();
        self.trim_blanks.borrow_mut().insert(index);
        self.push_text("");
    }

    pub(crate) fn add_instance(&self, other: Rc<BlockBuffer>) {
        self.others.borrow_mut().push(other);
    }

    pub fn other_instances(&self) -> Vec<Rc<BlockBuffer>> {
        self.others.borrow().clone()
    }

    /// Resolve everything this buffer waits on. Every call returns the same
    /// shared future, so a buffer is assembled once.
    pub fn assemble(self: &Rc<Self>, renderer: &Renderer) -> Assembly {
        if let Some(assembly) = self.assembly.borrow().as_ref() {
            return assembly.clone();
        }
        let buffer = self.clone();
        let renderer = renderer.clone();
        let assembly = async move { buffer.run_assembly(&renderer).await }
            .boxed_local()
            .shared();
        *self.assembly.borrow_mut() = Some(assembly.clone());
        assembly
    }

    async fn run_assembly(self: &Rc<Self>, renderer: &Renderer) -> Result<()> {
        self.state.set(AssemblyState::Assembling);
        tracing::trace!(block = %self.name, id = self.block_id, "assembling block");

        let result = self.assemble_with_instances(renderer).await;
        self.state.set(match result {
            Ok(()) => AssemblyState::Assembled,
            Err(_) => AssemblyState::Failed,
        });
        result
    }

    async fn assemble_with_instances(self: &Rc<Self>, renderer: &Renderer) -> Result<()> {
        self.assemble_lines(renderer).await?;

        let others = self.other_instances();
        for other in others {
            other.options.borrow_mut().content = ContentMode::Push;
            other.assemble(renderer).await?;
            let wrapped = other.lines.borrow().first().cloned();
            if let Some(line) = wrapped {
                self.push(line);
            }
        }
        Ok(())
    }

    async fn assemble_lines(self: &Rc<Self>, renderer: &Renderer) -> Result<()> {
        renderer.process_queue().await?;

        let pending: Vec<Rc<Placeholder>> = self
            .lines
            .borrow()
            .iter()
            .filter_map(|line| match line {
                Line::Pending(placeholder) => Some(placeholder.clone()),
                _ => None,
            })
            .collect();

        for placeholder in &pending {
            renderer.resolve_placeholder(placeholder).await?;
        }
        for placeholder in &pending {
            if let Some(content) = placeholder.content() {
                renderer.prepare_content(&content).await?;
            }
        }

        if self.is_push() {
            let wrapper = renderer.block_element(&self.name, self.origin.template.as_deref(), &self.options());
            wrapper.append_html(self.join_lines()?);
            self.elements.borrow_mut().clear();
            self.lines.borrow_mut().clear();
            self.trims.borrow_mut().clear();
            self.trim_blanks.borrow_mut().clear();
            self.push_element(wrapper);
        }
        Ok(())
    }

    /// Serialize the assembled lines, applying trim markers
    pub fn to_html(&self) -> Result<String> {
        if self.serializing.get() {
            return Ok(LOOP_MARKER.to_string());
        }
        if !self.is_assembled() {
            return Err(Error::NotAssembled(self.name.clone()));
        }
        self.serializing.set(true);
        let html = self.join_lines();
        self.serializing.set(false);
        html
    }

    fn join_lines(&self) -> Result<String> {
        let lines = self.lines.borrow();
        let trims = self.trims.borrow();
        let trim_blanks = self.trim_blanks.borrow();
        let has_trim = !trims.is_empty();
        let has_trim_blank = !trim_blanks.is_empty();

        let mut html = String::new();
        let mut trim_right = false;

        for (index, line) in lines.iter().enumerate() {
            let mut text = line_html(line)?;

            if has_trim {
                let (left_here, right_here) = trims.get(&index).copied().unwrap_or_default();
                if trim_right || left_here {
                    if !trim_right {
                        html.truncate(html.trim_end().len());
                    }
                    text = text.trim_start().to_string();
                    if !text.is_empty() {
                        trim_right = false;
                    }
                }
                if trim_right || right_here {
                    text = text.trim_end().to_string();
                    trim_right = true;
                }
            }

            html.push_str(&text);

            if has_trim_blank
                && trim_blanks.contains(&(index + 1))
                && is_empty_whitespace_html(&html)
            {
                html.clear();
            }
        }

        Ok(html)
    }

    /// Assembled output as text and element fragments
    pub fn to_elements(&self) -> Result<Vec<Fragment>> {
        if self.serializing.get() {
            return Ok(vec![Fragment::Text(LOOP_MARKER.to_string())]);
        }
        if !self.is_assembled() {
            return Err(Error::NotAssembled(self.name.clone()));
        }
        self.serializing.set(true);
        let fragments = self.collect_fragments();
        self.serializing.set(false);
        fragments
    }

    fn collect_fragments(&self) -> Result<Vec<Fragment>> {
        let mut fragments = Vec::new();
        for line in self.lines.borrow().iter() {
            match line {
                Line::Text(text) => push_text(&mut fragments, text),
                Line::Element(element) => {
                    element.normalize();
                    fragments.push(Fragment::Element(element.clone()));
                }
                Line::Pending(placeholder) => match placeholder.content() {
                    Some(Content::Block(block)) if block.is_assembling() => {
                        push_text(&mut fragments, LOOP_MARKER)
                    }
                    Some(content) => content.collect_fragments(&mut fragments)?,
                    None => {}
                },
            }
        }
        Ok(fragments)
    }
}

fn line_html(line: &Line) -> Result<String> {
    match line {
        Line::Text(text) => Ok(text.clone()),
        Line::Element(element) => Ok(element.outer_html()),
        Line::Pending(placeholder) => match placeholder.content() {
            Some(Content::Block(block)) if block.is_assembling() => Ok(LOOP_MARKER.to_string()),
            Some(content) => content.to_html(),
            None => Ok(String::new()),
        },
    }
}

impl fmt::Debug for BlockBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockBuffer")
            .field("name", &self.name)
            .field("block_id", &self.block_id)
            .field("origin", &self.origin)
            .field("lines", &self.lines.borrow().len())
            .field("state", &self.state.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer() -> Rc<BlockBuffer> {
        let origin = BlockOrigin {
            template: Some("test".to_string()),
            scope_id: 0,
            level: 0,
        };
        BlockBuffer::new(None, 3, origin, BlockOptions::default())
    }

    fn assembled(buffer: &BlockBuffer) {
        buffer.state.set(AssemblyState::Assembled);
    }

    #[test]
    fn test_nameless_buffer() {
        assert_eq!(buffer().name(), "nameless-3");
    }

    #[test]
    fn test_html_requires_assembly() {
        let buffer = buffer();
        buffer.push_text("a");
        assert!(matches!(buffer.to_html(), Err(Error::NotAssembled(_))));
        assert!(matches!(buffer.to_elements(), Err(Error::NotAssembled(_))));
        assembled(&buffer);
        assert_eq!(buffer.to_html().unwrap(), "a");
    }

    #[test]
    fn test_trim_both_sides() {
        let buffer = buffer();
        buffer.push_text("Nothing: ");
        buffer.trim(true, true);
        buffer.push_text("  \n after");
        assembled(&buffer);
        assert_eq!(buffer.to_html().unwrap(), "Nothing:after");
    }

    #[test]
    fn test_trim_right_until_content() {
        let buffer = buffer();
        buffer.push_text("a ");
        buffer.trim(false, true);
        buffer.push_text("   ");
        buffer.push_text("\n b");
        assembled(&buffer);
        assert_eq!(buffer.to_html().unwrap(), "a b");
    }

    #[test]
    fn test_trim_blank() {
        let buffer = buffer();
        buffer.push_text(" <p id=\"p\"> </p >");
        buffer.trim_blank();
        assembled(&buffer);
        assert_eq!(buffer.to_html().unwrap(), "");

        let buffer = self::buffer();
        buffer.push_text("TEST<p></p>");
        buffer.trim_blank();
        assembled(&buffer);
        assert_eq!(buffer.to_html().unwrap(), "TEST<p></p>");
    }

    #[test]
    fn test_elements_merge_text() {
        let buffer = buffer();
        buffer.push_text("a");
        buffer.push_text("b");
        let element = Element::new("br");
        buffer.push_element(element);
        buffer.push_text("c");
        assembled(&buffer);
        let fragments = buffer.to_elements().unwrap();
        assert_eq!(fragments.len(), 3);
        assert_eq!(fragments[0].to_html(), "ab");
        assert_eq!(fragments[1].to_html(), "<br>");
        assert_eq!(buffer.elements().len(), 1);
    }

    #[test]
    fn test_self_containing_block_prints_loop_marker() {
        let buffer = buffer();
        buffer.push_text("a");
        let placeholder = Placeholder::new(PlaceholderKind::Assign(AssignSlot {
            name: "self".to_string(),
            scope_id: 0,
            options: BlockOptions::default(),
        }));
        placeholder.resolve(Content::Block(buffer.clone()));
        buffer.push_placeholder(placeholder.clone());
        assembled(&buffer);

        let html = buffer.to_html().unwrap();
        assert_eq!(html, format!("a{}", LOOP_MARKER));
        let fragments = buffer.to_elements().unwrap();
        let parts: Vec<String> = fragments.iter().map(Fragment::to_html).collect();
        assert_eq!(parts, vec![html]);

        // break the Rc cycle
        placeholder.resolve(Content::Html(String::new()));
    }

    #[test]
    fn test_block_options_from_value() {
        let value = Value::from(serde_json::json!({"className": "wide", "content": "push"}));
        let options = BlockOptions::from_value(&value).unwrap();
        assert_eq!(options.class_name.as_deref(), Some("wide"));
        assert_eq!(options.content, ContentMode::Push);
        assert_eq!(BlockOptions::from_value(&Value::Undefined).unwrap(), BlockOptions::default());
        assert!(BlockOptions::from_value(&Value::from("x")).is_err());
    }
}
