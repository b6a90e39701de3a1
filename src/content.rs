use std::rc::Rc;

use futures_util::future::LocalBoxFuture;

use crate::block_buffer::BlockBuffer;
use crate::dom::Element;
use crate::error::Result;
use crate::renderer::Renderer;

/// Marker printed in place of content that would contain itself
pub const LOOP_MARKER: &str = "<!-- Infinite loop detected -->";

/// Content that can only be produced during block assembly.
///
/// Printing a renderable value inserts a placeholder into the current block.
/// When that block is assembled, `render_content` is awaited once per render
/// pass for each distinct instance and the result takes the placeholder's place.
pub trait Renderable {
    fn render_content<'a>(&'a self, renderer: &'a Renderer) -> LocalBoxFuture<'a, Result<Content>>;
}

/// Resolved content of a placeholder
#[derive(Debug, Clone)]
pub enum Content {
    /// Markup inserted verbatim
    Html(String),
    Element(Element),
    List(Vec<Content>),
    Block(Rc<BlockBuffer>),
}

impl Content {
    pub fn text(text: &str) -> Self {
        Content::Html(crate::dom::escape_text(text))
    }

    pub fn to_html(&self) -> Result<String> {
        match self {
            Content::Html(html) => Ok(html.clone()),
            Content::Element(element) => Ok(element.outer_html()),
            Content::List(items) => {
                let mut html = String::new();
                for item in items {
                    html.push_str(&item.to_html()?);
                }
                Ok(html)
            }
            Content::Block(block) => block.to_html(),
        }
    }

    pub(crate) fn collect_fragments(&self, fragments: &mut Vec<Fragment>) -> Result<()> {
        match self {
            Content::Html(html) => push_text(fragments, html),
            Content::Element(element) => {
                element.normalize();
                fragments.push(Fragment::Element(element.clone()));
            }
            Content::List(items) => {
                for item in items {
                    item.collect_fragments(fragments)?;
                }
            }
            Content::Block(block) => fragments.extend(block.to_elements()?),
        }
        Ok(())
    }
}

/// Piece of assembled output in element form
#[derive(Debug, Clone)]
pub enum Fragment {
    Text(String),
    Element(Element),
}

impl Fragment {
    pub fn to_html(&self) -> String {
        match self {
            Fragment::Text(text) => text.clone(),
            Fragment::Element(element) => element.outer_html(),
        }
    }
}

pub(crate) fn push_text(fragments: &mut Vec<Fragment>, text: &str) {
    if text.is_empty() {
        return;
    }
    match fragments.last_mut() {
        Some(Fragment::Text(previous)) => previous.push_str(text),
        _ => fragments.push(Fragment::Text(text.to_string())),
    }
}
