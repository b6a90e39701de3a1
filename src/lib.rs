//! Tag-based template compiler and renderer.
//!
//! Templates mix literal text with code tags (`<% %>`) and expression tags
//! (`{% %}`). They are compiled into a node tree once and rendered into named
//! blocks that are assembled into HTML, resolving included templates and
//! asynchronous content on the way.
//!
//! ```no_run
//! use hawk_templates::{Engine, MemorySource, Options};
//!
//! # async fn run() -> hawk_templates::Result<()> {
//! let source = MemorySource::new().with("hello", "Hello {%= name %}!");
//! let engine = Engine::with_source(Options::default(), source);
//! let html = engine
//!     .render("hello", serde_json::json!({"name": "world"}))
//!     .finish()
//!     .await?;
//! assert_eq!(html, "Hello world!");
//! # Ok(())
//! # }
//! ```

pub mod ast;
pub mod block_buffer;
pub mod builtins;
pub mod compiler;
pub mod content;
pub mod dom;
pub mod engine;
pub mod error;
pub mod expression;
pub mod interpreter;
pub mod options;
pub mod parser;
pub mod renderer;
pub mod scope;
pub mod source;
pub mod value;

pub use ast::Template;
pub use block_buffer::{BlockBuffer, BlockOptions, ContentMode};
pub use compiler::Compiler;
pub use content::{Content, Fragment, LOOP_MARKER, Renderable};
pub use dom::{Document, Element, ServerDocument};
pub use engine::Engine;
pub use error::{CompileError, Error, ErrorKind, Location, Result, RuntimeError};
pub use expression::{Expression, Registry};
pub use options::Options;
pub use renderer::{RenderHistory, RenderState, Renderer};
pub use scope::Scope;
pub use source::{DirectorySource, MemorySource, SourceProvider};
pub use value::{Object, Value};
