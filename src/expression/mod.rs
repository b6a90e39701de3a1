//! Expression kinds recognised inside tags.
//!
//! Each kind parses its tag at compile time into IR and executes that IR at
//! render time. Kinds are looked up by keyword in a [`Registry`]; tags that
//! match no kind and no command become pass-through logic.

pub mod eval;
pub mod kinds;

use std::rc::Rc;

use crate::ast::{Args, ExpressionNode, Node};
use crate::error::{CompileError, Location, Result};
use crate::interpreter::Invocation;
use crate::parser::{Syntax, TokenStream};
use crate::scope::{EachContext, Scope};

pub use eval::{Evaluator, is_empty_whitespace_html, loose_eq};

/// Parsed tag handed to [`Expression::to_code`]
pub struct TagOptions<'a> {
    pub keyword: &'a str,
    /// Tag content after the keyword
    pub rest: &'a str,
    pub tokens: TokenStream,
    pub location: Location,
    pub syntax: Syntax,
    /// Name of the innermost expression still open at this tag
    pub parent: Option<&'static str>,
}

/// Compile-time output of an opening tag
#[derive(Debug)]
pub enum Code {
    /// Opens a body that ends at `/name`
    Open(Args),
    /// Starts a branch of the enclosing expression
    Branch(String),
    /// Standalone node
    Node(Node),
}

/// Expression whose body is still being collected by the compiler
pub struct OpenExpression {
    pub kind: Rc<dyn Expression>,
    pub args: Args,
    pub body: Vec<Node>,
    pub branches: Vec<(String, Vec<Node>)>,
    pub location: Location,
}

impl OpenExpression {
    pub fn into_node(self) -> ExpressionNode {
        ExpressionNode {
            kind: self.kind,
            args: self.args,
            body: self.body.into(),
            branches: self
                .branches
                .into_iter()
                .map(|(name, body)| (name, body.into()))
                .collect(),
            line: self.location.line,
        }
    }
}

pub trait Expression {
    fn name(&self) -> &'static str;

    fn matches(&self, keyword: &str) -> bool {
        keyword == self.name()
    }

    fn to_code(&self, options: &mut TagOptions) -> Result<Code, CompileError>;

    /// Node emitted when the closing tag is reached
    fn to_close_code(&self, open: OpenExpression) -> Result<Node, CompileError> {
        Ok(Node::Expression(Rc::new(open.into_node())))
    }

    fn accepts_branch(&self, _name: &str) -> bool {
        false
    }

    /// Branches stay in the body and are evaluated where they appear
    fn inline_branches(&self) -> bool {
        false
    }

    fn execute(&self, invocation: &mut Invocation) -> Result<()> {
        let scope = invocation.scope().clone();
        invocation.run_body(&scope)
    }

    /// Scope to run an inline branch with, or `None` to skip it
    fn on_branch(
        &self,
        _name: &str,
        _context: Option<&Rc<EachContext>>,
        _scope: &Scope,
    ) -> Option<Scope> {
        None
    }
}

/// Registered expression kinds
#[derive(Clone, Default)]
pub struct Registry {
    kinds: Vec<Rc<dyn Expression>>,
}

impl Registry {
    /// Registry with every built-in kind
    pub fn standard() -> Self {
        let mut registry = Self::default();
        registry.register(Rc::new(kinds::If));
        registry.register(Rc::new(kinds::Each));
        registry.register(Rc::new(kinds::With::with()));
        registry.register(Rc::new(kinds::With::while_()));
        registry.register(Rc::new(kinds::Print));
        registry.register(Rc::new(kinds::Macro));
        registry.register(Rc::new(kinds::Break));
        registry.register(Rc::new(kinds::Trim));
        registry.register(Rc::new(kinds::Block));
        registry.register(Rc::new(kinds::Subkeyword));
        registry
    }

    /// Later registrations take precedence over earlier ones
    pub fn register(&mut self, kind: Rc<dyn Expression>) {
        self.kinds.insert(0, kind);
    }

    pub fn find(&self, keyword: &str) -> Option<Rc<dyn Expression>> {
        self.kinds.iter().find(|kind| kind.matches(keyword)).cloned()
    }

    pub fn get(&self, name: &str) -> Option<Rc<dyn Expression>> {
        self.kinds.iter().find(|kind| kind.name() == name).cloned()
    }
}
