use std::fmt;
use std::rc::Rc;

use crate::expression::Expression;
use crate::parser::{Statement, Token};

/// Shared node list, the body of a template, expression or branch
pub type Body = Rc<[Node]>;

/// Compiled template
#[derive(Debug)]
pub struct Template {
    pub name: String,
    pub source: Rc<str>,
    pub nodes: Body,
}

impl Template {
    pub fn new(name: impl Into<String>, source: Rc<str>, nodes: Vec<Node>) -> Self {
        Self {
            name: name.into(),
            source,
            nodes: nodes.into(),
        }
    }

    /// Source text of a 1-based line
    pub fn line(&self, number: usize) -> Option<&str> {
        number
            .checked_sub(1)
            .and_then(|index| self.source.lines().nth(index))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimKind {
    Edges { left: bool, right: bool },
    Blank,
}

/// Macro parameter with an optional default expression
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<Vec<Token>>,
}

/// Arguments parsed by an expression kind at compile time
#[derive(Debug, Clone, PartialEq)]
pub enum Args {
    None,
    /// Single operator expression (`if`)
    Condition(Vec<Token>),
    /// `each path as alias`, or nothing when iterating an inherited collection
    Each(Option<EachArgs>),
    /// `with`/`while`
    With(WithArgs),
    /// Comma-separated expressions (`block name, options`)
    List(Vec<Vec<Token>>),
    Macro { name: String, params: Vec<Param> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EachArgs {
    pub variable: Vec<String>,
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WithArgs {
    /// Candidate paths, the first non-empty collection wins
    pub variables: Vec<Vec<String>>,
    pub alias: String,
    /// Sub-path entries must have to be kept
    pub filter: Option<Vec<String>>,
}

/// Compiled node
#[derive(Debug, Clone)]
pub enum Node {
    /// Literal template text
    Text(String),
    /// Line of the tag that follows, for error reports
    Line(usize),
    /// Pass-through statements
    Logic(Vec<Statement>),
    /// Registered command with comma-separated argument expressions
    Command { name: String, args: Vec<Vec<Token>> },
    Print(Vec<Token>),
    CallMacro { name: String, args: Vec<crate::parser::Argument> },
    Macro { name: String, params: Vec<Param>, body: Body },
    Trim(TrimKind),
    Break(Option<String>),
    Expression(Rc<ExpressionNode>),
    /// Branch evaluated in place inside a `with`/`while` body
    Branch { name: String, body: Body },
}

/// Occurrence of a body-carrying expression tag
pub struct ExpressionNode {
    pub kind: Rc<dyn Expression>,
    pub args: Args,
    pub body: Body,
    /// Branches registered before execution (`else` of `if`/`each`)
    pub branches: Vec<(String, Body)>,
    pub line: usize,
}

impl ExpressionNode {
    pub fn branch(&self, name: &str) -> Option<&Body> {
        self.branches
            .iter()
            .find(|(branch, _)| branch == name)
            .map(|(_, body)| body)
    }
}

impl fmt::Debug for ExpressionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpressionNode")
            .field("kind", &self.kind.name())
            .field("args", &self.args)
            .field("body", &self.body)
            .field("branches", &self.branches)
            .field("line", &self.line)
            .finish()
    }
}
