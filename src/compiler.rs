//! Turns template source into a node tree.
//!
//! Source is split on code delimiters first, the literal text in between is
//! then split on expression delimiters. Every tag is resolved to a command,
//! an expression kind or pass-through logic.

use std::rc::Rc;

use crate::ast::{Args, Node, Template};
use crate::error::{CompileError, ErrorKind, Location};
use crate::expression::{Code, Expression, OpenExpression, Registry, TagOptions};
use crate::options::Options;
use crate::parser::dissect::strip_leading_newline;
use crate::parser::tokens::split_commas;
use crate::parser::{Dissector, Segment, SegmentKind, Syntax, TokenStream, parse_statements, tokenize};

/// Expression whose closing tag has not been reached yet
struct Frame {
    kind: Rc<dyn Expression>,
    args: Args,
    body: Vec<Node>,
    branches: Vec<(String, Vec<Node>)>,
    branch: Option<(String, Vec<Node>)>,
    location: Location,
}

impl Frame {
    fn target(&mut self) -> &mut Vec<Node> {
        match &mut self.branch {
            Some((_, nodes)) => nodes,
            None => &mut self.body,
        }
    }

    fn start_branch(&mut self, name: String) {
        self.finish_branch();
        self.branch = Some((name, Vec::new()));
    }

    fn finish_branch(&mut self) {
        let Some((name, nodes)) = self.branch.take() else {
            return;
        };
        if self.kind.inline_branches() {
            self.body.push(Node::Branch {
                name,
                body: nodes.into(),
            });
        } else {
            self.branches.push((name, nodes));
        }
    }

    fn into_open(mut self) -> OpenExpression {
        self.finish_branch();
        OpenExpression {
            kind: self.kind,
            args: self.args,
            body: self.body,
            branches: self.branches,
            location: self.location,
        }
    }
}

#[derive(Default)]
struct State {
    root: Vec<Node>,
    stack: Vec<Frame>,
}

impl State {
    fn push(&mut self, node: Node) {
        match self.stack.last_mut() {
            Some(frame) => frame.target().push(node),
            None => self.root.push(node),
        }
    }
}

pub struct Compiler<'a> {
    options: &'a Options,
    registry: &'a Registry,
    commands: Vec<String>,
}

impl<'a> Compiler<'a> {
    pub fn new(options: &'a Options, registry: &'a Registry, commands: Vec<String>) -> Self {
        Self {
            options,
            registry,
            commands,
        }
    }

    pub fn compile(&self, name: &str, source: &str) -> Result<Template, CompileError> {
        let nodes = self
            .compile_nodes(source)
            .map_err(|err| err.in_template(name))?;
        Ok(Template::new(name, Rc::from(source), nodes))
    }

    fn segments(&self, source: &str) -> Result<Vec<Segment>, CompileError> {
        let code = Dissector::new(&self.options.open, &self.options.close, Syntax::Code);
        let expressions = Dissector::new(
            &self.options.expression_open,
            &self.options.expression_close,
            Syntax::Expression,
        );

        let mut segments = Vec::new();
        for segment in code.dissect(source)? {
            if segment.is_tag() {
                segments.push(segment);
            } else {
                segments.extend(expressions.dissect_at(&segment.content, segment.location)?);
            }
        }
        Ok(segments)
    }

    fn compile_nodes(&self, source: &str) -> Result<Vec<Node>, CompileError> {
        let mut state = State::default();
        let mut strip_newline = false;

        for segment in self.segments(source)? {
            match segment.kind {
                SegmentKind::Literal => {
                    let text = if strip_newline {
                        strip_leading_newline(&segment.content)
                    } else {
                        &segment.content
                    };
                    strip_newline = false;
                    if !text.is_empty() {
                        state.push(Node::Text(text.to_string()));
                    }
                }
                SegmentKind::Tag(syntax) => {
                    let structural = self.compile_tag(&mut state, &segment, syntax)?;
                    strip_newline = segment.trim_newline
                        || (structural && syntax == Syntax::Expression);
                }
            }
        }

        if let Some(frame) = state.stack.last() {
            let name = frame.kind.name();
            return Err(CompileError::new(
                ErrorKind::UnclosedExpression,
                format!("`{}` is never closed", name),
                frame.location,
            )
            .with_related(frame.location)
            .with_related_label(format!("`{}` opened here", name))
            .with_help(format!(
                "add `{} /{} {}`",
                self.options.expression_open, name, self.options.expression_close
            )));
        }

        Ok(state.root)
    }

    /// Compile one tag; returns whether it opened, branched or closed an expression
    fn compile_tag(
        &self,
        state: &mut State,
        segment: &Segment,
        syntax: Syntax,
    ) -> Result<bool, CompileError> {
        let content = segment.content.trim();
        if content.is_empty() {
            return Ok(false);
        }
        let location = segment.location;

        if let Some(closing) = content.strip_prefix('/') {
            self.close(state, closing.trim(), location)?;
            return Ok(true);
        }

        let (keyword, rest) = split_keyword(content);
        let is_command = !keyword.is_empty() && self.commands.iter().any(|name| name == keyword);
        // `<% print(a, b) %>` calls the renderer member rather than the kind
        let is_call = syntax == Syntax::Code && rest.starts_with('(');
        let kind = match keyword {
            "" => None,
            _ if is_call => None,
            keyword => self.registry.find(keyword),
        };

        match (syntax, is_command, kind) {
            (Syntax::Code, true, _) | (Syntax::Expression, true, None) => {
                let tokens = tokenize(rest).map_err(|message| token_error(message, location))?;
                state.push(Node::Line(location.line));
                state.push(Node::Command {
                    name: keyword.to_string(),
                    args: split_commas(&tokens),
                });
                Ok(false)
            }
            (_, _, Some(kind)) => self.compile_expression(state, kind, keyword, rest, location, syntax),
            _ => {
                let statements = parse_statements(content).map_err(|message| {
                    CompileError::new(ErrorKind::InvalidSyntax, message, location)
                })?;
                state.push(Node::Line(location.line));
                state.push(Node::Logic(statements));
                Ok(false)
            }
        }
    }

    fn compile_expression(
        &self,
        state: &mut State,
        kind: Rc<dyn Expression>,
        keyword: &str,
        rest: &str,
        location: Location,
        syntax: Syntax,
    ) -> Result<bool, CompileError> {
        let tokens = TokenStream::parse(rest).map_err(|message| token_error(message, location))?;
        let mut options = TagOptions {
            keyword,
            rest,
            tokens,
            location,
            syntax,
            parent: state.stack.last().map(|frame| frame.kind.name()),
        };

        match kind.to_code(&mut options)? {
            Code::Node(node) => {
                state.push(Node::Line(location.line));
                state.push(node);
                Ok(false)
            }
            Code::Open(args) => {
                state.push(Node::Line(location.line));
                state.stack.push(Frame {
                    kind,
                    args,
                    body: Vec::new(),
                    branches: Vec::new(),
                    branch: None,
                    location,
                });
                Ok(true)
            }
            Code::Branch(name) => {
                let Some(frame) = state.stack.last_mut() else {
                    return Err(CompileError::new(
                        ErrorKind::OrphanSubkeyword,
                        format!("`{}` is not inside an expression", name),
                        location,
                    ));
                };
                if !frame.kind.accepts_branch(&name) {
                    let parent = frame.kind.name();
                    return Err(CompileError::new(
                        ErrorKind::OrphanSubkeyword,
                        format!("`{}` cannot be used inside `{}`", name, parent),
                        location,
                    )
                    .with_related(frame.location)
                    .with_related_label(format!("`{}` opened here", parent)));
                }
                frame.start_branch(name);
                frame.target().push(Node::Line(location.line));
                Ok(true)
            }
        }
    }

    fn close(&self, state: &mut State, name: &str, location: Location) -> Result<(), CompileError> {
        let Some(frame) = state.stack.pop() else {
            return Err(CompileError::new(
                ErrorKind::UnexpectedCloseTag,
                format!("`/{}` has no matching opening tag", name),
                location,
            ));
        };

        let open = frame.kind.name();
        if open != name {
            return Err(CompileError::new(
                ErrorKind::MismatchedCloseTag,
                format!("`/{}` does not close `{}`", name, open),
                location,
            )
            .with_related(frame.location)
            .with_related_label(format!("`{}` opened here", open))
            .with_help(format!("close `{}` first", open)));
        }

        let kind = frame.kind.clone();
        let node = kind.to_close_code(frame.into_open())?;
        state.push(node);
        Ok(())
    }
}

/// Split tag content into its keyword and the rest; `=` is a keyword of its own
fn split_keyword(content: &str) -> (&str, &str) {
    if let Some(rest) = content.strip_prefix('=') {
        return ("=", rest);
    }
    let end = content
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(content.len());
    let (keyword, rest) = content.split_at(end);
    match rest.chars().next() {
        None => (keyword, rest),
        Some(c) if c.is_whitespace() || c == '(' => (keyword, rest),
        Some(_) => ("", content),
    }
}

fn token_error(message: String, location: Location) -> CompileError {
    CompileError::new(ErrorKind::UnexpectedToken, message, location)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(source: &str) -> Result<Template, CompileError> {
        let options = Options::default();
        let registry = Registry::standard();
        Compiler::new(&options, &registry, vec!["=".to_string()]).compile("test", source)
    }

    #[test]
    fn test_split_keyword() {
        assert_eq!(split_keyword("= name"), ("=", " name"));
        assert_eq!(split_keyword("if x"), ("if", " x"));
        assert_eq!(split_keyword("include('a')"), ("include", "('a')"));
        assert_eq!(split_keyword("item.name = 1"), ("", "item.name = 1"));
        assert_eq!(split_keyword("else"), ("else", ""));
    }

    #[test]
    fn test_if_else_structure() {
        let template = compile("{% if a %}yes{% else %}no{% /if %}").unwrap();
        let expression = template
            .nodes
            .iter()
            .find_map(|node| match node {
                Node::Expression(expression) => Some(expression.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(expression.kind.name(), "if");
        assert!(matches!(expression.body.last(), Some(Node::Text(text)) if text == "yes"));
        assert!(expression.branch("else").is_some());
    }

    #[test]
    fn test_with_branches_stay_inline() {
        let template = compile("{% with list as item %}{% all %}x{% none %}y{% /with %}").unwrap();
        let Some(Node::Expression(expression)) = template.nodes.last() else {
            panic!("expected an expression node");
        };
        let inline: Vec<&str> = expression
            .body
            .iter()
            .filter_map(|node| match node {
                Node::Branch { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(inline, vec!["all", "none"]);
        assert!(expression.branches.is_empty());
    }

    #[test]
    fn test_structural_tags_eat_newline() {
        let template = compile("{% if a %}\nyes\n{% /if %}\nafter").unwrap();
        let texts: Vec<String> = template
            .nodes
            .iter()
            .filter_map(|node| match node {
                Node::Text(text) => Some(text.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["after".to_string()]);
    }

    #[test]
    fn test_logic_fallthrough() {
        let template = compile("<% total = 1 %>").unwrap();
        assert!(template.nodes.iter().any(|node| matches!(node, Node::Logic(_))));
    }

    #[test]
    fn test_member_call_is_logic() {
        for source in ["<% print('a', 'b') %>", "<% trim(false, true) %>"] {
            let template = compile(source).unwrap();
            assert!(
                template.nodes.iter().any(|node| matches!(node, Node::Logic(_))),
                "{source}"
            );
        }
        let template = compile("{% trim left %}").unwrap();
        assert!(template.nodes.iter().any(|node| matches!(node, Node::Trim(_))));
    }

    #[test]
    fn test_unclosed_expression() {
        let err = compile("a\n{% if x %}\nb").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnclosedExpression);
        assert_eq!(err.template, "test");
        assert_eq!(err.location.line, 2);
    }

    #[test]
    fn test_mismatched_close() {
        let err = compile("{% if x %}\n{% /each %}").unwrap_err();
        assert_eq!(err.kind, ErrorKind::MismatchedCloseTag);
        assert_eq!(err.location.line, 2);
        assert_eq!(err.related.map(|related| related.line), Some(1));
    }

    #[test]
    fn test_unexpected_close() {
        let err = compile("{% /if %}").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnexpectedCloseTag);
    }

    #[test]
    fn test_orphan_subkeyword() {
        assert_eq!(compile("{% else %}").unwrap_err().kind, ErrorKind::OrphanSubkeyword);
        let err = compile("{% block 'a' %}{% none %}{% /block %}").unwrap_err();
        assert_eq!(err.kind, ErrorKind::OrphanSubkeyword);
    }

    #[test]
    fn test_command_node() {
        let template = compile("<%= a, 'b' %>").unwrap();
        assert!(template.nodes.iter().any(|node| matches!(
            node,
            Node::Command { name, args } if name == "=" && args.len() == 2
        )));
    }
}
