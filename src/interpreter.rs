//! Walks compiled node trees against a renderer.

use std::rc::Rc;

use crate::ast::{Args, ExpressionNode, Node, Template, TrimKind};
use crate::error::{Error, Result};
use crate::expression::{Evaluator, Expression};
use crate::parser::{Argument, Statement, Token};
use crate::renderer::Renderer;
use crate::scope::{EachContext, MacroDef, Scope};
use crate::value::Value;

/// How a node list finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// A `break` that has not reached its target yet
    Break(Option<String>),
}

/// Running expression on the renderer's instance stack
pub(crate) struct Instance {
    pub kind: Rc<dyn Expression>,
    pub broken: bool,
    pub context: Option<Rc<EachContext>>,
}

/// Executes the nodes of one template
pub struct Interpreter<'r> {
    renderer: &'r Renderer,
    template: Rc<Template>,
}

impl<'r> Interpreter<'r> {
    pub fn new(renderer: &'r Renderer, template: Rc<Template>) -> Self {
        Self { renderer, template }
    }

    pub fn template(&self) -> &Rc<Template> {
        &self.template
    }

    pub fn run(&self, nodes: &[Node], scope: &Scope) -> Result<Flow> {
        for node in nodes {
            let flow = self.run_node(node, scope)?;
            if flow != Flow::Continue {
                return Ok(flow);
            }
        }
        Ok(Flow::Continue)
    }

    fn run_node(&self, node: &Node, scope: &Scope) -> Result<Flow> {
        match node {
            Node::Text(text) => self.renderer.print_html(text)?,
            Node::Line(line) => self.renderer.set_error_context(&self.template.name, *line),
            Node::Logic(statements) => {
                for statement in statements {
                    self.run_statement(statement, scope)?;
                }
            }
            Node::Command { name, args } => self.run_command(name, args, scope)?,
            Node::Print(tokens) => {
                let value = Evaluator::new(self.renderer, scope).evaluate(tokens)?;
                self.renderer.print(value)?;
            }
            Node::CallMacro { name, args } => self.call_macro(name, args, scope)?,
            Node::Macro { name, params, body } => scope.define_macro(MacroDef {
                name: name.clone(),
                params: params.clone(),
                body: body.clone(),
                template: self.template.clone(),
            }),
            Node::Trim(kind) => {
                let block = self.renderer.current_block()?;
                match kind {
                    TrimKind::Edges { left, right } => block.trim(*left, *right),
                    TrimKind::Blank => block.trim_blank(),
                }
            }
            Node::Break(target) => return Ok(Flow::Break(target.clone())),
            Node::Expression(expression) => return self.run_expression(expression, scope),
            Node::Branch { name, body } => return self.run_inline_branch(name, body, scope),
        }
        Ok(Flow::Continue)
    }

    fn run_statement(&self, statement: &Statement, scope: &Scope) -> Result<()> {
        let evaluator = Evaluator::new(self.renderer, scope);
        match statement {
            Statement::Assign { name, value } => {
                let value = evaluator.evaluate(value)?;
                scope.set(name, value);
            }
            Statement::Eval(tokens) => {
                evaluator.evaluate(tokens)?;
            }
        }
        Ok(())
    }

    fn run_command(&self, name: &str, args: &[Vec<Token>], scope: &Scope) -> Result<()> {
        let evaluator = Evaluator::new(self.renderer, scope);
        let values = args
            .iter()
            .map(|tokens| evaluator.evaluate(tokens))
            .collect::<Result<Vec<_>>>()?;
        let command = self
            .renderer
            .engine()
            .command(name)
            .ok_or_else(|| Error::runtime(format!("Unknown command `{}`", name)))?;
        command(self.renderer, values)
    }

    /// Run a macro body in a child of the caller's scope
    fn call_macro(&self, name: &str, args: &[Argument], scope: &Scope) -> Result<()> {
        let definition = scope
            .find_macro(name)
            .ok_or_else(|| Error::runtime(format!("Macro `{}` is not defined", name)))?;

        let evaluator = Evaluator::new(self.renderer, scope);
        let locals = scope.child();
        let mut position = 0;
        for argument in args {
            let value = evaluator.evaluate(&argument.value)?;
            match &argument.name {
                Some(name) => locals.set(name, value),
                None => {
                    if let Some(param) = definition.params.get(position) {
                        locals.set(&param.name, value);
                    }
                    position += 1;
                }
            }
        }

        for param in &definition.params {
            if !locals.get_own(&param.name).is_none_or(|value| value.is_nullish()) {
                continue;
            }
            let value = match &param.default {
                Some(default) => Evaluator::new(self.renderer, &locals).evaluate(default)?,
                None => Value::Undefined,
            };
            locals.set(&param.name, value);
        }

        tracing::trace!(name, template = %definition.template.name, "calling macro");
        let interpreter = Interpreter::new(self.renderer, definition.template.clone());
        interpreter.run(&definition.body, &locals)?;
        Ok(())
    }

    fn run_expression(&self, node: &ExpressionNode, scope: &Scope) -> Result<Flow> {
        let index = self.renderer.push_instance(node.kind.clone());
        let mut invocation = Invocation {
            interpreter: self,
            node,
            scope: scope.clone(),
            index,
            escaped: None,
        };
        let result = node.kind.execute(&mut invocation);
        self.renderer.pop_instance();
        result?;
        Ok(invocation.escaped.unwrap_or(Flow::Continue))
    }

    fn run_inline_branch(&self, name: &str, body: &[Node], scope: &Scope) -> Result<Flow> {
        let Some((kind, context)) = self.renderer.top_instance() else {
            return Ok(Flow::Continue);
        };
        match kind.on_branch(name, context.as_ref(), scope) {
            Some(branch_scope) => self.run(body, &branch_scope),
            None => Ok(Flow::Continue),
        }
    }
}

/// Handle an expression kind gets while it executes
pub struct Invocation<'a> {
    interpreter: &'a Interpreter<'a>,
    node: &'a ExpressionNode,
    scope: Scope,
    index: usize,
    escaped: Option<Flow>,
}

impl<'a> Invocation<'a> {
    pub fn kind_name(&self) -> &'static str {
        self.node.kind.name()
    }

    pub fn args(&self) -> &'a Args {
        &self.node.args
    }

    /// Scope the expression was reached in
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn renderer(&self) -> &'a Renderer {
        self.interpreter.renderer
    }

    pub fn evaluate(&self, tokens: &[Token], scope: &Scope) -> Result<Value> {
        Evaluator::new(self.renderer(), scope).evaluate(tokens)
    }

    pub fn lookup(&self, path: &[String]) -> Value {
        Evaluator::new(self.renderer(), &self.scope).lookup(path)
    }

    pub fn is_broken(&self) -> bool {
        self.renderer().instance_broken(self.index)
    }

    /// Collection that a bare `each` or an inline branch inside this expression uses
    pub fn set_context(&self, context: Rc<EachContext>) {
        self.renderer().set_instance_context(self.index, context);
    }

    /// Collection of the expression directly enclosing this one
    pub fn parent_context(&self) -> Option<Rc<EachContext>> {
        let parent = self.index.checked_sub(1)?;
        self.renderer().instance_context(parent)
    }

    /// Run the body once; does nothing after a `break`
    pub fn run_body(&mut self, scope: &Scope) -> Result<()> {
        if self.is_broken() {
            return Ok(());
        }
        let flow = self.interpreter.run(&self.node.body, scope)?;
        self.absorb(flow);
        Ok(())
    }

    /// Run a detached branch, returning whether it exists
    pub fn run_branch(&mut self, name: &str, scope: &Scope) -> Result<bool> {
        let Some(body) = self.node.branch(name) else {
            return Ok(false);
        };
        if !self.is_broken() {
            let flow = self.interpreter.run(body, scope)?;
            self.absorb(flow);
        }
        Ok(true)
    }

    fn absorb(&mut self, flow: Flow) {
        let Flow::Break(target) = flow else {
            return;
        };
        self.renderer().break_instance(self.index);
        if let Some(target) = target {
            if target != self.kind_name() {
                self.escaped = Some(Flow::Break(Some(target)));
            }
        }
    }
}
