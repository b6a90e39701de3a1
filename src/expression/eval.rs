//! Linear evaluation of operator expressions.
//!
//! Expressions have no precedence: operands and operators are consumed left
//! to right, `and`/`or` short-circuit on the running result and `not` inverts
//! whatever token follows it.

use crate::error::{Error, Result};
use crate::parser::tokens::{Literal, Token, split_commas};
use crate::renderer::Renderer;
use crate::scope::Scope;
use crate::value::{Object, Value};

/// Elements that count as visible content even without text
const EMBEDDED_CONTENT: &[&str] = &[
    "img", "video", "audio", "iframe", "embed", "object", "canvas", "svg", "picture", "input",
    "select", "textarea", "hr",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Eq,
    Neq,
    Gt,
    Ge,
    Lt,
    Le,
    Plus,
    Minus,
    Multiply,
    Divide,
    StartsWith,
    Empty,
    EmptyHtml,
}

impl Operator {
    fn parse(keyword: &str) -> Option<Self> {
        Some(match keyword {
            "eq" => Operator::Eq,
            "neq" => Operator::Neq,
            "gt" => Operator::Gt,
            "ge" => Operator::Ge,
            "lt" => Operator::Lt,
            "le" => Operator::Le,
            "plus" => Operator::Plus,
            "minus" => Operator::Minus,
            "multiply" => Operator::Multiply,
            "divide" => Operator::Divide,
            "starts with" => Operator::StartsWith,
            "empty" => Operator::Empty,
            "emptyhtml" => Operator::EmptyHtml,
            _ => return None,
        })
    }

    fn is_unary(self) -> bool {
        matches!(self, Operator::Empty | Operator::EmptyHtml)
    }

    fn apply_unary(self, a: &Value) -> Value {
        match self {
            Operator::Empty => Value::Bool(a.is_empty()),
            Operator::EmptyHtml => Value::Bool(match a {
                Value::String(html) => is_empty_whitespace_html(html),
                Value::Element(element) => is_empty_whitespace_html(&element.outer_html()),
                other => other.is_empty(),
            }),
            _ => a.clone(),
        }
    }

    fn apply(self, a: &Value, b: &Value) -> Value {
        match self {
            Operator::Eq => Value::Bool(loose_eq(a, b)),
            Operator::Neq => Value::Bool(!loose_eq(a, b)),
            Operator::Gt => Value::Bool(compare(a, b).is_some_and(|o| o.is_gt())),
            Operator::Ge => Value::Bool(compare(a, b).is_some_and(|o| o.is_ge())),
            Operator::Lt => Value::Bool(compare(a, b).is_some_and(|o| o.is_lt())),
            Operator::Le => Value::Bool(compare(a, b).is_some_and(|o| o.is_le())),
            Operator::Plus => match (a, b) {
                (Value::String(_), _) | (_, Value::String(_)) => {
                    Value::string(format!("{}{}", a, b))
                }
                _ => Value::Number(a.to_number() + b.to_number()),
            },
            Operator::Minus => Value::Number(a.to_number() - b.to_number()),
            Operator::Multiply => Value::Number(a.to_number() * b.to_number()),
            Operator::Divide => Value::Number(a.to_number() / b.to_number()),
            Operator::StartsWith => Value::Bool(match (a, b) {
                (Value::String(a), b) => a.starts_with(&b.to_string()),
                _ => false,
            }),
            Operator::Empty | Operator::EmptyHtml => self.apply_unary(a),
        }
    }
}

/// Loose equality: numbers equal numeric strings, `null` equals `undefined`
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (a, b) if a.is_nullish() || b.is_nullish() => a.is_nullish() && b.is_nullish(),
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Array(a), Value::Array(b)) => std::rc::Rc::ptr_eq(a, b),
        (Value::Object(a), Value::Object(b)) => std::rc::Rc::ptr_eq(a, b),
        (Value::Element(a), Value::Element(b)) => a.ptr_eq(b),
        (Value::Array(_) | Value::Object(_), Value::String(_))
        | (Value::String(_), Value::Array(_) | Value::Object(_)) => a.to_string() == b.to_string(),
        (Value::Function(_) | Value::Content(_), _) | (_, Value::Function(_) | Value::Content(_)) => {
            false
        }
        _ => a.to_number() == b.to_number(),
    }
}

fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => a.to_number().partial_cmp(&b.to_number()),
    }
}

/// True when `html` has no visible text and no embedded-content element
pub fn is_empty_whitespace_html(html: &str) -> bool {
    let lower = html.to_ascii_lowercase();
    for tag in EMBEDDED_CONTENT {
        let open = format!("<{}", tag);
        let mut search = lower.as_str();
        while let Some(at) = search.find(&open) {
            let after = &search[at + open.len()..];
            if after
                .chars()
                .next()
                .is_none_or(|c| c.is_whitespace() || c == '>' || c == '/')
            {
                return false;
            }
            search = after;
        }
    }
    crate::dom::strip_tags(html)
        .replace("&nbsp;", " ")
        .replace('\u{a0}', " ")
        .trim()
        .is_empty()
}

/// Evaluates token expressions against a scope and the renderer's lookup chain
pub struct Evaluator<'a> {
    renderer: &'a Renderer,
    scope: &'a Scope,
}

impl<'a> Evaluator<'a> {
    pub fn new(renderer: &'a Renderer, scope: &'a Scope) -> Self {
        Self { renderer, scope }
    }

    pub fn evaluate(&self, tokens: &[Token]) -> Result<Value> {
        let mut result = Value::Undefined;
        let mut operand = Value::Undefined;
        let mut have_operand = false;
        let mut operator: Option<(Operator, bool)> = None;
        let mut invert_next: Option<bool> = None;

        for token in tokens {
            let invert = std::mem::take(&mut invert_next);

            if let Token::Keyword(keyword) = token {
                match keyword.as_str() {
                    "not" => {
                        invert_next = Some(!invert.unwrap_or(false));
                        continue;
                    }
                    "or" => {
                        if result.is_truthy() {
                            return Ok(result);
                        }
                        have_operand = false;
                        continue;
                    }
                    "and" => {
                        if !result.is_truthy() {
                            return Ok(result);
                        }
                        have_operand = false;
                        continue;
                    }
                    _ => {}
                }
            }

            if !have_operand {
                have_operand = true;
                operator = None;
                operand = invert_value(self.token_value(token)?, invert);
                result = operand.clone();
                continue;
            }

            match operator {
                None => {
                    let op = match token {
                        Token::Keyword(keyword) => Operator::parse(keyword).ok_or_else(|| {
                            Error::runtime(format!("Unknown operator `{}`", keyword))
                        })?,
                        other => {
                            return Err(Error::runtime(format!("Unexpected token: {}", other)));
                        }
                    };
                    if op.is_unary() {
                        result = invert_value(op.apply_unary(&operand), invert);
                        operand = result.clone();
                    } else {
                        operator = Some((op, invert == Some(true)));
                    }
                }
                Some((op, inverted)) => {
                    let right = invert_value(self.token_value(token)?, invert);
                    result = op.apply(&operand, &right);
                    if inverted {
                        result = Value::Bool(!result.is_truthy());
                    }
                    operand = result.clone();
                    operator = None;
                }
            }
        }

        Ok(result)
    }

    /// Evaluate comma-separated expressions
    pub fn evaluate_list(&self, tokens: &[Token]) -> Result<Vec<Value>> {
        split_commas(tokens)
            .iter()
            .map(|group| self.evaluate(group))
            .collect()
    }

    fn token_value(&self, token: &Token) -> Result<Value> {
        match token {
            Token::Literal(literal) => Ok(match literal {
                Literal::Undefined => Value::Undefined,
                Literal::Null => Value::Null,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Number(n) => Value::Number(*n),
                Literal::String(s) => Value::string(s),
            }),
            Token::Variable(path) => Ok(self.lookup(path)),
            Token::Call { path, args } => {
                let args = self.evaluate_list(args)?;
                self.call(path, args)
            }
            Token::Group(tokens) => self.evaluate(tokens),
            Token::Array(items) => Ok(Value::array(
                items
                    .iter()
                    .map(|item| self.evaluate(item))
                    .collect::<Result<Vec<_>>>()?,
            )),
            Token::Object(entries) => {
                let mut object = Object::with_capacity(entries.len());
                for (key, tokens) in entries {
                    object.insert(key.clone(), self.evaluate(tokens)?);
                }
                Ok(Value::object(object))
            }
            other => Err(Error::runtime(format!("Unexpected token: {}", other))),
        }
    }

    /// Resolve a variable path: scope frames first, then helpers and globals
    pub fn lookup<S: AsRef<str>>(&self, path: &[S]) -> Value {
        let Some((first, rest)) = path.split_first() else {
            return Value::Undefined;
        };
        let root = self
            .scope
            .get(first.as_ref())
            .or_else(|| self.renderer.engine().helper(first.as_ref()))
            .or_else(|| self.renderer.engine().global(first.as_ref()))
            .unwrap_or_default();
        root.get_path(rest)
    }

    /// Call the function at `path`, falling back to renderer members
    pub fn call(&self, path: &[String], args: Vec<Value>) -> Result<Value> {
        let name = path.join(".");

        let member = match path {
            [this, member] if this == "this" => Some(member.as_str()),
            [member] if self.scope.get(member).is_none()
                && self.renderer.engine().helper(member).is_none() =>
            {
                Some(member.as_str())
            }
            _ => None,
        };
        if let Some(member) = member {
            if let Some(result) = self.renderer.call_member(member, args.clone(), self.scope) {
                return result;
            }
        }

        match self.lookup(path) {
            Value::Function(function) => function.call(self.renderer, args),
            Value::Undefined => Err(Error::runtime(format!("`{}` is not defined", name))),
            other => Err(Error::runtime(format!(
                "`{}` is not a function but {}",
                name,
                other.type_name()
            ))),
        }
    }
}

/// Apply a pending `not`; an even number of them still coerces to a boolean
fn invert_value(value: Value, invert: Option<bool>) -> Value {
    match invert {
        Some(true) => Value::Bool(!value.is_truthy()),
        Some(false) => Value::Bool(value.is_truthy()),
        None => value,
    }
}
