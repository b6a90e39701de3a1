use std::rc::Rc;

use crate::ast::{Args, EachArgs, Node, Param, TrimKind, WithArgs};
use crate::block_buffer::BlockOptions;
use crate::error::{CompileError, Error, ErrorKind, Result};
use crate::interpreter::Invocation;
use crate::parser::tokens::{Token, parse_arguments};
use crate::scope::{EachContext, Scope};
use crate::value::Value;

use super::{Code, Expression, OpenExpression, TagOptions};

const SUBKEYWORDS: &[&str] = &["else", "single", "multiple", "none", "all"];

fn syntax_error(options: &TagOptions, message: impl Into<String>) -> CompileError {
    CompileError::new(ErrorKind::InvalidSyntax, message, options.location)
}

fn unexpected_args(invocation: &Invocation) -> Error {
    Error::runtime(format!(
        "`{}` was compiled with unexpected arguments",
        invocation.kind_name()
    ))
}

/// Read `as <alias>` at the cursor
fn read_alias(options: &mut TagOptions) -> Result<String, CompileError> {
    if !options.tokens.go_to("as") {
        return Err(syntax_error(
            options,
            format!("`{}` needs an alias: `{} <path> as <name>`", options.keyword, options.keyword),
        ));
    }
    options.tokens.next();
    match options.tokens.get_variable(Some(1)).pop() {
        Some(path) if path.len() == 1 => Ok(path[0].clone()),
        _ => Err(syntax_error(options, "the alias after `as` must be a plain name")),
    }
}

/// `if <expression>` … `else` … `/if`
pub struct If;

impl Expression for If {
    fn name(&self) -> &'static str {
        "if"
    }

    fn to_code(&self, options: &mut TagOptions) -> Result<Code, CompileError> {
        let condition = options.tokens.get_expression();
        if condition.is_empty() {
            return Err(syntax_error(options, "`if` needs a condition"));
        }
        Ok(Code::Open(Args::Condition(condition)))
    }

    fn accepts_branch(&self, name: &str) -> bool {
        name == "else"
    }

    fn execute(&self, invocation: &mut Invocation) -> Result<()> {
        let Args::Condition(condition) = invocation.args() else {
            return Err(unexpected_args(invocation));
        };
        let scope = invocation.scope().clone();
        let value = invocation.evaluate(condition, &scope)?;
        if value.is_truthy() {
            invocation.run_body(&scope)
        } else {
            invocation.run_branch("else", &scope).map(|_| ())
        }
    }
}

/// `each <path> as <alias>` or a bare `each` inside `with`/`while`
pub struct Each;

impl Expression for Each {
    fn name(&self) -> &'static str {
        "each"
    }

    fn to_code(&self, options: &mut TagOptions) -> Result<Code, CompileError> {
        if options.tokens.is_empty() {
            return Ok(Code::Open(Args::Each(None)));
        }
        let Some(variable) = options.tokens.get_variable(Some(1)).pop() else {
            return Err(syntax_error(options, "`each` expects a variable path"));
        };
        let alias = read_alias(options)?;
        Ok(Code::Open(Args::Each(Some(EachArgs { variable, alias }))))
    }

    fn accepts_branch(&self, name: &str) -> bool {
        name == "else"
    }

    fn execute(&self, invocation: &mut Invocation) -> Result<()> {
        let scope = invocation.scope().clone();
        let context = match invocation.args() {
            Args::Each(Some(each)) => {
                let collection = invocation.lookup(&each.variable);
                Some(Rc::new(EachContext {
                    alias: each.alias.clone(),
                    keys: collection.keys(),
                    collection,
                }))
            }
            Args::Each(None) => scope
                .each_context()
                .or_else(|| invocation.parent_context()),
            _ => return Err(unexpected_args(invocation)),
        };

        match context {
            Some(context) if !context.is_empty() => {
                for key in &context.keys {
                    if invocation.is_broken() {
                        break;
                    }
                    let child = scope.child();
                    child.set(&context.alias, context.collection.get(key));
                    invocation.run_body(&child)?;
                }
                Ok(())
            }
            _ => invocation.run_branch("else", &scope).map(|_| ()),
        }
    }
}

/// `with`/`while <paths> as <alias> [where <alias>.<path>]`
pub struct With {
    name: &'static str,
    skip_empty: bool,
}

impl With {
    pub fn with() -> Self {
        Self {
            name: "with",
            skip_empty: false,
        }
    }

    /// Like `with`, but the body does not run at all for an empty collection
    pub fn while_() -> Self {
        Self {
            name: "while",
            skip_empty: true,
        }
    }

    fn resolve(args: &WithArgs, invocation: &Invocation) -> EachContext {
        let collection = args
            .variables
            .iter()
            .map(|path| invocation.lookup(path))
            .find(|value| match value {
                Value::Array(items) => !items.is_empty(),
                Value::Object(entries) => !entries.is_empty(),
                _ => false,
            })
            .unwrap_or_default();

        let collection = match &args.filter {
            Some(filter) => filter_collection(&collection, filter),
            None => collection,
        };

        EachContext {
            alias: args.alias.clone(),
            keys: collection.keys(),
            collection,
        }
    }
}

/// Keep the entries whose `filter` sub-path is truthy
fn filter_collection(collection: &Value, filter: &[String]) -> Value {
    match collection {
        Value::Array(items) => Value::array(
            items
                .iter()
                .filter(|item| item.get_path(filter).is_truthy())
                .cloned()
                .collect(),
        ),
        Value::Object(entries) => Value::object(
            entries
                .iter()
                .filter(|(_, item)| item.get_path(filter).is_truthy())
                .map(|(key, item)| (key.clone(), item.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

impl Expression for With {
    fn name(&self) -> &'static str {
        self.name
    }

    fn to_code(&self, options: &mut TagOptions) -> Result<Code, CompileError> {
        let variables = options.tokens.get_variable(None);
        if variables.is_empty() {
            return Err(syntax_error(
                options,
                format!("`{}` expects at least one variable path", self.name),
            ));
        }
        let alias = read_alias(options)?;

        let filter = if options.tokens.go_to("where") {
            options.tokens.next();
            match options.tokens.get_variable(Some(1)).pop() {
                Some(path) if path.len() > 1 => Some(path[1..].to_vec()),
                _ => {
                    return Err(syntax_error(
                        options,
                        "`where` expects a path below the alias, like `item.published`",
                    ));
                }
            }
        } else {
            None
        };

        Ok(Code::Open(Args::With(WithArgs {
            variables,
            alias,
            filter,
        })))
    }

    fn accepts_branch(&self, name: &str) -> bool {
        SUBKEYWORDS.contains(&name)
    }

    fn inline_branches(&self) -> bool {
        true
    }

    fn execute(&self, invocation: &mut Invocation) -> Result<()> {
        let Args::With(args) = invocation.args() else {
            return Err(unexpected_args(invocation));
        };
        let context = Rc::new(Self::resolve(args, invocation));
        if self.skip_empty && context.is_empty() {
            return Ok(());
        }
        invocation.set_context(context);
        let scope = invocation.scope().clone();
        invocation.run_body(&scope)
    }

    fn on_branch(
        &self,
        name: &str,
        context: Option<&Rc<EachContext>>,
        scope: &Scope,
    ) -> Option<Scope> {
        let count = context.map_or(0, |context| context.keys.len());
        let context = context.cloned();
        match name {
            "none" if count == 0 => Some(scope.clone()),
            "single" if count == 1 => {
                let context = context?;
                let child = scope.child();
                child.set(&context.alias, context.collection.get(&context.keys[0]));
                Some(child)
            }
            "multiple" if count > 1 => {
                let child = scope.child();
                child.set_each_context(context?);
                Some(child)
            }
            "all" if count > 0 => {
                let child = scope.child();
                child.set_each_context(context?);
                Some(child)
            }
            _ => None,
        }
    }
}

/// `print <expression>`, `= <expression>` and `print macro <name>(args)`
pub struct Print;

impl Expression for Print {
    fn name(&self) -> &'static str {
        "print"
    }

    fn matches(&self, keyword: &str) -> bool {
        keyword == "print" || keyword == "="
    }

    fn to_code(&self, options: &mut TagOptions) -> Result<Code, CompileError> {
        let is_macro = options.tokens.current().is_some_and(|token| token.is_word("macro"))
            && options.tokens.peek().is_some();
        if !is_macro {
            let expression = options.tokens.get_expression();
            if expression.is_empty() {
                return Err(syntax_error(options, "nothing to print"));
            }
            return Ok(Code::Node(Node::Print(expression)));
        }

        options.tokens.next();
        let (name, args) = match options.tokens.current() {
            Some(Token::Call { path, args }) => (path.join("."), parse_arguments(args)),
            Some(Token::Variable(path)) => {
                let name = path.join(".");
                options.tokens.next();
                (name, options.tokens.get_arguments().unwrap_or_default())
            }
            _ => return Err(syntax_error(options, "`macro` expects a macro name")),
        };
        Ok(Code::Node(Node::CallMacro { name, args }))
    }
}

/// `macro <name>(param, param=default)` … `/macro`
pub struct Macro;

impl Expression for Macro {
    fn name(&self) -> &'static str {
        "macro"
    }

    fn to_code(&self, options: &mut TagOptions) -> Result<Code, CompileError> {
        let (name, arguments) = match options.tokens.current() {
            Some(Token::Call { path, args }) if path.len() == 1 => {
                (path[0].clone(), parse_arguments(args))
            }
            Some(Token::Variable(path)) if path.len() == 1 => {
                let name = path[0].clone();
                options.tokens.next();
                (name, options.tokens.get_arguments().unwrap_or_default())
            }
            _ => return Err(syntax_error(options, "`macro` expects a plain name")),
        };

        let mut params = Vec::with_capacity(arguments.len());
        for argument in arguments {
            let param = match (argument.name, argument.value.as_slice()) {
                (Some(name), _) => Param {
                    name,
                    default: Some(argument.value),
                },
                (None, [token]) if token.as_name().is_some() => Param {
                    name: token.as_name().unwrap_or_default().to_string(),
                    default: None,
                },
                _ => {
                    return Err(syntax_error(
                        options,
                        format!("invalid parameter in macro `{}`", name),
                    ));
                }
            };
            params.push(param);
        }

        Ok(Code::Open(Args::Macro { name, params }))
    }

    fn to_close_code(&self, open: OpenExpression) -> Result<Node, CompileError> {
        match open.args {
            Args::Macro { name, params } => Ok(Node::Macro {
                name,
                params,
                body: open.body.into(),
            }),
            _ => Err(CompileError::new(
                ErrorKind::InvalidSyntax,
                "macro opened without a name",
                open.location,
            )),
        }
    }
}

/// `break` or `break <kind>`
pub struct Break;

impl Expression for Break {
    fn name(&self) -> &'static str {
        "break"
    }

    fn to_code(&self, options: &mut TagOptions) -> Result<Code, CompileError> {
        let target = match options.tokens.current() {
            None => None,
            Some(token) => match token.as_name() {
                Some(name) => Some(name.to_string()),
                None => return Err(syntax_error(options, "`break` expects an expression name")),
            },
        };
        Ok(Code::Node(Node::Break(target)))
    }
}

/// `trim`, `trim left`, `trim right`, `trim blank`
pub struct Trim;

impl Expression for Trim {
    fn name(&self) -> &'static str {
        "trim"
    }

    fn to_code(&self, options: &mut TagOptions) -> Result<Code, CompileError> {
        let tokens = &options.tokens;
        if tokens.has_value("blank") {
            return Ok(Code::Node(Node::Trim(TrimKind::Blank)));
        }
        let (left, right) = match (tokens.has_value("left"), tokens.has_value("right")) {
            (false, false) => (true, true),
            sides => sides,
        };
        Ok(Code::Node(Node::Trim(TrimKind::Edges { left, right })))
    }
}

/// `block <name> [, options]` … `/block`
pub struct Block;

impl Expression for Block {
    fn name(&self) -> &'static str {
        "block"
    }

    fn to_code(&self, options: &mut TagOptions) -> Result<Code, CompileError> {
        let expressions = crate::parser::tokens::split_commas(&options.tokens.get_expression());
        if expressions.first().is_none_or(|name| name.is_empty()) || expressions.len() > 2 {
            return Err(syntax_error(options, "`block` expects a name and optional options"));
        }
        Ok(Code::Open(Args::List(expressions)))
    }

    fn execute(&self, invocation: &mut Invocation) -> Result<()> {
        let Args::List(expressions) = invocation.args() else {
            return Err(unexpected_args(invocation));
        };
        let scope = invocation.scope().clone();
        let name = invocation.evaluate(&expressions[0], &scope)?.to_string();
        let options = match expressions.get(1) {
            Some(tokens) => BlockOptions::from_value(&invocation.evaluate(tokens, &scope)?)?,
            None => BlockOptions::default(),
        };

        let renderer = invocation.renderer().clone();
        renderer.start(&name, options)?;
        let result = invocation.run_body(&scope);
        renderer.end(Some(&name))?;
        result
    }
}

/// `else`, `single`, `multiple`, `none`, `all`
pub struct Subkeyword;

impl Expression for Subkeyword {
    fn name(&self) -> &'static str {
        "subkeyword"
    }

    fn matches(&self, keyword: &str) -> bool {
        SUBKEYWORDS.contains(&keyword)
    }

    fn to_code(&self, options: &mut TagOptions) -> Result<Code, CompileError> {
        Ok(Code::Branch(options.keyword.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Location;
    use crate::parser::{Syntax, TokenStream};

    fn compile_tag(kind: &dyn Expression, keyword: &str, rest: &str) -> Result<Code, CompileError> {
        let mut options = TagOptions {
            keyword,
            rest,
            tokens: TokenStream::parse(rest).unwrap(),
            location: Location::new(1, 0, 0),
            syntax: Syntax::Expression,
            parent: None,
        };
        kind.to_code(&mut options)
    }

    #[test]
    fn test_with_arguments() {
        let code = compile_tag(&With::with(), "with", "records, others as record where record.meta.published").unwrap();
        match code {
            Code::Open(Args::With(args)) => {
                assert_eq!(args.variables.len(), 2);
                assert_eq!(args.alias, "record");
                assert_eq!(args.filter, Some(vec!["meta".to_string(), "published".to_string()]));
            }
            other => panic!("unexpected code: {other:?}"),
        }
    }

    #[test]
    fn test_with_requires_alias() {
        let err = compile_tag(&With::with(), "with", "records").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidSyntax);
    }

    #[test]
    fn test_each_forms() {
        assert!(matches!(compile_tag(&Each, "each", "").unwrap(), Code::Open(Args::Each(None))));
        match compile_tag(&Each, "each", "list.items as item").unwrap() {
            Code::Open(Args::Each(Some(each))) => {
                assert_eq!(each.variable, vec!["list".to_string(), "items".to_string()]);
                assert_eq!(each.alias, "item");
            }
            other => panic!("unexpected code: {other:?}"),
        }
    }

    #[test]
    fn test_print_macro_call() {
        match compile_tag(&Print, "=", "macro greet(name='you')").unwrap() {
            Code::Node(Node::CallMacro { name, args }) => {
                assert_eq!(name, "greet");
                assert_eq!(args[0].name.as_deref(), Some("name"));
            }
            other => panic!("unexpected code: {other:?}"),
        }
        assert!(matches!(
            compile_tag(&Print, "print", "macro").unwrap(),
            Code::Node(Node::Print(_))
        ));
    }

    #[test]
    fn test_macro_params() {
        match compile_tag(&Macro, "macro", "card(title, size=2)").unwrap() {
            Code::Open(Args::Macro { name, params }) => {
                assert_eq!(name, "card");
                assert_eq!(params[0].name, "title");
                assert!(params[0].default.is_none());
                assert_eq!(params[1].name, "size");
                assert!(params[1].default.is_some());
            }
            other => panic!("unexpected code: {other:?}"),
        }
    }

    #[test]
    fn test_trim_variants() {
        let trim = |rest| match compile_tag(&Trim, "trim", rest).unwrap() {
            Code::Node(Node::Trim(kind)) => kind,
            other => panic!("unexpected code: {other:?}"),
        };
        assert_eq!(trim(""), TrimKind::Edges { left: true, right: true });
        assert_eq!(trim("left"), TrimKind::Edges { left: true, right: false });
        assert_eq!(trim("right"), TrimKind::Edges { left: false, right: true });
        assert_eq!(trim("blank"), TrimKind::Blank);
    }

    #[test]
    fn test_break_target() {
        assert!(matches!(compile_tag(&Break, "break", "").unwrap(), Code::Node(Node::Break(None))));
        assert!(matches!(
            compile_tag(&Break, "break", "each").unwrap(),
            Code::Node(Node::Break(Some(target))) if target == "each"
        ));
    }
}
