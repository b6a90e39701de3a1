use super::tokens::{Token, tokenize};

/// Statement of a pass-through logic tag
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `name = expression`, stored in the current scope frame
    Assign { name: String, value: Vec<Token> },
    /// Expression evaluated for its effect, usually a call
    Eval(Vec<Token>),
}

/// Words that may prefix an assignment and carry no meaning here
const DECLARATIONS: &[&str] = &["var", "let", "const"];

/// Parse `;`-separated statements
pub fn parse_statements(source: &str) -> Result<Vec<Statement>, String> {
    let tokens = tokenize(source)?;
    let mut statements = Vec::new();

    for group in tokens.split(|token| *token == Token::Semicolon) {
        let group = match group {
            [first, rest @ ..]
                if first.as_name().is_some_and(|name| DECLARATIONS.contains(&name)) =>
            {
                rest
            }
            _ => group,
        };
        match group {
            [] => {}
            [Token::Assign, ..] => return Err("Assignment without a target".to_string()),
            [target, Token::Assign, value @ ..] => {
                let Some(name) = target.as_name() else {
                    return Err(format!("Cannot assign to {}", target));
                };
                if value.is_empty() {
                    return Err(format!("Missing value for `{}`", name));
                }
                statements.push(Statement::Assign {
                    name: name.to_string(),
                    value: value.to_vec(),
                });
            }
            tokens => statements.push(Statement::Eval(tokens.to_vec())),
        }
    }

    Ok(statements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::tokens::Literal;

    #[test]
    fn test_assignments_and_calls() {
        let statements = parse_statements("var x = 1; print(x);").unwrap();
        assert_eq!(statements.len(), 2);
        assert_eq!(
            statements[0],
            Statement::Assign {
                name: "x".to_string(),
                value: vec![Token::Literal(Literal::Number(1.0))],
            }
        );
        assert!(matches!(&statements[1], Statement::Eval(tokens) if tokens.len() == 1));
    }

    #[test]
    fn test_invalid_targets() {
        assert!(parse_statements("a.b = 1").is_err());
        assert!(parse_statements("x =").is_err());
        assert!(parse_statements("= 2").is_err());
    }
}
