//! Tokenizer and cursor for the content of a single tag.

use std::fmt;

/// Words that are operators or structural keywords, never variables
const KEYWORDS: &[&str] = &[
    "eq", "neq", "gt", "ge", "lt", "le", "plus", "minus", "multiply", "divide",
    "empty", "emptyhtml", "and", "or", "not", "as", "where",
];

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Literal(Literal),
    /// Variable path such as `a.b[0]`
    Variable(Vec<String>),
    /// Call of the function found at `path`
    Call { path: Vec<String>, args: Vec<Token> },
    /// Operator, combinator or bare keyword (`as`, `where`)
    Keyword(String),
    /// Parenthesized sub-expression
    Group(Vec<Token>),
    Array(Vec<Vec<Token>>),
    Object(Vec<(String, Vec<Token>)>),
    Comma,
    Semicolon,
    /// Single `=`
    Assign,
}

impl Token {
    /// Keyword or single-segment variable spelled `word`
    pub fn is_word(&self, word: &str) -> bool {
        match self {
            Token::Keyword(keyword) => keyword == word,
            Token::Variable(path) => path.len() == 1 && path[0] == word,
            _ => false,
        }
    }

    /// Name of a single-segment variable
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Token::Variable(path) if path.len() == 1 => Some(&path[0]),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Literal(Literal::String(s)) => write!(f, "{:?}", s),
            Token::Literal(literal) => write!(f, "{:?}", literal),
            Token::Variable(path) => write!(f, "variable `{}`", path.join(".")),
            Token::Call { path, .. } => write!(f, "call `{}()`", path.join(".")),
            Token::Keyword(keyword) => write!(f, "keyword `{}`", keyword),
            Token::Group(_) => write!(f, "group"),
            Token::Array(_) => write!(f, "array"),
            Token::Object(_) => write!(f, "object"),
            Token::Comma => write!(f, "`,`"),
            Token::Semicolon => write!(f, "`;`"),
            Token::Assign => write!(f, "`=`"),
        }
    }
}

/// Argument of a call or macro signature, optionally named (`name=value`)
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub name: Option<String>,
    pub value: Vec<Token>,
}

/// Tokenize the content of a tag
pub fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let mut lexer = Lexer {
        chars: source.chars().collect(),
        pos: 0,
    };
    let (tokens, terminator) = lexer.read_tokens(&[])?;
    match terminator {
        None => Ok(tokens),
        Some(c) => Err(format!("Unexpected `{}`", c)),
    }
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
}

impl Lexer {
    fn peek_char(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_next_char(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek_char().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn starts_with(&self, text: &str) -> bool {
        text.chars()
            .enumerate()
            .all(|(offset, c)| self.chars.get(self.pos + offset) == Some(&c))
    }

    /// Read tokens until one of `terminators` (consumed and returned) or the end
    fn read_tokens(&mut self, terminators: &[char]) -> Result<(Vec<Token>, Option<char>), String> {
        let mut tokens: Vec<Token> = Vec::new();
        loop {
            self.skip_whitespace();
            let Some(c) = self.peek_char() else {
                return Ok((tokens, None));
            };
            if terminators.contains(&c) {
                self.pos += 1;
                return Ok((tokens, Some(c)));
            }

            let token = match c {
                '"' | '\'' => Token::Literal(Literal::String(self.read_string(c)?)),
                '0'..='9' => Token::Literal(Literal::Number(self.read_number()?)),
                '-' if self.peek_next_char().is_some_and(|n| n.is_ascii_digit())
                    && allows_sign(tokens.last()) =>
                {
                    self.pos += 1;
                    Token::Literal(Literal::Number(-self.read_number()?))
                }
                c if is_ident_start(c) => self.read_word()?,
                '(' => {
                    self.pos += 1;
                    let (inner, end) = self.read_tokens(&[')'])?;
                    if end.is_none() {
                        return Err("Missing `)`".to_string());
                    }
                    Token::Group(inner)
                }
                '[' => {
                    self.pos += 1;
                    Token::Array(self.read_array()?)
                }
                '{' => {
                    self.pos += 1;
                    Token::Object(self.read_object()?)
                }
                ',' => {
                    self.pos += 1;
                    Token::Comma
                }
                ';' => {
                    self.pos += 1;
                    Token::Semicolon
                }
                _ => self.read_symbol()?,
            };
            tokens.push(token);
        }
    }

    fn read_symbol(&mut self) -> Result<Token, String> {
        const SYMBOLS: &[(&str, &str)] = &[
            ("===", "eq"),
            ("!==", "neq"),
            ("==", "eq"),
            ("!=", "neq"),
            (">=", "ge"),
            ("<=", "le"),
            ("&&", "and"),
            ("||", "or"),
            (">", "gt"),
            ("<", "lt"),
            ("+", "plus"),
            ("-", "minus"),
            ("*", "multiply"),
            ("/", "divide"),
            ("!", "not"),
        ];
        for (symbol, keyword) in SYMBOLS {
            if self.starts_with(symbol) {
                self.pos += symbol.chars().count();
                return Ok(Token::Keyword(keyword.to_string()));
            }
        }
        if self.peek_char() == Some('=') {
            self.pos += 1;
            return Ok(Token::Assign);
        }
        Err(format!("Unexpected character `{}`", self.peek_char().unwrap_or(' ')))
    }

    fn read_string(&mut self, quote: char) -> Result<String, String> {
        self.pos += 1;
        let mut value = String::new();
        loop {
            let Some(c) = self.peek_char() else {
                return Err("Unterminated string".to_string());
            };
            self.pos += 1;
            match c {
                c if c == quote => return Ok(value),
                '\\' => {
                    let escaped = self.peek_char().ok_or("Unterminated string")?;
                    self.pos += 1;
                    value.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        other => other,
                    });
                }
                c => value.push(c),
            }
        }
    }

    fn read_number(&mut self) -> Result<f64, String> {
        let start = self.pos;
        while self
            .peek_char()
            .is_some_and(|c| c.is_ascii_digit() || c == '.' || c == '_')
        {
            self.pos += 1;
        }
        if matches!(self.peek_char(), Some('e' | 'E')) {
            self.pos += 1;
            if matches!(self.peek_char(), Some('+' | '-')) {
                self.pos += 1;
            }
            while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        let text: String = self.chars[start..self.pos].iter().filter(|c| **c != '_').collect();
        text.parse()
            .map_err(|_| format!("Invalid number `{}`", text))
    }

    fn read_ident(&mut self) -> String {
        let start = self.pos;
        while self.peek_char().is_some_and(is_ident_char) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    /// Identifier, keyword, literal word, variable path or call
    fn read_word(&mut self) -> Result<Token, String> {
        let first = self.read_ident();
        let mut path = vec![first];

        loop {
            match self.peek_char() {
                Some('.') if self.peek_next_char().is_some_and(is_ident_start) => {
                    self.pos += 1;
                    path.push(self.read_ident());
                }
                Some('[') => {
                    self.pos += 1;
                    self.skip_whitespace();
                    let segment = match self.peek_char() {
                        Some(quote @ ('"' | '\'')) => self.read_string(quote)?,
                        Some(c) if c.is_ascii_digit() => self.read_ident(),
                        _ => return Err("Only literal indexes are supported".to_string()),
                    };
                    self.skip_whitespace();
                    if self.peek_char() != Some(']') {
                        return Err("Missing `]`".to_string());
                    }
                    self.pos += 1;
                    path.push(segment);
                }
                _ => break,
            }
        }

        if self.peek_char() == Some('(') {
            self.pos += 1;
            let (args, end) = self.read_tokens(&[')'])?;
            if end.is_none() {
                return Err("Missing `)`".to_string());
            }
            return Ok(Token::Call { path, args });
        }

        if path.len() == 1 {
            let word = path[0].as_str();
            match word {
                "true" => return Ok(Token::Literal(Literal::Bool(true))),
                "false" => return Ok(Token::Literal(Literal::Bool(false))),
                "null" => return Ok(Token::Literal(Literal::Null)),
                "undefined" => return Ok(Token::Literal(Literal::Undefined)),
                "starts" => {
                    let save = self.pos;
                    self.skip_whitespace();
                    if self.starts_with("with") && !self.chars.get(self.pos + 4).is_some_and(|c| is_ident_char(*c)) {
                        self.pos += 4;
                        return Ok(Token::Keyword("starts with".to_string()));
                    }
                    self.pos = save;
                }
                _ if KEYWORDS.contains(&word) => return Ok(Token::Keyword(word.to_string())),
                _ => {}
            }
        }

        Ok(Token::Variable(path))
    }

    fn read_array(&mut self) -> Result<Vec<Vec<Token>>, String> {
        let mut items = Vec::new();
        loop {
            let (item, end) = self.read_tokens(&[',', ']'])?;
            if !item.is_empty() {
                items.push(item);
            }
            match end {
                Some(']') => return Ok(items),
                Some(_) => continue,
                None => return Err("Missing `]`".to_string()),
            }
        }
    }

    fn read_object(&mut self) -> Result<Vec<(String, Vec<Token>)>, String> {
        let mut entries = Vec::new();
        loop {
            self.skip_whitespace();
            let key = match self.peek_char() {
                Some('}') => {
                    self.pos += 1;
                    return Ok(entries);
                }
                Some(quote @ ('"' | '\'')) => self.read_string(quote)?,
                Some(c) if is_ident_start(c) || c.is_ascii_digit() => self.read_ident(),
                _ => return Err("Invalid object key".to_string()),
            };
            self.skip_whitespace();
            if self.peek_char() != Some(':') {
                return Err(format!("Missing `:` after object key `{}`", key));
            }
            self.pos += 1;
            let (value, end) = self.read_tokens(&[',', '}'])?;
            entries.push((key, value));
            match end {
                Some('}') => return Ok(entries),
                Some(_) => continue,
                None => return Err("Missing `}`".to_string()),
            }
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// A `-` directly before a digit is a sign when no operand precedes it
fn allows_sign(previous: Option<&Token>) -> bool {
    matches!(
        previous,
        None | Some(Token::Keyword(_) | Token::Comma | Token::Semicolon | Token::Assign)
    )
}

/// Split tokens on top-level commas
pub fn split_commas(tokens: &[Token]) -> Vec<Vec<Token>> {
    if tokens.is_empty() {
        return Vec::new();
    }
    tokens
        .split(|token| *token == Token::Comma)
        .map(<[Token]>::to_vec)
        .collect()
}

/// Parse a comma-separated argument list
pub fn parse_arguments(tokens: &[Token]) -> Vec<Argument> {
    split_commas(tokens)
        .into_iter()
        .filter(|group| !group.is_empty())
        .map(|group| match group.as_slice() {
            [name, Token::Assign, rest @ ..] if name.as_name().is_some() => Argument {
                name: name.as_name().map(str::to_string),
                value: rest.to_vec(),
            },
            _ => Argument {
                name: None,
                value: group,
            },
        })
        .collect()
}

/// Cursor over the tokens of one tag
#[derive(Debug, Clone, Default)]
pub struct TokenStream {
    tokens: Vec<Token>,
    pos: usize,
}

impl TokenStream {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    pub fn parse(source: &str) -> Result<Self, String> {
        tokenize(source).map(Self::new)
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn is_done(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    pub fn current(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    /// Token after the current one
    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos + 1)
    }

    /// Advance and return the new current token
    pub fn next(&mut self) -> Option<&Token> {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        self.current()
    }

    /// Advance to the next occurrence of the bare word `word`
    pub fn go_to(&mut self, word: &str) -> bool {
        while let Some(token) = self.current() {
            if token.is_word(word) {
                return true;
            }
            self.pos += 1;
        }
        false
    }

    /// Read up to `amount` variable paths (all consecutive ones when `None`)
    pub fn get_variable(&mut self, amount: Option<usize>) -> Vec<Vec<String>> {
        let mut paths = Vec::new();
        while let Some(token) = self.current() {
            if amount.is_some_and(|amount| paths.len() >= amount) {
                break;
            }
            match token {
                Token::Variable(path) => {
                    paths.push(path.clone());
                    self.pos += 1;
                }
                Token::Comma => self.pos += 1,
                _ => break,
            }
        }
        paths
    }

    /// Arguments of the current call or group token
    pub fn get_arguments(&mut self) -> Option<Vec<Argument>> {
        let arguments = match self.current()? {
            Token::Call { args, .. } | Token::Group(args) => parse_arguments(args),
            _ => return None,
        };
        self.pos += 1;
        Some(arguments)
    }

    /// Remaining tokens as an operator expression
    pub fn get_expression(&mut self) -> Vec<Token> {
        let rest = self.tokens[self.pos.min(self.tokens.len())..].to_vec();
        self.pos = self.tokens.len();
        rest
    }

    /// Remaining tokens up to the bare word `word`, cursor left on it
    pub fn get_until(&mut self, word: &str) -> Vec<Token> {
        let start = self.pos;
        self.go_to(word);
        self.tokens[start..self.pos].to_vec()
    }

    pub fn has_value(&self, word: &str) -> bool {
        self.tokens[self.pos.min(self.tokens.len())..]
            .iter()
            .any(|token| token.is_word(word))
    }
}
