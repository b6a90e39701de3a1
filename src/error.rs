use std::fmt;

/// Kind of compile error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnterminatedTag,
    UnclosedExpression,
    MismatchedCloseTag,
    UnexpectedCloseTag,
    OrphanSubkeyword,
    UnexpectedToken,
    InvalidSyntax,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnterminatedTag => "Unterminated tag",
            ErrorKind::UnclosedExpression => "Unclosed expression",
            ErrorKind::MismatchedCloseTag => "Mismatched close tag",
            ErrorKind::UnexpectedCloseTag => "Unexpected close tag",
            ErrorKind::OrphanSubkeyword => "Subkeyword outside of an expression",
            ErrorKind::UnexpectedToken => "Unexpected token",
            ErrorKind::InvalidSyntax => "Invalid syntax",
        }
    }
}

/// Position of a tag inside a template source (1-based line, 0-based column)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    pub line: usize,
    pub column: usize,
    pub length: usize,
}

impl Location {
    pub fn new(line: usize, column: usize, length: usize) -> Self {
        Self { line, column, length }
    }
}

/// Error raised while turning template source into its compiled form
#[derive(Debug, Clone)]
pub struct CompileError {
    pub kind: ErrorKind,
    pub message: String,
    pub template: String,
    pub location: Location,
    pub related: Option<Location>,
    pub related_label: Option<String>,
    pub help: Option<String>,
}

impl CompileError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, location: Location) -> Self {
        Self {
            kind,
            message: message.into(),
            template: String::new(),
            location,
            related: None,
            related_label: None,
            help: None,
        }
    }

    /// Name the template the error belongs to
    pub fn in_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    /// Point at a second tag, usually the one that opened the failing expression
    pub fn with_related(mut self, location: Location) -> Self {
        self.related = Some(location);
        self
    }

    pub fn with_related_label(mut self, label: impl Into<String>) -> Self {
        self.related_label = Some(label.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Render the error with an excerpt of `source`
    pub fn render(&self, source: &str) -> String {
        self.render_inner(source, false)
    }

    /// Render the error with ANSI color codes
    pub fn render_color(&self, source: &str) -> String {
        self.render_inner(source, true)
    }

    fn render_inner(&self, source: &str, color: bool) -> String {
        let red = if color { "\x1b[1;31m" } else { "" };
        let dim = if color { "\x1b[2m" } else { "" };
        let cyan = if color { "\x1b[1;38;5;73m" } else { "" };
        let reset = if color { "\x1b[0m" } else { "" };

        let mut output = String::new();
        output.push('\n');

        let anchor = self.related.unwrap_or(self.location);
        output.push_str(&format!(
            " {}template:{} {}:{}:{}\n",
            dim,
            reset,
            self.template,
            anchor.line,
            anchor.column + 1
        ));
        output.push_str(&format!(
            "{}error:{} {}: {}\n",
            red,
            reset,
            self.kind.as_str(),
            self.message
        ));

        let width = format!("{}", self.location.line.max(self.related.map_or(0, |r| r.line)))
            .len()
            .max(2);

        if let Some(source_line) = source_line(source, self.location.line) {
            output.push_str(&format!("{}{:>width$} |{}\n", dim, "", reset, width = width));
            output.push_str(&format!(
                "{}{:>width$} |{} {}\n",
                dim,
                self.location.line,
                reset,
                source_line,
                width = width
            ));
            output.push_str(&format!(
                "{}{:>width$} |{} {}{}{}{}\n",
                dim,
                "",
                reset,
                " ".repeat(self.location.column),
                red,
                "^".repeat(self.location.length.max(1)),
                reset,
                width = width
            ));
        }

        if let Some(related) = self.related {
            if let Some(related_line) = source_line(source, related.line) {
                output.push_str(&format!(
                    "{}{:>width$} |{} {}\n",
                    dim,
                    related.line,
                    reset,
                    related_line,
                    width = width
                ));
                let label = self.related_label.as_deref().unwrap_or("opened here");
                output.push_str(&format!(
                    "{}{:>width$} |{} {}{}{} {}{}\n",
                    dim,
                    "",
                    reset,
                    " ".repeat(related.column),
                    dim,
                    "^".repeat(related.length.max(1)),
                    label,
                    reset,
                    width = width
                ));
            }
        }

        if let Some(ref help) = self.help {
            output.push('\n');
            for (i, help_line) in help.lines().enumerate() {
                if i == 0 {
                    output.push_str(&format!(" {}help:{} {}\n", cyan, reset, help_line));
                } else {
                    output.push_str(&format!("       {}\n", help_line));
                }
            }
        }

        output.push('\n');
        output
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.template.is_empty() {
            write!(f, "{} (line {})", self.message, self.location.line)
        } else {
            write!(
                f,
                "{} (template `{}` line {})",
                self.message, self.template, self.location.line
            )
        }
    }
}

impl std::error::Error for CompileError {}

/// Error raised while executing a compiled template
#[derive(Debug, Clone, Default)]
pub struct RuntimeError {
    pub message: String,
    pub template: Option<String>,
    pub line: Option<usize>,
    /// Surrounding source lines, the failing one marked with `»»»`
    pub context: Option<String>,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn is_located(&self) -> bool {
        self.template.is_some()
    }

    /// Attach the template position that was executing when the error occurred
    pub fn locate(mut self, template: &str, line: usize, source: Option<&str>) -> Self {
        self.template = Some(template.to_string());
        self.line = Some(line);
        self.context = source.map(|source| source_context(source, line));
        self
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.template, self.line) {
            (Some(template), Some(line)) => {
                write!(f, "{} (template `{}` line {})", self.message, template, line)?;
                if let Some(context) = &self.context {
                    write!(f, "\n{}", context)?;
                }
                Ok(())
            }
            _ => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for RuntimeError {}

/// Crate-level error
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("asynchronous content failed: {0}")]
    Async(String),
    #[error("template `{0}` could not be found")]
    NotFound(String),
    #[error("block `{0}` has not been assembled")]
    NotAssembled(String),
    #[error("invalid settings: {0}")]
    Settings(String),
    #[error("{0}")]
    Io(String),
}

impl Error {
    pub fn runtime(message: impl Into<String>) -> Self {
        Error::Runtime(RuntimeError::new(message))
    }

    /// Attach a template position to runtime errors that do not carry one yet
    pub(crate) fn locate(self, template: &str, line: usize, source: Option<&str>) -> Self {
        match self {
            Error::Runtime(err) if !err.is_located() => {
                Error::Runtime(err.locate(template, line, source))
            }
            other => other,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

fn source_line(source: &str, line: usize) -> Option<&str> {
    line.checked_sub(1).and_then(|index| source.lines().nth(index))
}

/// Lines around `line` (three before, four after), each prefixed with its number
pub fn source_context(source: &str, line: usize) -> String {
    let lines: Vec<&str> = source.lines().collect();
    if lines.is_empty() || line == 0 {
        return String::new();
    }
    let start = line.saturating_sub(3).max(1);
    let end = (line + 4).min(lines.len());
    let width = format!("{}", end).len();

    let mut output = String::new();
    for number in start..=end {
        let marker = if number == line { " »»»" } else { "    " };
        output.push_str(&format!(
            "{} {:>width$} | {}\n",
            marker,
            number,
            lines[number - 1],
            width = width
        ));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_points_at_tag() {
        let source = "<p>\n{% if x %}\n</p>";
        let err = CompileError::new(
            ErrorKind::UnclosedExpression,
            "`if` is never closed",
            Location::new(2, 0, 10),
        )
        .in_template("page")
        .with_help("add {% /if %}");
        let rendered = err.render(source);
        assert!(rendered.contains("page:2:1"));
        assert!(rendered.contains(" 2 | {% if x %}"));
        assert!(rendered.contains("^^^^^^^^^^"));
        assert!(rendered.contains("help: add {% /if %}"));
    }

    #[test]
    fn test_source_context_marks_line() {
        let source = "a\nb\nc\nd\ne\nf\ng\nh\ni";
        let context = source_context(source, 5);
        let lines: Vec<&str> = context.lines().collect();
        assert_eq!(lines.len(), 8);
        assert_eq!(lines[0], "     2 | b");
        assert_eq!(lines[3], " »»» 5 | e");
        assert_eq!(lines[7], "     9 | i");
    }

    #[test]
    fn test_locate_keeps_first_position() {
        let err = Error::runtime("boom").locate("inner", 3, None);
        let err = err.locate("outer", 9, None);
        match err {
            Error::Runtime(err) => {
                assert_eq!(err.template.as_deref(), Some("inner"));
                assert_eq!(err.line, Some(3));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
