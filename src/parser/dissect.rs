use crate::error::{CompileError, ErrorKind, Location};

/// Which delimiter pair produced a tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    /// `<% ... %>`
    Code,
    /// `{% ... %}`
    Expression,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Literal,
    Tag(Syntax),
}

/// Piece of template source, either literal text or the content of a tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub kind: SegmentKind,
    pub content: String,
    /// Location of the segment start (the open delimiter for tags)
    pub location: Location,
    /// Tag ended with `-` before its close delimiter
    pub trim_newline: bool,
}

impl Segment {
    pub fn is_tag(&self) -> bool {
        matches!(self.kind, SegmentKind::Tag(_))
    }
}

/// Splits source into literal and tag segments for one delimiter pair
pub struct Dissector<'a> {
    open: &'a str,
    close: &'a str,
    syntax: Syntax,
}

impl<'a> Dissector<'a> {
    pub fn new(open: &'a str, close: &'a str, syntax: Syntax) -> Self {
        Self { open, close, syntax }
    }

    pub fn dissect(&self, source: &str) -> Result<Vec<Segment>, CompileError> {
        self.dissect_at(source, Location::new(1, 0, 0))
    }

    /// Dissect text that starts at `start` inside a larger source
    pub fn dissect_at(&self, source: &str, start: Location) -> Result<Vec<Segment>, CompileError> {
        let mut segments = Vec::new();
        let mut cursor = Cursor {
            line: start.line,
            column: start.column,
        };
        let mut rest = source;

        while !rest.is_empty() {
            let Some(open_at) = rest.find(self.open) else {
                segments.push(literal(rest, cursor.location(rest.len())));
                break;
            };

            if open_at > 0 {
                let text = &rest[..open_at];
                segments.push(literal(text, cursor.location(text.len())));
                cursor.advance(text);
            }

            let after_open = &rest[open_at + self.open.len()..];
            let Some(close_at) = after_open.find(self.close) else {
                return Err(CompileError::new(
                    ErrorKind::UnterminatedTag,
                    format!("`{}` is never closed with `{}`", self.open, self.close),
                    cursor.location(self.open.len()),
                )
                .with_help(format!("end the tag with `{}`", self.close)));
            };

            let raw = &after_open[..close_at];
            let tag_length = self.open.len() + close_at + self.close.len();
            let location = cursor.location(tag_length.min(first_line_len(&rest[open_at..])));
            let (content, trim_newline) = match raw.strip_suffix('-') {
                Some(stripped) => (stripped, true),
                None => (raw, false),
            };
            segments.push(Segment {
                kind: SegmentKind::Tag(self.syntax),
                content: content.to_string(),
                location,
                trim_newline,
            });

            cursor.advance(&rest[open_at..open_at + tag_length]);
            rest = &rest[open_at + tag_length..];
        }

        Ok(segments)
    }
}

struct Cursor {
    line: usize,
    column: usize,
}

impl Cursor {
    fn location(&self, length: usize) -> Location {
        Location::new(self.line, self.column, length)
    }

    fn advance(&mut self, text: &str) {
        match text.rfind('\n') {
            Some(last) => {
                self.line += text.matches('\n').count();
                self.column = text[last + 1..].chars().count();
            }
            None => self.column += text.chars().count(),
        }
    }
}

fn literal(text: &str, location: Location) -> Segment {
    Segment {
        kind: SegmentKind::Literal,
        content: text.to_string(),
        location,
        trim_newline: false,
    }
}

fn first_line_len(text: &str) -> usize {
    text.find('\n').unwrap_or(text.len())
}

/// Remove one leading `\n` or `\r\n`
pub fn strip_leading_newline(text: &str) -> &str {
    text.strip_prefix("\r\n")
        .or_else(|| text.strip_prefix('\n'))
        .unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code() -> Dissector<'static> {
        Dissector::new("<%", "%>", Syntax::Code)
    }

    #[test]
    fn test_literals_and_tags() {
        let segments = code().dissect("a<% x %>b").unwrap();
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].content, "a");
        assert_eq!(segments[1].content, " x ");
        assert!(segments[1].is_tag());
        assert_eq!(segments[2].content, "b");
    }

    #[test]
    fn test_line_numbers() {
        let segments = code().dissect("one\ntwo\n<% x %>\n<%\n y %>").unwrap();
        let tags: Vec<&Segment> = segments.iter().filter(|s| s.is_tag()).collect();
        assert_eq!(tags[0].location.line, 3);
        assert_eq!(tags[0].location.column, 0);
        assert_eq!(tags[1].location.line, 4);
    }

    #[test]
    fn test_trim_newline_marker() {
        let segments = code().dissect("<% x -%>\nnext").unwrap();
        assert!(segments[0].trim_newline);
        assert_eq!(segments[0].content, " x ");
        assert_eq!(strip_leading_newline(&segments[1].content), "next");
    }

    #[test]
    fn test_unterminated_tag() {
        let err = code().dissect("fine\n  <% broken").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnterminatedTag);
        assert_eq!(err.location.line, 2);
        assert_eq!(err.location.column, 2);
    }

    #[test]
    fn test_nested_offset() {
        let dissector = Dissector::new("{%", "%}", Syntax::Expression);
        let segments = dissector.dissect_at("x\n{% if y %}", Location::new(5, 3, 0)).unwrap();
        assert_eq!(segments[1].location.line, 6);
        assert_eq!(segments[1].kind, SegmentKind::Tag(Syntax::Expression));
    }
}
