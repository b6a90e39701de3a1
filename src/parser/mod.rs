pub mod dissect;
pub mod statement;
pub mod tokens;

pub use dissect::{Dissector, Segment, SegmentKind, Syntax};
pub use statement::{Statement, parse_statements};
pub use tokens::{Argument, Literal, Token, TokenStream, tokenize};
