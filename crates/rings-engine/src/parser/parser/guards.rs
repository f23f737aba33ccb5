//! Parser guards to prevent stack overflow on deeply nested input

use super::{ParseError, Parser};

/// Maximum nesting depth (blocks plus expressions) before rejecting parse
///
/// Matches the interpreter's default call depth so any tree the parser
/// accepts can also be walked without exhausting the native stack.
pub const MAX_PARSE_DEPTH: usize = 200;

/// Run `inner` one nesting level deeper, failing cleanly past the limit.
pub fn nested<T>(
    parser: &mut Parser,
    what: &'static str,
    inner: impl FnOnce(&mut Parser) -> Result<T, ParseError>,
) -> Result<T, ParseError> {
    parser.depth += 1;
    if parser.depth > MAX_PARSE_DEPTH {
        parser.depth -= 1;
        return Err(parser.error(format!("chunk has too many syntax levels ({})", what)));
    }

    let result = inner(parser);

    parser.depth -= 1;
    result
}
