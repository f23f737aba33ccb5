//! Lexer and parser for the rings scripting language.
//!
//! # Example
//!
//! ```ignore
//! use rings_engine::parser::parse;
//!
//! let chunk = parse("return 1 + 1", "[string \"return 1 + 1\"]".into())?;
//! assert_eq!(chunk.body.block.statements.len(), 1);
//! ```

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod token;

// Re-exports for convenience
pub use lexer::{LexError, Lexer};
pub use parser::{parse, ParseError, Parser};
pub use token::{Span, Token};

/// Maximum length of a diagnostic chunk name.
const CHUNK_ID_SIZE: usize = 60;

/// Diagnostic name for a chunk.
///
/// `=name` is used verbatim, `@file` names a file, anything else is source
/// text and is shown as `[string "first line..."]`.
pub fn chunk_id(name: &str) -> String {
    if let Some(literal) = name.strip_prefix('=') {
        return literal.chars().take(CHUNK_ID_SIZE).collect();
    }
    if let Some(file) = name.strip_prefix('@') {
        let count = file.chars().count();
        if count <= CHUNK_ID_SIZE {
            return file.to_string();
        }
        let tail: String = file.chars().skip(count - (CHUNK_ID_SIZE - 3)).collect();
        return format!("...{}", tail);
    }

    let first_line = name.lines().next().unwrap_or("");
    // room left after `[string "` + `..."]`
    let room = CHUNK_ID_SIZE - 15;
    let truncated = first_line.len() < name.len() || first_line.chars().count() > room;
    if truncated {
        let head: String = first_line.chars().take(room).collect();
        format!("[string \"{}...\"]", head)
    } else {
        format!("[string \"{}\"]", first_line)
    }
}
