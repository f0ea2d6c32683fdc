//! Statement splitting and block assembly.

use serde::{Deserialize, Serialize};

/// Name of the single generated block.
pub const BLOCK_NAME: &str = "Generated SCD block";

/// Name of the single code unit inside the block.
pub const CODE_NAME: &str = "SCD code";

/// An ordered list of statements run as one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Code {
    pub name: String,
    pub script: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub name: String,
    pub codes: Vec<Code>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Code,
    SingleQuoted,
    DoubleQuoted,
    LineComment,
    BlockComment,
}

/// Split SQL into statements on top-level `;`.
///
/// Separators inside string literals, quoted identifiers and comments are
/// ignored. A backslash inside a string literal escapes the next character. Statements are trimmed and keep their terminator; empty and
/// comment-only fragments are dropped.
pub fn split_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut has_code = false;
    let mut state = State::Code;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);

        match state {
            State::Code => match c {
                '\'' => {
                    state = State::SingleQuoted;
                    has_code = true;
                }
                '"' => {
                    state = State::DoubleQuoted;
                    has_code = true;
                }
                '-' if chars.peek() == Some(&'-') => {
                    current.push('-');
                    chars.next();
                    state = State::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    current.push('*');
                    chars.next();
                    state = State::BlockComment;
                }
                ';' => {
                    if has_code {
                        statements.push(current.trim().to_string());
                    }
                    current.clear();
                    has_code = false;
                }
                c if !c.is_whitespace() => has_code = true,
                _ => {}
            },
            State::SingleQuoted if c == '\\' => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            // A doubled quote is an escaped quote; toggling twice keeps the state.
            State::SingleQuoted if c == '\'' => state = State::Code,
            State::DoubleQuoted if c == '"' => state = State::Code,
            State::LineComment if c == '\n' => state = State::Code,
            State::BlockComment if c == '*' && chars.peek() == Some(&'/') => {
                current.push('/');
                chars.next();
                state = State::Code;
            }
            _ => {}
        }
    }

    if has_code {
        statements.push(current.trim().to_string());
    }

    statements
}

/// Wrap rendered SQL into the block structure.
pub fn generate_blocks(sql: &str) -> Vec<Block> {
    vec![Block {
        name: BLOCK_NAME.to_string(),
        codes: vec![Code {
            name: CODE_NAME.to_string(),
            script: split_statements(sql),
        }],
    }]
}
