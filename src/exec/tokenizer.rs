// src/exec/tokenizer.rs

//! Command-line splitting.
//!
//! Commands are never handed to a shell. A command string is split on
//! whitespace, and a pair of double quotes groups a span into a single token
//! (the quotes themselves are dropped). There is no escape character, no
//! single-quote handling and no metacharacter interpretation.

/// Program name plus arguments, as produced by [`tokenize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub program: String,
    pub args: Vec<String>,
}

/// Split `line` into tokens.
///
/// - Quotes glue to adjacent text: `a"b c"d` is the single token `ab cd`.
/// - An empty quoted pair (`""`) contributes no token of its own.
/// - An unterminated quote extends to the end of the string.
pub fn split_tokens(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in line.chars() {
        if ch == '"' {
            in_quotes = !in_quotes;
        } else if ch.is_whitespace() && !in_quotes {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else {
            current.push(ch);
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

/// Split `line` into a program and its arguments.
///
/// Returns `None` when the line contains no tokens at all; the runner turns
/// that into an "empty command" failure.
pub fn tokenize(line: &str) -> Option<ParsedCommand> {
    let mut tokens = split_tokens(line).into_iter();
    let program = tokens.next()?;
    Some(ParsedCommand {
        program,
        args: tokens.collect(),
    })
}
