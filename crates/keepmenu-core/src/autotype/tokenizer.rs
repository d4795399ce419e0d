//! Splits an autotype sequence into literal text and special tokens.

use thiserror::Error;

/// Characters that act as modifier/enter keys on their own.
pub const OPERATORS: [char; 5] = ['+', '^', '%', '~', '@'];

/// One piece of an autotype sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    /// Text typed verbatim.
    Literal(&'a str),
    /// One of `+^%~@`.
    Operator(char),
    /// A braced directive including its braces, e.g. `{TAB}` or `{DELAY 500}`.
    Directive(&'a str),
}

impl<'a> Token<'a> {
    pub fn is_special(&self) -> bool {
        !matches!(self, Token::Literal(_))
    }

    /// The raw text of the token as it appeared in the sequence.
    pub fn as_str(&self) -> &'a str {
        match *self {
            Token::Literal(text) | Token::Directive(text) => text,
            Token::Operator('+') => "+",
            Token::Operator('^') => "^",
            Token::Operator('%') => "%",
            Token::Operator('~') => "~",
            Token::Operator(_) => "@",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unable to find matching right brace (}}) while tokenizing auto-type string: {remainder}")]
pub struct TokenizeError {
    /// Unconsumed input starting at the unmatched `{`.
    pub remainder: String,
}

/// Lazy single-pass tokenizer. After yielding an error it yields nothing more.
pub struct Tokenizer<'a> {
    rest: &'a str,
    failed: bool,
}

/// Tokenize an autotype sequence.
pub fn tokenize(sequence: &str) -> Tokenizer<'_> {
    Tokenizer {
        rest: sequence,
        failed: false,
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Result<Token<'a>, TokenizeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.rest.is_empty() {
            return None;
        }

        let rest = self.rest;
        let Some(start) = rest.find(|c: char| c == '{' || OPERATORS.contains(&c)) else {
            self.rest = "";
            return Some(Ok(Token::Literal(rest)));
        };

        if start > 0 {
            self.rest = &rest[start..];
            return Some(Ok(Token::Literal(&rest[..start])));
        }

        let first = rest.chars().next()?;
        if first != '{' {
            self.rest = &rest[first.len_utf8()..];
            return Some(Ok(Token::Operator(first)));
        }

        // `{}}` is the escaped closing brace.
        if rest.starts_with("{}}") {
            self.rest = &rest[3..];
            return Some(Ok(Token::Directive(&rest[..3])));
        }

        match rest.find('}') {
            Some(end) => {
                self.rest = &rest[end + 1..];
                Some(Ok(Token::Directive(&rest[..=end])))
            }
            None => {
                self.failed = true;
                self.rest = "";
                Some(Err(TokenizeError {
                    remainder: rest.to_string(),
                }))
            }
        }
    }
}
