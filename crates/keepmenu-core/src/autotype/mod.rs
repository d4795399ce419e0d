//! Autotype: replay an entry's template as keystrokes.
//!
//! A template such as `{USERNAME}{TAB}{PASSWORD}{ENTER}` is split by the
//! [`tokenizer`] and each special token is resolved, in order, as a delay, a
//! field placeholder, an escaped literal character or a key the active
//! [`TypeBackend`] can tap.

pub mod backend;
pub mod enigo;
pub mod tokenizer;
pub mod xdotool;
pub mod ydotool;

pub use backend::{BackendError, TypeBackend, TypeLibrary};
pub use tokenizer::{tokenize, Token, TokenizeError};

use crate::models::Entry;
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Template used when an entry has no sequence of its own.
pub const DEFAULT_SEQUENCE: &str = "{USERNAME}{TAB}{PASSWORD}{ENTER}";

/// Field of `entry` a placeholder token stands for.
fn placeholder<'a>(token: &str, entry: &'a Entry) -> Option<&'a str> {
    let field = match token {
        "{TITLE}" => &entry.title,
        "{USERNAME}" => &entry.username,
        "{URL}" => &entry.url,
        "{PASSWORD}" => &entry.password,
        "{NOTES}" => &entry.notes,
        _ => return None,
    };
    Some(field)
}

/// Escapes that type a single character which would otherwise be special.
const LITERAL_CHARS: [(&str, &str); 19] = [
    ("{PLUS}", "+"),
    ("{PERCENT}", "%"),
    ("{CARET}", "^"),
    ("{TILDE}", "~"),
    ("{LEFTPAREN}", "("),
    ("{RIGHTPAREN}", ")"),
    ("{LEFTBRACE}", "{"),
    ("{RIGHTBRACE}", "}"),
    ("{AT}", "@"),
    ("{+}", "+"),
    ("{%}", "%"),
    ("{^}", "^"),
    ("{~}", "~"),
    ("{(}", "("),
    ("{)}", ")"),
    ("{[}", "["),
    ("{]}", "]"),
    ("{{}", "{"),
    ("{}}", "}"),
];

#[derive(Error, Debug)]
pub enum AutotypeError {
    #[error("Autotype disabled for this entry")]
    Disabled,

    #[error(transparent)]
    Tokenize(#[from] TokenizeError),

    #[error("Unsupported auto-type token ({backend}): \"{token}\"")]
    Unsupported { token: String, backend: &'static str },

    #[error("Unable to type string ({backend}): {message}\nTry a different `type_library` in config.toml")]
    Typing {
        backend: &'static str,
        message: String,
    },
}

impl AutotypeError {
    fn typing(backend: &dyn TypeBackend, err: BackendError) -> Self {
        match err {
            BackendError::Unsupported(token) => AutotypeError::Unsupported {
                token,
                backend: backend.name(),
            },
            other => AutotypeError::Typing {
                backend: backend.name(),
                message: other.to_string(),
            },
        }
    }
}

/// What a special token resolves to.
#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Delay(Duration),
    Text(&'a str),
    Key(&'a str),
}

/// `{DELAY n}` with `n` in milliseconds.
fn parse_delay(token: &str) -> Option<Duration> {
    let millis = token.strip_prefix("{DELAY ")?.strip_suffix('}')?;
    if millis.is_empty() || !millis.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    millis.parse().ok().map(Duration::from_millis)
}

fn classify<'a>(
    token: &'a str,
    entry: &'a Entry,
    backend: &dyn TypeBackend,
) -> Result<Command<'a>, AutotypeError> {
    if let Some(delay) = parse_delay(token) {
        return Ok(Command::Delay(delay));
    }
    if let Some(field) = placeholder(token, entry) {
        return Ok(Command::Text(field));
    }
    if let Some(&(_, ch)) = LITERAL_CHARS.iter().find(|(name, _)| *name == token) {
        return Ok(Command::Text(ch));
    }
    if backend.is_supported(token) {
        return Ok(Command::Key(token));
    }
    Err(AutotypeError::Unsupported {
        token: token.to_string(),
        backend: backend.name(),
    })
}

/// The template that applies to `entry`.
pub fn effective_sequence<'a>(entry: &'a Entry, default_sequence: &'a str) -> &'a str {
    match entry.autotype_sequence.as_deref() {
        Some(sequence) if !sequence.is_empty() && sequence != "None" => sequence,
        _ => default_sequence,
    }
}

/// Autotype `entry` into the focused window.
///
/// Stops at the first error. Keystrokes sent before it are not undone.
pub fn type_entry(
    entry: &Entry,
    default_sequence: &str,
    backend: &mut dyn TypeBackend,
) -> Result<(), AutotypeError> {
    if !entry.autotype_allowed() {
        return Err(AutotypeError::Disabled);
    }

    let sequence = effective_sequence(entry, default_sequence);
    tracing::debug!("Autotyping '{}' with {}", entry.title, backend.name());

    // The first Enter is often swallowed by the target window, so it is sent twice.
    let mut first_enter = true;
    for token in tokenize(sequence) {
        match token? {
            Token::Literal(text) => {
                backend
                    .type_text(text)
                    .map_err(|e| AutotypeError::typing(backend, e))?;
            }
            special => {
                let raw = special.as_str();
                match classify(raw, entry, backend)? {
                    Command::Delay(delay) => thread::sleep(delay),
                    Command::Text("") => {}
                    Command::Text(text) => backend
                        .type_text(text)
                        .map_err(|e| AutotypeError::typing(backend, e))?,
                    Command::Key(key) => {
                        let taps = if first_enter && matches!(key, "{ENTER}" | "~") {
                            first_enter = false;
                            2
                        } else {
                            1
                        };
                        for _ in 0..taps {
                            backend
                                .tap_key(key)
                                .map_err(|e| AutotypeError::typing(backend, e))?;
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

/// Type a single value, e.g. a password or a field picked in the viewer.
pub fn type_text(text: &str, backend: &mut dyn TypeBackend) -> Result<(), AutotypeError> {
    backend
        .type_text(text)
        .map_err(|e| AutotypeError::typing(backend, e))
}
