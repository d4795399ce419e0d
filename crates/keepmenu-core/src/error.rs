//! Errors raised while unlocking a database.

use std::path::PathBuf;
use thiserror::Error;

/// Why a database could not be opened. Each variant maps to its own
/// message in the menu error display.
#[derive(Error, Debug)]
pub enum OpenError {
    #[error("Database does not exist: {}", .0.display())]
    DatabaseNotFound(PathBuf),

    #[error("Keyfile does not exist: {}", .0.display())]
    KeyfileNotFound(PathBuf),

    /// Checksum mismatch while decrypting: wrong passphrase or keyfile.
    #[error("Invalid Password or keyfile")]
    InvalidKey,

    /// Corrupt file or any other failure reported by the keepass library.
    #[error("Error: {0}")]
    Other(String),
}
