//! Keystroke backends shared interface and selection.

use super::enigo::EnigoBackend;
use super::xdotool::XdotoolBackend;
use super::ydotool::YdotoolBackend;
use serde::{Deserialize, Serialize};
use std::process::Command;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("token {0} is not supported")]
    Unsupported(String),

    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}")]
    Failed {
        tool: &'static str,
        status: std::process::ExitStatus,
    },

    #[error("{0}")]
    Input(String),
}

/// Something that can type text and tap named keys in the focused window.
pub trait TypeBackend {
    /// Short name used in error messages.
    fn name(&self) -> &'static str;

    /// Type `text` verbatim.
    fn type_text(&mut self, text: &str) -> Result<(), BackendError>;

    /// Tap the key named by an autotype token such as `{TAB}` or `+`.
    fn tap_key(&mut self, token: &str) -> Result<(), BackendError>;

    /// Whether [`TypeBackend::tap_key`] knows `token`.
    fn is_supported(&self, token: &str) -> bool;
}

/// What a key token turns into for the external tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolAction {
    /// `<tool> key <name>`
    Key(&'static str),
    /// `<tool> type -- <text>`
    Type(&'static str),
}

impl ToolAction {
    pub(crate) fn args(&self) -> Vec<&'static str> {
        match *self {
            ToolAction::Key(name) => vec!["key", name],
            ToolAction::Type(text) => type_args(text).to_vec(),
        }
    }
}

/// Arguments for typing `text` literally, even when it starts with `-`.
pub(crate) fn type_args(text: &str) -> [&str; 3] {
    ["type", "--", text]
}

/// Run an external typing tool once.
pub(crate) fn run_tool(tool: &'static str, args: &[&str]) -> Result<(), BackendError> {
    tracing::debug!("Running {} {}", tool, args.first().copied().unwrap_or_default());
    let status = Command::new(tool)
        .args(args)
        .status()
        .map_err(|source| BackendError::Spawn { tool, source })?;
    if status.success() {
        Ok(())
    } else {
        Err(BackendError::Failed { tool, status })
    }
}

/// Which keystroke backend to use, from `type_library` in the config.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeLibrary {
    /// In-process key injection.
    #[default]
    #[serde(alias = "default")]
    Enigo,
    Xdotool,
    Ydotool,
}

impl TypeLibrary {
    /// External program this library shells out to, if any.
    pub fn program(&self) -> Option<&'static str> {
        match self {
            TypeLibrary::Enigo => None,
            TypeLibrary::Xdotool => Some("xdotool"),
            TypeLibrary::Ydotool => Some("ydotool"),
        }
    }

    /// Construct the backend.
    pub fn backend(&self) -> Box<dyn TypeBackend> {
        match self {
            TypeLibrary::Enigo => Box::new(EnigoBackend::new()),
            TypeLibrary::Xdotool => Box::new(XdotoolBackend),
            TypeLibrary::Ydotool => Box::new(YdotoolBackend),
        }
    }
}
