//! Editing notes in an external editor.

use crate::config::DatabaseSection;
use anyhow::{bail, Context, Result};
use std::io::Write;
use std::process::Command;

/// Command line used to edit a file, without the file name.
///
/// `gui_editor` is run as is. Otherwise `editor` (falling back to `$EDITOR`,
/// then `vim`) is started inside `terminal -e` (falling back to `xterm`).
pub fn editor_command(database: &DatabaseSection, env_editor: Option<String>) -> Result<Vec<String>> {
    if let Some(gui) = database.gui_editor.as_deref().filter(|s| !s.is_empty()) {
        return split("gui_editor", gui);
    }

    let editor = database
        .editor
        .clone()
        .filter(|s| !s.is_empty())
        .or(env_editor.filter(|s| !s.is_empty()))
        .unwrap_or_else(|| "vim".to_string());
    let terminal = database
        .terminal
        .as_deref()
        .filter(|s| !s.is_empty())
        .unwrap_or("xterm");

    let mut argv = split("terminal", terminal)?;
    argv.push("-e".to_string());
    argv.extend(split("editor", &editor)?);
    Ok(argv)
}

fn split(key: &str, value: &str) -> Result<Vec<String>> {
    match shlex::split(value) {
        Some(argv) if !argv.is_empty() => Ok(argv),
        _ => bail!("Invalid {} command: {}", key, value),
    }
}

/// Let the user edit `notes` and return the new text.
pub fn edit_notes(database: &DatabaseSection, notes: &str) -> Result<String> {
    let argv = editor_command(database, std::env::var("EDITOR").ok())?;

    let mut file = tempfile::Builder::new()
        .suffix(".tmp")
        .tempfile()
        .context("Failed to create temporary notes file")?;
    file.write_all(notes.as_bytes())?;
    file.flush()?;

    tracing::debug!("Editing notes with {}", argv[0]);
    let status = Command::new(&argv[0])
        .args(&argv[1..])
        .arg(file.path())
        .status()
        .with_context(|| format!("Failed to run editor: {}", argv[0]))?;
    if !status.success() {
        tracing::warn!("Editor exited with {}", status);
    }

    let edited = std::fs::read_to_string(file.path())
        .with_context(|| format!("Failed to read {}", file.path().display()))?;
    Ok(edited)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_editor_fallbacks() {
        let mut database = DatabaseSection::default();
        assert_eq!(
            editor_command(&database, None).unwrap(),
            ["xterm", "-e", "vim"]
        );
        assert_eq!(
            editor_command(&database, Some("emacs -nw".to_string())).unwrap(),
            ["xterm", "-e", "emacs", "-nw"]
        );

        database.editor = Some("nano".to_string());
        database.terminal = Some("alacritty --class notes".to_string());
        assert_eq!(
            editor_command(&database, Some("emacs".to_string())).unwrap(),
            ["alacritty", "--class", "notes", "-e", "nano"]
        );
    }

    #[test]
    fn test_gui_editor_runs_directly() {
        let database = DatabaseSection {
            gui_editor: Some("gvim -f".to_string()),
            terminal: Some("urxvt".to_string()),
            ..Default::default()
        };
        assert_eq!(editor_command(&database, None).unwrap(), ["gvim", "-f"]);
    }

    #[test]
    fn test_edit_notes_reads_back_file() {
        // A "GUI editor" that appends a line to the file it is given.
        let database = DatabaseSection {
            gui_editor: Some("sh -c 'echo added >> \"$0\"'".to_string()),
            ..Default::default()
        };
        let notes = edit_notes(&database, "first\n").unwrap();
        assert_eq!(notes, "first\nadded\n");
    }
}
