//! Showing the fields of one entry.

use crate::menu::Menu;
use anyhow::Result;
use keepmenu_core::Entry;

const MASK: &str = "**********";
const NOTES_VIEW: &str = "Notes: <Enter to view>";

/// Which field a line of the viewer stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Line<'a> {
    Path,
    Username,
    Password,
    Url,
    Notes,
    Custom(&'a str),
    Empty,
}

fn lines(entry: &Entry) -> Vec<(String, Line<'_>)> {
    fn or_none(value: &str, label: &str, line: Line<'static>) -> (String, Line<'static>) {
        if value.is_empty() {
            (format!("{label}: None"), Line::Empty)
        } else {
            (value.to_string(), line)
        }
    }

    let mut lines = vec![
        or_none(&entry.path, "Title", Line::Path),
        or_none(&entry.username, "Username", Line::Username),
        if entry.password.is_empty() {
            ("Password: None".to_string(), Line::Empty)
        } else {
            (MASK.to_string(), Line::Password)
        },
        or_none(&entry.url, "URL", Line::Url),
        if entry.notes.is_empty() {
            ("Notes: None".to_string(), Line::Empty)
        } else {
            (NOTES_VIEW.to_string(), Line::Notes)
        },
    ];
    for (name, field) in &entry.custom_fields {
        let shown = if field.protected || name.starts_with('#') {
            MASK
        } else {
            field.value.as_str()
        };
        lines.push((format!("@({name}): {shown}"), Line::Custom(name)));
    }
    lines
}

/// Show `entry` and return the text to type for the chosen line, if any.
///
/// The password and masked custom fields resolve to their real values. The
/// URL line opens a browser instead, and the notes line shows the notes one
/// line at a time. Text typed into the menu is returned as is.
pub fn view_entry(entry: &Entry, menu: &dyn Menu) -> Result<Option<String>> {
    let lines = lines(entry);
    let items: Vec<String> = lines.iter().map(|(text, _)| text.clone()).collect();

    let Some(choice) = menu.select("Entries", &items)? else {
        return Ok(None);
    };
    let line = lines
        .iter()
        .find(|(text, _)| *text == choice)
        .map(|(_, line)| *line);

    let text = match line {
        Some(Line::Path) => Some(entry.path.clone()),
        Some(Line::Username) => Some(entry.username.clone()),
        Some(Line::Password) => Some(entry.password.clone()),
        Some(Line::Url) => {
            if let Err(err) = webbrowser::open(&entry.url) {
                tracing::warn!("Could not open {}: {}", entry.url, err);
            }
            None
        }
        Some(Line::Notes) => view_notes(&entry.notes, menu)?,
        Some(Line::Custom(name)) => entry.custom_fields.get(name).map(|f| f.value.clone()),
        Some(Line::Empty) => None,
        None => Some(choice),
    };
    Ok(text)
}

/// Show notes line by line and return the chosen line.
pub fn view_notes(notes: &str, menu: &dyn Menu) -> Result<Option<String>> {
    let items: Vec<String> = notes.split('\n').map(str::to_string).collect();
    Ok(menu.select("Notes", &items)?)
}
