//! Editing and adding entries.

use crate::config::Config;
use crate::editor;
use crate::groups::select_group;
use crate::menu::Menu;
use anyhow::{Context, Result};
use keepmenu_core::autotype::{self, TypeBackend};
use keepmenu_core::password::{self, DEFAULT_LENGTH};
use keepmenu_core::{DatabaseSession, Entry};

const GENERATE: &str = "Generate password";
const MANUAL: &str = "Manually enter password";
const TYPE_EXISTING: &str = "Type existing password";
const MISMATCH: &str = "Passwords do not match. No changes made.";

/// Everything editing needs besides the database.
pub struct EditContext<'a> {
    pub config: &'a Config,
    pub menu: &'a dyn Menu,
    pub backend: &'a mut dyn TypeBackend,
}

/// Result of one pass through the field menu.
#[derive(Debug, PartialEq, Eq)]
enum Step {
    Continue,
    Done,
    Deleted,
}

fn field_lines(entry: &Entry) -> Vec<String> {
    let path = if entry.group_path.is_empty() {
        "/"
    } else {
        entry.group_path.as_str()
    };
    vec![
        format!("Title: {}", entry.title),
        format!("Path: {}", path),
        format!("Username: {}", entry.username),
        if entry.password.is_empty() {
            "Password: None".to_string()
        } else {
            "Password: **********".to_string()
        },
        format!("Url: {}", entry.url),
        format!(
            "Autotype Sequence: {}",
            entry.autotype_sequence.as_deref().unwrap_or("None")
        ),
        format!(
            "Autotype Enabled: {}",
            if entry.autotype_allowed() { "True" } else { "False" }
        ),
        if entry.notes.is_empty() {
            "Notes: None".to_string()
        } else {
            "Notes: <Enter to Edit>".to_string()
        },
        "Delete Entry: ".to_string(),
    ]
}

/// Edit the entry with `uuid` until the user leaves the field menu, then save.
///
/// Returns `false` if the entry was deleted.
pub fn edit_entry(session: &mut DatabaseSession, uuid: &str, ctx: &mut EditContext<'_>) -> Result<bool> {
    loop {
        match edit_once(session, uuid, ctx)? {
            Step::Continue => {}
            Step::Done => break,
            Step::Deleted => return Ok(false),
        }
    }
    session.save()?;
    Ok(true)
}

fn edit_once(session: &mut DatabaseSession, uuid: &str, ctx: &mut EditContext<'_>) -> Result<Step> {
    let mut entry = session
        .find_entry(uuid)
        .with_context(|| format!("Entry with UUID {} not found", uuid))?;
    let menu = ctx.menu;

    let Some(choice) = menu.select("Entries", &field_lines(&entry))? else {
        return Ok(Step::Done);
    };
    let Some((field, current)) = choice.split_once(':') else {
        return Ok(Step::Done);
    };
    let current = current.strip_prefix(' ').unwrap_or(current);

    match field {
        "Title" => {
            if let Some(title) = menu.input("Title", current)? {
                entry.title = title;
            }
        }
        "Username" => {
            if let Some(username) = menu.input("Username", current)? {
                entry.username = username;
            }
        }
        "Url" => {
            if let Some(url) = menu.input("Url", current)? {
                entry.url = url;
            }
        }
        "Autotype Sequence" => {
            if let Some(sequence) = menu.input("Autotype Sequence", current)? {
                entry.autotype_sequence = Some(sequence);
                entry.autotype_enabled.get_or_insert(true);
            }
        }
        "Autotype Enabled" => {
            let items = ["True".to_string(), "False".to_string()];
            match menu.select("Autotype Enabled? True/False", &items)? {
                Some(choice) => entry.autotype_enabled = Some(choice != "False"),
                None => return Ok(Step::Continue),
            }
        }
        "Password" => match edit_password(&entry, ctx)? {
            Some(password) => entry.password = password,
            None => return Ok(Step::Continue),
        },
        "Notes" => {
            entry.notes = editor::edit_notes(&ctx.config.database, &entry.notes)?;
        }
        "Path" => {
            if let Some(group) = select_group(session, menu, "Groups")? {
                session.move_entry(uuid, &group.uuid)?;
            }
            return Ok(Step::Continue);
        }
        "Delete Entry" => {
            if !menu.confirm_delete()? {
                return Ok(Step::Continue);
            }
            session.delete_entry(uuid)?;
            session.save()?;
            tracing::info!("Deleted entry {}", entry.path);
            return Ok(Step::Deleted);
        }
        _ => return Ok(Step::Done),
    }

    session.update_entry(&entry)?;
    Ok(Step::Continue)
}

/// Ask for a new password. `None` leaves the password unchanged.
fn edit_password(entry: &Entry, ctx: &mut EditContext<'_>) -> Result<Option<String>> {
    let menu = ctx.menu;
    let items = [GENERATE, MANUAL, TYPE_EXISTING].map(String::from);
    let candidate = match menu.select("Password", &items)?.as_deref() {
        Some(GENERATE) => match generate_password(ctx.config, menu)? {
            Some(generated) => generated,
            None => return Ok(None),
        },
        Some(MANUAL) => String::new(),
        Some(TYPE_EXISTING) => {
            if let Err(err) = autotype::type_text(&entry.password, ctx.backend) {
                menu.error(&err.to_string());
            }
            return Ok(None);
        }
        _ => return Ok(None),
    };

    let Some(password) = menu.input("Password", &candidate)? else {
        return Ok(None);
    };
    let confirmed = menu.input("Confirm password", &candidate)?;
    if confirmed.as_deref() != Some(password.as_str()) {
        menu.error(MISMATCH);
        return Ok(None);
    }
    Ok(Some(password))
}

/// Ask for a length and character classes and generate a password.
fn generate_password(config: &Config, menu: &dyn Menu) -> Result<Option<String>> {
    let Some(length) = menu.input("Password Length?", &DEFAULT_LENGTH.to_string())? else {
        return Ok(None);
    };
    let length = length.trim().parse().unwrap_or(DEFAULT_LENGTH);

    let mut items: Vec<String> = config.password_char_presets.keys().cloned().collect();
    items.extend(config.password_chars.keys().cloned());
    let Some(choice) = menu.select("Password characters", &items)? else {
        return Ok(None);
    };
    let Some(classes) = config.password_classes(&choice) else {
        menu.error(&format!("Unknown character set: {choice}"));
        return Ok(None);
    };

    match password::generate(length, &classes) {
        Ok(password) => Ok(Some(password)),
        Err(err) => {
            menu.error(&err.to_string());
            Ok(None)
        }
    }
}

/// Create an entry in a chosen group and open it in the editor.
pub fn add_entry(session: &mut DatabaseSession, ctx: &mut EditContext<'_>) -> Result<()> {
    let Some(group) = select_group(session, ctx.menu, "Groups")? else {
        return Ok(());
    };
    let uuid = session.add_entry(&group.uuid)?;
    tracing::info!("Adding entry to {}", group.path);
    edit_entry(session, &uuid, ctx)?;
    Ok(())
}
