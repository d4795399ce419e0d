//! Choosing groups and the "Manage groups" menu.

use crate::menu::{Menu, MenuError};
use crate::selector::{group_descriptions, line_index};
use anyhow::Result;
use keepmenu_core::{DatabaseSession, Group};

const CREATE: &str = "Create";
const MOVE: &str = "Move";
const RENAME: &str = "Rename";
const DELETE: &str = "Delete";

/// Let the user pick a group from the numbered group list.
pub fn select_group(session: &DatabaseSession, menu: &dyn Menu, prompt: &str) -> Result<Option<Group>> {
    let groups = session.groups();
    let Some(choice) = menu.select(prompt, &group_descriptions(&groups))? else {
        return Ok(None);
    };
    Ok(line_index(&choice).and_then(|idx| groups.into_iter().nth(idx)))
}

/// Create, move, rename or delete groups until the user leaves the menu.
///
/// Every change is saved immediately. Failed operations are reported and
/// leave the database as it was on disk.
pub fn manage_groups(session: &mut DatabaseSession, menu: &dyn Menu) -> Result<()> {
    loop {
        let mut items: Vec<String> = [CREATE, MOVE, RENAME, DELETE]
            .iter()
            .map(|s| s.to_string())
            .collect();
        items.push(String::new());
        items.extend(session.groups().into_iter().map(|g| g.path));

        let result = match menu.select("Groups", &items)?.as_deref() {
            Some(CREATE) => create_group(session, menu),
            Some(MOVE) => move_group(session, menu),
            Some(RENAME) => rename_group(session, menu),
            Some(DELETE) => delete_group(session, menu),
            _ => return Ok(()),
        };

        if let Err(err) = result {
            if err.downcast_ref::<MenuError>().is_some() {
                return Err(err);
            }
            tracing::warn!("Group operation failed: {:#}", err);
            menu.error(&format!("{err}"));
            session.reload()?;
        }
    }
}

fn create_group(session: &mut DatabaseSession, menu: &dyn Menu) -> Result<()> {
    let Some(parent) = select_group(session, menu, "Select parent group")? else {
        return Ok(());
    };
    let Some(name) = menu.input("Group name", "")? else {
        return Ok(());
    };
    session.add_group(&parent.uuid, &name)?;
    session.save()?;
    tracing::info!("Created group {}{}", parent.path, name);
    Ok(())
}

fn move_group(session: &mut DatabaseSession, menu: &dyn Menu) -> Result<()> {
    let Some(group) = select_group(session, menu, "Select group to move")? else {
        return Ok(());
    };
    let Some(dest) = select_group(session, menu, "Select destination group")? else {
        return Ok(());
    };
    session.move_group(&group.uuid, &dest.uuid)?;
    session.save()
}

fn rename_group(session: &mut DatabaseSession, menu: &dyn Menu) -> Result<()> {
    let Some(group) = select_group(session, menu, "Select group to rename")? else {
        return Ok(());
    };
    let Some(name) = menu.input("New group name", &group.name)? else {
        return Ok(());
    };
    session.rename_group(&group.uuid, &name)?;
    session.save()
}

fn delete_group(session: &mut DatabaseSession, menu: &dyn Menu) -> Result<()> {
    let Some(group) = select_group(session, menu, "Delete Group:")? else {
        return Ok(());
    };
    if !menu.confirm_delete()? {
        return Ok(());
    }
    session.delete_group(&group.uuid)?;
    session.save()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::menu::CONFIRM_DELETE;
    use crate::testing::ScriptedMenu;
    use keepmenu_core::sample::{create_sample_database, SAMPLE_PASSWORD};
    use keepmenu_core::DatabaseSource;
    use tempfile::TempDir;

    // Groups of the sample database, in list order:
    // 0 - /, 1 - Personal/, 2 - Personal/Finance/, 3 - Work/, 4 - Hidden/
    fn open_sample() -> (TempDir, DatabaseSession) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.kdbx");
        create_sample_database(&path, SAMPLE_PASSWORD).unwrap();
        let session = DatabaseSession::open(DatabaseSource {
            path,
            keyfile: None,
            password: SAMPLE_PASSWORD.to_string(),
        })
        .unwrap();
        (dir, session)
    }

    fn paths(session: &DatabaseSession) -> Vec<String> {
        session.groups().into_iter().map(|g| g.path).collect()
    }

    #[test]
    fn test_menu_lists_operations_then_groups() {
        let (_dir, mut session) = open_sample();
        let menu = ScriptedMenu::new([]);
        manage_groups(&mut session, &menu).unwrap();

        let (prompt, items) = &menu.calls()[0];
        assert_eq!(prompt, "Groups");
        assert_eq!(&items[..6], ["Create", "Move", "Rename", "Delete", "", "/"]);
    }

    #[test]
    fn test_broken_menu_ends_group_management() {
        let (_dir, mut session) = open_sample();
        let menu = ScriptedMenu::answering(&["Create"]);
        menu.fail_when_exhausted(MenuError::Stderr("no display".to_string()));

        let err = manage_groups(&mut session, &menu).unwrap_err();
        assert!(err.downcast_ref::<MenuError>().is_some());
        assert!(menu.errors().is_empty());
        assert_eq!(menu.calls().len(), 2);
    }

    #[test]
    fn test_create_group_is_saved() {
        let (_dir, mut session) = open_sample();
        let menu = ScriptedMenu::answering(&[CREATE, "3 - Work/", "Servers"]);
        manage_groups(&mut session, &menu).unwrap();

        session.reload().unwrap();
        assert!(paths(&session).contains(&"Work/Servers/".to_string()));
    }

    #[test]
    fn test_rename_and_move_group() {
        let (_dir, mut session) = open_sample();
        let menu = ScriptedMenu::answering(&[
            RENAME,
            "4 - Hidden/",
            "Archive",
            MOVE,
            "4 - Archive/",
            "1 - Personal/",
        ]);
        manage_groups(&mut session, &menu).unwrap();

        assert_eq!(menu.calls()[2].1, ["Hidden"]);
        assert!(paths(&session).contains(&"Personal/Archive/".to_string()));
        let secret = session.entries().into_iter().find(|e| e.title == "Secret").unwrap();
        assert_eq!(secret.path, "Personal/Archive/Secret");
    }

    #[test]
    fn test_move_into_descendant_is_reported() {
        let (_dir, mut session) = open_sample();
        let menu = ScriptedMenu::answering(&[MOVE, "1 - Personal/", "2 - Personal/Finance/"]);
        manage_groups(&mut session, &menu).unwrap();

        assert_eq!(menu.errors().len(), 1);
        assert!(paths(&session).contains(&"Personal/Finance/".to_string()));
    }

    #[test]
    fn test_delete_needs_confirmation() {
        let (_dir, mut session) = open_sample();
        let menu = ScriptedMenu::answering(&[DELETE, "3 - Work/", "NO"]);
        manage_groups(&mut session, &menu).unwrap();
        assert!(paths(&session).contains(&"Work/".to_string()));

        let menu = ScriptedMenu::answering(&[DELETE, "3 - Work/", CONFIRM_DELETE]);
        manage_groups(&mut session, &menu).unwrap();
        assert!(!paths(&session).contains(&"Work/".to_string()));
        assert!(session.entries().iter().all(|e| e.title != "VPN"));
    }

    #[test]
    fn test_root_cannot_be_deleted() {
        let (_dir, mut session) = open_sample();
        let menu = ScriptedMenu::answering(&[DELETE, "0 - /", CONFIRM_DELETE]);
        manage_groups(&mut session, &menu).unwrap();
        assert_eq!(menu.errors(), ["The root group cannot be changed"]);
        assert_eq!(paths(&session).len(), 5);
    }
}
