//! The menu session controller.
//!
//! Runs one interactive cycle per request: an optional action menu, an
//! entry list and the chosen handler. It owns the database session and is
//! only ever driven from a single thread.

use crate::config::Config;
use crate::daemon::{DaemonState, Worker};
use crate::edit::{self, EditContext};
use crate::groups;
use crate::menu::{Menu, MenuError};
use crate::selector::EntrySelector;
use crate::view;
use anyhow::Result;
use keepmenu_core::autotype::{self, TypeBackend};
use keepmenu_core::{DatabaseSession, Entry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What an invocation asks for. `None` opens the action menu.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultAction {
    TypePassword,
    TypeUsername,
    TypeEntry,
    ViewEntry,
    #[default]
    None,
}

/// Entries of the action menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    TypePassword,
    TypeUsername,
    TypeEntry,
    ViewEntry,
    Edit,
    Add,
    ManageGroups,
    ReloadDb,
    KillDaemon,
}

impl MenuAction {
    pub const ALL: [MenuAction; 9] = [
        MenuAction::TypePassword,
        MenuAction::TypeUsername,
        MenuAction::TypeEntry,
        MenuAction::ViewEntry,
        MenuAction::Edit,
        MenuAction::Add,
        MenuAction::ManageGroups,
        MenuAction::ReloadDb,
        MenuAction::KillDaemon,
    ];

    pub fn description(&self) -> &'static str {
        match self {
            MenuAction::TypePassword => "Type password",
            MenuAction::TypeUsername => "Type username",
            MenuAction::TypeEntry => "Select entry to autotype",
            MenuAction::ViewEntry => "View Individual entry",
            MenuAction::Edit => "Edit entries",
            MenuAction::Add => "Add entry",
            MenuAction::ManageGroups => "Manage groups",
            MenuAction::ReloadDb => "Reload database",
            MenuAction::KillDaemon => "Kill Keepmenu daemon",
        }
    }

    fn from_description(text: &str) -> Option<MenuAction> {
        Self::ALL.into_iter().find(|a| a.description() == text)
    }
}

impl From<DefaultAction> for Option<MenuAction> {
    fn from(action: DefaultAction) -> Self {
        match action {
            DefaultAction::TypePassword => Some(MenuAction::TypePassword),
            DefaultAction::TypeUsername => Some(MenuAction::TypeUsername),
            DefaultAction::TypeEntry => Some(MenuAction::TypeEntry),
            DefaultAction::ViewEntry => Some(MenuAction::ViewEntry),
            DefaultAction::None => None,
        }
    }
}

/// How a handler wants the cycle to continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Done,
    /// Go back to the action menu.
    Again,
}

/// Which single value to type for an entry.
#[derive(Debug, Clone, Copy)]
enum Field {
    Password,
    Username,
}

pub struct Controller {
    config: Arc<Config>,
    menu: Box<dyn Menu>,
    backend: Box<dyn TypeBackend>,
    session: DatabaseSession,
    state: Arc<DaemonState>,
    hidden_groups: Vec<String>,
}

impl Controller {
    pub fn new(
        config: Arc<Config>,
        menu: Box<dyn Menu>,
        backend: Box<dyn TypeBackend>,
        session: DatabaseSession,
        state: Arc<DaemonState>,
    ) -> Self {
        let hidden_groups = config.database.hidden_groups();
        Self {
            config,
            menu,
            backend,
            session,
            state,
            hidden_groups,
        }
    }

    /// Serve requests until the daemon is told to stop.
    pub fn run(mut self, worker: Worker) {
        worker.drive(|action| self.cycle(action));
        tracing::info!("Controller stopped, closing {}", self.session.path().display());
    }

    /// Handle one request. Errors are shown to the user, except menu
    /// failures which stop the daemon.
    pub fn cycle(&mut self, action: DefaultAction) {
        if let Err(err) = self.handle(action) {
            if err.downcast_ref::<MenuError>().is_some() {
                tracing::error!("Menu failed, stopping: {:#}", err);
                self.state.request_kill();
            } else {
                tracing::error!("{:#}", err);
                self.menu.error(&format!("{err:#}"));
            }
        }
    }

    fn handle(&mut self, action: DefaultAction) -> Result<()> {
        tracing::info!("Handling {:?}", action);
        let mut next: Option<MenuAction> = action.into();
        loop {
            let flow = match next {
                Some(action) => self.dispatch(action)?,
                None => self.action_select()?,
            };
            match flow {
                Flow::Done => return Ok(()),
                Flow::Again => next = None,
            }
        }
    }

    /// The combined menu: actions first, then the visible entries. An entry
    /// picked here is autotyped.
    fn action_select(&mut self) -> Result<Flow> {
        let entries = self.session.entries();
        let selector = EntrySelector::new(&entries, &self.hidden_groups);

        let mut items: Vec<String> = MenuAction::ALL
            .iter()
            .map(|a| a.description().to_string())
            .collect();
        items.extend(selector.descriptions(false));

        let Some(choice) = self.menu.select("Entries", &items)? else {
            return Ok(Flow::Done);
        };
        if let Some(action) = MenuAction::from_description(&choice) {
            return self.dispatch(action);
        }
        match selector.selected(&choice) {
            Some(entry) => {
                let entry = entry.clone();
                self.type_entry(&entry)?;
                Ok(Flow::Done)
            }
            None => Ok(Flow::Done),
        }
    }

    fn dispatch(&mut self, action: MenuAction) -> Result<Flow> {
        tracing::debug!("Dispatching {:?}", action);
        match action {
            MenuAction::TypePassword => self.type_field(Field::Password),
            MenuAction::TypeUsername => self.type_field(Field::Username),
            MenuAction::TypeEntry => self.autotype(),
            MenuAction::ViewEntry => self.view_entry(),
            MenuAction::Edit => self.edit_entry(),
            MenuAction::Add => self.add_entry(),
            MenuAction::ManageGroups => self.manage_groups(),
            MenuAction::ReloadDb => self.reload_db(),
            MenuAction::KillDaemon => self.kill_daemon(),
        }
    }

    /// Show the entry list and return the chosen entry.
    fn choose_entry(&self, include_hidden: bool) -> Result<Option<Entry>> {
        let entries = self.session.entries();
        let selector = EntrySelector::new(&entries, &self.hidden_groups);
        let items = selector.descriptions(include_hidden);
        let Some(choice) = self.menu.select("Entries", &items)? else {
            return Ok(None);
        };
        Ok(selector.selected(&choice).cloned())
    }

    fn type_field(&mut self, field: Field) -> Result<Flow> {
        let Some(entry) = self.choose_entry(false)? else {
            return Ok(Flow::Again);
        };
        let text = match field {
            Field::Password => &entry.password,
            Field::Username => &entry.username,
        };
        self.type_text(text);
        Ok(Flow::Done)
    }

    fn autotype(&mut self) -> Result<Flow> {
        let Some(entry) = self.choose_entry(false)? else {
            return Ok(Flow::Again);
        };
        self.type_entry(&entry)?;
        Ok(Flow::Done)
    }

    fn type_entry(&mut self, entry: &Entry) -> Result<()> {
        let result = autotype::type_entry(
            entry,
            &self.config.database.autotype_default,
            self.backend.as_mut(),
        );
        if let Err(err) = result {
            tracing::warn!("Autotype of '{}' failed: {}", entry.title, err);
            self.menu.error(&err.to_string());
        }
        Ok(())
    }

    fn type_text(&mut self, text: &str) {
        if let Err(err) = autotype::type_text(text, self.backend.as_mut()) {
            tracing::warn!("Typing failed: {}", err);
            self.menu.error(&err.to_string());
        }
    }

    fn view_entry(&mut self) -> Result<Flow> {
        let Some(entry) = self.choose_entry(false)? else {
            return Ok(Flow::Again);
        };
        if let Some(text) = view::view_entry(&entry, self.menu.as_ref())? {
            self.type_text(&text);
        }
        Ok(Flow::Done)
    }

    fn edit_entry(&mut self) -> Result<Flow> {
        let Some(entry) = self.choose_entry(true)? else {
            return Ok(Flow::Again);
        };
        let mut ctx = EditContext {
            config: &self.config,
            menu: self.menu.as_ref(),
            backend: self.backend.as_mut(),
        };
        edit::edit_entry(&mut self.session, &entry.uuid, &mut ctx)?;
        Ok(Flow::Done)
    }

    fn add_entry(&mut self) -> Result<Flow> {
        let mut ctx = EditContext {
            config: &self.config,
            menu: self.menu.as_ref(),
            backend: self.backend.as_mut(),
        };
        edit::add_entry(&mut self.session, &mut ctx)?;
        Ok(Flow::Done)
    }

    fn manage_groups(&mut self) -> Result<Flow> {
        groups::manage_groups(&mut self.session, self.menu.as_ref())?;
        Ok(Flow::Done)
    }

    fn reload_db(&mut self) -> Result<Flow> {
        self.session.reload()?;
        tracing::info!("Reloaded {}", self.session.path().display());
        Ok(Flow::Again)
    }

    fn kill_daemon(&mut self) -> Result<Flow> {
        tracing::info!("Kill requested from the menu");
        self.state.request_kill();
        Ok(Flow::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingBackend, ScriptedMenu, Stroke};
    use keepmenu_core::sample::{create_sample_database, SAMPLE_PASSWORD};
    use keepmenu_core::DatabaseSource;
    use tempfile::TempDir;

    // Sample entries in list order: 0 Mail, 1 Bank, 2 VPN, 3 Secret (in Hidden/).
    const MAIL: &str = "0 - Personal/Mail - alice - https://mail.example.com";
    const BANK: &str = "1 - Personal/Finance/Bank - alice - https://bank.example.com";
    const VPN: &str = "2 - Work/VPN - bob - ";
    const SECRET: &str = "3 - Hidden/Secret - carol - ";

    struct Fixture {
        _dir: TempDir,
        controller: Controller,
        menu: ScriptedMenu,
        backend: RecordingBackend,
        state: Arc<DaemonState>,
    }

    fn fixture(answers: &[&str]) -> Fixture {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.kdbx");
        create_sample_database(&path, SAMPLE_PASSWORD).unwrap();
        let session = DatabaseSession::open(DatabaseSource {
            path,
            keyfile: None,
            password: SAMPLE_PASSWORD.to_string(),
        })
        .unwrap();

        let mut config = Config::default();
        config.database.hide_groups = "Hidden".to_string();
        let menu = ScriptedMenu::answering(answers);
        let backend = RecordingBackend::default();
        let state = Arc::new(DaemonState::default());
        let controller = Controller::new(
            Arc::new(config),
            Box::new(menu.clone()),
            Box::new(backend.clone()),
            session,
            state.clone(),
        );
        Fixture {
            _dir: dir,
            controller,
            menu,
            backend,
            state,
        }
    }

    fn text(s: &str) -> Stroke {
        Stroke::Text(s.to_string())
    }

    fn key(s: &str) -> Stroke {
        Stroke::Key(s.to_string())
    }

    #[test]
    fn test_action_menu_lists_actions_then_visible_entries() {
        let mut f = fixture(&[]);
        f.controller.cycle(DefaultAction::None);

        let (prompt, items) = &f.menu.calls()[0];
        assert_eq!(prompt, "Entries");
        assert_eq!(items[0], "Type password");
        assert_eq!(items[8], "Kill Keepmenu daemon");
        assert_eq!(&items[9..], [MAIL, BANK, VPN]);
    }

    #[test]
    fn test_entry_from_action_menu_is_autotyped() {
        let mut f = fixture(&[VPN]);
        f.controller.cycle(DefaultAction::None);
        assert_eq!(
            f.backend.strokes(),
            [
                text("bob"),
                key("{TAB}"),
                text("vpn-pass"),
                key("{TAB}"),
                key("{ENTER}"),
                key("{ENTER}"),
            ]
        );
    }

    #[test]
    fn test_explicit_action_skips_action_menu() {
        let mut f = fixture(&[MAIL]);
        f.controller.cycle(DefaultAction::TypePassword);
        assert_eq!(f.menu.calls()[0].1, [MAIL, BANK, VPN]);
        assert_eq!(f.backend.strokes(), [text("m41l-pass")]);

        let mut f = fixture(&[BANK]);
        f.controller.cycle(DefaultAction::TypeUsername);
        assert_eq!(f.backend.strokes(), [text("alice")]);
    }

    #[test]
    fn test_escaping_entry_list_returns_to_action_menu() {
        let mut f = fixture(&["Type password", "", ""]);
        f.controller.cycle(DefaultAction::None);
        assert_eq!(f.menu.calls().len(), 3);
        assert!(f.backend.strokes().is_empty());
    }

    #[test]
    fn test_disabled_autotype_is_reported() {
        let mut f = fixture(&[BANK]);
        f.controller.cycle(DefaultAction::TypeEntry);
        assert!(f.backend.strokes().is_empty());
        assert_eq!(f.menu.errors(), ["Autotype disabled for this entry"]);
    }

    #[test]
    fn test_edit_lists_hidden_entries() {
        let mut f = fixture(&["Edit entries", SECRET, "Username: carol", "caroline"]);
        f.controller.cycle(DefaultAction::None);

        assert_eq!(f.menu.calls()[1].1, [MAIL, BANK, VPN, SECRET]);
        let secret = f.controller.session.entries().into_iter().find(|e| e.title == "Secret");
        assert_eq!(secret.unwrap().username, "caroline");
    }

    #[test]
    fn test_view_entry_types_chosen_field() {
        let mut f = fixture(&[MAIL, "**********"]);
        f.controller.cycle(DefaultAction::ViewEntry);
        assert_eq!(f.backend.strokes(), [text("m41l-pass")]);
    }

    #[test]
    fn test_reload_goes_back_to_action_menu() {
        let mut f = fixture(&["Reload database", ""]);
        f.controller.cycle(DefaultAction::None);
        assert_eq!(f.menu.prompts(), ["Entries", "Entries"]);
    }

    #[test]
    fn test_kill_daemon_sets_flag() {
        let mut f = fixture(&["Kill Keepmenu daemon"]);
        f.controller.cycle(DefaultAction::None);
        assert!(f.state.kill_requested());
    }

    #[test]
    fn test_unknown_selection_does_nothing() {
        let mut f = fixture(&["something typed"]);
        f.controller.cycle(DefaultAction::None);
        assert!(f.backend.strokes().is_empty());
        assert!(f.menu.errors().is_empty());
        assert_eq!(f.menu.remaining(), 0);
    }

    #[test]
    fn test_default_action_wire_names() {
        assert_eq!(
            serde_json::to_string(&DefaultAction::TypePassword).unwrap(),
            "\"type_password\""
        );
        assert_eq!(
            serde_json::from_str::<DefaultAction>("\"none\"").unwrap(),
            DefaultAction::None
        );
    }
}
