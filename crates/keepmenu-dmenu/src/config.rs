//! Configuration file handling.
//!
//! Reads from `~/.config/keepmenu/config.toml`. The sections mirror the
//! classic keepmenu `config.ini` layout: `[dmenu]`, `[dmenu_passphrase]`,
//! `[database]`, `[password_chars]` and `[password_char_presets]`.

use anyhow::{bail, Context, Result};
use keepmenu_core::autotype::{TypeLibrary, DEFAULT_SEQUENCE};
use keepmenu_core::password::{DIGITS, LOWER, PUNCTUATION, UPPER};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub dmenu: DmenuSection,
    #[serde(default)]
    pub dmenu_passphrase: PassphraseSection,
    #[serde(default)]
    pub database: DatabaseSection,
    /// Named character classes for the password generator.
    #[serde(default = "default_password_chars")]
    pub password_chars: BTreeMap<String, String>,
    /// Named sets of classes, values are space separated class names.
    #[serde(default = "default_password_char_presets")]
    pub password_char_presets: BTreeMap<String, String>,
    /// File this config was read from and is written back to.
    #[serde(skip)]
    path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DmenuSection {
    #[serde(default = "default_dmenu_command")]
    pub dmenu_command: String,
    /// Program speaking the Assuan protocol used instead of a passphrase menu.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinentry: Option<String>,
    /// Upper bound on the number of menu lines.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l: Option<usize>,
    /// Everything else is handed to the menu as `-key value`.
    #[serde(flatten)]
    pub extra: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassphraseSection {
    /// Pass `-password` to rofi so the passphrase is not echoed.
    #[serde(default = "default_true")]
    pub rofi_obscure: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSection {
    #[serde(default = "default_pw_cache_period_min")]
    pub pw_cache_period_min: u64,
    #[serde(default = "default_autotype")]
    pub autotype_default: String,
    #[serde(default)]
    pub type_library: TypeLibrary,
    /// Comma separated group names left out of entry lists.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hide_groups: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gui_editor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal: Option<String>,
    /// `database_N`, `keyfile_N`, `password_N` and `password_cmd_N`.
    #[serde(flatten)]
    pub indexed: BTreeMap<String, String>,
}

/// One configured database, assembled from the `*_N` keys sharing an index.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseEntry {
    pub index: String,
    pub path: PathBuf,
    pub keyfile: Option<PathBuf>,
    pub password: Option<String>,
    pub password_cmd: Option<String>,
}

impl std::fmt::Debug for DatabaseEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseEntry")
            .field("index", &self.index)
            .field("path", &self.path)
            .field("keyfile", &self.keyfile)
            .field("password_cmd", &self.password_cmd)
            .finish_non_exhaustive()
    }
}

fn default_dmenu_command() -> String {
    "dmenu".to_string()
}

fn default_true() -> bool {
    true
}

fn default_pw_cache_period_min() -> u64 {
    360
}

fn default_autotype() -> String {
    DEFAULT_SEQUENCE.to_string()
}

fn default_password_chars() -> BTreeMap<String, String> {
    [
        ("upper", UPPER),
        ("lower", LOWER),
        ("digits", DIGITS),
        ("punctuation", PUNCTUATION),
    ]
    .into_iter()
    .map(|(name, chars)| (name.to_string(), chars.to_string()))
    .collect()
}

fn default_password_char_presets() -> BTreeMap<String, String> {
    [
        ("Letters+Digits+Punctuation", "upper lower digits punctuation"),
        ("Letters+Digits", "upper lower digits"),
        ("Letters", "upper lower"),
        ("Digits", "digits"),
    ]
    .into_iter()
    .map(|(name, classes)| (name.to_string(), classes.to_string()))
    .collect()
}

impl Default for DmenuSection {
    fn default() -> Self {
        Self {
            dmenu_command: default_dmenu_command(),
            pinentry: None,
            l: None,
            extra: BTreeMap::new(),
        }
    }
}

impl Default for PassphraseSection {
    fn default() -> Self {
        Self {
            rofi_obscure: true,
            extra: BTreeMap::new(),
        }
    }
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            pw_cache_period_min: default_pw_cache_period_min(),
            autotype_default: default_autotype(),
            type_library: TypeLibrary::default(),
            hide_groups: String::new(),
            gui_editor: None,
            editor: None,
            terminal: None,
            indexed: BTreeMap::new(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dmenu: DmenuSection::default(),
            dmenu_passphrase: PassphraseSection::default(),
            database: DatabaseSection::default(),
            password_chars: default_password_chars(),
            password_char_presets: default_password_char_presets(),
            path: PathBuf::new(),
        }
    }
}

impl Config {
    /// The file written on first start: an empty `database_1` slot and dark
    /// colours for the passphrase prompt.
    fn first_run() -> Self {
        let mut config = Config::default();
        for key in ["nf", "nb"] {
            config
                .dmenu_passphrase
                .extra
                .insert(key.to_string(), toml::Value::String("#222222".to_string()));
        }
        config.database.set_database("1", "", "");
        config
    }

    /// Load configuration from `path`, or from the default location.
    ///
    /// Creates a default config file if it doesn't exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path()?,
        };

        if !config_path.exists() {
            let mut config = Config::first_run();
            config.path = config_path;
            config.save()?;
            tracing::info!("Created default config: {}", config.path.display());
            return Ok(config);
        }

        let contents = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.path = config_path;

        tracing::info!("Loaded config from {}", config.path.display());
        Ok(config)
    }

    /// Save configuration to the file it was loaded from.
    pub fn save(&self) -> Result<()> {
        let config_path = &self.path;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, contents)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the default path to the config file.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Could not determine config directory")?;

        Ok(config_dir.join("keepmenu").join("config.toml"))
    }

    /// Check that the external typing tool, if any, is installed.
    pub fn check_type_library(&self) -> Result<()> {
        let Some(program) = self.database.type_library.program() else {
            return Ok(());
        };
        if which::which(program).is_err() {
            bail!(
                "{} not installed.\nPlease install or remove that option from {}",
                program,
                self.path.display()
            );
        }
        Ok(())
    }

    /// Resolve a preset or a single class name to the characters of its classes.
    ///
    /// Unknown class names inside a preset are skipped.
    pub fn password_classes(&self, choice: &str) -> Option<Vec<&str>> {
        if let Some(preset) = self.password_char_presets.get(choice) {
            let classes = preset
                .split_whitespace()
                .filter_map(|name| self.password_chars.get(name).map(String::as_str))
                .collect();
            return Some(classes);
        }
        self.password_chars
            .get(choice)
            .map(|chars| vec![chars.as_str()])
    }
}

impl DatabaseSection {
    /// Configured databases ordered by index, skipping empty paths.
    pub fn databases(&self) -> Vec<DatabaseEntry> {
        let mut databases: Vec<DatabaseEntry> = self
            .indexed
            .iter()
            .filter_map(|(key, value)| {
                let index = key.strip_prefix("database_")?;
                if value.trim().is_empty() {
                    return None;
                }
                let lookup = |prefix: &str| {
                    self.indexed
                        .get(&format!("{prefix}_{index}"))
                        .filter(|v| !v.is_empty())
                        .cloned()
                };
                Some(DatabaseEntry {
                    index: index.to_string(),
                    path: expand_home(value),
                    keyfile: lookup("keyfile").map(|k| expand_home(&k)),
                    password: lookup("password"),
                    password_cmd: lookup("password_cmd"),
                })
            })
            .collect();
        databases.sort_by_key(|db| (db.index.parse::<u32>().unwrap_or(u32::MAX), db.index.clone()));
        databases
    }

    /// Record a database path and keyfile under `index`.
    pub fn set_database(&mut self, index: &str, path: &str, keyfile: &str) {
        self.indexed
            .insert(format!("database_{index}"), path.to_string());
        self.indexed
            .insert(format!("keyfile_{index}"), keyfile.to_string());
    }

    /// Names listed in `hide_groups`.
    pub fn hidden_groups(&self) -> Vec<String> {
        self.hide_groups
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// Render a pass-through value the way it appears on a command line.
pub fn flag_value(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
