//! Choosing a configured database and unlocking it.

use crate::config::{Config, DatabaseEntry};
use crate::menu::{Menu, MenuError};
use anyhow::{bail, Context, Result};
use keepmenu_core::{DatabaseSession, DatabaseSource};
use std::process::Command;

/// Pick a database, obtain its passphrase and open it.
///
/// Returns `Ok(None)` when the user cancelled or the database could not be
/// opened; the reason has then already been shown through the menu. Only a
/// broken menu is returned as an error.
pub fn unlock(config: &mut Config, menu: &dyn Menu) -> Result<Option<DatabaseSession>> {
    let source = match select_source(config, menu) {
        Ok(Some(source)) => source,
        Ok(None) => return Ok(None),
        Err(err) if err.downcast_ref::<MenuError>().is_some() => return Err(err),
        Err(err) => {
            tracing::error!("Failed to unlock database: {:#}", err);
            menu.error(&format!("{err:#}"));
            return Ok(None);
        }
    };

    match DatabaseSession::open(source) {
        Ok(session) => Ok(Some(session)),
        Err(err) => {
            tracing::error!("Failed to open database: {}", err);
            menu.error(&err.to_string());
            Ok(None)
        }
    }
}

fn select_source(config: &mut Config, menu: &dyn Menu) -> Result<Option<DatabaseSource>> {
    let mut databases = config.database.databases();
    if databases.is_empty() {
        if !ask_initial_database(config, menu)? {
            return Ok(None);
        }
        databases = config.database.databases();
    }

    let database = if databases.len() > 1 {
        let paths: Vec<String> = databases
            .iter()
            .map(|db| db.path.display().to_string())
            .collect();
        let Some(choice) = menu.select("Select Database", &paths)? else {
            return Ok(None);
        };
        match databases
            .into_iter()
            .find(|db| db.path.display().to_string() == choice)
        {
            Some(db) => db,
            None => return Ok(None),
        }
    } else {
        match databases.into_iter().next() {
            Some(db) => db,
            None => return Ok(None),
        }
    };

    let password = match configured_password(&database)? {
        Some(password) => password,
        None => match menu.passphrase()? {
            Some(password) => password,
            None => return Ok(None),
        },
    };

    Ok(Some(DatabaseSource {
        path: database.path,
        keyfile: database.keyfile,
        password,
    }))
}

/// First start: ask for a database and keyfile and store them as `database_1`.
fn ask_initial_database(config: &mut Config, menu: &dyn Menu) -> Result<bool> {
    let Some(path) = menu.select(
        "Enter path to existing Keepass database. ~/ for $HOME is ok",
        &[],
    )?
    else {
        menu.error("No database entered. Try again.");
        return Ok(false);
    };
    let keyfile = menu
        .select("Enter path to keyfile. ~/ for $HOME is ok", &[])?
        .unwrap_or_default();

    config.database.set_database("1", path.trim(), keyfile.trim());
    config.save()?;
    tracing::info!("Stored database_1 in {}", config.path().display());
    Ok(true)
}

/// Passphrase from `password_cmd_N` or `password_N`, if configured.
///
/// The command's trimmed stdout wins over a literal password. Any output on
/// stderr is treated as a failure.
fn configured_password(database: &DatabaseEntry) -> Result<Option<String>> {
    if let Some(cmd) = &database.password_cmd {
        let argv = shlex::split(cmd).unwrap_or_default();
        let (program, args) = argv
            .split_first()
            .context("password_cmd is empty")?;
        let output = Command::new(program)
            .args(args)
            .output()
            .with_context(|| format!("Failed to run password command: {program}"))?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            bail!("Password command error: {}", stderr.trim());
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let password = stdout.trim_end_matches('\n');
        if !password.is_empty() {
            return Ok(Some(password.to_string()));
        }
    }
    Ok(database.password.clone())
}
