//! Builds a small sample database, used by `create_test_db` and by tests.

use anyhow::{Context, Result};
use keepass::{config::DatabaseConfig, db::Node, db::Value, Database, DatabaseKey};
use std::fs::File;
use std::path::Path;

/// Passphrase of the database written by [`create_sample_database`].
pub const SAMPLE_PASSWORD: &str = "password";

fn sample_entry(title: &str, username: &str, password: &str, url: &str) -> keepass::db::Entry {
    let mut entry = keepass::db::Entry::new();
    entry
        .fields
        .insert("Title".to_string(), Value::Unprotected(title.to_string()));
    entry
        .fields
        .insert("UserName".to_string(), Value::Unprotected(username.to_string()));
    entry.fields.insert(
        "Password".to_string(),
        Value::Protected(password.as_bytes().into()),
    );
    entry
        .fields
        .insert("URL".to_string(), Value::Unprotected(url.to_string()));
    entry
}

/// Write a database with this layout to `path`:
///
/// ```text
/// Personal/Mail            alice
/// Personal/Finance/Bank    alice   (protected PIN field, autotype disabled)
/// Work/VPN                 bob     (custom autotype sequence)
/// Hidden/Secret            carol
/// ```
pub fn create_sample_database(path: &Path, password: &str) -> Result<()> {
    let mut db = Database::new(DatabaseConfig::default());
    db.meta.database_name = Some("Sample".to_string());

    let mut personal = keepass::db::Group::new("Personal");
    let mut mail = sample_entry("Mail", "alice", "m41l-pass", "https://mail.example.com");
    mail.fields.insert(
        "Notes".to_string(),
        Value::Unprotected("recovery codes\nin the drawer".to_string()),
    );
    personal.children.push(Node::Entry(mail));

    let mut finance = keepass::db::Group::new("Finance");
    let mut bank = sample_entry("Bank", "alice", "b4nk-pass", "https://bank.example.com");
    bank.fields
        .insert("PIN".to_string(), Value::Protected("1234".as_bytes().into()));
    bank.autotype = Some(keepass::db::AutoType {
        enabled: false,
        ..Default::default()
    });
    finance.children.push(Node::Entry(bank));
    personal.children.push(Node::Group(finance));

    let mut work = keepass::db::Group::new("Work");
    let mut vpn = sample_entry("VPN", "bob", "vpn-pass", "");
    vpn.autotype = Some(keepass::db::AutoType {
        enabled: true,
        sequence: Some("{USERNAME}{TAB}{PASSWORD}{TAB}{ENTER}".to_string()),
        ..Default::default()
    });
    work.children.push(Node::Entry(vpn));

    let mut hidden = keepass::db::Group::new("Hidden");
    hidden
        .children
        .push(Node::Entry(sample_entry("Secret", "carol", "s3cret", "")));

    db.root.children.push(Node::Group(personal));
    db.root.children.push(Node::Group(work));
    db.root.children.push(Node::Group(hidden));

    let key = DatabaseKey::new().with_password(password);
    let mut file = File::create(path)
        .with_context(|| format!("Failed to create database file: {}", path.display()))?;
    db.save(&mut file, key).context("Failed to save sample database")?;
    Ok(())
}
