//! KeePass database session.
//!
//! Holds the decrypted database for the lifetime of the daemon. Every save is
//! followed by a full reopen from disk so that no further read is served from
//! the in-memory state produced by the write.

use crate::error::OpenError;
use crate::models::{CustomField, Entry, Group};
use anyhow::{Context, Result};
use keepass::db::{AutoType, Node, Value};
use keepass::error::DatabaseOpenError;
use keepass::{Database, DatabaseKey};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

const STANDARD_FIELDS: [&str; 5] = ["Title", "UserName", "Password", "URL", "Notes"];

/// Where a database lives and how to unlock it.
#[derive(Clone, Default)]
pub struct DatabaseSource {
    pub path: PathBuf,
    pub keyfile: Option<PathBuf>,
    pub password: String,
}

impl std::fmt::Debug for DatabaseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseSource")
            .field("path", &self.path)
            .field("keyfile", &self.keyfile)
            .finish_non_exhaustive()
    }
}

/// Wrapper around the KeePass database for easier operations.
pub struct DatabaseSession {
    db: Database,
    key: DatabaseKey,
    source: DatabaseSource,
}

impl std::fmt::Debug for DatabaseSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseSession")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl DatabaseSession {
    /// Open and unlock a KeePass database.
    pub fn open(source: DatabaseSource) -> Result<Self, OpenError> {
        let (db, key) = open_database(&source)?;
        tracing::info!("Opened database {}", source.path.display());
        Ok(Self { db, key, source })
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.source.path
    }

    /// Reopen the database from disk, discarding unsaved changes.
    pub fn reload(&mut self) -> Result<(), OpenError> {
        let (db, key) = open_database(&self.source)?;
        self.db = db;
        self.key = key;
        tracing::debug!("Reloaded database {}", self.source.path.display());
        Ok(())
    }

    /// Save the database to disk, then reopen it.
    ///
    /// The reopen works around the keepass library occasionally serving
    /// garbled protected values from the in-memory tree after a write.
    pub fn save(&mut self) -> Result<()> {
        let path = self.source.path.clone();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
        self.db
            .save(&mut tmp, self.key.clone())
            .with_context(|| "Failed to save database")?;
        tmp.flush()?;
        tmp.persist(&path)
            .with_context(|| format!("Failed to write database file: {}", path.display()))?;

        tracing::info!("Saved database {}", path.display());
        self.reload()
            .with_context(|| format!("Failed to reopen database: {}", path.display()))
    }

    /// Get the root group of the database.
    pub fn root_group(&self) -> Group {
        convert_group(&self.db.root, "/")
    }

    /// All groups, root first, depth-first.
    pub fn groups(&self) -> Vec<Group> {
        self.root_group().flatten().into_iter().cloned().collect()
    }

    /// All entries in document order.
    pub fn entries(&self) -> Vec<Entry> {
        let mut entries = Vec::new();
        collect_entries(&self.db.root, "", &mut entries);
        entries
    }

    /// Find an entry by UUID.
    pub fn find_entry(&self, uuid: &str) -> Option<Entry> {
        self.entries().into_iter().find(|e| e.uuid == uuid)
    }

    /// Create an empty entry inside `group_uuid` and return its UUID.
    pub fn add_entry(&mut self, group_uuid: &str) -> Result<String> {
        let group = find_group_mut(&mut self.db.root, group_uuid)
            .with_context(|| format!("Group with UUID {} not found", group_uuid))?;

        let mut entry = keepass::db::Entry::new();
        for field in ["Title", "UserName", "URL", "Notes"] {
            entry
                .fields
                .insert(field.to_string(), Value::Unprotected(String::new()));
        }
        entry
            .fields
            .insert("Password".to_string(), Value::Protected("".as_bytes().into()));

        let uuid = entry.uuid.to_string();
        group.children.push(Node::Entry(entry));
        tracing::debug!("Added entry {} to group {}", uuid, group_uuid);
        Ok(uuid)
    }

    /// Update an entry in the database.
    pub fn update_entry(&mut self, entry: &Entry) -> Result<()> {
        let e = find_entry_mut(&mut self.db.root, &entry.uuid)
            .with_context(|| format!("Entry with UUID {} not found", entry.uuid))?;

        // Update standard fields
        e.fields.insert(
            "Title".to_string(),
            Value::Unprotected(entry.title.clone()),
        );
        e.fields.insert(
            "UserName".to_string(),
            Value::Unprotected(entry.username.clone()),
        );
        e.fields.insert(
            "Password".to_string(),
            Value::Protected(entry.password.as_bytes().into()),
        );
        e.fields
            .insert("URL".to_string(), Value::Unprotected(entry.url.clone()));
        e.fields.insert(
            "Notes".to_string(),
            Value::Unprotected(entry.notes.clone()),
        );

        e.fields.retain(|name, _| {
            STANDARD_FIELDS.contains(&name.as_str()) || entry.custom_fields.contains_key(name)
        });
        for (name, field) in &entry.custom_fields {
            let value = if field.protected {
                Value::Protected(field.value.as_bytes().into())
            } else {
                Value::Unprotected(field.value.clone())
            };
            e.fields.insert(name.clone(), value);
        }

        if entry.autotype_sequence.is_some() || entry.autotype_enabled.is_some() {
            let autotype = e.autotype.get_or_insert_with(AutoType::default);
            autotype.enabled = entry.autotype_enabled.unwrap_or(true);
            autotype.sequence = entry.autotype_sequence.clone();
        }

        Ok(())
    }

    /// Remove an entry permanently.
    pub fn delete_entry(&mut self, uuid: &str) -> Result<()> {
        if find_entry_mut(&mut self.db.root, uuid).is_none() {
            anyhow::bail!("Entry with UUID {} not found", uuid);
        }
        take_node(&mut self.db.root, uuid);
        Ok(())
    }

    /// Move an entry into another group.
    pub fn move_entry(&mut self, uuid: &str, group_uuid: &str) -> Result<()> {
        if find_group(&self.db.root, group_uuid).is_none() {
            anyhow::bail!("Group with UUID {} not found", group_uuid);
        }
        if find_entry_mut(&mut self.db.root, uuid).is_none() {
            anyhow::bail!("Entry with UUID {} not found", uuid);
        }
        let node = take_node(&mut self.db.root, uuid)
            .with_context(|| format!("Entry with UUID {} not found", uuid))?;
        let group = find_group_mut(&mut self.db.root, group_uuid)
            .with_context(|| format!("Group with UUID {} not found", group_uuid))?;
        group.children.push(node);
        Ok(())
    }

    /// Create a subgroup of `parent_uuid` and return its UUID.
    pub fn add_group(&mut self, parent_uuid: &str, name: &str) -> Result<String> {
        let parent = find_group_mut(&mut self.db.root, parent_uuid)
            .with_context(|| format!("Group with UUID {} not found", parent_uuid))?;
        let group = keepass::db::Group::new(name);
        let uuid = group.uuid.to_string();
        parent.children.push(Node::Group(group));
        Ok(uuid)
    }

    pub fn rename_group(&mut self, uuid: &str, name: &str) -> Result<()> {
        self.ensure_not_root(uuid)?;
        let group = find_group_mut(&mut self.db.root, uuid)
            .with_context(|| format!("Group with UUID {} not found", uuid))?;
        group.name = name.to_string();
        Ok(())
    }

    /// Move a group below `dest_uuid`. Moving a group into itself or one of
    /// its descendants is rejected to keep the tree acyclic.
    pub fn move_group(&mut self, uuid: &str, dest_uuid: &str) -> Result<()> {
        self.ensure_not_root(uuid)?;
        let group = find_group(&self.db.root, uuid)
            .with_context(|| format!("Group with UUID {} not found", uuid))?;
        if find_group(group, dest_uuid).is_some() {
            anyhow::bail!("Cannot move a group into itself or one of its subgroups");
        }
        if find_group(&self.db.root, dest_uuid).is_none() {
            anyhow::bail!("Group with UUID {} not found", dest_uuid);
        }

        let node = take_node(&mut self.db.root, uuid)
            .with_context(|| format!("Group with UUID {} not found", uuid))?;
        let dest = find_group_mut(&mut self.db.root, dest_uuid)
            .with_context(|| format!("Group with UUID {} not found", dest_uuid))?;
        dest.children.push(node);
        Ok(())
    }

    /// Delete a group together with everything it contains.
    pub fn delete_group(&mut self, uuid: &str) -> Result<()> {
        self.ensure_not_root(uuid)?;
        if find_group(&self.db.root, uuid).is_none() {
            anyhow::bail!("Group with UUID {} not found", uuid);
        }
        take_node(&mut self.db.root, uuid);
        Ok(())
    }

    fn ensure_not_root(&self, uuid: &str) -> Result<()> {
        if self.db.root.uuid.to_string() == uuid {
            anyhow::bail!("The root group cannot be changed");
        }
        Ok(())
    }
}

fn open_database(source: &DatabaseSource) -> Result<(Database, DatabaseKey), OpenError> {
    if !source.path.is_file() {
        return Err(OpenError::DatabaseNotFound(source.path.clone()));
    }

    let mut key = DatabaseKey::new();
    if !source.password.is_empty() {
        key = key.with_password(&source.password);
    }
    if let Some(keyfile) = &source.keyfile {
        if !keyfile.is_file() {
            return Err(OpenError::KeyfileNotFound(keyfile.clone()));
        }
        let mut file = File::open(keyfile).map_err(|e| OpenError::Other(e.to_string()))?;
        key = key
            .with_keyfile(&mut file)
            .map_err(|e| OpenError::Other(e.to_string()))?;
    }

    let mut file = File::open(&source.path).map_err(|e| OpenError::Other(e.to_string()))?;
    let db = Database::open(&mut file, key.clone()).map_err(|err| match err {
        DatabaseOpenError::Key(_) => OpenError::InvalidKey,
        other => OpenError::Other(other.to_string()),
    })?;
    Ok((db, key))
}

/// Convert a keepass::Group to our Group model.
fn convert_group(kg: &keepass::db::Group, path: &str) -> Group {
    let child_path = |name: &str| {
        if path == "/" {
            format!("{}/", name)
        } else {
            format!("{}{}/", path, name)
        }
    };
    let entry_group_path = if path == "/" { "" } else { path };

    Group {
        uuid: kg.uuid.to_string(),
        name: kg.name.clone(),
        path: path.to_string(),
        children: kg
            .children
            .iter()
            .filter_map(|node| match node {
                Node::Group(g) => Some(convert_group(g, &child_path(&g.name))),
                Node::Entry(_) => None,
            })
            .collect(),
        entries: kg
            .children
            .iter()
            .filter_map(|node| match node {
                Node::Entry(e) => Some(convert_entry(e, entry_group_path, &kg.uuid.to_string())),
                Node::Group(_) => None,
            })
            .collect(),
    }
}

/// Convert a keepass::Entry to our Entry model.
fn convert_entry(ke: &keepass::db::Entry, group_path: &str, group_uuid: &str) -> Entry {
    let mut custom_fields = BTreeMap::new();

    for (key, val) in &ke.fields {
        // Skip standard fields that are handled by specific getters
        if STANDARD_FIELDS.contains(&key.as_str()) {
            continue;
        }

        match val {
            Value::Unprotected(s) => {
                custom_fields.insert(
                    key.clone(),
                    CustomField {
                        value: s.clone(),
                        protected: false,
                    },
                );
            }
            Value::Protected(_) => {
                if let Some(s) = ke.get(key) {
                    custom_fields.insert(
                        key.clone(),
                        CustomField {
                            value: s.to_string(),
                            protected: true,
                        },
                    );
                }
            }
            // Attachments are not shown in menus.
            _ => {}
        }
    }

    let title = ke.get_title().unwrap_or_default().to_string();
    Entry {
        uuid: ke.uuid.to_string(),
        path: format!("{}{}", group_path, title),
        title,
        username: ke.get_username().unwrap_or_default().to_string(),
        password: ke.get_password().unwrap_or_default().to_string(),
        url: ke.get_url().unwrap_or_default().to_string(),
        notes: ke.get("Notes").unwrap_or_default().to_string(),
        custom_fields,
        autotype_sequence: ke.autotype.as_ref().and_then(|at| at.sequence.clone()),
        autotype_enabled: ke.autotype.as_ref().map(|at| at.enabled),
        group_path: group_path.to_string(),
        group_uuid: group_uuid.to_string(),
    }
}

fn collect_entries(group: &keepass::db::Group, group_path: &str, entries: &mut Vec<Entry>) {
    let group_uuid = group.uuid.to_string();
    for node in &group.children {
        match node {
            Node::Entry(e) => entries.push(convert_entry(e, group_path, &group_uuid)),
            Node::Group(g) => {
                let path = format!("{}{}/", group_path, g.name);
                collect_entries(g, &path, entries);
            }
        }
    }
}

fn node_uuid(node: &Node) -> String {
    match node {
        Node::Group(g) => g.uuid.to_string(),
        Node::Entry(e) => e.uuid.to_string(),
    }
}

fn find_group<'a>(group: &'a keepass::db::Group, uuid: &str) -> Option<&'a keepass::db::Group> {
    if group.uuid.to_string() == uuid {
        return Some(group);
    }
    group.children.iter().find_map(|node| match node {
        Node::Group(g) => find_group(g, uuid),
        Node::Entry(_) => None,
    })
}

fn find_group_mut<'a>(
    group: &'a mut keepass::db::Group,
    uuid: &str,
) -> Option<&'a mut keepass::db::Group> {
    if group.uuid.to_string() == uuid {
        return Some(group);
    }
    group.children.iter_mut().find_map(|node| match node {
        Node::Group(g) => find_group_mut(g, uuid),
        Node::Entry(_) => None,
    })
}

fn find_entry_mut<'a>(
    group: &'a mut keepass::db::Group,
    uuid: &str,
) -> Option<&'a mut keepass::db::Entry> {
    group.children.iter_mut().find_map(|node| match node {
        Node::Entry(e) if e.uuid.to_string() == uuid => Some(e),
        Node::Entry(_) => None,
        Node::Group(g) => find_entry_mut(g, uuid),
    })
}

/// Detach the node with `uuid` from wherever it sits in the tree.
fn take_node(group: &mut keepass::db::Group, uuid: &str) -> Option<Node> {
    if let Some(pos) = group.children.iter().position(|n| node_uuid(n) == uuid) {
        return Some(group.children.remove(pos));
    }
    group.children.iter_mut().find_map(|node| match node {
        Node::Group(g) => take_node(g, uuid),
        Node::Entry(_) => None,
    })
}
