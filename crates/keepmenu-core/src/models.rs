//! Shared data types for the application.

use std::collections::BTreeMap;

/// Represents a group (folder) in the database tree.
#[derive(Debug, Clone)]
pub struct Group {
    pub uuid: String,
    pub name: String,
    /// Slash separated path below the root, with a trailing slash (`Mail/Work/`).
    /// The root group's path is `/`.
    pub path: String,
    pub children: Vec<Group>,
    pub entries: Vec<Entry>,
}

impl Group {
    /// Whether this is the database root.
    pub fn is_root(&self) -> bool {
        self.path == "/"
    }

    /// All groups of the tree in depth-first order, starting with `self`.
    pub fn flatten(&self) -> Vec<&Group> {
        let mut groups = vec![self];
        for child in &self.children {
            groups.extend(child.flatten());
        }
        groups
    }
}

/// A custom string field attached to an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomField {
    pub value: String,
    pub protected: bool,
}

/// Represents a password entry.
#[derive(Debug, Clone, Default)]
pub struct Entry {
    pub uuid: String,
    pub title: String,
    pub username: String,
    pub password: String,
    pub url: String,
    pub notes: String,
    pub custom_fields: BTreeMap<String, CustomField>,
    /// Per-entry autotype sequence, overriding the configured default.
    pub autotype_sequence: Option<String>,
    /// `None` when the entry carries no autotype settings (treated as enabled).
    pub autotype_enabled: Option<bool>,
    /// Full path including the title (`Mail/Work/Title`).
    pub path: String,
    /// Path of the containing group (`Mail/Work/`, empty for the root group).
    pub group_path: String,
    pub group_uuid: String,
}

impl Entry {
    /// Create an empty entry for new entry creation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the groups this entry is nested in, outermost first.
    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.group_path.split('/').filter(|name| !name.is_empty())
    }

    /// Whether autotype is allowed for this entry.
    pub fn autotype_allowed(&self) -> bool {
        self.autotype_enabled != Some(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(name: &str, path: &str, children: Vec<Group>) -> Group {
        Group {
            uuid: name.to_string(),
            name: name.to_string(),
            path: path.to_string(),
            children,
            entries: Vec::new(),
        }
    }

    #[test]
    fn test_flatten_is_depth_first() {
        let root = group(
            "Root",
            "/",
            vec![
                group("A", "A/", vec![group("B", "A/B/", Vec::new())]),
                group("C", "C/", Vec::new()),
            ],
        );

        let names: Vec<_> = root.flatten().iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, ["Root", "A", "B", "C"]);
        assert!(root.is_root());
        assert!(!root.children[0].is_root());
    }

    #[test]
    fn test_group_names_and_autotype_flag() {
        let mut entry = Entry::new();
        entry.group_path = "Mail/Work/".to_string();
        assert_eq!(entry.group_names().collect::<Vec<_>>(), ["Mail", "Work"]);

        assert!(entry.autotype_allowed());
        entry.autotype_enabled = Some(false);
        assert!(!entry.autotype_allowed());
    }
}
