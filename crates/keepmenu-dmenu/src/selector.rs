//! Numbered entry and group lists, and mapping a chosen line back.

use keepmenu_core::{Entry, Group};

/// Turns entries into menu lines of the form `idx - path - username - url`.
///
/// `idx` indexes the full entry list, so lines stay stable whether or not
/// hidden entries are shown.
pub struct EntrySelector<'a> {
    entries: &'a [Entry],
    hidden_groups: &'a [String],
    align: usize,
}

impl<'a> EntrySelector<'a> {
    pub fn new(entries: &'a [Entry], hidden_groups: &'a [String]) -> Self {
        Self {
            entries,
            hidden_groups,
            align: entries.len().to_string().len(),
        }
    }

    /// Whether one of the groups `entry` is nested in is hidden.
    pub fn is_hidden(&self, entry: &Entry) -> bool {
        entry
            .group_names()
            .any(|name| self.hidden_groups.iter().any(|hidden| hidden == name))
    }

    pub fn descriptions(&self, include_hidden: bool) -> Vec<String> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| include_hidden || !self.is_hidden(entry))
            .map(|(idx, entry)| self.describe(idx, entry))
            .collect()
    }

    fn describe(&self, idx: usize, entry: &Entry) -> String {
        format!(
            "{:>align$} - {} - {} - {}",
            idx,
            entry.path,
            entry.username,
            entry.url,
            align = self.align
        )
    }

    /// The entry a menu line refers to.
    pub fn selected(&self, line: &str) -> Option<&'a Entry> {
        self.entries.get(line_index(line)?)
    }
}

/// `idx - path` lines for choosing a group.
pub fn group_descriptions(groups: &[Group]) -> Vec<String> {
    let align = groups.len().to_string().len();
    groups
        .iter()
        .enumerate()
        .map(|(idx, group)| format!("{:>align$} - {}", idx, group.path, align = align))
        .collect()
}

/// Index in front of the first `-` of a numbered line.
pub fn line_index(line: &str) -> Option<usize> {
    line.split('-').next()?.trim().parse().ok()
}
