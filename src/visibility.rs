use std::collections::HashMap;
use tracing::{debug, trace, warn};

/// One record of the dictionary: a field as seen by one ingest batch.
///
/// Several rows can share a `key`. The grouping pass of [`VisibilityEngine`]
/// decides which of them is canonical and tags the rest as history.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRow {
    pub key: Option<String>,
    pub last_updated: Option<i64>,
    pub values: Vec<Option<String>>,
    pub canonical: bool,
    pub has_duplicates: bool,
}

impl FieldRow {
    pub fn new(
        key: Option<String>,
        last_updated: Option<i64>,
        values: Vec<Option<String>>,
    ) -> Self {
        // Untagged rows are visible until a grouping pass says otherwise
        FieldRow {
            key,
            last_updated,
            values,
            canonical: true,
            has_duplicates: false,
        }
    }

    /// Key of a row that takes part in grouping. Rows missing either the key or
    /// the timestamp are always treated as their own singleton group.
    pub fn group_key(&self) -> Option<&str> {
        match (self.key.as_deref(), self.last_updated) {
            (Some(key), Some(_)) if !key.is_empty() => Some(key),
            _ => None,
        }
    }

    pub fn is_history(&self) -> bool {
        !self.canonical
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Disclosure {
    #[default]
    Collapsed,
    Expanded,
}

impl Disclosure {
    fn toggled(self) -> Self {
        match self {
            Disclosure::Collapsed => Disclosure::Expanded,
            Disclosure::Expanded => Disclosure::Collapsed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibilityState {
    pub disclosure: Disclosure,
    last_seen: u64,
}

impl VisibilityState {
    pub fn expanded(&self) -> bool {
        self.disclosure == Disclosure::Expanded
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GroupingSummary {
    pub rows: usize,
    pub groups: usize,
    pub duplicated_groups: usize,
    pub hidden_rows: usize,
    pub malformed_rows: usize,
    pub evicted_states: usize,
}

struct Group {
    canonical: usize,
    latest: i64,
    size: usize,
}

/// Owns the expand/collapse state of every logical key and tags rows as
/// canonical or history.
///
/// States of keys that vanish from the row set are kept for `retain_passes`
/// grouping passes and dropped afterwards.
#[derive(Debug)]
pub struct VisibilityEngine {
    states: HashMap<String, VisibilityState>,
    pass: u64,
    retain_passes: u64,
    revision: u64,
}

impl VisibilityEngine {
    pub fn new(retain_passes: u64) -> Self {
        VisibilityEngine {
            states: HashMap::new(),
            pass: 0,
            retain_passes,
            revision: 0,
        }
    }

    pub fn compute_visibility(&mut self, rows: &mut [FieldRow]) -> GroupingSummary {
        self.pass += 1;
        let mut summary = GroupingSummary {
            rows: rows.len(),
            ..Default::default()
        };

        // Single scan for the newest row per key. Strict `>` keeps the first
        // row in input order when timestamps tie.
        let mut groups: HashMap<&str, Group> = HashMap::new();
        for (idx, row) in rows.iter().enumerate() {
            let (Some(key), Some(ts)) = (row.group_key(), row.last_updated) else {
                summary.malformed_rows += 1;
                continue;
            };
            match groups.get_mut(key) {
                Some(group) => {
                    group.size += 1;
                    if ts > group.latest {
                        group.latest = ts;
                        group.canonical = idx;
                    }
                }
                None => {
                    groups.insert(
                        key,
                        Group {
                            canonical: idx,
                            latest: ts,
                            size: 1,
                        },
                    );
                }
            }
        }

        let tags: Vec<(bool, bool)> = rows
            .iter()
            .enumerate()
            .map(|(idx, row)| match row.group_key().and_then(|k| groups.get(k)) {
                Some(group) => (group.canonical == idx, group.size > 1),
                None => (true, false),
            })
            .collect();

        summary.groups = groups.len();
        summary.duplicated_groups = groups.values().filter(|g| g.size > 1).count();
        let seen: Vec<String> = groups.keys().map(|k| k.to_string()).collect();

        for (row, (canonical, has_duplicates)) in rows.iter_mut().zip(tags) {
            row.canonical = canonical;
            row.has_duplicates = has_duplicates;
        }

        // Commit state for every key of this pass, then age out the rest
        for key in seen {
            self.states
                .entry(key)
                .or_insert(VisibilityState {
                    disclosure: Disclosure::Collapsed,
                    last_seen: self.pass,
                })
                .last_seen = self.pass;
        }
        let before = self.states.len();
        let (pass, retain) = (self.pass, self.retain_passes);
        self.states.retain(|_, state| pass - state.last_seen <= retain);
        summary.evicted_states = before - self.states.len();

        summary.hidden_rows = rows.iter().filter(|r| !self.is_visible(r)).count();
        self.revision += 1;

        debug!(
            "Grouping pass {}: {} rows, {} groups ({} with history), {} hidden, {} malformed, {} states evicted",
            self.pass,
            summary.rows,
            summary.groups,
            summary.duplicated_groups,
            summary.hidden_rows,
            summary.malformed_rows,
            summary.evicted_states
        );
        summary
    }

    pub fn is_visible(&self, row: &FieldRow) -> bool {
        if row.canonical {
            return true;
        }
        row.group_key()
            .and_then(|key| self.states.get(key))
            .is_some_and(|state| state.expanded())
    }

    pub fn toggle_visibility(&mut self, key: &str) {
        match self.states.get_mut(key) {
            Some(state) => {
                state.disclosure = state.disclosure.toggled();
                self.revision += 1;
                trace!("Toggled {key} => {:?}", state.disclosure);
            }
            None => warn!("Toggle for unknown key {key:?} ignored"),
        }
    }

    pub fn is_expanded(&self, key: &str) -> bool {
        self.states.get(key).is_some_and(|s| s.expanded())
    }

    pub fn state(&self, key: &str) -> Option<&VisibilityState> {
        self.states.get(key)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Bumped by every grouping pass and every toggle.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}
