use crate::{Amount, StoreError};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Session-local handle for an expense added since the last save or revert.
pub type EntryId = Uuid;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Expense {
    pub amount: Amount,
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Absent means the date was left blank, not "now".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurred_at: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Expense {
    pub fn new(amount: Amount, name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            amount,
            name: name.into(),
            category: category.into(),
            tags: BTreeSet::new(),
            occurred_at: None,
            description: None,
            notes: None,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn at(mut self, when: NaiveDateTime) -> Self {
        self.occurred_at = Some(when);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Entry-form rules. The data store accepts any expense; callers check this first.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.name.trim().is_empty() {
            return Err(StoreError::Invalid("expense name is required"));
        }
        if self.category.trim().is_empty() {
            return Err(StoreError::Invalid("expense category is required"));
        }
        if self.tags.iter().any(|t| t.trim().is_empty()) {
            return Err(StoreError::Invalid("tags must not be blank"));
        }
        Ok(())
    }
}

/// Everything persisted for one user in `data.json`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserData {
    #[serde(default)]
    pub expenses: Vec<Expense>,
    #[serde(default)]
    pub names: BTreeSet<String>,
    #[serde(default)]
    pub categories: BTreeSet<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl UserData {
    pub fn is_empty(&self) -> bool {
        self.expenses.is_empty()
            && self.names.is_empty()
            && self.categories.is_empty()
            && self.tags.is_empty()
    }

    /// Index entries that an expense uses but that are missing from the index
    /// sets, as `(index, value)` pairs.
    pub fn missing_index_entries(&self) -> Vec<(&'static str, String)> {
        let mut missing = Vec::new();
        for e in &self.expenses {
            if !self.names.contains(&e.name) {
                missing.push(("names", e.name.clone()));
            }
            if !self.categories.contains(&e.category) {
                missing.push(("categories", e.category.clone()));
            }
            for t in &e.tags {
                if !self.tags.contains(t) {
                    missing.push(("tags", t.clone()));
                }
            }
        }
        missing.sort();
        missing.dedup();
        missing
    }

    pub fn repair_indices(&mut self) -> usize {
        let missing = self.missing_index_entries();
        for (index, value) in &missing {
            match *index {
                "names" => self.names.insert(value.clone()),
                "categories" => self.categories.insert(value.clone()),
                _ => self.tags.insert(value.clone()),
            };
        }
        missing.len()
    }
}

/// Per-user metadata stored in `config.json`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserConfig {
    pub username: String,
    pub launches: u64,
    pub data_size: String,
}

impl UserConfig {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            launches: 0,
            data_size: format_size(0),
        }
    }
}

/// Binary-unit size string used for `data_size`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
