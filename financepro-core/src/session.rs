//! Three-layer view of one user's data during a login session.
//!
//! * `boot`: what was on disk when the session started (or at the last save).
//! * `staged`: everything added since then that has not been written.
//! * `combined`: `boot` followed by `staged`; what the dashboard renders.
//!
//! The three are independent values. `combined` is never an alias of `boot`.

use crate::{EntryId, Expense, UserData};
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Clone, Debug, Default)]
pub struct Session {
    boot: UserData,
    staged: UserData,
    combined: UserData,
    /// Parallel to `staged.expenses`.
    staged_ids: Vec<EntryId>,
    /// Parallel to `combined.expenses`; `None` for entries that came from disk.
    combined_ids: Vec<Option<EntryId>>,
}

impl Session {
    pub fn new(boot: UserData) -> Self {
        let combined_ids = vec![None; boot.expenses.len()];
        Self {
            combined: boot.clone(),
            boot,
            staged: UserData::default(),
            staged_ids: Vec::new(),
            combined_ids,
        }
    }

    pub fn boot(&self) -> &UserData {
        &self.boot
    }

    pub fn staged(&self) -> &UserData {
        &self.staged
    }

    pub fn combined(&self) -> &UserData {
        &self.combined
    }

    pub fn staged_ids(&self) -> &[EntryId] {
        &self.staged_ids
    }

    pub fn has_changes(&self) -> bool {
        !self.staged.is_empty()
    }

    /// Number of staged expenses plus staged index entries.
    pub fn pending_count(&self) -> usize {
        let s = &self.staged;
        s.expenses.len() + s.names.len() + s.categories.len() + s.tags.len()
    }

    pub fn add_expense(&mut self, expense: Expense) -> EntryId {
        let id = Uuid::new_v4();

        if !self.combined.names.contains(&expense.name) {
            self.staged.names.insert(expense.name.clone());
            self.combined.names.insert(expense.name.clone());
        }
        if !self.combined.categories.contains(&expense.category) {
            self.staged.categories.insert(expense.category.clone());
            self.combined.categories.insert(expense.category.clone());
        }
        for tag in &expense.tags {
            self.stage_tag(tag);
        }

        self.staged.expenses.push(expense.clone());
        self.staged_ids.push(id);
        self.combined.expenses.push(expense);
        self.combined_ids.push(Some(id));
        id
    }

    /// Creates a tag without an expense. Returns `false` when it already exists.
    pub fn add_tag(&mut self, tag: &str) -> bool {
        self.stage_tag(tag)
    }

    fn stage_tag(&mut self, tag: &str) -> bool {
        if self.combined.tags.contains(tag) {
            return false;
        }
        self.staged.tags.insert(tag.to_string());
        self.combined.tags.insert(tag.to_string());
        true
    }

    /// Subtracts the staged layer from `combined` and empties it.
    ///
    /// Expenses are removed by their session id, so value-equal entries are
    /// only removed when they were actually staged.
    pub fn revert(&mut self) {
        let staged: HashSet<EntryId> = self.staged_ids.iter().copied().collect();
        let mut ids = std::mem::take(&mut self.combined_ids).into_iter();
        self.combined.expenses.retain(|_| match ids.next() {
            Some(Some(id)) => !staged.contains(&id),
            _ => true,
        });
        self.combined_ids = vec![None; self.combined.expenses.len()];

        for name in &self.staged.names {
            self.combined.names.remove(name);
        }
        for category in &self.staged.categories {
            self.combined.categories.remove(category);
        }
        for tag in &self.staged.tags {
            self.combined.tags.remove(tag);
        }
        self.clear_staged();
    }

    /// Marks the combined view as persisted. Call only after the write succeeded.
    pub fn commit(&mut self) {
        self.boot = self.combined.clone();
        self.combined_ids = vec![None; self.combined.expenses.len()];
        self.clear_staged();
    }

    fn clear_staged(&mut self) {
        self.staged = UserData::default();
        self.staged_ids.clear();
    }
}
