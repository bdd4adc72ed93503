//! Screen-level flows. Each directory owns its view state (list, busy flags, open editor) and
//! talks to the outside world only through the seams held by [`crate::context::AppContext`].

pub mod account;
pub mod customers;
pub mod saga;
pub mod staff;

use serde::Serialize;

/// Editing surface of a directory screen.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Editor<T> {
    #[default]
    Closed,
    New,
    Editing(T),
}

impl<T> Editor<T> {
    pub fn is_open(&self) -> bool { !matches!(self, Editor::Closed) }

    pub fn selected(&self) -> Option<&T> {
        match self {
            Editor::Editing(t) => Some(t),
            _ => None,
        }
    }

    pub fn close(&mut self) { *self = Editor::Closed; }
}

/// Per-action loading flags. Set for the duration of a mutation and always cleared when it
/// finishes, whatever the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BusyFlags {
    pub creating: bool,
    pub updating: bool,
    pub deleting: bool,
}

impl BusyFlags {
    pub fn any(&self) -> bool { self.creating || self.updating || self.deleting }
}

/// Which busy flag an action holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Busy {
    Creating,
    Updating,
    Deleting,
}

impl BusyFlags {
    pub(crate) fn set(&mut self, which: Busy, on: bool) {
        match which {
            Busy::Creating => self.creating = on,
            Busy::Updating => self.updating = on,
            Busy::Deleting => self.deleting = on,
        }
    }
}

/// Case-insensitive substring match used by both directory filters.
pub(crate) fn matches_query(haystack: &str, query: &str) -> bool {
    haystack.to_lowercase().contains(&query.to_lowercase())
}
