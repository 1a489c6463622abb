//! Selection state for the drill-down detail view.

use crate::errors::DirectoryError;
use crate::models::Member;

/// At most one inspected member id.
///
/// The selection holds an id rather than a record, so it survives snapshot
/// replacement and always resolves against whatever snapshot is current.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    id: Option<String>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select `id`, replacing any previous selection. Unknown ids are allowed.
    pub fn select(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    pub fn clear(&mut self) {
        self.id = None;
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.id.is_some()
    }

    /// The selected member in `snapshot`, if both exist.
    pub fn current<'a>(&self, snapshot: &'a [Member]) -> Option<&'a Member> {
        let id = self.id.as_deref()?;
        snapshot.iter().find(|m| m.id == id)
    }

    /// Like [`Selection::current`], but reports a missing record as
    /// [`DirectoryError::NotFound`]. Resolving with nothing selected is a
    /// caller bug and reported as internal.
    pub fn resolve<'a>(&self, snapshot: &'a [Member]) -> Result<&'a Member, DirectoryError> {
        let id = self
            .id
            .as_deref()
            .ok_or_else(|| DirectoryError::Internal("no member selected".to_string()))?;
        snapshot
            .iter()
            .find(|m| m.id == id)
            .ok_or_else(|| DirectoryError::NotFound(id.to_string()))
    }
}
