//! Fault injection for the in-memory federation.

use fedtx_core::{Relation, StatementKind};

/// A failure the endpoint reports for matching operations.
#[derive(Debug, Clone)]
pub struct Fault {
    relation: Option<Relation>,
    kind: Option<StatementKind>,
    on_commit: bool,
    remaining: Option<usize>,
    message: String,
}

impl Fault {
    /// Fail statements against a relation.
    pub fn on(relation: Relation) -> Self {
        Self {
            relation: Some(relation),
            kind: None,
            on_commit: false,
            remaining: None,
            message: "injected fault".to_string(),
        }
    }

    /// Fail physical commits.
    pub fn on_commit() -> Self {
        Self {
            relation: None,
            kind: None,
            on_commit: true,
            remaining: None,
            message: "injected commit fault".to_string(),
        }
    }

    /// Restrict to one statement kind.
    pub fn kind(mut self, kind: StatementKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Fire at most `n` times.
    pub fn times(mut self, n: usize) -> Self {
        self.remaining = Some(n);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub(crate) fn text(&self) -> &str {
        &self.message
    }

    pub(crate) fn matches_statement(&self, relation: &Relation, kind: StatementKind) -> bool {
        !self.on_commit
            && self.relation.as_ref().map_or(true, |r| r == relation)
            && self.kind.map_or(true, |k| k == kind)
            && self.remaining != Some(0)
    }

    pub(crate) fn matches_commit(&self) -> bool {
        self.on_commit && self.remaining != Some(0)
    }

    /// Record one firing.
    pub(crate) fn fire(&mut self) {
        if let Some(n) = self.remaining.as_mut() {
            *n = n.saturating_sub(1);
        }
    }

    pub(crate) fn exhausted(&self) -> bool {
        self.remaining == Some(0)
    }
}
