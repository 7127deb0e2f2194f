//! Procedure groups.

use crate::procedure::Procedure;

/// The procedures of one domain, in declaration order.
///
/// Names are checked for collisions when groups are merged into a
/// [`Router`](crate::Router), not here.
#[derive(Debug, Clone, Default)]
pub struct ProcedureGroup {
    procedures: Vec<(String, Procedure)>,
}

impl ProcedureGroup {
    /// An empty group.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a named procedure.
    #[must_use]
    pub fn procedure(mut self, name: impl Into<String>, procedure: Procedure) -> Self {
        self.procedures.push((name.into(), procedure));
        self
    }

    /// Procedure names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.procedures.iter().map(|(name, _)| name.as_str())
    }

    /// Number of procedures.
    pub fn len(&self) -> usize {
        self.procedures.len()
    }

    /// Returns true if the group is empty.
    pub fn is_empty(&self) -> bool {
        self.procedures.is_empty()
    }

    pub(crate) fn into_procedures(self) -> Vec<(String, Procedure)> {
        self.procedures
    }
}
