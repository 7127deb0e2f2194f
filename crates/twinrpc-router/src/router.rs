//! The merged dispatch table.
//!
//! Groups are merged into one table keyed by `<group>.<name>`. Because a
//! procedure name may appear in only one group, the bare name is an
//! unambiguous alias as well; the legacy layer addresses procedures that way.

use crate::group::ProcedureGroup;
use crate::procedure::Procedure;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use twinrpc_core::{Context, Input, Invocation, ProcedureError, ProcedureResult, Value};

/// Errors raised while building a [`Router`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    /// Two merged groups define the same procedure name.
    #[error("procedure '{name}' is defined in both '{first}' and '{second}'")]
    DuplicateProcedure {
        /// The clashing procedure name.
        name: String,
        /// Group that defined it first.
        first: String,
        /// Group that defined it again.
        second: String,
    },

    /// A group name was merged twice.
    #[error("group '{0}' is merged more than once")]
    DuplicateGroup(String),

    /// A group or procedure name cannot be addressed on the wire.
    #[error("invalid name '{0}': must be non-empty and free of '.', '/' and ','")]
    InvalidName(String),
}

/// One resolved procedure: its invocation description and body.
#[derive(Debug, Clone)]
pub struct RouteEntry {
    group: String,
    name: String,
    invocation: Invocation,
    procedure: Procedure,
}

impl RouteEntry {
    /// The owning group.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// The bare procedure name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// What middleware sees about this procedure.
    pub const fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    /// The built procedure.
    pub const fn procedure(&self) -> &Procedure {
        &self.procedure
    }

    /// Runs the procedure's chain.
    pub async fn call(&self, ctx: Context, input: Input) -> ProcedureResult<Value> {
        self.procedure.call(ctx, &self.invocation, input).await
    }
}

/// Collects groups for a [`Router`].
#[derive(Debug, Default)]
pub struct RouterBuilder {
    groups: Vec<(String, ProcedureGroup)>,
}

impl RouterBuilder {
    /// Merges a named group.
    #[must_use]
    pub fn merge(mut self, name: impl Into<String>, group: ProcedureGroup) -> Self {
        self.groups.push((name.into(), group));
        self
    }

    /// Builds the table, failing on any name collision.
    pub fn build(self) -> Result<Router, RouterError> {
        let mut entries: IndexMap<String, RouteEntry> = IndexMap::new();
        let mut by_name: HashMap<String, String> = HashMap::new();
        let mut seen_groups: HashSet<String> = HashSet::new();

        for (group, procedures) in self.groups {
            check_name(&group)?;
            if !seen_groups.insert(group.clone()) {
                return Err(RouterError::DuplicateGroup(group));
            }

            for (name, procedure) in procedures.into_procedures() {
                check_name(&name)?;
                if let Some(existing) = by_name.get(&name) {
                    let first = entries
                        .get(existing)
                        .map(|e| e.group.clone())
                        .unwrap_or_default();
                    return Err(RouterError::DuplicateProcedure {
                        name,
                        first,
                        second: group,
                    });
                }

                let path = format!("{group}.{name}");
                let invocation =
                    Invocation::new(path.clone(), procedure.kind(), procedure.errors().clone());
                tracing::debug!(path = %path, kind = %procedure.kind(), "registered procedure");

                by_name.insert(name.clone(), path.clone());
                entries.insert(
                    path,
                    RouteEntry {
                        group: group.clone(),
                        name,
                        invocation,
                        procedure,
                    },
                );
            }
        }

        Ok(Router { entries, by_name })
    }
}

fn check_name(name: &str) -> Result<(), RouterError> {
    if name.is_empty() || name.contains(['.', '/', ',']) {
        return Err(RouterError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// The merged dispatch table.
#[derive(Debug, Clone)]
pub struct Router {
    entries: IndexMap<String, RouteEntry>,
    by_name: HashMap<String, String>,
}

impl Router {
    /// Starts a builder.
    pub fn builder() -> RouterBuilder {
        RouterBuilder::default()
    }

    /// Looks a procedure up by `group.name`, `group/name` or bare name.
    pub fn resolve(&self, path: &str) -> Option<&RouteEntry> {
        let path = path.trim_matches('/');
        if let Some(entry) = self.entries.get(path) {
            return Some(entry);
        }
        if let Some((group, name)) = path.split_once('/') {
            return self
                .entries
                .get(&format!("{group}.{name}"))
                .filter(|entry| entry.group == group);
        }
        self.by_name
            .get(path)
            .and_then(|full| self.entries.get(full))
    }

    /// Dispatches one call. A missing path fails with `NOT_FOUND` before any
    /// middleware runs.
    pub async fn call(&self, path: &str, ctx: Context, input: Input) -> ProcedureResult<Value> {
        match self.resolve(path) {
            Some(entry) => entry.call(ctx, input).await,
            None => Err(path_not_found(path)),
        }
    }

    /// Registered paths (`group.name`) in merge order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// All entries in merge order.
    pub fn entries(&self) -> impl Iterator<Item = &RouteEntry> {
        self.entries.values()
    }

    /// Number of procedures.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no procedure is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The error for an unknown path.
pub fn path_not_found(path: &str) -> ProcedureError {
    ProcedureError::not_found(format!("No procedure found on path \"{path}\""))
}
