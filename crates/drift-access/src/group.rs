//! Access groups, principals, and roles.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ulid::Ulid;

/// Unique identifier for an access group.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub String);

impl GroupId {
    pub fn new() -> Self {
        Self(Ulid::new().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl Default for GroupId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a principal (user, service, or anonymous session).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PrincipalId(pub String);

impl PrincipalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PrincipalId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Role held by a principal within a group. Roles are cumulative:
/// `Admin` implies `Write` implies `Read`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Read,
    Write,
    Admin,
}

/// Actions checked against a role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Read,
    Write,
    /// Group membership management.
    Manage,
}

impl Role {
    /// Whether this role permits the given action.
    pub fn allows(&self, action: Action) -> bool {
        match action {
            Action::Read => true,
            Action::Write => matches!(self, Role::Write | Role::Admin),
            Action::Manage => matches!(self, Role::Admin),
        }
    }
}

/// A set of principals with a role each. Entities reference their owning
/// group by id; groups are never duplicated per entity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGroup {
    pub id: GroupId,
    members: BTreeMap<PrincipalId, Role>,
}

impl AccessGroup {
    pub fn new(id: GroupId) -> Self {
        Self {
            id,
            members: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, principal: PrincipalId, role: Role) {
        self.members.insert(principal, role);
    }

    pub fn remove(&mut self, principal: &PrincipalId) -> Option<Role> {
        self.members.remove(principal)
    }

    pub fn role_of(&self, principal: &PrincipalId) -> Option<Role> {
        self.members.get(principal).copied()
    }

    pub fn contains(&self, principal: &PrincipalId) -> bool {
        self.members.contains_key(principal)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn members(&self) -> impl Iterator<Item = (&PrincipalId, Role)> {
        self.members.iter().map(|(p, r)| (p, *r))
    }
}
