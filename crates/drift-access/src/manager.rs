//! Group manager: creation, membership, and authorization checks.

use crate::audit::{AuditOutcome, AuditRecord};
use crate::error::{AccessError, Result};
use crate::group::{AccessGroup, Action, GroupId, PrincipalId, Role};
use std::collections::HashMap;

/// Manages the access groups known to one replica.
///
/// Groups are provisioned locally; replicating membership itself is out of
/// scope, so replicas that share documents are expected to share group
/// definitions through the embedding application.
#[derive(Clone, Debug, Default)]
pub struct GroupManager {
    groups: HashMap<GroupId, AccessGroup>,
    audit: Vec<AuditRecord>,
}

impl GroupManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a group. The creator is granted `Admin`; additional members
    /// get the roles given.
    pub fn create_group(
        &mut self,
        creator: PrincipalId,
        members: impl IntoIterator<Item = (PrincipalId, Role)>,
    ) -> GroupId {
        let id = GroupId::new();
        let mut group = AccessGroup::new(id.clone());
        group.insert(creator, Role::Admin);
        for (principal, role) in members {
            group.insert(principal, role);
        }
        self.groups.insert(id.clone(), group);
        id
    }

    /// Register a group with a fixed id, e.g. one provisioned from another
    /// replica or restored from persistence.
    pub fn register_group(&mut self, group: AccessGroup) {
        self.groups.insert(group.id.clone(), group);
    }

    /// Add or update a member. The actor must hold `Admin` in the group.
    pub fn add_member(
        &mut self,
        group_id: &GroupId,
        actor: &PrincipalId,
        principal: PrincipalId,
        role: Role,
    ) -> Result<()> {
        self.require_manage(group_id, actor)?;
        let group = self
            .groups
            .get_mut(group_id)
            .ok_or_else(|| AccessError::GroupNotFound(group_id.to_string()))?;
        group.insert(principal, role);
        Ok(())
    }

    /// Remove a member. The actor must hold `Admin` in the group.
    pub fn remove_member(
        &mut self,
        group_id: &GroupId,
        actor: &PrincipalId,
        principal: &PrincipalId,
    ) -> Result<()> {
        self.require_manage(group_id, actor)?;
        let group = self
            .groups
            .get_mut(group_id)
            .ok_or_else(|| AccessError::GroupNotFound(group_id.to_string()))?;
        group
            .remove(principal)
            .ok_or_else(|| AccessError::PrincipalNotFound(principal.to_string()))?;
        Ok(())
    }

    /// Whether `principal` may perform `action` in `group_id`.
    ///
    /// Pure check: never errors. An unknown group yields `false`.
    pub fn authorize(&self, group_id: &GroupId, principal: &PrincipalId, action: Action) -> bool {
        self.groups
            .get(group_id)
            .and_then(|g| g.role_of(principal))
            .map(|role| role.allows(action))
            .unwrap_or(false)
    }

    /// Whether the group is known on this replica.
    pub fn knows_group(&self, group_id: &GroupId) -> bool {
        self.groups.contains_key(group_id)
    }

    pub fn get(&self, group_id: &GroupId) -> Option<&AccessGroup> {
        self.groups.get(group_id)
    }

    /// Record that an operation was dropped (or applied unchecked) on the
    /// remote path.
    pub fn record_audit(&mut self, record: AuditRecord) {
        self.audit.push(record);
    }

    /// All audit records, oldest first.
    pub fn audit_log(&self) -> &[AuditRecord] {
        &self.audit
    }

    /// Audit records with the given outcome.
    pub fn audit_with_outcome(&self, outcome: &AuditOutcome) -> Vec<&AuditRecord> {
        self.audit.iter().filter(|r| &r.outcome == outcome).collect()
    }

    fn require_manage(&self, group_id: &GroupId, actor: &PrincipalId) -> Result<()> {
        let group = self
            .groups
            .get(group_id)
            .ok_or_else(|| AccessError::GroupNotFound(group_id.to_string()))?;
        match group.role_of(actor) {
            Some(role) if role.allows(Action::Manage) => Ok(()),
            _ => Err(AccessError::PermissionDenied {
                principal: actor.to_string(),
                action: "manage".to_string(),
                group: group_id.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> PrincipalId {
        PrincipalId::from("alice")
    }

    fn bob() -> PrincipalId {
        PrincipalId::from("bob")
    }

    #[test]
    fn test_creator_is_admin() {
        let mut mgr = GroupManager::new();
        let gid = mgr.create_group(alice(), []);

        assert!(mgr.authorize(&gid, &alice(), Action::Manage));
        assert!(mgr.authorize(&gid, &alice(), Action::Write));
    }

    #[test]
    fn test_add_and_remove_member() {
        let mut mgr = GroupManager::new();
        let gid = mgr.create_group(alice(), []);

        mgr.add_member(&gid, &alice(), bob(), Role::Write).unwrap();
        assert!(mgr.authorize(&gid, &bob(), Action::Write));
        assert!(!mgr.authorize(&gid, &bob(), Action::Manage));

        mgr.remove_member(&gid, &alice(), &bob()).unwrap();
        assert!(!mgr.authorize(&gid, &bob(), Action::Read));
    }

    #[test]
    fn test_non_admin_cannot_manage() {
        let mut mgr = GroupManager::new();
        let gid = mgr.create_group(alice(), [(bob(), Role::Write)]);

        let err = mgr
            .add_member(&gid, &bob(), PrincipalId::from("carol"), Role::Read)
            .unwrap_err();
        assert!(matches!(err, AccessError::PermissionDenied { .. }));
    }

    #[test]
    fn test_unknown_group_denies() {
        let mgr = GroupManager::new();
        assert!(!mgr.authorize(&GroupId::from_string("nope"), &alice(), Action::Read));
    }

    #[test]
    fn test_remove_missing_member_errors() {
        let mut mgr = GroupManager::new();
        let gid = mgr.create_group(alice(), []);

        let err = mgr.remove_member(&gid, &alice(), &bob()).unwrap_err();
        assert!(matches!(err, AccessError::PrincipalNotFound(_)));
    }
}
