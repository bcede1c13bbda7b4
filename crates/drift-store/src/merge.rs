//! The merge engine: applying remotely authored operations.
//!
//! Application is commutative, associative and idempotent. Duplicates are
//! detected by operation coordinate; operations for entities whose creation
//! has not arrived yet are buffered and replayed when it does. Conflicts are
//! resolved inside the data structures (LWW per map field, RGA positioning
//! per list element) and never surface to the caller - the report counts
//! outcomes, it carries no errors.

use crate::entity::{Entity, EntityKind, LifecycleState};
use crate::error::StoreError;
use crate::op::{OpPayload, Operation};
use crate::store::{now_ms, ValueStore};
use crate::value::Value;
use drift_access::{Action, AuditOutcome, AuditRecord};
use drift_clock::EntityId;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Outcome counts for one `apply_remote` batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Operations integrated into the materialized view. Includes buffered
    /// operations replayed by a creation arriving in this batch.
    pub applied: usize,
    /// Operations this replica had already seen.
    pub duplicates: usize,
    /// Operations parked until their entity's creation arrives.
    pub buffered: usize,
    /// Structurally invalid operations, dropped.
    pub rejected: usize,
    /// Operations dropped because the author lacks write access.
    pub denied: usize,
    /// Operations for entities already garbage collected.
    pub stale: usize,
}

impl ApplyReport {
    /// Total operations accounted for.
    pub fn total(&self) -> usize {
        self.applied + self.duplicates + self.buffered + self.rejected + self.denied + self.stale
    }
}

/// Authorization verdict for a remote operation.
enum Verdict {
    Allowed,
    /// Owning group unknown here; applied without a check.
    Unchecked,
    Denied,
}

impl ValueStore {
    /// Apply a batch of remote operations. Never fails: each operation is
    /// independently applied, buffered, or dropped, and the report says
    /// which.
    pub fn apply_remote(&mut self, ops: &[Operation]) -> ApplyReport {
        let mut report = ApplyReport::default();
        for op in ops {
            self.apply_one(op, &mut report);
        }
        report
    }

    fn apply_one(&mut self, op: &Operation, report: &mut ApplyReport) {
        if self.seen.contains(&op.coord) {
            report.duplicates += 1;
            return;
        }
        self.observe_remote_ts(&op.ts);

        let verdict = self.authorize_remote(op);
        // Denied and stale operations still count as seen: the frontier
        // must keep advancing or tombstone collection wedges on them. The
        // frontier itself only grows over the contiguous per-origin prefix,
        // so a reordered batch cannot acknowledge sequences still in flight.
        self.seen.insert(op.coord.clone());
        self.advance_frontier(&op.coord);

        if matches!(verdict, Verdict::Denied) {
            debug!(entity = %op.entity, author = %op.author, "dropped unauthorized operation");
            report.denied += 1;
            return;
        }
        if self.is_collected(&op.entity) {
            report.stale += 1;
            return;
        }

        match &op.payload {
            OpPayload::Create { kind, fields } => {
                if self.entities_map().contains_key(&op.entity) {
                    report.duplicates += 1;
                    return;
                }
                self.materialize(op, *kind, fields);
                self.append_log(op.clone());
                report.applied += 1;
                self.drain_pending(op.entity.clone(), report);
            }
            _ => {
                if self.entities_map().contains_key(&op.entity) {
                    self.integrate_counted(op, report);
                } else {
                    self.pending
                        .entry(op.entity.clone())
                        .or_default()
                        .push(op.clone());
                    report.buffered += 1;
                }
            }
        }
    }

    fn authorize_remote(&mut self, op: &Operation) -> Verdict {
        if !self.access().knows_group(&op.group) {
            let record = AuditRecord {
                group: op.group.clone(),
                principal: op.author.clone(),
                action: Action::Write,
                entity: op.entity.clone(),
                origin: op.coord.origin.clone(),
                recorded_at: now_ms(),
                outcome: AuditOutcome::UnknownGroup,
            };
            self.access_mut().record_audit(record);
            return Verdict::Unchecked;
        }
        if self.access().authorize(&op.group, &op.author, Action::Write) {
            Verdict::Allowed
        } else {
            let record = AuditRecord {
                group: op.group.clone(),
                principal: op.author.clone(),
                action: Action::Write,
                entity: op.entity.clone(),
                origin: op.coord.origin.clone(),
                recorded_at: now_ms(),
                outcome: AuditOutcome::Denied,
            };
            self.access_mut().record_audit(record);
            Verdict::Denied
        }
    }

    /// Turn a remote creation into a live entity, then replay anything that
    /// was waiting for it.
    fn materialize(&mut self, op: &Operation, kind: EntityKind, fields: &BTreeMap<String, Value>) {
        let mut entity = Entity::new(op.entity.clone(), op.group.clone(), kind, op.wall_ms);
        if let Some(map) = entity.body.as_map_mut() {
            for (field, value) in fields {
                map.set(field.clone(), Some(value.clone()), op.ts.clone());
            }
        }
        entity.touch(op.wall_ms);
        self.entities_mut().insert(op.entity.clone(), entity);
        debug!(entity = %op.entity, origin = %op.coord.origin, "materialized remote entity");
    }

    fn drain_pending(&mut self, id: EntityId, report: &mut ApplyReport) {
        let Some(mut parked) = self.pending.remove(&id) else {
            return;
        };
        // Replay in timestamp order so the replay is deterministic; the
        // structures themselves do not care.
        parked.sort_by(|a, b| (&a.ts, &a.coord).cmp(&(&b.ts, &b.coord)));
        debug!(entity = %id, count = parked.len(), "replaying buffered operations");
        for op in parked {
            self.integrate_counted(&op, report);
        }
    }

    fn integrate_counted(&mut self, op: &Operation, report: &mut ApplyReport) {
        match self.integrate(op) {
            Ok(()) => {
                self.append_log(op.clone());
                report.applied += 1;
            }
            Err(err) => {
                warn!(entity = %op.entity, origin = %op.coord.origin, %err, "rejected operation");
                report.rejected += 1;
            }
        }
    }

    /// Apply one operation to an entity that exists here. Errors mean the
    /// operation is structurally invalid for this entity and is dropped.
    fn integrate(&mut self, op: &Operation) -> crate::error::Result<()> {
        let entity = self
            .entities_mut()
            .get_mut(&op.entity)
            .ok_or_else(|| StoreError::NotFound(op.entity.to_string()))?;
        let kind = entity.kind();

        match &op.payload {
            OpPayload::Create { .. } => {
                return Err(StoreError::MalformedOperation(format!(
                    "duplicate create for entity {}",
                    op.entity
                )));
            }
            OpPayload::SetField { field, value } => {
                let map = entity.body.as_map_mut().ok_or_else(|| {
                    StoreError::MalformedOperation(format!(
                        "{} operation on {} entity {}",
                        op.payload.kind_name(),
                        kind,
                        op.entity
                    ))
                })?;
                map.set(field.clone(), Some(value.clone()), op.ts.clone());
            }
            OpPayload::RemoveField { field } => {
                let map = entity.body.as_map_mut().ok_or_else(|| {
                    StoreError::MalformedOperation(format!(
                        "{} operation on {} entity {}",
                        op.payload.kind_name(),
                        kind,
                        op.entity
                    ))
                })?;
                map.set(field.clone(), None, op.ts.clone());
            }
            OpPayload::ListInsert {
                elem,
                origin,
                value,
            } => {
                let list = entity.body.as_list_mut().ok_or_else(|| {
                    StoreError::MalformedOperation(format!(
                        "{} operation on {} entity {}",
                        op.payload.kind_name(),
                        kind,
                        op.entity
                    ))
                })?;
                list.insert(elem.clone(), origin.clone(), value.clone());
            }
            OpPayload::ListDelete { elem } => {
                let list = entity.body.as_list_mut().ok_or_else(|| {
                    StoreError::MalformedOperation(format!(
                        "{} operation on {} entity {}",
                        op.payload.kind_name(),
                        kind,
                        op.entity
                    ))
                })?;
                list.tombstone(elem, op.coord.clone());
            }
            OpPayload::Tombstone => {
                entity.meta.state = LifecycleState::Tombstoned;
                // Concurrent tombstones converge on the least coordinate.
                match &entity.meta.tombstoned_by {
                    Some(existing) if *existing <= op.coord => {}
                    _ => entity.meta.tombstoned_by = Some(op.coord.clone()),
                }
            }
        }
        entity.touch(op.wall_ms);
        Ok(())
    }
}
