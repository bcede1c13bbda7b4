//! The application-facing value store.
//!
//! All mutation calls are synchronous and purely local: they authorize the
//! caller, stamp an operation, apply it to the materialized view and append
//! it to the log as one logical unit, then return the operation for
//! asynchronous broadcast. Nothing here blocks on the network.

use crate::entity::{Entity, EntityKind, LifecycleState};
use crate::error::{Result, StoreError};
use crate::list::ElemId;
use crate::op::{OpCoord, OpPayload, Operation};
use crate::persist::StoreSnapshot;
use crate::value::Value;
use drift_access::{Action, GroupId, GroupManager, PrincipalId};
use drift_clock::{EntityId, LamportClock, ReplicaContext, ReplicaId, Timestamp};
use drift_compaction::VersionVector;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::debug;

/// Current wall-clock millis. Metadata only; merge decisions never read it.
pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// One replica's materialized store plus its operation log.
#[derive(Clone, Debug)]
pub struct ValueStore {
    ctx: ReplicaContext,
    clock: LamportClock,
    /// Per-origin sequence of the last locally authored operation.
    next_seq: u64,
    access: GroupManager,
    entities: BTreeMap<EntityId, Entity>,
    /// Ids of entities physically purged; guards against resurrection by
    /// late duplicate creates.
    collected: HashSet<EntityId>,
    /// Operations for entities whose creation has not arrived yet.
    pub(crate) pending: HashMap<EntityId, Vec<Operation>>,
    /// Every operation coordinate ever accepted, for deduplication.
    pub(crate) seen: HashSet<OpCoord>,
    /// Contiguous per-origin prefix of sequences received. Batches may be
    /// reordered in flight, so sequences arriving ahead of a gap wait in
    /// `gaps` and only extend the frontier once the gap closes.
    pub(crate) frontier: VersionVector,
    /// Out-of-order sequences per origin, held until the prefix reaches them.
    pub(crate) gaps: BTreeMap<ReplicaId, BTreeSet<u64>>,
    /// Full local append-only operation log.
    log: Vec<Operation>,
    /// Locally authored operations awaiting broadcast.
    outbound: Vec<Operation>,
}

impl ValueStore {
    /// Create an empty store for the given replica.
    pub fn new(ctx: ReplicaContext) -> Self {
        Self::with_access(ctx, GroupManager::new())
    }

    /// Create a store with pre-provisioned access groups.
    pub fn with_access(ctx: ReplicaContext, access: GroupManager) -> Self {
        let clock = LamportClock::new(ctx.replica_id().clone());
        Self {
            ctx,
            clock,
            next_seq: 0,
            access,
            entities: BTreeMap::new(),
            collected: HashSet::new(),
            pending: HashMap::new(),
            seen: HashSet::new(),
            frontier: VersionVector::new(),
            gaps: BTreeMap::new(),
            log: Vec::new(),
            outbound: Vec::new(),
        }
    }

    pub fn replica_id(&self) -> &ReplicaId {
        self.ctx.replica_id()
    }

    pub fn context(&self) -> &ReplicaContext {
        &self.ctx
    }

    pub fn access(&self) -> &GroupManager {
        &self.access
    }

    pub fn access_mut(&mut self) -> &mut GroupManager {
        &mut self.access
    }

    /// Contiguous operation prefix received per origin (this replica
    /// included). This is what heartbeats report as acknowledgement, so it
    /// never claims a sequence that has not actually arrived.
    pub fn frontier(&self) -> &VersionVector {
        &self.frontier
    }

    // === Creation ===

    /// Allocate a new entity owned by `group`, with identity assigned
    /// immediately - no coordination round-trip.
    pub fn create(
        &mut self,
        kind: EntityKind,
        group: &GroupId,
        initial_fields: BTreeMap<String, Value>,
        principal: &PrincipalId,
    ) -> Result<EntityId> {
        if !self.access.knows_group(group) {
            return Err(StoreError::GroupNotFound(group.to_string()));
        }
        let id = EntityId::new();
        self.authorize_write(group, principal, &id)?;

        let (coord, ts, wall_ms) = self.next_stamp();
        let op = Operation {
            entity: id.clone(),
            group: group.clone(),
            author: principal.clone(),
            coord,
            ts: ts.clone(),
            wall_ms,
            payload: OpPayload::Create {
                kind,
                fields: initial_fields.clone(),
            },
        };

        let mut entity = Entity::new(id.clone(), group.clone(), kind, wall_ms);
        if let Some(map) = entity.body.as_map_mut() {
            for (field, value) in initial_fields {
                map.set(field, Some(value), ts.clone());
            }
        }
        entity.touch(wall_ms);
        self.entities.insert(id.clone(), entity);
        self.record_local(op);
        Ok(id)
    }

    // === Reads ===

    /// Fetch an active entity. Tombstoned and unknown entities are both
    /// `NotFound` to readers.
    pub fn get(&self, id: &EntityId) -> Result<&Entity> {
        self.entities
            .get(id)
            .filter(|e| e.is_active())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Lifecycle state of an id, if this replica knows anything about it.
    pub fn state(&self, id: &EntityId) -> Option<LifecycleState> {
        if let Some(entity) = self.entities.get(id) {
            return Some(entity.meta.state);
        }
        if self.pending.contains_key(id) {
            return Some(LifecycleState::Pending);
        }
        if self.collected.contains(id) {
            return Some(LifecycleState::Collected);
        }
        None
    }

    /// Visible fields of a map entity.
    pub fn fields(&self, id: &EntityId) -> Result<BTreeMap<String, Value>> {
        let entity = self.get(id)?;
        let map = entity
            .body
            .as_map()
            .ok_or_else(|| self.kind_mismatch(entity, EntityKind::Map))?;
        Ok(map.to_map())
    }

    /// One field of a map entity.
    pub fn field(&self, id: &EntityId, name: &str) -> Result<Option<Value>> {
        let entity = self.get(id)?;
        let map = entity
            .body
            .as_map()
            .ok_or_else(|| self.kind_mismatch(entity, EntityKind::Map))?;
        Ok(map.get(name).cloned())
    }

    /// Visible elements of a list entity, in sequence order.
    pub fn list_values(&self, id: &EntityId) -> Result<Vec<Value>> {
        let entity = self.get(id)?;
        let list = entity
            .body
            .as_list()
            .ok_or_else(|| self.kind_mismatch(entity, EntityKind::List))?;
        Ok(list.to_vec())
    }

    /// Visible length of a list entity.
    pub fn list_len(&self, id: &EntityId) -> Result<usize> {
        let entity = self.get(id)?;
        let list = entity
            .body
            .as_list()
            .ok_or_else(|| self.kind_mismatch(entity, EntityKind::List))?;
        Ok(list.len())
    }

    /// Ids of all active entities.
    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.entities
            .values()
            .filter(|e| e.is_active())
            .map(|e| e.meta.id.clone())
            .collect()
    }

    /// Ids of active entities owned by a group.
    pub fn entities_in_group(&self, group: &GroupId) -> Vec<EntityId> {
        self.entities
            .values()
            .filter(|e| e.is_active() && &e.meta.group == group)
            .map(|e| e.meta.id.clone())
            .collect()
    }

    /// Export an active entity's visible body as JSON.
    pub fn to_json(&self, id: &EntityId) -> Result<serde_json::Value> {
        Ok(self.get(id)?.to_json())
    }

    // === Map mutations ===

    /// Last-writer-wins set of one field.
    pub fn set(
        &mut self,
        id: &EntityId,
        field: impl Into<String>,
        value: Value,
        principal: &PrincipalId,
    ) -> Result<Operation> {
        self.write_field(id, field.into(), Some(value), principal)
    }

    /// Tombstone one field.
    pub fn remove_field(
        &mut self,
        id: &EntityId,
        field: impl Into<String>,
        principal: &PrincipalId,
    ) -> Result<Operation> {
        self.write_field(id, field.into(), None, principal)
    }

    fn write_field(
        &mut self,
        id: &EntityId,
        field: String,
        value: Option<Value>,
        principal: &PrincipalId,
    ) -> Result<Operation> {
        let entity = self
            .entities
            .get(id)
            .filter(|e| e.is_active())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if entity.kind() != EntityKind::Map {
            return Err(self.kind_mismatch(entity, EntityKind::Map));
        }
        let group = entity.meta.group.clone();
        self.authorize_write(&group, principal, id)?;

        let (coord, ts, wall_ms) = self.next_stamp();
        let payload = match &value {
            Some(v) => OpPayload::SetField {
                field: field.clone(),
                value: v.clone(),
            },
            None => OpPayload::RemoveField {
                field: field.clone(),
            },
        };
        let op = Operation {
            entity: id.clone(),
            group,
            author: principal.clone(),
            coord,
            ts: ts.clone(),
            wall_ms,
            payload,
        };

        let entity = self
            .entities
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if let Some(map) = entity.body.as_map_mut() {
            map.set(field, value, ts);
        }
        entity.touch(wall_ms);
        self.record_local(op.clone());
        Ok(op)
    }

    // === List mutations ===

    /// Insert a value at a visible index (0..=len).
    pub fn list_insert(
        &mut self,
        id: &EntityId,
        index: usize,
        value: Value,
        principal: &PrincipalId,
    ) -> Result<Operation> {
        let entity = self
            .entities
            .get(id)
            .filter(|e| e.is_active())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let list = entity
            .body
            .as_list()
            .ok_or_else(|| self.kind_mismatch(entity, EntityKind::List))?;

        let length = list.len();
        if index > length {
            return Err(StoreError::IndexOutOfBounds { index, length });
        }
        let origin = if index == 0 {
            None
        } else {
            list.id_at(index - 1)
        };
        let group = entity.meta.group.clone();
        self.authorize_write(&group, principal, id)?;

        let (coord, ts, wall_ms) = self.next_stamp();
        let elem = ElemId::new(ts, coord.seq);
        let op = Operation {
            entity: id.clone(),
            group,
            author: principal.clone(),
            coord,
            ts: elem.ts.clone(),
            wall_ms,
            payload: OpPayload::ListInsert {
                elem: elem.clone(),
                origin: origin.clone(),
                value: value.clone(),
            },
        };

        let entity = self
            .entities
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if let Some(list) = entity.body.as_list_mut() {
            list.insert(elem, origin, value);
        }
        entity.touch(wall_ms);
        self.record_local(op.clone());
        Ok(op)
    }

    /// Append a value at the end of a list.
    pub fn list_push(
        &mut self,
        id: &EntityId,
        value: Value,
        principal: &PrincipalId,
    ) -> Result<Operation> {
        let length = self.list_len(id)?;
        self.list_insert(id, length, value, principal)
    }

    /// Tombstone the element at a visible index.
    pub fn list_delete(
        &mut self,
        id: &EntityId,
        index: usize,
        principal: &PrincipalId,
    ) -> Result<Operation> {
        let entity = self
            .entities
            .get(id)
            .filter(|e| e.is_active())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let list = entity
            .body
            .as_list()
            .ok_or_else(|| self.kind_mismatch(entity, EntityKind::List))?;

        let elem = list.id_at(index).ok_or(StoreError::IndexOutOfBounds {
            index,
            length: list.len(),
        })?;
        let group = entity.meta.group.clone();
        self.authorize_write(&group, principal, id)?;

        let (coord, ts, wall_ms) = self.next_stamp();
        let op = Operation {
            entity: id.clone(),
            group,
            author: principal.clone(),
            coord: coord.clone(),
            ts,
            wall_ms,
            payload: OpPayload::ListDelete { elem: elem.clone() },
        };

        let entity = self
            .entities
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if let Some(list) = entity.body.as_list_mut() {
            list.tombstone(&elem, coord);
        }
        entity.touch(wall_ms);
        self.record_local(op.clone());
        Ok(op)
    }

    // === Entity tombstoning ===

    /// Tombstone a whole entity. It disappears from reads but is retained
    /// until every known replica acknowledges the deletion.
    pub fn tombstone(&mut self, id: &EntityId, principal: &PrincipalId) -> Result<Operation> {
        let entity = self
            .entities
            .get(id)
            .filter(|e| e.is_active())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let group = entity.meta.group.clone();
        self.authorize_write(&group, principal, id)?;

        let (coord, ts, wall_ms) = self.next_stamp();
        let op = Operation {
            entity: id.clone(),
            group,
            author: principal.clone(),
            coord: coord.clone(),
            ts,
            wall_ms,
            payload: OpPayload::Tombstone,
        };

        let entity = self
            .entities
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        entity.meta.state = LifecycleState::Tombstoned;
        entity.meta.tombstoned_by = Some(coord);
        entity.touch(wall_ms);
        self.record_local(op.clone());
        Ok(op)
    }

    // === Replication plumbing ===

    /// Drain locally authored operations for broadcast.
    pub fn take_outbound(&mut self) -> Vec<Operation> {
        std::mem::take(&mut self.outbound)
    }

    pub fn has_outbound(&self) -> bool {
        !self.outbound.is_empty()
    }

    /// Full local operation log, oldest first.
    pub fn log(&self) -> &[Operation] {
        &self.log
    }

    // === Garbage collection ===

    /// Physically purge tombstones covered by the stable frontier: whole
    /// entities move to `Collected`, and list elements inside active lists
    /// are dropped. Returns the number of items purged.
    ///
    /// `reported` is the component-wise maximum over every peer's reported
    /// frontier. A peer acknowledges a list delete only after every insert
    /// it made while the element was still visible is in its own frontier,
    /// so once the local frontier dominates `reported`, no in-flight insert
    /// can still be anchored to a purged element. Until then list purging
    /// is deferred; tombstoned elements stay as anchors.
    pub fn collect(&mut self, stable: &VersionVector, reported: &VersionVector) -> usize {
        let mut purged = 0;

        let ready: Vec<EntityId> = self
            .entities
            .values()
            .filter(|e| e.meta.state == LifecycleState::Tombstoned)
            .filter(|e| {
                e.meta
                    .tombstoned_by
                    .as_ref()
                    .map(|c| stable.covers(&c.origin, c.seq))
                    .unwrap_or(false)
            })
            .map(|e| e.meta.id.clone())
            .collect();

        for id in ready {
            self.entities.remove(&id);
            self.pending.remove(&id);
            self.collected.insert(id.clone());
            debug!(entity = %id, "collected tombstoned entity");
            purged += 1;
        }

        if self.frontier.dominates(reported) {
            for entity in self.entities.values_mut() {
                if let Some(list) = entity.body.as_list_mut() {
                    purged += list.purge(stable);
                }
            }
        }

        purged
    }

    // === Persistence ===

    /// Serialize everything needed to resume this replica after restart.
    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            replica: self.ctx.replica_id().clone(),
            clock_counter: self.clock.counter(),
            next_seq: self.next_seq,
            entities: self.entities.clone(),
            collected: self.collected.clone(),
            pending: self.pending.clone(),
            seen: self.seen.clone(),
            frontier: self.frontier.clone(),
            gaps: self.gaps.clone(),
            log: self.log.clone(),
            outbound: self.outbound.clone(),
        }
    }

    /// Rebuild a store from a snapshot. Access groups are provisioned by
    /// the application, not persisted here.
    pub fn restore(ctx: ReplicaContext, access: GroupManager, snapshot: StoreSnapshot) -> Self {
        let clock = LamportClock::resume(ctx.replica_id().clone(), snapshot.clock_counter);
        Self {
            ctx,
            clock,
            next_seq: snapshot.next_seq,
            access,
            entities: snapshot.entities,
            collected: snapshot.collected,
            pending: snapshot.pending,
            seen: snapshot.seen,
            frontier: snapshot.frontier,
            gaps: snapshot.gaps,
            log: snapshot.log,
            outbound: snapshot.outbound,
        }
    }

    // === Internals shared with the merge engine ===

    pub(crate) fn entities_mut(&mut self) -> &mut BTreeMap<EntityId, Entity> {
        &mut self.entities
    }

    pub(crate) fn entities_map(&self) -> &BTreeMap<EntityId, Entity> {
        &self.entities
    }

    pub(crate) fn is_collected(&self, id: &EntityId) -> bool {
        self.collected.contains(id)
    }

    pub(crate) fn observe_remote_ts(&mut self, ts: &Timestamp) {
        self.clock.observe(ts);
    }

    pub(crate) fn append_log(&mut self, op: Operation) {
        self.log.push(op);
    }

    /// Extend the reported frontier over the contiguous prefix only. A
    /// sequence past the next expected one is parked until the gap closes.
    pub(crate) fn advance_frontier(&mut self, coord: &OpCoord) {
        let next = self.frontier.get(&coord.origin) + 1;
        if coord.seq > next {
            self.gaps
                .entry(coord.origin.clone())
                .or_default()
                .insert(coord.seq);
            return;
        }
        if coord.seq < next {
            return;
        }
        let mut head = coord.seq;
        if let Some(held) = self.gaps.get_mut(&coord.origin) {
            while held.remove(&(head + 1)) {
                head += 1;
            }
            if held.is_empty() {
                self.gaps.remove(&coord.origin);
            }
        }
        self.frontier.observe(&coord.origin, head);
    }

    fn next_stamp(&mut self) -> (OpCoord, Timestamp, u64) {
        self.next_seq += 1;
        let ts = self.clock.tick();
        let coord = OpCoord::new(self.ctx.replica_id().clone(), self.next_seq);
        (coord, ts, now_ms())
    }

    /// Log append + view update happen before this is called; recording
    /// the coordinate completes the logical unit.
    fn record_local(&mut self, op: Operation) {
        self.seen.insert(op.coord.clone());
        self.advance_frontier(&op.coord);
        self.log.push(op.clone());
        self.outbound.push(op);
    }

    fn authorize_write(
        &self,
        group: &GroupId,
        principal: &PrincipalId,
        entity: &EntityId,
    ) -> Result<()> {
        if self.access.authorize(group, principal, Action::Write) {
            Ok(())
        } else {
            Err(StoreError::PermissionDenied {
                principal: principal.to_string(),
                entity: entity.to_string(),
            })
        }
    }

    fn kind_mismatch(&self, entity: &Entity, expected: EntityKind) -> StoreError {
        StoreError::MalformedOperation(format!(
            "entity {} is a {}, expected {}",
            entity.meta.id,
            entity.kind(),
            expected
        ))
    }
}
