use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use super::domain::{
    ClientId, Control, ControlId, Evidence, EvidenceId, Hazard, HazardControl, HazardControlId,
    HazardId, HazardProfile, MappedControl, RequiredControl, RequiredControlId, Role, RoleId,
    Worker, WorkerId, WorkerRole, WorkerRoleId,
};
use super::store::{ComplianceStore, StoreError, WriteBatch, WriteOp};

#[derive(Debug, Clone, Default)]
struct StoreState {
    workers: BTreeMap<WorkerId, Worker>,
    roles: BTreeMap<RoleId, Role>,
    worker_roles: BTreeMap<WorkerRoleId, WorkerRole>,
    hazards: BTreeMap<HazardId, Hazard>,
    controls: BTreeMap<ControlId, Control>,
    hazard_controls: BTreeMap<HazardControlId, HazardControl>,
    required_controls: BTreeMap<RequiredControlId, RequiredControl>,
    evidence: BTreeMap<EvidenceId, StoredEvidence>,
    evidence_sequence: u64,
}

#[derive(Debug, Clone)]
struct StoredEvidence {
    sequence: u64,
    evidence: Evidence,
}

/// Process-local store used by the service binary, demos, and tests.
///
/// Batches are applied to a copy of the state that replaces the live state only after every
/// operation succeeds.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
    writes: AtomicUsize,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of write operations committed so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    /// Simulates a lost connection; every call fails while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, StoreError> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable("in-memory store offline".to_string()));
        }
        Ok(self.state.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl StoreState {
    fn apply_op(&mut self, op: WriteOp) -> Result<(), StoreError> {
        match op {
            WriteOp::InsertWorker(worker) => {
                if self.workers.contains_key(&worker.id) {
                    return Err(StoreError::Conflict(format!("worker {}", worker.id)));
                }
                if self
                    .workers
                    .values()
                    .any(|existing| existing.employee_id == worker.employee_id)
                {
                    return Err(StoreError::Conflict(format!(
                        "employee id {}",
                        worker.employee_id
                    )));
                }
                self.workers.insert(worker.id.clone(), worker);
            }
            WriteOp::SetWorkerStatus { worker_id, status } => {
                let worker = self
                    .workers
                    .get_mut(&worker_id)
                    .ok_or_else(|| StoreError::NotFound(format!("worker {worker_id}")))?;
                worker.status = status;
            }
            WriteOp::UpsertRole(role) => {
                self.roles.insert(role.id.clone(), role);
            }
            WriteOp::UpsertHazard(hazard) => {
                self.hazards.insert(hazard.id.clone(), hazard);
            }
            WriteOp::UpsertControl(control) => {
                self.controls.insert(control.id.clone(), control);
            }
            WriteOp::UpsertHazardControl(mapping) => {
                if !self.hazards.contains_key(&mapping.hazard_id) {
                    return Err(StoreError::Constraint(format!(
                        "unknown hazard {}",
                        mapping.hazard_id
                    )));
                }
                if !self.controls.contains_key(&mapping.control_id) {
                    return Err(StoreError::Constraint(format!(
                        "unknown control {}",
                        mapping.control_id
                    )));
                }
                self.hazard_controls.retain(|_, existing| {
                    !(existing.hazard_id == mapping.hazard_id
                        && existing.control_id == mapping.control_id)
                });
                self.hazard_controls.insert(mapping.id.clone(), mapping);
            }
            WriteOp::InsertWorkerRole(assignment) => {
                if !self.workers.contains_key(&assignment.worker_id) {
                    return Err(StoreError::Constraint(format!(
                        "unknown worker {}",
                        assignment.worker_id
                    )));
                }
                if !self.roles.contains_key(&assignment.role_id) {
                    return Err(StoreError::Constraint(format!(
                        "unknown role {}",
                        assignment.role_id
                    )));
                }
                if self.worker_roles.contains_key(&assignment.id) {
                    return Err(StoreError::Conflict(format!("worker role {}", assignment.id)));
                }
                self.worker_roles.insert(assignment.id.clone(), assignment);
            }
            WriteOp::EndWorkerRole { id, end_at } => {
                let assignment = self
                    .worker_roles
                    .get_mut(&id)
                    .ok_or_else(|| StoreError::NotFound(format!("worker role {id}")))?;
                assignment.end_at = Some(end_at);
            }
            WriteOp::DeleteWorkerRole(id) => {
                self.worker_roles
                    .remove(&id)
                    .ok_or_else(|| StoreError::NotFound(format!("worker role {id}")))?;
            }
            WriteOp::UpsertRequiredControl(required) => {
                if !self.workers.contains_key(&required.worker_id) {
                    return Err(StoreError::Constraint(format!(
                        "unknown worker {}",
                        required.worker_id
                    )));
                }
                if !self.controls.contains_key(&required.control_id) {
                    return Err(StoreError::Constraint(format!(
                        "unknown control {}",
                        required.control_id
                    )));
                }
                let exists = self.required_controls.values().any(|existing| {
                    existing.worker_id == required.worker_id
                        && existing.control_id == required.control_id
                });
                if !exists {
                    if self.required_controls.contains_key(&required.id) {
                        return Err(StoreError::Conflict(format!(
                            "required control {}",
                            required.id
                        )));
                    }
                    self.required_controls.insert(required.id.clone(), required);
                }
            }
            WriteOp::DeleteRequiredControl(id) => {
                self.required_controls
                    .remove(&id)
                    .ok_or_else(|| StoreError::NotFound(format!("required control {id}")))?;
                self.evidence
                    .retain(|_, stored| stored.evidence.required_control_id != id);
            }
            WriteOp::UpdateRequiredControlStatus {
                id,
                status,
                due_date,
                updated_at,
            } => {
                let required = self
                    .required_controls
                    .get_mut(&id)
                    .ok_or_else(|| StoreError::NotFound(format!("required control {id}")))?;
                required.status = status;
                required.due_date = due_date;
                required.updated_at = updated_at;
            }
            WriteOp::SetTemporaryFix {
                id,
                valid_until,
                evidence_id,
                notes,
                updated_at,
            } => {
                let required = self
                    .required_controls
                    .get_mut(&id)
                    .ok_or_else(|| StoreError::NotFound(format!("required control {id}")))?;
                required.temp_valid_until = valid_until;
                required.temp_evidence_id = evidence_id;
                required.temp_notes = notes;
                required.updated_at = updated_at;
            }
            WriteOp::InsertEvidence(evidence) => {
                if !self
                    .required_controls
                    .contains_key(&evidence.required_control_id)
                {
                    return Err(StoreError::Constraint(format!(
                        "unknown required control {}",
                        evidence.required_control_id
                    )));
                }
                if self.evidence.contains_key(&evidence.id) {
                    return Err(StoreError::Conflict(format!("evidence {}", evidence.id)));
                }
                self.evidence_sequence += 1;
                self.evidence.insert(
                    evidence.id.clone(),
                    StoredEvidence {
                        sequence: self.evidence_sequence,
                        evidence,
                    },
                );
            }
        }
        Ok(())
    }

    fn mapped_controls(&self, hazard_id: &HazardId) -> Vec<MappedControl> {
        let mut mappings: Vec<&HazardControl> = self
            .hazard_controls
            .values()
            .filter(|mapping| &mapping.hazard_id == hazard_id)
            .collect();
        mappings.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| b.id.cmp(&a.id)));

        mappings
            .into_iter()
            .filter_map(|mapping| {
                self.controls
                    .get(&mapping.control_id)
                    .map(|control| MappedControl {
                        mapping: mapping.clone(),
                        control: control.clone(),
                    })
            })
            .collect()
    }
}

impl ComplianceStore for InMemoryStore {
    fn worker(&self, id: &WorkerId) -> Result<Option<Worker>, StoreError> {
        Ok(self.lock()?.workers.get(id).cloned())
    }

    fn worker_by_employee_id(&self, employee_id: &str) -> Result<Option<Worker>, StoreError> {
        Ok(self
            .lock()?
            .workers
            .values()
            .find(|worker| worker.employee_id == employee_id)
            .cloned())
    }

    fn workers(&self) -> Result<Vec<Worker>, StoreError> {
        Ok(self.lock()?.workers.values().cloned().collect())
    }

    fn workers_for_client(
        &self,
        client_id: &ClientId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Worker>, StoreError> {
        let state = self.lock()?;
        let scoped: BTreeSet<&WorkerId> = state
            .worker_roles
            .values()
            .filter(|assignment| {
                assignment.client_id.as_ref() == Some(client_id) && assignment.is_active_at(now)
            })
            .map(|assignment| &assignment.worker_id)
            .collect();

        Ok(scoped
            .into_iter()
            .filter_map(|id| state.workers.get(id).cloned())
            .collect())
    }

    fn worker_roles(&self, worker_id: &WorkerId) -> Result<Vec<WorkerRole>, StoreError> {
        Ok(self
            .lock()?
            .worker_roles
            .values()
            .filter(|assignment| &assignment.worker_id == worker_id)
            .cloned()
            .collect())
    }

    fn worker_role(&self, id: &WorkerRoleId) -> Result<Option<WorkerRole>, StoreError> {
        Ok(self.lock()?.worker_roles.get(id).cloned())
    }

    fn role(&self, id: &RoleId) -> Result<Option<Role>, StoreError> {
        Ok(self.lock()?.roles.get(id).cloned())
    }

    fn role_by_name(&self, name: &str) -> Result<Option<Role>, StoreError> {
        let wanted = name.trim();
        Ok(self
            .lock()?
            .roles
            .values()
            .find(|role| role.name.eq_ignore_ascii_case(wanted))
            .cloned())
    }

    fn hazard(&self, id: &HazardId) -> Result<Option<Hazard>, StoreError> {
        Ok(self.lock()?.hazards.get(id).cloned())
    }

    fn hazard_profiles(
        &self,
        categories: &BTreeSet<String>,
    ) -> Result<Vec<HazardProfile>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .hazards
            .values()
            .filter(|hazard| categories.contains(&hazard.category))
            .map(|hazard| HazardProfile {
                hazard: hazard.clone(),
                controls: state.mapped_controls(&hazard.id),
            })
            .collect())
    }

    fn hazards_for_control(&self, control_id: &ControlId) -> Result<Vec<Hazard>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .hazard_controls
            .values()
            .filter(|mapping| &mapping.control_id == control_id)
            .filter_map(|mapping| state.hazards.get(&mapping.hazard_id).cloned())
            .collect())
    }

    fn control(&self, id: &ControlId) -> Result<Option<Control>, StoreError> {
        Ok(self.lock()?.controls.get(id).cloned())
    }

    fn required_controls(
        &self,
        worker_id: &WorkerId,
    ) -> Result<Vec<RequiredControl>, StoreError> {
        Ok(self
            .lock()?
            .required_controls
            .values()
            .filter(|required| &required.worker_id == worker_id)
            .cloned()
            .collect())
    }

    fn required_control(
        &self,
        id: &RequiredControlId,
    ) -> Result<Option<RequiredControl>, StoreError> {
        Ok(self.lock()?.required_controls.get(id).cloned())
    }

    fn evidence(
        &self,
        required_control_id: &RequiredControlId,
    ) -> Result<Vec<Evidence>, StoreError> {
        let state = self.lock()?;
        let mut rows: Vec<&StoredEvidence> = state
            .evidence
            .values()
            .filter(|stored| &stored.evidence.required_control_id == required_control_id)
            .collect();
        rows.sort_by_key(|stored| {
            (
                Reverse(stored.evidence.issued_date),
                Reverse(stored.evidence.created_at),
                Reverse(stored.sequence),
            )
        });
        Ok(rows.into_iter().map(|stored| stored.evidence.clone()).collect())
    }

    fn apply(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let mut next = state.clone();
        let count = batch.len();
        for op in batch.into_ops() {
            next.apply_op(op)?;
        }
        *state = next;
        self.writes.fetch_add(count, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance::domain::{ControlType, EvidenceArtifact, EvidenceStatus, WorkerStatus};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, 9, 0, 0).unwrap()
    }

    fn seeded() -> (InMemoryStore, RequiredControlId) {
        let store = InMemoryStore::new();
        let required = RequiredControl::new(WorkerId::from("w-1"), ControlId::from("c-1"), now());
        let id = required.id.clone();
        store
            .apply(WriteBatch::from(vec![
                WriteOp::InsertWorker(Worker {
                    id: WorkerId::from("w-1"),
                    employee_id: "E-100".to_string(),
                    name: "Ada Mills".to_string(),
                    email: None,
                    phone: None,
                    status: WorkerStatus::Active,
                    created_at: now(),
                }),
                WriteOp::UpsertControl(Control {
                    id: ControlId::from("c-1"),
                    name: "Harness training".to_string(),
                    control_type: ControlType::Training,
                    validity_days: Some(365),
                }),
                WriteOp::UpsertRequiredControl(required),
            ]))
            .expect("seed applies");
        (store, id)
    }

    fn evidence(id: &str, rc: &RequiredControlId, issued: DateTime<Utc>) -> Evidence {
        Evidence {
            id: EvidenceId::from(id),
            required_control_id: rc.clone(),
            artifact: EvidenceArtifact::Temporary,
            issued_date: issued,
            expiry_date: None,
            status: EvidenceStatus::Valid,
            created_at: now(),
        }
    }

    #[test]
    fn failed_batch_leaves_state_untouched() {
        let (store, rc) = seeded();
        let writes_before = store.write_count();

        let result = store.apply(WriteBatch::from(vec![
            WriteOp::DeleteRequiredControl(rc.clone()),
            WriteOp::SetWorkerStatus {
                worker_id: WorkerId::from("missing"),
                status: WorkerStatus::Restricted,
            },
        ]));

        assert!(matches!(result, Err(StoreError::NotFound(_))));
        assert!(store.required_control(&rc).expect("read").is_some());
        assert_eq!(store.write_count(), writes_before);
    }

    #[test]
    fn upsert_required_control_keeps_existing_pair() {
        let (store, rc) = seeded();
        let duplicate =
            RequiredControl::new(WorkerId::from("w-1"), ControlId::from("c-1"), now());
        store
            .apply(WriteBatch::from(vec![WriteOp::UpsertRequiredControl(
                duplicate,
            )]))
            .expect("upsert succeeds");

        let rows = store.required_controls(&WorkerId::from("w-1")).expect("read");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, rc);
    }

    #[test]
    fn latest_evidence_orders_by_issue_date_then_insertion() {
        let (store, rc) = seeded();
        store
            .apply(WriteBatch::from(vec![
                WriteOp::InsertEvidence(evidence("ev-old", &rc, now() - Duration::days(10))),
                WriteOp::InsertEvidence(evidence("ev-a", &rc, now())),
                WriteOp::InsertEvidence(evidence("ev-b", &rc, now())),
            ]))
            .expect("evidence inserts");

        let latest = store.latest_evidence(&rc).expect("read").expect("present");
        assert_eq!(latest.id, EvidenceId::from("ev-b"));
        let all = store.evidence(&rc).expect("read");
        assert_eq!(all.last().map(|e| e.id.as_str()), Some("ev-old"));
    }

    #[test]
    fn unavailable_store_rejects_reads() {
        let (store, _) = seeded();
        store.set_unavailable(true);
        assert!(matches!(
            store.workers(),
            Err(StoreError::Unavailable(_))
        ));
    }
}
