use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use super::domain::{
    ClientId, Control, ControlId, Evidence, EvidenceId, EvidenceStatus, Hazard, HazardControl,
    HazardId, HazardProfile, RequiredControl, RequiredControlId, RequiredControlStatus, Role,
    RoleId, Worker, WorkerId, WorkerRole, WorkerRoleId, WorkerStatus,
};

/// Relational store capability consumed by the engines.
///
/// Reads are point-in-time. Every mutation goes through [`ComplianceStore::apply`], which must
/// commit the whole batch or none of it.
pub trait ComplianceStore: Send + Sync {
    fn worker(&self, id: &WorkerId) -> Result<Option<Worker>, StoreError>;
    fn worker_by_employee_id(&self, employee_id: &str) -> Result<Option<Worker>, StoreError>;
    fn workers(&self) -> Result<Vec<Worker>, StoreError>;
    /// Workers holding an active role assignment scoped to `client_id`.
    fn workers_for_client(
        &self,
        client_id: &ClientId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Worker>, StoreError>;

    fn worker_roles(&self, worker_id: &WorkerId) -> Result<Vec<WorkerRole>, StoreError>;
    fn worker_role(&self, id: &WorkerRoleId) -> Result<Option<WorkerRole>, StoreError>;
    fn role(&self, id: &RoleId) -> Result<Option<Role>, StoreError>;
    fn role_by_name(&self, name: &str) -> Result<Option<Role>, StoreError>;

    fn hazard(&self, id: &HazardId) -> Result<Option<Hazard>, StoreError>;
    /// Hazards in any of `categories`, each with mappings ordered by priority asc, id desc.
    fn hazard_profiles(
        &self,
        categories: &BTreeSet<String>,
    ) -> Result<Vec<HazardProfile>, StoreError>;
    fn hazards_for_control(&self, control_id: &ControlId) -> Result<Vec<Hazard>, StoreError>;
    fn control(&self, id: &ControlId) -> Result<Option<Control>, StoreError>;

    fn required_controls(&self, worker_id: &WorkerId)
        -> Result<Vec<RequiredControl>, StoreError>;
    fn required_control(
        &self,
        id: &RequiredControlId,
    ) -> Result<Option<RequiredControl>, StoreError>;

    /// Evidence newest first: issued date desc, then creation order desc.
    fn evidence(&self, required_control_id: &RequiredControlId)
        -> Result<Vec<Evidence>, StoreError>;

    fn latest_evidence(
        &self,
        required_control_id: &RequiredControlId,
    ) -> Result<Option<Evidence>, StoreError> {
        Ok(self.evidence(required_control_id)?.into_iter().next())
    }

    fn latest_valid_evidence(
        &self,
        required_control_id: &RequiredControlId,
    ) -> Result<Option<Evidence>, StoreError> {
        Ok(self
            .evidence(required_control_id)?
            .into_iter()
            .find(|evidence| evidence.status == EvidenceStatus::Valid))
    }

    fn apply(&self, batch: WriteBatch) -> Result<(), StoreError>;
}

/// Error enumeration for store failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists: {0}")]
    Conflict(String),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("constraint violated: {0}")]
    Constraint(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Single mutation inside an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    InsertWorker(Worker),
    SetWorkerStatus {
        worker_id: WorkerId,
        status: WorkerStatus,
    },
    UpsertRole(Role),
    UpsertHazard(Hazard),
    UpsertControl(Control),
    /// Keyed on (hazard, control); an existing pair is replaced.
    UpsertHazardControl(HazardControl),
    InsertWorkerRole(WorkerRole),
    EndWorkerRole {
        id: WorkerRoleId,
        end_at: DateTime<Utc>,
    },
    DeleteWorkerRole(WorkerRoleId),
    /// Keyed on (worker, control); an existing row is left untouched.
    UpsertRequiredControl(RequiredControl),
    DeleteRequiredControl(RequiredControlId),
    UpdateRequiredControlStatus {
        id: RequiredControlId,
        status: RequiredControlStatus,
        due_date: Option<DateTime<Utc>>,
        updated_at: DateTime<Utc>,
    },
    SetTemporaryFix {
        id: RequiredControlId,
        valid_until: Option<DateTime<Utc>>,
        evidence_id: Option<EvidenceId>,
        notes: Option<String>,
        updated_at: DateTime<Utc>,
    },
    InsertEvidence(Evidence),
}

/// Ordered list of writes committed all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: WriteOp) {
        self.ops.push(op);
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

impl From<Vec<WriteOp>> for WriteBatch {
    fn from(ops: Vec<WriteOp>) -> Self {
        Self { ops }
    }
}
