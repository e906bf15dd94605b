//! Write-side operations around the engines: workers, role assignments, evidence, and the
//! shared hazard/control reference graph.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::assignment::{AssignmentEngine, AssignmentError, RecomputeOutcome, RecomputeReport};
use super::clock::Clock;
use super::domain::{
    next_id, ClientId, Control, ControlId, Evidence, EvidenceArtifact, EvidenceId,
    EvidenceStatus, Hazard, HazardControl, HazardControlId, HazardId, RecomputeContext,
    RequiredControl, RequiredControlId, Role, RoleId, SiteId, Worker, WorkerId, WorkerRole,
    WorkerRoleId, WorkerStatus,
};
use super::store::{ComplianceStore, StoreError, WriteBatch, WriteOp};
use super::worker_ref::WorkerRef;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWorker {
    pub employee_id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    #[serde(default)]
    pub client_id: Option<ClientId>,
    #[serde(default)]
    pub site_id: Option<SiteId>,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default)]
    pub start_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvidence {
    pub artifact: EvidenceArtifact,
    pub issued_date: DateTime<Utc>,
    #[serde(default)]
    pub expiry_date: Option<DateTime<Utc>>,
    #[serde(default = "default_evidence_status")]
    pub status: EvidenceStatus,
}

fn default_evidence_status() -> EvidenceStatus {
    EvidenceStatus::Valid
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("worker {0} not found")]
    WorkerNotFound(WorkerId),
    #[error("role {0} not found")]
    RoleNotFound(String),
    #[error("worker role {0} not found")]
    WorkerRoleNotFound(WorkerRoleId),
    #[error("hazard {0} not found")]
    HazardNotFound(HazardId),
    #[error("control {0} not found")]
    ControlNotFound(ControlId),
    #[error("required control {0} not found")]
    RequiredControlNotFound(RequiredControlId),
    #[error("temporary fix must end in the future (valid until {valid_until})")]
    InvalidTemporaryFix { valid_until: DateTime<Utc> },
    #[error("worker name and employee id are required")]
    IncompleteWorker,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Assignment(#[from] AssignmentError),
}

/// Mutations that keep the assignment engine's truth current by recomputing afterwards.
pub struct RegistryService<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    assignment: Arc<AssignmentEngine<S>>,
}

impl<S> RegistryService<S>
where
    S: ComplianceStore + 'static,
{
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, assignment: Arc<AssignmentEngine<S>>) -> Self {
        Self {
            store,
            clock,
            assignment,
        }
    }

    pub fn create_worker(&self, new_worker: NewWorker) -> Result<Worker, RegistryError> {
        let employee_id = new_worker.employee_id.trim().to_string();
        let name = new_worker.name.trim().to_string();
        if employee_id.is_empty() || name.is_empty() {
            return Err(RegistryError::IncompleteWorker);
        }

        let worker = Worker {
            id: WorkerId(next_id("wkr")),
            employee_id,
            name,
            email: new_worker.email,
            phone: new_worker.phone,
            status: WorkerStatus::Active,
            created_at: self.clock.now(),
        };
        self.store
            .apply(WriteBatch::from(vec![WriteOp::InsertWorker(worker.clone())]))?;
        info!(worker_id = %worker.id, employee_id = %worker.employee_id, "worker created");
        Ok(worker)
    }

    pub fn worker_by_employee_id(&self, employee_id: &str) -> Result<Option<Worker>, RegistryError> {
        Ok(self.store.worker_by_employee_id(employee_id.trim())?)
    }

    pub fn role_by_name(&self, name: &str) -> Result<Option<Role>, RegistryError> {
        Ok(self.store.role_by_name(name)?)
    }

    pub fn has_active_assignment(
        &self,
        worker_id: &WorkerId,
        role_id: &RoleId,
        client_id: Option<&ClientId>,
        site_id: Option<&SiteId>,
    ) -> Result<bool, RegistryError> {
        let now = self.clock.now();
        Ok(self.store.worker_roles(worker_id)?.iter().any(|assignment| {
            &assignment.role_id == role_id
                && assignment.client_id.as_ref() == client_id
                && assignment.site_id.as_ref() == site_id
                && assignment.is_active_at(now)
        }))
    }

    /// Assigns a role; a new primary assignment closes any active primary in the same batch.
    pub fn assign_role(
        &self,
        worker_id: &WorkerId,
        role_id: &RoleId,
        assignment: RoleAssignment,
    ) -> Result<WorkerRole, RegistryError> {
        let now = self.clock.now();
        self.require_worker(worker_id)?;
        self.store
            .role(role_id)?
            .ok_or_else(|| RegistryError::RoleNotFound(role_id.to_string()))?;

        let mut batch = WriteBatch::new();
        if assignment.is_primary {
            for existing in self.store.worker_roles(worker_id)? {
                if existing.is_primary && existing.is_active_at(now) {
                    batch.push(WriteOp::EndWorkerRole {
                        id: existing.id,
                        end_at: now,
                    });
                }
            }
        }

        let worker_role = WorkerRole {
            id: WorkerRoleId(next_id("wr")),
            worker_id: worker_id.clone(),
            role_id: role_id.clone(),
            client_id: assignment.client_id,
            site_id: assignment.site_id,
            is_primary: assignment.is_primary,
            start_at: assignment.start_at.unwrap_or(now),
            end_at: None,
        };
        batch.push(WriteOp::InsertWorkerRole(worker_role.clone()));
        self.store.apply(batch)?;

        let context = RecomputeContext {
            client_id: worker_role.client_id.clone(),
            site_id: worker_role.site_id.clone(),
        };
        self.assignment
            .recompute_worker(&WorkerRef::from(worker_id), &context)?;
        Ok(worker_role)
    }

    /// Closes an assignment by setting its end date to now.
    pub fn end_role(&self, worker_role_id: &WorkerRoleId) -> Result<RecomputeOutcome, RegistryError> {
        let assignment = self.require_worker_role(worker_role_id)?;
        self.store.apply(WriteBatch::from(vec![WriteOp::EndWorkerRole {
            id: assignment.id,
            end_at: self.clock.now(),
        }]))?;
        Ok(self
            .assignment
            .recompute_worker(&WorkerRef::from(&assignment.worker_id), &RecomputeContext::default())?)
    }

    /// Hard-removes an assignment.
    pub fn unassign_role(
        &self,
        worker_role_id: &WorkerRoleId,
    ) -> Result<RecomputeOutcome, RegistryError> {
        let assignment = self.require_worker_role(worker_role_id)?;
        self.store.apply(WriteBatch::from(vec![WriteOp::DeleteWorkerRole(
            assignment.id,
        )]))?;
        Ok(self
            .assignment
            .recompute_worker(&WorkerRef::from(&assignment.worker_id), &RecomputeContext::default())?)
    }

    /// Marks a worker inactive so whole-population recomputes skip them.
    pub fn deactivate_worker(&self, worker_id: &WorkerId) -> Result<(), RegistryError> {
        self.require_worker(worker_id)?;
        self.store.apply(WriteBatch::from(vec![WriteOp::SetWorkerStatus {
            worker_id: worker_id.clone(),
            status: WorkerStatus::Inactive,
        }]))?;
        info!(%worker_id, "worker deactivated");
        Ok(())
    }

    /// Appends evidence; existing rows are never modified.
    pub fn add_evidence(
        &self,
        required_control_id: &RequiredControlId,
        new_evidence: NewEvidence,
    ) -> Result<Evidence, RegistryError> {
        let required = self.require_required_control(required_control_id)?;
        let evidence = Evidence {
            id: EvidenceId(next_id("ev")),
            required_control_id: required.id.clone(),
            artifact: new_evidence.artifact,
            issued_date: new_evidence.issued_date,
            expiry_date: new_evidence.expiry_date,
            status: new_evidence.status,
            created_at: self.clock.now(),
        };
        self.store
            .apply(WriteBatch::from(vec![WriteOp::InsertEvidence(evidence.clone())]))?;
        self.assignment
            .recompute_worker(&WorkerRef::from(&required.worker_id), &RecomputeContext::default())?;
        Ok(evidence)
    }

    /// Records a time-boxed override backed by a temporary placeholder evidence row.
    pub fn apply_temporary_fix(
        &self,
        required_control_id: &RequiredControlId,
        valid_until: DateTime<Utc>,
        notes: Option<String>,
    ) -> Result<RequiredControl, RegistryError> {
        let now = self.clock.now();
        if valid_until <= now {
            return Err(RegistryError::InvalidTemporaryFix { valid_until });
        }
        let required = self.require_required_control(required_control_id)?;

        let placeholder = Evidence {
            id: EvidenceId(next_id("ev")),
            required_control_id: required.id.clone(),
            artifact: EvidenceArtifact::Temporary,
            issued_date: now,
            expiry_date: Some(valid_until),
            status: EvidenceStatus::Valid,
            created_at: now,
        };
        let batch = WriteBatch::from(vec![
            WriteOp::SetTemporaryFix {
                id: required.id.clone(),
                valid_until: Some(valid_until),
                evidence_id: Some(placeholder.id.clone()),
                notes,
                updated_at: now,
            },
            WriteOp::InsertEvidence(placeholder),
        ]);
        self.store.apply(batch)?;
        info!(required_control_id = %required.id, %valid_until, "temporary fix applied");

        self.assignment
            .recompute_worker(&WorkerRef::from(&required.worker_id), &RecomputeContext::default())?;
        self.require_required_control(required_control_id)
    }

    /// Ends a temporary fix early. The row falls back to its real evidence.
    pub fn clear_temporary_fix(
        &self,
        required_control_id: &RequiredControlId,
    ) -> Result<RequiredControl, RegistryError> {
        let now = self.clock.now();
        let required = self.require_required_control(required_control_id)?;
        // The placeholder stays in the trail; without a backing fix it no longer counts.
        self.store
            .apply(WriteBatch::from(vec![WriteOp::SetTemporaryFix {
                id: required.id.clone(),
                valid_until: None,
                evidence_id: None,
                notes: None,
                updated_at: now,
            }]))?;
        info!(required_control_id = %required.id, "temporary fix cleared");
        self.assignment
            .recompute_worker(&WorkerRef::from(&required.worker_id), &RecomputeContext::default())?;
        self.require_required_control(required_control_id)
    }

    pub fn upsert_role(&self, role: Role) -> Result<Role, RegistryError> {
        self.store
            .apply(WriteBatch::from(vec![WriteOp::UpsertRole(role.clone())]))?;
        Ok(role)
    }

    /// Control changes take effect on the next recompute of each exposed worker.
    pub fn upsert_control(&self, control: Control) -> Result<Control, RegistryError> {
        self.store
            .apply(WriteBatch::from(vec![WriteOp::UpsertControl(control.clone())]))?;
        Ok(control)
    }

    pub fn upsert_hazard(&self, hazard: Hazard) -> Result<RecomputeReport, RegistryError> {
        let hazard_id = hazard.id.clone();
        self.store
            .apply(WriteBatch::from(vec![WriteOp::UpsertHazard(hazard)]))?;
        Ok(self.assignment.recompute_by_hazard(&hazard_id)?)
    }

    /// Links a control to a hazard and recomputes the workers exposed to it.
    pub fn map_control(
        &self,
        hazard_id: &HazardId,
        control_id: &ControlId,
        is_critical: bool,
        priority: i32,
    ) -> Result<RecomputeReport, RegistryError> {
        self.store
            .hazard(hazard_id)?
            .ok_or_else(|| RegistryError::HazardNotFound(hazard_id.clone()))?;
        self.store
            .control(control_id)?
            .ok_or_else(|| RegistryError::ControlNotFound(control_id.clone()))?;

        self.store
            .apply(WriteBatch::from(vec![WriteOp::UpsertHazardControl(
                HazardControl {
                    id: HazardControlId(next_id("hc")),
                    hazard_id: hazard_id.clone(),
                    control_id: control_id.clone(),
                    is_critical,
                    priority,
                },
            )]))?;
        Ok(self.assignment.recompute_by_hazard(hazard_id)?)
    }

    fn require_worker(&self, worker_id: &WorkerId) -> Result<Worker, RegistryError> {
        self.store
            .worker(worker_id)?
            .ok_or_else(|| RegistryError::WorkerNotFound(worker_id.clone()))
    }

    fn require_worker_role(&self, id: &WorkerRoleId) -> Result<WorkerRole, RegistryError> {
        self.store
            .worker_role(id)?
            .ok_or_else(|| RegistryError::WorkerRoleNotFound(id.clone()))
    }

    fn require_required_control(
        &self,
        id: &RequiredControlId,
    ) -> Result<RequiredControl, RegistryError> {
        self.store
            .required_control(id)?
            .ok_or_else(|| RegistryError::RequiredControlNotFound(id.clone()))
    }
}
