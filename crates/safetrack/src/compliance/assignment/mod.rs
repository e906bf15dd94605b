//! Keeps each worker's required controls in sync with role exposure and evidence.

mod locks;
pub mod status;

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError};

use serde::Serialize;
use tracing::{debug, info, warn};

use super::clock::Clock;
use super::domain::{
    Control, ControlId, HazardId, HazardProfile, RecomputeContext, RequiredControl, WorkerId,
    WorkerStatus,
};
use super::mapping::{HazardOverlay, NoOverlay, RoleHazardMap, StaticRoleHazardMap};
use super::store::{ComplianceStore, StoreError, WriteBatch, WriteOp};
use super::worker_ref::{resolve_worker_id, WorkerRef};
use crate::config::EngineConfig;
use locks::WorkerLocks;

pub use status::{
    derive_status, evidence_counts, governing_evidence, operational_coverage,
    rollup_worker_status, DerivedStatus,
};

const DEFAULT_COVERAGE_THRESHOLD: f64 = 0.80;
const DEFAULT_RECOMPUTE_THREADS: usize = 4;

/// Tuning for the assignment engine.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentConfig {
    /// Operational coverage below this restricts a worker.
    pub coverage_threshold: f64,
    pub parallel_recompute: bool,
    pub recompute_threads: usize,
}

impl AssignmentConfig {
    pub fn new(coverage_threshold: f64, parallel_recompute: bool, recompute_threads: usize) -> Self {
        let coverage_threshold = if coverage_threshold.is_finite()
            && coverage_threshold > 0.0
            && coverage_threshold <= 1.0
        {
            coverage_threshold
        } else {
            DEFAULT_COVERAGE_THRESHOLD
        };

        Self {
            coverage_threshold,
            parallel_recompute,
            recompute_threads: recompute_threads.max(1),
        }
    }
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self::new(DEFAULT_COVERAGE_THRESHOLD, false, DEFAULT_RECOMPUTE_THREADS)
    }
}

impl From<&EngineConfig> for AssignmentConfig {
    fn from(config: &EngineConfig) -> Self {
        Self::new(
            config.coverage_threshold,
            config.parallel_recompute,
            config.recompute_threads,
        )
    }
}

/// Error raised by the assignment engine.
#[derive(Debug, thiserror::Error)]
pub enum AssignmentError {
    #[error("missing worker id")]
    MissingWorkerId,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Why a recompute was a benign no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    WorkerNotFound,
    NoActiveRoles,
    NoMappedCategories,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecomputeSummary {
    pub worker_id: WorkerId,
    pub created: usize,
    pub deleted: usize,
    /// Covered rows kept as history although no longer required.
    pub retained: usize,
    pub updated: usize,
    pub worker_status: WorkerStatus,
    pub status_changed: bool,
}

impl RecomputeSummary {
    pub fn writes(&self) -> usize {
        self.created + self.deleted + self.updated + usize::from(self.status_changed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecomputeOutcome {
    Skipped {
        worker_id: WorkerId,
        reason: SkipReason,
    },
    Recomputed(RecomputeSummary),
}

impl RecomputeOutcome {
    pub fn summary(&self) -> Option<&RecomputeSummary> {
        match self {
            Self::Recomputed(summary) => Some(summary),
            Self::Skipped { .. } => None,
        }
    }
}

/// Aggregate of a multi-worker recompute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecomputeReport {
    pub processed: usize,
    pub recomputed: usize,
    pub skipped: usize,
    pub writes: usize,
    pub restricted: Vec<WorkerId>,
}

impl RecomputeReport {
    fn from_outcomes(outcomes: Vec<RecomputeOutcome>) -> Self {
        let mut report = Self {
            processed: outcomes.len(),
            ..Self::default()
        };
        for outcome in outcomes {
            match outcome {
                RecomputeOutcome::Skipped { .. } => report.skipped += 1,
                RecomputeOutcome::Recomputed(summary) => {
                    report.recomputed += 1;
                    report.writes += summary.writes();
                    if summary.worker_status == WorkerStatus::Restricted {
                        report.restricted.push(summary.worker_id);
                    }
                }
            }
        }
        report
    }
}

/// Controls required right now, derived from a set of hazard profiles.
struct Exposure {
    required_now: BTreeSet<ControlId>,
    critical: BTreeSet<ControlId>,
    controls: HashMap<ControlId, Control>,
}

impl Exposure {
    fn from_profiles(profiles: &[HazardProfile]) -> Self {
        let mut exposure = Self {
            required_now: BTreeSet::new(),
            critical: BTreeSet::new(),
            controls: HashMap::new(),
        };

        for mapped in profiles.iter().flat_map(|profile| profile.controls.iter()) {
            let control_id = &mapped.control.id;
            exposure.required_now.insert(control_id.clone());
            if mapped.mapping.is_critical {
                exposure.critical.insert(control_id.clone());
            }
            exposure
                .controls
                .entry(control_id.clone())
                .or_insert_with(|| mapped.control.clone());
        }

        exposure
    }
}

/// Maintains the truth of which controls each worker needs and their status.
pub struct AssignmentEngine<S> {
    store: Arc<S>,
    roles: Arc<dyn RoleHazardMap>,
    overlay: Arc<dyn HazardOverlay>,
    clock: Arc<dyn Clock>,
    config: AssignmentConfig,
    locks: WorkerLocks,
}

impl<S> AssignmentEngine<S>
where
    S: ComplianceStore + 'static,
{
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            roles: Arc::new(StaticRoleHazardMap::standard()),
            overlay: Arc::new(NoOverlay),
            clock,
            config: AssignmentConfig::default(),
            locks: WorkerLocks::default(),
        }
    }

    pub fn with_role_map(mut self, roles: Arc<dyn RoleHazardMap>) -> Self {
        self.roles = roles;
        self
    }

    pub fn with_overlay(mut self, overlay: Arc<dyn HazardOverlay>) -> Self {
        self.overlay = overlay;
        self
    }

    pub fn with_config(mut self, config: AssignmentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &AssignmentConfig {
        &self.config
    }

    /// Recompute one worker's required controls, statuses, and overall status.
    pub fn recompute_worker(
        &self,
        worker: &WorkerRef,
        context: &RecomputeContext,
    ) -> Result<RecomputeOutcome, AssignmentError> {
        let worker_id = resolve_worker_id(self.store.as_ref(), worker)?
            .ok_or(AssignmentError::MissingWorkerId)?;
        self.recompute_serialized(&worker_id, context)
    }

    /// Recompute every worker that is not inactive.
    pub fn recompute_all(&self) -> Result<RecomputeReport, AssignmentError> {
        let worker_ids: Vec<WorkerId> = self
            .store
            .workers()?
            .into_iter()
            .filter(|worker| worker.status != WorkerStatus::Inactive)
            .map(|worker| worker.id)
            .collect();

        info!(
            workers = worker_ids.len(),
            parallel = self.config.parallel_recompute,
            "starting full recompute"
        );
        let report = self.recompute_many(&worker_ids, &RecomputeContext::default())?;
        info!(
            processed = report.processed,
            recomputed = report.recomputed,
            skipped = report.skipped,
            writes = report.writes,
            "full recompute finished"
        );
        Ok(report)
    }

    /// Recompute only workers whose active roles expose them to the hazard's category.
    pub fn recompute_by_hazard(
        &self,
        hazard_id: &HazardId,
    ) -> Result<RecomputeReport, AssignmentError> {
        let Some(hazard) = self.store.hazard(hazard_id)? else {
            info!(%hazard_id, "hazard not found; nothing to recompute");
            return Ok(RecomputeReport::default());
        };

        let now = self.clock.now();
        let mut affected = Vec::new();
        for worker in self.store.workers()? {
            if worker.status == WorkerStatus::Inactive {
                continue;
            }
            let role_names = self.active_role_names(&worker.id, now)?;
            if self
                .roles
                .categories_for_roles(&role_names)
                .contains(&hazard.category)
            {
                affected.push(worker.id);
            }
        }

        info!(
            %hazard_id,
            category = %hazard.category,
            workers = affected.len(),
            "recomputing workers exposed to hazard"
        );
        self.recompute_many(&affected, &RecomputeContext::default())
    }

    fn recompute_many(
        &self,
        worker_ids: &[WorkerId],
        context: &RecomputeContext,
    ) -> Result<RecomputeReport, AssignmentError> {
        let outcomes = if self.config.parallel_recompute
            && self.config.recompute_threads > 1
            && worker_ids.len() > 1
        {
            self.recompute_parallel(worker_ids, context)?
        } else {
            worker_ids
                .iter()
                .map(|worker_id| self.recompute_serialized(worker_id, context))
                .collect::<Result<Vec<_>, _>>()?
        };
        Ok(RecomputeReport::from_outcomes(outcomes))
    }

    fn recompute_parallel(
        &self,
        worker_ids: &[WorkerId],
        context: &RecomputeContext,
    ) -> Result<Vec<RecomputeOutcome>, AssignmentError> {
        let chunk_size = worker_ids.len().div_ceil(self.config.recompute_threads);
        std::thread::scope(|scope| {
            let handles: Vec<_> = worker_ids
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move || {
                        chunk
                            .iter()
                            .map(|worker_id| self.recompute_serialized(worker_id, context))
                            .collect::<Result<Vec<_>, _>>()
                    })
                })
                .collect();

            let mut outcomes = Vec::with_capacity(worker_ids.len());
            for handle in handles {
                match handle.join() {
                    Ok(result) => outcomes.extend(result?),
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            }
            Ok(outcomes)
        })
    }

    fn recompute_serialized(
        &self,
        worker_id: &WorkerId,
        context: &RecomputeContext,
    ) -> Result<RecomputeOutcome, AssignmentError> {
        let lock = self.locks.lock_for(worker_id);
        let outcome = {
            let _serialized = lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.recompute_resolved(worker_id, context)
        };
        self.locks.release(worker_id, lock);
        outcome
    }

    fn recompute_resolved(
        &self,
        worker_id: &WorkerId,
        context: &RecomputeContext,
    ) -> Result<RecomputeOutcome, AssignmentError> {
        let now = self.clock.now();
        let skipped = |reason| RecomputeOutcome::Skipped {
            worker_id: worker_id.clone(),
            reason,
        };

        let Some(worker) = self.store.worker(worker_id)? else {
            info!(%worker_id, "worker not found; skipping recompute");
            return Ok(skipped(SkipReason::WorkerNotFound));
        };

        let role_names = self.active_role_names(worker_id, now)?;
        if role_names.is_empty() {
            info!(%worker_id, "worker has no active roles; skipping recompute");
            return Ok(skipped(SkipReason::NoActiveRoles));
        }

        let categories = self.roles.categories_for_roles(&role_names);
        if categories.is_empty() {
            info!(%worker_id, roles = ?role_names, "no hazard categories mapped to roles; skipping recompute");
            return Ok(skipped(SkipReason::NoMappedCategories));
        }

        let mut profiles = self.store.hazard_profiles(&categories)?;
        profiles.extend(self.overlay.overlay_hazards(worker_id, context)?);
        let exposure = Exposure::from_profiles(&profiles);

        let existing = self.store.required_controls(worker_id)?;
        let existing_controls: BTreeSet<&ControlId> =
            existing.iter().map(|row| &row.control_id).collect();

        let mut membership = WriteBatch::new();
        let mut created = 0;
        for control_id in &exposure.required_now {
            if !existing_controls.contains(control_id) {
                membership.push(WriteOp::UpsertRequiredControl(RequiredControl::new(
                    worker_id.clone(),
                    control_id.clone(),
                    now,
                )));
                created += 1;
            }
        }

        let mut deleted = 0;
        let mut retained = 0;
        for row in existing
            .iter()
            .filter(|row| !exposure.required_now.contains(&row.control_id))
        {
            if row.status.is_covered() {
                retained += 1;
            } else {
                membership.push(WriteOp::DeleteRequiredControl(row.id.clone()));
                deleted += 1;
            }
        }

        if !membership.is_empty() {
            self.store.apply(membership)?;
        }

        let mut current = self.store.required_controls(worker_id)?;
        let mut updates = WriteBatch::new();
        let mut updated = 0;
        for row in current
            .iter_mut()
            .filter(|row| exposure.required_now.contains(&row.control_id))
        {
            let evidence = self.store.evidence(&row.id)?;
            let derived = derive_status(
                row,
                governing_evidence(row, &evidence),
                exposure.controls.get(&row.control_id),
                now,
            );
            if derived.differs_from(row) {
                updates.push(WriteOp::UpdateRequiredControlStatus {
                    id: row.id.clone(),
                    status: derived.status,
                    due_date: derived.due_date,
                    updated_at: now,
                });
                row.status = derived.status;
                row.due_date = derived.due_date;
                updated += 1;
            }
        }

        let worker_status = if worker.status == WorkerStatus::Inactive {
            WorkerStatus::Inactive
        } else {
            rollup_worker_status(&current, &exposure.critical, self.config.coverage_threshold)
        };
        let status_changed = worker_status != worker.status;
        if status_changed {
            updates.push(WriteOp::SetWorkerStatus {
                worker_id: worker_id.clone(),
                status: worker_status,
            });
        }

        if !updates.is_empty() {
            self.store.apply(updates)?;
        }

        if status_changed && worker_status == WorkerStatus::Restricted {
            warn!(%worker_id, "worker restricted by compliance gaps");
        }
        debug!(
            %worker_id,
            created,
            deleted,
            retained,
            updated,
            status = worker_status.label(),
            "worker recompute applied"
        );

        Ok(RecomputeOutcome::Recomputed(RecomputeSummary {
            worker_id: worker_id.clone(),
            created,
            deleted,
            retained,
            updated,
            worker_status,
            status_changed,
        }))
    }

    fn active_role_names(
        &self,
        worker_id: &WorkerId,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<String>, StoreError> {
        let mut names: Vec<String> = Vec::new();
        for assignment in self
            .store
            .worker_roles(worker_id)?
            .into_iter()
            .filter(|assignment| assignment.is_active_at(now))
        {
            if let Some(role) = self.store.role(&assignment.role_id)? {
                if !names.contains(&role.name) {
                    names.push(role.name);
                }
            }
        }
        Ok(names)
    }
}
