//! Read-only gap, coverage, and recommendation analytics over required controls.

mod coverage;
pub mod priority;
mod recommendations;

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use super::clock::Clock;
use super::domain::{
    ClientId, ControlId, ControlType, RequiredControlId, RequiredControlStatus, Worker, WorkerId,
    WorkerStatus,
};
use super::store::{ComplianceStore, StoreError};
use crate::config::EngineConfig;
use coverage::CoverageTally;

pub use coverage::{
    percentage, CoverageReport, CriticalityCoverage, CriticalityCoverageMethod, ReadinessMetrics,
};
pub use priority::{days_until_due, priority_score, GapStatus, RiskLevel};
pub use recommendations::{recommend, Recommendation, RecommendationKind};

const DEFAULT_EXPIRING_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GapAnalysisConfig {
    /// Evidence expiring within this many days turns a requirement into a gap.
    pub expiring_window_days: i64,
    pub criticality_coverage: CriticalityCoverageMethod,
}

impl Default for GapAnalysisConfig {
    fn default() -> Self {
        Self {
            expiring_window_days: DEFAULT_EXPIRING_WINDOW_DAYS,
            criticality_coverage: CriticalityCoverageMethod::default(),
        }
    }
}

impl From<&EngineConfig> for GapAnalysisConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            expiring_window_days: config.expiring_window_days,
            criticality_coverage: config.criticality_coverage,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GapAnalysisError {
    #[error("worker {0} not found")]
    WorkerNotFound(WorkerId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A required control that needs attention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComplianceGap {
    pub worker_id: WorkerId,
    pub worker_name: String,
    pub employee_id: String,
    pub required_control_id: RequiredControlId,
    pub control_id: ControlId,
    pub control_name: String,
    pub control_type: ControlType,
    pub risk_level: RiskLevel,
    pub status: GapStatus,
    pub required_status: RequiredControlStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub evidence_expiry: Option<DateTime<Utc>>,
    pub days_until_due: Option<i64>,
    pub priority: u8,
    pub hazards: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GapSummary {
    pub total: usize,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub expiring: usize,
    pub overdue: usize,
}

impl GapSummary {
    pub fn from_gaps(gaps: &[ComplianceGap]) -> Self {
        let mut summary = Self {
            total: gaps.len(),
            ..Self::default()
        };
        for gap in gaps {
            match gap.risk_level {
                RiskLevel::Critical => summary.critical += 1,
                RiskLevel::High => summary.high += 1,
                RiskLevel::Medium => summary.medium += 1,
                RiskLevel::Low => summary.low += 1,
            }
            match gap.status {
                GapStatus::Expiring => summary.expiring += 1,
                GapStatus::Overdue => summary.overdue += 1,
                GapStatus::Required => {}
            }
        }
        summary
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerSnapshot {
    pub id: WorkerId,
    pub employee_id: String,
    pub name: String,
    pub status: WorkerStatus,
}

impl From<&Worker> for WorkerSnapshot {
    fn from(worker: &Worker) -> Self {
        Self {
            id: worker.id.clone(),
            employee_id: worker.employee_id.clone(),
            name: worker.name.clone(),
            status: worker.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerGapAnalysis {
    pub worker: WorkerSnapshot,
    pub generated_at: DateTime<Utc>,
    pub gaps: Vec<ComplianceGap>,
    pub summary: GapSummary,
    pub coverage: CoverageReport,
    pub readiness: ReadinessMetrics,
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientGapAnalysis {
    pub client_id: ClientId,
    pub generated_at: DateTime<Utc>,
    pub workers_analyzed: usize,
    pub gaps: Vec<ComplianceGap>,
    pub summary: GapSummary,
    pub coverage: CoverageReport,
    pub readiness: ReadinessMetrics,
    pub recommendations: Vec<Recommendation>,
}

/// Derives prioritized gaps for one worker or a client's workforce.
pub struct GapAnalysisEngine<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    config: GapAnalysisConfig,
}

impl<S> GapAnalysisEngine<S>
where
    S: ComplianceStore + 'static,
{
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            config: GapAnalysisConfig::default(),
        }
    }

    pub fn with_config(mut self, config: GapAnalysisConfig) -> Self {
        self.config = config;
        self
    }

    pub fn analyze_worker(
        &self,
        worker_id: &WorkerId,
    ) -> Result<WorkerGapAnalysis, GapAnalysisError> {
        let now = self.clock.now();
        let worker = self
            .store
            .worker(worker_id)?
            .ok_or_else(|| GapAnalysisError::WorkerNotFound(worker_id.clone()))?;

        let mut scan = GapScan::new(self.store.as_ref(), now, self.config.expiring_window_days);
        scan.scan_worker(&worker)?;
        let (gaps, tally) = scan.finish();

        debug!(%worker_id, gaps = gaps.len(), "worker gap analysis complete");
        Ok(WorkerGapAnalysis {
            worker: WorkerSnapshot::from(&worker),
            generated_at: now,
            summary: GapSummary::from_gaps(&gaps),
            coverage: tally.worker_coverage(self.config.criticality_coverage),
            readiness: tally.readiness(),
            recommendations: recommend(&gaps, self.config.expiring_window_days),
            gaps,
        })
    }

    /// Analyzes every worker with an active role assignment scoped to the client.
    pub fn analyze_client(
        &self,
        client_id: &ClientId,
    ) -> Result<ClientGapAnalysis, GapAnalysisError> {
        let now = self.clock.now();
        let workers = self.store.workers_for_client(client_id, now)?;

        let mut scan = GapScan::new(self.store.as_ref(), now, self.config.expiring_window_days);
        for worker in &workers {
            scan.scan_worker(worker)?;
        }
        let (gaps, tally) = scan.finish();

        debug!(
            %client_id,
            workers = workers.len(),
            gaps = gaps.len(),
            "client gap analysis complete"
        );
        Ok(ClientGapAnalysis {
            client_id: client_id.clone(),
            generated_at: now,
            workers_analyzed: workers.len(),
            summary: GapSummary::from_gaps(&gaps),
            coverage: tally.client_coverage(self.config.criticality_coverage),
            readiness: tally.readiness(),
            recommendations: recommend(&gaps, self.config.expiring_window_days),
            gaps,
        })
    }
}

struct LinkedRisk {
    level: RiskLevel,
    hazards: Vec<String>,
}

struct GapScan<'a, S: ?Sized> {
    store: &'a S,
    now: DateTime<Utc>,
    expiring_cutoff: DateTime<Utc>,
    risk_cache: HashMap<ControlId, LinkedRisk>,
    tally: CoverageTally,
    gaps: Vec<ComplianceGap>,
}

impl<'a, S> GapScan<'a, S>
where
    S: ComplianceStore + ?Sized,
{
    fn new(store: &'a S, now: DateTime<Utc>, expiring_window_days: i64) -> Self {
        Self {
            store,
            now,
            expiring_cutoff: now + Duration::days(expiring_window_days),
            risk_cache: HashMap::new(),
            tally: CoverageTally::default(),
            gaps: Vec::new(),
        }
    }

    fn scan_worker(&mut self, worker: &Worker) -> Result<(), StoreError> {
        for row in self.store.required_controls(&worker.id)? {
            let level = self.linked_risk(&row.control_id)?.level;
            self.tally.record_requirement(row.status, level);

            let transient = matches!(
                row.status,
                RequiredControlStatus::Required | RequiredControlStatus::Overdue
            );
            if !transient && row.status != RequiredControlStatus::Temporary {
                continue;
            }

            let evidence_expiry = self
                .store
                .latest_valid_evidence(&row.id)?
                .and_then(|evidence| evidence.expiry_date);
            let expiring = evidence_expiry.map_or(false, |expiry| expiry <= self.expiring_cutoff);
            if !transient && !expiring {
                continue;
            }

            let Some(control) = self.store.control(&row.control_id)? else {
                warn!(control_id = %row.control_id, "required control references unknown control");
                continue;
            };

            let status = if row.status == RequiredControlStatus::Overdue {
                GapStatus::Overdue
            } else if expiring {
                GapStatus::Expiring
            } else {
                GapStatus::Required
            };
            let days = days_until_due(row.due_date, evidence_expiry, self.now);
            let hazards = self.linked_risk(&row.control_id)?.hazards.clone();

            self.tally.record_gap(level);
            self.gaps.push(ComplianceGap {
                worker_id: worker.id.clone(),
                worker_name: worker.name.clone(),
                employee_id: worker.employee_id.clone(),
                required_control_id: row.id.clone(),
                control_id: control.id,
                control_name: control.name,
                control_type: control.control_type,
                risk_level: level,
                status,
                required_status: row.status,
                due_date: row.due_date,
                evidence_expiry,
                days_until_due: days,
                priority: priority_score(level, status, days),
                hazards,
            });
        }
        Ok(())
    }

    fn linked_risk(&mut self, control_id: &ControlId) -> Result<&LinkedRisk, StoreError> {
        if !self.risk_cache.contains_key(control_id) {
            let hazards = self.store.hazards_for_control(control_id)?;
            let level =
                RiskLevel::from_linked_scores(hazards.iter().map(|hazard| hazard.pre_control_risk));
            let mut names: Vec<String> = hazards.into_iter().map(|hazard| hazard.name).collect();
            names.sort();
            names.dedup();
            self.risk_cache.insert(
                control_id.clone(),
                LinkedRisk {
                    level,
                    hazards: names,
                },
            );
        }
        Ok(&self.risk_cache[control_id])
    }

    fn finish(mut self) -> (Vec<ComplianceGap>, CoverageTally) {
        self.gaps.sort_by(compare_gaps);
        (self.gaps, self.tally)
    }
}

/// Priority desc, then soonest due, then worker and control for a stable order.
fn compare_gaps(a: &ComplianceGap, b: &ComplianceGap) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| match (a.days_until_due, b.days_until_due) {
            (Some(left), Some(right)) => left.cmp(&right),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.worker_id.cmp(&b.worker_id))
        .then_with(|| a.control_name.cmp(&b.control_name))
}
