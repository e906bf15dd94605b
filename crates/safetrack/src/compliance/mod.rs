//! Safety-control assignment, gap analysis, and readiness scoring.
//!
//! The assignment engine owns the truth of which controls each worker must hold and their
//! status. Gap analysis and scoring are read-only views over that truth. The registry wraps
//! the write side and keeps the truth current by recomputing after each mutation.

pub mod assignment;
pub mod clock;
pub mod domain;
pub mod gaps;
pub mod import;
pub mod mapping;
pub mod memory;
pub mod registry;
pub mod router;
pub mod scoring;
pub mod service;
pub mod store;
pub mod worker_ref;

#[cfg(test)]
mod tests;

pub use assignment::{
    AssignmentConfig, AssignmentEngine, AssignmentError, RecomputeOutcome, RecomputeReport,
    RecomputeSummary, SkipReason,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use domain::{
    ClientId, Control, ControlId, ControlType, Evidence, EvidenceArtifact, EvidenceId,
    EvidenceStatus, Hazard, HazardControl, HazardControlId, HazardId, RecomputeContext,
    RequiredControl, RequiredControlId, RequiredControlStatus, Role, RoleId, SiteId, Worker,
    WorkerId, WorkerRole, WorkerRoleId, WorkerStatus,
};
pub use gaps::{
    ClientGapAnalysis, ComplianceGap, CoverageReport, CriticalityCoverageMethod,
    GapAnalysisConfig, GapAnalysisEngine, GapAnalysisError, GapStatus, GapSummary,
    ReadinessMetrics, Recommendation, RecommendationKind, RiskLevel, WorkerGapAnalysis,
};
pub use import::{RosterImportError, RosterImportSummary, RosterImporter};
pub use mapping::{HazardOverlay, NoOverlay, RoleHazardMap, StaticRoleHazardMap};
pub use memory::InMemoryStore;
pub use registry::{NewEvidence, NewWorker, RegistryError, RegistryService, RoleAssignment};
pub use router::{compliance_router, RecomputeWorkerRequest};
pub use scoring::{ReadinessScore, ScoringEngine, ScoringError, SubScore};
pub use service::ComplianceService;
pub use store::{ComplianceStore, StoreError, WriteBatch, WriteOp};
pub use worker_ref::{resolve_worker_id, WorkerRef};
