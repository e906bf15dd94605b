//! Aggregate 0-100 readiness score per worker from weighted sub-scores.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::assignment::evidence_counts;
use super::clock::Clock;
use super::domain::{Evidence, RequiredControl, Worker, WorkerId};
use super::store::{ComplianceStore, StoreError};

const COVERAGE_WEIGHT: f64 = 0.40;
const QUALITY_WEIGHT: f64 = 0.25;
const EFFECTIVENESS_WEIGHT: f64 = 0.25;
const VELOCITY_WEIGHT: f64 = 0.10;

const PLACEHOLDER_EFFECTIVENESS: f64 = 0.85;
const PLACEHOLDER_VELOCITY: f64 = 0.80;

/// Inputs available to every sub-score.
pub struct ScoringInput<'a> {
    pub worker: &'a Worker,
    pub required: &'a [RequiredControl],
    /// Evidence across the worker's required controls, minus retired fix placeholders.
    pub evidence: &'a [Evidence],
    pub now: DateTime<Utc>,
}

/// Pluggable 0..=1 sub-score so data-backed metrics can replace placeholders.
pub trait SubScore: Send + Sync {
    fn score(&self, input: &ScoringInput<'_>) -> f64;
}

/// Constant sub-score used until incident and closure-rate data exist.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedScore(pub f64);

impl SubScore for FixedScore {
    fn score(&self, _input: &ScoringInput<'_>) -> f64 {
        self.0
    }
}

/// Share of required controls backed by at least one valid, unexpired evidence row.
#[derive(Debug, Default, Clone, Copy)]
pub struct EvidenceCoverage;

impl SubScore for EvidenceCoverage {
    fn score(&self, input: &ScoringInput<'_>) -> f64 {
        if input.required.is_empty() {
            return 1.0;
        }
        let backed = input
            .required
            .iter()
            .filter(|required| {
                input.evidence.iter().any(|evidence| {
                    evidence.required_control_id == required.id && evidence.is_current_at(input.now)
                })
            })
            .count();
        backed as f64 / input.required.len() as f64
    }
}

/// Share of evidence rows that are valid and unexpired.
#[derive(Debug, Default, Clone, Copy)]
pub struct EvidenceQuality;

impl SubScore for EvidenceQuality {
    fn score(&self, input: &ScoringInput<'_>) -> f64 {
        if input.evidence.is_empty() {
            return 0.0;
        }
        let current = input
            .evidence
            .iter()
            .filter(|evidence| evidence.is_current_at(input.now))
            .count();
        current as f64 / input.evidence.len() as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadinessScore {
    pub worker_id: WorkerId,
    pub rbcs: u8,
    pub coverage: f64,
    pub quality: f64,
    pub effectiveness: f64,
    pub velocity: f64,
    pub evaluated_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    #[error("worker {0} not found")]
    WorkerNotFound(WorkerId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// `round(100 * (0.40 coverage + 0.25 quality + 0.25 effectiveness + 0.10 velocity))`.
pub fn weighted_score(coverage: f64, quality: f64, effectiveness: f64, velocity: f64) -> u8 {
    let clamp = |value: f64| {
        if value.is_finite() {
            value.clamp(0.0, 1.0)
        } else {
            0.0
        }
    };
    let total = COVERAGE_WEIGHT * clamp(coverage)
        + QUALITY_WEIGHT * clamp(quality)
        + EFFECTIVENESS_WEIGHT * clamp(effectiveness)
        + VELOCITY_WEIGHT * clamp(velocity);
    (total * 100.0).round().clamp(0.0, 100.0) as u8
}

pub struct ScoringEngine<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    coverage: Arc<dyn SubScore>,
    quality: Arc<dyn SubScore>,
    effectiveness: Arc<dyn SubScore>,
    velocity: Arc<dyn SubScore>,
}

impl<S> ScoringEngine<S>
where
    S: ComplianceStore + 'static,
{
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            coverage: Arc::new(EvidenceCoverage),
            quality: Arc::new(EvidenceQuality),
            effectiveness: Arc::new(FixedScore(PLACEHOLDER_EFFECTIVENESS)),
            velocity: Arc::new(FixedScore(PLACEHOLDER_VELOCITY)),
        }
    }

    pub fn with_effectiveness(mut self, effectiveness: Arc<dyn SubScore>) -> Self {
        self.effectiveness = effectiveness;
        self
    }

    pub fn with_velocity(mut self, velocity: Arc<dyn SubScore>) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn score_worker(&self, worker_id: &WorkerId) -> Result<ReadinessScore, ScoringError> {
        let now = self.clock.now();
        let worker = self
            .store
            .worker(worker_id)?
            .ok_or_else(|| ScoringError::WorkerNotFound(worker_id.clone()))?;
        let required = self.store.required_controls(worker_id)?;
        let mut evidence = Vec::new();
        for row in &required {
            evidence.extend(
                self.store
                    .evidence(&row.id)?
                    .into_iter()
                    .filter(|evidence| evidence_counts(row, evidence)),
            );
        }

        let input = ScoringInput {
            worker: &worker,
            required: &required,
            evidence: &evidence,
            now,
        };
        let coverage = self.coverage.score(&input);
        let quality = self.quality.score(&input);
        let effectiveness = self.effectiveness.score(&input);
        let velocity = self.velocity.score(&input);

        Ok(ReadinessScore {
            worker_id: worker.id.clone(),
            rbcs: weighted_score(coverage, quality, effectiveness, velocity),
            coverage,
            quality,
            effectiveness,
            velocity,
            evaluated_at: now,
        })
    }
}
