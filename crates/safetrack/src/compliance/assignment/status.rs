use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::compliance::domain::{
    Control, ControlId, Evidence, EvidenceArtifact, RequiredControl, RequiredControlStatus,
    WorkerStatus,
};

/// Status and due date derived for a required control at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DerivedStatus {
    pub status: RequiredControlStatus,
    pub due_date: Option<DateTime<Utc>>,
}

impl DerivedStatus {
    pub fn differs_from(&self, required: &RequiredControl) -> bool {
        self.status != required.status || self.due_date != required.due_date
    }
}

/// Temporary placeholders only count while they back the row's current fix.
pub fn evidence_counts(required: &RequiredControl, evidence: &Evidence) -> bool {
    match evidence.artifact {
        EvidenceArtifact::Temporary => required.temp_evidence_id.as_ref() == Some(&evidence.id),
        _ => true,
    }
}

/// Newest evidence that may drive the row's status. `evidence` is ordered newest first.
pub fn governing_evidence<'a>(
    required: &RequiredControl,
    evidence: &'a [Evidence],
) -> Option<&'a Evidence> {
    evidence
        .iter()
        .find(|evidence| evidence_counts(required, evidence))
}

/// Derives a requirement's status from its temp-fix window and latest evidence.
///
/// An unexpired temporary fix wins over any evidence. Evidence without an expiry never lapses.
/// Without evidence the due date counts from the row's creation, so it is stable across recomputes.
pub fn derive_status(
    required: &RequiredControl,
    latest_evidence: Option<&Evidence>,
    control: Option<&Control>,
    now: DateTime<Utc>,
) -> DerivedStatus {
    if let Some(valid_until) = required.temp_valid_until.filter(|until| *until > now) {
        return DerivedStatus {
            status: RequiredControlStatus::Temporary,
            due_date: Some(valid_until),
        };
    }

    let Some(evidence) = latest_evidence else {
        let due_date = control
            .and_then(|control| control.validity_days)
            .map(|days| required.created_at + Duration::days(i64::from(days)));
        return DerivedStatus {
            status: RequiredControlStatus::Required,
            due_date,
        };
    };

    match evidence.expiry_date {
        Some(expiry) if expiry <= now => DerivedStatus {
            status: RequiredControlStatus::Overdue,
            due_date: Some(expiry),
        },
        expiry => DerivedStatus {
            status: RequiredControlStatus::Satisfied,
            due_date: expiry,
        },
    }
}

/// Share of rows that are satisfied or under a temporary fix. `None` when there are no rows.
pub fn operational_coverage(rows: &[RequiredControl]) -> Option<f64> {
    if rows.is_empty() {
        return None;
    }
    let covered = rows.iter().filter(|row| row.status.is_covered()).count();
    Some(covered as f64 / rows.len() as f64)
}

/// Restricted when any uncovered control is critical or coverage falls below `threshold`.
pub fn rollup_worker_status(
    rows: &[RequiredControl],
    critical_control_ids: &BTreeSet<ControlId>,
    threshold: f64,
) -> WorkerStatus {
    let Some(coverage) = operational_coverage(rows) else {
        return WorkerStatus::Active;
    };

    let critical_gap = rows
        .iter()
        .any(|row| !row.status.is_covered() && critical_control_ids.contains(&row.control_id));

    if critical_gap || coverage < threshold {
        WorkerStatus::Restricted
    } else {
        WorkerStatus::Active
    }
}
