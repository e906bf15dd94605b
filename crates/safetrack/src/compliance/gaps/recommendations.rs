use std::collections::BTreeSet;

use serde::Serialize;

use super::priority::{GapStatus, RiskLevel};
use super::ComplianceGap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    CriticalGaps,
    OverdueControls,
    ExpiringSoon,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recommendation {
    pub kind: RecommendationKind,
    pub priority: u8,
    pub title: String,
    pub description: String,
    pub actions: Vec<String>,
    pub gap_count: usize,
    pub affected_workers: usize,
}

/// Rule table over the gap list; each rule fires only when its subset is non-empty.
pub fn recommend(gaps: &[ComplianceGap], expiring_window_days: i64) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();

    let critical: Vec<&ComplianceGap> = gaps
        .iter()
        .filter(|gap| gap.risk_level == RiskLevel::Critical)
        .collect();
    if !critical.is_empty() {
        let workers = distinct_workers(&critical);
        recommendations.push(Recommendation {
            kind: RecommendationKind::CriticalGaps,
            priority: 100,
            title: format!(
                "Address {} critical gap(s) affecting {} worker(s)",
                critical.len(),
                workers
            ),
            description: "Controls protecting against the highest-risk hazards are missing or lapsed."
                .to_string(),
            actions: vec![
                "Review critical gaps immediately".to_string(),
                "Apply a temporary fix where work must continue".to_string(),
                "Schedule the outstanding training or assessments".to_string(),
                "Consider restricting affected workers from exposed tasks".to_string(),
            ],
            gap_count: critical.len(),
            affected_workers: workers,
        });
    }

    let overdue: Vec<&ComplianceGap> = gaps
        .iter()
        .filter(|gap| gap.status == GapStatus::Overdue)
        .collect();
    if !overdue.is_empty() {
        let workers = distinct_workers(&overdue);
        recommendations.push(Recommendation {
            kind: RecommendationKind::OverdueControls,
            priority: 95,
            title: format!(
                "Resolve {} overdue control(s) for {} worker(s)",
                overdue.len(),
                workers
            ),
            description: "Evidence for these controls has expired.".to_string(),
            actions: vec![
                "Restrict affected workers until evidence is renewed".to_string(),
                "Contact workers to arrange renewal".to_string(),
                "Apply a temporary fix if renewal is already booked".to_string(),
                "Escalate unresolved items to the site supervisor".to_string(),
            ],
            gap_count: overdue.len(),
            affected_workers: workers,
        });
    }

    let expiring: Vec<&ComplianceGap> = gaps
        .iter()
        .filter(|gap| gap.status == GapStatus::Expiring)
        .collect();
    if !expiring.is_empty() {
        let workers = distinct_workers(&expiring);
        recommendations.push(Recommendation {
            kind: RecommendationKind::ExpiringSoon,
            priority: 80,
            title: format!(
                "Renew {} control(s) expiring within {} days",
                expiring.len(),
                expiring_window_days
            ),
            description: format!("{workers} worker(s) hold evidence that is about to lapse."),
            actions: vec![
                "Book refresher training".to_string(),
                "Book assessments before expiry".to_string(),
                "Send renewal reminders to workers".to_string(),
                "Add expiry dates to the site calendar".to_string(),
            ],
            gap_count: expiring.len(),
            affected_workers: workers,
        });
    }

    recommendations.sort_by(|a, b| b.priority.cmp(&a.priority));
    recommendations
}

fn distinct_workers(gaps: &[&ComplianceGap]) -> usize {
    gaps.iter()
        .map(|gap| &gap.worker_id)
        .collect::<BTreeSet<_>>()
        .len()
}
