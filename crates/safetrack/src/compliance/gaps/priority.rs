use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const MILLIS_PER_DAY: i64 = 86_400_000;
const OVERDUE_BONUS: u8 = 10;
const URGENCY_HORIZON_DAYS: i64 = 30;
const MAX_URGENCY_BONUS: i64 = 10;

/// Risk bucket derived from the highest pre-control risk among linked hazards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub const fn ordered() -> [Self; 4] {
        [Self::Critical, Self::High, Self::Medium, Self::Low]
    }

    pub fn from_risk_score(score: u8) -> Self {
        match score {
            9..=u8::MAX => Self::Critical,
            7..=8 => Self::High,
            4..=6 => Self::Medium,
            _ => Self::Low,
        }
    }

    /// Highest bucket among `scores`; a control linked to no hazard is low risk.
    pub fn from_linked_scores<I>(scores: I) -> Self
    where
        I: IntoIterator<Item = u8>,
    {
        scores
            .into_iter()
            .max()
            .map_or(Self::Low, Self::from_risk_score)
    }

    pub const fn base_priority(self) -> u8 {
        match self {
            Self::Critical => 90,
            Self::High => 70,
            Self::Medium => 50,
            Self::Low => 30,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Critical => "Critical",
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }
}

/// Presentation status of a gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapStatus {
    Overdue,
    Expiring,
    Required,
}

impl GapStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Overdue => "Overdue",
            Self::Expiring => "Expiring",
            Self::Required => "Required",
        }
    }
}

/// Whole days from `now` until the due date, falling back to the evidence expiry.
///
/// Floors toward negative infinity so overdue items report negative days.
pub fn days_until_due(
    due_date: Option<DateTime<Utc>>,
    evidence_expiry: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<i64> {
    due_date
        .or(evidence_expiry)
        .map(|target| (target - now).num_milliseconds().div_euclid(MILLIS_PER_DAY))
}

/// Urgency score in 0..=100; higher means act sooner.
pub fn priority_score(risk: RiskLevel, status: GapStatus, days_until_due: Option<i64>) -> u8 {
    let mut score = u32::from(risk.base_priority());
    if status == GapStatus::Overdue {
        score += u32::from(OVERDUE_BONUS);
    }
    if let Some(days) = days_until_due.filter(|days| *days < URGENCY_HORIZON_DAYS) {
        let bonus = (MAX_URGENCY_BONUS - days.div_euclid(3)).clamp(0, MAX_URGENCY_BONUS);
        score += bonus as u32;
    }
    score.min(100) as u8
}
