use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::priority::RiskLevel;
use crate::compliance::domain::RequiredControlStatus;

/// How per-criticality coverage is computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriticalityCoverageMethod {
    /// Denominator is the number of required controls whose derived risk level matches.
    #[default]
    Exact,
    /// Notional denominator of `max(1, gaps + satisfied / 4)` per level; worker views report 100.
    Estimated,
}

impl CriticalityCoverageMethod {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "exact" => Some(Self::Exact),
            "estimated" | "estimate" | "heuristic" => Some(Self::Estimated),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CriticalityCoverage {
    pub critical: u8,
    pub high: u8,
    pub medium: u8,
    pub low: u8,
}

impl CriticalityCoverage {
    pub const FULL: Self = Self {
        critical: 100,
        high: 100,
        medium: 100,
        low: 100,
    };

    pub fn get(&self, level: RiskLevel) -> u8 {
        match level {
            RiskLevel::Critical => self.critical,
            RiskLevel::High => self.high,
            RiskLevel::Medium => self.medium,
            RiskLevel::Low => self.low,
        }
    }

    fn set(&mut self, level: RiskLevel, value: u8) {
        match level {
            RiskLevel::Critical => self.critical = value,
            RiskLevel::High => self.high = value,
            RiskLevel::Medium => self.medium = value,
            RiskLevel::Low => self.low = value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CoverageReport {
    pub overall: u8,
    pub by_criticality: CriticalityCoverage,
    pub method: CriticalityCoverageMethod,
}

/// Operational counts satisfied or temporary rows; audit counts satisfied rows only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReadinessMetrics {
    pub total_required: usize,
    pub satisfied: usize,
    pub temporary: usize,
    pub operational_readiness: u8,
    pub audit_readiness: u8,
}

/// Rounded percentage; an empty population counts as fully covered.
pub fn percentage(part: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((part as f64 / total as f64) * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Running counts collected while scanning required controls.
#[derive(Debug, Clone, Default)]
pub(crate) struct CoverageTally {
    pub(crate) total_required: usize,
    pub(crate) satisfied: usize,
    pub(crate) temporary: usize,
    pub(crate) required_by_level: BTreeMap<RiskLevel, usize>,
    pub(crate) gaps_by_level: BTreeMap<RiskLevel, usize>,
}

impl CoverageTally {
    pub(crate) fn record_requirement(&mut self, status: RequiredControlStatus, level: RiskLevel) {
        self.total_required += 1;
        match status {
            RequiredControlStatus::Satisfied => self.satisfied += 1,
            RequiredControlStatus::Temporary => self.temporary += 1,
            RequiredControlStatus::Required | RequiredControlStatus::Overdue => {}
        }
        *self.required_by_level.entry(level).or_default() += 1;
    }

    pub(crate) fn record_gap(&mut self, level: RiskLevel) {
        *self.gaps_by_level.entry(level).or_default() += 1;
    }

    pub(crate) fn readiness(&self) -> ReadinessMetrics {
        ReadinessMetrics {
            total_required: self.total_required,
            satisfied: self.satisfied,
            temporary: self.temporary,
            operational_readiness: percentage(self.satisfied + self.temporary, self.total_required),
            audit_readiness: percentage(self.satisfied, self.total_required),
        }
    }

    pub(crate) fn client_coverage(&self, method: CriticalityCoverageMethod) -> CoverageReport {
        let by_criticality = match method {
            CriticalityCoverageMethod::Exact => self.exact_by_criticality(),
            CriticalityCoverageMethod::Estimated => self.estimated_by_criticality(),
        };
        CoverageReport {
            overall: percentage(self.satisfied, self.total_required),
            by_criticality,
            method,
        }
    }

    pub(crate) fn worker_coverage(&self, method: CriticalityCoverageMethod) -> CoverageReport {
        let by_criticality = match method {
            CriticalityCoverageMethod::Exact => self.exact_by_criticality(),
            CriticalityCoverageMethod::Estimated => CriticalityCoverage::FULL,
        };
        CoverageReport {
            overall: percentage(self.satisfied, self.total_required),
            by_criticality,
            method,
        }
    }

    fn gaps_at(&self, level: RiskLevel) -> usize {
        self.gaps_by_level.get(&level).copied().unwrap_or(0)
    }

    fn exact_by_criticality(&self) -> CriticalityCoverage {
        let mut coverage = CriticalityCoverage::FULL;
        for level in RiskLevel::ordered() {
            let total = self.required_by_level.get(&level).copied().unwrap_or(0);
            let gaps = self.gaps_at(level).min(total);
            coverage.set(level, percentage(total - gaps, total));
        }
        coverage
    }

    fn estimated_by_criticality(&self) -> CriticalityCoverage {
        let mut coverage = CriticalityCoverage::FULL;
        for level in RiskLevel::ordered() {
            let gaps = self.gaps_at(level);
            let total = (gaps + self.satisfied / 4).max(1);
            coverage.set(level, percentage(total.saturating_sub(gaps), total));
        }
        coverage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_population_is_fully_ready() {
        let tally = CoverageTally::default();
        let readiness = tally.readiness();
        assert_eq!(readiness.operational_readiness, 100);
        assert_eq!(readiness.audit_readiness, 100);
        assert_eq!(
            tally.client_coverage(CriticalityCoverageMethod::Exact).overall,
            100
        );
    }

    #[test]
    fn readiness_separates_temporary_from_satisfied() {
        let mut tally = CoverageTally::default();
        tally.record_requirement(RequiredControlStatus::Satisfied, RiskLevel::High);
        tally.record_requirement(RequiredControlStatus::Temporary, RiskLevel::High);
        tally.record_requirement(RequiredControlStatus::Required, RiskLevel::Low);

        let readiness = tally.readiness();
        assert_eq!(readiness.operational_readiness, 67);
        assert_eq!(readiness.audit_readiness, 33);
    }

    #[test]
    fn exact_coverage_uses_level_denominator() {
        let mut tally = CoverageTally::default();
        for _ in 0..3 {
            tally.record_requirement(RequiredControlStatus::Satisfied, RiskLevel::Critical);
        }
        tally.record_requirement(RequiredControlStatus::Overdue, RiskLevel::Critical);
        tally.record_gap(RiskLevel::Critical);

        let coverage = tally.client_coverage(CriticalityCoverageMethod::Exact);
        assert_eq!(coverage.overall, 75);
        assert_eq!(coverage.by_criticality.critical, 75);
        assert_eq!(coverage.by_criticality.low, 100);
    }

    #[test]
    fn estimated_coverage_reproduces_notional_denominator() {
        let mut tally = CoverageTally::default();
        for _ in 0..8 {
            tally.record_requirement(RequiredControlStatus::Satisfied, RiskLevel::Low);
        }
        tally.record_requirement(RequiredControlStatus::Required, RiskLevel::High);
        tally.record_gap(RiskLevel::High);

        let coverage = tally.client_coverage(CriticalityCoverageMethod::Estimated);
        // total = max(1, 1 + 8 / 4) = 3, so (3 - 1) / 3
        assert_eq!(coverage.by_criticality.high, 67);
        assert_eq!(coverage.by_criticality.critical, 100);

        let worker = tally.worker_coverage(CriticalityCoverageMethod::Estimated);
        assert_eq!(worker.by_criticality, CriticalityCoverage::FULL);
        assert_eq!(worker.overall, 89);
    }
}
