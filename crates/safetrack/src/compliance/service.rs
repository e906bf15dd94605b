use std::sync::Arc;

use super::assignment::{AssignmentConfig, AssignmentEngine};
use super::clock::Clock;
use super::gaps::{GapAnalysisConfig, GapAnalysisEngine};
use super::mapping::{HazardOverlay, RoleHazardMap, StaticRoleHazardMap};
use super::registry::RegistryService;
use super::scoring::ScoringEngine;
use super::store::ComplianceStore;
use crate::config::{ConfigError, EngineConfig};

/// One store, one clock, and every engine wired over them.
pub struct ComplianceService<S> {
    store: Arc<S>,
    assignment: Arc<AssignmentEngine<S>>,
    gaps: GapAnalysisEngine<S>,
    scoring: ScoringEngine<S>,
    registry: RegistryService<S>,
}

impl<S> ComplianceService<S>
where
    S: ComplianceStore + 'static,
{
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, config: &EngineConfig) -> Self {
        Self::with_role_map(
            store,
            clock,
            config,
            Arc::new(StaticRoleHazardMap::standard()),
        )
    }

    /// Loads the role table named by the config, falling back to the built-in one.
    pub fn from_config(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        config: &EngineConfig,
    ) -> Result<Self, ConfigError> {
        let roles = match &config.role_map_path {
            Some(path) => StaticRoleHazardMap::from_path(path).map_err(|source| {
                ConfigError::RoleMap {
                    path: path.clone(),
                    source,
                }
            })?,
            None => StaticRoleHazardMap::standard(),
        };
        Ok(Self::with_role_map(store, clock, config, Arc::new(roles)))
    }

    pub fn with_role_map(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        config: &EngineConfig,
        roles: Arc<dyn RoleHazardMap>,
    ) -> Self {
        let assignment = Arc::new(
            AssignmentEngine::new(store.clone(), clock.clone())
                .with_role_map(roles)
                .with_config(AssignmentConfig::from(config)),
        );
        Self::assemble(store, clock, config, assignment)
    }

    pub fn with_overlay(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        config: &EngineConfig,
        roles: Arc<dyn RoleHazardMap>,
        overlay: Arc<dyn HazardOverlay>,
    ) -> Self {
        let assignment = Arc::new(
            AssignmentEngine::new(store.clone(), clock.clone())
                .with_role_map(roles)
                .with_overlay(overlay)
                .with_config(AssignmentConfig::from(config)),
        );
        Self::assemble(store, clock, config, assignment)
    }

    fn assemble(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        config: &EngineConfig,
        assignment: Arc<AssignmentEngine<S>>,
    ) -> Self {
        Self {
            gaps: GapAnalysisEngine::new(store.clone(), clock.clone())
                .with_config(GapAnalysisConfig::from(config)),
            scoring: ScoringEngine::new(store.clone(), clock.clone()),
            registry: RegistryService::new(store.clone(), clock, assignment.clone()),
            assignment,
            store,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn assignment(&self) -> &AssignmentEngine<S> {
        &self.assignment
    }

    pub fn gaps(&self) -> &GapAnalysisEngine<S> {
        &self.gaps
    }

    pub fn scoring(&self) -> &ScoringEngine<S> {
        &self.scoring
    }

    pub fn registry(&self) -> &RegistryService<S> {
        &self.registry
    }
}
