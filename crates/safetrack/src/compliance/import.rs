use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{info, warn};

use super::domain::{ClientId, SiteId};
use super::registry::{NewWorker, RegistryError, RegistryService, RoleAssignment};
use super::store::ComplianceStore;

#[derive(Debug)]
pub enum RosterImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    Registry(RegistryError),
}

impl std::fmt::Display for RosterImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RosterImportError::Io(err) => write!(f, "failed to read roster: {}", err),
            RosterImportError::Csv(err) => write!(f, "invalid roster CSV data: {}", err),
            RosterImportError::Registry(err) => {
                write!(f, "could not apply roster to registry: {}", err)
            }
        }
    }
}

impl std::error::Error for RosterImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RosterImportError::Io(err) => Some(err),
            RosterImportError::Csv(err) => Some(err),
            RosterImportError::Registry(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for RosterImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for RosterImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

impl From<RegistryError> for RosterImportError {
    fn from(err: RegistryError) -> Self {
        Self::Registry(err)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RosterImportSummary {
    pub rows: usize,
    pub workers_created: usize,
    pub roles_assigned: usize,
    /// Rows missing an employee id or name, or repeating an active assignment.
    pub skipped: usize,
    pub unknown_roles: BTreeSet<String>,
}

#[derive(Debug, Deserialize)]
struct RosterRow {
    employee_id: String,
    name: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    email: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    role: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    client_id: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    site_id: Option<String>,
    #[serde(default, deserialize_with = "flag")]
    is_primary: bool,
}

/// Applies a fixed-header roster export through the registry.
pub struct RosterImporter;

impl RosterImporter {
    pub fn from_path<S, P>(
        registry: &RegistryService<S>,
        path: P,
    ) -> Result<RosterImportSummary, RosterImportError>
    where
        S: ComplianceStore + 'static,
        P: AsRef<Path>,
    {
        let file = std::fs::File::open(path)?;
        Self::from_reader(registry, file)
    }

    pub fn from_reader<S, R>(
        registry: &RegistryService<S>,
        reader: R,
    ) -> Result<RosterImportSummary, RosterImportError>
    where
        S: ComplianceStore + 'static,
        R: Read,
    {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut summary = RosterImportSummary::default();

        for record in csv_reader.deserialize::<RosterRow>() {
            let row = record?;
            summary.rows += 1;
            apply_row(registry, row, &mut summary)?;
        }

        info!(
            rows = summary.rows,
            workers_created = summary.workers_created,
            roles_assigned = summary.roles_assigned,
            skipped = summary.skipped,
            unknown_roles = summary.unknown_roles.len(),
            "roster import finished"
        );
        Ok(summary)
    }
}

fn apply_row<S>(
    registry: &RegistryService<S>,
    row: RosterRow,
    summary: &mut RosterImportSummary,
) -> Result<(), RegistryError>
where
    S: ComplianceStore + 'static,
{
    if row.employee_id.is_empty() || row.name.is_empty() {
        summary.skipped += 1;
        return Ok(());
    }

    let worker = match registry.worker_by_employee_id(&row.employee_id)? {
        Some(worker) => worker,
        None => {
            summary.workers_created += 1;
            registry.create_worker(NewWorker {
                employee_id: row.employee_id.clone(),
                name: row.name.clone(),
                email: row.email.clone(),
                phone: None,
            })?
        }
    };

    let Some(role_name) = row.role else {
        return Ok(());
    };
    let Some(role) = registry.role_by_name(&role_name)? else {
        warn!(employee_id = %row.employee_id, role = %role_name, "roster row names unknown role");
        summary.unknown_roles.insert(role_name);
        return Ok(());
    };

    let client_id = row.client_id.map(ClientId::from);
    let site_id = row.site_id.map(SiteId::from);
    if registry.has_active_assignment(&worker.id, &role.id, client_id.as_ref(), site_id.as_ref())? {
        summary.skipped += 1;
        return Ok(());
    }

    registry.assign_role(
        &worker.id,
        &role.id,
        RoleAssignment {
            client_id,
            site_id,
            is_primary: row.is_primary,
            start_at: None,
        },
    )?;
    summary.roles_assigned += 1;
    Ok(())
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.and_then(|raw| {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }))
}

fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(matches!(
        value.as_deref().map(str::trim).map(str::to_ascii_lowercase).as_deref(),
        Some("true" | "yes" | "y" | "1")
    ))
}
