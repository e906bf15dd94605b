use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Identifier wrapper for workers.
    WorkerId
);
string_id!(RoleId);
string_id!(WorkerRoleId);
string_id!(HazardId);
string_id!(ControlId);
string_id!(HazardControlId);
string_id!(
    /// Identifier of a per-worker, per-control requirement row.
    RequiredControlId
);
string_id!(EvidenceId);
string_id!(ClientId);
string_id!(SiteId);

static ID_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Generates a process-unique identifier such as `rc-000042`.
pub(crate) fn next_id(prefix: &str) -> String {
    let id = ID_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{id:06}")
}

/// Rolled-up compliance state of a worker, owned by the assignment engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Active,
    Restricted,
    Inactive,
}

impl WorkerStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Restricted => "restricted",
            Self::Inactive => "inactive",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    pub employee_id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: WorkerStatus,
    pub created_at: DateTime<Utc>,
}

/// Named job function; the hazard categories it implies come from a `RoleHazardMap`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub description: Option<String>,
}

/// Time-bounded assignment of a role to a worker, optionally scoped to a client or site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRole {
    pub id: WorkerRoleId,
    pub worker_id: WorkerId,
    pub role_id: RoleId,
    pub client_id: Option<ClientId>,
    pub site_id: Option<SiteId>,
    pub is_primary: bool,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
}

impl WorkerRole {
    /// An assignment stays active until its end date has passed.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.end_at.map_or(true, |end| end > now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hazard {
    pub id: HazardId,
    pub name: String,
    pub category: String,
    pub pre_control_risk: u8,
    pub post_control_risk: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlType {
    Training,
    Document,
    Ppe,
    Inspection,
    Licence,
    Verification,
}

impl ControlType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Training => "Training",
            Self::Document => "Document",
            Self::Ppe => "PPE",
            Self::Inspection => "Inspection",
            Self::Licence => "Licence",
            Self::Verification => "Verification",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Control {
    pub id: ControlId,
    pub name: String,
    pub control_type: ControlType,
    pub validity_days: Option<u32>,
}

/// Hazard to control mapping. Lower `priority` values are applied first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HazardControl {
    pub id: HazardControlId,
    pub hazard_id: HazardId,
    pub control_id: ControlId,
    pub is_critical: bool,
    pub priority: i32,
}

/// A mapping joined with the control it points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappedControl {
    pub mapping: HazardControl,
    pub control: Control,
}

/// A hazard with its control mappings, ordered by priority ascending then id descending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HazardProfile {
    pub hazard: Hazard,
    pub controls: Vec<MappedControl>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredControlStatus {
    Required,
    Satisfied,
    Temporary,
    Overdue,
}

impl RequiredControlStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Required => "Required",
            Self::Satisfied => "Satisfied",
            Self::Temporary => "Temporary",
            Self::Overdue => "Overdue",
        }
    }

    /// Satisfied and temporary rows count as covered and are kept as history.
    pub const fn is_covered(self) -> bool {
        matches!(self, Self::Satisfied | Self::Temporary)
    }
}

/// The live fact that a worker must satisfy a control. Unique per (worker, control).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredControl {
    pub id: RequiredControlId,
    pub worker_id: WorkerId,
    pub control_id: ControlId,
    pub status: RequiredControlStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub temp_valid_until: Option<DateTime<Utc>>,
    pub temp_evidence_id: Option<EvidenceId>,
    pub temp_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RequiredControl {
    pub fn new(worker_id: WorkerId, control_id: ControlId, now: DateTime<Utc>) -> Self {
        Self {
            id: RequiredControlId(next_id("rc")),
            worker_id,
            control_id,
            status: RequiredControlStatus::Required,
            due_date: None,
            temp_valid_until: None,
            temp_evidence_id: None,
            temp_notes: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Stored artifact backing an evidence row. File contents are never inspected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvidenceArtifact {
    File {
        path: String,
        checksum: String,
        size_bytes: u64,
    },
    Temporary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceStatus {
    Valid,
    Pending,
    Rejected,
}

/// Append-only proof attached to a required control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub id: EvidenceId,
    pub required_control_id: RequiredControlId,
    pub artifact: EvidenceArtifact,
    pub issued_date: DateTime<Utc>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub status: EvidenceStatus,
    pub created_at: DateTime<Utc>,
}

impl Evidence {
    /// Valid status and either perpetual or not yet expired.
    pub fn is_current_at(&self, now: DateTime<Utc>) -> bool {
        self.status == EvidenceStatus::Valid && self.expiry_date.map_or(true, |expiry| expiry > now)
    }
}

/// Optional client/site scope passed to a recompute for overlay hazards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecomputeContext {
    #[serde(default)]
    pub client_id: Option<ClientId>,
    #[serde(default)]
    pub site_id: Option<SiteId>,
}
