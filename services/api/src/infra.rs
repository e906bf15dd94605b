use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use safetrack::compliance::{
    ComplianceStore, Control, ControlId, ControlType, Hazard, HazardControl, HazardControlId,
    HazardId, Role, RoleId, StoreError, WriteBatch, WriteOp,
};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

const CATALOG_ROLES: &[(&str, &str)] = &[
    ("role-electrician", "Electrician"),
    ("role-welder", "Welder"),
    ("role-scaffolder", "Scaffolder"),
    ("role-plumber", "Plumber"),
    ("role-labourer", "Labourer"),
    ("role-supervisor", "Site Supervisor"),
];

// (id, name, category, pre-control risk, post-control risk)
const CATALOG_HAZARDS: &[(&str, &str, &str, u8, u8)] = &[
    ("hz-electrical", "Live electrical work", "Electrical", 9, 4),
    ("hz-heights", "Work at height", "Heights", 8, 3),
    ("hz-confined", "Confined space entry", "Confined Space", 8, 4),
    ("hz-hotwork", "Welding and cutting", "Hot Work", 7, 3),
    ("hz-plant", "Mobile plant operation", "Plant & Machinery", 7, 3),
    ("hz-substances", "Solvents and fumes", "Hazardous Substances", 6, 2),
    ("hz-handling", "Heavy lifting", "Manual Handling", 5, 2),
    ("hz-site", "General site conditions", "Site Safety", 4, 2),
    ("hz-ppe", "Personal protective equipment", "PPE", 3, 1),
];

const CATALOG_CONTROLS: &[(&str, &str, ControlType, Option<u32>)] = &[
    ("c-lvr", "Low voltage rescue", ControlType::Training, Some(365)),
    ("c-isolation", "Isolation procedure sign-off", ControlType::Verification, None),
    ("c-electrical-licence", "Electrical licence", ControlType::Licence, Some(1825)),
    ("c-harness", "Harness inspection", ControlType::Inspection, Some(730)),
    ("c-heights", "Working at heights", ControlType::Training, Some(1095)),
    ("c-gas", "Gas test certificate", ControlType::Document, Some(30)),
    ("c-confined", "Confined space entry", ControlType::Training, Some(730)),
    ("c-hotwork", "Hot work permit", ControlType::Document, Some(90)),
    ("c-plant-ticket", "Plant operator ticket", ControlType::Licence, Some(1825)),
    ("c-sds", "Safety data sheet briefing", ControlType::Training, Some(365)),
    ("c-manual-handling", "Manual handling", ControlType::Training, Some(1095)),
    ("c-induction", "Site induction", ControlType::Training, Some(365)),
    ("c-gloves", "Gloves and eyewear issue", ControlType::Ppe, None),
];

// (hazard, control, critical, priority)
const CATALOG_MAPPINGS: &[(&str, &str, bool, i32)] = &[
    ("hz-electrical", "c-lvr", true, 1),
    ("hz-electrical", "c-electrical-licence", true, 1),
    ("hz-electrical", "c-isolation", false, 2),
    ("hz-heights", "c-heights", true, 1),
    ("hz-heights", "c-harness", true, 2),
    ("hz-confined", "c-confined", true, 1),
    ("hz-confined", "c-gas", false, 2),
    ("hz-hotwork", "c-hotwork", true, 1),
    ("hz-plant", "c-plant-ticket", true, 1),
    ("hz-substances", "c-sds", false, 1),
    ("hz-handling", "c-manual-handling", false, 1),
    ("hz-site", "c-induction", true, 1),
    ("hz-ppe", "c-gloves", false, 1),
];

/// Reference roles, hazards, and controls for a general construction site.
pub(crate) fn seed_catalog<S: ComplianceStore>(store: &S) -> Result<(), StoreError> {
    let mut batch = WriteBatch::new();
    for (id, name) in CATALOG_ROLES {
        batch.push(WriteOp::UpsertRole(Role {
            id: RoleId::from(*id),
            name: name.to_string(),
            description: None,
        }));
    }
    for (id, name, category, pre, post) in CATALOG_HAZARDS {
        batch.push(WriteOp::UpsertHazard(Hazard {
            id: HazardId::from(*id),
            name: name.to_string(),
            category: category.to_string(),
            pre_control_risk: *pre,
            post_control_risk: *post,
        }));
    }
    for (id, name, control_type, validity_days) in CATALOG_CONTROLS {
        batch.push(WriteOp::UpsertControl(Control {
            id: ControlId::from(*id),
            name: name.to_string(),
            control_type: *control_type,
            validity_days: *validity_days,
        }));
    }
    for (index, (hazard, control, is_critical, priority)) in CATALOG_MAPPINGS.iter().enumerate() {
        batch.push(WriteOp::UpsertHazardControl(HazardControl {
            id: HazardControlId::from(format!("hc-{}", index + 1)),
            hazard_id: HazardId::from(*hazard),
            control_id: ControlId::from(*control),
            is_critical: *is_critical,
            priority: *priority,
        }));
    }
    store.apply(batch)
}

pub(crate) fn parse_instant(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|instant| instant.with_timezone(&Utc))
        .map_err(|err| format!("failed to parse '{raw}' as an RFC 3339 timestamp ({err})"))
}
