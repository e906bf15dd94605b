use std::sync::Arc;

use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::compliance::domain::{
    ClientId, Control, ControlId, ControlType, EvidenceArtifact, EvidenceStatus, Hazard,
    HazardControl, HazardControlId, HazardId, RequiredControl, Role, RoleId, WorkerId,
    WorkerStatus,
};
use crate::compliance::memory::InMemoryStore;
use crate::compliance::registry::{NewEvidence, NewWorker, RoleAssignment};
use crate::compliance::store::{ComplianceStore, WriteBatch, WriteOp};
use crate::compliance::{ComplianceService, FixedClock};
use crate::config::EngineConfig;

pub(super) const CLIENT: &str = "client-north";

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

/// Seeded reference data plus a service wired over it at a fixed instant.
pub(super) struct Site {
    pub(super) store: Arc<InMemoryStore>,
    pub(super) clock: Arc<FixedClock>,
    pub(super) service: ComplianceService<InMemoryStore>,
}

pub(super) fn site() -> Site {
    site_with(EngineConfig::default())
}

pub(super) fn site_with(config: EngineConfig) -> Site {
    let store = Arc::new(InMemoryStore::new());
    seed_reference_data(&store);
    let clock = Arc::new(FixedClock::new(now()));
    let service = ComplianceService::new(store.clone(), clock.clone(), &config);
    Site {
        store,
        clock,
        service,
    }
}

fn role(id: &str, name: &str) -> WriteOp {
    WriteOp::UpsertRole(Role {
        id: RoleId::from(id),
        name: name.to_string(),
        description: None,
    })
}

fn hazard(id: &str, name: &str, category: &str, pre_control_risk: u8) -> WriteOp {
    WriteOp::UpsertHazard(Hazard {
        id: HazardId::from(id),
        name: name.to_string(),
        category: category.to_string(),
        pre_control_risk,
        post_control_risk: pre_control_risk.saturating_sub(4),
    })
}

fn control(id: &str, name: &str, control_type: ControlType, validity_days: Option<u32>) -> WriteOp {
    WriteOp::UpsertControl(Control {
        id: ControlId::from(id),
        name: name.to_string(),
        control_type,
        validity_days,
    })
}

fn mapping(id: &str, hazard: &str, control: &str, is_critical: bool, priority: i32) -> WriteOp {
    WriteOp::UpsertHazardControl(HazardControl {
        id: HazardControlId::from(id),
        hazard_id: HazardId::from(hazard),
        control_id: ControlId::from(control),
        is_critical,
        priority,
    })
}

/// Electrician exposure: c-lvr (critical), c-isolation, c-harness (critical), c-gas.
/// Welder exposure: c-hotwork (critical), c-gas, c-gloves.
fn seed_reference_data(store: &InMemoryStore) {
    store
        .apply(WriteBatch::from(vec![
            role("role-electrician", "Electrician"),
            role("role-welder", "Welder"),
            role("role-admin", "Office Administrator"),
            hazard("hz-electrical", "Live electrical work", "Electrical", 9),
            hazard("hz-heights", "Work at height", "Heights", 8),
            hazard("hz-confined", "Confined space entry", "Confined Space", 7),
            hazard("hz-hotwork", "Hot work", "Hot Work", 6),
            hazard("hz-ppe", "General PPE", "PPE", 3),
            control("c-lvr", "Low voltage rescue", ControlType::Training, Some(365)),
            control("c-isolation", "Isolation permit", ControlType::Document, None),
            control("c-harness", "Harness training", ControlType::Training, Some(730)),
            control("c-gas", "Gas detector check", ControlType::Inspection, Some(30)),
            control("c-hotwork", "Hot work permit", ControlType::Licence, Some(90)),
            control("c-gloves", "Welding gloves", ControlType::Ppe, None),
            mapping("hc-1", "hz-electrical", "c-lvr", true, 1),
            mapping("hc-2", "hz-electrical", "c-isolation", false, 2),
            mapping("hc-3", "hz-heights", "c-harness", true, 1),
            mapping("hc-4", "hz-confined", "c-gas", false, 1),
            mapping("hc-5", "hz-hotwork", "c-hotwork", true, 1),
            mapping("hc-6", "hz-ppe", "c-gloves", false, 1),
        ]))
        .expect("reference data seeds");
}

impl Site {
    /// Creates a worker and gives them one client-scoped primary role.
    pub(super) fn hire(&self, employee_id: &str, name: &str, role_id: &str) -> WorkerId {
        let registry = self.service.registry();
        let worker = registry
            .create_worker(NewWorker {
                employee_id: employee_id.to_string(),
                name: name.to_string(),
                email: None,
                phone: None,
            })
            .expect("worker created");
        registry
            .assign_role(
                &worker.id,
                &RoleId::from(role_id),
                RoleAssignment {
                    client_id: Some(ClientId::from(CLIENT)),
                    site_id: None,
                    is_primary: true,
                    start_at: None,
                },
            )
            .expect("role assigned");
        worker.id
    }

    pub(super) fn required(&self, worker_id: &WorkerId) -> Vec<RequiredControl> {
        self.store
            .required_controls(worker_id)
            .expect("required controls load")
    }

    pub(super) fn required_for(&self, worker_id: &WorkerId, control_id: &str) -> RequiredControl {
        self.required(worker_id)
            .into_iter()
            .find(|row| row.control_id.as_str() == control_id)
            .unwrap_or_else(|| panic!("no required control {control_id} for {worker_id}"))
    }

    pub(super) fn control_ids(&self, worker_id: &WorkerId) -> Vec<String> {
        let mut ids: Vec<String> = self
            .required(worker_id)
            .into_iter()
            .map(|row| row.control_id.0)
            .collect();
        ids.sort();
        ids
    }

    pub(super) fn worker_status(&self, worker_id: &WorkerId) -> WorkerStatus {
        self.store
            .worker(worker_id)
            .expect("worker loads")
            .expect("worker exists")
            .status
    }

    /// Attaches valid file evidence to every requirement the worker holds.
    pub(super) fn satisfy_all(&self, worker_id: &WorkerId, expiry: Option<DateTime<Utc>>) {
        for row in self.required(worker_id) {
            self.service
                .registry()
                .add_evidence(&row.id, file_evidence(expiry))
                .expect("evidence added");
        }
    }
}

pub(super) fn file_evidence(expiry: Option<DateTime<Utc>>) -> NewEvidence {
    NewEvidence {
        artifact: EvidenceArtifact::File {
            path: "evidence/certificate.pdf".to_string(),
            checksum: "5d41402abc4b2a76".to_string(),
            size_bytes: 48_213,
        },
        issued_date: now() - Duration::days(10),
        expiry_date: expiry,
        status: EvidenceStatus::Valid,
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("body readable");
    serde_json::from_slice(&body).expect("json body")
}
