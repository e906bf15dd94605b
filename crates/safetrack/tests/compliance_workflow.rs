//! End-to-end compliance scenarios driven through the public service facade and HTTP router.

mod common {
    use std::sync::Arc;

    use chrono::{DateTime, Duration, TimeZone, Utc};

    use safetrack::compliance::{
        ClientId, ComplianceService, ComplianceStore, Control, ControlId, ControlType,
        EvidenceArtifact, EvidenceStatus, FixedClock, Hazard, HazardControl, HazardControlId,
        HazardId, InMemoryStore, NewEvidence, NewWorker, RequiredControl, Role, RoleAssignment,
        RoleId, WorkerId, WriteBatch, WriteOp,
    };

    pub(super) const CLIENT: &str = "client-harbour";

    pub(super) fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 3, 7, 30, 0)
            .single()
            .expect("valid timestamp")
    }

    pub(super) fn seed(store: &InMemoryStore) {
        let mut batch = WriteBatch::new();
        for (id, name) in [("role-electrician", "Electrician"), ("role-scaffolder", "Scaffolder")] {
            batch.push(WriteOp::UpsertRole(Role {
                id: RoleId::from(id),
                name: name.to_string(),
                description: None,
            }));
        }
        for (id, category, risk) in [
            ("hz-electrical", "Electrical", 9),
            ("hz-heights", "Heights", 8),
            ("hz-confined", "Confined Space", 7),
            ("hz-handling", "Manual Handling", 5),
            ("hz-ppe", "PPE", 3),
        ] {
            batch.push(WriteOp::UpsertHazard(Hazard {
                id: HazardId::from(id),
                name: format!("{category} exposure"),
                category: category.to_string(),
                pre_control_risk: risk,
                post_control_risk: 2,
            }));
        }
        for (id, control_type, validity_days) in [
            ("c-lvr", ControlType::Training, Some(365)),
            ("c-harness", ControlType::Inspection, Some(730)),
            ("c-gas", ControlType::Document, Some(30)),
            ("c-lifting", ControlType::Training, None),
            ("c-gloves", ControlType::Ppe, None),
        ] {
            batch.push(WriteOp::UpsertControl(Control {
                id: ControlId::from(id),
                name: id.trim_start_matches("c-").to_string(),
                control_type,
                validity_days,
            }));
        }
        for (id, hazard, control, is_critical) in [
            ("hc-1", "hz-electrical", "c-lvr", true),
            ("hc-2", "hz-heights", "c-harness", true),
            ("hc-3", "hz-confined", "c-gas", false),
            ("hc-4", "hz-handling", "c-lifting", false),
            ("hc-5", "hz-ppe", "c-gloves", false),
        ] {
            batch.push(WriteOp::UpsertHazardControl(HazardControl {
                id: HazardControlId::from(id),
                hazard_id: HazardId::from(hazard),
                control_id: ControlId::from(control),
                is_critical,
                priority: 1,
            }));
        }
        store.apply(batch).expect("catalog seeds");
    }

    pub(super) fn hire(
        service: &ComplianceService<InMemoryStore>,
        employee_id: &str,
        role: &str,
        site: Option<&str>,
    ) -> WorkerId {
        let registry = service.registry();
        let worker = registry
            .create_worker(NewWorker {
                employee_id: employee_id.to_string(),
                name: format!("Worker {employee_id}"),
                email: None,
                phone: None,
            })
            .expect("worker created");
        registry
            .assign_role(
                &worker.id,
                &RoleId::from(role),
                RoleAssignment {
                    client_id: Some(ClientId::from(CLIENT)),
                    site_id: site.map(Into::into),
                    is_primary: true,
                    start_at: None,
                },
            )
            .expect("role assigned");
        worker.id
    }

    pub(super) fn requirement(
        service: &ComplianceService<InMemoryStore>,
        worker: &WorkerId,
        control: &str,
    ) -> RequiredControl {
        service
            .store()
            .required_controls(worker)
            .expect("rows load")
            .into_iter()
            .find(|row| row.control_id.as_str() == control)
            .unwrap_or_else(|| panic!("{control} not required for {worker}"))
    }

    pub(super) fn certificate(
        issued: DateTime<Utc>,
        valid_for: Option<Duration>,
    ) -> NewEvidence {
        NewEvidence {
            artifact: EvidenceArtifact::File {
                path: "certificates/scan.pdf".to_string(),
                checksum: "sha256:9f2c".to_string(),
                size_bytes: 20_480,
            },
            issued_date: issued,
            expiry_date: valid_for.map(|valid_for| issued + valid_for),
            status: EvidenceStatus::Valid,
        }
    }

    pub(super) fn service_at(clock: Arc<FixedClock>) -> ComplianceService<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        seed(&store);
        ComplianceService::new(store, clock, &Default::default())
    }
}

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use chrono::Duration;
use serde_json::Value;
use tower::ServiceExt;

use common::{certificate, hire, requirement, seed, service_at, start, CLIENT};
use safetrack::compliance::domain::HazardProfile;
use safetrack::compliance::{
    compliance_router, ClientId, ComplianceService, ComplianceStore, FixedClock, GapStatus,
    HazardOverlay, InMemoryStore, RecomputeContext, RequiredControlStatus, RosterImporter,
    StaticRoleHazardMap, StoreError, WorkerId, WorkerStatus,
};
use safetrack::config::{ConfigError, EngineConfig};

#[test]
fn evidence_expiry_and_temporary_fix_drive_worker_status() {
    let clock = Arc::new(FixedClock::new(start()));
    let service = service_at(clock.clone());
    let worker = hire(&service, "H-100", "role-electrician", None);
    let status = |service: &ComplianceService<InMemoryStore>| {
        service
            .store()
            .worker(&worker)
            .expect("worker lookup")
            .expect("worker present")
            .status
    };
    assert_eq!(status(&service), WorkerStatus::Restricted);

    for (control, days) in [("c-lvr", 365), ("c-harness", 730), ("c-gas", 30)] {
        let row = requirement(&service, &worker, control);
        service
            .registry()
            .add_evidence(&row.id, certificate(start(), Some(Duration::days(days))))
            .expect("evidence filed");
    }
    assert_eq!(status(&service), WorkerStatus::Active);

    clock.advance(Duration::days(31));
    let report = service.assignment().recompute_all().expect("nightly recompute");
    assert_eq!(report.processed, 1);
    assert_eq!(report.restricted, vec![worker.clone()]);
    assert_eq!(
        requirement(&service, &worker, "c-gas").status,
        RequiredControlStatus::Overdue
    );

    let gas = requirement(&service, &worker, "c-gas");
    let until = start() + Duration::days(41);
    service
        .registry()
        .apply_temporary_fix(&gas.id, until, Some("retest booked".to_string()))
        .expect("fix applied");
    assert_eq!(status(&service), WorkerStatus::Active);

    let analysis = service.gaps().analyze_worker(&worker).expect("analysis");
    assert_eq!(analysis.gaps.len(), 1);
    assert_eq!(analysis.gaps[0].status, GapStatus::Expiring);
    assert_eq!(analysis.gaps[0].days_until_due, Some(10));
    assert_eq!(analysis.readiness.operational_readiness, 100);
    assert_eq!(analysis.readiness.audit_readiness, 67);
}

struct TunnelOverlay {
    store: Arc<InMemoryStore>,
}

impl HazardOverlay for TunnelOverlay {
    fn overlay_hazards(
        &self,
        _worker_id: &WorkerId,
        context: &RecomputeContext,
    ) -> Result<Vec<HazardProfile>, StoreError> {
        match context.site_id.as_ref().map(|site| site.as_str()) {
            Some("site-tunnel") => self
                .store
                .hazard_profiles(&["Confined Space".to_string()].into_iter().collect()),
            _ => Ok(Vec::new()),
        }
    }
}

#[test]
fn site_overlay_adds_hazards_beyond_the_role() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store);
    let clock = Arc::new(FixedClock::new(start()));
    let service = ComplianceService::with_overlay(
        store.clone(),
        clock,
        &EngineConfig::default(),
        Arc::new(StaticRoleHazardMap::standard()),
        Arc::new(TunnelOverlay {
            store: store.clone(),
        }),
    );

    let surface = hire(&service, "H-200", "role-scaffolder", None);
    let tunnel = hire(&service, "H-201", "role-scaffolder", Some("site-tunnel"));

    let controls = |worker: &WorkerId| {
        let mut ids: Vec<String> = store
            .required_controls(worker)
            .expect("rows load")
            .into_iter()
            .map(|row| row.control_id.as_str().to_string())
            .collect();
        ids.sort();
        ids
    };
    assert_eq!(controls(&surface), vec!["c-gloves", "c-harness", "c-lifting"]);
    assert_eq!(
        controls(&tunnel),
        vec!["c-gas", "c-gloves", "c-harness", "c-lifting"]
    );
}

#[test]
fn custom_role_table_replaces_the_builtin_one() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store);
    let roles = StaticRoleHazardMap::from_json_reader(r#"{"Electrician": ["PPE"]}"#.as_bytes())
        .expect("role table parses");
    let service = ComplianceService::with_role_map(
        store.clone(),
        Arc::new(FixedClock::new(start())),
        &EngineConfig::default(),
        Arc::new(roles),
    );

    let worker = hire(&service, "H-300", "role-electrician", None);
    let rows = store.required_controls(&worker).expect("rows load");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].control_id.as_str(), "c-gloves");
}

#[test]
fn missing_role_table_file_is_a_config_error() {
    let config = EngineConfig {
        role_map_path: Some("/nonexistent/safetrack/roles.json".into()),
        ..EngineConfig::default()
    };
    let result = ComplianceService::from_config(
        Arc::new(InMemoryStore::new()),
        Arc::new(FixedClock::new(start())),
        &config,
    );
    match result {
        Err(ConfigError::RoleMap { path, .. }) => {
            assert!(path.ends_with("roles.json"))
        }
        Err(other) => panic!("expected role map error, got {other:?}"),
        Ok(_) => panic!("expected role map error"),
    }
}

#[tokio::test]
async fn imported_roster_is_visible_over_http() {
    let service = Arc::new(service_at(Arc::new(FixedClock::new(start()))));
    let roster = format!(
        "employee_id,name,email,role,client_id,site_id,is_primary\n\
         H-400,Robin Vale,,Electrician,{CLIENT},,true\n\
         H-401,Kai Dunn,,Scaffolder,{CLIENT},,true\n"
    );
    let summary = RosterImporter::from_reader(service.registry(), roster.as_bytes())
        .expect("roster imports");
    assert_eq!(summary.roles_assigned, 2);

    let client = service
        .gaps()
        .analyze_client(&ClientId::from(CLIENT))
        .expect("client analysis");
    assert_eq!(client.workers_analyzed, 2);
    assert_eq!(client.summary.total, 6);

    let worker = service
        .store()
        .worker_by_employee_id("H-401")
        .expect("lookup")
        .expect("imported");
    let response = compliance_router(service)
        .oneshot(
            Request::get(format!("/api/v1/workers/{}/gaps", worker.id))
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body reads");
    let body: Value = serde_json::from_slice(&bytes).expect("json body");
    assert_eq!(body["success"], Value::Bool(true));
    assert_eq!(body["data"]["summary"]["total"], Value::from(3));
    assert_eq!(body["data"]["worker"]["status"], Value::from("restricted"));
}
