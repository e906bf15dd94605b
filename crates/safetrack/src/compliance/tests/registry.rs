use super::common::*;
use chrono::Duration;

use crate::compliance::assignment::{RecomputeOutcome, SkipReason};
use crate::compliance::domain::{
    EvidenceArtifact, EvidenceStatus, Hazard, HazardId, RequiredControlId, RequiredControlStatus,
    RoleId, WorkerId,
};
use crate::compliance::registry::{NewWorker, RegistryError, RoleAssignment};
use crate::compliance::store::{ComplianceStore, StoreError};

fn new_worker(employee_id: &str, name: &str) -> NewWorker {
    NewWorker {
        employee_id: employee_id.to_string(),
        name: name.to_string(),
        email: Some(format!("{}@example.com", employee_id.to_lowercase())),
        phone: None,
    }
}

#[test]
fn duplicate_employee_id_is_a_conflict() {
    let site = site();
    let registry = site.service.registry();
    registry
        .create_worker(new_worker("E-400", "Lou Grant"))
        .expect("first worker created");

    match registry.create_worker(new_worker("E-400", "Lou Grant II")) {
        Err(RegistryError::Store(StoreError::Conflict(message))) => {
            assert!(message.contains("E-400"))
        }
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[test]
fn blank_worker_fields_are_rejected() {
    let site = site();
    match site.service.registry().create_worker(new_worker("  ", "Nameless")) {
        Err(RegistryError::IncompleteWorker) => {}
        other => panic!("expected incomplete worker, got {other:?}"),
    }
}

#[test]
fn primary_assignment_closes_previous_primary() {
    let site = site();
    let worker = site.hire("E-401", "Max Ford", "role-electrician");
    let registry = site.service.registry();

    registry
        .assign_role(
            &worker,
            &RoleId::from("role-admin"),
            RoleAssignment::default(),
        )
        .expect("secondary role assigned");
    let welder = registry
        .assign_role(
            &worker,
            &RoleId::from("role-welder"),
            RoleAssignment {
                is_primary: true,
                ..RoleAssignment::default()
            },
        )
        .expect("new primary assigned");

    let roles = site.store.worker_roles(&worker).expect("roles load");
    let active: Vec<&RoleId> = roles
        .iter()
        .filter(|assignment| assignment.is_active_at(now()))
        .map(|assignment| &assignment.role_id)
        .collect();
    assert_eq!(active.len(), 2);
    assert!(active.contains(&&RoleId::from("role-admin")));
    assert!(active.contains(&&welder.role_id));

    let electrician = roles
        .iter()
        .find(|assignment| assignment.role_id.as_str() == "role-electrician")
        .expect("previous primary kept");
    assert_eq!(electrician.end_at, Some(now()));
}

#[test]
fn unknown_role_and_worker_are_reported() {
    let site = site();
    let registry = site.service.registry();
    let worker = registry
        .create_worker(new_worker("E-402", "Ned Lake"))
        .expect("worker created");

    assert!(matches!(
        registry.assign_role(&worker.id, &RoleId::from("role-pilot"), RoleAssignment::default()),
        Err(RegistryError::RoleNotFound(_))
    ));
    assert!(matches!(
        registry.assign_role(
            &WorkerId::from("wkr-ghost"),
            &RoleId::from("role-welder"),
            RoleAssignment::default()
        ),
        Err(RegistryError::WorkerNotFound(_))
    ));
    assert!(matches!(
        registry.add_evidence(
            &RequiredControlId::from("rc-ghost"),
            file_evidence(None)
        ),
        Err(RegistryError::RequiredControlNotFound(_))
    ));
}

#[test]
fn ending_the_only_role_leaves_requirements_untouched() {
    let site = site();
    let worker = site.hire("E-403", "Oli Sand", "role-welder");
    let registry = site.service.registry();
    let assignment = site
        .store
        .worker_roles(&worker)
        .expect("roles load")
        .remove(0);

    let outcome = registry.end_role(&assignment.id).expect("role ended");
    assert!(matches!(
        outcome,
        RecomputeOutcome::Skipped {
            reason: SkipReason::NoActiveRoles,
            ..
        }
    ));
    assert_eq!(site.required(&worker).len(), 3);

    registry.unassign_role(&assignment.id).expect("role removed");
    assert!(site.store.worker_roles(&worker).expect("roles load").is_empty());
}

#[test]
fn temporary_fix_requires_future_expiry() {
    let site = site();
    let worker = site.hire("E-404", "Pam Hart", "role-welder");
    let permit = site.required_for(&worker, "c-hotwork");

    match site
        .service
        .registry()
        .apply_temporary_fix(&permit.id, now(), None)
    {
        Err(RegistryError::InvalidTemporaryFix { valid_until }) => assert_eq!(valid_until, now()),
        other => panic!("expected invalid fix, got {other:?}"),
    }
}

#[test]
fn temporary_fix_records_placeholder_evidence() {
    let site = site();
    let worker = site.hire("E-405", "Quin Lowe", "role-welder");
    let permit = site.required_for(&worker, "c-hotwork");
    let until = now() + Duration::days(5);

    let updated = site
        .service
        .registry()
        .apply_temporary_fix(&permit.id, until, Some("permit renewal lodged".to_string()))
        .expect("fix applied");

    assert_eq!(updated.status, RequiredControlStatus::Temporary);
    assert_eq!(updated.temp_valid_until, Some(until));
    let placeholder = site
        .store
        .latest_evidence(&permit.id)
        .expect("evidence loads")
        .expect("placeholder stored");
    assert_eq!(placeholder.artifact, EvidenceArtifact::Temporary);
    assert_eq!(placeholder.expiry_date, Some(until));
    assert_eq!(updated.temp_evidence_id, Some(placeholder.id));
}

#[test]
fn clearing_a_fix_without_evidence_returns_to_required() {
    let site = site();
    let worker = site.hire("E-406", "Ros Vane", "role-welder");
    let permit = site.required_for(&worker, "c-hotwork");
    let registry = site.service.registry();
    registry
        .apply_temporary_fix(&permit.id, now() + Duration::days(5), None)
        .expect("fix applied");

    site.clock.advance(Duration::days(1));
    let cleared = registry.clear_temporary_fix(&permit.id).expect("fix cleared");

    assert_eq!(cleared.status, RequiredControlStatus::Required);
    assert_eq!(cleared.due_date, Some(now() + Duration::days(90)));
    assert_eq!(cleared.temp_valid_until, None);
    assert_eq!(cleared.temp_evidence_id, None);
    let trail = site.store.evidence(&permit.id).expect("evidence loads");
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].artifact, EvidenceArtifact::Temporary);
    assert_eq!(trail[0].status, EvidenceStatus::Valid);

    let score = site.service.scoring().score_worker(&worker).expect("worker scored");
    assert_eq!(score.coverage, 0.0);
    assert_eq!(score.quality, 0.0);
}

#[test]
fn clearing_a_fix_keeps_certificates_filed_during_it() {
    let site = site();
    let registry = site.service.registry();
    let backdated = site.hire("E-409", "Uri Tam", "role-welder");
    let fresh = site.hire("E-410", "Val Orr", "role-welder");

    for worker in [&backdated, &fresh] {
        let permit = site.required_for(worker, "c-hotwork");
        registry
            .apply_temporary_fix(&permit.id, now() + Duration::days(5), None)
            .expect("fix applied");
    }
    site.clock.advance(Duration::minutes(30));

    let permit = site.required_for(&backdated, "c-hotwork");
    registry
        .add_evidence(&permit.id, file_evidence(Some(now() + Duration::days(365))))
        .expect("backdated certificate filed");
    let permit = site.required_for(&fresh, "c-hotwork");
    let mut certificate = file_evidence(Some(now() + Duration::days(365)));
    certificate.issued_date = now() + Duration::minutes(30);
    registry
        .add_evidence(&permit.id, certificate)
        .expect("certificate filed");

    for worker in [&backdated, &fresh] {
        let permit = site.required_for(worker, "c-hotwork");
        assert_eq!(permit.status, RequiredControlStatus::Temporary);

        let cleared = registry.clear_temporary_fix(&permit.id).expect("fix cleared");
        assert_eq!(cleared.status, RequiredControlStatus::Satisfied);
        assert_eq!(cleared.due_date, Some(now() + Duration::days(365)));
    }
}

#[test]
fn hazard_updates_recompute_exposed_workers() {
    let site = site();
    let _electrician = site.hire("E-407", "Sol Reed", "role-electrician");
    let _welder = site.hire("E-408", "Tia Moon", "role-welder");

    let report = site
        .service
        .registry()
        .upsert_hazard(Hazard {
            id: HazardId::from("hz-confined"),
            name: "Confined space entry".to_string(),
            category: "Confined Space".to_string(),
            pre_control_risk: 9,
            post_control_risk: 4,
        })
        .expect("hazard updated");

    assert_eq!(report.processed, 2);
    assert_eq!(report.writes, 0);

    assert!(matches!(
        site.service.registry().map_control(
            &HazardId::from("hz-missing"),
            &"c-gas".into(),
            false,
            1
        ),
        Err(RegistryError::HazardNotFound(_))
    ));
}
