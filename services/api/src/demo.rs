use crate::infra::seed_catalog;
use chrono::{DateTime, Duration, Utc};
use clap::Args;
use safetrack::compliance::{
    ClientGapAnalysis, ClientId, Clock, ComplianceService, ComplianceStore, ControlId,
    EvidenceArtifact, EvidenceStatus, FixedClock, InMemoryStore, NewEvidence, NewWorker,
    ReadinessScore, RegistryError, RequiredControl, RoleAssignment, RosterImporter, SystemClock,
    WorkerGapAnalysis, WorkerId,
};
use safetrack::config::EngineConfig;
use safetrack::error::AppError;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Evaluation instant (RFC 3339). Defaults to now.
    #[arg(long, value_parser = crate::infra::parse_instant)]
    pub(crate) now: Option<DateTime<Utc>>,
    /// Client the demo crew is assigned to.
    #[arg(long, default_value = "client-north")]
    pub(crate) client: String,
    /// Print the client gap analysis as JSON after the text report.
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug)]
pub(crate) struct RosterImportArgs {
    /// Roster CSV (employee_id,name,email,role,client_id,site_id,is_primary)
    pub(crate) path: PathBuf,
    /// Report gaps for this client after the import
    #[arg(long)]
    pub(crate) client: Option<String>,
    /// Evaluation instant (RFC 3339). Defaults to now.
    #[arg(long, value_parser = crate::infra::parse_instant)]
    pub(crate) now: Option<DateTime<Utc>>,
}

pub(crate) struct DemoSite {
    pub(crate) service: ComplianceService<InMemoryStore>,
    pub(crate) client: ClientId,
    pub(crate) crew: Vec<WorkerId>,
}

fn catalog_service(
    clock: Arc<dyn Clock>,
    engine: &EngineConfig,
) -> Result<ComplianceService<InMemoryStore>, AppError> {
    let store = Arc::new(InMemoryStore::new());
    seed_catalog(store.as_ref())?;
    Ok(ComplianceService::from_config(store, clock, engine)?)
}

fn hire(
    service: &ComplianceService<InMemoryStore>,
    employee_id: &str,
    name: &str,
    role_name: &str,
    client: &ClientId,
) -> Result<WorkerId, AppError> {
    let registry = service.registry();
    let role = registry
        .role_by_name(role_name)?
        .ok_or_else(|| RegistryError::RoleNotFound(role_name.to_string()))?;
    let worker = registry.create_worker(NewWorker {
        employee_id: employee_id.to_string(),
        name: name.to_string(),
        email: None,
        phone: None,
    })?;
    registry.assign_role(
        &worker.id,
        &role.id,
        RoleAssignment {
            client_id: Some(client.clone()),
            is_primary: true,
            ..RoleAssignment::default()
        },
    )?;
    Ok(worker.id)
}

fn requirement(
    service: &ComplianceService<InMemoryStore>,
    worker: &WorkerId,
    control: &ControlId,
) -> Result<Option<RequiredControl>, AppError> {
    Ok(service
        .store()
        .required_controls(worker)?
        .into_iter()
        .find(|row| &row.control_id == control))
}

fn file_evidence(
    service: &ComplianceService<InMemoryStore>,
    worker: &WorkerId,
    control: &str,
    issued: DateTime<Utc>,
    expiry: Option<DateTime<Utc>>,
) -> Result<(), AppError> {
    let control = ControlId::from(control);
    let Some(row) = requirement(service, worker, &control)? else {
        return Ok(());
    };
    service.registry().add_evidence(
        &row.id,
        NewEvidence {
            artifact: EvidenceArtifact::File {
                path: format!("evidence/{}/{}.pdf", worker, control),
                checksum: format!("sha256:{}-{}", worker, control),
                size_bytes: 48_213,
            },
            issued_date: issued,
            expiry_date: expiry,
            status: EvidenceStatus::Valid,
        },
    )?;
    Ok(())
}

/// Three-person crew: a mostly compliant electrician, a welder on a temporary hot work
/// permit, and a scaffolder who has filed nothing.
pub(crate) fn stage_demo(
    now: DateTime<Utc>,
    client: &str,
    engine: &EngineConfig,
) -> Result<DemoSite, AppError> {
    let service = catalog_service(Arc::new(FixedClock::new(now)), engine)?;
    let client = ClientId::from(client);

    let electrician = hire(&service, "E-1001", "Morgan Reyes", "Electrician", &client)?;
    let welder = hire(&service, "E-1002", "Sam Okafor", "Welder", &client)?;
    let scaffolder = hire(&service, "E-1003", "Jordan Pike", "Scaffolder", &client)?;

    let issued = now - Duration::days(30);
    for (control, valid_days) in [
        ("c-lvr", Some(365)),
        ("c-electrical-licence", Some(1825)),
        ("c-heights", Some(1095)),
        ("c-harness", Some(730)),
        ("c-confined", Some(730)),
    ] {
        let expiry = valid_days.map(|days| issued + Duration::days(days));
        file_evidence(&service, &electrician, control, issued, expiry)?;
    }
    file_evidence(
        &service,
        &electrician,
        "c-gas",
        issued,
        Some(now + Duration::days(10)),
    )?;

    file_evidence(&service, &welder, "c-confined", issued, Some(issued + Duration::days(730)))?;
    file_evidence(&service, &welder, "c-gas", issued, Some(now + Duration::days(20)))?;
    file_evidence(&service, &welder, "c-gloves", issued, None)?;
    if let Some(permit) = requirement(&service, &welder, &ControlId::from("c-hotwork"))? {
        service.registry().apply_temporary_fix(
            &permit.id,
            now + Duration::days(7),
            Some("permit renewal lodged with site office".to_string()),
        )?;
    }

    Ok(DemoSite {
        service,
        client,
        crew: vec![electrician, welder, scaffolder],
    })
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs { now, client, json } = args;
    let now = now.unwrap_or_else(Utc::now);
    let engine = EngineConfig::from_env()?;

    println!("Safety compliance demo ({})", now.format("%Y-%m-%d %H:%M UTC"));
    let site = stage_demo(now, &client, &engine)?;

    for worker in &site.crew {
        let analysis = site.service.gaps().analyze_worker(worker)?;
        let score = site.service.scoring().score_worker(worker)?;
        render_worker(&analysis, &score);
    }

    let report = site.service.assignment().recompute_all()?;
    println!(
        "\nNightly recompute: {} processed | {} recomputed | {} skipped | {} writes",
        report.processed, report.recomputed, report.skipped, report.writes
    );

    let analysis = site.service.gaps().analyze_client(&site.client)?;
    render_client(&analysis);

    if json {
        let payload = serde_json::to_string_pretty(&analysis).map_err(std::io::Error::from)?;
        println!("{payload}");
    }

    Ok(())
}

pub(crate) fn run_roster_import(args: RosterImportArgs) -> Result<(), AppError> {
    let RosterImportArgs { path, client, now } = args;
    let clock: Arc<dyn Clock> = match now {
        Some(instant) => Arc::new(FixedClock::new(instant)),
        None => Arc::new(SystemClock),
    };
    let engine = EngineConfig::from_env()?;
    let service = catalog_service(clock, &engine)?;

    let summary = RosterImporter::from_path(service.registry(), &path)?;
    println!("Roster import: {}", path.display());
    println!(
        "- {} rows | {} workers created | {} roles assigned | {} skipped",
        summary.rows, summary.workers_created, summary.roles_assigned, summary.skipped
    );
    if !summary.unknown_roles.is_empty() {
        let unknown: Vec<&str> = summary.unknown_roles.iter().map(String::as_str).collect();
        println!("- Unknown roles (not assigned): {}", unknown.join(", "));
    }

    match client {
        Some(client) => {
            let analysis = service.gaps().analyze_client(&ClientId::from(client.as_str()))?;
            render_client(&analysis);
        }
        None => {
            println!("\nWorkers");
            for worker in service.store().workers()? {
                println!(
                    "  - {} {} [{}]",
                    worker.employee_id,
                    worker.name,
                    worker.status.label()
                );
            }
        }
    }

    Ok(())
}

fn render_worker(analysis: &WorkerGapAnalysis, score: &ReadinessScore) {
    let worker = &analysis.worker;
    println!(
        "\n{} ({}) status {} | RBCS {} | coverage {}% | audit readiness {}%",
        worker.name,
        worker.employee_id,
        worker.status.label(),
        score.rbcs,
        analysis.coverage.overall,
        analysis.readiness.audit_readiness
    );
    if analysis.gaps.is_empty() {
        println!("  No open gaps");
        return;
    }
    for gap in &analysis.gaps {
        let due = match gap.days_until_due {
            Some(days) if days < 0 => format!("{} days overdue", -days),
            Some(days) => format!("due in {days} days"),
            None => "no due date".to_string(),
        };
        println!(
            "  - [{:>3}] {} {} ({}, {})",
            gap.priority,
            gap.risk_level.label(),
            gap.control_name,
            gap.status.label(),
            due
        );
    }
}

fn render_client(analysis: &ClientGapAnalysis) {
    println!(
        "\nClient {}: {} workers | {} gaps ({} critical, {} high, {} overdue, {} expiring)",
        analysis.client_id,
        analysis.workers_analyzed,
        analysis.summary.total,
        analysis.summary.critical,
        analysis.summary.high,
        analysis.summary.overdue,
        analysis.summary.expiring
    );
    let by_criticality = &analysis.coverage.by_criticality;
    println!(
        "- Coverage {}% overall | critical {}% | high {}% | medium {}% | low {}%",
        analysis.coverage.overall,
        by_criticality.critical,
        by_criticality.high,
        by_criticality.medium,
        by_criticality.low
    );
    println!(
        "- Operational readiness {}% | audit readiness {}%",
        analysis.readiness.operational_readiness, analysis.readiness.audit_readiness
    );
    if analysis.recommendations.is_empty() {
        return;
    }
    println!("Recommendations:");
    for recommendation in &analysis.recommendations {
        println!("  - [{}] {}", recommendation.priority, recommendation.title);
        for action in &recommendation.actions {
            println!("      * {action}");
        }
    }
}
