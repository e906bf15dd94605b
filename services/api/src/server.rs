use crate::cli::ServeArgs;
use crate::infra::{seed_catalog, AppState};
use crate::routes::with_compliance_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use safetrack::compliance::{ComplianceService, InMemoryStore, RosterImporter, SystemClock};
use safetrack::config::AppConfig;
use safetrack::error::AppError;
use safetrack::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = Arc::new(InMemoryStore::new());
    seed_catalog(store.as_ref())?;
    let service = Arc::new(ComplianceService::from_config(
        store,
        Arc::new(SystemClock),
        &config.engine,
    )?);

    if let Some(path) = args.roster.take() {
        let summary = RosterImporter::from_path(service.registry(), &path)?;
        info!(
            path = %path.display(),
            workers = summary.workers_created,
            roles = summary.roles_assigned,
            "roster preloaded"
        );
    }

    let app = with_compliance_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "safety compliance service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
