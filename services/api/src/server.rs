use crate::cli::ServeArgs;
use crate::infra::{
    load_catalog, AppState, InMemoryHouseholdRepository, LoggingNotifier, ZipCodeAddressValidator,
};
use crate::routes::with_enrollment_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use benefit_eligibility::config::AppConfig;
use benefit_eligibility::error::AppError;
use benefit_eligibility::telemetry;
use benefit_eligibility::workflows::enrollment::{
    AddressValidator, EnrollmentService, HouseholdRepository, Notifier,
};
use chrono::Utc;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

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

    let catalog = load_catalog(args.catalog.programs_csv, args.catalog.categories_csv)?;
    let service = Arc::new(EnrollmentService::new(
        Arc::new(InMemoryHouseholdRepository::default()),
        Arc::new(LoggingNotifier::default()),
        Arc::new(ZipCodeAddressValidator::default()),
        catalog,
        config.renewal.policy(),
    ));

    spawn_renewal_sweeps(service.clone(), config.renewal.sweep_interval);

    let app = with_enrollment_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "benefit eligibility service ready");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Run a renewal sweep on every tick. The first tick fires immediately.
fn spawn_renewal_sweeps<R, N, V>(service: Arc<EnrollmentService<R, N, V>>, every: Duration)
where
    R: HouseholdRepository + 'static,
    N: Notifier + 'static,
    V: AddressValidator + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let sweeper = service.clone();
            let outcome =
                tokio::task::spawn_blocking(move || sweeper.sweep_renewals(Utc::now())).await;
            match outcome {
                Ok(Ok(report)) => info!(
                    scanned = report.scanned,
                    notified = report.notified.len(),
                    "scheduled renewal sweep finished"
                ),
                Ok(Err(err)) => warn!(error = %err, "scheduled renewal sweep failed"),
                Err(err) => warn!(error = %err, "renewal sweep task aborted"),
            }
        }
    });
}
