use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryMarketplaceStore, InMemoryPaymentGateway};
use crate::routes::with_marketplace_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;
use tuition_market::config::AppConfig;
use tuition_market::error::AppError;
use tuition_market::marketplace::{
    ApplicationService, MarketplaceServices, SettlementService, TuitionService,
};
use tuition_market::telemetry;

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

    let store = Arc::new(InMemoryMarketplaceStore::default());
    let gateway = Arc::new(InMemoryPaymentGateway::default());
    let services = MarketplaceServices {
        tuitions: Arc::new(TuitionService::new(store.clone(), config.policy)),
        applications: Arc::new(ApplicationService::new(store.clone())),
        settlement: Arc::new(SettlementService::new(store, gateway)),
    };

    let app = with_marketplace_routes(services)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "tuition marketplace ready");

    axum::serve(listener, app).await?;
    Ok(())
}
