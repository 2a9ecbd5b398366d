use std::net::SocketAddr;
use std::sync::Arc;

use pawmart_api::{app, AppState};
use pawmart_core::coupons::MockCouponDirectory;
use pawmart_core::gateway::MockPaymentGateway;
use pawmart_core::membership::MockMembershipLookup;
use pawmart_core::wallet::MockWalletService;
use pawmart_order::reconciliation::ReconciliationSweep;
use pawmart_order::repository::OrderLedger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pawmart_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = pawmart_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting PawMart settlement API on port {}", config.server.port);

    let db = pawmart_store::DbClient::new(&config.database.url)
        .await
        .expect("Failed to connect to Postgres");
    db.migrate().await.expect("Failed to run migrations");

    let ledger: Arc<dyn OrderLedger> = Arc::new(pawmart_store::PgOrderLedger::new(db.pool.clone()));

    // Wallet, gateway, membership and coupon directory are external
    // collaborators; the in-process adapters stand in for them outside a
    // full deployment.
    let wallet = Arc::new(MockWalletService::new());
    let gateway = Arc::new(MockPaymentGateway::new());
    let membership = Arc::new(MockMembershipLookup::new());
    let coupons = Arc::new(MockCouponDirectory::new());

    let rules = config.business_rules.clone();
    let state = AppState::new(
        Arc::clone(&ledger),
        wallet,
        gateway,
        membership,
        coupons,
        rules.shipping_rules(),
        rules.poll_interval(),
        rules.poll_timeout(),
    );

    // Periodic recovery for orders the happy path left behind.
    let sweep = ReconciliationSweep::new(
        ledger,
        Arc::clone(&state.poller),
        chrono::Duration::seconds(rules.gateway_poll_timeout_seconds as i64),
    );
    let sweep_every = rules.poll_timeout();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(sweep_every).await;
            match sweep.run().await {
                Ok(report) => tracing::info!(?report, "reconciliation sweep completed"),
                Err(err) => tracing::error!(%err, "reconciliation sweep failed"),
            }
        }
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app(state)).await.unwrap();
}
