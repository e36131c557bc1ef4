//! Application startup and lifecycle management.

use crate::config::RentalConfig;
use crate::handlers::{self, assets, bookings, commissions, webhooks};
use crate::services::{Database, GatewayClient, PaymentProcessor};
use axum::{
    Router,
    middleware::from_fn,
    routing::{delete, get, patch, post},
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::request_id_middleware;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: RentalConfig,
    pub db: Arc<Database>,
    pub gateway: GatewayClient,
    pub processor: PaymentProcessor,
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: RentalConfig) -> Result<Self, AppError> {
        let db = Database::new(
            config.database.url.expose_secret(),
            config.database.max_connections,
            config.database.min_connections,
        )
        .await?;
        db.run_migrations().await?;
        let db = Arc::new(db);

        let gateway = GatewayClient::new(config.gateway.clone());
        if gateway.is_configured() {
            tracing::info!("Payment gateway client initialized");
        } else {
            tracing::warn!("Gateway credentials not configured - refunds must be issued manually");
        }

        let processor = PaymentProcessor::new(db.clone(), gateway.clone());

        let state = AppState {
            config: config.clone(),
            db,
            gateway,
            processor,
        };

        let router = Router::new()
            .route("/health", get(handlers::health_check))
            .route("/ready", get(handlers::readiness_check))
            .route("/metrics", get(handlers::metrics))
            // Quote and booking lifecycle
            .route("/quotes", post(bookings::quote))
            .route("/bookings", post(bookings::create_booking))
            .route("/bookings/:id", get(bookings::get_booking))
            .route("/bookings/:id/transitions", get(bookings::list_transitions))
            .route("/bookings/:id/pickup", post(bookings::record_pickup))
            .route("/bookings/:id/return", post(bookings::record_return))
            .route("/bookings/:id/charges", post(bookings::add_charge))
            .route("/bookings/:id/cancel", post(bookings::cancel_booking))
            .route("/bookings/:id/no-show", post(bookings::mark_no_show))
            .route("/bookings/:id/settle", post(bookings::settle_booking))
            // Gateway callbacks
            .route("/webhooks/payment", post(webhooks::payment_callback))
            // Vendor / external-sync surface
            .route("/assets", post(assets::create_asset))
            .route(
                "/assets/:id",
                get(assets::get_asset).patch(assets::update_asset),
            )
            .route("/assets/:id/availability", get(assets::check_availability))
            .route("/assets/:id/blocks", post(assets::create_block))
            .route("/blocks/:id", delete(assets::deactivate_block))
            // Administration
            .route("/admin/holds/expire", post(bookings::expire_holds))
            .route(
                "/admin/commission-rates",
                post(commissions::create_rate).get(commissions::list_rates),
            )
            .route(
                "/admin/commission-rates/:id",
                patch(commissions::update_rate).delete(commissions::delete_rate),
            )
            .layer(from_fn(metrics_middleware))
            .layer(from_fn(request_id_middleware))
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or("-");

                    tracing::info_span!(
                        "http_request",
                        request_id = %request_id,
                        method = %request.method(),
                        uri = %request.uri(),
                        version = ?request.version(),
                    )
                }),
            )
            .with_state(state);

        // Bind eagerly so port 0 resolves to a concrete port for tests.
        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Rental service listening on port {}", port);

        Ok(Self {
            port,
            listener,
            router,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(self.listener, self.router).await
    }
}
