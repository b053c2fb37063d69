mod route;

use axum::{
    routing::{get, post},
    Json, Router,
};
use route::{plan_route, RouteRequest, RouteResponse};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

async fn health() -> &'static str {
    "ok"
}

async fn compute_route(Json(req): Json<RouteRequest>) -> Json<RouteResponse> {
    let resp = plan_route(&req);
    tracing::info!(
        src = %req.src,
        dst = %req.dst,
        ok = resp.ok,
        hops = resp.path.len().saturating_sub(1),
        "route computed"
    );
    Json(resp)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let app = Router::new()
        .route("/health", get(health))
        .route("/route", post(compute_route));

    let listen = std::env::var("ROUTER_LISTEN").unwrap_or_else(|_| "0.0.0.0:8000".into());
    let listener = tokio::net::TcpListener::bind(&listen).await?;
    tracing::info!(%listen, "router listening");

    axum::serve(listener, app).await?;
    Ok(())
}
