use anyhow::Context;
use fasthack::{app, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "fasthack=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let state = AppState::init().await.context("initialise app state")?;
    let (host, port) = (state.config.host.clone(), state.config.port);
    tracing::info!(
        meals = state.catalog.meals.len(),
        restaurants = state.catalog.restaurants.len(),
        google = state.google.is_some(),
        "fasthack api starting"
    );
    let router = app::build_app(state);
    app::serve(router, &host, port).await
}
