use axum::http::{HeaderValue, Method};
use kindred::{
    get_db_pool,
    handlers::{self, AppState, JwtKeys},
    services::build_match_engine,
    utils, Config,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    utils::init_logging();

    let config = Config::from_env()?;
    let db_config = kindred::db::DatabaseConfig::from_env()?;
    let pool = get_db_pool(&db_config).await?;

    // Run migrations
    kindred::db::migrations::run_migrations(&pool).await?;

    let engine = build_match_engine(pool, &config)?;
    let state = AppState::new(engine, JwtKeys::new(&config.jwt_secret));

    let app = handlers::create_router(state)
        .layer(create_cors_layer(&config))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!("Server running on port {}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}

fn create_cors_layer(config: &Config) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(false);

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    if origins.is_empty() {
        // Permissive when ALLOWED_ORIGINS is unset or unparsable
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(origins)
    }
}
