use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

mod auth;
mod config;
mod error;
mod models;
mod routes;
mod state;
mod validation;

use crate::config::Config;
use crate::state::AppState;

#[tokio::main]
async fn main() {
    // initialize tracing
    tracing_subscriber::fmt::init();

    let config = Config::load();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .expect("database connection failed");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("database migration failed");

    bootstrap_admin(&pool, &config).await;

    let app = routes::router()
        .with_state(AppState::new(pool))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .unwrap();
    tracing::info!("listening on {}", listener.local_addr().unwrap());
    axum::serve(listener, app).await.unwrap();
}

/// Ensure a staff account exists when ADMIN_EMAIL/ADMIN_PASSWORD are set.
async fn bootstrap_admin(pool: &PgPool, config: &Config) {
    let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) else {
        return;
    };

    let email = validation::normalize_email(email);
    let exists =
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM users WHERE email = $1)")
            .bind(&email)
            .fetch_one(pool)
            .await
            .expect("admin lookup failed");

    if exists {
        tracing::info!("admin user already present, skipping bootstrap");
        return;
    }

    match auth::create_superuser(pool, &email, &config.admin_name, password).await {
        Ok(user) => tracing::info!(user_id = %user.id, "created admin user"),
        Err(e) => tracing::error!("admin bootstrap failed: {e}"),
    }
}
