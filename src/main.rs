use anyhow::Context;
use sqlx::sqlite::SqlitePoolOptions;
use turboform::{app, auth, chat, config::Config, db, telemetry, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let config = Config::from_env()?;
    telemetry::init_tracing(config.log_json);

    let db_pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect(&config.database_url)
        .await
        .with_context(|| format!("connecting to {}", config.database_url))?;
    db::migrate(&db_pool).await?;

    let clients = match &config.oauth_clients_file {
        Some(path) => {
            let json = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
            auth::Clients::from_json(serde_json::from_str(&json)?, &config.public_url)?
        }
        None => {
            tracing::warn!("OAUTH_CLIENTS_FILE not set, sign-in providers are disabled");
            auth::Clients::default()
        }
    };
    let upstream = chat::Upstream::new(&config.api_base_url)?;

    let app = app(AppState::new(db_pool, clients, upstream), &config.serve);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, upstream = %config.api_base_url, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
