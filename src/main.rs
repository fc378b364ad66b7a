use asset_admin::{
    app, apply_migrations, builtin, ensure_database_exists, load_from_file, resolve, AppState,
    MemoryBackend, PgBackend, Settings, Storage,
};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("asset_admin=info,tower_http=info")),
        )
        .init();

    let settings = Settings::from_env()?;
    let config = match &settings.entity_config {
        Some(path) => load_from_file(path).await?,
        None => builtin()?,
    };
    let mut model = resolve(&config)?;
    if let Some(schema) = &settings.schema {
        model.schema = schema.clone();
    }
    tracing::info!(entities = model.entities.len(), schema = %model.schema, "entity model loaded");

    let state = match settings.storage {
        Storage::Memory => {
            tracing::warn!("using in-memory storage; data is lost on exit");
            AppState::new(model, MemoryBackend::new())
        }
        Storage::Postgres => {
            let url = settings.database_url.as_deref().unwrap_or_default();
            ensure_database_exists(url).await?;
            let backend = PgBackend::connect(
                url,
                model.schema.clone(),
                settings.max_connections,
                settings.acquire_timeout,
            )
            .await?;
            apply_migrations(backend.pool(), &model).await?;
            AppState::new(model, backend)
        }
    };

    let router = app(state, settings.max_body_bytes);
    let listener = TcpListener::bind(settings.bind_addr).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
