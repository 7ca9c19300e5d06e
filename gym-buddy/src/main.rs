use axum::http::{header, HeaderValue, Method};
use gym_buddy::api;
use gym_buddy::app_state::{AppState, AppStateConfig};
use gym_buddy::config::AppConfig;
use gym_buddy::{db, inference};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,gym_buddy=debug,tower_http=info".into());
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn load_env_file() {
    let cwd = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            tracing::warn!(error = %e, "Could not determine current directory for .env lookup");
            return;
        }
    };

    let mut current = cwd.clone();
    loop {
        let candidate = current.join(".env");
        if candidate.exists() {
            match dotenvy::from_path(&candidate) {
                Ok(_) => tracing::info!(path = %candidate.display(), "Loaded environment from .env"),
                Err(e) => tracing::warn!(
                    path = %candidate.display(),
                    error = %e,
                    "Failed to load .env file"
                ),
            }
            return;
        }

        if !current.pop() {
            break;
        }
    }

    tracing::debug!(
        cwd = %cwd.display(),
        "No .env file found in current directory or ancestors; using process environment only"
    );
}

fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    let allowed_origins = origins
        .iter()
        .map(|origin| HeaderValue::from_str(origin))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| anyhow::anyhow!("Invalid CORS origin: {e}"))?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(std::time::Duration::from_secs(3600)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    // Load .env before reading configuration so provider credentials are
    // picked up when running from a subdirectory.
    load_env_file();

    let config = AppConfig::from_env()?;
    tracing::info!(
        bind = %config.bind_addr(),
        database = %config.database_url,
        model = %config.inference.model,
        "Starting gym buddy server"
    );

    let pool = db::connect(&config.database_url).await?;
    let provider = inference::build_provider(&config.inference)?;
    tracing::info!(provider = provider.name(), "Inference provider ready");

    let app_state = AppState::spawn(pool, provider, AppStateConfig::from(&config))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start actor system: {e}"))?;
    let app_state = Arc::new(app_state);

    let api_state = api::ApiState {
        app_state: app_state.clone(),
    };

    let app = api::router()
        .with_state(api_state)
        .layer(cors_layer(&config.cors_allowed_origins)?)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(api::panic_response));

    let listener = TcpListener::bind(config.bind_addr()).await?;
    tracing::info!(addr = %listener.local_addr()?, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    app_state.shutdown();
    Ok(())
}
