use std::{env, net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ident_storage::connection_manager;

use ident_server::{
    load, services::setup, shutdown_signal, version, App, AppConfig,
    AppRouter, AppState, Store,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = env::args().collect::<Vec<_>>();
    let config =
        if args.len() == 3 && (args[1] == "-c" || args[1] == "--config") {
            load(&args[2])?
        } else {
            AppConfig::parse()
        };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.rust_log))
        .with(tracing_subscriber::fmt::layer())
        .init();

    debug!("{:#?}", &config);
    info!("{}", version());
    run_server(config).await
}

async fn run_server(config: AppConfig) -> Result<()> {
    let store = match config.database_url.as_deref() {
        Some(url) => {
            info!("environment loaded and configuration parsed, initializing Mariadb connection...");
            let pool = connection_manager(
                url,
                config.max_size,
                config.min_idle,
                config.run_migrations,
            )
            .await
            .context("could not initialize the database connection pool")?;
            Store::mariadb(pool)
        }
        None => {
            warn!("no database_url configured, keys and users are kept in memory");
            Store::memory()
        }
    };

    let app = Arc::new(App::new(store, config.clone())?);

    if let Some(email) = config.owner_email.as_deref() {
        setup::ensure_owner(&app.store.user, email, &config.owner_name)
            .await
            .map_err(|err| anyhow::anyhow!("{}", err))
            .context("could not seed the owner")?;
    }

    // tokens can only be issued once a key exists
    app.key_rotator
        .rotate()
        .await
        .map_err(|err| anyhow::anyhow!("{}", err))
        .context("could not create the first signing key")?;
    key_rotate(app.clone());

    let router = AppRouter::build(AppState(app))
        .context("could not initialize application routes")?;
    let host = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&host)
        .await
        .context("could not bind to endpoint")?;

    info!("api server, listening on {}", host);
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("error while starting API server")?;

    Ok(())
}

fn key_rotate(app: Arc<App>) {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(tokio::time::Duration::from_secs(60));
        // the first tick completes immediately and the key was just created
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    debug!("checking signing key rotation");
                    if let Err(err) = app.key_rotator.rotate().await {
                        error!("{}", err);
                    }
                },
                _ = shutdown_signal() => {
                    break;
                }
            }
        }
        info!("key rotation stopped");
    });
}
