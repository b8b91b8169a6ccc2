//! Rubrica server
//!
//! Keeps a live view of a Grandstream UCM's calls and extensions, pushes it
//! to browsers over SSE and WebSocket, and places click-to-dial calls.

use actix_web::{middleware, App, HttpServer};
use anyhow::Context;
use rubrica_api::{ApiState, PbxStatus, StreamSettings};
use rubrica_core::{AppConfig, DirectoryLookup, StaticDirectory};
use rubrica_monitor::{
    CallStateStore, ClientSettings, EventBroadcaster, ExtensionStatusTable, PbxEventClient,
    Reconciler,
};
use rubrica_ucm::{DialInvoker, HttpUcmApi, SessionCache};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging
fn init_tracing() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "rubrica={lvl},rubrica_api={lvl},rubrica_monitor={lvl},rubrica_ucm={lvl},rubrica_core={lvl},actix_web=info,pbx_raw=off",
            lvl = log_level
        ))
    });

    let json = env::var("LOG_FORMAT")
        .map(|f| f.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .init();
    }
}

fn load_directory(config: &AppConfig) -> anyhow::Result<Arc<dyn DirectoryLookup>> {
    let country_code = config.dial.country_code.clone();
    let directory = match config.directory.file.as_deref() {
        Some(path) => StaticDirectory::from_file(country_code, path)
            .with_context(|| format!("loading directory {}", path))?,
        None => {
            warn!("No directory file configured, lookups will return no names");
            StaticDirectory::new(country_code)
        }
    };
    Ok(Arc::new(directory))
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting Rubrica v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load().context("loading configuration")?;
    let directory = load_directory(&config)?;

    // Live tables, shared by the event client (writer) and the handlers
    let store = Arc::new(CallStateStore::new());
    let extensions = Arc::new(ExtensionStatusTable::new());
    let broadcaster = EventBroadcaster::new(config.events.queue_capacity);

    // Click-to-dial over the HTTPS API
    let api = HttpUcmApi::from_config(&config.ucm).context("building PBX API client")?;
    info!(base_url = %api.base_url(), "PBX API client configured");
    let session = Arc::new(SessionCache::new(
        Arc::new(api),
        config.ucm.credential(),
        config.ucm.authenticator(),
    ));
    let dialer = Arc::new(DialInvoker::new(session, config.dial.country_code.clone()));

    // Event client, one per process
    let reconciler = Reconciler::new(
        store.clone(),
        extensions.clone(),
        broadcaster.clone(),
        directory.clone(),
        config.monitor.lookup_timeout(),
    );
    let client = PbxEventClient::new(ClientSettings::from_config(&config), reconciler);
    let pbx_status = PbxStatus::new(client.watch_state());

    let shutdown = CancellationToken::new();
    let client_handle = tokio::spawn(client.run(shutdown.clone()));

    let state = ApiState {
        store,
        extensions,
        broadcaster,
        directory,
        dialer,
        pbx_status,
        stream: StreamSettings {
            keepalive: Duration::from_secs(config.events.keepalive_secs.max(1)),
        },
    };

    let bind_addr = config.server_addr();
    let workers = config.server.workers.unwrap_or_else(num_cpus::get);
    info!("Starting HTTP server on {} with {} workers", bind_addr, workers);

    HttpServer::new(move || {
        let state = state.clone();
        App::new()
            .wrap(TracingLogger::default())
            .wrap(middleware::Logger::new("%a \"%r\" %s %b %Dms"))
            .configure(move |cfg| state.configure(cfg))
    })
    .workers(workers)
    .bind(&bind_addr)
    .with_context(|| format!("binding {}", bind_addr))?
    .run()
    .await?;

    info!("HTTP server stopped, shutting down PBX event client");
    shutdown.cancel();
    if let Err(e) = client_handle.await {
        warn!("PBX event client task ended abnormally: {}", e);
    }

    Ok(())
}
