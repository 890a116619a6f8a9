use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::info;

use tablebook::accounts::StaticAccounts;
use tablebook::config::Config;
use tablebook::engine::Engine;
use tablebook::model::{Account, Role};
use tablebook::notify::{Dispatcher, LogNotifier, Notifier, WebhookNotifier};
use tablebook::service::BookingService;
use tablebook::session::SessionRegistry;
use tablebook::{compactor, wire};

/// Four two-seaters, four four-seaters, one six-seater.
const DEFAULT_LAYOUT: [(u32, usize); 3] = [(2, 4), (4, 4), (6, 1)];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    tablebook::observability::init(config.metrics_port);

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let engine = Arc::new(Engine::new(config.wal_path())?);
    let seeded = engine.seed_tables(&DEFAULT_LAYOUT).await?;
    if !seeded.is_empty() {
        info!("seeded {} tables", seeded.len());
    }

    let accounts = StaticAccounts::new();
    if let Some(admin) = &config.admin {
        accounts.insert(
            Account {
                username: admin.username.clone(),
                first_name: "Admin".into(),
                last_name: String::new(),
                email: admin.email.clone(),
                role: Role::Admin,
            },
            &admin.password,
        );
    }

    let notifier: Arc<dyn Notifier> = match &config.notify_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
        None => Arc::new(LogNotifier),
    };

    let service = Arc::new(BookingService::new(
        engine.clone(),
        Arc::new(SessionRegistry::new()),
        Arc::new(accounts),
        Dispatcher::new(notifier),
        config.restaurant_name.clone(),
    ));

    let compactor_engine = engine.clone();
    let threshold = config.compact_threshold;
    tokio::spawn(async move {
        compactor::run_compactor(compactor_engine, threshold).await;
    });

    let max_connections = config.max_connections;
    let semaphore = Arc::new(Semaphore::new(max_connections));

    let addr = format!("{}:{}", config.bind, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("tablebook listening on {addr}");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  max_connections: {max_connections}");
    info!("  restaurant: {}", config.restaurant_name);
    info!("  notifications: {}", config.notify_url.as_deref().unwrap_or("log only"));
    info!("  metrics: {}", config.metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    // Graceful shutdown: stop accepting on SIGTERM/ctrl-c, drain in-flight connections
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (socket, peer) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::error!("accept error: {e}");
                        continue;
                    }
                };

                let permit = match semaphore.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        tracing::warn!("connection limit reached, rejecting {peer}");
                        metrics::counter!(tablebook::observability::CONNECTIONS_REJECTED_TOTAL).increment(1);
                        drop(socket);
                        continue;
                    }
                };

                info!("connection from {peer}");
                metrics::counter!(tablebook::observability::CONNECTIONS_TOTAL).increment(1);
                metrics::gauge!(tablebook::observability::CONNECTIONS_ACTIVE).increment(1.0);
                let svc = service.clone();

                tokio::spawn(async move {
                    let _permit = permit; // held until connection closes
                    if let Err(e) = wire::process_connection(socket, svc).await {
                        tracing::error!("connection error from {peer}: {e}");
                    }
                    metrics::gauge!(tablebook::observability::CONNECTIONS_ACTIVE).decrement(1.0);
                });
            }
            _ = &mut shutdown => {
                info!("shutdown signal received, stopping accept loop");
                break;
            }
        }
    }

    // Wait for in-flight connections to finish (up to 10s)
    info!("draining connections...");
    let drain_deadline = tokio::time::sleep(std::time::Duration::from_secs(10));
    tokio::pin!(drain_deadline);

    loop {
        if semaphore.available_permits() == max_connections {
            info!("all connections drained");
            break;
        }
        tokio::select! {
            _ = &mut drain_deadline => {
                let remaining = max_connections - semaphore.available_permits();
                tracing::warn!("drain timeout, {remaining} connections still open");
                break;
            }
            _ = tokio::time::sleep(std::time::Duration::from_millis(100)) => {}
        }
    }

    info!("tablebook stopped");
    Ok(())
}
