use std::{net::SocketAddr, sync::Arc, sync::Mutex};

use admin_ipc::{run_server, DEFAULT_SOCKET_PATH};
use clap::Parser;
use feed::FeedHub;
use feed_ipc::DEFAULT_FEED_SOCKET_PATH;
use metrics::MetricsHandle;
use notifier::{Collaborators, NotifierOptions, OrderWatch};
use orders::ShopId;
use prefs::SoundSetting;
use storage::init_sqlite;
use tokio::task;
use tracing::{info, warn, Level};
use uuid::Uuid;

mod admin;
mod config;
mod sinks;

use admin::AdminContext;
use config::{ensure_sqlite_parent_dir, validate_sqlite_path};
use sinks::{run_journal_writer, InvalidationCounter, JournalSink, MetricsObserver, TerminalBell};

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, env = "SQLITE_PATH", default_value = "sqlite://orderd.db?mode=rwc")]
    sqlite_path: String,

    #[arg(long, env = "ADMIN_SOCKET", default_value = DEFAULT_SOCKET_PATH)]
    admin_socket: String,

    #[arg(long, env = "FEED_SOCKET", default_value = DEFAULT_FEED_SOCKET_PATH)]
    feed_socket: String,

    #[arg(long, env = "METRICS_ADDR", default_value = "127.0.0.1:9109")]
    metrics_addr: SocketAddr,

    /// Shop to watch at boot; can be changed later over the admin socket.
    #[arg(long, env = "SHOP_ID")]
    shop_id: Option<String>,

    /// Also announce order status transitions.
    #[arg(long, env = "NOTIFY_STATUS_CHANGES")]
    notify_status_changes: bool,
}

fn log_startup(args: &Args, run_id: &str) {
    info!(path = %args.sqlite_path, "sqlite path configured");
    info!(socket = %args.admin_socket, "admin socket bind planned");
    info!(socket = %args.feed_socket, "feed socket bind planned");
    info!(addr = %args.metrics_addr, "metrics bind planned");
    match &args.shop_id {
        Some(shop_id) => info!(%shop_id, "initial shop configured"),
        None => info!("no initial shop, waiting for admin watch request"),
    }
    info!(%run_id, "run initialized");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    validate_sqlite_path(&args.sqlite_path)?;
    let initial_shop = args.shop_id.clone().map(ShopId::new).transpose()?;
    info!(
        sqlite = %args.sqlite_path,
        admin_socket = %args.admin_socket,
        feed_socket = %args.feed_socket,
        "booting orderd"
    );

    ensure_sqlite_parent_dir(&args.sqlite_path)?;

    let run_id = Uuid::new_v4().to_string();
    let store = init_sqlite(&args.sqlite_path).await?;
    store.insert_run(&run_id, None).await?;
    log_startup(&args, &run_id);

    let missing_tables = store.validate_required_tables().await?;
    if !missing_tables.is_empty() {
        warn!(tables = ?missing_tables, "sqlite missing required tables");
        if let Err(err) = store
            .log_incident(
                &run_id,
                "warning",
                "db_schema_missing",
                &format!(
                    "sqlite missing required tables: {}",
                    missing_tables.join(", ")
                ),
            )
            .await
        {
            warn!(error = ?err, "failed to log missing schema incident");
        }
    }

    let sound = SoundSetting::new(store.load_sound_enabled().await?);
    info!(enabled = sound.enabled(), "notification sound preference loaded");

    let metrics = MetricsHandle::new()?;
    let metrics_addr = args.metrics_addr;
    let metrics_task = metrics.clone();
    task::spawn(async move {
        if let Err(err) = metrics_task.serve(metrics_addr).await {
            tracing::error!(error = ?err, "metrics server error");
        }
    });

    let hub = FeedHub::new();
    let feed_socket = args.feed_socket.clone();
    let ingest_hub = hub.clone();
    task::spawn(async move {
        if let Err(err) = feed_ipc::run_server(&feed_socket, ingest_hub).await {
            tracing::error!(error = ?err, "feed ingest server failed");
        }
    });

    let (sink, journal_rx) = JournalSink::new(metrics.clone());
    task::spawn(run_journal_writer(store.clone(), run_id.clone(), journal_rx));

    let collaborators = Collaborators::new(
        Arc::new(InvalidationCounter::new(metrics.clone())),
        Arc::new(sink),
        Arc::new(sound.clone()),
    )
    .with_cue(TerminalBell::detect());
    let options = NotifierOptions {
        notify_status_changes: args.notify_status_changes,
    };
    let mut watch = OrderWatch::new(Arc::new(hub.clone()), collaborators, options)
        .with_observer(Arc::new(MetricsObserver::new(metrics.clone())));
    watch.set_shop(initial_shop);
    let watch = Arc::new(Mutex::new(watch));

    let ctx = AdminContext {
        run_id: run_id.clone(),
        watch: Arc::clone(&watch),
        sound,
        store: store.clone(),
    };
    let socket_path = args.admin_socket.clone();
    task::spawn(async move {
        if let Err(err) = run_server(&socket_path, move |req| ctx.handle(req)).await {
            tracing::error!(error = ?err, "admin ipc server failed");
        }
    });

    info!(
        run_id = %run_id,
        sqlite = %args.sqlite_path,
        admin_socket = %args.admin_socket,
        feed_socket = %args.feed_socket,
        metrics_addr = %args.metrics_addr,
        "ready"
    );
    if let Err(err) = store
        .log_incident(&run_id, "info", "ready", "orderd booted and ready")
        .await
    {
        warn!(error = ?err, "failed to record ready incident");
    }

    tokio::signal::ctrl_c().await?;
    info!(run_id = %run_id, "shutting down");
    match watch.lock() {
        Ok(mut watch) => watch.teardown(),
        Err(_) => warn!("order watch poisoned during shutdown"),
    }
    Ok(())
}
