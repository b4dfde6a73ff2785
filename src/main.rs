use std::sync::Arc;

use clap::{Parser, Subcommand};
use feedstore::config::{ManagerSettings, NodeSettings, DEFAULT_KEY_SPACE};
use feedstore::{
    kv_router, master_router, HttpTransport, ShardManager, Shardmaster, StorageNode, ViewMonitor,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "feedstore")]
#[command(about = "Sharded primary/backup key-value store", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the shardmaster (shard-range -> server map).
    Master {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:7400")]
        listen: String,

        /// Size of the key-id universe the rebalancer partitions
        #[arg(long, default_value_t = DEFAULT_KEY_SPACE)]
        key_space: u64,
    },
    /// Run a shardmanager (view service + forwarder).
    Manager {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:7450")]
        listen: String,

        /// Address of the shardmaster
        #[arg(long)]
        shardmaster: String,
    },
    /// Run a storage server.
    Server {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:7500")]
        listen: String,

        /// Address of the shardmanager fronting this server
        #[arg(long)]
        manager: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before parsing CLI args)
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "feedstore=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let shutdown = CancellationToken::new();

    match args.command {
        Command::Master { listen, key_space } => {
            let master = Arc::new(Shardmaster::new(key_space));
            tracing::info!(%listen, key_space, "shardmaster starting");
            serve(master_router(master), &listen, shutdown).await
        }
        Command::Manager {
            listen,
            shardmaster,
        } => {
            let transport = Arc::new(HttpTransport::new());
            let manager = Arc::new(ShardManager::new(
                shardmaster.clone(),
                transport,
                ManagerSettings::default(),
            ));
            let monitor = ViewMonitor::spawn(manager.clone(), shutdown.clone());
            tracing::info!(%listen, %shardmaster, "shardmanager starting");
            let result = serve(kv_router(manager), &listen, shutdown).await;
            let _ = monitor.await;
            result
        }
        Command::Server { listen, manager } => {
            let transport = Arc::new(HttpTransport::new());
            let node = Arc::new(StorageNode::new(
                listen.clone(),
                manager.clone(),
                transport,
                NodeSettings::default(),
            ));
            let loops = node.start(shutdown.clone());
            tracing::info!(%listen, %manager, "storage server starting");
            let result = serve(kv_router(node), &listen, shutdown).await;
            for handle in loops {
                let _ = handle.await;
            }
            result
        }
    }
}

/// Serve a router until ctrl-c, then cancel the background tasks.
async fn serve(
    router: axum::Router,
    listen: &str,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(listen).await?;
    let token = shutdown.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            token.cancel();
        })
        .await?;
    shutdown.cancel();
    Ok(())
}
