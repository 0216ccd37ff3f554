//! Heartbeat Monitor CLI
//!
//! dead man's switch：monitor 超时未 tick 时发送一次通知

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use heartbeat_monitor::{
    HeartbeatConfig, JsonFileStore, MemoryStore, MonitorManager, MonitorStore, NotificationBuilder,
    RpcServer,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "heartbeat")]
#[command(about = "Heartbeat Monitor - dead man's switch 服务")]
#[command(version)]
struct Cli {
    /// 配置文件路径（默认 ~/.config/heartbeat-monitor/config.json）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 启动 monitor 服务（stdio JSON-RPC）
    Serve {
        /// 使用内存存储（不持久化）
        #[arg(long)]
        memory: bool,
        /// 只记录日志，不实际发送通知
        #[arg(long)]
        dry_run: bool,
    },
    /// 打印生效的配置
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("heartbeat_monitor=info,heartbeat=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();
    let mut config = HeartbeatConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { memory, dry_run } => {
            config.dry_run |= dry_run;
            serve(&config, memory).await?;
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

async fn serve(config: &HeartbeatConfig, memory: bool) -> Result<()> {
    let store: Arc<dyn MonitorStore> = if memory {
        warn!("Using in-memory store, monitors will not survive a restart");
        Arc::new(MemoryStore::new())
    } else {
        let store = JsonFileStore::open(&config.data_dir)?;
        info!(path = %store.file_path().display(), "Using monitor file store");
        Arc::new(store)
    };

    let dispatcher = Arc::new(NotificationBuilder::from_config(config).build()?);
    let manager = MonitorManager::new(store, dispatcher);

    manager
        .load()
        .await
        .context("Failed to load monitors from store")?;

    let server = RpcServer::new(manager.clone(), config.default_timeout_secs);

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C, shutting down");
        }
    }

    manager.shutdown();
    Ok(())
}
