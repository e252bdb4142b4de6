mod net;

use clap::Parser;
use net::{ConnId, Event};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use tilemud_common::PlayerId;
use tilemud_engine::{EngineConfig, Mud};
use tilemud_persist::Database;
use tilemud_script::SandboxLimits;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tilemud-server", about = "Host a tilemud world over TCP")]
struct Cli {
    /// World data directory (meta.json, persistent.json, commands/)
    #[arg(short, long, default_value = "data")]
    data_dir: PathBuf,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// Port to listen on; defaults to the world's configured port
    #[arg(short, long)]
    port: Option<u16>,

    #[arg(long, default_value = "255")]
    width: u32,
    #[arg(long, default_value = "255")]
    height: u32,
    #[arg(long, default_value = "1")]
    layers: u32,

    /// Operation budget for one user-command script run
    #[arg(long)]
    script_ops: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn engine_config(&self) -> EngineConfig {
        let mut limits = SandboxLimits::default();
        if let Some(ops) = self.script_ops {
            limits.max_operations = ops;
        }
        EngineConfig {
            dimensions: glam::UVec3::new(self.width, self.height, self.layers),
            limits,
            ..EngineConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let db = Database::open(&cli.data_dir)?;
    let port = cli.port.unwrap_or(db.meta().default_port);
    let mud = Mud::boot(db, cli.engine_config())?;

    let bind = SocketAddr::new(cli.host, port);
    let listener = TcpListener::bind(bind).await?;
    info!(target: "tilemud::boot", %bind, "listening");

    let (events_tx, events_rx) = mpsc::channel::<Event>(1024);
    tokio::spawn(accept_loop(listener, events_tx));

    run(mud, events_rx).await
}

async fn accept_loop(listener: TcpListener, events: mpsc::Sender<Event>) {
    let mut next: ConnId = 0;
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("accept failed: {e}");
                continue;
            }
        };
        let conn = next;
        next += 1;
        let events = events.clone();
        tokio::spawn(async move {
            if let Err(e) = net::handle_conn(stream, peer, conn, events).await {
                warn!(%peer, err = %e, "connection ended with error");
            }
        });
    }
}

/// The single dispatch loop: every connection event is applied to the world
/// here, one at a time.
async fn run(mut mud: Mud, mut events: mpsc::Receiver<Event>) -> anyhow::Result<()> {
    let mut players: HashMap<ConnId, PlayerId> = HashMap::new();
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);
    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = &mut interrupt => {
                info!(target: "tilemud::boot", "shutting down");
                break;
            }
        };
        let Some(event) = event else {
            break;
        };
        match event {
            Event::Connected { conn, transport } => {
                players.insert(conn, mud.connect(Box::new(transport)));
            }
            Event::Line { conn, line } => match players.get(&conn) {
                Some(id) => mud.input(*id, &line),
                None => warn!(conn, "line from an unknown connection"),
            },
            Event::Closed { conn } => {
                if let Some(id) = players.remove(&conn) {
                    mud.disconnect(id);
                }
            }
        }
        players.retain(|_, id| mud.is_connected(*id));
    }

    if let Err(e) = mud.shutdown() {
        error!("failed to save on shutdown: {e}");
    }
    Ok(())
}
