mod config;
mod listen;
mod resolver;

use std::{
    path::PathBuf,
    sync::Arc,
};

use clap::Parser;
use color_eyre::eyre::{
    Error,
    eyre,
};
use tokio::{
    io::AsyncWriteExt,
    sync::mpsc,
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;
use trackbee_engine::{
    Dispatcher,
    PositionSink,
    SessionRegistry,
};
use trackbee_types::Position;

use crate::{
    config::{
        Config,
        Transport,
    },
    resolver::ConfigResolver,
};

#[derive(Debug, Parser)]
struct Args {
    /// Path to the server configuration
    #[clap(short, long, env = "TRACKBEE_CONFIG", default_value = "trackbee.json")]
    config: PathBuf,

    /// Append decoded positions to this file as JSON lines
    #[clap(long)]
    positions_out: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let _ = dotenvy::dotenv();
    color_eyre::install()?;
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = Config::load(&args.config)?;
    if config.listeners.is_empty() {
        return Err(eyre!("no listeners configured"));
    }

    let resolver = Arc::new(ConfigResolver::new(
        config.devices.clone(),
        config.accept_unknown,
    ));
    let registry = Arc::new(SessionRegistry::new(resolver));
    let (sink, positions) = PositionSink::channel(config.queue_capacity);
    let dispatcher = Arc::new(Dispatcher::new(registry, sink));

    let shutdown = CancellationToken::new();
    let mut tasks = JoinSet::new();

    tasks.spawn(consume_positions(
        positions,
        args.positions_out.clone(),
        shutdown.clone(),
    ));

    for listener in &config.listeners {
        let protocol = trackbee_protocols::create(&listener.protocol, &listener.options)?;
        let dispatcher = dispatcher.clone();
        let shutdown = shutdown.clone();
        let port = listener.port;

        match listener.transport {
            Transport::Tcp => {
                tasks.spawn(async move {
                    listen::serve_tcp(dispatcher, protocol, port, shutdown)
                        .await
                        .map_err(Error::from)
                });
            }
            Transport::Udp => {
                tasks.spawn(async move {
                    listen::serve_udp(dispatcher, protocol, port, shutdown)
                        .await
                        .map_err(Error::from)
                });
            }
            Transport::Http => {
                tasks.spawn(async move {
                    listen::serve_http(dispatcher, protocol, port, shutdown)
                        .await
                        .map_err(Error::from)
                });
            }
        }
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    shutdown.cancel();

    while let Some(result) = tasks.join_next().await {
        if let Err(error) = result? {
            tracing::error!(%error, "task failed during shutdown");
        }
    }

    Ok(())
}

/// Stand-in for the persistence collaborator: logs every decoded
/// position and optionally appends it to a JSON-lines file.
async fn consume_positions(
    mut positions: mpsc::Receiver<Position>,
    out_path: Option<PathBuf>,
    shutdown: CancellationToken,
) -> Result<(), Error> {
    let mut out = match &out_path {
        Some(path) => {
            Some(
                tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .await?,
            )
        }
        None => None,
    };

    loop {
        let position = tokio::select! {
            () = shutdown.cancelled() => break,
            position = positions.recv() => match position {
                Some(position) => position,
                None => break,
            },
        };

        tracing::info!(
            device_id = %position.device_id,
            protocol = position.protocol,
            latitude = position.latitude,
            longitude = position.longitude,
            valid = position.valid,
            "position"
        );

        if let Some(file) = &mut out {
            let mut line = serde_json::to_vec(&position)?;
            line.push(b'\n');
            file.write_all(&line).await?;
        }
    }

    if let Some(file) = &mut out {
        file.flush().await?;
    }

    Ok(())
}
