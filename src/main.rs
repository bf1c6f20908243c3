mod config;
mod log;
mod pipe;

use crate::config::load_config;
use adb_stream::connector::{SocketConnector, TcpConnector, WebSocketConnector};
use adb_stream::{StreamFactory, Target};
use clap::Parser;
use eyre::{Result, WrapErr, eyre};
use std::fmt::{Debug, Formatter};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info};

struct EyreHandler;

impl eyre::EyreHandler for EyreHandler {
    fn debug(
        &self, error: &(dyn std::error::Error + 'static), f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        Debug::fmt(error, f)
    }
}

/// Opens an ADB stream through a WebSocket proxy (or straight to the ADB server)
/// and pipes it through stdin/stdout.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Service to open, e.g. `host:version` or `shell:ls`.
    destination: String,

    /// Switch to the device with this serial first.
    #[arg(short, long, conflicts_with = "transport")]
    serial: Option<String>,

    /// Raw transport switch request, e.g. `host:transport-usb`.
    #[arg(long)]
    transport: Option<String>,

    /// WebSocket proxy url, overrides the config file.
    #[arg(long, conflicts_with = "tcp")]
    url: Option<String>,

    /// Talk to the ADB server over TCP instead of the WebSocket proxy, `--tcp=ADDR`
    /// overrides the configured address.
    #[arg(long, num_args = 0..=1, require_equals = true, value_name = "ADDR")]
    tcp: Option<Option<SocketAddr>>,
}

impl Args {
    fn target(&self) -> Option<Target> {
        match (&self.serial, &self.transport) {
            (Some(serial), _) => Some(Target::serial(serial)),
            (None, Some(transport)) => Some(Target::new(transport.clone())),
            (None, None) => None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    eyre::set_hook(Box::new(|_| Box::new(EyreHandler))).map_err(|e| eyre!(e))?;

    let args = Args::parse();
    let config = load_config().context("load config")?;

    let _guard = log::init(&config)?;

    let connector: Arc<dyn SocketConnector> = match args.tcp {
        Some(addr) => {
            let addr = addr.unwrap_or_else(|| config.server_address());
            info!(%addr, "using adb server");
            Arc::new(TcpConnector::new(addr))
        }
        None => {
            let url = args.url.clone().unwrap_or_else(|| config.url());
            info!(%url, "using websocket proxy");
            Arc::new(
                WebSocketConnector::new(url)
                    .with_subprotocol(config.subprotocol().map(str::to_owned)),
            )
        }
    };

    let mut factory = StreamFactory::new(connector);
    if let Some(limit) = config.handshake_timeout() {
        factory = factory.with_handshake_timeout(limit);
    }

    let target = args.target();
    debug!(?args, ?target, "starting");
    pipe::run(&factory, &args.destination, target.as_ref()).await
}
