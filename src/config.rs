use adb_stream::{ADB_SERVER_PORT, WEBSOCKET_PROXY_PORT};
use camino::Utf8PathBuf;
use eyre::Result;
use eyre::{Context, OptionExt};
use serde::Deserialize;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use std::{env, fs, io};

const DEFAULT_SUBPROTOCOL: &str = "binary";
const DEFAULT_HANDSHAKE_TIMEOUT: u64 = 10;

pub fn config_dir() -> Result<Utf8PathBuf> {
    Ok(Utf8PathBuf::try_from(dirs::home_dir().ok_or_eyre("no home dir")?)?.join(".android"))
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    url: Option<String>,
    subprotocol: Option<String>,
    server_address: Option<SocketAddr>,
    /// Seconds, 0 waits forever.
    handshake_timeout: Option<u64>,
    pub log_file: Option<Utf8PathBuf>,
}

impl Config {
    pub fn parse(data: &str) -> Result<Self> {
        toml::from_str(data).context("parse config file")
    }

    pub fn url(&self) -> String {
        self.url.clone().unwrap_or_else(|| format!("ws://localhost:{WEBSOCKET_PROXY_PORT}"))
    }

    pub fn subprotocol(&self) -> Option<&str> {
        Some(self.subprotocol.as_deref().unwrap_or(DEFAULT_SUBPROTOCOL)).filter(|s| !s.is_empty())
    }

    pub fn server_address(&self) -> SocketAddr {
        self.server_address.unwrap_or((Ipv4Addr::LOCALHOST, ADB_SERVER_PORT).into())
    }

    pub fn handshake_timeout(&self) -> Option<Duration> {
        match self.handshake_timeout.unwrap_or(DEFAULT_HANDSHAKE_TIMEOUT) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

pub fn load_config() -> Result<Config> {
    let path = env::var("ADB_WS_CLIENT_CONFIG")
        .map(Utf8PathBuf::from)
        .or_else(|_| <Result<_>>::Ok(config_dir()?.join("adb-ws-client.toml")))?;

    let data = match fs::read_to_string(&path) {
        Ok(data) => data,
        Err(err) if err.kind() == io::ErrorKind::NotFound => String::default(),
        Err(err) => Err(err).with_context(|| format!("read config file {path}"))?,
    };
    Config::parse(&data)
}
