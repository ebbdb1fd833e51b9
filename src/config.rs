//! Daemon settings read from `AUTOEXPORTER_*` environment variables.
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::retry::RetryPolicy;

pub const ENV_NETWORK: &str = "AUTOEXPORTER_NETWORK";
pub const ENV_CATALOG: &str = "AUTOEXPORTER_CATALOG";
pub const ENV_LISTEN_ADDR: &str = "AUTOEXPORTER_LISTEN_ADDR";
pub const ENV_RECONCILE_INTERVAL: &str = "AUTOEXPORTER_RECONCILE_INTERVAL";
pub const ENV_RETRY_ATTEMPTS: &str = "AUTOEXPORTER_RETRY_ATTEMPTS";
pub const ENV_RETRY_DELAY: &str = "AUTOEXPORTER_RETRY_DELAY";
pub const ENV_CLEANUP_ON_EXIT: &str = "AUTOEXPORTER_CLEANUP_ON_EXIT";

const DEFAULT_NETWORK: &str = "prometheus";
const DEFAULT_LISTEN_ADDR: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 9099));
const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid value `{value}` for `{key}`")]
    Invalid { key: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Network every sidecar is attached to.
    pub network: String,
    /// Optional JSON file extending the built-in catalog.
    pub catalog: Option<PathBuf>,
    pub listen_addr: SocketAddr,
    /// `None` disables periodic reconciliation.
    pub reconcile_interval: Option<Duration>,
    pub retry: RetryPolicy,
    /// Force-remove every sidecar on shutdown.
    pub cleanup_on_exit: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from `lookup`, which returns the raw value of a variable.
    ///
    /// Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let reconcile_secs: u64 = parse(ENV_RECONCILE_INTERVAL, get(ENV_RECONCILE_INTERVAL))?
            .unwrap_or(DEFAULT_RECONCILE_INTERVAL_SECS);
        let defaults = RetryPolicy::default();

        Ok(Self {
            network: get(ENV_NETWORK).unwrap_or_else(|| DEFAULT_NETWORK.to_owned()),
            catalog: get(ENV_CATALOG).map(PathBuf::from),
            listen_addr: parse(ENV_LISTEN_ADDR, get(ENV_LISTEN_ADDR))?.unwrap_or(DEFAULT_LISTEN_ADDR),
            reconcile_interval: (reconcile_secs > 0).then(|| Duration::from_secs(reconcile_secs)),
            retry: RetryPolicy {
                attempts: parse(ENV_RETRY_ATTEMPTS, get(ENV_RETRY_ATTEMPTS))?
                    .unwrap_or(defaults.attempts),
                delay: parse::<u64>(ENV_RETRY_DELAY, get(ENV_RETRY_DELAY))?
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.delay),
            },
            cleanup_on_exit: parse(ENV_CLEANUP_ON_EXIT, get(ENV_CLEANUP_ON_EXIT))?.unwrap_or(false),
        })
    }
}

fn parse<T: FromStr>(key: &'static str, raw: Option<String>) -> Result<Option<T>> {
    raw.map(|value| {
        value
            .trim()
            .parse()
            .map_err(|_| Error::Invalid { key, value })
    })
    .transpose()
}
