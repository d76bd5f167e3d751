use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{OptionExt, WrapErr};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use nexum_tapcard::{DELAY_DISPLAY_FLOOR_MS, IssuerTrust, SessionConfig, TrustedIssuer};
use nexum_tapcard_broadcast::CoordinatorConfig;
use nexum_tapcard_engine::ChainFamily;
use serde::{Deserialize, Serialize};

/// Name of the config file inside [`config_dir`]
pub const CONFIG_FILE: &str = "tapcard.toml";

/// Prefix of environment overrides, nested keys split on `__`
pub const ENV_PREFIX: &str = "TAPCARD_";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Issuers whose cards are accepted
    pub trusted_issuers: Vec<TrustedIssuer>,
    /// Accept cards of unknown issuers
    pub self_certified: bool,
    /// Shortest security delay that gets a countdown
    pub delay_display_floor_ms: u32,
    /// Hold the reader exclusively while a command runs
    pub exclusive: bool,
    /// Reconnect once when the card resets mid-exchange
    pub reconnect: bool,
    /// Broadcast endpoints, keyed by chain family
    pub endpoints: BTreeMap<String, Vec<String>>,
    pub broadcast: BroadcastSettings,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct BroadcastSettings {
    pub remaining_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub timeout_ms: u64,
    /// Race this many endpoint groups instead of walking one list
    pub fanout: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            trusted_issuers: Vec::new(),
            self_certified: false,
            delay_display_floor_ms: DELAY_DISPLAY_FLOOR_MS,
            exclusive: false,
            reconnect: true,
            endpoints: BTreeMap::new(),
            broadcast: BroadcastSettings::default(),
        }
    }
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        let coordinator = CoordinatorConfig::new();
        Self {
            remaining_attempts: coordinator.remaining_attempts,
            base_delay_ms: duration_ms(coordinator.base_delay),
            max_delay_ms: duration_ms(coordinator.max_delay),
            timeout_ms: duration_ms(coordinator.timeout),
            fanout: 1,
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Config {
    /// Issuer trust for new sessions
    pub fn trust(&self) -> IssuerTrust {
        IssuerTrust::new(self.trusted_issuers.clone()).with_self_certified(self.self_certified)
    }

    pub const fn session_config(&self) -> SessionConfig {
        SessionConfig::new().with_delay_display_floor(self.delay_display_floor_ms)
    }

    pub const fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig::new()
            .with_remaining_attempts(self.broadcast.remaining_attempts)
            .with_base_delay(Duration::from_millis(self.broadcast.base_delay_ms))
            .with_max_delay(Duration::from_millis(self.broadcast.max_delay_ms))
            .with_timeout(Duration::from_millis(self.broadcast.timeout_ms))
    }

    /// Configured endpoints of a chain family, in failover order
    pub fn endpoints_for(&self, family: ChainFamily) -> eyre::Result<&[String]> {
        self.endpoints
            .get(&family.to_string())
            .filter(|urls| !urls.is_empty())
            .map(Vec::as_slice)
            .ok_or_else(|| eyre::eyre!("no {family} endpoints configured, set [endpoints] {family}"))
    }

    /// Layer defaults, a TOML file and environment overrides
    pub fn figment(file: &Path) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }
}

/// Returns the base config directory for nexum. It also creates the directory
/// if it doesn't exist yet.
pub fn config_dir() -> eyre::Result<PathBuf> {
    let dir = std::env::home_dir()
        .ok_or_eyre("home directory not found")?
        .join(".nxm");
    if !dir.exists() {
        std::fs::create_dir(&dir)?
    }
    Ok(dir)
}

/// Load the config from `path`, or from `~/.nxm/tapcard.toml`
pub fn load_config(path: Option<&Path>) -> eyre::Result<Config> {
    let file = match path {
        Some(path) => path.to_path_buf(),
        None => config_dir()?.join(CONFIG_FILE),
    };
    Config::figment(&file)
        .extract()
        .wrap_err_with(|| format!("invalid config {}", file.display()))
}
