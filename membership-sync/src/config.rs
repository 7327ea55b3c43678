//! Service configuration.
//!
//! Configuration is read from a TOML file, then overlaid with environment
//! variables, then validated. Required settings missing at that point are
//! fatal; optional ones only disable the feature they drive.
//!
//! # Examples
//!
//! ```
//! use membership_sync::config::SyncConfig;
//!
//! let toml = r#"
//!     guild_id = "100000000000000001"
//!
//!     [roles]
//!     paying = "200000000000000002"
//!     keep = ["400000000000000004"]
//!
//!     [billing]
//!     api_key = "sk_test_123"
//!
//!     [platform]
//!     bot_token = "bot-token"
//!
//!     [store]
//!     path = "customers.json"
//! "#;
//!
//! let config = SyncConfig::from_toml(toml).unwrap();
//! assert!(config.validate().is_ok());
//! assert_eq!(config.schedule.hour_utc, 1);
//! ```

use std::{
    fmt,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use tracing::warn;
use url::Url;

use crate::{
    error::{Result, SyncError},
    ids::{ChannelId, GuildId, RoleId},
    roles::RoleConfig,
};

const DEFAULT_BILLING_URL: &str = "https://api.stripe.com";
const DEFAULT_PLATFORM_URL: &str = "https://discord.com/api/v10";

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncConfig {
    /// Server whose roles are managed.
    #[serde(default)]
    pub guild_id: Option<GuildId>,

    /// Managed and protected role ids.
    #[serde(default)]
    pub roles: RoleConfig,

    /// Billing-provider settings.
    #[serde(default)]
    pub billing: BillingConfig,

    /// Group-platform settings.
    #[serde(default)]
    pub platform: PlatformConfig,

    /// Customer-record storage.
    #[serde(default)]
    pub store: StoreConfig,

    /// Daily sweep schedule.
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Permit `http://` and loopback base URLs. Only meant for tests against
    /// local mock servers.
    #[serde(default)]
    pub allow_insecure_base_urls: bool,
}

/// Billing-provider settings.
#[derive(Clone, Deserialize)]
pub struct BillingConfig {
    /// Secret API key.
    #[serde(default)]
    pub api_key: String,

    /// API base URL.
    #[serde(default = "default_billing_url")]
    pub base_url: String,

    /// Minimum spacing between request starts, in milliseconds.
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,

    /// Per-request timeout, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Marker in a charge description that identifies a lifetime purchase.
    #[serde(default)]
    pub lifetime_keyword: Option<String>,

    /// Link shown in reminder notices.
    #[serde(default)]
    pub payment_link: Option<String>,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_billing_url(),
            min_interval_ms: default_min_interval_ms(),
            timeout_secs: default_timeout_secs(),
            lifetime_keyword: None,
            payment_link: None,
        }
    }
}

impl fmt::Debug for BillingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BillingConfig")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("min_interval_ms", &self.min_interval_ms)
            .field("timeout_secs", &self.timeout_secs)
            .field("lifetime_keyword", &self.lifetime_keyword)
            .field("payment_link", &self.payment_link)
            .finish()
    }
}

impl BillingConfig {
    /// Minimum spacing between request starts.
    #[must_use]
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    /// Per-request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Lifetime keyword, `None` when unset or blank.
    #[must_use]
    pub fn lifetime_keyword(&self) -> Option<&str> {
        self.lifetime_keyword.as_deref().map(str::trim).filter(|keyword| !keyword.is_empty())
    }
}

/// Group-platform settings.
#[derive(Clone, Deserialize)]
pub struct PlatformConfig {
    /// Bot token.
    #[serde(default)]
    pub bot_token: String,

    /// REST API base URL.
    #[serde(default = "default_platform_url")]
    pub base_url: String,

    /// Channel receiving operational log lines.
    #[serde(default)]
    pub log_channel_id: Option<ChannelId>,

    /// Per-request timeout, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Embed color for user notices.
    #[serde(default = "default_embed_color")]
    pub embed_color: u32,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            base_url: default_platform_url(),
            log_channel_id: None,
            timeout_secs: default_timeout_secs(),
            embed_color: default_embed_color(),
        }
    }
}

impl fmt::Debug for PlatformConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformConfig")
            .field("bot_token", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("log_channel_id", &self.log_channel_id)
            .field("timeout_secs", &self.timeout_secs)
            .field("embed_color", &self.embed_color)
            .finish()
    }
}

impl PlatformConfig {
    /// Per-request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Customer-record storage settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    /// JSON file holding customer records.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Daily sweep schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ScheduleConfig {
    /// Hour of day (UTC) at which the sweep runs.
    #[serde(default = "default_sweep_hour")]
    pub hour_utc: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self { hour_utc: default_sweep_hour() }
    }
}

fn default_billing_url() -> String {
    DEFAULT_BILLING_URL.to_owned()
}

fn default_platform_url() -> String {
    DEFAULT_PLATFORM_URL.to_owned()
}

const fn default_min_interval_ms() -> u64 {
    1000
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_embed_color() -> u32 {
    0x00FF_D700
}

const fn default_sweep_hour() -> u32 {
    1
}

impl SyncConfig {
    /// Parses configuration from TOML.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if the TOML is malformed or a value has
    /// the wrong type.
    pub fn from_toml(toml: &str) -> Result<Self> {
        toml::from_str(toml).map_err(|e| SyncError::Config(format!("invalid configuration: {e}")))
    }

    /// Reads and parses a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&contents)
    }

    /// Loads the file at `path` (if any), overlays the process environment and
    /// validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if loading, overlaying or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overlays values from environment variables.
    ///
    /// `lookup` returns the value of a variable; blank values are ignored.
    /// Where two names are listed the first one wins.
    ///
    /// | Variable | Setting |
    /// |----------|---------|
    /// | `DISCORD_GUILD_ID`, `GUILD_ID` | `guild_id` |
    /// | `PAYING_ROLE_ID`, `DISCORD_ROLE_ID` | `roles.paying` |
    /// | `LIFETIME_PAYING_ROLE_ID` | `roles.lifetime` |
    /// | `UNKNOWN_ROLE_ID` | `roles.unknown` |
    /// | `KEEP_ROLE_IDS` (comma separated) | `roles.keep` |
    /// | `LOGS_CHANNEL_ID` | `platform.log_channel_id` |
    /// | `DISCORD_BOT_TOKEN` | `platform.bot_token` |
    /// | `EMBED_COLOR` (hex) | `platform.embed_color` |
    /// | `STRIPE_API_KEY` | `billing.api_key` |
    /// | `LIFETIME_INVOICE_LABEL_KEYWORD` | `billing.lifetime_keyword` |
    /// | `STRIPE_PAYMENT_LINK` | `billing.payment_link` |
    /// | `STORE_PATH` | `store.path` |
    /// | `SWEEP_HOUR_UTC` | `schedule.hour_utc` |
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if a variable holds an invalid id or number.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |names: &[&str]| {
            names
                .iter()
                .filter_map(|name| lookup(name))
                .map(|value| value.trim().to_owned())
                .find(|value| !value.is_empty())
        };
        let env_error = |name: &str, e: SyncError| SyncError::Config(format!("{name}: {e}"));

        if let Some(value) = var(&["DISCORD_GUILD_ID", "GUILD_ID"]) {
            self.guild_id = Some(GuildId::new(value).map_err(|e| env_error("DISCORD_GUILD_ID", e))?);
        }
        if let Some(value) = var(&["PAYING_ROLE_ID", "DISCORD_ROLE_ID"]) {
            self.roles.paying = Some(RoleId::new(value).map_err(|e| env_error("PAYING_ROLE_ID", e))?);
        }
        if let Some(value) = var(&["LIFETIME_PAYING_ROLE_ID"]) {
            self.roles.lifetime =
                Some(RoleId::new(value).map_err(|e| env_error("LIFETIME_PAYING_ROLE_ID", e))?);
        }
        if let Some(value) = var(&["UNKNOWN_ROLE_ID"]) {
            self.roles.unknown = Some(RoleId::new(value).map_err(|e| env_error("UNKNOWN_ROLE_ID", e))?);
        }
        if let Some(value) = var(&["KEEP_ROLE_IDS"]) {
            self.roles.keep = value
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(RoleId::new)
                .collect::<Result<_>>()
                .map_err(|e| env_error("KEEP_ROLE_IDS", e))?;
        }
        if let Some(value) = var(&["LOGS_CHANNEL_ID"]) {
            self.platform.log_channel_id =
                Some(ChannelId::new(value).map_err(|e| env_error("LOGS_CHANNEL_ID", e))?);
        }
        if let Some(value) = var(&["DISCORD_BOT_TOKEN"]) {
            self.platform.bot_token = value;
        }
        if let Some(value) = var(&["EMBED_COLOR"]) {
            let digits = value.trim_start_matches('#').trim_start_matches("0x");
            self.platform.embed_color = u32::from_str_radix(digits, 16)
                .map_err(|e| SyncError::Config(format!("EMBED_COLOR: {e}")))?;
        }
        if let Some(value) = var(&["STRIPE_API_KEY"]) {
            self.billing.api_key = value;
        }
        if let Some(value) = var(&["LIFETIME_INVOICE_LABEL_KEYWORD"]) {
            self.billing.lifetime_keyword = Some(value);
        }
        if let Some(value) = var(&["STRIPE_PAYMENT_LINK"]) {
            self.billing.payment_link = Some(value);
        }
        if let Some(value) = var(&["STORE_PATH"]) {
            self.store.path = Some(PathBuf::from(value));
        }
        if let Some(value) = var(&["SWEEP_HOUR_UTC"]) {
            self.schedule.hour_utc = value
                .parse()
                .map_err(|e| SyncError::Config(format!("SWEEP_HOUR_UTC: {e}")))?;
        }
        Ok(())
    }

    /// Checks required settings and warns about missing optional ones.
    ///
    /// Required: guild id, billing API key, bot token, store path, valid
    /// base URLs (HTTPS and not loopback unless
    /// [`allow_insecure_base_urls`](Self::allow_insecure_base_urls) is set),
    /// a sweep hour below 24, a non-zero request interval and distinct
    /// managed role ids.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] naming the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if self.guild_id.is_none() {
            return Err(SyncError::Config("guild_id is required".to_owned()));
        }
        if self.billing.api_key.trim().is_empty() {
            return Err(SyncError::Config("billing.api_key is required".to_owned()));
        }
        if self.platform.bot_token.trim().is_empty() {
            return Err(SyncError::Config("platform.bot_token is required".to_owned()));
        }
        if self.store.path.is_none() {
            return Err(SyncError::Config("store.path is required".to_owned()));
        }
        if self.schedule.hour_utc > 23 {
            return Err(SyncError::Config(format!(
                "schedule.hour_utc must be 0-23, got {}",
                self.schedule.hour_utc
            )));
        }
        if self.billing.min_interval_ms == 0 {
            return Err(SyncError::Config("billing.min_interval_ms must be positive".to_owned()));
        }
        self.check_managed_roles_distinct()?;
        self.parse_base_url("billing.base_url", &self.billing.base_url)?;
        self.parse_base_url("platform.base_url", &self.platform.base_url)?;

        self.warn_missing_optional();
        Ok(())
    }

    fn check_managed_roles_distinct(&self) -> Result<()> {
        let slots = [
            ("roles.paying", self.roles.paying.as_ref()),
            ("roles.lifetime", self.roles.lifetime.as_ref()),
            ("roles.unknown", self.roles.unknown.as_ref()),
        ];
        for (i, &(name, role)) in slots.iter().enumerate() {
            let Some(role) = role else { continue };
            if let Some(&(other, _)) = slots[..i].iter().find(|&&(_, earlier)| earlier == Some(role)) {
                return Err(SyncError::Config(format!("{name} must differ from {other}, both are {role}")));
            }
        }
        Ok(())
    }

    /// Parses a base URL, enforcing HTTPS and rejecting loopback hosts unless
    /// insecure URLs are allowed.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if the URL is malformed or not allowed.
    pub fn parse_base_url(&self, name: &str, raw: &str) -> Result<Url> {
        let url = Url::parse(raw)
            .map_err(|e| SyncError::Config(format!("invalid {name} '{raw}': {e}")))?;
        if self.allow_insecure_base_urls {
            return Ok(url);
        }
        if url.scheme() != "https" {
            return Err(SyncError::Config(format!("{name} must use HTTPS, got: {}", url.scheme())));
        }
        if let Some(host) = url.host_str() {
            let host = host.to_lowercase();
            if host == "localhost" || host.starts_with("127.") || host == "[::1]" || host == "::1" {
                return Err(SyncError::Config(format!(
                    "{name} must not be localhost or loopback: {host}"
                )));
            }
        }
        Ok(url)
    }

    fn warn_missing_optional(&self) {
        if self.roles.paying.is_none() {
            warn!("roles.paying is not set; active users will not be given a paying role");
        }
        if self.roles.lifetime.is_none() {
            warn!("roles.lifetime is not set; lifetime grants are disabled");
        }
        if self.roles.unknown.is_none() {
            warn!("roles.unknown is not set; inactive users will not be given a fallback role");
        }
        if self.billing.lifetime_keyword().is_none() {
            warn!("billing.lifetime_keyword is not set; lifetime detection is disabled");
        }
        if self.platform.log_channel_id.is_none() {
            warn!("platform.log_channel_id is not set; operational log lines are dropped");
        }
        if self.billing.payment_link.is_none() {
            warn!("billing.payment_link is not set; reminders will not include a renewal link");
        }
    }
}
