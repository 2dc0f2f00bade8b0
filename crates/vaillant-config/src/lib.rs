//! Shared configuration for Vaillant Plus tools.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext), a
//! per-profile token cache, and translation to the `vaillant_api` client
//! configs. The CLI layers its flag overrides on top.

use std::collections::HashMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use vaillant_api::{ApiConfig, Protocol, TlsMode, Token, TransportConfig, WebSocketConfig};

/// Keyring service name.
pub const KEYRING_SERVICE: &str = "vaillant";
/// Environment variable checked first for the account password.
pub const PASSWORD_ENV: &str = "VAILLANT_PASSWORD";
const ENV_PREFIX: &str = "VAILLANT_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("profile '{name}' not found")]
    ProfileNotFound { name: String, available: Vec<String> },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("cached token unreadable: {0}")]
    Token(#[from] vaillant_api::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named account profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Pick the profile name: explicit flag, then `default_profile`, then "default".
    pub fn active_profile_name(&self, requested: Option<&str>) -> String {
        requested
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into())
    }

    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles.get(name).ok_or_else(|| {
            let mut available: Vec<String> = self.profiles.keys().cloned().collect();
            available.sort();
            ConfigError::ProfileNotFound {
                name: name.into(),
                available,
            }
        })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    /// HTTP and WebSocket connect timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Watchdog interval in seconds.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            timeout: default_timeout(),
            heartbeat_interval: default_heartbeat_interval(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_timeout() -> u64 {
    20
}
fn default_heartbeat_interval() -> u64 {
    15
}

/// A named account profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Account username (phone number or e-mail).
    pub username: String,

    /// Password (plaintext -- prefer keyring or `VAILLANT_PASSWORD`).
    pub password: Option<String>,

    /// Application id issued to the vendor app.
    #[serde(default)]
    pub application_id: String,

    /// Override the vendor app API base URL.
    pub app_url: Option<String>,

    /// Override the IoT platform API base URL.
    pub api_url: Option<String>,

    /// Override the cloud-routed WebSocket host.
    pub ws_host: Option<String>,

    /// Device id to use when the account has more than one device.
    pub device: Option<String>,

    /// WebSocket frame dialect.
    pub protocol: Option<Protocol>,

    /// Use `wss://` (default true).
    pub use_tls: Option<bool>,

    /// Override the WebSocket port.
    pub port: Option<u16>,

    /// Override the watchdog interval (seconds).
    pub heartbeat_interval: Option<u64>,

    /// Stop after this many consecutive failed connection attempts.
    pub max_retries: Option<u32>,

    /// Override the timeout (seconds).
    pub timeout: Option<u64>,

    /// Extra CA certificate for the HTTP API.
    pub ca_cert: Option<PathBuf>,
}

// ── Config file path ────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("cn", "vaillant-plus", "vaillant")
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || fallback_dir(".config").join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Directory holding cached tokens.
pub fn token_dir() -> PathBuf {
    project_dirs().map_or_else(
        || fallback_dir(".local/share").join("tokens"),
        |dirs| dirs.data_dir().join("tokens"),
    )
}

fn fallback_dir(base: &str) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(base);
    p.push("vaillant");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path`, layered over built-in defaults and under
/// `VAILLANT_`-prefixed environment variables (`__` separates keys).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading config");
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the account password: env var, then keyring, then plaintext.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Env var
    if let Ok(pw) = std::env::var(PASSWORD_ENV) {
        return Ok(SecretString::from(pw));
    }

    // 2. Keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &keyring_user(profile_name)) {
        if let Ok(pw) = entry.get_password() {
            return Ok(SecretString::from(pw));
        }
    }

    // 3. Plaintext in config
    if let Some(ref pw) = profile.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Store the account password in the system keyring.
pub fn store_password(profile_name: &str, password: &str) -> Result<(), ConfigError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, &keyring_user(profile_name))?;
    entry.set_password(password)?;
    Ok(())
}

fn keyring_user(profile_name: &str) -> String {
    format!("{profile_name}/password")
}

// ── Token cache ─────────────────────────────────────────────────────

/// Serialized tokens, one file per profile.
#[derive(Debug, Clone)]
pub struct TokenCache {
    dir: PathBuf,
}

impl TokenCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, profile_name: &str) -> Result<PathBuf, ConfigError> {
        if profile_name.is_empty()
            || profile_name.contains(['/', '\\'])
            || profile_name.starts_with('.')
        {
            return Err(ConfigError::Validation {
                field: "profile".into(),
                reason: format!("'{profile_name}' cannot be used as a file name"),
            });
        }
        Ok(self.dir.join(format!("{profile_name}.token")))
    }

    pub fn save(&self, profile_name: &str, token: &Token) -> Result<(), ConfigError> {
        let path = self.path_for(profile_name)?;
        std::fs::create_dir_all(&self.dir)?;
        let mut file = open_private(&path)?;
        file.write_all(token.serialize().as_bytes())?;
        debug!(path = %path.display(), "token cached");
        Ok(())
    }

    /// `Ok(None)` when nothing is cached for the profile.
    pub fn load(&self, profile_name: &str) -> Result<Option<Token>, ConfigError> {
        let path = self.path_for(profile_name)?;
        match std::fs::read_to_string(&path) {
            Ok(blob) => Ok(Some(Token::deserialize(&blob)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns whether a cached token was removed.
    pub fn clear(&self, profile_name: &str) -> Result<bool, ConfigError> {
        let path = self.path_for(profile_name)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new(token_dir())
    }
}

/// Open `path` for writing, truncated and readable by the owner only.
#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<std::fs::File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // mode() only applies on creation
    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    Ok(file)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<std::fs::File> {
    std::fs::File::create(path)
}

pub fn save_token(profile_name: &str, token: &Token) -> Result<(), ConfigError> {
    TokenCache::default().save(profile_name, token)
}

pub fn load_token(profile_name: &str) -> Result<Option<Token>, ConfigError> {
    TokenCache::default().load(profile_name)
}

pub fn clear_token(profile_name: &str) -> Result<bool, ConfigError> {
    TokenCache::default().clear(profile_name)
}

// ── Translation to client configs ───────────────────────────────────

/// Build the HTTP client config for a profile.
pub fn api_config(profile: &Profile, defaults: &Defaults) -> Result<ApiConfig, ConfigError> {
    if profile.application_id.trim().is_empty() {
        return Err(ConfigError::Validation {
            field: "application_id".into(),
            reason: "must be set".into(),
        });
    }

    let mut config = ApiConfig::new(profile.application_id.clone())?;
    if let Some(ref url) = profile.app_url {
        config.app_url = parse_url("app_url", url)?;
    }
    if let Some(ref url) = profile.api_url {
        config.api_url = parse_url("api_url", url)?;
    }

    let tls = profile
        .ca_cert
        .clone()
        .map_or(TlsMode::System, TlsMode::CustomCa);
    config.transport = TransportConfig {
        tls,
        ..TransportConfig::default()
    }
    .with_timeout(Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout)));

    Ok(config)
}

/// Build the WebSocket client config for a profile.
pub fn websocket_config(profile: &Profile, defaults: &Defaults) -> WebSocketConfig {
    let base = WebSocketConfig::default();
    WebSocketConfig {
        protocol: profile.protocol.unwrap_or(base.protocol),
        api_host: profile.ws_host.clone().unwrap_or(base.api_host),
        port: profile.port,
        use_tls: profile.use_tls.unwrap_or(base.use_tls),
        heartbeat_interval: Duration::from_secs(
            profile.heartbeat_interval.unwrap_or(defaults.heartbeat_interval),
        ),
        max_retries: profile.max_retries,
        connect_timeout: Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout)),
        ..base
    }
}

fn parse_url(field: &str, raw: &str) -> Result<url::Url, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL: {raw}"),
    })
}

// ── Tests ───────────────────────────────────────────────────────────
