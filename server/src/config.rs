//! Server Configuration
//!
//! Key-path addressed configuration backed by a TOML file, with explicit
//! reload and type coercion. Components receive a [`ConfigProvider`] instead
//! of reading files or globals themselves.

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{Duration, SystemTime};

use thiserror::Error;
use toml::{Table, Value};
use tracing::{debug, info, warn};

/// Environment variable pointing at an explicit config file.
pub const CONFIG_PATH_ENV: &str = "HB_CONFIG";

/// File names probed next to the executable, in order.
pub const CONFIG_FILE_NAMES: [&str; 2] = ["config.toml", "setconfig.toml"];

/// Contents written when no config file exists yet.
pub const DEFAULT_CONFIG: &str = r#"# HookBridge server configuration

[server]
ip = "127.0.0.1"
port = 8085

[log]
# trace | debug | info | warn | error
level = "info"

[websocket]
# Seconds between keep-alive pings (0 disables pings)
ping_interval_secs = 30
# Seconds without any client frame before the connection is dropped (0 disables)
idle_timeout_secs = 300

[webhook]
max_body_bytes = 1048576

[config]
# Seconds between modification checks of this file (0 = reload on SIGHUP only)
poll_interval_secs = 0
"#;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No config file could be located or created.
    #[error("Config file not found (tried: {0})")]
    NotFound(String),

    /// Reading or writing the file failed.
    #[error("Config I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML.
    #[error("Config parse error in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A required key is absent.
    #[error("Missing required config key: {0}")]
    Missing(String),

    /// A value exists but cannot be converted to the requested type.
    #[error("Config key {key}: cannot convert {value} to {target}")]
    Coercion {
        key: String,
        value: String,
        target: &'static str,
    },
}

/// Source of configuration values addressed by dotted key paths.
pub trait ConfigProvider: Send + Sync {
    /// Raw value at `key_path` (e.g. `"server.port"`).
    fn get(&self, key_path: &str) -> Option<Value>;

    /// Re-read the backing store. Returns whether any value changed.
    fn reload(&self) -> Result<bool, ConfigError>;
}

/// Types a config value can be coerced into.
pub trait FromConfigValue: Sized {
    /// Name used in coercion errors.
    const TYPE_NAME: &'static str;

    /// Convert `value`, or `None` if it has an incompatible shape.
    fn from_config_value(value: &Value) -> Option<Self>;
}

impl FromConfigValue for String {
    const TYPE_NAME: &'static str = "string";

    fn from_config_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Boolean(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

impl FromConfigValue for bool {
    const TYPE_NAME: &'static str = "bool";

    fn from_config_value(value: &Value) -> Option<Self> {
        match value {
            Value::Boolean(b) => Some(*b),
            Value::Integer(i) => Some(*i != 0),
            Value::String(s) => Some(matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "true" | "1" | "yes" | "on"
            )),
            _ => None,
        }
    }
}

macro_rules! impl_from_config_int {
    ($($ty:ty),*) => {
        $(
            impl FromConfigValue for $ty {
                const TYPE_NAME: &'static str = stringify!($ty);

                fn from_config_value(value: &Value) -> Option<Self> {
                    match value {
                        Value::Integer(i) => <$ty>::try_from(*i).ok(),
                        Value::String(s) => s.trim().parse().ok(),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_from_config_int!(u16, u32, u64, usize, i64);

/// Typed accessors for any [`ConfigProvider`].
pub trait ConfigProviderExt: ConfigProvider {
    /// Value at `key_path` converted to `T`; errors if absent.
    fn require<T: FromConfigValue>(&self, key_path: &str) -> Result<T, ConfigError> {
        let value = self
            .get(key_path)
            .ok_or_else(|| ConfigError::Missing(key_path.to_owned()))?;
        coerce(key_path, &value)
    }

    /// Value at `key_path` converted to `T`, or `default` if absent.
    ///
    /// A present value of the wrong shape is still an error.
    fn get_or<T: FromConfigValue>(&self, key_path: &str, default: T) -> Result<T, ConfigError> {
        match self.get(key_path) {
            Some(value) => coerce(key_path, &value),
            None => {
                debug!(key = key_path, "Using default config value");
                Ok(default)
            }
        }
    }
}

impl<P: ConfigProvider + ?Sized> ConfigProviderExt for P {}

fn coerce<T: FromConfigValue>(key_path: &str, value: &Value) -> Result<T, ConfigError> {
    T::from_config_value(value).ok_or_else(|| ConfigError::Coercion {
        key: key_path.to_owned(),
        value: value.to_string(),
        target: T::TYPE_NAME,
    })
}

/// Walk a dotted path through nested tables.
fn lookup(root: &Table, key_path: &str) -> Option<Value> {
    let mut parts = key_path.split('.');
    let mut current = root.get(parts.next()?)?;
    for part in parts {
        current = current.as_table()?.get(part)?;
    }
    Some(current.clone())
}

/// In-memory provider, for embedding and tests.
#[derive(Debug, Default)]
pub struct StaticConfig {
    root: Table,
}

impl StaticConfig {
    /// Parse TOML text.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let root = contents.parse::<Table>().map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        Ok(Self { root })
    }
}

impl ConfigProvider for StaticConfig {
    fn get(&self, key_path: &str) -> Option<Value> {
        lookup(&self.root, key_path)
    }

    fn reload(&self) -> Result<bool, ConfigError> {
        Ok(false)
    }
}

/// Cached file contents plus the mtime they were read at.
#[derive(Debug)]
struct Snapshot {
    root: Table,
    modified: Option<SystemTime>,
}

/// TOML file provider with explicit reload.
#[derive(Debug)]
pub struct FileConfig {
    path: PathBuf,
    snapshot: RwLock<Snapshot>,
}

impl FileConfig {
    /// Load and parse `path`.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let snapshot = read_snapshot(&path)?;
        info!(path = %path.display(), "Loaded config file");

        Ok(Self {
            path,
            snapshot: RwLock::new(snapshot),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reload only if the file's modification time moved forward.
    pub fn reload_if_modified(&self) -> Result<bool, ConfigError> {
        let current = modified_time(&self.path);
        let cached = self
            .snapshot
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .modified;

        match (current, cached) {
            (Some(now), Some(then)) if now <= then => Ok(false),
            _ => self.reload(),
        }
    }
}

impl ConfigProvider for FileConfig {
    fn get(&self, key_path: &str) -> Option<Value> {
        let snapshot = self
            .snapshot
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        lookup(&snapshot.root, key_path)
    }

    fn reload(&self) -> Result<bool, ConfigError> {
        // Parse outside the lock; a broken file leaves the old values active.
        let fresh = read_snapshot(&self.path)?;

        let mut snapshot = self
            .snapshot
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let changed = snapshot.root != fresh.root;
        *snapshot = fresh;

        if changed {
            info!(path = %self.path.display(), "Config reloaded with changes");
        } else {
            debug!(path = %self.path.display(), "Config reloaded, no changes");
        }
        Ok(changed)
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn read_snapshot(path: &Path) -> Result<Snapshot, ConfigError> {
    let modified = modified_time(path);
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_owned(),
        source,
    })?;
    let root = contents.parse::<Table>().map_err(|source| ConfigError::Parse {
        path: path.to_owned(),
        source,
    })?;
    Ok(Snapshot { root, modified })
}

/// Directory holding the running executable, if it can be resolved.
fn executable_dir() -> Option<PathBuf> {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

/// Find the config file, creating a default one on first run.
///
/// Order: `$HB_CONFIG`, then [`CONFIG_FILE_NAMES`] next to the executable,
/// then `./config.toml`. If none exist the default file is written next to
/// the executable, or into the working directory if that fails.
pub fn locate_or_create() -> Result<PathBuf, ConfigError> {
    if let Ok(explicit) = env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(explicit);
        if path.exists() {
            return Ok(path);
        }
        return write_default(&path).map(|()| path);
    }

    let exe_dir = executable_dir();
    let cwd = env::current_dir().ok();
    if let Some(found) = find_existing(exe_dir.as_deref(), cwd.as_deref()) {
        return Ok(found);
    }

    let mut tried = Vec::new();
    for dir in [exe_dir, cwd].into_iter().flatten() {
        let path = dir.join(CONFIG_FILE_NAMES[0]);
        match write_default(&path) {
            Ok(()) => return Ok(path),
            Err(e) => {
                warn!(error = %e, "Could not create default config");
                tried.push(path.display().to_string());
            }
        }
    }

    Err(ConfigError::NotFound(tried.join(", ")))
}

/// First existing config file among the candidate locations.
fn find_existing(exe_dir: Option<&Path>, cwd: Option<&Path>) -> Option<PathBuf> {
    let beside_exe = exe_dir
        .into_iter()
        .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)));
    let in_cwd = cwd.map(|dir| dir.join(CONFIG_FILE_NAMES[0]));

    beside_exe.chain(in_cwd).find(|path| path.is_file())
}

/// Write [`DEFAULT_CONFIG`] to `path`, creating parent directories.
pub fn write_default(path: &Path) -> Result<(), ConfigError> {
    let io_err = |source| ConfigError::Io {
        path: path.to_owned(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, DEFAULT_CONFIG).map_err(io_err)?;
    info!(path = %path.display(), "Created default config file");
    Ok(())
}

/// Resolved, typed view of the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Listen host.
    pub host: String,

    /// Listen port.
    pub port: u16,

    /// Log verbosity (`trace`..`error`).
    pub log_level: String,

    /// WebSocket keep-alive timings.
    pub keepalive: KeepAlive,

    /// Maximum accepted webhook body size in bytes.
    pub max_body_bytes: usize,

    /// Seconds between config mtime checks (0 disables polling).
    pub poll_interval_secs: u64,
}

/// WebSocket keep-alive timings. A zero duration disables that check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAlive {
    /// Interval between server-sent pings.
    pub ping_interval: Duration,

    /// Maximum silence from the client before the session is dropped.
    pub idle_timeout: Duration,
}

impl Default for KeepAlive {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(300),
        }
    }
}

impl KeepAlive {
    /// Read keep-alive timings from `provider`.
    pub fn from_provider(provider: &(impl ConfigProvider + ?Sized)) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            ping_interval: Duration::from_secs(
                provider.get_or("websocket.ping_interval_secs", defaults.ping_interval.as_secs())?,
            ),
            idle_timeout: Duration::from_secs(
                provider.get_or("websocket.idle_timeout_secs", defaults.idle_timeout.as_secs())?,
            ),
        })
    }
}

impl Settings {
    /// Resolve settings from `provider`, falling back to defaults.
    pub fn from_provider(provider: &(impl ConfigProvider + ?Sized)) -> Result<Self, ConfigError> {
        let log_level: String = provider.get_or("log.level", "info".to_string())?;

        Ok(Self {
            host: provider.get_or("server.ip", "127.0.0.1".to_string())?,
            port: provider.get_or("server.port", 8085u16)?,
            log_level: log_level.to_ascii_lowercase(),
            keepalive: KeepAlive::from_provider(provider)?,
            max_body_bytes: provider.get_or("webhook.max_body_bytes", 1024 * 1024usize)?,
            poll_interval_secs: provider.get_or("config.poll_interval_secs", 0u64)?,
        })
    }

    /// Address to bind. `BIND_ADDRESS` overrides the configured host and port.
    pub fn bind_address(&self) -> String {
        env::var("BIND_ADDRESS").unwrap_or_else(|_| format!("{}:{}", self.host, self.port))
    }

    /// Fields whose change needs a restart to take effect.
    pub fn restart_required(&self, other: &Self) -> BTreeMap<&'static str, (String, String)> {
        let mut changed = BTreeMap::new();
        if self.host != other.host {
            changed.insert("server.ip", (self.host.clone(), other.host.clone()));
        }
        if self.port != other.port {
            changed.insert("server.port", (self.port.to_string(), other.port.to_string()));
        }
        if self.max_body_bytes != other.max_body_bytes {
            changed.insert(
                "webhook.max_body_bytes",
                (self.max_body_bytes.to_string(), other.max_body_bytes.to_string()),
            );
        }
        changed
    }

    /// Settings for tests: loopback, ephemeral port, short timeouts.
    #[must_use]
    pub fn default_for_test() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            log_level: "debug".into(),
            keepalive: KeepAlive {
                ping_interval: Duration::from_secs(5),
                idle_timeout: Duration::from_secs(30),
            },
            max_body_bytes: 64 * 1024,
            poll_interval_secs: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn provider(contents: &str) -> StaticConfig {
        StaticConfig::from_toml(contents).unwrap()
    }

    #[test]
    fn dotted_lookup_walks_tables() {
        let config = provider("[server]\nip = \"0.0.0.0\"\n[a.b]\nc = 3\n");
        assert_eq!(config.get("server.ip"), Some(Value::String("0.0.0.0".into())));
        assert_eq!(config.get("a.b.c"), Some(Value::Integer(3)));
        assert_eq!(config.get("a.b.missing"), None);
        assert_eq!(config.get("server.ip.deeper"), None);
        assert_eq!(config.get(""), None);
    }

    #[test]
    fn string_ports_are_coerced() {
        let config = provider("[server]\nport = \"8085\"\n");
        assert_eq!(config.require::<u16>("server.port").unwrap(), 8085);
    }

    #[test]
    fn booleans_accept_common_spellings() {
        let config = provider("a = \"yes\"\nb = \"On\"\nc = \"nope\"\nd = 1\ne = false\n");
        assert!(config.require::<bool>("a").unwrap());
        assert!(config.require::<bool>("b").unwrap());
        assert!(!config.require::<bool>("c").unwrap());
        assert!(config.require::<bool>("d").unwrap());
        assert!(!config.require::<bool>("e").unwrap());
    }

    #[test]
    fn missing_key_uses_default_or_errors() {
        let config = StaticConfig::default();
        assert_eq!(config.get_or("server.port", 9000u16).unwrap(), 9000);
        assert!(matches!(
            config.require::<u16>("server.port"),
            Err(ConfigError::Missing(key)) if key == "server.port"
        ));
    }

    #[test]
    fn wrong_shape_is_a_coercion_error() {
        let config = provider("[server]\nport = \"eighty\"\nbig = 70000\n");
        assert!(matches!(
            config.get_or("server.port", 1u16),
            Err(ConfigError::Coercion { target: "u16", .. })
        ));
        assert!(config.require::<u16>("server.big").is_err());
        assert!(config.require::<String>("server").is_err());
    }

    #[test]
    fn default_file_resolves_to_default_settings() {
        let settings = Settings::from_provider(&provider(DEFAULT_CONFIG)).unwrap();
        assert_eq!(settings.host, "127.0.0.1");
        assert_eq!(settings.port, 8085);
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.keepalive, KeepAlive::default());
        assert_eq!(settings.max_body_bytes, 1024 * 1024);
        assert_eq!(settings.poll_interval_secs, 0);

        assert_eq!(settings, Settings::from_provider(&StaticConfig::default()).unwrap());
    }

    #[test]
    fn log_level_is_lowercased() {
        let settings = Settings::from_provider(&provider("[log]\nlevel = \"DEBUG\"\n")).unwrap();
        assert_eq!(settings.log_level, "debug");
    }

    #[test]
    fn restart_required_lists_listener_changes() {
        let a = Settings::default_for_test();
        let mut b = a.clone();
        b.port = 9000;
        b.log_level = "warn".into();

        let changed = a.restart_required(&b);
        assert_eq!(changed.len(), 1);
        assert_eq!(changed["server.port"], ("0".to_string(), "9000".to_string()));
    }

    #[test]
    fn file_config_reload_picks_up_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nport = 1000\n").unwrap();

        let config = FileConfig::load(&path).unwrap();
        assert_eq!(config.require::<u16>("server.port").unwrap(), 1000);

        assert!(!config.reload().unwrap());

        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[server]\nport = 2000").unwrap();
        drop(file);

        assert!(config.reload().unwrap());
        assert_eq!(config.require::<u16>("server.port").unwrap(), 2000);
    }

    #[test]
    fn broken_reload_keeps_previous_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nport = 1000\n").unwrap();
        let config = FileConfig::load(&path).unwrap();

        std::fs::write(&path, "[server\nport = ").unwrap();
        assert!(matches!(config.reload(), Err(ConfigError::Parse { .. })));
        assert_eq!(config.require::<u16>("server.port").unwrap(), 1000);
    }

    #[test]
    fn reload_if_modified_skips_untouched_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[log]\nlevel = \"info\"\n").unwrap();
        let config = FileConfig::load(&path).unwrap();

        assert!(!config.reload_if_modified().unwrap());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            FileConfig::load(dir.path().join("absent.toml")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn write_default_creates_loadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        write_default(&path).unwrap();
        let config = FileConfig::load(&path).unwrap();
        assert_eq!(config.require::<u16>("server.port").unwrap(), 8085);
        assert_eq!(config.path(), path.as_path());
    }

    #[test]
    fn find_existing_prefers_executable_dir() {
        let exe = tempfile::tempdir().unwrap();
        let cwd = tempfile::tempdir().unwrap();
        std::fs::write(cwd.path().join("config.toml"), "").unwrap();

        assert_eq!(
            find_existing(Some(exe.path()), Some(cwd.path())),
            Some(cwd.path().join("config.toml"))
        );

        std::fs::write(exe.path().join("setconfig.toml"), "").unwrap();
        assert_eq!(
            find_existing(Some(exe.path()), Some(cwd.path())),
            Some(exe.path().join("setconfig.toml"))
        );

        std::fs::write(exe.path().join("config.toml"), "").unwrap();
        assert_eq!(
            find_existing(Some(exe.path()), Some(cwd.path())),
            Some(exe.path().join("config.toml"))
        );
        assert_eq!(find_existing(None, None), None);
    }
}
