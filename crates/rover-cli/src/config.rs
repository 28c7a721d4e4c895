//! Configuration Vault – reads/writes `~/.rover/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rover_hal::drive::DriveConfig;
use rover_hal::sim::DEFAULT_BATTERY_ENV;
use rover_kernel::battery::BatteryConfig;
use rover_kernel::wall_guard::GuardConfig;
use rover_runtime::autonomy::AutoDriveConfig;
use rover_types::RoverError;

/// Persisted robot configuration stored in `~/.rover/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Run without hardware: simulated motors and no host halt.
    #[serde(default = "default_simulate")]
    pub simulate: bool,

    /// Start the autonomy loop as soon as the robot boots.
    #[serde(default)]
    pub auto_start: bool,

    /// Seconds between battery watchdog checks.
    #[serde(default = "default_watchdog_interval")]
    pub watchdog_interval_s: f32,

    /// Environment variable the simulated battery probe reads volts from.
    #[serde(default = "default_battery_env")]
    pub battery_env: String,

    /// Persona text handed to the intent source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,

    #[serde(default)]
    pub drive: DriveConfig,

    #[serde(default)]
    pub guard: GuardSection,

    #[serde(default)]
    pub autonomy: AutoDriveConfig,

    #[serde(default)]
    pub battery: BatteryConfig,
}

/// `[guard]` – the proximity guard is optional; without it autonomy owns its
/// own range finder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardSection {
    #[serde(default = "default_guard_enabled")]
    pub enabled: bool,
    #[serde(flatten)]
    pub thresholds: GuardConfig,
}

impl Default for GuardSection {
    fn default() -> Self {
        Self {
            enabled: default_guard_enabled(),
            thresholds: GuardConfig::default(),
        }
    }
}

fn default_simulate() -> bool {
    true
}
fn default_watchdog_interval() -> f32 {
    15.0
}
fn default_battery_env() -> String {
    DEFAULT_BATTERY_ENV.to_string()
}
fn default_guard_enabled() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            simulate: default_simulate(),
            auto_start: false,
            watchdog_interval_s: default_watchdog_interval(),
            battery_env: default_battery_env(),
            persona: None,
            drive: DriveConfig::default(),
            guard: GuardSection::default(),
            autonomy: AutoDriveConfig::default(),
            battery: BatteryConfig::default(),
        }
    }
}

impl Config {
    /// Battery check cadence; falls back to 15 s when the value is unusable.
    pub fn watchdog_interval(&self) -> Duration {
        Duration::try_from_secs_f32(self.watchdog_interval_s)
            .ok()
            .filter(|d| !d.is_zero())
            .unwrap_or(Duration::from_secs(15))
    }
}

/// Return the path to `~/.rover/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".rover").join("config.toml")
}

/// Load the config at `path`, writing the defaults there first if the file
/// does not exist.  Environment overrides are applied either way.
///
/// Returns the config and whether it was freshly created.
pub fn load_or_init(path: &Path) -> Result<(Config, bool), RoverError> {
    match load_from(path)? {
        Some(cfg) => Ok((cfg, false)),
        None => {
            let mut cfg = Config::default();
            save_to(&cfg, path)?;
            apply_env_overrides(&mut cfg);
            Ok((cfg, true))
        }
    }
}

/// Load the config from a specific path.  `None` if the file does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, RoverError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        RoverError::Configuration(format!("failed to read config at {}: {e}", path.display()))
    })?;
    let mut cfg: Config = toml::from_str(&raw)
        .map_err(|e| RoverError::Configuration(format!("failed to parse config: {e}")))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `ROVER_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `ROVER_SIMULATE` | `simulate` |
/// | `ROVER_AUTO_START` | `auto_start` |
/// | `ROVER_BATTERY_ENV` | `battery_env` |
///
/// Booleans accept `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off`;
/// anything else is ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("ROVER_SIMULATE")
        && let Some(flag) = parse_flag(&v)
    {
        cfg.simulate = flag;
    }
    if let Ok(v) = std::env::var("ROVER_AUTO_START")
        && let Some(flag) = parse_flag(&v)
    {
        cfg.auto_start = flag;
    }
    if let Ok(v) = std::env::var("ROVER_BATTERY_ENV")
        && !v.trim().is_empty()
    {
        cfg.battery_env = v.trim().to_string();
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Save the config to a specific path, creating the parent directory if
/// necessary.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), RoverError> {
    let io_err = |what: &str, e: std::io::Error| {
        RoverError::Configuration(format!("failed to {what} at {}: {e}", path.display()))
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| io_err("create config directory", e))?;
        // Restrict the config directory to the owner only (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| io_err("set directory permissions", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| RoverError::Configuration(format!("failed to serialize config: {e}")))?;
    // Owner-only read/write (rw-------) on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| io_err("write config", e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(|e| io_err("write config", e))?;
    Ok(())
}
