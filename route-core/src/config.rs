//! Configuration file management for routewatch.
//!
//! Reads/writes `~/.routewatch/config.yaml` with the route service,
//! geocoder, live feed, map defaults, and dashboard settings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backoff::{self, ReconnectPolicy};
use crate::types::{Coordinate, RouteError};
use crate::viewport::DEFAULT_ZOOM;

/// Full configuration structure.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub route_service: RouteServiceConfig,
    pub geocoder: GeocoderConfig,
    pub feed: FeedConfig,
    pub map: MapConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteServiceConfig {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeocoderConfig {
    pub url: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedConfig {
    /// WebSocket URL of the position feed; `None` disables live updates.
    pub url: Option<String>,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
}

impl FeedConfig {
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            Duration::from_millis(self.initial_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.max_attempts,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapConfig {
    pub default_zoom: u8,
    pub center_lat: f64,
    pub center_lon: f64,
}

impl MapConfig {
    /// Where the map sits before any route is loaded.
    pub fn default_center(&self) -> Coordinate {
        Coordinate::new(self.center_lat, self.center_lon)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardConfig {
    pub host: String,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            route_service: RouteServiceConfig {
                url: "http://localhost:5000/directions".into(),
            },
            geocoder: GeocoderConfig {
                url: "https://nominatim.openstreetmap.org/reverse".into(),
                enabled: true,
            },
            feed: FeedConfig {
                url: Some("ws://localhost:5000/positions".into()),
                initial_delay_ms: backoff::DEFAULT_INITIAL_DELAY_MS,
                max_delay_ms: backoff::DEFAULT_MAX_DELAY_MS,
                max_attempts: backoff::DEFAULT_MAX_ATTEMPTS,
            },
            map: MapConfig {
                default_zoom: DEFAULT_ZOOM,
                center_lat: 51.505,
                center_lon: -0.09,
            },
            dashboard: DashboardConfig {
                host: "127.0.0.1".into(),
                port: 8080,
            },
        }
    }
}

/// Get the config directory path (`~/.routewatch/`).
pub fn config_dir() -> PathBuf {
    dirs_home().join(".routewatch")
}

/// Get the config file path.
pub fn config_file() -> PathBuf {
    config_dir().join("config.yaml")
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Load config from `~/.routewatch/config.yaml`.
///
/// Returns default config if the file doesn't exist or can't be read.
pub fn load_config() -> Config {
    load_config_from(&config_file())
}

/// Load config from an explicit path, defaulting on any failure.
pub fn load_config_from(path: &Path) -> Config {
    if !path.exists() {
        return Config::default();
    }

    match std::fs::read_to_string(path) {
        Ok(text) => parse_config(&text),
        Err(e) => {
            tracing::warn!("could not read {}: {e}, using defaults", path.display());
            Config::default()
        }
    }
}

/// Save config to `~/.routewatch/config.yaml`.
pub fn save_config(config: &Config) -> Result<PathBuf, RouteError> {
    let path = config_file();
    save_config_to(config, &path)?;
    Ok(path)
}

/// Save config to an explicit path, creating parent directories.
pub fn save_config_to(config: &Config, path: &Path) -> Result<(), RouteError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| RouteError::Config(e.to_string()))?;
    }
    std::fs::write(path, serialize_config(config)).map_err(|e| RouteError::Config(e.to_string()))
}

/// Parse simple YAML-like config text. Unknown keys are ignored.
pub fn parse_config(text: &str) -> Config {
    let mut config = Config::default();
    let mut current_section: Option<String> = None;

    for line in text.lines() {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }

        let is_indented = line.starts_with("  ") || line.starts_with('\t');

        let Some((key, val)) = stripped.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let val = val.trim();

        if !is_indented {
            current_section = val.is_empty().then(|| key.to_string());
            continue;
        }

        let Some(section) = current_section.as_deref() else {
            continue;
        };
        match (section, key) {
            ("route_service", "url") => {
                if let Some(v) = parse_string_value(val) {
                    config.route_service.url = v;
                }
            }
            ("geocoder", "url") => {
                if let Some(v) = parse_string_value(val) {
                    config.geocoder.url = v;
                }
            }
            ("geocoder", "enabled") => {
                if let Some(v) = parse_bool_value(val) {
                    config.geocoder.enabled = v;
                }
            }
            ("feed", "url") => config.feed.url = parse_string_value(val),
            ("feed", "initial_delay_ms") => {
                if let Ok(v) = val.parse() {
                    config.feed.initial_delay_ms = v;
                }
            }
            ("feed", "max_delay_ms") => {
                if let Ok(v) = val.parse() {
                    config.feed.max_delay_ms = v;
                }
            }
            ("feed", "max_attempts") => {
                if let Ok(v) = val.parse() {
                    config.feed.max_attempts = v;
                }
            }
            ("map", "default_zoom") => {
                if let Ok(v) = val.parse() {
                    config.map.default_zoom = v;
                }
            }
            ("map", "center_lat") => {
                if let Some(v) = parse_float_value(val) {
                    config.map.center_lat = v;
                }
            }
            ("map", "center_lon") => {
                if let Some(v) = parse_float_value(val) {
                    config.map.center_lon = v;
                }
            }
            ("dashboard", "host") => {
                if let Some(v) = parse_string_value(val) {
                    config.dashboard.host = v;
                }
            }
            ("dashboard", "port") => {
                if let Ok(v) = val.parse() {
                    config.dashboard.port = v;
                }
            }
            _ => {}
        }
    }

    config
}

fn parse_string_value(val: &str) -> Option<String> {
    if val == "null" || val == "~" || val.is_empty() {
        return None;
    }
    // Strip quotes
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return Some(val[1..val.len() - 1].to_string());
    }
    Some(val.to_string())
}

fn parse_float_value(val: &str) -> Option<f64> {
    if val == "null" || val == "~" || val.is_empty() {
        return None;
    }
    val.parse().ok()
}

fn parse_bool_value(val: &str) -> Option<bool> {
    match val {
        "true" | "yes" | "on" => Some(true),
        "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Serialize config to YAML-like text.
pub fn serialize_config(config: &Config) -> String {
    let mut lines = vec!["# routewatch configuration".to_string(), String::new()];

    lines.push("route_service:".into());
    lines.push(format!("  url: \"{}\"", config.route_service.url));
    lines.push(String::new());

    lines.push("geocoder:".into());
    lines.push(format!("  url: \"{}\"", config.geocoder.url));
    lines.push(format!("  enabled: {}", config.geocoder.enabled));
    lines.push(String::new());

    lines.push("feed:".into());
    match &config.feed.url {
        Some(url) => lines.push(format!("  url: \"{url}\"")),
        None => lines.push("  url: null".into()),
    }
    lines.push(format!("  initial_delay_ms: {}", config.feed.initial_delay_ms));
    lines.push(format!("  max_delay_ms: {}", config.feed.max_delay_ms));
    lines.push(format!("  max_attempts: {}", config.feed.max_attempts));
    lines.push(String::new());

    lines.push("map:".into());
    lines.push(format!("  default_zoom: {}", config.map.default_zoom));
    lines.push(format!("  center_lat: {}", config.map.center_lat));
    lines.push(format!("  center_lon: {}", config.map.center_lon));
    lines.push(String::new());

    lines.push("dashboard:".into());
    lines.push(format!("  host: \"{}\"", config.dashboard.host));
    lines.push(format!("  port: {}", config.dashboard.port));

    lines.join("\n") + "\n"
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
