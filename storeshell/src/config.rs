//! Storeshell Configuration System
//!
//! Build-time configuration loaded from shell.toml, or from the generator's
//! app.config.json. Nothing here is mutated once the shell is running.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use url::Url;

use crate::error::ConfigError;

/// Complete shell configuration from shell.toml
#[derive(Debug, Clone, Default)]
pub struct ShellConfig {
    pub app: AppConfig,
    pub store: StoreConfig,
    pub notifications: NotificationConfig,
    pub reminder: ReminderConfig,
    pub storage: StorageConfig,
    pub network: NetworkConfig,
}

/// [app] section
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Display name, also the fallback notification title
    pub name: String,
}

/// [store] section - the single trusted origin
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub url: String,
    pub trusted_suffixes: Vec<String>,
}

/// [notifications] section
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub channel_id: String,
    pub channel_name: String,
    /// Title for broadcasts without one; falls back to the app name
    pub broadcast_title: Option<String>,
    pub broadcast_message: String,
}

/// [reminder] section - the built-in "welcome back" notification
#[derive(Debug, Clone)]
pub struct ReminderConfig {
    pub enabled: bool,
    pub delay_hours: u64,
    pub body: String,
}

/// [storage] section
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub state_dir: Option<String>,
}

/// Short: the probe runs on the event thread before every navigation
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 1500;

/// [network] section
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub probe_timeout_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "Store".to_string(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "https://example.myshopify.com".to_string(),
            trusted_suffixes: vec!["shopify.com".to_string(), "shopifycdn.com".to_string()],
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            channel_id: "store_notifications".to_string(),
            channel_name: "Store Notifications".to_string(),
            broadcast_title: None,
            broadcast_message: "Check out what's new!".to_string(),
        }
    }
}

impl ReminderConfig {
    /// Delay before the reminder fires. Absurd `delay_hours` saturate.
    pub fn delay_ms(&self) -> u64 {
        self.delay_hours.saturating_mul(60 * 60 * 1000)
    }
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delay_hours: 24,
            body: "Welcome back! Check out new arrivals and deals.".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { state_dir: None }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
        }
    }
}

/// The generator's app.config.json (only the keys the shell needs)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneratorConfig {
    app_name: Option<String>,
    store_url: String,
    #[serde(default)]
    package_name: Option<String>,
}

impl ShellConfig {
    /// Load configuration from a shell.toml file or a directory containing one
    pub fn load(path: &Path) -> Self {
        let toml_path = if path.is_file() {
            path.to_path_buf()
        } else {
            path.join("shell.toml")
        };

        if !toml_path.exists() {
            return Self::default();
        }

        let content = match fs::read_to_string(&toml_path) {
            Ok(c) => c,
            Err(_) => return Self::default(),
        };

        Self::parse(&content)
    }

    /// Parse configuration from TOML content
    pub fn parse(content: &str) -> Self {
        let mut config = Self::default();
        let mut current_section = String::new();

        for line in content.lines() {
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                current_section = line[1..line.len() - 1].trim().to_string();
                continue;
            }

            if let Some((key, value)) = parse_key_value(line) {
                match current_section.as_str() {
                    "app" => config.parse_app(&key, &value),
                    "store" => config.parse_store(&key, &value),
                    "notifications" => config.parse_notifications(&key, &value),
                    "reminder" => config.parse_reminder(&key, &value),
                    "storage" => config.parse_storage(&key, &value),
                    "network" => config.parse_network(&key, &value),
                    _ => {}
                }
            }
        }

        config
    }

    /// Build configuration from the generator's app.config.json content
    pub fn from_app_config(json: &str) -> Result<Self, ConfigError> {
        let generated: GeneratorConfig = serde_json::from_str(json)?;
        let mut config = Self::default();

        config.store.url = normalize_store_url(&generated.store_url)?;
        if let Some(name) = generated.app_name.filter(|n| !n.trim().is_empty()) {
            config.app.name = name;
        }
        if let Some(package) = generated.package_name {
            config.notifications.channel_id = format!("{}.notifications", package);
        }

        Ok(config)
    }

    /// Read app.config.json from disk
    pub fn load_app_config(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_app_config(&content)
    }

    fn parse_app(&mut self, key: &str, value: &str) {
        match key {
            "name" => self.app.name = value.to_string(),
            _ => {}
        }
    }

    fn parse_store(&mut self, key: &str, value: &str) {
        match key {
            "url" => self.store.url = value.to_string(),
            "trusted_suffixes" => self.store.trusted_suffixes = parse_string_list(value),
            _ => {}
        }
    }

    fn parse_notifications(&mut self, key: &str, value: &str) {
        match key {
            "channel_id" => self.notifications.channel_id = value.to_string(),
            "channel_name" => self.notifications.channel_name = value.to_string(),
            "broadcast_title" => self.notifications.broadcast_title = Some(value.to_string()),
            "broadcast_message" => self.notifications.broadcast_message = value.to_string(),
            _ => {}
        }
    }

    fn parse_reminder(&mut self, key: &str, value: &str) {
        match key {
            "enabled" => self.reminder.enabled = value == "true",
            "delay_hours" => self.reminder.delay_hours = value.parse().unwrap_or(24),
            "body" => self.reminder.body = value.to_string(),
            _ => {}
        }
    }

    fn parse_storage(&mut self, key: &str, value: &str) {
        match key {
            "state_dir" => self.storage.state_dir = Some(value.to_string()),
            _ => {}
        }
    }

    fn parse_network(&mut self, key: &str, value: &str) {
        match key {
            "probe_timeout_ms" => self.network.probe_timeout_ms = value.parse().unwrap_or(DEFAULT_PROBE_TIMEOUT_MS),
            _ => {}
        }
    }

    /// Title used for broadcasts that carry none
    pub fn broadcast_title(&self) -> &str {
        self.notifications
            .broadcast_title
            .as_deref()
            .unwrap_or(&self.app.name)
    }

    /// Directory holding persisted shell state
    pub fn state_dir(&self) -> PathBuf {
        match &self.storage.state_dir {
            Some(dir) => PathBuf::from(dir),
            None => std::env::temp_dir().join("storeshell"),
        }
    }

    /// Path of the persisted schedule
    pub fn schedule_path(&self) -> PathBuf {
        self.state_dir().join("scheduled_notifications.json")
    }
}

/// Prepend https:// when no scheme is given and drop trailing slashes.
/// Fails when the result has no host.
pub fn normalize_store_url(raw: &str) -> Result<String, ConfigError> {
    let raw = raw.trim();
    let with_scheme = if raw.starts_with("http") {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    };
    let normalized = with_scheme.trim_end_matches('/').to_string();

    match Url::parse(&normalized) {
        Ok(url) if url.host_str().map(|h| !h.is_empty()).unwrap_or(false) => Ok(normalized),
        _ => Err(ConfigError::InvalidStoreUrl(raw.to_string())),
    }
}

/// Parse a key = value line
fn parse_key_value(line: &str) -> Option<(String, String)> {
    let parts: Vec<&str> = line.splitn(2, '=').collect();
    if parts.len() != 2 {
        return None;
    }

    let key = parts[0].trim().to_string();
    let value = unquote(parts[1].trim()).to_string();

    Some((key, value))
}

/// Parse `["a", "b"]` or a bare comma separated list
fn parse_string_list(value: &str) -> Vec<String> {
    let inner = value
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']');

    inner
        .split(',')
        .map(|item| unquote(item.trim()).trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn unquote(value: &str) -> &str {
    if value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')))
    {
        &value[1..value.len() - 1]
    } else {
        value
    }
}
