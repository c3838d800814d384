pub mod config;
pub mod connectivity;
pub mod console;
pub mod error;
pub mod gateway;
pub mod intent;
pub mod notification;
pub mod presenter;
pub mod router;
pub mod scheduler;
pub mod shell;

use std::path::Path;
use std::sync::Arc;

pub use config::ShellConfig;
pub use connectivity::{ConnectivityProbe, ConnectivityState, ConnectivityViewState, HttpProbe, StaticProbe, ViewState};
pub use error::{ConfigError, PresentError, ScheduleError, StoreError};
pub use gateway::{NotificationGateway, RawEvent, RemotePush};
pub use intent::{intent_from_args, Intent};
pub use notification::Notification;
pub use presenter::{LogSurface, NotificationPresenter, NotificationSurface};
#[cfg(feature = "native")]
pub use presenter::DesktopSurface;
pub use router::{AllowListPolicy, NavigationRouter, NavigationSource, NavigationTarget, Resolution};
pub use scheduler::{AlarmService, Clock, DynScheduler, JsonFileStore, LocalScheduler, SystemClock, ThreadAlarms};
pub use shell::{channel, BrowserSurface, EventSender, Shell, ShellEvent};

/// Load configuration from `path`.
///
/// A `.json` file is read as the generator's app.config.json, anything else
/// as shell.toml (or a directory holding one). `None` looks in the current
/// directory.
pub fn load_config(path: Option<&Path>) -> Result<ShellConfig, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("."));
    let config = if path.extension().map(|e| e == "json").unwrap_or(false) {
        ShellConfig::load_app_config(path)?
    } else {
        ShellConfig::load(path)
    };

    // Fail early on a store URL the router could never use
    AllowListPolicy::new(&config.store.url, &config.store.trusted_suffixes)?;
    Ok(config)
}

/// Scheduler persisting to the configured state directory
pub fn open_scheduler(
    config: &ShellConfig,
    alarms: Box<dyn AlarmService>,
    clock: Arc<dyn Clock>,
) -> Arc<DynScheduler> {
    let store: Box<dyn scheduler::ScheduleStore> = Box::new(JsonFileStore::new(&config.schedule_path()));
    Arc::new(LocalScheduler::new(store, alarms, clock))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualAlarms;
    use std::fs;

    #[test]
    fn test_load_config_from_toml_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("shell.toml"),
            "[store]\nurl = \"https://store.myshop.com\"\n",
        )
        .unwrap();

        let config = load_config(Some(dir.path())).unwrap();
        assert_eq!(config.store.url, "https://store.myshop.com");
    }

    #[test]
    fn test_load_config_from_app_config_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.config.json");
        fs::write(&path, r#"{"appName":"MyShop","storeUrl":"myshop.com/"}"#).unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.app.name, "MyShop");
        assert_eq!(config.store.url, "https://myshop.com");
    }

    #[test]
    fn test_load_config_rejects_bad_store_url() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("shell.toml"), "[store]\nurl = \"nonsense\"\n").unwrap();
        assert!(load_config(Some(dir.path())).is_err());
    }

    #[test]
    fn test_open_scheduler_persists_under_state_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ShellConfig::default();
        config.storage.state_dir = Some(dir.path().display().to_string());

        let scheduler = open_scheduler(&config, Box::new(ManualAlarms::new()), Arc::new(SystemClock));
        let notification = Notification::new("Hi", "Back soon", "store", "later");
        scheduler.schedule(notification, 60_000, "later").unwrap();

        assert!(config.schedule_path().exists());
        assert_eq!(scheduler.pending().unwrap().len(), 1);
    }
}
