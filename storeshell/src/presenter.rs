//! Notification presenter
//!
//! Renders notifications through a `NotificationSurface` and remembers which
//! alert is visible for each dedup key. Presenting a key that is already
//! visible replaces that alert instead of stacking a second one.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::PresentError;
use crate::intent::Intent;
use crate::notification::Notification;
use crate::router::{NavigationSource, NavigationTarget};

/// What a tap on an alert does
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapAction {
    /// `None` only brings the app to the foreground
    pub target: Option<NavigationTarget>,
}

/// A notification as shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub notification: Notification,
    pub tap: TapAction,
}

impl Alert {
    pub fn key(&self) -> &str {
        &self.notification.dedup_key
    }
}

/// OS notification surface. Posting an alert whose key is visible must
/// replace it.
pub trait NotificationSurface {
    fn post(&mut self, alert: &Alert) -> Result<(), PresentError>;
    fn remove(&mut self, _dedup_key: &str) {}
}

impl NotificationSurface for Box<dyn NotificationSurface> {
    fn post(&mut self, alert: &Alert) -> Result<(), PresentError> {
        (**self).post(alert)
    }

    fn remove(&mut self, dedup_key: &str) {
        (**self).remove(dedup_key)
    }
}

/// Surface that only writes alerts to the log
#[derive(Debug, Default)]
pub struct LogSurface;

impl NotificationSurface for LogSurface {
    fn post(&mut self, alert: &Alert) -> Result<(), PresentError> {
        tracing::info!(
            dedup_key = alert.key(),
            channel = %alert.notification.channel_id,
            title = %alert.notification.title,
            body = %alert.notification.body,
            url = ?alert.notification.deep_link_url,
            "notification"
        );
        Ok(())
    }
}

/// Desktop notifications through the platform notification daemon
#[cfg(feature = "native")]
pub struct DesktopSurface {
    app_name: String,
    timeout_ms: u32,
}

#[cfg(feature = "native")]
impl DesktopSurface {
    pub fn new(app_name: &str, timeout_ms: u32) -> Self {
        Self {
            app_name: app_name.to_string(),
            timeout_ms,
        }
    }
}

#[cfg(feature = "native")]
impl NotificationSurface for DesktopSurface {
    fn post(&mut self, alert: &Alert) -> Result<(), PresentError> {
        use notify_rust::{Notification as DesktopNotification, Timeout};

        let mut notification = DesktopNotification::new();
        notification
            .summary(&alert.notification.title)
            .body(&alert.notification.body)
            .appname(&self.app_name)
            .timeout(Timeout::Milliseconds(self.timeout_ms));

        // Same replace id for the same dedup key
        #[cfg(all(unix, not(target_os = "macos")))]
        notification.id(replace_id(alert.key()));

        notification
            .show()
            .map_err(|e| PresentError::Rejected(format!("Notification error: {}", e)))?;

        Ok(())
    }
}

#[cfg(all(feature = "native", unix, not(target_os = "macos")))]
fn replace_id(dedup_key: &str) -> u32 {
    use sha2::{Digest, Sha256};

    let digest = Sha256::digest(dedup_key.as_bytes());
    // Zero asks the daemon for a fresh id
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]).max(1)
}

pub struct NotificationPresenter<S> {
    surface: S,
    visible: HashMap<String, Alert>,
}

impl<S: NotificationSurface> NotificationPresenter<S> {
    pub fn new(surface: S) -> Self {
        Self {
            surface,
            visible: HashMap::new(),
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Show `notification`, replacing a visible alert with the same key
    pub fn present(&mut self, notification: &Notification) {
        let target = notification
            .deep_link_url
            .as_deref()
            .map(|url| NavigationTarget::new(url, NavigationSource::NotificationTap));
        let alert = Alert {
            notification: notification.clone(),
            tap: TapAction { target },
        };

        if let Err(e) = self.surface.post(&alert) {
            warn!(dedup_key = alert.key(), error = %e, "failed to present notification");
            return;
        }

        let replaced = self.visible.insert(alert.key().to_string(), alert).is_some();
        debug!(dedup_key = %notification.dedup_key, replaced, "presented notification");
    }

    /// The user tapped the alert for `dedup_key`.
    ///
    /// Returns the intent the OS delivers back to the app: the tap URL rides
    /// in the same extra a fresh deep link would use.
    pub fn tap(&mut self, dedup_key: &str) -> Option<Intent> {
        let alert = self.visible.remove(dedup_key)?;
        self.surface.remove(dedup_key);
        let url = alert.tap.target.as_ref().map(|t| t.url.as_str());
        Some(Intent::notification_tap(url))
    }

    pub fn dismiss(&mut self, dedup_key: &str) -> bool {
        let removed = self.visible.remove(dedup_key).is_some();
        if removed {
            self.surface.remove(dedup_key);
        }
        removed
    }

    pub fn visible(&self, dedup_key: &str) -> Option<&Alert> {
        self.visible.get(dedup_key)
    }

    pub fn visible_count(&self) -> usize {
        self.visible.len()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Surface that records every post and models replace-by-key
    #[derive(Debug, Default)]
    pub struct RecordingSurface {
        pub posts: Vec<Alert>,
        pub shown: HashMap<String, Alert>,
        pub reject: bool,
    }

    impl NotificationSurface for RecordingSurface {
        fn post(&mut self, alert: &Alert) -> Result<(), PresentError> {
            if self.reject {
                return Err(PresentError::Rejected("notifications disabled".to_string()));
            }
            self.posts.push(alert.clone());
            self.shown.insert(alert.key().to_string(), alert.clone());
            Ok(())
        }

        fn remove(&mut self, dedup_key: &str) {
            self.shown.remove(dedup_key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::RecordingSurface;
    use super::*;
    use crate::intent::EXTRA_NOTIFICATION_URL;

    fn sale() -> Notification {
        Notification::new("Sale", "50% off", "store", "sale").with_url("https://store.myshop.com/sale")
    }

    #[test]
    fn test_same_key_replaces() {
        let mut presenter = NotificationPresenter::new(RecordingSurface::default());
        presenter.present(&sale());
        presenter.present(&sale());

        assert_eq!(presenter.visible_count(), 1);
        assert_eq!(presenter.surface().shown.len(), 1);
        assert_eq!(presenter.surface().posts.len(), 2);
    }

    #[test]
    fn test_distinct_keys_stack() {
        let mut presenter = NotificationPresenter::new(RecordingSurface::default());
        presenter.present(&sale());
        presenter.present(&Notification::new("Other", "news", "store", "news"));
        assert_eq!(presenter.visible_count(), 2);
    }

    #[test]
    fn test_tap_action_carries_url() {
        let mut presenter = NotificationPresenter::new(RecordingSurface::default());
        presenter.present(&sale());

        let alert = presenter.visible("sale").unwrap();
        assert_eq!(
            alert.tap.target,
            Some(NavigationTarget::new(
                "https://store.myshop.com/sale",
                NavigationSource::NotificationTap
            ))
        );

        let intent = presenter.tap("sale").unwrap();
        assert_eq!(
            intent.extra(EXTRA_NOTIFICATION_URL),
            Some("https://store.myshop.com/sale")
        );
        assert_eq!(presenter.visible_count(), 0);
        assert!(presenter.surface().shown.is_empty());
        assert!(presenter.tap("sale").is_none());
    }

    #[test]
    fn test_tap_without_url_only_foregrounds() {
        let mut presenter = NotificationPresenter::new(RecordingSurface::default());
        presenter.present(&Notification::new("Hi", "there", "store", "plain"));

        assert_eq!(presenter.visible("plain").unwrap().tap.target, None);
        let intent = presenter.tap("plain").unwrap();
        assert!(intent.navigation_candidates().is_empty());
    }

    #[test]
    fn test_rejected_post_is_not_visible() {
        let mut presenter = NotificationPresenter::new(RecordingSurface {
            reject: true,
            ..RecordingSurface::default()
        });
        presenter.present(&sale());
        assert_eq!(presenter.visible_count(), 0);
    }

    #[test]
    fn test_dismiss() {
        let mut presenter = NotificationPresenter::new(RecordingSurface::default());
        presenter.present(&sale());
        assert!(presenter.dismiss("sale"));
        assert!(!presenter.dismiss("sale"));
    }
}
