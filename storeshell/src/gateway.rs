//! Notification gateway
//!
//! Normalizes remote push payloads and OS broadcasts into `Notification`
//! values. This is the only place that understands the raw shapes delivered
//! by the push service and the broadcast mechanism.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ShellConfig;
use crate::intent::EXTRA_NOTIFICATION_URL;
use crate::notification::{content_dedup_key, ChannelRegistry, Notification};

/// `notification` sub-payload of a remote push
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushNotificationPart {
    pub title: Option<String>,
    pub body: Option<String>,
}

/// Remote push as delivered by the push service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePush {
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub notification: Option<PushNotificationPart>,
    #[serde(default)]
    pub data: HashMap<String, String>,
}

/// OS broadcast carrying already-resolved extras
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Broadcast {
    #[serde(default)]
    pub extras: HashMap<String, String>,
}

/// Raw inbound event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawEvent {
    RemotePush(RemotePush),
    Broadcast(Broadcast),
}

/// Fixed strings the gateway falls back on
#[derive(Debug, Clone)]
pub struct GatewayDefaults {
    pub app_name: String,
    pub broadcast_title: String,
    pub broadcast_message: String,
    pub channel_id: String,
    pub channel_name: String,
}

impl GatewayDefaults {
    pub fn from_config(config: &ShellConfig) -> Self {
        Self {
            app_name: config.app.name.clone(),
            broadcast_title: config.broadcast_title().to_string(),
            broadcast_message: config.notifications.broadcast_message.clone(),
            channel_id: config.notifications.channel_id.clone(),
            channel_name: config.notifications.channel_name.clone(),
        }
    }
}

pub struct NotificationGateway {
    defaults: GatewayDefaults,
    channels: ChannelRegistry,
}

impl NotificationGateway {
    pub fn new(defaults: GatewayDefaults) -> Self {
        Self {
            defaults,
            channels: ChannelRegistry::new(),
        }
    }

    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    /// Make sure the notification channel exists. Safe to call repeatedly.
    pub fn ensure_channel(&mut self) {
        self.channels
            .ensure(&self.defaults.channel_id, &self.defaults.channel_name);
    }

    /// Normalize a raw event. `None` means the event is dropped.
    pub fn receive(&mut self, event: RawEvent) -> Option<Notification> {
        let notification = match event {
            RawEvent::RemotePush(push) => self.from_push(push),
            RawEvent::Broadcast(broadcast) => Some(self.from_broadcast(broadcast)),
        }?;

        self.ensure_channel();
        Some(notification)
    }

    fn from_push(&self, push: RemotePush) -> Option<Notification> {
        let part = push.notification.unwrap_or_default();
        let data = &push.data;

        // Data fields override the notification part one by one
        let title = present(data.get("title"))
            .or_else(|| present(part.title.as_ref()))
            .unwrap_or_else(|| self.defaults.app_name.clone());
        let body = present(data.get("body")).or_else(|| present(part.body.as_ref()));
        let url = present(data.get("url"));

        let body = match body {
            Some(body) => body,
            None => {
                debug!(message_id = ?push.message_id, "dropping push without body");
                return None;
            }
        };

        let dedup_key = present(push.message_id.as_ref())
            .or_else(|| present(data.get("dedup_key")))
            .unwrap_or_else(|| content_dedup_key(&title, &body, url.as_deref()));

        Some(Notification {
            title,
            body,
            deep_link_url: url,
            channel_id: self.defaults.channel_id.clone(),
            dedup_key,
        })
    }

    fn from_broadcast(&self, broadcast: Broadcast) -> Notification {
        let extras = &broadcast.extras;

        let title = present(extras.get("title"))
            .unwrap_or_else(|| self.defaults.broadcast_title.clone());
        let body = present(extras.get("message"))
            .unwrap_or_else(|| self.defaults.broadcast_message.clone());
        let url = present(extras.get(EXTRA_NOTIFICATION_URL));

        let dedup_key = present(extras.get("notification_id"))
            .unwrap_or_else(|| content_dedup_key(&title, &body, url.as_deref()));

        Notification {
            title,
            body,
            deep_link_url: url,
            channel_id: self.defaults.channel_id.clone(),
            dedup_key,
        }
    }
}

/// Blank strings count as absent
fn present(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
