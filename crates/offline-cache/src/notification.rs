//! Push notification and notification-click hooks

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::NotificationConfig;
use crate::error::{OfflineCacheError, Result};

const OPEN_ACTION: &str = "open";
const CLOSE_ACTION: &str = "close";

/// JSON body of a push message. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PushPayload {
    pub title: Option<String>,
    pub body: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

/// Notification handed to the host for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: Option<String>,
    pub icon: String,
    pub badge: String,
    /// Target URL opened on click
    pub data: Option<String>,
    pub actions: Vec<NotificationAction>,
}

/// An open page controlled by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientWindow {
    pub id: String,
    pub url: String,
}

/// Host capabilities used by the notification hooks
#[async_trait]
pub trait NotificationHost: Send + Sync {
    async fn show_notification(&self, notification: Notification) -> Result<()>;
    async fn client_windows(&self) -> Result<Vec<ClientWindow>>;
    async fn focus(&self, client_id: &str) -> Result<()>;
    async fn open_window(&self, url: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// An existing window already showing the target was focused
    Focused(String),
    /// A new window was opened at the target URL
    Opened(String),
    /// The close action; nothing to do
    Dismissed,
}

pub struct NotificationHooks {
    config: NotificationConfig,
}

impl NotificationHooks {
    pub fn new(config: NotificationConfig) -> Self {
        Self { config }
    }

    pub fn parse_payload(data: &[u8]) -> Result<PushPayload> {
        serde_json::from_slice(data).map_err(|e| OfflineCacheError::Payload(e.to_string()))
    }

    /// Build the notification for a payload, filling gaps from config
    pub fn build_notification(&self, payload: PushPayload) -> Notification {
        Notification {
            title: payload
                .title
                .unwrap_or_else(|| self.config.default_title.clone()),
            body: payload.body,
            icon: self.config.icon.clone(),
            badge: self.config.badge.clone(),
            data: payload.url,
            actions: vec![
                NotificationAction {
                    action: OPEN_ACTION.to_string(),
                    title: self.config.open_action_title.clone(),
                },
                NotificationAction {
                    action: CLOSE_ACTION.to_string(),
                    title: self.config.close_action_title.clone(),
                },
            ],
        }
    }

    /// Handle a push message. A push without data shows nothing.
    pub async fn on_push(
        &self,
        data: Option<&[u8]>,
        host: &dyn NotificationHost,
    ) -> Result<Option<Notification>> {
        let Some(data) = data else {
            debug!("Push without payload ignored");
            return Ok(None);
        };

        let payload = Self::parse_payload(data).inspect_err(|e| {
            warn!(error = %e, "Dropping push with malformed payload");
        })?;
        let notification = self.build_notification(payload);
        host.show_notification(notification.clone()).await?;
        info!(title = %notification.title, "Notification shown");
        Ok(Some(notification))
    }

    /// Handle a click on a notification, or on one of its actions
    pub async fn on_notification_click(
        &self,
        action: Option<&str>,
        data: Option<&str>,
        host: &dyn NotificationHost,
    ) -> Result<ClickOutcome> {
        match action {
            None | Some("") | Some(OPEN_ACTION) => {}
            Some(other) => {
                debug!(action = other, "Notification dismissed");
                return Ok(ClickOutcome::Dismissed);
            }
        }

        let target = data
            .filter(|url| !url.is_empty())
            .unwrap_or(&self.config.default_url);

        let windows = host.client_windows().await?;
        if let Some(window) = windows.iter().find(|w| w.url == target) {
            host.focus(&window.id).await?;
            debug!(client = %window.id, url = target, "Focused existing window");
            return Ok(ClickOutcome::Focused(window.id.clone()));
        }

        host.open_window(target).await?;
        debug!(url = target, "Opened new window");
        Ok(ClickOutcome::Opened(target.to_string()))
    }
}


#[cfg(test)]
mod tests {
    use super::test_host::RecordingHost;
    use super::*;

    fn hooks() -> NotificationHooks {
        NotificationHooks::new(NotificationConfig::default())
    }

    #[tokio::test]
    async fn test_push_shows_notification() {
        let host = RecordingHost::default();
        let payload = br#"{"title":"New reply","body":"Olabiba answered","url":"/index-en.html"}"#;

        let shown = hooks().on_push(Some(payload), &host).await.unwrap().unwrap();

        assert_eq!(shown.title, "New reply");
        assert_eq!(shown.body.as_deref(), Some("Olabiba answered"));
        assert_eq!(shown.data.as_deref(), Some("/index-en.html"));
        assert_eq!(shown.actions.len(), 2);
        assert_eq!(shown.actions[0].action, "open");
        assert_eq!(shown.actions[1].action, "close");
        assert_eq!(host.shown.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_push_missing_fields_use_defaults() {
        let host = RecordingHost::default();
        let shown = hooks().on_push(Some(b"{}"), &host).await.unwrap().unwrap();

        assert_eq!(shown.title, "Olabiba");
        assert!(shown.body.is_none());
        assert!(shown.data.is_none());
        assert_eq!(shown.icon, "/assets/img/Characters1.png");
    }

    #[tokio::test]
    async fn test_push_without_data_is_ignored() {
        let host = RecordingHost::default();
        assert!(hooks().on_push(None, &host).await.unwrap().is_none());
        assert!(host.shown.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_push_malformed_payload() {
        let host = RecordingHost::default();
        let err = hooks().on_push(Some(b"not json"), &host).await.unwrap_err();
        assert!(matches!(err, OfflineCacheError::Payload(_)));
        assert!(host.shown.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_click_focuses_existing_window() {
        let host = RecordingHost {
            windows: vec![
                ClientWindow {
                    id: "w1".to_string(),
                    url: "/faq.html".to_string(),
                },
                ClientWindow {
                    id: "w2".to_string(),
                    url: "/index-en.html".to_string(),
                },
            ],
            ..Default::default()
        };

        let outcome = hooks()
            .on_notification_click(Some("open"), Some("/index-en.html"), &host)
            .await
            .unwrap();

        assert_eq!(outcome, ClickOutcome::Focused("w2".to_string()));
        assert_eq!(*host.focused.lock().unwrap(), vec!["w2"]);
        assert!(host.opened.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_default_click_opens_new_window() {
        let host = RecordingHost::default();
        let outcome = hooks()
            .on_notification_click(None, Some("/index-es.html"), &host)
            .await
            .unwrap();

        assert_eq!(outcome, ClickOutcome::Opened("/index-es.html".to_string()));
        assert_eq!(*host.opened.lock().unwrap(), vec!["/index-es.html"]);
    }

    #[tokio::test]
    async fn test_click_without_target_opens_root() {
        let host = RecordingHost::default();
        let outcome = hooks()
            .on_notification_click(Some("open"), None, &host)
            .await
            .unwrap();
        assert_eq!(outcome, ClickOutcome::Opened("/".to_string()));
    }

    #[tokio::test]
    async fn test_close_action_does_nothing() {
        let host = RecordingHost::default();
        let outcome = hooks()
            .on_notification_click(Some("close"), Some("/"), &host)
            .await
            .unwrap();

        assert_eq!(outcome, ClickOutcome::Dismissed);
        assert!(host.opened.lock().unwrap().is_empty());
        assert!(host.focused.lock().unwrap().is_empty());
    }
}
