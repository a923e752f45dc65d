//! Push notification payloads and click routing.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use url::Url;

use crate::config::NotificationConfig;

/// Data carried by a push message; every field is optional.
///
/// Empty, `null`, `false` and zero values count as missing. Other scalars are
/// shown as text, so `{"title": 5}` has the title `5`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushMessage {
  #[serde(default, deserialize_with = "deserialize_text")]
  pub title: Option<String>,
  #[serde(default, deserialize_with = "deserialize_text")]
  pub body: Option<String>,
  #[serde(default, deserialize_with = "deserialize_text")]
  pub url: Option<String>,
}

fn deserialize_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  let value: Option<Value> = Option::deserialize(deserializer)?;
  Ok(value.and_then(present_text))
}

fn present_text(value: Value) -> Option<String> {
  match value {
    Value::Null | Value::Bool(false) => None,
    Value::Bool(true) => Some("true".to_string()),
    Value::Number(n) if n.as_f64() == Some(0.0) => None,
    Value::Number(n) => Some(n.to_string()),
    Value::String(s) if s.is_empty() => None,
    Value::String(s) => Some(s),
    // Arrays and objects are shown as their JSON text
    other => Some(other.to_string()),
  }
}

impl PushMessage {
  pub fn from_json(data: &[u8]) -> Result<Self> {
    serde_json::from_slice(data).map_err(|e| eyre!("Failed to parse push data: {}", e))
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub icon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationData {
  pub url: String,
}

/// Notification handed to the platform for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationPayload {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
  pub data: NotificationData,
  pub actions: Vec<NotificationAction>,
}

impl NotificationPayload {
  /// Fill missing push fields from the configured defaults.
  pub fn from_push(message: PushMessage, defaults: &NotificationConfig) -> Self {
    Self {
      title: message.title.unwrap_or_else(|| defaults.title.clone()),
      body: message.body.unwrap_or_else(|| defaults.body.clone()),
      icon: defaults.icon.clone(),
      badge: defaults.badge.clone(),
      vibrate: defaults.vibrate.clone(),
      data: NotificationData {
        url: message.url.unwrap_or_else(|| defaults.url.clone()),
      },
      actions: vec![
        NotificationAction {
          action: "view".to_string(),
          title: defaults.view_title.clone(),
          icon: Some(defaults.view_icon.clone()),
        },
        NotificationAction {
          action: "dismiss".to_string(),
          title: defaults.dismiss_title.clone(),
          icon: None,
        },
      ],
    }
  }
}

/// Click on a displayed notification
#[derive(Debug, Clone, Default)]
pub struct NotificationClick {
  /// Empty for a click on the notification body
  pub action: String,
  /// Target URL stored in the notification's data
  pub url: Option<String>,
}

impl NotificationClick {
  pub fn is_dismiss(&self) -> bool {
    self.action == "dismiss"
  }
}

/// An open window controlled by the worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowClient {
  pub id: String,
  pub url: String,
}

/// What a notification click ended up doing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
  Dismissed,
  Focused(WindowClient),
  Opened(Url),
}

/// Displays and closes notifications.
pub trait Notifier: Send + Sync {
  fn show(&self, notification: &NotificationPayload) -> impl Future<Output = Result<()>> + Send;

  fn close(&self, click: &NotificationClick) -> Result<()>;
}

/// Window clients of the worker.
pub trait Clients: Send + Sync {
  fn windows(&self) -> impl Future<Output = Result<Vec<WindowClient>>> + Send;

  fn focus(&self, client: &WindowClient) -> impl Future<Output = Result<()>> + Send;

  fn open_window(&self, url: &Url) -> impl Future<Output = Result<()>> + Send;

  /// Take control of pages that loaded before this worker activated.
  fn claim(&self) -> impl Future<Output = Result<()>> + Send;
}

/// Focus a window already showing `target`, or open one.
pub async fn focus_or_open<C: Clients>(clients: &C, target: Url) -> Result<ClickOutcome> {
  let windows = clients.windows().await?;

  if let Some(window) = windows.into_iter().find(|w| {
    Url::parse(&w.url)
      .map(|u| u == target)
      .unwrap_or(false)
  }) {
    clients.focus(&window).await?;
    return Ok(ClickOutcome::Focused(window));
  }

  clients.open_window(&target).await?;
  Ok(ClickOutcome::Opened(target))
}
