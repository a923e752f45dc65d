//! The landing page worker: one handler per lifecycle event.
//!
//! Host side effects (cache stores, network, notifications, window clients)
//! are injected, so every handler can run outside a browser.

pub mod message;
pub mod network;
pub mod notification;
pub mod policy;
pub mod types;

use color_eyre::{eyre::eyre, Result};
use futures::future::join_all;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};
use url::Url;

use crate::cache::CacheStorage;
use crate::config::Config;
use message::{ControlMessage, ControlReply};
use network::Network;
use notification::{
  focus_or_open, ClickOutcome, Clients, NotificationClick, NotificationPayload, Notifier,
  PushMessage,
};
use policy::{FetchOutcome, ResponseCachePolicy};
use types::{cache_key, Request};

/// Background-sync tag for offline registrations
pub const REGISTRATION_SYNC_TAG: &str = "webinar-registration";

/// Result of pre-caching the asset list
#[derive(Debug, Default)]
pub struct InstallReport {
  pub cached: Vec<String>,
  pub failed: Vec<(String, String)>,
}

pub struct Worker<S: CacheStorage, N: Network, P: Notifier, C: Clients> {
  config: Config,
  cache_name: String,
  storage: Arc<S>,
  network: Arc<N>,
  policy: ResponseCachePolicy<S, N>,
  notifier: P,
  clients: C,
  skip_waiting: AtomicBool,
}

impl<S: CacheStorage, N: Network, P: Notifier, C: Clients> Worker<S, N, P, C> {
  pub fn new(config: Config, storage: S, network: N, notifier: P, clients: C) -> Result<Self> {
    let storage = Arc::new(storage);
    let network = Arc::new(network);
    let cache_name = config.cache_name();
    let policy = ResponseCachePolicy::new(
      Arc::clone(&storage),
      Arc::clone(&network),
      config.policy.resolve(),
      cache_name.clone(),
      &config.origin,
    )?;

    Ok(Self {
      config,
      cache_name,
      storage,
      network,
      policy,
      notifier,
      clients,
      skip_waiting: AtomicBool::new(false),
    })
  }

  pub fn cache_name(&self) -> &str {
    &self.cache_name
  }

  pub fn storage(&self) -> &S {
    &self.storage
  }

  /// Whether install or a SKIP_WAITING message asked to activate right away.
  pub fn skip_waiting_requested(&self) -> bool {
    self.skip_waiting.load(Ordering::SeqCst)
  }

  fn resolve(&self, url: &str) -> Result<Url> {
    self
      .config
      .origin
      .join(url)
      .map_err(|e| eyre!("Invalid URL {}: {}", url, e))
  }

  /// Pre-cache the asset list. Individual failures are logged and skipped.
  pub async fn install(&self) -> Result<InstallReport> {
    info!(cache = %self.cache_name, "Service worker installing");
    self.storage.open_cache(&self.cache_name)?;

    let mut report = InstallReport::default();
    let mut requests = Vec::new();
    for asset in &self.config.precache {
      match self.resolve(asset) {
        Ok(url) => requests.push(Request::get(url)),
        Err(e) => report.failed.push((asset.clone(), e.to_string())),
      }
    }

    let responses = join_all(requests.iter().map(|r| self.network.fetch(r))).await;

    for (request, response) in requests.iter().zip(responses) {
      let key = cache_key(&request.url);
      let stored = response.and_then(|response| {
        if !response.ok() {
          return Err(eyre!("Bad status {} for {}", response.status, key));
        }
        self.storage.put(&self.cache_name, &key, &response)
      });

      match stored {
        Ok(()) => report.cached.push(key),
        Err(e) => {
          error!(url = %key, "Cache installation failed: {}", e);
          report.failed.push((key, e.to_string()));
        }
      }
    }

    info!(
      cached = report.cached.len(),
      failed = report.failed.len(),
      "Cached static resources"
    );
    self.skip_waiting.store(true, Ordering::SeqCst);
    Ok(report)
  }

  /// Delete stores left behind by earlier versions and claim open pages.
  pub async fn activate(&self) -> Result<Vec<String>> {
    info!(cache = %self.cache_name, "Service worker activating");

    let stale: Vec<String> = self
      .storage
      .cache_names()?
      .into_iter()
      .filter(|name| name.starts_with(&self.config.cache_prefix) && *name != self.cache_name)
      .collect();

    for name in &stale {
      info!(cache = %name, "Deleting old cache");
      self.storage.delete_cache(name)?;
    }

    self.clients.claim().await?;
    Ok(stale)
  }

  pub async fn fetch(&self, request: &Request) -> Result<FetchOutcome> {
    self.policy.handle(request).await
  }

  /// Handle a control message. Returns the reply to post back, if any.
  pub async fn message(&self, data: &Value) -> Result<Option<ControlReply>> {
    let Some(message) = ControlMessage::parse(data) else {
      warn!("Ignoring unrecognised message: {}", data);
      return Ok(None);
    };

    match message {
      ControlMessage::SkipWaiting => {
        self.skip_waiting.store(true, Ordering::SeqCst);
        Ok(None)
      }
      ControlMessage::GetVersion => Ok(Some(ControlReply::Version {
        version: self.cache_name.clone(),
      })),
      ControlMessage::ClearCache => {
        self.storage.delete_cache(&self.cache_name)?;
        info!(cache = %self.cache_name, "Cleared cache");
        Ok(Some(ControlReply::Cleared { success: true }))
      }
    }
  }

  /// Show a notification for a push message. Pushes without data are ignored.
  pub async fn push(&self, data: Option<&[u8]>) -> Result<Option<NotificationPayload>> {
    let Some(data) = data else {
      return Ok(None);
    };

    let message = PushMessage::from_json(data)?;
    let payload = NotificationPayload::from_push(message, &self.config.notification);
    self.notifier.show(&payload).await?;
    Ok(Some(payload))
  }

  pub async fn notification_click(&self, click: &NotificationClick) -> Result<ClickOutcome> {
    self.notifier.close(click)?;

    if click.is_dismiss() {
      return Ok(ClickOutcome::Dismissed);
    }

    let target = click
      .url
      .as_deref()
      .unwrap_or(self.config.notification.url.as_str());
    let target = self.resolve(target)?;
    focus_or_open(&self.clients, target).await
  }

  /// Background sync. Returns whether the tag was recognised.
  pub async fn sync(&self, tag: &str) -> Result<bool> {
    if tag != REGISTRATION_SYNC_TAG {
      return Ok(false);
    }

    // TODO: replay registrations queued while offline once the registration backend exposes an endpoint
    info!("Handling webinar registration sync");
    Ok(true)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::SqliteStorage;
  use network::fake::FakeNetwork;
  use notification::fake::{FakeClients, RecordingNotifier};
  use policy::ResponseSource;
  use serde_json::json;
  use types::ResponseType;

  type TestWorker = Worker<SqliteStorage, Arc<FakeNetwork>, RecordingNotifier, FakeClients>;

  impl Network for Arc<FakeNetwork> {
    async fn fetch(&self, request: &Request) -> Result<types::Response> {
      (**self).fetch(request).await
    }
  }

  fn config(version: &str) -> Config {
    Config {
      cache_version: version.to_string(),
      origin: Url::parse("https://webinar.example.com/").unwrap(),
      precache: vec![
        "/".to_string(),
        "/index.html".to_string(),
        "https://cdn.tailwindcss.com".to_string(),
      ],
      ..Config::default()
    }
  }

  fn online_network() -> Arc<FakeNetwork> {
    let network = Arc::new(FakeNetwork::new());
    network.route("https://webinar.example.com/", 200, ResponseType::Basic, "home");
    network.route(
      "https://webinar.example.com/index.html",
      200,
      ResponseType::Basic,
      "index",
    );
    network.route("https://cdn.tailwindcss.com/", 200, ResponseType::Cors, "tw");
    network
  }

  fn worker_with(config: Config, storage: SqliteStorage, network: Arc<FakeNetwork>) -> TestWorker {
    Worker::new(
      config,
      storage,
      network,
      RecordingNotifier::default(),
      FakeClients::default(),
    )
    .unwrap()
  }

  fn worker(network: Arc<FakeNetwork>) -> TestWorker {
    worker_with(
      config("v1.0.0"),
      SqliteStorage::open_in_memory().unwrap(),
      network,
    )
  }

  #[tokio::test]
  async fn test_install_caches_every_asset() {
    let worker = worker(online_network());
    let report = worker.install().await.unwrap();

    assert!(report.failed.is_empty());
    let keys: Vec<_> = worker
      .storage()
      .entries(worker.cache_name())
      .unwrap()
      .into_iter()
      .map(|e| e.key)
      .collect();
    assert_eq!(keys.len(), 3);
    assert!(keys.contains(&"https://cdn.tailwindcss.com/".to_string()));
    assert!(worker.skip_waiting_requested());
  }

  #[tokio::test]
  async fn test_install_survives_failed_cdn() {
    let network = online_network();
    network.unroute("https://cdn.tailwindcss.com/");
    let worker = worker(network);

    let report = worker.install().await.unwrap();
    assert_eq!(report.cached.len(), 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "https://cdn.tailwindcss.com/");
  }

  #[tokio::test]
  async fn test_install_skips_error_status() {
    let network = online_network();
    network.route(
      "https://webinar.example.com/index.html",
      500,
      ResponseType::Basic,
      "boom",
    );
    let worker = worker(network);

    let report = worker.install().await.unwrap();
    assert_eq!(report.failed.len(), 1);
    assert!(worker
      .storage()
      .match_any("https://webinar.example.com/index.html")
      .unwrap()
      .is_none());
  }

  #[tokio::test]
  async fn test_installed_assets_served_offline() {
    let network = online_network();
    let worker = worker(network.clone());
    worker.install().await.unwrap();
    network.go_offline();
    let calls_before = network.calls().len();

    let url = Url::parse("https://webinar.example.com/index.html").unwrap();
    let outcome = worker.fetch(&Request::get(url)).await.unwrap();
    assert_eq!(outcome.source(), Some(ResponseSource::Cache));
    assert_eq!(outcome.response().unwrap().body, b"index");
    assert_eq!(network.calls().len(), calls_before);

    let page = Url::parse("https://webinar.example.com/speakers").unwrap();
    let outcome = worker.fetch(&Request::navigate(page)).await.unwrap();
    assert_eq!(outcome.source(), Some(ResponseSource::Fallback));
    assert_eq!(outcome.response().unwrap().body, b"home");
  }

  #[tokio::test]
  async fn test_activate_prunes_old_versions_only() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.open_cache("knowledge-arc-webinar-v0.9.0").unwrap();
    storage.open_cache("knowledge-arc-webinar-v0.8.0").unwrap();
    storage.open_cache("unrelated-app-v1").unwrap();

    let worker = worker_with(config("v1.0.0"), storage, online_network());
    worker.install().await.unwrap();
    let mut deleted = worker.activate().await.unwrap();
    deleted.sort();

    assert_eq!(
      deleted,
      vec!["knowledge-arc-webinar-v0.8.0", "knowledge-arc-webinar-v0.9.0"]
    );
    assert_eq!(
      worker.storage().cache_names().unwrap(),
      vec!["unrelated-app-v1", "knowledge-arc-webinar-v1.0.0"]
    );
    assert_eq!(*worker.clients.claims.lock().unwrap(), 1);
  }

  #[tokio::test]
  async fn test_versions_are_injected() {
    for version in ["v1.0.0", "v2.0.0"] {
      let worker = worker_with(
        config(version),
        SqliteStorage::open_in_memory().unwrap(),
        online_network(),
      );
      let reply = worker.message(&json!({"type": "GET_VERSION"})).await.unwrap();
      assert_eq!(
        reply,
        Some(ControlReply::Version {
          version: format!("knowledge-arc-webinar-{}", version)
        })
      );
    }
  }

  #[tokio::test]
  async fn test_clear_cache() {
    let worker = worker(online_network());
    worker.install().await.unwrap();

    let reply = worker.message(&json!({"type": "CLEAR_CACHE"})).await.unwrap();
    assert_eq!(reply, Some(ControlReply::Cleared { success: true }));
    assert!(worker.storage().entries(worker.cache_name()).unwrap().is_empty());
    assert!(worker
      .storage()
      .match_in(worker.cache_name(), "https://webinar.example.com/")
      .unwrap()
      .is_none());
  }

  #[tokio::test]
  async fn test_skip_waiting_and_unknown_messages() {
    let worker = worker(online_network());
    assert!(!worker.skip_waiting_requested());

    assert_eq!(worker.message(&json!({"type": "NOPE"})).await.unwrap(), None);
    assert!(!worker.skip_waiting_requested());

    assert_eq!(
      worker.message(&json!({"type": "SKIP_WAITING"})).await.unwrap(),
      None
    );
    assert!(worker.skip_waiting_requested());
  }

  #[tokio::test]
  async fn test_push_and_click_round_trip() {
    let worker = worker(online_network());
    let payload = worker
      .push(Some(br#"{"title":"T","body":"B","url":"/x"}"#.as_slice()))
      .await
      .unwrap()
      .unwrap();
    assert_eq!(worker.notifier.shown.lock().unwrap().len(), 1);

    let click = NotificationClick {
      action: "view".to_string(),
      url: Some(payload.data.url),
    };
    let outcome = worker.notification_click(&click).await.unwrap();
    assert_eq!(
      outcome,
      ClickOutcome::Opened(Url::parse("https://webinar.example.com/x").unwrap())
    );
    assert_eq!(*worker.notifier.closed.lock().unwrap(), 1);
  }

  #[tokio::test]
  async fn test_click_focuses_matching_window() {
    let worker = Worker::new(
      config("v1.0.0"),
      SqliteStorage::open_in_memory().unwrap(),
      online_network(),
      RecordingNotifier::default(),
      FakeClients::with_window("w7", "https://webinar.example.com/x"),
    )
    .unwrap();

    let click = NotificationClick {
      action: String::new(),
      url: Some("/x".to_string()),
    };
    let outcome = worker.notification_click(&click).await.unwrap();
    assert!(matches!(outcome, ClickOutcome::Focused(ref w) if w.id == "w7"));
  }

  #[tokio::test]
  async fn test_dismiss_only_closes() {
    let worker = worker(online_network());
    let click = NotificationClick {
      action: "dismiss".to_string(),
      url: Some("/x".to_string()),
    };

    assert_eq!(
      worker.notification_click(&click).await.unwrap(),
      ClickOutcome::Dismissed
    );
    assert_eq!(*worker.notifier.closed.lock().unwrap(), 1);
    assert!(worker.clients.opened.lock().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_push_without_data_or_fields() {
    let worker = worker(online_network());
    assert!(worker.push(None).await.unwrap().is_none());
    assert!(worker.notifier.shown.lock().unwrap().is_empty());

    let payload = worker.push(Some(b"{}".as_slice())).await.unwrap().unwrap();
    assert_eq!(payload.title, "Knowledge ARC 웨비나");
    assert_eq!(payload.data.url, "/");

    let outcome = worker
      .notification_click(&NotificationClick::default())
      .await
      .unwrap();
    assert_eq!(
      outcome,
      ClickOutcome::Opened(Url::parse("https://webinar.example.com/").unwrap())
    );
  }

  #[tokio::test]
  async fn test_sync_tags() {
    let worker = worker(online_network());
    assert!(worker.sync(REGISTRATION_SYNC_TAG).await.unwrap());
    assert!(!worker.sync("something-else").await.unwrap());
  }
}
