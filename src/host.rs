//! Console stand-ins for the browser's notification and window APIs.
//!
//! The command-line host has no notification tray and no windows, so these
//! print what the platform would have done.

use color_eyre::{eyre::eyre, Result};
use tracing::info;
use url::Url;

use crate::worker::notification::{
  Clients, NotificationClick, NotificationPayload, Notifier, WindowClient,
};

/// Prints notifications as JSON on stdout
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
  async fn show(&self, notification: &NotificationPayload) -> Result<()> {
    let json = serde_json::to_string_pretty(notification)
      .map_err(|e| eyre!("Failed to serialize notification: {}", e))?;
    println!("{}", json);
    Ok(())
  }

  fn close(&self, click: &NotificationClick) -> Result<()> {
    info!(action = %click.action, "Notification closed");
    Ok(())
  }
}

/// Windows given on the command line
#[derive(Debug, Default)]
pub struct ConsoleClients {
  windows: Vec<WindowClient>,
}

impl ConsoleClients {
  pub fn new(urls: &[Url]) -> Self {
    let windows = urls
      .iter()
      .enumerate()
      .map(|(i, url)| WindowClient {
        id: format!("window-{}", i + 1),
        url: url.to_string(),
      })
      .collect();

    Self { windows }
  }
}

impl Clients for ConsoleClients {
  async fn windows(&self) -> Result<Vec<WindowClient>> {
    Ok(self.windows.clone())
  }

  async fn focus(&self, client: &WindowClient) -> Result<()> {
    println!("focus {} {}", client.id, client.url);
    Ok(())
  }

  async fn open_window(&self, url: &Url) -> Result<()> {
    println!("open {}", url);
    Ok(())
  }

  async fn claim(&self) -> Result<()> {
    info!("Claimed clients");
    Ok(())
  }
}
