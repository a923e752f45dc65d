mod cache;
mod config;
mod host;
mod logging;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::io::Write;
use std::path::PathBuf;
use url::Url;

use cache::{CacheStorage, SqliteStorage};
use host::{ConsoleClients, ConsoleNotifier};
use worker::network::{HttpNetwork, Network};
use worker::notification::{ClickOutcome, NotificationClick};
use worker::policy::FetchOutcome;
use worker::types::{Request, RequestMode};
use worker::Worker;

#[derive(Parser, Debug)]
#[command(name = "webinar-sw")]
#[command(about = "Drive the webinar landing page worker from the command line")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/webinar-sw/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Cache database (default: $XDG_DATA_HOME/webinar-sw/caches.db)
  #[arg(long)]
  db: Option<PathBuf>,

  /// Override the cache version from the config file
  #[arg(long)]
  cache_version: Option<String>,

  /// Also write logs to this file
  #[arg(long)]
  log_file: Option<PathBuf>,

  /// Debug logging
  #[arg(short, long)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Pre-cache the asset list
  Install,
  /// Delete caches of earlier versions
  Activate,
  /// Intercept one request and print the response body
  Fetch {
    url: String,
    /// Request mode; `navigate` marks a page navigation
    #[arg(long, value_enum, default_value_t = RequestMode::Cors)]
    mode: RequestMode,
    #[arg(long, default_value = "GET")]
    method: String,
  },
  /// Post a control message: SKIP_WAITING, GET_VERSION, CLEAR_CACHE or raw JSON
  Message { message: String },
  /// Deliver a push message; without data the push carries no payload
  Push { data: Option<String> },
  /// Click a notification
  Click {
    /// Action button, empty for the notification body
    #[arg(long, default_value = "")]
    action: String,
    /// Target URL stored in the notification
    #[arg(long)]
    url: Option<String>,
    /// URL of an open window, may be repeated
    #[arg(long = "window")]
    windows: Vec<Url>,
  },
  /// Fire a background sync
  Sync { tag: String },
  /// List cache stores and their entries
  Caches,
}

type CliWorker = Worker<SqliteStorage, HttpNetwork, ConsoleNotifier, ConsoleClients>;

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = logging::init(args.verbose, args.log_file.as_deref())?;

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  // Override version if specified on command line
  let config = if let Some(cache_version) = args.cache_version {
    config::Config {
      cache_version,
      ..config
    }
  } else {
    config
  };

  let storage = SqliteStorage::open(args.db.as_deref())?;
  let network = HttpNetwork::new(&config.origin)?;
  let windows = match &args.command {
    Command::Click { windows, .. } => windows.clone(),
    _ => Vec::new(),
  };
  let worker: CliWorker = Worker::new(
    config.clone(),
    storage,
    network.clone(),
    ConsoleNotifier,
    ConsoleClients::new(&windows),
  )?;

  match args.command {
    Command::Install => {
      let report = worker.install().await?;
      for url in &report.cached {
        println!("cached {}", url);
      }
      for (url, reason) in &report.failed {
        println!("failed {} ({})", url, reason);
      }
    }
    Command::Activate => {
      for name in worker.activate().await? {
        println!("deleted {}", name);
      }
    }
    Command::Fetch {
      url,
      mode,
      method,
    } => {
      let url = config
        .origin
        .join(&url)
        .map_err(|e| eyre!("Invalid URL {}: {}", url, e))?;
      let request = Request {
        mode,
        ..Request::get(url)
      }
      .with_method(&method);

      let outcome = worker.fetch(&request).await?;
      let source = match outcome.source() {
        Some(source) => format!("{:?}", source),
        None => "Passthrough".to_string(),
      };
      let response = match outcome {
        FetchOutcome::Respond { response, .. } => response,
        FetchOutcome::Passthrough => network.fetch(&request).await?,
      };
      eprintln!(
        "{} {} [{}, {}] {}",
        response.status,
        response.status_text,
        response.response_type,
        source,
        response.header("content-type").unwrap_or("-")
      );
      std::io::stdout()
        .write_all(&response.body)
        .map_err(|e| eyre!("Failed to write response body: {}", e))?;
    }
    Command::Message { message } => {
      let data = if message.trim_start().starts_with('{') {
        serde_json::from_str(&message).map_err(|e| eyre!("Invalid message JSON: {}", e))?
      } else {
        serde_json::json!({ "type": message })
      };

      if let Some(reply) = worker.message(&data).await? {
        println!("{}", serde_json::to_string(&reply)?);
      }
      if worker.skip_waiting_requested() {
        println!("skip waiting requested");
      }
    }
    Command::Push { data } => {
      if worker.push(data.as_deref().map(str::as_bytes)).await?.is_none() {
        println!("push without data ignored");
      }
    }
    Command::Click { action, url, .. } => {
      match worker
        .notification_click(&NotificationClick { action, url })
        .await?
      {
        ClickOutcome::Dismissed => println!("dismissed"),
        ClickOutcome::Focused(_) | ClickOutcome::Opened(_) => {}
      }
    }
    Command::Sync { tag } => {
      if !worker.sync(&tag).await? {
        println!("no handler for sync tag {}", tag);
      }
    }
    Command::Caches => {
      let storage = worker.storage();
      for name in storage.cache_names()? {
        let marker = if name == worker.cache_name() { "*" } else { " " };
        println!("{} {}", marker, name);
        for entry in storage.entries(&name)? {
          println!(
            "    {} {} {}B {}",
            entry.status,
            entry.key,
            entry.size,
            entry.cached_at.format("%Y-%m-%d %H:%M:%S")
          );
        }
      }
    }
  }

  Ok(())
}
