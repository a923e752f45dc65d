use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Prefix shared by every cache store this worker has ever created
  pub cache_prefix: String,
  /// Version part of the current store name
  pub cache_version: String,
  /// Origin the worker is registered on; relative URLs resolve against it
  pub origin: Url,
  /// Assets stored at install time, in order
  pub precache: Vec<String>,
  pub policy: PolicyConfig,
  pub notification: NotificationConfig,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      cache_prefix: "knowledge-arc-webinar-".to_string(),
      cache_version: "v1.0.0".to_string(),
      origin: default_origin(),
      precache: [
        "/",
        "/index.html",
        "/manifest.json",
        "https://cdn.tailwindcss.com",
        "https://cdnjs.cloudflare.com/ajax/libs/lucide/0.263.1/lucide.min.js",
        "https://fonts.googleapis.com/css2?family=Inter:wght@300;400;500;600;700&display=swap",
      ]
      .into_iter()
      .map(String::from)
      .collect(),
      policy: PolicyConfig::default(),
      notification: NotificationConfig::default(),
    }
  }
}

fn default_origin() -> Url {
  Url::parse("http://localhost:8080/").expect("static origin parses")
}

/// Known variants of the fetch policy
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PolicyPreset {
  /// Cache-first everywhere, cache only basic 200 responses
  V1,
  /// Network-first navigations, cache any ok response
  #[default]
  V2,
}

/// How navigation requests are answered
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NavigationStrategy {
  CacheFirst,
  NetworkFirst,
}

/// Which fetched responses are worth storing
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CachePredicate {
  /// Status exactly 200 and a same-origin (basic) response
  BasicOk,
  /// Any 2xx status
  Ok,
}

/// Which failed requests get the fallback document
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FallbackScope {
  Navigation,
  SameOrigin,
}

/// Fetch policy settings. Unset fields take the preset's value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
  pub preset: PolicyPreset,
  pub navigation: Option<NavigationStrategy>,
  pub cache_predicate: Option<CachePredicate>,
  /// Path (or URL) of the cached document served when the network fails
  pub fallback_path: Option<String>,
  pub fallback_on: Option<FallbackScope>,
  /// Host substrings of cross-origin servers whose responses may be cached
  pub cdn_hosts: Option<Vec<String>>,
}

/// Fully resolved fetch policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
  pub navigation: NavigationStrategy,
  pub cache_predicate: CachePredicate,
  pub fallback_path: String,
  pub fallback_on: FallbackScope,
  pub cdn_hosts: Vec<String>,
}

impl Policy {
  pub fn v1() -> Self {
    Self {
      navigation: NavigationStrategy::CacheFirst,
      cache_predicate: CachePredicate::BasicOk,
      fallback_path: "/index.html".to_string(),
      fallback_on: FallbackScope::Navigation,
      cdn_hosts: vec![
        "cdn.".to_string(),
        "googleapis.com".to_string(),
        "cdnjs.cloudflare.com".to_string(),
      ],
    }
  }

  pub fn v2() -> Self {
    let mut cdn_hosts = Self::v1().cdn_hosts;
    cdn_hosts.push("gstatic.com".to_string());

    Self {
      navigation: NavigationStrategy::NetworkFirst,
      cache_predicate: CachePredicate::Ok,
      fallback_path: "/".to_string(),
      fallback_on: FallbackScope::SameOrigin,
      cdn_hosts,
    }
  }
}

impl PolicyConfig {
  pub fn resolve(&self) -> Policy {
    let base = match self.preset {
      PolicyPreset::V1 => Policy::v1(),
      PolicyPreset::V2 => Policy::v2(),
    };

    Policy {
      navigation: self.navigation.unwrap_or(base.navigation),
      cache_predicate: self.cache_predicate.unwrap_or(base.cache_predicate),
      fallback_path: self.fallback_path.clone().unwrap_or(base.fallback_path),
      fallback_on: self.fallback_on.unwrap_or(base.fallback_on),
      cdn_hosts: self.cdn_hosts.clone().unwrap_or(base.cdn_hosts),
    }
  }
}

/// Defaults applied to push notifications
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
  pub title: String,
  pub body: String,
  pub url: String,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
  pub view_title: String,
  pub view_icon: String,
  pub dismiss_title: String,
}

impl Default for NotificationConfig {
  fn default() -> Self {
    Self {
      title: "Knowledge ARC 웨비나".to_string(),
      body: "웨비나에 대한 새로운 정보가 있습니다.".to_string(),
      url: "/".to_string(),
      icon: "/icons/icon-192x192.png".to_string(),
      badge: "/icons/icon-72x72.png".to_string(),
      vibrate: vec![200, 100, 200],
      view_title: "보기".to_string(),
      view_icon: "/icons/icon-96x96.png".to_string(),
      dismiss_title: "닫기".to_string(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided (must exist)
  /// 2. ./webinar-sw.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/webinar-sw/config.yaml
  ///
  /// Without any file the built-in defaults are used.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("webinar-sw.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("webinar-sw").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;
    Ok(config)
  }

  /// Name of the current cache store, e.g. `knowledge-arc-webinar-v1.0.0`
  pub fn cache_name(&self) -> String {
    format!("{}{}", self.cache_prefix, self.cache_version)
  }
}
