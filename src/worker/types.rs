use clap::ValueEnum;
use color_eyre::{eyre::eyre, Result};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Request mode as seen by the fetch handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum RequestMode {
  /// Top-level document navigation
  Navigate,
  SameOrigin,
  #[default]
  Cors,
  NoCors,
}

/// An intercepted request
#[derive(Debug, Clone)]
pub struct Request {
  pub url: Url,
  pub method: String,
  pub mode: RequestMode,
}

impl Request {
  pub fn get(url: Url) -> Self {
    Self {
      url,
      method: "GET".to_string(),
      mode: RequestMode::default(),
    }
  }

  pub fn navigate(url: Url) -> Self {
    Self {
      mode: RequestMode::Navigate,
      ..Self::get(url)
    }
  }

  pub fn with_method(mut self, method: &str) -> Self {
    self.method = method.to_uppercase();
    self
  }

  pub fn is_get(&self) -> bool {
    self.method.eq_ignore_ascii_case("GET")
  }

  pub fn is_navigation(&self) -> bool {
    self.mode == RequestMode::Navigate
  }

  /// Key under which responses for this request are stored.
  pub fn cache_key(&self) -> String {
    cache_key(&self.url)
  }
}

/// Cache keys ignore the fragment, everything else is significant.
pub fn cache_key(url: &Url) -> String {
  let mut url = url.clone();
  url.set_fragment(None);
  url.to_string()
}

/// Response type, mirroring what the platform reports for a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
  /// Same-origin response
  Basic,
  /// Cross-origin response with CORS headers
  Cors,
  /// Cross-origin no-cors response, status is always 0
  Opaque,
  /// Network error
  Error,
}

impl ResponseType {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Basic => "basic",
      Self::Cors => "cors",
      Self::Opaque => "opaque",
      Self::Error => "error",
    }
  }
}

impl fmt::Display for ResponseType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ResponseType {
  type Err = color_eyre::Report;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "basic" => Ok(Self::Basic),
      "cors" => Ok(Self::Cors),
      "opaque" => Ok(Self::Opaque),
      "error" => Ok(Self::Error),
      other => Err(eyre!("Unknown response type: {}", other)),
    }
  }
}

/// A response, either live from the network or read back from a cache store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub url: String,
  pub status: u16,
  pub status_text: String,
  pub response_type: ResponseType,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Response {
  /// Status in the 200-299 range
  pub fn ok(&self) -> bool {
    (200..=299).contains(&self.status)
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }
}
