//! Response cache policy for intercepted fetches.
//!
//! Decides, per request, between answering from a cache store, going to the
//! network, or serving the fallback document:
//! - navigations under `network_first` try the network and fall back to the
//!   cached document, never storing the live response
//! - everything else is cache-first: a hit is returned as is, a miss is
//!   fetched and stored when the cache predicate accepts it
//! - requests outside the worker's scope are passed through untouched

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tracing::{debug, error, warn};
use url::{Origin, Url};

use super::network::Network;
use super::types::{cache_key, Request, Response, ResponseType};
use crate::cache::CacheStorage;
use crate::config::{CachePredicate, FallbackScope, NavigationStrategy, Policy};

/// Where a response handed back to the page came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Previously stored response
  Cache,
  /// Live network response
  Network,
  /// Cached fallback document after a network failure
  Fallback,
}

/// What the fetch handler does with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
  /// Not ours; the host handles the request as if no worker existed
  Passthrough,
  Respond {
    response: Response,
    source: ResponseSource,
  },
}

impl FetchOutcome {
  fn respond(response: Response, source: ResponseSource) -> Self {
    Self::Respond { response, source }
  }

  pub fn response(&self) -> Option<&Response> {
    match self {
      Self::Passthrough => None,
      Self::Respond { response, .. } => Some(response),
    }
  }

  pub fn source(&self) -> Option<ResponseSource> {
    match self {
      Self::Passthrough => None,
      Self::Respond { source, .. } => Some(*source),
    }
  }
}

/// Cache policy bound to one cache store name.
pub struct ResponseCachePolicy<S: CacheStorage, N: Network> {
  storage: Arc<S>,
  network: Arc<N>,
  policy: Policy,
  cache_name: String,
  origin: Origin,
  fallback_key: String,
}

impl<S: CacheStorage, N: Network> ResponseCachePolicy<S, N> {
  pub fn new(
    storage: Arc<S>,
    network: Arc<N>,
    policy: Policy,
    cache_name: String,
    origin: &Url,
  ) -> Result<Self> {
    let fallback_url = origin
      .join(&policy.fallback_path)
      .map_err(|e| eyre!("Invalid fallback path {}: {}", policy.fallback_path, e))?;

    Ok(Self {
      storage,
      network,
      fallback_key: cache_key(&fallback_url),
      policy,
      cache_name,
      origin: origin.origin(),
    })
  }

  pub fn is_same_origin(&self, url: &Url) -> bool {
    url.origin() == self.origin
  }

  /// Host matches one of the allow-listed CDN substrings.
  pub fn is_allowed_cdn(&self, url: &Url) -> bool {
    let host = url.host_str().unwrap_or_default();
    self.policy.cdn_hosts.iter().any(|cdn| host.contains(cdn.as_str()))
  }

  /// Whether the fetch handler takes over this request at all.
  pub fn intercepts(&self, request: &Request) -> bool {
    request.is_get() && (self.is_same_origin(&request.url) || self.is_allowed_cdn(&request.url))
  }

  /// Whether a live response gets stored.
  pub fn should_cache(&self, response: &Response) -> bool {
    match self.policy.cache_predicate {
      CachePredicate::BasicOk => {
        response.status == 200 && response.response_type == ResponseType::Basic
      }
      CachePredicate::Ok => response.ok(),
    }
  }

  fn fallback_applies(&self, request: &Request) -> bool {
    match self.policy.fallback_on {
      FallbackScope::Navigation => request.is_navigation(),
      FallbackScope::SameOrigin => self.is_same_origin(&request.url),
    }
  }

  /// Answer an intercepted request.
  pub async fn handle(&self, request: &Request) -> Result<FetchOutcome> {
    if !self.intercepts(request) {
      debug!(url = %request.url, method = %request.method, "Passing request through");
      return Ok(FetchOutcome::Passthrough);
    }

    if request.is_navigation() && self.policy.navigation == NavigationStrategy::NetworkFirst {
      return self.network_first(request).await;
    }

    self.cache_first(request).await
  }

  async fn network_first(&self, request: &Request) -> Result<FetchOutcome> {
    match self.network.fetch(request).await {
      Ok(response) => Ok(FetchOutcome::respond(response, ResponseSource::Network)),
      Err(e) => {
        warn!(url = %request.url, "Navigation fetch failed, serving fallback: {}", e);
        self.fallback(e)
      }
    }
  }

  async fn cache_first(&self, request: &Request) -> Result<FetchOutcome> {
    if let Some(cached) = self.storage.match_any(&request.cache_key())? {
      debug!(url = %request.url, "Serving from cache");
      return Ok(FetchOutcome::respond(cached, ResponseSource::Cache));
    }

    match self.network.fetch(request).await {
      Ok(response) => {
        if self.should_cache(&response) {
          // A failed write must not cost the page its response
          if let Err(e) = self
            .storage
            .put(&self.cache_name, &request.cache_key(), &response)
          {
            error!(url = %request.url, "Failed to cache response: {}", e);
          }
        }
        Ok(FetchOutcome::respond(response, ResponseSource::Network))
      }
      Err(e) => {
        error!(url = %request.url, "Fetch failed: {}", e);
        if self.fallback_applies(request) {
          self.fallback(e)
        } else {
          Err(e)
        }
      }
    }
  }

  fn fallback(&self, cause: color_eyre::Report) -> Result<FetchOutcome> {
    match self.storage.match_any(&self.fallback_key)? {
      Some(document) => Ok(FetchOutcome::respond(document, ResponseSource::Fallback)),
      None => Err(eyre!(
        "Fallback document {} is not cached ({})",
        self.fallback_key,
        cause
      )),
    }
  }
}
