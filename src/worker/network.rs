//! The single network attempt behind every cache miss.

use color_eyre::{eyre::eyre, Result};
use std::future::Future;
use url::{Origin, Url};

use super::types::{Request, Response, ResponseType};

/// Performs one network fetch. Errors mean the network failed; HTTP error
/// statuses are returned as responses.
pub trait Network: Send + Sync {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send;
}

/// Network access backed by reqwest
#[derive(Clone)]
pub struct HttpNetwork {
  client: reqwest::Client,
  origin: Origin,
}

impl HttpNetwork {
  /// `origin` decides which responses are typed `basic` and which `cors`.
  pub fn new(origin: &Url) -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("webinar-sw/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self::with_client(client, origin))
  }

  pub fn with_client(client: reqwest::Client, origin: &Url) -> Self {
    Self {
      client,
      origin: origin.origin(),
    }
  }
}

impl Network for HttpNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let method = reqwest::Method::from_bytes(request.method.as_bytes())
      .map_err(|e| eyre!("Invalid method {}: {}", request.method, e))?;

    let response = self
      .client
      .request(method, request.url.clone())
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", request.url, e))?;

    let url = response.url().clone();
    let status = response.status();
    let response_type = if url.origin() == self.origin {
      ResponseType::Basic
    } else {
      ResponseType::Cors
    };
    let headers = response
      .headers()
      .iter()
      .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body of {}: {}", url, e))?;

    Ok(Response {
      url: url.to_string(),
      status: status.as_u16(),
      status_text: status.canonical_reason().unwrap_or_default().to_string(),
      response_type,
      headers,
      body: body.to_vec(),
    })
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use tokio::io::{AsyncReadExt, AsyncWriteExt};
  use tokio::net::TcpListener;

  fn network(origin: &Url) -> HttpNetwork {
    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    HttpNetwork::with_client(client, origin)
  }

  /// Serve `/ok` with 200 and anything else with 404 until the test ends.
  async fn serve() -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
      loop {
        let Ok((mut socket, _)) = listener.accept().await else {
          break;
        };
        tokio::spawn(async move {
          let mut buf = Vec::new();
          let mut chunk = [0u8; 1024];
          while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
            match socket.read(&mut chunk).await {
              Ok(0) | Err(_) => return,
              Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
          }

          let head = String::from_utf8_lossy(&buf);
          let (status, body) = if head.starts_with("GET /ok ") {
            ("200 OK", "hello")
          } else {
            ("404 Not Found", "missing")
          };
          let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
          );
          let _ = socket.write_all(response.as_bytes()).await;
          let _ = socket.shutdown().await;
        });
      }
    });

    Url::parse(&format!("http://{}/", addr)).unwrap()
  }

  #[tokio::test]
  async fn test_same_origin_response_is_basic() {
    let origin = serve().await;
    let network = network(&origin);

    let response = network
      .fetch(&Request::get(origin.join("/ok").unwrap()))
      .await
      .unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.response_type, ResponseType::Basic);
    assert_eq!(response.body, b"hello");
    assert_eq!(response.header("content-type"), Some("text/plain"));
  }

  #[tokio::test]
  async fn test_cross_origin_response_is_cors() {
    let server = serve().await;
    let network = network(&Url::parse("https://webinar.example.com/").unwrap());

    let response = network
      .fetch(&Request::get(server.join("/ok").unwrap()))
      .await
      .unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.response_type, ResponseType::Cors);
  }

  #[tokio::test]
  async fn test_error_status_is_a_response() {
    let origin = serve().await;
    let network = network(&origin);

    let response = network
      .fetch(&Request::get(origin.join("/gone").unwrap()))
      .await
      .unwrap();
    assert_eq!(response.status, 404);
    assert!(!response.ok());
    assert_eq!(response.status_text, "Not Found");
    assert_eq!(response.body, b"missing");
  }

  #[tokio::test]
  async fn test_connection_refused_is_an_error() {
    // Bind and drop to find a port nothing listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let origin = Url::parse(&format!("http://{}/", addr)).unwrap();
    let network = network(&origin);
    assert!(network.fetch(&Request::get(origin)).await.is_err());
  }

  #[test]
  fn test_default_client_builds() {
    let origin = Url::parse("https://webinar.example.com/").unwrap();
    assert!(HttpNetwork::new(&origin).is_ok());
  }
}
