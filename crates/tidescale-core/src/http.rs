//! Minimal HTTP/1 client over hyper.
//!
//! Each request opens a fresh TCP connection, performs the hyper
//! handshake, and drives the connection on a background task. Only plain
//! `http://` endpoints are supported; TLS is expected to be terminated by
//! a sidecar or `kubectl proxy`. Callers bound every request with
//! `tokio::time::timeout`.

use bytes::Bytes;
use http::{Method, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use thiserror::Error;
use tracing::debug;

const USER_AGENT: &str = concat!("tidescale/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("failed to read body: {0}")]
    Body(String),
}

/// A buffered HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

/// A base URL (`http://host:port/prefix`) requests are issued against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpEndpoint {
    authority: String,
    base_path: String,
}

impl HttpEndpoint {
    pub fn parse(url: &str) -> Result<Self, HttpError> {
        let uri: Uri = url
            .trim()
            .parse()
            .map_err(|e| HttpError::InvalidUrl(format!("{url}: {e}")))?;

        match uri.scheme_str() {
            Some("http") => {}
            Some(other) => {
                return Err(HttpError::InvalidUrl(format!(
                    "{url}: unsupported scheme {other:?}, only http is supported"
                )));
            }
            None => return Err(HttpError::InvalidUrl(format!("{url}: missing scheme"))),
        }

        let authority = uri
            .authority()
            .ok_or_else(|| HttpError::InvalidUrl(format!("{url}: missing host")))?;
        let port = authority.port_u16().unwrap_or(80);

        Ok(Self {
            authority: format!("{}:{port}", authority.host()),
            base_path: uri.path().trim_end_matches('/').to_string(),
        })
    }

    /// `host:port` this endpoint connects to.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Join a path (and query) onto the endpoint's base path.
    pub fn path(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base_path, path_and_query)
    }

    /// Send a request and buffer the full response body.
    pub async fn send(
        &self,
        method: Method,
        path_and_query: &str,
        headers: &[(&str, &str)],
        body: Option<Bytes>,
    ) -> Result<HttpResponse, HttpError> {
        let target = self.path(path_and_query);

        let stream = tokio::net::TcpStream::connect(&self.authority)
            .await
            .map_err(|e| HttpError::Connect(format!("{}: {e}", self.authority)))?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| HttpError::Handshake(e.to_string()))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "http connection closed with error");
            }
        });

        let mut builder = http::Request::builder()
            .method(method)
            .uri(target.as_str())
            .header("host", self.authority.as_str())
            .header("user-agent", USER_AGENT)
            .header("accept", "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let req = builder
            .body(Full::new(body.unwrap_or_default()))
            .map_err(|e| HttpError::Request(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| HttpError::Request(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| HttpError::Body(e.to_string()))?
            .to_bytes();

        Ok(HttpResponse { status, body })
    }
}

/// One-shot HTTP server for exercising clients in tests.
#[cfg(any(test, feature = "test-util"))]
pub mod test_server {
    use std::net::SocketAddr;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// A request captured by [`serve_once`].
    #[derive(Debug, Clone)]
    pub struct CapturedRequest {
        /// Request line, e.g. `GET /api/v1/query?... HTTP/1.1`.
        pub request_line: String,
        /// Header lines, lower-cased names.
        pub headers: Vec<(String, String)>,
        pub body: String,
    }

    impl CapturedRequest {
        pub fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.as_str())
        }
    }

    /// Accept a single connection, capture the request, answer with
    /// `status` and `body`, and close.
    pub async fn serve_once(
        status: u16,
        body: &str,
    ) -> (SocketAddr, JoinHandle<CapturedRequest>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let body = body.to_string();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];

            let header_end = loop {
                let n = socket.read(&mut chunk).await.unwrap();
                assert!(n > 0, "client closed before sending headers");
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = find_header_end(&buf) {
                    break pos;
                }
            };

            let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
            let mut lines = head.split("\r\n");
            let request_line = lines.next().unwrap_or_default().to_string();
            let headers: Vec<(String, String)> = lines
                .filter_map(|l| l.split_once(':'))
                .map(|(n, v)| (n.trim().to_ascii_lowercase(), v.trim().to_string()))
                .collect();

            let content_length = headers
                .iter()
                .find(|(n, _)| n == "content-length")
                .and_then(|(_, v)| v.parse::<usize>().ok())
                .unwrap_or(0);
            let body_start = header_end + 4;
            while buf.len() < body_start + content_length {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            let req_body = String::from_utf8_lossy(&buf[body_start..]).to_string();

            let resp = format!(
                "HTTP/1.1 {status} STATUS\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(resp.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();

            CapturedRequest {
                request_line,
                headers,
                body: req_body,
            }
        });

        (addr, handle)
    }

    /// Bind a listener that accepts connections and never answers.
    pub async fn serve_silent() -> (SocketAddr, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        (addr, handle)
    }

    fn find_header_end(buf: &[u8]) -> Option<usize> {
        buf.windows(4).position(|w| w == b"\r\n\r\n")
    }
}
