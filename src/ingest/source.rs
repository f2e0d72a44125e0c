//! Snapshot source abstraction and the HTTP proxy client

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tracing::debug;

use crate::error::FetchError;

/// Proxy endpoint serving the aggregator's CSV export
pub const PROXY_PATH: &str = "/api/radiosondy";

/// Connect timeout ceiling for the proxy client
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Which slice of the aggregator feed to request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceMode {
    /// Every sonde the aggregator currently reports
    All,
    /// A single sonde by identifier
    Single(String),
}

impl fmt::Display for SourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceMode::All => write!(f, "all"),
            SourceMode::Single(id) => write!(f, "single:{}", id),
        }
    }
}

/// Trait for anything that can deliver one CSV snapshot
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetch the current CSV text for `mode`
    async fn fetch(&self, mode: &SourceMode) -> Result<String, FetchError>;
}

/// Client for the caching proxy (`GET /api/radiosondy?mode=...`)
///
/// Requests run on the blocking pool; the agent's own timeout matches the
/// per-attempt deadline so abandoned requests do not linger.
pub struct HttpSource {
    agent: ureq::Agent,
    base_url: String,
}

impl fmt::Debug for HttpSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpSource")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpSource {
    /// Create a client for the proxy at `base_url`
    ///
    /// # Arguments
    ///
    /// * `base_url` - Scheme and authority of the proxy (e.g. `http://127.0.0.1:3000`)
    /// * `timeout` - Overall timeout of one request
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout.min(CONNECT_TIMEOUT))
            .timeout(timeout)
            .build();

        Self {
            agent,
            base_url: base_url.into(),
        }
    }

    /// Full URL of the proxy endpoint, without query
    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), PROXY_PATH)
    }
}

#[async_trait]
impl SnapshotSource for HttpSource {
    async fn fetch(&self, mode: &SourceMode) -> Result<String, FetchError> {
        let agent = self.agent.clone();
        let url = self.endpoint();
        let mode = mode.clone();

        tokio::task::spawn_blocking(move || fetch_blocking(&agent, &url, &mode))
            .await
            .map_err(|e| FetchError::Network(format!("fetch task failed: {}", e)))?
    }
}

fn fetch_blocking(agent: &ureq::Agent, url: &str, mode: &SourceMode) -> Result<String, FetchError> {
    let request = match mode {
        SourceMode::All => agent.get(url).query("mode", "all"),
        SourceMode::Single(id) => agent.get(url).query("mode", "single").query("id", id),
    };

    debug!("GET {} ({})", url, mode);
    match request.call() {
        Ok(resp) => resp
            .into_string()
            .map_err(|e| FetchError::Network(format!("failed reading response body: {}", e))),
        Err(ureq::Error::Status(code, _)) => Err(FetchError::Http(code)),
        Err(ureq::Error::Transport(err)) => Err(FetchError::Network(err.to_string())),
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// One scripted response of [`ScriptedSource`]
    #[derive(Debug, Clone)]
    pub enum Scripted {
        Body(String),
        Fail(FetchError),
        /// Never completes; only a timeout ends the attempt
        Hang,
    }

    #[derive(Debug, Default)]
    struct ScriptState {
        responses: VecDeque<Scripted>,
        requests: Vec<SourceMode>,
    }

    /// Mock source replaying scripted responses in order
    #[derive(Clone, Default)]
    pub struct ScriptedSource {
        state: Arc<Mutex<ScriptState>>,
    }

    impl ScriptedSource {
        pub fn new(responses: Vec<Scripted>) -> Self {
            Self {
                state: Arc::new(Mutex::new(ScriptState {
                    responses: responses.into(),
                    requests: Vec::new(),
                })),
            }
        }

        pub fn push(&self, response: Scripted) {
            self.state.lock().unwrap().responses.push_back(response);
        }

        pub fn requests(&self) -> Vec<SourceMode> {
            self.state.lock().unwrap().requests.clone()
        }
    }

    #[async_trait]
    impl SnapshotSource for ScriptedSource {
        async fn fetch(&self, mode: &SourceMode) -> Result<String, FetchError> {
            let next = {
                let mut state = self.state.lock().unwrap();
                state.requests.push(mode.clone());
                state.responses.pop_front()
            };

            match next {
                Some(Scripted::Body(body)) => Ok(body),
                Some(Scripted::Fail(err)) => Err(err),
                Some(Scripted::Hang) => std::future::pending().await,
                None => Err(FetchError::Network("script exhausted".to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Serve one canned HTTP response and return the request line received
    fn serve_once(status_line: &'static str, body: &'static str) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }

            let response = format!(
                "{}\r\nContent-Type: text/csv\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).unwrap();

            String::from_utf8_lossy(&request)
                .lines()
                .next()
                .unwrap_or_default()
                .to_string()
        });

        (base_url, handle)
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        let source = HttpSource::new("http://localhost:3000/", Duration::from_secs(1));
        assert_eq!(source.endpoint(), "http://localhost:3000/api/radiosondy");
    }

    #[test]
    fn test_source_mode_display() {
        assert_eq!(SourceMode::All.to_string(), "all");
        assert_eq!(SourceMode::Single("T1".to_string()).to_string(), "single:T1");
    }

    #[tokio::test]
    async fn test_fetch_all_returns_body() {
        let (base_url, server) = serve_once("HTTP/1.1 200 OK", "ID;Lat;Lon\nSP1;54.5;18.5\n");
        let source = HttpSource::new(base_url, Duration::from_secs(5));

        let body = source.fetch(&SourceMode::All).await.unwrap();
        assert_eq!(body, "ID;Lat;Lon\nSP1;54.5;18.5\n");

        let request_line = server.join().unwrap();
        assert!(request_line.starts_with("GET /api/radiosondy?mode=all "), "{}", request_line);
    }

    #[tokio::test]
    async fn test_fetch_single_sends_id() {
        let (base_url, server) = serve_once("HTTP/1.1 200 OK", "");
        let source = HttpSource::new(base_url, Duration::from_secs(5));

        source.fetch(&SourceMode::Single("T1234567".to_string())).await.unwrap();

        let request_line = server.join().unwrap();
        assert!(
            request_line.starts_with("GET /api/radiosondy?mode=single&id=T1234567 "),
            "{}",
            request_line
        );
    }

    #[tokio::test]
    async fn test_fetch_http_error_status() {
        let (base_url, server) = serve_once("HTTP/1.1 504 Gateway Timeout", "Upstream timeout");
        let source = HttpSource::new(base_url, Duration::from_secs(5));

        let result = source.fetch(&SourceMode::All).await;
        assert_eq!(result, Err(FetchError::Http(504)));
        server.join().unwrap();
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        // Bind and release a port so nothing listens on it
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let source = HttpSource::new(format!("http://127.0.0.1:{}", port), Duration::from_secs(2));

        let result = source.fetch(&SourceMode::All).await;
        assert!(matches!(result, Err(FetchError::Network(_))), "{:?}", result);
    }

    #[test]
    fn test_scripted_source_replays_in_order() {
        use mocks::{Scripted, ScriptedSource};

        let source = ScriptedSource::new(vec![
            Scripted::Fail(FetchError::Http(502)),
            Scripted::Body("ID;Lat;Lon".to_string()),
        ]);

        let first = tokio_test::block_on(source.fetch(&SourceMode::All));
        let second = tokio_test::block_on(source.fetch(&SourceMode::All));
        let third = tokio_test::block_on(source.fetch(&SourceMode::All));

        assert_eq!(first, Err(FetchError::Http(502)));
        assert_eq!(second, Ok("ID;Lat;Lon".to_string()));
        assert!(matches!(third, Err(FetchError::Network(_))));
        assert_eq!(source.requests().len(), 3);
    }
}
