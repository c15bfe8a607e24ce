//! Connecting to the management server with retry

use async_trait::async_trait;
use idlewatch_config::Endpoint;
use idlewatch_util::{Backoff, CancelToken, DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_BACKOFF};
use std::time::Duration;
use thiserror::Error;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{Connector, connect_async_tls_with_config};
use tracing::{debug, error, info, warn};

use crate::{client_config, Connection, DEFAULT_REQUEST_TIMEOUT};

/// Default bound on the WebSocket upgrade handshake
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from a single connection attempt
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Server rejected the credential (HTTP {status})")]
    Rejected { status: u16 },

    #[error("Handshake failed with HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("Handshake timed out after {0:?}")]
    Timeout(Duration),

    #[error("TLS setup failed: {0}")]
    Tls(#[from] rustls::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

impl ConnectError {
    /// Classify a handshake failure, separating credential rejection
    fn from_handshake(error: WsError) -> Self {
        match error {
            WsError::Http(response) => {
                let status = response.status().as_u16();
                if status == 401 || status == 403 {
                    ConnectError::Rejected { status }
                } else {
                    ConnectError::HttpStatus { status }
                }
            }
            other => ConnectError::WebSocket(other),
        }
    }

    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, ConnectError::Rejected { .. })
    }
}

/// Something that can open a fresh connection
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Human-readable target for log lines
    fn target(&self) -> String;

    /// Make a single connection attempt
    async fn dial(&self) -> Result<Connection, ConnectError>;
}

/// Dials the management server over WebSocket with bearer authentication
#[derive(Debug, Clone)]
pub struct WsDialer {
    endpoint: Endpoint,
    handshake_timeout: Duration,
    request_timeout: Duration,
}

impl WsDialer {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[async_trait]
impl Dialer for WsDialer {
    fn target(&self) -> String {
        self.endpoint.url()
    }

    async fn dial(&self) -> Result<Connection, ConnectError> {
        let url = self.endpoint.url();
        let mut request = url.as_str().into_client_request()?;

        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.endpoint.secret.expose()))
            .map_err(|_| ConnectError::InvalidEndpoint("credential is not a valid header value".into()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let connector = if self.endpoint.tls {
            Connector::Rustls(client_config(self.endpoint.tls_verify)?)
        } else {
            Connector::Plain
        };

        let handshake = connect_async_tls_with_config(request, None, true, Some(connector));
        let (stream, response) = tokio::time::timeout(self.handshake_timeout, handshake)
            .await
            .map_err(|_| ConnectError::Timeout(self.handshake_timeout))?
            .map_err(ConnectError::from_handshake)?;

        debug!(url = %url, status = %response.status(), "WebSocket handshake complete");

        Ok(Connection::from_stream(stream, url, self.request_timeout))
    }
}

/// Retry policy for [`connect`]
#[derive(Debug, Clone, Copy)]
pub struct ConnectPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Give up instead of retrying when the credential is rejected
    pub fatal_on_auth_rejection: bool,
}

impl Default for ConnectPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            fatal_on_auth_rejection: false,
        }
    }
}

/// Result of [`connect`]
#[derive(Debug)]
pub enum ConnectOutcome {
    Connected(Connection),
    /// Cancellation was requested before a connection was established
    Cancelled,
    /// The credential was rejected and the policy says not to retry
    Rejected(ConnectError),
}

/// Connect, retrying with exponential backoff until success or cancellation.
///
/// Attempt `k` that fails is followed by a sleep of
/// `min(initial * 2^(k-1), max)`.
pub async fn connect<D>(dialer: &D, policy: &ConnectPolicy, cancel: &CancelToken) -> ConnectOutcome
where
    D: Dialer + ?Sized,
{
    let mut backoff = Backoff::new(policy.initial_backoff, policy.max_backoff);
    let mut attempt: u32 = 1;
    let target = dialer.target();

    loop {
        if cancel.is_cancelled() {
            return ConnectOutcome::Cancelled;
        }

        info!(attempt, target = %target, "Attempting connection to server");

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return ConnectOutcome::Cancelled,
            result = dialer.dial() => result,
        };

        let error = match result {
            Ok(connection) => {
                info!(attempt, target = %target, "Successfully connected to server");
                return ConnectOutcome::Connected(connection);
            }
            Err(e) => e,
        };

        if error.is_auth_rejection() {
            if policy.fatal_on_auth_rejection {
                error!(attempt, error = %error, "Credential rejected, not retrying");
                return ConnectOutcome::Rejected(error);
            }
            error!(attempt, error = %error, "Credential rejected; check the configured secret");
        } else {
            warn!(attempt, error = %error, "Connection failed");
        }

        let delay = backoff.next_delay();
        info!(attempt, retry_in = ?delay, "Retrying connection");

        if !cancel.sleep(delay).await {
            return ConnectOutcome::Cancelled;
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::time::Instant;
    use tokio_tungstenite::WebSocketStream;
    use tokio_tungstenite::tungstenite::protocol::Role;

    async fn idle_connection() -> Connection {
        let (client_io, server_io) = tokio::io::duplex(1024);
        // The server half is leaked into a task so the client stays open
        tokio::spawn(async move {
            let _server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
            std::future::pending::<()>().await;
        });
        let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
        Connection::from_stream(client, "scripted", Duration::from_secs(1))
    }

    /// Fails a fixed number of times, then succeeds; records attempt times
    struct ScriptedDialer {
        failures: Mutex<Vec<ConnectError>>,
        attempts: Mutex<Vec<Instant>>,
    }

    impl ScriptedDialer {
        fn new(failures: Vec<ConnectError>) -> Self {
            Self {
                failures: Mutex::new(failures),
                attempts: Mutex::new(Vec::new()),
            }
        }

        fn gaps(&self) -> Vec<Duration> {
            let attempts = self.attempts.lock().unwrap();
            attempts.windows(2).map(|w| w[1] - w[0]).collect()
        }
    }

    #[async_trait]
    impl Dialer for ScriptedDialer {
        fn target(&self) -> String {
            "scripted".into()
        }

        async fn dial(&self) -> Result<Connection, ConnectError> {
            self.attempts.lock().unwrap().push(Instant::now());
            let next = {
                let mut failures = self.failures.lock().unwrap();
                if failures.is_empty() { None } else { Some(failures.remove(0)) }
            };
            match next {
                Some(error) => Err(error),
                None => Ok(idle_connection().await),
            }
        }
    }

    fn refused() -> ConnectError {
        ConnectError::WebSocket(WsError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        )))
    }

    #[tokio::test(start_paused = true)]
    async fn two_refusals_then_success_sleeps_one_then_two_seconds() {
        let dialer = ScriptedDialer::new(vec![refused(), refused()]);
        let outcome = connect(&dialer, &ConnectPolicy::default(), &CancelToken::new()).await;

        assert!(matches!(outcome, ConnectOutcome::Connected(_)));
        assert_eq!(
            dialer.gaps(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_caps_at_thirty_seconds() {
        let dialer = ScriptedDialer::new((0..8).map(|_| refused()).collect());
        let outcome = connect(&dialer, &ConnectPolicy::default(), &CancelToken::new()).await;

        assert!(matches!(outcome, ConnectOutcome::Connected(_)));
        let secs: Vec<u64> = dialer.gaps().iter().map(Duration::as_secs).collect();
        assert_eq!(secs, vec![1, 2, 4, 8, 16, 30, 30, 30]);
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_success_does_not_sleep() {
        let dialer = ScriptedDialer::new(vec![]);
        let start = Instant::now();
        let outcome = connect(&dialer, &ConnectPolicy::default(), &CancelToken::new()).await;

        assert!(matches!(outcome, ConnectOutcome::Connected(_)));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_backoff_returns_cancelled() {
        let dialer = ScriptedDialer::new((0..100).map(|_| refused()).collect());
        let cancel = CancelToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            canceller.cancel();
        });

        let outcome = connect(&dialer, &ConnectPolicy::default(), &cancel).await;
        assert!(matches!(outcome, ConnectOutcome::Cancelled));
        // Attempts at t=0, 1, 3; the sleep toward t=7 is interrupted
        assert_eq!(dialer.attempts.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn already_cancelled_never_dials() {
        let dialer = ScriptedDialer::new(vec![]);
        let cancel = CancelToken::new();
        cancel.cancel();

        let outcome = connect(&dialer, &ConnectPolicy::default(), &cancel).await;
        assert!(matches!(outcome, ConnectOutcome::Cancelled));
        assert!(dialer.attempts.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_credential_retried_by_default() {
        let dialer = ScriptedDialer::new(vec![ConnectError::Rejected { status: 401 }]);
        let outcome = connect(&dialer, &ConnectPolicy::default(), &CancelToken::new()).await;

        assert!(matches!(outcome, ConnectOutcome::Connected(_)));
        assert_eq!(dialer.gaps(), vec![Duration::from_secs(1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_credential_fatal_when_configured() {
        let dialer = ScriptedDialer::new(vec![ConnectError::Rejected { status: 403 }]);
        let policy = ConnectPolicy {
            fatal_on_auth_rejection: true,
            ..Default::default()
        };

        let outcome = connect(&dialer, &policy, &CancelToken::new()).await;
        assert!(matches!(
            outcome,
            ConnectOutcome::Rejected(ConnectError::Rejected { status: 403 })
        ));
        assert_eq!(dialer.attempts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn dialing_a_closed_port_fails() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let dialer = WsDialer::new(Endpoint {
            host: "127.0.0.1".into(),
            port,
            tls: false,
            tls_verify: false,
            secret: idlewatch_config::Secret::new("token"),
        });

        assert_eq!(dialer.target(), format!("ws://127.0.0.1:{port}/"));
        assert!(dialer.dial().await.is_err());
    }
}
