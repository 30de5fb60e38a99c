//! Bot Transport (spec §4.F, §9 "Bot transport supplement"): the seam between the simulator
//! and a live bot endpoint.
//!
//! Modeled on `llm-toolkit::agent::Agent` — an async trait with a single request/response
//! shape that concrete clients implement per platform, and a retry decorator
//! ([`RetriedTransport`]) that wraps any [`BotTransport`] the way
//! `llm-toolkit::agent::impls::retry::RetryAgent` wraps any `Agent`. Two concrete clients
//! cover the two platforms named in spec §4.F: [`PlatformAClient`] (stateless turn-based
//! REST) and [`PlatformBClient`] (session-based REST).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::BotCredentials;
use crate::error::TransportError;

/// One exchange: the user's utterance going out, the bot's reply messages coming back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotReply {
    pub messages: Vec<String>,
}

/// An open conversation with a bot endpoint. Both platform clients hand back an opaque
/// handle; `PlatformAClient`'s happens to carry a real session id, `PlatformBClient`'s
/// carries a fresh per-call id since the platform itself is stateless (spec §4.F: "the
/// platform-neutral session handle hides this difference from the simulator").
#[derive(Debug, Clone)]
pub struct SessionHandle(pub String);

/// The capability every concrete bot client provides (spec §4.F). `send` both starts and
/// continues a conversation: the simulator calls it once per round with the user's rendered
/// utterance and gets back every bot message produced in reply.
#[async_trait]
pub trait BotTransport: Send + Sync {
    /// Opens a new conversation, returning the handle used for subsequent `send` calls.
    async fn open_session(&self) -> Result<SessionHandle, TransportError>;

    /// Sends one user utterance and waits for the bot's reply (spec §4.F per-round
    /// exchange).
    async fn send(&self, session: &SessionHandle, utterance: &str) -> Result<BotReply, TransportError>;

    /// Releases any server-side session state. Best-effort; failures here are logged, not
    /// propagated (spec §4.F "session teardown is not on the critical path").
    async fn close_session(&self, session: &SessionHandle) -> Result<(), TransportError>;

    fn name(&self) -> &str;
}

/// Wraps any [`BotTransport`] with the run's normalized retry policy (spec §9 Open Question,
/// resolved in DESIGN.md: at most one retry, fixed 200ms backoff, then the session is
/// discarded by the caller). Mirrors `llm-toolkit::agent::impls::retry::RetryAgent`'s
/// decorator shape.
pub struct RetriedTransport<T: BotTransport> {
    inner: T,
}

impl<T: BotTransport> RetriedTransport<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<T: BotTransport> BotTransport for RetriedTransport<T> {
    async fn open_session(&self) -> Result<SessionHandle, TransportError> {
        self.with_retry("open_session", || self.inner.open_session()).await
    }

    async fn send(&self, session: &SessionHandle, utterance: &str) -> Result<BotReply, TransportError> {
        self.with_retry("send", || self.inner.send(session, utterance)).await
    }

    async fn close_session(&self, session: &SessionHandle) -> Result<(), TransportError> {
        self.with_retry("close_session", || self.inner.close_session(session)).await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

impl<T: BotTransport> RetriedTransport<T> {
    async fn with_retry<F, Fut, R>(&self, op: &str, attempt: F) -> Result<R, TransportError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<R, TransportError>> + Send,
    {
        match attempt().await {
            Ok(value) => Ok(value),
            Err(first_err) if first_err.is_retryable() => {
                tracing::warn!(transport = self.inner.name(), %op, error = %first_err, "transport call failed, retrying once");
                tokio::time::sleep(first_err.retry_delay()).await;
                attempt().await
            }
            Err(first_err) => Err(first_err),
        }
    }
}

/// Platform A: a stateless, turn-based REST API. Every call carries the full recent history
/// rather than a server-side session id (spec §4.F "Platform A").
pub struct PlatformAClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl PlatformAClient {
    pub fn new(credentials: &BotCredentials) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: credentials.endpoint.clone(),
            api_key: credentials.api_key.clone(),
        }
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

#[derive(Serialize)]
struct PlatformASessionRequest {}

#[derive(Deserialize)]
struct PlatformASessionResponse {
    session_id: String,
}

#[derive(Serialize)]
struct PlatformATurnRequest<'a> {
    session_id: &'a str,
    message: &'a str,
}

#[derive(Deserialize)]
struct PlatformATurnResponse {
    messages: Vec<String>,
}

#[async_trait]
impl BotTransport for PlatformAClient {
    async fn open_session(&self) -> Result<SessionHandle, TransportError> {
        let response = self
            .authorized(self.http.post(format!("{}/session", self.endpoint)))
            .json(&PlatformASessionRequest {})
            .send()
            .await
            .map_err(request_error)?;
        let body: PlatformASessionResponse = response.json().await.map_err(|e| TransportError::MalformedResponse(e.to_string()))?;
        Ok(SessionHandle(body.session_id))
    }

    async fn send(&self, session: &SessionHandle, utterance: &str) -> Result<BotReply, TransportError> {
        let response = self
            .authorized(self.http.post(format!("{}/chat-message", self.endpoint)))
            .json(&PlatformATurnRequest {
                session_id: &session.0,
                message: utterance,
            })
            .send()
            .await
            .map_err(request_error)?;
        let body: PlatformATurnResponse = response.json().await.map_err(|e| TransportError::MalformedResponse(e.to_string()))?;
        if body.messages.is_empty() {
            return Err(TransportError::NoInitialMessage);
        }
        Ok(BotReply { messages: body.messages })
    }

    async fn close_session(&self, session: &SessionHandle) -> Result<(), TransportError> {
        self.authorized(self.http.post(format!("{}/chat-end", self.endpoint)))
            .json(&PlatformATurnRequest { session_id: &session.0, message: "" })
            .send()
            .await
            .map_err(request_error)?;
        Ok(())
    }

    fn name(&self) -> &str {
        "platform_a"
    }
}

/// Platform B: a single-turn RPC-style API (spec §4.F "Platform B"), modeled on
/// Dialogflow CX's `DetectIntent`. There is no server-side session concept, so the client
/// mints a UUID per conversation purely to satisfy [`BotTransport`]'s handle contract.
pub struct PlatformBClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl PlatformBClient {
    pub fn new(credentials: &BotCredentials) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: credentials.endpoint.clone(),
            api_key: credentials.api_key.clone(),
        }
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

#[derive(Serialize)]
struct DetectIntentRequest<'a> {
    session_id: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct DetectIntentResponse {
    fulfillment_messages: Vec<String>,
}

#[async_trait]
impl BotTransport for PlatformBClient {
    async fn open_session(&self) -> Result<SessionHandle, TransportError> {
        Ok(SessionHandle(Uuid::new_v4().to_string()))
    }

    async fn send(&self, session: &SessionHandle, utterance: &str) -> Result<BotReply, TransportError> {
        let response = self
            .authorized(self.http.post(format!("{}/detectIntent", self.endpoint)))
            .json(&DetectIntentRequest { session_id: &session.0, text: utterance })
            .send()
            .await
            .map_err(request_error)?;
        let body: DetectIntentResponse = response.json().await.map_err(|e| TransportError::MalformedResponse(e.to_string()))?;
        if body.fulfillment_messages.is_empty() {
            return Err(TransportError::NoInitialMessage);
        }
        Ok(BotReply { messages: body.fulfillment_messages })
    }

    async fn close_session(&self, _session: &SessionHandle) -> Result<(), TransportError> {
        // No server-side state to tear down.
        Ok(())
    }

    fn name(&self) -> &str {
        "platform_b"
    }
}

fn request_error(source: reqwest::Error) -> TransportError {
    if source.is_timeout() {
        TransportError::Timeout(std::time::Duration::from_secs(30))
    } else {
        TransportError::RequestFailed {
            message: source.to_string(),
            is_retryable: !source.is_builder() && !source.is_redirect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A test double that fails its first call and succeeds afterward, so the retry
    /// decorator's single-retry behavior can be exercised without a real HTTP endpoint.
    struct FlakyTransport {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl BotTransport for FlakyTransport {
        async fn open_session(&self) -> Result<SessionHandle, TransportError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt == 0 {
                Err(TransportError::RequestFailed { message: "connection reset".into(), is_retryable: true })
            } else {
                Ok(SessionHandle("retried".into()))
            }
        }

        async fn send(&self, _session: &SessionHandle, _utterance: &str) -> Result<BotReply, TransportError> {
            unimplemented!()
        }

        async fn close_session(&self, _session: &SessionHandle) -> Result<(), TransportError> {
            Ok(())
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    struct AlwaysFailsTransport;

    #[async_trait]
    impl BotTransport for AlwaysFailsTransport {
        async fn open_session(&self) -> Result<SessionHandle, TransportError> {
            Err(TransportError::RequestFailed { message: "400 bad request".into(), is_retryable: false })
        }

        async fn send(&self, _session: &SessionHandle, _utterance: &str) -> Result<BotReply, TransportError> {
            unimplemented!()
        }

        async fn close_session(&self, _session: &SessionHandle) -> Result<(), TransportError> {
            Ok(())
        }

        fn name(&self) -> &str {
            "always_fails"
        }
    }

    #[tokio::test]
    async fn retries_once_on_retryable_error_then_succeeds() {
        let transport = RetriedTransport::new(FlakyTransport { attempts: AtomicUsize::new(0) });
        let handle = transport.open_session().await.unwrap();
        assert_eq!(handle.0, "retried");
    }

    #[tokio::test]
    async fn non_retryable_error_is_not_retried() {
        let transport = RetriedTransport::new(AlwaysFailsTransport);
        let result = transport.open_session().await;
        assert!(matches!(result, Err(TransportError::RequestFailed { is_retryable: false, .. })));
    }
}
