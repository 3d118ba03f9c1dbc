//! # Session Client
//!
//! HTTP client for agent chat turns: bearer auth with proactive token
//! refresh, bounded retry with increasing delays, and streaming turn
//! delivery through [`AgentBackend`].

use super::stream;
use crate::domain::config::ApiConfig;
use crate::domain::error::ApiError;
use crate::domain::traits::{AgentBackend, TurnReply};
use crate::infrastructure::auth::{self, CredentialStore, Credentials};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Delay before each retry attempt, in milliseconds.
const RETRY_DELAYS_MS: [u64; 3] = [1000, 2000, 4000];
/// Refresh the token when it expires within this many seconds.
const REFRESH_LEAD_SECS: i64 = 60;

pub struct SessionClient {
    http: reqwest::Client,
    config: ApiConfig,
    realm: String,
    store: CredentialStore,
    retry_delays: Vec<u64>,
}

impl SessionClient {
    pub fn new(config: ApiConfig, realm: String, store: CredentialStore) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            realm,
            store,
            retry_delays: RETRY_DELAYS_MS.to_vec(),
        }
    }

    #[cfg(test)]
    fn with_retry_delays(mut self, delays: Vec<u64>) -> Self {
        self.retry_delays = delays;
        self
    }

    /// Current bearer token, refreshing first when it is about to
    /// expire and refresh material is available. A failed refresh
    /// falls back to the stale token rather than failing the call.
    async fn bearer(&self) -> Result<String, ApiError> {
        if let Ok(token) = std::env::var("DROVER_ACCESS_TOKEN") {
            if !token.is_empty() {
                return Ok(token);
            }
        }

        let creds = self.store.get(&self.realm).ok_or_else(|| {
            ApiError::Auth(format!(
                "No credentials for realm '{}'. Run 'drover login' first.",
                self.realm
            ))
        })?;

        if creds.expires_within(REFRESH_LEAD_SECS) {
            if let (Some(id), Some(secret)) = (&creds.client_id, &creds.client_secret) {
                match auth::authenticate(&self.http, &self.config.idm_base, &self.realm, id, secret)
                    .await
                {
                    Ok(token) => {
                        let refreshed = Credentials {
                            access_token: token.access_token.clone(),
                            expires_at: Some(
                                chrono::Utc::now().timestamp() + token.expires_in,
                            ),
                            ..Default::default()
                        };
                        if let Err(e) = self.store.save(&self.realm, refreshed) {
                            warn!("Could not persist refreshed token: {}", e);
                        }
                        info!("Access token refreshed for realm '{}'", self.realm);
                        return Ok(token.access_token);
                    }
                    Err(e) => {
                        warn!("Token refresh failed, using stored token: {}", e);
                    }
                }
            }
        }

        Ok(creds.access_token)
    }

    async fn post_turn(
        &self,
        agent_id: &str,
        prompt: &str,
        conversation_id: Option<&str>,
        on_chunk: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<TurnReply, ApiError> {
        let token = self.bearer().await?;
        let url = format!("{}/v1/agent/{}/chat", self.config.agent_base, agent_id);

        let payload = serde_json::json!({
            "user_prompt": prompt,
            "streaming": true,
            "use_conversation": true,
            "return_ks_in_response": true,
            "stackspot_knowledge": false,
            "conversation_id": conversation_id,
        });

        debug!(agent_id, "Sending agent turn");
        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await?;

        stream::consume_response(response, on_chunk).await
    }
}

#[async_trait]
impl AgentBackend for SessionClient {
    /// One chat turn with a bounded retry budget. Transient failures
    /// (network errors, 5xx) are retried with increasing delays; auth
    /// failures and other client errors surface immediately.
    async fn send_turn(
        &self,
        agent_id: &str,
        prompt: &str,
        conversation_id: Option<&str>,
        on_chunk: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<TurnReply, ApiError> {
        let mut last_err = None;
        for attempt in 0..=self.retry_delays.len() {
            if attempt > 0 {
                let delay = self.retry_delays[attempt - 1];
                warn!("Retrying agent turn in {}ms (attempt {})", delay, attempt + 1);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            match self.post_turn(agent_id, prompt, conversation_id, &mut *on_chunk).await {
                Ok(reply) => return Ok(reply),
                Err(e) if e.is_retryable() => last_err = Some(e),
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| ApiError::Body("Retry budget exhausted".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response per incoming connection, counting
    /// the connections.
    async fn canned_server(responses: Vec<String>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        tokio::spawn(async move {
            for response in responses {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 8192];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        (format!("http://{}", addr), hits)
    }

    fn status_response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        )
    }

    fn stream_response() -> String {
        "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n\
         data: {\"message\": \"hi there\"}\n\ndata: [DONE]\n\n"
            .to_string()
    }

    fn client_for(base: String, dir: &tempfile::TempDir) -> SessionClient {
        let store = CredentialStore::at_path(dir.path().join("credentials.json"));
        store
            .save(
                "test",
                Credentials {
                    access_token: "tok".into(),
                    ..Default::default()
                },
            )
            .unwrap();
        let config = ApiConfig {
            agent_base: base,
            idm_base: "http://127.0.0.1:1".into(),
            realm: Some("test".into()),
        };
        SessionClient::new(config, "test".into(), store).with_retry_delays(vec![1, 1, 1])
    }

    #[tokio::test]
    async fn test_server_errors_exhaust_retry_budget() {
        let responses = (0..4)
            .map(|_| status_response("500 Internal Server Error", "boom"))
            .collect();
        let (base, hits) = canned_server(responses).await;
        let dir = tempfile::tempdir().unwrap();
        let client = client_for(base, &dir);

        let mut sink = |_: &str| {};
        let err = client
            .send_turn("agent-1", "hello", None, &mut sink)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 500, .. }));
        // Initial attempt plus three retries.
        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let responses = vec![status_response("401 Unauthorized", "expired")];
        let (base, hits) = canned_server(responses).await;
        let dir = tempfile::tempdir().unwrap();
        let client = client_for(base, &dir);

        let mut sink = |_: &str| {};
        let err = client
            .send_turn("agent-1", "hello", None, &mut sink)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Auth(_)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let responses = vec![
            status_response("502 Bad Gateway", "flaky"),
            stream_response(),
        ];
        let (base, hits) = canned_server(responses).await;
        let dir = tempfile::tempdir().unwrap();
        let client = client_for(base, &dir);

        let mut chunks = String::new();
        let mut collect = |s: &str| chunks.push_str(s);
        let reply = client
            .send_turn("agent-1", "hello", None, &mut collect)
            .await
            .unwrap();
        assert_eq!(reply.text, "hi there");
        assert_eq!(chunks, "hi there");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_credentials_is_auth_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::at_path(dir.path().join("credentials.json"));
        let config = ApiConfig {
            agent_base: "http://127.0.0.1:1".into(),
            idm_base: "http://127.0.0.1:1".into(),
            realm: Some("ghost".into()),
        };
        let client = SessionClient::new(config, "ghost".into(), store);

        let mut sink = |_: &str| {};
        let err = client
            .send_turn("agent-1", "hello", None, &mut sink)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Auth(_)));
    }
}
