//! Request/response surface of the authoritative backend.
//!
//! The session controller only ever sees the [`SyncClient`] trait;
//! the HTTP implementation lives here and the tests substitute a
//! scripted mock. Each call is a single attempt with its own timeout;
//! retry policy belongs to the session, not the transport.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::Tuning;
use crate::error::{RejectReason, SyncError, TerminalReason};
use crate::protocol::{MatchCreated, StatePayload};

#[async_trait]
pub trait SyncClient: Send + Sync + 'static {
    /// Submit a roll for the current turn. Single attempt; the
    /// caller's in-flight lock must be released whether or not this
    /// returns a definitive answer.
    async fn submit_roll(&self, match_id: &str) -> Result<StatePayload, SyncError>;

    /// On-demand resync; also used to verify turn ownership before an
    /// idle auto-roll.
    async fn fetch_state(&self, match_id: &str) -> Result<StatePayload, SyncError>;

    /// Cheap liveness probe. Failures are counted, never surfaced as
    /// errors.
    async fn heartbeat(&self, match_id: &str) -> bool;

    async fn forfeit(&self, match_id: &str) -> Result<StatePayload, SyncError>;

    /// Best-effort notification that the local player is leaving.
    async fn abandon(&self, match_id: &str) -> Result<(), SyncError>;

    async fn create_match(&self, num_players: usize) -> Result<MatchCreated, SyncError>;
}

/// HTTP client for the production backend.
pub struct HttpSyncClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    tuning: Tuning,
}

impl HttpSyncClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>, tuning: Tuning) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            tuning,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Map a non-success response onto the error taxonomy.
    async fn classify(resp: reqwest::Response) -> SyncError {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        match status {
            StatusCode::CONFLICT => SyncError::Rejected(RejectReason::NotYourTurn),
            StatusCode::BAD_REQUEST => {
                if body.to_ascii_lowercase().contains("already finished") {
                    SyncError::Terminal(TerminalReason::AlreadyFinished)
                } else {
                    SyncError::Rejected(RejectReason::MatchNotActive)
                }
            }
            StatusCode::NOT_FOUND => SyncError::Terminal(TerminalReason::MatchNotFound),
            other => SyncError::Transient(format!("unexpected status {other}: {body}")),
        }
    }

    async fn parse_payload(resp: reqwest::Response) -> Result<StatePayload, SyncError> {
        if resp.status().is_success() {
            resp.json::<StatePayload>()
                .await
                .map_err(|e| SyncError::protocol(format!("malformed state payload: {e}")))
        } else {
            Err(Self::classify(resp).await)
        }
    }
}

#[async_trait]
impl SyncClient for HttpSyncClient {
    async fn submit_roll(&self, match_id: &str) -> Result<StatePayload, SyncError> {
        debug!(match_id, "submitting roll");
        let resp = self
            .authorize(self.http.post(self.url("/matches/roll")))
            .timeout(self.tuning.submit_timeout)
            .json(&json!({ "match_id": match_id }))
            .send()
            .await?;
        Self::parse_payload(resp).await
    }

    async fn fetch_state(&self, match_id: &str) -> Result<StatePayload, SyncError> {
        let resp = self
            .authorize(self.http.get(self.url("/matches/check")))
            .timeout(self.tuning.fetch_timeout)
            .query(&[("match_id", match_id)])
            .send()
            .await?;
        Self::parse_payload(resp).await
    }

    async fn heartbeat(&self, match_id: &str) -> bool {
        // Either endpoint answering below 500 counts as alive.
        for path in ["/health", "/matches/ping"] {
            let req = self
                .authorize(self.http.get(self.url(path)))
                .timeout(self.tuning.fetch_timeout)
                .query(&[("match_id", match_id)]);
            match req.send().await {
                Ok(resp) if resp.status().as_u16() < 500 => return true,
                Ok(resp) => {
                    debug!(path, status = resp.status().as_u16(), "heartbeat degraded");
                }
                Err(err) => {
                    debug!(path, error = %err, "heartbeat probe failed");
                }
            }
        }
        false
    }

    async fn forfeit(&self, match_id: &str) -> Result<StatePayload, SyncError> {
        let resp = self
            .authorize(self.http.post(self.url("/matches/forfeit")))
            .timeout(self.tuning.submit_timeout)
            .json(&json!({ "match_id": match_id }))
            .send()
            .await?;
        Self::parse_payload(resp).await
    }

    async fn abandon(&self, match_id: &str) -> Result<(), SyncError> {
        let resp = self
            .authorize(self.http.post(self.url("/matches/abandon")))
            .timeout(self.tuning.fetch_timeout)
            .json(&json!({ "match_id": match_id }))
            .send()
            .await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            // Abandon is best-effort; the caller logs and moves on.
            let err = Self::classify(resp).await;
            warn!(match_id, error = %err, "abandon notification failed");
            Err(err)
        }
    }

    async fn create_match(&self, num_players: usize) -> Result<MatchCreated, SyncError> {
        let resp = self
            .authorize(self.http.post(self.url("/matches/create")))
            .timeout(self.tuning.submit_timeout)
            .json(&json!({ "num_players": num_players }))
            .send()
            .await?;
        if resp.status().is_success() {
            resp.json::<MatchCreated>()
                .await
                .map_err(|e| SyncError::protocol(format!("malformed create response: {e}")))
        } else {
            Err(Self::classify(resp).await)
        }
    }
}
