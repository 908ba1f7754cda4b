//! Client for the external card-ranking collaborator.
//!
//! The collaborator is an ML scoring service with two endpoints we use: `GET /health` and `POST /rank-batch`. It is
//! optional and allowed to be flaky; a circuit breaker keeps a misbehaving service from adding latency to every
//! match call. When the circuit is open, [`RankingClient::is_healthy`] answers `false` and the engine's local
//! heuristic takes over.

use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use cardlink_engine::matching::{CandidateFeatures, NullRankingService, RankingError, RankingService, RemoteScore};
use cl_common::Secret;
use log::*;
use serde::Deserialize;

use crate::config::RankingConfig;

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

#[derive(Clone)]
pub struct RankingClient {
    base_url: String,
    api_key: Option<Secret<String>>,
    client: reqwest::Client,
    failure_threshold: u32,
    cooldown: Duration,
    state: Arc<Mutex<BreakerState>>,
}

#[derive(Debug, Deserialize)]
struct HealthPayload {
    status: String,
    #[serde(default)]
    model_loaded: bool,
    #[serde(default)]
    feature_pipeline_loaded: bool,
}

#[derive(Debug, Deserialize)]
struct RankBatchPayload {
    ranked_cardholders: Vec<RemoteScore>,
}

impl RankingClient {
    /// Build a client from config. Returns `None` when no collaborator URL is configured.
    pub fn try_new(config: &RankingConfig) -> Option<Self> {
        let base_url = config.base_url.clone()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| error!("🔀️ Could not build the ranking HTTP client: {e}"))
            .ok()?;
        info!("🔀️ Ranking collaborator configured at {base_url}");
        Some(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client,
            failure_threshold: config.failure_threshold,
            cooldown: Duration::from_secs(config.cooldown_secs),
            state: Arc::new(Mutex::new(BreakerState::default())),
        })
    }

    fn with_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.bearer_auth(key.reveal()),
            None => req,
        }
    }

    // The breaker state stays consistent even if a holder panicked mid-update, so poisoning is ignored.
    fn breaker(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn circuit_is_open(&self) -> bool {
        let mut state = self.breaker();
        match state.open_until {
            Some(until) if Instant::now() < until => true,
            Some(_) => {
                // cooldown elapsed; allow a probe through
                state.open_until = None;
                state.consecutive_failures = 0;
                false
            },
            None => false,
        }
    }

    fn record_failure(&self, context: &str) {
        let mut state = self.breaker();
        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.failure_threshold {
            state.open_until = Some(Instant::now() + self.cooldown);
            warn!(
                "🔀️ Ranking circuit opened after {} consecutive failures ({context}). Cooling down for {:?}",
                state.consecutive_failures, self.cooldown
            );
        }
    }

    fn record_success(&self) {
        let mut state = self.breaker();
        state.consecutive_failures = 0;
        state.open_until = None;
    }
}

impl RankingService for RankingClient {
    async fn is_healthy(&self) -> bool {
        if self.circuit_is_open() {
            return false;
        }
        let url = format!("{}/health", self.base_url);
        match self.with_auth(self.client.get(&url)).send().await {
            Ok(response) if response.status().is_success() => match response.json::<HealthPayload>().await {
                Ok(health) => {
                    let ready = health.status == "healthy" && health.model_loaded && health.feature_pipeline_loaded;
                    if ready {
                        self.record_success();
                    } else {
                        debug!("🔀️ Ranking service responded but is not ready: {health:?}");
                        self.record_failure("not ready");
                    }
                    ready
                },
                Err(e) => {
                    self.record_failure("bad health payload");
                    debug!("🔀️ Could not parse ranking health response: {e}");
                    false
                },
            },
            Ok(response) => {
                self.record_failure("health status");
                debug!("🔀️ Ranking health check returned {}", response.status());
                false
            },
            Err(e) => {
                self.record_failure("health transport");
                debug!("🔀️ Ranking health check failed: {e}");
                false
            },
        }
    }

    async fn rank_batch(&self, candidates: &[CandidateFeatures]) -> Result<Vec<RemoteScore>, RankingError> {
        if self.circuit_is_open() {
            return Err(RankingError::Unavailable("circuit open".to_string()));
        }
        let url = format!("{}/rank-batch", self.base_url);
        let body = serde_json::json!({ "cardholders": candidates });
        let response = self.with_auth(self.client.post(&url)).json(&body).send().await.map_err(|e| {
            self.record_failure("rank transport");
            RankingError::Unavailable(e.to_string())
        })?;
        if !response.status().is_success() {
            self.record_failure("rank status");
            return Err(RankingError::Unavailable(format!("HTTP {}", response.status())));
        }
        let payload: RankBatchPayload = response.json().await.map_err(|e| {
            self.record_failure("rank payload");
            RankingError::InvalidResponse(e.to_string())
        })?;
        if payload.ranked_cardholders.len() != candidates.len() {
            self.record_failure("rank cardinality");
            return Err(RankingError::InvalidResponse(format!(
                "Expected {} scores, got {}",
                candidates.len(),
                payload.ranked_cardholders.len()
            )));
        }
        self.record_success();
        Ok(payload.ranked_cardholders)
    }
}

/// The ranking seam the server actually wires in: the remote collaborator when one is configured, otherwise the
/// engine's always-unavailable stub.
#[derive(Clone)]
pub enum RankingBackend {
    Remote(RankingClient),
    Disabled(NullRankingService),
}

impl RankingBackend {
    pub fn from_config(config: &RankingConfig) -> Self {
        match RankingClient::try_new(config) {
            Some(client) => RankingBackend::Remote(client),
            None => RankingBackend::Disabled(NullRankingService),
        }
    }
}

impl RankingService for RankingBackend {
    async fn is_healthy(&self) -> bool {
        match self {
            RankingBackend::Remote(client) => client.is_healthy().await,
            RankingBackend::Disabled(stub) => stub.is_healthy().await,
        }
    }

    async fn rank_batch(&self, candidates: &[CandidateFeatures]) -> Result<Vec<RemoteScore>, RankingError> {
        match self {
            RankingBackend::Remote(client) => client.rank_batch(candidates).await,
            RankingBackend::Disabled(stub) => stub.rank_batch(candidates).await,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn client() -> RankingClient {
        let config = RankingConfig {
            base_url: Some("http://localhost:9".to_string()),
            api_key: None,
            timeout_ms: 100,
            failure_threshold: 2,
            cooldown_secs: 60,
        };
        RankingClient::try_new(&config).unwrap()
    }

    #[test]
    fn no_url_means_no_client() {
        assert!(RankingClient::try_new(&RankingConfig::default()).is_none());
    }

    #[test]
    fn circuit_opens_at_the_threshold() {
        let client = client();
        assert!(!client.circuit_is_open());
        client.record_failure("test");
        assert!(!client.circuit_is_open());
        client.record_failure("test");
        assert!(client.circuit_is_open());
        client.record_success();
        assert!(!client.circuit_is_open());
    }

    #[test]
    fn wire_contract_matches_the_scoring_service() {
        // Every field the collaborator's request schema requires must be on the feature row
        let features = CandidateFeatures {
            user_id: "holder@example.com".to_string(),
            credit_limit: 100_000.0,
            avg_repayment_time: 2.5,
            transaction_success_rate: 0.8,
            response_speed: 45.0,
            discount_hit_rate: 0.7,
            commission_acceptance_rate: 0.9,
            user_rating: 4,
            default_count: 0,
        };
        let row = serde_json::to_value(&features).unwrap();
        for field in [
            "user_id",
            "credit_limit",
            "avg_repayment_time",
            "transaction_success_rate",
            "response_speed",
            "discount_hit_rate",
            "commission_acceptance_rate",
            "user_rating",
            "default_count",
        ] {
            assert!(row.get(field).is_some(), "feature row is missing {field}");
        }
        // Responses come back keyed by cardholder_id under ranked_cardholders, with fields we ignore
        let payload: RankBatchPayload = serde_json::from_str(
            r#"{
                "request_id": "a2b9",
                "timestamp": "2026-08-25T10:00:00",
                "processing_time_ms": 12.5,
                "total_cardholders": 1,
                "ranked_cardholders": [
                    {"cardholder_id": "holder@example.com", "health_score": 0.87, "rank": 1, "credit_limit": 100000.0, "user_rating": 4}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(payload.ranked_cardholders.len(), 1);
        assert_eq!(payload.ranked_cardholders[0].cardholder_id, "holder@example.com");
        assert!((payload.ranked_cardholders[0].health_score - 0.87).abs() < 1e-9);
    }

    #[tokio::test]
    async fn unreachable_service_is_unhealthy() {
        let client = client();
        assert!(!client.is_healthy().await);
        let err = client.rank_batch(&[]).await.unwrap_err();
        assert!(matches!(err, RankingError::Unavailable(_)));
    }
}
