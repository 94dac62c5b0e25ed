//! Proof acquisition from the issuing portal.
//!
//! The portal runs the user-facing attestation flow; this side only opens a request for a
//! circuit, points the user at the portal URL and waits for the proof to come back.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    config, defaults,
    proof::{ChainSelector, ProofArtifact},
};

/// Request descriptor handed to the issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueRequest {
    pub circuit_id: String,
}

impl IssueRequest {
    pub fn for_chain(chain: ChainSelector) -> Self {
        Self {
            circuit_id: chain.circuit_id().to_string(),
        }
    }
}

#[async_trait]
pub trait ProofIssuer: Send + Sync {
    /// Resolves once the user completed (or abandoned) the portal flow.
    async fn issue(&self, request: &IssueRequest) -> Result<ProofArtifact>;
}

/// Proof request opened on the portal.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenedRequest {
    pub request_id: String,
    /// Page the user completes the attestation flow on.
    pub portal_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RequestStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Deserialize)]
struct PollResponse {
    status: RequestStatus,
    #[serde(default)]
    proof: Option<ProofArtifact>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum PollState {
    Pending,
    Ready(ProofArtifact),
    Rejected(String),
}

impl PollResponse {
    fn into_state(self) -> PollState {
        match self.status {
            RequestStatus::Pending => PollState::Pending,
            RequestStatus::Completed => match self.proof {
                Some(proof) => PollState::Ready(proof),
                None => {
                    PollState::Rejected("Portal completed without returning a proof".to_string())
                }
            },
            RequestStatus::Failed => PollState::Rejected(
                self.error
                    .unwrap_or_else(|| "Failed to get proof".to_string()),
            ),
            RequestStatus::Cancelled => PollState::Rejected(
                self.error
                    .unwrap_or_else(|| "Proof request was cancelled".to_string()),
            ),
        }
    }
}

/// The two portal endpoints the issuer drives.
#[async_trait]
pub trait PortalApi: Send + Sync {
    async fn open(&self, request: &IssueRequest) -> Result<OpenedRequest>;

    async fn poll(&self, request_id: &str) -> Result<PollState>;
}

pub struct HttpPortalApi {
    http_client: reqwest::Client,
    api_url: String,
}

impl HttpPortalApi {
    pub fn new(api_url: &str) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(defaults::ISSUER_REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to build portal http client")?;

        Ok(Self {
            http_client,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    fn requests_url(&self) -> String {
        format!("{}/api/v1/proof-requests", self.api_url)
    }

    fn request_url(&self, request_id: &str) -> String {
        format!("{}/{request_id}", self.requests_url())
    }
}

#[async_trait]
impl PortalApi for HttpPortalApi {
    async fn open(&self, request: &IssueRequest) -> Result<OpenedRequest> {
        self.http_client
            .post(self.requests_url())
            .json(request)
            .send()
            .await
            .context("Proof portal is unreachable")?
            .error_for_status()
            .context("Proof portal refused the request")?
            .json()
            .await
            .context("Failed to parse proof portal response")
    }

    async fn poll(&self, request_id: &str) -> Result<PollState> {
        let response: PollResponse = self
            .http_client
            .get(self.request_url(request_id))
            .send()
            .await
            .context("Proof portal is unreachable")?
            .error_for_status()
            .context("Proof portal refused the status query")?
            .json()
            .await
            .context("Failed to parse proof request status")?;

        Ok(response.into_state())
    }
}

type PortalNotice = Box<dyn Fn(&OpenedRequest) + Send + Sync>;

pub struct PortalIssuer {
    api: Arc<dyn PortalApi>,
    poll_interval: Duration,
    max_poll_attempts: u32,
    on_opened: Option<PortalNotice>,
}

impl PortalIssuer {
    pub fn new(issuer: &config::Issuer) -> Result<Self> {
        let api_url = issuer
            .api_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .context("Proof portal api url is not configured (`PROOF_PORTAL_API_URL`)")?;

        Ok(Self::with_api(Arc::new(HttpPortalApi::new(api_url)?), issuer))
    }

    pub fn with_api(api: Arc<dyn PortalApi>, issuer: &config::Issuer) -> Self {
        Self {
            api,
            poll_interval: Duration::from_secs(issuer.poll_interval_secs),
            max_poll_attempts: issuer.max_poll_attempts,
            on_opened: None,
        }
    }

    /// Called once per request with the page the user has to visit.
    #[must_use]
    pub fn on_portal_opened(
        mut self,
        notice: impl Fn(&OpenedRequest) + Send + Sync + 'static,
    ) -> Self {
        self.on_opened = Some(Box::new(notice));
        self
    }
}

#[async_trait]
impl ProofIssuer for PortalIssuer {
    async fn issue(&self, request: &IssueRequest) -> Result<ProofArtifact> {
        let opened = self.api.open(request).await?;

        info!(
            "Waiting for proof from portal ({}), complete the flow at {}",
            request.circuit_id, opened.portal_url
        );
        if let Some(notice) = &self.on_opened {
            notice(&opened);
        }

        for attempt in 1..=self.max_poll_attempts {
            tokio::time::sleep(self.poll_interval).await;

            match self.api.poll(&opened.request_id).await {
                Ok(PollState::Pending) => {
                    debug!("Proof request {} still pending ({attempt})", opened.request_id);
                }
                Ok(PollState::Ready(artifact)) => {
                    info!("Received proof for request {}", opened.request_id);
                    return Ok(artifact);
                }
                Ok(PollState::Rejected(message)) => anyhow::bail!(message),
                Err(err) => {
                    warn!("Failed to poll proof request {}: {err:#}", opened.request_id);
                }
            }
        }

        anyhow::bail!(
            "Timed out waiting for proof request {} after {} attempts",
            opened.request_id,
            self.max_poll_attempts
        )
    }
}
