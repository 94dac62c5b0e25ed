//! Proof verification session.
//!
//! The session owns the proof artifact, the chain it is locked to and the outcome of the
//! latest attempt. Every state change goes through [`VerificationSession::transition`] so the
//! chain lock and the "exactly one of result or error" rule are kept in one place.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::{
    defaults,
    error::SessionError,
    issuer::{IssueRequest, ProofIssuer},
    proof::{ChainSelector, ProofArtifact, VerifyMode},
    verifier::{VerificationRequest, VerificationResult, Verifiers},
};

const EVENT_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Idle,
    FetchingProof,
    ReadyToVerify,
    Verifying,
    Succeeded,
    Failed,
}

/// One-way notifications, dropped when nobody listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    ProofAcquired {
        chain: ChainSelector,
    },
    /// Emitted once per successful verification.
    Celebrate {
        chain: ChainSelector,
        result: VerificationResult,
    },
    AttemptFailed {
        status_before: SessionStatus,
        error: String,
    },
}

pub struct VerificationSession {
    issuer: Arc<dyn ProofIssuer>,
    verifiers: Verifiers,
    status: SessionStatus,
    candidate_chain: Option<ChainSelector>,
    // Set by the first accepted artifact and never cleared.
    locked_chain: Option<ChainSelector>,
    artifact: Option<ProofArtifact>,
    result: Option<VerificationResult>,
    error: Option<String>,
    last_success_at: Option<DateTime<Utc>>,
    events: broadcast::Sender<SessionEvent>,
}

impl VerificationSession {
    pub fn new(issuer: Arc<dyn ProofIssuer>, verifiers: Verifiers) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            issuer,
            verifiers,
            status: SessionStatus::Idle,
            candidate_chain: None,
            locked_chain: None,
            artifact: None,
            result: None,
            error: None,
            last_success_at: None,
            events,
        }
    }

    pub const fn status(&self) -> SessionStatus {
        self.status
    }

    /// Chain of the held proof, or the one being fetched.
    pub fn chain(&self) -> Option<ChainSelector> {
        self.locked_chain.or(self.candidate_chain)
    }

    pub const fn locked_chain(&self) -> Option<ChainSelector> {
        self.locked_chain
    }

    pub const fn artifact(&self) -> Option<&ProofArtifact> {
        self.artifact.as_ref()
    }

    pub const fn result(&self) -> Option<&VerificationResult> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Signature or transaction hash of the last successful verification.
    pub fn transaction_reference(&self) -> Option<&str> {
        self.result.as_ref().and_then(VerificationResult::reference)
    }

    pub fn export_proof_json(&self) -> Option<anyhow::Result<String>> {
        self.artifact.as_ref().map(ProofArtifact::export_json)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn celebration_active(&self, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::Succeeded
            && self.last_success_at.is_some_and(|at| {
                now >= at && now - at < Duration::seconds(defaults::CELEBRATION_WINDOW_SECS)
            })
    }

    /// Fetches a new proof for `chain`, discarding whatever the session held before.
    ///
    /// Once a proof has been accepted the session stays locked to its chain, so
    /// regenerating must request the same chain again.
    pub async fn request_proof(&mut self, chain: ChainSelector) -> Result<(), SessionError> {
        if matches!(
            self.status,
            SessionStatus::FetchingProof | SessionStatus::Verifying
        ) {
            return Err(SessionError::InvalidTransition {
                operation: "request a proof",
                status: self.status,
            });
        }

        if let Some(locked) = self.locked_chain {
            if locked != chain {
                return Err(SessionError::ChainLocked {
                    locked,
                    requested: chain,
                });
            }
        }

        self.artifact = None;
        self.result = None;
        self.error = None;
        self.candidate_chain = Some(chain);
        self.transition(SessionStatus::FetchingProof);

        let request = IssueRequest::for_chain(chain);
        let outcome = self.issuer.issue(&request).await;

        let artifact = match outcome {
            Ok(artifact) if !artifact.has_proof() => {
                Err("Issuer returned a proof artifact without proof data".to_string())
            }
            Ok(artifact) => match artifact.produced_for() {
                Some(produced_for) if produced_for != chain => Err(format!(
                    "Issuer returned a proof for {produced_for} instead of {chain}"
                )),
                _ => Ok(artifact.produced_for_chain(chain)),
            },
            Err(err) => Err(format!("{err:#}")),
        };

        match artifact {
            Ok(artifact) => {
                self.artifact = Some(artifact);
                self.locked_chain = Some(chain);
                self.transition(SessionStatus::ReadyToVerify);
                self.notify(SessionEvent::ProofAcquired { chain });

                Ok(())
            }
            Err(error) => {
                self.fail(error.clone());
                Err(SessionError::Acquisition(error))
            }
        }
    }

    /// Requests a fresh proof for the chain the session already uses.
    pub async fn regenerate(&mut self) -> Result<(), SessionError> {
        let chain = self.chain().ok_or(SessionError::NoChainSelected)?;
        self.request_proof(chain).await
    }

    /// Verifies the held proof on its locked chain.
    ///
    /// The returned result is also stored on the session; a rejected call leaves the
    /// session untouched.
    pub async fn verify(&mut self, mode: VerifyMode) -> Result<VerificationResult, SessionError> {
        if self.status != SessionStatus::ReadyToVerify {
            return Err(SessionError::InvalidTransition {
                operation: "verify",
                status: self.status,
            });
        }

        let (Some(chain), Some(artifact)) = (self.locked_chain, self.artifact.clone()) else {
            return Err(SessionError::InvalidTransition {
                operation: "verify without a proof",
                status: self.status,
            });
        };

        let request = VerificationRequest::new(chain, artifact, mode)?;
        let verifier = Arc::clone(self.verifiers.for_chain(chain));

        self.result = None;
        self.error = None;
        self.transition(SessionStatus::Verifying);

        info!("Dispatching {mode} verification to {} verifier", chain.display_name());
        let result = verifier.verify(&request).await;

        match &result {
            VerificationResult::Success { .. } => {
                self.result = Some(result.clone());
                self.error = None;
                self.last_success_at = Some(Utc::now());
                self.transition(SessionStatus::Succeeded);
                self.notify(SessionEvent::Celebrate {
                    chain,
                    result: result.clone(),
                });
            }
            VerificationResult::Failure { error } => self.fail(error.clone()),
        }

        Ok(result)
    }

    /// Returns a finished attempt to `ReadyToVerify` so the same proof can be verified
    /// again, for example on-chain after an off-chain check.
    pub fn rearm(&mut self) -> Result<(), SessionError> {
        if !matches!(
            self.status,
            SessionStatus::Succeeded | SessionStatus::Failed
        ) || self.artifact.is_none()
        {
            return Err(SessionError::InvalidTransition {
                operation: "re-verify",
                status: self.status,
            });
        }

        self.result = None;
        self.error = None;
        self.transition(SessionStatus::ReadyToVerify);

        Ok(())
    }

    /// Drops the artifact and outcome. The chain lock survives.
    pub fn reset(&mut self) {
        self.artifact = None;
        self.result = None;
        self.error = None;
        self.candidate_chain = None;
        self.last_success_at = None;
        self.transition(SessionStatus::Idle);
    }

    fn fail(&mut self, error: String) {
        let status_before = self.status;

        warn!("Session attempt failed while {status_before:?}: {error}");

        if status_before == SessionStatus::FetchingProof {
            self.artifact = None;
        }
        self.result = None;
        self.error = Some(error.clone());
        self.transition(SessionStatus::Failed);
        self.notify(SessionEvent::AttemptFailed {
            status_before,
            error,
        });
    }

    fn transition(&mut self, to: SessionStatus) {
        if self.status != to {
            info!("Session {:?} -> {to:?}", self.status);
        }
        self.status = to;
    }

    fn notify(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
