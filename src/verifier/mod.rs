use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    error::SessionError,
    proof::{ChainSelector, ProofArtifact, VerifyMode},
};

pub mod evm;
pub mod solana;

/// Verification backend for a single ledger.
///
/// `verify` never fails: every error path, including a request addressed to a
/// different chain, resolves to [`VerificationResult::Failure`].
#[async_trait]
pub trait ChainVerifier: Send + Sync {
    fn chain(&self) -> ChainSelector;

    async fn verify(&self, request: &VerificationRequest) -> VerificationResult;
}

#[derive(Debug, Clone, PartialEq)]
pub enum VerificationRequest {
    Evm {
        artifact: ProofArtifact,
        mode: VerifyMode,
    },
    /// Always simulated on-chain.
    Solana { artifact: ProofArtifact },
}

impl VerificationRequest {
    pub fn new(
        chain: ChainSelector,
        artifact: ProofArtifact,
        mode: VerifyMode,
    ) -> Result<Self, SessionError> {
        if let Some(produced_for) = artifact.produced_for() {
            if produced_for != chain {
                return Err(SessionError::ArtifactChainMismatch {
                    produced_for,
                    locked: chain,
                });
            }
        }

        match (chain, mode) {
            (ChainSelector::Base, mode) => Ok(Self::Evm { artifact, mode }),
            (ChainSelector::Solana, VerifyMode::Onchain) => Ok(Self::Solana { artifact }),
            (ChainSelector::Solana, mode) => Err(SessionError::UnsupportedMode { chain, mode }),
        }
    }

    pub const fn chain(&self) -> ChainSelector {
        match self {
            Self::Evm { .. } => ChainSelector::Base,
            Self::Solana { .. } => ChainSelector::Solana,
        }
    }

    pub const fn artifact(&self) -> &ProofArtifact {
        match self {
            Self::Evm { artifact, .. } | Self::Solana { artifact } => artifact,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VerificationResult {
    Success {
        /// Transaction hash or signature, when the check touched the ledger.
        reference: Option<String>,
        explorer_url: Option<String>,
    },
    Failure {
        error: String,
    },
}

impl VerificationResult {
    pub const fn verified() -> Self {
        Self::Success {
            reference: None,
            explorer_url: None,
        }
    }

    pub fn with_reference(reference: impl Into<String>, explorer_url: impl Into<String>) -> Self {
        Self::Success {
            reference: Some(reference.into()),
            explorer_url: Some(explorer_url.into()),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        let error = error.into();
        Self::Failure {
            error: if error.trim().is_empty() {
                "Verification failed".to_string()
            } else {
                error
            },
        }
    }

    pub fn chain_mismatch(expected: ChainSelector, requested: ChainSelector) -> Self {
        Self::failure(format!(
            "{} verifier cannot accept a proof for {}",
            expected.display_name(),
            requested.display_name()
        ))
    }

    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failure { error } => Some(error),
            Self::Success { .. } => None,
        }
    }

    pub fn reference(&self) -> Option<&str> {
        match self {
            Self::Success { reference, .. } => reference.as_deref(),
            Self::Failure { .. } => None,
        }
    }

    pub fn explorer_url(&self) -> Option<&str> {
        match self {
            Self::Success { explorer_url, .. } => explorer_url.as_deref(),
            Self::Failure { .. } => None,
        }
    }
}

/// One verifier per ledger, looked up by the session's locked chain.
#[derive(Clone)]
pub struct Verifiers {
    base: Arc<dyn ChainVerifier>,
    solana: Arc<dyn ChainVerifier>,
}

impl Verifiers {
    pub fn new(
        base: Arc<dyn ChainVerifier>,
        solana: Arc<dyn ChainVerifier>,
    ) -> anyhow::Result<Self> {
        if base.chain() != ChainSelector::Base {
            anyhow::bail!("Base slot was given a {} verifier", base.chain());
        }
        if solana.chain() != ChainSelector::Solana {
            anyhow::bail!("Solana slot was given a {} verifier", solana.chain());
        }

        Ok(Self { base, solana })
    }

    pub fn for_chain(&self, chain: ChainSelector) -> &Arc<dyn ChainVerifier> {
        match chain {
            ChainSelector::Base => &self.base,
            ChainSelector::Solana => &self.solana,
        }
    }
}
