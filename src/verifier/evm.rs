use std::sync::Arc;

use alloy::{
    network::EthereumWallet,
    primitives::{Address, B256, Bytes},
    providers::{DynProvider, ProviderBuilder},
    signers::{Signer, local::PrivateKeySigner},
    sol,
    transports::RpcError,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{ChainVerifier, VerificationRequest, VerificationResult};
use crate::{
    config, defaults,
    proof::{ChainSelector, ProofArtifact, VerifyMode},
};

sol! {
    #[sol(rpc)]
    interface IProofVerifier {
        function verify(bytes calldata proof, bytes32[] calldata publicInputs) external view returns (bool);
        function verifyAndConsume(bytes calldata proof, bytes32[] calldata publicInputs) external returns (bool);
    }
}

pub fn hide_api_key<E: ToString>(err: &E) -> String {
    let api_key = std::env::var(defaults::RPC_API_KEY_ENV).unwrap_or_default();
    let message = err.to_string();

    if api_key.is_empty() {
        return message;
    }

    message.replace(&api_key, defaults::RPC_API_KEY_ENV)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractError {
    #[error("RPC unreachable: {0}")]
    Unreachable(String),
    #[error("Verifier contract reverted: {0}")]
    Reverted(String),
    #[error("On-chain submission requires `BASE_RELAYER_PRIVATE_KEY` to be configured")]
    MissingSigner,
    #[error("{0}")]
    Other(String),
}

impl From<alloy::contract::Error> for ContractError {
    fn from(err: alloy::contract::Error) -> Self {
        match err {
            alloy::contract::Error::TransportError(RpcError::ErrorResp(payload)) => {
                Self::Reverted(payload.message.to_string())
            }
            alloy::contract::Error::TransportError(RpcError::Transport(kind)) => {
                Self::Unreachable(hide_api_key(&kind))
            }
            other => Self::Other(hide_api_key(&other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedProof {
    pub tx_hash: B256,
    pub succeeded: bool,
}

/// Calls into the deployed verifier contract.
#[async_trait]
pub trait VerifierContract: Send + Sync {
    async fn check(&self, proof: Bytes, public_inputs: Vec<B256>) -> Result<bool, ContractError>;

    async fn submit(
        &self,
        proof: Bytes,
        public_inputs: Vec<B256>,
    ) -> Result<SubmittedProof, ContractError>;
}

pub struct AlloyVerifierContract {
    provider: DynProvider,
    signer_provider: Option<DynProvider>,
    address: Address,
}

impl AlloyVerifierContract {
    pub fn new(base: &config::Base, relayer_private_key: Option<&str>) -> Result<Self> {
        let rpc_http_url: reqwest::Url = base
            .rpc_http_url
            .parse()
            .context("Failed to parse Base rpc provider as url")?;

        let provider = DynProvider::new(ProviderBuilder::new().connect_http(rpc_http_url.clone()));

        let signer_provider = match relayer_private_key {
            Some(private_key) => {
                let signer = private_key
                    .trim()
                    .parse::<PrivateKeySigner>()
                    .context("Failed to parse Base relayer private key")?
                    .with_chain_id(Some(base.chain_id));
                info!("On-chain submissions will be signed by {}", signer.address());

                Some(DynProvider::new(
                    ProviderBuilder::new()
                        .wallet(EthereumWallet::from(signer))
                        .connect_http(rpc_http_url),
                ))
            }
            None => None,
        };

        Ok(Self {
            provider,
            signer_provider,
            address: base.verifier_address,
        })
    }
}

#[async_trait]
impl VerifierContract for AlloyVerifierContract {
    async fn check(&self, proof: Bytes, public_inputs: Vec<B256>) -> Result<bool, ContractError> {
        let verifier = IProofVerifier::new(self.address, &self.provider);

        Ok(verifier.verify(proof, public_inputs).call().await?)
    }

    async fn submit(
        &self,
        proof: Bytes,
        public_inputs: Vec<B256>,
    ) -> Result<SubmittedProof, ContractError> {
        let Some(provider) = &self.signer_provider else {
            return Err(ContractError::MissingSigner);
        };

        let verifier = IProofVerifier::new(self.address, provider);
        let pending = verifier
            .verifyAndConsume(proof, public_inputs)
            .send()
            .await?;

        let tx_hash = *pending.tx_hash();
        info!("Submitted proof to Base verifier ({tx_hash})");

        let receipt = pending
            .get_receipt()
            .await
            .map_err(|err| ContractError::Unreachable(hide_api_key(&err)))?;

        Ok(SubmittedProof {
            tx_hash: receipt.transaction_hash,
            succeeded: receipt.status(),
        })
    }
}

pub struct EvmVerifier {
    contract: Arc<dyn VerifierContract>,
    explorer_url: String,
}

impl EvmVerifier {
    pub fn new(contract: Arc<dyn VerifierContract>, explorer_url: impl Into<String>) -> Self {
        Self {
            contract,
            explorer_url: explorer_url.into(),
        }
    }

    pub fn from_config(base: &config::Base) -> Result<Self> {
        let relayer_private_key = config::get_base_relayer_private_key();
        let contract = AlloyVerifierContract::new(base, relayer_private_key.as_deref())?;

        Ok(Self::new(Arc::new(contract), base.explorer_url.clone()))
    }

    fn tx_url(&self, tx_hash: &B256) -> String {
        format!("{}/tx/{tx_hash}", self.explorer_url.trim_end_matches('/'))
    }
}

fn encode_artifact(artifact: &ProofArtifact) -> Result<(Bytes, Vec<B256>)> {
    if !artifact.has_proof() {
        anyhow::bail!("Proof data is missing");
    }

    let proof = Bytes::from(artifact.proof_bytes()?);
    let public_inputs = artifact
        .public_input_words()?
        .into_iter()
        .map(B256::from)
        .collect();

    Ok((proof, public_inputs))
}

#[async_trait]
impl ChainVerifier for EvmVerifier {
    fn chain(&self) -> ChainSelector {
        ChainSelector::Base
    }

    async fn verify(&self, request: &VerificationRequest) -> VerificationResult {
        let VerificationRequest::Evm { artifact, mode } = request else {
            return VerificationResult::chain_mismatch(self.chain(), request.chain());
        };

        let (proof, public_inputs) = match encode_artifact(artifact) {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!("Rejecting malformed proof before dispatch: {err:#}");
                return VerificationResult::failure(format!("Malformed proof payload: {err:#}"));
            }
        };

        debug!(
            "Verifying {mode} on Base: proof {} bytes, {} public inputs",
            proof.len(),
            public_inputs.len()
        );

        match mode {
            VerifyMode::Offchain => match self.contract.check(proof, public_inputs).await {
                Ok(true) => VerificationResult::verified(),
                Ok(false) => VerificationResult::failure("invalid proof"),
                Err(err) => {
                    warn!("Base verifier call failed: {err}");
                    VerificationResult::failure(err.to_string())
                }
            },
            VerifyMode::Onchain => match self.contract.submit(proof, public_inputs).await {
                Ok(SubmittedProof {
                    tx_hash,
                    succeeded: true,
                }) => VerificationResult::with_reference(tx_hash.to_string(), self.tx_url(&tx_hash)),
                Ok(SubmittedProof { tx_hash, .. }) => {
                    VerificationResult::failure(format!("Verification transaction {tx_hash} reverted"))
                }
                Err(err) => {
                    warn!("Base verifier submission failed: {err}");
                    VerificationResult::failure(err.to_string())
                }
            },
        }
    }
}
