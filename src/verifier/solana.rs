use std::{str::FromStr, sync::Arc};

use anyhow::{Context, Result};
use async_trait::async_trait;
use solana_client::{nonblocking::rpc_client::RpcClient, rpc_config::RpcSimulateTransactionConfig};
use solana_sdk::{
    bs58,
    commitment_config::CommitmentConfig,
    instruction::Instruction,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    transaction::Transaction,
};
use tracing::{debug, info, warn};

use super::{ChainVerifier, VerificationRequest, VerificationResult};
use crate::{config, proof::ChainSelector};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Simulation {
    pub signature: String,
    pub err: Option<String>,
    pub logs: Vec<String>,
}

/// Runs a verification instruction against the ledger without committing it.
#[async_trait]
pub trait Simulator: Send + Sync {
    /// Account paying for the simulated transaction. The ledger loads it even when
    /// signatures are not verified, so it must exist there.
    fn fee_payer(&self) -> Option<Pubkey>;

    async fn simulate(&self, program_id: Pubkey, data: Vec<u8>) -> Result<Simulation>;
}

pub struct RpcSimulator {
    rpc_client: RpcClient,
    payer: Option<Keypair>,
}

impl RpcSimulator {
    pub fn new(rpc_http_url: String, payer: Option<Keypair>) -> Self {
        Self {
            rpc_client: RpcClient::new_with_commitment(
                rpc_http_url,
                CommitmentConfig::confirmed(),
            ),
            payer,
        }
    }
}

#[async_trait]
impl Simulator for RpcSimulator {
    fn fee_payer(&self) -> Option<Pubkey> {
        self.payer.as_ref().map(Signer::pubkey)
    }

    async fn simulate(&self, program_id: Pubkey, data: Vec<u8>) -> Result<Simulation> {
        let payer = self
            .payer
            .as_ref()
            .context("Fee payer is not configured (`SOLANA_PAYER_KEYPAIR`)")?;
        let instruction = Instruction::new_with_bytes(program_id, &data, Vec::new());

        let recent_blockhash = self
            .rpc_client
            .get_latest_blockhash()
            .await
            .context("Failed to fetch latest blockhash")?;

        let transaction = Transaction::new_signed_with_payer(
            &[instruction],
            Some(&payer.pubkey()),
            &[payer],
            recent_blockhash,
        );

        let signature = transaction
            .signatures
            .first()
            .map(ToString::to_string)
            .context("Simulated transaction carries no signature")?;

        let response = self
            .rpc_client
            .simulate_transaction_with_config(
                &transaction,
                RpcSimulateTransactionConfig {
                    sig_verify: false,
                    replace_recent_blockhash: false,
                    commitment: Some(CommitmentConfig::confirmed()),
                    ..Default::default()
                },
            )
            .await
            .context("Failed to simulate verification transaction")?;

        Ok(Simulation {
            signature,
            err: response.value.err.map(|err| err.to_string()),
            logs: response.value.logs.unwrap_or_default(),
        })
    }
}

pub struct SolanaVerifier {
    simulator: Arc<dyn Simulator>,
    program_id: Option<String>,
    cluster: String,
    explorer_url: String,
}

impl SolanaVerifier {
    pub fn new(simulator: Arc<dyn Simulator>, solana: &config::Solana) -> Self {
        Self {
            simulator,
            program_id: solana.program_id.clone(),
            cluster: solana.cluster.clone(),
            explorer_url: solana.explorer_url.clone(),
        }
    }

    pub fn from_config(solana: &config::Solana) -> Result<Self> {
        let payer = config::get_solana_payer_keypair()
            .map(|encoded| {
                let bytes = bs58::decode(encoded.trim())
                    .into_vec()
                    .context("`SOLANA_PAYER_KEYPAIR` is not valid base58")?;
                Keypair::from_bytes(&bytes)
                    .map_err(|err| anyhow::anyhow!("Invalid `SOLANA_PAYER_KEYPAIR`: {err}"))
            })
            .transpose()?;

        let simulator = RpcSimulator::new(solana.rpc_http_url.clone(), payer);

        Ok(Self::new(Arc::new(simulator), solana))
    }

    pub fn explorer_tx_url(&self, signature: &str) -> String {
        format!(
            "{}/tx/{signature}?cluster={}",
            self.explorer_url.trim_end_matches('/'),
            self.cluster
        )
    }

    fn program_id(&self) -> Result<Pubkey, String> {
        let Some(program_id) = self
            .program_id
            .as_deref()
            .map(str::trim)
            .filter(|program_id| !program_id.is_empty())
        else {
            return Err("Verifier program id is not configured (`SOLANA_PROGRAM_ID`)".to_string());
        };

        Pubkey::from_str(program_id)
            .map_err(|err| format!("Invalid verifier program id {program_id:?}: {err}"))
    }
}

#[async_trait]
impl ChainVerifier for SolanaVerifier {
    fn chain(&self) -> ChainSelector {
        ChainSelector::Solana
    }

    async fn verify(&self, request: &VerificationRequest) -> VerificationResult {
        let VerificationRequest::Solana { artifact } = request else {
            return VerificationResult::chain_mismatch(self.chain(), request.chain());
        };

        let program_id = match self.program_id() {
            Ok(program_id) => program_id,
            Err(err) => {
                warn!("{err}");
                return VerificationResult::failure(err);
            }
        };

        let Some(fee_payer) = self.simulator.fee_payer() else {
            warn!("Solana fee payer is not configured");
            return VerificationResult::failure(
                "Fee payer is not configured (`SOLANA_PAYER_KEYPAIR`)",
            );
        };

        if !artifact.has_proof() {
            return VerificationResult::failure("Proof data is missing");
        }

        let (mut data, public_witness) =
            match (artifact.proof_bytes(), artifact.public_witness_bytes()) {
                (Ok(proof), Ok(public_witness)) => (proof, public_witness),
                (Err(err), _) | (_, Err(err)) => {
                    return VerificationResult::failure(format!(
                        "Malformed proof payload: {err:#}"
                    ));
                }
            };

        info!("Verifying Solana proof with program {program_id}, fee payer {fee_payer}");
        debug!(
            "Proof length: {} bytes, public witness: {} bytes",
            data.len(),
            public_witness.len()
        );

        data.extend(public_witness);

        match self.simulator.simulate(program_id, data).await {
            Ok(Simulation {
                signature,
                err: None,
                ..
            }) => {
                info!("Solana proof verified ({signature})");
                let explorer_url = self.explorer_tx_url(&signature);
                VerificationResult::with_reference(signature, explorer_url)
            }
            Ok(Simulation {
                err: Some(err), logs, ..
            }) => {
                warn!("Solana simulation rejected the proof: {err}");
                match logs.last() {
                    Some(log) => VerificationResult::failure(format!("{err} ({log})")),
                    None => VerificationResult::failure(err),
                }
            }
            Err(err) => {
                warn!("Solana verification error: {err:#}");
                VerificationResult::failure(format!("{err:#}"))
            }
        }
    }
}
