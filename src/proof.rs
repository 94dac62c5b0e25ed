use std::{fmt, str::FromStr};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::defaults;

/// Ledger a proof is produced for and verified against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainSelector {
    Base,
    Solana,
}

impl ChainSelector {
    pub const fn circuit_id(self) -> &'static str {
        match self {
            Self::Base => defaults::BASE_CIRCUIT_ID,
            Self::Solana => defaults::SOLANA_CIRCUIT_ID,
        }
    }

    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Base => "Base",
            Self::Solana => "Solana",
        }
    }
}

impl fmt::Display for ChainSelector {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Base => write!(f, "base"),
            Self::Solana => write!(f, "solana"),
        }
    }
}

impl FromStr for ChainSelector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "base" => Ok(Self::Base),
            "solana" | "sol" => Ok(Self::Solana),
            other => Err(format!("Unsupported chain: {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifyMode {
    /// Read-only check, nothing is submitted.
    Offchain,
    Onchain,
}

impl fmt::Display for VerifyMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Offchain => write!(f, "offchain"),
            Self::Onchain => write!(f, "onchain"),
        }
    }
}

impl FromStr for VerifyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "offchain" => Ok(Self::Offchain),
            "onchain" => Ok(Self::Onchain),
            other => Err(format!("Unsupported verification mode: {other:?}")),
        }
    }
}

/// Proof payload as returned by the issuing portal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofArtifact {
    pub proof: String,
    #[serde(default)]
    pub public_inputs: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_witness: Option<Value>,
    #[serde(default)]
    pub meta: Value,
    #[serde(skip)]
    produced_for: Option<ChainSelector>,
}

impl ProofArtifact {
    pub fn new(proof: impl Into<String>, public_inputs: impl Into<Value>) -> Self {
        Self {
            proof: proof.into(),
            public_inputs: public_inputs.into(),
            public_witness: None,
            meta: Value::Null,
            produced_for: None,
        }
    }

    #[must_use]
    pub fn with_public_witness(mut self, public_witness: impl Into<Value>) -> Self {
        self.public_witness = Some(public_witness.into());
        self
    }

    #[must_use]
    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = meta;
        self
    }

    /// Marks the chain whose circuit produced this artifact.
    #[must_use]
    pub const fn produced_for_chain(mut self, chain: ChainSelector) -> Self {
        self.produced_for = Some(chain);
        self
    }

    pub const fn produced_for(&self) -> Option<ChainSelector> {
        self.produced_for
    }

    pub fn has_proof(&self) -> bool {
        !self.proof.trim().is_empty()
    }

    pub fn proof_bytes(&self) -> Result<Vec<u8>> {
        decode_hex(&self.proof).context("Proof payload is not valid hex")
    }

    /// Witness handed to the simulation ledger: the explicit witness, else the public
    /// inputs, else nothing.
    pub fn resolved_public_witness(&self) -> &Value {
        match &self.public_witness {
            Some(witness) if !is_empty_value(witness) => witness,
            _ => &self.public_inputs,
        }
    }

    pub fn public_witness_bytes(&self) -> Result<Vec<u8>> {
        value_bytes(self.resolved_public_witness()).context("Public witness is not valid hex")
    }

    /// Public inputs as 32-byte words. A single hex string is split into words, an array
    /// holds one (possibly shorter, left-padded) word per entry.
    pub fn public_input_words(&self) -> Result<Vec<[u8; 32]>> {
        match &self.public_inputs {
            Value::Null => Ok(Vec::new()),
            Value::String(inputs) => {
                let bytes = decode_hex(inputs).context("Public inputs are not valid hex")?;
                if bytes.len() % 32 != 0 {
                    anyhow::bail!(
                        "Public inputs length {} is not a multiple of 32 bytes",
                        bytes.len()
                    );
                }
                Ok(bytes
                    .chunks_exact(32)
                    .map(|chunk| {
                        let mut word = [0u8; 32];
                        word.copy_from_slice(chunk);
                        word
                    })
                    .collect())
            }
            Value::Array(entries) => entries
                .iter()
                .enumerate()
                .map(|(index, entry)| {
                    let Value::String(entry) = entry else {
                        anyhow::bail!("Public input #{index} is not a string: {entry}");
                    };
                    left_pad_word(&decode_hex_quantity(entry).with_context(|| {
                        format!("Public input #{index} is not valid hex")
                    })?)
                    .with_context(|| format!("Public input #{index} is longer than 32 bytes"))
                })
                .collect(),
            other => anyhow::bail!("Unsupported public inputs shape: {other}"),
        }
    }

    /// Pretty-printed `{proof, publicInputs, meta}` document for sharing.
    pub fn export_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&json!({
            "proof": self.proof,
            "publicInputs": self.public_inputs,
            "meta": self.meta,
        }))
        .context("Failed to serialize proof artifact")
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(entries) => entries.is_empty(),
        _ => false,
    }
}

fn value_bytes(value: &Value) -> Result<Vec<u8>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::String(s) => decode_hex(s),
        Value::Array(entries) => entries.iter().try_fold(Vec::new(), |mut acc, entry| {
            acc.extend(value_bytes(entry)?);
            Ok(acc)
        }),
        other => anyhow::bail!("Unsupported witness shape: {other}"),
    }
}

fn decode_hex(value: &str) -> Result<Vec<u8>> {
    let value = value.trim();
    let value = value.strip_prefix("0x").unwrap_or(value);

    Ok(hex::decode(value)?)
}

/// Single public input entry, where `0x1` stands for the field element one.
fn decode_hex_quantity(value: &str) -> Result<Vec<u8>> {
    let value = value.trim();
    let value = value.strip_prefix("0x").unwrap_or(value);

    if value.len() % 2 == 1 {
        return Ok(hex::decode(format!("0{value}"))?);
    }

    Ok(hex::decode(value)?)
}

fn left_pad_word(bytes: &[u8]) -> Option<[u8; 32]> {
    if bytes.len() > 32 {
        return None;
    }

    let mut word = [0u8; 32];
    word[32 - bytes.len()..].copy_from_slice(bytes);
    Some(word)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[rstest]
    #[case("base", ChainSelector::Base)]
    #[case("Solana", ChainSelector::Solana)]
    #[case(" sol ", ChainSelector::Solana)]
    fn test_chain_selector_parsing(#[case] input: &str, #[case] expected: ChainSelector) {
        assert_eq!(input.parse::<ChainSelector>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_chain_is_rejected() {
        assert!("ethereum".parse::<ChainSelector>().is_err());
    }

    #[test]
    fn test_circuit_ids_differ_per_chain() {
        assert_eq!(ChainSelector::Base.circuit_id(), "coinbase_kyc");
        assert_eq!(ChainSelector::Solana.circuit_id(), "coinbase_kyc_solana");
    }

    #[test]
    fn test_artifact_deserializes_portal_shape() {
        let artifact: ProofArtifact = serde_json::from_value(json!({
            "proof": "0xdeadbeef",
            "publicInputs": ["0x01", "0x02"],
            "meta": { "circuitId": "coinbase_kyc" }
        }))
        .unwrap();

        assert_eq!(artifact.proof_bytes().unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert!(artifact.public_witness.is_none());
        assert!(artifact.produced_for().is_none());
        assert_eq!(artifact.meta["circuitId"], "coinbase_kyc");
    }

    #[test]
    fn test_missing_public_inputs_default_to_null() {
        let artifact: ProofArtifact =
            serde_json::from_value(json!({ "proof": "0x00" })).unwrap();

        assert!(artifact.public_input_words().unwrap().is_empty());
        assert!(artifact.public_witness_bytes().unwrap().is_empty());
    }

    #[test]
    fn test_public_input_array_is_left_padded() {
        let artifact = ProofArtifact::new("0x00", json!(["0x01", "ff"]));
        let words = artifact.public_input_words().unwrap();

        assert_eq!(words.len(), 2);
        assert_eq!(words[0][31], 1);
        assert!(words[0][..31].iter().all(|byte| *byte == 0));
        assert_eq!(words[1][31], 0xff);
    }

    #[test]
    fn test_public_input_string_is_chunked() {
        let inputs = format!("0x{}{}", "00".repeat(31) + "07", "11".repeat(32));
        let artifact = ProofArtifact::new("0x00", inputs);
        let words = artifact.public_input_words().unwrap();

        assert_eq!(words.len(), 2);
        assert_eq!(words[0][31], 7);
        assert_eq!(words[1], [0x11; 32]);
    }

    #[rstest]
    #[case(json!("0x0102"))]
    #[case(json!(["0x".to_string() + &"ab".repeat(33)]))]
    #[case(json!([1, 2]))]
    #[case(json!({ "a": 1 }))]
    fn test_malformed_public_inputs(#[case] inputs: Value) {
        let artifact = ProofArtifact::new("0x00", inputs);
        assert!(artifact.public_input_words().is_err());
    }

    #[rstest]
    #[case("not-hex")]
    #[case("0xabc")]
    #[case("abc")]
    fn test_malformed_proof_payload(#[case] proof: &str) {
        let artifact = ProofArtifact::new(proof, Value::Null);
        assert!(artifact.proof_bytes().is_err());
    }

    #[test]
    fn test_odd_length_witness_is_rejected() {
        let artifact = ProofArtifact::new("0x00", Value::Null).with_public_witness("0x123");
        assert!(artifact.public_witness_bytes().is_err());
    }

    #[test]
    fn test_short_public_input_entry_is_padded() {
        let artifact = ProofArtifact::new("0x00", json!(["0x1", "0xabc"]));
        let words = artifact.public_input_words().unwrap();

        assert_eq!(words[0][31], 1);
        assert_eq!(words[1][30..], [0x0a, 0xbc]);
    }

    #[test]
    fn test_public_witness_fallback_order() {
        let artifact = ProofArtifact::new("0x00", "0x0a0b");
        assert_eq!(artifact.public_witness_bytes().unwrap(), vec![0x0a, 0x0b]);

        let artifact = artifact.with_public_witness("0x0c");
        assert_eq!(artifact.public_witness_bytes().unwrap(), vec![0x0c]);

        let artifact = ProofArtifact::new("0x00", "").with_public_witness("");
        assert!(artifact.public_witness_bytes().unwrap().is_empty());
    }

    #[test]
    fn test_export_json_only_carries_shared_fields() {
        let artifact = ProofArtifact::new("0xab", json!(["0x01"]))
            .with_public_witness("0x02")
            .with_meta(json!({ "nullifier": "0x99" }))
            .produced_for_chain(ChainSelector::Solana);

        let exported: Value = serde_json::from_str(&artifact.export_json().unwrap()).unwrap();

        assert_eq!(
            exported,
            json!({
                "proof": "0xab",
                "publicInputs": ["0x01"],
                "meta": { "nullifier": "0x99" }
            })
        );
    }
}
