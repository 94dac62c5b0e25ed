use std::path::Path;

use alloy::primitives::Address;
use anyhow::{Context, Result};

use crate::{defaults, proof::ChainSelector};

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub issuer: Issuer,
    #[serde(default)]
    pub base: Base,
    #[serde(default)]
    pub solana: Solana,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Issuer {
    pub api_url: Option<String>,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Base {
    #[serde(default = "default_base_rpc_url")]
    pub rpc_http_url: String,
    #[serde(default = "default_base_chain_id")]
    pub chain_id: u64,
    #[serde(default = "default_base_verifier_address")]
    pub verifier_address: Address,
    #[serde(default = "default_base_explorer_url")]
    pub explorer_url: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Solana {
    #[serde(default = "default_solana_rpc_url")]
    pub rpc_http_url: String,
    pub program_id: Option<String>,
    #[serde(default = "default_solana_cluster")]
    pub cluster: String,
    #[serde(default = "default_solana_explorer_url")]
    pub explorer_url: String,
}

impl Default for Issuer {
    fn default() -> Self {
        Self {
            api_url: None,
            poll_interval_secs: default_poll_interval_secs(),
            max_poll_attempts: default_max_poll_attempts(),
        }
    }
}

impl Default for Base {
    fn default() -> Self {
        Self {
            rpc_http_url: default_base_rpc_url(),
            chain_id: default_base_chain_id(),
            verifier_address: default_base_verifier_address(),
            explorer_url: default_base_explorer_url(),
        }
    }
}

impl Default for Solana {
    fn default() -> Self {
        Self {
            rpc_http_url: default_solana_rpc_url(),
            program_id: None,
            cluster: default_solana_cluster(),
            explorer_url: default_solana_explorer_url(),
        }
    }
}

const fn default_poll_interval_secs() -> u64 {
    defaults::ISSUER_POLL_INTERVAL_SECS
}

const fn default_max_poll_attempts() -> u32 {
    defaults::ISSUER_MAX_POLL_ATTEMPTS
}

fn default_base_rpc_url() -> String {
    defaults::BASE_RPC_MAINNET.to_string()
}

const fn default_base_chain_id() -> u64 {
    defaults::BASE_CHAIN_ID
}

const fn default_base_verifier_address() -> Address {
    defaults::BASE_VERIFIER_ADDRESS
}

fn default_base_explorer_url() -> String {
    defaults::BASE_EXPLORER_URL.to_string()
}

fn default_solana_rpc_url() -> String {
    defaults::SOLANA_RPC_DEVNET.to_string()
}

fn default_solana_cluster() -> String {
    defaults::SOLANA_CLUSTER.to_string()
}

fn default_solana_explorer_url() -> String {
    defaults::SOLANA_EXPLORER_URL.to_string()
}

impl Config {
    /// Reads the TOML file when one is given, then applies env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                toml::from_str::<Self>(&content)
                    .with_context(|| format!("Failed to parse config file {}", path.display()))?
            }
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;

        Ok(config)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(api_url) = lookup("PROOF_PORTAL_API_URL") {
            self.issuer.api_url = Some(api_url);
        }
        if let Some(rpc_url) = lookup("BASE_RPC_URL") {
            self.base.rpc_http_url = rpc_url;
        }
        if let Some(address) = lookup("BASE_VERIFIER_ADDRESS") {
            self.base.verifier_address = address
                .parse()
                .context("Invalid BASE_VERIFIER_ADDRESS")?;
        }
        if let Some(rpc_url) = lookup("SOLANA_RPC_URL") {
            self.solana.rpc_http_url = rpc_url;
        }
        if let Some(program_id) = lookup("SOLANA_PROGRAM_ID") {
            self.solana.program_id = Some(program_id);
        }

        Ok(())
    }

    /// Link to the deployed verifier for the given chain.
    pub fn verifier_link(&self, chain: ChainSelector) -> Option<String> {
        match chain {
            ChainSelector::Base => Some(format!(
                "{}/{}/{}",
                defaults::SOURCIFY_REPO_URL,
                self.base.chain_id,
                self.base.verifier_address.to_checksum(None)
            )),
            ChainSelector::Solana => self
                .solana
                .program_id
                .as_deref()
                .filter(|program_id| !program_id.trim().is_empty())
                .map(|program_id| {
                    format!(
                        "{}/address/{program_id}?cluster={}",
                        self.solana.explorer_url.trim_end_matches('/'),
                        self.solana.cluster
                    )
                }),
        }
    }
}

pub fn get_base_relayer_private_key() -> Option<String> {
    std::env::var("BASE_RELAYER_PRIVATE_KEY").ok()
}

pub fn get_solana_payer_keypair() -> Option<String> {
    std::env::var("SOLANA_PAYER_KEYPAIR").ok()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();

        assert_eq!(config.base.chain_id, 8453);
        assert_eq!(config.solana.rpc_http_url, defaults::SOLANA_RPC_DEVNET);
        assert_eq!(config.solana.cluster, "devnet");
        assert!(config.solana.program_id.is_none());
        assert!(config.issuer.api_url.is_none());
        assert_eq!(
            config.base.verifier_address,
            "0x4C163fa6756244e7f29Cb5BEA0458eA993Eb0F6d"
                .parse::<Address>()
                .unwrap()
        );
        assert_ne!(config.base.verifier_address, Address::ZERO);
    }

    #[test]
    fn test_partial_sections_are_filled() {
        let config: Config = toml::from_str(
            r#"
            [issuer]
            api_url = "http://localhost:8080"
            poll_interval_secs = 1

            [solana]
            program_id = "Verif1er111111111111111111111111111111111"
            cluster = "testnet"
            "#,
        )
        .unwrap();

        assert_eq!(config.issuer.api_url.as_deref(), Some("http://localhost:8080"));
        assert_eq!(config.issuer.poll_interval_secs, 1);
        assert_eq!(
            config.issuer.max_poll_attempts,
            defaults::ISSUER_MAX_POLL_ATTEMPTS
        );
        assert_eq!(config.solana.cluster, "testnet");
        assert_eq!(config.solana.explorer_url, defaults::SOLANA_EXPLORER_URL);
    }

    #[test]
    fn test_env_overrides_skip_blank_values() {
        let env = HashMap::from([
            ("SOLANA_PROGRAM_ID", "Prog1111111111111111111111111111111111111"),
            ("SOLANA_RPC_URL", "  "),
            ("BASE_RPC_URL", "http://127.0.0.1:8545"),
        ]);

        let mut config = Config::default();
        config
            .apply_overrides(|key| env.get(key).map(ToString::to_string))
            .unwrap();

        assert_eq!(
            config.solana.program_id.as_deref(),
            Some("Prog1111111111111111111111111111111111111")
        );
        assert_eq!(config.solana.rpc_http_url, defaults::SOLANA_RPC_DEVNET);
        assert_eq!(config.base.rpc_http_url, "http://127.0.0.1:8545");
    }

    #[test]
    fn test_invalid_verifier_address_override_is_rejected() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(|key| (key == "BASE_VERIFIER_ADDRESS").then(|| "0x1234".to_string()))
            .unwrap_err();

        assert!(err.to_string().contains("BASE_VERIFIER_ADDRESS"));
    }

    #[test]
    fn test_verifier_links() {
        let mut config = Config::default();

        assert_eq!(
            config
                .verifier_link(ChainSelector::Base)
                .map(|link| link.to_lowercase())
                .as_deref(),
            Some("https://repo.sourcify.dev/8453/0x4c163fa6756244e7f29cb5bea0458ea993eb0f6d")
        );
        assert_eq!(config.verifier_link(ChainSelector::Solana), None);

        config.solana.program_id = Some("Prog1111111111111111111111111111111111111".to_string());
        assert_eq!(
            config.verifier_link(ChainSelector::Solana).as_deref(),
            Some(
                "https://explorer.solana.com/address/Prog1111111111111111111111111111111111111?cluster=devnet"
            )
        );
    }
}
