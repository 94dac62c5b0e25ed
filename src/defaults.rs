use alloy::primitives::{Address, address};

/// Issuer circuits
pub const BASE_CIRCUIT_ID: &str = "coinbase_kyc";
pub const SOLANA_CIRCUIT_ID: &str = "coinbase_kyc_solana";

pub const ISSUER_POLL_INTERVAL_SECS: u64 = 2;
pub const ISSUER_MAX_POLL_ATTEMPTS: u32 = 150;
pub const ISSUER_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Base mainnet
pub const BASE_RPC_MAINNET: &str = "https://mainnet.base.org";
pub const BASE_CHAIN_ID: u64 = 8453;
pub const BASE_VERIFIER_ADDRESS: Address = address!("0x4C163fa6756244e7f29Cb5BEA0458eA993Eb0F6d");
pub const BASE_EXPLORER_URL: &str = "https://basescan.org";
pub const SOURCIFY_REPO_URL: &str = "https://repo.sourcify.dev";

/// Solana devnet
pub const SOLANA_RPC_DEVNET: &str = "https://api.devnet.solana.com";
pub const SOLANA_CLUSTER: &str = "devnet";
pub const SOLANA_EXPLORER_URL: &str = "https://explorer.solana.com";

/// Env variable whose value is masked whenever an RPC error is logged
pub const RPC_API_KEY_ENV: &str = "RPC_API_KEY";

pub const CELEBRATION_WINDOW_SECS: i64 = 5;
