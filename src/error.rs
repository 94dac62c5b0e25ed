use crate::{
    proof::{ChainSelector, VerifyMode},
    session::SessionStatus,
};

/// Operations the session refuses without changing its state, plus acquisition
/// failures that do move it to `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Cannot {operation} while session is {status:?}")]
    InvalidTransition {
        operation: &'static str,
        status: SessionStatus,
    },
    #[error("Session is locked to {locked}, cannot switch to {requested}")]
    ChainLocked {
        locked: ChainSelector,
        requested: ChainSelector,
    },
    #[error("Proof was produced for {produced_for}, session is locked to {locked}")]
    ArtifactChainMismatch {
        produced_for: ChainSelector,
        locked: ChainSelector,
    },
    #[error("{chain} does not support {mode} verification")]
    UnsupportedMode {
        chain: ChainSelector,
        mode: VerifyMode,
    },
    #[error("No chain has been selected yet")]
    NoChainSelected,
    #[error("Failed to get proof: {0}")]
    Acquisition(String),
}
