//! Terminal rendering of session state and events.

use crate::{
    proof::ChainSelector,
    session::{SessionEvent, SessionStatus, VerificationSession},
    verifier::VerificationResult,
};

pub const SINGLE_USE_NOTICE: &str = "Each proof can be used only once.";
pub const SUCCESS_BANNER: &str = "Human verified! Bot protection passed.";

pub fn chain_lock_line(chain: ChainSelector) -> String {
    format!("Chain locked to {} for this proof", chain.display_name())
}

pub fn failure_line(error: &str) -> String {
    format!("Verification failed: {error}")
}

pub fn portal_line(portal_url: &str) -> String {
    format!("Complete human verification in the proof portal: {portal_url}")
}

/// Lines describing the session as it is right now.
pub fn status_lines(session: &VerificationSession) -> Vec<String> {
    let mut lines = Vec::new();

    match session.status() {
        SessionStatus::Idle => {
            lines.push("Select a chain and start human verification".to_string());
        }
        SessionStatus::FetchingProof => {
            lines.push("Waiting for proof from portal…".to_string());
        }
        SessionStatus::ReadyToVerify => {
            lines.push(SINGLE_USE_NOTICE.to_string());
        }
        SessionStatus::Verifying => match session.locked_chain() {
            Some(chain) => lines.push(format!("Verifying on {}…", chain.display_name())),
            None => lines.push("Verifying…".to_string()),
        },
        SessionStatus::Succeeded => {
            if let Some(result) = session.result() {
                lines.extend(result_lines(result));
            }
        }
        SessionStatus::Failed => {
            lines.push(failure_line(session.error().unwrap_or("Verification failed")));
        }
    }

    if session.artifact().is_some() {
        if let Some(chain) = session.locked_chain() {
            lines.push(chain_lock_line(chain));
        }
    }

    lines
}

pub fn result_lines(result: &VerificationResult) -> Vec<String> {
    match result {
        VerificationResult::Success {
            reference,
            explorer_url,
        } => {
            let mut lines = vec![SUCCESS_BANNER.to_string()];
            if let Some(reference) = reference {
                lines.push(format!("Transaction: {reference}"));
            }
            if let Some(explorer_url) = explorer_url {
                lines.push(format!("Explorer: {explorer_url}"));
            }
            lines
        }
        VerificationResult::Failure { error } => vec![failure_line(error)],
    }
}

/// Every outcome is reported here exactly once.
pub fn event_lines(event: &SessionEvent) -> Vec<String> {
    match event {
        SessionEvent::ProofAcquired { chain } => {
            vec![format!("Proof received for {}", chain.display_name())]
        }
        SessionEvent::Celebrate { result, .. } => result_lines(result),
        SessionEvent::AttemptFailed {
            status_before: SessionStatus::FetchingProof,
            error,
        } => vec![format!("Failed to get proof: {error}")],
        SessionEvent::AttemptFailed { error, .. } => vec![failure_line(error)],
    }
}
